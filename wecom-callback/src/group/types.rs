//! Group definitions and API payloads.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// A member to add to a group chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMember {
    #[serde(rename = "userId")]
    pub user_id: String,
    /// Display name, only used in logs
    #[serde(default)]
    pub name: String,
}

/// A group chat to create. The first member becomes the owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub members: Vec<GroupMember>,
    /// Explicit chat id; the platform assigns one when absent
    #[serde(default, rename = "chatId", skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
}

/// Groups file. Unknown top-level keys are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupsFile {
    #[serde(default)]
    pub groups: Vec<GroupSpec>,
}

impl GroupsFile {
    /// Read and parse a groups file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read groups file {}", path.display()))?;

        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse groups file {}", path.display()))
    }
}

/// Result of creating one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupOutcome {
    pub group_name: String,
    pub member_count: usize,
    /// Chat id on success, error message on failure
    pub result: Result<String, String>,
}

impl GroupOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

// =============================================================================
// Server API payloads
// =============================================================================

/// `gettoken` response.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    #[serde(default)]
    pub errcode: i64,
    #[serde(default)]
    pub errmsg: String,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub expires_in: u64,
}

/// `appchat/create` request body.
#[derive(Debug, Serialize)]
pub(crate) struct CreateChatRequest<'a> {
    pub name: &'a str,
    pub owner: &'a str,
    pub userlist: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chatid: Option<&'a str>,
}

/// `appchat/create` response.
#[derive(Debug, Deserialize)]
pub(crate) struct CreateChatResponse {
    #[serde(default)]
    pub errcode: i64,
    #[serde(default)]
    pub errmsg: String,
    #[serde(default)]
    pub chatid: Option<String>,
}
