//! Group-management clients.
//!
//! [`GroupClient`] is the seam between the group creator and the platform:
//! [`RemoteGroupClient`] talks to the server API, [`super::MockGroupClient`]
//! fabricates results for dry runs.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};
use url::Url;

use super::types::{CreateChatRequest, CreateChatResponse, GroupSpec, TokenResponse};
use crate::Config;

/// Tokens are refreshed this long before the platform says they expire.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(300);

#[derive(Debug, Error)]
pub enum GroupError {
    /// Carries no URL; request URLs hold the corp secret or access token.
    #[error("http request failed: {0}")]
    Http(reqwest::Error),

    #[error("invalid api url: {0}")]
    Url(#[from] url::ParseError),

    #[error("api error {errcode}: {errmsg}")]
    Api { errcode: i64, errmsg: String },

    #[error("WECOM_CORP_SECRET is not configured")]
    MissingSecret,

    #[error("group '{0}' has no members")]
    NoMembers(String),

    #[error("api returned no chat id for group '{0}'")]
    MissingChatId(String),
}

impl From<reqwest::Error> for GroupError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.without_url())
    }
}

/// Operations the group creator needs from the platform.
#[async_trait]
pub trait GroupClient: Send + Sync {
    /// A valid access token for the server API.
    async fn access_token(&self) -> Result<String, GroupError>;

    /// Create a group chat, returning its chat id.
    async fn create_group(&self, group: &GroupSpec) -> Result<String, GroupError>;
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Client for the WeCom server API.
pub struct RemoteGroupClient {
    http: Client,
    base_url: Url,
    corp_id: String,
    corp_secret: String,
    token: RwLock<Option<CachedToken>>,
}

impl RemoteGroupClient {
    pub fn new(config: &Config) -> Result<Self, GroupError> {
        let corp_secret = config.corp_secret.clone().ok_or(GroupError::MissingSecret)?;

        let http = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        Ok(Self {
            http,
            base_url: Url::parse(&config.api_base_url)?,
            corp_id: config.corp_id.clone(),
            corp_secret,
            token: RwLock::new(None),
        })
    }

    async fn fetch_token(&self) -> Result<CachedToken, GroupError> {
        let mut url = self.base_url.join("cgi-bin/gettoken")?;
        url.query_pairs_mut()
            .append_pair("corpid", &self.corp_id)
            .append_pair("corpsecret", &self.corp_secret);

        info!(corp_id = %self.corp_id, "access_token_fetching");

        let response: TokenResponse = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        match response.access_token {
            Some(value) if response.errcode == 0 => {
                let lifetime = Duration::from_secs(response.expires_in)
                    .saturating_sub(TOKEN_REFRESH_MARGIN);
                info!(expires_in = response.expires_in, "access_token_fetched");
                Ok(CachedToken {
                    value,
                    expires_at: Instant::now() + lifetime,
                })
            }
            _ => {
                warn!(
                    errcode = response.errcode,
                    errmsg = %response.errmsg,
                    "access_token_failed"
                );
                Err(GroupError::Api {
                    errcode: response.errcode,
                    errmsg: response.errmsg,
                })
            }
        }
    }
}

#[async_trait]
impl GroupClient for RemoteGroupClient {
    async fn access_token(&self) -> Result<String, GroupError> {
        {
            let cached = self.token.read().await;
            if let Some(token) = cached.as_ref() {
                if Instant::now() < token.expires_at {
                    return Ok(token.value.clone());
                }
            }
        }

        let mut cached = self.token.write().await;

        // Another task may have refreshed while we waited for the lock
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        let token = self.fetch_token().await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    async fn create_group(&self, group: &GroupSpec) -> Result<String, GroupError> {
        let owner = group
            .members
            .first()
            .map(|m| m.user_id.as_str())
            .ok_or_else(|| GroupError::NoMembers(group.name.clone()))?;

        let access_token = self.access_token().await?;
        let mut url = self.base_url.join("cgi-bin/appchat/create")?;
        url.query_pairs_mut().append_pair("access_token", &access_token);

        let request = CreateChatRequest {
            name: &group.name,
            owner,
            userlist: group.members.iter().map(|m| m.user_id.as_str()).collect(),
            chatid: group.chat_id.as_deref(),
        };

        let response: CreateChatResponse = self
            .http
            .post(url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if response.errcode != 0 {
            return Err(GroupError::Api {
                errcode: response.errcode,
                errmsg: response.errmsg,
            });
        }

        response
            .chatid
            .filter(|id| !id.is_empty())
            .or_else(|| group.chat_id.clone())
            .ok_or_else(|| GroupError::MissingChatId(group.name.clone()))
    }
}

/// Operator hint for known server API error codes.
pub fn errcode_hint(errcode: i64) -> Option<&'static str> {
    match errcode {
        60020 => {
            Some("Request IP is not in the app's trusted IP list; add it in the admin console")
        }
        60001 => Some("The app lacks permission; check that contact management is enabled"),
        60003 => Some("A member does not exist; check the configured user ids"),
        601052 => Some("The owner user id does not exist; check the first member"),
        60011 => Some("The app is not allowed to create group chats; check its permissions"),
        _ => None,
    }
}
