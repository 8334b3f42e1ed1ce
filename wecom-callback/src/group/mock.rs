use async_trait::async_trait;
use rand::{distributions::Alphanumeric, Rng};
use tracing::info;

use super::client::{GroupClient, GroupError};
use super::types::GroupSpec;

/// Dry-run client that never touches the network.
#[derive(Debug, Default, Clone)]
pub struct MockGroupClient;

#[async_trait]
impl GroupClient for MockGroupClient {
    async fn access_token(&self) -> Result<String, GroupError> {
        Ok(format!("mock_token_{}", random_suffix()))
    }

    async fn create_group(&self, group: &GroupSpec) -> Result<String, GroupError> {
        if group.members.is_empty() {
            return Err(GroupError::NoMembers(group.name.clone()));
        }

        let chat_id = group
            .chat_id
            .clone()
            .unwrap_or_else(|| format!("mock_chat_{}", random_suffix()));

        info!(group = %group.name, chat_id = %chat_id, "mock_group_created");
        Ok(chat_id)
    }
}

fn random_suffix() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::GroupMember;

    #[tokio::test]
    async fn test_mock_create_group() {
        let group = GroupSpec {
            name: "alpha".to_string(),
            description: String::new(),
            members: vec![GroupMember {
                user_id: "zhangsan".to_string(),
                name: String::new(),
            }],
            chat_id: None,
        };

        let chat_id = MockGroupClient.create_group(&group).await.unwrap();

        assert!(chat_id.starts_with("mock_chat_"));
        assert_eq!(chat_id.len(), "mock_chat_".len() + 9);
    }

    #[tokio::test]
    async fn test_mock_keeps_explicit_chat_id() {
        let group = GroupSpec {
            name: "alpha".to_string(),
            description: String::new(),
            members: vec![GroupMember {
                user_id: "zhangsan".to_string(),
                name: String::new(),
            }],
            chat_id: Some("fixed".to_string()),
        };

        assert_eq!(MockGroupClient.create_group(&group).await.unwrap(), "fixed");
    }

    #[tokio::test]
    async fn test_mock_token() {
        let token = MockGroupClient.access_token().await.unwrap();

        assert!(token.starts_with("mock_token_"));
    }
}
