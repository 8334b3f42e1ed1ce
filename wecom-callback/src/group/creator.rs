//! Sequential batch creation of group chats.

use std::time::Duration;

use tracing::{error, info, warn};

use super::client::{errcode_hint, GroupClient, GroupError, RemoteGroupClient};
use super::mock::MockGroupClient;
use super::types::{GroupOutcome, GroupSpec};
use crate::Config;

/// Pick the mock client in test mode, the remote one otherwise.
pub fn client_from_config(config: &Config) -> Result<Box<dyn GroupClient>, GroupError> {
    if config.test_mode {
        info!("group_client_mock");
        Ok(Box::new(MockGroupClient))
    } else {
        Ok(Box::new(RemoteGroupClient::new(config)?))
    }
}

/// Creates groups one at a time with a fixed delay between requests.
pub struct GroupCreator {
    client: Box<dyn GroupClient>,
    delay: Duration,
}

impl GroupCreator {
    pub fn new(client: Box<dyn GroupClient>, delay: Duration) -> Self {
        Self { client, delay }
    }

    pub fn from_config(config: &Config) -> Result<Self, GroupError> {
        Ok(Self::new(
            client_from_config(config)?,
            Duration::from_millis(config.group_request_delay_ms),
        ))
    }

    /// Create every group in order. A failure is recorded and the batch
    /// continues; nothing is retried.
    pub async fn create_all(&self, groups: &[GroupSpec]) -> Vec<GroupOutcome> {
        let mut outcomes = Vec::with_capacity(groups.len());

        for (index, group) in groups.iter().enumerate() {
            if index > 0 && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            info!(
                group = %group.name,
                members = group.members.len(),
                position = index + 1,
                total = groups.len(),
                "group_creating"
            );

            let result = match self.client.create_group(group).await {
                Ok(chat_id) => {
                    info!(group = %group.name, chat_id = %chat_id, "group_created");
                    Ok(chat_id)
                }
                Err(e) => {
                    let hint = match &e {
                        GroupError::Api { errcode, .. } => errcode_hint(*errcode),
                        _ => None,
                    };
                    error!(
                        group = %group.name,
                        error = %e,
                        hint = hint.unwrap_or(""),
                        "group_create_failed"
                    );
                    Err(e.to_string())
                }
            };

            outcomes.push(GroupOutcome {
                group_name: group.name.clone(),
                member_count: group.members.len(),
                result,
            });
        }

        log_summary(&outcomes);
        outcomes
    }
}

fn log_summary(outcomes: &[GroupOutcome]) {
    let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
    let failed = outcomes.len() - succeeded;

    if failed > 0 {
        warn!(total = outcomes.len(), succeeded, failed, "group_batch_completed");
    } else {
        info!(total = outcomes.len(), succeeded, failed, "group_batch_completed");
    }
}
