//! Batch group-chat creation.
//!
//! Reads the groups file named by `WECOM_GROUPS_FILE` and creates each group
//! in order through the server API, or through the mock client when
//! `WECOM_TEST_MODE` is set.

use anyhow::{bail, Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use wecom_callback::{Config, GroupCreator, GroupsFile};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("group_creator_starting");

    let config = Config::from_env();
    info!(
        groups_file = %config.groups_file,
        test_mode = config.test_mode,
        corp_id_configured = !config.corp_id.is_empty(),
        corp_secret_configured = config.corp_secret.is_some(),
        delay_ms = config.group_request_delay_ms,
        "config_loaded"
    );

    let file = GroupsFile::load(&config.groups_file)?;
    if file.groups.is_empty() {
        warn!(groups_file = %config.groups_file, "groups_file_empty");
        return Ok(());
    }

    let creator = GroupCreator::from_config(&config).context("Failed to create group client")?;
    let outcomes = creator.create_all(&file.groups).await;

    for outcome in &outcomes {
        match &outcome.result {
            Ok(chat_id) => info!(
                group = %outcome.group_name,
                chat_id = %chat_id,
                members = outcome.member_count,
                "group_result"
            ),
            Err(e) => warn!(
                group = %outcome.group_name,
                error = %e,
                members = outcome.member_count,
                "group_result"
            ),
        }
    }

    let failed = outcomes.iter().filter(|o| !o.is_success()).count();
    if failed > 0 {
        bail!("{} of {} groups failed", failed, outcomes.len());
    }

    info!("group_creator_complete");
    Ok(())
}
