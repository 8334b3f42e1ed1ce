//! Batch creation of WeCom group chats through the server API.

pub mod client;
pub mod creator;
pub mod mock;
pub mod types;

pub use client::{errcode_hint, GroupClient, GroupError, RemoteGroupClient};
pub use creator::{client_from_config, GroupCreator};
pub use mock::MockGroupClient;
pub use types::{GroupMember, GroupOutcome, GroupSpec, GroupsFile};
