//! WeCom callback receiver.
//!
//! This library provides shared modules for the two binaries:
//! - `wecom-callback`: Web server answering URL verification and message delivery
//! - `wecom-groups`: One-shot batch creation of group chats
//!
//! ## Architecture
//!
//! ```text
//! GET/POST callback → params → signature::verify → envelope::decode
//!                   → InboundMessage → MessageHandler
//! ```

pub mod config;
pub mod crypto;
pub mod group;
pub mod message;
pub mod web;
pub mod xml;

// Re-export commonly used types
pub use config::{AckFormat, Config, VerificationMode};
pub use crypto::{Credentials, CryptoError};
pub use group::{GroupClient, GroupCreator, GroupsFile};
pub use message::{InboundMessage, LoggingMessageHandler, MessageHandler};
pub use web::{AppState, CallbackError, CallbackHandler};
