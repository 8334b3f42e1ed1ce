//! Web server module for the WeCom callback endpoint.
//!
//! This module provides:
//! - URL verification (GET): answers the `echostr` challenge
//! - Message delivery (POST): verifies, decrypts and dispatches messages
//! - A status page and a health check
//!
//! All cryptography happens in [`crate::crypto`].

pub mod callback;
pub mod handlers;
pub mod params;

pub use callback::{CallbackError, CallbackHandler, Delivery, VerificationRequest};
pub use handlers::{
    health, receive_message, router, status_page, verify_url, AppState, HealthResponse,
};
pub use params::{extract_encrypt, CallbackParams};
