//! Configuration module for environment variable parsing.
//!
//! Everything is read once at startup into a [`Config`] that is passed to
//! constructors; nothing reads the environment afterwards.

use std::env;
use std::fmt;
use std::str::FromStr;

use tracing::warn;

use crate::crypto::Credentials;

/// Which signature variant the callback endpoint expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationMode {
    /// `SHA1(sort(token, timestamp, nonce))`. Payloads travel unencrypted:
    /// `echostr` is echoed verbatim and POST bodies are plain messages.
    Plaintext,
    /// `SHA1(sort(token, timestamp, nonce, payload))` over the `echostr` or
    /// `Encrypt` ciphertext, which is then decoded.
    Encrypted,
}

impl VerificationMode {
    /// Whether the payload field is part of the signed set.
    pub fn signs_payload(self) -> bool {
        matches!(self, Self::Encrypted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plaintext => "plaintext",
            Self::Encrypted => "encrypted",
        }
    }
}

impl FromStr for VerificationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plaintext" | "plain" => Ok(Self::Plaintext),
            "encrypted" | "safe" => Ok(Self::Encrypted),
            other => Err(format!("unknown callback mode '{}'", other)),
        }
    }
}

/// Body returned to acknowledge a delivered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckFormat {
    /// `{"errcode":0,"errmsg":"ok"}`
    Json,
    /// `success`
    Text,
}

impl AckFormat {
    pub fn body(self) -> &'static str {
        match self {
            Self::Json => r#"{"errcode":0,"errmsg":"ok"}"#,
            Self::Text => "success",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Text => "text/plain; charset=utf-8",
        }
    }
}

impl FromStr for AckFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "text" | "success" => Ok(Self::Text),
            other => Err(format!("unknown ack format '{}'", other)),
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Clone)]
pub struct Config {
    /// Port for the web server to listen on
    pub port: u16,

    /// Callback token configured in the WeCom admin console
    pub token: String,

    /// 43-character EncodingAESKey
    pub encoding_aes_key: String,

    /// Corp id, embedded as the receiver id in every envelope
    pub corp_id: String,

    /// Route serving both the handshake (GET) and deliveries (POST)
    pub callback_path: String,

    /// Signature variant and payload handling
    pub callback_mode: VerificationMode,

    /// Acknowledgement body for deliveries
    pub ack_format: AckFormat,

    // =========================================================================
    // Group API Configuration
    // =========================================================================

    /// Corp secret for the access token endpoint
    pub corp_secret: Option<String>,

    /// Base URL of the WeCom server API
    pub api_base_url: String,

    /// Use the mock group client instead of the remote API
    pub test_mode: bool,

    /// JSON file listing the groups to create
    pub groups_file: String,

    /// Delay between consecutive group creations in milliseconds
    pub group_request_delay_ms: u64,

    /// Outbound HTTP request timeout in milliseconds
    pub request_timeout_ms: u64,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Config {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),

            token: env::var("WECOM_TOKEN").unwrap_or_default(),

            encoding_aes_key: env::var("WECOM_ENCODING_AES_KEY").unwrap_or_default(),

            corp_id: env::var("WECOM_CORP_ID").unwrap_or_default(),

            callback_path: normalize_path(
                &env::var("WECOM_CALLBACK_PATH").unwrap_or_else(|_| "/wechat/callback".to_string()),
            ),

            callback_mode: parse_choice("WECOM_CALLBACK_MODE", VerificationMode::Encrypted),

            ack_format: parse_choice("WECOM_ACK_FORMAT", AckFormat::Json),

            corp_secret: env::var("WECOM_CORP_SECRET")
                .ok()
                .filter(|s| !s.trim().is_empty()),

            api_base_url: env::var("WECOM_API_BASE_URL")
                .unwrap_or_else(|_| "https://qyapi.weixin.qq.com".to_string()),

            test_mode: parse_flag("WECOM_TEST_MODE"),

            groups_file: env::var("WECOM_GROUPS_FILE")
                .unwrap_or_else(|_| "groups.json".to_string()),

            group_request_delay_ms: env::var("GROUP_REQUEST_DELAY_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1000),

            request_timeout_ms: env::var("REQUEST_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8000),
        }
    }

    /// Immutable credentials shared by every callback request.
    pub fn credentials(&self) -> Credentials {
        Credentials::new(&self.token, &self.encoding_aes_key, &self.corp_id)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("token_set", &!self.token.is_empty())
            .field("encoding_aes_key_set", &!self.encoding_aes_key.is_empty())
            .field("corp_id", &self.corp_id)
            .field("callback_path", &self.callback_path)
            .field("callback_mode", &self.callback_mode)
            .field("ack_format", &self.ack_format)
            .field("corp_secret_set", &self.corp_secret.is_some())
            .field("api_base_url", &self.api_base_url)
            .field("test_mode", &self.test_mode)
            .field("groups_file", &self.groups_file)
            .field("group_request_delay_ms", &self.group_request_delay_ms)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .finish()
    }
}

/// Parse an enum-valued variable, warning and falling back on bad input.
fn parse_choice<T>(name: &str, default: T) -> T
where
    T: FromStr<Err = String>,
{
    let raw = match env::var(name) {
        Ok(v) => v,
        Err(_) => return default,
    };

    match raw.parse() {
        Ok(value) => value,
        Err(e) => {
            warn!(env_var = name, value = %raw, error = %e, "Invalid value, using default");
            default
        }
    }
}

/// Parse a boolean flag such as "1", "true" or "yes".
fn parse_flag(name: &str) -> bool {
    env::var(name)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

/// Route paths must start with a slash.
fn normalize_path(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_choice_valid() {
        env::set_var("TEST_CALLBACK_MODE_VALID", "Plaintext");
        let result = parse_choice("TEST_CALLBACK_MODE_VALID", VerificationMode::Encrypted);
        assert_eq!(result, VerificationMode::Plaintext);
        env::remove_var("TEST_CALLBACK_MODE_VALID");
    }

    #[test]
    fn test_parse_choice_invalid_falls_back() {
        env::set_var("TEST_ACK_FORMAT_INVALID", "yaml");
        let result = parse_choice("TEST_ACK_FORMAT_INVALID", AckFormat::Json);
        assert_eq!(result, AckFormat::Json);
        env::remove_var("TEST_ACK_FORMAT_INVALID");
    }

    #[test]
    fn test_parse_choice_default() {
        let result = parse_choice("NONEXISTENT_CALLBACK_MODE", VerificationMode::Encrypted);
        assert_eq!(result, VerificationMode::Encrypted);
    }

    #[test]
    fn test_parse_flag() {
        env::set_var("TEST_FLAG_ON", "TRUE");
        env::set_var("TEST_FLAG_OFF", "0");
        assert!(parse_flag("TEST_FLAG_ON"));
        assert!(!parse_flag("TEST_FLAG_OFF"));
        assert!(!parse_flag("NONEXISTENT_FLAG"));
        env::remove_var("TEST_FLAG_ON");
        env::remove_var("TEST_FLAG_OFF");
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("wechat/callback"), "/wechat/callback");
        assert_eq!(normalize_path(" /cb "), "/cb");
    }

    #[test]
    fn test_mode_signs_payload() {
        assert!(VerificationMode::Encrypted.signs_payload());
        assert!(!VerificationMode::Plaintext.signs_payload());
    }

    #[test]
    fn test_ack_bodies() {
        assert_eq!(AckFormat::Json.body(), r#"{"errcode":0,"errmsg":"ok"}"#);
        assert_eq!(AckFormat::Text.body(), "success");
    }

    #[test]
    fn test_debug_hides_secrets() {
        let mut config = Config::from_env();
        config.token = "debug-secret-token".to_string();
        config.corp_secret = Some("debug-corp-secret".to_string());

        let debug = format!("{:?}", config);
        assert!(!debug.contains("debug-secret-token"));
        assert!(!debug.contains("debug-corp-secret"));
        assert!(debug.contains("token_set: true"));
    }
}
