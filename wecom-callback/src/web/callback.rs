//! Callback orchestration: verify the signature, decode the payload, hand it on.
//!
//! Each request is handled independently in one of two states:
//! - URL verification (GET): answer the `echostr` challenge
//! - message delivery (POST): decode `Encrypt` and pass the message to the
//!   [`MessageHandler`]
//!
//! The only state shared between requests is the immutable [`Credentials`].

use std::sync::Arc;

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::{AckFormat, VerificationMode};
use crate::crypto::{envelope, signature, Credentials, CryptoError};
use crate::message::{InboundMessage, MessageError, MessageHandler};
use crate::web::params::{extract_encrypt, CallbackParams};
use crate::xml::cdata;

/// Why a callback request was rejected.
#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("missing required fields: {}", .0.join(", "))]
    MissingField(Vec<&'static str>),

    #[error("signature mismatch")]
    SignatureMismatch { computed: String, provided: String },

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("invalid message: {0}")]
    Message(#[from] MessageError),
}

impl CallbackError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingField(_) | Self::Message(_) => StatusCode::BAD_REQUEST,
            Self::SignatureMismatch { .. } => StatusCode::FORBIDDEN,
            Self::Crypto(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Log under an event name that keeps forged requests apart from
    /// misconfigured credentials.
    fn log(&self, stage: &'static str) {
        match self {
            Self::MissingField(fields) => {
                warn!(stage = stage, missing = ?fields, "callback_missing_fields");
            }
            Self::SignatureMismatch { computed, provided } => {
                warn!(
                    stage = stage,
                    computed_signature = %computed,
                    provided_signature = %provided,
                    "callback_signature_mismatch"
                );
            }
            Self::Crypto(e) => {
                error!(stage = stage, kind = e.kind(), error = %e, "callback_decrypt_failed");
            }
            Self::Message(e) => {
                warn!(stage = stage, error = %e, "callback_message_invalid");
            }
        }
    }
}

impl IntoResponse for CallbackError {
    fn into_response(self) -> Response {
        let body = match &self {
            Self::MissingField(_) => "Missing required parameters",
            Self::SignatureMismatch { .. } => "Verification failed",
            Self::Crypto(_) => "Internal server error",
            Self::Message(_) => "Invalid message format",
        };

        (
            self.status_code(),
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            body,
        )
            .into_response()
    }
}

/// The signed fields of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationRequest {
    pub signature: String,
    pub timestamp: String,
    pub nonce: String,
    /// `echostr` or `Encrypt`; `None` when the request carries no payload field
    pub payload_field: Option<String>,
}

impl VerificationRequest {
    /// Collect the signed fields, requiring `payload` when one is named.
    ///
    /// Empty values count as missing, and every missing field is reported.
    pub fn collect(
        params: &CallbackParams,
        payload: Option<(&'static str, Option<String>)>,
    ) -> Result<Self, CallbackError> {
        let mut missing = Vec::new();

        let signature = require(&params.signature, "msg_signature", &mut missing);
        let timestamp = require(&params.timestamp, "timestamp", &mut missing);
        let nonce = require(&params.nonce, "nonce", &mut missing);

        let payload_field = match payload {
            Some((name, value)) => {
                let value = value.filter(|v| !v.is_empty());
                if value.is_none() {
                    missing.push(name);
                }
                value
            }
            None => None,
        };

        match (signature, timestamp, nonce) {
            (Some(signature), Some(timestamp), Some(nonce)) if missing.is_empty() => Ok(Self {
                signature,
                timestamp,
                nonce,
                payload_field,
            }),
            _ => Err(CallbackError::MissingField(missing)),
        }
    }
}

fn require(
    value: &Option<String>,
    name: &'static str,
    missing: &mut Vec<&'static str>,
) -> Option<String> {
    match value.as_deref() {
        Some(v) if !v.is_empty() => Some(v.to_string()),
        _ => {
            missing.push(name);
            None
        }
    }
}

/// Response to a successful delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Plain acknowledgement
    Ack(AckFormat),
    /// Reply content returned as-is (plaintext mode)
    Reply(String),
    /// Encrypted passive reply document
    EncryptedReply(String),
}

impl IntoResponse for Delivery {
    fn into_response(self) -> Response {
        match self {
            Self::Ack(format) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, format.content_type())],
                format.body(),
            )
                .into_response(),
            Self::Reply(body) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/xml; charset=utf-8")],
                body,
            )
                .into_response(),
            Self::EncryptedReply(body) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "application/xml; charset=utf-8")],
                body,
            )
                .into_response(),
        }
    }
}

/// Stateless per-request orchestration over the signature and envelope code.
#[derive(Clone)]
pub struct CallbackHandler {
    credentials: Arc<Credentials>,
    mode: VerificationMode,
    ack: AckFormat,
    messages: Arc<dyn MessageHandler>,
}

impl CallbackHandler {
    pub fn new(
        credentials: Credentials,
        mode: VerificationMode,
        ack: AckFormat,
        messages: Arc<dyn MessageHandler>,
    ) -> Self {
        Self {
            credentials: Arc::new(credentials),
            mode,
            ack,
            messages,
        }
    }

    pub fn mode(&self) -> VerificationMode {
        self.mode
    }

    /// Answer the URL verification handshake with the decoded `echostr`.
    pub fn verify_url(&self, params: &CallbackParams) -> Result<String, CallbackError> {
        self.verify_url_inner(params).map_err(|e| {
            e.log("verification");
            e
        })
    }

    fn verify_url_inner(&self, params: &CallbackParams) -> Result<String, CallbackError> {
        let request =
            VerificationRequest::collect(params, Some(("echostr", params.echostr.clone())))?;
        self.check_signature(&request)?;

        let echostr = request.payload_field.unwrap_or_default();
        let echo = match self.mode {
            VerificationMode::Plaintext => echostr,
            VerificationMode::Encrypted => envelope::decode(&echostr, &self.credentials)?,
        };

        info!(mode = self.mode.as_str(), "callback_verification_succeeded");
        Ok(echo)
    }

    /// Handle a message delivery.
    pub fn deliver(&self, params: &CallbackParams, body: &str) -> Result<Delivery, CallbackError> {
        self.deliver_inner(params, body).map_err(|e| {
            e.log("delivery");
            e
        })
    }

    fn deliver_inner(
        &self,
        params: &CallbackParams,
        body: &str,
    ) -> Result<Delivery, CallbackError> {
        match self.mode {
            VerificationMode::Plaintext => {
                let request = VerificationRequest::collect(params, None)?;
                self.check_signature(&request)?;

                let message = InboundMessage::parse(body)?;
                info!(mode = self.mode.as_str(), "callback_delivery_verified");

                Ok(match self.messages.handle(&message) {
                    Some(reply) => Delivery::Reply(reply),
                    None => Delivery::Ack(self.ack),
                })
            }
            VerificationMode::Encrypted => {
                let request =
                    VerificationRequest::collect(params, Some(("Encrypt", extract_encrypt(body))))?;
                self.check_signature(&request)?;

                let ciphertext = request.payload_field.as_deref().unwrap_or_default();
                let plaintext = envelope::decode(ciphertext, &self.credentials)?;
                let message = InboundMessage::parse(&plaintext)?;
                info!(
                    mode = self.mode.as_str(),
                    plaintext_length = plaintext.len(),
                    "callback_delivery_verified"
                );

                match self.messages.handle(&message) {
                    Some(reply) => Ok(Delivery::EncryptedReply(self.encrypted_reply(
                        &reply,
                        &request.timestamp,
                        &request.nonce,
                    )?)),
                    None => Ok(Delivery::Ack(self.ack)),
                }
            }
        }
    }

    fn check_signature(&self, request: &VerificationRequest) -> Result<(), CallbackError> {
        let payload = if self.mode.signs_payload() {
            request.payload_field.as_deref()
        } else {
            None
        };

        let computed = signature::compute_signature(
            &self.credentials.token,
            &request.timestamp,
            &request.nonce,
            payload,
        );

        if signature::constant_time_compare(&computed, &request.signature) {
            Ok(())
        } else {
            Err(CallbackError::SignatureMismatch {
                computed,
                provided: request.signature.clone(),
            })
        }
    }

    /// Build the encrypted passive reply document for `content`.
    pub fn encrypted_reply(
        &self,
        content: &str,
        timestamp: &str,
        nonce: &str,
    ) -> Result<String, CryptoError> {
        let encrypt = envelope::encode(content, &self.credentials)?;
        let msg_signature =
            signature::compute_signature(&self.credentials.token, timestamp, nonce, Some(&encrypt));

        Ok(format!(
            "<xml><Encrypt>{}</Encrypt><MsgSignature>{}</MsgSignature><TimeStamp>{}</TimeStamp><Nonce>{}</Nonce></xml>",
            cdata(&encrypt),
            cdata(&msg_signature),
            cdata(timestamp),
            cdata(nonce)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::LoggingMessageHandler;
    use crate::xml::element_text;

    const TOKEN: &str = "QDG6eK";
    const KEY: &str = "jWmYm7qr5nMoAUwZRjGtBxmz3KA1tkAj3ykkR6q2B2C";
    const CORP_ID: &str = "wx5823bf96d3bd56c7";
    const ECHOSTR: &str =
        "P9nAzCzyDtyTWESHep1vC5X9xho/qYX3Zpb4yKa9SKld1DsH3Iyt3tP3zNdtp+4RPcs8TgAE7OaBO+FZXvnaqQ==";

    struct EchoHandler;

    impl MessageHandler for EchoHandler {
        fn handle(&self, message: &InboundMessage) -> Option<String> {
            message.content.as_ref().map(|c| format!("echo: {}", c))
        }
    }

    fn credentials() -> Credentials {
        Credentials::new(TOKEN, KEY, CORP_ID)
    }

    fn handler(mode: VerificationMode) -> CallbackHandler {
        CallbackHandler::new(
            credentials(),
            mode,
            AckFormat::Json,
            Arc::new(LoggingMessageHandler),
        )
    }

    fn params(
        signature: &str,
        timestamp: &str,
        nonce: &str,
        echostr: Option<&str>,
    ) -> CallbackParams {
        CallbackParams {
            signature: Some(signature.to_string()),
            timestamp: Some(timestamp.to_string()),
            nonce: Some(nonce.to_string()),
            echostr: echostr.map(str::to_string),
        }
    }

    fn delivery_body(plaintext: &str) -> (String, String) {
        let encrypt = envelope::encode(plaintext, &credentials()).unwrap();
        let body = format!(
            "<xml><ToUserName>{}</ToUserName><Encrypt>{}</Encrypt><AgentID>218</AgentID></xml>",
            cdata(CORP_ID),
            cdata(&encrypt)
        );
        (encrypt, body)
    }

    #[test]
    fn test_verify_url_platform_sample() {
        let params = params(
            "5c45ff5e21c57e6ad56bac8758b79b1d9ac89fd3",
            "1409659589",
            "263014780",
            Some(ECHOSTR),
        );

        let echo = handler(VerificationMode::Encrypted).verify_url(&params).unwrap();

        assert_eq!(echo, "1616140317555161061");
    }

    #[test]
    fn test_verify_url_signature_mismatch() {
        let params = params("0000", "1409659589", "263014780", Some(ECHOSTR));

        let err = handler(VerificationMode::Encrypted).verify_url(&params).unwrap_err();

        assert!(matches!(err, CallbackError::SignatureMismatch { .. }));
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_verify_url_missing_nonce() {
        let mut params = params(
            "5c45ff5e21c57e6ad56bac8758b79b1d9ac89fd3",
            "1409659589",
            "263014780",
            Some(ECHOSTR),
        );
        params.nonce = None;

        let err = handler(VerificationMode::Encrypted).verify_url(&params).unwrap_err();

        match &err {
            CallbackError::MissingField(fields) => assert_eq!(fields, &vec!["nonce"]),
            other => panic!("Expected MissingField, got {:?}", other),
        }
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_verify_url_reports_every_missing_field() {
        let err = handler(VerificationMode::Encrypted)
            .verify_url(&CallbackParams::default())
            .unwrap_err();

        match err {
            CallbackError::MissingField(fields) => {
                assert_eq!(fields, vec!["msg_signature", "timestamp", "nonce", "echostr"]);
            }
            other => panic!("Expected MissingField, got {:?}", other),
        }
    }

    #[test]
    fn test_verify_url_bad_key_is_server_error() {
        let bad = Credentials::new(TOKEN, "c2hvcnQ=", CORP_ID);
        let handler = CallbackHandler::new(
            bad,
            VerificationMode::Encrypted,
            AckFormat::Json,
            Arc::new(LoggingMessageHandler),
        );
        let params = params(
            "5c45ff5e21c57e6ad56bac8758b79b1d9ac89fd3",
            "1409659589",
            "263014780",
            Some(ECHOSTR),
        );

        let err = handler.verify_url(&params).unwrap_err();

        assert!(matches!(err, CallbackError::Crypto(CryptoError::KeyFormatInvalid(_))));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_verify_url_plaintext_echoes() {
        let signature = signature::compute_signature(TOKEN, "1234567890", "nonce", None);
        let params = params(&signature, "1234567890", "nonce", Some("hello"));

        let echo = handler(VerificationMode::Plaintext).verify_url(&params).unwrap();

        assert_eq!(echo, "hello");
    }

    #[test]
    fn test_plaintext_mode_rejects_four_part_signature() {
        let signature = signature::compute_signature(TOKEN, "1234567890", "nonce", Some("hello"));
        let params = params(&signature, "1234567890", "nonce", Some("hello"));

        let err = handler(VerificationMode::Plaintext).verify_url(&params).unwrap_err();

        assert!(matches!(err, CallbackError::SignatureMismatch { .. }));
    }

    #[test]
    fn test_deliver_acknowledges() {
        let (encrypt, body) =
            delivery_body("<xml><MsgType>text</MsgType><Content>hi</Content></xml>");
        let signature = signature::compute_signature(TOKEN, "1700000000", "n1", Some(&encrypt));
        let params = params(&signature, "1700000000", "n1", None);

        let delivery = handler(VerificationMode::Encrypted).deliver(&params, &body).unwrap();

        assert_eq!(delivery, Delivery::Ack(AckFormat::Json));
    }

    #[test]
    fn test_deliver_three_part_signature_is_rejected() {
        // Signing only token/timestamp/nonce on the encrypted delivery path
        // leaves the ciphertext unauthenticated, so it must not verify.
        let (_, body) = delivery_body("<xml><MsgType>text</MsgType></xml>");
        let signature = signature::compute_signature(TOKEN, "1700000000", "n1", None);
        let params = params(&signature, "1700000000", "n1", None);

        let err = handler(VerificationMode::Encrypted).deliver(&params, &body).unwrap_err();

        assert!(matches!(err, CallbackError::SignatureMismatch { .. }));
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_deliver_missing_encrypt() {
        let params = params("sig", "1700000000", "n1", None);

        let err = handler(VerificationMode::Encrypted)
            .deliver(&params, "<xml><ToUserName>x</ToUserName></xml>")
            .unwrap_err();

        match err {
            CallbackError::MissingField(fields) => assert_eq!(fields, vec!["Encrypt"]),
            other => panic!("Expected MissingField, got {:?}", other),
        }
    }

    #[test]
    fn test_deliver_invalid_message_is_bad_request() {
        let (encrypt, body) = delivery_body("not a message");
        let signature = signature::compute_signature(TOKEN, "1700000000", "n1", Some(&encrypt));
        let params = params(&signature, "1700000000", "n1", None);

        let err = handler(VerificationMode::Encrypted).deliver(&params, &body).unwrap_err();

        assert!(matches!(err, CallbackError::Message(_)));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_deliver_encrypted_reply() {
        let handler = CallbackHandler::new(
            credentials(),
            VerificationMode::Encrypted,
            AckFormat::Json,
            Arc::new(EchoHandler),
        );
        let (encrypt, body) =
            delivery_body("<xml><MsgType>text</MsgType><Content>ping</Content></xml>");
        let signature = signature::compute_signature(TOKEN, "1700000000", "n1", Some(&encrypt));
        let params = params(&signature, "1700000000", "n1", None);

        let reply = match handler.deliver(&params, &body).unwrap() {
            Delivery::EncryptedReply(xml) => xml,
            other => panic!("Expected EncryptedReply, got {:?}", other),
        };

        let reply_encrypt = element_text(&reply, "Encrypt").unwrap();
        let reply_signature = element_text(&reply, "MsgSignature").unwrap();
        assert_eq!(element_text(&reply, "TimeStamp").as_deref(), Some("1700000000"));
        assert_eq!(element_text(&reply, "Nonce").as_deref(), Some("n1"));
        assert!(signature::verify(
            &credentials(),
            "1700000000",
            "n1",
            Some(&reply_encrypt),
            &reply_signature
        ));
        assert_eq!(envelope::decode(&reply_encrypt, &credentials()).unwrap(), "echo: ping");
    }

    #[test]
    fn test_deliver_plaintext_mode() {
        let signature = signature::compute_signature(TOKEN, "1700000000", "n1", None);
        let params = params(&signature, "1700000000", "n1", None);
        let body = r#"{"msgtype":"text","content":"hello","touser":"a","fromuser":"b"}"#;

        let delivery = handler(VerificationMode::Plaintext).deliver(&params, body).unwrap();

        assert_eq!(delivery, Delivery::Ack(AckFormat::Json));
    }

    #[test]
    fn test_collect_treats_empty_as_missing() {
        let params = params("", "1", "", None);

        match VerificationRequest::collect(&params, None) {
            Err(CallbackError::MissingField(fields)) => {
                assert_eq!(fields, vec!["msg_signature", "nonce"]);
            }
            other => panic!("Expected MissingField, got {:?}", other),
        }
    }
}
