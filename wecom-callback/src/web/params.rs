//! Extraction of the signed fields from a callback request.

use serde_json::Value;

use crate::xml::element_text;

/// Query parameters of a callback request, percent-decoded.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CallbackParams {
    /// `msg_signature`, or the legacy `signature` when that is absent
    pub signature: Option<String>,
    pub timestamp: Option<String>,
    pub nonce: Option<String>,
    pub echostr: Option<String>,
}

impl CallbackParams {
    /// Parse a raw query string.
    ///
    /// A literal `+` is kept as `+`: every signed field is digits, hex or
    /// base64, so form-style `+` → space decoding would only corrupt base64.
    pub fn from_query(raw: Option<&str>) -> Self {
        let raw = raw.unwrap_or_default().replace('+', "%2B");

        let mut params = Self::default();
        let mut legacy_signature = None;

        for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
            let value = Some(value.into_owned());
            match key.as_ref() {
                "msg_signature" => params.signature = value,
                "signature" => legacy_signature = value,
                "timestamp" => params.timestamp = value,
                "nonce" => params.nonce = value,
                "echostr" => params.echostr = value,
                _ => {}
            }
        }

        if params.signature.is_none() {
            params.signature = legacy_signature;
        }

        params
    }
}

/// Pull the `Encrypt` ciphertext out of a delivery body.
///
/// The platform posts `<xml><Encrypt><![CDATA[..]]></Encrypt>..</xml>`; a JSON
/// object with `Encrypt` (or `encrypt`) is accepted as well.
pub fn extract_encrypt(body: &str) -> Option<String> {
    let body = body.trim();

    let encrypt = if body.starts_with('{') {
        let value: Value = serde_json::from_str(body).ok()?;
        value
            .get("Encrypt")
            .or_else(|| value.get("encrypt"))
            .and_then(Value::as_str)
            .map(str::to_string)
    } else {
        element_text(body, "Encrypt")
    };

    encrypt.filter(|s| !s.is_empty())
}
