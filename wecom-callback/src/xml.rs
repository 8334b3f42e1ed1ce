//! Minimal helpers for the flat XML documents the platform exchanges.
//!
//! Callback bodies and decrypted messages are a single `<xml>` root with one
//! level of child elements, optionally wrapped in CDATA. That is all this
//! module understands.

const CDATA_OPEN: &str = "<![CDATA[";
const CDATA_CLOSE: &str = "]]>";

/// Text of the first `<tag>…</tag>` element, with CDATA unwrapped and the
/// five predefined entities decoded.
pub fn element_text(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);

    let start = xml.find(&open)? + open.len();
    let end = start + xml[start..].find(&close)?;
    let inner = xml[start..end].trim();

    match inner
        .strip_prefix(CDATA_OPEN)
        .and_then(|s| s.strip_suffix(CDATA_CLOSE))
    {
        Some(raw) => Some(raw.to_string()),
        None => Some(unescape(inner)),
    }
}

/// Wrap a value in a CDATA section, splitting any embedded `]]>`.
pub fn cdata(value: &str) -> String {
    format!(
        "{}{}{}",
        CDATA_OPEN,
        value.replace(CDATA_CLOSE, "]]]]><![CDATA[>"),
        CDATA_CLOSE
    )
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
