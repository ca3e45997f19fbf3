//! Content extractor — decodes a message's MIME part tree into plain
//! text, HTML, and a short preview snippet.
//!
//! No transformation or sanitization is applied to the HTML; callers
//! treat it as opaque content for storage and classification only.

use base64::Engine;

use crate::mailbox::{FullMessage, MessagePart};

/// Extracted message content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedBody {
    pub html: Option<String>,
    pub text: Option<String>,
    pub snippet: String,
}

/// Walk the payload tree and pull out the HTML and plain-text bodies.
///
/// A `text/html` leaf populates `html`, a `text/plain` leaf populates
/// `text`; the first of each wins. The snippet comes from the source
/// and defaults to the empty string.
pub fn extract_body(message: &FullMessage) -> ExtractedBody {
    let mut out = ExtractedBody {
        snippet: message.snippet.clone(),
        ..Default::default()
    };

    if let Some(ref payload) = message.payload {
        walk(payload, &mut out);
    }

    out
}

fn walk(part: &MessagePart, out: &mut ExtractedBody) {
    if let Some(ref data) = part.body_data {
        match part.mime_type.as_str() {
            "text/html" if out.html.is_none() => out.html = decode_body(data),
            "text/plain" if out.text.is_none() => out.text = decode_body(data),
            _ => {}
        }
    }
    for child in &part.parts {
        walk(child, out);
    }
}

/// Decode URL-safe base64 without padding (the mailbox API wire
/// format), falling back to the standard alphabet for padded
/// producers.
fn decode_body(data: &str) -> Option<String> {
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(data)
        .or_else(|_| base64::engine::general_purpose::STANDARD.decode(data))
        .ok()?;
    String::from_utf8(bytes).ok()
}
