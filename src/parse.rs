//! Raw RFC 5322 bytes → [`IncomingMessage`].

use chrono::{DateTime, TimeZone, Utc};
use mailparse::{MailHeaderMap, ParsedMail};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

use crate::address::{parse_address, parse_address_list};
use crate::extract::extract_content;
use crate::header::decode_header;
use crate::models::IncomingMessage;

/// Why a fetched message could not be turned into an [`IncomingMessage`].
#[derive(Debug)]
pub enum ParseError {
    Mime(String),
    NoHeaders,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Mime(e) => write!(f, "malformed MIME message: {}", e),
            ParseError::NoHeaders => write!(f, "message has no valid header fields"),
        }
    }
}

impl std::error::Error for ParseError {}

/// Parse one message. `received_fallback` is used when `Date` is missing or unreadable.
pub fn parse_message(
    raw: &[u8],
    received_fallback: DateTime<Utc>,
) -> Result<IncomingMessage, ParseError> {
    let parsed = mailparse::parse_mail(raw).map_err(|e| ParseError::Mime(e.to_string()))?;
    if !parsed
        .headers
        .iter()
        .any(|header| is_field_name(&header.get_key()))
    {
        return Err(ParseError::NoHeaders);
    }

    let headers = parsed.headers.as_slice();
    let subject = raw_header(&parsed, "Subject")
        .map(decode_header)
        .unwrap_or_default();
    let sender = raw_header(&parsed, "From")
        .map(|v| parse_address(&String::from_utf8_lossy(v)))
        .unwrap_or_default();
    let recipients = raw_header(&parsed, "To")
        .map(|v| parse_address_list(&String::from_utf8_lossy(v)))
        .unwrap_or_default();
    let cc = raw_header(&parsed, "Cc")
        .map(|v| parse_address_list(&String::from_utf8_lossy(v)))
        .unwrap_or_default();

    let received_at = headers
        .get_first_value("Date")
        .and_then(|value| mailparse::dateparse(&value).ok())
        .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
        .unwrap_or(received_fallback);

    let message_id = headers
        .get_first_value("Message-ID")
        .map(|value| normalize_message_id(&value))
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| synthetic_message_id(raw));

    let content = extract_content(&parsed);

    let mut raw_headers = BTreeMap::new();
    for header in headers {
        raw_headers.insert(header.get_key(), decode_header(header.get_value_raw()));
    }

    Ok(IncomingMessage {
        message_id,
        subject,
        body_text: content.text,
        body_html: content.html,
        sender,
        recipients,
        cc,
        received_at,
        attachments: content.attachments,
        raw_headers,
    })
}

fn raw_header<'a>(parsed: &'a ParsedMail<'_>, key: &str) -> Option<&'a [u8]> {
    parsed
        .headers
        .get_first_header(key)
        .map(|header| header.get_value_raw())
}

/// RFC 5322 field name: printable ASCII without spaces or colons.
fn is_field_name(key: &str) -> bool {
    !key.is_empty() && key.bytes().all(|b| (33..=126).contains(&b) && b != b':')
}

/// Strip whitespace and the surrounding angle brackets.
pub fn normalize_message_id(value: &str) -> String {
    value
        .trim()
        .trim_start_matches('<')
        .trim_end_matches('>')
        .trim()
        .to_string()
}

/// Stable identifier for messages that lack a `Message-ID`.
fn synthetic_message_id(raw: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw);
    format!("sha256:{:x}", hasher.finalize())
}
