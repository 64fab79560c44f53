//! Address field parsing for `From`, `To` and `Cc`.
//!
//! Deliberately lenient: an angle-bracketed address is taken as the email and
//! everything around it as the display name; anything else is taken whole as
//! the email.

use crate::header::decode_header_str;
use crate::models::Address;

/// Parse a single address such as `"Jane Doe" <jane@co.com>`.
pub fn parse_address(raw: &str) -> Address {
    let raw = raw.trim();
    if raw.is_empty() {
        return Address::default();
    }

    if let Some(open) = raw.find('<') {
        if let Some(len) = raw[open + 1..].find('>') {
            let close = open + 1 + len;
            let email = raw[open + 1..close].trim().to_string();
            let outside = format!("{} {}", &raw[..open], &raw[close + 1..]);
            let name = outside.trim().trim_matches('"').trim();
            return Address {
                email,
                name: decode_header_str(name),
            };
        }
    }

    Address {
        email: raw.to_string(),
        name: String::new(),
    }
}

/// Parse a list-valued field. Segments without an email are dropped.
pub fn parse_address_list(raw: &str) -> Vec<Address> {
    split_top_level(raw)
        .into_iter()
        .map(parse_address)
        .filter(|addr| !addr.email.is_empty())
        .collect()
}

/// Split on commas that are outside quotes and angle brackets.
fn split_top_level(raw: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut in_quotes = false;
    let mut escaped = false;
    let mut depth = 0usize;
    let mut start = 0;

    for (i, c) in raw.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            '<' if !in_quotes => depth += 1,
            '>' if !in_quotes => depth = depth.saturating_sub(1),
            ',' if !in_quotes && depth == 0 => {
                segments.push(&raw[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    segments.push(&raw[start..]);
    segments
}
