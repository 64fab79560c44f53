//! Header value decoding.
//!
//! Turns RFC 2047 encoded-word sequences (`=?utf-8?B?...?=`) into plain text.
//! Decoding is total: whatever bytes come in, a string comes out. Words in a
//! charset the MIME parser does not recognise are decoded as lossy UTF-8.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;

/// Base64 engine that accepts encoded words with or without padding.
const LENIENT_B64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decode a raw header value into trimmed plain text. Never fails.
pub fn decode_header(raw: &[u8]) -> String {
    let unfolded = unfold(raw);
    if unfolded.iter().all(u8::is_ascii_whitespace) {
        return String::new();
    }

    // mailparse only decodes a full "Key: value" line
    let mut line = b"X-Decode: ".to_vec();
    line.extend_from_slice(&unfolded);
    line.extend_from_slice(b"\r\n");

    let decoded = match mailparse::parse_header(&line) {
        Ok((header, _)) => header.get_value(),
        Err(_) => String::from_utf8_lossy(&unfolded).into_owned(),
    };

    decode_leftover_words(&decoded).trim().to_string()
}

/// [`decode_header`] for values that are already strings.
pub fn decode_header_str(raw: &str) -> String {
    decode_header(raw.as_bytes())
}

/// Remove CR/LF line breaks. A break not followed by whitespace becomes a space.
fn unfold(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        match raw[i] {
            b'\r' => {}
            b'\n' => {
                let next = raw.get(i + 1).copied();
                if !matches!(next, Some(b' ') | Some(b'\t')) {
                    out.push(b' ');
                }
            }
            b => out.push(b),
        }
        i += 1;
    }
    out
}

/// Decode encoded words the MIME parser left untouched.
fn decode_leftover_words(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("=?") {
        out.push_str(&rest[..start]);
        let candidate = &rest[start + 2..];
        match decode_encoded_word(candidate) {
            Some((decoded, consumed)) => {
                out.push_str(&decoded);
                rest = &candidate[consumed..];
            }
            None => {
                out.push_str("=?");
                rest = candidate;
            }
        }
    }
    out.push_str(rest);
    out
}

/// `word` starts right after `=?`. Returns the text and the bytes consumed
/// through the closing `?=`.
fn decode_encoded_word(word: &str) -> Option<(String, usize)> {
    let mut parts = word.splitn(3, '?');
    let charset = parts.next()?;
    let encoding = parts.next()?;
    let tail = parts.next()?;
    let end = tail.find("?=")?;
    let payload = &tail[..end];

    if charset.is_empty() || charset.contains(char::is_whitespace) {
        return None;
    }
    if payload.contains(char::is_whitespace) {
        return None;
    }

    let bytes = match encoding {
        "B" | "b" => LENIENT_B64.decode(payload).ok()?,
        "Q" | "q" => decode_q(payload),
        _ => return None,
    };

    let consumed = charset.len() + 1 + encoding.len() + 1 + end + 2;
    Some((String::from_utf8_lossy(&bytes).into_owned(), consumed))
}

fn decode_q(payload: &str) -> Vec<u8> {
    let bytes = payload.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => out.push(b' '),
            b'=' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(b) => {
                        out.push(b);
                        i += 2;
                    }
                    None => out.push(b'='),
                }
            }
            b => out.push(b),
        }
        i += 1;
    }
    out
}
