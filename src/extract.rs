//! Body and attachment extraction from a parsed MIME tree.
//!
//! Every part is visited depth-first. Parts with an `attachment` disposition
//! are recorded as [`AttachmentMeta`]; other `text/plain` and `text/html`
//! parts replace the current body of their kind (last non-empty part wins).

use mailparse::{DispositionType, ParsedMail};

use crate::header::decode_header_str;
use crate::models::AttachmentMeta;

/// Result of walking one message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedContent {
    pub text: String,
    pub html: Option<String>,
    pub attachments: Vec<AttachmentMeta>,
}

impl ExtractedContent {
    pub fn has_attachments(&self) -> bool {
        !self.attachments.is_empty()
    }
}

pub fn extract_content(parsed: &ParsedMail<'_>) -> ExtractedContent {
    let mut out = ExtractedContent::default();
    walk(parsed, &mut out);
    out
}

fn walk(part: &ParsedMail<'_>, out: &mut ExtractedContent) {
    visit(part, out);
    for sub in &part.subparts {
        walk(sub, out);
    }
}

fn visit(part: &ParsedMail<'_>, out: &mut ExtractedContent) {
    let disposition = part.get_content_disposition();
    if disposition.disposition == DispositionType::Attachment {
        if let Some(filename) = attachment_filename(part, &disposition.params) {
            out.attachments.push(AttachmentMeta {
                filename,
                content_type: part.ctype.mimetype.clone(),
                size_bytes: part.get_body_raw().map(|b| b.len() as u64).unwrap_or(0),
            });
        }
        return;
    }

    match part.ctype.mimetype.as_str() {
        "text/plain" => {
            let body = body_text(part);
            if !body.is_empty() {
                out.text = body;
            }
        }
        "text/html" => {
            let body = body_text(part);
            if !body.is_empty() {
                out.html = Some(body);
            }
        }
        _ => {}
    }
}

fn attachment_filename(
    part: &ParsedMail<'_>,
    params: &std::collections::BTreeMap<String, String>,
) -> Option<String> {
    params
        .get("filename")
        .or_else(|| part.ctype.params.get("name"))
        .map(|name| decode_header_str(name))
        .filter(|name| !name.is_empty())
}

/// Decode with the declared charset, else fall back to lossy UTF-8.
fn body_text(part: &ParsedMail<'_>) -> String {
    match part.get_body() {
        Ok(body) => body,
        Err(_) => part
            .get_body_raw()
            .map(|raw| String::from_utf8_lossy(&raw).into_owned())
            .unwrap_or_default(),
    }
}
