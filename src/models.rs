//! Core data models used throughout crm-inbox.
//!
//! [`IncomingMessage`] is what the parser builds from one fetched message;
//! [`IncomingEmail`] is the row it becomes once stored. [`Company`] and
//! [`Contact`] are the directory entries the resolver links to.

use anyhow::bail;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A mailbox address as it appears in `From`, `To` or `Cc`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub email: String,
    pub name: String,
}

/// Bookkeeping for one attachment part. Payload bytes are not kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentMeta {
    pub filename: String,
    pub content_type: String,
    pub size_bytes: u64,
}

/// A fetched message after parsing, before persistence.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub message_id: String,
    pub subject: String,
    pub body_text: String,
    pub body_html: Option<String>,
    pub sender: Address,
    pub recipients: Vec<Address>,
    pub cc: Vec<Address>,
    pub received_at: DateTime<Utc>,
    pub attachments: Vec<AttachmentMeta>,
    pub raw_headers: BTreeMap<String, String>,
}

impl IncomingMessage {
    pub fn has_attachments(&self) -> bool {
        !self.attachments.is_empty()
    }
}

/// Read state of a stored email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailStatus {
    Unread,
    Read,
    Archived,
}

impl EmailStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailStatus::Unread => "unread",
            EmailStatus::Read => "read",
            EmailStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for EmailStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmailStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unread" => Ok(EmailStatus::Unread),
            "read" => Ok(EmailStatus::Read),
            "archived" => Ok(EmailStatus::Archived),
            other => bail!(
                "invalid status: '{}'. Must be unread, read, or archived.",
                other
            ),
        }
    }
}

/// Company directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Company {
    pub id: String,
    pub name: String,
    pub website_url: Option<String>,
    pub email: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Contact directory entry, optionally attached to a company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Contact {
    pub id: String,
    pub company_id: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Contact {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// A stored incoming email row.
#[derive(Debug, Clone)]
pub struct IncomingEmail {
    pub id: String,
    pub message_id: String,
    pub subject: String,
    pub body_text: String,
    pub body_html: Option<String>,
    pub sender_email: String,
    pub sender_name: String,
    pub recipients: Vec<Address>,
    pub cc: Vec<Address>,
    pub received_at: i64,
    pub has_attachments: bool,
    pub attachments: Vec<AttachmentMeta>,
    pub raw_headers: BTreeMap<String, String>,
    pub company_id: Option<String>,
    pub contact_id: Option<String>,
    pub status: EmailStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [EmailStatus::Unread, EmailStatus::Read, EmailStatus::Archived] {
            assert_eq!(status.as_str().parse::<EmailStatus>().unwrap(), status);
        }
        assert_eq!(" READ ".parse::<EmailStatus>().unwrap(), EmailStatus::Read);
        assert!("deleted".parse::<EmailStatus>().is_err());
    }

    #[test]
    fn test_contact_full_name() {
        let contact = Contact {
            id: "c1".into(),
            company_id: None,
            first_name: "Jane".into(),
            last_name: "".into(),
            email: None,
            created_at: 0,
            updated_at: 0,
        };
        assert_eq!(contact.full_name(), "Jane");
    }
}
