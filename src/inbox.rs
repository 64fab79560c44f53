//! Stored incoming emails.
//!
//! Insertion is at-most-once per `message_id`: the unique constraint turns a
//! second insert of the same identifier into [`InsertOutcome::Duplicate`].
//! After that, rows only change through status transitions.
//! Used by the `crm-inbox emails` commands and the `/emails` HTTP routes.

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::config::Config;
use crate::db::{self, escape_like};
use crate::models::{Address, AttachmentMeta, EmailStatus, IncomingEmail, IncomingMessage};
use crate::resolve::Relations;

/// Result of storing one parsed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(String),
    Duplicate,
}

pub async fn exists(pool: &SqlitePool, message_id: &str) -> Result<bool> {
    let found: Option<String> =
        sqlx::query_scalar("SELECT id FROM incoming_emails WHERE message_id = ?")
            .bind(message_id)
            .fetch_optional(pool)
            .await?;
    Ok(found.is_some())
}

/// Store `message` with its resolved directory links, unless already present.
pub async fn insert_message(
    pool: &SqlitePool,
    message: &IncomingMessage,
    relations: &Relations,
) -> Result<InsertOutcome> {
    let id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().timestamp();

    let result = sqlx::query(
        r#"
        INSERT INTO incoming_emails (
            id, message_id, subject, body_text, body_html, sender_email, sender_name,
            recipients_json, cc_json, received_at, has_attachments, attachments_json,
            raw_headers_json, company_id, contact_id, status, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(message_id) DO NOTHING
        "#,
    )
    .bind(&id)
    .bind(&message.message_id)
    .bind(&message.subject)
    .bind(&message.body_text)
    .bind(&message.body_html)
    .bind(&message.sender.email)
    .bind(&message.sender.name)
    .bind(serde_json::to_string(&message.recipients)?)
    .bind(serde_json::to_string(&message.cc)?)
    .bind(message.received_at.timestamp())
    .bind(message.has_attachments())
    .bind(serde_json::to_string(&message.attachments)?)
    .bind(serde_json::to_string(&message.raw_headers)?)
    .bind(relations.company.as_ref().map(|c| c.id.as_str()))
    .bind(relations.contact.as_ref().map(|c| c.id.as_str()))
    .bind(EmailStatus::Unread.as_str())
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        Ok(InsertOutcome::Duplicate)
    } else {
        Ok(InsertOutcome::Inserted(id))
    }
}

/// Filters for [`list_emails`].
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub status: Option<EmailStatus>,
    pub search: Option<String>,
    pub limit: Option<i64>,
}

/// API/CLI view of a stored email, with directory names joined in.
#[derive(Debug, Clone, Serialize)]
pub struct EmailResponse {
    pub id: String,
    pub message_id: String,
    pub subject: String,
    pub content: String,
    pub content_html: Option<String>,
    pub sender_email: String,
    pub sender_name: String,
    pub sender_display: String,
    pub recipients: Vec<Address>,
    pub recipients_count: usize,
    pub cc: Vec<Address>,
    pub company: Option<String>,
    pub company_name: Option<String>,
    pub contact: Option<String>,
    pub contact_name: Option<String>,
    pub status: EmailStatus,
    pub received_at: String, // ISO8601
    pub created_at: String,  // ISO8601
    pub updated_at: String,  // ISO8601
    pub has_attachments: bool,
    pub attachments: Vec<AttachmentMeta>,
}

const SELECT_EMAIL: &str = r#"
    SELECT e.id, e.message_id, e.subject, e.body_text, e.body_html, e.sender_email,
           e.sender_name, e.recipients_json, e.cc_json, e.received_at, e.has_attachments,
           e.attachments_json, e.raw_headers_json, e.company_id, e.contact_id, e.status,
           e.created_at, e.updated_at,
           co.name AS company_name,
           TRIM(ct.first_name || ' ' || ct.last_name) AS contact_name
    FROM incoming_emails e
    LEFT JOIN companies co ON co.id = e.company_id
    LEFT JOIN contacts ct ON ct.id = e.contact_id
"#;

fn decode_column<T: DeserializeOwned>(json: &str, column: &str) -> Result<T> {
    serde_json::from_str(json).with_context(|| format!("corrupt {} column", column))
}

fn email_from_row(row: &SqliteRow) -> Result<IncomingEmail> {
    let recipients_json: String = row.get("recipients_json");
    let cc_json: String = row.get("cc_json");
    let attachments_json: String = row.get("attachments_json");
    let raw_headers_json: String = row.get("raw_headers_json");
    let status: String = row.get("status");

    Ok(IncomingEmail {
        id: row.get("id"),
        message_id: row.get("message_id"),
        subject: row.get("subject"),
        body_text: row.get("body_text"),
        body_html: row.get("body_html"),
        sender_email: row.get("sender_email"),
        sender_name: row.get("sender_name"),
        recipients: decode_column(&recipients_json, "recipients_json")?,
        cc: decode_column(&cc_json, "cc_json")?,
        received_at: row.get("received_at"),
        has_attachments: row.get("has_attachments"),
        attachments: decode_column(&attachments_json, "attachments_json")?,
        raw_headers: decode_column(&raw_headers_json, "raw_headers_json")?,
        company_id: row.get("company_id"),
        contact_id: row.get("contact_id"),
        status: status.parse()?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn response_from_row(row: &SqliteRow) -> Result<EmailResponse> {
    let email = email_from_row(row)?;
    let company_name: Option<String> = row.get("company_name");
    let contact_name: Option<String> = row.get("contact_name");

    let sender_display = if email.sender_name.is_empty() {
        email.sender_email.clone()
    } else {
        format!("{} <{}>", email.sender_name, email.sender_email)
    };

    Ok(EmailResponse {
        sender_display,
        recipients_count: email.recipients.len(),
        company_name,
        contact_name,
        id: email.id,
        message_id: email.message_id,
        subject: email.subject,
        content: email.body_text,
        content_html: email.body_html,
        sender_email: email.sender_email,
        sender_name: email.sender_name,
        recipients: email.recipients,
        cc: email.cc,
        company: email.company_id,
        contact: email.contact_id,
        status: email.status,
        received_at: format_ts_iso(email.received_at),
        created_at: format_ts_iso(email.created_at),
        updated_at: format_ts_iso(email.updated_at),
        has_attachments: email.has_attachments,
        attachments: email.attachments,
    })
}

pub async fn get_email(pool: &SqlitePool, id: &str) -> Result<EmailResponse> {
    let row = sqlx::query(&format!("{} WHERE e.id = ?", SELECT_EMAIL))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(row) => response_from_row(&row),
        None => bail!("email not found: {}", id),
    }
}

/// Stored row for `message_id`, if any.
pub async fn get_by_message_id(pool: &SqlitePool, message_id: &str) -> Result<Option<IncomingEmail>> {
    let row = sqlx::query(&format!("{} WHERE e.message_id = ?", SELECT_EMAIL))
        .bind(message_id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(email_from_row).transpose()
}

/// Newest first. `search` matches subject, sender and body, ignoring ASCII case.
pub async fn list_emails(pool: &SqlitePool, filter: &ListFilter) -> Result<Vec<EmailResponse>> {
    let mut sql = format!("{} WHERE 1 = 1", SELECT_EMAIL);
    if filter.status.is_some() {
        sql.push_str(" AND e.status = ?");
    }
    let search = filter
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    if search.is_some() {
        sql.push_str(
            " AND (e.subject LIKE ? ESCAPE '\\' OR e.sender_email LIKE ? ESCAPE '\\' \
             OR e.sender_name LIKE ? ESCAPE '\\' OR e.body_text LIKE ? ESCAPE '\\')",
        );
    }
    sql.push_str(" ORDER BY e.received_at DESC, e.created_at DESC");
    if filter.limit.is_some() {
        sql.push_str(" LIMIT ?");
    }

    let mut query = sqlx::query(&sql);
    if let Some(status) = filter.status {
        query = query.bind(status.as_str());
    }
    if let Some(term) = search {
        let pattern = format!("%{}%", escape_like(term));
        for _ in 0..4 {
            query = query.bind(pattern.clone());
        }
    }
    if let Some(limit) = filter.limit {
        query = query.bind(limit);
    }

    let rows = query.fetch_all(pool).await?;
    rows.iter().map(response_from_row).collect()
}

/// Move an email to `status`. Errors if the id is unknown.
pub async fn set_status(pool: &SqlitePool, id: &str, status: EmailStatus) -> Result<()> {
    let now = chrono::Utc::now().timestamp();
    let result = sqlx::query("UPDATE incoming_emails SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        bail!("email not found: {}", id);
    }
    Ok(())
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| ts.to_string())
}

// ============ CLI entry points ============

pub async fn run_list(config: &Config, filter: &ListFilter) -> Result<()> {
    let pool = db::connect(config).await?;
    let emails = list_emails(&pool, filter).await?;
    pool.close().await;

    if emails.is_empty() {
        println!("No emails.");
        return Ok(());
    }

    for email in &emails {
        let subject = if email.subject.is_empty() {
            "(no subject)"
        } else {
            email.subject.as_str()
        };
        println!(
            "{}  [{}]  {}  {}",
            email.id, email.status, email.received_at, subject
        );
        println!("    from: {}", email.sender_display);
        if let Some(ref company) = email.company_name {
            println!("    company: {}", company);
        }
    }
    println!("{} emails", emails.len());
    Ok(())
}

pub async fn run_get(config: &Config, id: &str) -> Result<()> {
    let pool = db::connect(config).await?;
    let email = get_email(&pool, id).await;
    pool.close().await;
    let email = email?;

    println!("--- Email ---");
    println!("id:          {}", email.id);
    println!("message_id:  {}", email.message_id);
    println!("subject:     {}", email.subject);
    println!("from:        {}", email.sender_display);
    let to: Vec<&str> = email.recipients.iter().map(|a| a.email.as_str()).collect();
    println!("to:          {}", to.join(", "));
    if !email.cc.is_empty() {
        let cc: Vec<&str> = email.cc.iter().map(|a| a.email.as_str()).collect();
        println!("cc:          {}", cc.join(", "));
    }
    println!("received_at: {}", email.received_at);
    println!("status:      {}", email.status);
    if let Some(ref company) = email.company_name {
        println!("company:     {}", company);
    }
    if let Some(ref contact) = email.contact_name {
        println!("contact:     {}", contact);
    }
    for att in &email.attachments {
        println!(
            "attachment:  {} ({}, {} bytes)",
            att.filename, att.content_type, att.size_bytes
        );
    }
    println!();

    println!("--- Body ---");
    println!("{}", email.content);
    Ok(())
}

pub async fn run_mark(config: &Config, id: &str, status: EmailStatus) -> Result<()> {
    let pool = db::connect(config).await?;
    let result = set_status(&pool, id, status).await;
    pool.close().await;
    result?;
    println!("email {} marked {}", id, status);
    Ok(())
}
