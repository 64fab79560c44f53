//! Shared fixtures: an in-memory mailbox and a migrated scratch database.

#![allow(dead_code)]

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use crm_inbox::config::{Config, ImapConfig};
use crm_inbox::mailbox::{MailboxConnector, MailboxSession};
use crm_inbox::{db, migrate};
use sqlx::SqlitePool;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// What the mailbox saw during a run.
#[derive(Debug, Default, Clone)]
pub struct MailboxLog {
    pub connects: usize,
    pub selected: Vec<String>,
    pub fetched: Vec<u32>,
    pub closed: bool,
    pub logged_out: bool,
}

/// A mailbox with one folder, `INBOX`.
///
/// Message `i` of `messages` has sequence number `i + 1`. A `None` slot fails
/// when fetched.
#[derive(Clone)]
pub struct MemoryMailbox {
    messages: Arc<Vec<Option<Vec<u8>>>>,
    refuse_login: bool,
    log: Arc<Mutex<MailboxLog>>,
}

impl MemoryMailbox {
    pub fn new(messages: Vec<Vec<u8>>) -> Self {
        Self::with_slots(messages.into_iter().map(Some).collect())
    }

    pub fn with_slots(messages: Vec<Option<Vec<u8>>>) -> Self {
        Self {
            messages: Arc::new(messages),
            refuse_login: false,
            log: Arc::new(Mutex::new(MailboxLog::default())),
        }
    }

    pub fn refusing_login() -> Self {
        Self {
            refuse_login: true,
            ..Self::new(Vec::new())
        }
    }

    pub fn log(&self) -> MailboxLog {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailboxConnector for MemoryMailbox {
    async fn connect(&self, _config: &ImapConfig) -> Result<Box<dyn MailboxSession>> {
        self.log.lock().unwrap().connects += 1;
        if self.refuse_login {
            bail!("authentication failed");
        }
        Ok(Box::new(MemorySession {
            mailbox: self.clone(),
            selected: false,
        }))
    }
}

struct MemorySession {
    mailbox: MemoryMailbox,
    selected: bool,
}

#[async_trait]
impl MailboxSession for MemorySession {
    async fn select(&mut self, folder: &str) -> Result<()> {
        self.mailbox
            .log
            .lock()
            .unwrap()
            .selected
            .push(folder.to_string());
        if folder != "INBOX" {
            bail!("no such folder: {}", folder);
        }
        self.selected = true;
        Ok(())
    }

    async fn search_all(&mut self) -> Result<Vec<u32>> {
        if !self.selected {
            bail!("no folder selected");
        }
        Ok((1..=self.mailbox.messages.len() as u32).collect())
    }

    async fn fetch(&mut self, seq: u32) -> Result<Option<Vec<u8>>> {
        self.mailbox.log.lock().unwrap().fetched.push(seq);
        let slot = self
            .mailbox
            .messages
            .get(seq as usize - 1)
            .ok_or_else(|| anyhow!("no message {}", seq))?;
        match slot {
            Some(raw) => Ok(Some(raw.clone())),
            None => Err(anyhow!("connection reset while fetching {}", seq)),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.mailbox.log.lock().unwrap().closed = true;
        if !self.selected {
            bail!("no folder selected");
        }
        Ok(())
    }

    async fn logout(&mut self) -> Result<()> {
        self.mailbox.log.lock().unwrap().logged_out = true;
        Ok(())
    }
}

pub async fn test_pool() -> (TempDir, Config, SqlitePool) {
    let tmp = TempDir::new().unwrap();
    let config = Config::with_db(tmp.path().join("data").join("crm.sqlite"));
    let pool = db::connect(&config).await.unwrap();
    migrate::apply(&pool).await.unwrap();
    (tmp, config, pool)
}

pub fn imap_config() -> ImapConfig {
    ImapConfig {
        server: "imap.example.com".into(),
        port: None,
        username: "crm@example.com".into(),
        password: "secret".into(),
        use_ssl: true,
    }
}

/// A minimal plain-text message. `day` is the day of July 2024.
pub fn raw_message(message_id: &str, from: &str, subject: &str, day: u32, body: &str) -> Vec<u8> {
    let weekday = NaiveDate::from_ymd_opt(2024, 7, day).unwrap().weekday();
    format!(
        "Message-ID: <{}>\r\n\
         From: {}\r\n\
         To: sales@crm.test\r\n\
         Subject: {}\r\n\
         Date: {}, {:02} Jul 2024 10:00:00 +0000\r\n\
         Content-Type: text/plain; charset=utf-8\r\n\
         \r\n\
         {}\r\n",
        message_id, from, subject, weekday, day, body
    )
    .into_bytes()
}
