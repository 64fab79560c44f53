//! Ingestion pipeline orchestration.
//!
//! One run: connect → select folder → search → fetch the newest `limit`
//! messages newest-first → parse → resolve sender → store. Messages are
//! handled strictly one at a time. A failure on one message is recorded as
//! its [`MessageOutcome`] and the batch moves on; only connection-level
//! failures end the run early. The session is always closed and logged out
//! at the end, and teardown errors are only logged.

use anyhow::{anyhow, bail, Result};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{Config, ImapConfig};
use crate::db;
use crate::inbox::{self, InsertOutcome};
use crate::mailbox::{ImapConnector, MailboxConnector, MailboxSession};
use crate::migrate;
use crate::parse::parse_message;
use crate::resolve::{resolve_relations, Relations};

/// What happened to one message of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    Saved {
        seq: u32,
        message_id: String,
        email_id: String,
    },
    Duplicate {
        seq: u32,
        message_id: String,
    },
    FetchFailed {
        seq: u32,
        reason: String,
    },
    ParseFailed {
        seq: u32,
        reason: String,
    },
    PersistFailed {
        seq: u32,
        message_id: String,
        reason: String,
    },
}

/// Aggregate result of one ingestion run.
///
/// `fetched` counts messages whose bytes came back from the server, parse
/// failures included. `saved` counts newly inserted rows.
#[derive(Debug, Clone)]
pub struct FetchReport {
    pub success: bool,
    pub message: String,
    pub fetched: usize,
    pub saved: usize,
    pub outcomes: Vec<MessageOutcome>,
}

impl FetchReport {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            fetched: 0,
            saved: 0,
            outcomes: Vec::new(),
        }
    }

    fn empty() -> Self {
        Self {
            success: true,
            message: String::new(),
            fetched: 0,
            saved: 0,
            outcomes: Vec::new(),
        }
    }

    pub fn duplicates(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, MessageOutcome::Duplicate { .. }))
            .count()
    }

    pub fn failures(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| {
                matches!(
                    o,
                    MessageOutcome::FetchFailed { .. }
                        | MessageOutcome::ParseFailed { .. }
                        | MessageOutcome::PersistFailed { .. }
                )
            })
            .count()
    }
}

/// The ingestion service. Holds no mutable state; construct once and share.
#[derive(Clone)]
pub struct Ingestor {
    pool: SqlitePool,
    connector: Arc<dyn MailboxConnector>,
}

impl Ingestor {
    pub fn new(pool: SqlitePool, connector: Arc<dyn MailboxConnector>) -> Self {
        Self { pool, connector }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Run one batch against `folder`, storing at most the newest `limit` messages.
    pub async fn fetch(&self, imap: &ImapConfig, folder: &str, limit: usize) -> FetchReport {
        let missing = imap.missing_fields();
        if !missing.is_empty() {
            return FetchReport::failure(format!(
                "IMAP configuration incomplete, missing: {}",
                missing.join(", ")
            ));
        }

        info!(server = %imap.server, port = imap.effective_port(), "connecting to mailbox");
        let mut session = match self.connector.connect(imap).await {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %format!("{:#}", e), "mailbox connection failed");
                return FetchReport::failure(format!("IMAP connection failed: {:#}", e));
            }
        };

        let mut report = FetchReport::empty();
        let result = self
            .run_batch(session.as_mut(), folder, limit, &mut report)
            .await;
        teardown(session.as_mut()).await;

        match result {
            Ok(()) => {
                report.message = format!(
                    "{} emails fetched, {} new emails saved",
                    report.fetched, report.saved
                );
                info!(
                    fetched = report.fetched,
                    saved = report.saved,
                    duplicates = report.duplicates(),
                    failed = report.failures(),
                    "fetch complete"
                );
            }
            Err(e) => {
                warn!(error = %format!("{:#}", e), "fetch aborted");
                report.success = false;
                report.message = format!("IMAP error: {:#}", e);
            }
        }
        report
    }

    async fn run_batch(
        &self,
        session: &mut dyn MailboxSession,
        folder: &str,
        limit: usize,
        report: &mut FetchReport,
    ) -> Result<()> {
        session.select(folder).await?;
        let seqs = session.search_all().await?;
        let selected = newest_first(&seqs, limit);
        info!(
            folder,
            available = seqs.len(),
            selected = selected.len(),
            "folder selected"
        );

        for seq in selected {
            let outcome = self.process_one(session, seq).await;
            match &outcome {
                MessageOutcome::Saved {
                    message_id,
                    email_id,
                    ..
                } => {
                    report.fetched += 1;
                    report.saved += 1;
                    info!(seq, message_id = %message_id, email_id = %email_id, "saved email");
                }
                MessageOutcome::Duplicate { message_id, .. } => {
                    report.fetched += 1;
                    debug!(seq, message_id = %message_id, "already stored, skipped");
                }
                MessageOutcome::ParseFailed { reason, .. } => {
                    report.fetched += 1;
                    warn!(seq, reason = %reason, "could not parse message, skipped");
                }
                MessageOutcome::PersistFailed {
                    message_id, reason, ..
                } => {
                    report.fetched += 1;
                    warn!(seq, message_id = %message_id, reason = %reason, "could not store message, skipped");
                }
                MessageOutcome::FetchFailed { reason, .. } => {
                    warn!(seq, reason = %reason, "could not fetch message, skipped");
                }
            }
            report.outcomes.push(outcome);
        }
        Ok(())
    }

    async fn process_one(&self, session: &mut dyn MailboxSession, seq: u32) -> MessageOutcome {
        let raw = match session.fetch(seq).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                return MessageOutcome::FetchFailed {
                    seq,
                    reason: "server returned no message body".to_string(),
                }
            }
            Err(e) => {
                return MessageOutcome::FetchFailed {
                    seq,
                    reason: format!("{:#}", e),
                }
            }
        };

        let message = match parse_message(&raw, chrono::Utc::now()) {
            Ok(message) => message,
            Err(e) => {
                return MessageOutcome::ParseFailed {
                    seq,
                    reason: e.to_string(),
                }
            }
        };
        let message_id = message.message_id.clone();

        match inbox::exists(&self.pool, &message_id).await {
            Ok(true) => return MessageOutcome::Duplicate { seq, message_id },
            Ok(false) => {}
            Err(e) => {
                return MessageOutcome::PersistFailed {
                    seq,
                    message_id,
                    reason: format!("{:#}", e),
                }
            }
        }

        let relations = match resolve_relations(&self.pool, &message.sender.email).await {
            Ok(relations) => relations,
            Err(e) => {
                warn!(seq, error = %format!("{:#}", e), "sender resolution failed, storing unlinked");
                Relations::default()
            }
        };

        match inbox::insert_message(&self.pool, &message, &relations).await {
            Ok(InsertOutcome::Inserted(email_id)) => MessageOutcome::Saved {
                seq,
                message_id,
                email_id,
            },
            Ok(InsertOutcome::Duplicate) => MessageOutcome::Duplicate { seq, message_id },
            Err(e) => MessageOutcome::PersistFailed {
                seq,
                message_id,
                reason: format!("{:#}", e),
            },
        }
    }
}

/// The last `limit` sequence numbers of an ascending list, highest first.
fn newest_first(seqs: &[u32], limit: usize) -> Vec<u32> {
    let start = seqs.len().saturating_sub(limit);
    seqs[start..].iter().rev().copied().collect()
}

/// Close and log out, logging failures at debug level only.
pub(crate) async fn teardown(session: &mut dyn MailboxSession) {
    if let Err(e) = session.close().await {
        debug!(error = %format!("{:#}", e), "closing folder failed");
    }
    if let Err(e) = session.logout().await {
        debug!(error = %format!("{:#}", e), "logout failed");
    }
}

/// Checks that `[imap]` is present and complete.
pub fn require_imap(config: &Config) -> Result<&ImapConfig> {
    let imap = config
        .imap
        .as_ref()
        .ok_or_else(|| anyhow!("No [imap] section in config. Run `crm-inbox status` for details."))?;
    let missing = imap.missing_fields();
    if !missing.is_empty() {
        bail!(
            "IMAP configuration incomplete, missing: {}",
            missing.join(", ")
        );
    }
    Ok(imap)
}

// ============ CLI entry point ============

/// One batch with the configured defaults filled in. The schema is created
/// first, so a never-initialized database still stores what it fetches.
pub async fn fetch_with_connector(
    config: &Config,
    connector: Arc<dyn MailboxConnector>,
    folder: Option<String>,
    limit: Option<usize>,
) -> Result<FetchReport> {
    let imap = require_imap(config)?;
    let folder = folder.unwrap_or_else(|| config.ingest.folder.clone());
    let limit = limit.unwrap_or(config.ingest.limit);
    if limit == 0 {
        bail!("--limit must be >= 1");
    }

    let pool = db::connect(config).await?;
    if let Err(e) = migrate::apply(&pool).await {
        pool.close().await;
        return Err(e);
    }
    let ingestor = Ingestor::new(pool.clone(), connector);
    let report = ingestor.fetch(imap, &folder, limit).await;
    pool.close().await;
    Ok(report)
}

pub async fn run_fetch(config: &Config, folder: Option<String>, limit: Option<usize>) -> Result<()> {
    let folder = folder.unwrap_or_else(|| config.ingest.folder.clone());
    let report = fetch_with_connector(
        config,
        Arc::new(ImapConnector::new()),
        Some(folder.clone()),
        limit,
    )
    .await?;

    if !report.success {
        bail!("{}", report.message);
    }

    println!("fetch {}", folder);
    println!("  fetched: {}", report.fetched);
    println!("  saved: {}", report.saved);
    println!("  duplicates: {}", report.duplicates());
    println!("  failed: {}", report.failures());
    println!("ok");
    Ok(())
}
