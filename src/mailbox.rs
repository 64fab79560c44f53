//! Mailbox sessions.
//!
//! The ingestion pipeline talks to a remote mail store through two traits:
//! a [`MailboxConnector`] opens an authenticated [`MailboxSession`], and the
//! session selects a folder, lists message sequence numbers, and fetches
//! full messages one at a time.
//!
//! [`ImapConnector`] is the production implementation. It drives the
//! blocking `imap` client on tokio's blocking pool, one command at a time,
//! so the calling task never blocks the runtime.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::io::{Read, Write};
use std::net::TcpStream;

use crate::config::ImapConfig;

/// Opens authenticated mailbox sessions.
#[async_trait]
pub trait MailboxConnector: Send + Sync {
    /// Connect and log in. Any failure here is fatal to an ingestion run.
    async fn connect(&self, config: &ImapConfig) -> Result<Box<dyn MailboxSession>>;
}

/// An authenticated, exclusively owned connection to one mailbox.
#[async_trait]
pub trait MailboxSession: Send {
    /// Select `folder` for subsequent search and fetch commands.
    async fn select(&mut self, folder: &str) -> Result<()>;

    /// Sequence numbers of every message in the selected folder, ascending.
    async fn search_all(&mut self) -> Result<Vec<u32>>;

    /// Full RFC 5322 bytes of one message, or `None` if the server returned no body.
    async fn fetch(&mut self, seq: u32) -> Result<Option<Vec<u8>>>;

    /// Close the selected folder.
    async fn close(&mut self) -> Result<()>;

    /// End the session.
    async fn logout(&mut self) -> Result<()>;
}

/// [`MailboxConnector`] backed by the `imap` crate.
///
/// `use_ssl = true` connects with implicit TLS via `native-tls`; otherwise
/// the session runs over plain TCP.
#[derive(Debug, Default, Clone)]
pub struct ImapConnector;

impl ImapConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MailboxConnector for ImapConnector {
    async fn connect(&self, config: &ImapConfig) -> Result<Box<dyn MailboxSession>> {
        let config = config.clone();
        let use_ssl = config.use_ssl;
        if use_ssl {
            let session = tokio::task::spawn_blocking(move || open_tls_session(&config))
                .await
                .context("IMAP connect task failed")??;
            Ok(Box::new(ImapSession::new(session)))
        } else {
            let session = tokio::task::spawn_blocking(move || open_plain_session(&config))
                .await
                .context("IMAP connect task failed")??;
            Ok(Box::new(ImapSession::new(session)))
        }
    }
}

type TlsSession = imap::Session<native_tls::TlsStream<TcpStream>>;
type PlainSession = imap::Session<TcpStream>;

fn open_tls_session(config: &ImapConfig) -> Result<TlsSession> {
    let tls = native_tls::TlsConnector::builder()
        .build()
        .context("failed to build TLS connector for IMAP")?;

    let port = config.effective_port();
    let client = imap::connect(
        (config.server.as_str(), port),
        config.server.as_str(),
        &tls,
    )
    .with_context(|| {
        format!(
            "failed to connect to IMAP server '{}:{}'",
            config.server, port
        )
    })?;

    client
        .login(config.username.as_str(), config.password.as_str())
        .map_err(|error| anyhow!(error.0))
        .context("failed to authenticate to IMAP server")
}

fn open_plain_session(config: &ImapConfig) -> Result<PlainSession> {
    let port = config.effective_port();
    let stream = TcpStream::connect((config.server.as_str(), port)).with_context(|| {
        format!(
            "failed to connect to IMAP server '{}:{}'",
            config.server, port
        )
    })?;

    let mut client = imap::Client::new(stream);
    client
        .read_greeting()
        .context("IMAP server sent no greeting")?;

    client
        .login(config.username.as_str(), config.password.as_str())
        .map_err(|error| anyhow!(error.0))
        .context("failed to authenticate to IMAP server")
}

/// Async adapter over a blocking `imap::Session`.
///
/// The session is moved onto the blocking pool for each command and handed
/// back afterwards. If a command task panics the session is gone and every
/// later call fails.
struct ImapSession<T: Read + Write + Send + 'static> {
    inner: Option<imap::Session<T>>,
}

impl<T: Read + Write + Send + 'static> ImapSession<T> {
    fn new(session: imap::Session<T>) -> Self {
        Self {
            inner: Some(session),
        }
    }

    async fn run<R, F>(&mut self, op: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut imap::Session<T>) -> imap::error::Result<R> + Send + 'static,
    {
        let mut session = self
            .inner
            .take()
            .ok_or_else(|| anyhow!("IMAP session is no longer available"))?;
        let (session, result) = tokio::task::spawn_blocking(move || {
            let result = op(&mut session);
            (session, result)
        })
        .await
        .context("IMAP command task failed")?;
        self.inner = Some(session);
        result.map_err(anyhow::Error::from)
    }
}

#[async_trait]
impl<T: Read + Write + Send + 'static> MailboxSession for ImapSession<T> {
    async fn select(&mut self, folder: &str) -> Result<()> {
        let name = folder.to_string();
        self.run(move |s| s.select(&name).map(|_| ()))
            .await
            .with_context(|| format!("failed to select IMAP folder '{}'", folder))
    }

    async fn search_all(&mut self) -> Result<Vec<u32>> {
        let found = self
            .run(|s| s.search("ALL"))
            .await
            .context("IMAP search failed")?;
        let mut seqs: Vec<u32> = found.into_iter().collect();
        seqs.sort_unstable();
        Ok(seqs)
    }

    async fn fetch(&mut self, seq: u32) -> Result<Option<Vec<u8>>> {
        self.run(move |s| {
            let fetches = s.fetch(seq.to_string(), "RFC822")?;
            Ok(fetches
                .iter()
                .find_map(|fetch| fetch.body().map(|body| body.to_vec())))
        })
        .await
        .with_context(|| format!("failed to fetch message {}", seq))
    }

    async fn close(&mut self) -> Result<()> {
        self.run(|s| s.close()).await
    }

    async fn logout(&mut self) -> Result<()> {
        self.run(|s| s.logout()).await
    }
}
