use anyhow::{Context, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub imap: Option<ImapConfig>,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Credentials and endpoint of the remote mailbox.
#[derive(Deserialize, Clone, Default)]
pub struct ImapConfig {
    #[serde(default)]
    pub server: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_use_ssl")]
    pub use_ssl: bool,
}

fn default_use_ssl() -> bool {
    true
}

impl ImapConfig {
    /// Port to dial: the configured one, else 993 for TLS and 143 for plain.
    pub fn effective_port(&self) -> u16 {
        match self.port {
            Some(port) => port,
            None if self.use_ssl => 993,
            None => 143,
        }
    }

    /// Names of the required fields that are empty.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.server.trim().is_empty() {
            missing.push("server");
        }
        if self.username.trim().is_empty() {
            missing.push("username");
        }
        if self.password.is_empty() {
            missing.push("password");
        }
        missing
    }
}

impl fmt::Debug for ImapConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImapConfig")
            .field("server", &self.server)
            .field("port", &self.effective_port())
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("use_ssl", &self.use_ssl)
            .finish()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_folder")]
    pub folder: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            folder: default_folder(),
            limit: default_limit(),
        }
    }
}

fn default_folder() -> String {
    "INBOX".to_string()
}
fn default_limit() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8420".to_string()
}

impl Config {
    /// A config with only a database path; everything else defaulted.
    pub fn with_db(path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig { path: path.into() },
            imap: None,
            ingest: IngestConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.ingest.limit == 0 {
        anyhow::bail!("ingest.limit must be >= 1");
    }
    if config.ingest.folder.trim().is_empty() {
        anyhow::bail!("ingest.folder must not be empty");
    }
    if let Some(imap) = &config.imap {
        if imap.port == Some(0) {
            anyhow::bail!("imap.port must be > 0");
        }
    }
    Ok(())
}
