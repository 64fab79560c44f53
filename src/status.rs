use anyhow::{bail, Result};
use serde::Serialize;

use crate::config::Config;
use crate::ingest::teardown;
use crate::mailbox::{ImapConnector, MailboxConnector};

/// Whether the mailbox is configured well enough to fetch from.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ImapStatus {
    pub has_imap_config: bool,
    pub missing_fields: Vec<String>,
    pub ready_to_fetch: bool,
    pub message: String,
}

pub fn imap_status(config: &Config) -> ImapStatus {
    match &config.imap {
        None => ImapStatus {
            has_imap_config: false,
            missing_fields: vec!["server".into(), "username".into(), "password".into()],
            ready_to_fetch: false,
            message: "IMAP is not configured. Add an [imap] section to the config file.".into(),
        },
        Some(imap) => {
            let missing: Vec<String> = imap
                .missing_fields()
                .into_iter()
                .map(str::to_string)
                .collect();
            let ready = missing.is_empty();
            let message = if ready {
                format!(
                    "IMAP configured for {}@{}:{}",
                    imap.username,
                    imap.server,
                    imap.effective_port()
                )
            } else {
                format!("IMAP configuration incomplete, missing: {}", missing.join(", "))
            };
            ImapStatus {
                has_imap_config: true,
                missing_fields: missing,
                ready_to_fetch: ready,
                message,
            }
        }
    }
}

pub async fn run_status(config: &Config, probe: bool) -> Result<()> {
    let status = imap_status(config);

    println!("{:<16} {}", "configured", status.has_imap_config);
    println!("{:<16} {}", "ready", status.ready_to_fetch);
    if !status.missing_fields.is_empty() {
        println!("{:<16} {}", "missing", status.missing_fields.join(", "));
    }
    println!("{}", status.message);

    if !probe {
        return Ok(());
    }
    let imap = match (&config.imap, status.ready_to_fetch) {
        (Some(imap), true) => imap,
        _ => bail!("cannot probe: {}", status.message),
    };

    let folder = &config.ingest.folder;
    let mut session = ImapConnector::new().connect(imap).await?;
    let selected = session.select(folder).await;
    teardown(session.as_mut()).await;
    selected?;

    println!("probe: logged in and selected {}", folder);
    println!("ok");
    Ok(())
}
