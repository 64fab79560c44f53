//! # crm-inbox CLI
//!
//! ## Usage
//!
//! ```bash
//! crm-inbox --config ./config/crm-inbox.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `crm-inbox init` | Create the SQLite database and run schema migrations |
//! | `crm-inbox status [--probe]` | Report IMAP readiness, optionally logging in |
//! | `crm-inbox fetch` | Ingest the newest messages from the mailbox |
//! | `crm-inbox emails list` | List stored emails |
//! | `crm-inbox emails get <id>` | Show one stored email |
//! | `crm-inbox emails mark <id> <status>` | Set `read`, `unread` or `archived` |
//! | `crm-inbox company add\|list` | Manage companies |
//! | `crm-inbox contact add\|list` | Manage contacts |
//! | `crm-inbox serve` | Start the HTTP API |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crm_inbox::config;
use crm_inbox::directory::{self, NewCompany, NewContact};
use crm_inbox::inbox::{self, ListFilter};
use crm_inbox::ingest;
use crm_inbox::logging::init_tracing;
use crm_inbox::migrate;
use crm_inbox::models::EmailStatus;
use crm_inbox::server;
use crm_inbox::status;

/// Incoming-mail ingestion for the CRM.
///
/// All commands accept a `--config` flag pointing to a TOML configuration file.
#[derive(Parser)]
#[command(name = "crm-inbox", version, about = "Incoming-mail ingestion for the CRM")]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/crm-inbox.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Show whether the mailbox is configured well enough to fetch.
    Status {
        /// Also log in and select the configured folder.
        #[arg(long)]
        probe: bool,
    },

    /// Fetch new messages from the mailbox and store them.
    Fetch {
        /// Folder to read, instead of `[ingest].folder`.
        #[arg(long)]
        folder: Option<String>,

        /// Maximum number of newest messages to consider, instead of `[ingest].limit`.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Read and update stored emails.
    Emails {
        #[command(subcommand)]
        action: EmailsAction,
    },

    /// Manage companies.
    Company {
        #[command(subcommand)]
        action: CompanyAction,
    },

    /// Manage contacts.
    Contact {
        #[command(subcommand)]
        action: ContactAction,
    },

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum EmailsAction {
    /// List stored emails, newest first.
    List {
        /// Only emails with this status (`unread`, `read`, `archived`).
        #[arg(long)]
        status: Option<EmailStatus>,

        /// Case-insensitive match on subject, sender or body.
        #[arg(long)]
        search: Option<String>,

        #[arg(long)]
        limit: Option<i64>,
    },
    /// Show one email by id.
    Get { id: String },
    /// Set the status of an email.
    Mark {
        id: String,
        /// `read`, `unread` or `archived`.
        status: EmailStatus,
    },
}

#[derive(Subcommand)]
enum CompanyAction {
    Add {
        name: String,
        #[arg(long)]
        website: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    List,
}

#[derive(Subcommand)]
enum ContactAction {
    Add {
        #[arg(long, default_value = "")]
        first_name: String,
        #[arg(long, default_value = "")]
        last_name: String,
        #[arg(long)]
        email: Option<String>,
        /// Id of the company this contact belongs to.
        #[arg(long)]
        company: Option<String>,
    },
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Status { probe } => {
            status::run_status(&cfg, probe).await?;
        }
        Commands::Fetch { folder, limit } => {
            ingest::run_fetch(&cfg, folder, limit).await?;
        }
        Commands::Emails { action } => match action {
            EmailsAction::List {
                status,
                search,
                limit,
            } => {
                if matches!(limit, Some(l) if l < 1) {
                    anyhow::bail!("--limit must be >= 1");
                }
                let filter = ListFilter {
                    status,
                    search,
                    limit,
                };
                inbox::run_list(&cfg, &filter).await?;
            }
            EmailsAction::Get { id } => {
                inbox::run_get(&cfg, &id).await?;
            }
            EmailsAction::Mark { id, status } => {
                inbox::run_mark(&cfg, &id, status).await?;
            }
        },
        Commands::Company { action } => match action {
            CompanyAction::Add {
                name,
                website,
                email,
            } => {
                let new = NewCompany {
                    name,
                    website_url: website,
                    email,
                };
                directory::run_add_company(&cfg, &new).await?;
            }
            CompanyAction::List => {
                directory::run_list_companies(&cfg).await?;
            }
        },
        Commands::Contact { action } => match action {
            ContactAction::Add {
                first_name,
                last_name,
                email,
                company,
            } => {
                let new = NewContact {
                    company_id: company,
                    first_name,
                    last_name,
                    email,
                };
                directory::run_add_contact(&cfg, &new).await?;
            }
            ContactAction::List => {
                directory::run_list_contacts(&cfg).await?;
            }
        },
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
