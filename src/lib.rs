//! # crm-inbox
//!
//! Incoming-mail ingestion for a CRM: pull messages from an IMAP mailbox,
//! normalize them, link each sender to a known contact or company, and keep
//! them in SQLite for the CLI and HTTP API to read.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────────────┐   ┌──────────┐
//! │   IMAP   │──▶│ parse → resolve →     │──▶│  SQLite  │
//! │ mailbox  │   │ store (one at a time) │   │  inbox   │
//! └──────────┘   └───────────────────────┘   └────┬─────┘
//!                                                 │
//!                             ┌───────────────────┤
//!                             ▼                   ▼
//!                        ┌──────────┐       ┌──────────┐
//!                        │   CLI    │       │   HTTP   │
//!                        └──────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! crm-inbox init                                   # create database
//! crm-inbox company add "Acme" --website https://acme.com
//! crm-inbox status                                 # check [imap] settings
//! crm-inbox fetch --limit 20                       # ingest newest 20 messages
//! crm-inbox emails list --status unread
//! crm-inbox serve                                  # start HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`header`] | Encoded-word header decoding |
//! | [`address`] | `From` / `To` / `Cc` address parsing |
//! | [`extract`] | Body and attachment extraction from the MIME tree |
//! | [`parse`] | Raw message bytes → [`models::IncomingMessage`] |
//! | [`resolve`] | Sender → contact / company resolution |
//! | [`mailbox`] | Mailbox session traits and the IMAP implementation |
//! | [`ingest`] | Ingestion orchestrator |
//! | [`inbox`] | Stored emails: insert, list, get, status changes |
//! | [`directory`] | Companies and contacts |
//! | [`status`] | IMAP readiness report |
//! | [`server`] | HTTP API |
//! | [`logging`] | tracing subscriber setup |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod address;
pub mod config;
pub mod db;
pub mod directory;
pub mod extract;
pub mod header;
pub mod inbox;
pub mod ingest;
pub mod logging;
pub mod mailbox;
pub mod migrate;
pub mod models;
pub mod parse;
pub mod resolve;
pub mod server;
pub mod status;
