//! # Shelf
//!
//! Scrape a product catalog page into a local SQLite table, then ask
//! questions about it in plain language and get back both the answer and
//! the exact SQL that produced it.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────┐   ┌────────┐   ┌───────────┐   ┌──────────────┐
//! │ Fetcher │──▶│ Parser │──▶│ Normalize │──▶│ CatalogStore │
//! └─────────┘   └────────┘   └───────────┘   └──────┬───────┘
//!                                                   │ read
//!   question ──▶ QueryOrchestrator ──▶ Agent ──▶ SqlToolkit
//!                      ▲                 │
//!                      └── trace ────────┘  extract_query → (answer, sql)
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! shelf init
//! shelf scrape https://books.toscrape.com/
//! shelf ask "What is the most expensive book?"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration |
//! | [`models`] | Catalog records, prices, query results |
//! | [`fetch`] | Page fetching (plain HTTP, Firecrawl) |
//! | [`parser`] | Catalog entry extraction |
//! | [`normalize`] | Record validation |
//! | [`store`] | The catalog table |
//! | [`scrape`] | Scrape cycle orchestration |
//! | [`toolkit`] | SQL tools for the agent |
//! | [`agent`] | Agent capability |
//! | [`trace`] | Agent traces and SQL extraction |
//! | [`query`] | Question answering |
//! | [`cli`] | Commands behind the `shelf` binary |

pub mod agent;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod fetch;
pub mod logging;
pub mod models;
pub mod normalize;
pub mod parser;
pub mod query;
pub mod scrape;
pub mod store;
pub mod toolkit;
pub mod trace;
