//! Scrape cycle orchestration.
//!
//! ```text
//! Idle → Fetching → Parsing → Normalizing → Persisting → Done
//!            └──────────┴──────────┴────────────┴──→ Failed(stage)
//! ```
//!
//! A failure at any stage stops the cycle and leaves the catalog as it
//! was. Because persistence is a full replacement, running the same page
//! twice yields the same table.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{ScrapeStage, StageFailure};
use crate::fetch::{FetchOptions, Fetcher};
use crate::normalize::{normalize_all, RejectReason};
use crate::parser::PageParser;
use crate::store::CatalogStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeState {
    Idle,
    Fetching,
    Parsing,
    Normalizing,
    Persisting,
    Done,
    Failed(ScrapeStage),
}

impl fmt::Display for ScrapeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScrapeState::Idle => f.write_str("idle"),
            ScrapeState::Fetching => f.write_str("fetching"),
            ScrapeState::Parsing => f.write_str("parsing"),
            ScrapeState::Normalizing => f.write_str("normalizing"),
            ScrapeState::Persisting => f.write_str("persisting"),
            ScrapeState::Done => f.write_str("done"),
            ScrapeState::Failed(stage) => write!(f, "failed({})", stage),
        }
    }
}

/// What one scrape cycle did.
#[derive(Debug)]
pub struct ScrapeReport {
    pub url: String,
    pub state: ScrapeState,
    /// Catalog entries found on the page.
    pub fragments: usize,
    pub accepted: usize,
    pub rejected: BTreeMap<RejectReason, usize>,
    /// Rows written to the catalog.
    pub written: u64,
    pub failure: Option<StageFailure>,
}

impl ScrapeReport {
    fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            state: ScrapeState::Idle,
            fragments: 0,
            accepted: 0,
            rejected: BTreeMap::new(),
            written: 0,
            failure: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.state == ScrapeState::Done
    }

    pub fn rejected_total(&self) -> usize {
        self.rejected.values().sum()
    }

    fn enter(&mut self, state: ScrapeState) {
        tracing::debug!(from = %self.state, to = %state, url = %self.url, "scrape state change");
        self.state = state;
    }

    fn fail(mut self, stage: ScrapeStage, cause: impl ToString) -> Self {
        let failure = StageFailure::new(stage, cause);
        tracing::error!(stage = %failure.stage, cause = %failure.cause, url = %self.url, "scrape failed");
        self.enter(ScrapeState::Failed(stage));
        self.failure = Some(failure);
        self
    }
}

pub struct ScrapeOrchestrator<'a> {
    fetcher: &'a dyn Fetcher,
    parser: &'a PageParser,
    store: &'a CatalogStore,
    options: FetchOptions,
}

impl<'a> ScrapeOrchestrator<'a> {
    pub fn new(
        fetcher: &'a dyn Fetcher,
        parser: &'a PageParser,
        store: &'a CatalogStore,
        options: FetchOptions,
    ) -> Self {
        Self {
            fetcher,
            parser,
            store,
            options,
        }
    }

    /// Run one full cycle against `url`. Never returns an error: the
    /// outcome, including any stage failure, is in the report.
    pub async fn run(&self, url: &str) -> ScrapeReport {
        let mut report = ScrapeReport::new(url);
        tracing::info!(url, fetcher = self.fetcher.name(), "starting scrape");

        report.enter(ScrapeState::Fetching);
        let page = match self.fetcher.fetch(url, &self.options).await {
            Ok(page) => page,
            Err(e) => return report.fail(ScrapeStage::Fetching, e),
        };
        if page.markup.trim().is_empty() {
            return report.fail(ScrapeStage::Fetching, "fetch returned empty markup");
        }
        tracing::info!(bytes = page.markup.len(), "fetched page");

        report.enter(ScrapeState::Parsing);
        let fragments = self.parser.parse(&page.markup);
        report.fragments = fragments.len();

        report.enter(ScrapeState::Normalizing);
        let normalized = normalize_all(&fragments);
        report.accepted = normalized.records.len();
        report.rejected = normalized.rejection_counts();
        if normalized.records.is_empty() {
            let cause = format!(
                "no valid records ({} fragments, {} rejected)",
                report.fragments,
                report.rejected_total()
            );
            return report.fail(ScrapeStage::Normalizing, cause);
        }

        report.enter(ScrapeState::Persisting);
        if let Err(e) = self.store.ensure_schema().await {
            return report.fail(ScrapeStage::Persisting, e);
        }
        match self.store.replace_all(&normalized.records).await {
            Ok(written) => report.written = written,
            Err(e) => return report.fail(ScrapeStage::Persisting, e),
        }

        report.enter(ScrapeState::Done);
        tracing::info!(
            written = report.written,
            rejected = report.rejected_total(),
            "scrape complete"
        );
        report
    }
}
