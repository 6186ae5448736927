//! Record normalization.
//!
//! Turns a [`RawFragment`] into a typed [`CatalogRecord`] or a
//! [`Rejection`]. Rejections never abort a batch: [`normalize_all`] keeps
//! going and hands back the rejected fragments alongside the good records
//! so the caller can log them.

use std::collections::BTreeMap;
use std::fmt;

use crate::models::{CatalogRecord, Price};
use crate::parser::RawFragment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RejectReason {
    /// The title node or the price node was missing (or the title was blank).
    IncompleteFragment,
    /// The price text did not coerce to a decimal after stripping the currency.
    PriceUnparsable,
    /// The price parsed but is negative or too large for `DECIMAL(10, 2)`.
    PriceOutOfRange,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RejectReason::IncompleteFragment => "incomplete fragment",
            RejectReason::PriceUnparsable => "price unparsable",
            RejectReason::PriceOutOfRange => "price out of range",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub reason: RejectReason,
    /// Title of the rejected fragment, when one was present.
    pub title: Option<String>,
}

/// Outcome of normalizing one parsed page.
#[derive(Debug, Clone, Default)]
pub struct NormalizeReport {
    pub records: Vec<CatalogRecord>,
    pub rejections: Vec<Rejection>,
}

impl NormalizeReport {
    /// Rejection counts grouped by reason.
    pub fn rejection_counts(&self) -> BTreeMap<RejectReason, usize> {
        let mut counts = BTreeMap::new();
        for rejection in &self.rejections {
            *counts.entry(rejection.reason).or_insert(0) += 1;
        }
        counts
    }
}

pub fn normalize(fragment: &RawFragment) -> Result<CatalogRecord, Rejection> {
    let title = fragment
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty());

    let reject = |reason| Rejection {
        reason,
        title: title.map(str::to_string),
    };

    let (Some(title), Some(price_text)) = (title, fragment.price.as_deref()) else {
        return Err(reject(RejectReason::IncompleteFragment));
    };

    let price = parse_price(price_text).map_err(reject)?;

    Ok(CatalogRecord {
        title: title.to_string(),
        price,
    })
}

pub fn normalize_all(fragments: &[RawFragment]) -> NormalizeReport {
    let mut report = NormalizeReport::default();

    for fragment in fragments {
        match normalize(fragment) {
            Ok(record) => report.records.push(record),
            Err(rejection) => {
                tracing::warn!(
                    reason = %rejection.reason,
                    title = rejection.title.as_deref().unwrap_or("<none>"),
                    price = fragment.price.as_deref().unwrap_or("<none>"),
                    "rejected catalog fragment"
                );
                report.rejections.push(rejection);
            }
        }
    }

    tracing::info!(
        accepted = report.records.len(),
        rejected = report.rejections.len(),
        "normalized catalog fragments"
    );
    report
}

/// Strip the currency prefix and coerce the rest to cents.
///
/// Leading characters that cannot start a number are treated as the
/// currency glyph (this also swallows mis-decoded prefixes such as `Â£`).
/// More than two fraction digits round half away from zero.
pub fn parse_price(text: &str) -> Result<Price, RejectReason> {
    let numeric = text
        .trim()
        .trim_start_matches(|c: char| !(c.is_ascii_digit() || matches!(c, '.' | '-' | '+')))
        .trim();

    let value: f64 = numeric
        .parse()
        .map_err(|_| RejectReason::PriceUnparsable)?;
    if !value.is_finite() {
        return Err(RejectReason::PriceUnparsable);
    }

    let cents = (value * 100.0).round();
    if cents < 0.0 || cents > i64::MAX as f64 {
        return Err(RejectReason::PriceOutOfRange);
    }
    Price::from_cents(cents as i64).ok_or(RejectReason::PriceOutOfRange)
}
