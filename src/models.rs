//! Core data models shared by the scrape and query pipelines.

use serde::Serialize;
use std::fmt;

/// Largest amount a `DECIMAL(10, 2)` column holds, in cents.
pub const MAX_PRICE_CENTS: i64 = 9_999_999_999;

/// A non-negative amount with exactly two fraction digits.
///
/// Stored as integer cents so that values read back from the catalog
/// compare exactly with what was scraped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Price(i64);

impl Price {
    /// Returns `None` for negative amounts or amounts beyond `DECIMAL(10, 2)`.
    pub fn from_cents(cents: i64) -> Option<Self> {
        (0..=MAX_PRICE_CENTS).contains(&cents).then_some(Self(cents))
    }

    pub fn cents(self) -> i64 {
        self.0
    }

    pub fn as_f64(self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl Serialize for Price {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

/// One validated catalog row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogRecord {
    pub title: String,
    pub price: Price,
}

/// The answer to one question, tied to the SQL that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryResult {
    pub answer: String,
    pub sql: Option<String>,
}
