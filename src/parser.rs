//! Catalog page parser.
//!
//! Pulls one [`RawFragment`] out of every node matching the configured item
//! selector. Parsing is tolerant (html5ever via `scraper`), so malformed
//! markup still yields whatever entries can be recognized. A page with no
//! matching nodes yields an empty vector; absence of data is not an error
//! at this layer.

use anyhow::{anyhow, Result};
use scraper::{ElementRef, Html, Selector};

use crate::config::ParserConfig;

/// Raw text of one catalog entry, before validation.
///
/// A `None` field means the corresponding node (or attribute) was missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawFragment {
    pub title: Option<String>,
    pub price: Option<String>,
}

/// Compiled selectors for one catalog layout.
#[derive(Debug, Clone)]
pub struct PageParser {
    item: Selector,
    title: Selector,
    title_attribute: Option<String>,
    price: Selector,
}

impl PageParser {
    pub fn from_config(config: &ParserConfig) -> Result<Self> {
        Ok(Self {
            item: compile(&config.item_selector)?,
            title: compile(&config.title_selector)?,
            title_attribute: config.title_attribute.clone(),
            price: compile(&config.price_selector)?,
        })
    }

    pub fn parse(&self, markup: &str) -> Vec<RawFragment> {
        let document = Html::parse_document(markup);
        let fragments: Vec<RawFragment> = document
            .select(&self.item)
            .map(|node| self.extract(node))
            .collect();

        tracing::info!(fragments = fragments.len(), "parsed catalog page");
        fragments
    }

    fn extract(&self, node: ElementRef<'_>) -> RawFragment {
        let title = node.select(&self.title).next().and_then(|el| {
            self.title_attribute
                .as_deref()
                .and_then(|attr| el.value().attr(attr))
                .map(str::to_string)
                .or_else(|| Some(element_text(el)))
        });

        let price = node.select(&self.price).next().map(element_text);

        RawFragment { title, price }
    }
}

fn compile(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| anyhow!("invalid selector '{}': {}", selector, e))
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>()
}
