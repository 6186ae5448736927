//! TOML configuration.
//!
//! A [`Config`] is the single context value handed to every component: it
//! carries the database location, the catalog table name, parser selectors,
//! and the names of the environment variables that hold credentials.
//! Nothing in the library reads process-wide settings on its own.
//!
//! ```toml
//! [db]
//! path = "./data/shelf.sqlite"
//! table = "books"
//!
//! [scrape]
//! url = "https://books.toscrape.com/"
//!
//! [agent]
//! provider = "openai"
//! model = "gpt-4o-mini"
//! ```

use anyhow::{bail, Context, Result};
use scraper::Selector;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub scrape: ScrapeConfig,
    #[serde(default)]
    pub parser: ParserConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    #[serde(default = "default_table")]
    pub table: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            table: default_table(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/shelf.sqlite")
}
fn default_table() -> String {
    "books".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScrapeConfig {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default)]
    pub only_main_content: bool,
    #[serde(default = "default_formats")]
    pub formats: Vec<String>,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            only_main_content: false,
            formats: default_formats(),
        }
    }
}

fn default_url() -> String {
    "https://books.toscrape.com/".to_string()
}
fn default_formats() -> Vec<String> {
    vec!["html".to_string()]
}

/// CSS selectors describing one catalog entry.
#[derive(Debug, Deserialize, Clone)]
pub struct ParserConfig {
    #[serde(default = "default_item_selector")]
    pub item_selector: String,
    #[serde(default = "default_title_selector")]
    pub title_selector: String,
    /// Attribute holding the full title. Falls back to the element text.
    #[serde(default = "default_title_attribute")]
    pub title_attribute: Option<String>,
    #[serde(default = "default_price_selector")]
    pub price_selector: String,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            item_selector: default_item_selector(),
            title_selector: default_title_selector(),
            title_attribute: default_title_attribute(),
            price_selector: default_price_selector(),
        }
    }
}

fn default_item_selector() -> String {
    "article.product_pod".to_string()
}
fn default_title_selector() -> String {
    "h3 a".to_string()
}
fn default_title_attribute() -> Option<String> {
    Some("title".to_string())
}
fn default_price_selector() -> String {
    "div.product_price p.price_color".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct FetchConfig {
    /// `http` (plain GET) or `firecrawl`.
    #[serde(default = "default_fetch_provider")]
    pub provider: String,
    #[serde(default = "default_firecrawl_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_firecrawl_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            provider: default_fetch_provider(),
            endpoint: default_firecrawl_endpoint(),
            api_key_env: default_firecrawl_key_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_fetch_provider() -> String {
    "http".to_string()
}
fn default_firecrawl_endpoint() -> String {
    "https://api.firecrawl.dev".to_string()
}
fn default_firecrawl_key_env() -> String {
    "FIRECRAWL_API_KEY".to_string()
}
fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    /// `openai`, `azure`, or `disabled`.
    #[serde(default = "default_agent_provider")]
    pub provider: String,
    /// Model name for OpenAI, deployment name for Azure.
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_agent_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_agent_key_env")]
    pub api_key_env: String,
    /// Upper bound on model round-trips for one question.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Row limit the agent is told to put on its queries.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Sample rows included in the schema description.
    #[serde(default = "default_sample_rows")]
    pub sample_rows: usize,
    /// Hard cap on rows returned to the model from one query.
    #[serde(default = "default_max_result_rows")]
    pub max_result_rows: usize,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            provider: default_agent_provider(),
            model: default_model(),
            endpoint: default_agent_endpoint(),
            api_version: default_api_version(),
            api_key_env: default_agent_key_env(),
            max_iterations: default_max_iterations(),
            top_k: default_top_k(),
            sample_rows: default_sample_rows(),
            max_result_rows: default_max_result_rows(),
            temperature: 0.0,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_agent_provider() -> String {
    "openai".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_agent_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_api_version() -> String {
    "2024-06-01".to_string()
}
fn default_agent_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_max_iterations() -> usize {
    15
}
fn default_top_k() -> usize {
    30
}
fn default_sample_rows() -> usize {
    3
}
fn default_max_result_rows() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Defaults with the database placed at `path`. Handy for tests.
    pub fn with_db_path(path: impl Into<PathBuf>) -> Self {
        let mut config = Self::default();
        config.db.path = path.into();
        config
    }
}

/// Read and validate a config file.
///
/// A missing file is not an error: every section has defaults, so the
/// tool works out of the box against the default catalog URL.
pub fn load_config(path: &Path) -> Result<Config> {
    let config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| "Failed to parse config file")?
    } else {
        Config::default()
    };

    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if !is_identifier(&config.db.table) {
        bail!(
            "db.table must be a plain SQL identifier (letters, digits, '_'), got '{}'",
            config.db.table
        );
    }

    for (key, selector) in [
        ("parser.item_selector", &config.parser.item_selector),
        ("parser.title_selector", &config.parser.title_selector),
        ("parser.price_selector", &config.parser.price_selector),
    ] {
        if Selector::parse(selector).is_err() {
            bail!("{} is not a valid CSS selector: '{}'", key, selector);
        }
    }

    match config.fetch.provider.as_str() {
        "http" | "firecrawl" => {}
        other => bail!(
            "Unknown fetch provider: '{}'. Must be http or firecrawl.",
            other
        ),
    }

    match config.agent.provider.as_str() {
        "disabled" | "openai" | "azure" => {}
        other => bail!(
            "Unknown agent provider: '{}'. Must be disabled, openai, or azure.",
            other
        ),
    }

    if config.agent.max_iterations == 0 {
        bail!("agent.max_iterations must be > 0");
    }
    if config.agent.top_k == 0 {
        bail!("agent.top_k must be > 0");
    }
    if config.agent.max_result_rows == 0 {
        bail!("agent.max_result_rows must be > 0");
    }

    Ok(())
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
