//! Command implementations for the `shelf` binary.
//!
//! Command output goes to stdout; diagnostics go through `tracing` to
//! stderr. Scrape and query failures are reported, not returned as errors.

use anyhow::{Context, Result};
use std::io::{BufRead, Write};
use std::path::Path;

use crate::agent::{self, AgentCapability};
use crate::config::Config;
use crate::error::ScrapeStage;
use crate::fetch::{self, FetchOptions};
use crate::models::QueryResult;
use crate::parser::PageParser;
use crate::query::{QueryOrchestrator, FAILURE_PREFIX};
use crate::scrape::ScrapeOrchestrator;
use crate::store::CatalogStore;
use crate::trace::{self, AgentTrace};

pub async fn run_init(config: &Config) -> Result<()> {
    let store = CatalogStore::open(config).await?;
    store.ensure_schema().await?;
    println!(
        "Catalog table '{}' ready in {}",
        store.table(),
        config.db.path.display()
    );
    store.close().await;
    Ok(())
}

pub async fn run_scrape(config: &Config, url: Option<&str>) -> Result<()> {
    let url = url.unwrap_or(&config.scrape.url);
    let parser = PageParser::from_config(&config.parser)?;

    let store = match CatalogStore::open(config).await {
        Ok(store) => store,
        Err(e) => {
            report_setup_failure(url, ScrapeStage::Persisting, &e);
            return Ok(());
        }
    };

    let fetcher = match fetch::create_fetcher(&config.fetch) {
        Ok(fetcher) => fetcher,
        Err(e) => {
            report_setup_failure(url, ScrapeStage::Fetching, &e);
            store.close().await;
            return Ok(());
        }
    };

    let orchestrator = ScrapeOrchestrator::new(
        fetcher.as_ref(),
        &parser,
        &store,
        FetchOptions::from_config(&config.scrape),
    );
    let report = orchestrator.run(url).await;

    println!("scrape {}", report.url);
    println!("  fragments: {}", report.fragments);
    println!("  accepted: {}", report.accepted);
    for (reason, count) in &report.rejected {
        println!("  rejected ({}): {}", reason, count);
    }
    println!("  rows written: {}", report.written);
    match &report.failure {
        None => println!("ok"),
        Some(failure) => println!("failed ({}): {}", failure.stage, failure.cause),
    }

    store.close().await;
    Ok(())
}

pub async fn run_ask(
    config: &Config,
    question: &str,
    json: bool,
    save_trace: Option<&Path>,
) -> Result<()> {
    let store = open_store(config).await;
    let agent = match &store {
        Ok(_) => open_agent(config).await,
        Err(failure) => Err(failure.clone()),
    };

    let (result, trace) = match (&store, &agent) {
        (Ok(store), Ok(agent)) => {
            let orchestrator = QueryOrchestrator::new(store, agent.as_ref(), &config.agent);
            orchestrator.ask_with_trace(question).await
        }
        (Err(failure), _) | (_, Err(failure)) => (failure.clone(), AgentTrace::new()),
    };

    if let Some(path) = save_trace {
        let body = serde_json::to_string_pretty(&trace)?;
        std::fs::write(path, body)
            .with_context(|| format!("Failed to write trace to {}", path.display()))?;
    }

    print_result(question, &result, json)?;
    if let Ok(store) = store {
        store.close().await;
    }
    Ok(())
}

pub async fn run_chat(config: &Config) -> Result<()> {
    let store = open_store(config).await;
    let agent = match &store {
        Ok(_) => open_agent(config).await,
        Err(failure) => Err(failure.clone()),
    };

    let interactive = atty::is(atty::Stream::Stdin);
    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        if interactive {
            eprint!("> ");
            std::io::stderr().flush()?;
        }
        let Some(line) = lines.next() else {
            break;
        };
        let question = line?;
        let question = question.trim();
        if question.is_empty() {
            continue;
        }
        if matches!(question, "exit" | "quit") {
            break;
        }

        let result = match (&store, &agent) {
            (Ok(store), Ok(agent)) => {
                QueryOrchestrator::new(store, agent.as_ref(), &config.agent)
                    .ask(question)
                    .await
            }
            (Err(failure), _) | (_, Err(failure)) => failure.clone(),
        };
        print_result(question, &result, false)?;
        println!();
    }

    if let Ok(store) = store {
        store.close().await;
    }
    Ok(())
}

pub async fn run_schema(config: &Config) -> Result<()> {
    let store = CatalogStore::open(config).await?;
    store.ensure_schema().await?;
    println!("{}", store.read_schema_description().await?);
    store.close().await;
    Ok(())
}

pub async fn run_list(config: &Config) -> Result<()> {
    let store = CatalogStore::open(config).await?;
    store.ensure_schema().await?;
    let records = store.records().await?;

    println!("{:>10}  TITLE", "PRICE");
    for record in &records {
        println!("{:>10}  {}", record.price.to_string(), record.title);
    }
    println!("{} rows", records.len());

    store.close().await;
    Ok(())
}

pub fn run_trace(path: &Path, tool: &str) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read trace file: {}", path.display()))?;
    let value: serde_json::Value =
        serde_json::from_str(&content).with_context(|| "Trace file is not valid JSON")?;
    let steps = trace::trace_from_json(value);

    let tool_calls = steps.iter().filter(|s| s.action().is_some()).count();
    println!("steps: {} ({} tool calls)", steps.len(), tool_calls);
    match trace::extract_query(&steps, tool) {
        Some(sql) => println!("sql: {}", sql),
        None => println!("sql: (none)"),
    }
    Ok(())
}

fn report_setup_failure(url: &str, stage: ScrapeStage, cause: &dyn std::fmt::Display) {
    tracing::error!(%stage, error = %cause, url, "scrape setup failed");
    println!("scrape {}", url);
    println!("failed ({}): {}", stage, cause);
}

/// Connect to the catalog for reading, or the answer every question gets
/// when that fails. The schema is checked per question, not here.
async fn open_store(config: &Config) -> std::result::Result<CatalogStore, QueryResult> {
    CatalogStore::open(config).await.map_err(|e| {
        tracing::error!(error = %e, "could not open catalog database");
        failure_answer(&e)
    })
}

fn failure_answer(cause: &dyn std::fmt::Display) -> QueryResult {
    QueryResult {
        answer: format!("{} {}", FAILURE_PREFIX, cause),
        sql: None,
    }
}

/// Build the agent, or the answer every question gets when that fails.
async fn open_agent(config: &Config) -> std::result::Result<Box<dyn AgentCapability>, QueryResult> {
    agent::create_agent(config).await.map_err(|e| {
        tracing::error!(error = %e, "could not set up agent");
        failure_answer(&e)
    })
}

fn print_result(question: &str, result: &QueryResult, json: bool) -> Result<()> {
    if json {
        let line = serde_json::json!({
            "question": question,
            "answer": result.answer,
            "sql": result.sql,
        });
        println!("{}", line);
        return Ok(());
    }

    println!("{}", result.answer);
    match &result.sql {
        Some(sql) => {
            println!();
            println!("SQL:");
            for line in sql.lines() {
                println!("  {}", line);
            }
        }
        None => println!("\nSQL: (none)"),
    }
    Ok(())
}
