//! Question answering over the catalog.
//!
//! [`QueryOrchestrator::ask`] hands the agent the question, the catalog
//! schema, a step budget, and fixed instructions, then pairs the agent's
//! answer with the SQL recovered from its trace. It never fails: problems
//! with the schema or the agent turn into a labeled answer with no SQL.
//! The catalog is only read here, never created or altered.

use crate::agent::{AgentCapability, AgentRequest, AgentRun};
use crate::config::AgentConfig;
use crate::models::QueryResult;
use crate::store::CatalogStore;
use crate::trace::{extract_query, AgentTrace, SQL_QUERY_TOOL};

/// Prefix for answers produced when the agent could not finish.
pub const FAILURE_PREFIX: &str = "Query failed:";

pub struct QueryOrchestrator<'a> {
    store: &'a CatalogStore,
    agent: &'a dyn AgentCapability,
    tool_budget: usize,
    top_k: usize,
}

impl<'a> QueryOrchestrator<'a> {
    pub fn new(store: &'a CatalogStore, agent: &'a dyn AgentCapability, config: &AgentConfig) -> Self {
        Self {
            store,
            agent,
            tool_budget: config.max_iterations,
            top_k: config.top_k,
        }
    }

    pub async fn ask(&self, question: &str) -> QueryResult {
        self.ask_with_trace(question).await.0
    }

    /// Like [`ask`](Self::ask), also returning the agent's trace for auditing.
    pub async fn ask_with_trace(&self, question: &str) -> (QueryResult, AgentTrace) {
        let described = match self.store.verify_schema().await {
            Ok(()) => self.store.read_schema_description().await,
            Err(e) => Err(e),
        };
        let schema = match described {
            Ok(schema) => schema,
            Err(e) => {
                tracing::error!(error = %e, "could not describe catalog schema");
                return (failure_result(None, &e.to_string()), AgentTrace::new());
            }
        };

        let request = AgentRequest {
            question: question.to_string(),
            schema,
            tool_budget: self.tool_budget,
            instructions: instructions(self.store.table(), self.top_k),
        };

        tracing::info!(agent = self.agent.name(), budget = self.tool_budget, "asking agent");
        let AgentRun { trace, outcome } = self.agent.invoke(&request).await;
        let sql = extract_query(&trace, SQL_QUERY_TOOL);

        let result = match outcome {
            Ok(answer) => {
                tracing::info!(steps = trace.len(), has_sql = sql.is_some(), "agent answered");
                QueryResult { answer, sql }
            }
            Err(failure) => {
                tracing::warn!(
                    error = %failure.error,
                    steps = trace.len(),
                    recovered_sql = sql.as_deref().unwrap_or("<none>"),
                    "agent failed"
                );
                failure_result(failure.partial_answer, &failure.error.to_string())
            }
        };

        (result, trace)
    }
}

fn failure_result(partial_answer: Option<String>, cause: &str) -> QueryResult {
    let answer = partial_answer
        .filter(|text| !text.trim().is_empty())
        .unwrap_or_else(|| format!("{} {}", FAILURE_PREFIX, cause));
    QueryResult { answer, sql: None }
}

fn instructions(table: &str, top_k: usize) -> String {
    format!(
        "You are an agent designed to answer questions about a product catalog stored \
in a SQLite database table named `{table}`.\n\
Given a question, write a syntactically correct SQLite query, run it with the \
{tool} tool, look at the results, and answer from them.\n\
Always use the {tool} tool to get facts from the data instead of reasoning about \
what the data might contain.\n\
Unless the question asks for a specific number of examples, limit every query to \
at most {top_k} rows. Order results by a relevant column when that helps.\n\
Only select the columns the question needs.\n\
If a query fails, rewrite it and try again.\n\
Never issue INSERT, UPDATE, DELETE, DROP, or any other statement that changes data.\n\
If the question is not about the catalog, say that you don't know.",
        table = table,
        tool = SQL_QUERY_TOOL,
        top_k = top_k,
    )
}
