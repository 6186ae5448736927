use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn shelf_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("shelf");
    path
}

fn setup_test_env(catalog_url: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/shelf.sqlite"

[scrape]
url = "{}"

[fetch]
provider = "http"
timeout_secs = 10

[agent]
provider = "disabled"

[log]
level = "warn"
"#,
        root.display(),
        catalog_url
    );

    let config_path = config_dir.join("shelf.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_shelf(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = shelf_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run shelf binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

const CATALOG_PAGE: &str = r#"<html><body><ol class="row">
<li><article class="product_pod">
  <h3><a href="a.html" title="Book A">Book A</a></h3>
  <div class="product_price"><p class="price_color">£12.50</p></div>
</article></li>
<li><article class="product_pod">
  <h3><a href="b.html" title="Book B">Book B</a></h3>
  <div class="product_price"><p class="price_color">£7.99</p></div>
</article></li>
<li><article class="product_pod">
  <h3><a href="c.html" title="Book C">Book C</a></h3>
</article></li>
</ol></body></html>"#;

#[test]
fn test_init_is_idempotent() {
    let (_tmp, config) = setup_test_env("http://127.0.0.1:9/");

    let (stdout, stderr, success) = run_shelf(&config, &["init"]);
    assert!(success, "init failed: {}", stderr);
    assert!(stdout.contains("Catalog table 'books' ready"));

    let (_, stderr, success) = run_shelf(&config, &["init"]);
    assert!(success, "second init failed: {}", stderr);

    let (stdout, _, success) = run_shelf(&config, &["schema"]);
    assert!(success);
    assert!(stdout.contains("CREATE TABLE"));
    assert!(stdout.contains("0 rows from books table"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_scrape_then_list_and_ask() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/catalogue/page-1.html"))
        .respond_with(ResponseTemplate::new(200).set_body_string(CATALOG_PAGE))
        .mount(&server)
        .await;
    let url = format!("{}/catalogue/page-1.html", server.uri());
    let (_tmp, config) = setup_test_env(&url);

    let (stdout, stderr, success) = tokio::task::spawn_blocking({
        let config = config.clone();
        move || run_shelf(&config, &["scrape"])
    })
    .await
    .unwrap();
    assert!(success, "scrape failed: {}", stderr);
    assert!(stdout.contains("accepted: 2"), "{}", stdout);
    assert!(stdout.contains("rejected (incomplete fragment): 1"), "{}", stdout);
    assert!(stdout.contains("rows written: 2"), "{}", stdout);
    assert!(stdout.trim_end().ends_with("ok"), "{}", stdout);

    let (stdout, _, success) = run_shelf(&config, &["list"]);
    assert!(success);
    assert!(stdout.contains("12.50  Book A"), "{}", stdout);
    assert!(stdout.contains("7.99  Book B"), "{}", stdout);
    assert!(stdout.contains("2 rows"));

    let (stdout, _, success) = run_shelf(&config, &["ask", "--json", "Which", "book", "is", "cheapest?"]);
    assert!(success);
    let line: serde_json::Value = serde_json::from_str(stdout.trim()).unwrap();
    assert_eq!(line["question"], "Which book is cheapest?");
    assert_eq!(line["answer"], "Query failed: agent provider is disabled");
    assert!(line["sql"].is_null());
}

#[test]
fn test_failed_scrape_keeps_catalog_and_exits_cleanly() {
    let (_tmp, config) = setup_test_env("http://127.0.0.1:9/unreachable");

    let (_, stderr, success) = run_shelf(&config, &["init"]);
    assert!(success, "init failed: {}", stderr);

    let (stdout, _, success) = run_shelf(&config, &["scrape"]);
    assert!(success);
    assert!(stdout.contains("failed (fetching)"), "{}", stdout);

    let (stdout, _, _) = run_shelf(&config, &["list"]);
    assert!(stdout.contains("0 rows"));
}

#[test]
fn test_db_flag_overrides_config() {
    let (tmp, config) = setup_test_env("http://127.0.0.1:9/");
    let override_path = tmp.path().join("elsewhere").join("other.sqlite");

    let (_, stderr, success) = run_shelf(
        &config,
        &["--db", override_path.to_str().unwrap(), "init"],
    );
    assert!(success, "init failed: {}", stderr);
    assert!(override_path.exists());
    assert!(!tmp.path().join("data").join("shelf.sqlite").exists());
}

#[test]
fn test_trace_command_extracts_first_query() {
    let (tmp, config) = setup_test_env("http://127.0.0.1:9/");
    let trace_path = tmp.path().join("trace.json");
    fs::write(
        &trace_path,
        r#"[
  [{"tool": "sql_db_list_tables", "tool_input": {}}, "books"],
  {"action": {"tool": "sql_db_query", "tool_input": {"query": "SELECT 1"}}, "observation": "[(1,)]"},
  [{"tool": "sql_db_query", "tool_input": {"query": "SELECT 2"}}, "[(2,)]"],
  "garbage"
]"#,
    )
    .unwrap();

    let (stdout, stderr, success) = run_shelf(&config, &["trace", trace_path.to_str().unwrap()]);
    assert!(success, "trace failed: {}", stderr);
    assert!(stdout.contains("steps: 4 (3 tool calls)"), "{}", stdout);
    assert!(stdout.contains("sql: SELECT 1"));

    let (stdout, _, success) = run_shelf(
        &config,
        &["trace", trace_path.to_str().unwrap(), "--tool", "other_tool"],
    );
    assert!(success);
    assert!(stdout.contains("sql: (none)"));
}

#[tokio::test]
async fn test_ask_against_foreign_table_is_a_labeled_failure() {
    let (tmp, config) = setup_test_env("http://127.0.0.1:9/");
    let db_path = tmp.path().join("data").join("shelf.sqlite");
    fs::create_dir_all(db_path.parent().unwrap()).unwrap();
    {
        let pool = shelf::db::connect(&db_path).await.unwrap();
        sqlx::query("CREATE TABLE books (isbn TEXT, stock INT)")
            .execute(&pool)
            .await
            .unwrap();
        pool.close().await;
    }

    let (stdout, stderr, success) = run_shelf(&config, &["ask", "how", "many", "books"]);
    assert!(success, "ask failed: {}", stderr);
    assert!(
        stdout.contains("Query failed: table 'books' exists with an unexpected schema"),
        "{}",
        stdout
    );
    assert!(stdout.contains("SQL: (none)"));

    // The foreign table was neither replaced nor extended.
    let pool = shelf::db::connect(&db_path).await.unwrap();
    let columns: Vec<(String,)> = sqlx::query_as("SELECT name FROM pragma_table_info('books')")
        .fetch_all(&pool)
        .await
        .unwrap();
    assert_eq!(columns, vec![("isbn".to_string(),), ("stock".to_string(),)]);
}

#[tokio::test]
async fn test_ask_without_catalog_does_not_create_table() {
    let (tmp, config) = setup_test_env("http://127.0.0.1:9/");

    let (stdout, stderr, success) = run_shelf(&config, &["ask", "--json", "anything?"]);
    assert!(success, "ask failed: {}", stderr);
    let line: serde_json::Value = serde_json::from_str(stdout.trim()).unwrap();
    assert!(line["answer"]
        .as_str()
        .unwrap()
        .starts_with("Query failed: table 'books' does not exist"));

    let (stdout, _, _) = run_shelf(&config, &["ask", "anything?"]);
    assert!(stdout.contains("does not exist"), "{}", stdout);

    let pool = shelf::db::connect(&tmp.path().join("data").join("shelf.sqlite"))
        .await
        .unwrap();
    let tables: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(tables, 0);
}

#[test]
fn test_unusable_database_path_is_reported_not_raised() {
    let (tmp, config) = setup_test_env("http://127.0.0.1:9/");
    let blocker = tmp.path().join("plain-file");
    fs::write(&blocker, "not a directory").unwrap();
    let db_path = blocker.join("sub").join("catalog.sqlite");
    let db_arg = db_path.to_str().unwrap();

    let (stdout, stderr, success) = run_shelf(&config, &["--db", db_arg, "scrape"]);
    assert!(success, "scrape raised: {}", stderr);
    assert!(stdout.contains("failed (persisting):"), "{}", stdout);

    let (stdout, stderr, success) = run_shelf(&config, &["--db", db_arg, "ask", "how many?"]);
    assert!(success, "ask raised: {}", stderr);
    assert!(stdout.starts_with("Query failed:"), "{}", stdout);
}

#[test]
fn test_missing_config_file_is_logged() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("nowhere.toml");
    let db_path = tmp.path().join("catalog.sqlite");

    let output = Command::new(shelf_binary())
        .env("RUST_LOG", "debug")
        .arg("--config")
        .arg(&missing)
        .arg("--db")
        .arg(&db_path)
        .arg("init")
        .output()
        .unwrap();

    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("config file not found, using defaults"), "{}", stderr);
}
