//! CLI integration tests: argument parsing, config resolution and command
//! execution against a temporary data directory.

use alp::cli::{self, Cli, Commands};
use alp::config::{self, Overrides};
use alp_core::{AlpConfig, AlpError, App, ErrorKind, Persistence};
use clap::Parser;
use serde_json::json;
use std::path::PathBuf;
use tempfile::TempDir;

fn persistent_app(dir: &TempDir) -> App {
    App::new(AlpConfig::persistent(dir.path())).expect("app")
}

async fn run(app: &App, args: &[&str]) -> serde_json::Value {
    let cli = Cli::try_parse_from(std::iter::once("alp").chain(args.iter().copied())).expect("parse");
    let command = cli.command.unwrap_or(Commands::Dbs);
    cli::run(app, &command).await.expect("run")
}

#[test]
fn parses_global_flags_after_subcommand() {
    let cli = Cli::try_parse_from(["alp", "get", "Work/data:x", "--json-mode", "-D", "/tmp/alp"]).expect("parse");
    assert!(cli.json_mode);
    assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/alp")));
    assert_eq!(
        cli.command,
        Some(Commands::Get {
            path: "Work/data:x".to_string()
        })
    );
}

#[test]
fn put_requires_json_or_file() {
    assert!(Cli::try_parse_from(["alp", "put", "p"]).is_err());
    assert!(Cli::try_parse_from(["alp", "put", "p", "1", "--file", "x.json"]).is_err());
    assert!(Cli::try_parse_from(["alp", "put", "p", "--file", "x.json"]).is_ok());
}

#[test]
fn config_file_then_flags() {
    let dir = TempDir::new().expect("tempdir");
    let file = dir.path().join("alp.toml");
    std::fs::write(&file, "default_db = \"Work\"\npersistence = \"redb\"\ndata_dir = \"/from/file\"\n").expect("write");

    let overrides = Overrides {
        config: Some(file),
        data_dir: Some(dir.path().to_path_buf()),
        memory: false,
    };
    let config = config::resolve(&overrides, |key| {
        (key == config::ENV_DATA_DIR).then(|| "/from/env".to_string())
    })
    .expect("resolve");

    assert_eq!(config.default_db, "Work");
    assert_eq!(config.persistence, Persistence::Redb);
    assert_eq!(config.data_dir, Some(dir.path().to_path_buf()));
}

#[test]
fn bad_default_name_in_file_is_rejected() {
    let dir = TempDir::new().expect("tempdir");
    let file = dir.path().join("alp.toml");
    std::fs::write(&file, "default_store = \"a:b\"\n").expect("write");

    let overrides = Overrides {
        config: Some(file),
        memory: true,
        ..Overrides::default()
    };
    let err = config::resolve(&overrides, |_| None).expect_err("invalid");
    assert!(matches!(err, AlpError::Config(ref msg) if msg.starts_with("default_store")));
}

#[tokio::test]
async fn schema_commands() {
    let dir = TempDir::new().expect("tempdir");
    let app = persistent_app(&dir);

    let created = run(&app, &["create-db", "Work", "data", "logs"]).await;
    assert_eq!(created, json!({"created": "Work", "stores": ["data", "logs"]}));

    let added = run(&app, &["create-store", "Work", "archive"]).await;
    assert_eq!(added["version"], json!(2));

    let stores = run(&app, &["stores", "Work"]).await;
    assert_eq!(stores["stores"], json!(["data", "logs", "archive"]));

    let dbs = run(&app, &[]).await;
    let names: Vec<_> = dbs["databases"]
        .as_array()
        .expect("array")
        .iter()
        .map(|db| db["name"].clone())
        .collect();
    assert_eq!(names, vec![json!("AlpDB"), json!("Work")]);

    let dropped = run(&app, &["drop-db", "Work"]).await;
    assert_eq!(dropped, json!({"dropped": "Work", "existed": true}));
    assert!(!dir.path().join("Work.redb").exists());
}

#[tokio::test]
async fn record_commands() {
    let dir = TempDir::new().expect("tempdir");
    let app = persistent_app(&dir);
    run(&app, &["create-db", "Work", "data"]).await;

    let saved = run(&app, &["put", "Work/data:bills.jan", r#"{"amount": 5}"#]).await;
    assert_eq!(saved, json!({"saved": "Work/data:bills.jan"}));

    let got = run(&app, &["get", "Work/data:bills.jan"]).await;
    assert_eq!(got["data"], json!({"amount": 5}));

    let listed = run(&app, &["ls", "--db", "Work"]).await;
    let entries = listed["groups"]["Work/data"].as_array().expect("group");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["namespace"], json!("bills"));
    assert_eq!(entries[0]["sig"], json!("jan"));

    run(&app, &["del", "Work/data:bills.jan"]).await;
    let gone = run(&app, &["get", "Work/data:bills.jan"]).await;
    assert_eq!(gone["data"], json!(null));
}

#[tokio::test]
async fn put_reads_a_file() {
    let dir = TempDir::new().expect("tempdir");
    let doc = dir.path().join("doc.json");
    std::fs::write(&doc, r#"{"text": "from file"}"#).expect("write");

    let app = App::in_memory().expect("app");
    let doc = doc.to_string_lossy().to_string();
    run(&app, &["put", "note", "--file", &doc]).await;
    let got = run(&app, &["get", "AlpDB/alp:note"]).await;
    assert_eq!(got, json!({"path": "note", "data": {"text": "from file"}}));
}

#[tokio::test]
async fn invalid_json_is_a_serialization_error() {
    let app = App::in_memory().expect("app");
    let command = Commands::Put {
        path: "note".to_string(),
        json: Some("{not json".to_string()),
        file: None,
    };
    let err = cli::run(&app, &command).await.expect_err("bad json");
    assert!(matches!(err, AlpError::Serialization(_)));
    assert_eq!(app.records().load_one("note").await.expect("load"), None);
}

#[tokio::test]
async fn missing_database_is_reported() {
    let app = App::in_memory().expect("app");
    let err = cli::run(
        &app,
        &Commands::Stores {
            db: "Nope".to_string(),
        },
    )
    .await
    .expect_err("missing");
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(err.to_string().contains("create_database(\"Nope\""));
}

#[tokio::test]
async fn path_and_status() {
    let app = App::in_memory().expect("app");
    let path = run(&app, &["path", "AlpDB/alp:x"]).await;
    assert_eq!(path["display"], json!("x"));
    assert_eq!(path["canonical"], json!("AlpDB/alp:x"));
    assert_eq!(path["resolvable"], json!(true));

    run(&app, &["put", "x", "1"]).await;
    let status = run(&app, &["status"]).await;
    assert_eq!(status["backend"], json!("memory"));
    assert_eq!(status["records"], json!(1));

    let text = cli::render(&Commands::Status, &status, false);
    assert!(text.contains("Backend:  memory"));
    let pretty = cli::render(&Commands::Status, &status, true);
    assert!(pretty.starts_with('{'));
}
