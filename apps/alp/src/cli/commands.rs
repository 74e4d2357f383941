//! # CLI Command Implementations
//!
//! Every command produces a JSON value; `render` turns it into either pretty
//! JSON (`--json-mode`) or a short human summary.

use super::Commands;
use alp_core::{AlpError, App, LoadFilter};
use serde_json::{Value, json};
use std::path::Path;

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum size of a `put --file` document (16 MB).
const MAX_INPUT_FILE_SIZE: u64 = 16 * 1024 * 1024;

/// Read a JSON document from disk, refusing directories and oversized files.
fn read_json_file(path: &Path) -> Result<Value, AlpError> {
    let canonical = path
        .canonicalize()
        .map_err(|e| AlpError::Config(format!("Invalid file path '{}': {}", path.display(), e)))?;
    let metadata = std::fs::metadata(&canonical)
        .map_err(|e| AlpError::Config(format!("Cannot read file metadata: {}", e)))?;
    if !metadata.is_file() {
        return Err(AlpError::Config(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }
    if metadata.len() > MAX_INPUT_FILE_SIZE {
        return Err(AlpError::Serialization(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            MAX_INPUT_FILE_SIZE
        )));
    }
    let bytes = std::fs::read(&canonical).map_err(|e| AlpError::Config(format!("Read file: {}", e)))?;
    serde_json::from_slice(&bytes).map_err(|e| AlpError::Serialization(e.to_string()))
}

// =============================================================================
// DISPATCH
// =============================================================================

/// Run one command against an open app.
pub async fn run(app: &App, command: &Commands) -> Result<Value, AlpError> {
    match command {
        Commands::Dbs => cmd_dbs(app),
        Commands::Stores { db } => cmd_stores(app, db),
        Commands::CreateDb { name, stores } => cmd_create_db(app, name, stores).await,
        Commands::CreateStore { db, store } => cmd_create_store(app, db, store).await,
        Commands::DropDb { name } => cmd_drop_db(app, name).await,
        Commands::Get { path } => cmd_get(app, path).await,
        Commands::Put { path, json, file } => {
            let data = match (json, file) {
                (_, Some(file)) => read_json_file(file)?,
                (Some(text), None) => {
                    serde_json::from_str(text).map_err(|e| AlpError::Serialization(e.to_string()))?
                }
                (None, None) => {
                    return Err(AlpError::Config("put needs a JSON argument or --file".to_string()));
                }
            };
            cmd_put(app, path, data).await
        }
        Commands::Del { path } => cmd_del(app, path).await,
        Commands::Ls { db, store } => {
            let filter = LoadFilter {
                db: db.clone(),
                store: store.clone(),
            };
            cmd_ls(app, &filter).await
        }
        Commands::Path { input } => Ok(cmd_path(app, input)),
        Commands::Status => cmd_status(app).await,
    }
}

// =============================================================================
// SCHEMA COMMANDS
// =============================================================================

/// List every open database with its version and stores.
pub fn cmd_dbs(app: &App) -> Result<Value, AlpError> {
    let stores = app.stores();
    let databases: Vec<Value> = stores
        .list_databases()
        .into_iter()
        .map(|name| {
            json!({
                "name": name,
                "version": stores.version(&name),
                "stores": stores.list_stores(&name),
            })
        })
        .collect();
    Ok(json!({ "databases": databases }))
}

/// List the stores of one database.
pub fn cmd_stores(app: &App, db: &str) -> Result<Value, AlpError> {
    let stores = app.stores();
    if !stores.has_database(db) {
        return Err(AlpError::DatabaseNotFound {
            db: db.to_string(),
            store: app.config().default_store.clone(),
        });
    }
    Ok(json!({
        "db": db,
        "version": stores.version(db),
        "stores": stores.list_stores(db),
    }))
}

pub async fn cmd_create_db(app: &App, name: &str, stores: &[String]) -> Result<Value, AlpError> {
    let names: Vec<&str> = stores.iter().map(String::as_str).collect();
    app.stores().create_database(name, &names).await?;
    tracing::info!("Created database {}", name);
    Ok(json!({
        "created": name,
        "stores": app.stores().list_stores(name),
    }))
}

pub async fn cmd_create_store(app: &App, db: &str, store: &str) -> Result<Value, AlpError> {
    app.stores().create_store(db, store).await?;
    tracing::info!("Created store {}/{}", db, store);
    Ok(json!({
        "db": db,
        "store": store,
        "version": app.stores().version(db),
    }))
}

pub async fn cmd_drop_db(app: &App, name: &str) -> Result<Value, AlpError> {
    let existed = app.stores().has_database(name);
    app.stores().delete_database(name).await?;
    Ok(json!({ "dropped": name, "existed": existed }))
}

// =============================================================================
// RECORD COMMANDS
// =============================================================================

/// Load one record; a missing record is `null`.
pub async fn cmd_get(app: &App, path: &str) -> Result<Value, AlpError> {
    let data = app.records().load_one(path).await?;
    Ok(json!({
        "path": app.codec().display(path),
        "data": data,
    }))
}

pub async fn cmd_put(app: &App, path: &str, data: Value) -> Result<Value, AlpError> {
    app.records().save_one(path, data).await?;
    Ok(json!({ "saved": app.codec().display(path) }))
}

pub async fn cmd_del(app: &App, path: &str) -> Result<Value, AlpError> {
    app.records().delete_one(path).await?;
    Ok(json!({ "deleted": app.codec().display(path) }))
}

/// Every matching record grouped under `db/store`.
pub async fn cmd_ls(app: &App, filter: &LoadFilter) -> Result<Value, AlpError> {
    let groups = app.records().load_all(filter).await?;
    let groups = serde_json::to_value(groups).map_err(|e| AlpError::Serialization(e.to_string()))?;
    Ok(json!({ "groups": groups }))
}

/// How `input` resolves against the configured defaults.
#[must_use]
pub fn cmd_path(app: &App, input: &str) -> Value {
    let codec = app.codec();
    let parsed = codec.parse(input);
    json!({
        "input": input,
        "db": parsed.db,
        "store": parsed.store,
        "record": parsed.record,
        "canonical": codec.canonical(input),
        "display": codec.display(input),
        "resolvable": app.records().is_valid_path(input),
    })
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Backend, data directory and per-database record counts.
pub async fn cmd_status(app: &App) -> Result<Value, AlpError> {
    let stores = app.stores();
    let mut databases = Vec::new();
    let mut total: u64 = 0;
    for db in stores.list_databases() {
        let mut records: u64 = 0;
        for store in stores.list_stores(&db) {
            records = records.saturating_add(stores.get_store(&db, &store).await?.count().await?);
        }
        total = total.saturating_add(records);
        databases.push(json!({ "name": db, "records": records }));
    }
    Ok(json!({
        "backend": if stores.is_persistent() { "redb" } else { "memory" },
        "data_dir": stores.data_dir().map(|dir| dir.display().to_string()),
        "default_db": app.config().default_db,
        "default_store": app.config().default_store,
        "databases": databases,
        "records": total,
    }))
}

// =============================================================================
// OUTPUT
// =============================================================================

/// Format a command result for the terminal.
#[must_use]
pub fn render(command: &Commands, output: &Value, json_mode: bool) -> String {
    if json_mode {
        return serde_json::to_string_pretty(output).unwrap_or_default();
    }

    match command {
        Commands::Dbs => list(&output["databases"], |db| {
            format!("{} (v{}): {}", text(&db["name"]), db["version"], joined(&db["stores"]))
        }),
        Commands::Stores { .. } => list(&output["stores"], text),
        Commands::CreateDb { .. } => format!(
            "Created database {} with stores: {}",
            text(&output["created"]),
            joined(&output["stores"])
        ),
        Commands::CreateStore { .. } => format!(
            "Created store {}/{} (version {})",
            text(&output["db"]),
            text(&output["store"]),
            output["version"]
        ),
        Commands::DropDb { .. } => format!("Dropped database {}", text(&output["dropped"])),
        Commands::Get { .. } => {
            serde_json::to_string_pretty(&output["data"]).unwrap_or_else(|_| "null".to_string())
        }
        Commands::Put { .. } => format!("Saved {}", text(&output["saved"])),
        Commands::Del { .. } => format!("Deleted {}", text(&output["deleted"])),
        Commands::Ls { .. } => render_groups(&output["groups"]),
        Commands::Path { .. } => format!(
            "Database:  {}\nStore:     {}\nRecord:    {}\nCanonical: {}\nDisplay:   {}",
            text(&output["db"]),
            text(&output["store"]),
            text(&output["record"]),
            text(&output["canonical"]),
            text(&output["display"])
        ),
        Commands::Status => render_status(output),
    }
}

fn render_groups(groups: &Value) -> String {
    let Some(groups) = groups.as_object() else {
        return String::new();
    };
    let mut lines = Vec::new();
    for (group, entries) in groups {
        lines.push(format!("[{group}]"));
        for entry in entries.as_array().into_iter().flatten() {
            lines.push(format!("  {} = {}", text(&entry["full_path"]), entry["data"]));
        }
    }
    lines.join("\n")
}

fn render_status(output: &Value) -> String {
    let mut lines = vec![
        "Alp Registry Status".to_string(),
        "===================".to_string(),
        format!("Backend:  {}", text(&output["backend"])),
    ];
    if let Some(dir) = output["data_dir"].as_str() {
        lines.push(format!("Data dir: {dir}"));
    }
    lines.push(format!(
        "Defaults: {}/{}",
        text(&output["default_db"]),
        text(&output["default_store"])
    ));
    lines.push(String::new());
    for db in output["databases"].as_array().into_iter().flatten() {
        lines.push(format!("{:<16} {} records", text(&db["name"]), db["records"]));
    }
    lines.push(format!("Total:           {} records", output["records"]));
    lines.join("\n")
}

fn list(values: &Value, line: impl Fn(&Value) -> String) -> String {
    values
        .as_array()
        .into_iter()
        .flatten()
        .map(line)
        .collect::<Vec<_>>()
        .join("\n")
}

fn joined(values: &Value) -> String {
    values
        .as_array()
        .into_iter()
        .flatten()
        .map(text)
        .collect::<Vec<_>>()
        .join(", ")
}

/// A JSON string without quotes; anything else in its JSON form.
fn text(value: &Value) -> String {
    value
        .as_str()
        .map_or_else(|| value.to_string(), str::to_string)
}
