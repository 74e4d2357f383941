//! # alp-core
//!
//! The path-addressed reactive record registry behind Alp components.
//!
//! Components declare a tag, a template and their initial state. Once mounted,
//! each instance is bound to a record path; its state loads from, and saves
//! to, that record, and every other instance bound to the same path is
//! notified of the change.
//!
//! ## Layers (leaves first)
//!
//! 1. `path` - `[db/][store:]record` codec and canonical keys
//! 2. `storage` - databases and stores (redb or in-memory)
//! 3. `registry` - canonical path -> bound instances
//! 4. `records` - load-all / load / save / delete, the single persistence boundary
//! 5. `lifecycle` + `component` + `page` - mounting, readiness, rebinding
//! 6. `handle` - ready-wait proxy that queues calls until a component is ready
//!
//! All state hangs off an [`App`]; two apps in one process share nothing.
//!
//! ## Example
//!
//! ```
//! use alp_core::{App, AlpConfig};
//! use serde_json::json;
//!
//! # tokio::runtime::Runtime::new().expect("runtime").block_on(async {
//! let app = App::new(AlpConfig::in_memory()).expect("app");
//! app.stores().create_database("Work", &["data"]).await.expect("db");
//!
//! let records = app.records();
//! records.save_one("Work/data:bills.jan", json!({"amount": 5})).await.expect("save");
//! let data = records.load_one("Work/data:bills.jan").await.expect("load");
//! assert_eq!(data, Some(json!({"amount": 5})));
//! # });
//! ```

// =============================================================================
// MODULES
// =============================================================================

pub mod app;
pub mod builtins;
pub mod component;
pub mod config;
pub mod handle;
pub mod lifecycle;
mod names;
pub mod page;
pub mod path;
pub mod primitives;
pub mod records;
pub mod registry;
pub mod storage;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types
// =============================================================================

pub use types::{AlpError, ErrorKind, InstanceId, LoadFilter, Occasion, Record, RecordEntry};

// =============================================================================
// RE-EXPORTS: Registry
// =============================================================================

pub use app::App;
pub use builtins::{Inspector, TextBox};
pub use component::{Component, ComponentDescriptor, ComponentTable, Template};
pub use config::{AlpConfig, Persistence};
pub use handle::{Found, Handle, PendingCall};
pub use lifecycle::{EventBinding, Instance, Phase};
pub use page::{ElementId, Markup, Page, Selector};
pub use path::{PathCodec, RecordPath};
pub use records::Records;
pub use registry::BindingRegistry;
pub use storage::{StoreHandle, StoreManager};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the data if a previous holder panicked.
///
/// Every critical section in this crate is a plain map update, so the data
/// behind a poisoned lock is still consistent.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
