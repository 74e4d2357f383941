//! # Records
//!
//! The single persistence boundary between component state and storage.
//!
//! Every operation parses its path exactly once. Writes commit before anyone
//! is notified: first the instances bound to the written path, then the
//! observers with `{"path", "data"}`.

use crate::path::{PathCodec, RecordPath};
use crate::registry::BindingRegistry;
use crate::storage::{StoreHandle, StoreManager};
use crate::{AlpError, LoadFilter, Occasion, Record, RecordEntry};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Load, save and delete records by path.
#[derive(Debug, Clone)]
pub struct Records {
    codec: PathCodec,
    stores: Arc<StoreManager>,
    registry: Arc<BindingRegistry>,
}

impl Records {
    /// Wire the record operations to a store manager and a registry.
    #[must_use]
    pub fn new(codec: PathCodec, stores: Arc<StoreManager>, registry: Arc<BindingRegistry>) -> Self {
        Self {
            codec,
            stores,
            registry,
        }
    }

    /// Every record of every matching store, grouped by `db/store`.
    ///
    /// Groups are sorted by key and records by name. Stores with no records
    /// still appear, with an empty list.
    pub async fn load_all(&self, filter: &LoadFilter) -> Result<BTreeMap<String, Vec<RecordEntry>>, AlpError> {
        let mut groups = BTreeMap::new();
        for db in self.stores.list_databases() {
            if filter.db.as_ref().is_some_and(|wanted| *wanted != db) {
                continue;
            }
            for store_name in self.stores.list_stores(&db) {
                if filter.store.as_ref().is_some_and(|wanted| *wanted != store_name) {
                    continue;
                }
                let store = self.stores.get_store(&db, &store_name).await?;
                let entries = store
                    .to_array()
                    .await?
                    .into_iter()
                    .map(|record| {
                        let full_path = self.codec.build(&db, &store_name, &record.name);
                        RecordEntry::from_record(record, full_path)
                    })
                    .collect();
                groups.insert(format!("{db}/{store_name}"), entries);
            }
        }
        Ok(groups)
    }

    /// The data stored at `path`, or `None` when the record is absent.
    pub async fn load_one(&self, path: &str) -> Result<Option<Value>, AlpError> {
        let (target, store) = self.open(path)?;
        Ok(store.get(&target.record).await?.map(|r| r.data))
    }

    /// Store `data` at `path`, then notify.
    pub async fn save_one(&self, path: &str, data: Value) -> Result<(), AlpError> {
        let (target, store) = self.open(path)?;
        store.put(Record::new(target.record.clone(), data.clone())).await?;
        let shown = self.codec.build_path(&target);
        debug!(path = %shown, "saved record");

        let canonical = target.canonical();
        self.registry.notify(&canonical, Some(&data), Occasion::Save).await;
        let change = json!({ "path": shown, "data": data });
        self.registry.notify_observers(Occasion::Save, &change).await;
        Ok(())
    }

    /// Remove the record at `path`, then notify. Absent records are not an error.
    pub async fn delete_one(&self, path: &str) -> Result<(), AlpError> {
        let (target, store) = self.open(path)?;
        store.delete(&target.record).await?;
        let shown = self.codec.build_path(&target);
        debug!(path = %shown, "deleted record");

        let canonical = target.canonical();
        self.registry.notify(&canonical, None, Occasion::Delete).await;
        let change = json!({ "path": shown, "data": Value::Null });
        self.registry.notify_observers(Occasion::Delete, &change).await;
        Ok(())
    }

    /// Whether the database and store named by `path` exist.
    #[must_use]
    pub fn is_valid_path(&self, path: &str) -> bool {
        let target = self.codec.parse(path);
        self.stores.has(&target.db, &target.store)
    }

    /// The codec paths are parsed with.
    #[must_use]
    pub fn codec(&self) -> &PathCodec {
        &self.codec
    }

    fn open(&self, path: &str) -> Result<(RecordPath, StoreHandle), AlpError> {
        let target = self.codec.parse(path);
        let store = self.stores.resolve(&target.db, &target.store)?;
        Ok((target, store))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AlpConfig;
    use crate::lifecycle::tests::{Recorder, detached_instance};

    fn records() -> Records {
        let stores = StoreManager::open(&AlpConfig::in_memory()).expect("open");
        Records::new(PathCodec::default(), Arc::new(stores), Arc::new(BindingRegistry::new()))
    }

    #[tokio::test]
    async fn save_then_load() {
        let records = records();
        records.save_one("greeting", json!({"text": "hi"})).await.expect("save");
        assert_eq!(
            records.load_one("AlpDB/alp:greeting").await.expect("load"),
            Some(json!({"text": "hi"}))
        );
        assert_eq!(records.load_one("missing").await.expect("load"), None);
    }

    #[tokio::test]
    async fn missing_store_is_not_found() {
        let records = records();
        let err = records.load_one("nosuch:key").await.expect_err("should fail");
        assert!(matches!(err, AlpError::StoreNotFound { ref store, .. } if store == "nosuch"));
        assert!(!records.is_valid_path("nosuch:key"));
        assert!(records.is_valid_path("key"));
    }

    #[tokio::test]
    async fn save_notifies_bound_then_observers() {
        let records = records();
        let (bound, bound_log) = detached_instance(1, "AlpDB/alp:note");
        let (watcher, watch_log) = detached_instance(2, "AlpDB/alp:inspector");
        records.registry.register("AlpDB/alp:note", bound);
        records.registry.observe(watcher);

        records.save_one(" note ", json!({"text": "x"})).await.expect("save");

        assert_eq!(
            Recorder::take(&bound_log),
            vec![(Occasion::Save, Some(json!({"text": "x"})))]
        );
        assert_eq!(
            Recorder::take(&watch_log),
            vec![(Occasion::Save, Some(json!({"path": "note", "data": {"text": "x"}})))]
        );
    }

    #[tokio::test]
    async fn delete_notifies_without_payload() {
        let records = records();
        let (bound, log) = detached_instance(1, "AlpDB/alp:note");
        records.registry.register("AlpDB/alp:note", bound);

        records.save_one("note", json!(1)).await.expect("save");
        Recorder::take(&log);
        records.delete_one("note").await.expect("delete");
        records.delete_one("note").await.expect("delete again");

        assert_eq!(Recorder::take(&log), vec![(Occasion::Delete, None), (Occasion::Delete, None)]);
        assert_eq!(records.load_one("note").await.expect("load"), None);
    }

    #[tokio::test]
    async fn load_all_groups_and_filters() {
        let records = records();
        records.stores.create_database("Work", &["data", "logs"]).await.expect("db");
        records.save_one("Work/data:bills.jan", json!(5)).await.expect("save");
        records.save_one("Work/data:bills.feb", json!(6)).await.expect("save");
        records.save_one("plain", json!(null)).await.expect("save");

        let all = records.load_all(&LoadFilter::default()).await.expect("load_all");
        let keys: Vec<_> = all.keys().cloned().collect();
        assert_eq!(keys, vec!["AlpDB/alp", "Work/data", "Work/logs"]);
        assert!(all["Work/logs"].is_empty());

        let work = &all["Work/data"];
        assert_eq!(work[0].key, "bills.feb");
        assert_eq!(work[0].full_path, "Work/data:bills.feb");
        assert_eq!(work[0].namespace, "bills");
        assert_eq!(work[0].sig, "feb");
        assert_eq!(all["AlpDB/alp"][0].full_path, "plain");

        let only = records
            .load_all(&LoadFilter::db("Work").with_store("data"))
            .await
            .expect("filtered");
        assert_eq!(only.len(), 1);
        assert_eq!(only["Work/data"].len(), 2);
    }
}
