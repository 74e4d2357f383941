//! # Built-in Components
//!
//! - `alp-text`: a text box persisted as `{text}` at its path
//! - `alp-inspector`: a browser over every database and store, kept current
//!   by observing all saves and deletes

use crate::component::{Component, ComponentDescriptor};
use crate::lifecycle::Instance;
use crate::page::Markup;
use crate::{AlpError, LoadFilter, Occasion, RecordEntry, lock};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Mutex;
use tracing::warn;

/// Descriptors for every built-in component.
#[must_use]
pub fn descriptors() -> Vec<ComponentDescriptor> {
    vec![
        ComponentDescriptor::new("text", text_template, TextBox::default),
        ComponentDescriptor::new("inspector", inspector_template, Inspector::default),
    ]
}

fn unknown(instance: &Instance, method: &str) -> AlpError {
    AlpError::UnknownMethod {
        tag: instance.tag().to_string(),
        method: method.to_string(),
    }
}

fn invalid_argument(instance: &Instance, method: &str, reason: impl Into<String>) -> AlpError {
    AlpError::InvalidArgument {
        tag: instance.tag().to_string(),
        method: method.to_string(),
        reason: reason.into(),
    }
}

fn string_arg<'a>(args: &'a [Value], instance: &Instance, method: &str) -> Result<&'a str, AlpError> {
    args.first()
        .and_then(Value::as_str)
        .ok_or_else(|| invalid_argument(instance, method, "expected a string"))
}

// =============================================================================
// TEXT
// =============================================================================

fn text_template(path: &str) -> Markup {
    Markup::element("div")
        .attr("class", "alp-text")
        .child(Markup::element("input").attr("name", "path").attr("x-model", path))
        .child(
            Markup::element("textarea")
                .attr("x-model", "text")
                .attr("@blur", "save()"),
        )
        .child(Markup::element("button").attr("@click", "del()").text("delete"))
}

/// State of `alp-text`.
#[derive(Debug, Default)]
pub struct TextBox {
    text: Mutex<String>,
}

impl TextBox {
    /// Current text.
    #[must_use]
    pub fn text(&self) -> String {
        lock(&self.text).clone()
    }

    fn set_text(&self, text: String) {
        *lock(&self.text) = text;
    }
}

fn text_of(data: &Value) -> Option<String> {
    let text = data.as_object()?.get("text")?;
    Some(match text {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

#[async_trait]
impl Component for TextBox {
    async fn refresh(&self, instance: &Instance) -> Result<(), AlpError> {
        let Some(data) = instance.load().await? else {
            self.set_text(String::new());
            return Ok(());
        };
        if let Some(text) = text_of(&data) {
            self.set_text(text);
            return Ok(());
        }

        let app = instance.app()?;
        if app.codec().equals(&instance.path(), instance.default_path()) {
            warn!(path = %instance.path(), "incompatible data at default path");
            self.set_text(String::new());
            return Ok(());
        }
        warn!(path = %instance.path(), "incompatible data - returning to default path");
        instance.use_path("").await
    }

    async fn on_ping(&self, _instance: &Instance, occasion: Occasion, payload: Option<&Value>) {
        match occasion {
            Occasion::Save => {
                if let Some(text) = payload.and_then(text_of) {
                    self.set_text(text);
                }
            }
            Occasion::Delete => self.set_text(String::new()),
            Occasion::Mount | Occasion::Ready | Occasion::PathChanged => {}
        }
    }

    async fn invoke(&self, instance: &Instance, method: &str, args: Vec<Value>) -> Result<Value, AlpError> {
        match method {
            "set" => {
                let text = string_arg(&args, instance, method)?.to_string();
                self.set_text(text.clone());
                instance.save(json!({ "text": text })).await?;
                Ok(Value::Null)
            }
            "save" => {
                instance.save(json!({ "text": self.text() })).await?;
                Ok(Value::Null)
            }
            "text" => Ok(Value::String(self.text())),
            "del" => {
                instance.del().await?;
                Ok(Value::Null)
            }
            "use_path" => {
                let path = args.first().and_then(Value::as_str).unwrap_or_default();
                instance.use_path(path).await?;
                Ok(Value::String(instance.path()))
            }
            _ => Err(unknown(instance, method)),
        }
    }
}

// =============================================================================
// INSPECTOR
// =============================================================================

fn inspector_template(_path: &str) -> Markup {
    Markup::element("div")
        .attr("class", "alp-inspector")
        .child(Markup::element("select").attr("name", "store"))
        .child(Markup::element("ul").attr("class", "pages"))
        .child(Markup::element("textarea").attr("name", "page-data"))
        .child(Markup::element("button").attr("@click", "clear()").text("clear"))
        .child(Markup::element("button").attr("@click", "refresh()").text("refresh"))
}

#[derive(Debug, Default)]
struct InspectorState {
    groups: BTreeMap<String, Vec<RecordEntry>>,
    store: Option<String>,
    page: Option<String>,
    last_change: Option<Value>,
}

impl InspectorState {
    fn first_page(&self, store: &str) -> Option<String> {
        self.groups.get(store)?.first().map(|e| e.full_path.clone())
    }

    fn has_page(&self, store: &str, page: &str) -> bool {
        self.groups
            .get(store)
            .is_some_and(|entries| entries.iter().any(|e| e.full_path == page))
    }
}

/// State of `alp-inspector`.
#[derive(Debug, Default)]
pub struct Inspector {
    state: Mutex<InspectorState>,
}

impl Inspector {
    /// Group keys (`db/store`) as of the last refresh.
    #[must_use]
    pub fn groups(&self) -> Vec<String> {
        lock(&self.state).groups.keys().cloned().collect()
    }

    /// Entries of one group.
    #[must_use]
    pub fn entries(&self, group: &str) -> Vec<RecordEntry> {
        lock(&self.state).groups.get(group).cloned().unwrap_or_default()
    }

    /// Selected group.
    #[must_use]
    pub fn store(&self) -> Option<String> {
        lock(&self.state).store.clone()
    }

    /// Selected record path.
    #[must_use]
    pub fn page(&self) -> Option<String> {
        lock(&self.state).page.clone()
    }

    /// The last `{path, data}` change observed.
    #[must_use]
    pub fn last_change(&self) -> Option<Value> {
        lock(&self.state).last_change.clone()
    }

    async fn reload(&self, instance: &Instance) -> Result<(), AlpError> {
        let groups = instance.app()?.records().load_all(&LoadFilter::default()).await?;
        let mut state = lock(&self.state);
        state.groups = groups;

        let store = state
            .store
            .clone()
            .filter(|s| state.groups.contains_key(s))
            .or_else(|| state.groups.keys().next().cloned());
        let page = match &store {
            Some(s) => state
                .page
                .clone()
                .filter(|p| state.has_page(s, p))
                .or_else(|| state.first_page(s)),
            None => None,
        };
        state.store = store;
        state.page = page;
        Ok(())
    }

    fn selected_page(&self, instance: &Instance, method: &str) -> Result<String, AlpError> {
        self.page()
            .ok_or_else(|| invalid_argument(instance, method, "no page selected"))
    }
}

#[async_trait]
impl Component for Inspector {
    async fn init(&self, instance: &Instance) -> Result<(), AlpError> {
        instance.observe()?;
        self.reload(instance).await
    }

    async fn refresh(&self, instance: &Instance) -> Result<(), AlpError> {
        self.reload(instance).await
    }

    async fn on_ping(&self, instance: &Instance, occasion: Occasion, payload: Option<&Value>) {
        if !matches!(occasion, Occasion::Save | Occasion::Delete) {
            return;
        }
        let Some(change) = payload.filter(|p| p.get("path").is_some()) else {
            return;
        };
        lock(&self.state).last_change = Some(change.clone());
        if let Err(e) = self.reload(instance).await {
            warn!(error = %e, "inspector reload failed");
        }
    }

    async fn invoke(&self, instance: &Instance, method: &str, args: Vec<Value>) -> Result<Value, AlpError> {
        match method {
            "refresh" => {
                self.reload(instance).await?;
                Ok(json!(self.groups()))
            }
            "groups" => Ok(json!(self.groups())),
            "go_store" => {
                let group = string_arg(&args, instance, method)?.to_string();
                let Some((db, store)) = group.split_once('/') else {
                    return Err(invalid_argument(instance, method, format!("'{group}' is not a db/store group")));
                };
                let known = lock(&self.state).groups.contains_key(&group);
                if !known {
                    // Created since the last reload, or missing: the store lookup tells which.
                    instance.app()?.stores().get_store(db, store).await?;
                    self.reload(instance).await?;
                }
                let mut state = lock(&self.state);
                state.store = Some(group.clone());
                state.page = state.first_page(&group);
                Ok(json!(state.page))
            }
            "go_page" => {
                let page = string_arg(&args, instance, method)?.to_string();
                let app = instance.app()?;
                let data = app.records().load_one(&page).await?;
                let group = app.codec().parse(&page).group_key();
                let mut state = lock(&self.state);
                state.store = Some(group);
                state.page = Some(page);
                Ok(data.unwrap_or(Value::Null))
            }
            "save_page" => {
                let page = self.selected_page(instance, method)?;
                let data = args.into_iter().next().unwrap_or(Value::Null);
                instance.app()?.records().save_one(&page, data).await?;
                Ok(json!(page))
            }
            "clear" => {
                let page = self.selected_page(instance, method)?;
                instance.app()?.records().delete_one(&page).await?;
                Ok(json!(page))
            }
            _ => Err(unknown(instance, method)),
        }
    }
}
