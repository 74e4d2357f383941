//! # Components
//!
//! A component is declared once with a [`ComponentDescriptor`]: its tag
//! suffix, a template, and a factory for its initial state. Each mounted
//! element gets a fresh state object from the factory, and the lifecycle
//! drives it through the [`Component`] hooks.

use crate::lifecycle::Instance;
use crate::page::Markup;
use crate::primitives::{component_tag, default_component_path};
use crate::{AlpError, Occasion};
use async_trait::async_trait;
use serde_json::Value;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Hooks a component state object may implement. Every hook is optional.
///
/// State lives inside the implementor, so it needs interior mutability
/// (a `Mutex` around whatever the component keeps).
#[async_trait]
pub trait Component: Any + Send + Sync {
    /// Runs once after mounting. Defaults to [`Component::refresh`].
    async fn init(&self, instance: &Instance) -> Result<(), AlpError> {
        self.refresh(instance).await
    }

    /// Reload state from the bound path.
    async fn refresh(&self, _instance: &Instance) -> Result<(), AlpError> {
        Ok(())
    }

    /// Notification from the registry.
    async fn on_ping(&self, _instance: &Instance, _occasion: Occasion, _payload: Option<&Value>) {}

    /// Call a named method, as queued by a handle or bound to an event.
    async fn invoke(&self, instance: &Instance, method: &str, _args: Vec<Value>) -> Result<Value, AlpError> {
        Err(AlpError::UnknownMethod {
            tag: instance.tag().to_string(),
            method: method.to_string(),
        })
    }
}

/// Template: takes the path expression, returns the element tree to mount.
pub type Template = fn(&str) -> Markup;

type Factory = Arc<dyn Fn() -> Box<dyn Component> + Send + Sync>;

/// Declaration of one component type.
#[derive(Clone)]
pub struct ComponentDescriptor {
    tag: String,
    template: Template,
    factory: Factory,
}

impl ComponentDescriptor {
    /// Declare `alp-<tag>` with a template and an initial-state factory.
    pub fn new<C, F>(tag: impl Into<String>, template: Template, factory: F) -> Self
    where
        C: Component,
        F: Fn() -> C + Send + Sync + 'static,
    {
        Self {
            tag: tag.into(),
            template,
            factory: Arc::new(move || Box::new(factory()) as Box<dyn Component>),
        }
    }

    /// Tag suffix, e.g. `text`.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Full element tag, e.g. `alp-text`.
    #[must_use]
    pub fn element_tag(&self) -> String {
        component_tag(&self.tag)
    }

    /// Path used when the host has no `path` attribute.
    #[must_use]
    pub fn default_path(&self) -> String {
        default_component_path(&self.tag)
    }

    pub(crate) fn render(&self, path_expr: &str) -> Markup {
        (self.template)(path_expr)
    }

    pub(crate) fn instantiate(&self) -> Box<dyn Component> {
        (self.factory)()
    }
}

impl fmt::Debug for ComponentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDescriptor")
            .field("tag", &self.tag)
            .finish_non_exhaustive()
    }
}

/// Descriptors keyed by tag suffix.
#[derive(Debug, Default)]
pub struct ComponentTable {
    descriptors: BTreeMap<String, ComponentDescriptor>,
}

impl ComponentTable {
    /// Register a descriptor; a suffix can only be defined once.
    pub fn define(&mut self, descriptor: ComponentDescriptor) -> Result<(), AlpError> {
        let tag = descriptor.tag().to_ascii_lowercase();
        if tag.is_empty() {
            return Err(AlpError::invalid_name(&tag, "component tag is empty"));
        }
        if self.descriptors.contains_key(&tag) {
            return Err(AlpError::AlreadyDefined(tag));
        }
        self.descriptors.insert(tag, descriptor);
        Ok(())
    }

    /// Descriptor for a full element tag such as `alp-text`.
    #[must_use]
    pub fn for_element(&self, element_tag: &str) -> Option<&ComponentDescriptor> {
        element_tag
            .strip_prefix(crate::primitives::COMPONENT_PREFIX)
            .and_then(|suffix| self.descriptors.get(suffix))
    }

    /// Whether the suffix is defined.
    #[must_use]
    pub fn contains(&self, tag: &str) -> bool {
        self.descriptors.contains_key(tag)
    }

    /// Defined suffixes, sorted.
    #[must_use]
    pub fn tags(&self) -> Vec<String> {
        self.descriptors.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Blank;

    impl Component for Blank {}

    fn template(path: &str) -> Markup {
        Markup::element("div").attr("data-path", path)
    }

    #[test]
    fn descriptor_names() {
        let d = ComponentDescriptor::new("note", template, || Blank);
        assert_eq!(d.tag(), "note");
        assert_eq!(d.element_tag(), "alp-note");
        assert_eq!(d.default_path(), "alp.note");
        assert_eq!(d.render("path").attributes[0].1, "path");
    }

    #[test]
    fn double_define_fails() {
        let mut table = ComponentTable::default();
        table
            .define(ComponentDescriptor::new("note", template, || Blank))
            .expect("first define");
        let err = table
            .define(ComponentDescriptor::new("note", template, || Blank))
            .expect_err("second define");
        assert!(matches!(err, AlpError::AlreadyDefined(ref t) if t == "note"));
        assert_eq!(table.tags(), vec!["note".to_string()]);
    }

    #[test]
    fn lookup_by_element_tag() {
        let mut table = ComponentTable::default();
        table
            .define(ComponentDescriptor::new("note", template, || Blank))
            .expect("define");
        assert!(table.for_element("alp-note").is_some());
        assert!(table.for_element("note").is_none());
        assert!(table.for_element("alp-other").is_none());
        assert!(table.contains("note"));
    }
}
