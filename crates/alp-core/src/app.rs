//! # App
//!
//! The application context. Owns the store manager, the binding registry,
//! the page, the component table and the handle slots. Cheap to clone;
//! clones share everything. Instances hold a weak reference back, so dropping
//! the last `App` releases the whole graph.

use crate::builtins;
use crate::component::{ComponentDescriptor, ComponentTable};
use crate::handle::{Found, Handle, Slots};
use crate::lifecycle::{self, Instance};
use crate::page::{ElementId, Page, Selector};
use crate::path::PathCodec;
use crate::primitives::COMPONENT_PREFIX;
use crate::records::Records;
use crate::registry::BindingRegistry;
use crate::storage::StoreManager;
use crate::{AlpConfig, AlpError, InstanceId, lock};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, info, warn};

pub(crate) struct AppInner {
    config: AlpConfig,
    codec: PathCodec,
    stores: Arc<StoreManager>,
    registry: Arc<BindingRegistry>,
    records: Records,
    page: Mutex<Page>,
    components: Mutex<ComponentTable>,
    slots: Slots,
    hosts: Mutex<BTreeMap<ElementId, Arc<Instance>>>,
    next_instance: AtomicU64,
}

/// Application context.
#[derive(Clone)]
pub struct App {
    inner: Arc<AppInner>,
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("config", &self.inner.config)
            .field("components", &lock(&self.inner.components).tags())
            .finish_non_exhaustive()
    }
}

impl App {
    /// Open storage per `config` and create an empty page.
    pub fn new(config: AlpConfig) -> Result<Self, AlpError> {
        let stores = Arc::new(StoreManager::open(&config)?);
        let codec = PathCodec::new(config.default_db.clone(), config.default_store.clone());
        let registry = Arc::new(BindingRegistry::new());
        let records = Records::new(codec.clone(), Arc::clone(&stores), Arc::clone(&registry));
        info!(
            persistent = stores.is_persistent(),
            default_db = %config.default_db,
            default_store = %config.default_store,
            "alp app opened"
        );
        Ok(Self {
            inner: Arc::new(AppInner {
                config,
                codec,
                stores,
                registry,
                records,
                page: Mutex::new(Page::new()),
                components: Mutex::new(ComponentTable::default()),
                slots: Slots::default(),
                hosts: Mutex::new(BTreeMap::new()),
                next_instance: AtomicU64::new(1),
            }),
        })
    }

    /// An app with memory storage.
    pub fn in_memory() -> Result<Self, AlpError> {
        Self::new(AlpConfig::in_memory())
    }

    pub(crate) fn from_inner(inner: Arc<AppInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<AppInner> {
        Arc::downgrade(&self.inner)
    }

    /// Configuration the app was opened with.
    #[must_use]
    pub fn config(&self) -> &AlpConfig {
        &self.inner.config
    }

    /// Path codec using the configured defaults.
    #[must_use]
    pub fn codec(&self) -> &PathCodec {
        &self.inner.codec
    }

    /// Database and store management.
    #[must_use]
    pub fn stores(&self) -> &StoreManager {
        &self.inner.stores
    }

    /// Path bindings.
    #[must_use]
    pub fn registry(&self) -> &BindingRegistry {
        &self.inner.registry
    }

    /// Record operations.
    #[must_use]
    pub fn records(&self) -> &Records {
        &self.inner.records
    }

    pub(crate) fn slots(&self) -> &Slots {
        &self.inner.slots
    }

    // =========================================================================
    // COMPONENTS
    // =========================================================================

    /// Define a component. Connected elements already carrying its tag mount now.
    pub async fn define(&self, descriptor: ComponentDescriptor) -> Result<(), AlpError> {
        let element_tag = descriptor.element_tag();
        lock(&self.inner.components).define(descriptor)?;
        debug!(tag = %element_tag, "defined component");

        let waiting: Vec<ElementId> = self.with_page(|page| {
            page.subtree(page.root())
                .unwrap_or_default()
                .into_iter()
                .filter(|&id| page.tag(id).is_ok_and(|t| t == element_tag))
                .collect()
        });
        for host in waiting {
            if !self.is_connected(host) {
                continue;
            }
            if let Err(e) = lifecycle::mount_tree(self, host).await {
                warn!(tag = %element_tag, host = %host, error = %e, "upgrade failed");
            }
        }
        Ok(())
    }

    /// Define the built-in `alp-text` and `alp-inspector` components.
    pub async fn define_builtins(&self) -> Result<(), AlpError> {
        for descriptor in builtins::descriptors() {
            self.define(descriptor).await?;
        }
        Ok(())
    }

    /// Whether `alp-<tag>` is defined.
    #[must_use]
    pub fn is_defined(&self, tag: &str) -> bool {
        lock(&self.inner.components).contains(tag)
    }

    pub(crate) fn descriptor_for(&self, element: ElementId) -> Option<ComponentDescriptor> {
        let tag = self.tag(element)?;
        lock(&self.inner.components).for_element(&tag).cloned()
    }

    // =========================================================================
    // PAGE
    // =========================================================================

    /// The root element.
    #[must_use]
    pub fn root(&self) -> ElementId {
        lock(&self.inner.page).root()
    }

    /// Create an element without attaching it.
    pub fn create_element<I, K, V>(&self, tag: &str, attributes: I) -> ElementId
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.with_page(|page| page.create(tag, attributes))
    }

    /// Create an element under `parent`, mounting it if it is a component.
    ///
    /// The element stays in the page even when its init fails; the error is
    /// returned after every nested component has had its turn.
    pub async fn connect<I, K, V>(&self, parent: ElementId, tag: &str, attributes: I) -> Result<ElementId, AlpError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let element = self.create_element(tag, attributes);
        self.attach(parent, element).await?;
        Ok(element)
    }

    /// Append `child` (and its subtree) under `parent`, mounting components once connected.
    pub async fn attach(&self, parent: ElementId, child: ElementId) -> Result<(), AlpError> {
        self.with_page(|page| page.append(parent, child))?;
        if self.is_connected(child) {
            lifecycle::mount_tree(self, child).await?;
        } else {
            self.release_detached(child);
        }
        Ok(())
    }

    /// Unmount what the subtree at `element` had mounted, now that it is off the page.
    ///
    /// Calls queued on never-mounted elements keep waiting for a connection.
    fn release_detached(&self, element: ElementId) {
        let subtree = self.with_page(|page| page.subtree(element)).unwrap_or_default();
        for id in subtree {
            let instance = lock(&self.inner.hosts).get(&id).cloned();
            let failed = self.inner.slots.has_failed(id);
            if let Some(instance) = &instance {
                lifecycle::unmount(self, instance);
            }
            if instance.is_some() || failed {
                self.inner.slots.remove(id);
            }
        }
    }

    /// Remove `element` and its subtree, unmounting every instance in it.
    pub fn disconnect(&self, element: ElementId) -> Result<(), AlpError> {
        let removed = self.with_page(|page| page.remove(element))?;
        for id in removed {
            let instance = lock(&self.inner.hosts).get(&id).cloned();
            if let Some(instance) = instance {
                lifecycle::unmount(self, &instance);
            }
            self.inner.slots.remove(id);
        }
        Ok(())
    }

    /// Whether the element exists.
    #[must_use]
    pub fn contains(&self, element: ElementId) -> bool {
        lock(&self.inner.page).contains(element)
    }

    /// Whether the element is attached to the root.
    #[must_use]
    pub fn is_connected(&self, element: ElementId) -> bool {
        lock(&self.inner.page).is_connected(element)
    }

    /// Element tag.
    #[must_use]
    pub fn tag(&self, element: ElementId) -> Option<String> {
        lock(&self.inner.page).tag(element).ok().map(str::to_string)
    }

    /// One attribute.
    #[must_use]
    pub fn attribute(&self, element: ElementId, name: &str) -> Option<String> {
        lock(&self.inner.page).attribute(element, name).map(str::to_string)
    }

    /// All attributes; empty for a missing element.
    #[must_use]
    pub fn attributes(&self, element: ElementId) -> BTreeMap<String, String> {
        lock(&self.inner.page)
            .attributes(element)
            .map(Clone::clone)
            .unwrap_or_default()
    }

    /// Text content.
    #[must_use]
    pub fn text(&self, element: ElementId) -> Option<String> {
        lock(&self.inner.page).text(element).map(str::to_string)
    }

    /// Children in document order; empty for a missing element.
    #[must_use]
    pub fn children(&self, element: ElementId) -> Vec<ElementId> {
        lock(&self.inner.page).children(element).unwrap_or_default()
    }

    pub(crate) fn with_page<R>(&self, f: impl FnOnce(&mut Page) -> R) -> R {
        f(&mut lock(&self.inner.page))
    }

    // =========================================================================
    // INSTANCES
    // =========================================================================

    /// The instance mounted on `element`.
    #[must_use]
    pub fn instance(&self, element: ElementId) -> Option<Arc<Instance>> {
        lock(&self.inner.hosts).get(&element).cloned()
    }

    /// Every mounted instance, ordered by host.
    #[must_use]
    pub fn instances(&self) -> Vec<Arc<Instance>> {
        lock(&self.inner.hosts).values().cloned().collect()
    }

    pub(crate) fn is_mounted(&self, element: ElementId) -> bool {
        self.instance(element).is_some() || self.inner.slots.has_failed(element)
    }

    pub(crate) fn attach_instance(&self, host: ElementId, instance: Arc<Instance>) {
        lock(&self.inner.hosts).insert(host, instance);
    }

    pub(crate) fn detach_instance(&self, host: ElementId, id: InstanceId) {
        let mut hosts = lock(&self.inner.hosts);
        if hosts.get(&host).is_some_and(|i| i.id() == id) {
            hosts.remove(&host);
        }
    }

    pub(crate) fn next_instance_id(&self) -> InstanceId {
        InstanceId(self.inner.next_instance.fetch_add(1, Ordering::Relaxed))
    }

    /// Handle for a component element, ready or not.
    pub fn handle(&self, element: ElementId) -> Result<Handle, AlpError> {
        let tag = self.tag(element).ok_or(AlpError::ElementNotFound(element.0))?;
        if !tag.starts_with(COMPONENT_PREFIX) {
            return Err(AlpError::UnknownComponent(tag));
        }
        Ok(Handle::new(self.clone(), element))
    }

    /// First element in the page matching `selector`.
    pub fn find(&self, selector: &str) -> Result<Option<Found>, AlpError> {
        self.find_within(self.root(), selector)
    }

    pub(crate) fn find_within(&self, scope: ElementId, selector: &str) -> Result<Option<Found>, AlpError> {
        let selector = Selector::parse(selector)?;
        let hit = self.with_page(|page| page.query(scope, &selector))?;
        Ok(hit.map(|element| self.classify(element)))
    }

    fn classify(&self, element: ElementId) -> Found {
        let is_component = self.tag(element).is_some_and(|t| t.starts_with(COMPONENT_PREFIX));
        if !is_component {
            return Found::Element(element);
        }
        match self.inner.slots.ready_instance(element) {
            Some(instance) => Found::Component(instance),
            None => Found::Pending(Handle::new(self.clone(), element)),
        }
    }

    /// Fire `event` on `element`.
    ///
    /// Runs the `@event` binding the owning component's template put on the
    /// element; the call is queued if the owner is not ready yet. Returns
    /// `Ok(None)` when there is no binding or the call was queued.
    pub async fn dispatch(&self, element: ElementId, event: &str) -> Result<Option<Value>, AlpError> {
        if !self.contains(element) {
            return Err(AlpError::ElementNotFound(element.0));
        }
        let mut current = lock(&self.inner.page).parent(element);
        while let Some(at) = current {
            if let Some(owner) = self.instance(at) {
                let Some(binding) = owner.event_binding(element, event).cloned() else {
                    return Ok(None);
                };
                debug!(tag = %owner.tag(), event, method = %binding.method, "dispatching event");
                return Handle::new(self.clone(), at).call(&binding.method, binding.args).await;
            }
            current = lock(&self.inner.page).parent(at);
        }
        Ok(None)
    }
}
