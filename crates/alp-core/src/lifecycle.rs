//! # Lifecycle
//!
//! Mounting, readiness, rebinding and unmounting of component instances.
//!
//! ```text
//! unmounted -> mounting -> ready -> (rebinding -> ready)* -> unmounted
//! ```
//!
//! Mounting a host element:
//!
//! 1. the host's children are replaced by the descriptor's template, whose
//!    `@event="method()"` attributes become event bindings;
//! 2. the instance is created, its path resolved (the host's `path` attribute
//!    overrides `alp.<suffix>`), registered, and attached to the host;
//! 3. `init` runs while nested component elements mount in document order,
//!    both on the current task, so a parent's init may wait on its children;
//! 4. on success the handle drains its queue, waiters resolve, and `Ready` is
//!    announced on the bound path with the host's attributes.

use crate::app::{App, AppInner};
use crate::component::{Component, ComponentDescriptor};
use crate::handle::{DrainStep, Found};
use crate::page::ElementId;
use crate::primitives::{EVENT_BINDING_PREFIX, PATH_ATTRIBUTE, PATH_EXPR};
use crate::{AlpError, InstanceId, Occasion, lock};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, error, warn};

/// Where an instance is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Template materialized; init running.
    Mounting,
    /// Init completed.
    Ready,
    /// Moving to another path; back to `Ready` once refreshed.
    Rebinding,
    /// Removed, or init failed.
    Unmounted,
}

/// A method bound to an element event by an `@event="method(args)"` attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct EventBinding {
    /// Method to invoke on the owning instance.
    pub method: String,
    /// Arguments, parsed as a JSON list.
    pub args: Vec<Value>,
}

impl EventBinding {
    /// Parse `method`, `method()` or `method(arg, ...)` with JSON arguments.
    pub fn parse(expr: &str) -> Option<Self> {
        let expr = expr.trim();
        let (method, args) = match expr.split_once('(') {
            Some((method, rest)) => {
                let inner = rest.trim_end().strip_suffix(')')?.trim();
                let args = if inner.is_empty() {
                    Vec::new()
                } else {
                    serde_json::from_str(&format!("[{inner}]")).ok()?
                };
                (method.trim(), args)
            }
            None => (expr, Vec::new()),
        };
        let valid = !method.is_empty() && method.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        valid.then(|| Self {
            method: method.to_string(),
            args,
        })
    }
}

#[derive(Debug)]
struct Binding {
    path: String,
    canonical: String,
    phase: Phase,
}

pub(crate) struct Seed {
    pub(crate) id: InstanceId,
    pub(crate) tag: String,
    pub(crate) host: ElementId,
    pub(crate) default_path: String,
    pub(crate) path: String,
    pub(crate) canonical: String,
    pub(crate) events: BTreeMap<(ElementId, String), EventBinding>,
}

// =============================================================================
// INSTANCE
// =============================================================================

/// One mounted component: its state object, its host, and its bound path.
pub struct Instance {
    id: InstanceId,
    tag: String,
    host: ElementId,
    default_path: String,
    binding: Mutex<Binding>,
    events: BTreeMap<(ElementId, String), EventBinding>,
    component: Box<dyn Component>,
    app: Weak<AppInner>,
    this: Weak<Instance>,
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.id)
            .field("tag", &self.tag)
            .field("host", &self.host)
            .field("binding", &*lock(&self.binding))
            .finish_non_exhaustive()
    }
}

impl Instance {
    pub(crate) fn new(seed: Seed, component: Box<dyn Component>, app: Weak<AppInner>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            id: seed.id,
            tag: seed.tag,
            host: seed.host,
            default_path: seed.default_path,
            binding: Mutex::new(Binding {
                path: seed.path,
                canonical: seed.canonical,
                phase: Phase::Mounting,
            }),
            events: seed.events,
            component,
            app,
            this: this.clone(),
        })
    }

    /// Instance identity.
    #[must_use]
    pub fn id(&self) -> InstanceId {
        self.id
    }

    /// Tag suffix of the component.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Host element.
    #[must_use]
    pub fn host(&self) -> ElementId {
        self.host
    }

    /// `alp.<suffix>`.
    #[must_use]
    pub fn default_path(&self) -> &str {
        &self.default_path
    }

    /// The path as given (attribute, default, or `use_path` argument).
    #[must_use]
    pub fn path(&self) -> String {
        lock(&self.binding).path.clone()
    }

    /// The bound path in `db/store:record` form.
    #[must_use]
    pub fn canonical_path(&self) -> String {
        lock(&self.binding).canonical.clone()
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        lock(&self.binding).phase
    }

    /// The component state object, if it is a `T`.
    #[must_use]
    pub fn component<T: Component>(&self) -> Option<&T> {
        let any: &dyn std::any::Any = &*self.component;
        any.downcast_ref()
    }

    /// The event binding for `event` on `element`, if the template declared one.
    #[must_use]
    pub fn event_binding(&self, element: ElementId, event: &str) -> Option<&EventBinding> {
        self.events.get(&(element, event.to_string()))
    }

    /// The owning app.
    pub fn app(&self) -> Result<App, AlpError> {
        self.app.upgrade().map(App::from_inner).ok_or(AlpError::AppClosed)
    }

    /// A host attribute.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<String> {
        self.app().ok()?.attribute(self.host, name)
    }

    /// Load the record at the bound path.
    pub async fn load(&self) -> Result<Option<Value>, AlpError> {
        let app = self.app()?;
        app.records().load_one(&self.path()).await
    }

    /// Save `data` at the bound path, notifying everyone bound to it.
    pub async fn save(&self, data: Value) -> Result<(), AlpError> {
        let app = self.app()?;
        app.records().save_one(&self.path(), data).await
    }

    /// Delete the record at the bound path.
    pub async fn del(&self) -> Result<(), AlpError> {
        let app = self.app()?;
        app.records().delete_one(&self.path()).await
    }

    /// First element below the host matching `selector`.
    pub fn find(&self, selector: &str) -> Result<Option<Found>, AlpError> {
        self.app()?.find_within(self.host, selector)
    }

    /// Receive every save and delete, on any path, through `on_ping`.
    pub fn observe(&self) -> Result<(), AlpError> {
        let app = self.app()?;
        let this = self.this.upgrade().ok_or(AlpError::Detached(self.host.0))?;
        app.registry().observe(this);
        Ok(())
    }

    /// Rebind to another path, then refresh.
    ///
    /// Surrounding whitespace is ignored and an empty path means the default
    /// path. Rebinding to the same canonical path only refreshes.
    pub async fn use_path(&self, path: &str) -> Result<(), AlpError> {
        let app = self.app()?;
        let requested = match path.trim() {
            "" => self.default_path.clone(),
            trimmed => trimmed.to_string(),
        };
        let canonical = app.codec().canonical(&requested);
        let this = self.this.upgrade().ok_or(AlpError::Detached(self.host.0))?;
        let registry = app.registry();

        // The registry moves under the binding lock so a concurrent unmount
        // either sees the new path or stops this rebind.
        let moved = {
            let mut binding = lock(&self.binding);
            if binding.phase == Phase::Unmounted {
                return Err(AlpError::Detached(self.host.0));
            }
            let from = std::mem::replace(&mut binding.path, requested.clone());
            if binding.canonical == canonical {
                None
            } else {
                if binding.phase == Phase::Ready {
                    binding.phase = Phase::Rebinding;
                }
                let old = std::mem::replace(&mut binding.canonical, canonical.clone());
                registry.unregister(&old, self.id);
                registry.register(&canonical, this);
                Some((from, old))
            }
        };

        if let Some((from, old)) = moved {
            debug!(tag = %self.tag, from = %old, to = %canonical, "rebound component");
            let change = json!({ "from": from, "to": requested });
            registry.notify(&canonical, Some(&change), Occasion::PathChanged).await;
        }

        let result = self.refresh().await;
        let mut binding = lock(&self.binding);
        if binding.phase == Phase::Rebinding {
            binding.phase = Phase::Ready;
        }
        result
    }

    /// Run the component's `refresh` hook.
    pub async fn refresh(&self) -> Result<(), AlpError> {
        self.component.refresh(self).await
    }

    /// Run a named method on the component.
    pub async fn invoke(&self, method: &str, args: Vec<Value>) -> Result<Value, AlpError> {
        self.component.invoke(self, method, args).await
    }

    pub(crate) async fn ping(&self, occasion: Occasion, payload: Option<&Value>) {
        self.component.on_ping(self, occasion, payload).await;
    }

    fn set_phase(&self, phase: Phase) {
        lock(&self.binding).phase = phase;
    }
}

// =============================================================================
// MOUNTING
// =============================================================================

type MountFuture<'a> = Pin<Box<dyn Future<Output = Result<(), AlpError>> + Send + 'a>>;

/// Mount every unmounted component element in the subtree at `element`.
///
/// Siblings keep mounting after one fails; the first failure is returned.
pub(crate) fn mount_tree(app: &App, element: ElementId) -> MountFuture<'_> {
    Box::pin(async move {
        if let Some(descriptor) = app.descriptor_for(element) {
            if app.is_mounted(element) {
                return Ok(());
            }
            return mount_component(app, element, descriptor).await;
        }
        mount_children(app, element).await
    })
}

async fn mount_children(app: &App, element: ElementId) -> Result<(), AlpError> {
    let mut first_error = None;
    for child in app.children(element) {
        if let Err(e) = mount_tree(app, child).await {
            first_error.get_or_insert(e);
        }
    }
    first_error.map_or(Ok(()), Err)
}

async fn mount_component(app: &App, host: ElementId, descriptor: ComponentDescriptor) -> Result<(), AlpError> {
    // The template replaces whatever the host held, including an earlier mount.
    for stale in app.children(host) {
        app.disconnect(stale)?;
    }
    let markup = descriptor.render(PATH_EXPR);
    let created = app.with_page(|page| page.materialize(host, &markup))?;
    let events = collect_events(app, &created);

    let default_path = descriptor.default_path();
    let path = app
        .attribute(host, PATH_ATTRIBUTE)
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| default_path.clone());
    let canonical = app.codec().canonical(&path);

    let seed = Seed {
        id: app.next_instance_id(),
        tag: descriptor.tag().to_string(),
        host,
        default_path,
        path,
        canonical: canonical.clone(),
        events,
    };
    let instance = Instance::new(seed, descriptor.instantiate(), app.downgrade());
    app.registry().register(&canonical, Arc::clone(&instance));
    app.attach_instance(host, Arc::clone(&instance));
    debug!(tag = %instance.tag, host = %host, path = %canonical, "mounting component");

    instance.ping(Occasion::Mount, None).await;

    let init = async {
        let result = instance.component.init(&instance).await;
        settle(app, &instance, result).await
    };
    let (init_result, children_result) = tokio::join!(init, mount_children(app, host));
    init_result?;
    children_result
}

/// Finish mounting after init resolved.
async fn settle(app: &App, instance: &Arc<Instance>, result: Result<(), AlpError>) -> Result<(), AlpError> {
    if instance.phase() == Phase::Unmounted {
        // Disconnected while init was running.
        return Ok(());
    }
    match result {
        Ok(()) => {
            become_ready(app, instance).await;
            Ok(())
        }
        Err(source) => {
            let err = AlpError::InitFailed {
                tag: instance.tag.clone(),
                source: Box::new(source),
            };
            error!(tag = %instance.tag, host = %instance.host, error = %err, "component init failed");
            unmount(app, instance);
            app.slots().fail(instance.host, &instance.tag, &err);
            Err(err)
        }
    }
}

async fn become_ready(app: &App, instance: &Arc<Instance>) {
    instance.set_phase(Phase::Ready);
    let slots = app.slots();
    slots.begin_drain(instance.host, Arc::clone(instance));
    loop {
        match slots.next_step(instance.host) {
            DrainStep::Call(call) => {
                debug!(tag = %instance.tag, method = %call.method, "replaying queued call");
                if let Err(e) = instance.invoke(&call.method, call.args).await {
                    warn!(tag = %instance.tag, method = %call.method, error = %e, "queued call failed");
                }
            }
            DrainStep::Done(waiters) => {
                for waiter in waiters {
                    let _ = waiter.send(Ok(Arc::clone(instance)));
                }
                break;
            }
        }
    }

    let attributes: Map<String, Value> = app
        .attributes(instance.host)
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect();
    let canonical = instance.canonical_path();
    app.registry()
        .notify(&canonical, Some(&Value::Object(attributes)), Occasion::Ready)
        .await;
}

/// Detach an instance from the registry and its host.
///
/// Runs when the host is removed, or moved under an element that is not connected.
pub(crate) fn unmount(app: &App, instance: &Instance) {
    let registry = app.registry();
    let canonical = {
        let mut binding = lock(&instance.binding);
        binding.phase = Phase::Unmounted;
        registry.unregister(&binding.canonical, instance.id);
        binding.canonical.clone()
    };
    registry.unobserve(instance.id);
    app.detach_instance(instance.host, instance.id);
    debug!(tag = %instance.tag, host = %instance.host, path = %canonical, "unmounted component");
}

fn collect_events(app: &App, created: &[ElementId]) -> BTreeMap<(ElementId, String), EventBinding> {
    let mut events = BTreeMap::new();
    for &element in created {
        for (name, expr) in app.attributes(element) {
            let Some(event) = name.strip_prefix(EVENT_BINDING_PREFIX) else {
                continue;
            };
            match EventBinding::parse(&expr) {
                Some(binding) => {
                    events.insert((element, event.to_string()), binding);
                }
                None => warn!(element = %element, event, expr = %expr, "ignoring malformed event binding"),
            }
        }
    }
    events
}
