//! # Handles
//!
//! A [`Handle`] stands for a component element that may not be ready yet.
//! Calls made through it before readiness are queued per element and replayed
//! in order once the instance's init completes; `ready()` waits for that
//! moment. All handles for one element share the same slot.
//!
//! Slot states:
//!
//! ```text
//! Pending --init ok--> Draining --queue empty--> Ready
//!    |
//!    +-----init err--> Failed
//! ```
//!
//! Calls that arrive while `Draining` are appended behind the queued ones, so
//! replay order is the order calls were made. Waiters registered while
//! `Pending` resolve once the queue is empty; a wait that starts while
//! `Draining` resolves at once.

use crate::app::App;
use crate::lifecycle::Instance;
use crate::page::ElementId;
use crate::{AlpError, lock};
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tracing::{error, warn};

/// A method call waiting for its component to become ready.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCall {
    /// Method name.
    pub method: String,
    /// Arguments.
    pub args: Vec<Value>,
}

/// Result of looking an element up by selector.
#[derive(Debug, Clone)]
pub enum Found {
    /// A plain element.
    Element(ElementId),
    /// A ready component.
    Component(Arc<Instance>),
    /// A component element that is not ready yet.
    Pending(Handle),
}

impl Found {
    /// The element the lookup matched.
    #[must_use]
    pub fn element(&self) -> ElementId {
        match self {
            Self::Element(id) => *id,
            Self::Component(instance) => instance.host(),
            Self::Pending(handle) => handle.element(),
        }
    }
}

// =============================================================================
// SLOTS
// =============================================================================

type Waiter = oneshot::Sender<Result<Arc<Instance>, AlpError>>;

#[derive(Debug)]
enum Slot {
    Pending {
        queue: VecDeque<PendingCall>,
        waiters: Vec<Waiter>,
    },
    Draining {
        instance: Arc<Instance>,
        queue: VecDeque<PendingCall>,
        waiters: Vec<Waiter>,
    },
    Ready(Arc<Instance>),
    Failed(AlpError),
}

impl Default for Slot {
    fn default() -> Self {
        Self::Pending {
            queue: VecDeque::new(),
            waiters: Vec::new(),
        }
    }
}

pub(crate) enum Enqueued {
    Run(Arc<Instance>, PendingCall),
    Queued,
    Failed(AlpError),
}

pub(crate) enum Wait {
    Ready(Arc<Instance>),
    Waiting(oneshot::Receiver<Result<Arc<Instance>, AlpError>>),
    Failed(AlpError),
}

pub(crate) enum DrainStep {
    Call(PendingCall),
    Done(Vec<Waiter>),
}

/// Per-element slots, owned by the app.
#[derive(Debug, Default)]
pub(crate) struct Slots {
    slots: Mutex<BTreeMap<ElementId, Slot>>,
}

impl Slots {
    pub(crate) fn enqueue(&self, element: ElementId, call: PendingCall) -> Enqueued {
        let mut slots = lock(&self.slots);
        match slots.entry(element).or_default() {
            Slot::Ready(instance) => Enqueued::Run(Arc::clone(instance), call),
            Slot::Pending { queue, .. } | Slot::Draining { queue, .. } => {
                queue.push_back(call);
                Enqueued::Queued
            }
            Slot::Failed(err) => Enqueued::Failed(err.clone()),
        }
    }

    pub(crate) fn wait(&self, element: ElementId) -> Wait {
        let mut slots = lock(&self.slots);
        match slots.entry(element).or_default() {
            // A replayed call may itself wait on its own host; the instance is live by now.
            Slot::Ready(instance) | Slot::Draining { instance, .. } => Wait::Ready(Arc::clone(instance)),
            Slot::Pending { waiters, .. } => {
                let (tx, rx) = oneshot::channel();
                waiters.push(tx);
                Wait::Waiting(rx)
            }
            Slot::Failed(err) => Wait::Failed(err.clone()),
        }
    }

    /// Init succeeded: start replaying the queue against `instance`.
    pub(crate) fn begin_drain(&self, element: ElementId, instance: Arc<Instance>) {
        let mut slots = lock(&self.slots);
        let (queue, waiters) = match slots.remove(&element) {
            Some(Slot::Pending { queue, waiters }) => (queue, waiters),
            _ => (VecDeque::new(), Vec::new()),
        };
        slots.insert(
            element,
            Slot::Draining {
                instance,
                queue,
                waiters,
            },
        );
    }

    /// Pop the next queued call, or finish the drain and hand back the waiters.
    pub(crate) fn next_step(&self, element: ElementId) -> DrainStep {
        let mut slots = lock(&self.slots);
        let Some(slot) = slots.get_mut(&element) else {
            return DrainStep::Done(Vec::new());
        };
        match slot {
            Slot::Draining {
                instance,
                queue,
                waiters,
            } => match queue.pop_front() {
                Some(call) => DrainStep::Call(call),
                None => {
                    let waiters = std::mem::take(waiters);
                    *slot = Slot::Ready(Arc::clone(instance));
                    DrainStep::Done(waiters)
                }
            },
            _ => DrainStep::Done(Vec::new()),
        }
    }

    /// Init failed: drop queued calls, reject waiters, remember the error.
    pub(crate) fn fail(&self, element: ElementId, tag: &str, err: &AlpError) {
        let previous = lock(&self.slots).insert(element, Slot::Failed(err.clone()));
        if let Some(Slot::Pending { queue, waiters } | Slot::Draining { queue, waiters, .. }) = previous {
            for call in queue {
                error!(element = %element, tag, method = %call.method, "dropping queued call after failed init");
            }
            for waiter in waiters {
                // Receivers dropped by their callers are fine to skip.
                let _ = waiter.send(Err(err.clone()));
            }
        }
    }

    /// The element is gone: forget its slot and release anyone waiting on it.
    pub(crate) fn remove(&self, element: ElementId) {
        let previous = lock(&self.slots).remove(&element);
        if let Some(Slot::Pending { queue, waiters } | Slot::Draining { queue, waiters, .. }) = previous {
            if !queue.is_empty() {
                warn!(element = %element, dropped = queue.len(), "element removed with queued calls");
            }
            for waiter in waiters {
                let _ = waiter.send(Err(AlpError::Detached(element.0)));
            }
        }
    }

    pub(crate) fn ready_instance(&self, element: ElementId) -> Option<Arc<Instance>> {
        match lock(&self.slots).get(&element) {
            Some(Slot::Ready(instance)) => Some(Arc::clone(instance)),
            _ => None,
        }
    }

    pub(crate) fn has_failed(&self, element: ElementId) -> bool {
        matches!(lock(&self.slots).get(&element), Some(Slot::Failed(_)))
    }

    pub(crate) fn queued(&self, element: ElementId) -> usize {
        match lock(&self.slots).get(&element) {
            Some(Slot::Pending { queue, .. } | Slot::Draining { queue, .. }) => queue.len(),
            _ => 0,
        }
    }
}

// =============================================================================
// HANDLE
// =============================================================================

/// Proxy for a component element, usable before the component is ready.
#[derive(Debug, Clone)]
pub struct Handle {
    app: App,
    element: ElementId,
}

impl Handle {
    pub(crate) fn new(app: App, element: ElementId) -> Self {
        Self { app, element }
    }

    /// The host element.
    #[must_use]
    pub fn element(&self) -> ElementId {
        self.element
    }

    /// Invoke a method now if ready, otherwise queue it.
    ///
    /// Returns `Ok(Some(result))` when the call ran, `Ok(None)` when it was
    /// queued for replay.
    pub async fn call(&self, method: &str, args: Vec<Value>) -> Result<Option<Value>, AlpError> {
        if !self.app.contains(self.element) {
            return Err(AlpError::Detached(self.element.0));
        }
        let call = PendingCall {
            method: method.to_string(),
            args,
        };
        match self.app.slots().enqueue(self.element, call) {
            Enqueued::Run(instance, call) => instance.invoke(&call.method, call.args).await.map(Some),
            Enqueued::Queued => Ok(None),
            Enqueued::Failed(err) => Err(err),
        }
    }

    /// Wait until the component is ready.
    pub async fn ready(&self) -> Result<Arc<Instance>, AlpError> {
        if !self.app.contains(self.element) {
            return Err(AlpError::Detached(self.element.0));
        }
        match self.app.slots().wait(self.element) {
            Wait::Ready(instance) => Ok(instance),
            Wait::Failed(err) => Err(err),
            Wait::Waiting(rx) => rx.await.unwrap_or(Err(AlpError::Detached(self.element.0))),
        }
    }

    /// Whether the component is ready.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.app.slots().ready_instance(self.element).is_some()
    }

    /// Calls waiting for readiness.
    #[must_use]
    pub fn pending_calls(&self) -> usize {
        self.app.slots().queued(self.element)
    }
}

impl IntoFuture for Handle {
    type Output = Result<Arc<Instance>, AlpError>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.ready().await })
    }
}
