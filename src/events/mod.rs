//! Host events and their connections.
//!
//! An [`EventSource`] is the host side of an event: host code raises it, connected handlers run
//! synchronously on the raising thread. Script callables are connected through the engine,
//! which wraps them in a handler that marshals the event arguments into script space.
//!
//! # Disconnect Guarantee
//!
//! Every connection owns an [`InvocationGate`]. Raising takes the gate, checks that the
//! connection is still active and invokes the handler while holding it; disconnecting takes the
//! same gate before clearing the active flag. Once [`EventConnection::disconnect`] returns, no
//! invocation of that connection is running or will start, even under concurrent raising.
//! Gates are reentrant, so a handler may disconnect its own connection.
//!
//! Script handlers share the engine's run gate, which also serializes event callbacks with
//! script runs.
//!
//! # Example
//!
//! ```rust
//! use std::sync::{atomic::{AtomicUsize, Ordering}, Arc};
//! use hostbridge::{events::EventSource, HostValue};
//!
//! let source = EventSource::new("Change");
//! let count = Arc::new(AtomicUsize::new(0));
//! let seen = count.clone();
//! let handler = move |_args: &[HostValue]| -> hostbridge::Result<()> {
//!     seen.fetch_add(1, Ordering::SeqCst);
//!     Ok(())
//! };
//! let connection = source.connect(Arc::new(handler));
//!
//! source.raise(&[])?;
//! connection.disconnect();
//! source.raise(&[])?;
//! assert_eq!(count.load(Ordering::SeqCst), 1);
//! # Ok::<(), hostbridge::Error>(())
//! ```

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};

use parking_lot::{Mutex, ReentrantMutex};
use tracing::{debug, warn};

use crate::{value::HostValue, Result};

/// Lock serializing invocations of a connection with its disconnection
pub type InvocationGate = Arc<ReentrantMutex<()>>;

/// Receives raised events
pub trait EventHandler: Send + Sync {
    /// Handle one raise of the event
    ///
    /// # Errors
    /// Failures are reported back to the code raising the event.
    fn handle(&self, args: &[HostValue]) -> Result<()>;
}

impl<F> EventHandler for F
where
    F: Fn(&[HostValue]) -> Result<()> + Send + Sync,
{
    fn handle(&self, args: &[HostValue]) -> Result<()> {
        self(args)
    }
}

struct HandlerSlot {
    id: u64,
    active: AtomicBool,
    gate: InvocationGate,
    handler: Arc<dyn EventHandler>,
}

struct EventSourceInner {
    name: String,
    slots: Mutex<Vec<Arc<HandlerSlot>>>,
    next_id: AtomicU64,
}

/// The host side of an event.
///
/// Cloning the source yields another handle to the same event.
#[derive(Clone)]
pub struct EventSource(Arc<EventSourceInner>);

impl EventSource {
    /// Create an event without handlers
    #[must_use]
    pub fn new(name: &str) -> Self {
        EventSource(Arc::new(EventSourceInner {
            name: name.to_string(),
            slots: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }))
    }

    /// Event name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Connect `handler` behind its own invocation gate
    pub fn connect(&self, handler: Arc<dyn EventHandler>) -> EventConnection {
        self.connect_gated(handler, Arc::new(ReentrantMutex::new(())))
    }

    /// Connect `handler` behind an existing invocation gate
    pub fn connect_gated(
        &self,
        handler: Arc<dyn EventHandler>,
        gate: InvocationGate,
    ) -> EventConnection {
        let slot = Arc::new(HandlerSlot {
            id: self.0.next_id.fetch_add(1, Ordering::Relaxed),
            active: AtomicBool::new(true),
            gate,
            handler,
        });

        self.0.slots.lock().push(slot.clone());
        debug!("connected handler {} to event '{}'", slot.id, self.0.name);

        EventConnection {
            source: self.clone(),
            slot,
        }
    }

    /// Invoke every connected handler, in connection order, on the calling thread.
    ///
    /// Every handler runs even if an earlier one fails.
    ///
    /// # Errors
    /// Returns the first handler failure.
    pub fn raise(&self, args: &[HostValue]) -> Result<()> {
        let slots: Vec<Arc<HandlerSlot>> = self.0.slots.lock().clone();
        let mut first_error = None;

        for slot in slots {
            let _gate = slot.gate.lock();
            if !slot.active.load(Ordering::Acquire) {
                continue;
            }

            if let Err(error) = slot.handler.handle(args) {
                warn!("handler {} of event '{}' failed: {}", slot.id, self.0.name, error);
                first_error.get_or_insert(error);
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Number of connected handlers
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.0.slots.lock().len()
    }

    /// `true` if both handles refer to the same event
    #[must_use]
    pub fn is_same(&self, other: &EventSource) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSource")
            .field("name", &self.0.name)
            .field("handlers", &self.handler_count())
            .finish()
    }
}

/// Handle of one connected handler
#[derive(Clone)]
pub struct EventConnection {
    source: EventSource,
    slot: Arc<HandlerSlot>,
}

impl EventConnection {
    /// Disconnect the handler.
    ///
    /// Waits for a running invocation of this connection to finish. Returns `false` if the
    /// connection was already disconnected.
    pub fn disconnect(&self) -> bool {
        let _gate = self.slot.gate.lock();
        if !self.slot.active.swap(false, Ordering::AcqRel) {
            return false;
        }

        self.source
            .0
            .slots
            .lock()
            .retain(|slot| slot.id != self.slot.id);
        debug!(
            "disconnected handler {} from event '{}'",
            self.slot.id,
            self.source.name()
        );
        true
    }

    /// `true` until disconnected
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.slot.active.load(Ordering::Acquire)
    }

    /// The event this connection belongs to
    #[must_use]
    pub fn source(&self) -> &EventSource {
        &self.source
    }

    /// `true` if both handles refer to the same connection
    #[must_use]
    pub fn is_same(&self, other: &EventConnection) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }
}

impl fmt::Debug for EventConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventConnection")
            .field("event", &self.source.name())
            .field("id", &self.slot.id)
            .field("connected", &self.is_connected())
            .finish()
    }
}
