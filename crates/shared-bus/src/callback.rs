//! # Message Callbacks
//!
//! A `MessageCallback<T>` is a cheaply cloneable, reference-counted handler.
//!
//! Identity is by reference: clones of one callback compare equal, while two
//! callbacks created separately never do, even when built from identical
//! closures. The registry relies on this for idempotent registration.

use shared_types::Envelope;
use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

type Handler<T> = dyn Fn(&Envelope<T>) + Send + Sync;
type Liveness = dyn Fn() -> bool + Send + Sync;

/// A callback panicked while handling an envelope.
#[derive(Debug, Clone, Error)]
#[error("Callback panicked: {message}")]
pub struct CallbackPanic {
    pub message: String,
}

/// Opaque identity of a callback, stable for as long as any clone lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackId(usize);

/// Reference-counted envelope handler.
pub struct MessageCallback<T> {
    handler: Arc<Handler<T>>,
    /// Probe for callbacks that can stop being invocable (channel-backed).
    liveness: Option<Arc<Liveness>>,
}

impl<T> MessageCallback<T> {
    /// Wrap a closure.
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&Envelope<T>) + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(handler),
            liveness: None,
        }
    }

    /// Invoke the handler. Panics propagate.
    pub fn invoke(&self, envelope: &Envelope<T>) {
        (self.handler)(envelope);
    }

    /// Invoke the handler, converting a panic into an error.
    pub fn try_invoke(&self, envelope: &Envelope<T>) -> Result<(), CallbackPanic> {
        catch_unwind(AssertUnwindSafe(|| (self.handler)(envelope))).map_err(|payload| {
            CallbackPanic {
                message: panic_message(payload.as_ref()),
            }
        })
    }

    /// Whether the handler can still receive envelopes.
    ///
    /// Closure callbacks are always invocable. Channel-backed callbacks stop
    /// being invocable once their receiver is dropped.
    #[must_use]
    pub fn is_invocable(&self) -> bool {
        self.liveness.as_ref().map_or(true, |is_alive| is_alive())
    }

    /// Reference identity of this callback.
    #[must_use]
    pub fn id(&self) -> CallbackId {
        CallbackId(Arc::as_ptr(&self.handler).cast::<()>() as usize)
    }

    /// Whether `other` is a clone of this callback.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl<T> MessageCallback<T>
where
    T: Clone + Send + 'static,
{
    /// A callback that forwards a copy of every envelope into a channel.
    pub fn channel(sender: mpsc::UnboundedSender<Envelope<T>>) -> Self {
        let open = sender.clone();
        Self {
            handler: Arc::new(move |envelope: &Envelope<T>| {
                // Receiver gone: the liveness check reports it, nothing to do here.
                let _ = sender.send(envelope.clone());
            }),
            liveness: Some(Arc::new(move || !open.is_closed())),
        }
    }
}

impl<T> Clone for MessageCallback<T> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
            liveness: self.liveness.clone(),
        }
    }
}

impl<T> PartialEq for MessageCallback<T> {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl<T> Eq for MessageCallback<T> {}

impl<T> fmt::Debug for MessageCallback<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageCallback")
            .field("id", &self.id())
            .field("channel_backed", &self.liveness.is_some())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
