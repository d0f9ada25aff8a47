//! Typed event handler registry
//!
//! Handlers run when the scheduler promotes an event of their type. Each
//! call is guarded: an `Err` or a panic is logged and never reaches the
//! scheduler loop.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::animation::{AnimationEvent, AnimationEventType};

/// Error type handlers may return
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Handler signature: synchronous, non-suspending
pub type EventHandler =
    Arc<dyn Fn(&AnimationEvent) -> Result<(), HandlerError> + Send + Sync>;

/// Wrap a closure as an [`EventHandler`]
pub fn event_handler<F>(handler: F) -> EventHandler
where
    F: Fn(&AnimationEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    Arc::new(handler)
}

/// Maps each event type to its handlers
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<AnimationEventType, Vec<EventHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one event type
    pub fn register<F>(&self, kind: AnimationEventType, handler: F)
    where
        F: Fn(&AnimationEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.register_handler(kind, event_handler(handler));
    }

    pub fn register_handler(&self, kind: AnimationEventType, handler: EventHandler) {
        self.handlers.write().entry(kind).or_default().push(handler);
        tracing::debug!("Registered handler for {}", kind);
    }

    pub fn handler_count(&self, kind: AnimationEventType) -> usize {
        self.handlers.read().get(&kind).map_or(0, Vec::len)
    }

    /// Invoke every handler for the event's type.
    ///
    /// Returns the number of handlers that failed.
    pub fn dispatch(&self, event: &AnimationEvent) -> usize {
        // Clone out so handlers may register further handlers
        let handlers: Vec<EventHandler> = self
            .handlers
            .read()
            .get(&event.kind)
            .cloned()
            .unwrap_or_default();

        let mut failures = 0;
        for handler in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failures += 1;
                    tracing::error!("Error in {} handler: {}", event.kind, e);
                }
                Err(_) => {
                    failures += 1;
                    tracing::error!("Handler for {} panicked", event.kind);
                }
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_dispatch_by_type() {
        let registry = HandlerRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = hits.clone();
        registry.register(AnimationEventType::MouthSyncStart, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        registry.dispatch(&AnimationEvent::new(AnimationEventType::MouthSyncStart, 0.0));
        registry.dispatch(&AnimationEvent::new(AnimationEventType::MouthSyncStop, 0.0));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(registry.handler_count(AnimationEventType::MouthSyncStart), 1);
        assert_eq!(registry.handler_count(AnimationEventType::SyncTiming), 0);
    }

    #[test]
    fn test_failing_handlers_are_contained() {
        let registry = HandlerRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));

        registry.register(AnimationEventType::ExpressionChange, |_| Err("boom".into()));
        registry.register(AnimationEventType::ExpressionChange, |_| panic!("handler bug"));
        let counter = hits.clone();
        registry.register(AnimationEventType::ExpressionChange, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let failures =
            registry.dispatch(&AnimationEvent::new(AnimationEventType::ExpressionChange, 0.0));
        assert_eq!(failures, 2);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
