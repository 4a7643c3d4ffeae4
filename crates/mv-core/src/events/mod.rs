//! Change notifications flowing up the pipeline to attached observers

mod subscriber;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use parking_lot::Mutex;

pub use subscriber::PipelineObserver;

/// Notification emitted by a layer when what it exposes changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewEvent {
    /// The set or order of exposed records changed
    StructuralChange,
    /// Exactly one exposed record's fields or state changed
    RecordChanged(usize),
}

struct ObserverSlot {
    id: u64,
    observer: Arc<dyn PipelineObserver>,
}

type Registry = Arc<Mutex<Vec<ObserverSlot>>>;

/// Registry of observers attached to the consumer-visible end of the pipeline
pub struct Notifier {
    observers: Registry,
    next_id: AtomicU64,
}

/// Handle returned by [`Notifier::subscribe`]. Dropping it unsubscribes.
#[must_use = "dropping a subscription detaches its observer"]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Vec<ObserverSlot>>>,
}

impl Notifier {
    /// Create a notifier with no observers
    pub fn new() -> Self {
        Self {
            observers: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Attach an observer
    pub fn subscribe(&self, observer: Arc<dyn PipelineObserver>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.observers.lock().push(ObserverSlot { id, observer });

        Subscription {
            id,
            registry: Arc::downgrade(&self.observers),
        }
    }

    /// Deliver an event to every attached observer.
    ///
    /// Observers run without the registry lock held, so they may subscribe or
    /// unsubscribe from inside the callback. An observer detached mid-delivery
    /// is skipped.
    pub fn publish(&self, event: ViewEvent) {
        let snapshot: Vec<(u64, Arc<dyn PipelineObserver>)> = self
            .observers
            .lock()
            .iter()
            .map(|slot| (slot.id, slot.observer.clone()))
            .collect();

        tracing::trace!(?event, observers = snapshot.len(), "publishing view event");

        for (id, observer) in snapshot {
            let attached = self.observers.lock().iter().any(|slot| slot.id == id);
            if attached {
                observer.on_event(&event);
            }
        }
    }

    /// Number of attached observers
    pub fn observer_count(&self) -> usize {
        self.observers.lock().len()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Subscription {
    /// Detach the observer. No event is delivered to it afterwards.
    pub fn unsubscribe(self) {
        // Drop does the work
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().retain(|slot| slot.id != self.id);
        }
    }
}

/// Helper struct for creating observers from closures
pub struct ClosureObserver<F> {
    handler: F,
}

impl<F> PipelineObserver for ClosureObserver<F>
where
    F: Fn(&ViewEvent) + Send + Sync,
{
    fn on_event(&self, event: &ViewEvent) {
        (self.handler)(event);
    }
}

/// Create an observer from a closure
pub fn observer_from_fn<F>(f: F) -> Arc<dyn PipelineObserver>
where
    F: Fn(&ViewEvent) + Send + Sync + 'static,
{
    Arc::new(ClosureObserver { handler: f })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording() -> (Arc<Mutex<Vec<ViewEvent>>>, Arc<dyn PipelineObserver>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let observer = observer_from_fn(move |event| sink.lock().push(*event));
        (seen, observer)
    }

    #[test]
    fn test_publish_reaches_every_observer() {
        let notifier = Notifier::new();
        let (first, a) = recording();
        let (second, b) = recording();
        let _sub_a = notifier.subscribe(a);
        let _sub_b = notifier.subscribe(b);

        notifier.publish(ViewEvent::RecordChanged(3));

        assert_eq!(*first.lock(), vec![ViewEvent::RecordChanged(3)]);
        assert_eq!(*second.lock(), vec![ViewEvent::RecordChanged(3)]);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let notifier = Notifier::new();
        let (seen, observer) = recording();
        let subscription = notifier.subscribe(observer);

        notifier.publish(ViewEvent::StructuralChange);
        subscription.unsubscribe();
        notifier.publish(ViewEvent::RecordChanged(0));

        assert_eq!(*seen.lock(), vec![ViewEvent::StructuralChange]);
        assert_eq!(notifier.observer_count(), 0);
    }

    #[test]
    fn test_observer_detached_during_delivery_is_skipped() {
        let notifier = Notifier::new();
        let (seen, late) = recording();

        // The first observer drops the second one's handle while events are in flight
        let late_subscription = Arc::new(Mutex::new(None::<Subscription>));
        let handle = late_subscription.clone();
        let _first = notifier.subscribe(observer_from_fn(move |_| {
            handle.lock().take();
        }));
        *late_subscription.lock() = Some(notifier.subscribe(late));

        notifier.publish(ViewEvent::StructuralChange);

        assert!(seen.lock().is_empty());
        assert_eq!(notifier.observer_count(), 1);
    }
}
