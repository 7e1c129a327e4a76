//! Ordered listener registry for one event kind.
//!
//! Listener identity is the `Arc` allocation: registering the same
//! [`Listener`] twice fails, and so does removing one that is not there.
//! Every registration gets a fresh [`CancellationToken`] which is cancelled
//! when the listener is removed, so deferred work started at subscribe time
//! can tell whether its listener is still around.

use std::sync::Arc;

use parking_lot::Mutex;
use shock_core::ShockError;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// A registered callback.
pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Entry<T> {
    listener: Listener<T>,
    token: CancellationToken,
}

/// Listeners for one event kind, in registration order.
pub struct ListenerRegistry<T> {
    name: String,
    entries: Mutex<Vec<Entry<T>>>,
}

impl<T: 'static> ListenerRegistry<T> {
    /// Empty registry for the event kind `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Event kind this registry serves.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append `listener`. Returns the token guarding its registration.
    pub fn add(&self, listener: Listener<T>) -> Result<CancellationToken, ShockError> {
        let mut entries = self.entries.lock();
        if entries.iter().any(|e| Arc::ptr_eq(&e.listener, &listener)) {
            return Err(ShockError::DuplicateSubscription {
                event: self.name.clone(),
            });
        }
        let token = CancellationToken::new();
        entries.push(Entry {
            listener,
            token: token.clone(),
        });
        trace!(event = %self.name, listeners = entries.len(), "listener added");
        Ok(token)
    }

    /// Remove `listener` and cancel its registration token.
    pub fn remove(&self, listener: &Listener<T>) -> Result<(), ShockError> {
        let mut entries = self.entries.lock();
        let Some(index) = entries
            .iter()
            .position(|e| Arc::ptr_eq(&e.listener, listener))
        else {
            return Err(ShockError::UnknownUnsubscribe {
                event: self.name.clone(),
            });
        };
        let entry = entries.remove(index);
        entry.token.cancel();
        trace!(event = %self.name, listeners = entries.len(), "listener removed");
        Ok(())
    }

    /// Register `listener` and hand back the capability to remove it.
    pub fn subscribe(self: &Arc<Self>, listener: Listener<T>) -> Result<Subscription<T>, ShockError> {
        let token = self.add(listener.clone())?;
        Ok(Subscription {
            registry: self.clone(),
            listener,
            token,
        })
    }

    /// Whether `listener` is registered.
    pub fn contains(&self, listener: &Listener<T>) -> bool {
        self.entries
            .lock()
            .iter()
            .any(|e| Arc::ptr_eq(&e.listener, listener))
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Call every listener with `value`, in registration order.
    ///
    /// Listeners run on a snapshot taken before the first call, so a listener
    /// may subscribe or unsubscribe without deadlocking.
    pub fn fan_out(&self, value: &T) {
        let listeners: Vec<Listener<T>> = self
            .entries
            .lock()
            .iter()
            .map(|e| e.listener.clone())
            .collect();
        trace!(event = %self.name, listeners = listeners.len(), "fan out");
        for listener in listeners {
            listener(value);
        }
    }
}

/// Capability to remove one registration.
pub struct Subscription<T: 'static> {
    registry: Arc<ListenerRegistry<T>>,
    listener: Listener<T>,
    token: CancellationToken,
}

impl<T: 'static> Subscription<T> {
    /// Remove the listener. Fails with [`ShockError::UnknownUnsubscribe`]
    /// when it is no longer registered.
    pub fn unsubscribe(&self) -> Result<(), ShockError> {
        self.registry.remove(&self.listener)
    }

    /// Cancelled once this registration is gone.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Whether this registration is still live.
    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled()
    }

    /// Event kind of the registration.
    pub fn event(&self) -> &str {
        self.registry.name()
    }
}

impl<T: 'static> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("event", &self.registry.name())
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn recorder(seen: &Arc<Mutex<Vec<String>>>, tag: &'static str) -> Listener<u32> {
        let seen = seen.clone();
        Arc::new(move |v: &u32| seen.lock().push(format!("{tag}:{v}")))
    }

    #[test]
    fn duplicate_subscription_fails_and_keeps_count() {
        let registry = Arc::new(ListenerRegistry::<u32>::new("ON_CHATS"));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let listener = recorder(&seen, "a");

        let _sub = registry.subscribe(listener.clone()).unwrap();
        let err = registry.subscribe(listener).unwrap_err();
        assert_matches!(err, ShockError::DuplicateSubscription { ref event } if event == "ON_CHATS");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unsubscribe_twice_fails() {
        let registry = Arc::new(ListenerRegistry::<u32>::new("ON_AVATAR"));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sub = registry.subscribe(recorder(&seen, "a")).unwrap();

        sub.unsubscribe().unwrap();
        assert!(!sub.is_active());
        assert_matches!(
            sub.unsubscribe(),
            Err(ShockError::UnknownUnsubscribe { .. })
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn distinct_closures_with_same_body_are_distinct_listeners() {
        let registry = Arc::new(ListenerRegistry::<u32>::new("ON_USERS"));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let _a = registry.subscribe(recorder(&seen, "x")).unwrap();
        let _b = registry.subscribe(recorder(&seen, "x")).unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn fan_out_follows_registration_order() {
        let registry = Arc::new(ListenerRegistry::<u32>::new("ON_CHATS"));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let _a = registry.subscribe(recorder(&seen, "a")).unwrap();
        let b = registry.subscribe(recorder(&seen, "b")).unwrap();
        let _c = registry.subscribe(recorder(&seen, "c")).unwrap();

        registry.fan_out(&1);
        b.unsubscribe().unwrap();
        registry.fan_out(&2);

        assert_eq!(*seen.lock(), vec!["a:1", "b:1", "c:1", "a:2", "c:2"]);
    }

    #[test]
    fn resubscribing_gets_a_fresh_token() {
        let registry = Arc::new(ListenerRegistry::<u32>::new("ON_CHATS"));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let listener = recorder(&seen, "a");

        let first = registry.subscribe(listener.clone()).unwrap();
        first.unsubscribe().unwrap();
        let second = registry.subscribe(listener).unwrap();

        assert!(first.token().is_cancelled());
        assert!(second.is_active());
    }

    #[test]
    fn listener_may_unsubscribe_itself_during_fan_out() {
        let registry = Arc::new(ListenerRegistry::<u32>::new("ON_CHATS"));
        let slot: Arc<Mutex<Option<Subscription<u32>>>> = Arc::new(Mutex::new(None));
        let inner = slot.clone();
        let listener: Listener<u32> = Arc::new(move |_| {
            if let Some(sub) = inner.lock().take() {
                sub.unsubscribe().unwrap();
            }
        });
        *slot.lock() = Some(registry.subscribe(listener).unwrap());

        registry.fan_out(&1);
        assert!(registry.is_empty());
    }
}
