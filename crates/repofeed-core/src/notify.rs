//! Named-channel publish/subscribe registry.
//!
//! Handlers register under a channel name and are invoked synchronously in
//! registration order on publish. Channels are created on first subscribe
//! and never destroyed. Closures have no identity in Rust, so
//! [`subscribe`](Notifier::subscribe) hands back a token and removal is by
//! token.
//!
//! A notifier is an explicitly constructed, explicitly owned value; there
//! is no global instance.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Token identifying one registration. Pass it back to
/// [`unsubscribe`](Notifier::unsubscribe) to remove that handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Registry<E> {
    channels: HashMap<String, Vec<(HandlerId, Handler<E>)>>,
    next_id: u64,
}

/// Named-channel fan-out dispatcher, generic over the event payload.
pub struct Notifier<E> {
    registry: Mutex<Registry<E>>,
}

impl<E> Default for Notifier<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Notifier<E> {
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(Registry {
                channels: HashMap::new(),
                next_id: 0,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Registry<E>> {
        // The registry is plain data; recover the lock if a handler panicked.
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register `handler` under `channel`.
    ///
    /// Multiple handlers per channel are allowed and the same closure may
    /// be registered more than once; each registration gets its own id.
    pub fn subscribe<F>(&self, channel: &str, handler: F) -> HandlerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let mut registry = self.lock();
        registry.next_id += 1;
        let id = HandlerId(registry.next_id);
        registry
            .channels
            .entry(channel.to_string())
            .or_default()
            .push((id, Arc::new(handler)));
        tracing::debug!(channel, id = id.0, "handler subscribed");
        id
    }

    /// Invoke every handler registered under `channel`, in registration
    /// order, synchronously. No-op for an unknown channel.
    ///
    /// Dispatch runs over a snapshot of the handler list, so handlers may
    /// re-enter the notifier; registrations made during a publish are not
    /// invoked until the next one. A panicking handler aborts the
    /// remaining dispatch in the same call.
    pub fn publish(&self, channel: &str, event: &E) {
        let snapshot: Vec<Handler<E>> = {
            let registry = self.lock();
            match registry.channels.get(channel) {
                Some(handlers) => handlers.iter().map(|(_, h)| Arc::clone(h)).collect(),
                None => return,
            }
        };
        for handler in snapshot {
            handler(event);
        }
    }

    /// Remove the registration identified by `id` from `channel`.
    /// No-op if the channel or the id is unknown.
    pub fn unsubscribe(&self, channel: &str, id: HandlerId) {
        let mut registry = self.lock();
        if let Some(handlers) = registry.channels.get_mut(channel) {
            let before = handlers.len();
            handlers.retain(|(hid, _)| *hid != id);
            if handlers.len() < before {
                tracing::debug!(channel, id = id.0, "handler unsubscribed");
            }
        }
    }

    /// Number of handlers currently registered under `channel`.
    pub fn handler_count(&self, channel: &str) -> usize {
        self.lock()
            .channels
            .get(channel)
            .map(|h| h.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::Mutex;

    fn collector() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let notifier = Notifier::new();
        let seen = collector();

        for tag in ["first", "second", "third"] {
            let seen = Arc::clone(&seen);
            notifier.subscribe("data", move |_: &u32| {
                seen.lock().unwrap().push(tag.to_string());
            });
        }

        notifier.publish("data", &7);
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["first", "second", "third"]
        );
    }

    #[test]
    fn publish_unknown_channel_is_noop() {
        let notifier: Notifier<u32> = Notifier::new();
        notifier.publish("nobody-home", &1);
    }

    #[test]
    fn same_closure_registered_twice_runs_twice() {
        let notifier = Notifier::new();
        let seen = Arc::new(Mutex::new(0usize));

        let handler = {
            let seen = Arc::clone(&seen);
            move |_: &u32| {
                *seen.lock().unwrap() += 1;
            }
        };
        notifier.subscribe("data", handler.clone());
        notifier.subscribe("data", handler);

        notifier.publish("data", &1);
        assert_eq!(*seen.lock().unwrap(), 2);
    }

    #[test]
    fn unsubscribe_removes_only_that_registration() {
        let notifier = Notifier::new();
        let seen = collector();

        let keep = {
            let seen = Arc::clone(&seen);
            notifier.subscribe("data", move |_: &u32| {
                seen.lock().unwrap().push("keep".into());
            })
        };
        let drop_me = {
            let seen = Arc::clone(&seen);
            notifier.subscribe("data", move |_: &u32| {
                seen.lock().unwrap().push("drop".into());
            })
        };

        notifier.unsubscribe("data", drop_me);
        notifier.publish("data", &1);

        assert_eq!(*seen.lock().unwrap(), vec!["keep"]);
        assert_eq!(notifier.handler_count("data"), 1);

        // Idempotent: removing again (or from a bogus channel) is a no-op.
        notifier.unsubscribe("data", drop_me);
        notifier.unsubscribe("elsewhere", keep);
        assert_eq!(notifier.handler_count("data"), 1);
    }

    #[test]
    fn channels_are_independent() {
        let notifier = Notifier::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for channel in ["alpha", "beta"] {
            let seen = Arc::clone(&seen);
            notifier.subscribe(channel, move |n: &u32| {
                seen.lock().unwrap().push((channel, *n));
            });
        }

        notifier.publish("alpha", &1);
        notifier.publish("beta", &2);
        assert_eq!(*seen.lock().unwrap(), vec![("alpha", 1), ("beta", 2)]);
    }

    #[test]
    fn subscribe_during_publish_does_not_deadlock() {
        let notifier: Arc<Notifier<u32>> = Arc::new(Notifier::new());
        let inner = Arc::clone(&notifier);
        let fired = Arc::new(Mutex::new(0usize));

        {
            let fired = Arc::clone(&fired);
            notifier.subscribe("data", move |_| {
                let fired = Arc::clone(&fired);
                // Re-entrant registration; must not be invoked this round.
                inner.subscribe("data", move |_| {
                    *fired.lock().unwrap() += 1;
                });
            });
        }

        notifier.publish("data", &1);
        assert_eq!(*fired.lock().unwrap(), 0);
        assert_eq!(notifier.handler_count("data"), 2);

        notifier.publish("data", &2);
        assert_eq!(*fired.lock().unwrap(), 1);
    }
}
