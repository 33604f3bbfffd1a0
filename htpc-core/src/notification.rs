//! Publish/subscribe primitive shared by every HTPC component
//!
//! A [`Notifier`] owns a read-only [`NotificationCatalog`] (the names it
//! publishes) and a subscription table. Delivery happens on a background
//! thread so a slow subscriber never stalls the producer.

use std::collections::{BTreeMap, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use serde_json::Value;

use crate::error::{HtpcError, Result};

/// Error type a subscriber may return; it is logged, never propagated
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Return type of a notification subscriber
pub type CallbackResult = std::result::Result<(), CallbackError>;

/// A notification subscriber
///
/// Invoked with the publishing component and the notification value.
pub type Callback = Arc<dyn Fn(&Notifier, &Value) -> CallbackResult + Send + Sync>;

/// Wrap a closure into a [`Callback`]
///
/// ```rust
/// use htpc_core::notification::callback;
///
/// let cb = callback(|publisher, value| {
///     println!("{} sent {}", publisher.name(), value);
///     Ok(())
/// });
/// # let _ = cb;
/// ```
pub fn callback<F>(f: F) -> Callback
where
    F: Fn(&Notifier, &Value) -> CallbackResult + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Notification names a component publishes, with optional per-name schema
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotificationCatalog {
    entries: BTreeMap<String, Option<Value>>,
}

impl NotificationCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, config: Option<Value>) -> Self {
        self.insert(name, config);
        self
    }

    /// Add or replace an entry
    pub fn insert(&mut self, name: impl Into<String>, config: Option<Value>) {
        self.entries.insert(name.into(), config);
    }

    /// Check whether a notification is published
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Configuration blob for a notification, if any
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.get(name).and_then(Option::as_ref)
    }

    /// All published names, sorted
    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Option<Value>)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for NotificationCatalog {
    fn from_iter<I: IntoIterator<Item = S>>(names: I) -> Self {
        Self {
            entries: names.into_iter().map(|n| (n.into(), None)).collect(),
        }
    }
}

struct NotifierInner {
    name: String,
    catalog: NotificationCatalog,
    subscriptions: Mutex<HashMap<String, Vec<Callback>>>,
}

/// Cloneable handle to a component's notification state
///
/// Clones share the same catalog and subscription table.
#[derive(Clone)]
pub struct Notifier {
    inner: Arc<NotifierInner>,
}

impl Notifier {
    /// Create a notifier publishing the names in `catalog`
    pub fn new(name: impl Into<String>, catalog: NotificationCatalog) -> Self {
        Self {
            inner: Arc::new(NotifierInner {
                name: name.into(),
                catalog,
                subscriptions: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Name of the owning component
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn catalog(&self) -> &NotificationCatalog {
        &self.inner.catalog
    }

    /// Names this component publishes
    pub fn available_notifications(&self) -> Vec<String> {
        self.inner.catalog.names()
    }

    /// Schema or configuration attached to a published notification
    pub fn notification_info(&self, name: &str) -> Option<&Value> {
        if !self.inner.catalog.contains(name) {
            tracing::warn!(
                component = %self.name(),
                "Cannot give info for notification {} because it is not published",
                name
            );
            return None;
        }
        self.inner.catalog.get(name)
    }

    /// Subscribe `callback` to `name`
    ///
    /// Returns the accepted name, or `UnknownNotification` without touching
    /// the subscription table when the name is not published.
    pub fn subscribe(&self, name: &str, callback: Callback) -> Result<String> {
        if !self.inner.catalog.contains(name) {
            tracing::debug!(
                component = %self.name(),
                "Rejecting subscription to unknown notification {}",
                name
            );
            return Err(HtpcError::UnknownNotification(name.to_string()));
        }

        self.inner
            .subscriptions
            .lock()
            .entry(name.to_string())
            .or_default()
            .push(callback);

        Ok(name.to_string())
    }

    /// Number of callbacks subscribed to `name`
    pub fn subscriber_count(&self, name: &str) -> usize {
        self.inner
            .subscriptions
            .lock()
            .get(name)
            .map_or(0, Vec::len)
    }

    pub fn has_subscribers(&self, name: &str) -> bool {
        self.subscriber_count(name) > 0
    }

    /// Publish `value` to every subscriber of `name`
    ///
    /// Returns immediately. Delivery runs on its own thread, in subscription
    /// order; the returned handle only reports when delivery finished. With no
    /// subscribers nothing is spawned and `None` is returned.
    pub fn notify(&self, name: &str, value: Value) -> Option<JoinHandle<()>> {
        let callbacks = {
            let subscriptions = self.inner.subscriptions.lock();
            match subscriptions.get(name) {
                Some(callbacks) if !callbacks.is_empty() => callbacks.clone(),
                _ => return None,
            }
        };

        tracing::debug!(
            component = %self.name(),
            "Sending notification {} with value {}",
            name,
            value
        );

        let publisher = self.clone();
        let notification = name.to_string();
        let spawned = thread::Builder::new()
            .name(format!("{}-notify", self.name()))
            .spawn(move || publisher.deliver(&notification, &value, &callbacks));

        match spawned {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::error!(
                    component = %self.name(),
                    "Failed to spawn delivery thread for {}: {}",
                    name,
                    e
                );
                None
            }
        }
    }

    fn deliver(&self, name: &str, value: &Value, callbacks: &[Callback]) {
        for (index, callback) in callbacks.iter().enumerate() {
            match panic::catch_unwind(AssertUnwindSafe(|| callback(self, value))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(
                    component = %self.name(),
                    "Subscriber #{} of {} failed: {}",
                    index,
                    name,
                    e
                ),
                Err(_) => tracing::error!(
                    component = %self.name(),
                    "Subscriber #{} of {} panicked",
                    index,
                    name
                ),
            }
        }
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("name", &self.inner.name)
            .field("notifications", &self.inner.catalog.len())
            .finish()
    }
}

/// Anything that publishes notifications
///
/// Implementors only provide access to their [`Notifier`]; every other
/// operation has a default.
pub trait Notifiable {
    fn notifier(&self) -> &Notifier;

    fn name(&self) -> &str {
        self.notifier().name()
    }

    fn available_notifications(&self) -> Vec<String> {
        self.notifier().available_notifications()
    }

    fn notification_info(&self, name: &str) -> Option<&Value> {
        self.notifier().notification_info(name)
    }

    fn subscribe(&self, name: &str, callback: Callback) -> Result<String> {
        self.notifier().subscribe(name, callback)
    }

    fn notify(&self, name: &str, value: Value) -> Option<JoinHandle<()>> {
        self.notifier().notify(name, value)
    }
}
