//! Event routing between remote-method hosts and a consuming component
//!
//! An [`EventHandler`] declares, per [`PeerType`], which notifications it wants
//! and which callback handles each one. Connecting a peer subscribes those
//! callbacks on the peer; `start()` refuses to run a handler wired to nothing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::error::{HtpcError, Result};
use crate::notification::{Callback, NotificationCatalog, Notifiable, Notifier};
use crate::rpc::{PeerType, RpcServer};

/// Builder for [`EventHandler`]
///
/// The handler's own notifier exists before the handler does, so callbacks
/// can capture it and republish.
///
/// ```rust
/// use htpc_core::notification::callback;
/// use htpc_core::router::EventHandler;
/// use htpc_core::rpc::PeerType;
///
/// const XBMC: PeerType = PeerType::new("xbmc");
///
/// let mut builder = EventHandler::builder("pause-on-screensaver").publishes(["paused"]);
/// let out = builder.notifier();
/// let handler = builder
///     .on(XBMC, "GUI.OnScreensaverActivated", callback(move |_, value| {
///         out.notify("paused", value.clone());
///         Ok(())
///     }))
///     .build();
/// # let _ = handler;
/// ```
pub struct EventHandlerBuilder {
    name: String,
    catalog: NotificationCatalog,
    notifier: Option<Notifier>,
    interests: HashMap<PeerType, Vec<(String, Callback)>>,
}

impl EventHandlerBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            catalog: NotificationCatalog::new(),
            notifier: None,
            interests: HashMap::new(),
        }
    }

    /// Notifications this handler itself publishes
    pub fn publishes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            self.catalog.insert(name, None);
        }
        self.notifier = None;
        self
    }

    /// Handle `notification` from every connected peer of `peer_type`
    pub fn on(
        mut self,
        peer_type: PeerType,
        notification: impl Into<String>,
        callback: Callback,
    ) -> Self {
        self.interests
            .entry(peer_type)
            .or_default()
            .push((notification.into(), callback));
        self
    }

    /// The handler's notifier
    ///
    /// Call after `publishes`; later `publishes` calls replace it.
    pub fn notifier(&mut self) -> Notifier {
        self.notifier
            .get_or_insert_with(|| Notifier::new(self.name.clone(), self.catalog.clone()))
            .clone()
    }

    pub fn build(mut self) -> EventHandler {
        let notifier = self.notifier();
        EventHandler {
            notifier,
            interests: self.interests,
            connected: Mutex::new(HashMap::new()),
            registered: AtomicUsize::new(0),
        }
    }
}

/// Subscribes a consumer's callbacks on the hosts it is connected to
pub struct EventHandler {
    notifier: Notifier,
    interests: HashMap<PeerType, Vec<(String, Callback)>>,
    connected: Mutex<HashMap<String, Weak<dyn RpcServer>>>,
    registered: AtomicUsize,
}

impl EventHandler {
    pub fn builder(name: impl Into<String>) -> EventHandlerBuilder {
        EventHandlerBuilder::new(name)
    }

    /// Connect to `peer` and subscribe every matching interest
    ///
    /// Returns the number of subscriptions the peer accepted. A peer whose
    /// name is already connected is left alone and 0 is returned.
    pub fn connect_to(&self, peer: &Arc<dyn RpcServer>) -> usize {
        let peer_name = peer.name().to_string();
        {
            let mut connected = self.connected.lock();
            if connected.contains_key(&peer_name) {
                tracing::error!(
                    component = %self.name(),
                    "Already registered to RPC {}",
                    peer_name
                );
                return 0;
            }
            connected.insert(peer_name.clone(), Arc::downgrade(peer));
        }

        let peer_type = peer.peer_type();
        let accepted = self
            .interests
            .get(&peer_type)
            .map_or(0, |interests| {
                interests
                    .iter()
                    .filter(|(notification, callback)| {
                        peer.subscribe(notification, Arc::clone(callback)).is_ok()
                    })
                    .count()
            });

        tracing::debug!(
            component = %self.name(),
            "Connected to {} ({}): {} subscriptions accepted",
            peer_name,
            peer_type,
            accepted
        );

        self.registered.fetch_add(accepted, Ordering::SeqCst);
        accepted
    }

    /// Names of connected peers, sorted
    pub fn connected_peers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.connected.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Connected peers that are still alive
    pub fn peers(&self) -> Vec<Arc<dyn RpcServer>> {
        self.connected
            .lock()
            .values()
            .filter_map(Weak::upgrade)
            .collect()
    }

    /// Subscriptions accepted across all connected peers
    pub fn registered_subscriptions(&self) -> usize {
        self.registered.load(Ordering::SeqCst)
    }

    /// Fail unless at least one peer is connected and one subscription accepted
    pub fn start(&self) -> Result<()> {
        if self.connected.lock().is_empty() || self.registered_subscriptions() == 0 {
            tracing::error!(
                component = %self.name(),
                "EventHandler {} is not handling anything",
                self.name()
            );
            return Err(HtpcError::NotHandling(self.name().to_string()));
        }
        Ok(())
    }

    pub fn stop(&self) {}
}

impl Notifiable for EventHandler {
    fn notifier(&self) -> &Notifier {
        &self.notifier
    }
}

impl std::fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHandler")
            .field("name", &self.notifier.name())
            .field("peer_types", &self.interests.keys().collect::<Vec<_>>())
            .field("registered", &self.registered_subscriptions())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::callback;

    #[test]
    fn test_start_without_peers_fails() {
        let handler = EventHandler::builder("idle").build();
        assert!(matches!(handler.start(), Err(HtpcError::NotHandling(name)) if name == "idle"));
    }

    #[test]
    fn test_builder_notifier_is_shared() {
        let mut builder = EventHandler::builder("relay").publishes(["relayed"]);
        let early = builder.notifier();
        let handler = builder.build();

        early
            .subscribe("relayed", callback(|_, _| Ok(())))
            .unwrap();
        assert_eq!(handler.notifier().subscriber_count("relayed"), 1);
        assert_eq!(handler.available_notifications(), vec!["relayed"]);
    }
}
