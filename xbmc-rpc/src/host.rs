//! The XBMC remote-method host

use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use htpc_core::{
    HtpcError, MethodCatalog, Notifiable, Notifier, PeerType, Result, RpcServer, Validator,
};
use jsonrpc_client::{Connection, NotificationHandler};

use crate::config::XbmcConfig;
use crate::discovery;
use crate::schema::{NotificationDescriptor, Schema};

/// Peer type of every [`XbmcRpc`]
pub const PEER_TYPE: PeerType = PeerType::new("xbmc");

/// One XBMC instance: its discovered schema and, once started, its
/// persistent connection
///
/// Pushed notifications are validated against the schema before they reach
/// subscribers.
pub struct XbmcRpc {
    notifier: Notifier,
    config: XbmcConfig,
    schema: Arc<Schema>,
    connection: RwLock<Option<Arc<Connection>>>,
}

impl XbmcRpc {
    /// Discover the schema of the instance at `config`
    ///
    /// Fails when the schema cannot be loaded; no connection is opened until
    /// [`RpcServer::start`].
    pub fn new(name: impl Into<String>, config: XbmcConfig) -> crate::Result<Self> {
        config.validate()?;
        let schema = discovery::discover(&config)?;
        Ok(Self::from_schema(name, config, schema))
    }

    /// Build a host around an already loaded schema
    pub fn from_schema(name: impl Into<String>, config: XbmcConfig, schema: Schema) -> Self {
        let notifier = Notifier::new(name, schema.notification_catalog());
        Self {
            notifier,
            config,
            schema: Arc::new(schema),
            connection: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &XbmcConfig {
        &self.config
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn notification_descriptor(&self, name: &str) -> Option<&NotificationDescriptor> {
        self.schema.notifications.get(name)
    }

    /// Whether the connection is open
    pub fn is_connected(&self) -> bool {
        self.connection
            .read()
            .as_ref()
            .is_some_and(|connection| connection.is_open())
    }

    fn notification_handler(&self) -> NotificationHandler {
        let notifier = self.notifier.clone();
        let schema = Arc::clone(&self.schema);
        Arc::new(move |method, params| publish(&notifier, &schema, &method, params))
    }
}

/// Route one pushed notification to the subscribers of `notifier`
fn publish(notifier: &Notifier, schema: &Schema, method: &str, params: Value) {
    tracing::debug!(
        component = %notifier.name(),
        "Received notification {} with value {}",
        method,
        params
    );

    if !notifier.has_subscribers(method) {
        return;
    }
    let Some(descriptor) = schema.notifications.get(method) else {
        tracing::warn!(
            component = %notifier.name(),
            "Received unpublished notification {}",
            method
        );
        return;
    };

    let validator = Validator::with_definitions(&schema.types);
    if let Err(e) = validator.validate(&params, &descriptor.params) {
        tracing::warn!(
            component = %notifier.name(),
            "Problem processing notification {} with value {}: {}",
            method,
            params,
            e
        );
        return;
    }

    notifier.notify(method, params);
}

impl Notifiable for XbmcRpc {
    fn notifier(&self) -> &Notifier {
        &self.notifier
    }
}

impl RpcServer for XbmcRpc {
    fn peer_type(&self) -> PeerType {
        PEER_TYPE
    }

    fn methods(&self) -> &MethodCatalog {
        &self.schema.methods
    }

    fn schema_definitions(&self) -> Option<&serde_json::Map<String, Value>> {
        Some(&self.schema.types)
    }

    /// Open the TCP connection; a no-op while one is open
    fn start(&self) -> Result<()> {
        let mut slot = self.connection.write();
        if slot.as_ref().is_some_and(|connection| connection.is_open()) {
            return Ok(());
        }

        let address = self.config.tcp_address();
        let connection = Connection::open(
            &address,
            self.config.connection_config(),
            self.notification_handler(),
        )
        .map_err(|e| HtpcError::Startup {
            name: self.name().to_string(),
            message: e.to_string(),
        })?;

        tracing::debug!(component = %self.name(), "Connected to {}", address);
        *slot = Some(Arc::new(connection));
        Ok(())
    }

    fn stop(&self) {
        let connection = self.connection.write().take();
        if let Some(connection) = connection {
            tracing::debug!(component = %self.name(), "Shutting down RPC");
            connection.shutdown();
        }
    }

    fn call_remote(
        &self,
        method: &str,
        params: Value,
        wait_for_response: bool,
    ) -> Result<Option<Value>> {
        let connection = self
            .connection
            .read()
            .clone()
            .ok_or_else(|| HtpcError::NotStarted(self.name().to_string()))?;

        connection
            .send(method, params, wait_for_response)
            .map_err(|e| HtpcError::Transport {
                method: method.to_string(),
                message: e.to_string(),
            })
    }
}

impl Drop for XbmcRpc {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for XbmcRpc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XbmcRpc")
            .field("name", &self.notifier.name())
            .field("address", &self.config.tcp_address())
            .field("methods", &self.schema.methods.len())
            .field("connected", &self.is_connected())
            .finish()
    }
}
