//! Remote-method hosts: notification publishers that also execute methods
//! described by a discovered schema

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Deref;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{HtpcError, Result};
use crate::notification::Notifiable;
use crate::validation::Validator;

/// Schema of one remote method
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MethodDescriptor {
    #[serde(default)]
    pub description: String,
    /// Object schema keyed by parameter name
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub returns: Value,
}

impl MethodDescriptor {
    pub fn new(description: impl Into<String>, params: Value, returns: Value) -> Self {
        Self {
            description: description.into(),
            params,
            returns,
        }
    }
}

/// Methods a host can execute; written once at discovery time
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MethodCatalog {
    methods: BTreeMap<String, MethodDescriptor>,
}

impl MethodCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, descriptor: MethodDescriptor) -> Self {
        self.insert(name, descriptor);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, descriptor: MethodDescriptor) {
        self.methods.insert(name.into(), descriptor);
    }

    pub fn get(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut MethodDescriptor> {
        self.methods.get_mut(name)
    }

    /// Method names, sorted
    pub fn names(&self) -> Vec<String> {
        self.methods.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MethodDescriptor)> {
        self.methods.iter()
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, MethodDescriptor)> for MethodCatalog {
    fn from_iter<I: IntoIterator<Item = (S, MethodDescriptor)>>(iter: I) -> Self {
        Self {
            methods: iter.into_iter().map(|(n, d)| (n.into(), d)).collect(),
        }
    }
}

/// Stable tag identifying a kind of host, used to key event-handler interests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerType(&'static str);

impl PeerType {
    pub const fn new(tag: &'static str) -> Self {
        Self(tag)
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for PeerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// A notification publisher that executes remote methods
///
/// Concrete hosts provide the catalog, the lifecycle and the transport call;
/// lookup and schema validation are shared.
///
/// `execute` keeps the flat "reply or nothing" contract; `try_execute` runs
/// the same pipeline and says why a call did not succeed.
pub trait RpcServer: Notifiable + Send + Sync {
    /// Tag of the concrete host type
    fn peer_type(&self) -> PeerType;

    /// Discovered method catalog
    fn methods(&self) -> &MethodCatalog;

    /// Named schema definitions that `$ref` entries resolve against
    fn schema_definitions(&self) -> Option<&Map<String, Value>> {
        None
    }

    /// Open the channel to the remote peer
    fn start(&self) -> Result<()>;

    /// Release the channel; safe to call repeatedly or before `start`
    fn stop(&self);

    /// Send an already validated request
    ///
    /// Returns `Some(reply)` when `wait_for_response` is set, `None` once a
    /// fire-and-forget request has been written.
    fn call_remote(
        &self,
        method: &str,
        params: Value,
        wait_for_response: bool,
    ) -> Result<Option<Value>>;

    fn available_methods(&self) -> Vec<String> {
        self.methods().names()
    }

    fn method_info(&self, method: &str) -> Option<&MethodDescriptor> {
        let info = self.methods().get(method);
        if info.is_none() {
            tracing::warn!(
                component = %self.name(),
                "Cannot give info for method {} because it is unknown",
                method
            );
        }
        info
    }

    /// Validate, send and check the reply of `method`
    ///
    /// A `Null` `params` is treated as an empty parameter object.
    fn try_execute(
        &self,
        method: &str,
        params: Value,
        wait_for_response: bool,
    ) -> Result<Option<Value>> {
        let params = if params.is_null() {
            Value::Object(Map::new())
        } else {
            params
        };
        tracing::debug!(
            component = %self.name(),
            "Executing method {} with parameters {}",
            method,
            params
        );

        let descriptor = self
            .methods()
            .get(method)
            .ok_or_else(|| HtpcError::UnknownMethod(method.to_string()))?;

        let validator = self
            .schema_definitions()
            .map_or_else(Validator::new, Validator::with_definitions);

        validator
            .validate(&params, &descriptor.params)
            .map_err(|source| HtpcError::InvalidParams {
                method: method.to_string(),
                source,
            })?;

        let Some(reply) = self.call_remote(method, params, wait_for_response)? else {
            return Ok(None);
        };

        validator
            .validate(&reply, &descriptor.returns)
            .map_err(|source| HtpcError::InvalidReply {
                method: method.to_string(),
                source,
            })?;

        Ok(Some(reply))
    }

    /// Execute `method`, logging any failure and returning `None` for it
    fn execute(&self, method: &str, params: Value, wait_for_response: bool) -> Option<Value> {
        match self.try_execute(method, params, wait_for_response) {
            Ok(reply) => reply,
            Err(e @ HtpcError::Transport { .. }) | Err(e @ HtpcError::NotStarted(_)) => {
                tracing::warn!(component = %self.name(), "{}", e);
                None
            }
            Err(e) => {
                tracing::error!(component = %self.name(), "{}", e);
                None
            }
        }
    }
}

/// A started host that stops itself when dropped
pub struct Running<'a, S: RpcServer + ?Sized> {
    server: &'a S,
}

/// Start `server`, returning a guard that calls `stop()` on drop
pub fn run<S: RpcServer + ?Sized>(server: &S) -> Result<Running<'_, S>> {
    server.start()?;
    Ok(Running { server })
}

impl<S: RpcServer + ?Sized> Deref for Running<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.server
    }
}

impl<S: RpcServer + ?Sized> Drop for Running<'_, S> {
    fn drop(&mut self) {
        self.server.stop();
    }
}
