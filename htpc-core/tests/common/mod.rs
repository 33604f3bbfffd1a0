//! Shared test helpers: an in-memory remote-method host

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use htpc_core::prelude::*;
use serde_json::{json, Value};

pub const STUB: PeerType = PeerType::new("stub");

/// Host whose transport is a table of canned replies
pub struct StubHost {
    notifier: Notifier,
    methods: MethodCatalog,
    peer_type: PeerType,
    replies: HashMap<String, Value>,
    writes: Mutex<Vec<(String, Value, bool)>>,
    started: AtomicBool,
}

impl StubHost {
    pub fn new(name: &str, notifications: &[&str], methods: MethodCatalog) -> Self {
        Self {
            notifier: Notifier::new(name, notifications.iter().copied().collect()),
            methods,
            peer_type: STUB,
            replies: HashMap::new(),
            writes: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        }
    }

    pub fn with_peer_type(mut self, peer_type: PeerType) -> Self {
        self.peer_type = peer_type;
        self
    }

    pub fn reply(mut self, method: &str, value: Value) -> Self {
        self.replies.insert(method.to_string(), value);
        self
    }

    /// Requests that reached the transport
    pub fn writes(&self) -> Vec<(String, Value, bool)> {
        self.writes.lock().unwrap().clone()
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }
}

impl Notifiable for StubHost {
    fn notifier(&self) -> &Notifier {
        &self.notifier
    }
}

impl RpcServer for StubHost {
    fn peer_type(&self) -> PeerType {
        self.peer_type
    }

    fn methods(&self) -> &MethodCatalog {
        &self.methods
    }

    fn start(&self) -> Result<()> {
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        self.started.store(false, Ordering::SeqCst);
    }

    fn call_remote(
        &self,
        method: &str,
        params: Value,
        wait_for_response: bool,
    ) -> Result<Option<Value>> {
        self.writes
            .lock()
            .unwrap()
            .push((method.to_string(), params, wait_for_response));

        if !wait_for_response {
            return Ok(None);
        }
        self.replies
            .get(method)
            .cloned()
            .map(Some)
            .ok_or_else(|| HtpcError::Transport {
                method: method.to_string(),
                message: "no canned reply".to_string(),
            })
    }
}

/// `{"Ping": {params: {}, returns: {type: "string"}}}`
pub fn ping_catalog() -> MethodCatalog {
    MethodCatalog::new().with(
        "Ping",
        MethodDescriptor::new(
            "Ping responder",
            json!({"type": "object", "properties": {}}),
            json!({"type": "string"}),
        ),
    )
}
