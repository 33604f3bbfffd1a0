//! The XBMC JSON-RPC schema document and its normalized form
//!
//! XBMC describes each method's parameters as an ordered list of named
//! records. Normalization turns that list into a single object schema keyed
//! by parameter name, which is what gets validated at call time.
//! Notifications describe the `params` object they push the same way.
//!
//! A few entries of the published document do not match what XBMC actually
//! sends; [`SCHEMA_PATCHES`] corrects them after normalization.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use htpc_core::{MethodCatalog, MethodDescriptor, NotificationCatalog};

use crate::error::{Result, XbmcError};

/// Schema document as served by `GET /jsonrpc`
#[derive(Debug, Clone, Deserialize)]
pub struct RawSchema {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: Value,
    pub methods: BTreeMap<String, RawEntry>,
    #[serde(default)]
    pub notifications: BTreeMap<String, RawEntry>,
    #[serde(default)]
    pub types: Map<String, Value>,
}

/// One method or notification as published
#[derive(Debug, Clone, Deserialize)]
pub struct RawEntry {
    #[serde(default)]
    pub description: String,
    /// Ordered parameter records, each carrying a `name`
    #[serde(default)]
    pub params: Vec<Map<String, Value>>,
    #[serde(default)]
    pub returns: Value,
}

/// A notification's description and the schema of its pushed `params`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationDescriptor {
    pub description: String,
    pub params: Value,
}

/// Normalized schema of one XBMC instance
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    pub version: Value,
    pub methods: MethodCatalog,
    pub notifications: BTreeMap<String, NotificationDescriptor>,
    /// Named definitions that `$ref` entries resolve against
    pub types: Map<String, Value>,
}

impl Schema {
    /// Parse and normalize a schema document, then apply [`SCHEMA_PATCHES`]
    pub fn from_document(document: &str) -> Result<Self> {
        let raw: RawSchema = serde_json::from_str(document)
            .map_err(|e| XbmcError::Schema(format!("Failed to parse schema: {}", e)))?;
        let mut schema = Self::normalize(raw)?;
        apply_patches(&mut schema)?;
        Ok(schema)
    }

    /// Normalize without patching
    pub fn normalize(raw: RawSchema) -> Result<Self> {
        let mut methods = MethodCatalog::new();
        for (name, entry) in raw.methods {
            let params = normalize_params(&name, entry.params)?;
            let returns = normalize_returns(entry.returns);
            methods.insert(name, MethodDescriptor::new(entry.description, params, returns));
        }

        let mut notifications = BTreeMap::new();
        for (name, entry) in raw.notifications {
            let params = normalize_params(&name, entry.params)?;
            notifications.insert(
                name,
                NotificationDescriptor {
                    description: entry.description,
                    params,
                },
            );
        }

        Ok(Self {
            version: raw.version,
            methods,
            notifications,
            types: raw.types,
        })
    }

    /// Catalog for a [`htpc_core::Notifier`], each entry carrying its descriptor
    pub fn notification_catalog(&self) -> NotificationCatalog {
        let mut catalog = NotificationCatalog::new();
        for (name, descriptor) in &self.notifications {
            catalog.insert(name.clone(), serde_json::to_value(descriptor).ok());
        }
        catalog
    }
}

/// `[{name, ...}, ...]` into `{"type":"object","properties":{name: {...}}}`
pub fn normalize_params(owner: &str, params: Vec<Map<String, Value>>) -> Result<Value> {
    let mut properties = Map::new();
    for mut record in params {
        let name = match record.remove("name") {
            Some(Value::String(name)) => name,
            _ => {
                return Err(XbmcError::Schema(format!(
                    "Parameter of {} has no name",
                    owner
                )))
            }
        };
        properties.insert(name, Value::Object(record));
    }
    Ok(json!({"type": "object", "properties": properties}))
}

/// Bare type names become `{"type": name}`
fn normalize_returns(returns: Value) -> Value {
    match returns {
        Value::String(type_name) => json!({ "type": type_name }),
        other => other,
    }
}

/// A named correction applied to a normalized schema
///
/// Returns an error naming what was missing when the entry it corrects is
/// not in the document.
pub type SchemaPatch = fn(&mut Schema) -> std::result::Result<(), String>;

/// Patches in application order
pub const SCHEMA_PATCHES: &[(&str, SchemaPatch)] = &[
    ("wrap_version_returns", wrap_version_returns),
    (
        "synthesize_screensaver_notifications",
        synthesize_screensaver_notifications,
    ),
];

/// Apply every patch in order
///
/// A patch whose target is absent fails the whole schema.
pub fn apply_patches(schema: &mut Schema) -> Result<()> {
    for (name, patch) in SCHEMA_PATCHES {
        patch(schema).map_err(|missing| {
            XbmcError::Schema(format!("Schema patch {} failed: {}", name, missing))
        })?;
        tracing::trace!("Applied schema patch {}", name);
    }
    Ok(())
}

/// `JSONRPC.Version` replies nest the version under a `version` key
pub fn wrap_version_returns(schema: &mut Schema) -> std::result::Result<(), String> {
    let descriptor = schema
        .methods
        .get_mut("JSONRPC.Version")
        .ok_or_else(|| "no JSONRPC.Version method".to_string())?;

    if descriptor.returns.pointer("/properties/version").is_some() {
        return Ok(());
    }
    let properties = descriptor
        .returns
        .get("properties")
        .cloned()
        .ok_or_else(|| "JSONRPC.Version returns have no properties".to_string())?;

    descriptor.returns = json!({
        "type": "object",
        "properties": {"version": {"properties": properties}}
    });
    Ok(())
}

/// Screensaver notifications are pushed with the parameter shape of
/// `VideoLibrary.OnCleanStarted`, whatever the document says about them
///
/// Both entries are replaced by independent copies of that template with
/// their own descriptions.
pub fn synthesize_screensaver_notifications(
    schema: &mut Schema,
) -> std::result::Result<(), String> {
    let template = schema
        .notifications
        .get("VideoLibrary.OnCleanStarted")
        .cloned()
        .ok_or_else(|| "no VideoLibrary.OnCleanStarted notification".to_string())?;

    for (name, description) in [
        (
            "GUI.OnScreensaverActivated",
            "The screensaver has been activated.",
        ),
        (
            "GUI.OnScreensaverDeactivated",
            "The screensaver has been deactivated.",
        ),
    ] {
        schema.notifications.insert(
            name.to_string(),
            NotificationDescriptor {
                description: description.to_string(),
                params: template.params.clone(),
            },
        );
    }
    Ok(())
}
