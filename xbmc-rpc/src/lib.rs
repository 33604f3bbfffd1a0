//! # XBMC JSON-RPC host
//!
//! [`XbmcRpc`] discovers the method and notification schema of an XBMC (Kodi)
//! instance over HTTP, then talks to it over the persistent TCP transport:
//!
//! ```rust,no_run
//! use htpc_core::prelude::*;
//! use serde_json::json;
//! use xbmc_rpc::{XbmcConfig, XbmcRpc};
//!
//! # fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
//! let xbmc = XbmcRpc::new("living-room", XbmcConfig::new("192.168.1.120"))?;
//! let running = htpc_core::run(&xbmc)?;
//!
//! println!("{:?}", running.execute("JSONRPC.Ping", json!({}), true));
//! println!("{:?}", running.execute("JSONRPC.Version", json!({}), true));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod discovery;
pub mod error;
pub mod host;
pub mod schema;

pub use config::XbmcConfig;
pub use error::{Result, XbmcError};
pub use host::{XbmcRpc, PEER_TYPE};
pub use schema::{NotificationDescriptor, Schema, SCHEMA_PATCHES};
