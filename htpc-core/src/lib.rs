//! # HTPC core
//!
//! Contracts for home-theater automation agents:
//!
//! - [`Notifiable`] / [`Notifier`]: named notifications with asynchronous,
//!   fire-and-forget delivery to subscribers
//! - [`RpcServer`]: a notification publisher that also executes remote methods
//!   described by a discovered schema, validating parameters and replies
//! - [`EventHandler`]: wires a consumer's per-peer-type interests onto the
//!   hosts it connects to
//! - [`CronJob`] / [`ScheduledTask`]: publishers driven by a wall-clock schedule
//!
//! ## Usage
//!
//! ```rust
//! use htpc_core::prelude::*;
//! use serde_json::json;
//!
//! let sensor = Notifier::new("cpu", ["temperature"].into_iter().collect());
//! sensor
//!     .subscribe("temperature", callback(|publisher, value| {
//!         println!("{} reports {}", publisher.name(), value);
//!         Ok(())
//!     }))
//!     .unwrap();
//!
//! // Delivery happens on a background thread
//! if let Some(delivery) = sensor.notify("temperature", json!(48.5)) {
//!     delivery.join().unwrap();
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! XbmcRpc (RpcServer) ──push──▶ Notifier ──thread──▶ callbacks
//!      ▲                                               │
//!      └──── execute(method, params) ◀── EventHandler ─┘
//! ```

pub mod cron;
pub mod error;
pub mod logging;
pub mod notification;
pub mod router;
pub mod rpc;
pub mod validation;

pub use cron::{CronField, CronJob, CronSchedule, ScheduledTask};
pub use error::{HtpcError, Result};
pub use notification::{callback, Callback, CallbackResult, NotificationCatalog, Notifiable, Notifier};
pub use router::{EventHandler, EventHandlerBuilder};
pub use rpc::{run, MethodCatalog, MethodDescriptor, PeerType, RpcServer, Running};
pub use validation::{ValidationError, Validator};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        callback, Callback, CronJob, CronSchedule, EventHandler, HtpcError, MethodCatalog,
        MethodDescriptor, NotificationCatalog, Notifiable, Notifier, PeerType, Result, RpcServer,
        ScheduledTask,
    };
}
