//! # Tether Engine
//!
//! Offline mutation tracking and conflict resolution for a backend-as-a-service
//! client.
//!
//! Local edits are never written straight into an object's data. They are
//! recorded as [`Operation`]s in pending generations on top of the last known
//! server data, merged with earlier edits to the same field, and only folded
//! into server data once the backend has acknowledged them.
//!
//! ## Design Principles
//!
//! - **No IO of its own**: network access goes through a caller-supplied
//!   [`Transport`]
//! - **Closed operation set**: every field change is one [`Operation`]
//!   variant, merged by an exhaustive table
//! - **No lost edits**: a failed save folds its generation back for retry
//! - **Ordered per object**: save, fetch and destroy on one object run in
//!   submission order through its [`TaskQueue`]
//!
//! ## Core Concepts
//!
//! ### Generations
//!
//! An object's pending operations form a stack of generations, oldest first.
//! Edits always land in the newest one. A save sends the oldest and opens a
//! fresh generation for edits made while the request is in flight.
//!
//! ### State stores
//!
//! A [`StateStore`] owns every object's state:
//! - [`SingleInstanceStore`] - one state per `(className, id)`
//! - [`InstanceStore`] - one state per in-memory instance
//!
//! ### Estimates
//!
//! The current value of a field is its server value with every pending
//! generation applied in order.
//!
//! ## Quick Start
//!
//! ```rust
//! use tether_engine::{
//!     AttributeUpdates, Number, ObjectRef, Operation, SingleInstanceStore, StateStore, Value,
//! };
//!
//! let mut store = SingleInstanceStore::new();
//! let game = ObjectRef::with_id("Game", "g1");
//!
//! // Last known server data
//! let mut changes = AttributeUpdates::new();
//! changes.insert("score".to_string(), Some(Value::from(10)));
//! store.commit_server_changes(&game, changes);
//!
//! // A local edit, then a save begins and another edit arrives
//! store.set_pending_op(&game, "score", Some(Operation::Increment(Number::Int(5))));
//! store.push_pending_state(&game);
//! store.set_pending_op(&game, "score", Some(Operation::Increment(Number::Int(3))));
//!
//! assert_eq!(store.estimate_attribute(&game, "score").unwrap(), Some(Value::from(18)));
//!
//! // The save failed: fold the sent generation back in
//! store.merge_first_pending_state(&game).unwrap();
//! let pending = store.get_pending_ops(&game);
//! assert_eq!(pending.len(), 1);
//! assert_eq!(pending[0].get("score"), Some(&Operation::Increment(Number::Int(8))));
//! ```
//!
//! ## Objects
//!
//! [`Client`] and [`DataObject`] wrap a store and a transport into the
//! familiar `set` / `save` / `fetch` / `destroy` surface.

pub mod client;
pub mod config;
pub mod decode;
pub mod encode;
pub mod error;
pub mod object;
pub mod operation;
pub mod state;
pub mod store;
pub mod task_queue;
pub mod transport;
pub mod value;

// Re-export main types at crate root
pub use client::Client;
pub use config::{ClientConfig, ClientConfigBuilder, StoreMode};
pub use decode::Decoder;
pub use encode::{Encoder, SeenSet};
pub use error::{Error, Result};
pub use object::DataObject;
pub use operation::{Operation, RelationOp};
pub use state::{Generation, ObjectCache, ObjectState};
pub use store::{InstanceStore, SingleInstanceStore, StateStore};
pub use task_queue::TaskQueue;
pub use transport::{Method, RequestOptions, Transport, TransportError};
pub use value::{
    AttributeMap, AttributeUpdates, GeoPoint, InstanceId, Number, ObjectRef, RelationHandle, Value,
};
