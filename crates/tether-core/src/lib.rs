//! Tether: keep a server-side model in sync with a remote client and let the
//! client call named operations on a server object.
//!
//! The crate has two halves that share one duplex JSON channel:
//!
//! - **Synchronization**: model types carry a [`Model`] header that tracks
//!   whether they changed since the last sync. [`DiffEncoder`] turns the
//!   model into `{"m": ...}` frames holding only what changed, including
//!   compact edit scripts for lists. [`Mirror`] replays those frames on the
//!   receiving end.
//! - **Dispatch**: a [`Remote`] type exposes operations by name. The
//!   [`Dispatcher`] decodes positional JSON arguments, invokes the operation
//!   and reports its values or error in a [`ResultMessage`].
//!
//! [`Session`] ties both to one connection at a time.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::{Arc, Mutex};
//! use tether_core::{reflect_struct, Fields, Model, Node, Remote, Operations, Structure};
//!
//! #[derive(Default)]
//! struct Counter {
//!     model: Model,
//!     value: i64,
//! }
//!
//! impl Structure for Counter {
//!     fn declare(fields: &mut Fields<Self>) {
//!         fields.field("Value", |c| &c.value);
//!     }
//! }
//!
//! reflect_struct!(Counter, node = model);
//!
//! struct App {
//!     state: Arc<Mutex<Counter>>,
//! }
//!
//! impl App {
//!     fn add(&self, n: i64) -> i64 {
//!         let mut state = self.state.lock().unwrap();
//!         state.value += n;
//!         state.mark_dirty();
//!         state.value
//!     }
//! }
//!
//! impl Remote for App {
//!     fn expose(ops: &mut Operations<Self>) {
//!         ops.add("Add", App::add);
//!     }
//! }
//! ```

pub mod config;
pub mod encode;
pub mod error;
pub mod mirror;
pub mod model;
pub mod reflect;
pub mod rpc;
pub mod session;

pub use config::{EncoderConfig, ProtocolConfig, SessionConfig};
pub use encode::{encode_diff, DiffEncoder};
pub use error::{Result, TetherError};
pub use mirror::Mirror;
pub use model::{Model, ModelState, Node, Slot};
pub use reflect::{Fields, Reflect, Structure, TypeRegistry};
pub use rpc::{
    CallMessage, Dispatcher, EventMessage, Invocation, IntoOutcome, Json, Operations, Outcome,
    Remote, ResultMessage,
};
pub use session::{Session, SessionEnd, SessionHandle};
