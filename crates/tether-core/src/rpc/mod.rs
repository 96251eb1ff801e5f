//! Call-by-name RPC: typed handlers registered under operation names and
//! dispatched from JSON invocation messages.

mod dispatcher;
mod handler;
mod message;

pub use dispatcher::{Dispatcher, Operations, Remote};
pub use handler::{Handler, IntoOutcome, Json, Outcome};
pub use message::{CallMessage, EventMessage, Invocation, ResultMessage};
