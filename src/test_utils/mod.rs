//! Scripted connections for exercising the engine without a database server.

mod gate;
mod mock;

pub use gate::Gate;
pub use mock::{CallLog, ConnCall, MockConnection};
