pub mod inbound;

pub use inbound::{handle_connection, DispatchOutcome, InboundDispatch};
