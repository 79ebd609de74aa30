pub mod engine;

pub use engine::{EngineError, InboundOutcome, ReplicationEngine};
