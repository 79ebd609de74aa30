pub mod frame;

pub use frame::{CodecError, EnvelopeReader, EnvelopeWriter};
