pub mod reliable;

pub use reliable::{PendingDelivery, ReliableSender, SendOutcome};
