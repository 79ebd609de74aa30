pub mod clock;
pub mod discovery;
pub mod record;
pub mod registry;

pub use clock::{Clock, ManualClock, SystemClock};
pub use record::{PeerRecord, PeerStatus};
pub use registry::PeerRegistry;
