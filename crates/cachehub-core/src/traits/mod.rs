//! Core traits defined in `cachehub-core` and implemented by other crates.

pub mod clock;
pub mod engine;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{EngineCapabilities, StorageEngine};
