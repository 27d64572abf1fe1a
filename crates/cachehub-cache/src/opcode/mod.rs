//! Opcode-cache style engines (APC, Wincache, Xcache) over a shared segment.

pub mod engine;
pub mod segment;

pub use engine::{OpcodeCacheEngine, OpcodeFlavor};
pub use segment::{LocalSegment, SegmentError, SharedSegment};
