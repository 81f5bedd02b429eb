//! Platform-specific primitives (mapping, process liveness, futex, clock)

mod linux;

pub use linux::*;
