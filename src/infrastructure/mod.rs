//! Concrete adapters for the ports declared in `domain::ports`. Only a
//! system clock and in-memory test doubles live here — real brokerage,
//! data-feed, and LLM adapters are out of scope for this crate.

pub mod clock;
pub mod mock;

pub use clock::{ReplayClock, SystemClock};
