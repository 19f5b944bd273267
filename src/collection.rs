//! Collection Loop
//!
//! Fixed-interval scheduler tying the pipeline together:
//! sampler → snapshot → publish, or save locally when the broker is
//! unavailable. Observers receive a [`DisplayUpdate`] after every tick.

mod display;
mod runner;
mod schedule;

pub use display::{DeliveryOutcome, DisplayUpdate};
pub use runner::{CollectionLoop, DEFAULT_SHUTDOWN_TIMEOUT, LoopState, TickOutcome};
pub use schedule::{CollectionError, DEFAULT_INTERVAL, MIN_INTERVAL, Schedule};
