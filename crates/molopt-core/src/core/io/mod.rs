//! File formats exchanged with the outside of the optimization loop.
//!
//! - [`scored`] - Oracle-scored proposals in, population snapshots out, both as CSV

pub mod scored;
