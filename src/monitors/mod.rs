//! Pure monitoring logic
//!
//! Everything in here is synchronous and owns no tasks or channels. The actors
//! and the health aggregator keep one instance of each structure and drive it
//! from their own loops.

pub mod alerts;
pub mod health;
pub mod ledger;
pub mod rules;
pub mod thresholds;
