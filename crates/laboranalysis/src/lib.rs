//! Staged order pipeline for labor-market report requests.
//!
//! Customer requests enter the `incoming` queue through [`intake`], then move
//! through the `harvesting`, `analyzing`, and `notifying` queues, each drained
//! by its own [`pipeline::StageWorker`], until they land in `complete`.

pub mod config;
pub mod error;
pub mod intake;
pub mod pipeline;
pub mod reports;
pub mod telemetry;
