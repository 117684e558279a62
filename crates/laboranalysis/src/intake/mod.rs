//! Order intake: validation, the `incoming` queue hand-off, bulk CSV import
//! and the HTTP routes in front of them.

mod import;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use import::{ImportSummary, RejectedRow};
pub use router::intake_router;
pub use service::{IntakeError, IntakeService, OrderRequest, SubmittedOrder};
