// Application layer - use cases and orchestration
// LedgerService owns the transactional operations; ReportService drives exports.

pub mod error;
pub mod reporting;
pub mod service;

pub use error::*;
pub use reporting::*;
pub use service::*;
