//! Request audit trail.
//!
//! Every request, rejected or not, produces exactly one start record and one
//! completion record, written through the background store writer.

pub mod auditor;
pub mod types;

pub use auditor::{target_service, RequestAuditor};
pub use types::{AuditCompletion, AuditRecord};
