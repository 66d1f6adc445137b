//! Output auditing and the audit trail.
//!
//! This module provides:
//! - The two-pass output auditor with in-place redaction
//! - The append-only, hash-chained audit trail

mod auditor;
mod trail;

pub use auditor::{redaction_notice, AuditReport, OutputAuditor};
pub use trail::{AuditEntry, AuditIntegrityError, AuditTrail};
