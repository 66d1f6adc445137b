//! Append-only, hash-chained audit trail of guard check outcomes.

use crate::core::{CheckKind, CheckStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

const GENESIS_DIGEST: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// One recorded guard check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Position in the trail, starting at zero.
    pub sequence: u64,
    /// Stage the check belongs to.
    pub stage: String,
    /// Input or output check.
    pub check: CheckKind,
    /// Outcome of the check.
    pub status: CheckStatus,
    /// Diagnostic payload (reasons, categories, counts).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
    /// When the entry was appended.
    pub timestamp: DateTime<Utc>,
    /// SHA-256 over the previous digest and this entry's body.
    pub digest: String,
}

impl AuditEntry {
    /// Returns the `stage.check: status` summary line.
    #[must_use]
    pub fn summary_line(&self) -> String {
        format!("{}.{}: {}", self.stage, self.check, self.status)
    }

    /// Returns a string field from the detail payload.
    #[must_use]
    pub fn detail_str(&self, key: &str) -> Option<&str> {
        self.detail.as_ref()?.get(key)?.as_str()
    }
}

#[derive(Serialize)]
struct EntryBody<'a> {
    sequence: u64,
    stage: &'a str,
    check: CheckKind,
    status: CheckStatus,
    detail: &'a Option<serde_json::Value>,
    timestamp: &'a DateTime<Utc>,
}

fn chain_digest(previous: &str, body: &EntryBody<'_>) -> String {
    let serialized = serde_json::to_string(body).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(previous.as_bytes());
    hasher.update(serialized.as_bytes());
    hex::encode(hasher.finalize())
}

/// Integrity failures found by [`AuditTrail::verify`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuditIntegrityError {
    /// Sequence numbers are not contiguous from zero.
    #[error("entry at position {position} has sequence {found}")]
    SequenceGap {
        /// Position in the trail.
        position: usize,
        /// Sequence number found there.
        found: u64,
    },

    /// A digest does not match the recomputed chain.
    #[error("digest mismatch at sequence {sequence}")]
    DigestMismatch {
        /// Sequence of the first bad entry.
        sequence: u64,
    },
}

/// Ordered log of check outcomes. Entries are never mutated or removed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditTrail {
    entries: Vec<AuditEntry>,
}

impl AuditTrail {
    /// Creates an empty trail.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry and returns it.
    pub fn append(
        &mut self,
        stage: impl Into<String>,
        check: CheckKind,
        status: CheckStatus,
        detail: Option<serde_json::Value>,
    ) -> &AuditEntry {
        let stage = stage.into();
        let sequence = self.entries.len() as u64;
        let timestamp = Utc::now();
        let digest = chain_digest(
            self.head_digest(),
            &EntryBody {
                sequence,
                stage: &stage,
                check,
                status,
                detail: &detail,
                timestamp: &timestamp,
            },
        );

        self.entries.push(AuditEntry {
            sequence,
            stage,
            check,
            status,
            detail,
            timestamp,
            digest,
        });
        &self.entries[self.entries.len() - 1]
    }

    /// Returns all entries in append order.
    #[must_use]
    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    /// Returns entries recorded for one stage.
    pub fn for_stage<'a>(&'a self, stage: &'a str) -> impl Iterator<Item = &'a AuditEntry> + 'a {
        self.entries.iter().filter(move |e| e.stage == stage)
    }

    /// Returns the entry for a stage and check kind, if any.
    #[must_use]
    pub fn find(&self, stage: &str, check: CheckKind) -> Option<&AuditEntry> {
        self.entries
            .iter()
            .find(|e| e.stage == stage && e.check == check)
    }

    /// Returns the digest of the last entry, or the genesis digest.
    #[must_use]
    pub fn head_digest(&self) -> &str {
        self.entries
            .last()
            .map_or(GENESIS_DIGEST, |e| e.digest.as_str())
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// One `stage.check: status` line per entry.
    #[must_use]
    pub fn summary(&self) -> Vec<String> {
        self.entries.iter().map(AuditEntry::summary_line).collect()
    }

    /// Recomputes the hash chain.
    ///
    /// # Errors
    ///
    /// Returns the first sequence gap or digest mismatch found.
    pub fn verify(&self) -> Result<(), AuditIntegrityError> {
        let mut previous = GENESIS_DIGEST.to_string();
        for (position, entry) in self.entries.iter().enumerate() {
            if entry.sequence != position as u64 {
                return Err(AuditIntegrityError::SequenceGap {
                    position,
                    found: entry.sequence,
                });
            }
            let expected = chain_digest(
                &previous,
                &EntryBody {
                    sequence: entry.sequence,
                    stage: &entry.stage,
                    check: entry.check,
                    status: entry.status,
                    detail: &entry.detail,
                    timestamp: &entry.timestamp,
                },
            );
            if expected != entry.digest {
                return Err(AuditIntegrityError::DigestMismatch {
                    sequence: entry.sequence,
                });
            }
            previous = expected;
        }
        Ok(())
    }
}
