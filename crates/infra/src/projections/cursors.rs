use std::collections::HashMap;
use std::sync::RwLock;

use millbook_core::{AggregateId, MillId};

use super::ProjectionApplyError;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    mill_id: MillId,
    aggregate_id: AggregateId,
}

/// What the cursor check decided for an incoming envelope.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum CursorGate {
    /// New position; apply the event and then `advance`.
    Apply,
    /// Duplicate or replayed delivery; safe to ignore.
    Skip,
}

/// Per (mill, aggregate) stream cursors supporting at-least-once delivery.
///
/// The first event of a stream may carry any positive sequence number (stores
/// start at 1); after that strict `last + 1` increments are enforced.
#[derive(Debug, Default)]
pub(crate) struct StreamCursors {
    inner: RwLock<HashMap<CursorKey, u64>>,
}

impl StreamCursors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gate(
        &self,
        mill_id: MillId,
        aggregate_id: AggregateId,
        seq: u64,
    ) -> Result<CursorGate, ProjectionApplyError> {
        let key = CursorKey {
            mill_id,
            aggregate_id,
        };
        let last = match self.inner.read() {
            Ok(cursors) => *cursors.get(&key).unwrap_or(&0),
            Err(_) => 0,
        };

        if seq == 0 {
            return Err(ProjectionApplyError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            return Ok(CursorGate::Skip);
        }
        if last != 0 && seq != last + 1 {
            return Err(ProjectionApplyError::NonMonotonicSequence { last, found: seq });
        }

        Ok(CursorGate::Apply)
    }

    pub fn advance(&self, mill_id: MillId, aggregate_id: AggregateId, seq: u64) {
        if let Ok(mut cursors) = self.inner.write() {
            cursors.insert(
                CursorKey {
                    mill_id,
                    aggregate_id,
                },
                seq,
            );
        }
    }

    pub fn clear_mill(&self, mill_id: MillId) {
        if let Ok(mut cursors) = self.inner.write() {
            cursors.retain(|k, _| k.mill_id != mill_id);
        }
    }
}
