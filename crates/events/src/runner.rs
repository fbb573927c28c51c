//! Projection runner utilities (read model builders).
//!
//! Read models are **disposable**; events are the source of truth.
//! This module provides deterministic replay and cursor/version tracking
//! without making storage assumptions.

use millbook_core::MillId;

use crate::{EventEnvelope, Projection};

/// Tracks projection progress for a single mill.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ProjectionCursor {
    mill_id: MillId,
    last_sequence_number: u64,
}

impl ProjectionCursor {
    pub fn mill_id(&self) -> MillId {
        self.mill_id
    }

    pub fn last_sequence_number(&self) -> u64 {
        self.last_sequence_number
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectionError {
    MillMismatch { expected: MillId, found: MillId },
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Runs envelopes through a projection and tracks progress.
#[derive(Debug)]
pub struct ProjectionRunner<P>
where
    P: Projection,
{
    projection: P,
    cursor: Option<ProjectionCursor>,
}

impl<P> ProjectionRunner<P>
where
    P: Projection,
{
    pub fn new(projection: P) -> Self {
        Self {
            projection,
            cursor: None,
        }
    }

    /// Create a runner pinned to a specific mill.
    ///
    /// This prevents accidentally starting a projection with an event from
    /// the wrong mill.
    pub fn new_for_mill(mill_id: MillId, projection: P) -> Self {
        Self {
            projection,
            cursor: Some(ProjectionCursor {
                mill_id,
                last_sequence_number: 0,
            }),
        }
    }

    pub fn projection(&self) -> &P {
        &self.projection
    }

    pub fn projection_mut(&mut self) -> &mut P {
        &mut self.projection
    }

    pub fn into_projection(self) -> P {
        self.projection
    }

    /// Current cursor/version for this projection (if any envelopes were applied).
    pub fn cursor(&self) -> Option<ProjectionCursor> {
        self.cursor
    }

    /// Apply a single envelope, enforcing mill consistency and monotonic sequencing.
    pub fn apply(&mut self, envelope: &EventEnvelope<P::Ev>) -> Result<(), ProjectionError> {
        let found_mill = envelope.mill_id();
        let found_seq = envelope.sequence_number();

        match self.cursor {
            None => {
                self.projection.apply(envelope);
                self.cursor = Some(ProjectionCursor {
                    mill_id: found_mill,
                    last_sequence_number: found_seq,
                });
                Ok(())
            }
            Some(mut c) => {
                if c.mill_id != found_mill {
                    return Err(ProjectionError::MillMismatch {
                        expected: c.mill_id,
                        found: found_mill,
                    });
                }
                if found_seq <= c.last_sequence_number {
                    return Err(ProjectionError::NonMonotonicSequence {
                        last: c.last_sequence_number,
                        found: found_seq,
                    });
                }

                self.projection.apply(envelope);
                c.last_sequence_number = found_seq;
                self.cursor = Some(c);
                Ok(())
            }
        }
    }

    /// Apply many envelopes in order.
    pub fn run<'a>(
        &mut self,
        envelopes: impl IntoIterator<Item = &'a EventEnvelope<P::Ev>>,
    ) -> Result<(), ProjectionError>
    where
        P::Ev: 'a,
    {
        for env in envelopes {
            self.apply(env)?;
        }
        Ok(())
    }

    /// Rebuild a projection from scratch by replaying the full event history.
    ///
    /// The factory is used to create a fresh projection instance.
    pub fn rebuild_from_scratch<'a>(
        factory: impl FnOnce() -> P,
        envelopes: impl IntoIterator<Item = &'a EventEnvelope<P::Ev>>,
    ) -> Result<(P, Option<ProjectionCursor>), ProjectionError>
    where
        P::Ev: 'a,
    {
        let mut runner = ProjectionRunner::new(factory());
        runner.run(envelopes)?;
        Ok((runner.projection, runner.cursor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Event;
    use chrono::{DateTime, Utc};
    use millbook_core::AggregateId;
    use uuid::Uuid;

    #[derive(Debug, Clone)]
    struct Ticked {
        at: DateTime<Utc>,
    }

    impl Event for Ticked {
        fn event_type(&self) -> &'static str {
            "test.ticked"
        }

        fn version(&self) -> u32 {
            1
        }

        fn occurred_at(&self) -> DateTime<Utc> {
            self.at
        }
    }

    #[derive(Default)]
    struct Counter {
        applied: usize,
    }

    impl Projection for Counter {
        type Ev = Ticked;

        fn apply(&mut self, _envelope: &EventEnvelope<Self::Ev>) {
            self.applied += 1;
        }
    }

    fn envelope(mill_id: MillId, seq: u64) -> EventEnvelope<Ticked> {
        EventEnvelope::new(
            Uuid::now_v7(),
            mill_id,
            AggregateId::new(),
            "test.counter",
            seq,
            Ticked { at: Utc::now() },
        )
    }

    #[test]
    fn runner_tracks_cursor_and_rejects_regressions() {
        let mill_id = MillId::new();
        let mut runner = ProjectionRunner::new_for_mill(mill_id, Counter::default());

        runner.apply(&envelope(mill_id, 1)).unwrap();
        runner.apply(&envelope(mill_id, 2)).unwrap();
        assert_eq!(runner.projection().applied, 2);
        assert_eq!(runner.cursor().unwrap().last_sequence_number(), 2);

        let err = runner.apply(&envelope(mill_id, 2)).unwrap_err();
        assert_eq!(err, ProjectionError::NonMonotonicSequence { last: 2, found: 2 });
    }

    #[test]
    fn runner_pinned_to_a_mill_rejects_foreign_events() {
        let mill_id = MillId::new();
        let other = MillId::new();
        let mut runner = ProjectionRunner::new_for_mill(mill_id, Counter::default());

        let err = runner.apply(&envelope(other, 1)).unwrap_err();
        assert_eq!(
            err,
            ProjectionError::MillMismatch {
                expected: mill_id,
                found: other,
            }
        );
        assert_eq!(runner.projection().applied, 0);
    }

    #[test]
    fn rebuild_replays_full_history() {
        let mill_id = MillId::new();
        let history: Vec<_> = (1..=5).map(|seq| envelope(mill_id, seq)).collect();

        let (projection, cursor) =
            ProjectionRunner::rebuild_from_scratch(Counter::default, history.iter()).unwrap();

        assert_eq!(projection.applied, 5);
        assert_eq!(cursor.unwrap().last_sequence_number(), 5);
    }
}
