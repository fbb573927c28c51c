//! The daily stock register projection — where the running-balance
//! recalculation actually happens.
//!
//! Receipts come from `procurement.arrival` streams, issues and the seeded
//! opening from the `stock.book` stream. Every applied event re-runs the
//! full fold (`millbook_stock::recalculate`) for the affected season; the
//! register never updates a row in place.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde_json::Value as JsonValue;

use millbook_core::{KmsYear, MillId, Quantity};
use millbook_events::EventEnvelope;
use millbook_procurement::{ArrivalEvent, ArrivalId};
use millbook_stock::{DayEntry, RegisterSummary, StockBookEvent, recalculate, summarize};

use super::{CursorGate, ProjectionApplyError, StreamCursors, sort_for_replay};
use crate::read_model::MillStore;

pub const BOOK_AGGREGATE_TYPE: &str = "stock.book";

/// Computed stock register for one (mill, season), plus the raw inputs it is
/// folded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockRegister {
    season: KmsYear,
    seed: Option<(NaiveDate, Quantity)>,
    receipts: HashMap<ArrivalId, (NaiveDate, Quantity)>,
    issues: BTreeMap<NaiveDate, Quantity>,
    entries: Vec<DayEntry>,
}

impl StockRegister {
    fn new(season: KmsYear) -> Self {
        Self {
            season,
            seed: None,
            receipts: HashMap::new(),
            issues: BTreeMap::new(),
            entries: Vec::new(),
        }
    }

    pub fn season(&self) -> KmsYear {
        self.season
    }

    /// Date-ascending register rows.
    pub fn entries(&self) -> &[DayEntry] {
        &self.entries
    }

    pub fn summary(&self) -> Option<RegisterSummary> {
        summarize(&self.entries)
    }

    /// Re-run the fold over current inputs (no incremental path).
    fn recompute(&mut self) {
        let mut received: BTreeMap<NaiveDate, Quantity> = BTreeMap::new();
        for (date, weight) in self.receipts.values() {
            let slot = received.entry(*date).or_insert(Quantity::ZERO);
            *slot += *weight;
        }
        self.entries = recalculate(self.seed, &received, &self.issues);
    }
}

/// Consumes arrival and stock-book events into per-season registers.
#[derive(Debug)]
pub struct DailyStockProjection<S>
where
    S: MillStore<KmsYear, StockRegister>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> DailyStockProjection<S>
where
    S: MillStore<KmsYear, StockRegister>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, mill_id: MillId, season: &KmsYear) -> Option<StockRegister> {
        self.store.get(mill_id, season)
    }

    pub fn list(&self, mill_id: MillId) -> Vec<StockRegister> {
        let mut registers = self.store.list(mill_id);
        registers.sort_by_key(|r| r.season);
        registers
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), ProjectionApplyError> {
        match envelope.aggregate_type() {
            t if t == super::arrivals::AGGREGATE_TYPE => self.apply_arrival(envelope),
            t if t == BOOK_AGGREGATE_TYPE => self.apply_book(envelope),
            _ => Ok(()),
        }
    }

    fn apply_arrival(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), ProjectionApplyError> {
        let mill_id = envelope.mill_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        match self.cursors.gate(mill_id, aggregate_id, seq)? {
            CursorGate::Skip => return Ok(()),
            CursorGate::Apply => {}
        }

        let ev: ArrivalEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionApplyError::Deserialize(e.to_string()))?;

        let (event_mill, season) = match &ev {
            ArrivalEvent::Recorded(e) => (e.mill_id, e.season),
            ArrivalEvent::Amended(e) => (e.mill_id, e.season),
            ArrivalEvent::Deleted(e) => (e.mill_id, e.season),
        };
        if event_mill != mill_id {
            return Err(ProjectionApplyError::MillIsolation(
                "event mill_id does not match envelope mill_id".to_string(),
            ));
        }

        let mut register = self
            .store
            .get(mill_id, &season)
            .unwrap_or_else(|| StockRegister::new(season));

        match ev {
            ArrivalEvent::Recorded(e) => {
                register
                    .receipts
                    .insert(e.arrival_id, (e.date, e.details.weight));
            }
            ArrivalEvent::Amended(e) => {
                register
                    .receipts
                    .insert(e.arrival_id, (e.date, e.details.weight));
            }
            ArrivalEvent::Deleted(e) => {
                register.receipts.remove(&e.arrival_id);
            }
        }

        register.recompute();
        self.store.upsert(mill_id, season, register);
        self.cursors.advance(mill_id, aggregate_id, seq);
        Ok(())
    }

    fn apply_book(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionApplyError> {
        let mill_id = envelope.mill_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        match self.cursors.gate(mill_id, aggregate_id, seq)? {
            CursorGate::Skip => return Ok(()),
            CursorGate::Apply => {}
        }

        let ev: StockBookEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionApplyError::Deserialize(e.to_string()))?;

        let (event_mill, season) = match &ev {
            StockBookEvent::OpeningSeeded(e) => (e.mill_id, e.season),
            StockBookEvent::IssueRecorded(e) => (e.mill_id, e.season),
        };
        if event_mill != mill_id {
            return Err(ProjectionApplyError::MillIsolation(
                "event mill_id does not match envelope mill_id".to_string(),
            ));
        }

        let mut register = self
            .store
            .get(mill_id, &season)
            .unwrap_or_else(|| StockRegister::new(season));

        match ev {
            StockBookEvent::OpeningSeeded(e) => {
                register.seed = Some((e.date, e.quantity));
            }
            StockBookEvent::IssueRecorded(e) => {
                // Last writer wins per date (the register's editable column).
                register.issues.insert(e.date, e.quantity);
            }
        }

        register.recompute();
        self.store.upsert(mill_id, season, register);
        self.cursors.advance(mill_id, aggregate_id, seq);
        Ok(())
    }

    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), ProjectionApplyError> {
        let mut envs: Vec<_> = envelopes.into_iter().collect();

        let mut mills: Vec<_> = envs.iter().map(|e| e.mill_id()).collect();
        mills.sort_by_key(|m| *m.as_uuid().as_bytes());
        mills.dedup();
        for mill in mills {
            self.store.clear_mill(mill);
            self.cursors.clear_mill(mill);
        }

        sort_for_replay(&mut envs);
        for env in &envs {
            self.apply_envelope(env)?;
        }
        Ok(())
    }
}
