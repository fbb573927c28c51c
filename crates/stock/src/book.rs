use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use millbook_core::{Aggregate, AggregateId, AggregateRoot, DomainError, KmsYear, MillId, Quantity};
use millbook_events::Event;

/// Stock book identifier.
///
/// One book exists per (mill, season); the id is derived deterministically so
/// every writer addresses the same stream without a lookup.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookId(pub AggregateId);

impl BookId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    /// Deterministic id for the (mill, season) book (UUIDv5 in the mill's
    /// namespace).
    pub fn for_season(mill_id: MillId, season: KmsYear) -> Self {
        let uuid = Uuid::new_v5(mill_id.as_uuid(), season.label().as_bytes());
        Self(AggregateId::from_uuid(uuid))
    }
}

impl core::fmt::Display for BookId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: StockBook.
///
/// The book records the *facts* the register is computed from: one optional
/// seeded opening balance, and the latest issued-to-milling figure per date.
/// Like the register itself, it never stores derived balances — those come
/// out of `ledger::recalculate` on every read/write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockBook {
    id: BookId,
    mill_id: Option<MillId>,
    season: Option<KmsYear>,
    seed: Option<(NaiveDate, Quantity)>,
    issues: BTreeMap<NaiveDate, Quantity>,
    version: u64,
    created: bool,
}

impl StockBook {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    ///
    /// The book is implicitly created by its first event (there is no
    /// explicit "open book" command), mirroring how the register appears as
    /// soon as the first figure lands.
    pub fn empty(id: BookId) -> Self {
        Self {
            id,
            mill_id: None,
            season: None,
            seed: None,
            issues: BTreeMap::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> BookId {
        self.id
    }

    pub fn season(&self) -> Option<KmsYear> {
        self.season
    }

    pub fn seed(&self) -> Option<(NaiveDate, Quantity)> {
        self.seed
    }

    /// Latest issued figure per date (re-records overwrite).
    pub fn issues(&self) -> &BTreeMap<NaiveDate, Quantity> {
        &self.issues
    }
}

impl AggregateRoot for StockBook {
    type Id = BookId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: SeedOpening — manual first-day opening balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedOpening {
    pub mill_id: MillId,
    pub book_id: BookId,
    pub season: KmsYear,
    pub date: NaiveDate,
    pub quantity: Quantity,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordIssue — set the issued-to-milling figure for a date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordIssue {
    pub mill_id: MillId,
    pub book_id: BookId,
    pub season: KmsYear,
    pub date: NaiveDate,
    pub quantity: Quantity,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockBookCommand {
    SeedOpening(SeedOpening),
    RecordIssue(RecordIssue),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpeningSeeded {
    pub mill_id: MillId,
    pub book_id: BookId,
    pub season: KmsYear,
    pub date: NaiveDate,
    pub quantity: Quantity,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRecorded {
    pub mill_id: MillId,
    pub book_id: BookId,
    pub season: KmsYear,
    pub date: NaiveDate,
    pub quantity: Quantity,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockBookEvent {
    OpeningSeeded(OpeningSeeded),
    IssueRecorded(IssueRecorded),
}

impl Event for StockBookEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StockBookEvent::OpeningSeeded(_) => "stock.book.opening_seeded",
            StockBookEvent::IssueRecorded(_) => "stock.book.issue_recorded",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            StockBookEvent::OpeningSeeded(e) => e.occurred_at,
            StockBookEvent::IssueRecorded(e) => e.occurred_at,
        }
    }
}

impl Aggregate for StockBook {
    type Command = StockBookCommand;
    type Event = StockBookEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            StockBookEvent::OpeningSeeded(e) => {
                self.id = e.book_id;
                self.mill_id = Some(e.mill_id);
                self.season = Some(e.season);
                self.seed = Some((e.date, e.quantity));
                self.created = true;
            }
            StockBookEvent::IssueRecorded(e) => {
                self.id = e.book_id;
                if self.mill_id.is_none() {
                    self.mill_id = Some(e.mill_id);
                    self.season = Some(e.season);
                    self.created = true;
                }
                self.issues.insert(e.date, e.quantity);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            StockBookCommand::SeedOpening(cmd) => self.handle_seed(cmd),
            StockBookCommand::RecordIssue(cmd) => self.handle_issue(cmd),
        }
    }
}

impl StockBook {
    fn ensure_scope(&self, mill_id: MillId, season: KmsYear) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.mill_id != Some(mill_id) {
            return Err(DomainError::invariant("mill mismatch"));
        }
        if self.season != Some(season) {
            return Err(DomainError::invariant("season mismatch for this stock book"));
        }
        Ok(())
    }

    fn handle_seed(&self, cmd: &SeedOpening) -> Result<Vec<StockBookEvent>, DomainError> {
        self.ensure_scope(cmd.mill_id, cmd.season)?;

        if self.seed.is_some() {
            return Err(DomainError::conflict("opening balance already seeded for this season"));
        }
        if cmd.quantity.is_negative() {
            return Err(DomainError::validation("opening balance must not be negative"));
        }

        Ok(vec![StockBookEvent::OpeningSeeded(OpeningSeeded {
            mill_id: cmd.mill_id,
            book_id: cmd.book_id,
            season: cmd.season,
            date: cmd.date,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_issue(&self, cmd: &RecordIssue) -> Result<Vec<StockBookEvent>, DomainError> {
        self.ensure_scope(cmd.mill_id, cmd.season)?;

        if cmd.quantity.is_negative() {
            return Err(DomainError::validation("issued quantity must not be negative"));
        }

        Ok(vec![StockBookEvent::IssueRecorded(IssueRecorded {
            mill_id: cmd.mill_id,
            book_id: cmd.book_id,
            season: cmd.season,
            date: cmd.date,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use millbook_events::execute;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn book_ids_are_deterministic_per_mill_and_season() {
        let mill_a = MillId::new();
        let mill_b = MillId::new();
        let season = KmsYear::starting(2024);

        assert_eq!(BookId::for_season(mill_a, season), BookId::for_season(mill_a, season));
        assert_ne!(BookId::for_season(mill_a, season), BookId::for_season(mill_b, season));
        assert_ne!(
            BookId::for_season(mill_a, season),
            BookId::for_season(mill_a, KmsYear::starting(2023))
        );
    }

    #[test]
    fn seeding_twice_conflicts() {
        let mill_id = MillId::new();
        let season = KmsYear::starting(2024);
        let book_id = BookId::for_season(mill_id, season);
        let mut book = StockBook::empty(book_id);

        let seed = SeedOpening {
            mill_id,
            book_id,
            season,
            date: date(2024, 10, 1),
            quantity: Quantity::from_quintals(50),
            occurred_at: test_time(),
        };
        execute(&mut book, &StockBookCommand::SeedOpening(seed.clone())).unwrap();

        let err = book.handle(&StockBookCommand::SeedOpening(seed)).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn re_recording_an_issue_overwrites_the_date() {
        let mill_id = MillId::new();
        let season = KmsYear::starting(2024);
        let book_id = BookId::for_season(mill_id, season);
        let mut book = StockBook::empty(book_id);

        for quantity in [Quantity::from_kg(4_000), Quantity::from_kg(4_500)] {
            execute(
                &mut book,
                &StockBookCommand::RecordIssue(RecordIssue {
                    mill_id,
                    book_id,
                    season,
                    date: date(2024, 11, 2),
                    quantity,
                    occurred_at: test_time(),
                }),
            )
            .unwrap();
        }

        assert_eq!(book.issues().len(), 1);
        assert_eq!(
            book.issues().get(&date(2024, 11, 2)),
            Some(&Quantity::from_kg(4_500))
        );
    }

    #[test]
    fn season_mismatch_is_rejected() {
        let mill_id = MillId::new();
        let season = KmsYear::starting(2024);
        let book_id = BookId::for_season(mill_id, season);
        let mut book = StockBook::empty(book_id);

        execute(
            &mut book,
            &StockBookCommand::RecordIssue(RecordIssue {
                mill_id,
                book_id,
                season,
                date: date(2024, 11, 2),
                quantity: Quantity::from_kg(100),
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        let err = book
            .handle(&StockBookCommand::RecordIssue(RecordIssue {
                mill_id,
                book_id,
                season: KmsYear::starting(2023),
                date: date(2024, 11, 3),
                quantity: Quantity::from_kg(100),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn negative_quantities_are_rejected() {
        let mill_id = MillId::new();
        let season = KmsYear::starting(2024);
        let book_id = BookId::for_season(mill_id, season);
        let book = StockBook::empty(book_id);

        let err = book
            .handle(&StockBookCommand::RecordIssue(RecordIssue {
                mill_id,
                book_id,
                season,
                date: date(2024, 11, 2),
                quantity: Quantity::from_kg(-1),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }
}
