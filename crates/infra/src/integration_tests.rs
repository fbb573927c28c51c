//! End-to-end wiring tests: dispatcher → in-memory store → bus → projections.
//!
//! The projection subscriber loop lives in the API crate; here envelopes are
//! drained from a bus subscription synchronously, which keeps the tests
//! deterministic.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde_json::Value as JsonValue;

use millbook_core::{AggregateId, Distance, ExpectedVersion, KmsYear, MillId, Quantity};
use millbook_events::{EventBus, EventEnvelope, InMemoryEventBus, Subscription};
use millbook_procurement::{
    AmendArrival, Arrival, ArrivalCommand, ArrivalDetails, ArrivalId, DeleteArrival,
    DriverSnapshot, MandiSnapshot, RecordArrival, VehicleSnapshot,
};
use millbook_registry::{DriverId, MandiId, VehicleId};
use millbook_stock::{BookId, RecordIssue, SeedOpening, StockBook, StockBookCommand};

use crate::command_dispatcher::CommandDispatcher;
use crate::event_store::{EventStore, InMemoryEventStore, UncommittedEvent};
use crate::projections::{ArrivalsProjection, DailyStockProjection};
use crate::read_model::InMemoryMillStore;

type Bus = InMemoryEventBus<EventEnvelope<JsonValue>>;
type Dispatcher = CommandDispatcher<Arc<InMemoryEventStore>, Arc<Bus>>;

struct Harness {
    dispatcher: Dispatcher,
    subscription: Subscription<EventEnvelope<JsonValue>>,
    arrivals: ArrivalsProjection<Arc<InMemoryMillStore<ArrivalId, crate::projections::ArrivalRegisterEntry>>>,
    stock: DailyStockProjection<Arc<InMemoryMillStore<KmsYear, crate::projections::StockRegister>>>,
    published: Vec<EventEnvelope<JsonValue>>,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(InMemoryEventStore::new());
        let bus: Arc<Bus> = Arc::new(InMemoryEventBus::new());
        let subscription = bus.subscribe();
        let dispatcher = CommandDispatcher::new(store, bus);

        let arrivals = ArrivalsProjection::new(Arc::new(InMemoryMillStore::new()));
        let stock = DailyStockProjection::new(Arc::new(InMemoryMillStore::new()));

        Self {
            dispatcher,
            subscription,
            arrivals,
            stock,
            published: Vec::new(),
        }
    }

    /// Feed everything published so far into the projections.
    fn drain(&mut self) {
        while let Ok(env) = self.subscription.try_recv() {
            self.arrivals.apply_envelope(&env).unwrap();
            self.stock.apply_envelope(&env).unwrap();
            self.published.push(env);
        }
    }
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn details(bag_count: u32, weight_kg: i64) -> ArrivalDetails {
    ArrivalDetails {
        ac_note: None,
        mandi: MandiSnapshot {
            mandi_id: MandiId::new(AggregateId::new()),
            name: "Gondia Mandi".to_string(),
            distance: Distance::from_km(42.5).unwrap(),
        },
        vehicle: VehicleSnapshot {
            vehicle_id: VehicleId::new(AggregateId::new()),
            registration: "MH35AB1234".to_string(),
        },
        driver: DriverSnapshot {
            driver_id: DriverId::new(AggregateId::new()),
            name: "Ramesh Kumar".to_string(),
        },
        bag_count,
        weight: Quantity::from_kg(weight_kg),
    }
}

async fn record_arrival(
    h: &Harness,
    mill_id: MillId,
    season: KmsYear,
    on: NaiveDate,
    bag_count: u32,
    weight_kg: i64,
) -> ArrivalId {
    let agg = AggregateId::new();
    let arrival_id = ArrivalId::new(agg);
    h.dispatcher
        .dispatch::<Arrival>(
            mill_id,
            agg,
            "procurement.arrival",
            ArrivalCommand::Record(RecordArrival {
                mill_id,
                arrival_id,
                date: on,
                season,
                details: details(bag_count, weight_kg),
                occurred_at: Utc::now(),
            }),
            |_m, id| Arrival::empty(ArrivalId::new(id)),
        )
        .await
        .unwrap();
    arrival_id
}

#[tokio::test]
async fn arrivals_flow_into_the_stock_register() {
    let mut h = Harness::new();
    let mill_id = MillId::new();
    let season = KmsYear::starting(2024);

    record_arrival(&h, mill_id, season, date(2024, 11, 1), 250, 10_000).await;
    record_arrival(&h, mill_id, season, date(2024, 11, 1), 100, 4_000).await;
    record_arrival(&h, mill_id, season, date(2024, 11, 2), 50, 2_000).await;
    h.drain();

    let register = h.stock.get(mill_id, &season).unwrap();
    let entries = register.entries();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].received, Quantity::from_kg(14_000));
    assert_eq!(entries[1].opening, Quantity::from_kg(14_000));
    assert_eq!(entries[1].closing, Quantity::from_kg(16_000));

    assert_eq!(h.arrivals.list_for_season(mill_id, season).len(), 3);
}

#[tokio::test]
async fn amend_and_delete_recompute_the_register() {
    let mut h = Harness::new();
    let mill_id = MillId::new();
    let season = KmsYear::starting(2024);

    let first = record_arrival(&h, mill_id, season, date(2024, 11, 1), 250, 10_000).await;
    let second = record_arrival(&h, mill_id, season, date(2024, 11, 1), 100, 4_000).await;
    h.drain();

    // Amend the first load down to its re-weighed figure.
    h.dispatcher
        .dispatch::<Arrival>(
            mill_id,
            first.0,
            "procurement.arrival",
            ArrivalCommand::Amend(AmendArrival {
                mill_id,
                arrival_id: first,
                details: details(250, 9_800),
                occurred_at: Utc::now(),
            }),
            |_m, id| Arrival::empty(ArrivalId::new(id)),
        )
        .await
        .unwrap();

    // The second entry was a duplicate; delete it.
    h.dispatcher
        .dispatch::<Arrival>(
            mill_id,
            second.0,
            "procurement.arrival",
            ArrivalCommand::Delete(DeleteArrival {
                mill_id,
                arrival_id: second,
                occurred_at: Utc::now(),
            }),
            |_m, id| Arrival::empty(ArrivalId::new(id)),
        )
        .await
        .unwrap();
    h.drain();

    let register = h.stock.get(mill_id, &season).unwrap();
    assert_eq!(register.entries().len(), 1);
    assert_eq!(register.entries()[0].received, Quantity::from_kg(9_800));
    assert_eq!(register.entries()[0].closing, Quantity::from_kg(9_800));

    let listed = h.arrivals.list_for_season(mill_id, season);
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].arrival_id, first);
    assert_eq!(listed[0].weight, Quantity::from_kg(9_800));
}

#[tokio::test]
async fn seed_and_issues_combine_with_receipts() {
    let mut h = Harness::new();
    let mill_id = MillId::new();
    let season = KmsYear::starting(2024);
    let book_id = BookId::for_season(mill_id, season);

    h.dispatcher
        .dispatch::<StockBook>(
            mill_id,
            book_id.0,
            "stock.book",
            StockBookCommand::SeedOpening(SeedOpening {
                mill_id,
                book_id,
                season,
                date: date(2024, 10, 1),
                quantity: Quantity::from_quintals(50),
                occurred_at: Utc::now(),
            }),
            |_m, id| StockBook::empty(BookId::new(id)),
        )
        .await
        .unwrap();

    record_arrival(&h, mill_id, season, date(2024, 11, 1), 250, 10_000).await;

    h.dispatcher
        .dispatch::<StockBook>(
            mill_id,
            book_id.0,
            "stock.book",
            StockBookCommand::RecordIssue(RecordIssue {
                mill_id,
                book_id,
                season,
                date: date(2024, 11, 2),
                quantity: Quantity::from_kg(6_000),
                occurred_at: Utc::now(),
            }),
            |_m, id| StockBook::empty(BookId::new(id)),
        )
        .await
        .unwrap();
    h.drain();

    let register = h.stock.get(mill_id, &season).unwrap();
    let entries = register.entries();
    assert_eq!(entries.len(), 3);

    // 1 Oct: seeded opening carried into closing.
    assert_eq!(entries[0].opening, Quantity::from_quintals(50));
    assert_eq!(entries[0].closing, Quantity::from_quintals(50));
    // 1 Nov: receipts on top of the seed.
    assert_eq!(entries[1].closing, Quantity::from_kg(15_000));
    // 2 Nov: issue only, opening carried forward.
    assert_eq!(entries[2].received, Quantity::ZERO);
    assert_eq!(entries[2].closing, Quantity::from_kg(9_000));

    let summary = register.summary().unwrap();
    assert_eq!(summary.total_received, Quantity::from_kg(10_000));
    assert_eq!(summary.total_issued, Quantity::from_kg(6_000));
    assert_eq!(summary.current_closing, Quantity::from_kg(9_000));
}

#[tokio::test]
async fn rebuild_from_scratch_matches_incremental_state() {
    let mut h = Harness::new();
    let mill_id = MillId::new();
    let season = KmsYear::starting(2024);

    record_arrival(&h, mill_id, season, date(2024, 11, 1), 250, 10_000).await;
    record_arrival(&h, mill_id, season, date(2024, 11, 3), 120, 4_800).await;
    h.drain();

    let incremental = h.stock.get(mill_id, &season).unwrap();

    let fresh = DailyStockProjection::new(Arc::new(InMemoryMillStore::new()));
    fresh.rebuild_from_scratch(h.published.clone()).unwrap();

    assert_eq!(fresh.get(mill_id, &season).unwrap(), incremental);
}

#[tokio::test]
async fn duplicate_deliveries_are_ignored() {
    let mut h = Harness::new();
    let mill_id = MillId::new();
    let season = KmsYear::starting(2024);

    record_arrival(&h, mill_id, season, date(2024, 11, 1), 250, 10_000).await;
    h.drain();

    // At-least-once delivery: replaying the same envelopes must be a no-op.
    for env in h.published.clone() {
        h.stock.apply_envelope(&env).unwrap();
    }

    let register = h.stock.get(mill_id, &season).unwrap();
    assert_eq!(register.entries().len(), 1);
    assert_eq!(register.entries()[0].received, Quantity::from_kg(10_000));
}

#[tokio::test]
async fn mills_never_see_each_others_registers() {
    let mut h = Harness::new();
    let mill_a = MillId::new();
    let mill_b = MillId::new();
    let season = KmsYear::starting(2024);

    record_arrival(&h, mill_a, season, date(2024, 11, 1), 250, 10_000).await;
    h.drain();

    assert!(h.stock.get(mill_a, &season).is_some());
    assert!(h.stock.get(mill_b, &season).is_none());
    assert!(h.arrivals.list_for_season(mill_b, season).is_empty());
}

#[tokio::test]
async fn store_rejects_stale_expected_versions() {
    let store = InMemoryEventStore::new();
    let mill_id = MillId::new();
    let agg = AggregateId::new();

    let ev = |note: &str| UncommittedEvent {
        event_id: uuid::Uuid::now_v7(),
        mill_id,
        aggregate_id: agg,
        aggregate_type: "procurement.arrival".to_string(),
        event_type: "procurement.arrival.recorded".to_string(),
        event_version: 1,
        occurred_at: Utc::now(),
        payload: serde_json::json!({ "note": note }),
    };

    store
        .append(vec![ev("first")], ExpectedVersion::Exact(0))
        .await
        .unwrap();

    // A writer that loaded version 0 is now stale.
    let err = store
        .append(vec![ev("second")], ExpectedVersion::Exact(0))
        .await
        .unwrap_err();
    assert!(matches!(err, crate::event_store::EventStoreError::Concurrency(_)));
}
