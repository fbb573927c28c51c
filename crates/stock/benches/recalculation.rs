//! Benchmark the full-register recalculation over a season of activity.
//!
//! Every arrival or issue re-runs the whole fold, so this is the hot path of
//! the write side.

use std::collections::BTreeMap;

use chrono::{Days, NaiveDate};
use criterion::{Criterion, black_box, criterion_group, criterion_main};

use millbook_core::Quantity;
use millbook_stock::recalculate;

fn season_inputs(days: u64) -> (BTreeMap<NaiveDate, Quantity>, BTreeMap<NaiveDate, Quantity>) {
    let base = NaiveDate::from_ymd_opt(2024, 10, 1).unwrap();
    let mut received = BTreeMap::new();
    let mut issued = BTreeMap::new();

    for offset in 0..days {
        let date = base + Days::new(offset);
        // Arbitrary but deterministic daily figures.
        received.insert(date, Quantity::from_kg(8_000 + (offset as i64 * 37) % 4_000));
        if offset % 2 == 0 {
            issued.insert(date, Quantity::from_kg(6_000 + (offset as i64 * 53) % 3_000));
        }
    }

    (received, issued)
}

fn bench_recalculate(c: &mut Criterion) {
    let mut group = c.benchmark_group("stock_register_recalculate");

    for days in [30u64, 180, 365] {
        let (received, issued) = season_inputs(days);
        let seed = Some((
            NaiveDate::from_ymd_opt(2024, 9, 30).unwrap(),
            Quantity::from_quintals(500),
        ));

        group.bench_function(format!("{days}_days"), |b| {
            b.iter(|| recalculate(black_box(seed), black_box(&received), black_box(&issued)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_recalculate);
criterion_main!(benches);
