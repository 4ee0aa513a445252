//! Criterion benchmarks for voldrip-ledger critical operations.
//!
//! Covers: accrual within a period, accrual across a long idle gap,
//! share arithmetic on the wide path, and registry traversal.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use rand::Rng;

use voldrip_core::constants::{MAX_AMOUNT, WAD};
use voldrip_core::traits::DripLedger;
use voldrip_core::types::Address;
use voldrip_ledger::share::pro_rata_share;
use voldrip_ledger::{DripManager, DripRegistry};

const MEASURE: Address = Address([0xEE; 20]);
const DRIP: Address = Address([0x11; 20]);

fn manager_with_participants(count: usize) -> (DripManager, Vec<Address>) {
    let mut rng = rand::thread_rng();
    let mut m = DripManager::new();
    m.activate(MEASURE, DRIP, 60, 10 * WAD, 60).unwrap();
    let users: Vec<Address> = (0..count).map(|_| Address(rng.r#gen())).collect();
    for user in &users {
        m.accrue(MEASURE, DRIP, *user, WAD, 1).unwrap();
    }
    (m, users)
}

fn bench_accrue_same_period(c: &mut Criterion) {
    let (mut m, users) = manager_with_participants(1_000);
    let mut i = 0usize;

    c.bench_function("accrue_same_period", |b| {
        b.iter(|| {
            i = (i + 1) % users.len();
            m.accrue(MEASURE, DRIP, black_box(users[i]), black_box(WAD), black_box(2))
        })
    });
}

fn bench_accrue_after_idle_gap(c: &mut Criterion) {
    c.bench_function("accrue_after_1000_idle_periods", |b| {
        b.iter_batched(
            || manager_with_participants(10),
            |(mut m, users)| m.accrue(MEASURE, DRIP, users[0], WAD, black_box(60 * 1_001)),
            BatchSize::SmallInput,
        )
    });
}

fn bench_share_wide(c: &mut Criterion) {
    let total = MAX_AMOUNT - 12_345;
    let volume = total / 3;

    c.bench_function("pro_rata_share_wide", |b| {
        b.iter(|| pro_rata_share(black_box(volume), black_box(total), black_box(MAX_AMOUNT)))
    });
}

fn bench_registry_iter(c: &mut Criterion) {
    let mut reg = DripRegistry::new();
    for seed in 2..=65u8 {
        reg.push(Address([seed; 20]));
    }

    c.bench_function("registry_iter_64", |b| b.iter(|| black_box(&reg).iter().count()));
}

criterion_group!(
    benches,
    bench_accrue_same_period,
    bench_accrue_after_idle_gap,
    bench_share_wide,
    bench_registry_iter,
);
criterion_main!(benches);
