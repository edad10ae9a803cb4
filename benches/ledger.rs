use chrono::{Duration, NaiveDate};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use clinicdb::clinic::ledger::{filter_transactions, summarize};
use clinicdb::clinic::LedgerFilter;
use clinicdb::models::{Transaction, TransactionType};

fn ledger(days: i64) -> Vec<Transaction> {
    let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap_or_default();
    (0..days * 20)
        .map(|i| Transaction {
            id: format!("t{}", i),
            date: start + Duration::days(i / 20),
            description: "visit fee".to_string(),
            kind: if i % 3 == 0 {
                TransactionType::Expense
            } else {
                TransactionType::Income
            },
            amount: (i % 50) as f64 * 10.0,
        })
        .collect()
}

fn bench_ledger(c: &mut Criterion) {
    let transactions = ledger(730);
    let today = NaiveDate::from_ymd_opt(2026, 6, 15).unwrap_or_default();

    c.bench_function("summarize_all", |b| {
        b.iter(|| summarize(filter_transactions(black_box(&transactions), LedgerFilter::All, today)))
    });

    c.bench_function("summarize_monthly", |b| {
        b.iter(|| summarize(filter_transactions(black_box(&transactions), LedgerFilter::Monthly, today)))
    });

    let range = LedgerFilter::Range {
        from: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap_or_default(),
        to: NaiveDate::from_ymd_opt(2025, 9, 30).unwrap_or_default(),
    };
    c.bench_function("filter_range", |b| {
        b.iter(|| filter_transactions(black_box(&transactions), range, today).len())
    });
}

criterion_group!(benches, bench_ledger);
criterion_main!(benches);
