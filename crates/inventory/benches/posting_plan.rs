use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::{NaiveDate, Utc};
use stockledger_core::PartNumber;
use stockledger_inventory::{Movement, PostingPlan, PostingSettings, StockRecord};

fn movements(parts: &[PartNumber], count: usize) -> Vec<Movement> {
    let date = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap_or_default();
    (0..count)
        .map(|i| {
            let part = parts[i % parts.len()].clone();
            let key = format!("bench:{i}");
            match i % 3 {
                0 => Movement::inbound(key, part, 25, date, "BENCH"),
                1 => Movement::outbound(key, part, 10, date, "BENCH"),
                _ => Movement::adjustment(key, part, (i % 50) as i64, date, "BENCH", None),
            }
        })
        .collect()
}

fn bench_posting_plan(c: &mut Criterion) {
    let parts: Vec<PartNumber> = (0..20)
        .filter_map(|i| PartNumber::parse(&format!("P-{i:03}")).ok())
        .collect();

    let mut group = c.benchmark_group("posting_plan");
    for count in [10usize, 100, 1_000] {
        let batch = movements(&parts, count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &batch, |b, batch| {
            b.iter(|| {
                let now = Utc::now();
                let mut plan = PostingPlan::new(now, PostingSettings::default());
                for part in &parts {
                    plan.seed(part.clone(), Some(StockRecord::empty(part.clone(), now)));
                }
                plan.post_all(black_box(batch)).ok();
                black_box(plan.finish())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_posting_plan);
criterion_main!(benches);
