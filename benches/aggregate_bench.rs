//! Criterion benchmarks for key decoding and cost aggregation

use costroll::parsers::{decode_entries, parse_response, RawBillingData, RawCostEntry};
use costroll::services::{Aggregator, Assembler};
use costroll::types::AggregationSelector;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rust_decimal::Decimal;
use std::hint::black_box;

const REGIONS: [&str; 8] = [
    "ap-ne-1", "ap-ne-2", "ap-se-1", "eu-w-1", "eu-c-1", "us-e-1", "us-e-2", "us-w-2",
];
const SERVICES: [&str; 5] = ["AmazonEC2", "AmazonS3", "AmazonRDS", "AWSLambda", "AmazonEKS"];

/// Synthetic plugin output: `n` entries spread over regions, services and months
fn make_entries(n: usize) -> Vec<RawCostEntry> {
    (0..n)
        .map(|i| RawCostEntry {
            resource_type: format!(
                "inv.CloudService?provider=aws&region_code={}&service_code={}&account={}",
                REGIONS[i % REGIONS.len()],
                SERVICES[i % SERVICES.len()],
                i % 97
            ),
            billing_data: vec![RawBillingData {
                date: format!("2020-{:02}", i % 12 + 1),
                cost: Some(Decimal::new((i as i64 % 10_000) + 1, 2)),
                currency: None,
            }],
        })
        .collect()
}

fn bench_decode_entries(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    for n in [1_000usize, 100_000] {
        let entries = make_entries(n);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("decode_entries", n), &entries, |b, e| {
            b.iter(|| decode_entries(black_box(e)));
        });
    }
    group.finish();
}

fn bench_parse_response(c: &mut Criterion) {
    let body = serde_json::to_vec(&serde_json::json!({ "results": make_entries(10_000) }))
        .unwrap_or_default();

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(body.len() as u64));
    group.bench_function("parse_response", |b| {
        b.iter(|| {
            let mut copy = body.clone();
            let _ = parse_response(black_box(&mut copy));
        });
    });
    group.finish();
}

fn bench_aggregate(c: &mut Criterion) {
    let records = decode_entries(&make_entries(100_000)).records;
    let selectors: [(&str, Vec<&str>); 3] = [
        ("none", vec![]),
        ("region", vec!["REGION"]),
        ("region_service", vec!["REGION", "RESOURCE_TYPE"]),
    ];

    let mut group = c.benchmark_group("aggregate");
    group.throughput(Throughput::Elements(records.len() as u64));
    for (name, symbols) in selectors {
        let Ok(selector) = AggregationSelector::parse(&symbols) else {
            continue;
        };
        group.bench_with_input(BenchmarkId::new("aggregate", name), &selector, |b, s| {
            b.iter(|| Aggregator::aggregate(black_box(&records), s));
        });
        group.bench_with_input(
            BenchmarkId::new("aggregate_and_assemble", name),
            &selector,
            |b, s| {
                b.iter(|| {
                    Aggregator::aggregate(black_box(&records), s)
                        .map(|groups| Assembler::assemble(&groups, "domain-bench"))
                });
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_decode_entries,
    bench_parse_response,
    bench_aggregate
);
criterion_main!(benches);
