use std::hint::black_box;
use std::time::Duration;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use laptop_catalog::auth::{Role, TokenManager};
use laptop_catalog::filter::is_qualified;
use laptop_catalog::proto::memory::Unit;
use laptop_catalog::proto::{Filter, Memory};
use laptop_catalog::sample;
use laptop_catalog::store::LaptopStore;
use tokio_util::sync::CancellationToken;

fn bench_token_issue(c: &mut Criterion) {
    let tokens = TokenManager::new("secret", Duration::from_secs(900));

    c.bench_function("token_issue", |b| {
        b.iter(|| tokens.issue(black_box("admin1"), Role::Admin).unwrap())
    });
}

fn bench_token_verify(c: &mut Criterion) {
    let tokens = TokenManager::new("secret", Duration::from_secs(900));
    let token = tokens.issue("admin1", Role::Admin).unwrap();

    c.bench_function("token_verify", |b| {
        b.iter(|| tokens.verify(black_box(&token)).unwrap())
    });
}

fn bench_filter_match(c: &mut Criterion) {
    let laptop = sample::new_laptop();
    let filter = Filter {
        max_price_usd: 3000.0,
        min_cpu_cores: 4,
        min_cpu_ghz: 2.5,
        min_ram: Some(Memory {
            value: 8,
            unit: Unit::Gigabyte as i32,
        }),
    };

    c.bench_function("filter_match", |b| {
        b.iter(|| is_qualified(black_box(&filter), black_box(&laptop)))
    });
}

fn bench_search(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("search");

    for size in [100, 1_000, 10_000].iter() {
        let store = LaptopStore::new();
        runtime.block_on(async {
            for _ in 0..*size {
                store.save(sample::new_laptop()).await.unwrap();
            }
        });
        let filter = Filter {
            max_price_usd: 2500.0,
            ..Filter::default()
        };

        group.bench_with_input(BenchmarkId::new("scan", size), size, |b, _| {
            b.iter(|| {
                runtime.block_on(async {
                    let mut matched = Vec::new();
                    store
                        .search(
                            &CancellationToken::new(),
                            |laptop| is_qualified(&filter, laptop),
                            |laptop| {
                                matched.push(laptop.id);
                                async { Ok::<(), laptop_catalog::Error>(()) }
                            },
                        )
                        .await
                        .unwrap();
                    matched.len()
                })
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_token_issue,
    bench_token_verify,
    bench_filter_match,
    bench_search
);
criterion_main!(benches);
