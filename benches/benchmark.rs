use columnar_query::exercises;
use columnar_query::processor::aggregate::{approx_count_distinct, count_distinct};
use columnar_query::{DataFrame, DataFrameReader, Session, SessionConfig};
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use jemallocator::Jemalloc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

const ROWS: usize = 1_000_000;
const PLAYERS: usize = 20_000;

fn write_batting(path: &Path) {
    let mut rng = StdRng::seed_from_u64(7);
    let mut out = BufWriter::new(fs::File::create(path).unwrap());
    writeln!(out, "playerID,yearID,teamID,R,H").unwrap();
    for _ in 0..ROWS {
        writeln!(
            out,
            "p{:05},{},T{},{},{}",
            rng.random_range(0..PLAYERS),
            rng.random_range(1871..2016),
            rng.random_range(0..30),
            rng.random_range(0..150),
            rng.random_range(0..250)
        )
        .unwrap();
    }
    out.flush().unwrap();
}

fn write_master(path: &Path) {
    let mut out = BufWriter::new(fs::File::create(path).unwrap());
    writeln!(out, "playerID,birthCountry,birthState").unwrap();
    for i in 0..PLAYERS {
        let country = if i % 7 == 0 { "CAN" } else { "USA" };
        writeln!(out, "p{:05},{},S{}", i, country, i % 50).unwrap();
    }
    out.flush().unwrap();
}

fn load(path: &Path) -> DataFrame {
    DataFrameReader::new()
        .option("header", "true")
        .option("inferSchema", "true")
        .csv(path)
        .unwrap()
}

fn query_benchmarks(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let batting_path = dir.path().join("Batting.csv");
    let master_path = dir.path().join("Master.csv");
    write_batting(&batting_path);
    write_master(&master_path);

    let session = Session::from_config(SessionConfig {
        read_cache_capacity: 0,
        ..SessionConfig::default()
    })
    .unwrap();

    let mut group = c.benchmark_group("columnar_query");
    group.sample_size(10);
    group.throughput(Throughput::Elements(ROWS as u64));

    group.bench_function("load_csv_infer_schema", |b| {
        b.iter(|| load(&batting_path));
    });

    let batting = load(&batting_path);
    let master = load(&master_path);

    group.bench_function("group_by_year_sum_runs", |b| {
        b.iter(|| exercises::runs_per_year(&batting).unwrap());
    });

    group.bench_function("count_distinct_runs", |b| {
        b.iter(|| batting.agg(vec![count_distinct("R")]).unwrap());
    });

    group.bench_function("approx_count_distinct_runs", |b| {
        b.iter(|| {
            batting
                .agg(vec![approx_count_distinct("R", 0.05).unwrap()])
                .unwrap()
        });
    });

    group.bench_function("max_runs_self_join", |b| {
        b.iter(|| exercises::max_runs_per_year(&batting).unwrap());
    });

    group.bench_function("join_filter_group_order", |b| {
        b.iter(|| exercises::runs_per_state(&batting, &master, "USA").unwrap());
    });

    group.bench_function("squares_10m", |b| {
        b.iter(|| exercises::squares(&session, 10_000_000).unwrap());
    });

    group.finish();
}

criterion_group!(benches, query_benchmarks);
criterion_main!(benches);
