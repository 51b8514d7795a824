use columnar_query::processor::aggregate::sum;
use columnar_query::{Column, DataFrame};
use criterion::{Criterion, criterion_group, criterion_main};
use rayon::ThreadPoolBuilder;

fn frame(rows: usize) -> DataFrame {
    DataFrame::from_columns(vec![
        (
            "yearID",
            Column::Int64((0..rows).map(|i| Some(1871 + (i % 145) as i64)).collect()),
        ),
        (
            "R",
            Column::Int64((0..rows).map(|i| Some((i * 31 % 151) as i64)).collect()),
        ),
        (
            "AVG",
            Column::Float64((0..rows).map(|i| Some((i % 1000) as f64 / 1000.0)).collect()),
        ),
    ])
    .unwrap()
}

fn bench_scalability(c: &mut Criterion) {
    let sizes = [1_000_000usize, 10_000_000];

    for &rows in &sizes {
        let df = frame(rows);

        for threads in [1usize, 8] {
            let pool = ThreadPoolBuilder::new().num_threads(threads).build().unwrap();

            let id = format!("group_by_sum_{}rows_{}threads", rows, threads);
            c.bench_function(&id, |b| {
                pool.install(|| {
                    b.iter(|| df.group_by(&["yearID"]).agg(vec![sum("R")]).unwrap())
                })
            });

            let id = format!("sort_{}rows_{}threads", rows, threads);
            c.bench_function(&id, |b| {
                pool.install(|| b.iter(|| df.order_by_cols(&["R", "yearID"]).unwrap()))
            });
        }

        // dense double column takes the SIMD path
        let id = format!("global_sum_simd_{}rows", rows);
        c.bench_function(&id, |b| b.iter(|| df.agg(vec![sum("AVG")]).unwrap()));
    }
}

criterion_group!(benches, bench_scalability);
criterion_main!(benches);
