use std::time::Duration;

use batchprint::filename::page_stem;
use batchprint::intake::BatchRequest;
use batchprint::ProgressEstimator;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn wide_tree(chapters: usize, sections: usize) -> String {
    let subpages: Vec<serde_json::Value> = (0..chapters)
        .map(|c| {
            let children: Vec<serde_json::Value> = (0..sections)
                .map(|s| serde_json::json!({ "link": format!("https://bio.libretexts.org/{}/{}", c, s) }))
                .collect();
            serde_json::json!({ "link": format!("https://bio.libretexts.org/{}", c), "children": children })
        })
        .collect();
    serde_json::json!({ "batchName": "Bench", "root": "https://bio.libretexts.org", "subpages": subpages })
        .to_string()
}

fn bench_progress(c: &mut Criterion) {
    c.bench_function("progress_1000_completions", |b| {
        b.iter(|| {
            let mut estimator = ProgressEstimator::new(1000);
            for i in 1..=1000u64 {
                black_box(estimator.record_completion(Duration::from_millis(i * 40)));
            }
        })
    });
}

fn bench_tree(c: &mut Criterion) {
    let json = wide_tree(50, 40);
    c.bench_function("flatten_2000_page_tree", |b| {
        b.iter(|| {
            let request: BatchRequest = serde_json::from_str(black_box(&json)).unwrap();
            black_box(request.urls().len())
        })
    });
}

fn bench_names(c: &mut Criterion) {
    c.bench_function("page_stem", |b| {
        b.iter(|| page_stem(black_box(Some("3.14: Circles, Arcs <and> Sectors?")), "https://math.libretexts.org/x"))
    });
}

criterion_group!(benches, bench_progress, bench_tree, bench_names);
criterion_main!(benches);
