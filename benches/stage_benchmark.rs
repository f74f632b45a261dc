//! Benchmarks for scratch staging and result collection
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use slurmprobe::collect::ResultCollector;
use slurmprobe::scratch::ScratchDir;
use slurmprobe::system::JobId;
use std::fs::File;
use std::io::Write;
use tempfile::TempDir;

/// Create a test file of the specified size
fn create_test_file(dir: &std::path::Path, name: &str, size: usize) -> std::path::PathBuf {
    let path = dir.join(name);
    let mut file = File::create(&path).unwrap();

    let chunk_size = 64 * 1024;
    let chunk: Vec<u8> = (0..chunk_size).map(|i| (i % 256) as u8).collect();
    let mut remaining = size;

    while remaining > 0 {
        let to_write = remaining.min(chunk_size);
        file.write_all(&chunk[..to_write]).unwrap();
        remaining -= to_write;
    }

    path
}

fn bench_stage_inputs(c: &mut Criterion) {
    let mut group = c.benchmark_group("stage_inputs");

    for size in [64 * 1024, 16 * 1024 * 1024, 256 * 1024 * 1024].iter() {
        let src_dir = TempDir::new().unwrap();
        let tmp_root = TempDir::new().unwrap();
        let input = create_test_file(src_dir.path(), "probe.sif", *size);

        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let scratch = ScratchDir::create(tmp_root.path(), &JobId::new("bench").unwrap()).unwrap();
                black_box(scratch.stage(&[&input]).unwrap());
                scratch.remove().unwrap();
            });
        });
    }

    group.finish();
}

fn bench_collect_results(c: &mut Criterion) {
    let scratch = TempDir::new().unwrap();
    let submit = TempDir::new().unwrap();
    let results = scratch.path().join("results");
    std::fs::create_dir_all(&results).unwrap();

    // Many small report files
    for i in 0..200 {
        create_test_file(&results, &format!("probe_{}.json", i), 2048);
    }

    let collector = ResultCollector::default();
    c.bench_function("collect_200_small_results", |b| {
        b.iter(|| {
            black_box(collector.collect(scratch.path(), submit.path()));
            std::fs::remove_dir_all(submit.path().join("results")).unwrap();
        });
    });
}

criterion_group!(benches, bench_stage_inputs, bench_collect_results);
criterion_main!(benches);
