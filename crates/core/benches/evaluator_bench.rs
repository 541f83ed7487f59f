//! Benchmarks for page evaluation.
//!
//! Benchmark groups:
//! - `operator_list`: `get_operator_list()` over path and text heavy pages
//! - `text_content`: `get_text_content()` over text heavy pages

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

use quire_core::{EvaluatorOptions, PDFDocument};

#[path = "../tests/common/mod.rs"]
mod common;

/// `n` lines of text, each in its own text object.
fn text_page(n: usize) -> String {
    let mut content = String::with_capacity(n * 48);
    for i in 0..n {
        let y = 760 - (i % 60) * 12;
        content.push_str(&format!("BT /F1 10 Tf 72 {y} Td (Line {i} of the page) Tj ET\n"));
    }
    content
}

/// `n` filled and stroked rectangles with color changes.
fn path_page(n: usize) -> String {
    let mut content = String::with_capacity(n * 40);
    for i in 0..n {
        let shade = (i % 10) as f64 / 10.0;
        content.push_str(&format!("q {shade} g {} {} 10 10 re f 0 0 1 RG S Q\n", i % 500, i / 500));
    }
    content
}

fn open(content: &str) -> PDFDocument {
    common::single_page(content, "<< /Font << /F1 5 0 R >> >>")
        .object(5, common::HELVETICA)
        .open()
}

fn bench_operator_list(c: &mut Criterion) {
    let mut group = c.benchmark_group("operator_list");
    let options = EvaluatorOptions::default();
    for (kind, build) in [("text", text_page as fn(usize) -> String), ("path", path_page)] {
        for size in [100usize, 1_000] {
            let doc = open(&build(size));
            group.throughput(Throughput::Elements(size as u64));
            group.bench_with_input(BenchmarkId::new(kind, size), &doc, |b, doc| {
                b.iter(|| {
                    let list = doc.get_operator_list(0, &options).unwrap();
                    black_box(list.len())
                });
            });
        }
    }
    group.finish();
}

fn bench_text_content(c: &mut Criterion) {
    let mut group = c.benchmark_group("text_content");
    let options = EvaluatorOptions::default();
    for size in [100usize, 1_000] {
        let doc = open(&text_page(size));
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &doc, |b, doc| {
            b.iter(|| {
                let content = doc.get_text_content(0, &options).unwrap();
                black_box(content.items.len())
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_operator_list, bench_text_content);
criterion_main!(benches);
