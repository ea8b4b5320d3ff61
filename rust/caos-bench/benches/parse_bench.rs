//! Criterion benchmarks for the CAOS front end.
//!
//! Measures lexing and full parsing throughput over generated scripts of
//! increasing size, in both the C3 and the classic grammar.

use caos_bench::{classic_script, mixed_script};
use caos_compiler::compiler::lexer::Lexer;
use caos_compiler::Dialect;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

const SIZES: [(&str, usize); 4] = [("tiny", 20), ("small", 200), ("medium", 2_000), ("large", 20_000)];

fn bench_lex(c: &mut Criterion) {
    let mut group = c.benchmark_group("lex");
    for (label, lines) in SIZES {
        let source = mixed_script(lines);
        group.throughput(Throughput::Bytes(source.len() as u64));
        group.bench_with_input(BenchmarkId::new("c3", label), &source, |b, src| {
            b.iter(|| {
                let _ = Lexer::new(black_box(src), Dialect::C3).tokenize();
            });
        });
    }
    group.finish();
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    for (label, lines) in SIZES {
        let source = mixed_script(lines);
        group.throughput(Throughput::Elements(source.lines().count() as u64));
        group.bench_with_input(BenchmarkId::new("c3", label), &source, |b, src| {
            b.iter(|| {
                let _ = caos_compiler::parse_dialect(Dialect::C3, black_box(src));
            });
        });

        let classic = classic_script(lines);
        group.throughput(Throughput::Elements(classic.lines().count() as u64));
        group.bench_with_input(BenchmarkId::new("c2", label), &classic, |b, src| {
            b.iter(|| {
                let _ = caos_compiler::parse_dialect(Dialect::C2, black_box(src));
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_lex, bench_parse);
criterion_main!(benches);
