extern crate dotlink;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use dotlink::linker::{steps, LinkContext, Pipeline, RootVisibility};
use serde_json::{json, Value};
use std::{fs, hint::black_box, path::Path};

/// Builds an executable module with `types` types of eight methods each.
///
/// Every method calls the next method of its type and the first method of the next type, so
/// the whole chain is reachable from the entry point. Every fourth type also carries an
/// unreferenced method that the sweep removes.
fn synthetic_module(types: usize) -> Value {
    let mut type_docs = Vec::with_capacity(types);
    for t in 0..types {
        let mut methods = Vec::new();
        for m in 0..8 {
            let mut references = Vec::new();
            if m < 7 {
                references.push(json!({
                    "kind": "call",
                    "target": format!("Bench.Type{t}::Method{}", m + 1),
                    "offset": 1
                }));
            }
            if m == 0 && t + 1 < types {
                references.push(json!({
                    "kind": "call",
                    "target": format!("Bench.Type{}::Method0", t + 1),
                    "offset": 6
                }));
            }
            methods.push(json!({
                "name": format!("Method{m}"),
                "flags": ["static"],
                "body": { "references": references }
            }));
        }
        if t % 4 == 0 {
            methods.push(json!({ "name": "Dead", "flags": ["static"], "body": {} }));
        }
        type_docs.push(json!({ "name": format!("Bench.Type{t}"), "methods": methods }));
    }

    json!({
        "assembly": "Bench",
        "kind": "executable",
        "entry_point": "Bench.Type0::Method0",
        "types": type_docs
    })
}

fn link(path: &Path) -> LinkContext {
    let mut ctx = LinkContext::new();
    let mut pipeline = Pipeline::new();
    pipeline
        .append_step(Box::new(steps::ResolveFromAssemblyStep::new(path, RootVisibility::Any)))
        .unwrap();
    pipeline.append_step(Box::new(steps::TypeMapStep)).unwrap();
    pipeline.append_step(Box::new(steps::MarkStep)).unwrap();
    pipeline.append_step(Box::new(steps::SweepStep)).unwrap();
    pipeline.process(&mut ctx).unwrap();
    ctx
}

/// Benchmark loading, marking and sweeping synthetic modules of growing size
fn bench_mark(c: &mut Criterion) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");

    let mut group = c.benchmark_group("mark");
    for types in [100usize, 1_000, 5_000] {
        let path = dir.path().join(format!("Bench{types}.json"));
        fs::write(&path, synthetic_module(types).to_string()).expect("Failed to write module");
        group.throughput(Throughput::Elements((types * 8) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(types), &path, |b, path| {
            b.iter(|| black_box(link(black_box(path))));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_mark);
criterion_main!(benches);
