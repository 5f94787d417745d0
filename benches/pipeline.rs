use criterion::{black_box, criterion_group, criterion_main, Criterion};

use parallelme::{CompilerConfig, ParallelCompiler, TargetBackend};

const THRESHOLD: &str = include_str!("../tests/fixtures/Threshold.java");
const VECTOR_SCALE: &str = include_str!("../tests/fixtures/VectorScale.java");

fn compile(target: TargetBackend) {
    let mut compiler = ParallelCompiler::with_config(CompilerConfig {
        target,
        ..CompilerConfig::default()
    });
    for (source, class) in [(VECTOR_SCALE, "VectorScale"), (THRESHOLD, "Threshold")] {
        let compiled = compiler
            .compile_source(black_box(source), class)
            .expect("fixture compiles");
        black_box(compiled);
    }
}

fn bench_pipeline(c: &mut Criterion) {
    c.bench_function("pipeline renderscript", |b| {
        b.iter(|| compile(TargetBackend::RenderScript))
    });
    c.bench_function("pipeline native", |b| b.iter(|| compile(TargetBackend::Native)));
}

criterion_group!(benches, bench_pipeline);
criterion_main!(benches);
