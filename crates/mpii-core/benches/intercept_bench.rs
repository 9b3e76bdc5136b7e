//! Interception overhead benchmarks.
//!
//! Measures the per-call cost of the wrapper protocol (recursion guard,
//! optional monitor, optional serialization lock) around an empty native
//! call.

use std::num::NonZeroUsize;

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use mpii_core::{Diagnostics, InitReport, LogFormat, OpId, ProcessContext, Settings, ThreadLevel};

const OPS: &[&str] = &["MPI_Init", "MPI_Isend"];
const ISEND: OpId = OpId(1);

fn every_symbol(_: &str) -> Option<NonZeroUsize> {
    NonZeroUsize::new(0x1000)
}

fn active_context(settings: Settings) -> ProcessContext {
    let (diag, _) = Diagnostics::capture(0, LogFormat::Text);
    let ctx = ProcessContext::with_diagnostics(settings, OPS, every_symbol, diag);
    let _ = ctx.begin_init(OpId(0));
    ctx.complete_init(InitReport {
        rank: 0,
        size: 1,
        provided: ThreadLevel::Multiple,
        required: None,
    });
    ctx
}

fn bench_forward(c: &mut Criterion) {
    let mut group = c.benchmark_group("intercept_forward");
    let modes = [
        ("passthrough", Settings::default()),
        (
            "serialized",
            Settings {
                force_thread_safety: true,
                ..Settings::default()
            },
        ),
        (
            "serialized_checked",
            Settings {
                force_thread_safety: true,
                check_concurrency: true,
                ..Settings::default()
            },
        ),
    ];
    for (label, settings) in modes {
        let ctx = active_context(settings);
        group.bench_with_input(BenchmarkId::from_parameter(label), &ctx, |b, ctx| {
            b.iter(|| ctx.intercept(ISEND, || ctx.forward(|| black_box(0_i32))));
        });
    }
    group.finish();
}

fn bench_resolve(c: &mut Criterion) {
    let ctx = active_context(Settings::default());
    let _ = ctx.resolve(ISEND);
    c.bench_function("resolve_bound", |b| {
        b.iter(|| black_box(ctx.resolve(black_box(ISEND)).ok()));
    });
}

criterion_group!(benches, bench_forward, bench_resolve);
criterion_main!(benches);
