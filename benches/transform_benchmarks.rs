use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::prelude::*;

use infer_core::{
    ops::broadcast::BroadcastAttrs,
    ops::matrix_nms::MatrixNmsAttrs,
    ops::pad::{PadAttrs, PadMode},
    ops::reorder::ReorderAttrs,
    DataType, DeviceInfo, ExecutionOptions, InferenceEngine, KernelParams, KernelRegistry, MemoryFormat,
    NodeExecutor, OpAttributes, PartialShape, PortDesc, Tensor,
};

// =====================================================================
// Helpers
// =====================================================================

fn random_tensor(dims: &[usize], rng: &mut StdRng) -> Tensor {
    let n: usize = dims.iter().product();
    let values = (0..n).map(|_| rng.gen_range(0.0f32..1.0)).collect();
    Tensor::from_vec(dims, values).expect("benchmark tensor")
}

/// Compile a node for `attrs` straight through the engine's selector,
/// optionally forcing a kernel by name.
fn executor(
    engine: &InferenceEngine,
    attrs: OpAttributes,
    inputs: &[&Tensor],
    kernel: Option<&str>,
) -> NodeExecutor {
    let ports: Vec<PortDesc> = inputs
        .iter()
        .map(|t| PortDesc::new(t.desc().partial_shape(), t.data_type()).with_format(t.format()))
        .collect();
    let params = KernelParams::new(attrs.clone(), ports, Vec::new());
    let mut selection = engine
        .selector()
        .select(&params, &DeviceInfo::cpu())
        .expect("kernel selection");
    if let Some(name) = kernel {
        selection.kernel = engine
            .kernel_registry()
            .find_by_name(attrs.kind(), name)
            .expect("registered kernel");
    }
    let name = selection.name().to_string();
    NodeExecutor::new(&name, attrs, selection, Vec::new(), engine.context().num_threads())
}

fn to_format(engine: &InferenceEngine, t: &Tensor, format: MemoryFormat) -> Tensor {
    let attrs = OpAttributes::Reorder(ReorderAttrs::new(t.data_type(), format));
    let mut exec = executor(engine, attrs, &[t], None);
    engine.run(&mut exec, &[t]).expect("reorder").remove(0)
}

// =====================================================================
// Criterion Benchmark Functions
// =====================================================================

fn pad_benchmarks(c: &mut Criterion, engine: &InferenceEngine, rng: &mut StdRng) {
    let mut group = c.benchmark_group("pad");
    let plain = random_tensor(&[1, 32, 64, 64], rng);
    let blocked = to_format(engine, &plain, MemoryFormat::Blocked16);

    for (label, input) in [("ncsp", &plain), ("blocked16", &blocked)] {
        for mode in [PadMode::Constant, PadMode::Reflect] {
            let attrs = OpAttributes::Pad(PadAttrs::new(mode, vec![0, 0, 2, 2], vec![0, 0, 2, 2]));
            for kernel in ["pad_opt", "pad_ref"] {
                let mut exec = executor(engine, attrs.clone(), &[input], Some(kernel));
                group.bench_function(BenchmarkId::new(format!("{}/{}", label, mode), kernel), |b| {
                    b.iter(|| engine.run(&mut exec, &[input]).expect("pad"))
                });
            }
        }
    }
    group.finish();
}

fn broadcast_benchmarks(c: &mut Criterion, engine: &InferenceEngine, rng: &mut StdRng) {
    let mut group = c.benchmark_group("broadcast");
    let input = random_tensor(&[1, 64, 1, 128], rng);
    let attrs = OpAttributes::Broadcast(BroadcastAttrs::to_shape(vec![8, 64, 16, 128]));
    for kernel in ["broadcast_opt", "broadcast_ref"] {
        let mut exec = executor(engine, attrs.clone(), &[&input], Some(kernel));
        group.bench_function(BenchmarkId::new("tile", kernel), |b| {
            b.iter(|| engine.run(&mut exec, &[&input]).expect("broadcast"))
        });
    }
    group.finish();
}

fn reorder_benchmarks(c: &mut Criterion, engine: &InferenceEngine, rng: &mut StdRng) {
    let mut group = c.benchmark_group("reorder");
    let input = random_tensor(&[4, 48, 32, 32], rng);
    for (dt, format) in [
        (DataType::F32, MemoryFormat::Blocked16),
        (DataType::F32, MemoryFormat::Nspc),
        (DataType::I8, MemoryFormat::Blocked8),
        (DataType::F16, MemoryFormat::Ncsp),
    ] {
        let attrs = OpAttributes::Reorder(ReorderAttrs::new(dt, format));
        for kernel in ["reorder_opt", "reorder_ref"] {
            let mut exec = executor(engine, attrs.clone(), &[&input], Some(kernel));
            group.bench_function(BenchmarkId::new(format!("{}/{}", dt, format), kernel), |b| {
                b.iter(|| engine.run(&mut exec, &[&input]).expect("reorder"))
            });
        }
    }
    group.finish();
}

fn matrix_nms_benchmarks(c: &mut Criterion, engine: &InferenceEngine, rng: &mut StdRng) {
    let mut group = c.benchmark_group("matrix_nms");
    let (batches, classes, boxes) = (2, 20, 500);
    let coords: Vec<f32> = (0..batches * boxes)
        .flat_map(|_| {
            let (x, y) = (rng.gen_range(0.0f32..0.9), rng.gen_range(0.0f32..0.9));
            let (w, h) = (rng.gen_range(0.01f32..0.1), rng.gen_range(0.01f32..0.1));
            [x, y, x + w, y + h]
        })
        .collect();
    let boxes_t = Tensor::from_vec(&[batches, boxes, 4], coords).expect("boxes");
    let scores_t = random_tensor(&[batches, classes, boxes], rng);

    for top_k in [50i64, 200] {
        let attrs = OpAttributes::MatrixNms(MatrixNmsAttrs {
            nms_top_k: top_k,
            keep_top_k: 100,
            score_threshold: 0.05,
            ..MatrixNmsAttrs::default()
        });
        let mut exec = executor(engine, attrs, &[&boxes_t, &scores_t], None);
        group.bench_function(BenchmarkId::new("nms_top_k", top_k), |b| {
            b.iter(|| engine.run(&mut exec, &[&boxes_t, &scores_t]).expect("nms"))
        });
    }
    group.finish();
}

fn selection_benchmarks(c: &mut Criterion, engine: &InferenceEngine) {
    let port = PortDesc::new(PartialShape::from_static(&[1, 16, 8, 8]), DataType::F32).with_format(MemoryFormat::Blocked8);
    let params = KernelParams::new(
        OpAttributes::Pad(PadAttrs::new(PadMode::Constant, vec![0, 8, 1, 1], vec![0, 0, 1, 1])),
        vec![port.clone()],
        vec![port],
    );
    let device = DeviceInfo::cpu();
    c.bench_function("select/pad_blocked", |b| {
        b.iter(|| engine.selector().select(&params, &device).expect("select"))
    });
    c.bench_function("registry/build", |b| {
        b.iter(|| KernelRegistry::with_builtin_kernels().expect("registry").len())
    });
    c.bench_function("params/hash_v2", |b| b.iter(|| params.hash_v2()));
}

fn criterion_benchmark(c: &mut Criterion) {
    let engine = InferenceEngine::new(ExecutionOptions::default()).expect("engine");
    let mut rng = StdRng::seed_from_u64(42);

    pad_benchmarks(c, &engine, &mut rng);
    broadcast_benchmarks(c, &engine, &mut rng);
    reorder_benchmarks(c, &engine, &mut rng);
    matrix_nms_benchmarks(c, &engine, &mut rng);
    selection_benchmarks(c, &engine);
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
