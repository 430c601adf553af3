use infer_core::{
    error::Result,
    kernel::builtin::{ReorderKernel, ReorderReferenceKernel},
    ops::reorder::{MeanMode, ReorderAttrs},
    DataType, ExecutionContext, Kernel, MemoryFormat, OpAttributes, PlanContext, Tensor,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use strum::IntoEnumIterator;

fn run(kernel: &dyn Kernel, attrs: ReorderAttrs, inputs: &[&Tensor]) -> Result<Tensor> {
    let attrs = OpAttributes::Reorder(attrs);
    let plan = kernel.plan(&attrs, inputs, &PlanContext::new(4, 1))?;
    let mut outputs = plan
        .outputs
        .iter()
        .map(|d| Tensor::zeros(d.clone()))
        .collect::<Result<Vec<_>>>()?;
    kernel.execute(&plan, inputs, &mut outputs, &ExecutionContext::default())?;
    Ok(outputs.remove(0))
}

fn random(dims: &[usize], seed: u64) -> Tensor {
    let mut rng = StdRng::seed_from_u64(seed);
    let n: usize = dims.iter().product();
    Tensor::from_vec(dims, (0..n).map(|_| rng.gen_range(-4.0f32..4.0)).collect()).unwrap()
}

#[test]
fn test_blocked_physical_order() {
    let plain = Tensor::from_vec(&[1, 16, 2], (0..32).map(|v| v as f32).collect()).unwrap();
    let blocked = run(&ReorderKernel, ReorderAttrs::new(DataType::F32, MemoryFormat::Blocked8), &[&plain]).unwrap();
    let raw: Vec<f32> = blocked
        .data()
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    let evens: Vec<f32> = (0..8).map(|c| (c * 2) as f32).collect();
    let odds: Vec<f32> = (0..8).map(|c| (c * 2 + 1) as f32).collect();
    assert_eq!(&raw[0..8], evens.as_slice());
    assert_eq!(&raw[8..16], odds.as_slice());
    assert_eq!(raw[16], 16.0);
}

#[test]
fn test_round_trip_through_every_format() {
    // channel count 5 leaves a tail in both block sizes
    let plain = random(&[2, 5, 3, 2], 7);
    for format in MemoryFormat::iter() {
        let there = run(&ReorderKernel, ReorderAttrs::new(DataType::F32, format), &[&plain]).unwrap();
        assert_eq!(there.format(), format);
        let back = run(&ReorderKernel, ReorderAttrs::new(DataType::F32, MemoryFormat::Ncsp), &[&there]).unwrap();
        assert_eq!(back.data(), plain.data(), "{}", format);
    }
}

#[test]
fn test_large_integers_round_trip_exactly() {
    let values: Vec<i64> = (0..30)
        .map(|i| if i % 2 == 0 { i64::MAX - i } else { i64::MIN + i })
        .collect();
    let plain = Tensor::from_vec(&[1, 5, 3, 2], values).unwrap();
    for format in [MemoryFormat::Nspc, MemoryFormat::Blocked8, MemoryFormat::Blocked16] {
        for kernel in [&ReorderKernel as &dyn Kernel, &ReorderReferenceKernel] {
            let there = run(kernel, ReorderAttrs::new(DataType::I64, format), &[&plain]).unwrap();
            let back = run(kernel, ReorderAttrs::new(DataType::I64, MemoryFormat::Ncsp), &[&there]).unwrap();
            assert_eq!(back.to_vec::<i64>().unwrap(), plain.to_vec::<i64>().unwrap(), "{} {}", kernel.name(), format);
        }
    }

    // precision change together with a layout change stays exact too
    let widened = Tensor::from_vec(&[1, 2, 1, 1], vec![i32::MIN, i32::MAX]).unwrap();
    let out = run(&ReorderKernel, ReorderAttrs::new(DataType::I64, MemoryFormat::Blocked8), &[&widened]).unwrap();
    let back = run(&ReorderReferenceKernel, ReorderAttrs::new(DataType::I64, MemoryFormat::Ncsp), &[&out]).unwrap();
    assert_eq!(back.to_vec::<i64>().unwrap(), vec![i32::MIN as i64, i32::MAX as i64]);
}

#[test]
fn test_optimized_matches_reference() {
    let plain = random(&[1, 12, 4, 3], 11);
    let nspc = run(&ReorderKernel, ReorderAttrs::new(DataType::F32, MemoryFormat::Nspc), &[&plain]).unwrap();
    let mean: Vec<f32> = (0..12).map(|c| c as f32 * 0.25).collect();
    for (dt, format) in [
        (DataType::F16, MemoryFormat::Blocked16),
        (DataType::I8, MemoryFormat::Blocked8),
        (DataType::BF16, MemoryFormat::Ncsp),
        (DataType::I32, MemoryFormat::Nspc),
    ] {
        let attrs = ReorderAttrs::new(dt, format).with_mean(MeanMode::Subtract, mean.clone());
        let fast = run(&ReorderKernel, attrs.clone(), &[&nspc]).unwrap();
        let reference = run(&ReorderReferenceKernel, attrs, &[&nspc]).unwrap();
        assert_eq!(fast.data(), reference.data(), "{} {}", dt, format);
    }
}

#[test]
fn test_integer_narrowing() {
    let input = Tensor::from_vec(&[6], vec![300.0f32, -300.0, 2.5, 3.5, 2.7, -2.7]).unwrap();
    let rounded = run(&ReorderKernel, ReorderAttrs::new(DataType::I8, MemoryFormat::Ncsp), &[&input]).unwrap();
    assert_eq!(rounded.to_vec::<i8>().unwrap(), vec![127, -128, 2, 4, 3, -3]);

    let truncated = run(
        &ReorderKernel,
        ReorderAttrs::new(DataType::I8, MemoryFormat::Ncsp).with_truncate(true),
        &[&input],
    )
    .unwrap();
    assert_eq!(truncated.to_vec::<i8>().unwrap(), vec![127, -128, 2, 3, 2, -2]);

    let unsigned = run(&ReorderKernel, ReorderAttrs::new(DataType::U8, MemoryFormat::Ncsp), &[&input]).unwrap();
    assert_eq!(unsigned.to_vec::<u8>().unwrap(), vec![255, 0, 2, 4, 3, 0]);
}

#[test]
fn test_mean_from_input_per_element() {
    let input = Tensor::from_vec(&[1, 2, 2], vec![1.0f32, 2.0, 3.0, 4.0]).unwrap();
    let mean = Tensor::from_vec(&[4], vec![2.0f32, 2.0, 0.5, 4.0]).unwrap();
    let out = run(
        &ReorderKernel,
        ReorderAttrs::new(DataType::F32, MemoryFormat::Ncsp).with_mean(MeanMode::Div, Vec::new()),
        &[&input, &mean],
    )
    .unwrap();
    assert_eq!(out.to_vec::<f32>().unwrap(), vec![0.5, 1.0, 6.0, 1.0]);

    let wrong = Tensor::from_vec(&[3], vec![1.0f32; 3]).unwrap();
    assert!(run(
        &ReorderKernel,
        ReorderAttrs::new(DataType::F32, MemoryFormat::Ncsp).with_mean(MeanMode::Div, Vec::new()),
        &[&input, &wrong],
    )
    .is_err());
}
