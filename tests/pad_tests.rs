use infer_core::{
    error::Result,
    kernel::builtin::{PadKernel, PadReferenceKernel, ReorderKernel},
    ops::pad::{PadAttrs, PadMode},
    ops::reorder::ReorderAttrs,
    DataType, ExecutionContext, Kernel, MemoryFormat, OpAttributes, PlanContext, Tensor,
};
use proptest::prelude::*;

fn run(kernel: &dyn Kernel, attrs: &OpAttributes, inputs: &[&Tensor], threads: usize) -> Result<Vec<Tensor>> {
    let plan = kernel.plan(attrs, inputs, &PlanContext::new(threads, 0))?;
    let mut outputs = plan
        .outputs
        .iter()
        .map(|d| Tensor::zeros(d.clone()))
        .collect::<Result<Vec<_>>>()?;
    kernel.execute(&plan, inputs, &mut outputs, &ExecutionContext::default())?;
    Ok(outputs)
}

fn to_format(t: &Tensor, format: MemoryFormat) -> Tensor {
    let attrs = OpAttributes::Reorder(ReorderAttrs::new(t.data_type(), format));
    run(&ReorderKernel, &attrs, &[t], 1).unwrap().remove(0)
}

fn iota(dims: &[usize]) -> Tensor {
    let n: usize = dims.iter().product();
    Tensor::from_vec(dims, (0..n).map(|v| v as f32).collect()).unwrap()
}

#[test]
fn test_constant_pad_with_value() {
    let input = iota(&[1, 2, 2]);
    let attrs = OpAttributes::Pad(PadAttrs::new(PadMode::Constant, vec![0, 1, 0], vec![0, 0, 1]).with_pad_value(-1.0));
    let out = run(&PadKernel, &attrs, &[&input], 2).unwrap();
    assert_eq!(out[0].dims(), &[1, 3, 3]);
    assert_eq!(
        out[0].to_vec::<f32>().unwrap(),
        vec![-1.0, -1.0, -1.0, 0.0, 1.0, -1.0, 2.0, 3.0, -1.0]
    );
}

#[test]
fn test_runtime_pads_from_inputs() {
    let input = iota(&[2, 3]);
    let begin = Tensor::from_vec(&[2], vec![1i64, 0]).unwrap();
    let end = Tensor::from_vec(&[2], vec![0i64, 2]).unwrap();
    let value = Tensor::scalar(9.0f32);
    let attrs = OpAttributes::Pad(PadAttrs {
        mode: PadMode::Constant,
        pads_begin: None,
        pads_end: None,
        pad_value: None,
    });
    let out = run(&PadKernel, &attrs, &[&input, &begin, &end, &value], 2).unwrap();
    assert_eq!(out[0].dims(), &[3, 5]);
    let v = out[0].to_vec::<f32>().unwrap();
    assert_eq!(&v[..5], &[9.0; 5]);
    assert_eq!(&v[5..10], &[0.0, 1.0, 2.0, 9.0, 9.0]);
}

#[test]
fn test_reflect_beyond_limit_is_rejected() {
    let input = iota(&[3]);
    let attrs = OpAttributes::Pad(PadAttrs::new(PadMode::Reflect, vec![3], vec![0]));
    assert!(run(&PadKernel, &attrs, &[&input], 1).is_err());
    let attrs = OpAttributes::Pad(PadAttrs::new(PadMode::Symmetric, vec![3], vec![0]));
    assert!(run(&PadKernel, &attrs, &[&input], 1).is_ok());
}

#[test]
fn test_optimized_matches_reference_on_layouts() {
    let plain = iota(&[2, 8, 3, 4]);
    let cases = [
        (PadMode::Constant, vec![0, 8, 1, 0], vec![1, 0, 0, 2]),
        (PadMode::Edge, vec![0, 0, 2, 1], vec![0, 0, 1, 3]),
        (PadMode::Reflect, vec![1, 0, 2, 1], vec![0, 0, 1, 3]),
        (PadMode::Symmetric, vec![0, 0, 3, 4], vec![1, 0, 3, 4]),
    ];
    for format in [MemoryFormat::Ncsp, MemoryFormat::Nspc, MemoryFormat::Blocked8] {
        let input = to_format(&plain, format);
        for (mode, begin, end) in &cases {
            let attrs = OpAttributes::Pad(PadAttrs::new(*mode, begin.clone(), end.clone()).with_pad_value(0.5));
            let fast = run(&PadKernel, &attrs, &[&input], 3).unwrap();
            let reference = run(&PadReferenceKernel, &attrs, &[&input], 1).unwrap();
            assert_eq!(fast[0].desc(), reference[0].desc(), "{} {}", format, mode);
            assert_eq!(
                to_format(&fast[0], MemoryFormat::Ncsp).to_vec::<f32>().unwrap(),
                to_format(&reference[0], MemoryFormat::Ncsp).to_vec::<f32>().unwrap(),
                "{} {}",
                format,
                mode
            );
        }
    }
}

#[test]
fn test_reference_handles_channel_tail() {
    // 5 channels in blocks of 8: only the reference kernel accepts this
    let plain = iota(&[1, 5, 2, 2]);
    let blocked = to_format(&plain, MemoryFormat::Blocked8);
    let attrs = OpAttributes::Pad(PadAttrs::new(PadMode::Edge, vec![0, 0, 1, 0], vec![0, 0, 0, 1]));
    let out = run(&PadReferenceKernel, &attrs, &[&blocked], 2).unwrap();
    let back = to_format(&out[0], MemoryFormat::Ncsp);
    let expected = run(&PadKernel, &attrs, &[&plain], 1).unwrap();
    assert_eq!(back.to_vec::<f32>().unwrap(), expected[0].to_vec::<f32>().unwrap());
}

#[test]
fn test_zero_sized_input_fills_pad_value() {
    let input = Tensor::zeros(infer_core::TensorDesc::plain(&[0, 2], DataType::F32)).unwrap();
    for mode in [PadMode::Constant, PadMode::Edge] {
        let attrs = OpAttributes::Pad(PadAttrs::new(mode, vec![2, 0], vec![0, 1]).with_pad_value(4.0));
        let out = run(&PadKernel, &attrs, &[&input], 2).unwrap();
        assert_eq!(out[0].dims(), &[2, 3]);
        assert_eq!(out[0].to_vec::<f32>().unwrap(), vec![4.0; 6]);
    }
}

proptest! {
    #[test]
    fn zero_pads_are_identity(
        dims in prop::collection::vec(1usize..5, 1..5),
        mode in prop::sample::select(vec![PadMode::Constant, PadMode::Edge, PadMode::Reflect, PadMode::Symmetric]),
        threads in 1usize..4,
    ) {
        let input = iota(&dims);
        let zeros = vec![0i64; dims.len()];
        let attrs = OpAttributes::Pad(PadAttrs::new(mode, zeros.clone(), zeros));
        let out = run(&PadKernel, &attrs, &[&input], threads).unwrap();
        prop_assert_eq!(out[0].desc(), input.desc());
        prop_assert_eq!(out[0].data(), input.data());
    }

    #[test]
    fn output_dims_add_pads(
        dims in prop::collection::vec(1usize..4, 1..4),
        seed in 0i64..3,
    ) {
        let input = iota(&dims);
        let begin: Vec<i64> = (0..dims.len() as i64).map(|i| (i + seed) % 3).collect();
        let end: Vec<i64> = (0..dims.len() as i64).map(|i| (i * seed) % 2).collect();
        let attrs = OpAttributes::Pad(PadAttrs::new(PadMode::Constant, begin.clone(), end.clone()));
        let fast = run(&PadKernel, &attrs, &[&input], 2).unwrap();
        let reference = run(&PadReferenceKernel, &attrs, &[&input], 2).unwrap();
        for (i, &d) in dims.iter().enumerate() {
            prop_assert_eq!(fast[0].dims()[i], d + begin[i] as usize + end[i] as usize);
        }
        prop_assert_eq!(fast[0].data(), reference[0].data());
    }
}
