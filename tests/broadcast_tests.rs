use infer_core::{
    error::{Error, Result},
    kernel::builtin::{BroadcastKernel, BroadcastReferenceKernel, ReorderKernel},
    ops::broadcast::BroadcastAttrs,
    ops::reorder::ReorderAttrs,
    ExecutionContext, Kernel, MemoryFormat, OpAttributes, PlanContext, Tensor,
};

fn run(kernel: &dyn Kernel, attrs: &OpAttributes, inputs: &[&Tensor]) -> Result<Vec<Tensor>> {
    let plan = kernel.plan(attrs, inputs, &PlanContext::new(3, 0))?;
    let mut outputs = plan
        .outputs
        .iter()
        .map(|d| Tensor::zeros(d.clone()))
        .collect::<Result<Vec<_>>>()?;
    kernel.execute(&plan, inputs, &mut outputs, &ExecutionContext::default())?;
    Ok(outputs)
}

fn broadcast(attrs: BroadcastAttrs, inputs: &[&Tensor]) -> Vec<f32> {
    let attrs = OpAttributes::Broadcast(attrs);
    let fast = run(&BroadcastKernel, &attrs, inputs).unwrap();
    let reference = run(&BroadcastReferenceKernel, &attrs, inputs).unwrap();
    assert_eq!(fast[0].data(), reference[0].data());
    fast[0].to_vec::<f32>().unwrap()
}

#[test]
fn test_single_value_fills_target() {
    let input = Tensor::from_vec(&[1], vec![7.0f32]).unwrap();
    assert_eq!(broadcast(BroadcastAttrs::to_shape(vec![3]), &[&input]), vec![7.0; 3]);

    let scalar = Tensor::scalar(7.0f32);
    assert_eq!(broadcast(BroadcastAttrs::to_shape(vec![2, 2]), &[&scalar]), vec![7.0; 4]);
}

#[test]
fn test_tiling_divisible_dims() {
    let input = Tensor::from_vec(&[2, 3], vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
    let out = broadcast(BroadcastAttrs::to_shape(vec![4, 6]), &[&input]);
    assert_eq!(&out[..6], &[1.0, 2.0, 3.0, 1.0, 2.0, 3.0]);
    assert_eq!(&out[6..12], &[4.0, 5.0, 6.0, 4.0, 5.0, 6.0]);
    assert_eq!(&out[12..], &out[..12]);
}

#[test]
fn test_numpy_and_axes_rules() {
    let row = Tensor::from_vec(&[3], vec![1.0f32, 2.0, 3.0]).unwrap();
    let out = broadcast(BroadcastAttrs::to_shape(vec![2, 3]), &[&row]);
    assert_eq!(out, vec![1.0, 2.0, 3.0, 1.0, 2.0, 3.0]);

    let col = Tensor::from_vec(&[2], vec![1.0f32, 2.0]).unwrap();
    let out = broadcast(BroadcastAttrs::to_shape(vec![2, 3]).with_axes(vec![1]), &[&col]);
    assert_eq!(out, vec![1.0, 1.0, 1.0, 2.0, 2.0, 2.0]);
}

#[test]
fn test_target_shape_from_input() {
    let input = Tensor::from_vec(&[2, 1], vec![1i32, 2]).unwrap();
    let target = Tensor::from_vec(&[3], vec![2i64, 2, 2]).unwrap();
    let attrs = OpAttributes::Broadcast(BroadcastAttrs::default());
    let out = run(&BroadcastKernel, &attrs, &[&input, &target]).unwrap();
    assert_eq!(out[0].dims(), &[2, 2, 2]);
    assert_eq!(out[0].to_vec::<i32>().unwrap(), vec![1, 1, 2, 2, 1, 1, 2, 2]);
}

#[test]
fn test_incompatible_shapes() {
    let input = Tensor::from_vec(&[2, 3], vec![0.0f32; 6]).unwrap();
    let attrs = OpAttributes::Broadcast(BroadcastAttrs::to_shape(vec![4, 4]));
    assert!(matches!(
        run(&BroadcastKernel, &attrs, &[&input]),
        Err(Error::ConfigurationError(_))
    ));
}

#[test]
fn test_blocked_input_uses_reference() {
    let plain = Tensor::from_vec(&[1, 8, 2], (0..16).map(|v| v as f32).collect()).unwrap();
    let reorder = OpAttributes::Reorder(ReorderAttrs::new(plain.data_type(), MemoryFormat::Blocked8));
    let blocked = run(&ReorderKernel, &reorder, &[&plain]).unwrap().remove(0);

    let attrs = OpAttributes::Broadcast(BroadcastAttrs::to_shape(vec![2, 8, 2]));
    assert!(run(&BroadcastKernel, &attrs, &[&blocked]).is_err());
    let out = run(&BroadcastReferenceKernel, &attrs, &[&blocked]).unwrap().remove(0);
    assert_eq!(out.format(), MemoryFormat::Blocked8);

    let back = OpAttributes::Reorder(ReorderAttrs::new(out.data_type(), MemoryFormat::Ncsp));
    let values = run(&ReorderKernel, &back, &[&out]).unwrap()[0].to_vec::<f32>().unwrap();
    let expected: Vec<f32> = (0..16).chain(0..16).map(|v| v as f32).collect();
    assert_eq!(values, expected);
}
