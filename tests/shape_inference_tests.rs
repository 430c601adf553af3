use infer_core::{
    error::Error, Attribute, DataType, Dimension, MemoryFormat, Node, OperatorRegistry, PartialShape, PortDesc,
    Tensor,
};

fn s(dims: &[usize]) -> PartialShape {
    PartialShape::from_static(dims)
}

fn port(shape: PartialShape, dt: DataType) -> PortDesc {
    PortDesc::new(shape, dt)
}

fn infer(node: &mut Node) -> Result<(), Error> {
    OperatorRegistry::initialize_standard_operators().infer_node(node)
}

#[test]
fn test_gather_tree_merges_batch_dims() {
    let step = PartialShape::new(vec![Dimension::Dynamic, Dimension::Dynamic, 4.into()]);
    let mut node = Node::new(0, "gt", "GatherTree")
        .with_input(port(step, DataType::F32))
        .with_input(port(PartialShape::dynamic(), DataType::F32))
        .with_input(port(s(&[3]), DataType::F32))
        .with_input(port(PartialShape::scalar(), DataType::F32));
    infer(&mut node).unwrap();
    assert_eq!(
        node.outputs[0].shape,
        PartialShape::new(vec![Dimension::Dynamic, 3.into(), 4.into()])
    );
}

#[test]
fn test_gather_tree_rejects_bad_ranks() {
    let mut node = Node::new(0, "gt", "GatherTree")
        .with_input(port(s(&[5, 2]), DataType::I32))
        .with_input(port(s(&[5, 2]), DataType::I32))
        .with_input(port(s(&[2]), DataType::I32))
        .with_input(port(PartialShape::scalar(), DataType::I32));
    assert!(matches!(infer(&mut node), Err(Error::ValidationError(_))));

    let mut node = Node::new(0, "gt", "GatherTree")
        .with_input(port(s(&[5, 2, 3]), DataType::I32))
        .with_input(port(s(&[5, 2, 3]), DataType::I32))
        .with_input(port(s(&[4]), DataType::I32))
        .with_input(port(PartialShape::scalar(), DataType::I32));
    assert!(infer(&mut node).is_err());
}

#[test]
fn test_pad_from_attributes_and_constants() {
    let mut node = Node::new(1, "pad", "Pad")
        .with_attribute("pads_begin", Attribute::Ints(vec![0, 1, 2]))
        .with_attribute("pads_end", Attribute::Ints(vec![0, 1, 0]))
        .with_input(port(
            PartialShape::new(vec![Dimension::Dynamic, 3.into(), 4.into()]),
            DataType::F32,
        ));
    infer(&mut node).unwrap();
    assert_eq!(
        node.outputs[0].shape,
        PartialShape::new(vec![Dimension::Dynamic, 5.into(), 6.into()])
    );

    let begin = Tensor::from_vec(&[2], vec![1i64, 1]).unwrap();
    let end = Tensor::from_vec(&[2], vec![0i64, 2]).unwrap();
    let mut node = Node::new(2, "pad", "Pad")
        .with_input(port(s(&[2, 2]), DataType::I8))
        .with_input(PortDesc::constant(begin))
        .with_input(PortDesc::constant(end));
    infer(&mut node).unwrap();
    assert_eq!(node.outputs[0].shape, s(&[3, 5]));
    assert_eq!(node.outputs[0].data_type, DataType::I8);
}

#[test]
fn test_pad_runtime_pads_keep_rank() {
    let mut node = Node::new(3, "pad", "Pad")
        .with_input(port(PartialShape::dynamic(), DataType::F32))
        .with_input(port(s(&[4]), DataType::I64))
        .with_input(port(s(&[4]), DataType::I64));
    infer(&mut node).unwrap();
    assert_eq!(node.outputs[0].shape, PartialShape::dynamic_of_rank(4));

    let mut node = Node::new(4, "pad", "Pad")
        .with_input(port(s(&[2, 2]), DataType::F32))
        .with_input(port(s(&[3]), DataType::I64))
        .with_input(port(s(&[3]), DataType::I64));
    assert!(infer(&mut node).is_err());
}

#[test]
fn test_pad_negative_result() {
    let mut node = Node::new(5, "pad", "Pad")
        .with_attribute("pads_begin", Attribute::Ints(vec![-3]))
        .with_attribute("pads_end", Attribute::Ints(vec![0]))
        .with_input(port(s(&[2]), DataType::F32));
    assert!(matches!(infer(&mut node), Err(Error::ValidationError(_))));
}

#[test]
fn test_broadcast_shapes_and_format() {
    let mut node = Node::new(6, "bc", "Broadcast")
        .with_attribute("target_shape", Attribute::Ints(vec![2, 16, 3]))
        .with_input(port(s(&[1, 16, 3]), DataType::F32).with_format(MemoryFormat::Blocked8));
    infer(&mut node).unwrap();
    assert_eq!(node.outputs[0].shape, s(&[2, 16, 3]));
    assert_eq!(node.outputs[0].format, MemoryFormat::Blocked8);

    let mut node = Node::new(7, "bc", "Broadcast")
        .with_input(port(s(&[3]), DataType::F32))
        .with_input(port(s(&[2]), DataType::I64));
    infer(&mut node).unwrap();
    assert_eq!(node.outputs[0].shape, PartialShape::dynamic_of_rank(2));
    assert_eq!(node.outputs[0].format, MemoryFormat::Ncsp);

    let mut node = Node::new(8, "bc", "Broadcast")
        .with_attribute("target_shape", Attribute::Ints(vec![4, 5]))
        .with_input(port(s(&[3]), DataType::F32));
    assert!(infer(&mut node).is_err());
}

#[test]
fn test_broadcast_axes_must_be_constant() {
    let mut node = Node::new(9, "bc", "Broadcast")
        .with_input(port(s(&[3]), DataType::F32))
        .with_input(PortDesc::constant(Tensor::from_vec(&[2], vec![2i64, 3]).unwrap()))
        .with_input(port(s(&[1]), DataType::I64));
    assert!(infer(&mut node).is_err());

    let mut node = Node::new(10, "bc", "Broadcast")
        .with_input(port(s(&[3]), DataType::F32))
        .with_input(PortDesc::constant(Tensor::from_vec(&[2], vec![3i64, 2]).unwrap()))
        .with_input(PortDesc::constant(Tensor::from_vec(&[1], vec![1i64]).unwrap()));
    infer(&mut node).unwrap();
    assert_eq!(node.outputs[0].shape, s(&[3, 2]));
}

#[test]
fn test_reorder_ports() {
    let mut node = Node::new(11, "reorder", "Reorder")
        .with_attribute("output_type", Attribute::String("f16".to_string()))
        .with_attribute("output_format", Attribute::String("nspc".to_string()))
        .with_input(port(s(&[1, 3, 4, 4]), DataType::F32));
    infer(&mut node).unwrap();
    assert_eq!(node.outputs[0].shape, s(&[1, 3, 4, 4]));
    assert_eq!(node.outputs[0].data_type, DataType::F16);
    assert_eq!(node.outputs[0].format, MemoryFormat::Nspc);

    let mut node = Node::new(12, "reorder", "Reorder")
        .with_attribute("output_format", Attribute::String("blocked16".to_string()))
        .with_input(port(s(&[4, 4]), DataType::F32));
    assert!(infer(&mut node).is_err());
}

#[test]
fn test_matrix_nms_outputs() {
    let mut node = Node::new(13, "nms", "MatrixNms")
        .with_attribute("keep_top_k", Attribute::Int(10))
        .with_attribute("output_type", Attribute::String("i32".to_string()))
        .with_input(port(s(&[2, 20, 4]), DataType::F32))
        .with_input(port(s(&[2, 3, 20]), DataType::F32));
    infer(&mut node).unwrap();
    assert_eq!(node.outputs[0].shape, s(&[20, 6]));
    assert_eq!(node.outputs[1].shape, s(&[20, 1]));
    assert_eq!(node.outputs[2].shape, s(&[2]));
    assert_eq!(node.outputs[1].data_type, DataType::I32);

    let mut node = Node::new(14, "nms", "MatrixNms")
        .with_attribute("dynamic_output", Attribute::Int(1))
        .with_input(port(s(&[2, 20, 4]), DataType::F32))
        .with_input(port(s(&[2, 3, 20]), DataType::F32));
    infer(&mut node).unwrap();
    assert_eq!(node.outputs[0].shape, PartialShape::new(vec![Dimension::Dynamic, 6.into()]));

    let mut node = Node::new(15, "nms", "MatrixNms")
        .with_input(port(s(&[2, 20, 4]), DataType::F32))
        .with_input(port(s(&[3, 3, 20]), DataType::F32));
    assert!(infer(&mut node).is_err());
}
