use approx::assert_abs_diff_eq;
use tessel_core::internal::*;
use tessel_core::layers::{Dense, Embedding, Merge, MergeMode};

fn setup_test_logger() {
    let _ = env_logger::Builder::from_env("TESSEL_LOG").try_init();
}

fn f32_input(graph: &mut Graph, width: usize) -> TensorHandle {
    graph.input(TypedFact::shape::<f32>(shapefact!(_, width))).unwrap()
}

fn kind(err: &TesselError) -> &GraphError {
    GraphError::find(err).unwrap_or_else(|| panic!("untyped error: {err:?}"))
}

/// A layer refusing masks, and otherwise the identity.
#[derive(Clone, Debug)]
struct Identity;

impl Layer for Identity {
    fn class_name(&self) -> &'static str {
        "Identity"
    }

    fn compute_output_shape(&self, inputs: &[&ShapeFact]) -> TesselResult<TVec<ShapeFact>> {
        Ok(inputs.iter().map(|s| (*s).clone()).collect())
    }

    fn call(
        &self,
        inputs: TVec<Arc<Tensor>>,
        _masks: &[Option<Arc<Tensor>>],
        _phase: LearningPhase,
    ) -> TesselResult<TVec<Arc<Tensor>>> {
        Ok(inputs)
    }

    fn config(&self) -> TesselResult<serde_json::Value> {
        Ok(serde_json::json!({}))
    }
}

#[test]
fn single_dense_application() {
    setup_test_logger();
    let mut graph = Graph::default();
    let x = f32_input(&mut graph, 32);
    let dense = graph.add_layer(Dense::new(16));
    let y = graph.chain(dense, &x).unwrap();
    assert_eq!(y.shape(), &shapefact!(_, 16));
    assert_eq!(graph.layer(dense).inbound_nodes.len(), 1);
    assert_eq!(graph.nodes().len(), 2);
    let node = graph.producer(&y).unwrap();
    assert_eq!(node.outbound_layer, dense);
    assert_eq!(node.input_tensors[0], x);
    assert_eq!(graph.layer(dense).name, "dense_1");
}

#[test]
fn shared_layer_records_two_nodes() {
    setup_test_logger();
    let mut graph = Graph::default();
    let x = f32_input(&mut graph, 32);
    let y = f32_input(&mut graph, 32);
    let dense = graph.add_layer(Dense::new(16));
    let a = graph.chain(dense, &x).unwrap();
    let b = graph.chain(dense, &y).unwrap();
    let entry = graph.layer(dense);
    assert_eq!(entry.inbound_nodes.len(), 2);
    assert!(entry.outbound_nodes.is_empty());
    assert_eq!(a.history.unwrap().node_index, 0);
    assert_eq!(b.history.unwrap().node_index, 1);
    assert_eq!(graph.output_shape_at(dense, 1).unwrap()[0], shapefact!(_, 16));
    let err = graph.layer_output(dense).unwrap_err();
    assert!(matches!(kind(&err), GraphError::MultipleInboundNodes { count: 2, .. }));
}

#[test]
fn shared_weights_follow_mutation() {
    setup_test_logger();
    let mut graph = Graph::default();
    let x1 = f32_input(&mut graph, 2);
    let x2 = f32_input(&mut graph, 2);
    let dense = graph.add_layer(Dense::new(1).with_use_bias(false));
    let y1 = graph.chain(dense, &x1).unwrap();
    let y2 = graph.chain(dense, &x2).unwrap();
    let mut model = Container::new(&graph, &[x1, x2], &[y1, y2]).unwrap();

    let shared = model.get_layer("dense_1").unwrap().weights();
    assert!(shared[0].ptr_eq(&graph.layer(dense).weights()[0]));

    graph.layer(dense).set_weights(&[tensor2(&[[1f32], [1.]])]).unwrap();
    let feed = || tvec!(rctensor2(&[[1f32, 2.]]), rctensor2(&[[3f32, 4.]]));
    let outputs = model.call(feed()).unwrap();
    assert_abs_diff_eq!(outputs[0].as_vec::<f32>().unwrap()[0], 3.0);
    assert_abs_diff_eq!(outputs[1].as_vec::<f32>().unwrap()[0], 7.0);

    graph.layer(dense).set_weights(&[tensor2(&[[2f32], [0.]])]).unwrap();
    let outputs = model.call(feed()).unwrap();
    assert_abs_diff_eq!(outputs[0].as_vec::<f32>().unwrap()[0], 2.0);
    assert_abs_diff_eq!(outputs[1].as_vec::<f32>().unwrap()[0], 6.0);
}

#[test]
fn cached_replay_sees_new_weights() {
    setup_test_logger();
    let mut graph = Graph::default();
    let x = f32_input(&mut graph, 2);
    let dense =
        graph.add_layer(Dense::new(1).with_use_bias(false).with_kernel_constraint(Constraint::NonNeg));
    let y = graph.chain(dense, &x).unwrap();
    let mut model = Container::new(&graph, &[x], &[y]).unwrap();
    let input = rctensor2(&[[1f32, 2.]]);

    model.set_weights(&[tensor2(&[[1f32], [1.]])]).unwrap();
    let before = model.call(tvec!(input.clone())).unwrap();
    assert_abs_diff_eq!(before[0].as_vec::<f32>().unwrap()[0], 3.0);

    graph.layer(dense).set_weights(&[tensor2(&[[2f32], [-1.]])]).unwrap();
    let after = model.call(tvec!(input.clone())).unwrap();
    assert_abs_diff_eq!(after[0].as_vec::<f32>().unwrap()[0], 0.0);

    model.apply_constraints().unwrap();
    let constrained = model.call(tvec!(input.clone())).unwrap();
    assert_abs_diff_eq!(constrained[0].as_vec::<f32>().unwrap()[0], 2.0);

    let again = model.call(tvec!(input)).unwrap();
    assert!(Arc::ptr_eq(&again[0], &constrained[0]));
}

#[test]
fn disconnected_output_is_rejected() {
    setup_test_logger();
    let mut graph = Graph::default();
    let x = f32_input(&mut graph, 32);
    let w = f32_input(&mut graph, 32);
    let dense = graph.add_layer(Dense::new(16));
    let _ = graph.chain(dense, &x).unwrap();
    let other = graph.add_layer(Dense::new(16));
    let z = graph.chain(other, &w).unwrap();
    let err = Container::new(&graph, &[x], &[z]).unwrap_err();
    match kind(&err) {
        GraphError::Disconnected { layer, .. } => assert_eq!(layer, "dense_2"),
        e => panic!("unexpected {e:?}"),
    }
}

#[test]
fn mask_into_non_masking_layer_fails_when_wiring() {
    setup_test_logger();
    let mut graph = Graph::default();
    let ids = graph.input(TypedFact::shape::<i64>(shapefact!(_, 5))).unwrap();
    let embedding = graph.add_layer(Embedding::new(10, 4).with_mask_zero(true));
    let e = graph.chain(embedding, &ids).unwrap();
    assert!(e.mask.is_some());
    let identity = graph.add_layer(Identity);
    let nodes = graph.nodes().len();
    let err = graph.chain(identity, &e).unwrap_err();
    assert!(matches!(kind(&err), GraphError::MaskingUnsupported { input: 0, .. }));
    assert_eq!(graph.nodes().len(), nodes);
    assert!(graph.layer(identity).inbound_nodes.is_empty());
}

#[test]
fn concat_merge_shapes() {
    setup_test_logger();
    let mut graph = Graph::default();
    let a = f32_input(&mut graph, 10);
    let b = f32_input(&mut graph, 10);
    let merge = graph.add_layer(Merge::concat(-1));
    let c = graph.wire(merge, &[a, b]).unwrap();
    assert_eq!(c[0].shape(), &shapefact!(_, 20));
}

#[test]
fn concat_merge_mismatch_creates_no_node() {
    setup_test_logger();
    let mut graph = Graph::default();
    let a = graph.input(TypedFact::shape::<f32>(shapefact!(_, 3, 10))).unwrap();
    let b = graph.input(TypedFact::shape::<f32>(shapefact!(_, 4, 10))).unwrap();
    let merge = graph.add_layer(Merge::concat(-1));
    let nodes = graph.nodes().len();
    let err = graph.wire(merge, &[a, b]).unwrap_err();
    assert!(matches!(kind(&err), GraphError::IncompatibleInput { input: 1, .. }));
    assert_eq!(graph.nodes().len(), nodes);
    assert!(graph.layer(merge).inbound_nodes.is_empty());
    assert!(err.to_string().contains("merge_1"));
}

#[test]
fn elementwise_merge_replays() {
    setup_test_logger();
    let mut graph = Graph::default();
    let a = f32_input(&mut graph, 2);
    let b = f32_input(&mut graph, 2);
    let merge = graph.add_layer(Merge::new(MergeMode::Max));
    let c = graph.wire(merge, &[a.clone(), b.clone()]).unwrap();
    let mut model = Container::new(&graph, &[a, b], &c).unwrap();
    let out = model.call(tvec!(rctensor2(&[[1f32, 4.]]), rctensor2(&[[3f32, 2.]]))).unwrap();
    assert_eq!(*out[0], tensor2(&[[3f32, 4.]]));
}
