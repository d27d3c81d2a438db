use tessel_core::internal::*;
use tessel_core::layers::{Dense, Dropout, Embedding, Masking, Merge, MergeMode};

fn setup_test_logger() {
    let _ = env_logger::Builder::from_env("TESSEL_LOG").try_init();
}

/// Splits the last axis in two halves.
#[derive(Clone, Debug)]
struct Split {
    masks_per_output: bool,
}

impl Layer for Split {
    fn class_name(&self) -> &'static str {
        "Split"
    }

    fn check_inputs(&self, inputs: &[&TypedFact]) -> Result<(), InputMismatch> {
        check_input_arity(inputs, 1)?;
        match inputs[0].shape.last() {
            Some(d) if d % 2 == 0 => Ok(()),
            _ => Err(InputMismatch::new(0, "last axis must be even".into())),
        }
    }

    fn compute_output_shape(&self, inputs: &[&ShapeFact]) -> TesselResult<TVec<ShapeFact>> {
        let mut shape = inputs[0].clone();
        let last = shape.rank() - 1;
        shape.set_dim(last, shape.last().map(|d| d / 2));
        Ok(tvec!(shape.clone(), shape))
    }

    fn call(
        &self,
        inputs: TVec<Arc<Tensor>>,
        _masks: &[Option<Arc<Tensor>>],
        _phase: LearningPhase,
    ) -> TesselResult<TVec<Arc<Tensor>>> {
        let x = inputs[0].to_array_view::<f32>()?;
        let axis = tessel_data::tessel_ndarray::Axis(x.ndim() - 1);
        let half = x.shape()[x.ndim() - 1] / 2;
        let (a, b) = x.split_at(axis, half);
        Ok(tvec!(a.to_owned().into_arc_tensor(), b.to_owned().into_arc_tensor()))
    }

    fn supports_masking(&self) -> bool {
        true
    }

    fn compute_mask_fact(
        &self,
        _inputs: &[&TypedFact],
        masks: &[Option<&TypedFact>],
    ) -> TesselResult<TVec<Option<TypedFact>>> {
        let mask = masks[0].cloned();
        if self.masks_per_output {
            Ok(tvec!(mask.clone(), mask))
        } else {
            Ok(tvec!(mask))
        }
    }

    fn config(&self) -> TesselResult<serde_json::Value> {
        Ok(serde_json::json!({}))
    }
}

#[test]
fn masks_flow_through_merge() {
    setup_test_logger();
    let mut graph = Graph::default();
    let a = graph.input(TypedFact::shape::<i64>(shapefact!(_, 3))).unwrap();
    let b = graph.input(TypedFact::shape::<i64>(shapefact!(_, 3))).unwrap();
    let embedding = graph.add_layer(Embedding::new(5, 2).with_mask_zero(true));
    let ea = graph.chain(embedding, &a).unwrap();
    let eb = graph.chain(embedding, &b).unwrap();
    let merge = graph.add_layer(Merge::new(MergeMode::Sum));
    let c = graph.wire(merge, &[ea, eb]).unwrap();
    assert_eq!(c[0].mask.as_ref().unwrap().shape, shapefact!(_, 3));

    let mut model = Container::new(&graph, &[a, b], &c).unwrap();
    let masks = model
        .compute_mask(tvec!(rctensor2(&[[1i64, 0, 2]]), rctensor2(&[[0i64, 3, 3]])), None)
        .unwrap();
    assert_eq!(**masks[0].as_ref().unwrap(), tensor2(&[[false, false, true]]));
}

#[test]
fn masking_layer_mask_survives_dense() {
    setup_test_logger();
    let mut graph = Graph::default();
    let x = graph.input(TypedFact::shape::<f32>(shapefact!(_, 2, 3))).unwrap();
    let masking = graph.add_layer(Masking::new(0.0));
    let dense = graph.add_layer(Dense::new(4));
    let dropout = graph.add_layer(Dropout::new(0.5));
    let m = graph.chain(masking, &x).unwrap();
    let d = graph.chain(dense, &m).unwrap();
    let y = graph.chain(dropout, &d).unwrap();
    assert!(y.mask.is_some());
    assert!(y.uses_learning_phase);

    let mut model = Container::new(&graph, &[x], &[y]).unwrap();
    assert!(model.uses_learning_phase());
    let input = rctensor3(&[[[0f32, 0., 0.], [1., 0., 2.]]]);
    let masks = model.compute_mask(tvec!(input), None).unwrap();
    assert_eq!(**masks[0].as_ref().unwrap(), tensor2(&[[false, true]]));
}

#[test]
fn multi_output_layer() {
    setup_test_logger();
    let mut graph = Graph::default();
    let x = graph.input(TypedFact::shape::<f32>(shapefact!(_, 4))).unwrap();
    let split = graph.add_layer(Split { masks_per_output: true });
    let halves = graph.wire(split, &[x.clone()]).unwrap();
    assert_eq!(halves.len(), 2);
    assert_eq!(halves[1].history.unwrap().slot, 1);
    let merge = graph.add_layer(Merge::new(MergeMode::Mul));
    let y = graph.wire(merge, &halves).unwrap();
    assert_eq!(graph.node(graph.producer(&y[0]).unwrap().id).tensor_indices.as_slice(), &[0, 1]);

    let mut model = Container::new(&graph, &[x], &y).unwrap();
    let out = model.call(tvec!(rctensor2(&[[1f32, 2., 3., 4.]]))).unwrap();
    assert_eq!(*out[0], tensor2(&[[3f32, 8.]]));
    let summary = model.to_string();
    assert!(summary.contains("split_1[0][0], split_1[0][1]"));
}

#[test]
fn mask_count_mismatch() {
    setup_test_logger();
    let mut graph = Graph::default();
    let x = graph.input(TypedFact::shape::<f32>(shapefact!(_, 4))).unwrap();
    let split = graph.add_layer(Split { masks_per_output: false });
    let err = graph.wire(split, &[x.clone()]).unwrap_err();
    assert!(matches!(
        GraphError::find(&err),
        Some(GraphError::ShapeMaskCountMismatch { outputs: 2, masks: 1, .. })
    ));
    let odd = graph.input(TypedFact::shape::<f32>(shapefact!(_, 3))).unwrap();
    let err = graph.wire(split, &[odd]).unwrap_err();
    assert!(matches!(GraphError::find(&err), Some(GraphError::IncompatibleInput { .. })));
}

#[test]
fn unbuilt_layer_has_no_params() {
    let mut graph = Graph::default();
    let dense = graph.add_layer(Dense::new(4));
    let err = graph.layer(dense).count_params().unwrap_err();
    assert!(matches!(GraphError::find(&err), Some(GraphError::NotBuilt { .. })));
}
