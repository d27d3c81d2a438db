use super::cache::{BoundedCache, InputKey};
use super::order::{depths_for_order, eval_order_for_nodes};
use crate::internal::*;
use crate::plan::{ReplayPlan, TensorValue};
use std::collections::HashSet;
use std::fmt;
use tessel_data::tessel_itertools::Itertools;

/// Container construction and replay policies.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContainerOptions {
    /// Fail, instead of warning, when an input is not produced by an
    /// `InputLayer`.
    pub strict_inputs: bool,
    /// Entries kept by each replay cache. Zero disables caching.
    pub cache_capacity: usize,
}

impl Default for ContainerOptions {
    fn default() -> ContainerOptions {
        ContainerOptions { strict_inputs: false, cache_capacity: 32 }
    }
}

impl ContainerOptions {
    pub fn with_strict_inputs(self, strict_inputs: bool) -> ContainerOptions {
        ContainerOptions { strict_inputs, ..self }
    }

    pub fn with_cache_capacity(self, cache_capacity: usize) -> ContainerOptions {
        ContainerOptions { cache_capacity, ..self }
    }
}

/// How `Container::get_layer` designates a layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayerRef<'a> {
    Name(&'a str),
    Index(usize),
}

impl<'a> From<&'a str> for LayerRef<'a> {
    fn from(name: &'a str) -> LayerRef<'a> {
        LayerRef::Name(name)
    }
}

impl<'a> From<usize> for LayerRef<'a> {
    fn from(index: usize) -> LayerRef<'a> {
        LayerRef::Index(index)
    }
}

/// A compiled graph, from declared input handles to declared output handles.
///
/// The container owns a snapshot of the graph it was built from. Layers
/// weights are shared with the original graph and with any other container
/// built on it. Topology is computed once, in `new`, and frozen.
#[derive(Clone, Debug)]
pub struct Container {
    name: String,
    graph: Graph,
    inputs: TVec<TensorHandle>,
    outputs: TVec<TensorHandle>,
    layers: Vec<LayerId>,
    nodes_by_depth: Vec<Vec<NodeId>>,
    node_depths: HashMap<NodeId, usize>,
    container_nodes: HashSet<NodeId>,
    plan: ReplayPlan,
    options: ContainerOptions,
    output_cache: BoundedCache<InputKey, TVec<TensorValue>>,
    shape_cache: BoundedCache<TVec<ShapeFact>, TVec<ShapeFact>>,
}

/// Human readable designation of a handle: `dense_1[0][0]`.
pub(crate) fn describe(graph: &Graph, tensor: &TensorHandle) -> String {
    match tensor.history {
        Some(h) if h.layer.0 < graph.layers.len() => {
            format!("{}[{}][{}]", graph.layer(h.layer).name, h.node_index, h.slot)
        }
        _ => tensor.id.to_string(),
    }
}

impl Container {
    pub fn new(
        graph: &Graph,
        inputs: &[TensorHandle],
        outputs: &[TensorHandle],
    ) -> TesselResult<Container> {
        Self::new_with_options(graph, inputs, outputs, ContainerOptions::default())
    }

    pub fn new_with_options(
        graph: &Graph,
        inputs: &[TensorHandle],
        outputs: &[TensorHandle],
        options: ContainerOptions,
    ) -> TesselResult<Container> {
        graph.check_edges()?;
        let graph = graph.clone();

        for (ix, input) in inputs.iter().enumerate() {
            if inputs[..ix].contains(input) {
                bail!(GraphError::DuplicateInput { tensor: describe(&graph, input) })
            }
            let producer = graph.producer(input)?;
            if !producer.is_source() {
                let layer = graph.layer(producer.outbound_layer).name.clone();
                if options.strict_inputs {
                    bail!(GraphError::NonSourceInput { tensor: describe(&graph, input), layer })
                }
                warn!(
                    "Container input {} is produced by layer `{}`, not an InputLayer. \
                     Upstream layers will not be part of the container.",
                    describe(&graph, input),
                    layer
                );
            }
        }
        let input_ids: Vec<TensorId> = inputs.iter().map(|i| i.id).collect();

        let mut targets = vec![];
        for output in outputs {
            let producer = graph.producer(output)?;
            if !input_ids.contains(&output.id) || producer.is_source() {
                targets.push(producer.id);
            }
        }
        let order = eval_order_for_nodes(&graph, &input_ids, &targets)?;
        let node_depths = depths_for_order(&graph, &order, &input_ids);
        let mut sorted = order.clone();
        sorted.sort_by_key(|n| node_depths[n]);

        let mut computable: HashSet<TensorId> = input_ids.iter().copied().collect();
        let mut complete: Vec<&str> = vec![];
        for n in &sorted {
            let node = graph.node(*n);
            let layer = graph.layer(node.outbound_layer);
            if node.is_source() {
                continue;
            }
            for input in &node.input_tensors {
                if !computable.contains(&input.id) {
                    bail!(GraphError::Disconnected {
                        tensor: describe(&graph, input),
                        layer: layer.name.clone(),
                        inputs: inputs.iter().map(|i| describe(&graph, i)).join(", "),
                    })
                }
            }
            computable.extend(node.output_ids());
            complete.push(&layer.name);
        }
        for output in outputs {
            if !computable.contains(&output.id) {
                let layer = graph.producer(output)?.outbound_layer;
                bail!(GraphError::Disconnected {
                    tensor: describe(&graph, output),
                    layer: graph.layer(layer).name.clone(),
                    inputs: inputs.iter().map(|i| describe(&graph, i)).join(", "),
                })
            }
        }
        trace!("Layers reached from inputs: {:?}", complete);

        let max_depth = node_depths.values().copied().max().unwrap_or(0);
        let mut nodes_by_depth = vec![vec![]; if sorted.is_empty() { 0 } else { max_depth + 1 }];
        for n in &sorted {
            nodes_by_depth[node_depths[n]].push(*n);
        }

        let mut layer_rank: HashMap<LayerId, (usize, usize)> = HashMap::new();
        for (seen, n) in order.iter().enumerate() {
            let layer = graph.node(*n).outbound_layer;
            let depth = node_depths[n];
            let rank = layer_rank.entry(layer).or_insert((depth, seen));
            rank.0 = rank.0.min(depth);
        }
        let layers: Vec<LayerId> =
            layer_rank.iter().sorted_by_key(|(_, rank)| **rank).map(|(id, _)| *id).collect();

        let names = layers.iter().map(|l| graph.layer(*l).name.as_str()).counts();
        if let Some((name, count)) =
            layers.iter().map(|l| graph.layer(*l).name.as_str()).find_map(|n| {
                let count = names[n];
                (count > 1).then_some((n, count))
            })
        {
            bail!(GraphError::DuplicateLayerName { name: name.to_string(), count })
        }

        let output_ids: Vec<TensorId> = outputs.iter().map(|o| o.id).collect();
        let plan = ReplayPlan::new(&graph, &input_ids, &output_ids, &sorted)?;
        debug!(
            "Container built: {} inputs, {} outputs, {} nodes, {} layers, max depth {}",
            inputs.len(),
            outputs.len(),
            sorted.len(),
            layers.len(),
            max_depth
        );
        Ok(Container {
            name: "model".to_string(),
            inputs: inputs.into(),
            outputs: outputs.into(),
            layers,
            nodes_by_depth,
            container_nodes: order.iter().copied().collect(),
            node_depths,
            plan,
            output_cache: BoundedCache::new(options.cache_capacity),
            shape_cache: BoundedCache::new(options.cache_capacity),
            options,
            graph,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Container {
        self.set_name(name);
        self
    }

    pub fn options(&self) -> &ContainerOptions {
        &self.options
    }

    /// The graph snapshot this container replays.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn inputs(&self) -> &[TensorHandle] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[TensorHandle] {
        &self.outputs
    }

    /// Layers, sorted by depth then by discovery order.
    pub fn layers(&self) -> impl Iterator<Item = &LayerEntry> + '_ {
        self.layers.iter().map(|l| self.graph.layer(*l))
    }

    pub fn layer_ids(&self) -> &[LayerId] {
        &self.layers
    }

    /// Nodes, bucketed by depth, from the inputs (depth 0) to the outputs.
    pub fn nodes_by_depth(&self) -> &[Vec<NodeId>] {
        &self.nodes_by_depth
    }

    pub fn depth_of(&self, node: NodeId) -> Option<usize> {
        self.node_depths.get(&node).copied()
    }

    pub fn container_nodes(&self) -> &HashSet<NodeId> {
        &self.container_nodes
    }

    pub fn contains_node(&self, node: NodeId) -> bool {
        self.container_nodes.contains(&node)
    }

    /// Stable designation of a node: layer name and position in the layer
    /// inbound nodes, as in `dense_1_ib-0`.
    pub fn node_key(&self, node: NodeId) -> String {
        let layer = self.graph.layer(self.graph.node(node).outbound_layer);
        let index = layer.inbound_nodes.iter().position(|n| *n == node).unwrap_or(0);
        format!("{}_ib-{}", layer.name, index)
    }

    fn history_triples(&self, tensors: &[TensorHandle]) -> Vec<(LayerId, usize, usize)> {
        tensors
            .iter()
            .filter_map(|t| t.history)
            .map(|h| (h.layer, h.node_index, h.slot))
            .collect()
    }

    /// `(layer, node_index, slot)` for each declared input.
    pub fn input_layers(&self) -> Vec<(LayerId, usize, usize)> {
        self.history_triples(&self.inputs)
    }

    /// `(layer, node_index, slot)` for each declared output.
    pub fn output_layers(&self) -> Vec<(LayerId, usize, usize)> {
        self.history_triples(&self.outputs)
    }

    pub fn get_layer<'a>(&self, layer: impl Into<LayerRef<'a>>) -> TesselResult<&LayerEntry> {
        match layer.into() {
            LayerRef::Name(name) => self
                .layers()
                .find(|l| l.name == name)
                .ok_or_else(|| GraphError::UnknownLayer(format!("name `{name}`")).into()),
            LayerRef::Index(ix) => self
                .layers
                .get(ix)
                .map(|l| self.graph.layer(*l))
                .ok_or_else(|| GraphError::UnknownLayer(format!("index {ix}")).into()),
        }
    }

    pub fn uses_learning_phase(&self) -> bool {
        self.outputs.iter().any(|o| o.uses_learning_phase)
    }

    pub fn weights(&self) -> TVec<Variable> {
        self.layers().flat_map(|l| l.weights()).collect()
    }

    pub fn trainable_weights(&self) -> TVec<Variable> {
        self.layers().flat_map(|l| l.trainable_weights()).collect()
    }

    pub fn non_trainable_weights(&self) -> TVec<Variable> {
        self.layers().flat_map(|l| l.non_trainable_weights()).collect()
    }

    pub fn count_params(&self) -> TesselResult<usize> {
        self.layers().map(|l| l.count_params()).sum()
    }

    pub fn get_weights(&self) -> TesselResult<TVec<Tensor>> {
        Ok(self.weights().iter().map(|w| w.value()).collect())
    }

    /// Assigns every weight of every layer, in `weights()` order.
    pub fn set_weights(&self, values: &[Tensor]) -> TesselResult<()> {
        let expected = self.weights().len();
        if expected != values.len() {
            bail!(GraphError::WeightCountMismatch {
                layer: self.name.clone(),
                expected,
                got: values.len(),
            })
        }
        let mut offset = 0;
        for layer in self.layers() {
            let count = layer.weights().len();
            if count > 0 {
                layer.set_weights(&values[offset..offset + count])?;
            }
            offset += count;
        }
        Ok(())
    }

    pub fn regularization_penalty(&self) -> TesselResult<f32> {
        self.weights().iter().map(|w| w.regularization_penalty()).sum()
    }

    pub fn apply_constraints(&self) -> TesselResult<()> {
        for w in self.trainable_weights() {
            w.apply_constraint()?;
        }
        Ok(())
    }

    fn weights_version(&self) -> u64 {
        self.weights().iter().fold(0u64, |acc, w| acc.wrapping_add(w.version()))
    }

    /// Drops all cached replay results.
    pub fn clear_caches(&mut self) {
        self.output_cache.clear();
        self.shape_cache.clear();
    }

    fn input_layer_name(&self, handle: &TensorHandle) -> String {
        match handle.history {
            Some(h) => self.graph.layer(h.layer).name.clone(),
            None => handle.id.to_string(),
        }
    }

    fn check_input_shapes(&self, shapes: &[ShapeFact]) -> TesselResult<()> {
        if shapes.len() != self.inputs.len() {
            bail!(GraphError::InputCountMismatch {
                what: "input shape(s)".into(),
                expected: self.inputs.len(),
                got: shapes.len(),
            })
        }
        for (ix, (handle, shape)) in self.inputs.iter().zip(shapes.iter()).enumerate() {
            if !handle.fact.shape.compatible_with(shape) {
                bail!(GraphError::IncompatibleInput {
                    layer: self.input_layer_name(handle),
                    input: ix,
                    constraint: format!("expected {}, got {}", handle.fact.shape, shape),
                })
            }
        }
        Ok(())
    }

    fn check_concrete_inputs(&self, inputs: &[Arc<Tensor>]) -> TesselResult<()> {
        if inputs.len() != self.inputs.len() {
            bail!(GraphError::InputCountMismatch {
                what: "input tensor(s)".into(),
                expected: self.inputs.len(),
                got: inputs.len(),
            })
        }
        for (ix, (handle, tensor)) in self.inputs.iter().zip(inputs.iter()).enumerate() {
            if !handle.fact.matches(tensor) {
                bail!(GraphError::IncompatibleInput {
                    layer: self.input_layer_name(handle),
                    input: ix,
                    constraint: format!(
                        "expected {}, got {:?} {}",
                        handle.fact,
                        tensor.shape(),
                        tensor.datum_type()
                    ),
                })
            }
        }
        Ok(())
    }

    fn run(
        &mut self,
        inputs: TVec<Arc<Tensor>>,
        masks: Option<TVec<Option<Arc<Tensor>>>>,
        phase: LearningPhase,
    ) -> TesselResult<TVec<TensorValue>> {
        self.check_concrete_inputs(&inputs)?;
        let masks = masks.unwrap_or_else(|| tvec!(None; inputs.len()));
        if masks.len() != inputs.len() {
            bail!(GraphError::InputCountMismatch {
                what: "input mask(s)".into(),
                expected: inputs.len(),
                got: masks.len(),
            })
        }
        let cacheable = phase == LearningPhase::Inference || !self.uses_learning_phase();
        let key = InputKey::new(&inputs, &masks, phase).with_weights_version(self.weights_version());
        if cacheable {
            if let Some(hit) = self.output_cache.get(&key) {
                trace!("Replay cache hit for {}", self.name);
                return Ok(hit);
            }
        }
        let values = inputs.into_iter().zip(masks).collect();
        let result = self.plan.run(&self.graph, values, phase)?;
        if cacheable {
            self.output_cache.insert(key, result.clone());
        }
        Ok(result)
    }

    /// Replays the graph on concrete inputs, for inference.
    pub fn call(&mut self, inputs: TVec<Arc<Tensor>>) -> TesselResult<TVec<Arc<Tensor>>> {
        self.call_with(inputs, None, LearningPhase::Inference)
    }

    /// Replays the graph with optional input masks, in a given phase.
    pub fn call_with(
        &mut self,
        inputs: TVec<Arc<Tensor>>,
        masks: Option<TVec<Option<Arc<Tensor>>>>,
        phase: LearningPhase,
    ) -> TesselResult<TVec<Arc<Tensor>>> {
        Ok(self.run(inputs, masks, phase)?.into_iter().map(|(t, _)| t).collect())
    }

    /// Output masks for concrete inputs and masks.
    pub fn compute_mask(
        &mut self,
        inputs: TVec<Arc<Tensor>>,
        masks: Option<TVec<Option<Arc<Tensor>>>>,
    ) -> TesselResult<TVec<Option<Arc<Tensor>>>> {
        Ok(self.run(inputs, masks, LearningPhase::Inference)?.into_iter().map(|(_, m)| m).collect())
    }

    /// Output shapes for the given input shapes, without computing anything.
    pub fn get_output_shape_for(&mut self, input_shapes: &[ShapeFact]) -> TesselResult<TVec<ShapeFact>> {
        let key: TVec<ShapeFact> = input_shapes.into();
        if let Some(hit) = self.shape_cache.get(&key) {
            return Ok(hit);
        }
        self.check_input_shapes(input_shapes)?;
        let shapes = self.plan.infer_shapes(&self.graph, input_shapes)?;
        self.shape_cache.insert(key, shapes.clone());
        Ok(shapes)
    }

    fn connected_to(&self, layer: &LayerEntry) -> String {
        layer
            .inbound_nodes
            .iter()
            .filter(|n| self.contains_node(**n))
            .flat_map(|n| self.graph.node(*n).input_tensors.iter())
            .map(|t| describe(&self.graph, t))
            .join(", ")
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let rule = "=".repeat(98);
        writeln!(f, "{:<32}{:<24}{:<12}{}", "Layer (type)", "Output Shape", "Param #", "Connected to")?;
        writeln!(f, "{rule}")?;
        let mut total = 0;
        for layer in self.layers() {
            let nodes: Vec<&Node> = layer
                .inbound_nodes
                .iter()
                .filter(|n| self.contains_node(**n))
                .map(|n| self.graph.node(*n))
                .collect();
            let shape = match nodes.as_slice() {
                [node] => node.output_shapes.iter().join(", "),
                _ => "multiple".to_string(),
            };
            let params = layer.count_params().unwrap_or(0);
            total += params;
            writeln!(
                f,
                "{:<32}{:<24}{:<12}{}",
                format!("{} ({})", layer.name, layer.class_name()),
                shape,
                params,
                self.connected_to(layer)
            )?;
        }
        writeln!(f, "{rule}")?;
        let trainable: usize = self.trainable_weights().iter().map(|w| w.count()).sum();
        writeln!(f, "Total params: {total}")?;
        writeln!(f, "Trainable params: {trainable}")?;
        write!(f, "Non-trainable params: {}", total.saturating_sub(trainable))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::{Dense, Dropout, Merge, MergeMode};
    use maplit::hashset;

    use crate::setup_test_logger;

    fn two_branches() -> (Graph, TensorHandle, TensorHandle) {
        let mut g = Graph::default();
        let x = g.input(TypedFact::shape::<f32>(shapefact!(_, 4))).unwrap();
        let a = g.add_layer(Dense::new(3));
        let b = g.add_layer(Dense::new(3));
        let ya = g.chain(a, &x).unwrap();
        let yb = g.chain(b, &x).unwrap();
        let sum = g.add_layer(Merge::new(MergeMode::Sum));
        let y = g.wire(sum, &[ya, yb]).unwrap().remove(0);
        (g, x, y)
    }

    #[test]
    fn layers_sorted_by_depth_then_discovery() {
        let (g, x, y) = two_branches();
        let model = Container::new(&g, &[x], &[y]).unwrap();
        let names: Vec<&str> = model.layers().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["input_1", "dense_1", "dense_2", "merge_1"]);
        assert_eq!(model.nodes_by_depth().len(), 3);
        assert_eq!(model.nodes_by_depth()[1].len(), 2);
    }

    #[test]
    fn node_keys() {
        let (g, x, y) = two_branches();
        let model = Container::new(&g, &[x], &[y.clone()]).unwrap();
        let producer = g.producer(&y).unwrap().id;
        assert_eq!(model.node_key(producer), "merge_1_ib-0");
        assert_eq!(*model.container_nodes(), hashset! {NodeId(0), NodeId(1), NodeId(2), NodeId(3)});
    }

    #[test]
    fn duplicate_inputs() {
        let (g, x, y) = two_branches();
        let err = Container::new(&g, &[x.clone(), x], &[y]).unwrap_err();
        assert!(matches!(GraphError::find(&err), Some(GraphError::DuplicateInput { .. })));
    }

    #[test]
    fn duplicate_names() {
        let mut g = Graph::default();
        let x = g.input(TypedFact::shape::<f32>(shapefact!(_, 4))).unwrap();
        let a = g.add_named_layer("same", Dense::new(3));
        let b = g.add_named_layer("same", Dense::new(3));
        let y = g.chain(a, &x).unwrap();
        let z = g.chain(b, &y).unwrap();
        let err = Container::new(&g, &[x], &[z]).unwrap_err();
        assert!(matches!(
            GraphError::find(&err),
            Some(GraphError::DuplicateLayerName { count: 2, .. })
        ));
    }

    #[test]
    fn non_source_inputs() {
        let (mut g, _, _) = two_branches();
        let d = g.add_layer(Dense::new(2));
        let h = g.layer_output(LayerId(1)).unwrap().remove(0);
        let z = g.chain(d, &h).unwrap();
        let lenient = Container::new(&g, &[h.clone()], &[z.clone()]).unwrap();
        assert_eq!(lenient.layers().count(), 1);
        let strict = ContainerOptions::default().with_strict_inputs(true);
        let err = Container::new_with_options(&g, &[h], &[z], strict).unwrap_err();
        assert!(matches!(GraphError::find(&err), Some(GraphError::NonSourceInput { .. })));
    }

    #[test]
    fn replay_is_cached_by_identity() {
        setup_test_logger();
        let (g, x, y) = two_branches();
        let mut model = Container::new(&g, &[x], &[y]).unwrap();
        let input = Tensor::zero::<f32>(&[2, 4]).into_arc_tensor();
        let first = model.call(tvec!(input.clone())).unwrap();
        let second = model.call(tvec!(input)).unwrap();
        assert!(Arc::ptr_eq(&first[0], &second[0]));
        model.clear_caches();
        let third = model.call(tvec!(Tensor::zero::<f32>(&[2, 4]).into_arc_tensor())).unwrap();
        assert!(!Arc::ptr_eq(&first[0], &third[0]));
        assert_eq!(first[0], third[0]);
    }

    #[test]
    fn concrete_inputs_are_checked() {
        setup_test_logger();
        let (g, x, y) = two_branches();
        let mut model = Container::new(&g, &[x], &[y]).unwrap();
        let err = model.call(tvec!(Tensor::zero::<f32>(&[2, 5]).into_arc_tensor())).unwrap_err();
        match GraphError::find(&err) {
            Some(GraphError::IncompatibleInput { layer, input: 0, .. }) => assert_eq!(layer, "input_1"),
            e => panic!("unexpected {e:?}"),
        }
        let err = model.call(tvec!()).unwrap_err();
        assert!(matches!(GraphError::find(&err), Some(GraphError::InputCountMismatch { .. })));
    }

    #[test]
    fn output_shape_for_other_batch() {
        let (g, x, y) = two_branches();
        let mut model = Container::new(&g, &[x], &[y]).unwrap();
        let shapes = model.get_output_shape_for(&[shapefact!(7, 4)]).unwrap();
        assert_eq!(shapes[0], shapefact!(7, 3));
    }

    #[test]
    fn output_shapes_agree_with_replay() {
        setup_test_logger();
        let (g, x, y) = two_branches();
        let mut model = Container::new(&g, &[x], &[y]).unwrap();
        let err = model.get_output_shape_for(&[shapefact!(7, 5)]).unwrap_err();
        assert!(matches!(GraphError::find(&err), Some(GraphError::IncompatibleInput { input: 0, .. })));
        let err = model.call(tvec!(Tensor::zero::<f32>(&[7, 5]).into_arc_tensor())).unwrap_err();
        assert!(matches!(GraphError::find(&err), Some(GraphError::IncompatibleInput { input: 0, .. })));
    }

    #[test]
    fn output_shapes_run_layer_checks() {
        setup_test_logger();
        let mut g = Graph::default();
        let a = g.input(TypedFact::shape::<f32>(shapefact!(_, _))).unwrap();
        let b = g.input(TypedFact::shape::<f32>(shapefact!(_, 3))).unwrap();
        let sum = g.add_layer(Merge::new(MergeMode::Sum));
        let y = g.wire(sum, &[a.clone(), b.clone()]).unwrap();
        let mut model = Container::new(&g, &[a, b], &y).unwrap();
        assert_eq!(
            model.get_output_shape_for(&[shapefact!(2, 3), shapefact!(2, 3)]).unwrap()[0],
            shapefact!(2, 3)
        );
        let err = model.get_output_shape_for(&[shapefact!(2, 4), shapefact!(2, 3)]).unwrap_err();
        match GraphError::find(&err) {
            Some(GraphError::IncompatibleInput { layer, .. }) => assert_eq!(layer, "merge_1"),
            e => panic!("unexpected {e:?}"),
        }
        let err = model.call(tvec!(rctensor2(&[[0f32; 4]; 2]), rctensor2(&[[0f32; 3]; 2]))).unwrap_err();
        assert!(matches!(GraphError::find(&err), Some(GraphError::IncompatibleInput { .. })));
    }

    #[test]
    fn learning_phase_propagates() {
        let mut g = Graph::default();
        let x = g.input(TypedFact::shape::<f32>(shapefact!(_, 4))).unwrap();
        let drop = g.add_layer(Dropout::new(0.5));
        let y = g.chain(drop, &x).unwrap();
        let d = g.add_layer(Dense::new(2));
        let z = g.chain(d, &y).unwrap();
        assert!(z.uses_learning_phase);
        let model = Container::new(&g, &[x], &[z]).unwrap();
        assert!(model.uses_learning_phase());
    }

    #[test]
    fn get_layer_by_name_and_index() {
        let (g, x, y) = two_branches();
        let model = Container::new(&g, &[x], &[y]).unwrap();
        assert_eq!(model.get_layer("dense_2").unwrap().name, "dense_2");
        assert_eq!(model.get_layer(0usize).unwrap().name, "input_1");
        let err = model.get_layer("nope").unwrap_err();
        assert!(matches!(GraphError::find(&err), Some(GraphError::UnknownLayer(_))));
    }

    #[test]
    fn summary() {
        let (g, x, y) = two_branches();
        let model = Container::new(&g, &[x], &[y]).unwrap();
        let summary = model.to_string();
        assert!(summary.contains("dense_1 (Dense)"));
        assert!(summary.contains("input_1[0][0]"));
        assert!(summary.contains("Total params: 30"));
    }
}
