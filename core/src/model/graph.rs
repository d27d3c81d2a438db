use crate::internal::*;
use crate::layers::InputLayer;
use std::fmt;

/// A layer registered in a `Graph`, with its connectivity.
#[derive(Clone, Debug)]
pub struct LayerEntry {
    pub id: LayerId,
    pub name: String,
    pub built: bool,
    pub trainable: bool,
    /// Nodes created by applying this layer, in creation order.
    pub inbound_nodes: TVec<NodeId>,
    /// Nodes consuming an output of this layer, once per consumed input.
    pub outbound_nodes: TVec<NodeId>,
    pub layer: Box<dyn Layer>,
}

impl LayerEntry {
    pub fn class_name(&self) -> &'static str {
        self.layer.class_name()
    }

    pub fn is_input(&self) -> bool {
        self.layer.is::<InputLayer>()
    }

    pub fn downcast_ref<L: Layer>(&self) -> Option<&L> {
        self.layer.downcast_ref::<L>()
    }

    fn ensure_built(&self, what: &str) -> TesselResult<()> {
        if !self.built {
            bail!(GraphError::NotBuilt { layer: self.name.clone(), what: what.to_string() })
        }
        Ok(())
    }

    pub fn weights(&self) -> TVec<Variable> {
        self.layer.weights()
    }

    pub fn trainable_weights(&self) -> TVec<Variable> {
        if !self.trainable {
            return tvec!();
        }
        self.layer.weights().into_iter().filter(|w| w.trainable()).collect()
    }

    pub fn non_trainable_weights(&self) -> TVec<Variable> {
        if !self.trainable {
            return self.layer.weights();
        }
        self.layer.weights().into_iter().filter(|w| !w.trainable()).collect()
    }

    pub fn count_params(&self) -> TesselResult<usize> {
        self.ensure_built("count_params")?;
        Ok(self.layer.weights().iter().map(|w| w.count()).sum())
    }

    pub fn get_weights(&self) -> TesselResult<TVec<Tensor>> {
        self.ensure_built("get_weights")?;
        Ok(self.layer.weights().iter().map(|w| w.value()).collect())
    }

    /// Assigns all weights at once. Count and shapes are checked before any
    /// assignment happens.
    pub fn set_weights(&self, values: &[Tensor]) -> TesselResult<()> {
        self.ensure_built("set_weights")?;
        let weights = self.layer.weights();
        if weights.len() != values.len() {
            bail!(GraphError::WeightCountMismatch {
                layer: self.name.clone(),
                expected: weights.len(),
                got: values.len(),
            })
        }
        for (w, v) in weights.iter().zip(values) {
            if &*w.shape() != v.shape() {
                bail!(GraphError::WeightShapeMismatch {
                    layer: self.name.clone(),
                    weight: w.name().to_string(),
                    expected: w.shape().to_vec(),
                    got: v.shape().to_vec(),
                })
            }
        }
        for (w, v) in weights.iter().zip(values) {
            let datum_type = w.read().datum_type();
            w.set(v.cast_to_dt(datum_type).into_owned())?;
        }
        Ok(())
    }

    /// Full configuration: layer specific fields plus `name` and `trainable`.
    pub fn config(&self) -> TesselResult<serde_json::Value> {
        let mut config = self.layer.config()?;
        let object = config
            .as_object_mut()
            .with_context(|| format!("Config of layer `{}` is not an object", self.name))?;
        object.insert("name".into(), self.name.clone().into());
        object.insert("trainable".into(), self.trainable.into());
        Ok(config)
    }
}

impl fmt::Display for LayerEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.class_name())
    }
}

/// The graph-building context: an arena of layers and nodes.
///
/// Every layer application on tensor handles goes through `wire`, which
/// builds the layer on first use, validates inputs, propagates shapes and
/// masks, and records a `Node`. Automatic layer names are scoped to the
/// graph.
#[derive(Clone, Debug, Default)]
pub struct Graph {
    pub(crate) layers: Vec<LayerEntry>,
    pub(crate) nodes: Vec<Node>,
    next_tensor: usize,
    name_counters: HashMap<String, usize>,
}

impl Graph {
    fn unique_name(&mut self, prefix: &str) -> String {
        loop {
            let counter = self.name_counters.entry(prefix.to_string()).or_insert(0);
            *counter += 1;
            let name = format!("{prefix}_{counter}");
            if self.layer_by_name(&name).is_none() {
                return name;
            }
        }
    }

    fn new_tensor_id(&mut self) -> TensorId {
        self.next_tensor += 1;
        TensorId(self.next_tensor - 1)
    }

    /// Registers a layer under an automatic name.
    pub fn add_layer(&mut self, layer: impl Into<Box<dyn Layer>>) -> LayerId {
        let layer = layer.into();
        let name = self.unique_name(&layer.name_prefix());
        self.push_layer(name, layer)
    }

    /// Registers a layer under an explicit name. Uniqueness is only
    /// enforced when a `Container` is built.
    pub fn add_named_layer(
        &mut self,
        name: impl Into<String>,
        layer: impl Into<Box<dyn Layer>>,
    ) -> LayerId {
        self.push_layer(name.into(), layer.into())
    }

    fn push_layer(&mut self, name: String, layer: Box<dyn Layer>) -> LayerId {
        let id = LayerId(self.layers.len());
        trace!("Adding layer {} as {} ({})", id, name, layer.class_name());
        self.layers.push(LayerEntry {
            id,
            name,
            built: false,
            trainable: true,
            inbound_nodes: tvec!(),
            outbound_nodes: tvec!(),
            layer,
        });
        id
    }

    /// Creates a graph source: an `InputLayer` and its single node.
    pub fn input(&mut self, fact: TypedFact) -> TesselResult<TensorHandle> {
        let id = self.add_layer(InputLayer::new(fact));
        self.source_output(id)
    }

    pub fn named_input(
        &mut self,
        name: impl Into<String>,
        fact: TypedFact,
    ) -> TesselResult<TensorHandle> {
        let id = self.add_named_layer(name, InputLayer::new(fact));
        self.source_output(id)
    }

    fn source_output(&mut self, id: LayerId) -> TesselResult<TensorHandle> {
        let mut outputs = self.wire(id, &[])?;
        outputs.pop().context("Source layer produced no output")
    }

    /// An off-graph handle: no history, so layers applied on it record no
    /// node.
    pub fn placeholder(&mut self, fact: TypedFact) -> TensorHandle {
        TensorHandle {
            id: self.new_tensor_id(),
            fact,
            mask: None,
            history: None,
            uses_learning_phase: false,
        }
    }

    pub fn layer(&self, id: LayerId) -> &LayerEntry {
        &self.layers[id.0]
    }

    pub fn layer_mut(&mut self, id: LayerId) -> &mut LayerEntry {
        &mut self.layers[id.0]
    }

    pub fn layers(&self) -> &[LayerEntry] {
        &self.layers
    }

    pub fn layer_by_name(&self, name: &str) -> Option<LayerId> {
        self.layers.iter().find(|l| l.name == name).map(|l| l.id)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn set_trainable(&mut self, id: LayerId, trainable: bool) {
        self.layers[id.0].trainable = trainable;
    }

    /// The node producing a tensor, checking the handle history against the
    /// arena.
    pub fn producer(&self, tensor: &TensorHandle) -> TesselResult<&Node> {
        let not_ours = || GraphError::NotAGraphTensor { tensor: tensor.id.to_string() };
        let history = tensor.history.ok_or_else(not_ours)?;
        let node = self
            .layers
            .get(history.layer.0)
            .and_then(|l| l.inbound_nodes.get(history.node_index))
            .map(|n| &self.nodes[n.0])
            .ok_or_else(not_ours)?;
        if node.output_tensors.get(history.slot).map(|t| t.id) != Some(tensor.id) {
            bail!(not_ours())
        }
        Ok(node)
    }

    /// Applies a single-input single-output layer.
    pub fn chain(&mut self, layer: LayerId, input: &TensorHandle) -> TesselResult<TensorHandle> {
        let mut outputs = self.wire(layer, std::slice::from_ref(input))?;
        if outputs.len() != 1 {
            bail!(GraphError::InputCountMismatch {
                what: format!("output(s) from `{}`", self.layers[layer.0].name),
                expected: 1,
                got: outputs.len(),
            })
        }
        outputs.pop().context("No output")
    }

    /// Applies a layer to tensor handles.
    ///
    /// If all inputs have history, a node is recorded and outputs are stamped
    /// with their provenance. Otherwise, the call is off-graph: shapes and
    /// masks are propagated but the outputs have no history.
    pub fn wire(
        &mut self,
        layer: LayerId,
        inputs: &[TensorHandle],
    ) -> TesselResult<TVec<TensorHandle>> {
        let name = self.layers[layer.0].name.clone();
        self.wire_inner(layer, inputs).with_context(|| format!("Wiring layer `{name}`"))
    }

    fn wire_inner(
        &mut self,
        layer: LayerId,
        inputs: &[TensorHandle],
    ) -> TesselResult<TVec<TensorHandle>> {
        let facts: TVec<TypedFact> = inputs.iter().map(|i| i.fact.clone()).collect();
        let facts: TVec<&TypedFact> = facts.iter().collect();
        {
            let entry = &self.layers[layer.0];
            trace!("Wiring {} on {:?}", entry, inputs.iter().map(|i| i.id).collect::<Vec<_>>());
            if inputs.is_empty() && !entry.inbound_nodes.is_empty() {
                bail!("Source layer `{}` is already connected", entry.name)
            }
            for (ix, input) in inputs.iter().enumerate() {
                if input.mask.is_some() && !entry.layer.supports_masking() {
                    bail!(GraphError::MaskingUnsupported { layer: entry.name.clone(), input: ix })
                }
            }
        }
        self.check_inputs(layer, &facts)?;
        if !self.layers[layer.0].built {
            let entry = &mut self.layers[layer.0];
            debug!("Building {} for {:?}", entry, facts);
            entry.layer.build(&facts)?;
            entry.built = true;
            self.check_inputs(layer, &facts)?;
        }

        let entry = &self.layers[layer.0];
        let shapes: TVec<&ShapeFact> = facts.iter().map(|f| &f.shape).collect();
        let output_shapes = entry.layer.compute_output_shape(&shapes)?;
        let datum_type = entry.layer.output_datum_type(&facts);
        let input_masks: TVec<Option<TypedFact>> = inputs.iter().map(|i| i.mask.clone()).collect();
        let mut output_masks = {
            let masks_ref: TVec<Option<&TypedFact>> = input_masks.iter().map(|m| m.as_ref()).collect();
            entry.layer.compute_mask_fact(&facts, &masks_ref)?
        };
        if output_masks.is_empty() {
            output_masks = tvec!(None; output_shapes.len());
        }
        if output_masks.len() != output_shapes.len() {
            bail!(GraphError::ShapeMaskCountMismatch {
                layer: entry.name.clone(),
                outputs: output_shapes.len(),
                shapes: output_shapes.len(),
                masks: output_masks.len(),
            })
        }
        let uses_learning_phase =
            entry.layer.uses_learning_phase() || inputs.iter().any(|i| i.uses_learning_phase);

        let on_graph = inputs.iter().all(|i| i.history.is_some());
        let mut producers = tvec!();
        if on_graph {
            for input in inputs {
                producers.push(self.producer(input)?.id);
            }
        }
        let node_index = self.layers[layer.0].inbound_nodes.len();
        let outputs: TVec<TensorHandle> = output_shapes
            .iter()
            .zip(output_masks.iter())
            .enumerate()
            .map(|(slot, (shape, mask))| TensorHandle {
                id: self.new_tensor_id(),
                fact: TypedFact::dt_shape(datum_type, shape.clone()),
                mask: mask.clone(),
                history: on_graph.then(|| History::new(layer, node_index, slot)),
                uses_learning_phase,
            })
            .collect();
        if !on_graph {
            trace!("Off-graph call of {}", self.layers[layer.0]);
            return Ok(outputs);
        }

        let id = NodeId(self.nodes.len());
        let depth = producers.iter().map(|p| self.nodes[p.0].depth + 1).max().unwrap_or(0);
        let histories: TVec<History> = inputs.iter().filter_map(|i| i.history).collect();
        let node = Node {
            id,
            outbound_layer: layer,
            inbound_layers: histories.iter().map(|h| h.layer).collect(),
            node_indices: histories.iter().map(|h| h.node_index).collect(),
            tensor_indices: histories.iter().map(|h| h.slot).collect(),
            input_tensors: inputs.iter().cloned().collect(),
            output_tensors: outputs.clone(),
            input_masks,
            output_masks,
            input_shapes: shapes.into_iter().cloned().collect(),
            output_shapes,
            depth,
        };
        trace!("Recorded node {}", node);
        for h in &histories {
            self.layers[h.layer.0].outbound_nodes.push(id);
        }
        self.layers[layer.0].inbound_nodes.push(id);
        self.nodes.push(node);
        Ok(outputs)
    }

    /// Runs the input specs and the layer specific checks of a layer.
    pub(crate) fn check_inputs(&self, layer: LayerId, facts: &[&TypedFact]) -> TesselResult<()> {
        let entry = &self.layers[layer.0];
        let incompatible = |input: usize, constraint: String| GraphError::IncompatibleInput {
            layer: entry.name.clone(),
            input,
            constraint,
        };
        let specs = entry.layer.input_specs();
        if !specs.is_empty() {
            if specs.len() != facts.len() {
                bail!(incompatible(
                    facts.len().min(specs.len()),
                    format!("expects {} input(s), got {}", specs.len(), facts.len())
                ))
            }
            for (ix, (spec, fact)) in specs.iter().zip(facts.iter()).enumerate() {
                spec.check(fact).map_err(|c| incompatible(ix, c))?;
            }
        }
        entry.layer.check_inputs(facts).map_err(|m| incompatible(m.input, m.constraint))?;
        Ok(())
    }

    /// Eagerly applies a layer to concrete tensors, off-graph. The layer is
    /// built from the tensors shapes if needed.
    pub fn eval(
        &mut self,
        layer: LayerId,
        inputs: TVec<Arc<Tensor>>,
        phase: LearningPhase,
    ) -> TesselResult<TVec<Arc<Tensor>>> {
        let name = self.layers[layer.0].name.clone();
        self.eval_inner(layer, inputs, phase).with_context(|| format!("Evaluating layer `{name}`"))
    }

    fn eval_inner(
        &mut self,
        layer: LayerId,
        inputs: TVec<Arc<Tensor>>,
        phase: LearningPhase,
    ) -> TesselResult<TVec<Arc<Tensor>>> {
        let facts: TVec<TypedFact> = inputs.iter().map(|t| TypedFact::from_tensor(t)).collect();
        let facts: TVec<&TypedFact> = facts.iter().collect();
        self.check_inputs(layer, &facts)?;
        if !self.layers[layer.0].built {
            let entry = &mut self.layers[layer.0];
            entry.layer.build(&facts)?;
            entry.built = true;
            self.check_inputs(layer, &facts)?;
        }
        let masks = tvec!(None; inputs.len());
        self.layers[layer.0].layer.call(inputs, &masks, phase)
    }

    fn node_at(&self, layer: LayerId, node_index: usize) -> TesselResult<&Node> {
        let entry = &self.layers[layer.0];
        match entry.inbound_nodes.get(node_index) {
            Some(id) => Ok(&self.nodes[id.0]),
            None => bail!(GraphError::NodeIndexOutOfRange {
                layer: entry.name.clone(),
                index: node_index,
                count: entry.inbound_nodes.len(),
            }),
        }
    }

    fn single_node(&self, layer: LayerId, what: &str) -> TesselResult<&Node> {
        let entry = &self.layers[layer.0];
        match entry.inbound_nodes.len() {
            0 => bail!(GraphError::NotBuilt { layer: entry.name.clone(), what: what.to_string() }),
            1 => Ok(&self.nodes[entry.inbound_nodes[0].0]),
            count => bail!(GraphError::MultipleInboundNodes { layer: entry.name.clone(), count }),
        }
    }

    /// Output handles of a layer applied exactly once.
    pub fn layer_output(&self, layer: LayerId) -> TesselResult<TVec<TensorHandle>> {
        Ok(self.single_node(layer, "output")?.output_tensors.clone())
    }

    /// Input handles of a layer applied exactly once.
    pub fn layer_input(&self, layer: LayerId) -> TesselResult<TVec<TensorHandle>> {
        Ok(self.single_node(layer, "input")?.input_tensors.clone())
    }

    pub fn layer_output_at(
        &self,
        layer: LayerId,
        node_index: usize,
    ) -> TesselResult<TVec<TensorHandle>> {
        Ok(self.node_at(layer, node_index)?.output_tensors.clone())
    }

    pub fn layer_input_at(
        &self,
        layer: LayerId,
        node_index: usize,
    ) -> TesselResult<TVec<TensorHandle>> {
        Ok(self.node_at(layer, node_index)?.input_tensors.clone())
    }

    pub fn output_shape_at(&self, layer: LayerId, node_index: usize) -> TesselResult<TVec<ShapeFact>> {
        Ok(self.node_at(layer, node_index)?.output_shapes.clone())
    }

    pub fn input_shape_at(&self, layer: LayerId, node_index: usize) -> TesselResult<TVec<ShapeFact>> {
        Ok(self.node_at(layer, node_index)?.input_shapes.clone())
    }

    #[cfg(not(all(debug_assertions, feature = "paranoid_assertions")))]
    #[inline]
    pub fn check_edges(&self) -> TesselResult<()> {
        Ok(())
    }

    /// Performs a sanity check on node and layer links.
    #[cfg(all(debug_assertions, feature = "paranoid_assertions"))]
    pub fn check_edges(&self) -> TesselResult<()> {
        for node in &self.nodes {
            if !self.layers[node.outbound_layer.0].inbound_nodes.contains(&node.id) {
                bail!("Node {} not registered in its layer inbound nodes", node.id)
            }
            for (ix, input) in node.input_tensors.iter().enumerate() {
                let inbound = &self.layers[node.inbound_layers[ix].0];
                let prec = &self.nodes[inbound.inbound_nodes[node.node_indices[ix]].0];
                if prec.output_tensors[node.tensor_indices[ix]].id != input.id {
                    bail!("Mismatched oncoming edge, node:{} input:{} from {}", node.id, ix, prec)
                }
                if !inbound.outbound_nodes.contains(&node.id) {
                    bail!("Node {} missing from {} outbound nodes", node.id, inbound)
                }
                if prec.depth >= node.depth {
                    bail!("Node {} at depth {} consumes {} at depth {}", node.id, node.depth, prec.id, prec.depth)
                }
            }
        }
        Ok(())
    }
}
