//! Replay of a frozen topology on concrete tensors.
use crate::internal::*;

/// Values flowing during a replay: a tensor and its optional mask.
pub type TensorValue = (Arc<Tensor>, Option<Arc<Tensor>>);

/// A depth-ordered list of nodes to run, with the bookkeeping needed to
/// release intermediate values as soon as their last consumer has run.
#[derive(Clone, Debug)]
pub struct ReplayPlan {
    pub inputs: Vec<TensorId>,
    pub outputs: Vec<TensorId>,
    pub order: Vec<NodeId>,
    /// Tensors that can be dropped after each step.
    pub flush_lists: Vec<TVec<TensorId>>,
}

impl ReplayPlan {
    /// `order` must be sorted by depth. Source nodes are skipped: their
    /// outputs are fed by the caller.
    pub fn new(
        graph: &Graph,
        inputs: &[TensorId],
        outputs: &[TensorId],
        order: &[NodeId],
    ) -> TesselResult<ReplayPlan> {
        let order: Vec<NodeId> =
            order.iter().copied().filter(|n| !graph.node(*n).is_source()).collect();
        let mut values_needed_until_step: HashMap<TensorId, usize> = HashMap::new();
        for (step, n) in order.iter().enumerate() {
            for input in graph.node(*n).input_ids() {
                values_needed_until_step.insert(input, step);
            }
        }
        for o in outputs {
            values_needed_until_step.insert(*o, order.len());
        }
        let mut flush_lists: Vec<TVec<TensorId>> = vec![tvec!(); order.len() + 1];
        for (tensor, step) in values_needed_until_step {
            flush_lists[step].push(tensor);
        }
        for list in &mut flush_lists {
            list.sort();
        }
        Ok(ReplayPlan { inputs: inputs.to_vec(), outputs: outputs.to_vec(), order, flush_lists })
    }

    /// Runs every step, returning the output values in declaration order.
    pub fn run(
        &self,
        graph: &Graph,
        inputs: TVec<TensorValue>,
        phase: LearningPhase,
    ) -> TesselResult<TVec<TensorValue>> {
        if inputs.len() != self.inputs.len() {
            bail!(GraphError::InputCountMismatch {
                what: "input tensor(s)".into(),
                expected: self.inputs.len(),
                got: inputs.len(),
            })
        }
        let mut values: HashMap<TensorId, TensorValue> =
            self.inputs.iter().copied().zip(inputs).collect();
        for (step, n) in self.order.iter().enumerate() {
            let node = graph.node(*n);
            let entry = graph.layer(node.outbound_layer);
            trace!("Replaying step {}, node {} ({})", step, node.id, entry.name);
            let mut tensors: TVec<Arc<Tensor>> = tvec!();
            let mut masks: TVec<Option<Arc<Tensor>>> = tvec!();
            for input in node.input_tensors.iter() {
                let Some((tensor, mask)) = values.get(&input.id) else {
                    bail!(GraphError::MissingReplayInput {
                        tensor: input.id.to_string(),
                        layer: entry.name.clone(),
                    })
                };
                tensors.push(tensor.clone());
                masks.push(mask.clone());
            }
            let facts: TVec<TypedFact> = tensors
                .iter()
                .map(|t| TypedFact::dt_shape(t.datum_type(), ShapeFact::from_concrete(t.shape())))
                .collect();
            graph.check_inputs(node.outbound_layer, &facts.iter().collect::<TVec<_>>())?;
            let vs = eval_node(entry, node, tensors, &masks, phase)?;
            for (ix, v) in vs.into_iter().enumerate() {
                values.insert(node.output_tensors[ix].id, v);
            }
            for flush in &self.flush_lists[step] {
                if !self.outputs.contains(flush) {
                    values.remove(flush);
                }
            }
        }
        let mut result = tvec!();
        for output in &self.outputs {
            trace!("Extracting value {}", output);
            let value = values.get(output).cloned().ok_or_else(|| {
                GraphError::MissingReplayInput { tensor: output.to_string(), layer: "<output>".into() }
            })?;
            result.push(value);
        }
        Ok(result)
    }

    /// Shape only replay, for input shapes that may differ from the ones
    /// the graph was built with. Every node validates its inputs the way
    /// it does when wired, with the datum types recorded at wiring time.
    pub fn infer_shapes(
        &self,
        graph: &Graph,
        input_shapes: &[ShapeFact],
    ) -> TesselResult<TVec<ShapeFact>> {
        if input_shapes.len() != self.inputs.len() {
            bail!(GraphError::InputCountMismatch {
                what: "input shape(s)".into(),
                expected: self.inputs.len(),
                got: input_shapes.len(),
            })
        }
        let mut shapes: HashMap<TensorId, ShapeFact> =
            self.inputs.iter().copied().zip(input_shapes.iter().cloned()).collect();
        for n in &self.order {
            let node = graph.node(*n);
            let entry = graph.layer(node.outbound_layer);
            let mut facts: TVec<TypedFact> = tvec!();
            for input in node.input_tensors.iter() {
                let shape = shapes.get(&input.id).ok_or_else(|| GraphError::MissingReplayInput {
                    tensor: input.id.to_string(),
                    layer: entry.name.clone(),
                })?;
                facts.push(TypedFact::dt_shape(input.fact.datum_type, shape.clone()));
            }
            let facts: TVec<&TypedFact> = facts.iter().collect();
            graph.check_inputs(node.outbound_layer, &facts)?;
            let inputs: TVec<&ShapeFact> = facts.iter().map(|f| &f.shape).collect();
            let outputs = entry
                .layer
                .compute_output_shape(&inputs)
                .with_context(|| format!("Inferring shapes of layer `{}`", entry.name))?;
            for (ix, shape) in outputs.into_iter().enumerate() {
                shapes.insert(node.output_tensors[ix].id, shape);
            }
        }
        self.outputs
            .iter()
            .map(|o| shapes.get(o).cloned().with_context(|| format!("No shape for {o}")))
            .collect()
    }
}

fn eval_node(
    entry: &LayerEntry,
    node: &Node,
    inputs: TVec<Arc<Tensor>>,
    masks: &[Option<Arc<Tensor>>],
    phase: LearningPhase,
) -> TesselResult<TVec<TensorValue>> {
    let output_masks = entry
        .layer
        .compute_mask(&inputs, masks)
        .with_context(|| format!("Computing mask of layer `{}`", entry.name))?;
    let outputs = entry
        .layer
        .call(inputs, masks, phase)
        .with_context(|| format!("Replaying layer `{}`", entry.name))?;
    let output_masks =
        if output_masks.is_empty() { tvec!(None; outputs.len()) } else { output_masks };
    if outputs.len() != node.output_tensors.len() || output_masks.len() != outputs.len() {
        bail!(GraphError::ShapeMaskCountMismatch {
            layer: entry.name.clone(),
            outputs: outputs.len(),
            shapes: node.output_tensors.len(),
            masks: output_masks.len(),
        })
    }
    if cfg!(debug_assertions) {
        for (ix, (v, handle)) in outputs.iter().zip(node.output_tensors.iter()).enumerate() {
            if !handle.fact.shape.matches(v.shape()) {
                bail!(
                    "Replaying {}: output {}, expected {}, got {:?}",
                    entry.name,
                    ix,
                    handle.fact,
                    v
                );
            }
        }
    }
    Ok(outputs.into_iter().zip(output_masks).collect())
}
