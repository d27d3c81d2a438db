use crate::internal::*;

/// Re-creates layers and re-applies their nodes.
struct GraphBuilder<'a> {
    config: &'a ModelConfig,
    graph: Graph,
    layers: HashMap<&'a str, LayerId>,
    /// Outputs of re-created nodes, by layer name and node index.
    outputs: HashMap<(&'a str, usize), TVec<TensorHandle>>,
}

impl<'a> GraphBuilder<'a> {
    fn new(config: &'a ModelConfig) -> GraphBuilder<'a> {
        GraphBuilder { config, graph: Graph::default(), layers: HashMap::new(), outputs: HashMap::new() }
    }

    fn instantiate(&mut self, registry: &Registry) -> TesselResult<()> {
        let config = self.config;
        for layer in &config.layers {
            if self.layers.contains_key(layer.name.as_str()) {
                bail!(GraphError::DuplicateLayerName { name: layer.name.clone(), count: 2 })
            }
            let mut config = layer.config.clone();
            let mut trainable = true;
            if let Some(object) = config.as_object_mut() {
                object.remove("name");
                if let Some(t) = object.remove("trainable") {
                    trainable = t.as_bool().unwrap_or(true);
                }
            }
            let instance = registry
                .instantiate(&layer.class_name, &config)
                .with_context(|| format!("Creating layer `{}`", layer.name))?;
            let id = self.graph.add_named_layer(layer.name.clone(), instance);
            self.graph.set_trainable(id, trainable);
            self.layers.insert(layer.name.as_str(), id);
            if self.graph.layer(id).is_input() {
                let outputs = self.graph.wire(id, &[])?;
                self.outputs.insert((layer.name.as_str(), 0), outputs);
            }
        }
        Ok(())
    }

    fn resolve(&self, layer: &str, r: &InboundRef) -> TesselResult<Option<TensorHandle>> {
        if !self.layers.contains_key(r.layer()) {
            bail!(GraphError::MissingLayerReference {
                layer: layer.to_string(),
                missing: r.layer().to_string(),
            })
        }
        let Some(outputs) = self.outputs.get(&(r.layer(), r.node_index())) else {
            return Ok(None);
        };
        let tensor = outputs
            .get(r.slot())
            .with_context(|| format!("`{layer}` references {r}, which has {} outputs", outputs.len()))?;
        Ok(Some(tensor.clone()))
    }

    /// Creates as many pending nodes of a layer as possible, in order.
    /// Returns the number of nodes created.
    fn advance(
        &mut self,
        layer: &'a LayerConfig,
        pending: &mut &'a [Option<Vec<InboundRef>>],
    ) -> TesselResult<usize> {
        let id = self.layers[layer.name.as_str()];
        let mut remaining: &'a [Option<Vec<InboundRef>>] = *pending;
        let mut created = 0;
        'nodes: while let Some((node, rest)) = remaining.split_first() {
            if let Some(refs) = node {
                let mut inputs: TVec<TensorHandle> = tvec!();
                for r in refs {
                    match self.resolve(&layer.name, r)? {
                        Some(tensor) => inputs.push(tensor),
                        None => break 'nodes,
                    }
                }
                let node_index = self.graph.layer(id).inbound_nodes.len();
                let outputs = self.graph.wire(id, &inputs)?;
                trace!("Re-created {}_ib-{}", layer.name, node_index);
                self.outputs.insert((layer.name.as_str(), node_index), outputs);
                created += 1;
            }
            remaining = rest;
        }
        *pending = remaining;
        Ok(created)
    }

    /// Passes over the layers until every node is re-created. A node
    /// depending on a node not re-created yet is deferred to the next pass.
    fn connect(&mut self) -> TesselResult<()> {
        let config = self.config;
        let mut pending: Vec<&'a [Option<Vec<InboundRef>>]> =
            config.layers.iter().map(|l| l.inbound_nodes.as_slice()).collect();
        let mut passes = 0;
        loop {
            passes += 1;
            let mut created = 0;
            for (layer, pending) in config.layers.iter().zip(pending.iter_mut()) {
                created += self.advance(layer, pending)?;
            }
            if pending.iter().all(|p| p.is_empty()) {
                debug!("Connected {} layers in {} pass(es)", config.layers.len(), passes);
                return Ok(());
            }
            if created == 0 {
                let (layer, stuck) = config
                    .layers
                    .iter()
                    .zip(pending.iter())
                    .find(|(_, p)| !p.is_empty())
                    .context("No pending node")?;
                let missing = stuck
                    .iter()
                    .flatten()
                    .flatten()
                    .find(|r| !self.outputs.contains_key(&(r.layer(), r.node_index())))
                    .map(|r| r.to_string())
                    .unwrap_or_default();
                bail!(GraphError::MissingLayerReference { layer: layer.name.clone(), missing })
            }
        }
    }

    fn handles(&self, refs: &[InboundRef], what: &str) -> TesselResult<TVec<TensorHandle>> {
        refs.iter()
            .map(|r| self.resolve(what, r)?.with_context(|| format!("{what} {r} was not created")))
            .collect()
    }
}

/// Re-creates a container from its description. Layers are fresh and built
/// from the recorded topology: weights are not restored.
pub fn from_config(config: &ModelConfig, registry: &Registry) -> TesselResult<Container> {
    let mut builder = GraphBuilder::new(config);
    builder.instantiate(registry)?;
    builder.connect()?;
    let inputs = builder.handles(&config.input_layers, "input")?;
    let outputs = builder.handles(&config.output_layers, "output")?;
    Ok(Container::new(&builder.graph, &inputs, &outputs)?.with_name(config.name.clone()))
}

pub fn from_json(json: &str, registry: &Registry) -> TesselResult<Container> {
    let config: ModelConfig = serde_json::from_str(json)?;
    from_config(&config, registry)
}
