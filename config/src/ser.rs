use crate::internal::*;
use std::collections::HashSet;
use tessel_core::layers::InputLayer;

/// Where the tensors of a container are serialized from.
struct Refs<'a> {
    model: &'a Container,
    /// Position of each container node among the container nodes of its layer.
    indices: HashMap<NodeId, usize>,
    /// Container inputs produced outside the container, with the name of
    /// the input layer standing for each of them.
    external: HashMap<TensorId, String>,
}

impl<'a> Refs<'a> {
    fn new(model: &'a Container) -> TesselResult<Refs<'a>> {
        let mut indices = HashMap::new();
        for layer in model.layers() {
            for (ix, node) in
                layer.inbound_nodes.iter().filter(|n| model.contains_node(**n)).enumerate()
            {
                indices.insert(*node, ix);
            }
        }
        let graph = model.graph();
        let mut taken: HashSet<String> = model.layers().map(|l| l.name.clone()).collect();
        let mut external = HashMap::new();
        for input in model.inputs() {
            let producer = graph.producer(input)?;
            if model.contains_node(producer.id) {
                continue;
            }
            let history = input.history.context("Container input without history")?;
            let mut name = format!(
                "{}_{}_{}",
                graph.layer(history.layer).name,
                history.node_index,
                history.slot
            );
            while taken.contains(&name) {
                name.push_str("_input");
            }
            debug!("Describing container input {} as input layer `{}`", input.id, name);
            taken.insert(name.clone());
            external.insert(input.id, name);
        }
        Ok(Refs { model, indices, external })
    }

    fn inbound_ref(&self, tensor: &TensorHandle) -> TesselResult<InboundRef> {
        if let Some(name) = self.external.get(&tensor.id) {
            return Ok(InboundRef(name.clone(), 0, 0));
        }
        let graph = self.model.graph();
        let producer = graph.producer(tensor)?;
        let layer = &graph.layer(producer.outbound_layer).name;
        let Some(index) = self.indices.get(&producer.id) else {
            bail!(
                "Tensor {} is produced by node {} of `{}`, which is not part of the container",
                tensor.id,
                producer.id,
                layer
            )
        };
        let slot =
            producer.output_slot(tensor.id).context("Tensor not found in its producer outputs")?;
        Ok(InboundRef(layer.clone(), *index, slot))
    }

    /// Input layers standing for the external inputs, in container input order.
    fn external_layers(&self) -> TesselResult<Vec<LayerConfig>> {
        let mut layers = vec![];
        for input in self.model.inputs() {
            if let Some(name) = self.external.get(&input.id) {
                layers.push(LayerConfig {
                    name: name.clone(),
                    class_name: "InputLayer".to_string(),
                    config: InputLayer::new(input.fact.clone()).config()?,
                    inbound_nodes: vec![],
                });
            }
        }
        Ok(layers)
    }
}

/// Describes a container: layers in container order, and their nodes
/// connectivity restricted to the container.
///
/// A container input that is not produced by an input layer is described
/// as an input layer of its own, so the description is self-contained.
pub fn to_config(model: &Container) -> TesselResult<ModelConfig> {
    let graph = model.graph();
    let refs = Refs::new(model)?;
    let mut layers = refs.external_layers()?;
    for layer in model.layers() {
        let mut config = layer.config()?;
        if let Some(object) = config.as_object_mut() {
            object.remove("name");
        }
        let mut inbound_nodes = vec![];
        for node in layer.inbound_nodes.iter().filter(|n| model.contains_node(**n)) {
            let node = graph.node(*node);
            if node.is_source() {
                continue;
            }
            let inputs = node
                .input_tensors
                .iter()
                .map(|t| refs.inbound_ref(t))
                .collect::<TesselResult<Vec<_>>>()
                .with_context(|| format!("Serializing {}", model.node_key(node.id)))?;
            inbound_nodes.push(Some(inputs));
        }
        layers.push(LayerConfig {
            name: layer.name.clone(),
            class_name: layer.class_name().to_string(),
            config,
            inbound_nodes,
        });
    }
    let input_layers =
        model.inputs().iter().map(|t| refs.inbound_ref(t)).collect::<TesselResult<_>>()?;
    let output_layers =
        model.outputs().iter().map(|t| refs.inbound_ref(t)).collect::<TesselResult<_>>()?;
    debug!("Serialized {} with {} layers", model.name(), layers.len());
    Ok(ModelConfig { name: model.name().to_string(), layers, input_layers, output_layers })
}

pub fn to_json(model: &Container) -> TesselResult<String> {
    Ok(serde_json::to_string_pretty(&to_config(model)?)?)
}
