use serde::{Deserialize, Serialize};
use std::fmt;

/// A reference to one output of one node: `[layer_name, node_index, slot]`.
///
/// The node index counts only the nodes of the layer that belong to the
/// serialized container.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InboundRef(pub String, pub usize, pub usize);

impl InboundRef {
    pub fn layer(&self) -> &str {
        &self.0
    }

    pub fn node_index(&self) -> usize {
        self.1
    }

    pub fn slot(&self) -> usize {
        self.2
    }
}

impl fmt::Display for InboundRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}[{}][{}]", self.0, self.1, self.2)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayerConfig {
    pub name: String,
    pub class_name: String,
    pub config: serde_json::Value,
    /// One entry per node, listing the node inputs. Source layers have no
    /// entry. `null` entries are tolerated and skipped when reading.
    #[serde(default)]
    pub inbound_nodes: Vec<Option<Vec<InboundRef>>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub name: String,
    pub layers: Vec<LayerConfig>,
    pub input_layers: Vec<InboundRef>,
    pub output_layers: Vec<InboundRef>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_ref_is_a_triple() {
        let r = InboundRef("dense_1".into(), 0, 1);
        assert_eq!(serde_json::to_value(&r).unwrap(), serde_json::json!(["dense_1", 0, 1]));
        let back: InboundRef = serde_json::from_str(r#"["merge_1", 2, 0]"#).unwrap();
        assert_eq!(back.layer(), "merge_1");
        assert_eq!(back.node_index(), 2);
    }

    #[test]
    fn null_nodes() {
        let layer: LayerConfig = serde_json::from_value(serde_json::json!({
            "name": "dense_1",
            "class_name": "Dense",
            "config": {"units": 3},
            "inbound_nodes": [null, [["input_1", 0, 0]]],
        }))
        .unwrap();
        assert_eq!(layer.inbound_nodes.len(), 2);
        assert!(layer.inbound_nodes[0].is_none());
    }
}
