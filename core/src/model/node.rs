use crate::internal::*;
use std::fmt;
use tessel_data::tessel_itertools::Itertools;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One application of a layer to a given set of input handles.
///
/// All the `inbound_*`, `*_indices`, `input_*` vectors have one entry per
/// input tensor, and the `output_*` ones one per output tensor. For every
/// input `i`, `input_tensors[i]` is the `tensor_indices[i]`-th output of the
/// `node_indices[i]`-th inbound node of `inbound_layers[i]`.
///
/// Nodes are created by `Graph::wire` and never change afterwards.
#[derive(Clone, Debug)]
pub struct Node {
    pub id: NodeId,
    pub outbound_layer: LayerId,
    pub inbound_layers: TVec<LayerId>,
    pub node_indices: TVec<usize>,
    pub tensor_indices: TVec<usize>,
    pub input_tensors: TVec<TensorHandle>,
    pub output_tensors: TVec<TensorHandle>,
    pub input_masks: TVec<Option<TypedFact>>,
    pub output_masks: TVec<Option<TypedFact>>,
    pub input_shapes: TVec<ShapeFact>,
    pub output_shapes: TVec<ShapeFact>,
    /// Longest path from a source node, at creation time.
    pub depth: usize,
}

impl Node {
    /// Source nodes have no inbound layer: they belong to an InputLayer.
    pub fn is_source(&self) -> bool {
        self.inbound_layers.is_empty()
    }

    pub fn input_ids(&self) -> impl Iterator<Item = TensorId> + '_ {
        self.input_tensors.iter().map(|t| t.id)
    }

    pub fn output_ids(&self) -> impl Iterator<Item = TensorId> + '_ {
        self.output_tensors.iter().map(|t| t.id)
    }

    /// Position of an output tensor in this node outputs.
    pub fn output_slot(&self, tensor: TensorId) -> Option<usize> {
        self.output_tensors.iter().position(|t| t.id == tensor)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} layer:{:?} [{}] -> [{}]",
            self.id,
            self.outbound_layer,
            self.input_shapes.iter().join(", "),
            self.output_shapes.iter().join(", ")
        )
    }
}
