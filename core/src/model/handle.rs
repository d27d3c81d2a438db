use crate::internal::*;
use std::fmt;

/// Identity of a tensor handle, unique within its `Graph`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TensorId(pub usize);

impl fmt::Display for TensorId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Where a tensor handle comes from: the layer that produced it, the
/// position of the producing node in that layer inbound nodes, and the
/// output slot of that node.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, new)]
pub struct History {
    pub layer: LayerId,
    pub node_index: usize,
    pub slot: usize,
}

/// A symbolic tensor: graph provenance, shape, type and mask information.
///
/// Handles are immutable once created. A handle without history is
/// off-graph: it can be fed to layers (shapes are still propagated), but no
/// node will be recorded for such calls, and it can not be used as a
/// container input.
#[derive(Clone, Debug)]
pub struct TensorHandle {
    pub id: TensorId,
    pub fact: TypedFact,
    pub mask: Option<TypedFact>,
    pub history: Option<History>,
    pub uses_learning_phase: bool,
}

impl TensorHandle {
    pub fn shape(&self) -> &ShapeFact {
        &self.fact.shape
    }

    pub fn datum_type(&self) -> DatumType {
        self.fact.datum_type
    }

    pub fn rank(&self) -> usize {
        self.fact.rank()
    }

    pub fn is_on_graph(&self) -> bool {
        self.history.is_some()
    }
}

impl PartialEq for TensorHandle {
    fn eq(&self, other: &TensorHandle) -> bool {
        self.id == other.id
    }
}

impl Eq for TensorHandle {}

impl std::hash::Hash for TensorHandle {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state)
    }
}
