//! ## Layer graphs
//!
//! A `Graph` is the building context: an arena of layers (`LayerEntry`) and
//! of the nodes recording each of their applications. Tensor handles carry
//! their history as `(layer, node_index, slot)`, so nodes, layers and handles
//! refer to each other through ids rather than references.
//!
//! A `Container` compiles the part of a graph between some input and output
//! handles into a depth-ordered plan that can be replayed on concrete
//! tensors.
#[macro_use]
mod fact;
mod cache;
mod container;
mod graph;
mod handle;
mod layer;
mod node;
pub mod order;
mod sequential;

pub use self::cache::{BoundedCache, InputKey};
pub use self::container::{Container, ContainerOptions, LayerRef};
pub use self::fact::{ShapeFact, TypedFact};
pub use self::graph::{Graph, LayerEntry};
pub use self::handle::{History, TensorHandle, TensorId};
pub use self::layer::{
    check_input_arity, InputMismatch, InputSpec, Layer, LayerId, LearningPhase,
};
pub use self::node::{Node, NodeId};
pub use self::sequential::Sequential;
