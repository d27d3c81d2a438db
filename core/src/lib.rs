//! # Tessel
//!
//! Symbolic layer graphs for neural network definitions.
//!
//! Layers are wired on tensor handles, each application recording a `Node`.
//! A `Container` is then compiled from a set of input and output handles: it
//! computes a depth-ordered topology once, and replays it on concrete tensors
//! as many times as needed.
//!
//! ## Example
//!
//! ```
//! # use tessel_core::prelude::*;
//! # use tessel_core::layers::Dense;
//! # fn main() -> TesselResult<()> {
//! let mut graph = Graph::default();
//! let x = graph.input(TypedFact::dt_shape(DatumType::F32, shapefact!(_, 32)))?;
//! let dense = graph.add_layer(Dense::new(16));
//! let y = graph.chain(dense, &x)?;
//! assert_eq!(y.shape(), &shapefact!(_, 16));
//!
//! let mut model = Container::new(&graph, &[x], &[y])?;
//! let outputs = model.call(tvec!(Tensor::zero::<f32>(&[4, 32]).into_arc_tensor()))?;
//! assert_eq!(outputs[0].shape(), &[4, 16]);
//! # Ok(())
//! # }
//! ```

#[macro_use]
extern crate derive_new;
#[macro_use]
extern crate log;

pub mod errors;
#[macro_use]
pub mod model;
pub mod initializers;
pub mod layers;
pub mod plan;
pub mod regularizers;
pub mod variable;

pub use downcast_rs;
pub use dyn_clone;
pub use serde_json;
pub use tessel_data;

pub mod prelude {
    pub use crate::errors::GraphError;
    pub use crate::model::{
        Container, ContainerOptions, Graph, LayerId, LearningPhase, NodeId, Sequential,
        ShapeFact, TensorHandle, TensorId, TypedFact,
    };
    pub use crate::shapefact;
    pub use tessel_data::prelude::*;
}

pub mod internal {
    pub use crate::errors::GraphError;
    pub use crate::initializers::Initializer;
    pub use crate::model::*;
    pub use crate::prelude::*;
    pub use crate::regularizers::{Constraint, Regularizer};
    pub use crate::variable::Variable;
    pub use tessel_data::internal::*;
}

#[cfg(test)]
pub(crate) fn setup_test_logger() {
    let _ = env_logger::Builder::from_env("TESSEL_LOG").try_init();
}
