//! Nested-record description of a `Container`: layers with their class and
//! configuration, and the connectivity of every node as
//! `[layer_name, node_index, slot]` triples.
//!
//! Weights are not part of the description. A deserialized container has
//! freshly built layers, with the same topology and sharing as the original.
#[macro_use]
extern crate log;

pub mod deser;
pub mod format;
pub mod registry;
pub mod ser;

pub use deser::{from_config, from_json};
pub use format::{InboundRef, LayerConfig, ModelConfig};
pub use registry::Registry;
pub use ser::{to_config, to_json};

pub mod internal {
    pub use crate::format::*;
    pub use crate::registry::Registry;
    pub use tessel_core::internal::*;
}
