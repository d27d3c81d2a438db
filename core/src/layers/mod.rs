//! Built-in layers.
//!
//! The graph engine knows nothing about them: they are plain `Layer`
//! implementations.
mod activation;
mod dense;
mod dropout;
mod embedding;
mod input;
mod masking;
mod merge;

pub use activation::{Activation, ActivationFn};
pub use dense::Dense;
pub use dropout::Dropout;
pub use embedding::Embedding;
pub use input::InputLayer;
pub use masking::Masking;
pub use merge::{Merge, MergeMode};
