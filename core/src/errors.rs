//! Typed failures of graph construction, build order and replay.
//!
//! Fallible functions return `TesselResult` and raise these with `bail!`, so
//! that `anyhow` context frames can be stacked on top. Callers can recover
//! the kind with `error.downcast_ref::<GraphError>()`.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("Tensor {tensor} is passed more than once as a container input")]
    DuplicateInput { tensor: String },

    #[error("Tensor {tensor} has no graph history: it was not produced by a layer of this graph")]
    NotAGraphTensor { tensor: String },

    #[error("Container input {tensor} is produced by layer `{layer}`, which is not an InputLayer")]
    NonSourceInput { tensor: String, layer: String },

    #[error(
        "Graph disconnected: cannot obtain value for tensor {tensor} at layer `{layer}`. \
         Declared inputs: [{inputs}]"
    )]
    Disconnected { tensor: String, layer: String, inputs: String },

    #[error("The name `{name}` is used {count} times in the model. All layer names should be unique")]
    DuplicateLayerName { name: String, count: usize },

    #[error("Input {input} of layer `{layer}` is incompatible: {constraint}")]
    IncompatibleInput { layer: String, input: usize, constraint: String },

    #[error("Layer `{layer}` does not support masking, but was passed an input mask on input {input}")]
    MaskingUnsupported { layer: String, input: usize },

    #[error("Layer `{layer}` produced {outputs} outputs, {shapes} shapes and {masks} masks")]
    ShapeMaskCountMismatch { layer: String, outputs: usize, shapes: usize, masks: usize },

    #[error("Layer `{layer}` is not built: {what} is only available once the layer is connected")]
    NotBuilt { layer: String, what: String },

    #[error("Layer `{layer}` has {count} inbound nodes, use an indexed accessor")]
    MultipleInboundNodes { layer: String, count: usize },

    #[error("Layer `{layer}` has {count} inbound nodes, node {index} was requested")]
    NodeIndexOutOfRange { layer: String, index: usize, count: usize },

    #[error("Layer `{layer}` expects {expected} weight tensors, got {got}")]
    WeightCountMismatch { layer: String, expected: usize, got: usize },

    #[error("Weight `{weight}` of layer `{layer}` has shape {expected:?}, provided value has {got:?}")]
    WeightShapeMismatch { layer: String, weight: String, expected: Vec<usize>, got: Vec<usize> },

    #[error("Layer `{layer}` references inbound layer `{missing}`, which is not available")]
    MissingLayerReference { layer: String, missing: String },

    #[error("Unknown layer class `{class}`")]
    UnknownLayerClass { class: String },

    #[error("Replay is missing the value of tensor {tensor}, required by layer `{layer}`")]
    MissingReplayInput { tensor: String, layer: String },

    #[error("Expected {expected} {what}, got {got}")]
    InputCountMismatch { what: String, expected: usize, got: usize },

    #[error("No layer found for {0}")]
    UnknownLayer(String),
}

impl GraphError {
    /// Finds the typed kind in an error chain, if any.
    pub fn find(error: &anyhow::Error) -> Option<&GraphError> {
        error.chain().find_map(|e| e.downcast_ref::<GraphError>())
    }
}
