use crate::internal::*;
use serde::{Deserialize, Serialize};

/// Source of a graph. It has exactly one node, with no inputs, whose single
/// output is fed at replay time.
#[derive(Clone, Debug, PartialEq, new)]
pub struct InputLayer {
    pub fact: TypedFact,
}

#[derive(Serialize, Deserialize)]
struct InputLayerConfig {
    batch_input_shape: Vec<Option<usize>>,
    #[serde(default = "default_dtype")]
    dtype: String,
}

fn default_dtype() -> String {
    DatumType::F32.name().to_string()
}

impl InputLayer {
    pub fn from_config(config: &serde_json::Value) -> TesselResult<InputLayer> {
        let config: InputLayerConfig = serde_json::from_value(config.clone())?;
        Ok(InputLayer::new(TypedFact::dt_shape(
            config.dtype.parse()?,
            ShapeFact::from(config.batch_input_shape),
        )))
    }
}

impl Layer for InputLayer {
    fn class_name(&self) -> &'static str {
        "InputLayer"
    }

    fn name_prefix(&self) -> String {
        "input".to_string()
    }

    fn check_inputs(&self, inputs: &[&TypedFact]) -> Result<(), InputMismatch> {
        check_input_arity(inputs, 0)
    }

    fn compute_output_shape(&self, _inputs: &[&ShapeFact]) -> TesselResult<TVec<ShapeFact>> {
        Ok(tvec!(self.fact.shape.clone()))
    }

    fn output_datum_type(&self, _inputs: &[&TypedFact]) -> DatumType {
        self.fact.datum_type
    }

    fn call(
        &self,
        _inputs: TVec<Arc<Tensor>>,
        _masks: &[Option<Arc<Tensor>>],
        _phase: LearningPhase,
    ) -> TesselResult<TVec<Arc<Tensor>>> {
        bail!("InputLayer values are fed, not computed")
    }

    fn config(&self) -> TesselResult<serde_json::Value> {
        Ok(serde_json::to_value(InputLayerConfig {
            batch_input_shape: self.fact.shape.to_vec(),
            dtype: self.fact.datum_type.name().to_string(),
        })?)
    }
}
