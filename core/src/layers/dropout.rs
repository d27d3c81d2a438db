use crate::internal::*;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Randomly zeroes a fraction `rate` of its input during training, scaling
/// the rest. Identity at inference.
#[derive(Clone, Debug, PartialEq, new, Serialize, Deserialize)]
pub struct Dropout {
    pub rate: f32,
}

impl Dropout {
    pub fn from_config(config: &serde_json::Value) -> TesselResult<Dropout> {
        let dropout: Dropout = serde_json::from_value(config.clone())?;
        ensure!((0.0..1.0).contains(&dropout.rate), "Dropout rate must be in [0, 1), got {}", dropout.rate);
        Ok(dropout)
    }
}

impl Layer for Dropout {
    fn class_name(&self) -> &'static str {
        "Dropout"
    }

    fn check_inputs(&self, inputs: &[&TypedFact]) -> Result<(), InputMismatch> {
        check_input_arity(inputs, 1)
    }

    fn compute_output_shape(&self, inputs: &[&ShapeFact]) -> TesselResult<TVec<ShapeFact>> {
        Ok(inputs.iter().map(|s| (*s).clone()).collect())
    }

    fn call(
        &self,
        mut inputs: TVec<Arc<Tensor>>,
        _masks: &[Option<Arc<Tensor>>],
        phase: LearningPhase,
    ) -> TesselResult<TVec<Arc<Tensor>>> {
        let input = inputs.remove(0);
        if phase == LearningPhase::Inference || self.rate <= 0.0 {
            return Ok(tvec!(input));
        }
        let keep = 1.0 - self.rate;
        let mut rng = rand::thread_rng();
        let mut x = input.to_array_view::<f32>()?.to_owned();
        x.mapv_inplace(|v| if rng.r#gen::<f32>() < keep { v / keep } else { 0.0 });
        Ok(tvec!(x.into_arc_tensor()))
    }

    fn supports_masking(&self) -> bool {
        true
    }

    fn uses_learning_phase(&self) -> bool {
        true
    }

    fn config(&self) -> TesselResult<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}
