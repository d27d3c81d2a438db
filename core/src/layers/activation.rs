use crate::internal::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tessel_data::tessel_ndarray::{ArrayD, Axis};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationFn {
    #[default]
    Linear,
    Relu,
    Sigmoid,
    Tanh,
    Softmax,
}

impl ActivationFn {
    pub fn apply(&self, mut x: ArrayD<f32>) -> ArrayD<f32> {
        match self {
            ActivationFn::Linear => (),
            ActivationFn::Relu => x.mapv_inplace(|x| x.max(0.0)),
            ActivationFn::Sigmoid => x.mapv_inplace(|x| 1.0 / (1.0 + (-x).exp())),
            ActivationFn::Tanh => x.mapv_inplace(f32::tanh),
            ActivationFn::Softmax => {
                if x.ndim() > 0 {
                    let axis = Axis(x.ndim() - 1);
                    for mut lane in x.lanes_mut(axis) {
                        let max = lane.fold(f32::NEG_INFINITY, |m, v| m.max(*v));
                        lane.mapv_inplace(|v| (v - max).exp());
                        let sum = lane.sum();
                        lane.mapv_inplace(|v| v / sum);
                    }
                }
            }
        }
        x
    }
}

impl fmt::Display for ActivationFn {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            ActivationFn::Linear => "linear",
            ActivationFn::Relu => "relu",
            ActivationFn::Sigmoid => "sigmoid",
            ActivationFn::Tanh => "tanh",
            ActivationFn::Softmax => "softmax",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ActivationFn {
    type Err = TesselError;
    fn from_str(s: &str) -> TesselResult<ActivationFn> {
        Ok(match s {
            "linear" => ActivationFn::Linear,
            "relu" => ActivationFn::Relu,
            "sigmoid" => ActivationFn::Sigmoid,
            "tanh" => ActivationFn::Tanh,
            "softmax" => ActivationFn::Softmax,
            _ => bail!("Unknown activation: {}", s),
        })
    }
}

/// Applies an activation function elementwise.
#[derive(Clone, Debug, PartialEq, new, Serialize, Deserialize)]
pub struct Activation {
    pub activation: ActivationFn,
}

impl Activation {
    pub fn from_config(config: &serde_json::Value) -> TesselResult<Activation> {
        Ok(serde_json::from_value(config.clone())?)
    }
}

impl Layer for Activation {
    fn class_name(&self) -> &'static str {
        "Activation"
    }

    fn compute_output_shape(&self, inputs: &[&ShapeFact]) -> TesselResult<TVec<ShapeFact>> {
        Ok(inputs.iter().map(|s| (*s).clone()).collect())
    }

    fn check_inputs(&self, inputs: &[&TypedFact]) -> Result<(), InputMismatch> {
        check_input_arity(inputs, 1)?;
        if inputs[0].datum_type != DatumType::F32 {
            return Err(InputMismatch::new(0, format!("expected float32, found {}", inputs[0].datum_type)));
        }
        Ok(())
    }

    fn call(
        &self,
        inputs: TVec<Arc<Tensor>>,
        _masks: &[Option<Arc<Tensor>>],
        _phase: LearningPhase,
    ) -> TesselResult<TVec<Arc<Tensor>>> {
        let x = inputs[0].to_array_view::<f32>()?.to_owned();
        Ok(tvec!(self.activation.apply(x).into_arc_tensor()))
    }

    fn supports_masking(&self) -> bool {
        true
    }

    fn config(&self) -> TesselResult<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}
