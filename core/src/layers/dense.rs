use super::ActivationFn;
use crate::internal::*;
use serde::{Deserialize, Serialize};
use tessel_data::tessel_ndarray::{Ix1, Ix2, IxDyn};

/// Densely connected layer: `activation(x . kernel + bias)` on the last axis.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Dense {
    pub units: usize,
    #[serde(default)]
    pub activation: ActivationFn,
    #[serde(default = "yes")]
    pub use_bias: bool,
    #[serde(default)]
    pub kernel_initializer: Initializer,
    #[serde(default = "zeros")]
    pub bias_initializer: Initializer,
    #[serde(default)]
    pub kernel_regularizer: Option<Regularizer>,
    #[serde(default)]
    pub bias_regularizer: Option<Regularizer>,
    #[serde(default)]
    pub kernel_constraint: Option<Constraint>,
    #[serde(default)]
    pub bias_constraint: Option<Constraint>,
    #[serde(skip)]
    kernel: Option<Variable>,
    #[serde(skip)]
    bias: Option<Variable>,
}

fn yes() -> bool {
    true
}

fn zeros() -> Initializer {
    Initializer::Zeros
}

impl Dense {
    pub fn new(units: usize) -> Dense {
        Dense {
            units,
            activation: ActivationFn::Linear,
            use_bias: true,
            kernel_initializer: Initializer::GlorotUniform,
            bias_initializer: Initializer::Zeros,
            kernel_regularizer: None,
            bias_regularizer: None,
            kernel_constraint: None,
            bias_constraint: None,
            kernel: None,
            bias: None,
        }
    }

    pub fn with_activation(self, activation: ActivationFn) -> Dense {
        Dense { activation, ..self }
    }

    pub fn with_use_bias(self, use_bias: bool) -> Dense {
        Dense { use_bias, ..self }
    }

    pub fn with_kernel_initializer(self, kernel_initializer: Initializer) -> Dense {
        Dense { kernel_initializer, ..self }
    }

    pub fn with_kernel_regularizer(self, regularizer: Regularizer) -> Dense {
        Dense { kernel_regularizer: Some(regularizer), ..self }
    }

    pub fn with_bias_regularizer(self, regularizer: Regularizer) -> Dense {
        Dense { bias_regularizer: Some(regularizer), ..self }
    }

    pub fn with_kernel_constraint(self, constraint: Constraint) -> Dense {
        Dense { kernel_constraint: Some(constraint), ..self }
    }

    pub fn with_bias_constraint(self, constraint: Constraint) -> Dense {
        Dense { bias_constraint: Some(constraint), ..self }
    }

    pub fn from_config(config: &serde_json::Value) -> TesselResult<Dense> {
        Ok(serde_json::from_value(config.clone())?)
    }

    pub fn kernel(&self) -> Option<&Variable> {
        self.kernel.as_ref()
    }

    pub fn bias(&self) -> Option<&Variable> {
        self.bias.as_ref()
    }
}

impl Layer for Dense {
    fn class_name(&self) -> &'static str {
        "Dense"
    }

    fn input_specs(&self) -> TVec<InputSpec> {
        let spec = InputSpec::default().with_min_rank(2).with_datum_type(DatumType::F32);
        match &self.kernel {
            Some(kernel) => tvec!(spec.with_axis(-1, kernel.shape()[0])),
            None => tvec!(spec),
        }
    }

    fn build(&mut self, inputs: &[&TypedFact]) -> TesselResult<()> {
        let input_dim = inputs[0]
            .shape
            .last()
            .with_context(|| format!("Dense needs a known last dimension, got {}", inputs[0]))?;
        let kernel = self.kernel_initializer.initialize(&[input_dim, self.units])?;
        self.kernel = Some(
            Variable::new("kernel", kernel)
                .with_regularizer(self.kernel_regularizer.clone())
                .with_constraint(self.kernel_constraint.clone()),
        );
        if self.use_bias {
            let bias = self.bias_initializer.initialize(&[self.units])?;
            self.bias = Some(
                Variable::new("bias", bias)
                    .with_regularizer(self.bias_regularizer.clone())
                    .with_constraint(self.bias_constraint.clone()),
            );
        }
        Ok(())
    }

    fn compute_output_shape(&self, inputs: &[&ShapeFact]) -> TesselResult<TVec<ShapeFact>> {
        ensure!(inputs.len() == 1 && inputs[0].rank() >= 2, "Dense expects one input of rank >= 2");
        let mut shape = inputs[0].clone();
        shape.set_dim(shape.rank() - 1, Some(self.units));
        Ok(tvec!(shape))
    }

    fn call(
        &self,
        inputs: TVec<Arc<Tensor>>,
        _masks: &[Option<Arc<Tensor>>],
        _phase: LearningPhase,
    ) -> TesselResult<TVec<Arc<Tensor>>> {
        let kernel = self.kernel.as_ref().context("Dense layer is not built")?;
        let kernel = kernel.read();
        let kernel = kernel.to_array_view::<f32>()?.into_dimensionality::<Ix2>()?;
        let x = inputs[0].to_array_view::<f32>()?;
        let input_dim = kernel.shape()[0];
        let leading: Vec<usize> = x.shape()[..x.ndim() - 1].to_vec();
        let rows: usize = leading.iter().product();
        let x2 = x.to_shape((rows, input_dim))?;
        let mut y = x2.dot(&kernel);
        if let Some(bias) = &self.bias {
            let bias = bias.read();
            y += &bias.to_array_view::<f32>()?.into_dimensionality::<Ix1>()?;
        }
        let mut shape = leading;
        shape.push(self.units);
        let y = y.into_shape_with_order(IxDyn(&shape))?;
        Ok(tvec!(self.activation.apply(y).into_arc_tensor()))
    }

    fn supports_masking(&self) -> bool {
        true
    }

    fn weights(&self) -> TVec<Variable> {
        self.kernel.iter().chain(self.bias.iter()).cloned().collect()
    }

    fn config(&self) -> TesselResult<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn output_shape_replaces_last_axis() {
        let dense = Dense::new(16);
        let shapes = dense.compute_output_shape(&[&shapefact!(_, 10, 32)]).unwrap();
        assert_eq!(shapes[0], shapefact!(_, 10, 16));
    }

    #[test]
    fn call_matches_shape_and_values() {
        let mut dense = Dense::new(2).with_activation(ActivationFn::Relu);
        dense.build(&[&TypedFact::shape::<f32>(shapefact!(_, 3))]).unwrap();
        dense.kernel().unwrap().set(tensor2(&[[1f32, -1.], [1., -1.], [1., -1.]])).unwrap();
        dense.bias().unwrap().set(tensor1(&[0.5f32, 0.5])).unwrap();
        let x = rctensor3(&[[[1f32, 2., 3.]], [[0., 0., 1.]]]);
        let y = dense.call(tvec!(x), &[None], LearningPhase::Inference).unwrap();
        assert_eq!(y[0].shape(), &[2, 1, 2]);
        let v = y[0].as_vec::<f32>().unwrap();
        assert_abs_diff_eq!(v[0], 6.5);
        assert_abs_diff_eq!(v[1], 0.0);
        assert_abs_diff_eq!(v[2], 1.5);
    }

    #[test]
    fn config_skips_weights() {
        let dense = Dense::new(4).with_use_bias(false);
        let config = dense.config().unwrap();
        assert_eq!(config["units"], 4);
        assert_eq!(config["activation"], "linear");
        assert!(config.get("kernel").is_none());
        let back = Dense::from_config(&config).unwrap();
        assert_eq!(back.units, 4);
        assert!(!back.use_bias);
    }

    #[test]
    fn no_bias_weights() {
        let mut dense = Dense::new(4).with_use_bias(false);
        dense.build(&[&TypedFact::shape::<f32>(shapefact!(_, 3))]).unwrap();
        assert_eq!(dense.weights().len(), 1);
    }
}
