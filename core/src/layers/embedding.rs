use crate::internal::*;
use serde::{Deserialize, Serialize};
use tessel_data::tessel_ndarray::{ArrayD, Axis, Ix2, IxDyn};

fn default_initializer() -> Initializer {
    Initializer::RandomUniform { minval: -0.05, maxval: 0.05 }
}

/// Maps integer indices in `[0, input_dim)` to dense vectors of size
/// `output_dim`. With `mask_zero`, index 0 is padding and is masked.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Embedding {
    pub input_dim: usize,
    pub output_dim: usize,
    #[serde(default)]
    pub mask_zero: bool,
    #[serde(default)]
    pub input_length: Option<usize>,
    #[serde(default = "default_initializer")]
    pub embeddings_initializer: Initializer,
    #[serde(default)]
    pub embeddings_regularizer: Option<Regularizer>,
    #[serde(default)]
    pub embeddings_constraint: Option<Constraint>,
    #[serde(skip)]
    embeddings: Option<Variable>,
}

impl Embedding {
    pub fn new(input_dim: usize, output_dim: usize) -> Embedding {
        Embedding {
            input_dim,
            output_dim,
            mask_zero: false,
            input_length: None,
            embeddings_initializer: default_initializer(),
            embeddings_regularizer: None,
            embeddings_constraint: None,
            embeddings: None,
        }
    }

    pub fn with_mask_zero(self, mask_zero: bool) -> Embedding {
        Embedding { mask_zero, ..self }
    }

    pub fn with_input_length(self, input_length: usize) -> Embedding {
        Embedding { input_length: Some(input_length), ..self }
    }

    pub fn from_config(config: &serde_json::Value) -> TesselResult<Embedding> {
        Ok(serde_json::from_value(config.clone())?)
    }

    pub fn embeddings(&self) -> Option<&Variable> {
        self.embeddings.as_ref()
    }
}

impl Layer for Embedding {
    fn class_name(&self) -> &'static str {
        "Embedding"
    }

    fn input_specs(&self) -> TVec<InputSpec> {
        let spec = InputSpec::default().with_datum_type(DatumType::I64).with_min_rank(1);
        match self.input_length {
            Some(len) => tvec!(spec.with_axis(-1, len)),
            None => tvec!(spec),
        }
    }

    fn build(&mut self, _inputs: &[&TypedFact]) -> TesselResult<()> {
        let embeddings =
            self.embeddings_initializer.initialize(&[self.input_dim, self.output_dim])?;
        self.embeddings = Some(
            Variable::new("embeddings", embeddings)
                .with_regularizer(self.embeddings_regularizer.clone())
                .with_constraint(self.embeddings_constraint.clone()),
        );
        Ok(())
    }

    fn compute_output_shape(&self, inputs: &[&ShapeFact]) -> TesselResult<TVec<ShapeFact>> {
        let mut shape = inputs[0].clone();
        shape.push(Some(self.output_dim));
        Ok(tvec!(shape))
    }

    fn output_datum_type(&self, _inputs: &[&TypedFact]) -> DatumType {
        DatumType::F32
    }

    fn call(
        &self,
        inputs: TVec<Arc<Tensor>>,
        _masks: &[Option<Arc<Tensor>>],
        _phase: LearningPhase,
    ) -> TesselResult<TVec<Arc<Tensor>>> {
        let embeddings = self.embeddings.as_ref().context("Embedding layer is not built")?;
        let embeddings = embeddings.read();
        let table = embeddings.to_array_view::<f32>()?.into_dimensionality::<Ix2>()?;
        let indices = inputs[0].to_array_view::<i64>()?;
        let mut shape = indices.shape().to_vec();
        shape.push(self.output_dim);
        let mut output = ArrayD::<f32>::zeros(IxDyn(&shape));
        let last = Axis(output.ndim() - 1);
        for (index, mut lane) in indices.iter().zip(output.lanes_mut(last)) {
            if *index < 0 || *index as usize >= self.input_dim {
                bail!("Embedding index {} out of range [0, {})", index, self.input_dim)
            }
            lane.assign(&table.row(*index as usize));
        }
        Ok(tvec!(output.into_arc_tensor()))
    }

    fn compute_mask(
        &self,
        inputs: &[Arc<Tensor>],
        _masks: &[Option<Arc<Tensor>>],
    ) -> TesselResult<TVec<Option<Arc<Tensor>>>> {
        if !self.mask_zero {
            return Ok(tvec!());
        }
        let mask = inputs[0].to_array_view::<i64>()?.mapv(|i| i != 0);
        Ok(tvec!(Some(mask.into_arc_tensor())))
    }

    fn compute_mask_fact(
        &self,
        inputs: &[&TypedFact],
        _masks: &[Option<&TypedFact>],
    ) -> TesselResult<TVec<Option<TypedFact>>> {
        if !self.mask_zero {
            return Ok(tvec!());
        }
        Ok(tvec!(Some(TypedFact::shape::<bool>(inputs[0].shape.clone()))))
    }

    fn weights(&self) -> TVec<Variable> {
        self.embeddings.iter().cloned().collect()
    }

    fn config(&self) -> TesselResult<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn built(mask_zero: bool) -> Embedding {
        let mut layer = Embedding::new(3, 2).with_mask_zero(mask_zero);
        layer.build(&[&TypedFact::shape::<i64>(shapefact!(_, 4))]).unwrap();
        layer.embeddings().unwrap().set(tensor2(&[[0f32, 0.], [1., 1.], [2., 2.]])).unwrap();
        layer
    }

    #[test]
    fn lookup() {
        let layer = built(false);
        let x = rctensor2(&[[2i64, 0, 1]]);
        let y = layer.call(tvec!(x.clone()), &[None], LearningPhase::Inference).unwrap();
        assert_eq!(*y[0], tensor3(&[[[2f32, 2.], [0., 0.], [1., 1.]]]));
        assert!(layer.compute_mask(&[x], &[None]).unwrap().is_empty());
    }

    #[test]
    fn mask_zero() {
        let layer = built(true);
        let x = rctensor2(&[[2i64, 0, 1]]);
        let mask = layer.compute_mask(&[x], &[None]).unwrap();
        assert_eq!(**mask[0].as_ref().unwrap(), tensor2(&[[true, false, true]]));
    }

    #[test]
    fn out_of_range() {
        let layer = built(false);
        let x = rctensor1(&[3i64]);
        assert!(layer.call(tvec!(x), &[None], LearningPhase::Inference).is_err());
    }
}
