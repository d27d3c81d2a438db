use crate::internal::*;
use serde::{Deserialize, Serialize};
use tessel_data::tessel_ndarray::Axis;

/// Masks timesteps whose features all equal `mask_value`.
///
/// The produced mask has the input shape without its last axis, and the
/// masked timesteps are zeroed in the output.
#[derive(Clone, Debug, PartialEq, new, Serialize, Deserialize)]
pub struct Masking {
    #[serde(default)]
    pub mask_value: f32,
}

impl Masking {
    pub fn from_config(config: &serde_json::Value) -> TesselResult<Masking> {
        Ok(serde_json::from_value(config.clone())?)
    }

    fn mask(&self, input: &Tensor) -> TesselResult<Tensor> {
        let x = input.to_array_view::<f32>()?;
        let axis = Axis(x.ndim() - 1);
        Ok(x.map_axis(axis, |lane| lane.iter().any(|v| *v != self.mask_value)).into_tensor())
    }
}

impl Layer for Masking {
    fn class_name(&self) -> &'static str {
        "Masking"
    }

    fn input_specs(&self) -> TVec<InputSpec> {
        tvec!(InputSpec::default().with_min_rank(2).with_datum_type(DatumType::F32))
    }

    fn compute_output_shape(&self, inputs: &[&ShapeFact]) -> TesselResult<TVec<ShapeFact>> {
        Ok(tvec!(inputs[0].clone()))
    }

    fn call(
        &self,
        inputs: TVec<Arc<Tensor>>,
        _masks: &[Option<Arc<Tensor>>],
        _phase: LearningPhase,
    ) -> TesselResult<TVec<Arc<Tensor>>> {
        let mask = self.mask(&inputs[0])?;
        let mask = mask.to_array_view::<bool>()?.insert_axis(Axis(inputs[0].rank() - 1));
        let mut x = inputs[0].to_array_view::<f32>()?.to_owned();
        x.zip_mut_with(&mask, |v, keep| {
            if !keep {
                *v = 0.0
            }
        });
        Ok(tvec!(x.into_arc_tensor()))
    }

    fn supports_masking(&self) -> bool {
        true
    }

    fn compute_mask(
        &self,
        inputs: &[Arc<Tensor>],
        _masks: &[Option<Arc<Tensor>>],
    ) -> TesselResult<TVec<Option<Arc<Tensor>>>> {
        Ok(tvec!(Some(self.mask(&inputs[0])?.into_arc_tensor())))
    }

    fn compute_mask_fact(
        &self,
        inputs: &[&TypedFact],
        _masks: &[Option<&TypedFact>],
    ) -> TesselResult<TVec<Option<TypedFact>>> {
        let mut shape = inputs[0].shape.clone();
        shape.pop();
        Ok(tvec!(Some(TypedFact::shape::<bool>(shape))))
    }

    fn config(&self) -> TesselResult<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_padding_timesteps() {
        let layer = Masking::new(0.0);
        let x = rctensor3(&[[[1f32, 2.], [0., 0.], [0., 3.]]]);
        let mask = layer.compute_mask(&[x.clone()], &[None]).unwrap();
        assert_eq!(**mask[0].as_ref().unwrap(), tensor2(&[[true, false, true]]));
        let y = layer.call(tvec!(x.clone()), &[None], LearningPhase::Inference).unwrap();
        assert_eq!(y[0], x);
    }

    #[test]
    fn zeroes_masked_steps() {
        let layer = Masking::new(-1.0);
        let x = rctensor3(&[[[1f32, 2.], [-1., -1.]]]);
        let y = layer.call(tvec!(x), &[None], LearningPhase::Inference).unwrap();
        assert_eq!(*y[0], tensor3(&[[[1f32, 2.], [0., 0.]]]));
    }

    #[test]
    fn mask_fact_drops_last_axis() {
        let layer = Masking::new(0.0);
        let fact = TypedFact::shape::<f32>(shapefact!(_, 10, 4));
        let masks = layer.compute_mask_fact(&[&fact], &[None]).unwrap();
        assert_eq!(masks[0], Some(TypedFact::shape::<bool>(shapefact!(_, 10))));
    }
}
