use crate::internal::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tessel_data::tessel_ndarray::{concatenate, ArrayD, ArrayViewD, Axis, Zip};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeMode {
    Sum,
    Mul,
    Ave,
    Max,
    Concat,
}

impl fmt::Display for MergeMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            MergeMode::Sum => "sum",
            MergeMode::Mul => "mul",
            MergeMode::Ave => "ave",
            MergeMode::Max => "max",
            MergeMode::Concat => "concat",
        };
        write!(f, "{s}")
    }
}

impl FromStr for MergeMode {
    type Err = TesselError;
    fn from_str(s: &str) -> TesselResult<MergeMode> {
        Ok(match s {
            "sum" => MergeMode::Sum,
            "mul" => MergeMode::Mul,
            "ave" => MergeMode::Ave,
            "max" => MergeMode::Max,
            "concat" => MergeMode::Concat,
            _ => bail!("Unknown merge mode: {}", s),
        })
    }
}

fn default_concat_axis() -> i64 {
    -1
}

/// Merges a list of tensors into one.
///
/// Elementwise modes need all shapes to agree. `concat` needs them to agree
/// on every axis but `concat_axis`. Masks are merged too: elementwise modes
/// keep the positions valid in every input, `concat` on the last axis keeps
/// the positions valid in every input as well, since masks do not have the
/// features axis.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Merge {
    pub mode: MergeMode,
    #[serde(default = "default_concat_axis")]
    pub concat_axis: i64,
}

impl Merge {
    pub fn new(mode: MergeMode) -> Merge {
        Merge { mode, concat_axis: -1 }
    }

    pub fn concat(concat_axis: i64) -> Merge {
        Merge { mode: MergeMode::Concat, concat_axis }
    }

    pub fn from_config(config: &serde_json::Value) -> TesselResult<Merge> {
        Ok(serde_json::from_value(config.clone())?)
    }

    fn is_last_axis(&self, rank: usize) -> bool {
        self.concat_axis == -1 || self.concat_axis == rank as i64 - 1
    }

    /// Per input masks, brought to the input shape minus its last axis.
    fn timestep_masks(
        inputs: &[Arc<Tensor>],
        masks: &[Option<Arc<Tensor>>],
    ) -> TesselResult<TVec<ArrayD<bool>>> {
        let mut result = tvec!();
        for (input, mask) in inputs.iter().zip(masks.iter()) {
            let rank = input.rank();
            let steps = &input.shape()[..rank.saturating_sub(1)];
            let mask = match mask {
                None => ArrayD::from_elem(steps, true),
                Some(m) if m.rank() == rank => {
                    let m = m.to_array_view::<bool>()?;
                    m.map_axis(Axis(rank - 1), |lane| lane.iter().all(|v| *v))
                }
                Some(m) => m.to_array_view::<bool>()?.to_owned(),
            };
            result.push(mask);
        }
        Ok(result)
    }
}

impl Layer for Merge {
    fn class_name(&self) -> &'static str {
        "Merge"
    }

    fn check_inputs(&self, inputs: &[&TypedFact]) -> Result<(), InputMismatch> {
        if inputs.len() < 2 {
            return Err(InputMismatch::new(
                0,
                format!("merge expects at least 2 inputs, got {}", inputs.len()),
            ));
        }
        let first = inputs[0];
        for (ix, input) in inputs.iter().enumerate().skip(1) {
            if input.datum_type != first.datum_type {
                return Err(InputMismatch::new(
                    ix,
                    format!("expected dtype {}, found {}", first.datum_type, input.datum_type),
                ));
            }
            if input.rank() != first.rank() {
                return Err(InputMismatch::new(
                    ix,
                    format!("rank mismatch, {} vs {}", first.shape, input.shape),
                ));
            }
        }
        if self.mode == MergeMode::Concat {
            let axis = first.shape.resolve_axis(self.concat_axis).map_err(|e| {
                InputMismatch::new(0, format!("invalid concat_axis {}: {}", self.concat_axis, e))
            })?;
            for (ix, input) in inputs.iter().enumerate().skip(1) {
                for d in 0..first.rank() {
                    if d == axis {
                        continue;
                    }
                    if let (Some(a), Some(b)) = (first.shape.dim(d), input.shape.dim(d)) {
                        if a != b {
                            return Err(InputMismatch::new(
                                ix,
                                format!(
                                    "concat on axis {} needs matching shapes on other axes, got {} and {}",
                                    self.concat_axis, first.shape, input.shape
                                ),
                            ));
                        }
                    }
                }
            }
        } else {
            for (ix, input) in inputs.iter().enumerate().skip(1) {
                if !input.shape.compatible_with(&first.shape) {
                    return Err(InputMismatch::new(
                        ix,
                        format!(
                            "mode {} needs identical shapes, got {} and {}",
                            self.mode, first.shape, input.shape
                        ),
                    ));
                }
            }
        }
        Ok(())
    }

    fn compute_output_shape(&self, inputs: &[&ShapeFact]) -> TesselResult<TVec<ShapeFact>> {
        ensure!(!inputs.is_empty(), "Merge needs inputs");
        let mut shape = inputs[0].clone();
        let axis = match self.mode {
            MergeMode::Concat => Some(shape.resolve_axis(self.concat_axis)?),
            _ => None,
        };
        // unknown dims get filled from any input knowing them
        for d in 0..shape.rank() {
            if Some(d) != axis && shape.dim(d).is_none() {
                shape.set_dim(d, inputs.iter().find_map(|input| input.dim(d)));
            }
        }
        if let Some(axis) = axis {
            let total = inputs.iter().try_fold(0, |acc, input| input.dim(axis).map(|d| acc + d));
            shape.set_dim(axis, total);
        }
        Ok(tvec!(shape))
    }

    fn call(
        &self,
        inputs: TVec<Arc<Tensor>>,
        _masks: &[Option<Arc<Tensor>>],
        _phase: LearningPhase,
    ) -> TesselResult<TVec<Arc<Tensor>>> {
        let views: Vec<ArrayViewD<f32>> =
            inputs.iter().map(|t| t.to_array_view::<f32>()).collect::<TesselResult<_>>()?;
        let output = match self.mode {
            MergeMode::Concat => {
                let rank = views[0].ndim() as i64;
                let axis = if self.concat_axis < 0 { self.concat_axis + rank } else { self.concat_axis };
                concatenate(Axis(axis as usize), &views)?
            }
            mode => {
                let mut acc = views[0].to_owned();
                for view in &views[1..] {
                    match mode {
                        MergeMode::Sum | MergeMode::Ave => acc += view,
                        MergeMode::Mul => acc *= view,
                        _ => Zip::from(&mut acc).and(view).for_each(|a, b| *a = a.max(*b)),
                    }
                }
                if mode == MergeMode::Ave {
                    acc.mapv_inplace(|v| v / views.len() as f32);
                }
                acc
            }
        };
        Ok(tvec!(output.into_arc_tensor()))
    }

    fn supports_masking(&self) -> bool {
        true
    }

    fn compute_mask(
        &self,
        inputs: &[Arc<Tensor>],
        masks: &[Option<Arc<Tensor>>],
    ) -> TesselResult<TVec<Option<Arc<Tensor>>>> {
        if masks.iter().all(|m| m.is_none()) {
            return Ok(tvec!());
        }
        let rank = inputs[0].rank();
        let timesteps = Self::timestep_masks(inputs, masks)?;
        let merged = if self.mode != MergeMode::Concat || self.is_last_axis(rank) {
            let mut acc = timesteps[0].clone();
            for m in &timesteps[1..] {
                acc.zip_mut_with(m, |a, b| *a = *a && *b);
            }
            acc
        } else {
            let axis = inputs[0].shape().len() as i64;
            let axis = if self.concat_axis < 0 { self.concat_axis + axis } else { self.concat_axis };
            let views: Vec<_> = timesteps.iter().map(|m| m.view()).collect();
            concatenate(Axis(axis as usize), &views)?
        };
        Ok(tvec!(Some(merged.into_arc_tensor())))
    }

    fn compute_mask_fact(
        &self,
        inputs: &[&TypedFact],
        masks: &[Option<&TypedFact>],
    ) -> TesselResult<TVec<Option<TypedFact>>> {
        if masks.iter().all(|m| m.is_none()) {
            return Ok(tvec!());
        }
        let shapes: TVec<&ShapeFact> = inputs.iter().map(|f| &f.shape).collect();
        let mut shape = self.compute_output_shape(&shapes)?.remove(0);
        shape.pop();
        Ok(tvec!(Some(TypedFact::shape::<bool>(shape))))
    }

    fn config(&self) -> TesselResult<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}
