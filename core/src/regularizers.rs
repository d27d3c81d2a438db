//! Weight regularizers and constraints.
//!
//! Both serialize the way layer configurations embed them:
//! `{"class_name": "L1L2", "config": {"l1": 0.0, "l2": 0.01}}`.
use crate::internal::*;
use serde::{Deserialize, Serialize};
use tessel_data::tessel_ndarray::Axis;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class_name", content = "config")]
pub enum Regularizer {
    L1 { l1: f32 },
    L2 { l2: f32 },
    L1L2 { l1: f32, l2: f32 },
}

impl Regularizer {
    fn factors(&self) -> (f32, f32) {
        match *self {
            Regularizer::L1 { l1 } => (l1, 0.0),
            Regularizer::L2 { l2 } => (0.0, l2),
            Regularizer::L1L2 { l1, l2 } => (l1, l2),
        }
    }

    /// Penalty added to the loss for this weight value.
    pub fn penalty(&self, weight: &Tensor) -> TesselResult<f32> {
        let (l1, l2) = self.factors();
        let view = weight.to_array_view::<f32>()?;
        let mut penalty = 0.0;
        if l1 != 0.0 {
            penalty += l1 * view.iter().map(|x| x.abs()).sum::<f32>();
        }
        if l2 != 0.0 {
            penalty += l2 * view.iter().map(|x| x * x).sum::<f32>();
        }
        Ok(penalty)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class_name", content = "config")]
pub enum Constraint {
    /// Clamps weights to be non negative.
    NonNeg,
    /// Rescales weights so that the norm along `axis` is at most `max_value`.
    MaxNorm { max_value: f32, axis: usize },
}

impl Constraint {
    pub fn apply(&self, weight: &mut Tensor) -> TesselResult<()> {
        let mut view = weight.to_array_view_mut::<f32>()?;
        match *self {
            Constraint::NonNeg => view.mapv_inplace(|x| x.max(0.0)),
            Constraint::MaxNorm { max_value, axis } => {
                ensure!(
                    axis < view.ndim(),
                    "MaxNorm axis {} out of range for rank {}",
                    axis,
                    view.ndim()
                );
                for mut lane in view.lanes_mut(Axis(axis)) {
                    let norm = lane.iter().map(|x| x * x).sum::<f32>().sqrt();
                    let desired = norm.clamp(0.0, max_value);
                    lane.mapv_inplace(|x| x * desired / (1e-7 + norm));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn l1l2_penalty() {
        let w = tensor1(&[1f32, -2., 3.]);
        let p = Regularizer::L1L2 { l1: 0.1, l2: 0.01 }.penalty(&w).unwrap();
        assert_abs_diff_eq!(p, 0.1 * 6.0 + 0.01 * 14.0, epsilon = 1e-6);
    }

    #[test]
    fn non_neg() {
        let mut w = tensor1(&[1f32, -2., 3.]);
        Constraint::NonNeg.apply(&mut w).unwrap();
        assert_eq!(w, tensor1(&[1f32, 0., 3.]));
    }

    #[test]
    fn max_norm_per_column() {
        let mut w = tensor2(&[[3f32, 0.1], [4., 0.]]);
        Constraint::MaxNorm { max_value: 1.0, axis: 0 }.apply(&mut w).unwrap();
        let v = w.as_vec::<f32>().unwrap();
        assert_abs_diff_eq!(v[0], 0.6, epsilon = 1e-5);
        assert_abs_diff_eq!(v[2], 0.8, epsilon = 1e-5);
        assert_abs_diff_eq!(v[1], 0.1, epsilon = 1e-5);
    }

    #[test]
    fn config_format() {
        let json = serde_json::to_value(Regularizer::L2 { l2: 0.5 }).unwrap();
        assert_eq!(json, serde_json::json!({"class_name": "L2", "config": {"l2": 0.5}}));
        let back: Constraint =
            serde_json::from_value(serde_json::json!({"class_name": "NonNeg"})).unwrap();
        assert_eq!(back, Constraint::NonNeg);
    }
}
