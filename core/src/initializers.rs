//! Initial values for layer weights.
use crate::internal::*;
use rand::distributions::Distribution;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tessel_data::tessel_ndarray::ArrayD;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "class_name", content = "config")]
pub enum Initializer {
    Zeros,
    Ones,
    #[default]
    GlorotUniform,
    RandomUniform { minval: f32, maxval: f32 },
    RandomNormal { mean: f32, stddev: f32 },
}

impl Initializer {
    pub fn initialize(&self, shape: &[usize]) -> TesselResult<Tensor> {
        self.initialize_with(shape, &mut rand::thread_rng())
    }

    pub fn initialize_with(&self, shape: &[usize], rng: &mut impl Rng) -> TesselResult<Tensor> {
        let tensor = match *self {
            Initializer::Zeros => Tensor::zero::<f32>(shape),
            Initializer::Ones => ArrayD::from_elem(shape, 1f32).into_tensor(),
            Initializer::GlorotUniform => {
                let (fan_in, fan_out) = fans(shape);
                let limit = (6.0 / (fan_in + fan_out).max(1) as f32).sqrt();
                uniform(shape, -limit, limit, rng)?
            }
            Initializer::RandomUniform { minval, maxval } => uniform(shape, minval, maxval, rng)?,
            Initializer::RandomNormal { mean, stddev } => {
                let dist = rand_distr::Normal::new(mean, stddev)?;
                ArrayD::from_shape_simple_fn(shape, || dist.sample(&mut *rng)).into_tensor()
            }
        };
        Ok(tensor)
    }
}

fn uniform(shape: &[usize], low: f32, high: f32, rng: &mut impl Rng) -> TesselResult<Tensor> {
    ensure!(low < high, "Invalid uniform range [{}, {})", low, high);
    let dist = rand::distributions::Uniform::new(low, high);
    Ok(ArrayD::from_shape_simple_fn(shape, || dist.sample(&mut *rng)).into_tensor())
}

/// Fan in and fan out, for a dense kernel `(input, units)` or a higher rank
/// kernel whose leading axes are the receptive field.
fn fans(shape: &[usize]) -> (usize, usize) {
    match shape.len() {
        0 => (1, 1),
        1 => (shape[0], shape[0]),
        2 => (shape[0], shape[1]),
        n => {
            let receptive: usize = shape[..n - 2].iter().product();
            (shape[n - 2] * receptive, shape[n - 1] * receptive)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn glorot_bounds() {
        let mut rng = SmallRng::seed_from_u64(42);
        let t = Initializer::GlorotUniform.initialize_with(&[30, 20], &mut rng).unwrap();
        let limit = (6.0f32 / 50.0).sqrt();
        assert!(t.as_vec::<f32>().unwrap().iter().all(|x| x.abs() <= limit));
        assert_eq!(t.shape(), &[30, 20]);
    }

    #[test]
    fn constant_initializers() {
        assert_eq!(Initializer::Ones.initialize(&[2]).unwrap(), tensor1(&[1f32, 1.]));
        assert_eq!(Initializer::Zeros.initialize(&[2]).unwrap(), tensor1(&[0f32, 0.]));
    }
}
