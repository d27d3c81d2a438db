use crate::internal::*;
use downcast_rs::Downcast;
use std::fmt;

/// Identity of a layer in a `Graph`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(pub usize);

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Whether a replay is performed for training or inference. Layers like
/// `Dropout` behave differently in each phase.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum LearningPhase {
    #[default]
    Inference,
    Training,
}

/// Declared constraints on one input of a layer.
///
/// Every constraint is optional. `axes` maps an axis (negative values count
/// from the end) to its expected size.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InputSpec {
    pub datum_type: Option<DatumType>,
    pub rank: Option<usize>,
    pub min_rank: Option<usize>,
    pub max_rank: Option<usize>,
    pub shape: Option<ShapeFact>,
    pub axes: TVec<(i64, usize)>,
}

impl InputSpec {
    pub fn with_datum_type(self, datum_type: DatumType) -> InputSpec {
        InputSpec { datum_type: Some(datum_type), ..self }
    }

    pub fn with_rank(self, rank: usize) -> InputSpec {
        InputSpec { rank: Some(rank), ..self }
    }

    pub fn with_min_rank(self, min_rank: usize) -> InputSpec {
        InputSpec { min_rank: Some(min_rank), ..self }
    }

    pub fn with_max_rank(self, max_rank: usize) -> InputSpec {
        InputSpec { max_rank: Some(max_rank), ..self }
    }

    pub fn with_shape(self, shape: ShapeFact) -> InputSpec {
        InputSpec { shape: Some(shape), ..self }
    }

    pub fn with_axis(mut self, axis: i64, size: usize) -> InputSpec {
        self.axes.push((axis, size));
        self
    }

    /// Checks a fact, returning a description of the violated constraint.
    pub fn check(&self, fact: &TypedFact) -> Result<(), String> {
        if let Some(dt) = self.datum_type {
            if dt != fact.datum_type {
                return Err(format!("expected dtype {}, found {}", dt, fact.datum_type));
            }
        }
        let rank = fact.rank();
        if let Some(expected) = self.rank {
            if rank != expected {
                return Err(format!("expected ndim={expected}, found ndim={rank}"));
            }
        }
        if let Some(min) = self.min_rank {
            if rank < min {
                return Err(format!("expected min_ndim={min}, found ndim={rank}"));
            }
        }
        if let Some(max) = self.max_rank {
            if rank > max {
                return Err(format!("expected max_ndim={max}, found ndim={rank}"));
            }
        }
        if let Some(shape) = &self.shape {
            if !shape.compatible_with(&fact.shape) {
                return Err(format!("expected shape {}, found shape {}", shape, fact.shape));
            }
        }
        for &(axis, size) in &self.axes {
            let resolved = fact.shape.resolve_axis(axis).map_err(|e| e.to_string())?;
            if let Some(found) = fact.shape.dim(resolved) {
                if found != size {
                    return Err(format!(
                        "expected axis {axis} to have size {size}, found shape {}",
                        fact.shape
                    ));
                }
            }
        }
        Ok(())
    }
}

/// A violated input constraint, as reported by `Layer::check_inputs`.
#[derive(Clone, Debug, PartialEq, Eq, new)]
pub struct InputMismatch {
    pub input: usize,
    pub constraint: String,
}

/// Checks the number of inputs a layer receives.
pub fn check_input_arity(inputs: &[&TypedFact], expected: usize) -> Result<(), InputMismatch> {
    if inputs.len() != expected {
        return Err(InputMismatch::new(
            inputs.len().min(expected),
            format!("expected {} input(s), got {}", expected, inputs.len()),
        ));
    }
    Ok(())
}

/// The contract every layer fulfills to take part in graph construction and
/// replay.
///
/// A layer is built once, the first time it is connected, from the facts of
/// its first inputs. Reusing it on inputs of a different shape is an error
/// reported by `check_inputs` or `input_specs`, never a silent rebuild.
///
/// Layers hold their weights as `Variable`s: cloning a layer shares them.
pub trait Layer: fmt::Debug + dyn_clone::DynClone + Downcast + Send + Sync + 'static {
    /// Class name, used for serialization and in summaries.
    fn class_name(&self) -> &'static str;

    /// Prefix for automatic naming (`dense` gives `dense_1`, `dense_2`...).
    fn name_prefix(&self) -> String {
        snake_case(self.class_name())
    }

    /// Declarative constraints, one per input. An empty list disables
    /// declarative checks.
    fn input_specs(&self) -> TVec<InputSpec> {
        tvec!()
    }

    /// Layer specific validation, performed before building and before any
    /// node is recorded.
    fn check_inputs(&self, _inputs: &[&TypedFact]) -> Result<(), InputMismatch> {
        Ok(())
    }

    /// Creates weights. Called exactly once, before the first call.
    fn build(&mut self, _inputs: &[&TypedFact]) -> TesselResult<()> {
        Ok(())
    }

    fn compute_output_shape(&self, inputs: &[&ShapeFact]) -> TesselResult<TVec<ShapeFact>>;

    fn output_datum_type(&self, inputs: &[&TypedFact]) -> DatumType {
        inputs.first().map(|f| f.datum_type).unwrap_or(DatumType::F32)
    }

    fn call(
        &self,
        inputs: TVec<Arc<Tensor>>,
        masks: &[Option<Arc<Tensor>>],
        phase: LearningPhase,
    ) -> TesselResult<TVec<Arc<Tensor>>>;

    fn supports_masking(&self) -> bool {
        false
    }

    /// Output masks for concrete inputs. An empty result means no output is
    /// masked.
    fn compute_mask(
        &self,
        _inputs: &[Arc<Tensor>],
        masks: &[Option<Arc<Tensor>>],
    ) -> TesselResult<TVec<Option<Arc<Tensor>>>> {
        if self.supports_masking() {
            if let Some(Some(mask)) = masks.first() {
                return Ok(tvec!(Some(mask.clone())));
            }
        }
        Ok(tvec!())
    }

    /// Symbolic counterpart of `compute_mask`, on facts.
    fn compute_mask_fact(
        &self,
        _inputs: &[&TypedFact],
        masks: &[Option<&TypedFact>],
    ) -> TesselResult<TVec<Option<TypedFact>>> {
        if self.supports_masking() {
            if let Some(Some(mask)) = masks.first() {
                return Ok(tvec!(Some((*mask).clone())));
            }
        }
        Ok(tvec!())
    }

    fn uses_learning_phase(&self) -> bool {
        false
    }

    /// All weights, in the order used by `get_weights` and `set_weights`.
    fn weights(&self) -> TVec<Variable> {
        tvec!()
    }

    /// Layer specific configuration, enough to recreate an equivalent
    /// (unbuilt) layer.
    fn config(&self) -> TesselResult<serde_json::Value>;
}

dyn_clone::clone_trait_object!(Layer);
downcast_rs::impl_downcast!(Layer);

impl<L: Layer> From<L> for Box<dyn Layer> {
    fn from(layer: L) -> Box<dyn Layer> {
        Box::new(layer)
    }
}

pub(crate) fn snake_case(name: &str) -> String {
    let mut s = String::with_capacity(name.len() + 4);
    let chars: Vec<char> = name.chars().collect();
    for (ix, c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let after_lower = ix > 0 && chars[ix - 1].is_lowercase();
            let before_lower = ix > 0 && chars.get(ix + 1).is_some_and(|n| n.is_lowercase());
            if after_lower || (before_lower && chars[ix - 1].is_uppercase()) {
                s.push('_');
            }
            s.extend(c.to_lowercase());
        } else {
            s.push(*c);
        }
    }
    s
}
