//! Shape and type information carried by tensor handles.
use crate::internal::*;
use std::fmt;
use tessel_data::tessel_itertools::Itertools;

/// Tensor shape where each dimension may be unknown.
///
/// Unknown dimensions (`None`) are typically the batch axis, or sequence
/// lengths. Displayed the Python way, `(None, 32)`.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct ShapeFact(TVec<Option<usize>>);

#[macro_export]
macro_rules! shapefact {
    (@dim _) => (None);
    (@dim $d:expr) => (Some($d as usize));
    ($($d:tt),* $(,)?) => (
        $crate::model::ShapeFact::from_dims(&[$($crate::shapefact!(@dim $d)),*])
    );
}

impl ShapeFact {
    pub fn from_dims(dims: &[Option<usize>]) -> ShapeFact {
        ShapeFact(dims.iter().copied().collect())
    }

    /// A fully determined shape.
    pub fn from_concrete(dims: &[usize]) -> ShapeFact {
        ShapeFact(dims.iter().map(|d| Some(*d)).collect())
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    pub fn dims(&self) -> &[Option<usize>] {
        &self.0
    }

    pub fn dim(&self, axis: usize) -> Option<usize> {
        self.0.get(axis).copied().flatten()
    }

    pub fn set_dim(&mut self, axis: usize, dim: Option<usize>) {
        self.0[axis] = dim;
    }

    pub fn last(&self) -> Option<usize> {
        self.0.last().copied().flatten()
    }

    pub fn push(&mut self, dim: Option<usize>) {
        self.0.push(dim)
    }

    pub fn pop(&mut self) -> Option<Option<usize>> {
        self.0.pop()
    }

    pub fn is_concrete(&self) -> bool {
        self.0.iter().all(|d| d.is_some())
    }

    pub fn as_concrete(&self) -> Option<TVec<usize>> {
        self.0.iter().copied().collect()
    }

    pub fn to_vec(&self) -> Vec<Option<usize>> {
        self.0.to_vec()
    }

    /// Normalizes a possibly negative axis against this shape rank.
    pub fn resolve_axis(&self, axis: i64) -> TesselResult<usize> {
        let rank = self.rank() as i64;
        if 0 <= axis && axis < rank {
            Ok(axis as usize)
        } else if -rank <= axis && axis < 0 {
            Ok((axis + rank) as usize)
        } else {
            bail!("Illegal combination of values for rank and axis: {} and {}", rank, axis)
        }
    }

    /// Two shapes are compatible when they have the same rank and no pair of
    /// known dimensions disagree.
    pub fn compatible_with(&self, other: &ShapeFact) -> bool {
        self.rank() == other.rank()
            && self.0.iter().zip(other.0.iter()).all(|(a, b)| a.is_none() || b.is_none() || a == b)
    }

    /// Checks a concrete shape against this one.
    pub fn matches(&self, shape: &[usize]) -> bool {
        self.rank() == shape.len()
            && self.0.iter().zip(shape.iter()).all(|(a, b)| a.map(|a| a == *b).unwrap_or(true))
    }
}

impl fmt::Display for ShapeFact {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let dims = self.0.iter().map(|d| d.map(|d| d.to_string()).unwrap_or("None".into()));
        if self.rank() == 1 {
            write!(f, "({},)", dims.format(""))
        } else {
            write!(f, "({})", dims.format(", "))
        }
    }
}

impl fmt::Debug for ShapeFact {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl From<Vec<Option<usize>>> for ShapeFact {
    fn from(dims: Vec<Option<usize>>) -> ShapeFact {
        ShapeFact(dims.into_iter().collect())
    }
}

impl From<&[Option<usize>]> for ShapeFact {
    fn from(dims: &[Option<usize>]) -> ShapeFact {
        ShapeFact::from_dims(dims)
    }
}

impl FromIterator<Option<usize>> for ShapeFact {
    fn from_iter<I: IntoIterator<Item = Option<usize>>>(iter: I) -> ShapeFact {
        ShapeFact(iter.into_iter().collect())
    }
}

/// Element type and shape of a tensor handle.
#[derive(Clone, PartialEq, Eq, Hash, new)]
pub struct TypedFact {
    pub datum_type: DatumType,
    pub shape: ShapeFact,
}

impl TypedFact {
    pub fn dt_shape(datum_type: DatumType, shape: impl Into<ShapeFact>) -> TypedFact {
        TypedFact { datum_type, shape: shape.into() }
    }

    pub fn shape<T: Datum>(shape: impl Into<ShapeFact>) -> TypedFact {
        Self::dt_shape(T::datum_type(), shape)
    }

    /// Fact of a concrete tensor: every dimension is known.
    pub fn from_tensor(t: &Tensor) -> TypedFact {
        TypedFact::dt_shape(t.datum_type(), ShapeFact::from_concrete(t.shape()))
    }

    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    pub fn matches(&self, t: &Tensor) -> bool {
        self.datum_type == t.datum_type() && self.shape.matches(t.shape())
    }
}

impl fmt::Debug for TypedFact {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{},{:?}", self.shape, self.datum_type)
    }
}

impl fmt::Display for TypedFact {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.shape, self.datum_type)
    }
}

impl From<&Tensor> for TypedFact {
    fn from(t: &Tensor) -> TypedFact {
        TypedFact::from_tensor(t)
    }
}
