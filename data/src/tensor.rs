//! `Tensor`, tessel main data object of interest.
use crate::datum::{Datum, DatumType};
use itertools::Itertools;
use ndarray::prelude::*;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

pub mod litteral;

#[derive(Clone, PartialEq)]
pub(crate) enum Storage {
    Bool(ArrayD<bool>),
    I64(ArrayD<i64>),
    F32(ArrayD<f32>),
}

/// Tensor is a concrete tensor in tessel.
///
/// It is the value flowing through a replayed graph, and the storage of
/// layer weights.
#[derive(Clone, PartialEq)]
pub struct Tensor {
    data: Storage,
}

impl Default for Tensor {
    fn default() -> Tensor {
        litteral::tensor0(0f32)
    }
}

impl Tensor {
    pub(crate) fn from_storage(data: Storage) -> Tensor {
        Tensor { data }
    }

    pub(crate) fn storage(&self) -> &Storage {
        &self.data
    }

    pub(crate) fn storage_mut(&mut self) -> &mut Storage {
        &mut self.data
    }

    /// Create a tensor filled with zeroes.
    pub fn zero<T: Datum>(shape: &[usize]) -> Tensor {
        T::wrap(ArrayD::from_elem(shape, T::default()))
    }

    /// Create a tensor filled with zeroes (dt as regular parameter).
    pub fn zero_dt(dt: DatumType, shape: &[usize]) -> Tensor {
        dispatch_datum!(Self::zero(dt)(shape))
    }

    /// Create a tensor from a shape and a flat slice of data.
    pub fn from_shape<T: Datum>(shape: &[usize], data: &[T]) -> anyhow::Result<Tensor> {
        let array = ArrayD::from_shape_vec(shape, data.to_vec())?;
        Ok(T::wrap(array))
    }

    /// Get the datum type of the tensor.
    pub fn datum_type(&self) -> DatumType {
        match &self.data {
            Storage::Bool(_) => DatumType::Bool,
            Storage::I64(_) => DatumType::I64,
            Storage::F32(_) => DatumType::F32,
        }
    }

    /// Get the shape of the tensor.
    pub fn shape(&self) -> &[usize] {
        match &self.data {
            Storage::Bool(a) => a.shape(),
            Storage::I64(a) => a.shape(),
            Storage::F32(a) => a.shape(),
        }
    }

    /// Get the number of dimensions (or axes) of the tensor.
    pub fn rank(&self) -> usize {
        self.shape().len()
    }

    /// Get the number of values in the tensor.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.shape().iter().product()
    }

    fn check_for_access<D: Datum>(&self) -> anyhow::Result<()> {
        if self.datum_type() != D::datum_type() {
            anyhow::bail!(
                "Tensor datum type error: tensor is {:?}, accessed as {:?}",
                self.datum_type(),
                D::datum_type(),
            );
        }
        Ok(())
    }

    /// Transform the data as a `ndarray::Array`.
    pub fn to_array_view<D: Datum>(&self) -> anyhow::Result<ArrayViewD<'_, D>> {
        self.check_for_access::<D>()?;
        D::view(self).ok_or_else(|| anyhow::format_err!("Inconsistent tensor storage"))
    }

    /// Transform the data as a mutable `ndarray::Array`.
    pub fn to_array_view_mut<D: Datum>(&mut self) -> anyhow::Result<ArrayViewMutD<'_, D>> {
        self.check_for_access::<D>()?;
        D::view_mut(self).ok_or_else(|| anyhow::format_err!("Inconsistent tensor storage"))
    }

    /// Transform the tensor into a `ndarray::Array`.
    pub fn into_array<D: Datum>(self) -> anyhow::Result<ArrayD<D>> {
        Ok(self.to_array_view::<D>()?.to_owned())
    }

    /// Access the data as a vector, in logical (row major) order.
    pub fn as_vec<D: Datum>(&self) -> anyhow::Result<Vec<D>> {
        Ok(self.to_array_view::<D>()?.iter().copied().collect())
    }

    /// Extract the single value of a rank-0 tensor.
    pub fn to_scalar<D: Datum>(&self) -> anyhow::Result<D> {
        let view = self.to_array_view::<D>()?;
        if view.len() != 1 {
            anyhow::bail!("to_scalar called on a tensor of shape {:?}", self.shape());
        }
        view.iter().next().copied().ok_or_else(|| anyhow::format_err!("Empty tensor"))
    }

    /// Optionnaly convert data to a tensor for a new DatumType.
    pub fn cast_to<D: Datum>(&self) -> Cow<'_, Tensor> {
        if self.datum_type() == D::datum_type() {
            Cow::Borrowed(self)
        } else {
            Cow::Owned(D::wrap(D::cast_from(self)))
        }
    }

    /// Optionnaly convert data to a tensor for a new DatumType.
    pub fn cast_to_dt(&self, dt: DatumType) -> Cow<'_, Tensor> {
        dispatch_datum!(Self::cast_to(dt)(self))
    }

    /// Compare two tensors, allowing for rounding errors on floats.
    pub fn close_enough(&self, other: &Self, approx: bool) -> anyhow::Result<()> {
        if self.shape() != other.shape() {
            anyhow::bail!("Shape mismatch {:?} != {:?}", self.shape(), other.shape())
        }
        if approx && self.datum_type().is_float() && other.datum_type().is_float() {
            let ma = self.to_array_view::<f32>()?;
            let mb = other.to_array_view::<f32>()?;
            for (ix, (a, b)) in ma.iter().zip(mb.iter()).enumerate() {
                if !((a.is_nan() && b.is_nan()) || (a - b).abs() <= 1e-4 + 1e-4 * b.abs()) {
                    anyhow::bail!("Mismatch at flat index {} {} != {}", ix, a, b)
                }
            }
            Ok(())
        } else if self == other {
            Ok(())
        } else {
            anyhow::bail!("Mismatch")
        }
    }

    fn dump(&self, force_full: bool) -> String {
        let spec = format!("{},{:?}", self.shape().iter().join(","), self.datum_type());
        let data = match &self.data {
            Storage::Bool(a) => dump_values(a, force_full),
            Storage::I64(a) => dump_values(a, force_full),
            Storage::F32(a) => dump_values(a, force_full),
        };
        format!("{spec} {data}")
    }
}

fn dump_values<T: fmt::Display>(a: &ArrayD<T>, force_full: bool) -> String {
    if force_full || a.len() <= 12 {
        a.iter().join(", ")
    } else {
        format!("{}...", a.iter().take(12).join(", "))
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "{}", self.dump(false))
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "{}", self.dump(formatter.alternate()))
    }
}

impl<T: Datum, D: Dimension> From<Array<T, D>> for Tensor {
    fn from(it: Array<T, D>) -> Tensor {
        T::wrap(it.into_dyn())
    }
}

/// Convenient conversion to Tensor.
pub trait IntoTensor: Sized {
    /// Convert Self to a Tensor.
    fn into_tensor(self) -> Tensor;
}

/// Convenient conversion to Arc<Tensor>.
pub trait IntoArcTensor: Sized {
    /// Convert Self to a Arc<Tensor>.
    fn into_arc_tensor(self) -> Arc<Tensor>;
}

impl<D: Dimension, T: Datum> IntoTensor for Array<T, D> {
    fn into_tensor(self) -> Tensor {
        Tensor::from(self)
    }
}

impl<D: Dimension, T: Datum> IntoArcTensor for Array<T, D> {
    fn into_arc_tensor(self) -> Arc<Tensor> {
        Arc::new(Tensor::from(self))
    }
}

impl IntoTensor for Tensor {
    fn into_tensor(self) -> Tensor {
        self
    }
}

impl IntoTensor for Arc<Tensor> {
    fn into_tensor(self) -> Tensor {
        Arc::try_unwrap(self).unwrap_or_else(|t| (*t).clone())
    }
}

impl IntoArcTensor for Tensor {
    fn into_arc_tensor(self) -> Arc<Tensor> {
        Arc::new(self)
    }
}

impl IntoArcTensor for Arc<Tensor> {
    fn into_arc_tensor(self) -> Arc<Tensor> {
        self
    }
}
