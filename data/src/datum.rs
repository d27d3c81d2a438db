//! Element types a `Tensor` can hold.
use crate::tensor::{Storage, Tensor};
use crate::tensor::litteral::tensor0;
use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub enum DatumType {
    Bool,
    I64,
    F32,
}

impl DatumType {
    pub fn is_float(&self) -> bool {
        *self == DatumType::F32
    }

    pub fn is_integer(&self) -> bool {
        *self == DatumType::I64
    }

    /// Short name, as used in layer configurations.
    pub fn name(&self) -> &'static str {
        match self {
            DatumType::Bool => "bool",
            DatumType::I64 => "int64",
            DatumType::F32 => "float32",
        }
    }
}

impl fmt::Display for DatumType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for DatumType {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> anyhow::Result<DatumType> {
        match s {
            "bool" => Ok(DatumType::Bool),
            "int64" | "i64" | "int32" => Ok(DatumType::I64),
            "float32" | "f32" | "float" => Ok(DatumType::F32),
            _ => anyhow::bail!("Unknown datum type: {}", s),
        }
    }
}

pub trait Datum:
    Clone + Copy + Send + Sync + fmt::Debug + fmt::Display + Default + PartialEq + 'static
{
    fn name() -> &'static str;
    fn datum_type() -> DatumType;

    #[doc(hidden)]
    fn wrap(array: ArrayD<Self>) -> Tensor;
    #[doc(hidden)]
    fn view(tensor: &Tensor) -> Option<ArrayViewD<'_, Self>>;
    #[doc(hidden)]
    fn view_mut(tensor: &mut Tensor) -> Option<ArrayViewMutD<'_, Self>>;
    #[doc(hidden)]
    fn cast_from(tensor: &Tensor) -> ArrayD<Self>;
}

macro_rules! datum {
    ($t:ty, $v:ident, $from_bool:expr, $from_i64:expr, $from_f32:expr) => {
        impl From<$t> for Tensor {
            fn from(it: $t) -> Tensor {
                tensor0(it)
            }
        }

        impl Datum for $t {
            fn name() -> &'static str {
                stringify!($t)
            }

            fn datum_type() -> DatumType {
                DatumType::$v
            }

            fn wrap(array: ArrayD<Self>) -> Tensor {
                Tensor::from_storage(Storage::$v(array))
            }

            fn view(tensor: &Tensor) -> Option<ArrayViewD<'_, Self>> {
                match tensor.storage() {
                    Storage::$v(a) => Some(a.view()),
                    _ => None,
                }
            }

            fn view_mut(tensor: &mut Tensor) -> Option<ArrayViewMutD<'_, Self>> {
                match tensor.storage_mut() {
                    Storage::$v(a) => Some(a.view_mut()),
                    _ => None,
                }
            }

            fn cast_from(tensor: &Tensor) -> ArrayD<Self> {
                match tensor.storage() {
                    Storage::Bool(a) => a.mapv($from_bool),
                    Storage::I64(a) => a.mapv($from_i64),
                    Storage::F32(a) => a.mapv($from_f32),
                }
            }
        }
    };
}

datum!(bool, Bool, |b| b, |i| i != 0, |f| f != 0.0);
datum!(i64, I64, |b| b as i64, |i| i, |f| f as i64);
datum!(f32, F32, |b| if b { 1.0 } else { 0.0 }, |i| i as f32, |f| f);
