//! Layer weights.
use crate::internal::*;
use parking_lot::{RwLock, RwLockReadGuard};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// A named weight tensor.
///
/// The value lives behind a shared lock: clones of a variable (and thus
/// clones of the layer owning it) alias the same storage. This is what makes
/// all the nodes of a shared layer, and all the containers it belongs to,
/// see the same weights.
///
/// Every assignment bumps a version shared by all the clones, so replay
/// results computed with an older value can be told apart.
#[derive(Clone)]
pub struct Variable {
    name: String,
    value: Arc<RwLock<Tensor>>,
    version: Arc<AtomicU64>,
    trainable: bool,
    regularizer: Option<Regularizer>,
    constraint: Option<Constraint>,
}

impl Variable {
    pub fn new(name: impl Into<String>, value: Tensor) -> Variable {
        Variable {
            name: name.into(),
            value: Arc::new(RwLock::new(value)),
            version: Arc::new(AtomicU64::new(0)),
            trainable: true,
            regularizer: None,
            constraint: None,
        }
    }

    pub fn with_trainable(self, trainable: bool) -> Variable {
        Variable { trainable, ..self }
    }

    pub fn with_regularizer(self, regularizer: Option<Regularizer>) -> Variable {
        Variable { regularizer, ..self }
    }

    pub fn with_constraint(self, constraint: Option<Constraint>) -> Variable {
        Variable { constraint, ..self }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn trainable(&self) -> bool {
        self.trainable
    }

    pub fn regularizer(&self) -> Option<&Regularizer> {
        self.regularizer.as_ref()
    }

    pub fn constraint(&self) -> Option<&Constraint> {
        self.constraint.as_ref()
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Tensor> {
        self.value.read()
    }

    /// A snapshot of the current value.
    pub fn value(&self) -> Tensor {
        self.value.read().clone()
    }

    pub fn shape(&self) -> TVec<usize> {
        self.value.read().shape().into()
    }

    pub fn count(&self) -> usize {
        self.value.read().len()
    }

    /// Replaces the value. Shape and type must not change.
    pub fn set(&self, value: Tensor) -> TesselResult<()> {
        let mut guard = self.value.write();
        ensure!(
            guard.shape() == value.shape() && guard.datum_type() == value.datum_type(),
            "Variable {} is {:?}, can not assign {:?}",
            self.name,
            guard,
            value
        );
        *guard = value;
        self.version.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Number of assignments made to the storage so far.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Whether both variables alias the same storage.
    pub fn ptr_eq(&self, other: &Variable) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }

    pub fn regularization_penalty(&self) -> TesselResult<f32> {
        match &self.regularizer {
            Some(r) => r.penalty(&self.value.read()),
            None => Ok(0.0),
        }
    }

    pub fn apply_constraint(&self) -> TesselResult<()> {
        if let Some(c) = &self.constraint {
            c.apply(&mut self.value.write())?;
            self.version.fetch_add(1, Ordering::AcqRel);
        }
        Ok(())
    }
}

impl fmt::Debug for Variable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Variable({} {:?}{})", self.name, self.shape(), if self.trainable { "" } else { " frozen" })
    }
}
