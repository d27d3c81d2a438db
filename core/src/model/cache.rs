use crate::internal::*;
use std::collections::VecDeque;

/// Identity of a replay request: the exact input tensors and masks (by
/// pointer), the learning phase and the weights version.
///
/// The key keeps the input `Arc`s alive, so an address can not be reused by
/// another tensor while the entry is cached.
#[derive(Clone, Debug)]
pub struct InputKey {
    tensors: TVec<Arc<Tensor>>,
    masks: TVec<Option<Arc<Tensor>>>,
    phase: LearningPhase,
    weights: u64,
}

impl InputKey {
    pub fn new(
        tensors: &[Arc<Tensor>],
        masks: &[Option<Arc<Tensor>>],
        phase: LearningPhase,
    ) -> InputKey {
        InputKey { tensors: tensors.into(), masks: masks.into(), phase, weights: 0 }
    }

    /// Sum of the versions of the weights involved. Versions only grow, so
    /// any assignment changes the sum.
    pub fn with_weights_version(self, weights: u64) -> InputKey {
        InputKey { weights, ..self }
    }
}

impl PartialEq for InputKey {
    fn eq(&self, other: &InputKey) -> bool {
        self.phase == other.phase
            && self.weights == other.weights
            && self.tensors.len() == other.tensors.len()
            && self.masks.len() == other.masks.len()
            && self.tensors.iter().zip(other.tensors.iter()).all(|(a, b)| Arc::ptr_eq(a, b))
            && self.masks.iter().zip(other.masks.iter()).all(|(a, b)| match (a, b) {
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                (None, None) => true,
                _ => false,
            })
    }
}

/// A small cache evicting its oldest entry when full. A zero capacity
/// disables it.
#[derive(Clone, Debug)]
pub struct BoundedCache<K: PartialEq, V: Clone> {
    capacity: usize,
    entries: VecDeque<(K, V)>,
}

impl<K: PartialEq, V: Clone> BoundedCache<K, V> {
    pub fn new(capacity: usize) -> BoundedCache<K, V> {
        BoundedCache { capacity, entries: VecDeque::with_capacity(capacity.min(64)) }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
    }

    pub fn insert(&mut self, key: K, value: V) {
        if self.capacity == 0 {
            return;
        }
        if let Some(pos) = self.entries.iter().position(|(k, _)| *k == key) {
            self.entries.remove(pos);
        }
        while self.entries.len() >= self.capacity {
            trace!("Evicting oldest replay cache entry");
            self.entries.pop_front();
        }
        self.entries.push_back((key, value));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear()
    }
}
