//! Named reorder algorithms available to reshuffle schedules.

use std::collections::HashMap;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// A pure permutation of a collection's items.
pub trait Reorder: Send + Sync {
    /// Reorder `items`. `options` are the schedule's algorithm options, passed
    /// through untouched.
    fn reorder(&self, items: Vec<String>, options: &serde_json::Value) -> Vec<String>;
}

/// Uniform shuffle. `{"seed": n}` makes it deterministic.
pub struct RandomShuffle;

impl Reorder for RandomShuffle {
    fn reorder(&self, mut items: Vec<String>, options: &serde_json::Value) -> Vec<String> {
        match options.get("seed").and_then(|s| s.as_u64()) {
            Some(seed) => items.shuffle(&mut StdRng::seed_from_u64(seed)),
            None => items.shuffle(&mut rand::thread_rng()),
        }
        items
    }
}

pub struct Reverse;

impl Reorder for Reverse {
    fn reorder(&self, mut items: Vec<String>, _options: &serde_json::Value) -> Vec<String> {
        items.reverse();
        items
    }
}

/// Algorithm name → implementation.
#[derive(Clone)]
pub struct AlgorithmRegistry {
    algorithms: HashMap<String, Arc<dyn Reorder>>,
}

impl AlgorithmRegistry {
    /// Registry with no algorithms.
    pub fn empty() -> Self {
        Self {
            algorithms: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: &str, algorithm: Arc<dyn Reorder>) {
        self.algorithms.insert(name.to_string(), algorithm);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Reorder>> {
        self.algorithms.get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.algorithms.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for AlgorithmRegistry {
    /// `random` and `reverse`.
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("random", Arc::new(RandomShuffle));
        registry.register("reverse", Arc::new(Reverse));
        registry
    }
}
