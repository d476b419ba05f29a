//! Class-confidence maps returned by the classifier
//!
//! A [`Prediction`] maps class names to confidences in `[0, 1]`. Confidences
//! are clipped on construction and deserialization; an empty map is legal and
//! means "no class predicted". Lookups from the cache hand out owned copies,
//! so the consuming operations here can be chained freely without corrupting
//! shared state.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Mapping from class name to confidence in `[0, 1]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "HashMap<String, f64>", into = "HashMap<String, f64>")]
pub struct Prediction(HashMap<String, f64>);

impl From<HashMap<String, f64>> for Prediction {
    fn from(map: HashMap<String, f64>) -> Self {
        Self(
            map.into_iter()
                .map(|(class, confidence)| (class, confidence.clamp(0.0, 1.0)))
                .collect(),
        )
    }
}

impl From<Prediction> for HashMap<String, f64> {
    fn from(prediction: Prediction) -> Self {
        prediction.0
    }
}

impl FromIterator<(String, f64)> for Prediction {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        iter.into_iter().collect::<HashMap<_, _>>().into()
    }
}

impl Prediction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a class, clipping the confidence to `[0, 1]`.
    pub fn insert(&mut self, class: impl Into<String>, confidence: f64) {
        self.0.insert(class.into(), confidence.clamp(0.0, 1.0));
    }

    pub fn get(&self, class: &str) -> Option<f64> {
        self.0.get(class).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(class, confidence)| (class.as_str(), *confidence))
    }

    /// `(class, confidence)` pairs in descending confidence order.
    ///
    /// Ties break on the class name so output order is deterministic.
    pub fn sorted(&self) -> Vec<(&str, f64)> {
        let mut entries: Vec<_> = self.iter().collect();
        entries.sort_by(|(a_class, a), (b_class, b)| {
            b.partial_cmp(a)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a_class.cmp(b_class))
        });
        entries
    }

    /// The single highest `(class, confidence)`, or `None` for an empty map.
    pub fn max(&self) -> Option<(&str, f64)> {
        self.sorted().into_iter().next()
    }

    /// Drop entries whose confidence is below `threshold`.
    pub fn minimum(mut self, threshold: f64) -> Self {
        self.0.retain(|_, confidence| *confidence >= threshold);
        self
    }

    /// Drop entries whose class is not in the allow-list.
    pub fn whitelist<S: AsRef<str>>(mut self, classes: &[S]) -> Self {
        self.0
            .retain(|class, _| classes.iter().any(|allowed| allowed.as_ref() == class));
        self
    }

    /// Arithmetic sum of the remaining confidences.
    pub fn sum(&self) -> f64 {
        self.0.values().sum()
    }
}
