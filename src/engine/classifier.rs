//! Online multiclass classifier
//!
//! A linear softmax model trained by per-example SGD. Output
//! cardinality is fixed at construction: growing the label set means
//! building a fresh classifier and refitting from history.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

const DEFAULT_LEARNING_RATE: f64 = 0.05;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnlineClassifier {
    weights: Array2<f64>,
    bias: Array1<f64>,
    learning_rate: f64,
    updates: u64,
}

impl OnlineClassifier {
    pub fn new(classes: usize, features: usize) -> Self {
        Self {
            weights: Array2::zeros((classes, features)),
            bias: Array1::zeros(classes),
            learning_rate: DEFAULT_LEARNING_RATE,
            updates: 0,
        }
    }

    pub fn n_classes(&self) -> usize {
        self.weights.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.weights.ncols()
    }

    /// Number of examples this model has been fit on
    pub fn updates(&self) -> u64 {
        self.updates
    }

    /// Class probabilities via a numerically stable softmax
    pub fn predict_proba(&self, x: &[f64]) -> Vec<f64> {
        debug_assert_eq!(x.len(), self.n_features());
        let input = Array1::from_vec(x.to_vec());
        let logits = self.weights.dot(&input) + &self.bias;
        let max = logits.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let exps: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
        let sum: f64 = exps.iter().sum();
        exps.into_iter().map(|e| e / sum).collect()
    }

    /// Index of the most probable class
    pub fn predict(&self, x: &[f64]) -> usize {
        self.predict_proba(x)
            .into_iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| i)
            .unwrap_or(0)
    }

    /// One weighted cross-entropy SGD step
    pub fn partial_fit(&mut self, x: &[f64], class: usize, weight: f64) {
        debug_assert!(class < self.n_classes());
        let probs = self.predict_proba(x);
        let step = self.learning_rate * weight;
        for (j, &p) in probs.iter().enumerate() {
            let err = p - if j == class { 1.0 } else { 0.0 };
            for (k, &xv) in x.iter().enumerate() {
                self.weights[[j, k]] -= step * err * xv;
            }
            self.bias[j] -= step * err;
        }
        self.updates += 1;
    }

    /// Flattened parameter vector (weights then biases)
    pub fn flattened(&self) -> Vec<f64> {
        let mut flat: Vec<f64> = self.weights.iter().cloned().collect();
        flat.extend(self.bias.iter().cloned());
        flat
    }

    /// Euclidean distance between this model's parameters and an
    /// earlier flattened snapshot; the training-effect signal
    pub fn delta_from(&self, before: &[f64]) -> f64 {
        self.flattened()
            .iter()
            .zip(before.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f64>()
            .sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untrained_is_uniform() {
        let model = OnlineClassifier::new(3, 4);
        let probs = model.predict_proba(&[1.0, 0.0, 2.0, 1.0]);
        for p in &probs {
            assert!((p - 1.0 / 3.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_learns_separable_classes() {
        let mut model = OnlineClassifier::new(2, 2);
        for _ in 0..200 {
            model.partial_fit(&[5.0, 0.0], 0, 1.0);
            model.partial_fit(&[0.0, 5.0], 1, 1.0);
        }
        assert_eq!(model.predict(&[4.0, 0.5]), 0);
        assert_eq!(model.predict(&[0.5, 4.0]), 1);
    }

    #[test]
    fn test_delta_reflects_training() {
        let mut model = OnlineClassifier::new(3, 4);
        let before = model.flattened();
        assert_eq!(model.delta_from(&before), 0.0);
        model.partial_fit(&[1.0, 2.0, 0.0, 1.0], 1, 2.0);
        assert!(model.delta_from(&before) > 0.0);
    }

    #[test]
    fn test_weight_scales_step() {
        let mut light = OnlineClassifier::new(2, 2);
        let mut heavy = OnlineClassifier::new(2, 2);
        let before = light.flattened();
        light.partial_fit(&[1.0, 1.0], 0, 1.0);
        heavy.partial_fit(&[1.0, 1.0], 0, 5.0);
        assert!(heavy.delta_from(&before) > light.delta_from(&before));
    }
}
