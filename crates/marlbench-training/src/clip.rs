//! Gradient clipping policies.

use marlbench_abstraction::ParameterStore;
use serde::{Deserialize, Serialize};

/// How gradients are clipped before an optimizer step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode", content = "max")]
pub enum GradClip {
    None,
    /// Rescale so the combined 2-norm is at most `max`.
    Norm(f64),
    /// Clamp every element to `[-max, max]`.
    Value(f64),
}

impl GradClip {
    /// Norm clipping when `clip_grad_norm` is set, value clipping otherwise. No threshold disables clipping.
    pub fn from_config(clip_grad_norm: bool, clip_grad_val: Option<f64>) -> Self {
        match (clip_grad_norm, clip_grad_val) {
            (true, Some(max)) => Self::Norm(max),
            (false, Some(max)) => Self::Value(max),
            (_, None) => Self::None,
        }
    }

    /// Clips the gradients of `names` and returns the norm to record.
    ///
    /// Norm clipping returns the norm after clipping. Value clipping and no
    /// clipping return the total norm measured before any element is touched.
    pub fn clip(&self, store: &mut ParameterStore, names: &[String]) -> f64 {
        let total = store.grad_norm(names);
        match *self {
            Self::None => total,
            Self::Norm(max) => {
                if total > max {
                    let scale = max / (total + 1e-6);
                    for_each_grad(store, names, |g| *g = (f64::from(*g) * scale) as f32);
                }
                store.grad_norm(names)
            }
            Self::Value(max) => {
                let max = max as f32;
                for_each_grad(store, names, |g| *g = g.clamp(-max, max));
                total
            }
        }
    }
}

fn for_each_grad(store: &mut ParameterStore, names: &[String], mut f: impl FnMut(&mut f32)) {
    for name in names {
        if let Some(grad) = store.get_mut(name).and_then(|p| p.grad.as_mut()) {
            grad.iter_mut().for_each(&mut f);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_grad(grad: &[f32]) -> (ParameterStore, Vec<String>) {
        let mut s = ParameterStore::new();
        s.insert("w", vec![0.0; grad.len()]);
        s.get_mut("w").unwrap().accumulate_grad(grad);
        (s, vec!["w".to_string()])
    }

    #[test]
    fn test_from_config() {
        assert_eq!(GradClip::from_config(true, Some(5.0)), GradClip::Norm(5.0));
        assert_eq!(GradClip::from_config(false, Some(5.0)), GradClip::Value(5.0));
        assert_eq!(GradClip::from_config(true, None), GradClip::None);
    }

    #[test]
    fn test_norm_clip_reports_clipped_norm() {
        let (mut s, names) = store_with_grad(&[30.0, 40.0]);
        let norm = GradClip::Norm(5.0).clip(&mut s, &names);
        assert!((norm - 5.0).abs() < 1e-3);
        let g = s.get("w").unwrap().grad.as_ref().unwrap();
        assert!((g[0] - 3.0).abs() < 1e-3);
    }

    #[test]
    fn test_value_clip_reports_unclipped_norm() {
        let (mut s, names) = store_with_grad(&[30.0, 40.0]);
        let norm = GradClip::Value(5.0).clip(&mut s, &names);
        assert!((norm - 50.0).abs() < 1e-9);
        assert_eq!(s.get("w").unwrap().grad.as_ref().unwrap(), &vec![5.0, 5.0]);
    }

    #[test]
    fn test_norm_below_threshold_is_untouched() {
        let (mut s, names) = store_with_grad(&[0.3, 0.4]);
        let norm = GradClip::Norm(5.0).clip(&mut s, &names);
        assert!((norm - 0.5).abs() < 1e-6);
    }
}
