//! Concrete population and growth models.

use crate::traits::{lit, Elementwise, RateFunction, Scalar};
use serde::{Deserialize, Serialize};

/// Logistic growth `dy/dt = r * y * (1 - y / k)`.
///
/// `r` is the intrinsic growth rate and `k` the carrying capacity. The model
/// is autonomous: `t` is ignored. No parameter validation is done; `k == 0`
/// yields non-finite derivatives.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogisticGrowth<T: Scalar = f64> {
    pub r: T,
    pub k: T,
}

impl<T: Scalar> LogisticGrowth<T> {
    pub fn new(r: T, k: T) -> Self {
        Self { r, k }
    }
}

impl<T: Scalar, V: Elementwise<Elem = T>> RateFunction<V> for LogisticGrowth<T> {
    fn evaluate(&self, _t: &V, y: &V) -> V {
        let one: T = lit(1.0);
        y.map_elems(|y| self.r * y * (one - y / self.k))
    }
}
