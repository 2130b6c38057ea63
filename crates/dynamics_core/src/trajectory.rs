//! Fixed-step trajectories produced by repeated Euler steps.

use crate::solvers::Euler;
use crate::traits::{index, Elementwise, RateFunction, Scalar, Stepper};
use log::{debug, warn};
use serde::Serialize;

/// Ordered `(t, y)` samples of one solve.
///
/// Read-only once returned: the samples can be inspected or taken apart with
/// [`Trajectory::into_parts`], but not edited in place.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(bound(serialize = "V: Serialize, V::Elem: Serialize"))]
pub struct Trajectory<V: Elementwise> {
    model: String,
    label: String,
    times: Vec<V::Elem>,
    states: Vec<V>,
}

impl<V: Elementwise> Trajectory<V> {
    /// Name of the rate function that produced the samples.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Series label, e.g. `"LogisticGrowth (Euler)"`.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn times(&self) -> &[V::Elem] {
        &self.times
    }

    pub fn states(&self) -> &[V] {
        &self.states
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (V::Elem, &V)> + '_ {
        self.times.iter().copied().zip(self.states.iter())
    }

    pub fn last(&self) -> Option<(V::Elem, &V)> {
        Some((*self.times.last()?, self.states.last()?))
    }

    pub fn into_parts(self) -> (Vec<V::Elem>, Vec<V>) {
        (self.times, self.states)
    }
}

/// Upper bound on the samples reserved up front; longer runs grow as they go.
const PREALLOCATED_SAMPLES: usize = 1 << 16;

/// Number of samples in the half-open range `[t0, t1)` with spacing `dt`.
///
/// Equals `ceil((t1 - t0) / dt)` when that ratio is positive and finite and
/// zero otherwise, so reversed ranges and `dt == 0` produce no samples.
/// Counts beyond `usize::MAX` saturate.
pub fn sample_count<T: Scalar>(t0: T, t1: T, dt: T) -> usize {
    let ratio = (t1 - t0) / dt;
    if !ratio.is_finite() || ratio <= T::zero() {
        return 0;
    }
    ratio.ceil().to_usize().unwrap_or(usize::MAX)
}

/// Solves `dy/dt = f(t, y)` on `[t0, t1)` with fixed Euler steps of size `dt`.
///
/// Sample `i` pairs time `t0 + i * dt` with the state reached after `i`
/// steps; the first state is `y0`. For array states the scalar time is
/// broadcast to the state's shape, so every element is solved independently.
pub fn solve<V, F>(f: &F, t0: V::Elem, t1: V::Elem, y0: V, dt: V::Elem) -> Trajectory<V>
where
    V: Elementwise,
    F: RateFunction<V> + ?Sized,
{
    let count = sample_count(t0, t1, dt);
    let model = f.name();
    debug!("Solving {model} on [{t0:?}, {t1:?}) with dt = {dt:?}: {count} samples.");
    if count == 0 && t1 != t0 {
        warn!("Step {dt:?} does not advance from {t0:?} toward {t1:?}; trajectory is empty.");
    } else if count == usize::MAX {
        warn!("Step {dt:?} is too small for [{t0:?}, {t1:?}); sample count saturated.");
    }

    let mut times = Vec::with_capacity(count.min(PREALLOCATED_SAMPLES));
    let mut states = Vec::with_capacity(count.min(PREALLOCATED_SAMPLES));
    let mut y = y0;
    let mut reported_blowup = false;

    for i in 0..count {
        let t = t0 + dt * index(i);
        if !reported_blowup && !y.all_finite() {
            warn!("{model} left the finite range at t = {t:?}.");
            reported_blowup = true;
        }

        // The state after the final sample is never observed.
        let next = (i + 1 < count).then(|| Euler.step(f, &y.filled_like(t), &y, dt));

        times.push(t);
        states.push(y);
        match next {
            Some(next) => y = next,
            None => break,
        }
    }

    Trajectory {
        label: format!("{model} (Euler)"),
        model,
        times,
        states,
    }
}
