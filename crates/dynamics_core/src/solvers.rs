use crate::traits::{Elementwise, RateFunction, Stepper};

/// Explicit (forward) Euler stepper.
/// y_next = y + f(t, y) * dt
///
/// Holds no scratch buffers; each step allocates only the returned state.
#[derive(Debug, Clone, Copy, Default)]
pub struct Euler;

impl<V: Elementwise> Stepper<V> for Euler {
    fn step<F: RateFunction<V> + ?Sized>(&self, f: &F, t: &V, y: &V, dt: V::Elem) -> V {
        let slope = f.evaluate(t, y);
        y.zip_elems(&slope, |y, dydt| y + dydt * dt)
    }
}

/// Performs a single Euler step of size `dt` from `(t, y)`.
///
/// `dt` is not validated: negative values step backwards, and non-finite
/// derivatives propagate into the returned state.
pub fn step_euler<V, F>(f: &F, t: &V, y: &V, dt: V::Elem) -> V
where
    V: Elementwise,
    F: RateFunction<V> + ?Sized,
{
    Euler.step(f, t, y, dt)
}
