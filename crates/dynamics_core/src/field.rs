//! Direction fields sampled over a regular `(t, y)` grid.

use crate::traits::{index, RateFunction, Scalar};
use log::debug;
use ndarray::{Array1, Array2};
use serde::Serialize;

/// Arrow grids for a quiver-style rendering of `dy/dt = f(t, y)`.
///
/// `x` and `y` hold the grid coordinates, `u` the horizontal and `v` the
/// vertical arrow components. All four grids share one shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorField<T: Scalar> {
    x: Array2<T>,
    y: Array2<T>,
    u: Array2<T>,
    v: Array2<T>,
    step: T,
}

impl<T: Scalar> VectorField<T> {
    pub fn x(&self) -> &Array2<T> {
        &self.x
    }

    pub fn y(&self) -> &Array2<T> {
        &self.y
    }

    pub fn u(&self) -> &Array2<T> {
        &self.u
    }

    pub fn v(&self) -> &Array2<T> {
        &self.v
    }

    /// Horizontal scale applied to `v`: `(x1 - x0) / num_points`.
    pub fn step(&self) -> T {
        self.step
    }

    /// `(rows, columns)` of every grid.
    pub fn shape(&self) -> (usize, usize) {
        self.x.dim()
    }
}

/// `num_points` evenly spaced values from `start` to `stop`, both included.
///
/// The last value is `stop` exactly rather than `start + step * (n - 1)`.
fn axis<T: Scalar>(start: T, stop: T, num_points: usize) -> Array1<T> {
    let mut values = Array1::linspace(start, stop, num_points);
    if num_points > 1 {
        values[num_points - 1] = stop;
    }
    values
}

/// Builds coordinate grids from two axes with `xy` indexing:
/// `x_grid[[i, j]] == xs[j]` and `y_grid[[i, j]] == ys[i]`.
pub fn meshgrid<T: Scalar>(xs: &Array1<T>, ys: &Array1<T>) -> (Array2<T>, Array2<T>) {
    let shape = (ys.len(), xs.len());
    let x_grid = Array2::from_shape_fn(shape, |(_, j)| xs[j]);
    let y_grid = Array2::from_shape_fn(shape, |(i, _)| ys[i]);
    (x_grid, y_grid)
}

/// Samples the direction field of `f` on `num_points × num_points` points
/// spanning `[x0, x1] × [y0, y1]`, endpoints included.
///
/// The horizontal component is 1 everywhere and the vertical one is the
/// derivative scaled by `(x1 - x0) / num_points`, so arrows keep comparable
/// lengths whatever the derivative's magnitude. Only `v` is scaled.
pub fn sample<T, F>(f: &F, x0: T, x1: T, y0: T, y1: T, num_points: usize) -> VectorField<T>
where
    T: Scalar,
    F: RateFunction<Array2<T>> + ?Sized,
{
    let step = (x1 - x0) / index(num_points);
    debug!(
        "Sampling {} on a {num_points}x{num_points} grid over [{x0:?}, {x1:?}] x [{y0:?}, {y1:?}].",
        f.name()
    );

    let xs = axis(x0, x1, num_points);
    let ys = axis(y0, y1, num_points);
    let (x, y) = meshgrid(&xs, &ys);

    let u = Array2::ones(x.raw_dim());
    let v = f.evaluate(&x, &y).mapv(|slope| slope * step);

    VectorField { x, y, u, v, step }
}
