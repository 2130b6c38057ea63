use ndarray::{Array, Dimension, Zip};
use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// A trait for types that can be used as scalars in our rate functions.
/// Must support basic arithmetic, debug printing, and conversion from f64.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// Converts an `f64` literal into `T`.
/// Float types always accept an `f64`; anything else degrades to NaN.
pub(crate) fn lit<T: Scalar>(value: f64) -> T {
    T::from_f64(value).unwrap_or_else(T::nan)
}

/// Converts a sample index into `T`.
pub(crate) fn index<T: Scalar>(i: usize) -> T {
    T::from_usize(i).unwrap_or_else(T::nan)
}

/// A value that is either a single scalar or a homogeneous array of scalars.
///
/// Every arithmetic operation on states and times goes through this trait, so
/// one rate-function implementation serves both scalar trajectories and
/// whole grids evaluated at once.
pub trait Elementwise: Clone {
    type Elem: Scalar;

    /// Applies `f` to every element.
    fn map_elems<F: FnMut(Self::Elem) -> Self::Elem>(&self, f: F) -> Self;

    /// Combines `self` and `other` element by element.
    ///
    /// # Panics
    /// For arrays, panics if the two shapes differ.
    fn zip_elems<F: FnMut(Self::Elem, Self::Elem) -> Self::Elem>(
        &self,
        other: &Self,
        f: F,
    ) -> Self;

    /// A value with the shape of `self` where every element is `value`.
    fn filled_like(&self, value: Self::Elem) -> Self;

    fn all_finite(&self) -> bool;
}

macro_rules! impl_elementwise_for_float {
    ($($ty:ty),*) => {
        $(
            impl Elementwise for $ty {
                type Elem = $ty;

                fn map_elems<F: FnMut($ty) -> $ty>(&self, mut f: F) -> $ty {
                    f(*self)
                }

                fn zip_elems<F: FnMut($ty, $ty) -> $ty>(&self, other: &$ty, mut f: F) -> $ty {
                    f(*self, *other)
                }

                fn filled_like(&self, value: $ty) -> $ty {
                    value
                }

                fn all_finite(&self) -> bool {
                    self.is_finite()
                }
            }
        )*
    };
}

impl_elementwise_for_float!(f32, f64);

impl<T: Scalar, D: Dimension> Elementwise for Array<T, D> {
    type Elem = T;

    fn map_elems<F: FnMut(T) -> T>(&self, f: F) -> Self {
        self.mapv(f)
    }

    fn zip_elems<F: FnMut(T, T) -> T>(&self, other: &Self, mut f: F) -> Self {
        Zip::from(self).and(other).map_collect(|&a, &b| f(a, b))
    }

    fn filled_like(&self, value: T) -> Self {
        Array::from_elem(self.raw_dim(), value)
    }

    fn all_finite(&self) -> bool {
        self.iter().all(|v| v.is_finite())
    }
}

/// Right-hand side of a first-order ODE `dy/dt = f(t, y)`.
///
/// Implementations must be pure: the result depends only on `t`, `y` and the
/// parameters fixed at construction.
pub trait RateFunction<V: Elementwise> {
    /// Evaluates the derivative of `y` with respect to `t`.
    /// The result has the same shape as `y`.
    fn evaluate(&self, t: &V, y: &V) -> V;

    /// Human-readable model name, used to label plotted series.
    fn name(&self) -> String {
        short_type_name(std::any::type_name::<Self>()).to_string()
    }
}

impl<V: Elementwise, F: RateFunction<V> + ?Sized> RateFunction<V> for Box<F> {
    fn evaluate(&self, t: &V, y: &V) -> V {
        (**self).evaluate(t, y)
    }

    fn name(&self) -> String {
        (**self).name()
    }
}

/// A trait for solvers that can step a state forward by a fixed increment.
pub trait Stepper<V: Elementwise> {
    /// Returns the state one step of size `dt` after `(t, y)`.
    /// t: current time, same shape as `y`
    /// y: current state
    /// dt: step size, any sign
    fn step<F: RateFunction<V> + ?Sized>(&self, f: &F, t: &V, y: &V, dt: V::Elem) -> V;
}

fn short_type_name(full: &str) -> &str {
    let without_generics = full.split('<').next().unwrap_or(full);
    without_generics.rsplit("::").next().unwrap_or(without_generics)
}
