pub mod config;
pub mod equation_engine;
pub mod field;
pub mod models;
pub mod solvers;
pub mod trajectory;
/// The `dynamics_core` crate provides the numerical core for first-order ODEs
/// `dy/dt = f(t, y)`. It is generic over the state type: a plain float for a
/// single trajectory, or an `ndarray` array to evaluate many points at once.
///
/// Key components:
/// - **Traits**: `Scalar` (numeric type abstraction), `Elementwise` (scalar or array state), `RateFunction` (ODE right-hand sides), `Stepper` (solvers).
/// - **Models**: `LogisticGrowth`, plus `ExpressionRate` for right-hand sides written as text.
/// - **Solvers**: the explicit `Euler` stepper.
/// - **Trajectory / Field**: `solve` for fixed-step trajectories and `sample` for direction fields, the data handed to a renderer.
/// - **Config**: serde-driven `Scenario` descriptions.
pub mod traits;

pub use equation_engine::{ExpressionError, ExpressionRate};
pub use field::{sample, VectorField};
pub use models::LogisticGrowth;
pub use solvers::{step_euler, Euler};
pub use traits::{Elementwise, RateFunction, Scalar, Stepper};
pub use trajectory::{sample_count, solve, Trajectory};
