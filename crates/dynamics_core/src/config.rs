//! Serializable scenario descriptions: which model to run, over which range,
//! and how densely to sample its direction field.

use crate::equation_engine::ExpressionRate;
use crate::field::{sample, VectorField};
use crate::models::LogisticGrowth;
use crate::traits::{Elementwise, RateFunction};
use crate::trajectory::{solve, Trajectory};
use anyhow::{Context, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which rate function a scenario uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum ModelConfig {
    Logistic {
        r: f64,
        #[serde(alias = "K")]
        k: f64,
    },
    Expression {
        rhs: String,
        #[serde(default)]
        params: BTreeMap<String, f64>,
    },
}

impl ModelConfig {
    /// Builds the configured model for states of type `V`.
    pub fn build<V>(&self) -> Result<Box<dyn RateFunction<V>>>
    where
        V: Elementwise<Elem = f64> + 'static,
    {
        match self {
            ModelConfig::Logistic { r, k } => Ok(Box::new(LogisticGrowth::new(*r, *k))),
            ModelConfig::Expression { rhs, params } => {
                let params: Vec<(&str, f64)> =
                    params.iter().map(|(name, value)| (name.as_str(), *value)).collect();
                let model = ExpressionRate::new(rhs, &params)
                    .with_context(|| format!("Invalid rate expression `{rhs}`."))?;
                Ok(Box::new(model))
            }
        }
    }
}

/// Time range and initial state for a trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajectorySettings {
    pub t0: f64,
    pub t1: f64,
    pub y0: f64,
    pub dt: f64,
}

/// Bounds and density of a direction-field grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldSettings {
    pub x0: f64,
    pub x1: f64,
    pub y0: f64,
    pub y1: f64,
    pub num_points: usize,
}

impl Default for FieldSettings {
    fn default() -> Self {
        Self {
            x0: 0.0,
            x1: 10.0,
            y0: 0.0,
            y1: 10.0,
            num_points: 20,
        }
    }
}

/// A model plus the outputs to compute from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub model: ModelConfig,
    #[serde(default)]
    pub trajectory: Option<TrajectorySettings>,
    #[serde(default)]
    pub field: Option<FieldSettings>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioReport {
    pub trajectory: Option<Trajectory<f64>>,
    pub field: Option<VectorField<f64>>,
}

impl Scenario {
    /// Computes every output the scenario asks for.
    pub fn run(&self) -> Result<ScenarioReport> {
        let trajectory = match self.trajectory {
            Some(settings) => {
                let model = self.model.build::<f64>()?;
                Some(solve(&*model, settings.t0, settings.t1, settings.y0, settings.dt))
            }
            None => None,
        };

        let field = match self.field {
            Some(settings) => {
                let model = self.model.build::<Array2<f64>>()?;
                Some(sample(
                    &*model,
                    settings.x0,
                    settings.x1,
                    settings.y0,
                    settings.y1,
                    settings.num_points,
                ))
            }
            None => None,
        };

        Ok(ScenarioReport { trajectory, field })
    }
}

#[cfg(test)]
mod tests {
    use super::{FieldSettings, ModelConfig, Scenario, TrajectorySettings};
    use ndarray::Array2;

    fn assert_err_contains<T>(result: anyhow::Result<T>, needle: &str) {
        let Err(err) = result else {
            panic!("expected error containing \"{needle}\"");
        };
        let message = format!("{err:#}");
        assert!(
            message.contains(needle),
            "expected error to contain \"{needle}\", got \"{message}\""
        );
    }

    #[test]
    fn model_config_reads_tagged_json() {
        let logistic: ModelConfig =
            serde_json::from_str(r#"{"model": "logistic", "r": 0.1, "K": 100.0}"#)
                .expect("logistic config parses");
        assert_eq!(logistic, ModelConfig::Logistic { r: 0.1, k: 100.0 });

        let expression: ModelConfig =
            serde_json::from_str(r#"{"model": "expression", "rhs": "-y"}"#)
                .expect("expression config parses");
        match expression {
            ModelConfig::Expression { rhs, params } => {
                assert_eq!(rhs, "-y");
                assert!(params.is_empty());
            }
            other => panic!("unexpected config {other:?}"),
        }
    }

    #[test]
    fn build_produces_scalar_and_grid_models() {
        let config = ModelConfig::Logistic { r: 0.5, k: 10.0 };
        let scalar = config.build::<f64>().expect("logistic builds");
        assert_eq!(scalar.evaluate(&0.0, &5.0), 1.25);
        assert_eq!(scalar.name(), "LogisticGrowth");

        let grid = config.build::<Array2<f64>>().expect("logistic builds");
        let ys = Array2::from_elem((2, 3), 5.0);
        assert!(grid.evaluate(&ys, &ys).iter().all(|&rate| rate == 1.25));
    }

    #[test]
    fn build_reports_expression_errors_with_context() {
        let config = ModelConfig::Expression {
            rhs: "r * q".to_string(),
            params: [("r".to_string(), 1.0)].into_iter().collect(),
        };
        assert_err_contains(config.build::<f64>(), "Invalid rate expression `r * q`");
        assert_err_contains(config.build::<f64>(), "Unknown variable or parameter: q");
    }

    #[test]
    fn field_settings_default_to_twenty_points() {
        let settings: FieldSettings =
            serde_json::from_str(r#"{"x1": 50.0, "y1": 120.0}"#).expect("settings parse");
        assert_eq!(settings.num_points, 20);
        assert_eq!(settings.x0, 0.0);
        assert_eq!(settings.x1, 50.0);
    }

    #[test]
    fn scenario_runs_trajectory_and_field() {
        let scenario: Scenario = serde_json::from_str(
            r#"{
                "model": {"model": "expression", "rhs": "r*y*(1 - y/K)", "params": {"r": 0.1, "K": 100}},
                "trajectory": {"t0": 0, "t1": 50, "y0": 10, "dt": 1},
                "field": {"x0": 0, "x1": 50, "y0": 0, "y1": 120, "num_points": 10}
            }"#,
        )
        .expect("scenario parses");

        let report = scenario.run().expect("scenario runs");
        let trajectory = report.trajectory.expect("trajectory requested");
        assert_eq!(trajectory.len(), 50);
        assert_eq!(trajectory.label(), "dy/dt = r*y*(1 - y/K) (Euler)");
        let (_, y_last) = trajectory.last().expect("trajectory has samples");
        assert!(*y_last > 90.0 && *y_last < 100.0);

        let field = report.field.expect("field requested");
        assert_eq!(field.shape(), (10, 10));
        assert_eq!(field.step(), 5.0);
    }

    #[test]
    fn scenario_skips_outputs_that_are_not_requested() {
        let scenario = Scenario {
            model: ModelConfig::Logistic { r: 1.0, k: 1.0 },
            trajectory: Some(TrajectorySettings {
                t0: 0.0,
                t1: 1.0,
                y0: 0.5,
                dt: -1.0,
            }),
            field: None,
        };
        let report = scenario.run().expect("scenario runs");
        assert!(report.trajectory.expect("trajectory requested").is_empty());
        assert!(report.field.is_none());
    }

    #[test]
    fn scenario_report_serializes_for_rendering() {
        let scenario = Scenario {
            model: ModelConfig::Logistic { r: 0.1, k: 100.0 },
            trajectory: None,
            field: Some(FieldSettings {
                num_points: 2,
                ..FieldSettings::default()
            }),
        };
        let report = scenario.run().expect("scenario runs");
        let json = serde_json::to_value(&report).expect("report serializes");
        assert!(json["trajectory"].is_null());
        assert_eq!(json["field"]["x"]["dim"], serde_json::json!([2, 2]));
    }
}
