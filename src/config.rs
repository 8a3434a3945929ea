use anyhow::{Context, Result};
use figment::{providers::{Env, Format, Toml}, Figment};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use validator::Validate;

use crate::assignment::{AssignmentSettings, DistanceMetric};
use crate::domain::UsageBounds;
use crate::optimizer::{SolverSettings, UsagePolicy};

pub const DEFAULT_CONFIG_FILE: &str = "config/default.toml";
pub const ENV_PREFIX: &str = "SGE__";

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Config {
    #[validate(nested)]
    pub assignment: AssignmentConfig,
    #[validate(nested)]
    pub optimizer: OptimizerConfig,
    #[validate(nested)]
    pub ledger: LedgerConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct AssignmentConfig {
    pub metric: DistanceMetric,
    #[validate(range(min = 0.0, max = 1.0))]
    pub tie_epsilon_km: f64,
    /// Period of the background reassignment run
    #[validate(range(min = 1))]
    pub interval_seconds: u64,
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        let settings = AssignmentSettings::default();
        Self {
            metric: settings.metric,
            tie_epsilon_km: settings.tie_epsilon_km,
            interval_seconds: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct OptimizerConfig {
    #[validate(range(min = 1))]
    pub max_iterations: usize,
    #[validate(range(min = 1e-15, max = 1e-3))]
    pub tolerance: f64,
    #[validate(range(min = 0.0))]
    pub monthly_budget_kwh: f64,
    #[validate(range(min = 0.0))]
    pub default_min_hours: f64,
    #[validate(range(min = 0.0, max = 744.0))]
    pub default_max_hours: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        let solver = SolverSettings::default();
        let policy = UsagePolicy::default();
        Self {
            max_iterations: solver.max_iterations,
            tolerance: solver.tolerance,
            monthly_budget_kwh: policy.monthly_budget_kwh,
            default_min_hours: policy.default_bounds.min_hours,
            default_max_hours: policy.default_bounds.max_hours,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LedgerConfig {
    /// Share of nominal power drawn in energy saving mode
    #[validate(range(min = 0.0, max = 1.0))]
    pub energy_saving_fraction: f64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            energy_saving_fraction: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub snapshot_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from("data/snapshot.json"),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::from_figment(Self::figment(DEFAULT_CONFIG_FILE))
    }

    pub fn figment(file: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let cfg: Config = figment.extract().context("reading configuration")?;
        cfg.validate().context("invalid configuration")?;
        if cfg.optimizer.default_min_hours > cfg.optimizer.default_max_hours {
            anyhow::bail!(
                "invalid configuration: default_min_hours ({}) exceeds default_max_hours ({})",
                cfg.optimizer.default_min_hours,
                cfg.optimizer.default_max_hours
            );
        }
        Ok(cfg)
    }

    pub fn assignment_settings(&self) -> AssignmentSettings {
        AssignmentSettings {
            metric: self.assignment.metric,
            tie_epsilon_km: self.assignment.tie_epsilon_km,
        }
    }

    pub fn solver_settings(&self) -> SolverSettings {
        SolverSettings {
            max_iterations: self.optimizer.max_iterations,
            tolerance: self.optimizer.tolerance,
        }
    }

    pub fn usage_policy(&self) -> UsagePolicy {
        UsagePolicy {
            monthly_budget_kwh: self.optimizer.monthly_budget_kwh,
            default_bounds: UsageBounds {
                min_hours: self.optimizer.default_min_hours,
                max_hours: self.optimizer.default_max_hours,
            },
        }
    }
}
