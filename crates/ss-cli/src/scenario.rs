//! Feed scenarios
//!
//! A scenario is a JSON description of a feed plus a script of user actions.
//! Replaying it runs the real monitor on the simulated host.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use ss_core::sim::{SimItem, Simulation};
use ss_core::{ConfigError, Evaluation, ItemId, MonitorConfig};

#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON in '{path}': {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("scenario feed is empty")]
    EmptyFeed,
    #[error("invalid monitor config: {0}")]
    Config(#[from] ConfigError),
}

/// One scripted user action.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Let virtual time pass
    Wait { ms: u64 },
    /// Run until nothing is scheduled
    RunUntilIdle,
    /// Scroll to the next item by hand
    UserAdvance,
    /// Leave for another path
    Navigate { path: String },
    ReturnToFeed,
    SetThreshold { threshold: u64 },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    /// Stored threshold; the config default when absent
    #[serde(default)]
    pub threshold: Option<u64>,
    #[serde(default)]
    pub container_delay_ms: u64,
    #[serde(default)]
    pub container_missing: bool,
    pub feed: Vec<SimItem>,
    /// Defaults to a single `run_until_idle`
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn from_json(path: &str, text: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = serde_json::from_str(text).map_err(|source| ScenarioError::Json {
            path: path.to_string(),
            source,
        })?;
        if scenario.feed.is_empty() {
            return Err(ScenarioError::EmptyFeed);
        }
        Ok(scenario)
    }
}

/// Read a JSON file into `T`.
pub fn load_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ScenarioError> {
    let display = path.display().to_string();
    let text = fs::read_to_string(path).map_err(|source| ScenarioError::Io {
        path: display.clone(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ScenarioError::Json { path: display, source })
}

/// Parse and validate a monitor config; missing fields take their defaults.
pub fn config_from_json(path: &str, text: &str) -> Result<MonitorConfig, ScenarioError> {
    let config: MonitorConfig = serde_json::from_str(text).map_err(|source| ScenarioError::Json {
        path: path.to_string(),
        source,
    })?;
    config.validate()?;
    Ok(config)
}

pub fn load_config(path: &Path) -> Result<MonitorConfig, ScenarioError> {
    let config: MonitorConfig = load_json(path)?;
    config.validate()?;
    Ok(config)
}

pub fn load_scenario(path: &Path) -> Result<Scenario, ScenarioError> {
    let display = path.display().to_string();
    let text = fs::read_to_string(path).map_err(|source| ScenarioError::Io {
        path: display.clone(),
        source,
    })?;
    Scenario::from_json(&display, &text)
}

#[derive(Debug, Clone, Serialize)]
pub struct TimedEvaluation {
    pub at_ms: u64,
    #[serde(flatten)]
    pub evaluation: Evaluation,
}

/// Outcome of a replay.
#[derive(Debug, Clone, Serialize)]
pub struct Replay {
    pub evaluations: Vec<TimedEvaluation>,
    pub skips: Vec<ItemId>,
    pub reports: Vec<bool>,
    pub elapsed_ms: u64,
}

pub fn replay(scenario: &Scenario, config: MonitorConfig) -> Replay {
    let mut sim = Simulation::new(config, scenario.feed.clone());
    if scenario.container_missing {
        sim = sim.without_container();
    } else if scenario.container_delay_ms > 0 {
        sim = sim.with_container_delay(Duration::from_millis(scenario.container_delay_ms));
    }
    if let Some(threshold) = scenario.threshold {
        sim.set_threshold(threshold);
    }

    sim.start();
    if scenario.steps.is_empty() {
        sim.run_until_idle();
    }
    for step in &scenario.steps {
        match step {
            Step::Wait { ms } => sim.advance(Duration::from_millis(*ms)),
            Step::RunUntilIdle => sim.run_until_idle(),
            Step::UserAdvance => sim.user_advance(),
            Step::Navigate { path } => sim.navigate(path),
            Step::ReturnToFeed => sim.return_to_feed(),
            Step::SetThreshold { threshold } => sim.set_threshold(*threshold),
        }
    }

    let evaluations = sim
        .evaluation_times()
        .into_iter()
        .zip(sim.evaluations())
        .map(|(at, evaluation)| TimedEvaluation {
            at_ms: at.as_millis() as u64,
            evaluation,
        })
        .collect();

    Replay {
        evaluations,
        skips: sim.skips(),
        reports: sim.reports(),
        elapsed_ms: sim.now().as_millis() as u64,
    }
}
