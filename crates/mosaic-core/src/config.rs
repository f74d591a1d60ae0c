use crate::CoreError;
use mosaic_schema::PriorityBounds;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How the evaluator spreads independent ids across threads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parallelism {
    #[default]
    Sequential,
    /// Evaluate each topological layer with up to this many scoped threads.
    Threads(usize),
}

impl Parallelism {
    /// Number of workers to use for a layer of `ids` independent ids.
    pub fn workers_for(self, ids: usize) -> usize {
        match self {
            Parallelism::Sequential => 1,
            Parallelism::Threads(n) => n.clamp(1, ids.max(1)),
        }
    }
}

/// Settings for a composition run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComposeConfig {
    #[serde(default)]
    pub bounds: PriorityBounds,
    #[serde(default)]
    pub parallelism: Parallelism,
}

impl ComposeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_bounds(mut self, bounds: PriorityBounds) -> Self {
        self.bounds = bounds;
        self
    }

    #[must_use]
    pub fn with_parallelism(mut self, parallelism: Parallelism) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Load config from `~/.config/mosaic/config.json`, or defaults if absent.
    pub fn load_default() -> Result<Self, CoreError> {
        match default_config_path() {
            Ok(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content).map_err(|e| {
            CoreError::Config(format!("invalid config {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), CoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.bounds.min > self.bounds.max {
            return Err(CoreError::Config(format!(
                "priority bounds are empty: min {} > max {}",
                self.bounds.min, self.bounds.max
            )));
        }
        if self.parallelism == Parallelism::Threads(0) {
            return Err(CoreError::Config(
                "parallelism.threads must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }
}

pub fn default_config_path() -> Result<PathBuf, CoreError> {
    let home = std::env::var("HOME").map_err(|_| CoreError::Config("HOME not set".to_owned()))?;
    Ok(PathBuf::from(home).join(".config/mosaic/config.json"))
}
