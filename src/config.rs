use crate::window::{ObservationWindow, WindowError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file")]
    Parse(#[from] toml::de::Error),
    #[error("no input map given (use --input-map or [simulation] input_map)")]
    MissingInputMap,
    #[error(transparent)]
    InvalidWindow(#[from] WindowError),
    #[error("batch size must be at least 1")]
    ZeroBatchSize,
    #[error("target vehicle count must be at least 1")]
    ZeroTarget,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct GeneratorConfig {
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    /// Road network (`*.net.xml`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_map: Option<PathBuf>,
    /// Seconds each trip is observed for.
    pub trip_duration: f64,
    /// Simulation step length in seconds.
    pub time_step: f64,
    /// Vehicles requested from trip generation per batch.
    pub batch_size: u32,
    /// Survivors to collect before stopping.
    pub target_vehicles: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ToolsConfig {
    pub random_trips: String,
    pub duarouter: String,
    pub rerouters: String,
    pub sumo: String,
    pub pedestrians: bool,
    pub work_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: PathBuf,
    pub dataset: PathBuf,
    pub keep_intermediates: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            input_map: None,
            trip_duration: 60.0,
            time_step: 0.1,
            batch_size: 100,
            target_vehicles: 1000,
            seed: None,
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            random_trips: "randomTrips.py".to_string(),
            duarouter: "duarouter".to_string(),
            rerouters: "generateContinuousRerouters.py".to_string(),
            sumo: "sumo".to_string(),
            pedestrians: true,
            work_dir: PathBuf::from("."),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("outputs"),
            dataset: PathBuf::from("mobility_dataset.csv"),
            keep_intermediates: true,
        }
    }
}

/// Validated run parameters, passed explicitly to the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub input_map: PathBuf,
    pub window: ObservationWindow,
    pub batch_size: u32,
    pub target_vehicles: u64,
    pub seed: Option<u64>,
    pub tools: ToolsConfig,
    pub output: OutputConfig,
}

impl GeneratorConfig {
    /// Loads the user config file, falling back to defaults when it is absent
    /// or unreadable.
    pub fn load() -> Self {
        if let Some(config_path) = Self::config_file_path()
            && let Ok(content) = std::fs::read_to_string(config_path)
            && let Ok(config) = toml::from_str(&content)
        {
            return config;
        }
        Self::default()
    }

    /// Loads an explicitly named config file; any failure is an error.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(config_path) = Self::config_file_path() {
            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let content = toml::to_string_pretty(self)?;
            std::fs::write(config_path, content)?;
        }
        Ok(())
    }

    fn config_file_path() -> Option<PathBuf> {
        Self::config_dir().map(|mut path| {
            path.push("config.toml");
            path
        })
    }

    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|mut path| {
            path.push("mobgen");
            path
        })
    }

    pub fn validate(&self) -> Result<RunSettings, ConfigError> {
        let sim = &self.simulation;
        let input_map = sim.input_map.clone().ok_or(ConfigError::MissingInputMap)?;
        let window = ObservationWindow::new(sim.trip_duration, sim.time_step)?;
        if sim.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if sim.target_vehicles == 0 {
            return Err(ConfigError::ZeroTarget);
        }
        Ok(RunSettings {
            input_map,
            window,
            batch_size: sim.batch_size,
            target_vehicles: sim.target_vehicles,
            seed: sim.seed,
            tools: self.tools.clone(),
            output: self.output.clone(),
        })
    }
}
