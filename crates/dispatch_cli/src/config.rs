//! Run configuration: a flat `key = value` properties file.
//!
//! The recognized options mirror the datasets this simulator is used with;
//! seconds-valued options are converted to scaled units downstream. Missing
//! or malformed required options are fatal at startup.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rand::Rng;
use thiserror::Error;

use dispatch_core::fleet::FleetManagerKind;
use dispatch_core::scenario::SimulationParams;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("missing required option `{0}`")]
    Missing(&'static str),

    #[error("invalid value `{value}` for option `{key}`")]
    Invalid { key: &'static str, value: String },

    #[error("unknown fleet manager class `{0}`")]
    UnknownFleetManager(String),
}

/// Everything a run needs, as read from the properties file.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub map_json_file: PathBuf,
    pub dataset_file: PathBuf,
    pub bounding_polygon_kml_file: PathBuf,
    pub agent_class: String,
    pub fleet_manager: FleetManagerKind,
    pub number_of_agents: usize,
    /// Request life in whole seconds.
    pub resource_maximum_life_time: u64,
    pub dynamic_traffic: bool,
    /// Calibration window in whole seconds.
    pub traffic_pattern_epoch: u64,
    /// Calibration step in whole seconds.
    pub traffic_pattern_step: u64,
    /// Negative means "draw one at random".
    pub agent_placement_seed: i64,
    pub logging: bool,
    /// Fixed offset of the map's clock east of UTC, in seconds. The map is
    /// assumed to fall into a single time zone.
    pub time_zone_offset: i64,
}

impl RunConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_str_content(&text)
    }

    pub fn from_str_content(text: &str) -> Result<Self, ConfigError> {
        let options = parse_properties(text);

        let agent_class = required(&options, "agent_class")?.to_string();
        let fleet_manager = FleetManagerKind::from_name(&agent_class)
            .ok_or_else(|| ConfigError::UnknownFleetManager(agent_class.clone()))?;

        let number_of_agents: usize = parse(&options, "number_of_agents")?;
        if number_of_agents == 0 {
            return Err(ConfigError::Invalid {
                key: "number_of_agents",
                value: "0".into(),
            });
        }

        Ok(Self {
            map_json_file: PathBuf::from(required(&options, "map_JSON_file")?),
            dataset_file: PathBuf::from(required(&options, "dataset_file")?),
            bounding_polygon_kml_file: PathBuf::from(required(
                &options,
                "bounding_polygon_KML_file",
            )?),
            agent_class,
            fleet_manager,
            number_of_agents,
            resource_maximum_life_time: parse(&options, "resource_maximum_life_time")?,
            dynamic_traffic: parse_or(&options, "dynamic_traffic", false)?,
            traffic_pattern_epoch: parse_or(&options, "traffic_pattern_epoch", 900)?,
            traffic_pattern_step: parse_or(&options, "traffic_pattern_step", 60)?,
            agent_placement_seed: parse_or(&options, "agent_placement_seed", -1)?,
            logging: parse_or(&options, "logging", false)?,
            time_zone_offset: parse_or(&options, "time_zone_offset", 0)?,
        })
    }

    /// The placement seed, drawing a random one when the config says so.
    pub fn resolved_seed(&self) -> u64 {
        if self.agent_placement_seed < 0 {
            rand::thread_rng().gen()
        } else {
            self.agent_placement_seed as u64
        }
    }

    pub fn simulation_params(&self, seed: u64) -> SimulationParams {
        SimulationParams::default()
            .with_number_of_agents(self.number_of_agents)
            .with_seed(seed)
            .with_maximum_life_secs(self.resource_maximum_life_time)
            .with_fleet_manager(self.fleet_manager)
            .with_dynamic_traffic(self.dynamic_traffic)
            .with_pattern_windows_secs(self.traffic_pattern_epoch, self.traffic_pattern_step)
    }
}

/// `key = value` lines; `#`, `!`, and `[section]` lines are ignored.
fn parse_properties(text: &str) -> HashMap<String, String> {
    let mut options = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') || line.starts_with('[')
        {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            options.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    options
}

fn required<'a>(
    options: &'a HashMap<String, String>,
    key: &'static str,
) -> Result<&'a str, ConfigError> {
    options
        .get(key)
        .map(String::as_str)
        .ok_or(ConfigError::Missing(key))
}

fn parse<T: FromStr>(
    options: &HashMap<String, String>,
    key: &'static str,
) -> Result<T, ConfigError> {
    let value = required(options, key)?;
    parse_value(key, value)
}

fn parse_or<T: FromStr>(
    options: &HashMap<String, String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match options.get(key) {
        None => Ok(default),
        Some(value) => parse_value(key, value),
    }
}

fn parse_value<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    // Booleans also accept the yes/no spelling older configs use.
    let normalized = match value.to_ascii_lowercase().as_str() {
        "yes" | "on" => "true".to_string(),
        "no" | "off" => "false".to_string(),
        other => other.to_string(),
    };
    normalized.parse().map_err(|_| ConfigError::Invalid {
        key,
        value: value.to_string(),
    })
}
