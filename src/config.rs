use crate::grid::Position;
use crate::utils::check_num;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

/// Simulation configuration parameters.
///
/// Loaded from a TOML file and validated before use.
/// See [`Config::from_file`] for loading.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Config {
    pub model: ModelConfig,
    #[serde(default)]
    pub init: InitConfig,
    pub output: OutputConfig,
}

/// Crime areas placed at construction.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CrimeAreas {
    /// Number of areas with random centroids.
    Count(usize),
    /// Explicit centroids.
    Centroids(Vec<Position>),
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Number of possible victims.
    pub n_victims: usize,
    /// Number of possible offenders.
    pub n_offenders: usize,

    /// Static crime areas.
    pub crime_areas: CrimeAreas,
    /// Radius of every static crime area.
    pub crime_area_radius: usize,
    /// Radius of the crime attractor spawned by each crime.
    #[serde(default = "default_hotspot_radius")]
    pub hotspot_radius: usize,

    /// Upper bound of the offenders' criminal preference.
    pub max_criminal_preference: f64,
    /// Reference population for the population-normalized crime rate.
    pub pop_count: usize,

    /// Grid width.
    pub width: usize,
    /// Grid height.
    pub height: usize,
}

fn default_hotspot_radius() -> usize {
    1
}

#[derive(Debug, PartialEq, Clone, Default, Serialize, Deserialize)]
pub struct InitConfig {
    /// Seed of the random number generator (drawn from the OS if absent).
    pub seed: Option<u64>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Number of ticks run per trajectory file.
    pub steps_per_file: usize,
    /// Number of ticks between agent snapshots.
    pub steps_per_save: usize,
}

impl Config {
    /// Load a [`Config`] from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, deserialized,
    /// or if the configuration values are invalid.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let contents =
            fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;

        let config: Config = toml::from_str(&contents).context("failed to deserialize config")?;

        config.validate().context("failed to validate config")?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.model
            .validate()
            .context("invalid model parameters")?;

        check_num(self.output.steps_per_file, 1..).context("invalid number of steps per file")?;
        check_num(self.output.steps_per_save, 1..).context("invalid number of steps per save")?;

        Ok(())
    }
}

impl ModelConfig {
    pub fn validate(&self) -> Result<()> {
        check_num(self.width, 1..).context("invalid grid width")?;
        check_num(self.height, 1..).context("invalid grid height")?;

        check_num(self.max_criminal_preference, 0.0..=1.0)
            .context("invalid maximum criminal preference")?;
        check_num(self.pop_count, 1..).context("invalid population count")?;

        if let CrimeAreas::Centroids(centroids) = &self.crime_areas {
            for (i_cen, cen) in centroids.iter().enumerate() {
                if cen.x >= self.width || cen.y >= self.height {
                    bail!(
                        "crime area centroid {i_cen} at {cen} is outside the {}x{} grid",
                        self.width,
                        self.height
                    );
                }
            }
        }

        Ok(())
    }
}
