use clap::Parser;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Speed of light in vacuum [m/s].
pub const LIGHT_SPEED: f64 = 299_792_458.0;
/// Boltzmann constant [J/K].
pub const BOLTZMANN: f64 = 1.380_649e-23;
/// Number of receivers handled by one work unit.
pub const BATCH_SIZE: usize = 100;
/// Scaling factor for integer coordinates during clipping.
pub const CLIP_TOLERANCE: f64 = 1e6;
/// Distance below which two points are considered the same [m].
pub const GEOMETRY_EPSILON: f64 = 1e-9;
/// Matching tolerance for wall endpoints after integer clipping [m].
pub const WALL_SNAP_EPSILON: f64 = 1e-6;
/// Distance of an optimizer candidate position from its corner [m].
pub const CORNER_OFFSET_DISTANCE: f64 = 2.0;
/// Hard cap on the reflection recursion depth.
pub const MAX_REFLECTIONS_LIMIT: u32 = 99;

/// Runtime configuration for a simulation run.
///
/// Read-only while a run is in flight. Lengths are meters, frequencies Hz,
/// angles radians, temperatures Kelvin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Depth cap of the image-method recursion.
    pub max_reflections: u32,
    /// Compute specular reflections even when the direct path is blocked.
    pub nlos_reflections_enabled: bool,
    /// Relative permittivity of all wall material.
    pub relative_permittivity: f64,
    /// Height of transmitters and receivers above ground [m].
    pub simulation_height: f64,
    /// Receiver bandwidth [Hz], enters the noise floor.
    pub bandwidth: f64,
    /// System temperature [K], enters the noise floor.
    pub temperature: f64,
    /// Receiver noise figure [dB].
    pub noise_figure: f64,
    /// SNR threshold for the coverage flag [dB].
    pub target_snr: f64,
    /// Distance below which a receiver is out of the far-field model [m].
    pub min_valid_radius: f64,
    /// Distance beyond which no paths are evaluated [m].
    #[serde(default = "default_pruning_radius")]
    pub pruning_radius: f64,
}

fn default_pruning_radius() -> f64 {
    f64::INFINITY
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_reflections: 3,
            nlos_reflections_enabled: false,
            relative_permittivity: 5.0,
            simulation_height: 2.0,
            bandwidth: 200e6,
            temperature: 293.15,
            noise_figure: 10.0,
            target_snr: 2.0,
            min_valid_radius: 10.0,
            pruning_radius: f64::INFINITY,
        }
    }
}

/// A configuration problem detected before a run is launched.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("max_reflections {0} exceeds the supported limit of {MAX_REFLECTIONS_LIMIT}")]
    TooManyReflections(u32),

    #[error("relative permittivity must be greater than 1, got {0}")]
    InvalidPermittivity(f64),

    #[error("bandwidth must be positive, got {0} Hz")]
    InvalidBandwidth(f64),

    #[error("temperature must be positive, got {0} K")]
    InvalidTemperature(f64),

    #[error("target SNR of {0} dB is outside the plausible range [-50, 200]")]
    AbsurdTargetSnr(f64),

    #[error("simulation height must be positive, got {0} m")]
    InvalidHeight(f64),

    #[error("minimum valid radius must be positive, got {0} m")]
    InvalidMinRadius(f64),

    #[error("emitter frequency must be positive, got {0} Hz")]
    InvalidFrequency(f64),

    #[error("antenna efficiency must be in (0, 1], got {0}")]
    InvalidEfficiency(f64),

    #[error("the transmitter set is empty")]
    NoEmitters,

    #[error("a simulation is already running")]
    AlreadyRunning,
}

impl Settings {
    /// Checks every parameter against its allowed range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_reflections > MAX_REFLECTIONS_LIMIT {
            return Err(ConfigError::TooManyReflections(self.max_reflections));
        }
        if !(self.relative_permittivity > 1.0) {
            return Err(ConfigError::InvalidPermittivity(self.relative_permittivity));
        }
        if !(self.bandwidth > 0.0) {
            return Err(ConfigError::InvalidBandwidth(self.bandwidth));
        }
        if !(self.temperature > 0.0) {
            return Err(ConfigError::InvalidTemperature(self.temperature));
        }
        if !(-50.0..=200.0).contains(&self.target_snr) {
            return Err(ConfigError::AbsurdTargetSnr(self.target_snr));
        }
        if !(self.simulation_height > 0.0) {
            return Err(ConfigError::InvalidHeight(self.simulation_height));
        }
        if !(self.min_valid_radius > 0.0) {
            return Err(ConfigError::InvalidMinRadius(self.min_valid_radius));
        }
        Ok(())
    }

    /// Noise floor at the receiver input [dBm]: thermal noise plus the
    /// noise figure.
    pub fn noise_floor_dbm(&self) -> f64 {
        10.0 * (BOLTZMANN * self.temperature * self.bandwidth / 1e-3).log10() + self.noise_figure
    }
}

/// Loads the configuration from `config/default.toml` (when present),
/// overridden by `WAVETRACE_`-prefixed environment variables.
pub fn load_config(config_dir: Option<&Path>) -> anyhow::Result<Settings> {
    let mut builder = Config::builder();

    if let Some(dir) = config_dir {
        let default_file = dir.join("default.toml");
        builder = builder.add_source(File::from(default_file).required(false));
    }

    let raw = builder
        .add_source(Environment::with_prefix("wavetrace"))
        .build()?;

    // Fall back to compiled-in defaults for anything the sources omit
    let defaults = Settings::default();
    let settings = Settings {
        max_reflections: raw
            .get_int("max_reflections")
            .map(|v| v as u32)
            .unwrap_or(defaults.max_reflections),
        nlos_reflections_enabled: raw
            .get_bool("nlos_reflections_enabled")
            .unwrap_or(defaults.nlos_reflections_enabled),
        relative_permittivity: raw
            .get_float("relative_permittivity")
            .unwrap_or(defaults.relative_permittivity),
        simulation_height: raw
            .get_float("simulation_height")
            .unwrap_or(defaults.simulation_height),
        bandwidth: raw.get_float("bandwidth").unwrap_or(defaults.bandwidth),
        temperature: raw.get_float("temperature").unwrap_or(defaults.temperature),
        noise_figure: raw
            .get_float("noise_figure")
            .unwrap_or(defaults.noise_figure),
        target_snr: raw.get_float("target_snr").unwrap_or(defaults.target_snr),
        min_valid_radius: raw
            .get_float("min_valid_radius")
            .unwrap_or(defaults.min_valid_radius),
        pruning_radius: raw
            .get_float("pruning_radius")
            .unwrap_or(defaults.pruning_radius),
    };

    settings.validate()?;

    Ok(settings)
}

/// Applies command-line overrides on top of loaded settings.
pub fn apply_cli_overrides(settings: &mut Settings, args: &CliArgs) {
    if let Some(rec) = args.reflections {
        settings.max_reflections = rec;
    }
    if args.nlos {
        settings.nlos_reflections_enabled = true;
    }
    if let Some(eps) = args.permittivity {
        settings.relative_permittivity = eps;
    }
    if let Some(h) = args.height {
        settings.simulation_height = h;
    }
    if let Some(snr) = args.target_snr {
        settings.target_snr = snr;
    }
    if let Some(r) = args.pruning_radius {
        settings.pruning_radius = r;
    }
}

#[derive(Parser, Debug)]
#[command(version, about = "wavetrace - 2-D ray-tracing radio propagation engine")]
pub struct CliArgs {
    /// Scene file to simulate.
    pub scene: std::path::PathBuf,

    /// Maximum number of specular reflections per path.
    #[arg(long)]
    pub reflections: Option<u32>,

    /// Also compute reflections when the direct path is blocked.
    #[arg(long)]
    pub nlos: bool,

    /// Relative permittivity of the wall material.
    #[arg(long)]
    pub permittivity: Option<f64>,

    /// Transmitter and receiver height above ground, in meters.
    #[arg(long)]
    pub height: Option<f64>,

    /// Coverage SNR threshold, in dB.
    #[arg(long)]
    pub target_snr: Option<f64>,

    /// Skip all paths for transmitter-receiver pairs farther apart than this, in meters.
    #[arg(long)]
    pub pruning_radius: Option<f64>,

    /// Fade margin used for the coverage flag, in dB.
    #[arg(long, default_value_t = 0.0)]
    pub fade_margin: f64,

    /// Run the greedy placement optimizer instead of a plain simulation.
    #[arg(long)]
    pub optimize: bool,

    /// Coverage ratio the optimizer aims for.
    #[arg(long, default_value_t = 0.9)]
    pub coverage_target: f64,
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Settings:
  - Max reflections: {}
  - NLOS reflections: {}
  - Relative permittivity: {:.2}
  - Simulation height: {:.2} m
  - Bandwidth: {:.3e} Hz
  - Temperature: {:.2} K
  - Noise figure: {:.1} dB
  - Target SNR: {:.1} dB
  - Valid radii: [{:.1}, {:.1}] m
  ",
            self.max_reflections,
            self.nlos_reflections_enabled,
            self.relative_permittivity,
            self.simulation_height,
            self.bandwidth,
            self.temperature,
            self.noise_figure,
            self.target_snr,
            self.min_valid_radius,
            self.pruning_radius,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn rejects_absurd_target_snr() {
        let settings = Settings {
            target_snr: 1e6,
            ..Settings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::AbsurdTargetSnr(_))
        ));
    }

    #[test]
    fn rejects_excessive_reflections() {
        let settings = Settings {
            max_reflections: 100,
            ..Settings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::TooManyReflections(100))
        ));
    }

    #[test]
    fn noise_floor_matches_closed_form() {
        let settings = Settings::default();
        let expected = 10.0 * (BOLTZMANN * 293.15 * 200e6 / 1e-3).log10() + 10.0;
        assert!((settings.noise_floor_dbm() - expected).abs() < 1e-12);
        // kTB for 200 MHz at 293.15 K is about -90.9 dBm
        assert!((expected + 80.9).abs() < 0.5);
    }
}
