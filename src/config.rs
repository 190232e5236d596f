use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::sweep::{Case, RateSeed, ONE_ATM};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Root {
    pub program: Program,
    pub sweep: Sweep,
    pub integration: Integration,
    pub solver: Solver,
    pub cases: Vec<CaseSpec>,
    pub output: Output,
    pub parallel: Parallel,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Program {
    pub name: String,
    pub version: String,
}

impl Default for Program {
    fn default() -> Self {
        Self {
            name: "autoignition-sweep".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Sample ranges of the two sweep axes
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Sweep {
    /// Methane share in the fuel blend
    pub fuel_points: usize,
    pub fuel_min: f64,
    pub fuel_max: f64,
    /// Fuel-air equivalence ratio
    pub phi_points: usize,
    pub phi_min: f64,
    pub phi_max: f64,
}

impl Default for Sweep {
    fn default() -> Self {
        Self {
            fuel_points: 21,
            fuel_min: 0.0,
            fuel_max: 1.0,
            phi_points: 21,
            phi_min: 0.0,
            phi_max: 10.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Integration {
    pub steps: usize,
    /// Step size in seconds
    pub dt: f64,
    /// Previous-pressure seed of the pressure-rate difference
    pub rate_seed: RateSeed,
}

impl Default for Integration {
    fn default() -> Self {
        Self {
            steps: 1000,
            dt: 0.001,
            rate_seed: RateSeed::OneAtm,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Solver {
    /// Mechanism file handed to the kinetics backend
    pub mechanism: String,
    /// Phase name inside the mechanism (empty = first phase)
    pub phase: String,
    /// Reactor model name
    pub reactor: String,
}

impl Default for Solver {
    fn default() -> Self {
        Self {
            mechanism: "gri30.yaml".to_string(),
            phase: String::new(),
            reactor: "IdealGasReactor".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct CaseSpec {
    /// Initial temperature (K)
    pub temperature: f64,
    /// Initial pressure in standard atmospheres
    pub pressure_atm: f64,
}

impl CaseSpec {
    pub fn to_case(self) -> Case {
        Case::new(self.temperature, self.pressure_atm * ONE_ATM)
    }
}

fn default_cases() -> Vec<CaseSpec> {
    [
        (890.0, 1.0),
        (950.0, 1.0),
        (1000.0, 1.0),
        (1050.0, 1.0),
        (1100.0, 1.0),
        (950.0, 1.0),
        (950.0, 1.5),
        (950.0, 2.0),
        (950.0, 3.0),
    ]
    .into_iter()
    .map(|(temperature, pressure_atm)| CaseSpec {
        temperature,
        pressure_atm,
    })
    .collect()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Output {
    pub figures_dir: String,
    /// Create `figures_dir` when missing instead of failing
    pub create_dir: bool,
    /// Raster resolution of the figures. The reference plots were saved at
    /// 1000 dpi; set `dpi = 1000` to reproduce their pixel size.
    pub dpi: u32,
    pub width_cm: f64,
    pub height_cm: f64,
    /// Per-cell CSV table of every case
    pub csv: Option<String>,
    /// JSON summary bundle
    pub json: Option<String>,
}

impl Default for Output {
    fn default() -> Self {
        Self {
            figures_dir: "Figures".to_string(),
            create_dir: false,
            dpi: 100,
            width_cm: 30.0,
            height_cm: 20.0,
            csv: None,
            json: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Parallel {
    pub enabled: bool,
    /// Worker threads (0 = one per core)
    pub threads: usize,
}

impl Root {
    /// Parse a TOML document. An empty document yields the built-in sweep.
    pub fn from_toml(text: &str) -> Result<Self> {
        let mut root: Root = toml::from_str(text)?;
        if root.cases.is_empty() {
            root.cases = default_cases();
        }
        Ok(root)
    }

    pub fn builtin() -> Self {
        Self {
            cases: default_cases(),
            ..Self::default()
        }
    }

    pub fn cases(&self) -> Vec<Case> {
        self.cases.iter().map(|c| c.to_case()).collect()
    }

    /// Plot size in pixels
    pub fn image_size(&self) -> (u32, u32) {
        let px = |cm: f64| (cm / 2.54 * f64::from(self.output.dpi)).round() as u32;
        (px(self.output.width_cm), px(self.output.height_cm))
    }

    pub fn validate(&self) -> Result<()> {
        let s = &self.sweep;
        if s.fuel_points < 2 || s.phi_points < 2 {
            bail!("sweep.fuel_points and sweep.phi_points must be >= 2");
        }
        if !(0.0..=1.0).contains(&s.fuel_min) || !(0.0..=1.0).contains(&s.fuel_max) {
            bail!("sweep.fuel_min and sweep.fuel_max must be in [0, 1]");
        }
        if s.fuel_min > s.fuel_max {
            bail!("sweep.fuel_min must be <= sweep.fuel_max");
        }
        if s.phi_min < 0.0 {
            bail!("sweep.phi_min must be >= 0");
        }
        if s.phi_min > s.phi_max {
            bail!("sweep.phi_min must be <= sweep.phi_max");
        }

        if self.integration.steps == 0 {
            bail!("integration.steps must be >= 1");
        }
        if !(self.integration.dt > 0.0 && self.integration.dt.is_finite()) {
            bail!("integration.dt must be positive");
        }

        if self.solver.mechanism.trim().is_empty() {
            bail!("solver.mechanism must not be empty");
        }
        if self.solver.reactor.trim().is_empty() {
            bail!("solver.reactor must not be empty");
        }

        if self.cases.is_empty() {
            bail!("at least one [[cases]] entry is required");
        }
        for (k, case) in self.cases.iter().enumerate() {
            if !(case.temperature > 0.0 && case.temperature.is_finite()) {
                bail!("cases[{}].temperature must be positive", k);
            }
            if !(case.pressure_atm > 0.0 && case.pressure_atm.is_finite()) {
                bail!("cases[{}].pressure_atm must be positive", k);
            }
        }

        if self.output.figures_dir.trim().is_empty() {
            bail!("output.figures_dir must not be empty");
        }
        if !(10..=1200).contains(&self.output.dpi) {
            bail!("output.dpi must be in [10, 1200]");
        }
        if self.output.width_cm <= 0.0 || self.output.height_cm <= 0.0 {
            bail!("output.width_cm and output.height_cm must be positive");
        }

        Ok(())
    }
}
