//! Grid sweep: one autoignition simulation per (equivalence ratio, fuel) cell
//!
//! Each case gets freshly allocated metric grids, so values from one case
//! can never show up in the next. Cells are independent; the engine walks an
//! explicit work-list either sequentially or through a rayon parallel map
//! where every worker owns its own gas object.

use std::fmt;

use anyhow::{anyhow, Context, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config;
use crate::grid::{GridIndex, MetricGrid, SweepGrid};
use crate::kinetics::{GasMixture, KineticsBackend, Reactor};
use crate::mixture::MixtureSpec;
use crate::report::Metric;

/// Standard atmosphere (Pa)
pub const ONE_ATM: f64 = 101_325.0;

/// Initial condition swept over the whole grid
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Case {
    /// Initial temperature (K)
    pub temperature: f64,
    /// Initial pressure (Pa)
    pub pressure: f64,
}

impl Case {
    pub fn new(temperature: f64, pressure: f64) -> Self {
        Self {
            temperature,
            pressure,
        }
    }

    pub fn pressure_atm(&self) -> f64 {
        self.pressure / ONE_ATM
    }
}

impl fmt::Display for Case {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "T={}K, p={:?}atm",
            self.temperature as i64,
            self.pressure_atm()
        )
    }
}

/// Pressure used as the "previous step" before the first step
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RateSeed {
    /// One standard atmosphere regardless of the case
    #[default]
    OneAtm,
    /// The case's own initial pressure
    Initial,
}

impl RateSeed {
    pub fn pressure(self, case: &Case) -> f64 {
        match self {
            RateSeed::OneAtm => ONE_ATM,
            RateSeed::Initial => case.pressure,
        }
    }
}

/// Fixed-step time schedule of one cell
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Schedule {
    pub steps: usize,
    pub dt: f64,
    pub rate_seed: RateSeed,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            steps: 1000,
            dt: 0.001,
            rate_seed: RateSeed::OneAtm,
        }
    }
}

impl Schedule {
    pub fn from_config(integration: &config::Integration) -> Self {
        Self {
            steps: integration.steps,
            dt: integration.dt,
            rate_seed: integration.rate_seed,
        }
    }
}

/// Running maxima kept from one simulation
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct CellMaxima {
    /// K
    pub temperature: f64,
    /// Pa
    pub pressure: f64,
    /// Pa/s, backward difference over one step
    pub pressure_rate: f64,
}

/// State after one integration step
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct TraceSample {
    pub step: usize,
    pub time: f64,
    pub temperature: f64,
    pub pressure: f64,
    pub pressure_rate: f64,
}

/// Simulate autoignition of `mixture` from `case` and keep the running maxima.
///
/// Maxima start from the gas state before the first step and a zero rate.
/// `observe` sees every step; the trace itself is not stored.
pub fn simulate_cell<B: KineticsBackend>(
    backend: &B,
    gas: &mut B::Gas,
    case: &Case,
    mixture: &MixtureSpec,
    schedule: &Schedule,
    mut observe: impl FnMut(&TraceSample),
) -> Result<CellMaxima> {
    gas.set_mole_fractions(mixture)?;
    gas.set_temperature_pressure(case.temperature, case.pressure)?;

    let mut max = CellMaxima {
        temperature: gas.temperature(),
        pressure: gas.pressure(),
        pressure_rate: 0.0,
    };
    let mut previous = schedule.rate_seed.pressure(case);

    let mut reactor = backend.new_reactor(gas)?;
    let mut time = 0.0;
    for step in 0..schedule.steps {
        time += schedule.dt;
        reactor.advance(time)?;

        let temperature = reactor.temperature();
        let pressure = reactor.pressure();
        let rate = (pressure - previous) / schedule.dt;

        if temperature > max.temperature {
            max.temperature = temperature;
        }
        if pressure > max.pressure {
            max.pressure = pressure;
        }
        if rate > max.pressure_rate {
            max.pressure_rate = rate;
        }
        previous = pressure;

        observe(&TraceSample {
            step: step + 1,
            time,
            temperature,
            pressure,
            pressure_rate: rate,
        });
    }

    Ok(max)
}

/// The three metric grids of one case
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CaseMetrics {
    pub case: Case,
    pub temperature: MetricGrid,
    pub pressure: MetricGrid,
    pub pressure_rate: MetricGrid,
}

impl CaseMetrics {
    pub fn new(case: Case, grid: &SweepGrid) -> Self {
        Self {
            case,
            temperature: grid.empty_metric(),
            pressure: grid.empty_metric(),
            pressure_rate: grid.empty_metric(),
        }
    }

    pub fn store(&mut self, at: GridIndex, max: CellMaxima) {
        self.temperature.set(at, max.temperature);
        self.pressure.set(at, max.pressure);
        self.pressure_rate.set(at, max.pressure_rate);
    }

    pub fn cell(&self, at: GridIndex) -> CellMaxima {
        CellMaxima {
            temperature: self.temperature.get(at),
            pressure: self.pressure.get(at),
            pressure_rate: self.pressure_rate.get(at),
        }
    }

    pub fn grid(&self, metric: Metric) -> &MetricGrid {
        match metric {
            Metric::Temperature => &self.temperature,
            Metric::Pressure => &self.pressure,
            Metric::PressureRate => &self.pressure_rate,
        }
    }
}

pub struct GridSweepEngine<'a, B: KineticsBackend> {
    backend: &'a B,
    grid: &'a SweepGrid,
    schedule: Schedule,
    parallel: bool,
}

impl<'a, B: KineticsBackend> GridSweepEngine<'a, B> {
    pub fn new(backend: &'a B, grid: &'a SweepGrid, schedule: Schedule) -> Self {
        Self {
            backend,
            grid,
            schedule,
            parallel: false,
        }
    }

    /// Spread cells over the rayon pool. Ignored for backends that are not thread-safe.
    pub fn parallel(mut self, enabled: bool) -> Self {
        if enabled && !self.backend.thread_safe() {
            warn!(
                backend = self.backend.name(),
                "backend is not thread-safe, sweeping sequentially"
            );
            self.parallel = false;
        } else {
            self.parallel = enabled;
        }
        self
    }

    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    /// Populate every cell of a fresh set of grids for `case`
    pub fn run_case(&self, case: &Case) -> Result<CaseMetrics> {
        let cells = self.grid.indices();

        let results: Vec<(GridIndex, CellMaxima)> = if self.parallel {
            cells
                .par_iter()
                .map_init(
                    || self.backend.new_gas(),
                    |gas, &at| -> Result<(GridIndex, CellMaxima)> {
                        let gas = gas.as_mut().map_err(|e| anyhow!("creating gas: {:#}", e))?;
                        Ok((at, self.run_cell(gas, case, at)?))
                    },
                )
                .collect::<Result<_>>()?
        } else {
            let mut gas = self.backend.new_gas().context("creating gas")?;
            cells
                .iter()
                .map(|&at| -> Result<(GridIndex, CellMaxima)> {
                    Ok((at, self.run_cell(&mut gas, case, at)?))
                })
                .collect::<Result<_>>()?
        };

        let mut metrics = CaseMetrics::new(*case, self.grid);
        for (at, max) in results {
            metrics.store(at, max);
        }
        Ok(metrics)
    }

    fn run_cell(&self, gas: &mut B::Gas, case: &Case, at: GridIndex) -> Result<CellMaxima> {
        let (phi, x_ch4) = self.grid.coordinates(at);
        let mixture = MixtureSpec::new(x_ch4, phi);
        let max = simulate_cell(self.backend, gas, case, &mixture, &self.schedule, |_| {})
            .with_context(|| format!("case {}, cell phi={} x_CH4={}", case, phi, x_ch4))?;
        debug!(
            phi,
            x_ch4,
            t_max = max.temperature,
            p_max = max.pressure,
            dp_max = max.pressure_rate,
            "cell done"
        );
        Ok(max)
    }
}
