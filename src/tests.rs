//! Sweep scenarios driven by a scripted kinetics backend
//!
//! The scripted backend replays closed-form temperature and pressure
//! histories, so every expected maximum can be written down exactly.

use std::collections::HashMap;

use anyhow::{bail, Result};
use approx::assert_relative_eq;

use crate::config;
use crate::grid::{linspace, GridIndex, SweepGrid};
use crate::kinetics::{GasMixture, KineticsBackend, Reactor};
use crate::mixture::{stoichiometric_o2, MixtureSpec};
use crate::report::{plot_path, Metric};
use crate::runner::{self, CellRequest};
use crate::sweep::{simulate_cell, Case, GridSweepEngine, RateSeed, Schedule, ONE_ATM};

/// Gas state the reactor starts from
#[derive(Clone, Debug)]
struct Start {
    temperature: f64,
    pressure: f64,
    fuel: f64,
}

/// (start, step number, step size) -> value
type Profile = Box<dyn Fn(&Start, usize, f64) -> f64 + Send + Sync>;

struct ScriptedBackend {
    temperature: Profile,
    pressure: Profile,
    thread_safe: bool,
    /// Fail reactor construction for mixtures with exactly this fuel mole fraction
    fail_when_fuel_is: Option<f64>,
}

impl ScriptedBackend {
    fn new(temperature: Profile, pressure: Profile) -> Self {
        Self {
            temperature,
            pressure,
            thread_safe: true,
            fail_when_fuel_is: None,
        }
    }

    /// Temperature climbs with fuel content, pressure follows temperature
    fn ignition() -> Self {
        Self::new(
            Box::new(|s: &Start, k: usize, _: f64| s.temperature + 2000.0 * s.fuel * (k as f64 / (k as f64 + 50.0))),
            Box::new(|s: &Start, k: usize, _: f64| s.pressure * (1.0 + 3.0 * s.fuel * (k as f64 / (k as f64 + 50.0)))),
        )
    }
}

#[derive(Default)]
struct ScriptedGas {
    x: HashMap<String, f64>,
    temperature: f64,
    pressure: f64,
}

impl GasMixture for ScriptedGas {
    fn set_mole_fractions(&mut self, mixture: &MixtureSpec) -> Result<()> {
        let total: f64 = mixture.amounts().iter().map(|(_, v)| v).sum();
        if total <= 0.0 {
            bail!("empty composition");
        }
        self.x = mixture
            .amounts()
            .iter()
            .map(|&(name, v)| (name.to_string(), v / total))
            .collect();
        Ok(())
    }

    fn set_temperature_pressure(&mut self, temperature: f64, pressure: f64) -> Result<()> {
        self.temperature = temperature;
        self.pressure = pressure;
        Ok(())
    }

    fn temperature(&self) -> f64 {
        self.temperature
    }

    fn pressure(&self) -> f64 {
        self.pressure
    }

    fn mole_fraction(&self, species: &str) -> Result<f64> {
        match self.x.get(species) {
            Some(&v) => Ok(v),
            None => bail!("unknown species {}", species),
        }
    }
}

struct ScriptedReactor<'g> {
    backend: &'g ScriptedBackend,
    start: Start,
    dt: Option<f64>,
    temperature: f64,
    pressure: f64,
}

impl Reactor for ScriptedReactor<'_> {
    fn advance(&mut self, time: f64) -> Result<()> {
        // first call fixes the step size
        let dt = *self.dt.get_or_insert(time);
        let k = (time / dt).round() as usize;
        self.temperature = (self.backend.temperature)(&self.start, k, dt);
        self.pressure = (self.backend.pressure)(&self.start, k, dt);
        Ok(())
    }

    fn temperature(&self) -> f64 {
        self.temperature
    }

    fn pressure(&self) -> f64 {
        self.pressure
    }
}

impl KineticsBackend for ScriptedBackend {
    type Gas = ScriptedGas;
    type Reactor<'g> = ScriptedReactor<'g>;

    fn name(&self) -> &str {
        "scripted"
    }

    fn thread_safe(&self) -> bool {
        self.thread_safe
    }

    fn new_gas(&self) -> Result<ScriptedGas> {
        Ok(ScriptedGas::default())
    }

    fn new_reactor<'g>(&'g self, gas: &'g mut ScriptedGas) -> Result<ScriptedReactor<'g>> {
        let fuel = gas.mole_fraction("CH4")? + gas.mole_fraction("C2H6")?;
        if self.fail_when_fuel_is == Some(fuel) {
            bail!("integrator failure");
        }
        Ok(ScriptedReactor {
            backend: self,
            start: Start {
                temperature: gas.temperature,
                pressure: gas.pressure,
                fuel,
            },
            dt: None,
            temperature: gas.temperature,
            pressure: gas.pressure,
        })
    }
}

fn small_grid() -> SweepGrid {
    SweepGrid::new(linspace(0.0, 1.0, 5), linspace(0.0, 10.0, 6))
}

fn full_grid() -> SweepGrid {
    SweepGrid::from_config(&config::Sweep::default())
}

// =============================================================================
// Single cell
// =============================================================================

#[test]
fn test_pressure_rate_from_known_trace() {
    let trace = [101_325.0, 101_375.0, 101_395.0, 101_695.0, 101_600.0, 101_700.0];
    let backend = ScriptedBackend::new(
        Box::new(|s: &Start, _: usize, _: f64| s.temperature),
        Box::new(move |_: &Start, k: usize, _: f64| trace[k - 1]),
    );
    let schedule = Schedule {
        steps: trace.len(),
        ..Schedule::default()
    };
    let case = Case::new(1000.0, ONE_ATM);
    let mut gas = backend.new_gas().unwrap();
    let mut seen = Vec::new();
    let max = simulate_cell(
        &backend,
        &mut gas,
        &case,
        &MixtureSpec::new(0.5, 1.0),
        &schedule,
        |s| seen.push(*s),
    )
    .unwrap();

    let mut previous = ONE_ATM;
    let mut expected = 0.0f64;
    for &p in &trace {
        expected = expected.max((p - previous) / 0.001);
        previous = p;
    }
    assert_eq!(max.pressure_rate, expected);
    assert_relative_eq!(max.pressure_rate, 300_000.0, epsilon = 1e-6);
    assert_eq!(max.pressure, 101_700.0);
    assert_eq!(max.temperature, 1000.0);

    assert_eq!(seen.len(), trace.len());
    assert_eq!(seen[0].step, 1);
    assert_eq!(seen[0].pressure_rate, 0.0);
    assert_relative_eq!(seen[1].pressure_rate, 50_000.0, epsilon = 1e-6);
    assert!(seen[4].pressure_rate < 0.0);
}

fn temperature_ramp(steps: usize) -> ScriptedBackend {
    ScriptedBackend::new(
        Box::new(move |s: &Start, k: usize, _: f64| s.temperature + 500.0 * k as f64 / steps as f64),
        Box::new(|s: &Start, _: usize, _: f64| s.pressure),
    )
}

#[test]
fn test_temperature_ramp_at_one_atm() {
    let backend = temperature_ramp(1000);
    let case = Case::new(950.0, ONE_ATM);
    let mut gas = backend.new_gas().unwrap();
    let max = simulate_cell(
        &backend,
        &mut gas,
        &case,
        &MixtureSpec::new(0.3, 2.0),
        &Schedule::default(),
        |_| {},
    )
    .unwrap();

    assert_eq!(max.temperature, 1450.0);
    assert_eq!(max.pressure, ONE_ATM);
    assert_eq!(max.pressure_rate, 0.0);
}

#[test]
fn test_temperature_ramp_above_one_atm_keeps_seed_jump() {
    let backend = temperature_ramp(1000);
    let case = Case::new(950.0, 2.0 * ONE_ATM);
    let mut gas = backend.new_gas().unwrap();
    let max = simulate_cell(
        &backend,
        &mut gas,
        &case,
        &MixtureSpec::new(0.3, 2.0),
        &Schedule::default(),
        |_| {},
    )
    .unwrap();

    assert_eq!(max.temperature, 1450.0);
    assert_eq!(max.pressure, 2.0 * ONE_ATM);
    // the only rise is the jump from the one-atmosphere seed to the case pressure
    assert_relative_eq!(max.pressure_rate, ONE_ATM / 0.001, max_relative = 1e-12);
}

#[test]
fn test_initial_rate_seed_removes_jump() {
    let backend = temperature_ramp(1000);
    let case = Case::new(950.0, 3.0 * ONE_ATM);
    let schedule = Schedule {
        rate_seed: RateSeed::Initial,
        ..Schedule::default()
    };
    let mut gas = backend.new_gas().unwrap();
    let max = simulate_cell(
        &backend,
        &mut gas,
        &case,
        &MixtureSpec::new(0.3, 2.0),
        &schedule,
        |_| {},
    )
    .unwrap();
    assert_eq!(max.pressure_rate, 0.0);
}

#[test]
fn test_maxima_start_from_initial_state() {
    // everything falls after ignition; the initial state stays the maximum
    let backend = ScriptedBackend::new(
        Box::new(|s: &Start, k: usize, _: f64| s.temperature - k as f64),
        Box::new(|s: &Start, k: usize, _: f64| s.pressure - 10.0 * k as f64),
    );
    let case = Case::new(1100.0, ONE_ATM);
    let mut gas = backend.new_gas().unwrap();
    let max = simulate_cell(
        &backend,
        &mut gas,
        &case,
        &MixtureSpec::new(1.0, 1.0),
        &Schedule::default(),
        |_| {},
    )
    .unwrap();
    assert_eq!(max.temperature, 1100.0);
    assert_eq!(max.pressure, ONE_ATM);
    assert_eq!(max.pressure_rate, 0.0);
}

#[test]
fn test_mixture_round_trips_through_backend() {
    let backend = ScriptedBackend::ignition();
    let mut gas = backend.new_gas().unwrap();
    let grid = full_grid();
    for at in grid.indices() {
        let (phi, x) = grid.coordinates(at);
        let mix = MixtureSpec::new(x, phi);
        gas.set_mole_fractions(&mix).unwrap();
        let n = mix.normalized();
        assert_relative_eq!(gas.mole_fraction("CH4").unwrap(), n.ch4, epsilon = 1e-15);
        assert_relative_eq!(gas.mole_fraction("C2H6").unwrap(), n.c2h6, epsilon = 1e-15);
        assert_relative_eq!(gas.mole_fraction("O2").unwrap(), n.o2, epsilon = 1e-15);
        assert_relative_eq!(gas.mole_fraction("N2").unwrap(), n.n2, epsilon = 1e-15);
        let sum: f64 = MixtureSpec::SPECIES
            .iter()
            .map(|s| gas.mole_fraction(s).unwrap())
            .sum();
        assert_relative_eq!(sum, 1.0, epsilon = 1e-12);
    }
}

#[test]
fn test_zero_phi_row_is_fuel_free_in_backend() {
    let backend = ScriptedBackend::ignition();
    let mut gas = backend.new_gas().unwrap();
    let grid = full_grid();
    assert_eq!(grid.phis()[0], 0.0);
    for (j, &x) in grid.fuels().iter().enumerate() {
        gas.set_mole_fractions(&MixtureSpec::new(x, 0.0)).unwrap();
        assert_eq!(gas.mole_fraction("CH4").unwrap(), 0.0);
        assert_eq!(gas.mole_fraction("C2H6").unwrap(), 0.0);
        assert_relative_eq!(
            gas.mole_fraction("N2").unwrap() / gas.mole_fraction("O2").unwrap(),
            3.76,
            epsilon = 1e-12
        );
        if j > 0 {
            assert!(stoichiometric_o2(x) < stoichiometric_o2(grid.fuels()[j - 1]));
        }
    }
}

// =============================================================================
// Whole case
// =============================================================================

#[test]
fn test_every_cell_is_populated() {
    let backend = ScriptedBackend::ignition();
    let grid = small_grid();
    let engine = GridSweepEngine::new(&backend, &grid, Schedule::default());
    let metrics = engine.run_case(&Case::new(890.0, 1.5 * ONE_ATM)).unwrap();

    for at in grid.indices() {
        let cell = metrics.cell(at);
        assert!(cell.temperature >= 890.0, "temperature at {:?}", at);
        assert!(cell.pressure >= 1.5 * ONE_ATM, "pressure at {:?}", at);
        assert!(cell.pressure_rate > 0.0, "pressure rate at {:?}", at);
    }
}

#[test]
fn test_grid_orientation_and_fuel_free_row() {
    let backend = ScriptedBackend::ignition();
    let grid = small_grid();
    let engine = GridSweepEngine::new(&backend, &grid, Schedule::default());
    let case = Case::new(1000.0, ONE_ATM);
    let metrics = engine.run_case(&case).unwrap();

    // phi = 0 row never ignites
    for j in 0..grid.cols() {
        assert_eq!(metrics.temperature.get(GridIndex::new(0, j)), 1000.0);
        assert_eq!(metrics.pressure.get(GridIndex::new(0, j)), ONE_ATM);
        assert_eq!(metrics.pressure_rate.get(GridIndex::new(0, j)), 0.0);
    }
    // fuel content grows with phi, so the hottest cell sits in the last row
    let hottest = metrics.temperature.locate_max().unwrap();
    assert_eq!(hottest.phi, grid.rows() - 1);
    let (phi, _) = grid.coordinates(hottest);
    assert_eq!(phi, 10.0);
}

#[test]
fn test_sweep_is_deterministic() {
    let backend = ScriptedBackend::ignition();
    let grid = small_grid();
    let case = Case::new(950.0, 2.0 * ONE_ATM);

    let first = GridSweepEngine::new(&backend, &grid, Schedule::default())
        .run_case(&case)
        .unwrap();
    let second = GridSweepEngine::new(&backend, &grid, Schedule::default())
        .run_case(&case)
        .unwrap();
    let parallel = GridSweepEngine::new(&backend, &grid, Schedule::default())
        .parallel(true)
        .run_case(&case)
        .unwrap();

    for at in grid.indices() {
        assert_eq!(first.cell(at).temperature.to_bits(), second.cell(at).temperature.to_bits());
        assert_eq!(first.cell(at).pressure_rate.to_bits(), second.cell(at).pressure_rate.to_bits());
    }
    assert_eq!(first, second);
    assert_eq!(first, parallel);
}

#[test]
fn test_cases_do_not_leak_into_each_other() {
    let backend = ScriptedBackend::ignition();
    let grid = small_grid();
    let engine = GridSweepEngine::new(&backend, &grid, Schedule::default());

    let hot = engine.run_case(&Case::new(1100.0, 3.0 * ONE_ATM)).unwrap();
    let cold_after_hot = engine.run_case(&Case::new(890.0, ONE_ATM)).unwrap();
    let cold_alone = GridSweepEngine::new(&backend, &grid, Schedule::default())
        .run_case(&Case::new(890.0, ONE_ATM))
        .unwrap();

    assert_eq!(cold_after_hot, cold_alone);
    assert!(hot.temperature.max().unwrap() > cold_after_hot.temperature.max().unwrap());
}

#[test]
fn test_solver_failure_aborts_case() {
    let mut backend = ScriptedBackend::ignition();
    // pure fuel-free cells have zero fuel content
    backend.fail_when_fuel_is = Some(0.0);
    let grid = small_grid();
    let err = GridSweepEngine::new(&backend, &grid, Schedule::default())
        .run_case(&Case::new(1000.0, ONE_ATM))
        .unwrap_err();
    let text = format!("{:#}", err);
    assert!(text.contains("phi=0"), "{}", text);
    assert!(text.contains("integrator failure"), "{}", text);
}

#[test]
fn test_thread_unsafe_backend_runs_sequentially() {
    let mut backend = ScriptedBackend::ignition();
    backend.thread_safe = false;
    let grid = small_grid();
    let engine = GridSweepEngine::new(&backend, &grid, Schedule::default()).parallel(true);
    assert!(!engine.is_parallel());
    assert!(engine.run_case(&Case::new(1000.0, ONE_ATM)).is_ok());
}

// =============================================================================
// Drivers
// =============================================================================

#[test]
fn test_run_cell_writes_trace() {
    let dir = tempfile::TempDir::new().expect("tempdir should be created");
    let path = dir.path().join("trace.csv");
    let backend = temperature_ramp(20);
    let schedule = Schedule {
        steps: 20,
        ..Schedule::default()
    };
    let request = CellRequest {
        case: Case::new(1000.0, ONE_ATM),
        phi: 1.0,
        x_ch4: 0.5,
    };
    let max = runner::run_cell(&backend, &schedule, &request, Some(&path)).unwrap();
    assert_eq!(max.temperature, 1500.0);

    let text = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 21);
    assert!(lines[0].starts_with("step,time_s"));
    assert!(lines[20].starts_with("20,0.020000,1500.000000"));
}

#[test]
fn test_missing_figures_dir_fails_before_sweeping() {
    let dir = tempfile::TempDir::new().expect("tempdir should be created");
    let mut output = config::Output {
        figures_dir: dir.path().join("Figures").to_string_lossy().into_owned(),
        ..config::Output::default()
    };
    assert!(runner::prepare_figures_dir(&output).is_err());

    output.create_dir = true;
    let created = runner::prepare_figures_dir(&output).unwrap();
    assert!(created.is_dir());
}

fn two_case_config(dir: &std::path::Path) -> config::Root {
    let mut cfg = config::Root::builtin();
    cfg.sweep.fuel_points = 3;
    cfg.sweep.phi_points = 3;
    cfg.integration.steps = 200;
    cfg.cases = vec![
        config::CaseSpec {
            temperature: 1000.0,
            pressure_atm: 1.0,
        },
        config::CaseSpec {
            temperature: 950.0,
            pressure_atm: 2.0,
        },
    ];
    cfg.output.figures_dir = dir.join("Figures").to_string_lossy().into_owned();
    cfg.output.create_dir = true;
    cfg.output.csv = Some(dir.join("cells.csv").to_string_lossy().into_owned());
    cfg
}

#[test]
fn test_run_sweep_writes_figures_table_and_bundle() {
    let dir = tempfile::TempDir::new().expect("tempdir should be created");
    let cfg = two_case_config(dir.path());
    cfg.validate().unwrap();
    let json_path = dir.path().join("summary.json");
    let backend = ScriptedBackend::ignition();

    let summary = runner::run_sweep(&backend, &cfg, "", Some(&json_path)).unwrap();
    assert_eq!(summary.cases.len(), 2);
    assert_eq!(summary.cells_per_case, 9);

    let figures = std::path::Path::new(&cfg.output.figures_dir);
    for case in cfg.cases() {
        for metric in Metric::ALL {
            let path = plot_path(figures, metric, &case);
            assert!(path.is_file(), "missing {}", path.display());
        }
    }
    assert!(figures.join("plot_temp_T1000_p101325.png").is_file());
    assert!(figures.join("plot_d_pres_T950_p202650.png").is_file());

    let table = std::fs::read_to_string(dir.path().join("cells.csv")).unwrap();
    let rows: Vec<&str> = table.lines().collect();
    assert_eq!(rows.len(), 1 + 2 * 9);
    assert!(rows[0].starts_with("case,t0_k,p0_pa"));
    assert!(rows[10].starts_with("1,950.00,202650.00"));

    let bundle: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
    assert_eq!(bundle["manifest"]["backend"], "scripted");
    assert_eq!(bundle["manifest"]["program"], "autoignition-sweep");

    let grid = SweepGrid::from_config(&cfg.sweep);
    let engine = GridSweepEngine::new(&backend, &grid, Schedule::from_config(&cfg.integration));
    for (k, case) in cfg.cases().iter().enumerate() {
        let metrics = engine.run_case(case).unwrap();
        for (m, metric) in Metric::ALL.into_iter().enumerate() {
            let expected = metrics.grid(metric).locate_max().unwrap();
            assert_eq!(
                bundle["cases"][k]["optima"][m]["index"],
                serde_json::to_value(expected).unwrap(),
                "case {} {:?}",
                k,
                metric
            );
        }
    }
}

#[test]
fn test_run_sweep_with_thread_pool_matches_sequential() {
    let backend = ScriptedBackend::ignition();

    let dir = tempfile::TempDir::new().expect("tempdir should be created");
    let sequential = runner::run_sweep(&backend, &two_case_config(dir.path()), "", None).unwrap();

    let dir = tempfile::TempDir::new().expect("tempdir should be created");
    let mut cfg = two_case_config(dir.path());
    cfg.parallel.enabled = true;
    cfg.parallel.threads = 2;
    let pooled = runner::run_sweep(&backend, &cfg, "", None).unwrap();

    assert!(pooled.parallel);
    assert!(!sequential.parallel);
    for (a, b) in sequential.cases.iter().zip(&pooled.cases) {
        assert_eq!(a.optima, b.optima);
    }
}
