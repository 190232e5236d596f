//! Drivers behind the command line: full sweep and single cell

use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tracing::info;

use crate::config;
use crate::grid::SweepGrid;
use crate::io::{CsvWriter, TraceWriter};
use crate::kinetics::KineticsBackend;
use crate::mixture::MixtureSpec;
use crate::report::{Optimum, ReportRenderer};
use crate::sweep::{simulate_cell, Case, CaseMetrics, CellMaxima, GridSweepEngine, Schedule};

#[derive(Serialize)]
pub struct Manifest {
    pub program: String,
    pub version: String,
    pub backend: String,
    pub timestamp_utc: String,
    pub platform: String,
    pub config_hash: String,
    pub config_snapshot: config::Root,
}

#[derive(Serialize)]
pub struct CaseReport {
    pub case: Case,
    pub optima: [Optimum; 3],
    pub plots: Vec<PathBuf>,
    pub wall_time_ms: f64,
}

#[derive(Serialize)]
pub struct RunSummary {
    pub manifest: Manifest,
    pub cells_per_case: usize,
    pub steps_per_cell: usize,
    pub parallel: bool,
    pub cases: Vec<CaseReport>,
    pub wall_time_ms: f64,
}

pub fn config_hash(cfg_text: &str) -> String {
    let mut hasher = DefaultHasher::new();
    cfg_text.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

pub fn manifest(cfg: &config::Root, cfg_text: &str, backend: &str) -> Manifest {
    Manifest {
        program: cfg.program.name.clone(),
        version: cfg.program.version.clone(),
        backend: backend.to_string(),
        timestamp_utc: chrono::Utc::now().to_rfc3339(),
        platform: std::env::consts::OS.to_string(),
        config_hash: config_hash(cfg_text),
        config_snapshot: cfg.clone(),
    }
}

/// Make sure plots can be written before hours of simulation are spent
pub fn prepare_figures_dir(output: &config::Output) -> Result<PathBuf> {
    let dir = PathBuf::from(&output.figures_dir);
    if dir.is_dir() {
        return Ok(dir);
    }
    if output.create_dir {
        fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
        info!(dir = %dir.display(), "created figures directory");
        return Ok(dir);
    }
    bail!(
        "figures directory {} does not exist (create it or set output.create_dir = true)",
        dir.display()
    )
}

/// Sweep every case, writing plots, summaries and optional tables as each case finishes
pub fn run_sweep<B: KineticsBackend>(
    backend: &B,
    cfg: &config::Root,
    cfg_text: &str,
    json_path: Option<&Path>,
) -> Result<RunSummary> {
    let figures_dir = prepare_figures_dir(&cfg.output)?;
    let grid = SweepGrid::from_config(&cfg.sweep);
    let schedule = Schedule::from_config(&cfg.integration);
    let engine = GridSweepEngine::new(backend, &grid, schedule).parallel(cfg.parallel.enabled);
    let renderer = ReportRenderer::new(&figures_dir, cfg.image_size(), &grid);

    let mut csv = match &cfg.output.csv {
        Some(path) => {
            let mut w = CsvWriter::create(Path::new(path)).with_context(|| format!("creating {}", path))?;
            w.write_header()?;
            Some(w)
        }
        None => None,
    };

    info!(
        backend = backend.name(),
        cases = cfg.cases.len(),
        cells = grid.rows() * grid.cols(),
        steps = schedule.steps,
        parallel = engine.is_parallel(),
        "starting sweep"
    );

    let pool = if engine.is_parallel() && cfg.parallel.threads > 0 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(cfg.parallel.threads)
            .build()
            .context("building thread pool")?;
        Some(pool)
    } else {
        None
    };

    let start = Instant::now();
    let mut reports = Vec::with_capacity(cfg.cases.len());
    for (k, case) in cfg.cases().iter().enumerate() {
        info!(case = k, %case, "sweeping case");
        let case_start = Instant::now();
        let metrics = run_case(&engine, case, pool.as_ref())?;

        let plots = renderer.render_plots(&metrics)?;
        let (optima, text) = renderer.summarize(&metrics)?;
        println!("{}", text);

        if let Some(w) = csv.as_mut() {
            w.write_case(k, &metrics, &grid)?;
            w.flush()?;
        }

        let wall_time_ms = case_start.elapsed().as_secs_f64() * 1000.0;
        info!(case = k, wall_time_ms, "case complete");
        reports.push(CaseReport {
            case: *case,
            optima,
            plots,
            wall_time_ms,
        });
    }

    let summary = RunSummary {
        manifest: manifest(cfg, cfg_text, backend.name()),
        cells_per_case: grid.rows() * grid.cols(),
        steps_per_cell: schedule.steps,
        parallel: engine.is_parallel(),
        cases: reports,
        wall_time_ms: start.elapsed().as_secs_f64() * 1000.0,
    };
    info!(
        cases = summary.cases.len(),
        figures_dir = %figures_dir.display(),
        wall_time_ms = summary.wall_time_ms,
        "sweep complete"
    );

    if let Some(path) = json_path {
        let json = serde_json::to_string_pretty(&summary)?;
        fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "JSON summary written");
    }

    Ok(summary)
}

/// One case, inside the sweep's rayon pool when a thread count is configured
fn run_case<B: KineticsBackend>(
    engine: &GridSweepEngine<'_, B>,
    case: &Case,
    pool: Option<&rayon::ThreadPool>,
) -> Result<CaseMetrics> {
    match pool {
        Some(pool) => pool.install(|| engine.run_case(case)),
        None => engine.run_case(case),
    }
}

/// Parameters of a single-cell run
#[derive(Clone, Copy, Debug)]
pub struct CellRequest {
    pub case: Case,
    pub phi: f64,
    pub x_ch4: f64,
}

/// Simulate one cell, optionally streaming every step to a CSV trace
pub fn run_cell<B: KineticsBackend>(
    backend: &B,
    schedule: &Schedule,
    request: &CellRequest,
    trace: Option<&Path>,
) -> Result<CellMaxima> {
    let mixture = MixtureSpec::new(request.x_ch4, request.phi);
    let mut gas = backend.new_gas()?;

    let max = match trace {
        Some(path) => {
            let mut w = TraceWriter::create(path).with_context(|| format!("creating {}", path.display()))?;
            let mut write_err = None;
            let max = simulate_cell(backend, &mut gas, &request.case, &mixture, schedule, |s| {
                if write_err.is_none() {
                    if let Err(e) = w.write_sample(s) {
                        write_err = Some(e);
                    }
                }
            })?;
            if let Some(e) = write_err {
                return Err(e.context(format!("writing {}", path.display())));
            }
            w.flush()?;
            max
        }
        None => simulate_cell(backend, &mut gas, &request.case, &mixture, schedule, |_| {})?,
    };

    info!(
        case = %request.case,
        phi = request.phi,
        x_ch4 = request.x_ch4,
        fuel = mixture.has_fuel(),
        "cell complete"
    );
    Ok(max)
}
