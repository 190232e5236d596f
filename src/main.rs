use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use autoignition_sweep::config;
use autoignition_sweep::report::PA_PER_BAR;
use autoignition_sweep::sweep::{Case, Schedule, ONE_ATM};

#[derive(Parser, Debug)]
#[command(name = "autoignition-sweep")]
#[command(version)]
#[command(about = "Autoignition sweep of methane/ethane-air mixtures over fuel composition and equivalence ratio")]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to TOML configuration file (built-in sweep when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Figures directory, overrides output.figures_dir
    #[arg(short, long, global = true)]
    out: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sweep every case and write the contour plots
    Run {
        /// Write a JSON summary bundle
        #[arg(long)]
        json: bool,
    },
    /// Simulate a single grid cell
    Cell {
        /// Initial temperature (K)
        #[arg(long)]
        temperature: f64,
        /// Initial pressure (atm)
        #[arg(long, default_value = "1.0")]
        pressure_atm: f64,
        /// Fuel-air equivalence ratio
        #[arg(long)]
        phi: f64,
        /// Methane share in the fuel blend
        #[arg(long)]
        x_ch4: f64,
        /// Write every integration step to this CSV file
        #[arg(long)]
        trace: Option<PathBuf>,
    },
    /// Validate a configuration file
    Validate,
    /// Print version information
    Version,
}

/// Read, override and validate the configuration; returns it with its source text
fn load_config(path: Option<&Path>, out: Option<&Path>) -> Result<(config::Root, String)> {
    let text = match path {
        Some(p) => fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))?,
        None => String::new(),
    };
    let mut cfg = config::Root::from_toml(&text).context("parsing configuration")?;
    if let Some(dir) = out {
        cfg.output.figures_dir = dir.to_string_lossy().into_owned();
    }
    cfg.validate()?;
    Ok((cfg, text))
}

fn json_path(cfg: &config::Root, requested: bool) -> Option<PathBuf> {
    match &cfg.output.json {
        Some(p) => Some(PathBuf::from(p)),
        None if requested => Some(Path::new(&cfg.output.figures_dir).join("sweep_summary.json")),
        None => None,
    }
}

#[cfg(feature = "cantera")]
fn run_sweep(cfg: &config::Root, cfg_text: &str, json: Option<&Path>) -> Result<()> {
    let backend = autoignition_sweep::ffi::CanteraBackend::open(&cfg.solver)?;
    autoignition_sweep::runner::run_sweep(&backend, cfg, cfg_text, json)?;
    Ok(())
}

#[cfg(not(feature = "cantera"))]
fn run_sweep(_cfg: &config::Root, _cfg_text: &str, _json: Option<&Path>) -> Result<()> {
    anyhow::bail!(NO_BACKEND)
}

#[cfg(feature = "cantera")]
fn run_cell(
    cfg: &config::Root,
    request: &autoignition_sweep::runner::CellRequest,
    trace: Option<&Path>,
) -> Result<autoignition_sweep::sweep::CellMaxima> {
    let backend = autoignition_sweep::ffi::CanteraBackend::open(&cfg.solver)?;
    let schedule = Schedule::from_config(&cfg.integration);
    autoignition_sweep::runner::run_cell(&backend, &schedule, request, trace)
}

#[cfg(not(feature = "cantera"))]
fn run_cell(
    _cfg: &config::Root,
    _request: &autoignition_sweep::runner::CellRequest,
    _trace: Option<&Path>,
) -> Result<autoignition_sweep::sweep::CellMaxima> {
    anyhow::bail!(NO_BACKEND)
}

#[cfg(not(feature = "cantera"))]
const NO_BACKEND: &str = "built without a kinetics backend; rebuild with --features cantera";

fn validate_config(cfg: &config::Root, source: Option<&Path>) {
    match source {
        Some(p) => eprintln!("config valid: {}", p.display()),
        None => eprintln!("config valid: built-in sweep"),
    }
    let s = &cfg.sweep;
    let schedule = Schedule::from_config(&cfg.integration);
    eprintln!("  program: {} v{}", cfg.program.name, cfg.program.version);
    eprintln!(
        "  sweep: x_CH4=[{},{}]x{}, phi=[{},{}]x{}",
        s.fuel_min, s.fuel_max, s.fuel_points, s.phi_min, s.phi_max, s.phi_points
    );
    eprintln!(
        "  integration: steps={}, dt={}, rate_seed={:?}",
        schedule.steps, schedule.dt, schedule.rate_seed
    );
    eprintln!(
        "  solver: mechanism={}, reactor={}",
        cfg.solver.mechanism, cfg.solver.reactor
    );
    for case in cfg.cases() {
        eprintln!("  case: {}", case);
    }
    let (w, h) = cfg.image_size();
    eprintln!(
        "  output: figures_dir={}, {}x{} px, csv={:?}, json={:?}",
        cfg.output.figures_dir, w, h, cfg.output.csv, cfg.output.json
    );
    eprintln!(
        "  parallel: enabled={}, threads={}",
        cfg.parallel.enabled, cfg.parallel.threads
    );
}

fn print_version() {
    eprintln!("autoignition-sweep {}", env!("CARGO_PKG_VERSION"));
    eprintln!();
    eprintln!("  Platform:          {}", std::env::consts::OS);
    eprintln!("  Architecture:      {}", std::env::consts::ARCH);
    eprintln!(
        "  Kinetics backend:  {}",
        if cfg!(feature = "cantera") {
            "cantera (C interface)"
        } else {
            "none"
        }
    );
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let cfg_path = args.config.as_deref();

    match args.command {
        Some(Commands::Version) => {
            print_version();
            Ok(())
        }
        Some(Commands::Validate) => {
            let (cfg, _) = load_config(cfg_path, args.out.as_deref())?;
            validate_config(&cfg, cfg_path);
            Ok(())
        }
        Some(Commands::Cell {
            temperature,
            pressure_atm,
            phi,
            x_ch4,
            trace,
        }) => {
            let (cfg, _) = load_config(cfg_path, args.out.as_deref())?;
            anyhow::ensure!(
                temperature > 0.0 && pressure_atm > 0.0,
                "temperature and pressure must be positive"
            );
            anyhow::ensure!((0.0..=1.0).contains(&x_ch4), "x_ch4 must be in [0, 1]");
            anyhow::ensure!(phi >= 0.0, "phi must be >= 0");

            let request = autoignition_sweep::runner::CellRequest {
                case: Case::new(temperature, pressure_atm * ONE_ATM),
                phi,
                x_ch4,
            };
            let max = run_cell(&cfg, &request, trace.as_deref())?;
            println!(
                "{}, (\u{3a6},x_CH4)=({},{}): T_max={:.1}K, p_max={:.3}bar, dp_max={:.3}bar/s",
                request.case,
                phi,
                x_ch4,
                max.temperature,
                max.pressure / PA_PER_BAR,
                max.pressure_rate / PA_PER_BAR
            );
            if let Some(path) = trace {
                info!(path = %path.display(), "trace written");
            }
            Ok(())
        }
        Some(Commands::Run { json }) => {
            let (cfg, text) = load_config(cfg_path, args.out.as_deref())?;
            info!(program = %cfg.program.name, version = %cfg.program.version, "starting");
            run_sweep(&cfg, &text, json_path(&cfg, json).as_deref())
        }
        None => {
            let (cfg, text) = load_config(cfg_path, args.out.as_deref())?;
            info!(program = %cfg.program.name, version = %cfg.program.version, "starting");
            run_sweep(&cfg, &text, json_path(&cfg, false).as_deref())
        }
    }
}
