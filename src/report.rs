//! Per-case output: three contour figures and the console summary

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::grid::{GridIndex, SweepGrid};
use crate::plot::{self, ContourPlot};
use crate::sweep::{Case, CaseMetrics};

/// Pa per bar
pub const PA_PER_BAR: f64 = 1e5;

const X_DESC: &str = "Methane's share in fuel [1]";
const Y_DESC: &str = "Fuel\u{2013}air equivalence ratio \u{3a6} [1]";
const CONTOUR_BANDS: usize = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Temperature,
    Pressure,
    PressureRate,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::Temperature, Metric::Pressure, Metric::PressureRate];

    /// File name fragment: `plot_<stem>_T..._p....png`
    pub fn stem(self) -> &'static str {
        match self {
            Metric::Temperature => "temp",
            Metric::Pressure => "pres",
            Metric::PressureRate => "d_pres",
        }
    }

    fn title(self) -> &'static str {
        match self {
            Metric::Temperature => "Maximal temperature during explosion",
            Metric::Pressure => "Maximal pressure during explosion",
            Metric::PressureRate => "Maximal pressure rate during explosion",
        }
    }

    fn colorbar_desc(self) -> &'static str {
        match self {
            Metric::Temperature => "Temperature [K]",
            Metric::Pressure => "Pressure [bar]",
            Metric::PressureRate => "Pressure rate [bar/s]",
        }
    }

    /// SI value per display unit
    pub fn display_divisor(self) -> f64 {
        match self {
            Metric::Temperature => 1.0,
            Metric::Pressure | Metric::PressureRate => PA_PER_BAR,
        }
    }

    fn label_precision(self) -> usize {
        match self {
            Metric::Temperature => 0,
            Metric::Pressure | Metric::PressureRate => 1,
        }
    }
}

/// Deterministic figure path of one metric of one case
pub fn plot_path(dir: &Path, metric: Metric, case: &Case) -> PathBuf {
    dir.join(format!(
        "plot_{}_T{}_p{}.png",
        metric.stem(),
        case.temperature as i64,
        case.pressure as i64
    ))
}

/// Grid maximum of one metric and where it occurs
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Optimum {
    pub metric: Metric,
    /// SI units
    pub value: f64,
    pub index: GridIndex,
    pub phi: f64,
    pub x_ch4: f64,
}

pub fn optimum(metrics: &CaseMetrics, grid: &SweepGrid, metric: Metric) -> Result<Optimum> {
    let values = metrics.grid(metric);
    let index = values
        .locate_max()
        .with_context(|| format!("{:?} grid of case {} has no maximum", metric, metrics.case))?;
    let (phi, x_ch4) = grid.coordinates(index);
    Ok(Optimum {
        metric,
        value: values.get(index),
        index,
        phi,
        x_ch4,
    })
}

pub fn optima(metrics: &CaseMetrics, grid: &SweepGrid) -> Result<[Optimum; 3]> {
    Ok([
        optimum(metrics, grid, Metric::Temperature)?,
        optimum(metrics, grid, Metric::Pressure)?,
        optimum(metrics, grid, Metric::PressureRate)?,
    ])
}

/// Console summary of one case, ending in an empty line.
///
/// Integers are truncated like the plot file names; pressure and rate are in
/// bar and bar/s.
pub fn summary(case: &Case, optima: &[Optimum; 3]) -> String {
    let [t, p, dp] = optima;
    let at = |o: &Optimum| format!("(\u{3a6},x_CH4)=({:.1},{:.2})", o.phi, o.x_ch4);
    format!(
        "Starting parameters:\tT_0={}K, p_0={:?}atm\n\
         Maximal parameters:\t\tT_max={}K (for {}), p={}bar (for {}), dp={}bar/s (for {})\n",
        case.temperature as i64,
        case.pressure_atm(),
        t.value as i64,
        at(t),
        (p.value / PA_PER_BAR) as i64,
        at(p),
        (dp.value / PA_PER_BAR) as i64,
        at(dp),
    )
}

pub struct ReportRenderer<'a> {
    figures_dir: PathBuf,
    image_size: (u32, u32),
    grid: &'a SweepGrid,
}

impl<'a> ReportRenderer<'a> {
    pub fn new(figures_dir: impl Into<PathBuf>, image_size: (u32, u32), grid: &'a SweepGrid) -> Self {
        Self {
            figures_dir: figures_dir.into(),
            image_size,
            grid,
        }
    }

    /// Write the three figures of `metrics`, returning their paths
    pub fn render_plots(&self, metrics: &CaseMetrics) -> Result<Vec<PathBuf>> {
        let case = metrics.case;
        let mut written = Vec::with_capacity(Metric::ALL.len());
        for metric in Metric::ALL {
            let values = metrics.grid(metric).divided(metric.display_divisor());
            let plot = ContourPlot {
                title: format!("{} ({})", metric.title(), case),
                x_desc: X_DESC,
                y_desc: Y_DESC,
                colorbar_desc: metric.colorbar_desc(),
                label_precision: metric.label_precision(),
                bands: CONTOUR_BANDS,
                xs: self.grid.fuels(),
                ys: self.grid.phis(),
                values: &values,
            };
            let path = plot_path(&self.figures_dir, metric, &case);
            plot::render_contour(&path, self.image_size, &plot)
                .with_context(|| format!("writing {}", path.display()))?;
            written.push(path);
        }
        Ok(written)
    }

    /// Locate the optima and format the summary text
    pub fn summarize(&self, metrics: &CaseMetrics) -> Result<([Optimum; 3], String)> {
        let found = optima(metrics, self.grid)?;
        let text = summary(&metrics.case, &found);
        Ok((found, text))
    }
}
