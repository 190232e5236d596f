//! Sweep axes and per-case metric grids
//!
//! Rows of every grid follow the equivalence-ratio axis and columns follow
//! the fuel-composition axis. [`GridIndex`] carries that pairing by name so a
//! cell is never addressed with two loose indices.

use serde::Serialize;

/// Evenly spaced samples in `[start, stop]`, last point pinned to `stop`.
pub fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (n - 1) as f64;
            let mut v: Vec<f64> = (0..n).map(|i| start + i as f64 * step).collect();
            v[n - 1] = stop;
            v
        }
    }
}

/// Position of one cell: row on the equivalence-ratio axis, column on the fuel axis
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct GridIndex {
    pub phi: usize,
    pub fuel: usize,
}

impl GridIndex {
    pub fn new(phi: usize, fuel: usize) -> Self {
        Self { phi, fuel }
    }
}

/// The two sample axes, shared read-only by every case
#[derive(Clone, Debug)]
pub struct SweepGrid {
    fuels: Vec<f64>,
    phis: Vec<f64>,
}

impl SweepGrid {
    pub fn new(fuels: Vec<f64>, phis: Vec<f64>) -> Self {
        Self { fuels, phis }
    }

    pub fn from_config(sweep: &crate::config::Sweep) -> Self {
        Self::new(
            linspace(sweep.fuel_min, sweep.fuel_max, sweep.fuel_points),
            linspace(sweep.phi_min, sweep.phi_max, sweep.phi_points),
        )
    }

    /// Methane share samples (columns)
    pub fn fuels(&self) -> &[f64] {
        &self.fuels
    }

    /// Equivalence ratio samples (rows)
    pub fn phis(&self) -> &[f64] {
        &self.phis
    }

    pub fn rows(&self) -> usize {
        self.phis.len()
    }

    pub fn cols(&self) -> usize {
        self.fuels.len()
    }

    /// `(phi, fuel)` sample values at an index
    pub fn coordinates(&self, at: GridIndex) -> (f64, f64) {
        (self.phis[at.phi], self.fuels[at.fuel])
    }

    /// Row-major work-list of every cell
    pub fn indices(&self) -> Vec<GridIndex> {
        let cols = self.cols();
        (0..self.rows())
            .flat_map(|phi| (0..cols).map(move |fuel| GridIndex::new(phi, fuel)))
            .collect()
    }

    pub fn empty_metric(&self) -> MetricGrid {
        MetricGrid::zeros(self.rows(), self.cols())
    }
}

/// Dense row-major 2-D array of one scalar metric
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MetricGrid {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl MetricGrid {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    pub fn from_rows(rows: Vec<Vec<f64>>) -> Self {
        let cols = rows.first().map_or(0, Vec::len);
        assert!(rows.iter().all(|r| r.len() == cols), "ragged rows");
        Self {
            rows: rows.len(),
            cols,
            data: rows.into_iter().flatten().collect(),
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, at: GridIndex) -> f64 {
        self.data[self.offset(at)]
    }

    pub fn set(&mut self, at: GridIndex, value: f64) {
        let k = self.offset(at);
        self.data[k] = value;
    }

    /// Copy with every value divided by `divisor` (unit conversion)
    pub fn divided(&self, divisor: f64) -> Self {
        Self {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(|v| v / divisor).collect(),
        }
    }

    /// Largest non-NaN value
    pub fn max(&self) -> Option<f64> {
        self.locate_max().map(|at| self.get(at))
    }

    pub fn min(&self) -> Option<f64> {
        self.data
            .iter()
            .copied()
            .filter(|v| !v.is_nan())
            .reduce(f64::min)
    }

    /// First index, in row-major order, holding the grid maximum.
    ///
    /// Ties resolve to the lexicographically smallest `(phi, fuel)`. NaN cells
    /// are skipped; an empty or all-NaN grid has no maximum.
    pub fn locate_max(&self) -> Option<GridIndex> {
        let mut best: Option<(usize, f64)> = None;
        for (k, &v) in self.data.iter().enumerate() {
            if v.is_nan() {
                continue;
            }
            match best {
                Some((_, b)) if v <= b => {}
                _ => best = Some((k, v)),
            }
        }
        best.map(|(k, _)| GridIndex::new(k / self.cols, k % self.cols))
    }

    fn offset(&self, at: GridIndex) -> usize {
        assert!(
            at.phi < self.rows && at.fuel < self.cols,
            "index {:?} outside {}x{} grid",
            at,
            self.rows,
            self.cols
        );
        at.phi * self.cols + at.fuel
    }
}
