//! Autoignition sweep of methane/ethane-air mixtures.
//!
//! For every initial condition (case) a grid of fuel compositions and
//! equivalence ratios is integrated with a zero-dimensional reactor; the
//! maximal temperature, pressure and pressure rise rate of each cell are
//! plotted as contour maps and summarized on the console.

pub mod config;
pub mod grid;
pub mod io;
pub mod kinetics;
pub mod mixture;
pub mod plot;
pub mod report;
pub mod runner;
pub mod sweep;

#[cfg(feature = "cantera")]
pub mod ffi;

#[cfg(test)]
mod tests;
