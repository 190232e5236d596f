//! Filled contour plots of one metric grid
//!
//! Bands are filled by sampling the bilinear interpolant on a sub-cell
//! raster; contour lines come from marching squares over the sample grid.
//! Both are drawn with plotters primitives onto a PNG bitmap.

use std::path::Path;

use anyhow::{anyhow, bail, Result};
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};

use crate::grid::{GridIndex, MetricGrid};

/// Sub-cells per grid cell along each axis when filling bands
const FILL_SUBDIVISION: usize = 8;

/// One contour figure: grid values already converted to display units
pub struct ContourPlot<'a> {
    pub title: String,
    pub x_desc: &'a str,
    pub y_desc: &'a str,
    pub colorbar_desc: &'a str,
    /// Decimals of the inline level labels
    pub label_precision: usize,
    /// Number of filled bands requested
    pub bands: usize,
    /// Column coordinates
    pub xs: &'a [f64],
    /// Row coordinates
    pub ys: &'a [f64],
    pub values: &'a MetricGrid,
}

/// matplotlib's `bone` colormap: gray with a blue tint in the shadows
pub fn bone(t: f64) -> RGBColor {
    fn piecewise(t: f64, knots: &[(f64, f64)]) -> f64 {
        for w in knots.windows(2) {
            let (x0, y0) = w[0];
            let (x1, y1) = w[1];
            if t <= x1 {
                return y0 + (y1 - y0) * (t - x0) / (x1 - x0);
            }
        }
        knots[knots.len() - 1].1
    }
    let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
    let r = piecewise(t, &[(0.0, 0.0), (0.746032, 0.652778), (1.0, 1.0)]);
    let g = piecewise(
        t,
        &[(0.0, 0.0), (0.365079, 0.319444), (0.746032, 0.777778), (1.0, 1.0)],
    );
    let b = piecewise(t, &[(0.0, 0.0), (0.365079, 0.444444), (1.0, 1.0)]);
    let byte = |v: f64| (v * 255.0).round() as u8;
    RGBColor(byte(r), byte(g), byte(b))
}

/// Round level boundaries covering `[lo, hi]` with at most `bands` intervals.
///
/// The step is the smallest of 1, 2, 2.5, 5 or 10 times a power of ten that
/// keeps the band count within the limit.
pub fn contour_levels(lo: f64, hi: f64, bands: usize) -> Vec<f64> {
    let bands = bands.max(1);
    if !(lo.is_finite() && hi.is_finite()) {
        return Vec::new();
    }
    if hi - lo <= f64::EPSILON * hi.abs().max(lo.abs()).max(1.0) {
        let pad = (lo.abs() * 1e-3).max(1e-9);
        return vec![lo - pad, lo + pad];
    }

    let raw = (hi - lo) / bands as f64;
    let magnitude = 10f64.powf(raw.log10().floor());
    for mult in [1.0, 2.0, 2.5, 5.0, 10.0, 20.0] {
        let step = mult * magnitude;
        let first = (lo / step).floor();
        let last = (hi / step).ceil();
        if (last - first) as usize <= bands {
            return (0..=(last - first) as usize)
                .map(|k| (first + k as f64) * step)
                .collect();
        }
    }
    // unreachable for finite input; fall back to even spacing
    (0..=bands)
        .map(|k| lo + (hi - lo) * k as f64 / bands as f64)
        .collect()
}

/// Band containing `v`; values on the top boundary belong to the last band
pub fn band_of(levels: &[f64], v: f64) -> Option<usize> {
    let n = levels.len().checked_sub(1)?;
    if n == 0 || v.is_nan() || v < levels[0] || v > levels[n] {
        return None;
    }
    Some(levels[1..].iter().position(|&b| v < b).unwrap_or(n - 1))
}

/// Bilinear interpolation at fractional grid position (row `r`, column `c`)
fn bilinear(values: &MetricGrid, r: f64, c: f64) -> f64 {
    let i = (r.floor() as usize).min(values.rows() - 2);
    let j = (c.floor() as usize).min(values.cols() - 2);
    let fr = r - i as f64;
    let fc = c - j as f64;
    let v00 = values.get(GridIndex::new(i, j));
    let v01 = values.get(GridIndex::new(i, j + 1));
    let v10 = values.get(GridIndex::new(i + 1, j));
    let v11 = values.get(GridIndex::new(i + 1, j + 1));
    let bottom = v00 + (v01 - v00) * fc;
    let top = v10 + (v11 - v10) * fc;
    bottom + (top - bottom) * fr
}

fn lerp_axis(axis: &[f64], pos: f64) -> f64 {
    let k = (pos.floor() as usize).min(axis.len() - 2);
    axis[k] + (axis[k + 1] - axis[k]) * (pos - k as f64)
}

pub type Segment = [(f64, f64); 2];

/// Marching squares: line segments where the interpolated field equals `level`.
///
/// Corners run bottom-left, bottom-right, top-right, top-left with rows going
/// up the y axis. Saddle cells are resolved with the cell-centre average.
pub fn isolines(values: &MetricGrid, xs: &[f64], ys: &[f64], level: f64) -> Vec<Segment> {
    let mut segments = Vec::new();
    if values.rows() < 2 || values.cols() < 2 {
        return segments;
    }

    for i in 0..values.rows() - 1 {
        for j in 0..values.cols() - 1 {
            let corners = [
                (xs[j], ys[i], values.get(GridIndex::new(i, j))),
                (xs[j + 1], ys[i], values.get(GridIndex::new(i, j + 1))),
                (xs[j + 1], ys[i + 1], values.get(GridIndex::new(i + 1, j + 1))),
                (xs[j], ys[i + 1], values.get(GridIndex::new(i + 1, j))),
            ];
            if corners.iter().any(|c| c.2.is_nan()) {
                continue;
            }
            let above = corners.map(|c| c.2 >= level);
            let count = above.iter().filter(|&&a| a).count();
            if count == 0 || count == 4 {
                continue;
            }

            // crossing on edge k, which joins corner k and corner k+1
            let crossing = |k: usize| -> (f64, f64) {
                let (xa, ya, va) = corners[k];
                let (xb, yb, vb) = corners[(k + 1) % 4];
                let t = (level - va) / (vb - va);
                (xa + (xb - xa) * t, ya + (yb - ya) * t)
            };

            let saddle = count == 2 && above[0] == above[2];
            if saddle {
                let centre = corners.iter().map(|c| c.2).sum::<f64>() / 4.0 >= level;
                // cut off each corner that disagrees with the centre
                for k in 0..4 {
                    if above[k] != centre {
                        segments.push([crossing((k + 3) % 4), crossing(k)]);
                    }
                }
            } else {
                let cut: Vec<(f64, f64)> = (0..4)
                    .filter(|&k| above[k] != above[(k + 1) % 4])
                    .map(crossing)
                    .collect();
                segments.push([cut[0], cut[1]]);
            }
        }
    }
    segments
}

/// Text of a contour level, shared by the inline labels and the colorbar ticks
pub fn level_label(value: f64, precision: usize) -> String {
    format!("{:.*}", precision, value)
}

fn draw_err<E: std::fmt::Display>(e: E) -> anyhow::Error {
    anyhow!("drawing failed: {}", e)
}

/// Render `plot` to a PNG at `path` with the given pixel size
pub fn render_contour(path: &Path, size: (u32, u32), plot: &ContourPlot<'_>) -> Result<()> {
    let values = plot.values;
    if values.rows() < 2 || values.cols() < 2 {
        bail!(
            "contour plot needs at least 2x2 samples, got {}x{}",
            values.rows(),
            values.cols()
        );
    }
    if plot.xs.len() != values.cols() || plot.ys.len() != values.rows() {
        bail!("axis lengths do not match the {}x{} grid", values.rows(), values.cols());
    }
    let (lo, hi) = match (values.min(), values.max()) {
        (Some(lo), Some(hi)) => (lo, hi),
        _ => bail!("grid holds no finite values"),
    };
    let levels = contour_levels(lo, hi, plot.bands);
    if levels.len() < 2 {
        bail!("cannot place contour levels on [{}, {}]", lo, hi);
    }
    let n_bands = levels.len() - 1;
    let band_color = |b: usize| bone((b as f64 + 0.5) / n_bands as f64);

    let (width, height) = size;
    let font = (height / 40).max(10) as i32;
    let root = BitMapBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE).map_err(draw_err)?;
    let bar_width = (width / 7).max(90) as i32;
    let (main, bar) = root.split_horizontally(width as i32 - bar_width);

    let (x0, x1) = (plot.xs[0], plot.xs[plot.xs.len() - 1]);
    let (y0, y1) = (plot.ys[0], plot.ys[plot.ys.len() - 1]);
    let mut chart = ChartBuilder::on(&main)
        .caption(&plot.title, ("sans-serif", font + 4))
        .margin(15)
        .x_label_area_size(font * 3)
        .y_label_area_size(font * 4)
        .build_cartesian_2d(x0..x1, y0..y1)
        .map_err(draw_err)?;

    // filled bands
    let sub = FILL_SUBDIVISION;
    let rows = (values.rows() - 1) * sub;
    let cols = (values.cols() - 1) * sub;
    let mut cells = Vec::with_capacity(rows * cols);
    for r in 0..rows {
        for c in 0..cols {
            let (ra, rb) = (r as f64 / sub as f64, (r + 1) as f64 / sub as f64);
            let (ca, cb) = (c as f64 / sub as f64, (c + 1) as f64 / sub as f64);
            let v = bilinear(values, (ra + rb) / 2.0, (ca + cb) / 2.0);
            let Some(b) = band_of(&levels, v) else { continue };
            cells.push(Rectangle::new(
                [
                    (lerp_axis(plot.xs, ca), lerp_axis(plot.ys, ra)),
                    (lerp_axis(plot.xs, cb), lerp_axis(plot.ys, rb)),
                ],
                band_color(b).filled(),
            ));
        }
    }
    chart.draw_series(cells).map_err(draw_err)?;

    // line contours, labels on every second level
    let label_style = ("sans-serif", f64::from(font))
        .into_font()
        .color(&WHITE)
        .pos(Pos::new(HPos::Center, VPos::Center));
    for (k, &level) in levels.iter().enumerate() {
        let segments = isolines(values, plot.xs, plot.ys, level);
        chart
            .draw_series(
                segments
                    .iter()
                    .map(|s| PathElement::new(vec![s[0], s[1]], WHITE.stroke_width(1))),
            )
            .map_err(draw_err)?;
        if k % 2 == 0 && !segments.is_empty() {
            let s = segments[segments.len() / 2];
            let at = ((s[0].0 + s[1].0) / 2.0, (s[0].1 + s[1].1) / 2.0);
            let text = level_label(level, plot.label_precision);
            chart
                .draw_series(std::iter::once(Text::new(text, at, label_style.clone())))
                .map_err(draw_err)?;
        }
    }

    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc(plot.x_desc)
        .y_desc(plot.y_desc)
        .label_style(("sans-serif", font))
        .axis_desc_style(("sans-serif", font + 2))
        .draw()
        .map_err(draw_err)?;

    // colorbar with the contour lines repeated on it
    let (l0, l1) = (levels[0], levels[n_bands]);
    let mut cbar = ChartBuilder::on(&bar)
        .margin_top(font * 2 + 15)
        .margin_bottom(font * 3 + 15)
        .margin_right(10)
        .y_label_area_size(font * 4)
        .build_cartesian_2d(0.0..1.0, l0..l1)
        .map_err(draw_err)?;
    cbar.draw_series((0..n_bands).map(|b| {
        Rectangle::new([(0.0, levels[b]), (1.0, levels[b + 1])], band_color(b).filled())
    }))
    .map_err(draw_err)?;
    cbar.draw_series(
        levels
            .iter()
            .map(|&l| PathElement::new(vec![(0.0, l), (1.0, l)], WHITE.stroke_width(1))),
    )
    .map_err(draw_err)?;
    cbar.configure_mesh()
        .disable_mesh()
        .disable_x_axis()
        .y_labels(levels.len())
        .y_label_formatter(&|v: &f64| level_label(*v, plot.label_precision))
        .y_desc(plot.colorbar_desc)
        .label_style(("sans-serif", font))
        .axis_desc_style(("sans-serif", font + 2))
        .draw()
        .map_err(draw_err)?;

    root.present().map_err(draw_err)?;
    Ok(())
}
