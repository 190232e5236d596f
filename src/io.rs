use crate::grid::SweepGrid;
use crate::sweep::{CaseMetrics, TraceSample};
use anyhow::Result;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// One row per swept cell, every case appended to the same table
pub struct CsvWriter<W: Write = BufWriter<File>> {
    w: W,
}

impl CsvWriter {
    pub fn create(path: &Path) -> Result<Self> {
        let f = File::create(path)?;
        Ok(Self { w: BufWriter::new(f) })
    }
}

impl<W: Write> CsvWriter<W> {
    pub fn from_writer(w: W) -> Self {
        Self { w }
    }

    pub fn write_header(&mut self) -> Result<()> {
        writeln!(
            self.w,
            "case,t0_k,p0_pa,phi,x_ch4,max_temperature_k,max_pressure_pa,max_pressure_rate_pa_s"
        )?;
        Ok(())
    }

    pub fn write_case(&mut self, case_no: usize, metrics: &CaseMetrics, grid: &SweepGrid) -> Result<()> {
        let case = metrics.case;
        for at in grid.indices() {
            let (phi, x_ch4) = grid.coordinates(at);
            let max = metrics.cell(at);
            writeln!(
                self.w,
                "{},{:.2},{:.2},{:.4},{:.4},{:.6},{:.6},{:.6e}",
                case_no,
                case.temperature,
                case.pressure,
                phi,
                x_ch4,
                max.temperature,
                max.pressure,
                max.pressure_rate
            )?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.w.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.w
    }
}

/// Step-by-step history of a single cell
pub struct TraceWriter<W: Write = BufWriter<File>> {
    w: W,
}

impl TraceWriter {
    pub fn create(path: &Path) -> Result<Self> {
        let f = File::create(path)?;
        let mut t = Self { w: BufWriter::new(f) };
        t.write_header()?;
        Ok(t)
    }
}

impl<W: Write> TraceWriter<W> {
    fn write_header(&mut self) -> Result<()> {
        writeln!(self.w, "step,time_s,temperature_k,pressure_pa,pressure_rate_pa_s")?;
        Ok(())
    }

    pub fn write_sample(&mut self, s: &TraceSample) -> Result<()> {
        writeln!(
            self.w,
            "{},{:.6},{:.6},{:.6},{:.6e}",
            s.step, s.time, s.temperature, s.pressure, s.pressure_rate
        )?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.w.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{linspace, GridIndex};
    use crate::sweep::{Case, CellMaxima, ONE_ATM};

    #[test]
    fn test_case_rows() {
        let grid = SweepGrid::new(linspace(0.0, 1.0, 2), linspace(0.0, 10.0, 2));
        let mut metrics = CaseMetrics::new(Case::new(890.0, ONE_ATM), &grid);
        metrics.store(
            GridIndex::new(1, 0),
            CellMaxima {
                temperature: 2500.0,
                pressure: 9.5e5,
                pressure_rate: 1.25e8,
            },
        );

        let mut w = CsvWriter::from_writer(Vec::new());
        w.write_header().unwrap();
        w.write_case(0, &metrics, &grid).unwrap();
        let text = String::from_utf8(w.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 5);
        assert!(lines[0].starts_with("case,t0_k,p0_pa,phi,x_ch4"));
        assert_eq!(
            lines[3],
            "0,890.00,101325.00,10.0000,0.0000,2500.000000,950000.000000,1.250000e8"
        );
    }
}
