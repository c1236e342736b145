//! Scatter plot of fitted amplitude against frequency, written as SVG.

use std::ops::Range;
use std::path::{Path, PathBuf};

use plotters::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::sweep::{SweepCtx, SweepPoint, SweepReport};

use super::Reporter;

/// Plots each fitted point at `{op_dir}/{op_name}.svg` once the sweep finishes.
///
/// Amplitudes are plotted in volts when every fitted point has a volts value,
/// and in raw codes otherwise.
#[derive(Serialize, Deserialize, Debug)]
pub struct PlotReporter {
    width: u32,
    height: u32,

    #[serde(skip)]
    path: Option<PathBuf>,

    #[serde(skip)]
    codes: Vec<(f64, f64)>,

    #[serde(skip)]
    volts: Vec<(f64, f64)>,
}

impl Default for PlotReporter {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 640,
            path: None,
            codes: Vec::new(),
            volts: Vec::new(),
        }
    }
}

impl PlotReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_size(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

/// Data range padded so that markers at the extremes stay inside the plot
fn padded_range(values: impl Iterator<Item = f64>) -> Range<f64> {
    let (lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    let span = hi - lo;
    let pad = if span > 0.0 {
        0.05 * span
    } else {
        (0.05 * hi.abs()).max(1.0)
    };
    (lo - pad)..(hi + pad)
}

fn draw(
    path: &Path,
    size: (u32, u32),
    caption: &str,
    y_desc: &str,
    points: &[(f64, f64)],
) -> Result<(), String> {
    let err = |e: &dyn std::fmt::Display| format!("Failed to draw plot {path:?}: {e}");

    let root = SVGBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE).map_err(|e| err(&e))?;

    let x_range = padded_range(points.iter().map(|p| p.0));
    let y_range = padded_range(points.iter().map(|p| p.1));
    let mut chart = ChartBuilder::on(&root)
        .caption(caption, ("sans-serif", 24))
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(80)
        .build_cartesian_2d(x_range, y_range)
        .map_err(|e| err(&e))?;

    chart
        .configure_mesh()
        .x_desc("Frequency [Hz]")
        .y_desc(y_desc)
        .light_line_style(BLACK.mix(0.05))
        .draw()
        .map_err(|e| err(&e))?;

    chart
        .draw_series(LineSeries::new(points.iter().copied(), &BLUE.mix(0.3)))
        .map_err(|e| err(&e))?;
    chart
        .draw_series(points.iter().map(|&p| Circle::new(p, 4, BLUE.filled())))
        .map_err(|e| err(&e))?;

    root.present().map_err(|e| err(&e))?;
    Ok(())
}

#[typetag::serde]
impl Reporter for PlotReporter {
    fn init(&mut self, ctx: &SweepCtx, _frequencies: &[f64]) -> Result<(), String> {
        self.codes.clear();
        self.volts.clear();
        self.path = Some(ctx.op_dir.join(format!("{}.svg", ctx.op_name)));
        Ok(())
    }

    fn consume(&mut self, point: &SweepPoint) -> Result<(), String> {
        if let Some(amplitude) = point.amplitude() {
            self.codes.push((point.frequency_hz, amplitude));
        }
        if let Some(amplitude) = point.amplitude_volts() {
            self.volts.push((point.frequency_hz, amplitude));
        }
        Ok(())
    }

    fn finish(&mut self, _report: &SweepReport) -> Result<(), String> {
        let path = self
            .path
            .as_ref()
            .ok_or("Reporter must be initialized before finishing")?;
        let (points, y_desc) = if !self.volts.is_empty() && self.volts.len() == self.codes.len() {
            (&self.volts, "Amplitude [V]")
        } else {
            (&self.codes, "Amplitude [codes]")
        };
        let caption = self
            .path
            .as_ref()
            .and_then(|p| p.file_stem())
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();

        if points.is_empty() {
            warn!("No fitted amplitudes to plot");
            return Ok(());
        }
        draw(path, (self.width, self.height), &caption, y_desc, points)?;
        info!("Plotted {} amplitudes to {path:?}", points.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daq::{SimConfig, SimulatedDaq};
    use crate::sweep::SweepController;

    #[test]
    fn padded_range_contains_data() {
        let r = padded_range([1.0, 3.0].into_iter());
        assert!(r.start < 1.0 && r.end > 3.0);

        let r = padded_range([5.0].into_iter());
        assert!(r.start < 5.0 && r.end > 5.0);
    }

    #[test]
    fn writes_svg() {
        let dir = std::env::temp_dir().join("qsweep_plot_test");
        std::fs::create_dir_all(&dir).unwrap();
        let ctx = SweepCtx {
            op_name: "plot".to_owned(),
            op_dir: dir.clone(),
            ..Default::default()
        };

        let mut controller = SweepController::new(ctx);
        controller.add_reporter(Box::new(PlotReporter::with_size(320, 200)));
        controller
            .run(
                &mut SimulatedDaq::new(SimConfig::default().with_resonator(1100.0, 5.0)),
                1000.0,
                1200.0,
                100.0,
            )
            .unwrap();

        let svg = std::fs::read_to_string(dir.join("plot.svg")).unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.matches("<circle").count() >= 3);

        // Axes are labeled and ticked
        assert!(svg.contains("Frequency [Hz]"));
        assert!(svg.contains("Amplitude [V]"));
        assert!(svg.contains(">plot<"));
        assert!(svg.matches("<text").count() > 4);
    }
}
