//! A sweep across the simulated board's resonance.
//!
//! Demonstrated here:
//!   * Configuring a simulated board with a known resonance
//!   * Collecting sweep points in memory while writing a table and a plot
//!   * Saving and reloading the sweep plan

use qsweep::daq::SimConfig;
use qsweep::reporter::{CsvReporter, MemoryReporter, PlotReporter};
use qsweep::*;

fn main() {
    let mut ctx = SweepCtx::default();
    ctx.op_name = "simulated_example".into();
    ctx.op_dir = std::env::temp_dir();
    let mut controller = SweepController::new(ctx);

    // Set up data targets
    controller.add_reporter(Box::new(CsvReporter::new()));
    controller.add_reporter(Box::new(PlotReporter::new()));
    let (memory, handle) = MemoryReporter::new();
    controller.add_reporter(Box::new(memory));

    // Serialize the plan (for demonstration purposes)
    let plan = SweepPlan {
        ctx: controller.ctx().clone(),
        reporters: vec![Box::new(CsvReporter::new())],
    };
    let serialized = serde_json::to_string_pretty(&plan).unwrap();
    let _: SweepPlan = serde_json::from_str(&serialized).unwrap();

    // A resonance at 2.5 kHz, swept from 1 kHz to 4 kHz
    let mut daq = SimulatedDaq::new(SimConfig::default().with_resonator(2_500.0, 10.0));
    let report = controller.run(&mut daq, 1_000.0, 4_000.0, 100.0).unwrap();

    let peak = handle
        .points()
        .iter()
        .filter_map(|p| Some((p.frequency_hz, p.amplitude_volts()?)))
        .fold((0.0, 0.0), |best, p| if p.1 > best.1 { p } else { best });
    println!(
        "Peak amplitude {:.3} V at {} Hz, {} of {} points fitted",
        peak.1,
        peak.0,
        report.fitted_count(),
        report.frequencies.len()
    );
}
