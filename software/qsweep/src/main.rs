//! Command-line frequency sweep against the simulated board.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing::{error, info, warn};

use qsweep::daq::SimConfig;
use qsweep::logging::{finish_logging, init_logging};
use qsweep::math::AmplitudeGuess;
use qsweep::reporter::{CsvReporter, PlotReporter, ProgressReporter, TextLogReporter};
use qsweep::sweep::SyncMode;
use qsweep::{SimulatedDaq, SweepController, SweepCtx, SweepPlan};

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SyncArg {
    Digital,
    Analog,
    None,
}

impl From<SyncArg> for SyncMode {
    fn from(value: SyncArg) -> Self {
        match value {
            SyncArg::Digital => SyncMode::DigitalTrigger,
            SyncArg::Analog => SyncMode::AnalogTrigger,
            SyncArg::None => SyncMode::Untriggered,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum GuessArg {
    HalfPeakToPeak,
    SumOfExtrema,
}

impl From<GuessArg> for AmplitudeGuess {
    fn from(value: GuessArg) -> Self {
        match value {
            GuessArg::HalfPeakToPeak => AmplitudeGuess::HalfPeakToPeak,
            GuessArg::SumOfExtrema => AmplitudeGuess::SumOfExtrema,
        }
    }
}

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Lowest stimulus frequency in Hz
    min_hz: f64,

    /// Highest stimulus frequency in Hz
    max_hz: f64,

    /// Frequency step in Hz
    step_hz: f64,

    /// Load the sweep context and reporters from a saved plan
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Save the resolved plan to this path before sweeping
    #[clap(long)]
    save_config: Option<PathBuf>,

    /// Name of the log, table, and plot files
    #[clap(long)]
    op_name: Option<String>,

    /// Directory for the log, table, and plot files
    #[clap(long)]
    op_dir: Option<PathBuf>,

    /// How the output and input scans are started together
    #[clap(long, value_enum)]
    sync: Option<SyncArg>,

    /// Initial amplitude estimate for the fit
    #[clap(long, value_enum)]
    amplitude_guess: Option<GuessArg>,

    /// Resonance frequency of the simulated board in Hz
    #[clap(long, default_value_t = 25_000.0)]
    sim_center_hz: f64,

    /// Quality factor of the simulated resonance
    #[clap(long, default_value_t = 20.0)]
    sim_q: f64,

    /// Skip the amplitude plot
    #[clap(long)]
    no_plot: bool,
}

fn controller_from_args(args: &Args) -> Result<SweepController, String> {
    let plan = match &args.config {
        Some(path) => SweepPlan::load(path)?,
        None => {
            let mut plan = SweepPlan::default();
            plan.reporters.push(Box::new(CsvReporter::new()));
            if !args.no_plot {
                plan.reporters.push(Box::new(PlotReporter::new()));
            }
            plan.reporters.push(Box::new(TextLogReporter::new()));
            plan.reporters.push(Box::new(ProgressReporter::new()));
            plan
        }
    };

    let mut ctx: SweepCtx = plan.ctx.clone();
    if let Some(name) = &args.op_name {
        ctx.op_name = name.clone();
    }
    if let Some(dir) = &args.op_dir {
        ctx.op_dir = dir.clone();
    }
    if let Some(sync) = args.sync {
        ctx.sync = sync.into();
    }
    if let Some(guess) = args.amplitude_guess {
        ctx.fit.amplitude_guess = guess.into();
    }

    let plan = SweepPlan {
        ctx,
        reporters: plan.reporters,
    };
    if let Some(path) = &args.save_config {
        plan.save(path)?;
    }
    Ok(SweepController::from(plan))
}

fn main() -> ExitCode {
    let args = Args::parse();

    let mut controller = match controller_from_args(&args) {
        Ok(controller) => controller,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let ctx = controller.ctx();
    if let Err(e) = std::fs::create_dir_all(&ctx.op_dir) {
        eprintln!("Failed to create output directory {:?}: {e}", ctx.op_dir);
        return ExitCode::FAILURE;
    }
    match init_logging(&ctx.op_dir, &ctx.op_name) {
        Ok(path) => info!("Logging to {path:?}"),
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    }

    let config = SimConfig {
        board_num: ctx.board_num,
        ..SimConfig::default()
    }
    .with_resonator(args.sim_center_hz, args.sim_q);
    let mut daq = SimulatedDaq::new(config);

    let code = match controller.run(&mut daq, args.min_hz, args.max_hz, args.step_hz) {
        Ok(report) => {
            match report.check_complete() {
                Ok(()) => info!("Test successful"),
                Err(e) => warn!("{e}"),
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Sweep failed: {e}");
            ExitCode::FAILURE
        }
    };

    finish_logging();
    code
}
