use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::sweep::{SweepCtx, SweepPoint, SweepReport};

use super::Reporter;

/// Single-line console progress counter, rewritten in place as points complete.
#[derive(Serialize, Deserialize, Default, Debug)]
pub struct ProgressReporter {
    #[serde(skip)]
    completed: usize,

    #[serde(skip)]
    total: usize,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self::default()
    }
}

fn line(completed: usize, total: usize) -> String {
    format!("\rFrequencies completed: {completed}/{total}")
}

#[typetag::serde]
impl Reporter for ProgressReporter {
    fn init(&mut self, _ctx: &SweepCtx, frequencies: &[f64]) -> Result<(), String> {
        self.completed = 0;
        self.total = frequencies.len();
        println!("Scan in progress...");
        Ok(())
    }

    fn consume(&mut self, _point: &SweepPoint) -> Result<(), String> {
        self.completed += 1;
        let mut stdout = std::io::stdout().lock();
        // Console output is best-effort
        let _ = stdout.write_all(line(self.completed, self.total).as_bytes());
        let _ = stdout.flush();
        Ok(())
    }

    fn finish(&mut self, report: &SweepReport) -> Result<(), String> {
        println!();
        println!("Time taken: {:.2} sec", report.elapsed.as_secs_f64());
        Ok(())
    }
}
