//! A plain-text CSV table of sweep points with fixed-width row formatting.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::sweep::{SweepCtx, SweepPoint, SweepReport};

use super::{Reporter, csv_header, csv_row_fixed_width};

/// Writes one row per sweep point to `{op_dir}/{op_name}.csv`.
///
/// Each line is fixed-width, so a given point can be found by arithmetic
/// on the byte offset rather than by reading the whole file. Points without
/// a fit carry NaN in the fit columns.
#[derive(Serialize, Deserialize, Default, Debug)]
pub struct CsvReporter {
    #[serde(skip)]
    writer: Option<BufWriter<File>>,

    #[serde(skip)]
    path: Option<PathBuf>,

    #[serde(skip)]
    index: i64,

    #[serde(skip)]
    stringbuf: String,
}

impl CsvReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Location of the table for the current sweep, once initialized
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

#[typetag::serde]
impl Reporter for CsvReporter {
    fn init(&mut self, ctx: &SweepCtx, _frequencies: &[f64]) -> Result<(), String> {
        // Close out any previous sweep's file
        self.writer = None;
        self.index = 0;

        let path = ctx.op_dir.join(format!("{}.csv", ctx.op_name));
        let file =
            File::create(&path).map_err(|e| format!("Failed to create CSV file {path:?}: {e}"))?;
        let mut writer = BufWriter::new(file);
        writer
            .write_all(csv_header().as_bytes())
            .map_err(|e| format!("Failed to write CSV header: {e}"))?;

        info!("Writing sweep table to {path:?}");
        self.writer = Some(writer);
        self.path = Some(path);
        Ok(())
    }

    fn consume(&mut self, point: &SweepPoint) -> Result<(), String> {
        let writer = self
            .writer
            .as_mut()
            .ok_or("Reporter must be initialized before consuming data")?;
        csv_row_fixed_width(&mut self.stringbuf, self.index, SystemTime::now(), point);
        writer
            .write_all(self.stringbuf.as_bytes())
            .map_err(|e| format!("Failed to write CSV row: {e}"))?;
        self.index += 1;
        Ok(())
    }

    fn finish(&mut self, _report: &SweepReport) -> Result<(), String> {
        if let Some(mut writer) = self.writer.take() {
            writer
                .flush()
                .map_err(|e| format!("Failed to flush CSV file: {e}"))?;
        }
        Ok(())
    }
}
