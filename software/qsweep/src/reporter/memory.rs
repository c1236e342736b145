use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::sweep::{SweepCtx, SweepPoint, SweepReport};

use super::Reporter;

/// Cloneable handle for reading sweep points while a sweep runs on another thread.
#[derive(Clone, Default, Debug)]
pub struct MemoryHandle {
    frequencies: Arc<RwLock<Vec<f64>>>,
    points: Arc<RwLock<Vec<SweepPoint>>>,
    report: Arc<RwLock<Option<SweepReport>>>,
}

impl MemoryHandle {
    /// Frequencies planned for the current sweep.
    pub fn frequencies(&self) -> Vec<f64> {
        self.frequencies
            .read()
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    /// Snapshot of the points completed so far.
    pub fn points(&self) -> Vec<SweepPoint> {
        self.points.read().map(|v| v.clone()).unwrap_or_default()
    }

    /// Number of points completed so far.
    pub fn completed(&self) -> usize {
        self.points.read().map(|v| v.len()).unwrap_or_default()
    }

    /// The summary of the last finished sweep, if any.
    pub fn report(&self) -> Option<SweepReport> {
        self.report.read().ok().and_then(|r| r.clone())
    }
}

/// Reporter that keeps every point in memory behind a shared handle.
#[derive(Serialize, Deserialize, Default, Debug)]
pub struct MemoryReporter {
    #[serde(skip)]
    handle: MemoryHandle,
}

impl MemoryReporter {
    pub fn new() -> (Self, MemoryHandle) {
        let handle = MemoryHandle::default();
        (
            Self {
                handle: handle.clone(),
            },
            handle,
        )
    }

    pub fn handle(&self) -> MemoryHandle {
        self.handle.clone()
    }
}

#[typetag::serde]
impl Reporter for MemoryReporter {
    fn init(&mut self, _ctx: &SweepCtx, frequencies: &[f64]) -> Result<(), String> {
        // Reset so readers never see a mix of two sweeps.
        if let Ok(mut w) = self.handle.frequencies.write() {
            *w = frequencies.to_vec();
        }
        if let Ok(mut w) = self.handle.points.write() {
            w.clear();
        }
        if let Ok(mut w) = self.handle.report.write() {
            *w = None;
        }
        Ok(())
    }

    fn consume(&mut self, point: &SweepPoint) -> Result<(), String> {
        self.handle
            .points
            .write()
            .map_err(|_| "Sweep point store was poisoned".to_owned())?
            .push(point.clone());
        Ok(())
    }

    fn finish(&mut self, report: &SweepReport) -> Result<(), String> {
        if let Ok(mut w) = self.handle.report.write() {
            *w = Some(report.clone());
        }
        Ok(())
    }
}
