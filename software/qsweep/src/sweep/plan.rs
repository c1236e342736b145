//! Saved sweep setup: context plus reporters, stored as JSON

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::reporter::Reporter;

use super::SweepCtx;

#[derive(Serialize, Deserialize, Default, Debug)]
pub struct SweepPlan {
    pub ctx: SweepCtx,
    pub reporters: Vec<Box<dyn Reporter>>,
}

impl SweepPlan {
    pub fn load(path: &Path) -> Result<Self, String> {
        let text = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read sweep plan {path:?}: {e}"))?;
        serde_json::from_str(&text).map_err(|e| format!("Failed to parse sweep plan {path:?}: {e}"))
    }

    pub fn save(&self, path: &Path) -> Result<(), String> {
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize sweep plan: {e}"))?;
        fs::write(path, text).map_err(|e| format!("Failed to write sweep plan {path:?}: {e}"))
    }
}
