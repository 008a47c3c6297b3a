use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Summary of the per-step reward log.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RewardStats {
    pub count: usize,
    pub total: f64,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

impl RewardStats {
    pub fn from_log<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open reward log {}", path.display()))?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut count = 0usize;
        let mut total = 0.0f64;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;

        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let r: f64 = line
                .parse()
                .with_context(|| format!("Bad reward {line:?} on line {}", idx + 1))?;
            count += 1;
            total += r;
            min = min.min(r);
            max = max.max(r);
        }

        if count == 0 {
            return Ok(Self::default());
        }
        Ok(Self {
            count,
            total,
            mean: total / count as f64,
            min,
            max,
        })
    }
}
