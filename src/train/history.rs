//! Per-epoch metrics history as CSV.

use super::metrics::MetricsSnapshot;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryRow {
    pub epoch: usize,
    pub phase: String,
    pub lambda: f32,
    pub disc_loss: f32,
    pub gen_loss: f32,
    pub gen_adversarial: f32,
    pub gen_l1: f32,
    pub real_acc: f32,
    pub gen_acc: f32,
}

impl HistoryRow {
    pub fn new(epoch: usize, phase: &str, lambda: f32, m: &MetricsSnapshot) -> Self {
        Self {
            epoch,
            phase: phase.to_string(),
            lambda,
            disc_loss: m.disc_loss,
            gen_loss: m.gen_loss,
            gen_adversarial: m.gen_adversarial,
            gen_l1: m.gen_l1,
            real_acc: m.real_acc,
            gen_acc: m.gen_acc,
        }
    }
}

pub struct HistoryWriter {
    writer: csv::Writer<File>,
}

impl HistoryWriter {
    /// Create (or truncate) `path`; the header is written with the first row.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self {
            writer: csv::Writer::from_path(path)?,
        })
    }

    pub fn append(&mut self, row: &HistoryRow) -> Result<()> {
        self.writer.serialize(row)?;
        self.writer.flush()?;
        Ok(())
    }
}

pub fn read_history(path: impl AsRef<Path>) -> Result<Vec<HistoryRow>> {
    let mut reader = csv::Reader::from_path(path)?;
    reader
        .deserialize::<HistoryRow>()
        .map(|row| row.map_err(Into::into))
        .collect()
}
