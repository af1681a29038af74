//! On-disk run summaries: JSON-lines scalars and PNG image strips.

use crate::data::image::{RgbImage32, hstack, save_png};
use crate::data::transforms::to_pixel_range;
use crate::error::Result;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// File every writer appends its events to.
pub const SCALARS_FILE: &str = "scalars.jsonl";

/// `log_dir/<YYYYmmdd-HHMMSS>`.
pub fn run_dir(log_dir: &Path, started: DateTime<Local>) -> PathBuf {
    log_dir.join(started.format("%Y%m%d-%H%M%S").to_string())
}

/// One line of `scalars.jsonl`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SummaryEvent {
    Scalar {
        tag: String,
        step: usize,
        value: f32,
    },
    Image {
        tag: String,
        step: usize,
        path: PathBuf,
    },
}

/// Writes the summaries of one phase (`train`, `validation`, `predict`).
pub struct SummaryWriter {
    dir: PathBuf,
    events: BufWriter<File>,
}

impl SummaryWriter {
    pub fn create(run_dir: &Path, phase: &str) -> Result<Self> {
        let dir = run_dir.join(phase);
        std::fs::create_dir_all(&dir)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(SCALARS_FILE))?;
        Ok(Self {
            dir,
            events: BufWriter::new(file),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record(&mut self, event: &SummaryEvent) -> Result<()> {
        serde_json::to_writer(&mut self.events, event)?;
        self.events.write_all(b"\n")?;
        Ok(())
    }

    pub fn scalar(&mut self, tag: &str, value: f32, step: usize) -> Result<()> {
        self.record(&SummaryEvent::Scalar {
            tag: tag.to_string(),
            step,
            value,
        })
    }

    /// Save `images` (values in `[-1, 1]`) side by side as one PNG.
    pub fn image_strip(&mut self, tag: &str, images: &[RgbImage32], step: usize) -> Result<PathBuf> {
        let mut images = images.to_vec();
        images.iter_mut().for_each(to_pixel_range);
        let file_tag = tag.replace(|c: char| !c.is_ascii_alphanumeric(), "_");
        let path = self.dir.join(format!("{file_tag}_{step:05}.png"));
        save_png(&hstack(&images)?, &path)?;
        self.record(&SummaryEvent::Image {
            tag: tag.to_string(),
            step,
            path: path.clone(),
        })?;
        Ok(path)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.events.flush()?;
        Ok(())
    }
}

impl Drop for SummaryWriter {
    fn drop(&mut self) {
        let _ = self.events.flush();
    }
}

/// Parse a `scalars.jsonl` file.
pub fn read_events(path: impl AsRef<Path>) -> Result<Vec<SummaryEvent>> {
    let text = std::fs::read_to_string(path)?;
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str::<SummaryEvent>(line).map_err(Into::into))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_run_dir_format() {
        let t = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(run_dir(Path::new("logs"), t), PathBuf::from("logs/20240309-070501"));
    }

    #[test]
    fn test_scalars_and_images_are_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = SummaryWriter::create(dir.path(), "train").unwrap();
        w.scalar("gen_loss", 1.5, 0).unwrap();
        let img = RgbImage32::filled(2, 2, [1.0, -1.0, 0.0]);
        let path = w.image_strip("train samples", &[img.clone(), img], 3).unwrap();
        w.flush().unwrap();

        assert!(path.ends_with("train_samples_00003.png"));
        let strip = crate::data::image::load_png(&path).unwrap();
        assert_eq!(strip.dims(), [2, 4]);
        assert_eq!(strip.pixel(3, 1), [255.0, 0.0, 128.0]);

        let events = read_events(dir.path().join("train").join(SCALARS_FILE)).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            SummaryEvent::Scalar {
                tag: "gen_loss".into(),
                step: 0,
                value: 1.5
            }
        );
    }
}
