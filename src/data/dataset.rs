//! Discovery and pairing of temple image files.
//!
//! Expected layout under the dataset root, for temple `temple_<n>`:
//!
//! ```text
//! temples/temple_<n>/*.png                     true-colour temple
//! temples_ruins/temple_<n>*/*.png              ruined variants
//! colors_temples/colors_temple_<n>/*.png       segmented temple
//! colors_temples_ruins/colors_temple_<n>*/*.png segmented ruins
//! ```
//!
//! Every ruin directory holds one image per temple view, in the same order,
//! so ruin image `i` pairs with temple view `i % views`.

use super::image::{RgbImage32, load_png};
use super::masks::{binary_mask, pink_mask};
use crate::error::{Result, RuinaError};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Which images play the input and target roles.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    /// (ruins, segmented temple) → temple
    #[default]
    ColorAssisted,
    /// segmented ruins → segmented temple
    ColorReconstruction,
    /// ruins → temple
    Reconstruction,
    /// segmented temple → temple
    Segmentation,
    /// temple → segmented temple
    #[serde(alias = "de-segmentation")]
    DeSegmentation,
    /// ruins → mask of the surviving structure
    Masking,
    /// ruins with missing parts painted pink → temple
    #[serde(alias = "de-masking")]
    DeMasking,
}

impl DatasetKind {
    /// Number of generator input images per sample.
    pub fn heads(self) -> usize {
        match self {
            DatasetKind::ColorAssisted => 2,
            _ => 1,
        }
    }

    fn needs(self, role: Role) -> bool {
        use DatasetKind::*;
        use Role::*;
        match role {
            Temple => matches!(
                self,
                ColorAssisted | Reconstruction | Segmentation | DeSegmentation | DeMasking
            ),
            Ruins => matches!(self, ColorAssisted | Reconstruction | Masking),
            Colors => matches!(
                self,
                ColorAssisted | ColorReconstruction | Segmentation | DeSegmentation | DeMasking
            ),
            ColorsRuins => matches!(self, ColorReconstruction | Masking | DeMasking),
        }
    }

    fn sample(self, f: &PairedFiles) -> SampleSource {
        use DatasetKind::*;
        use ImageSource::File;
        let file = |p: &Option<PathBuf>| File(p.clone().unwrap_or_default());
        let (inputs, target) = match self {
            ColorAssisted => (vec![file(&f.ruins), file(&f.colors)], file(&f.temple)),
            ColorReconstruction => (vec![file(&f.colors_ruins)], file(&f.colors)),
            Reconstruction => (vec![file(&f.ruins)], file(&f.temple)),
            Segmentation => (vec![file(&f.colors)], file(&f.temple)),
            DeSegmentation => (vec![file(&f.temple)], file(&f.colors)),
            Masking => (
                vec![file(&f.ruins)],
                ImageSource::BinaryMask(f.colors_ruins.clone().unwrap_or_default()),
            ),
            DeMasking => (
                vec![ImageSource::PinkMask {
                    ruins: f.colors_ruins.clone().unwrap_or_default(),
                    reference: f.colors.clone().unwrap_or_default(),
                    fill: f.temple.clone().unwrap_or_default(),
                }],
                file(&f.temple),
            ),
        };
        SampleSource { inputs, target }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Role {
    Temple,
    Ruins,
    Colors,
    ColorsRuins,
}

impl Role {
    fn name(self) -> &'static str {
        match self {
            Role::Temple => "temple",
            Role::Ruins => "ruins",
            Role::Colors => "segmented temple",
            Role::ColorsRuins => "segmented ruins",
        }
    }

    fn per_ruin(self) -> bool {
        matches!(self, Role::Ruins | Role::ColorsRuins)
    }
}

/// One image of a sample, decoded lazily.
#[derive(Clone, Debug, PartialEq)]
pub enum ImageSource {
    File(PathBuf),
    /// [`binary_mask`] of a segmented image.
    BinaryMask(PathBuf),
    /// [`pink_mask`] of segmented ruins against the segmented temple.
    PinkMask {
        ruins: PathBuf,
        reference: PathBuf,
        fill: PathBuf,
    },
}

impl ImageSource {
    pub fn load(&self) -> Result<RgbImage32> {
        match self {
            ImageSource::File(path) => load_png(path),
            ImageSource::BinaryMask(path) => Ok(binary_mask(&load_png(path)?)),
            ImageSource::PinkMask {
                ruins,
                reference,
                fill,
            } => pink_mask(&load_png(ruins)?, &load_png(reference)?, &load_png(fill)?),
        }
    }
}

/// Inputs and target of one training example.
#[derive(Clone, Debug, PartialEq)]
pub struct SampleSource {
    pub inputs: Vec<ImageSource>,
    pub target: ImageSource,
}

impl SampleSource {
    /// Decode inputs followed by the target.
    pub fn load(&self) -> Result<Vec<RgbImage32>> {
        self.inputs
            .iter()
            .chain(std::iter::once(&self.target))
            .map(ImageSource::load)
            .collect()
    }
}

#[derive(Default)]
struct PairedFiles {
    temple: Option<PathBuf>,
    ruins: Option<PathBuf>,
    colors: Option<PathBuf>,
    colors_ruins: Option<PathBuf>,
}

impl PairedFiles {
    fn slot(&mut self, role: Role) -> &mut Option<PathBuf> {
        match role {
            Role::Temple => &mut self.temple,
            Role::Ruins => &mut self.ruins,
            Role::Colors => &mut self.colors,
            Role::ColorsRuins => &mut self.colors_ruins,
        }
    }
}

/// Where to find samples and how to split them.
#[derive(Clone, Debug, PartialEq)]
pub struct DatasetOptions {
    pub kind: DatasetKind,
    pub root: PathBuf,
    pub temples: Vec<usize>,
    /// Fraction of samples held out for validation.
    pub split: f32,
    /// Ruin variants used per temple view; 0 uses every variant found.
    pub repeat: usize,
    pub seed: u64,
}

/// Shuffled samples, split once into training and validation parts.
#[derive(Clone, Debug)]
pub struct Dataset {
    kind: DatasetKind,
    train: Vec<SampleSource>,
    validation: Vec<SampleSource>,
}

impl Dataset {
    pub fn discover(options: &DatasetOptions) -> Result<Self> {
        let mut samples = Vec::new();
        for &temple in &options.temples {
            let found = temple_samples(options, temple)?;
            debug!(temple, samples = found.len(), "paired temple images");
            samples.extend(found);
        }
        if samples.is_empty() {
            return Err(RuinaError::EmptyDataset(options.root.display().to_string()));
        }
        let dataset = Self::from_samples(options.kind, samples, options.split, options.seed);
        info!(
            kind = ?options.kind,
            train = dataset.train.len(),
            validation = dataset.validation.len(),
            "dataset ready"
        );
        Ok(dataset)
    }

    /// Shuffle with `seed` and hold out `round(n * split)` samples.
    pub fn from_samples(kind: DatasetKind, mut samples: Vec<SampleSource>, split: f32, seed: u64) -> Self {
        samples.shuffle(&mut StdRng::seed_from_u64(seed));
        let held_out = ((samples.len() as f32) * split).round() as usize;
        let validation = samples.split_off(samples.len() - held_out.min(samples.len()));
        Self {
            kind,
            train: samples,
            validation,
        }
    }

    pub fn kind(&self) -> DatasetKind {
        self.kind
    }

    pub fn train(&self) -> &[SampleSource] {
        &self.train
    }

    pub fn validation(&self) -> &[SampleSource] {
        &self.validation
    }

    pub fn len(&self) -> usize {
        self.train.len() + self.validation.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn role_files(root: &Path, temple: usize, role: Role) -> Result<Vec<PathBuf>> {
    let name = format!("temple_{temple}");
    let files = match role {
        Role::Temple => pngs_in(&root.join("temples").join(&name))?,
        Role::Colors => pngs_in(&root.join("colors_temples").join(format!("colors_{name}")))?,
        Role::Ruins => variant_pngs(&root.join("temples_ruins"), &name)?,
        Role::ColorsRuins => variant_pngs(&root.join("colors_temples_ruins"), &format!("colors_{name}"))?,
    };
    if files.is_empty() {
        return Err(RuinaError::EmptyDataset(format!("{} of {name}", role.name())));
    }
    Ok(files)
}

fn temple_samples(options: &DatasetOptions, temple: usize) -> Result<Vec<SampleSource>> {
    let roles: Vec<Role> = [Role::Temple, Role::Ruins, Role::Colors, Role::ColorsRuins]
        .into_iter()
        .filter(|&r| options.kind.needs(r))
        .collect();
    let mut lists = Vec::with_capacity(roles.len());
    for &role in &roles {
        lists.push((role, role_files(&options.root, temple, role)?));
    }

    let views = equal_len(&lists, false)?;
    let variants = equal_len(&lists, true)?;
    let count = match (views, variants) {
        (Some(views), Some(ruins)) => {
            let mut repetition = ruins / views;
            if repetition == 0 {
                return Err(RuinaError::MismatchedPairs {
                    kind: format!("ruin of temple_{temple}"),
                    left: ruins,
                    right: views,
                });
            }
            if options.repeat > 0 {
                repetition = repetition.min(options.repeat);
            }
            views * repetition
        }
        (Some(n), None) | (None, Some(n)) => n,
        (None, None) => 0,
    };

    Ok((0..count)
        .map(|i| {
            let mut files = PairedFiles::default();
            for (role, list) in &lists {
                let index = if role.per_ruin() { i } else { i % list.len() };
                *files.slot(*role) = Some(list[index].clone());
            }
            options.kind.sample(&files)
        })
        .collect())
}

/// Shared length of the per-view (or per-ruin) lists, if any are present.
fn equal_len(lists: &[(Role, Vec<PathBuf>)], per_ruin: bool) -> Result<Option<usize>> {
    let mut found: Option<(Role, usize)> = None;
    for (role, list) in lists.iter().filter(|(r, _)| r.per_ruin() == per_ruin) {
        match found {
            None => found = Some((*role, list.len())),
            Some((first, n)) if n != list.len() => {
                return Err(RuinaError::MismatchedPairs {
                    kind: format!("{} and {}", first.name(), role.name()),
                    left: n,
                    right: list.len(),
                });
            }
            Some(_) => {}
        }
    }
    Ok(found.map(|(_, n)| n))
}

/// Sorted `.png` files directly inside `dir`; none if `dir` does not exist.
pub fn pngs_in(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    if !dir.is_dir() {
        return Ok(files);
    }
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(std::io::Error::from)?;
        let is_png = entry
            .path()
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("png"));
        if entry.file_type().is_file() && is_png {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

/// PNGs of every directory under `parent` named `stem` or `stem_*`, in
/// directory then file order.
fn variant_pngs(parent: &Path, stem: &str) -> Result<Vec<PathBuf>> {
    let prefix = format!("{stem}_");
    let mut dirs = Vec::new();
    if !parent.is_dir() {
        return Ok(dirs);
    }
    for entry in WalkDir::new(parent).min_depth(1).max_depth(1) {
        let entry = entry.map_err(std::io::Error::from)?;
        let matches = {
            let name = entry.file_name().to_string_lossy();
            name == stem || name.starts_with(&prefix)
        };
        if entry.file_type().is_dir() && matches {
            dirs.push(entry.into_path());
        }
    }
    dirs.sort();
    let mut files = Vec::new();
    for dir in dirs {
        files.extend(pngs_in(&dir)?);
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str) -> SampleSource {
        SampleSource {
            inputs: vec![ImageSource::File(name.into())],
            target: ImageSource::File(name.into()),
        }
    }

    #[test]
    fn test_split_sizes() {
        let samples: Vec<_> = (0..10).map(|i| file(&i.to_string())).collect();
        let d = Dataset::from_samples(DatasetKind::Reconstruction, samples, 0.25, 3);
        // round(2.5) = 3 held out
        assert_eq!(d.validation().len(), 3);
        assert_eq!(d.train().len(), 7);
        assert_eq!(d.len(), 10);
    }

    #[test]
    fn test_split_is_seeded() {
        let samples: Vec<_> = (0..20).map(|i| file(&i.to_string())).collect();
        let a = Dataset::from_samples(DatasetKind::Reconstruction, samples.clone(), 0.2, 9);
        let b = Dataset::from_samples(DatasetKind::Reconstruction, samples, 0.2, 9);
        assert_eq!(a.train(), b.train());
        assert_eq!(a.validation(), b.validation());
    }

    #[test]
    fn test_zero_split_keeps_everything_for_training() {
        let d = Dataset::from_samples(DatasetKind::Segmentation, vec![file("a")], 0.0, 0);
        assert_eq!(d.train().len(), 1);
        assert!(d.validation().is_empty());
    }

    #[test]
    fn test_kind_roles() {
        assert_eq!(DatasetKind::ColorAssisted.heads(), 2);
        assert_eq!(DatasetKind::DeMasking.heads(), 1);
        assert!(DatasetKind::Masking.needs(Role::ColorsRuins));
        assert!(!DatasetKind::Segmentation.needs(Role::Ruins));
    }

    #[test]
    fn test_kind_names() {
        let k: DatasetKind = serde_yaml::from_str("de-segmentation").unwrap();
        assert_eq!(k, DatasetKind::DeSegmentation);
        let k: DatasetKind = serde_yaml::from_str("color_assisted").unwrap();
        assert_eq!(k, DatasetKind::ColorAssisted);
    }
}
