//! Dataset discovery against a temporary directory layout.

use ruina::RuinaError;
use ruina::data::{Dataset, DatasetKind, DatasetOptions, ImageSource, RgbImage32, save_png};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const W: usize = 12;
const H: usize = 6;

fn write_images(dir: &Path, count: usize, rgb: [f32; 3]) {
    for i in 0..count {
        save_png(&RgbImage32::filled(W, H, rgb), dir.join(format!("{i:03}.png"))).unwrap();
    }
}

/// `views` temple views of `temple_<n>` and `ruin_dirs` ruin directories,
/// each holding one ruin per view.
fn build_temple(root: &Path, temple: usize, views: usize, ruin_dirs: usize) {
    let name = format!("temple_{temple}");
    write_images(&root.join("temples").join(&name), views, [200.0, 180.0, 150.0]);
    write_images(
        &root.join("colors_temples").join(format!("colors_{name}")),
        views,
        [255.0, 0.0, 0.0],
    );
    for r in 0..ruin_dirs {
        let dir = if r == 0 { name.clone() } else { format!("{name}_{r}") };
        write_images(&root.join("temples_ruins").join(&dir), views, [90.0, 80.0, 70.0]);
        write_images(
            &root.join("colors_temples_ruins").join(format!("colors_{dir}")),
            views,
            [0.0, 0.0, 0.0],
        );
    }
}

fn options(root: &Path, kind: DatasetKind, temples: Vec<usize>) -> DatasetOptions {
    DatasetOptions {
        kind,
        root: root.to_path_buf(),
        temples,
        split: 0.0,
        repeat: 0,
        seed: 7,
    }
}

fn all_samples(d: &Dataset) -> Vec<ruina::data::SampleSource> {
    d.train().iter().chain(d.validation()).cloned().collect()
}

fn file_of(source: &ImageSource) -> PathBuf {
    match source {
        ImageSource::File(p) | ImageSource::BinaryMask(p) => p.clone(),
        ImageSource::PinkMask { ruins, .. } => ruins.clone(),
    }
}

#[test]
fn test_every_ruin_pairs_with_its_view() {
    let dir = TempDir::new().unwrap();
    build_temple(dir.path(), 0, 3, 2);

    let d = Dataset::discover(&options(dir.path(), DatasetKind::ColorAssisted, vec![0])).unwrap();
    assert_eq!(d.len(), 6);
    for sample in all_samples(&d) {
        assert_eq!(sample.inputs.len(), 2);
        let ruin = file_of(&sample.inputs[0]);
        let temple = file_of(&sample.target);
        let colors = file_of(&sample.inputs[1]);
        assert_eq!(ruin.file_name(), temple.file_name());
        assert_eq!(colors.file_name(), temple.file_name());
        assert!(ruin.to_string_lossy().contains("temples_ruins"));
    }
}

#[test]
fn test_repeat_caps_ruin_variants() {
    let dir = TempDir::new().unwrap();
    build_temple(dir.path(), 0, 2, 3);

    let mut opts = options(dir.path(), DatasetKind::Reconstruction, vec![0]);
    assert_eq!(Dataset::discover(&opts).unwrap().len(), 6);
    opts.repeat = 2;
    assert_eq!(Dataset::discover(&opts).unwrap().len(), 4);
}

#[test]
fn test_temple_prefix_does_not_match_longer_numbers() {
    let dir = TempDir::new().unwrap();
    build_temple(dir.path(), 1, 2, 1);
    build_temple(dir.path(), 10, 2, 2);

    let d = Dataset::discover(&options(dir.path(), DatasetKind::Reconstruction, vec![1])).unwrap();
    assert_eq!(d.len(), 2);
    let d = Dataset::discover(&options(dir.path(), DatasetKind::Reconstruction, vec![1, 10])).unwrap();
    assert_eq!(d.len(), 6);
}

#[test]
fn test_unequal_view_lists_are_rejected() {
    let dir = TempDir::new().unwrap();
    build_temple(dir.path(), 0, 2, 1);
    write_images(
        &dir.path().join("colors_temples").join("colors_temple_0"),
        3,
        [255.0, 0.0, 0.0],
    );

    let err = Dataset::discover(&options(dir.path(), DatasetKind::Segmentation, vec![0])).unwrap_err();
    assert!(matches!(err, RuinaError::MismatchedPairs { left: 2, right: 3, .. }), "{err}");
}

#[test]
fn test_fewer_ruins_than_views_is_rejected() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_images(&root.join("temples").join("temple_0"), 3, [1.0; 3]);
    write_images(&root.join("temples_ruins").join("temple_0"), 2, [2.0; 3]);

    let err = Dataset::discover(&options(root, DatasetKind::Reconstruction, vec![0])).unwrap_err();
    assert!(matches!(err, RuinaError::MismatchedPairs { .. }), "{err}");
}

#[test]
fn test_missing_directory_is_empty_dataset() {
    let dir = TempDir::new().unwrap();
    build_temple(dir.path(), 0, 2, 1);

    let err = Dataset::discover(&options(dir.path(), DatasetKind::Reconstruction, vec![4])).unwrap_err();
    assert!(matches!(err, RuinaError::EmptyDataset(_)), "{err}");
}

#[test]
fn test_split_holds_out_validation() {
    let dir = TempDir::new().unwrap();
    build_temple(dir.path(), 0, 4, 2);

    let mut opts = options(dir.path(), DatasetKind::Segmentation, vec![0]);
    opts.split = 0.25;
    let d = Dataset::discover(&opts).unwrap();
    assert_eq!(d.len(), 4);
    assert_eq!(d.validation().len(), 1);
    assert_eq!(d.train().len(), 3);
}

#[test]
fn test_masking_kinds_derive_their_images() {
    let dir = TempDir::new().unwrap();
    build_temple(dir.path(), 0, 1, 1);

    let d = Dataset::discover(&options(dir.path(), DatasetKind::Masking, vec![0])).unwrap();
    let images = d.train()[0].load().unwrap();
    // segmented ruins are all black, so the mask is empty
    assert!(images[1].data.iter().all(|&v| v == 0.0));

    let d = Dataset::discover(&options(dir.path(), DatasetKind::DeMasking, vec![0])).unwrap();
    let images = d.train()[0].load().unwrap();
    // segmented ruins differ from the segmented temple everywhere
    assert_eq!(images[0].pixel(0, 0), [255.0, 0.0, 255.0]);
    assert_eq!(images[1].pixel(0, 0), [200.0, 180.0, 150.0]);
}
