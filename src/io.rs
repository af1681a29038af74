use crate::error::{Result, RuinaError};
use crate::nn::Module;
use crate::tensor::Tensor;
use bincode::{Decode, Encode, config};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub type StateDict = BTreeMap<String, TensorData>;

// Serializable representation of tensor data
#[derive(Encode, Decode, Clone, Debug, PartialEq)]
pub struct TensorData {
    pub data: Vec<f32>,
    pub shape: Vec<usize>,
}

/// Summary of differences between two state dicts.
///
/// `expected` is usually taken from `model.state_dict()`, and `loaded` is
/// what was deserialized from a checkpoint.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StateDictDiff {
    /// Keys that exist in `expected` but are missing from `loaded`.
    pub missing_keys: Vec<String>,
    /// Keys that exist in `loaded` but not in `expected`.
    pub unexpected_keys: Vec<String>,
    /// `(key, expected_shape, loaded_shape)` for keys present in both.
    pub shape_mismatches: Vec<(String, Vec<usize>, Vec<usize>)>,
}

impl StateDictDiff {
    pub fn is_empty(&self) -> bool {
        self.missing_keys.is_empty()
            && self.unexpected_keys.is_empty()
            && self.shape_mismatches.is_empty()
    }
}

impl std::fmt::Display for StateDictDiff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "missing {:?}, unexpected {:?}, shape mismatches {:?}",
            self.missing_keys, self.unexpected_keys, self.shape_mismatches
        )
    }
}

impl TensorData {
    pub fn from_tensor(t: &Tensor) -> Self {
        let borrowed = t.borrow();
        TensorData {
            data: borrowed.data.clone(),
            shape: borrowed.shape.clone(),
        }
    }

    pub fn to_tensor(&self, requires_grad: bool) -> Tensor {
        crate::RawTensor::new(self.data.clone(), &self.shape, requires_grad)
    }

    /// Overwrite `t`'s values in place, keeping its graph flags.
    pub fn copy_into(&self, t: &Tensor) {
        let mut b = t.borrow_mut();
        b.data.clone_from(&self.data);
        b.shape.clone_from(&self.shape);
    }
}

/// Insert each `(name, tensor)` into a fresh state dict.
pub fn state_dict_from(entries: &[(&str, &Tensor)]) -> StateDict {
    entries
        .iter()
        .map(|(name, t)| ((*name).to_string(), TensorData::from_tensor(t)))
        .collect()
}

/// Load every `(name, tensor)` present in `state`; absent names are left untouched.
pub fn load_entries(state: &StateDict, entries: &[(&str, &Tensor)]) {
    for (name, t) in entries {
        if let Some(td) = state.get(*name) {
            td.copy_into(t);
        }
    }
}

/// Prefix every key of `sub` with `prefix.` and merge it into `state`.
pub fn merge_prefixed(state: &mut StateDict, prefix: &str, sub: StateDict) {
    for (key, value) in sub {
        state.insert(format!("{prefix}.{key}"), value);
    }
}

/// The entries of `state` under `prefix.`, with the prefix stripped.
pub fn sub_state(state: &StateDict, prefix: &str) -> StateDict {
    let prefix = format!("{prefix}.");
    state
        .iter()
        .filter_map(|(key, value)| {
            key.strip_prefix(&prefix)
                .filter(|rest| !rest.is_empty())
                .map(|rest| (rest.to_string(), value.clone()))
        })
        .collect()
}

/// Compute a diff between an "expected" and a "loaded" state dict.
///
/// Purely informational; no tensor is touched.
pub fn diff_state_dict(expected: &StateDict, loaded: &StateDict) -> StateDictDiff {
    let mut diff = StateDictDiff::default();

    for (key, expected_td) in expected {
        match loaded.get(key) {
            None => diff.missing_keys.push(key.clone()),
            Some(actual_td) if expected_td.shape != actual_td.shape => {
                diff.shape_mismatches.push((
                    key.clone(),
                    expected_td.shape.clone(),
                    actual_td.shape.clone(),
                ));
            }
            Some(_) => {}
        }
    }

    diff.unexpected_keys = loaded
        .keys()
        .filter(|key| !expected.contains_key(*key))
        .cloned()
        .collect();

    diff
}

/// Load `state` into `module` only if it matches the module's layout exactly.
///
/// # Errors
/// `RuinaError::Serialization` describing the diff when keys or shapes disagree.
pub fn load_state_dict_checked<M: Module + ?Sized>(module: &mut M, state: &StateDict) -> Result<()> {
    let diff = diff_state_dict(&module.state_dict(), state);
    if !diff.is_empty() {
        return Err(RuinaError::Serialization(format!(
            "checkpoint does not match model: {diff}"
        )));
    }
    module.load_state_dict(state);
    Ok(())
}

pub fn save_state_dict(state: &StateDict, path: impl AsRef<Path>) -> Result<()> {
    let encoded = bincode::encode_to_vec(state, config::standard())
        .map_err(|e| RuinaError::Serialization(e.to_string()))?;
    fs::write(path, encoded)?;
    Ok(())
}

pub fn load_state_dict(path: impl AsRef<Path>) -> Result<StateDict> {
    let buffer = fs::read(path)?;
    let (state, _): (StateDict, _) = bincode::decode_from_slice(&buffer, config::standard())
        .map_err(|e| RuinaError::Serialization(e.to_string()))?;
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RawTensor;

    fn sample() -> StateDict {
        let w = RawTensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], &[2, 2]);
        let b = RawTensor::from_vec(vec![0.5], &[1]);
        state_dict_from(&[("weight", &w), ("bias", &b)])
    }

    #[test]
    fn test_save_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.bin");
        let state = sample();
        save_state_dict(&state, &path).unwrap();
        assert_eq!(load_state_dict(&path).unwrap(), state);
    }

    #[test]
    fn test_load_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.bin");
        fs::write(&path, [0xff, 0xff, 0xff]).unwrap();
        assert!(matches!(
            load_state_dict(&path),
            Err(RuinaError::Serialization(_))
        ));
    }

    #[test]
    fn test_diff_reports_every_kind() {
        let expected = sample();
        let mut loaded = sample();
        loaded.remove("bias");
        loaded.insert(
            "weight".into(),
            TensorData {
                data: vec![0.0; 3],
                shape: vec![3],
            },
        );
        loaded.insert(
            "extra".into(),
            TensorData {
                data: vec![],
                shape: vec![0],
            },
        );
        let diff = diff_state_dict(&expected, &loaded);
        assert_eq!(diff.missing_keys, vec!["bias".to_string()]);
        assert_eq!(diff.unexpected_keys, vec!["extra".to_string()]);
        assert_eq!(diff.shape_mismatches.len(), 1);
        assert!(!diff.is_empty());
    }

    #[test]
    fn test_prefix_helpers() {
        let mut state = StateDict::new();
        merge_prefixed(&mut state, "down0", sample());
        assert!(state.contains_key("down0.weight"));
        let sub = sub_state(&state, "down0");
        assert_eq!(sub, sample());
        assert!(sub_state(&state, "down").is_empty());
    }
}
