use super::sequential_builder::SequentialBuilder;
use crate::io::{StateDict, merge_prefixed, sub_state};
use crate::nn::Module;
use crate::tensor::Tensor;

pub(crate) struct LayerEntry {
    pub(crate) name: Option<String>,
    pub(crate) layer: Box<dyn Module>,
}

impl LayerEntry {
    /// State-dict prefix: the layer's name, or its index if unnamed.
    fn key(&self, index: usize) -> String {
        self.name.clone().unwrap_or_else(|| index.to_string())
    }
}

/// Layers applied in order. Named layers keep their name in the state dict.
pub struct Sequential {
    pub(crate) layers: Vec<LayerEntry>,
}

impl Module for Sequential {
    fn forward(&self, x: &Tensor) -> Tensor {
        self.layers
            .iter()
            .fold(x.clone(), |current, entry| entry.layer.forward(&current))
    }

    fn parameters(&self) -> Vec<Tensor> {
        self.layers
            .iter()
            .flat_map(|entry| entry.layer.parameters())
            .collect()
    }

    fn state_dict(&self) -> StateDict {
        let mut state = StateDict::new();
        for (i, entry) in self.layers.iter().enumerate() {
            merge_prefixed(&mut state, &entry.key(i), entry.layer.state_dict());
        }
        state
    }

    fn load_state_dict(&mut self, state: &StateDict) {
        for (i, entry) in self.layers.iter_mut().enumerate() {
            let sub = sub_state(state, &entry.key(i));
            if !sub.is_empty() {
                entry.layer.load_state_dict(&sub);
            }
        }
    }

    fn train(&mut self, mode: bool) {
        for entry in &mut self.layers {
            entry.layer.train(mode);
        }
    }
}

impl Sequential {
    pub fn new(layers: Vec<Box<dyn Module>>) -> Self {
        Sequential {
            layers: layers
                .into_iter()
                .map(|layer| LayerEntry { name: None, layer })
                .collect(),
        }
    }

    pub fn builder() -> SequentialBuilder {
        SequentialBuilder::new()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layer_names(&self) -> Vec<Option<&str>> {
        self.layers.iter().map(|e| e.name.as_deref()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::layers::{Conv2d, LeakyReLU};
    use crate::RawTensor;
    use crate::tensor::TensorOps;

    #[test]
    fn test_state_dict_uses_names_and_indices() {
        let model = Sequential::builder()
            .add_named("conv", Box::new(Conv2d::new(3, 4, 4, 2, 1, false)))
            .add_unnamed(Box::new(LeakyReLU::new(0.3)))
            .add_unnamed(Box::new(Conv2d::new(4, 1, 4, 2, 1, true)))
            .build();
        let keys: Vec<String> = model.state_dict().into_keys().collect();
        assert_eq!(keys, vec!["2.bias", "2.weight", "conv.weight"]);
    }

    #[test]
    fn test_forward_chains_layers() {
        let model = Sequential::new(vec![
            Box::new(Conv2d::new(3, 4, 4, 2, 1, false)),
            Box::new(Conv2d::new(4, 2, 4, 2, 1, false)),
        ]);
        let y = model.forward(&RawTensor::randn(&[1, 3, 8, 8]));
        assert_eq!(y.shape(), vec![1, 2, 2, 2]);
        assert_eq!(model.parameters().len(), 2);
    }

    #[test]
    fn test_load_state_dict_round_trip() {
        let a = Sequential::new(vec![Box::new(Conv2d::new(1, 2, 4, 2, 1, true))]);
        let mut b = Sequential::new(vec![Box::new(Conv2d::new(1, 2, 4, 2, 1, true))]);
        b.load_state_dict(&a.state_dict());
        assert_eq!(a.state_dict(), b.state_dict());
    }
}
