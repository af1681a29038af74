use super::sequential::LayerEntry;
use crate::nn::{Module, Sequential};

/// Chained construction of a [`Sequential`] block.
///
/// Named layers keep their name as the state dict prefix; the rest are keyed
/// by position.
///
/// ```
/// use ruina::nn::{Conv2d, LeakyReLU, Sequential};
///
/// let block = Sequential::builder()
///     .add_named("conv", Box::new(Conv2d::new(3, 64, 4, 2, 1, false)))
///     .add_unnamed(Box::new(LeakyReLU::new(0.3)))
///     .build();
/// assert_eq!(block.len(), 2);
/// ```
#[derive(Default)]
pub struct SequentialBuilder {
    entries: Vec<LayerEntry>,
}

impl SequentialBuilder {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    #[must_use]
    pub fn add_unnamed(mut self, layer: Box<dyn Module>) -> Self {
        self.entries.push(LayerEntry { name: None, layer });
        self
    }

    /// An empty `name` counts as unnamed.
    #[must_use]
    pub fn add_named(mut self, name: impl Into<String>, layer: Box<dyn Module>) -> Self {
        let name = Some(name.into()).filter(|n| !n.is_empty());
        self.entries.push(LayerEntry { name, layer });
        self
    }

    /// Append `layer` unnamed if present, so optional norm and dropout
    /// stages keep the chain going.
    #[must_use]
    pub fn add_optional(self, layer: Option<Box<dyn Module>>) -> Self {
        match layer {
            Some(layer) => self.add_unnamed(layer),
            None => self,
        }
    }

    #[must_use]
    pub fn build(self) -> Sequential {
        Sequential {
            layers: self.entries,
        }
    }
}
