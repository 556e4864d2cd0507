use burn::tensor::{backend::Backend, ElementConversion, Tensor};

/// Named loss terms for one step and their weighted sum.
///
/// Each term appears twice, raw (`loss/<term>`) and weighted
/// (`loss/weighted_<term>`); `total` is the sum of the weighted entries.
#[derive(Debug, Clone)]
pub struct LossBundle<B: Backend> {
    pub total: Tensor<B, 1>,
    pub terms: Vec<(String, Tensor<B, 1>)>,
}

impl<B: Backend> LossBundle<B> {
    pub const IMAGE_SIMILARITY: &'static str = "loss/image_similarity";
    pub const WEIGHTED_IMAGE_SIMILARITY: &'static str = "loss/weighted_image_similarity";
    pub const REGULARIZATION: &'static str = "loss/regularization";
    pub const WEIGHTED_REGULARIZATION: &'static str = "loss/weighted_regularization";
    pub const LABEL: &'static str = "loss/label";
    pub const WEIGHTED_LABEL: &'static str = "loss/weighted_label";

    /// An empty bundle; the total stays zero until a term is pushed.
    pub fn new(device: &B::Device) -> Self {
        Self {
            total: Tensor::zeros([1], device),
            terms: Vec::new(),
        }
    }

    /// Record a raw term and its weighted value, adding the latter to the total.
    pub fn push(&mut self, name: &str, weighted_name: &str, value: Tensor<B, 1>, weight: f64) {
        let weighted = value.clone().mul_scalar(weight);
        self.total = self.total.clone() + weighted.clone();
        self.terms.push((name.to_string(), value));
        self.terms.push((weighted_name.to_string(), weighted));
    }

    pub fn get(&self, name: &str) -> Option<&Tensor<B, 1>> {
        self.terms.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Host-side values of every term, in insertion order.
    pub fn to_scalars(&self) -> Vec<(String, f64)> {
        self.terms
            .iter()
            .map(|(name, value)| (name.clone(), value.clone().into_scalar().elem::<f64>()))
            .collect()
    }
}
