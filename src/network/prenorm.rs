use super::Sublayer;
use burn::{
    tensor::Tensor,
    module::Module,
    nn::{LayerNorm, LayerNormConfig},
    prelude::Backend,
};

/// PreNorm layer-normalizes the tokens before handing them to the wrapped sublayer.
#[derive(Debug, Module)]
pub struct PreNorm<B: Backend, M> {
    pub(crate) norm: LayerNorm<B>,
    pub(crate) inner: M,
}

impl<B: Backend, M: Sublayer<B>> PreNorm<B, M> {
    /// # Arguments
    /// * `dim` - Size of the last axis that gets normalized.
    /// * `inner` - The wrapped sublayer.
    /// * `device` - The device to use.
    pub fn new(dim: usize, inner: M, device: &B::Device) -> Self {
        Self {
            norm: LayerNormConfig::new(dim).init(device),
            inner,
        }
    }

    pub fn inner(&self) -> &M {
        &self.inner
    }

    pub fn forward(&self, input: Tensor<B, 3>) -> Tensor<B, 3> {
        self.inner.forward(self.norm.forward(input))
    }
}
