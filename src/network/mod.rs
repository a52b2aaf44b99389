use burn::tensor::Tensor;
use burn::module::Module;
use burn::prelude::Backend;

pub mod attention;
pub mod feed_forward;
pub mod patch;
pub mod prenorm;
pub mod transformer;

/// Sublayer is a transform over a token sequence that keeps its shape.
///
/// Every module that can sit behind a [`prenorm::PreNorm`] implements it.
pub trait Sublayer<B: Backend>: Module<B> {
    /// # Arguments
    /// * `input` - Tensor of shape [batch_size, seq_len, dim].
    fn forward(&self, input: Tensor<B, 3>) -> Tensor<B, 3>;
}
