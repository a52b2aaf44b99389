use super::attention::Attention;
use super::feed_forward::FeedForward;
use super::prenorm::PreNorm;
use burn::{tensor::Tensor, module::Module, prelude::Backend};

/// One layer of the stack: normalized attention followed by a normalized feed-forward.
#[derive(Debug, Module)]
pub struct TransformerBlock<B: Backend> {
    pub(crate) attention: PreNorm<B, Attention<B>>,
    pub(crate) feed_forward: PreNorm<B, FeedForward<B>>,
}

impl<B: Backend> TransformerBlock<B> {
    pub fn new(
        dim: usize,
        heads: usize,
        dim_head: usize,
        mlp_dim: usize,
        dropout: f64,
        device: &B::Device,
    ) -> Self {
        Self {
            attention: PreNorm::new(
                dim,
                Attention::new(dim, heads, dim_head, dropout, device),
                device,
            ),
            feed_forward: PreNorm::new(
                dim,
                FeedForward::new(dim, mlp_dim, dropout, device),
                device,
            ),
        }
    }

    /// Apply both sublayers, each one around a residual connection.
    pub fn forward(&self, input: Tensor<B, 3>) -> Tensor<B, 3> {
        let x = self.attention.forward(input.clone()) + input;

        self.feed_forward.forward(x.clone()) + x
    }
}

/// Transformer is a fixed-depth stack of [`TransformerBlock`].
#[derive(Debug, Module)]
pub struct Transformer<B: Backend> {
    pub(crate) layers: Vec<TransformerBlock<B>>,
}

impl<B: Backend> Transformer<B> {
    /// Create a new Transformer.
    ///
    /// # Arguments
    /// * `depth` - Number of blocks.
    /// * `dim` - Width of the tokens.
    /// * `heads` - Number of attention heads.
    /// * `dim_head` - Width of every attention head.
    /// * `mlp_dim` - Hidden width of the feed-forward blocks.
    /// * `dropout` - Dropout probability inside the blocks.
    /// * `device` - The device to use.
    pub fn new(
        depth: usize,
        dim: usize,
        heads: usize,
        dim_head: usize,
        mlp_dim: usize,
        dropout: f64,
        device: &B::Device,
    ) -> Self {
        let layers = (0..depth)
            .map(|_| TransformerBlock::new(dim, heads, dim_head, mlp_dim, dropout, device))
            .collect();

        Self { layers }
    }

    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    /// # Arguments
    /// * `input` - Tensor of shape [batch_size, seq_len, dim].
    pub fn forward(&self, input: Tensor<B, 3>) -> Tensor<B, 3> {
        self.layers
            .iter()
            .fold(input, |x, layer| layer.forward(x))
    }
}
