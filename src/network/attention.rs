use super::Sublayer;
use burn::{
    tensor::Tensor,
    module::Module,
    nn::{Dropout, DropoutConfig, Linear, LinearConfig},
    prelude::Backend,
    tensor::activation::softmax,
};

/// Output projection applied after the heads are concatenated.
#[derive(Debug, Module)]
pub struct OutProjection<B: Backend> {
    pub(crate) linear: Linear<B>,
    dropout: Dropout,
}

impl<B: Backend> OutProjection<B> {
    fn forward(&self, input: Tensor<B, 3>) -> Tensor<B, 3> {
        self.dropout.forward(self.linear.forward(input))
    }
}

/// Multi-head scaled dot-product self-attention.
///
/// Queries, keys and values come out of one bias-free projection of width `3 * heads * dim_head`.
/// When a single head already spans the model width the concatenated heads are returned as is,
/// otherwise they go through [`OutProjection`].
#[derive(Debug, Module)]
pub struct Attention<B: Backend> {
    pub(crate) to_qkv: Linear<B>,
    pub(crate) to_out: Option<OutProjection<B>>,
    heads: usize,
    dim_head: usize,
    scale: f32,
}

impl<B: Backend> Attention<B> {
    /// Create a new Attention module.
    ///
    /// # Arguments
    /// * `dim` - Width of the input tokens.
    /// * `heads` - Number of heads.
    /// * `dim_head` - Width of every head.
    /// * `dropout` - Dropout probability of the output projection.
    /// * `device` - The device to use.
    pub fn new(
        dim: usize,
        heads: usize,
        dim_head: usize,
        dropout: f64,
        device: &B::Device,
    ) -> Self {
        let inner_dim = heads * dim_head;
        let project_out = !(heads == 1 && dim_head == dim);

        let to_out = project_out.then(|| OutProjection {
            linear: LinearConfig::new(inner_dim, dim).init(device),
            dropout: DropoutConfig::new(dropout).init(),
        });

        Self {
            to_qkv: LinearConfig::new(dim, inner_dim * 3)
                .with_bias(false)
                .init(device),
            to_out,
            heads,
            dim_head,
            scale: (dim_head as f32).powf(-0.5),
        }
    }

    pub fn heads(&self) -> usize {
        self.heads
    }

    pub fn dim_head(&self) -> usize {
        self.dim_head
    }

    /// Whether the concatenated heads go through an output projection.
    pub fn projects_out(&self) -> bool {
        self.to_out.is_some()
    }

    /// Project the tokens and split them into query, key and value heads.
    ///
    /// Each returned tensor has the shape [batch_size, heads, seq_len, dim_head].
    fn qkv(&self, input: Tensor<B, 3>) -> [Tensor<B, 4>; 3] {
        let [batch, seq_len, _] = input.dims();
        let inner_dim = self.heads * self.dim_head;

        let qkv = self.to_qkv.forward(input);

        let split_heads = |idx: usize| {
            qkv.clone()
                .slice([0..batch, 0..seq_len, idx * inner_dim..(idx + 1) * inner_dim])
                .reshape([batch, seq_len, self.heads, self.dim_head])
                .swap_dims(1, 2)
        };

        [split_heads(0), split_heads(1), split_heads(2)]
    }

    fn weights(&self, query: Tensor<B, 4>, key: Tensor<B, 4>) -> Tensor<B, 4> {
        let scores = query.matmul(key.swap_dims(2, 3)).mul_scalar(self.scale);

        softmax(scores, 3)
    }

    /// Compute the attention distribution of every query over every key.
    ///
    /// # Arguments
    /// * `input` - Tensor of shape [batch_size, seq_len, dim].
    ///
    /// # Returns
    /// A tensor of shape [batch_size, heads, seq_len, seq_len] whose last axis sums to 1.
    pub fn attention_weights(&self, input: Tensor<B, 3>) -> Tensor<B, 4> {
        let [query, key, _] = self.qkv(input);

        self.weights(query, key)
    }
}

impl<B: Backend> Sublayer<B> for Attention<B> {
    fn forward(&self, input: Tensor<B, 3>) -> Tensor<B, 3> {
        let [batch, seq_len, _] = input.dims();
        let [query, key, value] = self.qkv(input);

        let weights = self.weights(query, key);

        // [batch, heads, seq_len, dim_head] -> [batch, seq_len, heads * dim_head]
        let out = weights
            .matmul(value)
            .swap_dims(1, 2)
            .reshape([batch, seq_len, self.heads * self.dim_head]);

        match self.to_out {
            Some(ref to_out) => to_out.forward(out),
            None => out,
        }
    }
}
