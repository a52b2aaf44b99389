use super::Sublayer;
use burn::{
    tensor::Tensor,
    module::Module,
    nn::{Dropout, DropoutConfig, Gelu, Linear, LinearConfig},
    prelude::Backend,
};

/// FeedForward is the MLP part of a transformer block.
///
/// Linear (dim -> hidden_dim), GELU, Dropout, Linear (hidden_dim -> dim), Dropout.
#[derive(Debug, Module)]
pub struct FeedForward<B: Backend> {
    pub(crate) linear0: Linear<B>,
    gelu: Gelu,
    dropout0: Dropout,
    pub(crate) linear1: Linear<B>,
    dropout1: Dropout,
}

impl<B: Backend> FeedForward<B> {
    /// Create a new FeedForward block.
    ///
    /// # Arguments
    /// * `dim` - Width of the tokens.
    /// * `hidden_dim` - Width of the hidden expansion.
    /// * `dropout` - Probability used by both dropout layers.
    /// * `device` - The device to use.
    pub fn new(dim: usize, hidden_dim: usize, dropout: f64, device: &B::Device) -> Self {
        Self {
            linear0: LinearConfig::new(dim, hidden_dim).init(device),
            gelu: Gelu::new(),
            dropout0: DropoutConfig::new(dropout).init(),
            linear1: LinearConfig::new(hidden_dim, dim).init(device),
            dropout1: DropoutConfig::new(dropout).init(),
        }
    }
}

impl<B: Backend> Sublayer<B> for FeedForward<B> {
    fn forward(&self, input: Tensor<B, 3>) -> Tensor<B, 3> {
        let x = self.linear0.forward(input);
        let x = self.gelu.forward(x);
        let x = self.dropout0.forward(x);
        let x = self.linear1.forward(x);

        self.dropout1.forward(x)
    }
}
