use anyhow::{Result, anyhow};
use burn::{
    tensor::Tensor,
    module::Module,
    nn::{Linear, LinearConfig},
    prelude::Backend,
};

/// PatchEmbedding cuts an image into non-overlapping patches and projects every patch to `dim`.
///
/// A patch is flattened row by row, and for each pixel its channels are laid out contiguously,
/// i.e. `b c (h p1) (w p2) -> b (h w) (p1 p2 c)`.
#[derive(Debug, Module)]
pub struct PatchEmbedding<B: Backend> {
    pub(crate) projection: Linear<B>,
    channels: usize,
    patch_height: usize,
    patch_width: usize,
}

impl<B: Backend> PatchEmbedding<B> {
    /// Create a new PatchEmbedding.
    ///
    /// # Arguments
    /// * `channels` - Number of channels of the input image.
    /// * `patch_size` - Size of a patch as [height, width].
    /// * `dim` - Width of the projected tokens.
    /// * `device` - The device to use.
    pub fn new(channels: usize, patch_size: [usize; 2], dim: usize, device: &B::Device) -> Self {
        let [patch_height, patch_width] = patch_size;
        let patch_dim = channels * patch_height * patch_width;

        Self {
            projection: LinearConfig::new(patch_dim, dim).init(device),
            channels,
            patch_height,
            patch_width,
        }
    }

    /// Split the image into flattened patches without projecting them.
    ///
    /// # Arguments
    /// * `input` - Tensor of shape [batch_size, channels, height, width].
    ///
    /// # Returns
    /// A tensor of shape [batch_size, num_patches, channels * patch_height * patch_width].
    pub fn patchify(&self, input: Tensor<B, 4>) -> Result<Tensor<B, 3>> {
        let [batch, channels, height, width] = input.dims();
        let (p1, p2) = (self.patch_height, self.patch_width);

        if channels != self.channels {
            return Err(anyhow!(
                "expected an image with {} channels, got {channels}",
                self.channels
            ));
        }

        if p1 == 0 || p2 == 0 || height % p1 != 0 || width % p2 != 0 {
            return Err(anyhow!(
                "image dimensions {height}x{width} must be divisible by the patch size {p1}x{p2}"
            ));
        }

        let (h, w) = (height / p1, width / p2);

        // [b, c, h, p1, w, p2] -> [b, h, w, p1, p2, c]
        let patches = input
            .reshape([batch, channels, h, p1, w, p2])
            .permute([0, 2, 4, 3, 5, 1])
            .reshape([batch, h * w, p1 * p2 * channels]);

        Ok(patches)
    }

    /// Forward pass of the PatchEmbedding.
    ///
    /// # Returns
    /// A tensor of shape [batch_size, num_patches, dim].
    pub fn forward(&self, input: Tensor<B, 4>) -> Result<Tensor<B, 3>> {
        let patches = self.patchify(input)?;

        Ok(self.projection.forward(patches))
    }
}
