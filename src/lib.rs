//! Vision Transformer (ViT) image classifier built on burn.
//!
//! The image is cut into patches, every patch becomes a token, a learned class token is
//! prepended and the sequence goes through a stack of pre-norm transformer blocks. The pooled
//! sequence is classified by a LayerNorm + Linear head.
use anyhow::{Result, anyhow, bail};
use burn::{
    tensor::Tensor,
    module::{Ignored, Module, Param},
    nn::{Dropout, DropoutConfig, LayerNorm, LayerNormConfig, Linear, LinearConfig},
    prelude::Backend,
    tensor::Distribution,
};
use network::patch::PatchEmbedding;
use network::transformer::Transformer;
use tracing::debug;

pub mod config;
pub mod network;

pub use config::{Pool, ViTConfig, pair};

/// ViT is the Vision Transformer classifier.
///
/// Parameters are randomly initialized on construction. Positional encodings are sized for the
/// configured image, so the model only accepts images of that size.
#[derive(Debug, Module)]
pub struct ViT<B: Backend> {
    patch_embedding: PatchEmbedding<B>,
    pos_embedding: Param<Tensor<B, 3>>,
    cls_token: Param<Tensor<B, 3>>,
    dropout: Dropout,
    transformer: Transformer<B>,
    head_norm: LayerNorm<B>,
    head: Linear<B>,
    config: Ignored<ViTConfig>,
}

impl<B: Backend> ViT<B> {
    /// Create a new ViT.
    ///
    /// # Arguments
    /// * `config` - The model configuration. It is validated before anything is allocated.
    /// * `device` - The device to use.
    pub fn new(config: ViTConfig, device: &B::Device) -> Result<Self> {
        config.validate()?;

        let ViTConfig {
            patch_size,
            num_classes,
            dim,
            depth,
            heads,
            mlp_dim,
            channels,
            dim_head,
            dropout,
            emb_dropout,
            ..
        } = config;

        let num_patches = config.num_patches();

        debug!(
            num_patches,
            patch_dim = config.patch_dim(),
            inner_dim = config.inner_dim(),
            pool = %config.pool,
            "building vision transformer"
        );

        let pos_embedding = Tensor::random(
            [1, num_patches + 1, dim],
            Distribution::Normal(0., 1.),
            device,
        );
        let cls_token = Tensor::random([1, 1, dim], Distribution::Normal(0., 1.), device);

        Ok(Self {
            patch_embedding: PatchEmbedding::new(channels, patch_size, dim, device),
            pos_embedding: Param::from_tensor(pos_embedding),
            cls_token: Param::from_tensor(cls_token),
            dropout: DropoutConfig::new(emb_dropout).init(),
            transformer: Transformer::new(depth, dim, heads, dim_head, mlp_dim, dropout, device),
            head_norm: LayerNormConfig::new(dim).init(device),
            head: LinearConfig::new(dim, num_classes).init(device),
            config: Ignored(config),
        })
    }

    pub fn config(&self) -> &ViTConfig {
        &self.config
    }

    /// Number of patch tokens, the class token excluded.
    pub fn num_patches(&self) -> usize {
        self.config.num_patches()
    }

    /// Length of the sequence seen by the transformer.
    pub fn seq_len(&self) -> usize {
        self.config.seq_len()
    }

    /// Turn the images into the token sequence fed to the transformer.
    ///
    /// # Returns
    /// A tensor of shape [batch_size, num_patches + 1, dim] with the class token at position 0.
    fn embed(&self, images: Tensor<B, 4>) -> Result<Tensor<B, 3>> {
        let [batch, channels, height, width] = images.dims();
        let [image_height, image_width] = self.config.image_size;

        if batch == 0 {
            bail!("expect at least one image in the batch");
        }

        // The patch embedding repeats the channel check for callers that use it on its own.
        if channels != self.config.channels || height != image_height || width != image_width {
            return Err(anyhow!(
                "expect images of shape [_, {}, {image_height}, {image_width}], got [{batch}, {channels}, {height}, {width}]",
                self.config.channels
            ));
        }

        let patches = self.patch_embedding.forward(images)?;

        let cls_tokens = self.cls_token.val().repeat_dim(0, batch);
        let tokens = Tensor::cat(vec![cls_tokens, patches], 1) + self.pos_embedding.val();

        Ok(self.dropout.forward(tokens))
    }

    /// Reduce the token sequence to one vector per image.
    fn pool(&self, tokens: Tensor<B, 3>) -> Tensor<B, 2> {
        let [batch, _, dim] = tokens.dims();

        match self.config.pool {
            Pool::Mean => tokens.mean_dim(1).squeeze(1),
            Pool::Cls => tokens.slice([0..batch, 0..1, 0..dim]).squeeze(1),
        }
    }

    /// Compute the pooled representation of the images, before the classification head.
    ///
    /// # Arguments
    /// * `images` - Tensor of shape [batch_size, channels, height, width].
    ///
    /// # Returns
    /// A tensor of shape [batch_size, dim].
    pub fn features(&self, images: Tensor<B, 4>) -> Result<Tensor<B, 2>> {
        let tokens = self.embed(images)?;
        let tokens = self.transformer.forward(tokens);

        Ok(self.pool(tokens))
    }

    /// Forward pass of the ViT.
    ///
    /// # Arguments
    /// * `images` - Tensor of shape [batch_size, channels, height, width].
    ///
    /// # Returns
    /// The logits, a tensor of shape [batch_size, num_classes].
    pub fn forward(&self, images: Tensor<B, 4>) -> Result<Tensor<B, 2>> {
        let features = self.features(images)?;

        Ok(self.head.forward(self.head_norm.forward(features)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{
        backend::NdArray,
        tensor::{Distribution, ElementConversion},
    };

    fn small() -> ViTConfig {
        ViTConfig::new([32, 48], [8, 16], 5, 32, 2, 4, 64).with_dim_head(8)
    }

    fn images(shape: [usize; 4]) -> Tensor<NdArray, 4> {
        Tensor::random(shape, Distribution::Normal(0., 1.), &Default::default())
    }

    fn max_abs_diff<const D: usize>(lhs: Tensor<NdArray, D>, rhs: Tensor<NdArray, D>) -> f32 {
        (lhs - rhs).abs().max().into_scalar().elem()
    }

    #[test]
    fn expect_logits_for_every_image() {
        let device = Default::default();

        for pool in [Pool::Cls, Pool::Mean] {
            let vit = small().with_pool(pool).init::<NdArray>(&device).unwrap();

            for batch in [1, 3] {
                let logits = vit.forward(images([batch, 3, 32, 48])).unwrap();
                assert_eq!(logits.dims(), [batch, 5]);
            }
        }
    }

    #[test]
    fn expect_sequence_to_hold_one_token_per_patch_plus_cls() {
        let device = Default::default();
        let vit = ViT::<NdArray>::new(small(), &device).unwrap();

        assert_eq!(vit.config().image_size, [32, 48]);
        assert_eq!(vit.num_patches(), 4 * 3);
        assert_eq!(vit.seq_len(), 13);

        let tokens = vit.embed(images([2, 3, 32, 48])).unwrap();
        assert_eq!(tokens.dims(), [2, 13, 32]);
    }

    #[test]
    fn expect_cls_token_at_position_zero() {
        let device = Default::default();
        let vit = ViT::<NdArray>::new(small(), &device).unwrap();

        let tokens = vit.embed(images([2, 3, 32, 48])).unwrap();
        let first = tokens.slice([0..2, 0..1, 0..32]);

        // Without dropout position 0 is exactly cls + pos[0] for every image.
        let expected = (vit.cls_token.val() + vit.pos_embedding.val().slice([0..1, 0..1, 0..32]))
            .repeat_dim(0, 2);

        assert!(max_abs_diff(first, expected) < 1e-6);
    }

    #[test]
    fn expect_pool_modes_to_reduce_the_sequence() {
        let device = Default::default();
        let tokens = Tensor::<NdArray, 3>::from_data(
            [[[1., 2.], [3., 4.], [5., 6.]], [[0., 0.], [2., 2.], [4., 4.]]],
            &device,
        );

        let cls = ViT::<NdArray>::new(small(), &device).unwrap();
        let values: Vec<f32> = cls.pool(tokens.clone()).into_data().to_vec().unwrap();
        assert_eq!(values, [1., 2., 0., 0.]);

        let mean = ViT::<NdArray>::new(small().with_pool(Pool::Mean), &device).unwrap();
        let values: Vec<f32> = mean.pool(tokens).into_data().to_vec().unwrap();
        assert_eq!(values, [3., 4., 2., 2.]);
    }

    #[test]
    fn expect_invalid_configs_to_fail_construction() {
        let device = Default::default();

        let indivisible = ViTConfig::new([30, 48], [8, 16], 5, 32, 2, 4, 64);
        assert!(ViT::<NdArray>::new(indivisible, &device).is_err());

        let indivisible = ViTConfig::new([32, 40], [8, 16], 5, 32, 2, 4, 64);
        assert!(indivisible.init::<NdArray>(&device).is_err());

        assert!("max".parse::<Pool>().is_err());
        for pool in ["cls", "mean"] {
            let config = small().with_pool(pool.parse().unwrap());
            assert!(config.init::<NdArray>(&device).is_ok());
        }
    }

    #[test]
    fn expect_mismatched_images_to_be_rejected() {
        let device = Default::default();
        let vit = ViT::<NdArray>::new(small(), &device).unwrap();

        assert!(vit.forward(images([1, 3, 48, 32])).is_err());
        assert!(vit.forward(images([1, 1, 32, 48])).is_err());
        assert!(vit.forward(images([1, 3, 64, 96])).is_err());
        assert!(vit.forward(images([0, 3, 32, 48])).is_err());
    }

    #[test]
    fn expect_dropout_to_be_inactive_at_inference() {
        let device = Default::default();
        let vit = small()
            .with_dropout(0.5)
            .with_emb_dropout(0.5)
            .init::<NdArray>(&device)
            .unwrap();

        let input = images([2, 3, 32, 48]);
        let first = vit.forward(input.clone()).unwrap();
        let second = vit.forward(input).unwrap();

        assert!(max_abs_diff(first, second) < 1e-6);
    }

    #[test]
    fn expect_images_to_be_classified_independently() {
        let device = Default::default();
        let vit = small().with_pool(Pool::Mean).init::<NdArray>(&device).unwrap();

        let input = images([3, 3, 32, 48]);
        let batched = vit.forward(input.clone()).unwrap();
        let single = vit.forward(input.slice([1..2, 0..3, 0..32, 0..48])).unwrap();

        assert!(max_abs_diff(batched.slice([1..2, 0..5]), single) < 1e-4);
    }

    #[test]
    fn expect_single_head_model_without_out_projection() {
        let device = Default::default();
        let config = ViTConfig::new(pair(16), pair(4), 3, 16, 1, 1, 32).with_dim_head(16);
        let vit = ViT::<NdArray>::new(config, &device).unwrap();

        assert!(
            vit.transformer
                .layers
                .iter()
                .all(|layer| !layer.attention.inner().projects_out())
        );
        assert_eq!(vit.forward(images([2, 3, 16, 16])).unwrap().dims(), [2, 3]);
    }

    #[test]
    #[ignore = "allocates the full-size model, run with --ignored"]
    fn expect_reference_model_to_output_one_logit_per_class() {
        let device = Default::default();
        let config = ViTConfig::new(pair(256), pair(32), 10, 1024, 6, 16, 2048)
            .with_pool(Pool::Cls)
            .with_channels(3)
            .with_dim_head(64)
            .with_dropout(0.1)
            .with_emb_dropout(0.1);
        let vit = config.init::<NdArray>(&device).unwrap();

        assert_eq!(vit.num_patches(), 64);

        let logits = vit.forward(images([16, 3, 256, 256])).unwrap();
        assert_eq!(logits.dims(), [16, 10]);
    }
}
