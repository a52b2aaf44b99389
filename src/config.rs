use anyhow::{Result, anyhow, bail};
use burn::config::Config;
use burn::prelude::Backend;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ViT;

/// Build a `[height, width]` pair from a single side length.
pub const fn pair(size: usize) -> [usize; 2] {
    [size, size]
}

/// Pool selects how the token sequence is reduced to one vector before the head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pool {
    /// Keep the output of the class token (position 0).
    #[default]
    Cls,
    /// Average every token of the sequence.
    Mean,
}

impl FromStr for Pool {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "cls" => Ok(Pool::Cls),
            "mean" => Ok(Pool::Mean),
            other => Err(anyhow!(
                "pool type must be either cls (cls token) or mean (mean pooling), got {other}"
            )),
        }
    }
}

impl fmt::Display for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pool::Cls => write!(f, "cls"),
            Pool::Mean => write!(f, "mean"),
        }
    }
}

/// Configuration of the Vision Transformer.
///
/// Sizes are `[height, width]` pairs. Use [`pair`] for square images or patches.
#[derive(Config, Debug)]
pub struct ViTConfig {
    /// Input image size as `[height, width]`.
    pub image_size: [usize; 2],
    /// Patch size as `[height, width]`.
    pub patch_size: [usize; 2],
    /// Number of output logits.
    pub num_classes: usize,
    /// Width of every token in the transformer.
    pub dim: usize,
    /// Number of transformer blocks.
    pub depth: usize,
    /// Number of attention heads.
    pub heads: usize,
    /// Hidden width of the feed-forward blocks.
    pub mlp_dim: usize,
    #[config(default = "Pool::Cls")]
    pub pool: Pool,
    #[config(default = 3)]
    pub channels: usize,
    #[config(default = 64)]
    pub dim_head: usize,
    #[config(default = 0.0)]
    pub dropout: f64,
    #[config(default = 0.0)]
    pub emb_dropout: f64,
}

impl ViTConfig {
    /// Check the preconditions of the model before any parameter gets allocated.
    pub fn validate(&self) -> Result<()> {
        let [image_height, image_width] = self.image_size;
        let [patch_height, patch_width] = self.patch_size;

        if patch_height == 0 || patch_width == 0 {
            bail!("patch size must be non zero, got {:?}", self.patch_size);
        }

        if image_height % patch_height != 0 || image_width % patch_width != 0 {
            return Err(anyhow!(
                "image dimensions {:?} must be divisible by the patch size {:?}",
                self.image_size,
                self.patch_size
            ));
        }

        for (name, value) in [
            ("image height", image_height),
            ("image width", image_width),
            ("num_classes", self.num_classes),
            ("dim", self.dim),
            ("depth", self.depth),
            ("heads", self.heads),
            ("mlp_dim", self.mlp_dim),
            ("channels", self.channels),
            ("dim_head", self.dim_head),
        ] {
            if value == 0 {
                bail!("{name} must be greater than 0");
            }
        }

        for (name, rate) in [("dropout", self.dropout), ("emb_dropout", self.emb_dropout)] {
            if !(0.0..1.0).contains(&rate) {
                bail!("{name} must be in [0, 1), got {rate}");
            }
        }

        Ok(())
    }

    /// Number of patches the image is split into.
    pub fn num_patches(&self) -> usize {
        let [image_height, image_width] = self.image_size;
        let [patch_height, patch_width] = self.patch_size;

        (image_height / patch_height) * (image_width / patch_width)
    }

    /// Length of the token sequence once the class token is prepended.
    pub fn seq_len(&self) -> usize {
        self.num_patches() + 1
    }

    /// Length of a flattened patch.
    pub fn patch_dim(&self) -> usize {
        let [patch_height, patch_width] = self.patch_size;

        self.channels * patch_height * patch_width
    }

    /// Width of the concatenated attention heads.
    pub fn inner_dim(&self) -> usize {
        self.heads * self.dim_head
    }

    /// Validate the configuration and allocate the model on the given device.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<ViT<B>> {
        ViT::new(self.clone(), device)
    }
}
