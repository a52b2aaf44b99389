use std::time::Instant;

use anyhow::Result;
use burn::tensor::Tensor;
use burn::backend::NdArray;
use burn::module::Module;
use burn::tensor::Distribution;
use tracing::info;
use tracing_subscriber::EnvFilter;
use vit_burn::{Pool, ViTConfig, pair};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("vit_burn=info".parse()?)
                .add_directive("sample=info".parse()?),
        )
        .init();

    let t = Instant::now();
    let device = Default::default();

    let vit = ViTConfig::new(pair(256), pair(32), 10, 1024, 6, 16, 2048)
        .with_pool(Pool::Cls)
        .with_channels(3)
        .with_dim_head(64)
        .with_dropout(0.1)
        .with_emb_dropout(0.1)
        .init::<NdArray>(&device)?;

    info!(
        params = vit.num_params(),
        seq_len = vit.seq_len(),
        "model initialized at {:?}",
        t.elapsed()
    );

    let images = Tensor::<NdArray, 4>::random([16, 3, 256, 256], Distribution::Normal(0., 1.), &device);
    let preds = vit.forward(images)?;

    info!("forward pass done at {:?}", t.elapsed());

    println!("{:?}", preds.dims());

    Ok(())
}
