//! Trains an LSTM or VRNN domain adaptation model on synthetic
//! source/target sequences.
//!
//! # Usage
//!
//! ```bash
//! cargo run --release -p vrada-learn --bin train-vrada -- \
//!   --model vrnn --steps 2000 --batch-size 64 --lr 1e-3 \
//!   --summaries runs/vrnn.jsonl --save runs/vrnn.safetensors
//! ```
//!
//! `--config` loads a JSON `ModelConfig` and `--train-config` a JSON
//! `TrainConfig`; the other flags override their fields. Log verbosity
//! follows `RUST_LOG`.

use std::path::{Path, PathBuf};
use std::time::Instant;

use candle_core::Device;
use candle_nn::VarMap;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vrada_core::{ModelConfig, ModelKind, VradaError};
use vrada_learn::summary_writer::SummaryWriter;
use vrada_learn::synthetic::{generate_domain_pair, SyntheticConfig};
use vrada_learn::trainer::{train, TrainConfig};
use vrada_nn::Model;

#[derive(Parser, Debug)]
#[command(name = "train-vrada", version, about = "Train a VRADA model on synthetic domains")]
struct Args {
    /// Recurrent front end: lstm or vrnn.
    #[arg(long, value_name = "KIND")]
    model: Option<ModelKind>,

    #[arg(long)]
    steps: Option<usize>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    lr: Option<f64>,

    /// Train on source only, without the domain classifier loss.
    #[arg(long)]
    no_adaptation: bool,

    /// Append summary records to this JSON-lines file.
    #[arg(long, value_name = "PATH")]
    summaries: Option<PathBuf>,

    /// JSON model config.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// JSON training config; --steps, --batch-size and --lr override it
    /// when given.
    #[arg(long, value_name = "PATH")]
    train_config: Option<PathBuf>,

    /// Write trained weights as safetensors.
    #[arg(long, value_name = "PATH")]
    save: Option<PathBuf>,

    #[arg(long, default_value_t = 256)]
    samples: usize,

    #[arg(long, default_value_t = 20)]
    seq_len: usize,

    #[arg(long, default_value_t = 42)]
    seed: u64,
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "train_vrada=info,vrada_learn=info,vrada_nn=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    if let Err(e) = run(&args) {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), VradaError> {
    let mut model_config = match &args.config {
        Some(path) => ModelConfig::load(path)?,
        None => ModelConfig::default(),
    };
    if let Some(kind) = args.model {
        model_config.kind = kind;
    }
    if args.no_adaptation {
        model_config.adaptation = false;
    }

    let data_config = SyntheticConfig {
        num_samples: args.samples,
        seq_len: args.seq_len,
        num_features: model_config.num_features,
        num_classes: model_config.num_classes,
        seed: args.seed,
        ..SyntheticConfig::default()
    };
    let (source, target) = generate_domain_pair(&data_config)?;
    tracing::info!(
        samples = source.len(),
        seq_len = data_config.seq_len,
        features = data_config.num_features,
        classes = data_config.num_classes,
        "generated synthetic domains"
    );

    let device = Device::Cpu;
    let var_map = VarMap::new();
    let model = Model::new_trainable(&var_map, &model_config, &device)?;

    let mut train_config = match &args.train_config {
        Some(path) => TrainConfig::load(path)?,
        None => TrainConfig {
            seed: args.seed,
            ..TrainConfig::default()
        },
    };
    if let Some(steps) = args.steps {
        train_config.steps = steps;
    }
    if let Some(batch_size) = args.batch_size {
        train_config.batch_size = batch_size;
    }
    if let Some(lr) = args.lr {
        train_config.learning_rate = lr;
    }

    let mut writer = args
        .summaries
        .as_deref()
        .map(SummaryWriter::create)
        .transpose()?;

    let start = Instant::now();
    let result = train(
        &model,
        &var_map,
        &source,
        &target,
        &train_config,
        &device,
        writer.as_mut(),
    )?;
    tracing::info!(
        model = model_config.kind.label(),
        final_loss = result.final_loss,
        elapsed_secs = start.elapsed().as_secs_f32(),
        "done"
    );
    if let Some(last) = result.evaluations.last() {
        tracing::info!(
            source_accuracy = last.source_accuracy,
            target_accuracy = ?last.target_accuracy,
            "final accuracy"
        );
    }

    if let Some(w) = &writer {
        tracing::info!(path = %w.path().display(), records = w.written(), "wrote summaries");
    }

    if let Some(path) = &args.save {
        save_weights(&var_map, path)?;
    }
    Ok(())
}

fn save_weights(var_map: &VarMap, path: &Path) -> Result<(), VradaError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| VradaError::StorageError {
            message: format!("failed to create {}: {e}", parent.display()),
        })?;
    }
    var_map.save(path).map_err(|e| VradaError::StorageError {
        message: format!("failed to save weights to {}: {e}", path.display()),
    })?;
    tracing::info!(path = %path.display(), "saved weights");
    Ok(())
}
