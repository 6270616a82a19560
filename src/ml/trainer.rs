// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Full train + validation loop using Burn's DataLoader and Adam.
//
// Backend split:
//   - Training uses Autodiff<Wgpu> for gradients
//   - model.valid() returns the model on the inner Wgpu backend,
//     with dropout disabled, for deterministic validation
//
// Per epoch: average train loss, validation loss, mean IoU and
// mean Dice on the validation patches, a CSV metrics row, and a
// checkpoint.
//
// Reference: Kingma & Ba (2015) Adam

use anyhow::Result;
use burn::{
    data::dataloader::DataLoaderBuilder,
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
};

use crate::application::train_use_case::TrainConfig;
use crate::data::{batcher::PatchBatcher, dataset::PatchDataset};
use crate::infra::checkpoint::CheckpointManager;
use crate::infra::encoder_weights::restore_encoder;
use crate::infra::metrics::{EpochMetrics, MetricsLogger};
use crate::ml::backbone::BackboneName;
use crate::ml::losses::{hard_labels, mean_dice, mean_iou};
use crate::ml::model::{AttentionResUnet, AttentionResUnetConfig, FinalActivation};

type MyBackend = burn::backend::Autodiff<burn::backend::Wgpu>;
type MyInnerBackend = burn::backend::Wgpu;

/// Resolve a TrainConfig into a ready model: parse the backbone
/// and activation names, build the module, then apply the
/// weight-loading policy (encoder record, full-model record,
/// encoder freeze — in that order, so freezing covers restored
/// parameters too).
pub fn build_model<B: Backend>(
    cfg: &TrainConfig,
    device: &B::Device,
) -> Result<AttentionResUnet<B>> {
    let model_cfg = AttentionResUnetConfig::new(cfg.in_channels, cfg.classes)
        .with_backbone(BackboneName::parse(&cfg.backbone)?)
        .with_activation(FinalActivation::parse(&cfg.activation)?)
        .with_decoder_filters(cfg.decoder_filters.clone())
        .with_decoder_use_batchnorm(cfg.decoder_batchnorm)
        .with_dropout(cfg.dropout);

    let mut model = model_cfg.init(device);

    if let Some(path) = &cfg.encoder_weights {
        model = restore_encoder(model, path, device)?;
        tracing::info!("Restored pretrained encoder weights from '{}'", path);
    }

    if let Some(path) = &cfg.weights {
        model = model.load_weights(path, device)?;
        tracing::info!("Restored full model weights from '{}'", path);
    }

    if cfg.encoder_freeze {
        model.encoder = model.encoder.no_grad();
        tracing::info!("Encoder frozen — decoder-only fine-tuning");
    }

    Ok(model)
}

pub fn run_training(
    cfg: &TrainConfig,
    train_dataset: PatchDataset,
    val_dataset: PatchDataset,
    ckpt_manager: CheckpointManager,
) -> Result<()> {
    let device = burn::backend::wgpu::WgpuDevice::default();
    tracing::info!("Using WGPU device: {:?}", device);
    train_loop(cfg, train_dataset, val_dataset, ckpt_manager, device)
}

fn train_loop(
    cfg: &TrainConfig,
    train_dataset: PatchDataset,
    val_dataset: PatchDataset,
    ckpt_manager: CheckpointManager,
    device: burn::backend::wgpu::WgpuDevice,
) -> Result<()> {
    // ── Build model ───────────────────────────────────────────────────────────
    let mut model: AttentionResUnet<MyBackend> = build_model(cfg, &device)?;
    tracing::info!(
        "Model ready: backbone={}, classes={}, decoder={:?}",
        cfg.backbone,
        cfg.classes,
        cfg.decoder_filters,
    );

    // ── Adam optimiser ────────────────────────────────────────────────────────
    let optim_cfg = AdamConfig::new().with_epsilon(1e-8);
    let mut optim = optim_cfg.init();

    // ── Metrics log ───────────────────────────────────────────────────────────
    let metrics_logger = MetricsLogger::new(&cfg.checkpoint_dir)?;

    // ── Training data loader (AutodiffBackend) ────────────────────────────────
    let train_batcher = PatchBatcher::<MyBackend>::new(device.clone());
    let train_loader = DataLoaderBuilder::new(train_batcher)
        .batch_size(cfg.batch_size)
        .shuffle(42)
        .num_workers(1)
        .build(train_dataset);

    // ── Validation data loader (InnerBackend — no autodiff overhead) ──────────
    let val_batcher = PatchBatcher::<MyInnerBackend>::new(device.clone());
    let val_loader = DataLoaderBuilder::new(val_batcher)
        .batch_size(cfg.batch_size)
        .num_workers(1)
        .build(val_dataset);

    // ── Epoch loop ────────────────────────────────────────────────────────────
    for epoch in 1..=cfg.epochs {
        // ── Training phase ────────────────────────────────────────────────────
        let mut train_loss_sum = 0.0f64;
        let mut train_batches = 0usize;

        for batch in train_loader.iter() {
            let (loss, _) = model.forward_loss(batch.images, batch.masks);

            let loss_val: f64 = loss.clone().into_scalar().elem::<f64>();
            train_loss_sum += loss_val;
            train_batches += 1;

            // Backward pass + Adam update
            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optim.step(cfg.lr, model, grads);
        }

        let avg_train_loss = if train_batches > 0 {
            train_loss_sum / train_batches as f64
        } else {
            f64::NAN
        };

        // ── Validation phase ──────────────────────────────────────────────────
        let model_valid = model.valid();

        let mut val_loss_sum = 0.0f64;
        let mut val_batches = 0usize;
        let mut iou_sum = 0.0f64;
        let mut dice_sum = 0.0f64;

        for batch in val_loader.iter() {
            let (loss, logits) = model_valid.forward_loss(batch.images, batch.masks.clone());

            val_loss_sum += loss.into_scalar().elem::<f64>();
            val_batches += 1;

            let preds = hard_labels(logits);
            iou_sum += mean_iou(preds.clone(), batch.masks.clone(), cfg.classes);
            dice_sum += mean_dice(preds, batch.masks, cfg.classes);
        }

        let avg_val_loss = if val_batches > 0 { val_loss_sum / val_batches as f64 } else { f64::NAN };
        let avg_iou = if val_batches > 0 { iou_sum / val_batches as f64 } else { 0.0 };
        let avg_dice = if val_batches > 0 { dice_sum / val_batches as f64 } else { 0.0 };

        println!(
            "Epoch {:>3}/{} | train_loss={:.4} | val_loss={:.4} | mean_iou={:.3} | mean_dice={:.3}",
            epoch, cfg.epochs, avg_train_loss, avg_val_loss, avg_iou, avg_dice,
        );

        metrics_logger.log(&EpochMetrics::new(
            epoch,
            avg_train_loss,
            avg_val_loss,
            avg_iou,
            avg_dice,
        ))?;

        ckpt_manager.save_model(&model, epoch)?;
        tracing::info!("Checkpoint saved for epoch {}", epoch);
    }

    tracing::info!("Training complete");
    Ok(())
}
