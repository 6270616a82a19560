// ============================================================
// Layer 5 — Attention Residual U-Net
// ============================================================
// The full segmentation model: a backbone encoder, an optional
// center block, a pyramid of attention-gated decoder stages,
// and a 3x3x3 prediction head.
//
// Decoder wiring per stage (skip present):
//   gating    = GatingSignal(decoder input)        at /2^(k+1)
//   attended  = AttentionGate(skip, gating)        at /2^k
//   x         = concat([attended, skip], channels) at /2^k
//   x         = ResConvBlock(filters) twice
// Stages beyond the last skip upsample 2x instead of fusing.
//
// For input spatial dims divisible by 32, the output keeps the
// input's spatial dims with `classes` channels.
//
// Reference: Oktay et al. (2018) Attention U-Net
//            Ronneberger et al. (2015) U-Net

use anyhow::{Context, Result};
use burn::{
    module::Ignored,
    nn::{
        conv::{Conv3d, Conv3dConfig},
        Dropout, DropoutConfig, Initializer, PaddingConfig3d,
    },
    prelude::*,
    record::{CompactRecorder, Recorder},
    tensor::activation::{sigmoid, softmax},
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::ml::backbone::{BackboneName, Encoder};
use crate::ml::blocks::{upsample_nearest_x2, AttentionGate, GatingSignal, ResConvBlock};
use crate::ml::losses::segmentation_loss;

// ─── FinalActivation ──────────────────────────────────────────────────────────
/// Activation applied to the prediction head's logits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinalActivation {
    /// Independent per-channel probabilities (binary / multi-label)
    Sigmoid,
    /// Mutually exclusive class probabilities over the channel axis
    Softmax,
    /// Raw logits
    Linear,
}

impl FinalActivation {
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "sigmoid" => Ok(Self::Sigmoid),
            "softmax" => Ok(Self::Softmax),
            "linear" => Ok(Self::Linear),
            other => anyhow::bail!("Unknown activation '{other}' (available: sigmoid, softmax, linear)"),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sigmoid => "sigmoid",
            Self::Softmax => "softmax",
            Self::Linear => "linear",
        }
    }
}

// ─── Model configuration ──────────────────────────────────────────────────────
#[derive(Config, Debug)]
pub struct AttentionResUnetConfig {
    /// Number of input channels
    pub in_channels: usize,

    /// Number of output classes
    pub classes: usize,

    /// Encoder selected from the backbone registry
    #[config(default = "BackboneName::Vgg16")]
    pub backbone: BackboneName,

    /// Activation on the prediction head
    #[config(default = "FinalActivation::Sigmoid")]
    pub activation: FinalActivation,

    /// Filters per decoder stage; its length is the number of
    /// upsampling stages (5 restores full resolution)
    #[config(default = "vec![256, 128, 64, 32, 16]")]
    pub decoder_filters: Vec<usize>,

    /// Batch-norm between decoder convs and activations
    #[config(default = true)]
    pub decoder_use_batchnorm: bool,

    /// Dropout rate after the decoder pyramid; 0 disables it
    #[config(default = 0.0)]
    pub dropout: f64,

    /// Exclude encoder parameters from gradient tracking
    #[config(default = false)]
    pub encoder_freeze: bool,
}

impl AttentionResUnetConfig {
    /// Build the model: resolve the backbone, thread its output
    /// through the decoder stages (consuming skips deepest
    /// first), and attach the prediction head.
    pub fn init<B: Backend>(&self, device: &B::Device) -> AttentionResUnet<B> {
        let mut encoder = Encoder::init(self.backbone, self.in_channels, device);
        if self.encoder_freeze {
            encoder = encoder.no_grad();
        }

        // Backbones ending in a pool get a center block before
        // the first decoder stage
        let bottleneck = self.backbone.output_channels();
        let center = self
            .backbone
            .ends_with_pool()
            .then(|| ResConvBlock::init(bottleneck, bottleneck, self.decoder_use_batchnorm, device));

        let skip_channels = self.backbone.skip_channels();
        let mut stages = Vec::with_capacity(self.decoder_filters.len());
        let mut in_ch = bottleneck;
        for (i, &filters) in self.decoder_filters.iter().enumerate() {
            let skip = skip_channels.get(i).copied();
            stages.push(DecoderStage::init(
                in_ch,
                skip,
                filters,
                self.decoder_use_batchnorm,
                device,
            ));
            in_ch = filters;
        }

        let dropout = (self.dropout > 0.0).then(|| DropoutConfig::new(self.dropout).init());

        let head = Conv3dConfig::new([in_ch, self.classes], [3, 3, 3])
            .with_padding(PaddingConfig3d::Explicit(1, 1, 1))
            .with_initializer(Initializer::XavierUniform { gain: 1.0 })
            .init(device);

        AttentionResUnet {
            encoder,
            center,
            stages,
            dropout,
            head,
            classes: self.classes,
            activation: Ignored(self.activation),
        }
    }
}

// ─── DecoderStage ─────────────────────────────────────────────────────────────
/// One upsampling stage of the decoder.
///
/// With a skip, the stage output is the attention-gated skip
/// concatenated with the raw skip; without one it is the 2x
/// nearest-upsampled input. Two residual conv blocks follow
/// either way.
#[derive(Module, Debug)]
pub struct DecoderStage<B: Backend> {
    gating: Option<GatingSignal<B>>,
    attention: Option<AttentionGate<B>>,
    conv1: ResConvBlock<B>,
    conv2: ResConvBlock<B>,
}

impl<B: Backend> DecoderStage<B> {
    fn init(
        in_channels: usize,
        skip_channels: Option<usize>,
        filters: usize,
        use_batchnorm: bool,
        device: &B::Device,
    ) -> Self {
        match skip_channels {
            Some(sk) => Self {
                gating: Some(GatingSignal::init(in_channels, filters, use_batchnorm, device)),
                attention: Some(AttentionGate::init(sk, filters, filters, device)),
                conv1: ResConvBlock::init(2 * sk, filters, use_batchnorm, device),
                conv2: ResConvBlock::init(filters, filters, use_batchnorm, device),
            },
            None => Self {
                gating: None,
                attention: None,
                conv1: ResConvBlock::init(in_channels, filters, use_batchnorm, device),
                conv2: ResConvBlock::init(filters, filters, use_batchnorm, device),
            },
        }
    }

    fn forward(&self, x: Tensor<B, 5>, skip: Option<&Tensor<B, 5>>) -> Tensor<B, 5> {
        let x = match (skip, &self.gating, &self.attention) {
            (Some(skip), Some(gating), Some(attention)) => {
                let g = gating.forward(x);
                let attended = attention.forward(skip.clone(), g);
                Tensor::cat(vec![attended, skip.clone()], 1)
            }
            _ => upsample_nearest_x2(x),
        };

        self.conv2.forward(self.conv1.forward(x))
    }
}

// ─── AttentionResUnet ─────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct AttentionResUnet<B: Backend> {
    pub encoder: Encoder<B>,
    center: Option<ResConvBlock<B>>,
    stages: Vec<DecoderStage<B>>,
    dropout: Option<Dropout>,
    head: Conv3d<B>,
    classes: usize,
    activation: Ignored<FinalActivation>,
}

impl<B: Backend> AttentionResUnet<B> {
    /// images: [batch, channels, d, h, w] → logits of the same
    /// spatial shape with `classes` channels.
    pub fn forward_logits(&self, images: Tensor<B, 5>) -> Tensor<B, 5> {
        let features = self.encoder.forward(images);

        let mut x = features.output;
        if let Some(center) = &self.center {
            x = center.forward(x);
        }

        for (i, stage) in self.stages.iter().enumerate() {
            x = stage.forward(x, features.skips.get(i));
        }

        if let Some(dropout) = &self.dropout {
            x = dropout.forward(x);
        }

        self.head.forward(x)
    }

    /// Forward pass with the configured final activation applied.
    pub fn forward(&self, images: Tensor<B, 5>) -> Tensor<B, 5> {
        let logits = self.forward_logits(images);
        match self.activation.0 {
            FinalActivation::Sigmoid => sigmoid(logits),
            FinalActivation::Softmax => softmax(logits, 1),
            FinalActivation::Linear => logits,
        }
    }

    /// Forward pass plus the training loss against a ground
    /// truth mask. Loss = voxel CE (or BCE for a sigmoid head)
    /// plus soft Dice.
    pub fn forward_loss(
        &self,
        images: Tensor<B, 5>,
        masks: Tensor<B, 4, Int>,
    ) -> (Tensor<B, 1>, Tensor<B, 5>) {
        let logits = self.forward_logits(images);
        let loss = segmentation_loss(logits.clone(), masks, self.activation.0);
        (loss, logits)
    }

    /// Restore model parameters from a Burn record file.
    /// The record's architecture must match this model's.
    pub fn load_weights(self, path: impl AsRef<Path>, device: &B::Device) -> Result<Self> {
        let path = path.as_ref();
        let record = CompactRecorder::new()
            .load(path.to_path_buf(), device)
            .with_context(|| format!("Cannot load model weights from '{}'", path.display()))?;
        Ok(self.load_record(record))
    }

    pub fn classes(&self) -> usize {
        self.classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestBackend = burn::backend::NdArray;

    #[test]
    fn output_matches_input_resolution_with_class_channels() {
        let device = Default::default();
        let model: AttentionResUnet<TestBackend> = AttentionResUnetConfig::new(1, 3)
            .with_activation(FinalActivation::Softmax)
            .init(&device);

        let x = Tensor::zeros([1, 1, 32, 32, 32], &device);
        let y = model.forward(x);
        assert_eq!(y.dims(), [1, 3, 32, 32, 32]);
    }

    #[test]
    fn softmax_head_yields_a_distribution_per_voxel() {
        let device = Default::default();
        let model: AttentionResUnet<TestBackend> = AttentionResUnetConfig::new(1, 4)
            .with_backbone(BackboneName::ResNet18)
            .with_activation(FinalActivation::Softmax)
            .init(&device);

        let x = Tensor::random(
            [1, 1, 32, 32, 32],
            burn::tensor::Distribution::Default,
            &device,
        );
        let y = model.forward(x);

        let sums: Vec<f32> = y.sum_dim(1).into_data().to_vec().unwrap();
        for s in sums {
            assert!((s - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn shallow_decoder_stops_above_full_resolution() {
        // Two stages from /32 only reach /8
        let device = Default::default();
        let model: AttentionResUnet<TestBackend> = AttentionResUnetConfig::new(1, 1)
            .with_decoder_filters(vec![32, 16])
            .init(&device);

        let x = Tensor::zeros([1, 1, 32, 32, 32], &device);
        let y = model.forward(x);
        assert_eq!(y.dims(), [1, 1, 8, 8, 8]);
    }

    #[test]
    fn forward_loss_is_a_finite_scalar() {
        let device = Default::default();
        let model: AttentionResUnet<TestBackend> = AttentionResUnetConfig::new(1, 2)
            .with_activation(FinalActivation::Softmax)
            .with_decoder_filters(vec![16, 16, 8, 8, 4])
            .init(&device);

        let x = Tensor::random(
            [1, 1, 32, 32, 32],
            burn::tensor::Distribution::Default,
            &device,
        );
        let masks = Tensor::<TestBackend, 4, Int>::ones([1, 32, 32, 32], &device);

        let (loss, logits) = model.forward_loss(x, masks);
        assert_eq!(logits.dims(), [1, 2, 32, 32, 32]);

        let value: f32 = loss.into_scalar();
        assert!(value.is_finite());
    }

    #[test]
    fn activation_names_parse() {
        assert_eq!(
            FinalActivation::parse("softmax").unwrap(),
            FinalActivation::Softmax
        );
        assert!(FinalActivation::parse("tanh").is_err());
    }
}
