// ============================================================
// Layer 5 — Backbone Encoders
// ============================================================
// The encoder half of the U-Net: a feature-extraction network
// selected by name, exposing its multi-scale intermediate
// activations (skips) alongside the final /32 feature map.
//
// Two 3D backbones are provided:
//   vgg16    — plain conv stacks, pooled after every block
//   resnet18 — residual basic blocks, strided downsampling
//
// Skips are returned deepest-first, which is the order the
// decoder consumes them in. Pretrained weights can be restored
// into an encoder from a Burn record file (see
// infra::encoder_weights), and a frozen encoder is simply one
// whose parameters are excluded from gradient tracking.
//
// Reference: Simonyan & Zisserman (2015) VGG
//            He et al. (2016) ResNet

use anyhow::{bail, Result};
use burn::{
    nn::{
        conv::{Conv3d, Conv3dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig3d,
    },
    prelude::*,
    tensor::activation::relu,
};
use serde::{Deserialize, Serialize};

use crate::ml::blocks::{max_pool3d_x2, ConvBnRelu};

// ─── BackboneName ─────────────────────────────────────────────────────────────
/// The backbone registry key. Parsing an unknown name is the
/// one configuration error this layer reports itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackboneName {
    Vgg16,
    ResNet18,
}

impl BackboneName {
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "vgg16" => Ok(Self::Vgg16),
            "resnet18" => Ok(Self::ResNet18),
            other => bail!("Unknown backbone '{other}' (available: vgg16, resnet18)"),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vgg16 => "vgg16",
            Self::ResNet18 => "resnet18",
        }
    }

    /// Channel counts of the four skip tensors, deepest first.
    pub fn skip_channels(&self) -> [usize; 4] {
        match self {
            Self::Vgg16 => [512, 512, 256, 128],
            Self::ResNet18 => [256, 128, 64, 64],
        }
    }

    /// Channel count of the /32 output feature map.
    pub fn output_channels(&self) -> usize {
        512
    }

    /// Whether the encoder's last operation is a pooling step.
    /// When it is, the decoder prepends a center ResConvBlock.
    pub fn ends_with_pool(&self) -> bool {
        matches!(self, Self::Vgg16)
    }
}

// ─── EncoderFeatures ──────────────────────────────────────────────────────────
/// Everything the decoder needs from one encoder pass.
#[derive(Debug)]
pub struct EncoderFeatures<B: Backend> {
    /// The /32 bottleneck feature map
    pub output: Tensor<B, 5>,

    /// Skip activations, deepest (/16) first, shallowest (/2) last
    pub skips: Vec<Tensor<B, 5>>,
}

// ─── Vgg16Encoder ─────────────────────────────────────────────────────────────
/// 3D VGG16 feature extractor: five conv blocks, each followed
/// by 2x2x2 max-pooling. No batch-norm, matching the classic
/// configuration.
#[derive(Module, Debug)]
pub struct Vgg16Encoder<B: Backend> {
    blocks: Vec<Vec<ConvBnRelu<B>>>,
}

impl<B: Backend> Vgg16Encoder<B> {
    pub fn init(in_channels: usize, device: &B::Device) -> Self {
        // (filters, convs per block)
        let plan: [(usize, usize); 5] = [(64, 2), (128, 2), (256, 3), (512, 3), (512, 3)];

        let mut blocks = Vec::with_capacity(plan.len());
        let mut channels = in_channels;
        for (filters, convs) in plan {
            let mut block = Vec::with_capacity(convs);
            for _ in 0..convs {
                block.push(ConvBnRelu::init(channels, filters, false, device));
                channels = filters;
            }
            blocks.push(block);
        }

        Self { blocks }
    }

    pub fn forward(&self, x: Tensor<B, 5>) -> EncoderFeatures<B> {
        let mut x = x;
        let mut skips = Vec::with_capacity(4);

        for (i, block) in self.blocks.iter().enumerate() {
            for conv in block {
                x = conv.forward(x);
            }
            // Pre-pool activations of blocks 2..=5 are the skips
            if i >= 1 {
                skips.push(x.clone());
            }
            x = max_pool3d_x2(x);
        }

        // Deepest first for the decoder
        skips.reverse();
        EncoderFeatures { output: x, skips }
    }
}

// ─── ResNet18Encoder ──────────────────────────────────────────────────────────
/// One residual basic block: two 3x3x3 convs with batch-norm,
/// optional strided 1x1x1 projection on the shortcut.
#[derive(Module, Debug)]
pub struct BasicBlock3d<B: Backend> {
    conv1: Conv3d<B>,
    bn1: BatchNorm<B, 3>,
    conv2: Conv3d<B>,
    bn2: BatchNorm<B, 3>,
    downsample: Option<Conv3d<B>>,
    downsample_bn: Option<BatchNorm<B, 3>>,
}

impl<B: Backend> BasicBlock3d<B> {
    pub fn init(in_channels: usize, filters: usize, stride: usize, device: &B::Device) -> Self {
        let conv1 = Conv3dConfig::new([in_channels, filters], [3, 3, 3])
            .with_stride([stride, stride, stride])
            .with_padding(PaddingConfig3d::Explicit(1, 1, 1))
            .with_bias(false)
            .init(device);
        let conv2 = Conv3dConfig::new([filters, filters], [3, 3, 3])
            .with_padding(PaddingConfig3d::Explicit(1, 1, 1))
            .with_bias(false)
            .init(device);

        // Shortcut needs a projection whenever shape changes
        let needs_projection = stride != 1 || in_channels != filters;
        let downsample = needs_projection.then(|| {
            Conv3dConfig::new([in_channels, filters], [1, 1, 1])
                .with_stride([stride, stride, stride])
                .with_bias(false)
                .init(device)
        });
        let downsample_bn =
            needs_projection.then(|| BatchNormConfig::new(filters).init(device));

        Self {
            conv1,
            bn1: BatchNormConfig::new(filters).init(device),
            conv2,
            bn2: BatchNormConfig::new(filters).init(device),
            downsample,
            downsample_bn,
        }
    }

    pub fn forward(&self, x: Tensor<B, 5>) -> Tensor<B, 5> {
        let main = relu(self.bn1.forward(self.conv1.forward(x.clone())));
        let main = self.bn2.forward(self.conv2.forward(main));

        let short = match (&self.downsample, &self.downsample_bn) {
            (Some(conv), Some(bn)) => bn.forward(conv.forward(x)),
            _ => x,
        };

        relu(main + short)
    }
}

/// 3D ResNet-18 feature extractor: 7x7x7 stride-2 stem, pool,
/// then four stages of two basic blocks each.
#[derive(Module, Debug)]
pub struct ResNet18Encoder<B: Backend> {
    stem_conv: Conv3d<B>,
    stem_bn: BatchNorm<B, 3>,
    layer1: Vec<BasicBlock3d<B>>,
    layer2: Vec<BasicBlock3d<B>>,
    layer3: Vec<BasicBlock3d<B>>,
    layer4: Vec<BasicBlock3d<B>>,
}

impl<B: Backend> ResNet18Encoder<B> {
    pub fn init(in_channels: usize, device: &B::Device) -> Self {
        let stem_conv = Conv3dConfig::new([in_channels, 64], [7, 7, 7])
            .with_stride([2, 2, 2])
            .with_padding(PaddingConfig3d::Explicit(3, 3, 3))
            .with_bias(false)
            .init(device);

        let stage = |inp: usize, filters: usize, stride: usize, device: &B::Device| {
            vec![
                BasicBlock3d::init(inp, filters, stride, device),
                BasicBlock3d::init(filters, filters, 1, device),
            ]
        };

        Self {
            stem_conv,
            stem_bn: BatchNormConfig::new(64).init(device),
            layer1: stage(64, 64, 1, device),
            layer2: stage(64, 128, 2, device),
            layer3: stage(128, 256, 2, device),
            layer4: stage(256, 512, 2, device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 5>) -> EncoderFeatures<B> {
        // Stem: /2, recorded as the shallowest skip
        let stem = relu(self.stem_bn.forward(self.stem_conv.forward(x)));

        let run = |blocks: &[BasicBlock3d<B>], mut x: Tensor<B, 5>| {
            for block in blocks {
                x = block.forward(x);
            }
            x
        };

        let l1 = run(&self.layer1, max_pool3d_x2(stem.clone())); // /4
        let l2 = run(&self.layer2, l1.clone()); // /8
        let l3 = run(&self.layer3, l2.clone()); // /16
        let output = run(&self.layer4, l3.clone()); // /32

        EncoderFeatures {
            output,
            skips: vec![l3, l2, l1, stem],
        }
    }
}

// ─── Encoder (factory product) ────────────────────────────────────────────────
/// The backbone actually held by the model. Exactly one of the
/// variants is populated, selected by BackboneName at init.
#[derive(Module, Debug)]
pub struct Encoder<B: Backend> {
    vgg: Option<Vgg16Encoder<B>>,
    resnet: Option<ResNet18Encoder<B>>,
}

impl<B: Backend> Encoder<B> {
    pub fn init(name: BackboneName, in_channels: usize, device: &B::Device) -> Self {
        match name {
            BackboneName::Vgg16 => Self {
                vgg: Some(Vgg16Encoder::init(in_channels, device)),
                resnet: None,
            },
            BackboneName::ResNet18 => Self {
                vgg: None,
                resnet: Some(ResNet18Encoder::init(in_channels, device)),
            },
        }
    }

    pub fn forward(&self, x: Tensor<B, 5>) -> EncoderFeatures<B> {
        match (&self.vgg, &self.resnet) {
            (Some(enc), _) => enc.forward(x),
            (_, Some(enc)) => enc.forward(x),
            (None, None) => unreachable!("Encoder::init always populates one backbone"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestBackend = burn::backend::NdArray;

    #[test]
    fn backbone_names_parse() {
        assert_eq!(BackboneName::parse("vgg16").unwrap(), BackboneName::Vgg16);
        assert_eq!(
            BackboneName::parse("ResNet18").unwrap(),
            BackboneName::ResNet18
        );
        assert!(BackboneName::parse("densenet121").is_err());
    }

    #[test]
    fn vgg16_feature_pyramid_shapes() {
        let device = Default::default();
        let encoder = Encoder::<TestBackend>::init(BackboneName::Vgg16, 1, &device);

        let x = Tensor::zeros([1, 1, 32, 32, 32], &device);
        let features = encoder.forward(x);

        assert_eq!(features.output.dims(), [1, 512, 1, 1, 1]);

        let dims: Vec<[usize; 5]> = features.skips.iter().map(|s| s.dims()).collect();
        assert_eq!(
            dims,
            vec![
                [1, 512, 2, 2, 2],
                [1, 512, 4, 4, 4],
                [1, 256, 8, 8, 8],
                [1, 128, 16, 16, 16],
            ]
        );
    }

    #[test]
    fn resnet18_feature_pyramid_shapes() {
        let device = Default::default();
        let encoder = Encoder::<TestBackend>::init(BackboneName::ResNet18, 2, &device);

        let x = Tensor::zeros([1, 2, 32, 32, 32], &device);
        let features = encoder.forward(x);

        assert_eq!(features.output.dims(), [1, 512, 1, 1, 1]);

        let dims: Vec<[usize; 5]> = features.skips.iter().map(|s| s.dims()).collect();
        assert_eq!(
            dims,
            vec![
                [1, 256, 2, 2, 2],
                [1, 128, 4, 4, 4],
                [1, 64, 8, 8, 8],
                [1, 64, 16, 16, 16],
            ]
        );
    }
}
