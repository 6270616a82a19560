// ============================================================
// Layer 5 — Network Building Blocks
// ============================================================
// The convolutional blocks the attention residual U-Net is
// assembled from. Each block is a Burn module mapping a
// [batch, channels, d, h, w] tensor to a new one.
//
// Burn ships no 3D pooling or 3D nearest upsampling, so both
// are expressed below with reshape/repeat/max reductions over
// the framework's tensor ops — one spatial axis at a time to
// keep the intermediate rank at 6.
//
// Reference: Oktay et al. (2018) Attention U-Net
//            He et al. (2016) Deep Residual Learning

use burn::{
    nn::{
        conv::{Conv3d, Conv3dConfig, ConvTranspose3d, ConvTranspose3dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig3d,
    },
    prelude::*,
    tensor::activation::{relu, sigmoid},
};

// ─── Spatial helpers ──────────────────────────────────────────────────────────

/// Nearest-neighbour 2x upsampling of all three spatial axes.
///
/// Each voxel is duplicated along depth, height, and width by
/// inserting a singleton axis, repeating it, and folding it back
/// into the spatial dim.
pub fn upsample_nearest_x2<B: Backend>(x: Tensor<B, 5>) -> Tensor<B, 5> {
    let [b, c, d, h, w] = x.dims();
    let x = x
        .unsqueeze_dim::<6>(3)
        .repeat_dim(3, 2)
        .reshape([b, c, d * 2, h, w]);
    let x = x
        .unsqueeze_dim::<6>(4)
        .repeat_dim(4, 2)
        .reshape([b, c, d * 2, h * 2, w]);
    x.unsqueeze_dim::<6>(5)
        .repeat_dim(5, 2)
        .reshape([b, c, d * 2, h * 2, w * 2])
}

/// 2x2x2 max-pooling with stride 2.
///
/// Spatial dims must be even — the encoder only pools tensors
/// whose extent is a multiple of 32.
pub fn max_pool3d_x2<B: Backend>(x: Tensor<B, 5>) -> Tensor<B, 5> {
    let [b, c, d, h, w] = x.dims();
    let x = x
        .reshape([b, c, d / 2, 2, h, w])
        .max_dim(3)
        .reshape([b, c, d / 2, h, w]);
    let x = x
        .reshape([b, c, d / 2, h / 2, 2, w])
        .max_dim(4)
        .reshape([b, c, d / 2, h / 2, w]);
    x.reshape([b, c, d / 2, h / 2, w / 2, 2])
        .max_dim(5)
        .reshape([b, c, d / 2, h / 2, w / 2])
}

// ─── ConvBnRelu ───────────────────────────────────────────────────────────────
/// 3x3x3 convolution, optional batch-norm, ReLU.
///
/// The conv carries a bias only when batch-norm is off —
/// batch-norm's shift parameter subsumes it otherwise.
#[derive(Module, Debug)]
pub struct ConvBnRelu<B: Backend> {
    conv: Conv3d<B>,
    bn: Option<BatchNorm<B, 3>>,
}

impl<B: Backend> ConvBnRelu<B> {
    pub fn init(
        in_channels: usize,
        filters: usize,
        use_batchnorm: bool,
        device: &B::Device,
    ) -> Self {
        let conv = Conv3dConfig::new([in_channels, filters], [3, 3, 3])
            .with_padding(PaddingConfig3d::Explicit(1, 1, 1))
            .with_bias(!use_batchnorm)
            .init(device);
        let bn = use_batchnorm.then(|| BatchNormConfig::new(filters).init(device));
        Self { conv, bn }
    }

    pub fn forward(&self, x: Tensor<B, 5>) -> Tensor<B, 5> {
        let x = self.conv.forward(x);
        let x = match &self.bn {
            Some(bn) => bn.forward(x),
            None => x,
        };
        relu(x)
    }
}

// ─── ResConvBlock ─────────────────────────────────────────────────────────────
/// Residual double-conv block: two ConvBnRelu in sequence plus a
/// 1x1x1 projection shortcut from the block input, fused by
/// elementwise add and a final ReLU.
///
/// The shortcut is always a projection (never identity) so the
/// block can change channel count freely.
#[derive(Module, Debug)]
pub struct ResConvBlock<B: Backend> {
    conv1: ConvBnRelu<B>,
    conv2: ConvBnRelu<B>,
    shortcut: Conv3d<B>,
    shortcut_bn: Option<BatchNorm<B, 3>>,
}

impl<B: Backend> ResConvBlock<B> {
    pub fn init(
        in_channels: usize,
        filters: usize,
        use_batchnorm: bool,
        device: &B::Device,
    ) -> Self {
        let shortcut = Conv3dConfig::new([in_channels, filters], [1, 1, 1])
            .with_bias(!use_batchnorm)
            .init(device);
        Self {
            conv1: ConvBnRelu::init(in_channels, filters, use_batchnorm, device),
            conv2: ConvBnRelu::init(filters, filters, use_batchnorm, device),
            shortcut,
            shortcut_bn: use_batchnorm.then(|| BatchNormConfig::new(filters).init(device)),
        }
    }

    pub fn forward(&self, x: Tensor<B, 5>) -> Tensor<B, 5> {
        let main = self.conv2.forward(self.conv1.forward(x.clone()));

        let short = self.shortcut.forward(x);
        let short = match &self.shortcut_bn {
            Some(bn) => bn.forward(short),
            None => short,
        };

        relu(short + main)
    }
}

// ─── GatingSignal ─────────────────────────────────────────────────────────────
/// 1x1x1 conv + optional batch-norm + ReLU producing the coarse
/// gating tensor an attention gate compares its skip against.
#[derive(Module, Debug)]
pub struct GatingSignal<B: Backend> {
    conv: Conv3d<B>,
    bn: Option<BatchNorm<B, 3>>,
}

impl<B: Backend> GatingSignal<B> {
    pub fn init(
        in_channels: usize,
        filters: usize,
        use_batchnorm: bool,
        device: &B::Device,
    ) -> Self {
        let conv = Conv3dConfig::new([in_channels, filters], [1, 1, 1]).init(device);
        let bn = use_batchnorm.then(|| BatchNormConfig::new(filters).init(device));
        Self { conv, bn }
    }

    pub fn forward(&self, x: Tensor<B, 5>) -> Tensor<B, 5> {
        let x = self.conv.forward(x);
        let x = match &self.bn {
            Some(bn) => bn.forward(x),
            None => x,
        };
        relu(x)
    }
}

// ─── AttentionGate ────────────────────────────────────────────────────────────
/// Additive attention gate (Oktay et al. 2018).
///
/// The skip is strided down to the gating resolution, both are
/// projected into `inter` channels, summed, and squashed into a
/// single-channel sigmoid coefficient map. That map is
/// upsampled back to the skip's resolution, broadcast across
/// its channels, and multiplied in — attended features then get
/// a 1x1x1 conv + batch-norm.
///
/// The gating tensor must sit exactly one pooling level below
/// the skip (half its spatial extent), which is how the decoder
/// always calls it.
#[derive(Module, Debug)]
pub struct AttentionGate<B: Backend> {
    theta: Conv3d<B>,
    phi: Conv3d<B>,
    align: ConvTranspose3d<B>,
    psi: Conv3d<B>,
    out_conv: Conv3d<B>,
    out_bn: BatchNorm<B, 3>,
}

impl<B: Backend> AttentionGate<B> {
    pub fn init(
        skip_channels: usize,
        gate_channels: usize,
        inter_channels: usize,
        device: &B::Device,
    ) -> Self {
        // Strided 2x2x2 conv halves the skip's spatial extent
        let theta = Conv3dConfig::new([skip_channels, inter_channels], [2, 2, 2])
            .with_stride([2, 2, 2])
            .init(device);
        let phi = Conv3dConfig::new([gate_channels, inter_channels], [1, 1, 1]).init(device);
        // 3x3x3 transposed conv aligning the projected gate with theta
        let align = ConvTranspose3dConfig::new([inter_channels, inter_channels], [3, 3, 3])
            .with_padding([1, 1, 1])
            .init(device);
        let psi = Conv3dConfig::new([inter_channels, 1], [1, 1, 1]).init(device);
        let out_conv = Conv3dConfig::new([skip_channels, skip_channels], [1, 1, 1]).init(device);
        let out_bn = BatchNormConfig::new(skip_channels).init(device);

        Self {
            theta,
            phi,
            align,
            psi,
            out_conv,
            out_bn,
        }
    }

    pub fn forward(&self, skip: Tensor<B, 5>, gate: Tensor<B, 5>) -> Tensor<B, 5> {
        let channels = skip.dims()[1];

        let theta_x = self.theta.forward(skip.clone());
        let phi_g = self.align.forward(self.phi.forward(gate));

        let att = relu(theta_x + phi_g);
        let att = sigmoid(self.psi.forward(att));

        // Back to skip resolution, one coefficient per voxel,
        // repeated across the skip's channels
        let att = upsample_nearest_x2(att).repeat_dim(1, channels);

        let y = att * skip;
        self.out_bn.forward(self.out_conv.forward(y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestBackend = burn::backend::NdArray;

    #[test]
    fn upsample_duplicates_each_voxel() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 1>::from_floats([1.0, 2.0], &device)
            .reshape([1, 1, 1, 1, 2]);

        let up = upsample_nearest_x2(x);
        assert_eq!(up.dims(), [1, 1, 2, 2, 4]);

        let data: Vec<f32> = up.into_data().to_vec().unwrap();
        // Width axis: 1 1 2 2, repeated over the doubled h and d axes
        assert_eq!(data[..4], [1.0, 1.0, 2.0, 2.0]);
        assert_eq!(data[4..8], [1.0, 1.0, 2.0, 2.0]);
    }

    #[test]
    fn max_pool_keeps_the_block_maximum() {
        let device = Default::default();
        let vals: Vec<f32> = (0..8).map(|i| i as f32).collect();
        let x = Tensor::<TestBackend, 1>::from_floats(vals.as_slice(), &device)
            .reshape([1, 1, 2, 2, 2]);

        let pooled = max_pool3d_x2(x);
        assert_eq!(pooled.dims(), [1, 1, 1, 1, 1]);
        let data: Vec<f32> = pooled.into_data().to_vec().unwrap();
        assert_eq!(data, vec![7.0]);
    }

    #[test]
    fn pool_then_upsample_restores_shape() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 5>::zeros([1, 3, 4, 4, 4], &device);
        let y = upsample_nearest_x2(max_pool3d_x2(x));
        assert_eq!(y.dims(), [1, 3, 4, 4, 4]);
    }

    #[test]
    fn res_conv_block_changes_channels() {
        let device = Default::default();
        let block = ResConvBlock::<TestBackend>::init(3, 8, true, &device);

        let x = Tensor::zeros([2, 3, 4, 4, 4], &device);
        assert_eq!(block.forward(x).dims(), [2, 8, 4, 4, 4]);
    }

    #[test]
    fn gating_signal_preserves_resolution() {
        let device = Default::default();
        let gate = GatingSignal::<TestBackend>::init(16, 8, false, &device);

        let x = Tensor::zeros([1, 16, 2, 2, 2], &device);
        assert_eq!(gate.forward(x).dims(), [1, 8, 2, 2, 2]);
    }

    #[test]
    fn attention_gate_reweights_without_reshaping() {
        let device = Default::default();
        let gate = AttentionGate::<TestBackend>::init(6, 8, 8, &device);

        // Skip at /1, gating one pooling level below
        let skip = Tensor::zeros([1, 6, 8, 8, 8], &device);
        let gating = Tensor::zeros([1, 8, 4, 4, 4], &device);

        let out = gate.forward(skip, gating);
        assert_eq!(out.dims(), [1, 6, 8, 8, 8]);
    }
}
