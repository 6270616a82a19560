// ============================================================
// Layer 5 — Segmentation Losses and Scores
// ============================================================
// Training loss = voxel-wise cross-entropy (softmax heads) or
// binary cross-entropy (sigmoid heads) plus soft Dice. The two
// terms complement each other: CE optimises per-voxel
// calibration, Dice directly targets region overlap and keeps
// small foreground structures from being drowned out by the
// background class.
//
// Evaluation scores (IoU, Dice) run on hard label maps and
// return plain f64 — they never participate in autodiff.
//
// Reference: Milletari et al. (2016) V-Net (Dice loss)

use burn::{
    nn::loss::{BinaryCrossEntropyLossConfig, CrossEntropyLossConfig},
    prelude::*,
    tensor::activation::{sigmoid, softmax},
};

use crate::ml::model::FinalActivation;

/// Laplace smoothing keeping empty-class Dice terms defined
const SMOOTH: f32 = 1.0;

/// Combined training loss for a batch of logits against an
/// integer mask.
pub fn segmentation_loss<B: Backend>(
    logits: Tensor<B, 5>,
    masks: Tensor<B, 4, Int>,
    activation: FinalActivation,
) -> Tensor<B, 1> {
    match activation {
        FinalActivation::Sigmoid => {
            let probs = sigmoid(logits.clone());
            bce_loss(logits, masks.clone()) + dice_loss(probs, masks)
        }
        // A linear head is still trained as mutually exclusive classes
        FinalActivation::Softmax | FinalActivation::Linear => {
            let probs = softmax(logits.clone(), 1);
            cross_entropy_loss(logits, masks.clone()) + dice_loss(probs, masks)
        }
    }
}

/// Voxel-wise cross-entropy: logits [b, c, d, h, w] against
/// class indices [b, d, h, w].
fn cross_entropy_loss<B: Backend>(logits: Tensor<B, 5>, masks: Tensor<B, 4, Int>) -> Tensor<B, 1> {
    let [b, c, d, h, w] = logits.dims();
    let voxels = b * d * h * w;

    // CrossEntropyLoss wants [N, classes] — voxels become rows
    let flat = logits.permute([0, 2, 3, 4, 1]).reshape([voxels, c]);
    let targets = masks.reshape([voxels]);

    CrossEntropyLossConfig::new()
        .init(&flat.device())
        .forward(flat, targets)
}

/// Per-channel binary cross-entropy, averaged over channels.
/// A single channel is matched against "any foreground";
/// multiple channels are matched one-vs-rest.
fn bce_loss<B: Backend>(logits: Tensor<B, 5>, masks: Tensor<B, 4, Int>) -> Tensor<B, 1> {
    let [b, c, d, h, w] = logits.dims();
    let n = b * d * h * w;
    let device = logits.device();

    let loss_fn = BinaryCrossEntropyLossConfig::new()
        .with_logits(true)
        .init(&device);

    let mut total = Tensor::<B, 1>::zeros([1], &device);
    for class in 0..c {
        let channel = logits
            .clone()
            .slice([0..b, class..class + 1, 0..d, 0..h, 0..w])
            .reshape([n]);
        let target = binary_target(&masks, class, c).reshape([n]);
        total = total + loss_fn.forward(channel, target);
    }
    total.div_scalar(c as f32)
}

/// Soft Dice loss over probabilities [b, c, d, h, w].
pub fn dice_loss<B: Backend>(probs: Tensor<B, 5>, masks: Tensor<B, 4, Int>) -> Tensor<B, 1> {
    let [b, c, d, h, w] = probs.dims();
    let device = probs.device();

    let mut total = Tensor::<B, 1>::zeros([1], &device);
    for class in 0..c {
        let p = probs
            .clone()
            .slice([0..b, class..class + 1, 0..d, 0..h, 0..w])
            .reshape([b, d, h, w]);
        let t = binary_target(&masks, class, c).float();

        let intersection = (p.clone() * t.clone()).sum();
        let denom = p.sum() + t.sum();
        let dice = intersection.mul_scalar(2.0).add_scalar(SMOOTH) / denom.add_scalar(SMOOTH);
        total = total + dice;
    }

    // 1 - mean Dice
    total.div_scalar(c as f32).neg().add_scalar(1.0)
}

/// 0/1 target grid for one output channel.
fn binary_target<B: Backend>(
    masks: &Tensor<B, 4, Int>,
    class: usize,
    channels: usize,
) -> Tensor<B, 4, Int> {
    if channels == 1 {
        // Single channel: foreground vs background
        masks.clone().greater_elem(0).int()
    } else {
        masks.clone().equal_elem(class as i32).int()
    }
}

// ─── Evaluation scores ────────────────────────────────────────────────────────

/// Mean intersection-over-union across classes, on hard labels.
/// Classes absent from both prediction and ground truth are
/// skipped; an entirely empty pair scores 1.0.
pub fn mean_iou<B: Backend>(
    preds: Tensor<B, 4, Int>,
    masks: Tensor<B, 4, Int>,
    classes: usize,
) -> f64 {
    mean_overlap(preds, masks, classes, |inter, p, t| {
        let union = p + t - inter;
        (inter, union)
    })
}

/// Mean Dice coefficient across classes, on hard labels.
pub fn mean_dice<B: Backend>(
    preds: Tensor<B, 4, Int>,
    masks: Tensor<B, 4, Int>,
    classes: usize,
) -> f64 {
    mean_overlap(preds, masks, classes, |inter, p, t| (2.0 * inter, p + t))
}

/// Collapse logits into a hard label map [b, d, h, w].
///
/// Multi-channel outputs take the arg-max over channels; a
/// single channel thresholds at probability 0.5 (logit 0).
pub fn hard_labels<B: Backend>(logits: Tensor<B, 5>) -> Tensor<B, 4, Int> {
    let [b, c, d, h, w] = logits.dims();
    if c == 1 {
        logits.greater_elem(0.0).int().reshape([b, d, h, w])
    } else {
        logits.argmax(1).reshape([b, d, h, w])
    }
}

fn mean_overlap<B: Backend>(
    preds: Tensor<B, 4, Int>,
    masks: Tensor<B, 4, Int>,
    classes: usize,
    ratio: impl Fn(f64, f64, f64) -> (f64, f64),
) -> f64 {
    let mut sum = 0.0;
    let mut counted = 0usize;

    for class in 0..classes {
        let p = preds.clone().equal_elem(class as i32).int().float();
        let t = masks.clone().equal_elem(class as i32).int().float();

        let inter: f64 = (p.clone() * t.clone()).sum().into_scalar().elem::<f64>();
        let p_sum: f64 = p.sum().into_scalar().elem::<f64>();
        let t_sum: f64 = t.sum().into_scalar().elem::<f64>();

        let (num, den) = ratio(inter, p_sum, t_sum);
        if den > 0.0 {
            sum += num / den;
            counted += 1;
        }
    }

    if counted == 0 {
        1.0
    } else {
        sum / counted as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestBackend = burn::backend::NdArray;

    fn labels(device: &<TestBackend as Backend>::Device, values: [i32; 8]) -> Tensor<TestBackend, 4, Int> {
        Tensor::<TestBackend, 1, Int>::from_ints(values, device).reshape([1, 2, 2, 2])
    }

    #[test]
    fn perfect_prediction_has_near_zero_dice_loss() {
        let device = Default::default();
        let masks = labels(&device, [0, 0, 0, 0, 1, 1, 1, 1]);

        // Probabilities exactly matching the mask, two classes
        let probs_flat: Vec<f32> = vec![
            1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0, // class 0 channel
            0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, // class 1 channel
        ];
        let probs = Tensor::<TestBackend, 1>::from_floats(probs_flat.as_slice(), &device)
            .reshape([1, 2, 2, 2, 2]);

        let loss: f32 = dice_loss(probs, masks).into_scalar();
        // Smoothing keeps it slightly above zero
        assert!(loss < 0.15, "dice loss was {loss}");
    }

    #[test]
    fn mean_iou_on_half_overlap() {
        let device = Default::default();
        // Prediction covers the mask's foreground plus two extra voxels
        let preds = labels(&device, [0, 0, 1, 1, 1, 1, 0, 0]);
        let masks = labels(&device, [0, 0, 0, 0, 1, 1, 0, 0]);

        // class 0: inter 4, union 6; class 1: inter 2, union 4
        let iou = mean_iou(preds, masks, 2);
        let expected = (4.0 / 6.0 + 2.0 / 4.0) / 2.0;
        assert!((iou - expected).abs() < 1e-9);
    }

    #[test]
    fn identical_maps_score_one() {
        let device = Default::default();
        let a = labels(&device, [0, 1, 2, 0, 1, 2, 0, 1]);
        let b = labels(&device, [0, 1, 2, 0, 1, 2, 0, 1]);
        assert!((mean_iou(a.clone(), b.clone(), 3) - 1.0).abs() < 1e-9);
        assert!((mean_dice(a, b, 3) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn absent_classes_are_skipped_not_zeroed() {
        let device = Default::default();
        // Class 2 never occurs; it must not drag the mean down
        let a = labels(&device, [0, 0, 0, 0, 1, 1, 1, 1]);
        let b = labels(&device, [0, 0, 0, 0, 1, 1, 1, 1]);
        assert!((mean_iou(a, b, 3) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn hard_labels_argmax_and_threshold() {
        let device = Default::default();

        // Two channels: class 1 wins everywhere the second
        // channel's logit is larger
        let two = Tensor::<TestBackend, 1>::from_floats(
            [0.1, 0.9, 0.9, 0.1, 0.2, 0.8, 0.8, 0.2].as_slice(),
            &device,
        )
        .reshape([1, 2, 1, 2, 2]);
        let labels: Vec<i64> = hard_labels(two).into_data().to_vec().unwrap();
        assert_eq!(labels, vec![1, 0, 0, 1]);

        // Single channel: positive logits are foreground
        let one = Tensor::<TestBackend, 1>::from_floats(
            [-1.0, 2.0, 0.5, -0.5].as_slice(),
            &device,
        )
        .reshape([1, 1, 1, 2, 2]);
        let labels: Vec<i64> = hard_labels(one).into_data().to_vec().unwrap();
        assert_eq!(labels, vec![0, 1, 1, 0]);
    }

    #[test]
    fn segmentation_loss_is_finite_for_both_heads() {
        let device = Default::default();
        let masks = labels(&device, [0, 1, 0, 1, 0, 1, 0, 1]);

        let logits2 = Tensor::<TestBackend, 5>::random(
            [1, 2, 2, 2, 2],
            burn::tensor::Distribution::Default,
            &device,
        );
        let ce: f32 = segmentation_loss(logits2, masks.clone(), FinalActivation::Softmax)
            .into_scalar();
        assert!(ce.is_finite());

        let logits1 = Tensor::<TestBackend, 5>::random(
            [1, 1, 2, 2, 2],
            burn::tensor::Distribution::Default,
            &device,
        );
        let bce: f32 = segmentation_loss(logits1, masks, FinalActivation::Sigmoid).into_scalar();
        assert!(bce.is_finite());
    }
}
