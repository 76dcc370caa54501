use candle_core::{DType, Device, Tensor};
use docqa_embed::masked_mean_l2;

#[test]
fn masked_tokens_do_not_contribute() {
    let dev = Device::Cpu;
    // One sequence of two tokens, hidden dim 4; the second token is padding.
    let h = Tensor::from_slice(&[1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0], (1, 2, 4), &dev).unwrap();
    let mask = Tensor::from_slice(&[1u32, 0u32], (1, 2), &dev).unwrap();
    let out: Vec<Vec<f32>> = masked_mean_l2(&h, &mask).unwrap().to_vec2().unwrap();

    let norm: f32 = (1.0f32 + 4.0 + 9.0 + 16.0).sqrt();
    for (a, b) in out[0].iter().zip([1.0 / norm, 2.0 / norm, 3.0 / norm, 4.0 / norm]) {
        assert!((a - b).abs() < 1e-5, "a={a} b={b}");
    }
}

#[test]
fn rows_are_pooled_independently() {
    let dev = Device::Cpu;
    let h = Tensor::from_slice(
        &[2.0f32, 0.0, 4.0, 0.0, 0.0, 3.0, 0.0, 9.0],
        (2, 2, 2),
        &dev,
    )
    .unwrap();
    let mask = Tensor::from_slice(&[1f32, 1.0, 1.0, 0.0], (2, 2), &dev).unwrap().to_dtype(DType::F32).unwrap();
    let out: Vec<Vec<f32>> = masked_mean_l2(&h, &mask).unwrap().to_vec2().unwrap();
    // Row 0: mean of [2,0] and [4,0] is [3,0]; row 1: only [0,3] counts.
    assert!((out[0][0] - 1.0).abs() < 1e-5 && out[0][1].abs() < 1e-5);
    assert!(out[1][0].abs() < 1e-5 && (out[1][1] - 1.0).abs() < 1e-5);
}

#[test]
fn non_three_dimensional_input_is_rejected() {
    let dev = Device::Cpu;
    let h = Tensor::zeros((2, 4), DType::F32, &dev).unwrap();
    let mask = Tensor::ones((2, 1), DType::F32, &dev).unwrap();
    assert!(masked_mean_l2(&h, &mask).is_err());
}
