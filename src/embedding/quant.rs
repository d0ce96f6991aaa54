use crate::constants::QUANT_SCALE;

/// Quantizes one value: `round(clip(x * 127, -127, 127))`, ties to even.
#[inline]
fn quantize_value(x: f32) -> i8 {
    if !x.is_finite() {
        return 0;
    }
    (x * QUANT_SCALE).clamp(-QUANT_SCALE, QUANT_SCALE).round_ties_even() as i8
}

/// Quantizes a vector to symmetric int8.
pub fn quantize_int8(v: &[f32]) -> Vec<i8> {
    v.iter().map(|&x| quantize_value(x)).collect()
}

/// Quantizes rows into one row-major int8 buffer.
pub fn quantize_rows<R: AsRef<[f32]>>(rows: &[R]) -> Vec<i8> {
    rows.iter()
        .flat_map(|row| row.as_ref().iter().map(|&x| quantize_value(x)))
        .collect()
}

/// Inverse of [`quantize_int8`] (up to quantization error).
pub fn dequantize_int8(q: &[i8]) -> Vec<f32> {
    q.iter().map(|&x| x as f32 / QUANT_SCALE).collect()
}
