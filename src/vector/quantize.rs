//! Reduced-precision storage for index vectors.

use std::borrow::Cow;

use bincode::{Decode, Encode};

use crate::vector::types::Quantization;

/// A vector as held by the index, in its configured precision.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub enum StoredVector {
    F32(Vec<f32>),
    Bf16(Vec<u16>),
    I8 { scale: f32, values: Vec<i8> },
}

impl StoredVector {
    pub fn quantize(vector: &[f32], quantization: Quantization) -> Self {
        match quantization {
            Quantization::F32 => Self::F32(vector.to_vec()),
            Quantization::Bf16 => Self::Bf16(vector.iter().copied().map(to_bf16).collect()),
            Quantization::I8 => {
                let max_abs = vector.iter().fold(0.0f32, |acc, v| acc.max(v.abs()));
                let scale = if max_abs > 0.0 { max_abs / 127.0 } else { 1.0 };
                let values = vector
                    .iter()
                    .map(|v| (v / scale).round().clamp(-127.0, 127.0) as i8)
                    .collect();
                Self::I8 { scale, values }
            }
        }
    }

    /// The vector widened back to f32. Borrows when already stored as f32.
    pub fn as_f32(&self) -> Cow<'_, [f32]> {
        match self {
            Self::F32(values) => Cow::Borrowed(values),
            Self::Bf16(values) => Cow::Owned(values.iter().copied().map(from_bf16).collect()),
            Self::I8 { scale, values } => {
                Cow::Owned(values.iter().map(|&v| f32::from(v) * scale).collect())
            }
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::F32(values) => values.len(),
            Self::Bf16(values) => values.len(),
            Self::I8 { values, .. } => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Round-to-nearest-even truncation of an f32 to its upper 16 bits.
fn to_bf16(value: f32) -> u16 {
    if value.is_nan() {
        return 0x7FC0;
    }
    let bits = value.to_bits();
    let rounding = 0x7FFF + ((bits >> 16) & 1);
    (bits.wrapping_add(rounding) >> 16) as u16
}

fn from_bf16(value: u16) -> f32 {
    f32::from_bits(u32::from(value) << 16)
}
