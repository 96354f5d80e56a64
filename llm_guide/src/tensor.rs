//! A capability table over whatever numeric backend a host uses (spec
//! §4.H), replacing the dynamic dispatch across tensor libraries this
//! workspace's original grammar components threaded through a shared base
//! class (spec §9). [`crate::processor::LogitsProcessor`] is parameterised
//! by this trait and never touches tensor internals directly.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TensorError {
    #[error("no tensor backend registered for {backend}")]
    BackendUnavailable { backend: String },
}

/// One implementation per backend. Implementations MUST be pure except for
/// the masked output they return: mutating an input tensor in place is only
/// allowed on the `logits` return path, and only where documented.
pub trait TensorBackend {
    type Tensor: Clone;

    fn shape(&self, tensor: &Self::Tensor) -> Vec<usize>;
    fn unsqueeze_batch(&self, tensor: Self::Tensor) -> Self::Tensor;
    fn squeeze_batch(&self, tensor: Self::Tensor) -> Self::Tensor;
    fn to_list(&self, tensor: &Self::Tensor) -> Vec<f32>;
    fn full_like(&self, tensor: &Self::Tensor, value: f32) -> Self::Tensor;
    fn concat_rows(&self, rows: Vec<Self::Tensor>) -> Self::Tensor;
    fn boolean_ones_like(&self, tensor: &Self::Tensor) -> Vec<bool>;
    /// Sets every position where `mask[i]` is true to `masked_value`,
    /// leaving all other positions bit-for-bit unchanged.
    fn apply_mask(&self, tensor: &mut Self::Tensor, mask: &[bool], masked_value: f32);
    fn argsort_desc(&self, row: &[f32]) -> Vec<usize>;
    fn device_of(&self, tensor: &Self::Tensor) -> String;
    fn to_device(&self, tensor: Self::Tensor, device: &str) -> Self::Tensor;

    /// The most-negative finite value to use where the backend cannot
    /// represent true negative infinity (spec §6).
    fn negative_infinity(&self) -> f32 {
        f32::NEG_INFINITY
    }
}

/// A dependency-free reference backend over `Vec<Vec<f32>>` (batch of
/// rows). Used by the crate's own tests and by hosts with no tensor library
/// of their own; real backends (candle, burn, a raw device buffer) plug in
/// by implementing [`TensorBackend`] themselves.
#[derive(Clone, Copy, Debug, Default)]
pub struct VecBackend;

impl TensorBackend for VecBackend {
    type Tensor = Vec<Vec<f32>>;

    fn shape(&self, tensor: &Self::Tensor) -> Vec<usize> {
        let rows = tensor.len();
        let cols = tensor.first().map_or(0, Vec::len);
        vec![rows, cols]
    }

    fn unsqueeze_batch(&self, tensor: Self::Tensor) -> Self::Tensor {
        if tensor.len() == 1 {
            tensor
        } else {
            vec![tensor.into_iter().flatten().collect()]
        }
    }

    fn squeeze_batch(&self, tensor: Self::Tensor) -> Self::Tensor {
        tensor
    }

    fn to_list(&self, tensor: &Self::Tensor) -> Vec<f32> {
        tensor.iter().flatten().copied().collect()
    }

    fn full_like(&self, tensor: &Self::Tensor, value: f32) -> Self::Tensor {
        tensor.iter().map(|row| vec![value; row.len()]).collect()
    }

    fn concat_rows(&self, rows: Vec<Self::Tensor>) -> Self::Tensor {
        rows.into_iter().flatten().collect()
    }

    fn boolean_ones_like(&self, tensor: &Self::Tensor) -> Vec<bool> {
        vec![true; tensor.iter().map(Vec::len).sum()]
    }

    fn apply_mask(&self, tensor: &mut Self::Tensor, mask: &[bool], masked_value: f32) {
        let cols = tensor.first().map_or(0, Vec::len);
        for (row_idx, row) in tensor.iter_mut().enumerate() {
            for (col_idx, value) in row.iter_mut().enumerate() {
                let flat = row_idx * cols + col_idx;
                if mask.get(flat).copied().unwrap_or(false) {
                    *value = masked_value;
                }
            }
        }
    }

    fn argsort_desc(&self, row: &[f32]) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..row.len()).collect();
        indices.sort_by(|&a, &b| row[b].partial_cmp(&row[a]).unwrap_or(std::cmp::Ordering::Equal));
        indices
    }

    fn device_of(&self, _tensor: &Self::Tensor) -> String {
        "cpu".to_string()
    }

    fn to_device(&self, tensor: Self::Tensor, _device: &str) -> Self::Tensor {
        tensor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_mask_leaves_unmasked_positions_bit_for_bit() {
        let backend = VecBackend;
        let mut logits = vec![vec![1.0, 2.0, 3.0]];
        let mask = vec![true, false, true];
        backend.apply_mask(&mut logits, &mask, f32::NEG_INFINITY);
        assert_eq!(logits, vec![vec![f32::NEG_INFINITY, 2.0, f32::NEG_INFINITY]]);
    }

    #[test]
    fn argsort_desc_orders_highest_first() {
        let backend = VecBackend;
        assert_eq!(backend.argsort_desc(&[1.0, 3.0, 2.0]), vec![1, 2, 0]);
    }
}
