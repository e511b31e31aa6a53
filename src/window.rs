use ndarray::{s, Array2};

use crate::error::{Result, TaggerError};
use crate::network::{Activation, Layer, LayerContext};
use crate::optimizer::{Optimizer, ParamKey};

fn check_lengths(lengths: &[usize], rows: usize) -> Result<()> {
    let total: usize = lengths.iter().sum();
    if total != rows {
        return Err(TaggerError::BatchLengths { rows, total });
    }
    Ok(())
}

/// Concatenates each row with its `n` left and `n` right neighbours inside the
/// same sentence. Positions past a sentence edge are zero.
///
/// Output slot `k` (of `2n + 1`) holds the token at offset `k - n`.
pub fn extract_windows(input: &Array2<f32>, lengths: &[usize], n: usize) -> Result<Array2<f32>> {
    let (rows, width) = input.dim();
    check_lengths(lengths, rows)?;
    let mut output = Array2::zeros((rows, width * (2 * n + 1)));
    let mut start = 0;
    for &len in lengths {
        for i in 0..len {
            for slot in 0..=2 * n {
                let Some(j) = (i + slot).checked_sub(n) else { continue };
                if j >= len {
                    continue;
                }
                output
                    .slice_mut(s![start + i, slot * width..(slot + 1) * width])
                    .assign(&input.row(start + j));
            }
        }
        start += len;
    }
    Ok(output)
}

/// Gradient of [`extract_windows`]: each window slot is routed back to the
/// token it was copied from.
pub fn backprop_windows(grads: &Array2<f32>, lengths: &[usize], n: usize) -> Result<Array2<f32>> {
    let (rows, window_width) = grads.dim();
    check_lengths(lengths, rows)?;
    let width = window_width / (2 * n + 1);
    let mut d_input = Array2::zeros((rows, width));
    let mut start = 0;
    for &len in lengths {
        for i in 0..len {
            for slot in 0..=2 * n {
                let Some(j) = (i + slot).checked_sub(n) else { continue };
                if j >= len {
                    continue;
                }
                let mut target = d_input.row_mut(start + j);
                target += &grads.slice(s![start + i, slot * width..(slot + 1) * width]);
            }
        }
        start += len;
    }
    Ok(d_input)
}

/// Window extraction over dense rows. Has no parameters.
pub struct ExtractWindow {
    n: usize,
    nr_in: usize,
}

impl ExtractWindow {
    pub fn new(n: usize, nr_in: usize) -> Self {
        ExtractWindow { n, nr_in }
    }
}

impl Layer for ExtractWindow {
    fn layer_type(&self) -> &str {
        "ExtractWindow"
    }

    fn nr_in(&self) -> usize {
        self.nr_in
    }

    fn nr_out(&self) -> usize {
        self.nr_in * (2 * self.n + 1)
    }

    fn forward(&self, input: &Activation) -> Result<(Activation, LayerContext)> {
        let values = input.dense(self.layer_type())?;
        let lengths = input.lengths().to_vec();
        let output = extract_windows(values, &lengths, self.n)?;
        Ok((
            Activation::Dense { values: output, lengths: lengths.clone() },
            LayerContext::Window { lengths },
        ))
    }

    fn backward(&mut self, context: LayerContext, grads: &Array2<f32>) -> Result<Option<Array2<f32>>> {
        let LayerContext::Window { lengths } = context else {
            return Err(TaggerError::ContextMismatch(self.layer_type().to_string()));
        };
        backprop_windows(grads, &lengths, self.n).map(Some)
    }

    fn update(&mut self, _key: &ParamKey, _optimizer: &mut Optimizer) {}

    fn zero_gradients(&mut self) {}

    fn parameters(&self) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn windows_stop_at_sentence_edges() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0]];
        let out = extract_windows(&x, &[3, 2], 1).unwrap();
        assert_eq!(
            out,
            array![
                [0.0, 1.0, 2.0],
                [1.0, 2.0, 3.0],
                [2.0, 3.0, 0.0],
                [0.0, 4.0, 5.0],
                [4.0, 5.0, 0.0],
            ]
        );
    }

    #[test]
    fn backprop_counts_each_use() {
        let grads = Array2::ones((3, 3));
        let d = backprop_windows(&grads, &[3], 1).unwrap();
        // edge tokens appear in two windows, the middle one in three
        assert_eq!(d, array![[2.0], [3.0], [2.0]]);
    }

    #[test]
    fn lengths_must_cover_rows() {
        let x = Array2::<f32>::zeros((4, 2));
        assert!(extract_windows(&x, &[3], 1).is_err());
    }
}
