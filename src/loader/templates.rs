use ndarray::{Array2, Array3, Axis, s};
use rayon::prelude::*;

use super::LoadError;

/// Drop the zero-padded prefix of width `padding` from the time axis.
pub fn strip_padding(templates: &Array3<f64>, padding: usize) -> Result<Array3<f64>, LoadError> {
    let time_len = templates.len_of(Axis(1));
    if padding > time_len {
        return Err(LoadError::PaddingTooWide { padding, time_len });
    }
    Ok(templates.slice(s![.., padding.., ..]).to_owned())
}

/// Right-multiply every (time × channel) template slice by `unwhitening`.
///
/// Templates are independent; each product is computed on the rayon pool and
/// written back at its own index.
pub fn unwhiten(templates: &Array3<f64>, unwhitening: &Array2<f64>) -> Result<Array3<f64>, LoadError> {
    let channels = templates.len_of(Axis(2));
    let (rows, cols) = unwhitening.dim();
    if rows != cols || rows != channels {
        return Err(LoadError::UnwhiteningShape {
            rows,
            cols,
            channels,
        });
    }

    let n_templates = templates.len_of(Axis(0));
    let slices: Vec<Array2<f64>> = (0..n_templates)
        .into_par_iter()
        .map(|t| templates.index_axis(Axis(0), t).dot(unwhitening))
        .collect();

    let mut out = Array3::zeros(templates.raw_dim());
    for (t, slice) in slices.into_iter().enumerate() {
        out.index_axis_mut(Axis(0), t).assign(&slice);
    }
    Ok(out)
}
