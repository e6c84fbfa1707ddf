use ndarray::ArrayD;
use ndarray_npy::{ReadNpyError, ReadNpyExt, ReadableElement};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArrayError {
    #[error("Array not found: {}", path.display())]
    NotFound { path: PathBuf },
    #[error("IO error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed npy file {}: {source}", path.display())]
    Npy {
        path: PathBuf,
        #[source]
        source: ReadNpyError,
    },
    #[error("Unsupported dtype in {} (wanted {wanted})", path.display())]
    Dtype { path: PathBuf, wanted: &'static str },
    #[error("Value {value} in {} does not fit in i64", path.display())]
    Overflow { path: PathBuf, value: u64 },
}

impl ArrayError {
    /// True when the array file itself is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ArrayError::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, ArrayError>;

/// Conventional location of a named array.
pub fn array_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(name)
}

/// Load `<dir>/<name>` as a floating point array. Any numeric dtype is widened to f64.
pub fn load_float(dir: &Path, name: &str) -> Result<ArrayD<f64>> {
    let path = array_path(dir, name);
    let bytes = read_bytes(&path)?;

    let wrap = |source| ArrayError::Npy {
        path: path.clone(),
        source,
    };

    if let Some(arr) = read_as::<f64, _>(&bytes, |v| v).map_err(wrap)? {
        return Ok(arr);
    }
    if let Some(arr) = read_as::<f32, _>(&bytes, f64::from).map_err(wrap)? {
        return Ok(arr);
    }
    // Sample-count timestamps are stored as unsigned integers
    if let Some(arr) = read_as::<u64, _>(&bytes, |v| v as f64).map_err(wrap)? {
        return Ok(arr);
    }
    if let Some(arr) = read_int_widened(&bytes, &path)? {
        return Ok(arr.mapv(|v| v as f64));
    }

    Err(ArrayError::Dtype {
        path,
        wanted: "numeric",
    })
}

/// Load `<dir>/<name>` as an integer array. Floating point data is rejected.
pub fn load_int(dir: &Path, name: &str) -> Result<ArrayD<i64>> {
    let path = array_path(dir, name);
    let bytes = read_bytes(&path)?;

    if let Some(arr) = read_int_widened(&bytes, &path)? {
        return Ok(arr);
    }

    let raw = read_as::<u64, _>(&bytes, |v| v).map_err(|source| ArrayError::Npy {
        path: path.clone(),
        source,
    })?;
    if let Some(arr) = raw {
        if let Some(&value) = arr.iter().find(|&&v| v > i64::MAX as u64) {
            return Err(ArrayError::Overflow { path, value });
        }
        return Ok(arr.mapv(|v| v as i64));
    }

    Err(ArrayError::Dtype {
        path,
        wanted: "integer",
    })
}

fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    log::debug!("Reading {}", path.display());
    std::fs::read(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            ArrayError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            ArrayError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })
}

/// Signed and narrow unsigned integer dtypes, all lossless in i64.
fn read_int_widened(bytes: &[u8], path: &Path) -> Result<Option<ArrayD<i64>>> {
    let attempt = || -> std::result::Result<Option<ArrayD<i64>>, ReadNpyError> {
        if let Some(arr) = read_as::<i64, _>(bytes, |v| v)? {
            return Ok(Some(arr));
        }
        if let Some(arr) = read_as::<i32, _>(bytes, i64::from)? {
            return Ok(Some(arr));
        }
        if let Some(arr) = read_as::<u32, _>(bytes, i64::from)? {
            return Ok(Some(arr));
        }
        if let Some(arr) = read_as::<i16, _>(bytes, i64::from)? {
            return Ok(Some(arr));
        }
        if let Some(arr) = read_as::<u16, _>(bytes, i64::from)? {
            return Ok(Some(arr));
        }
        if let Some(arr) = read_as::<i8, _>(bytes, i64::from)? {
            return Ok(Some(arr));
        }
        read_as::<u8, _>(bytes, i64::from)
    };
    attempt().map_err(|source| ArrayError::Npy {
        path: path.to_path_buf(),
        source,
    })
}

/// Try one element type. `Ok(None)` means the header names a different dtype.
fn read_as<T, U>(
    bytes: &[u8],
    widen: impl Fn(T) -> U,
) -> std::result::Result<Option<ArrayD<U>>, ReadNpyError>
where
    T: ReadableElement + Copy,
{
    match ArrayD::<T>::read_npy(bytes) {
        Ok(arr) => Ok(Some(arr.mapv(widen))),
        Err(ReadNpyError::WrongDescriptor(_)) => Ok(None),
        Err(e) => Err(e),
    }
}
