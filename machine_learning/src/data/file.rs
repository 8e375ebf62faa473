use std::{
    collections::HashMap,
    fmt::Display,
    fs::File,
    io::{Read, Seek, SeekFrom},
    ops::Range,
    path::Path,
};

use log::debug;
use ndarray::{Array1, Array2};
use safetensors::{Dtype, tensor::TensorView};
use serde::Deserialize;

use super::dataset::{Batch, Dataset, SampleSource, check_range, check_weights};
use crate::{MlError, Result};

const POINTS: &str = "points";
const WEIGHTS: &str = "weights";
const F32_SIZE: u64 = size_of::<f32>() as u64;
const MAX_HEADER_LEN: u64 = 100 * 1024 * 1024;

/// A tensor entry of a safetensors header.
#[derive(Debug, Deserialize)]
struct TensorHeader {
    dtype: String,
    shape: Vec<usize>,
    data_offsets: (u64, u64),
}

/// A sample source backed by a safetensors file that is never loaded whole.
///
/// The file must hold an `F32` tensor named `points` with shape `[n, dim]` and may
/// hold an `F32` tensor named `weights` with shape `[n]`; without it every sample
/// weighs 1. The header is parsed once on `open`, every `rows` call seeks and reads
/// just the requested rows, and the file is closed when the `FileDataset` is dropped.
#[derive(Debug)]
pub struct FileDataset {
    file: File,
    len: usize,
    dim: usize,
    points_offset: u64,
    weights_offset: Option<u64>,
}

impl FileDataset {
    /// Opens a dataset file and validates its layout.
    ///
    /// # Arguments
    /// * `path` - The path to the safetensors file.
    ///
    /// # Errors
    /// Returns an error if the file can't be read or doesn't follow the expected layout.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path.as_ref())?;

        let mut len_buf = [0; 8];
        file.read_exact(&mut len_buf)?;
        let header_len = u64::from_le_bytes(len_buf);

        if header_len > MAX_HEADER_LEN {
            return Err(MlError::Format(format!(
                "header of {header_len} bytes is too large"
            )));
        }

        let mut header = vec![0; header_len as usize];
        file.read_exact(&mut header)?;
        let mut entries: HashMap<String, serde_json::Value> =
            serde_json::from_slice(&header).map_err(format_err)?;

        let data_start = 8 + header_len;
        let points = take_tensor(&mut entries, POINTS)?
            .ok_or_else(|| MlError::Format(format!("missing `{POINTS}` tensor")))?;

        let &[len, dim] = points.shape.as_slice() else {
            return Err(MlError::Format(format!(
                "`{POINTS}` must have 2 dimensions, got shape {:?}",
                points.shape
            )));
        };
        let elems = len.checked_mul(dim).ok_or_else(|| {
            MlError::Format(format!("`{POINTS}` shape [{len}, {dim}] is too large"))
        })?;
        check_extent(&points, POINTS, elems)?;

        let weights_offset = match take_tensor(&mut entries, WEIGHTS)? {
            Some(weights) => {
                if weights.shape != [len] {
                    return Err(MlError::Format(format!(
                        "`{WEIGHTS}` must have shape [{len}], got {:?}",
                        weights.shape
                    )));
                }

                check_extent(&weights, WEIGHTS, len)?;
                Some(absolute_offset(data_start, &weights, WEIGHTS)?)
            }
            None => None,
        };

        debug!(len = len, dim = dim, weighted = weights_offset.is_some(); "opened dataset file");

        Ok(Self {
            file,
            len,
            dim,
            points_offset: absolute_offset(data_start, &points, POINTS)?,
            weights_offset,
        })
    }

    /// Writes `dataset` to `path` in the layout `open` expects.
    ///
    /// # Errors
    /// Returns an error if the file can't be written.
    pub fn write<P: AsRef<Path>>(path: P, dataset: &Dataset) -> Result<()> {
        let (points_view, weights_view) = (dataset.points(), dataset.weights());
        let points = points_view.as_standard_layout();
        let weights = weights_view.as_standard_layout();

        let points_data = points
            .as_slice()
            .ok_or(MlError::InvalidInput("points are not contiguous"))?;
        let weights_data = weights
            .as_slice()
            .ok_or(MlError::InvalidInput("weights are not contiguous"))?;

        let tensors = [
            (
                POINTS,
                TensorView::new(
                    Dtype::F32,
                    vec![dataset.len(), dataset.dim()],
                    bytemuck::cast_slice(points_data),
                )
                .map_err(format_err)?,
            ),
            (
                WEIGHTS,
                TensorView::new(
                    Dtype::F32,
                    vec![dataset.len()],
                    bytemuck::cast_slice(weights_data),
                )
                .map_err(format_err)?,
            ),
        ];

        safetensors::serialize_to_file(tensors, &None, path.as_ref()).map_err(format_err)
    }

    /// Reads every sample into memory.
    pub fn load(&self) -> Result<Dataset> {
        let (points, weights) = self.rows(0..self.len)?.into_owned();
        Dataset::new(points, weights)
    }

    /// Reads `n` little-endian `f32`s starting at `offset`.
    fn read_f32s(&self, offset: u64, n: usize) -> Result<Vec<f32>> {
        let mut buf = vec![0f32; n];

        let mut file = &self.file;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(bytemuck::cast_slice_mut(&mut buf))?;

        if cfg!(target_endian = "big") {
            for v in &mut buf {
                *v = f32::from_bits(u32::from_le(v.to_bits()));
            }
        }

        Ok(buf)
    }
}

impl SampleSource for FileDataset {
    fn len(&self) -> usize {
        self.len
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn rows(&self, range: Range<usize>) -> Result<Batch<'_>> {
        check_range(&range, self.len)?;
        let n = range.len();

        let offset = self.points_offset + (range.start * self.dim) as u64 * F32_SIZE;
        let points = self.read_f32s(offset, n * self.dim)?;
        let points = Array2::from_shape_vec((n, self.dim), points)
            .map_err(|_| MlError::InvalidInput("points are not a (n, dim) matrix"))?;

        let weights = match self.weights_offset {
            Some(base) => Array1::from(self.read_f32s(base + range.start as u64 * F32_SIZE, n)?),
            None => Array1::ones(n),
        };
        check_weights(weights.view())?;

        Ok(Batch::owned(points, weights))
    }
}

fn take_tensor(
    entries: &mut HashMap<String, serde_json::Value>,
    name: &str,
) -> Result<Option<TensorHeader>> {
    let Some(value) = entries.remove(name) else {
        return Ok(None);
    };

    let header: TensorHeader = serde_json::from_value(value).map_err(format_err)?;
    if header.dtype != "F32" {
        return Err(MlError::Format(format!(
            "`{name}` must be F32, got {}",
            header.dtype
        )));
    }

    Ok(Some(header))
}

fn check_extent(header: &TensorHeader, name: &str, elems: usize) -> Result<()> {
    let (start, end) = header.data_offsets;
    let expected = (elems as u64)
        .checked_mul(F32_SIZE)
        .ok_or_else(|| MlError::Format(format!("`{name}` holds too many elements")))?;

    if end < start || end - start != expected {
        return Err(MlError::Format(format!(
            "`{name}` spans {} bytes, expected {expected}",
            end.saturating_sub(start)
        )));
    }

    Ok(())
}

fn absolute_offset(data_start: u64, header: &TensorHeader, name: &str) -> Result<u64> {
    data_start
        .checked_add(header.data_offsets.0)
        .ok_or_else(|| MlError::Format(format!("`{name}` starts past the end of any file")))
}

fn format_err<E: Display>(e: E) -> MlError {
    MlError::Format(e.to_string())
}
