use std::{collections::HashMap, fs, path::Path};

use log::debug;
use ml_core::Snapshot;
use safetensors::{Dtype, SafeTensors, tensor::TensorView};

use crate::{MlError, Result};

const PARAMS: &str = "params";
const EPOCH: &str = "epoch";
const VAL_LOSS: &str = "val_loss";

/// Writes `snapshot` to `path` as a safetensors file.
///
/// The parameters are stored in a single flat `params` tensor and the epoch and validation
/// loss in the file's metadata.
pub fn save<P: AsRef<Path>>(path: P, snapshot: &Snapshot) -> Result<()> {
    let tensor = TensorView::new(
        Dtype::F32,
        vec![snapshot.params().len()],
        bytemuck::cast_slice(snapshot.params()),
    )
    .map_err(format_err)?;

    let metadata = HashMap::from([
        (EPOCH.to_string(), snapshot.epoch().to_string()),
        (VAL_LOSS.to_string(), snapshot.val_loss().to_string()),
    ]);

    safetensors::serialize_to_file([(PARAMS, tensor)], &Some(metadata), path.as_ref())
        .map_err(format_err)?;

    debug!(
        epoch = snapshot.epoch(),
        params = snapshot.params().len();
        "saved checkpoint"
    );

    Ok(())
}

/// Reads a snapshot written by `save`.
pub fn load<P: AsRef<Path>>(path: P) -> Result<Snapshot> {
    let bytes = fs::read(path)?;

    let (_, header) = SafeTensors::read_metadata(&bytes).map_err(format_err)?;
    let metadata = header
        .metadata()
        .as_ref()
        .ok_or_else(|| MlError::Format("checkpoint has no metadata".into()))?;

    let epoch = metadata_value(metadata, EPOCH)?;
    let val_loss = metadata_value(metadata, VAL_LOSS)?;

    let tensors = SafeTensors::deserialize(&bytes).map_err(format_err)?;
    let params = tensors.tensor(PARAMS).map_err(format_err)?;

    if params.dtype() != Dtype::F32 || params.shape().len() != 1 {
        return Err(MlError::Format(format!(
            "`{PARAMS}` must be a flat F32 tensor, got {:?} {:?}",
            params.dtype(),
            params.shape()
        )));
    }

    // The tensor data isn't necessarily aligned for f32, so it's copied byte-wise.
    let mut buf = vec![0f32; params.shape()[0]];
    bytemuck::cast_slice_mut(&mut buf).copy_from_slice(params.data());

    Ok(Snapshot::from_parts(epoch, val_loss, buf.into()))
}

fn metadata_value<T: std::str::FromStr>(metadata: &HashMap<String, String>, key: &str) -> Result<T> {
    metadata
        .get(key)
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| MlError::Format(format!("checkpoint metadata `{key}` is missing or invalid")))
}

fn format_err<E: std::fmt::Display>(e: E) -> MlError {
    MlError::Format(e.to_string())
}
