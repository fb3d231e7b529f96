// ── Push payload decoder ──
//
// A device-state push arrives as base64 of JSON `{dev, args}`, where `args`
// is base64 of gzip-compressed model JSON. Each step fails independently
// with its own reason tag; decode failures are logged by the caller and
// never reach the session's users.

use std::io::Read;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use flate2::read::GzDecoder;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::model::DigitalModel;

/// Why a push payload could not be decoded.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("outer payload is not valid base64: {0}")]
    OuterBase64(#[source] base64::DecodeError),

    #[error("outer payload is not a {{dev, args}} object: {0}")]
    OuterJson(#[source] serde_json::Error),

    #[error("args is not valid base64: {0}")]
    ArgsBase64(#[source] base64::DecodeError),

    #[error("args failed to decompress: {0}")]
    Decompress(#[source] std::io::Error),

    #[error("decompressed args are not JSON: {0}")]
    ModelJson(#[source] serde_json::Error),

    #[error("model has the wrong shape: {0}")]
    ModelShape(String),
}

impl DecodeError {
    /// Stable tag naming the step that failed.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::OuterBase64(_) => "outer_base64",
            Self::OuterJson(_) => "outer_json",
            Self::ArgsBase64(_) => "args_base64",
            Self::Decompress(_) => "decompress",
            Self::ModelJson(_) => "model_json",
            Self::ModelShape(_) => "model_shape",
        }
    }
}

#[derive(Deserialize)]
struct PushPayload {
    dev: String,
    args: String,
}

/// Decode a push payload into `(device_id, model)`.
pub fn decode(payload: &str) -> Result<(String, DigitalModel), DecodeError> {
    let outer = STANDARD
        .decode(payload.trim())
        .map_err(DecodeError::OuterBase64)?;
    let PushPayload { dev, args } =
        serde_json::from_slice(&outer).map_err(DecodeError::OuterJson)?;

    let compressed = STANDARD
        .decode(args.trim())
        .map_err(DecodeError::ArgsBase64)?;
    let mut json = Vec::new();
    GzDecoder::new(compressed.as_slice())
        .read_to_end(&mut json)
        .map_err(DecodeError::Decompress)?;

    let value: Value = serde_json::from_slice(&json).map_err(DecodeError::ModelJson)?;
    let model = DigitalModel::from_value_lenient(&value).map_err(DecodeError::ModelShape)?;
    Ok((dev, model))
}
