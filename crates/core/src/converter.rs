// SPDX-License-Identifier: MIT

//! The `Converter` contract: an opaque bytes-to-bytes file transform.
//!
//! The core treats transcoding as a black box: it only needs `run(src, dst)`
//! to be blocking and CPU-bound, and
//! `extension()` to know what suffix a rewritten destination should carry.
//! `Pydub` shells out to an external `ffmpeg` binary on `PATH` — the real
//! codec work stays outside this crate entirely.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::process::Command;
use thiserror::Error;

/// Tag-only variant of [`Converter`], mirrored in the wire protocol so the
/// daemon can describe a queued convert task without re-serializing fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConverterKind {
    Copy,
    Pydub,
}

/// A file transform. `Copy` reproduces `src` byte for byte; `Pydub` shells
/// out to `ffmpeg` with the given format/codec/bitrate parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Converter {
    #[serde(rename = "copy")]
    Copy,
    #[serde(rename = "pydub")]
    Pydub {
        format: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        codec: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bitrate: Option<String>,
        #[serde(default)]
        extra_params: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id3v2_version: Option<u8>,
        #[serde(default)]
        remove_album_art: bool,
    },
}

#[derive(Debug, Error)]
pub enum ConverterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ffmpeg exited with {status}: {stderr}")]
    ProcessFailed { status: String, stderr: String },

    #[error("ffmpeg binary not found on PATH")]
    MissingBinary,
}

impl Converter {
    pub fn kind(&self) -> ConverterKind {
        match self {
            Converter::Copy => ConverterKind::Copy,
            Converter::Pydub { .. } => ConverterKind::Pydub,
        }
    }

    /// File extension this converter's output should carry, if it rewrites
    /// the destination suffix. `Copy` never rewrites the suffix.
    pub fn extension(&self) -> Option<&str> {
        match self {
            Converter::Copy => None,
            Converter::Pydub { format, .. } => Some(format.as_str()),
        }
    }

    /// Run the transform. Blocking and CPU-bound; callers that need to stay
    /// responsive should run this on a blocking-friendly executor.
    pub fn run(&self, src: &Path, dst: &Path) -> Result<(), ConverterError> {
        if let Some(parent) = dst.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        match self {
            Converter::Copy => {
                fs::copy(src, dst)?;
                Ok(())
            }
            Converter::Pydub {
                format,
                codec,
                bitrate,
                extra_params,
                id3v2_version,
                remove_album_art,
            } => {
                let mut cmd = Command::new("ffmpeg");
                cmd.arg("-y").arg("-i").arg(src);

                if *remove_album_art {
                    cmd.arg("-vn");
                }
                if let Some(codec) = codec {
                    cmd.arg("-codec:a").arg(codec);
                }
                if let Some(bitrate) = bitrate {
                    cmd.arg("-b:a").arg(bitrate);
                }
                if let Some(v) = id3v2_version {
                    cmd.arg("-id3v2_version").arg(v.to_string());
                }
                for param in extra_params {
                    cmd.arg(param);
                }
                cmd.arg("-f").arg(format).arg(dst);

                let output = cmd.output().map_err(|e| {
                    if e.kind() == std::io::ErrorKind::NotFound {
                        ConverterError::MissingBinary
                    } else {
                        ConverterError::Io(e)
                    }
                })?;

                if !output.status.success() {
                    return Err(ConverterError::ProcessFailed {
                        status: output.status.to_string(),
                        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                    });
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
#[path = "converter_tests.rs"]
mod tests;
