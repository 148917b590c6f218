//! Library and application errors.
//!
//! The `Display` text of every variant is what ends up on the status line, so
//! it is written for the person holding the board, not for a developer.

use std::io;

use thiserror::Error;

use crate::settings::AppVariant;

/// All possible errors returned by the uploader
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("{0}")]
    Io(#[from] io::Error),

    #[error("download: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid release listing: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid update archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("{0}: illegal filepath")]
    IllegalArchivePath(String),

    #[error("update archive is empty")]
    EmptyArchive,

    #[error("error downloading file {url} (HTTP {status})")]
    DownloadFailed { url: String, status: u16 },

    #[error("unable to update {variant} apps on {os}")]
    UnsupportedPlatform { variant: AppVariant, os: String },

    #[error("unknown app type `{0}`")]
    UnknownAppVariant(String),

    #[error("could not resolve the running executable")]
    ExecutableNotFound,

    #[error("updated app failed to start: {0}")]
    RelaunchFailed(String),

    #[error("{0}")]
    Toolchain(String),

    #[error("port {0} is no longer attached")]
    PortGone(String),
}

pub type Result<T> = std::result::Result<T, Error>;
