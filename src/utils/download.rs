//! HTTP downloads.

use std::{
    fs::{self, File},
    path::Path,
};

use log::{debug, info};
use reqwest::{blocking::Client, StatusCode};

use crate::error::{Error, Result};

/// Streams the body of `url` into a new file at `dest`. Anything but `200 OK`
/// is a failure and leaves no file behind.
pub(crate) fn download_file(client: &Client, url: &str, dest: &Path) -> Result<u64> {
    debug!("GET {}", url);
    let mut response = client.get(url).send()?;
    if response.status() != StatusCode::OK {
        return Err(Error::DownloadFailed {
            url: url.to_owned(),
            status: response.status().as_u16(),
        });
    }

    let mut out = File::create(dest)?;
    let written = match response.copy_to(&mut out) {
        Ok(written) => written,
        Err(e) => {
            drop(out);
            let _ = fs::remove_file(dest);
            return Err(e.into());
        }
    };
    info!("downloaded {} bytes to {}", written, dest.display());
    Ok(written)
}
