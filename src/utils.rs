//! Helper functions for downloads and archives.

mod archive;
mod download;

pub(crate) use archive::unzip_file;
pub(crate) use download::download_file;

/// A fresh, empty directory under the OS temp root for tests that touch the
/// filesystem.
#[cfg(test)]
pub(crate) fn scratch_dir(name: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "hexuploader-test-{}-{}",
        name,
        std::process::id()
    ));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
