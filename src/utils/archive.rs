//! Zip extraction.

use std::{
    fs::{self, File},
    io,
    path::{Path, PathBuf},
};

use log::{debug, trace};
use zip::ZipArchive;

use crate::error::{Error, Result};

/// Extracts `archive` into `dest` and returns the paths of the extracted
/// entries in archive order. Entries that would land outside of `dest` are
/// rejected before anything of theirs is written.
pub(crate) fn unzip_file(archive: &Path, dest: &Path) -> Result<Vec<PathBuf>> {
    let mut zip = ZipArchive::new(File::open(archive)?)?;
    let mut extracted = Vec::with_capacity(zip.len());
    debug!(
        "extracting {} entries from {} into {}",
        zip.len(),
        archive.display(),
        dest.display()
    );

    for index in 0..zip.len() {
        let mut entry = zip.by_index(index)?;
        let relative = entry
            .enclosed_name()
            .map(Path::to_path_buf)
            .ok_or_else(|| Error::IllegalArchivePath(entry.name().to_owned()))?;
        let out_path = dest.join(relative);
        trace!("  {}", out_path.display());
        extracted.push(out_path.clone());

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&out_path)?;
        io::copy(&mut entry, &mut out)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                fs::set_permissions(&out_path, fs::Permissions::from_mode(mode))?;
            }
        }
    }

    Ok(extracted)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::scratch_dir;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use zip::{write::FileOptions, CompressionMethod, ZipWriter};

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let mut zip = ZipWriter::new(File::create(path).unwrap());
        let options = FileOptions::default()
            .compression_method(CompressionMethod::Stored)
            .unix_permissions(0o755);
        for (name, data) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn extracts_in_archive_order() {
        let dir = scratch_dir("unzip-order");
        let archive = dir.join("update.zip");
        write_zip(
            &archive,
            &[("HEXUploaderCLI", b"new binary"), ("docs/README.txt", b"hi")],
        );

        let out = dir.join("out");
        fs::create_dir_all(&out).unwrap();
        let files = unzip_file(&archive, &out).unwrap();

        assert_eq!(
            files,
            vec![out.join("HEXUploaderCLI"), out.join("docs").join("README.txt")]
        );
        assert_eq!(fs::read(&files[0]).unwrap(), b"new binary");
        assert_eq!(fs::read(&files[1]).unwrap(), b"hi");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&files[0]).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }

    #[test]
    fn rejects_entries_escaping_destination() {
        let dir = scratch_dir("unzip-escape");
        let archive = dir.join("evil.zip");
        write_zip(&archive, &[("../evil", b"gotcha")]);

        let out = dir.join("out");
        fs::create_dir_all(&out).unwrap();
        assert!(matches!(
            unzip_file(&archive, &out),
            Err(Error::IllegalArchivePath(ref name)) if name == "../evil"
        ));
        assert!(!dir.join("evil").exists());
    }

    #[test]
    fn garbage_is_not_an_archive() {
        let dir = scratch_dir("unzip-garbage");
        let archive = dir.join("update.zip");
        fs::write(&archive, b"this is not a zip file").unwrap();
        assert!(matches!(unzip_file(&archive, &dir), Err(Error::Zip(_))));
    }
}
