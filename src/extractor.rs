//! Archive extraction into the run's scratch directory.
//!
//! Extraction is all-or-nothing: the archive signature is checked before anything
//! is written, and any failure aborts the conversion. Partially extracted files are
//! removed together with the scratch directory.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use log::{debug, info};
use zip::ZipArchive;
use zip::result::ZipError;

use crate::error::{Error, Result};
use crate::types::ArchiveKind;

const ZIP_SIGNATURES: [&[u8]; 3] = [b"PK\x03\x04", b"PK\x05\x06", b"PK\x07\x08"];
const RAR_SIGNATURE: &[u8] = b"Rar!\x1a\x07";

/// Reads the first bytes of a file for signature sniffing.
fn read_magic(path: &Path) -> Result<Vec<u8>> {
    let mut file = File::open(path)?;
    let mut magic = Vec::with_capacity(8);
    file.by_ref().take(8).read_to_end(&mut magic)?;
    Ok(magic)
}

/// Returns true if the file starts with a zip local-file, empty-archive or spanning signature.
pub fn is_zip_file(path: &Path) -> Result<bool> {
    let magic = read_magic(path)?;
    Ok(ZIP_SIGNATURES.iter().any(|sig| magic.starts_with(sig)))
}

/// Returns true if the file starts with a RAR 4.x or 5.x signature.
pub fn is_rar_file(path: &Path) -> Result<bool> {
    Ok(read_magic(path)?.starts_with(RAR_SIGNATURE))
}

/// Extracts every entry of `archive` into `destination`.
///
/// # Arguments
///
/// * `archive` - Path to the `.zip/.cbz` or `.rar/.cbr` file
/// * `kind` - Container family, as decided by the classifier
/// * `destination` - Scratch directory; created if missing
///
/// # Errors
///
/// * [`Error::NotAValidArchive`] - The signature does not match `kind`
/// * [`Error::ExtractionIOError`] - Disk, permission or entry-name failures
pub fn extract_archive(archive: &Path, kind: ArchiveKind, destination: &Path) -> Result<()> {
    let signature_ok = match kind {
        ArchiveKind::Zip => is_zip_file(archive)?,
        ArchiveKind::Rar => is_rar_file(archive)?,
    };
    if !signature_ok {
        return Err(Error::NotAValidArchive(archive.to_path_buf(), kind.to_string()));
    }

    std::fs::create_dir_all(destination)
        .map_err(|e| Error::ExtractionIOError(destination.to_path_buf(), e.to_string()))?;

    info!("Extracting {} archive {:?}", kind, archive);
    match kind {
        ArchiveKind::Zip => extract_zip(archive, destination),
        ArchiveKind::Rar => extract_rar(archive, destination),
    }
}

fn extract_zip(archive_path: &Path, destination: &Path) -> Result<()> {
    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(file).map_err(|e| match e {
        ZipError::Io(io) => Error::ExtractionIOError(archive_path.to_path_buf(), io.to_string()),
        other => Error::NotAValidArchive(archive_path.to_path_buf(), format!("zip ({})", other)),
    })?;

    // Refuse the whole archive if any entry would land outside the scratch directory.
    for i in 0..archive.len() {
        let entry = archive.by_index_raw(i)?;
        if entry.enclosed_name().is_none() {
            return Err(Error::ExtractionIOError(
                archive_path.to_path_buf(),
                format!("entry '{}' escapes the extraction directory", entry.name()),
            ));
        }
    }

    let entry_count = archive.len();
    archive.extract(destination).map_err(|e| match e {
        ZipError::Io(io) => Error::ExtractionIOError(archive_path.to_path_buf(), io.to_string()),
        other => Error::ExtractionIOError(archive_path.to_path_buf(), other.to_string()),
    })?;

    debug!("Extracted {} zip entries into {:?}", entry_count, destination);
    Ok(())
}

#[cfg(feature = "rar")]
fn extract_rar(archive_path: &Path, destination: &Path) -> Result<()> {
    let to_error =
        |e: unrar::error::UnrarError| Error::ExtractionIOError(archive_path.to_path_buf(), e.to_string());

    let mut archive = unrar::Archive::new(archive_path)
        .open_for_processing()
        .map_err(to_error)?;

    let mut entry_count = 0usize;
    while let Some(header) = archive.read_header().map_err(to_error)? {
        archive = if header.entry().is_file() {
            entry_count += 1;
            header.extract_with_base(destination).map_err(to_error)?
        } else {
            header.skip().map_err(to_error)?
        };
    }

    debug!("Extracted {} rar entries into {:?}", entry_count, destination);
    Ok(())
}

#[cfg(not(feature = "rar"))]
fn extract_rar(archive_path: &Path, _destination: &Path) -> Result<()> {
    Err(Error::ExtractionIOError(
        archive_path.to_path_buf(),
        "this build does not include RAR support (enable the `rar` feature)".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::ZipWriter;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let mut zip = ZipWriter::new(File::create(path).unwrap());
        for (name, data) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_extract_zip_with_nested_directories() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("vol.cbz");
        write_zip(
            &archive,
            &[("001.jpg", b"one"), ("chapter 2/002.png", b"two")],
        );

        let out = dir.path().join("out");
        extract_archive(&archive, ArchiveKind::Zip, &out).unwrap();

        assert_eq!(std::fs::read(out.join("001.jpg")).unwrap(), b"one");
        assert_eq!(std::fs::read(out.join("chapter 2").join("002.png")).unwrap(), b"two");
    }

    #[test]
    fn test_signature_mismatch_is_rejected_before_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("fake.cbz");
        std::fs::write(&fake, b"definitely not a zip").unwrap();

        let out = dir.path().join("out");
        let result = extract_archive(&fake, ArchiveKind::Zip, &out);
        assert!(matches!(result, Err(Error::NotAValidArchive(..))));
        assert!(!out.exists());

        // A zip renamed to .cbr is not a RAR archive either.
        let zip_as_rar = dir.path().join("renamed.cbr");
        write_zip(&zip_as_rar, &[("001.jpg", b"one")]);
        assert!(matches!(
            extract_archive(&zip_as_rar, ArchiveKind::Rar, &out),
            Err(Error::NotAValidArchive(..))
        ));
    }

    #[test]
    fn test_signature_sniffing() {
        let dir = tempfile::tempdir().unwrap();
        let rar = dir.path().join("a.rar");
        std::fs::write(&rar, b"Rar!\x1a\x07\x01\x00rest").unwrap();
        assert!(is_rar_file(&rar).unwrap());
        assert!(!is_zip_file(&rar).unwrap());

        let empty = dir.path().join("empty");
        std::fs::write(&empty, b"").unwrap();
        assert!(!is_rar_file(&empty).unwrap());
    }
}
