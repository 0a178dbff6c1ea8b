//! Archive member access (zip family, tar, tgz, gz)

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Component, Path};

use flate2::read::GzDecoder;
use strata_kernel::resource::{ArchiveKind, ResourceError, ResourceResult};
use tracing::debug;

/// Most bytes preallocated from a size an archive header declares
const MAX_PREALLOC: u64 = 1 << 20;

/// Check that a member path stays inside its container.
pub fn is_safe_member(member: &str) -> bool {
    !member.is_empty()
        && Path::new(member)
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}

fn archive_error(path: &Path, message: impl ToString) -> ResourceError {
    ResourceError::Archive {
        uri: path.display().to_string(),
        message: message.to_string(),
    }
}

/// Read `member` from the archive at `path`.
///
/// Returns `Ok(None)` when the archive holds no such member.
pub fn read_member(kind: ArchiveKind, path: &Path, member: &str) -> ResourceResult<Option<Vec<u8>>> {
    if !is_safe_member(member) {
        return Ok(None);
    }
    debug!("Looking up {} in {} archive {:?}", member, kind, path);

    match kind {
        ArchiveKind::Zip => read_zip_member(path, member),
        ArchiveKind::Tar => {
            let file = BufReader::new(File::open(path)?);
            read_tar_member(file, path, member)
        }
        ArchiveKind::TarGz => {
            let file = BufReader::new(File::open(path)?);
            read_tar_member(GzDecoder::new(file), path, member)
        }
        ArchiveKind::Gzip => read_gzip_member(path, member),
    }
}

fn read_zip_member(path: &Path, member: &str) -> ResourceResult<Option<Vec<u8>>> {
    let file = BufReader::new(File::open(path)?);
    let mut archive = zip::ZipArchive::new(file).map_err(|e| archive_error(path, e))?;

    let mut entry = match archive.by_name(member) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(archive_error(path, e)),
    };
    if entry.is_dir() {
        return Ok(None);
    }

    // the declared size is untrusted
    let mut bytes = Vec::with_capacity(entry.size().min(MAX_PREALLOC) as usize);
    entry.read_to_end(&mut bytes)?;
    Ok(Some(bytes))
}

fn read_tar_member<R: Read>(reader: R, path: &Path, member: &str) -> ResourceResult<Option<Vec<u8>>> {
    let mut archive = tar::Archive::new(reader);
    let wanted = Path::new(member);

    for entry in archive.entries().map_err(|e| archive_error(path, e))? {
        let mut entry = entry.map_err(|e| archive_error(path, e))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let entry_path = entry.path().map_err(|e| archive_error(path, e))?;
        let normalized = entry_path.strip_prefix("./").unwrap_or(&entry_path);
        if normalized == wanted {
            let mut bytes = Vec::new();
            entry.read_to_end(&mut bytes)?;
            return Ok(Some(bytes));
        }
    }
    Ok(None)
}

/// A gzip file holds exactly one member, named like the file minus `.gz`.
fn read_gzip_member(path: &Path, member: &str) -> ResourceResult<Option<Vec<u8>>> {
    let inner = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.strip_suffix(".gz").unwrap_or(n))
        .unwrap_or_default();

    let member_name = member.rsplit('/').next().unwrap_or(member);
    if inner != member && inner != member_name {
        return Ok(None);
    }

    let mut decoder = GzDecoder::new(BufReader::new(File::open(path)?));
    let mut bytes = Vec::new();
    decoder
        .read_to_end(&mut bytes)
        .map_err(|e| archive_error(path, e))?;
    Ok(Some(bytes))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    pub(crate) fn write_zip(path: &Path, members: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        for (name, bytes) in members {
            writer.start_file(*name, options).unwrap();
            writer.write_all(bytes).unwrap();
        }
        writer.finish().unwrap();
    }

    fn write_tgz(path: &Path, members: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, bytes) in members {
            let mut header = tar::Header::new_gnu();
            header.set_size(bytes.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *bytes).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_safe_member() {
        assert!(is_safe_member("com/acme/Filter.unit"));
        assert!(!is_safe_member("../escape.unit"));
        assert!(!is_safe_member("/abs.unit"));
        assert!(!is_safe_member(""));
    }

    #[test]
    fn test_zip_member() {
        let temp_dir = tempfile::tempdir().unwrap();
        let jar = temp_dir.path().join("lib.jar");
        write_zip(&jar, &[("com/acme/Filter.unit", b"filter-v1")]);

        let found = read_member(ArchiveKind::Zip, &jar, "com/acme/Filter.unit").unwrap();
        assert_eq!(found.as_deref(), Some(&b"filter-v1"[..]));
        assert!(read_member(ArchiveKind::Zip, &jar, "com/acme/Other.unit").unwrap().is_none());
    }

    #[test]
    fn test_zip_member_with_inflated_declared_size() {
        let temp_dir = tempfile::tempdir().unwrap();
        let jar = temp_dir.path().join("crafted.jar");
        write_zip(&jar, &[("Big.unit", b"small")]);

        // claim a near-4GiB uncompressed size in the central directory
        let mut raw = std::fs::read(&jar).unwrap();
        let central = raw
            .windows(4)
            .position(|w| w == [0x50, 0x4b, 0x01, 0x02])
            .unwrap();
        raw[central + 24..central + 28].copy_from_slice(&0xFFFF_FFF0u32.to_le_bytes());
        std::fs::write(&jar, &raw).unwrap();

        match read_member(ArchiveKind::Zip, &jar, "Big.unit") {
            Ok(Some(bytes)) => assert_eq!(bytes, b"small"),
            Ok(None) => panic!("member should be listed"),
            Err(e) => assert!(matches!(e, ResourceError::Archive { .. } | ResourceError::Io { .. })),
        }
    }

    #[test]
    fn test_tgz_member() {
        let temp_dir = tempfile::tempdir().unwrap();
        let tgz = temp_dir.path().join("lib.tgz");
        write_tgz(&tgz, &[("com/acme/Sink.unit", b"sink")]);

        let found = read_member(ArchiveKind::TarGz, &tgz, "com/acme/Sink.unit").unwrap();
        assert_eq!(found.as_deref(), Some(&b"sink"[..]));
        assert!(read_member(ArchiveKind::TarGz, &tgz, "Sink.unit").unwrap().is_none());
    }

    #[test]
    fn test_gzip_member() {
        let temp_dir = tempfile::tempdir().unwrap();
        let gz = temp_dir.path().join("Filter.unit.gz");
        let mut encoder = GzEncoder::new(File::create(&gz).unwrap(), Compression::default());
        encoder.write_all(b"compressed").unwrap();
        encoder.finish().unwrap();

        let found = read_member(ArchiveKind::Gzip, &gz, "Filter.unit").unwrap();
        assert_eq!(found.as_deref(), Some(&b"compressed"[..]));
        assert!(read_member(ArchiveKind::Gzip, &gz, "Other.unit").unwrap().is_none());
    }

    #[test]
    fn test_corrupt_zip_is_an_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let jar = temp_dir.path().join("broken.jar");
        std::fs::write(&jar, b"not a zip").unwrap();

        let result = read_member(ArchiveKind::Zip, &jar, "a.unit");
        assert!(matches!(result, Err(ResourceError::Archive { .. })));
    }
}
