//! Pointer file codec and on-disk helpers.
//!
//! A pointer file is a four-line TOML document with a fixed key order so that
//! successive versions produce one- or two-line diffs in the primary VCS:
//!
//! ```text
//! algorithm = "blake3"
//! digest = "5b05..."
//! size = 10948
//! path = "data/wine.csv"
//! ```

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use quarry_types::{Digest, HashAlgorithm};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;
use walkdir::WalkDir;

use crate::entry::{normalize_tracked_path, ManifestEntry};
use crate::error::{ManifestError, ManifestResult};

/// File extension of pointer files, appended to the artifact's file name.
pub const POINTER_EXTENSION: &str = "qp";

/// Wire form of a pointer record. Field order here is the key order on disk.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct PointerRecord {
    algorithm: String,
    digest: String,
    size: u64,
    path: String,
}

/// Encode an entry as pointer file text.
pub fn serialize(entry: &ManifestEntry) -> String {
    let record = PointerRecord {
        algorithm: entry.algorithm().to_string(),
        digest: entry.digest.to_hex(),
        size: entry.size,
        path: entry.path.clone(),
    };
    // A struct of strings and an integer always serializes.
    toml::to_string(&record).unwrap_or_else(|e| unreachable!("pointer record encoding: {e}"))
}

/// Decode pointer file text.
pub fn parse(text: &str) -> ManifestResult<ManifestEntry> {
    parse_at("<input>", text)
}

fn parse_at(location: &str, text: &str) -> ManifestResult<ManifestEntry> {
    let record: PointerRecord =
        toml::from_str(text).map_err(|e| ManifestError::corrupt(location, e.message()))?;

    let algorithm: HashAlgorithm = record
        .algorithm
        .parse()
        .map_err(|e: quarry_types::TypeError| ManifestError::corrupt(location, e.to_string()))?;
    let digest = Digest::from_hex(algorithm, &record.digest)
        .map_err(|e| ManifestError::corrupt(location, e.to_string()))?;

    if record.path.is_empty()
        || record.path.starts_with('/')
        || record.path.contains('\\')
        || record.path.split('/').any(|part| part.is_empty() || part == "." || part == "..")
    {
        return Err(ManifestError::corrupt(
            location,
            format!("path {:?} is not a clean repository-relative path", record.path),
        ));
    }

    Ok(ManifestEntry::new(record.path, digest, record.size))
}

/// Location of the pointer file for a repository-relative tracked path.
pub fn pointer_path_for(root: &Path, tracked_path: &str) -> PathBuf {
    let file = format!("{tracked_path}.{POINTER_EXTENSION}");
    file.split('/').fold(root.to_path_buf(), |acc, part| acc.join(part))
}

/// Read and decode a pointer file.
pub fn read_pointer(pointer_file: &Path) -> ManifestResult<ManifestEntry> {
    let text = match fs::read_to_string(pointer_file) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ManifestError::NotFound(pointer_file.to_path_buf()))
        }
        Err(e) if e.kind() == io::ErrorKind::InvalidData => {
            return Err(ManifestError::corrupt(
                pointer_file.display().to_string(),
                "not valid UTF-8",
            ))
        }
        Err(e) => return Err(ManifestError::io(pointer_file, e)),
    };
    parse_at(&pointer_file.display().to_string(), &text)
}

/// Read a pointer file that lives in the working tree under `root`.
///
/// The pointer's location is authoritative: a pointer moved together with
/// its artifact (a VCS rename) describes the artifact next to it, whatever
/// its recorded `path` says.
pub fn load_pointer(root: &Path, pointer_file: &Path) -> ManifestResult<ManifestEntry> {
    let mut entry = read_pointer(pointer_file)?;
    let located = normalize_tracked_path(root, &pointer_file.with_extension(""))?;
    if located != entry.path {
        debug!(
            pointer = %pointer_file.display(),
            recorded = %entry.path,
            "pointer was moved; using its location"
        );
        entry.path = located;
    }
    Ok(entry)
}

/// Write the pointer file for `entry` under `root`, replacing any previous
/// version atomically. Returns the pointer file path.
///
/// An identical existing file is left untouched.
pub fn write_pointer(root: &Path, entry: &ManifestEntry) -> ManifestResult<PathBuf> {
    let target = pointer_path_for(root, &entry.path);
    let text = serialize(entry);

    if let Ok(existing) = fs::read_to_string(&target) {
        if existing == text {
            return Ok(target);
        }
    }

    let dir = target
        .parent()
        .ok_or_else(|| ManifestError::InvalidPath(target.display().to_string()))?;
    let mut staged = NamedTempFile::new_in(dir).map_err(|e| ManifestError::io(dir, e))?;
    staged
        .write_all(text.as_bytes())
        .map_err(|e| ManifestError::io(staged.path(), e))?;
    staged
        .persist(&target)
        .map_err(|e| ManifestError::io(&target, e.error))?;

    debug!(pointer = %target.display(), digest = %entry.digest.short_hex(), "pointer written");
    Ok(target)
}

/// Delete the pointer file for a tracked path. Returns `true` if it existed.
///
/// Cached and remote blobs are never touched.
pub fn remove_pointer(root: &Path, tracked_path: &str) -> ManifestResult<bool> {
    let target = pointer_path_for(root, tracked_path);
    match fs::remove_file(&target) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(ManifestError::io(target, e)),
    }
}

/// Find every pointer file under `root`, skipping `.quarry/` and `.git/`.
/// The result is sorted.
pub fn discover_pointers(root: &Path) -> ManifestResult<Vec<PathBuf>> {
    let suffix = format!(".{POINTER_EXTENSION}");
    let mut found = Vec::new();
    let walker = WalkDir::new(root).into_iter().filter_entry(|e| {
        !(e.depth() > 0
            && e.file_type().is_dir()
            && matches!(e.file_name().to_str(), Some(".quarry") | Some(".git")))
    });
    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
            ManifestError::io(path, io::Error::other(e.to_string()))
        })?;
        if entry.file_type().is_file()
            && entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.ends_with(&suffix))
        {
            found.push(entry.into_path());
        }
    }
    found.sort();
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_crypto::ContentHasher;

    fn sample_entry() -> ManifestEntry {
        let digest = ContentHasher::hash(HashAlgorithm::Blake3, b"wine data");
        ManifestEntry::new("data/wine.csv", digest, 10948)
    }

    #[test]
    fn serialized_keys_are_in_fixed_order() {
        let text = serialize(&sample_entry());
        let keys: Vec<&str> = text
            .lines()
            .filter_map(|l| l.split_once(" = ").map(|(k, _)| k))
            .collect();
        assert_eq!(keys, vec!["algorithm", "digest", "size", "path"]);
        assert!(text.contains("size = 10948"));
    }

    #[test]
    fn parse_inverts_serialize() {
        let entry = sample_entry();
        assert_eq!(parse(&serialize(&entry)).unwrap(), entry);
    }

    #[test]
    fn record_stays_small() {
        let text = serialize(&sample_entry());
        assert!(text.len() < 200, "pointer record is {} bytes", text.len());
    }

    #[test]
    fn legacy_md5_records_are_readable() {
        let text = "algorithm = \"md5\"\ndigest = \"900150983cd24fb0d6963f7d28e17f72\"\nsize = 3\npath = \"abc.txt\"\n";
        let entry = parse(text).unwrap();
        assert_eq!(entry.algorithm(), HashAlgorithm::Md5);
        assert_eq!(entry.size, 3);
    }

    #[test]
    fn missing_field_is_corrupt() {
        let text = "algorithm = \"blake3\"\nsize = 3\npath = \"a\"\n";
        assert!(matches!(parse(text), Err(ManifestError::Corrupt { .. })));
    }

    #[test]
    fn malformed_values_are_corrupt() {
        let digest = sample_entry().digest.to_hex();
        let cases = [
            format!("algorithm = \"crc32\"\ndigest = \"{digest}\"\nsize = 1\npath = \"a\"\n"),
            "algorithm = \"blake3\"\ndigest = \"zz\"\nsize = 1\npath = \"a\"\n".to_string(),
            format!("algorithm = \"sha256\"\ndigest = \"{}\"\nsize = 1\npath = \"a\"\n", &digest[..20]),
            format!("algorithm = \"blake3\"\ndigest = \"{digest}\"\nsize = -1\npath = \"a\"\n"),
            format!("algorithm = \"blake3\"\ndigest = \"{digest}\"\nsize = 1\npath = \"../a\"\n"),
            format!("algorithm = \"blake3\"\ndigest = \"{digest}\"\nsize = 1\npath = \"a\"\nextra = 1\n"),
            "not toml at all {".to_string(),
        ];
        for case in cases {
            let err = parse(&case).unwrap_err();
            assert!(matches!(err, ManifestError::Corrupt { .. }), "accepted: {case}");
        }
    }

    #[test]
    fn write_and_read_pointer_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("data")).unwrap();
        let entry = sample_entry();

        let written = write_pointer(dir.path(), &entry).unwrap();
        assert_eq!(written, dir.path().join("data").join("wine.csv.qp"));
        assert_eq!(read_pointer(&written).unwrap(), entry);
    }

    #[test]
    fn moved_pointer_describes_its_new_location() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("data")).unwrap();
        let written = write_pointer(root, &sample_entry()).unwrap();

        fs::create_dir_all(root.join("moved")).unwrap();
        let moved = root.join("moved").join("wine.csv.qp");
        fs::rename(&written, &moved).unwrap();

        let entry = load_pointer(root, &moved).unwrap();
        assert_eq!(entry.path, "moved/wine.csv");
        assert_eq!(entry.digest, sample_entry().digest);
        assert_eq!(read_pointer(&moved).unwrap().path, "data/wine.csv");
    }

    #[test]
    fn pointer_outside_root_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        fs::create_dir_all(other.path().join("data")).unwrap();
        let written = write_pointer(other.path(), &sample_entry()).unwrap();
        let err = load_pointer(dir.path(), &written).unwrap_err();
        assert!(matches!(err, ManifestError::InvalidPath(_)));
    }

    #[test]
    fn read_missing_pointer_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_pointer(&dir.path().join("nope.qp")).unwrap_err();
        assert!(matches!(err, ManifestError::NotFound(_)));
    }

    #[test]
    fn remove_pointer_reports_existence() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("data")).unwrap();
        write_pointer(dir.path(), &sample_entry()).unwrap();
        assert!(remove_pointer(dir.path(), "data/wine.csv").unwrap());
        assert!(!remove_pointer(dir.path(), "data/wine.csv").unwrap());
    }

    #[test]
    fn discovery_skips_internal_directories() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("data")).unwrap();
        fs::create_dir_all(root.join(".quarry")).unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join("data").join("a.csv.qp"), "x").unwrap();
        fs::write(root.join("b.bin.qp"), "x").unwrap();
        fs::write(root.join(".quarry").join("hidden.qp"), "x").unwrap();
        fs::write(root.join(".git").join("objects.qp"), "x").unwrap();
        fs::write(root.join("data").join("a.csv"), "x").unwrap();

        let found = discover_pointers(root).unwrap();
        assert_eq!(found, vec![root.join("b.bin.qp"), root.join("data").join("a.csv.qp")]);
    }
}
