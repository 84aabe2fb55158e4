//! BLAKE3 content digests for single files.
//!
//! Every read outcome is classified, never collapsed: a missing entry, a
//! permission failure and any other I/O error stay distinguishable so the
//! checker can report each with its own reason.

use blake3::Hasher;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

const READ_BUFFER_SIZE: usize = 64 * 1024;

// Keeps link-target fingerprints apart from content digests.
const SYMLINK_TARGET_CONTEXT: &str = "integrity-checker 2024 symlink target";

/// Fixed-size BLAKE3 fingerprint of a file's bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Digest([u8; blake3::OUT_LEN]);

impl Digest {
    pub fn of_bytes(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; blake3::OUT_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl From<Digest> for String {
    fn from(digest: Digest) -> Self {
        digest.to_hex()
    }
}

impl TryFrom<String> for Digest {
    type Error = hex::FromHexError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let mut out = [0u8; blake3::OUT_LEN];
        hex::decode_to_slice(value, &mut out)?;
        Ok(Self(out))
    }
}

/// Digest of one successfully read file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDigest {
    pub path: PathBuf,
    pub digest: Digest,
}

/// Outcome of reading one tracked path during a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileAccessOutcome {
    Digest(FileDigest),
    NotFound,
    NotAccessible,
    OtherError { message: String },
}

impl FileAccessOutcome {
    pub fn digest(&self) -> Option<&Digest> {
        match self {
            FileAccessOutcome::Digest(d) => Some(&d.digest),
            _ => None,
        }
    }

    pub fn from_io_error(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => FileAccessOutcome::NotFound,
            io::ErrorKind::PermissionDenied => FileAccessOutcome::NotAccessible,
            _ => FileAccessOutcome::OtherError {
                message: err.to_string(),
            },
        }
    }
}

/// Hash a single file. Open and read failures are both classified.
pub fn digest_file(path: &Path) -> FileAccessOutcome {
    match hash_file(path) {
        Ok(digest) => FileAccessOutcome::Digest(FileDigest {
            path: path.to_path_buf(),
            digest,
        }),
        Err(err) => FileAccessOutcome::from_io_error(&err),
    }
}

/// Digest a symlink entry. A link that resolves to a regular file is hashed
/// by the content it points at, like any other file. A dangling link, a
/// link loop or a link to a directory has no content to hash, so it is
/// fingerprinted by its target path instead.
pub fn digest_symlink(path: &Path) -> FileAccessOutcome {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => digest_file(path),
        Ok(_) => digest_link_target(path),
        Err(err) if err.kind() == io::ErrorKind::PermissionDenied => {
            FileAccessOutcome::NotAccessible
        }
        Err(_) => digest_link_target(path),
    }
}

fn digest_link_target(path: &Path) -> FileAccessOutcome {
    match std::fs::read_link(path) {
        Ok(target) => {
            let mut hasher = Hasher::new_derive_key(SYMLINK_TARGET_CONTEXT);
            hasher.update(target.as_os_str().as_encoded_bytes());
            FileAccessOutcome::Digest(FileDigest {
                path: path.to_path_buf(),
                digest: Digest(*hasher.finalize().as_bytes()),
            })
        }
        Err(err) => FileAccessOutcome::from_io_error(&err),
    }
}

fn hash_file(path: &Path) -> io::Result<Digest> {
    let mut file = File::open(path)?;
    let mut hasher = Hasher::new();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let n = match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..n]);
    }
    Ok(Digest(*hasher.finalize().as_bytes()))
}
