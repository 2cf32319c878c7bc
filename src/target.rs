//! Artifact targets: addressable handles to persisted outputs.
//!
//! A [`Target`] is either *absent* or *present*. It becomes present exactly
//! once, when the scheduler commits the [`Staging`] file a task wrote into.
//! Until then, nothing is ever written at the target location itself, so a
//! file that exists there is always a complete artifact.

use std::fs;
use std::io::{self, Write};

use camino::{Utf8Path, Utf8PathBuf};
use serde::de::DeserializeOwned;

use crate::error::{Error, NotFound};
use crate::field::{Field2d, FieldError};

const STAGING_PREFIX: &str = ".kumo-";
const STAGING_SUFFIX: &str = ".partial";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    path: Utf8PathBuf,
}

impl Target {
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub fn location(&self) -> &Utf8Path {
        &self.path
    }

    /// Logical name of the artifact, the file name without its directory.
    pub fn name(&self) -> &str {
        self.path.file_name().unwrap_or(self.path.as_str())
    }

    /// Reads the artifact into memory.
    pub fn open(&self) -> Result<Artifact, Error> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Artifact {
                path: self.path.clone(),
                bytes,
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(NotFound(self.path.clone()).into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Opens a temporary file next to the final location. The target stays
    /// absent until [`Staging::commit`] succeeds.
    pub(crate) fn stage(&self) -> io::Result<Staging> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_str().is_empty() => dir,
            _ => Utf8Path::new("."),
        };

        fs::create_dir_all(dir)?;

        let file = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .suffix(STAGING_SUFFIX)
            .tempfile_in(dir)?;

        Ok(Staging {
            file,
            target: self.clone(),
            written: 0,
        })
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path.as_str())
    }
}

/// An opened, present artifact.
#[derive(Debug, Clone)]
pub struct Artifact {
    path: Utf8PathBuf,
    bytes: Vec<u8>,
}

impl Artifact {
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Decodes the artifact as CBOR.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, FieldError> {
        ciborium::from_reader(self.bytes.as_slice()).map_err(|e| FieldError::Decode(e.to_string()))
    }

    /// Decodes the artifact as a [`Field2d`], validating its shape.
    pub fn field(&self) -> Result<Field2d, FieldError> {
        Field2d::read_cbor(self.bytes.as_slice())
    }
}

/// Write handle for a target that is not yet present.
///
/// Dropping a `Staging` without committing it deletes the temporary file, so
/// a task that fails, panics or is cancelled leaves its target absent.
pub struct Staging {
    file: tempfile::NamedTempFile,
    target: Target,
    written: u64,
}

impl Staging {
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Number of bytes written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flushes and atomically moves the staged file onto the target.
    pub(crate) fn commit(mut self) -> io::Result<Target> {
        self.file.flush()?;
        self.file.as_file().sync_all()?;
        self.file
            .persist(&self.target.path)
            .map_err(|e| e.error)?;

        Ok(self.target)
    }
}

impl Write for Staging {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl std::fmt::Debug for Staging {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Staging")
            .field("target", &self.target)
            .field("written", &self.written)
            .finish()
    }
}
