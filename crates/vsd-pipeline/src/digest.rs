//! SHA-256 digests over the declared inputs of a stage.
//!
//! Every input is fed as a named, length-prefixed field so that moving bytes
//! between fields always changes the digest.

use std::fmt;
use std::fs;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{OrchestrationError, Result};
use crate::stage::Stage;

/// A SHA-256 hex digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentHash(hex_encode(&hasher.finalize()))
    }

    /// Accept a stored digest; anything but 64 lowercase hex digits is rejected.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let valid = text.len() == 64
            && text.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        valid.then(|| ContentHash(text.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Incremental digest of a stage's inputs.
pub struct InputDigest {
    hasher: Sha256,
}

impl InputDigest {
    pub fn new(stage: Stage) -> Self {
        let mut digest = InputDigest {
            hasher: Sha256::new(),
        };
        digest.bytes("stage", stage.id().as_bytes());
        digest
    }

    pub fn bytes(&mut self, name: &str, data: &[u8]) -> &mut Self {
        for part in [name.as_bytes(), data] {
            self.hasher.update((part.len() as u64).to_le_bytes());
            self.hasher.update(part);
        }
        self
    }

    pub fn text(&mut self, name: &str, value: &str) -> &mut Self {
        self.bytes(name, value.as_bytes())
    }

    pub fn file(&mut self, name: &str, path: &Path) -> Result<&mut Self> {
        let data = fs::read(path).map_err(OrchestrationError::io(path))?;
        Ok(self.bytes(name, &data))
    }

    /// Hash a directory tree: every entry's relative path in sorted order,
    /// plus file contents. A missing directory hashes as absent.
    pub fn dir(&mut self, name: &str, root: &Path) -> Result<&mut Self> {
        if !root.is_dir() {
            return Ok(self.bytes(name, b"<absent>"));
        }
        self.bytes(name, b"<dir>");
        let mut pending = vec![root.to_path_buf()];
        let mut entries = Vec::new();
        while let Some(dir) = pending.pop() {
            for entry in fs::read_dir(&dir).map_err(OrchestrationError::io(&dir))? {
                let path = entry.map_err(OrchestrationError::io(&dir))?.path();
                if path.is_dir() {
                    pending.push(path.clone());
                }
                entries.push(path);
            }
        }
        entries.sort();

        for path in entries {
            let relative = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if path.is_dir() {
                self.bytes(&format!("{name}/{relative}/"), b"");
            } else {
                self.file(&format!("{name}/{relative}"), &path)?;
            }
        }
        Ok(self)
    }

    pub fn finish(self) -> ContentHash {
        ContentHash(hex_encode(&self.hasher.finalize()))
    }
}
