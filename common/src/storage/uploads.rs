use std::{
    io::{BufReader, Read, Write},
    path::{Path, PathBuf},
};

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::error::AppError;

/// Per-read buffer for streaming file writes and hashing; caps memory use on
/// large uploads.
const COPY_BUFFER_LEN: usize = 8192;

/// Owner of the uploads directory. Saved files keep their (sanitized) client
/// name; collisions get a ` (N)` suffix with the smallest free N starting
/// at 1.
#[derive(Clone, Debug)]
pub struct UploadStore {
    root: PathBuf,
}

impl UploadStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persists an uploaded temp file under the uploads root, streaming in
    /// bounded reads. Returns the final path.
    pub fn save_temp_file(
        &self,
        file: &NamedTempFile,
        original_name: &str,
    ) -> Result<PathBuf, AppError> {
        std::fs::create_dir_all(&self.root)?;

        let sanitized = sanitize_file_name(original_name);
        let target = self.resolve_collision(&sanitized);

        let mut reader = BufReader::new(file.as_file());
        let mut writer = std::fs::File::create(&target)?;
        let mut buffer = [0u8; COPY_BUFFER_LEN];

        loop {
            let n = reader.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            writer.write_all(buffer.get(..n).unwrap_or_default())?;
        }
        writer.flush()?;

        Ok(target)
    }

    pub fn remove(&self, path: &Path) -> Result<(), AppError> {
        if path.starts_with(&self.root) && path.is_file() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Finds the first free name: the original, then `<stem> (1)<ext>`,
    /// `<stem> (2)<ext>`, ...
    fn resolve_collision(&self, file_name: &str) -> PathBuf {
        let candidate = self.root.join(file_name);
        if !candidate.exists() {
            return candidate;
        }

        let (stem, ext) = split_name(file_name);
        let mut n: u32 = 1;
        loop {
            let numbered = self.root.join(format!("{stem} ({n}){ext}"));
            if !numbered.exists() {
                return numbered;
            }
            n += 1;
        }
    }
}

/// Splits `report.pdf` into `("report", ".pdf")`; a name without an extension
/// keeps an empty suffix.
fn split_name(file_name: &str) -> (&str, &str) {
    match file_name.rfind('.') {
        Some(idx) if idx > 0 => (&file_name[..idx], &file_name[idx..]),
        _ => (file_name, ""),
    }
}

/// Replaces path-hostile characters so a client-supplied name cannot traverse
/// directories. Only the final path component of the supplied name survives.
pub fn sanitize_file_name(file_name: &str) -> String {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_name);

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | ' ' | '(' | ')') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let trimmed = cleaned.trim_matches(['.', ' ']).to_string();
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed
    }
}

/// Streaming SHA-256 of a temp file, for upload deduplication.
pub fn sha256_of(file: &NamedTempFile) -> Result<String, AppError> {
    let mut reader = BufReader::new(file.as_file());
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; COPY_BUFFER_LEN];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(buffer.get(..n).unwrap_or_default());
    }

    let digest = hasher.finalize();
    Ok(format!("{digest:x}"))
}
