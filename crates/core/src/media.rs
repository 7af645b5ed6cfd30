//! Storage for uploaded files under the media root.

use std::path::{Component, Path, PathBuf};

use rand::Rng;

use crate::error::{Result, RollcallError};

#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Relative path of a user's avatar.
    pub fn avatar_path(user_id: i64) -> String {
        format!("avatars/avatar_{user_id}.jpg")
    }

    /// A fresh relative path under `institutions/` for an uploaded logo.
    ///
    /// Only the base name of `file_name` is kept, reduced to ASCII letters,
    /// digits, `.`, `-` and `_`, behind a random prefix so two uploads with
    /// the same name never collide.
    pub fn institution_logo_path(file_name: &str) -> String {
        let base = file_name.rsplit(['/', '\\']).next().unwrap_or("");
        let mut clean: String = base
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
            .collect();
        if clean.trim_start_matches('.').is_empty() {
            clean = format!("logo{clean}");
        }
        let prefix: u32 = rand::thread_rng().gen();
        format!("institutions/{prefix:08x}_{clean}")
    }

    /// Write (replacing) a file at `relative`, creating parent directories.
    pub async fn save(&self, relative: &str, bytes: &[u8]) -> Result<()> {
        let path = self.resolve(relative)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        Ok(())
    }

    /// Write (replacing) the user's avatar and return its relative path.
    pub async fn save_avatar(&self, user_id: i64, jpeg: &[u8]) -> Result<String> {
        let relative = Self::avatar_path(user_id);
        self.save(&relative, jpeg).await?;
        Ok(relative)
    }

    pub async fn read(&self, relative: &str) -> Result<Vec<u8>> {
        let path = self.resolve(relative)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(RollcallError::NotFound(format!("media file {relative}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a stored file. A file that is already gone is not an error.
    pub async fn remove(&self, relative: &str) -> Result<()> {
        let path = self.resolve(relative)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn url(relative: &str) -> String {
        format!("/media/{relative}")
    }

    fn resolve(&self, relative: &str) -> Result<PathBuf> {
        let rel = Path::new(relative);
        let safe = rel
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if relative.is_empty() || !safe {
            return Err(RollcallError::Validation(format!(
                "invalid media path: {relative}"
            )));
        }
        Ok(self.root.join(rel))
    }
}
