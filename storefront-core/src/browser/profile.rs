use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::error::{BrowserError, BrowserResult};

const LAST_USED_MARKER: &str = ".last_used";

/// Named Chromium user-data directory. It outlives the process so the operator's
/// marketplace login survives between `login` and `run`.
#[derive(Debug, Clone)]
pub struct BrowserProfile {
    name: String,
    path: PathBuf,
}

impl BrowserProfile {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn touch(&self) -> BrowserResult<()> {
        let marker = self.path.join(LAST_USED_MARKER);
        let mut file = fs::File::create(&marker).await.map_err(|err| {
            BrowserError::Profile(format!("failed to write profile marker: {err}"))
        })?;
        file.write_all(Utc::now().to_rfc3339().as_bytes())
            .await
            .map_err(|err| {
                BrowserError::Profile(format!("failed to update profile marker: {err}"))
            })?;
        Ok(())
    }

    pub async fn last_used(&self) -> Option<DateTime<Utc>> {
        let raw = fs::read_to_string(self.path.join(LAST_USED_MARKER))
            .await
            .ok()?;
        DateTime::parse_from_rfc3339(raw.trim())
            .ok()
            .map(|stamp| stamp.with_timezone(&Utc))
    }
}

#[derive(Debug, Clone)]
pub struct ProfileManager {
    base_dir: PathBuf,
}

impl ProfileManager {
    pub fn new<P: AsRef<Path>>(base_dir: P) -> BrowserResult<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_dir).map_err(|err| {
            BrowserError::Profile(format!("failed to create profile base dir: {err}"))
        })?;
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn open(&self, name: &str) -> BrowserResult<BrowserProfile> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
        if !valid {
            return Err(BrowserError::Profile(format!(
                "invalid profile name: {name:?}"
            )));
        }
        let path = self.base_dir.join(name);
        std::fs::create_dir_all(&path)
            .map_err(|err| BrowserError::Profile(format!("failed to create profile dir: {err}")))?;
        Ok(BrowserProfile {
            name: name.to_string(),
            path,
        })
    }

    pub fn list(&self) -> BrowserResult<Vec<String>> {
        let entries = std::fs::read_dir(&self.base_dir).map_err(|err| {
            BrowserError::Profile(format!("failed to list profile directory: {err}"))
        })?;
        let mut names = entries
            .flatten()
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .collect::<Vec<_>>();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn profile_is_reused_across_opens() {
        let dir = tempdir().unwrap();
        let manager = ProfileManager::new(dir.path().join("profiles")).unwrap();
        let first = manager.open("seller").unwrap();
        assert!(first.last_used().await.is_none());
        first.touch().await.unwrap();

        let second = manager.open("seller").unwrap();
        assert_eq!(first.path(), second.path());
        assert!(second.last_used().await.is_some());
        assert_eq!(manager.list().unwrap(), vec!["seller".to_string()]);
    }

    #[test]
    fn rejects_path_like_names() {
        let dir = tempdir().unwrap();
        let manager = ProfileManager::new(dir.path()).unwrap();
        assert!(manager.open("../escape").is_err());
        assert!(manager.open("").is_err());
    }
}
