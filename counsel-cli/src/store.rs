//! File-backed session persistence

use async_trait::async_trait;
use counsel_core::{CounselResult, SessionStore};
use std::path::{Path, PathBuf};

/// Stores session snapshots as one JSON file per session id
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", session_id))
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn save(&self, session_id: &str, snapshot: &serde_json::Value) -> CounselResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(session_id);
        let content = serde_json::to_string_pretty(snapshot)?;
        tokio::fs::write(&path, content).await?;

        // Session files may carry personal context; keep them private
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            let _ = tokio::fs::set_permissions(&path, perms).await;
        }

        Ok(())
    }

    async fn load(&self, session_id: &str) -> CounselResult<Option<serde_json::Value>> {
        let path = self.path_for(session_id);
        if !path.exists() {
            return Ok(None);
        }
        let content = tokio::fs::read_to_string(&path).await?;
        Ok(Some(serde_json::from_str(&content)?))
    }
}
