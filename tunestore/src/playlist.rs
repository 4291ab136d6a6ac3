//! Playlist order store
//!
//! The saved order is a JSON array of file names. Files unknown to the saved
//! order are listed first, newest first; the others follow the saved order.

use crate::{error::StoreError, store::StoredFile};
use std::{collections::HashMap, path::PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// JSON-file backed playlist order
#[derive(Debug, Clone)]
pub struct PlaylistOrderStore {
    path: PathBuf,
}

impl PlaylistOrderStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Saved order; empty when the file is missing or unreadable
    pub async fn load(&self) -> Vec<String> {
        let data = match fs::read(&self.path).await {
            Ok(data) => data,
            Err(_) => return Vec::new(),
        };
        match serde_json::from_slice::<Vec<String>>(&data) {
            Ok(order) => order,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Corrupt playlist order file, ignoring it");
                Vec::new()
            }
        }
    }

    /// Replaces the saved order
    pub async fn save(&self, order: &[String]) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(order)?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &self.path).await?;
        debug!(entries = order.len(), "Playlist order saved");
        Ok(())
    }
}

/// Orders `files` according to `order`
pub fn order_tracks(mut files: Vec<StoredFile>, order: &[String]) -> Vec<StoredFile> {
    let index: HashMap<&str, usize> = order
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect();

    files.sort_by(|a, b| {
        match (index.get(a.name.as_str()), index.get(b.name.as_str())) {
            (Some(ia), Some(ib)) => ia.cmp(ib),
            (Some(_), None) => std::cmp::Ordering::Greater,
            (None, Some(_)) => std::cmp::Ordering::Less,
            (None, None) => b.mtime.cmp(&a.mtime).then_with(|| a.name.cmp(&b.name)),
        }
    });
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn file(name: &str, age_secs: u64) -> StoredFile {
        StoredFile {
            name: name.to_string(),
            size: 1,
            mtime: SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000 - age_secs),
        }
    }

    fn names(files: &[StoredFile]) -> Vec<&str> {
        files.iter().map(|f| f.name.as_str()).collect()
    }

    #[test]
    fn newest_first_without_order() {
        let files = vec![file("old.mp3", 300), file("new.mp3", 10), file("mid.mp3", 100)];
        let ordered = order_tracks(files, &[]);
        assert_eq!(names(&ordered), vec!["new.mp3", "mid.mp3", "old.mp3"]);
    }

    #[test]
    fn unknown_files_come_first() {
        let files = vec![
            file("a.mp3", 500),
            file("b.mp3", 400),
            file("fresh.mp3", 1),
            file("c.mp3", 300),
        ];
        let order = vec!["c.mp3".to_string(), "gone.mp3".into(), "a.mp3".into(), "b.mp3".into()];
        let ordered = order_tracks(files, &order);
        assert_eq!(names(&ordered), vec!["fresh.mp3", "c.mp3", "a.mp3", "b.mp3"]);
    }

    #[tokio::test]
    async fn save_and_load() {
        let dir = TempDir::new().unwrap();
        let store = PlaylistOrderStore::new(dir.path().join("playlist.json"));
        assert!(store.load().await.is_empty());

        let order = vec!["b.mp3".to_string(), "a.mp3".to_string()];
        store.save(&order).await.unwrap();
        assert_eq!(store.load().await, order);
    }

    #[tokio::test]
    async fn corrupt_file_reads_as_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("playlist.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(PlaylistOrderStore::new(path).load().await.is_empty());
    }
}
