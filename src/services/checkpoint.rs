//! Local JSON checkpoint of a crawl's deduplicated records.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::models::CandidateRecord;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed checkpoint {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Records crawled from one source, written before the import phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub generated_at: DateTime<Utc>,
    pub source_url: String,
    pub records: Vec<CandidateRecord>,
}

impl Checkpoint {
    pub fn new(source_url: impl Into<String>, records: Vec<CandidateRecord>) -> Self {
        Self {
            generated_at: Utc::now(),
            source_url: source_url.into(),
            records,
        }
    }

    /// Write atomically: a sibling temp file is renamed over `path`.
    pub async fn save(&self, path: &Path) -> Result<(), CheckpointError> {
        let io_err = |source| CheckpointError::Io {
            path: path.to_path_buf(),
            source,
        };

        let json = serde_json::to_vec_pretty(self).map_err(|source| CheckpointError::Json {
            path: path.to_path_buf(),
            source,
        })?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, json).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, path).await.map_err(io_err)?;

        debug!("Wrote {} records to {}", self.records.len(), path.display());
        Ok(())
    }

    pub async fn load(path: &Path) -> Result<Self, CheckpointError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| CheckpointError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        serde_json::from_slice(&bytes).map_err(|source| CheckpointError::Json {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn sample() -> Checkpoint {
        Checkpoint::new(
            "https://memorial.example.go.kr/board",
            vec![CandidateRecord {
                author: "민수".to_string(),
                content: "그립습니다 항상 기억할게요".to_string(),
                date: NaiveDate::from_ymd_opt(2021, 3, 4).unwrap(),
                source_page: 2,
                source_strategy: "form-post:cPage".to_string(),
            }],
        )
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("legacy-messages.json");
        let checkpoint = sample();

        checkpoint.save(&path).await.unwrap();

        assert_eq!(Checkpoint::load(&path).await.unwrap(), checkpoint);
        assert!(!dir.path().join("nested/legacy-messages.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_dates_are_iso_strings() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.json");
        sample().save(&path).await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"date\": \"2021-03-04\""));
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        let err = Checkpoint::load(&dir.path().join("absent.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, CheckpointError::Io { .. }));
    }

    #[tokio::test]
    async fn test_garbage_is_json_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = Checkpoint::load(&path).await.unwrap_err();
        assert!(matches!(err, CheckpointError::Json { .. }));
    }
}
