use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tokio::{fs::OpenOptions, io::AsyncWriteExt};
use tracing::error;

use crate::error::AppError;

/// One answered question, as handed to the interaction sink.
#[derive(Debug, Clone, Serialize)]
pub struct InteractionRecord {
    pub user: String,
    pub time: String,
    pub query: String,
    pub answer: String,
    pub sources: serde_json::Value,
    pub confidence: f32,
}

/// Appends interaction records to a dated JSONL file under the data dir.
///
/// Callers invoke it fire-and-forget; a failed append is logged and never
/// surfaces to the request that produced the record.
#[derive(Debug, Clone)]
pub struct InteractionLogger {
    log_dir: PathBuf,
}

impl InteractionLogger {
    pub fn new(data_dir: &str) -> Self {
        Self {
            log_dir: Path::new(data_dir).join("interactions"),
        }
    }

    fn log_file(&self) -> PathBuf {
        let today = Utc::now().format("%Y-%m-%d");
        self.log_dir.join(format!("chat_logs_{today}.jsonl"))
    }

    pub async fn log_interaction(&self, record: InteractionRecord) {
        if let Err(e) = self.append(&record).await {
            error!("Interaction logging failed: {e}");
        }
    }

    async fn append(&self, record: &InteractionRecord) -> Result<(), AppError> {
        tokio::fs::create_dir_all(&self.log_dir).await?;
        let line = serde_json::to_string(record)
            .map_err(|e| AppError::InternalError(format!("serializing interaction: {e}")))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_file())
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record(query: &str) -> InteractionRecord {
        InteractionRecord {
            user: "analyst_1".into(),
            time: Utc::now().to_rfc3339(),
            query: query.into(),
            answer: "See circular 12/2021.".into(),
            sources: serde_json::json!([{"file_name": "circular_12.pdf", "page": 3}]),
            confidence: 0.74,
        }
    }

    #[tokio::test]
    async fn appends_one_json_line_per_interaction() {
        let dir = tempfile::tempdir().unwrap();
        let logger = InteractionLogger::new(dir.path().to_str().unwrap());

        logger.log_interaction(sample_record("first question")).await;
        logger.log_interaction(sample_record("second question")).await;

        let contents = tokio::fs::read_to_string(logger.log_file()).await.unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["query"], "first question");
        assert_eq!(parsed["user"], "analyst_1");
    }

    #[tokio::test]
    async fn logging_failure_does_not_panic() {
        // Point the logger at a path that cannot be a directory.
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        tokio::fs::write(&blocker, b"file").await.unwrap();

        let logger = InteractionLogger {
            log_dir: blocker.join("interactions"),
        };
        logger.log_interaction(sample_record("doomed")).await;
    }
}
