use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{GatewayError, StoreError};
use crate::gateway::PersistenceGateway;
use crate::model::{Attempt, Question, QuestionKind, Receipt, SubmittedAnswer};

const MAX_TEXT_LEN: usize = 100_000;
const ANSWERS_FILE: &str = "answers.yaml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAnswer {
    pub value: String,
    pub saved_at: DateTime<Utc>,
}

/// Where the student was when the front-end last wrote progress.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    #[serde(default)]
    pub current_index: usize,
    #[serde(default)]
    pub flagged: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSubmission {
    pub finalized_at: DateTime<Utc>,
    pub answers: Vec<SubmittedAnswer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreDocument {
    pub attempt_id: String,
    pub attempt_hash: String,
    #[serde(default)]
    pub answers: BTreeMap<String, StoredAnswer>,
    #[serde(default)]
    pub progress: Progress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submission: Option<StoredSubmission>,
}

impl StoreDocument {
    fn new(attempt: &Attempt) -> Self {
        Self {
            attempt_id: attempt.id.clone(),
            attempt_hash: attempt.source_hash.clone(),
            answers: BTreeMap::new(),
            progress: Progress::default(),
            submission: None,
        }
    }
}

/// File-backed persistence gateway. One YAML document per attempt, always
/// replaced atomically.
pub struct LocalStore {
    attempt: Arc<Attempt>,
    path: PathBuf,
    doc: Mutex<StoreDocument>,
}

impl LocalStore {
    pub fn dir_for(data_dir: &Path, attempt_id: &str) -> PathBuf {
        let safe: String = attempt_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        data_dir.join(safe)
    }

    pub fn open(data_dir: &Path, attempt: Arc<Attempt>) -> Result<Self, StoreError> {
        let path = Self::dir_for(data_dir, &attempt.id).join(ANSWERS_FILE);
        let doc = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
            let doc: StoreDocument = serde_yaml::from_str(&content)?;
            if doc.attempt_id != attempt.id || doc.attempt_hash != attempt.source_hash {
                return Err(StoreError::AttemptMismatch);
            }
            info!(path = %path.display(), answers = doc.answers.len(), "loaded saved answers");
            doc
        } else {
            StoreDocument::new(&attempt)
        };

        Ok(Self {
            attempt,
            path,
            doc: Mutex::new(doc),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn document(&self) -> StoreDocument {
        self.doc.lock().await.clone()
    }

    pub async fn save_progress(&self, progress: Progress) -> Result<(), StoreError> {
        let mut doc = self.doc.lock().await;
        if doc.progress == progress {
            return Ok(());
        }
        doc.progress = progress;
        write_document(&self.path, &doc).await
    }

    pub async fn export(&self, dest: &Path) -> Result<(), StoreError> {
        let doc = self.doc.lock().await;
        let yaml = serde_yaml::to_string(&*doc)?;
        tokio::fs::write(dest, yaml)
            .await
            .map_err(|source| StoreError::Io {
                path: dest.to_path_buf(),
                source,
            })
    }

    pub fn clear(data_dir: &Path, attempt_id: &str) -> Result<(), StoreError> {
        let dir = Self::dir_for(data_dir, attempt_id);
        if dir.exists() {
            fs::remove_dir_all(&dir).map_err(|source| StoreError::Io { path: dir, source })?;
        }
        Ok(())
    }
}

/// Single writer for progress metadata. Updates only replace the pending
/// value, so a burst of navigation ends with the newest position on disk.
pub struct ProgressWriter {
    tx: watch::Sender<Option<Progress>>,
    task: JoinHandle<()>,
}

impl ProgressWriter {
    pub fn spawn(store: Arc<LocalStore>) -> Self {
        let (tx, mut rx) = watch::channel(None::<Progress>);
        let task = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let latest = rx.borrow_and_update().clone();
                let Some(progress) = latest else {
                    continue;
                };
                if let Err(e) = store.save_progress(progress).await {
                    warn!(error = %e, "could not save progress");
                }
            }
        });
        Self { tx, task }
    }

    pub fn update(&self, progress: Progress) {
        self.tx.send_replace(Some(progress));
    }

    /// Writes whatever is still pending, then stops.
    pub async fn finish(self) {
        drop(self.tx);
        if let Err(e) = self.task.await {
            warn!(error = %e, "progress writer stopped abnormally");
        }
    }
}

#[async_trait]
impl PersistenceGateway for LocalStore {
    async fn save_answer(
        &self,
        attempt_id: &str,
        question_id: &str,
        value: &str,
    ) -> Result<(), GatewayError> {
        if attempt_id != self.attempt.id {
            return Err(GatewayError::Validation(format!(
                "unknown attempt '{}'",
                attempt_id
            )));
        }
        let question = self
            .attempt
            .question(question_id)
            .ok_or_else(|| GatewayError::Validation(format!("unknown question '{}'", question_id)))?;
        validate_value(question, value).map_err(GatewayError::Validation)?;

        let mut doc = self.doc.lock().await;
        if doc.submission.is_some() {
            return Err(GatewayError::AlreadySubmitted);
        }
        let previous = doc.answers.insert(
            question_id.to_string(),
            StoredAnswer {
                value: value.to_string(),
                saved_at: Utc::now(),
            },
        );
        if let Err(e) = write_document(&self.path, &doc).await {
            match previous {
                Some(p) => doc.answers.insert(question_id.to_string(), p),
                None => doc.answers.remove(question_id),
            };
            return Err(GatewayError::Transient(e.to_string()));
        }
        debug!(question_id, "answer written to local store");
        Ok(())
    }

    async fn submit_attempt(
        &self,
        attempt_id: &str,
        answers: &[SubmittedAnswer],
    ) -> Result<Receipt, GatewayError> {
        if attempt_id != self.attempt.id {
            return Err(GatewayError::Validation(format!(
                "unknown attempt '{}'",
                attempt_id
            )));
        }
        let mut doc = self.doc.lock().await;
        if doc.submission.is_some() {
            return Err(GatewayError::AlreadySubmitted);
        }
        let finalized_at = Utc::now();
        doc.submission = Some(StoredSubmission {
            finalized_at,
            answers: answers.to_vec(),
        });
        if let Err(e) = write_document(&self.path, &doc).await {
            doc.submission = None;
            return Err(GatewayError::Transient(e.to_string()));
        }
        info!(attempt_id, path = %self.path.display(), "submission recorded");
        Ok(Receipt { finalized_at })
    }
}

fn validate_value(question: &Question, value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Ok(());
    }
    match question.kind {
        QuestionKind::MultipleChoice => {
            let options = question.options.as_deref().unwrap_or_default();
            if options.iter().any(|o| o == value) {
                Ok(())
            } else {
                Err(format!("'{}' is not an option of question '{}'", value, question.id))
            }
        }
        QuestionKind::TrueFalse => match value {
            "true" | "false" => Ok(()),
            _ => Err(format!("question '{}' expects true or false", question.id)),
        },
        QuestionKind::ShortAnswer | QuestionKind::Essay | QuestionKind::Code => {
            if value.chars().count() > MAX_TEXT_LEN {
                Err(format!(
                    "answer to question '{}' exceeds {} characters",
                    question.id, MAX_TEXT_LEN
                ))
            } else {
                Ok(())
            }
        }
    }
}

async fn write_document(path: &Path, doc: &StoreDocument) -> Result<(), StoreError> {
    let yaml = serde_yaml::to_string(doc)?;
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| StoreError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
    }
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, yaml)
        .await
        .map_err(|source| StoreError::Io {
            path: tmp.clone(),
            source,
        })?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// Human-readable progress summary for `--status`.
pub fn status_report(attempt: &Attempt, doc: &StoreDocument) -> String {
    let answered = attempt
        .questions
        .iter()
        .filter(|q| {
            doc.answers
                .get(&q.id)
                .map(|a| !a.value.trim().is_empty())
                .unwrap_or(false)
        })
        .count();
    let mut out = String::new();
    out.push_str(&format!("Attempt: {} ({})\n", attempt.title, attempt.id));
    out.push_str(&format!(
        "Questions: {}  Marks: {}\n",
        attempt.len(),
        attempt.total_marks
    ));
    out.push_str(&format!(
        "  Saved answers: {}, Unanswered: {}, Flagged: {}\n",
        answered,
        attempt.len() - answered,
        doc.progress.flagged.len()
    ));
    if let Some(started) = doc.progress.started_at {
        out.push_str(&format!("Started: {}\n", started.to_rfc3339()));
    }
    match &doc.submission {
        Some(s) => out.push_str(&format!("Submitted: {}\n", s.finalized_at.to_rfc3339())),
        None => out.push_str("Not submitted\n"),
    }
    out
}
