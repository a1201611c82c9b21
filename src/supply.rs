use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::error::SupplyError;
use crate::model::{Attempt, Question, QuestionKind};

/// Produces the immutable attempt before a session starts.
pub trait QuestionSupply {
    fn load(&self) -> Result<Attempt, SupplyError>;
}

#[derive(Debug, Deserialize)]
struct AttemptDocument {
    id: String,
    title: Option<String>,
    duration_seconds: u64,
    #[serde(default = "default_time_limit")]
    time_limit_enabled: bool,
    total_marks: Option<f64>,
    questions: Vec<Question>,
}

fn default_time_limit() -> bool {
    true
}

/// Attempt described by a YAML file on disk.
#[derive(Debug, Clone)]
pub struct YamlAttemptFile {
    path: PathBuf,
}

impl YamlAttemptFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl QuestionSupply for YamlAttemptFile {
    fn load(&self) -> Result<Attempt, SupplyError> {
        let content = fs::read_to_string(&self.path).map_err(|source| SupplyError::Io {
            path: self.path.clone(),
            source,
        })?;
        parse_attempt(&content)
    }
}

pub fn parse_attempt(content: &str) -> Result<Attempt, SupplyError> {
    let doc: AttemptDocument = serde_yaml::from_str(content)?;
    let mut questions = doc.questions;

    if doc.id.trim().is_empty() {
        return Err(invalid("attempt id must not be empty"));
    }
    if questions.is_empty() {
        return Err(invalid("attempt has no questions"));
    }
    if doc.time_limit_enabled && doc.duration_seconds == 0 {
        return Err(invalid("duration_seconds must be positive for a timed attempt"));
    }

    let mut seen = HashSet::new();
    for q in &questions {
        validate_question(q)?;
        if !seen.insert(q.id.as_str()) {
            return Err(invalid(format!("duplicate question id '{}'", q.id)));
        }
    }

    let computed: f64 = questions.iter().map(|q| q.marks).sum();
    let total_marks = match doc.total_marks {
        Some(total) if (total - computed).abs() > 1e-9 => {
            return Err(invalid(format!(
                "total_marks is {} but questions add up to {}",
                total, computed
            )));
        }
        Some(total) => total,
        None => computed,
    };

    questions.sort_by_key(|q| q.order);

    Ok(Attempt {
        title: doc.title.unwrap_or_else(|| doc.id.clone()),
        id: doc.id,
        questions,
        duration_seconds: doc.duration_seconds,
        time_limit_enabled: doc.time_limit_enabled,
        total_marks,
        source_hash: compute_str_hash(content),
    })
}

fn validate_question(q: &Question) -> Result<(), SupplyError> {
    if q.id.trim().is_empty() {
        return Err(invalid("question id must not be empty"));
    }
    if q.marks.is_nan() || q.marks <= 0.0 {
        return Err(invalid(format!("question '{}' must carry positive marks", q.id)));
    }
    match (&q.kind, &q.options) {
        (QuestionKind::MultipleChoice, Some(options)) if options.len() >= 2 => {}
        (QuestionKind::MultipleChoice, _) => {
            return Err(invalid(format!(
                "multiple choice question '{}' needs at least two options",
                q.id
            )));
        }
        (_, Some(_)) => {
            return Err(invalid(format!(
                "question '{}' has options but is not multiple choice",
                q.id
            )));
        }
        (_, None) => {}
    }
    if q.code_template.is_some() && q.kind != QuestionKind::Code {
        return Err(invalid(format!(
            "question '{}' has a code template but is not a code question",
            q.id
        )));
    }
    Ok(())
}

fn invalid(msg: impl Into<String>) -> SupplyError {
    SupplyError::Invalid(msg.into())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

pub fn compute_str_hash(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    format!("sha256:{}", hex_encode(&hasher.finalize()))
}
