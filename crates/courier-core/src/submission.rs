//! Save-only submissions: validate the required fields, preview the
//! messages and write a summary file. Nothing is dispatched.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::SessionMode;
use crate::validation::parse_tokens;

/// Number of message lines kept in a preview.
pub const PREVIEW_LIMIT: usize = 200;

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("a message file is required")]
    NoMessages,

    #[error("multi mode requires a token file")]
    NoTokenFile,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    #[serde(default)]
    pub mode: SessionMode,
    pub target: String,
    pub name: String,
    /// Kept as entered; it is only echoed into the summary.
    pub interval: String,
    pub messages_text: String,
    #[serde(default)]
    pub tokens_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionPreview {
    pub messages: Vec<String>,
    pub token_count: Option<usize>,
    pub path: PathBuf,
}

pub struct SubmissionStore {
    dir: PathBuf,
}

impl SubmissionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn save(&self, submission: &Submission) -> Result<SubmissionPreview, SubmissionError> {
        for (field, value) in [
            ("target", &submission.target),
            ("name", &submission.name),
            ("interval", &submission.interval),
        ] {
            if value.trim().is_empty() {
                return Err(SubmissionError::MissingField(field));
            }
        }
        if submission.messages_text.is_empty() {
            return Err(SubmissionError::NoMessages);
        }

        let messages: Vec<String> = submission
            .messages_text
            .lines()
            .take(PREVIEW_LIMIT)
            .map(str::to_string)
            .collect();

        let token_count = match submission.mode {
            SessionMode::Multi => {
                let tokens = submission
                    .tokens_text
                    .as_deref()
                    .filter(|text| !text.is_empty())
                    .ok_or(SubmissionError::NoTokenFile)?;
                Some(parse_tokens(tokens).len())
            }
            SessionMode::Single => None,
        };

        let timestamp = Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
        let mut body = String::new();
        let _ = writeln!(body, "Timestamp (UTC): {timestamp}");
        let _ = writeln!(body, "Token type: {}", submission.mode);
        let _ = writeln!(body, "Convo ID: {}", submission.target.trim());
        let _ = writeln!(body, "Name: {}", submission.name.trim());
        let _ = writeln!(body, "Time interval: {}", submission.interval.trim());
        if let Some(count) = token_count {
            let _ = writeln!(body, "Token count: {count}");
        }
        body.push_str("\n--- Messages Preview ---\n");
        for line in &messages {
            body.push_str(line);
            body.push('\n');
        }

        std::fs::create_dir_all(&self.dir)?;
        let path = self.unique_path(&timestamp);
        std::fs::write(&path, body)?;
        tracing::info!(path = %path.display(), "Saved submission");

        Ok(SubmissionPreview {
            messages,
            token_count,
            path,
        })
    }

    fn unique_path(&self, timestamp: &str) -> PathBuf {
        let base = self.dir.join(format!("submission_{timestamp}.txt"));
        if !base.exists() {
            return base;
        }
        (1..)
            .map(|n| self.dir.join(format!("submission_{timestamp}_{n}.txt")))
            .find(|path| !path.exists())
            .unwrap_or(base)
    }
}
