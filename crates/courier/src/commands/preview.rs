use std::io::Write;

use async_trait::async_trait;
use courier_core::EngineConfig;
use courier_core::submission::{Submission, SubmissionPreview, SubmissionStore};
use eyre::Result;

use super::Command;
use super::run::read;
use crate::cli::PreviewArgs;

pub struct PreviewCommand {
    pub config: EngineConfig,
    pub args: PreviewArgs,
}

impl PreviewCommand {
    pub async fn save(&self) -> Result<SubmissionPreview> {
        let args = &self.args;
        let tokens_text = match &args.tokens {
            Some(path) => Some(read(path).await?),
            None => None,
        };
        let submission = Submission {
            mode: args.mode,
            target: args.target.clone(),
            name: args.name.clone(),
            interval: args.interval.clone(),
            messages_text: read(&args.messages).await?,
            tokens_text,
        };

        let dir = args
            .out_dir
            .clone()
            .unwrap_or_else(|| self.config.submissions_dir.clone());
        Ok(SubmissionStore::new(dir).save(&submission)?)
    }
}

#[async_trait]
impl Command for PreviewCommand {
    async fn execute(&self) -> Result<()> {
        let preview = self.save().await?;

        let mut out = std::io::stdout();
        writeln!(out, "Saved submission to {}", preview.path.display())?;
        if let Some(count) = preview.token_count {
            writeln!(out, "Token count: {count}")?;
        }
        writeln!(out, "--- Messages Preview ---")?;
        for line in &preview.messages {
            writeln!(out, "{line}")?;
        }
        Ok(())
    }
}
