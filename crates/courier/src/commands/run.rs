use std::io::Write;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use courier_core::EngineConfig;
use courier_core::service::SessionService;
use courier_core::session::LogSink;
use courier_core::validation::{SessionRequest, parse_messages, parse_proxies, parse_tokens};
use eyre::{Result, WrapErr};
use tracing::info;

use super::Command;
use crate::cli::RunArgs;

const FOLLOW_PERIOD: Duration = Duration::from_millis(200);

pub struct RunCommand {
    pub config: EngineConfig,
    pub args: RunArgs,
}

#[async_trait]
impl Command for RunCommand {
    async fn execute(&self) -> Result<()> {
        let request = build_request(&self.args).await?;
        let service = SessionService::simulated(&self.config);
        let (key, mut worker) = service.create_session_with_handle(request)?;
        let session = service.registry().get(key)?;
        let key_text = key.to_string();

        let mut out = std::io::stdout();
        writeln!(out, "session {key} started; press Ctrl+C to stop")?;

        let mut cursor = 0;
        let mut stop_sent = false;
        let mut ticker = tokio::time::interval(FOLLOW_PERIOD);
        loop {
            tokio::select! {
                joined = &mut worker => {
                    joined.wrap_err("Session worker failed")?;
                    break;
                }
                signal = tokio::signal::ctrl_c(), if !stop_sent => {
                    signal?;
                    let status = service.control_session(&key_text, "stop")?;
                    info!(session_key = %key, %status, "Stop requested from terminal");
                    stop_sent = true;
                }
                _ = ticker.tick() => {
                    cursor = follow(session.logs(), cursor, &mut out)?;
                }
            }
        }

        follow(session.logs(), cursor, &mut out)?;
        writeln!(out, "session {key} {}", session.status())?;
        Ok(())
    }
}

/// Write entries appended since `cursor` and return the next cursor.
pub fn follow(logs: &LogSink, cursor: u64, out: &mut impl Write) -> std::io::Result<u64> {
    let (entries, next) = logs.since(cursor);
    for entry in entries {
        writeln!(out, "{}", entry.to_line())?;
    }
    out.flush()?;
    Ok(next)
}

pub async fn build_request(args: &RunArgs) -> Result<SessionRequest> {
    let messages = parse_messages(&read(&args.messages).await?);
    let tokens = match &args.tokens {
        Some(path) => parse_tokens(&read(path).await?),
        None => Vec::new(),
    };
    let proxies = match &args.proxies {
        Some(path) => parse_proxies(&read(path).await?),
        None => Vec::new(),
    };

    Ok(SessionRequest {
        mode: args.mode,
        target: args.target.clone(),
        name: args.name.clone(),
        messages,
        tokens,
        access_token: args.access_token.clone(),
        proxies,
        interval_secs: args.interval,
        max_retries: args.max_retries,
        retry_delay_secs: args.retry_delay,
        repeat: args.repeat,
    })
}

/// Read an input file as text. Bytes that are not valid UTF-8 are dropped.
pub(crate) async fn read(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path)
        .await
        .wrap_err_with(|| format!("Failed to read {}", path.display()))?;
    Ok(bytes.utf8_chunks().map(|chunk| chunk.valid()).collect())
}
