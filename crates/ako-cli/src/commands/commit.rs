//! `ako commit`: stream a commit message for a diff to stdout.

use std::io::Write;
use std::path::Path;

use ako_core::{ClientFactory, ConfigStore, GenerateError, Generator, LlmConfig};
use ako_provider::ErrorKind;
use anyhow::Context;
use futures::StreamExt;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

/// Typed error used to propagate deterministic process exit codes.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct CommitExitError {
    pub code: i32,
    pub message: String,
}

pub async fn run(store: &ConfigStore, diff_file: Option<&Path>) -> anyhow::Result<()> {
    let diff = read_diff(diff_file).await?;
    if diff.trim().is_empty() {
        tracing::warn!("diff is empty; nothing staged?");
    }
    let config = store.resolve();

    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let generator = Generator::new();
    let mut stdout = std::io::stdout();
    let result = stream_message(&generator, config.as_deref(), &diff, &cancel, &mut stdout).await;
    ctrl_c.abort();

    match result {
        Ok(()) => Ok(()),
        Err(err) => match err.downcast::<GenerateError>() {
            Ok(err) => Err(exit_error(&err, store.path()).into()),
            Err(err) => Err(err),
        },
    }
}

/// Write each chunk to `out` as soon as it arrives.
pub async fn stream_message<F, W>(
    generator: &Generator<F>,
    config: Option<&LlmConfig>,
    diff: &str,
    cancel: &CancellationToken,
    out: &mut W,
) -> anyhow::Result<()>
where
    F: ClientFactory,
    W: Write,
{
    let mut stream = generator
        .generate_commit_message(config, diff, cancel)
        .await?;
    tracing::debug!(provider = stream.provider(), model = stream.model(), "streaming");

    let mut wrote_any = false;
    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(err) => {
                if wrote_any {
                    writeln!(out)?;
                }
                return Err(err.into());
            }
        };
        out.write_all(chunk.as_bytes())?;
        out.flush()?;
        wrote_any = true;
    }
    if wrote_any {
        writeln!(out)?;
    }
    Ok(())
}

fn exit_error(err: &GenerateError, config_path: &Path) -> CommitExitError {
    let path = config_path.display();
    let (code, message) = match err {
        GenerateError::ConfigMissing => (
            1,
            format!("error: no LLM configuration at {path}; run `ako init` to create one"),
        ),
        GenerateError::NoBackendSelected => (
            1,
            format!(
                "error: no backend is enabled in {path}; set `enable: true` for one of \
                 ollama, gemini, vertex, anthropic or openai"
            ),
        ),
        GenerateError::Provider(inner) => match inner.kind() {
            ErrorKind::Canceled => (130, "canceled".to_string()),
            ErrorKind::Auth => (
                1,
                format!("error: {inner}\nhint: check the api_key of the enabled backend in {path}"),
            ),
            ErrorKind::Connection => (
                1,
                format!("error: {inner}\nhint: is the backend reachable? (for ollama, is `ollama serve` running?)"),
            ),
            ErrorKind::Provider => (1, format!("error: {inner}")),
        },
    };
    CommitExitError { code, message }
}

async fn read_diff(source: Option<&Path>) -> anyhow::Result<String> {
    match source {
        Some(path) if path == Path::new("-") => {
            let mut diff = String::new();
            tokio::io::stdin()
                .read_to_string(&mut diff)
                .await
                .context("failed to read diff from stdin")?;
            Ok(diff)
        }
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display())),
        None => staged_diff().await,
    }
}

async fn staged_diff() -> anyhow::Result<String> {
    let output = tokio::process::Command::new("git")
        .args(["diff", "--cached"])
        .output()
        .await
        .context("failed to run git")?;
    if !output.status.success() {
        anyhow::bail!(
            "git diff --cached failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
