//! Headless session runner.

use std::io::Write;

use anyhow::{Context, Result};
use chatwire_engine::{
    ChatTransport, HttpTransport, RejectReason, RequestOutcome, SubmitResult,
    TranscriptController, load_config,
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::args::Cli;
use crate::output::{LiveTail, OutputWriter};

/// Where prompts come from.
pub enum PromptSource<R> {
    /// A single prompt given on the command line.
    Single(String),
    /// One prompt per line until end of input.
    Lines(R),
}

/// Outcomes of every request sent in a session.
#[derive(Debug, Default)]
pub struct SessionReport {
    pub outcomes: Vec<RequestOutcome>,
    /// The session was ended by a shutdown signal.
    pub interrupted: bool,
}

impl SessionReport {
    /// Whether the last request failed.
    pub fn last_failed(&self) -> bool {
        self.outcomes.last().is_some_and(|o| !o.is_success())
    }
}

/// Run the CLI: load config, build the transport and drive the session.
pub async fn run(cli: Cli) -> Result<SessionReport> {
    let config = load_config(&cli.config_overrides()).context("failed to load configuration")?;
    info!(endpoint = %config.endpoint, "Using endpoint");

    let transport = HttpTransport::from_config(&config)?;
    let controller = TranscriptController::new(transport).with_idle_timeout(config.idle_timeout());
    let mut writer = OutputWriter::stdio(cli.format);

    let source = match cli.prompt_text() {
        Some(prompt) => PromptSource::Single(prompt),
        None => PromptSource::Lines(BufReader::new(tokio::io::stdin())),
    };

    let shutdown = CancellationToken::new();
    let signal = tokio::spawn(shutdown_on_ctrl_c(shutdown.clone()));
    let report = run_session(&controller, source, &mut writer, &shutdown).await;
    signal.abort();
    report
}

async fn shutdown_on_ctrl_c(shutdown: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("Received Ctrl+C, ending session");
            shutdown.cancel();
        }
        Err(e) => error!(error = %e, "Failed to install Ctrl+C handler"),
    }
}

/// Submit every prompt from `source` in turn, rendering as replies stream.
///
/// Cancelling `shutdown` aborts the request in flight and ends the session,
/// including while waiting for the next input line.
pub async fn run_session<T, R, O, E>(
    controller: &TranscriptController<T>,
    source: PromptSource<R>,
    writer: &mut OutputWriter<O, E>,
    shutdown: &CancellationToken,
) -> Result<SessionReport>
where
    T: ChatTransport,
    R: AsyncBufRead + Unpin,
    O: Write,
    E: Write,
{
    let mut report = SessionReport::default();
    match source {
        PromptSource::Single(prompt) => {
            submit_one(controller, &prompt, writer, &mut report, shutdown).await?;
        }
        PromptSource::Lines(reader) => {
            let mut lines = reader.lines();
            while !shutdown.is_cancelled() {
                let line = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    line = lines.next_line() => line.context("failed to read stdin")?,
                };
                let Some(line) = line else {
                    break;
                };
                submit_one(controller, &line, writer, &mut report, shutdown).await?;
            }
        }
    }
    report.interrupted = shutdown.is_cancelled();
    writer.write_session(&controller.transcript(), &report.outcomes)?;
    Ok(report)
}

async fn submit_one<T, O, E>(
    controller: &TranscriptController<T>,
    prompt: &str,
    writer: &mut OutputWriter<O, E>,
    report: &mut SessionReport,
    shutdown: &CancellationToken,
) -> Result<()>
where
    T: ChatTransport,
    O: Write,
    E: Write,
{
    let mut snapshots = controller.subscribe();
    let mut tail = LiveTail::new(controller.transcript().len());

    let submit = controller.submit(prompt);
    tokio::pin!(submit);
    let mut cancel_sent = false;
    let result = loop {
        tokio::select! {
            result = &mut submit => break result,
            changed = snapshots.changed() => {
                if changed.is_ok() {
                    let snapshot = snapshots.borrow_and_update().clone();
                    tail.render(&snapshot, writer)?;
                }
            }
            _ = shutdown.cancelled(), if !cancel_sent => {
                cancel_sent = true;
                controller.cancel();
            }
        }
    };

    match result {
        SubmitResult::Rejected(RejectReason::EmptyInput) => {
            debug!("Skipping blank prompt");
        }
        SubmitResult::Rejected(reason) => {
            writer.write_error(&format!("prompt rejected: {reason:?}"))?;
        }
        SubmitResult::Completed(outcome) => {
            let transcript = controller.transcript();
            tail.finish(&transcript, writer)?;
            writer.write_request(tail.messages(&transcript), &outcome)?;
            report.outcomes.push(outcome);
        }
    }
    Ok(())
}
