//! Output formatting.
//!
//! The transcript goes to stdout; status lines and tool activity go to
//! stderr in text mode so stdout stays pipeable.

use std::io::{self, Write};

use chatwire_engine::{Message, MessageContent, RequestOutcome, Role, ToolActivity, Transcript};
use serde_json::json;

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Stream reply text as it arrives.
    #[default]
    Text,
    /// One pretty-printed JSON document after all prompts.
    Json,
    /// One JSON object per finished message.
    #[value(name = "jsonl")]
    JsonLines,
}

/// Output writer.
pub struct OutputWriter<O: Write, E: Write> {
    format: OutputFormat,
    out: O,
    err: E,
}

impl OutputWriter<io::Stdout, io::Stderr> {
    pub fn stdio(format: OutputFormat) -> Self {
        Self::new(format, io::stdout(), io::stderr())
    }
}

impl<O: Write, E: Write> OutputWriter<O, E> {
    pub fn new(format: OutputFormat, out: O, err: E) -> Self {
        Self { format, out, err }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Write streaming reply text.
    pub fn write_delta(&mut self, delta: &str) -> io::Result<()> {
        if self.format == OutputFormat::Text && !delta.is_empty() {
            self.out.write_all(delta.as_bytes())?;
            self.out.flush()?;
        }
        Ok(())
    }

    /// End the current reply line.
    pub fn end_reply(&mut self) -> io::Result<()> {
        if self.format == OutputFormat::Text {
            writeln!(self.out)?;
        }
        Ok(())
    }

    /// Write a tool activity entry as soon as it appears.
    pub fn write_tool(&mut self, activity: &ToolActivity) -> io::Result<()> {
        if self.format == OutputFormat::Text {
            writeln!(self.err, "[TOOL] {activity}")?;
        }
        Ok(())
    }

    /// Write the messages and outcome of one finished request.
    pub fn write_request(
        &mut self,
        messages: &[Message],
        outcome: &RequestOutcome,
    ) -> io::Result<()> {
        match (self.format, outcome) {
            (OutputFormat::Text, RequestOutcome::Success { response_time_seconds, .. }) => {
                writeln!(self.err, "[OK] {response_time_seconds:.2}s")
            }
            (
                OutputFormat::Text,
                RequestOutcome::Failure {
                    detail,
                    response_time_seconds,
                    ..
                },
            ) => writeln!(self.err, "[ERROR] {detail} ({response_time_seconds:.2}s)"),
            (OutputFormat::JsonLines, _) => {
                for message in messages {
                    self.write_json_line(&json!({ "type": "message", "message": message }))?;
                }
                self.write_json_line(&json!({ "type": "outcome", "outcome": outcome }))
            }
            (OutputFormat::Json, _) => Ok(()),
        }
    }

    /// Write the whole session; JSON mode only.
    pub fn write_session(
        &mut self,
        transcript: &Transcript,
        outcomes: &[RequestOutcome],
    ) -> io::Result<()> {
        if self.format != OutputFormat::Json {
            return Ok(());
        }
        let output = json!({
            "transcript": transcript,
            "outcomes": outcomes,
        });
        serde_json::to_writer_pretty(&mut self.out, &output)?;
        writeln!(self.out)
    }

    pub fn write_error(&mut self, message: &str) -> io::Result<()> {
        match self.format {
            OutputFormat::Text => writeln!(self.err, "[ERROR] {message}"),
            OutputFormat::Json | OutputFormat::JsonLines => {
                let output = json!({ "type": "error", "message": message });
                writeln!(self.err, "{output}")
            }
        }
    }

    fn write_json_line(&mut self, value: &serde_json::Value) -> io::Result<()> {
        serde_json::to_writer(&mut self.out, value)?;
        writeln!(self.out)?;
        self.out.flush()
    }

    #[cfg(test)]
    pub(crate) fn into_parts(self) -> (O, E) {
        (self.out, self.err)
    }
}

/// Renders one request's reply incrementally from transcript snapshots.
#[derive(Debug, Default)]
pub struct LiveTail {
    /// Index of the request's first message.
    start: usize,
    printed: String,
    tools_printed: usize,
}

impl LiveTail {
    /// Track the request whose messages start at `start`.
    pub fn new(start: usize) -> Self {
        Self {
            start,
            ..Default::default()
        }
    }

    /// Messages belonging to the tracked request.
    pub fn messages<'t>(&self, transcript: &'t Transcript) -> &'t [Message] {
        transcript.messages().get(self.start..).unwrap_or_default()
    }

    /// Write whatever changed since the previous snapshot.
    pub fn render<O: Write, E: Write>(
        &mut self,
        transcript: &Transcript,
        writer: &mut OutputWriter<O, E>,
    ) -> io::Result<()> {
        let messages = self.messages(transcript);

        if let Some(agent) = messages.iter().find(|m| m.role() == Role::Agent)
            && let MessageContent::Text(text) = agent.content()
        {
            if let Some(delta) = text.strip_prefix(self.printed.as_str()) {
                writer.write_delta(delta)?;
            } else if self.printed.trim() != text.as_str() {
                // Content was replaced, not extended
                if !self.printed.is_empty() {
                    writer.end_reply()?;
                }
                writer.write_delta(text)?;
            }
            self.printed.clone_from(text);
        }

        let tools = messages.iter().filter_map(|m| match m.content() {
            MessageContent::Tool(activity) => Some(activity),
            _ => None,
        });
        for activity in tools.skip(self.tools_printed) {
            writer.write_tool(activity)?;
            self.tools_printed += 1;
        }
        Ok(())
    }

    /// Render the final snapshot and terminate the reply line.
    pub fn finish<O: Write, E: Write>(
        &mut self,
        transcript: &Transcript,
        writer: &mut OutputWriter<O, E>,
    ) -> io::Result<()> {
        self.render(transcript, writer)?;
        if !self.printed.is_empty() {
            writer.end_reply()?;
        }
        Ok(())
    }
}
