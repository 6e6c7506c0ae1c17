//! Incremental stream event decoder.
//!
//! Frames are blocks of text terminated by a blank line. A frame of interest
//! starts with the `data: ` field prefix followed by a single-line JSON
//! payload; every other frame is skipped. Fragments may split a frame at any
//! byte or bundle several frames, so the decoder keeps the unterminated tail
//! buffered between calls to [`StreamEventDecoder::feed`].

use chatwire_protocol::{StreamEvent, TYPE_FIELD};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::error::DecodeWarning;

/// Field prefix of a payload-carrying frame.
pub const DATA_PREFIX: &str = "data: ";

/// Blank-line frame separator.
pub const FRAME_SEPARATOR: &str = "\n\n";

/// Decoder counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DecoderStats {
    /// Complete frames extracted.
    pub frames: u64,
    /// Events emitted.
    pub events: u64,
    /// Frames without the data prefix.
    pub ignored_frames: u64,
    /// Payloads with an unrecognized type.
    pub unknown_types: u64,
    /// Payloads dropped as malformed.
    pub malformed: u64,
    /// Bytes of unterminated trailing data discarded by `finish`.
    pub discarded_bytes: usize,
}

enum FrameOutcome {
    Event(StreamEvent),
    Ignored,
    Dropped(DecodeWarning),
}

/// Stateful parser turning text fragments into [`StreamEvent`]s.
#[derive(Debug, Default)]
pub struct StreamEventDecoder {
    buffer: String,
    stats: DecoderStats,
    finished: bool,
}

impl StreamEventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `fragment` and return the events of every frame it completes,
    /// in arrival order.
    pub fn feed(&mut self, fragment: &str) -> Vec<StreamEvent> {
        if self.finished {
            warn!(len = fragment.len(), "fragment fed after finish, dropping");
            return Vec::new();
        }

        // CR is stripped on ingest so CRLF separators split across fragments still match
        self.buffer.extend(fragment.chars().filter(|c| *c != '\r'));

        let mut events = Vec::new();
        let mut consumed = 0;
        while let Some(offset) = self.buffer[consumed..].find(FRAME_SEPARATOR) {
            let frame_end = consumed + offset;
            let outcome = decode_frame(&self.buffer[consumed..frame_end]);
            consumed = frame_end + FRAME_SEPARATOR.len();
            self.record(outcome, &mut events);
        }
        self.buffer.drain(..consumed);

        events
    }

    /// Signal that the fragment source is exhausted.
    ///
    /// Unterminated trailing data is not a valid frame and is discarded
    /// without being parsed. No event is ever produced here.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;

        if !self.buffer.trim().is_empty() {
            debug!(
                bytes = self.buffer.len(),
                "discarding unterminated trailing frame"
            );
            self.stats.discarded_bytes += self.buffer.len();
        }
        self.buffer.clear();
        Vec::new()
    }

    /// Bytes currently buffered awaiting a frame boundary.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    fn record(&mut self, outcome: FrameOutcome, events: &mut Vec<StreamEvent>) {
        self.stats.frames += 1;
        match outcome {
            FrameOutcome::Event(event) => {
                trace!(event_type = event.wire_type(), "decoded frame");
                self.stats.events += 1;
                events.push(event);
            }
            FrameOutcome::Ignored => {
                self.stats.ignored_frames += 1;
            }
            FrameOutcome::Dropped(warning) if warning.is_malformed() => {
                warn!(%warning, "dropping malformed frame");
                self.stats.malformed += 1;
            }
            FrameOutcome::Dropped(warning) => {
                debug!(%warning, "dropping frame");
                self.stats.unknown_types += 1;
            }
        }
    }
}

fn decode_frame(frame: &str) -> FrameOutcome {
    let frame = frame.trim_start_matches('\n');
    let Some(rest) = frame.strip_prefix(DATA_PREFIX) else {
        return FrameOutcome::Ignored;
    };
    let payload = rest.lines().next().unwrap_or_default();
    match parse_payload(payload) {
        Ok(event) => FrameOutcome::Event(event),
        Err(warning) => FrameOutcome::Dropped(warning),
    }
}

/// Parse one JSON payload into a typed event.
pub fn parse_payload(payload: &str) -> Result<StreamEvent, DecodeWarning> {
    let value: Value = serde_json::from_str(payload).map_err(|e| DecodeWarning::InvalidJson {
        reason: e.to_string(),
    })?;

    let kind = value
        .get(TYPE_FIELD)
        .and_then(Value::as_str)
        .ok_or(DecodeWarning::MissingType)?;
    if !StreamEvent::is_known_type(kind) {
        return Err(DecodeWarning::UnknownType {
            kind: kind.to_string(),
        });
    }
    let kind = kind.to_string();

    serde_json::from_value(value).map_err(|e| DecodeWarning::InvalidShape {
        kind,
        reason: e.to_string(),
    })
}
