//! UTF-8 safe byte buffer for response bodies.
//!
//! Network chunks do not respect character boundaries. The buffer holds back
//! an incomplete multi-byte sequence at the end of a chunk until the rest of
//! it arrives, so no fragment handed to the decoder ever contains a split
//! character.

/// Accumulates raw bytes and emits only complete UTF-8 text.
#[derive(Debug, Default)]
pub struct Utf8StreamBuffer {
    /// Bytes of an incomplete trailing sequence.
    pending: Vec<u8>,
}

impl Utf8StreamBuffer {
    /// Create a new UTF-8 stream buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push raw bytes and return every complete character decoded so far.
    ///
    /// Invalid sequences are replaced with U+FFFD. An incomplete sequence at
    /// the end stays buffered.
    pub fn push(&mut self, data: &[u8]) -> String {
        self.pending.extend_from_slice(data);

        let mut out = String::with_capacity(self.pending.len());
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        Some(invalid) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + invalid);
                        }
                        None => {
                            // Truncated sequence, wait for more bytes
                            self.pending.drain(..valid);
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    /// Flush remaining bytes, replacing a truncated sequence with U+FFFD.
    pub fn flush(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        let bytes = std::mem::take(&mut self.pending);
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Get the number of pending bytes.
    pub fn pending_bytes(&self) -> usize {
        self.pending.len()
    }
}
