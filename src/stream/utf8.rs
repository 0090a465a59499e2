use smallvec::SmallVec;

/// Incremental UTF-8 decoding with carry-over of split multi-byte sequences.
///
/// Bytes that can never become valid UTF-8 are replaced with U+FFFD.
#[derive(Debug, Default)]
pub(crate) struct Utf8Carry {
    pending: SmallVec<[u8; 4]>,
}

impl Utf8Carry {
    /// Decode `bytes` onto `out`, holding back an incomplete trailing sequence.
    pub(crate) fn decode_into(&mut self, bytes: &[u8], out: &mut String) {
        if self.pending.is_empty() {
            self.push_lossy(bytes, out);
            return;
        }
        let mut joined = std::mem::take(&mut self.pending).into_vec();
        joined.extend_from_slice(bytes);
        self.push_lossy(&joined, out);
    }

    /// Number of held-back bytes.
    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Forget held-back bytes, returning how many there were.
    pub(crate) fn discard(&mut self) -> usize {
        let len = self.pending.len();
        self.pending.clear();
        len
    }

    fn push_lossy(&mut self, mut bytes: &[u8], out: &mut String) {
        loop {
            match std::str::from_utf8(bytes) {
                Ok(text) => {
                    out.push_str(text);
                    return;
                }
                Err(err) => {
                    let (valid, rest) = bytes.split_at(err.valid_up_to());
                    out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match err.error_len() {
                        Some(invalid_len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            bytes = &rest[invalid_len..];
                        }
                        None => {
                            self.pending.extend_from_slice(rest);
                            return;
                        }
                    }
                }
            }
        }
    }
}
