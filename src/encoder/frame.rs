//! Part framing shared by the blocking and async producers.
//!
//! The framer walks the fields in order and hands out delimiter, header and
//! scalar body chunks itself. File bodies are the only place the two
//! producers differ, so the framer stops at [`Frame::Body`] and lets the
//! caller pull chunks from the field in its own mode.

use bytes::Bytes;

use super::file_field::BodyState;
use super::Field;
use crate::error::Result;

const CRLF: &[u8] = b"\r\n";

pub(crate) enum Frame {
    Bytes(Bytes),
    /// The current file field's body is next.
    Body,
}

#[derive(Debug)]
enum Stage {
    Delimiter,
    Headers,
    Data,
    Body(BodyState),
    Trailer,
    Closing,
    Done,
}

#[derive(Debug)]
pub(crate) struct Framer {
    index: usize,
    stage: Stage,
}

impl Framer {
    pub fn new() -> Self {
        Self {
            index: 0,
            stage: Stage::Delimiter,
        }
    }

    /// The next frame, `None` once the closing delimiter was emitted.
    pub fn next_frame(
        &mut self,
        delimiter: &Bytes,
        closing: &Bytes,
        fields: &mut [Field],
    ) -> Option<Frame> {
        loop {
            match self.stage {
                Stage::Delimiter => {
                    if self.index >= fields.len() {
                        self.stage = Stage::Closing;
                        continue;
                    }
                    self.stage = Stage::Headers;
                    return Some(Frame::Bytes(delimiter.clone()));
                }
                Stage::Headers => {
                    let field = &mut fields[self.index];
                    self.stage = match field {
                        Field::Data(_) => Stage::Data,
                        Field::File(_) => Stage::Body(BodyState::default()),
                    };
                    return Some(Frame::Bytes(field.render_headers()));
                }
                Stage::Data => {
                    self.stage = Stage::Trailer;
                    if let Field::Data(field) = &mut fields[self.index] {
                        return Some(Frame::Bytes(field.render_data()));
                    }
                }
                Stage::Body(_) => return Some(Frame::Body),
                Stage::Trailer => {
                    self.index += 1;
                    self.stage = Stage::Delimiter;
                    return Some(Frame::Bytes(Bytes::from_static(CRLF)));
                }
                Stage::Closing => {
                    self.stage = Stage::Done;
                    return Some(Frame::Bytes(closing.clone()));
                }
                Stage::Done => return None,
            }
        }
    }

    /// Index and render state of the file body in progress.
    pub fn body(&mut self) -> Option<(usize, &mut BodyState)> {
        match &mut self.stage {
            Stage::Body(state) => Some((self.index, state)),
            _ => None,
        }
    }

    /// Fold the result of a body pull back into the framing.
    ///
    /// Returns the item to emit, or `None` when the body is exhausted and
    /// framing should continue. An error ends the message.
    pub fn settle(&mut self, pulled: Result<Option<Bytes>>) -> Option<Result<Bytes>> {
        match pulled {
            Ok(Some(chunk)) => Some(Ok(chunk)),
            Ok(None) => {
                self.stage = Stage::Trailer;
                None
            }
            Err(e) => {
                self.stage = Stage::Done;
                Some(Err(e))
            }
        }
    }
}

/// Pull the next body chunk of `fields[index]` with the blocking reader.
pub(crate) fn pull_blocking(
    fields: &mut [Field],
    index: usize,
    state: &mut BodyState,
) -> Result<Option<Bytes>> {
    match fields.get_mut(index) {
        Some(Field::File(field)) => field.next_chunk(state),
        _ => Ok(None),
    }
}

/// Pull the next body chunk of `fields[index]`, awaiting async sources.
pub(crate) async fn pull_async(
    fields: &mut [Field],
    index: usize,
    state: &mut BodyState,
) -> Result<Option<Bytes>> {
    match fields.get_mut(index) {
        Some(Field::File(field)) => field.next_chunk_async(state).await,
        _ => Ok(None),
    }
}
