use crate::entry::{EntryMeta, EntryType, Field};
use crate::error::{DecodeError, DecodeErrorKind};
use crate::field::{parse_line, Line};
use crate::header::{ArchiveHeader, HeaderField};
use crate::payload::{Input, Payload};

/// The bare value framing regular file contents.
pub const CONTENTS_MARKER: &str = "---";

/// Receives each record the decoder finishes.
///
/// The metadata has not been checked for completeness: a consumer that needs
/// every field calls [`EntryMeta::complete`] itself. Regular files come with
/// a [`Payload`] positioned at their first content byte.
pub trait Consumer {
    type Error: From<DecodeError>;

    fn consume(
        &mut self,
        meta: EntryMeta,
        payload: Option<Payload<'_>>,
        line: usize,
    ) -> Result<(), Self::Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Archive metadata, up to the first blank line.
    Header,
    /// Between records.
    SeekingMetadata,
    /// Inside a record's metadata block.
    Metadata,
    /// Right after a payload, expecting the closing marker.
    ContentsEnd { expected: u64 },
}

/// Streaming archive parser.
///
/// Reads one line at a time and never looks further ahead than the line it
/// needs, except that payload bytes are handed to the consumer as a block
/// right after the opening contents marker.
pub struct Decoder<R> {
    input: R,
    buf: Vec<u8>,
    line: usize,
    state: State,
    header: ArchiveHeader,
    meta: EntryMeta,
    seekable: bool,
    pending: u64,
}

impl<R: Input> Decoder<R> {
    pub fn new(mut input: R) -> Decoder<R> {
        let seekable = input.probe_seek();
        tracing::debug!(seekable, "probed archive input");

        Decoder {
            input,
            buf: Vec::new(),
            line: 0,
            state: State::Header,
            header: ArchiveHeader::default(),
            meta: EntryMeta::new(),
            seekable,
            pending: 0,
        }
    }

    /// The archive header, as far as it has been read.
    #[inline(always)]
    pub fn header(&self) -> &ArchiveHeader {
        &self.header
    }

    /// Number of lines read so far. End of input counts as one more line.
    #[inline(always)]
    pub fn line(&self) -> usize {
        self.line
    }

    /// Whether payloads are currently skipped by seeking.
    #[inline(always)]
    pub fn is_seekable(&self) -> bool {
        self.seekable
    }

    /// Decodes the whole stream, handing every record to `consumer`. Stops at
    /// the first error.
    pub fn decode<C: Consumer>(&mut self, consumer: &mut C) -> Result<(), C::Error> {
        while self.read_line()? {
            let buf = std::mem::take(&mut self.buf);
            let result = match (std::str::from_utf8(&buf), self.state) {
                (Ok(text), _) => self.step(parse_line(text), consumer),
                // Leftover payload bytes, binary or not.
                (Err(_), State::ContentsEnd { expected }) => {
                    Err(self.error(DecodeErrorKind::TrailingData { expected }).into())
                }
                (Err(_), _) => Err(self.error(DecodeErrorKind::InvalidEncoding).into()),
            };
            self.buf = buf;
            result?;
        }

        self.line += 1;
        self.finish(consumer)
    }

    fn error(&self, kind: DecodeErrorKind) -> DecodeError {
        DecodeError::new(self.line, kind)
    }

    fn read_line(&mut self) -> Result<bool, DecodeError> {
        self.buf.clear();
        match self.input.read_until(b'\n', &mut self.buf) {
            Ok(0) => Ok(false),
            Ok(_) => {
                self.line += 1;
                Ok(true)
            }
            Err(e) => Err(DecodeError::new(self.line + 1, DecodeErrorKind::Io(e))),
        }
    }

    fn step<C: Consumer>(&mut self, line: Line<'_>, consumer: &mut C) -> Result<(), C::Error> {
        match self.state {
            State::Header => match line {
                Line::Blank => self.state = State::SeekingMetadata,
                Line::Value(_) => return Err(self.error(DecodeErrorKind::MissingHeaderKey).into()),
                Line::Field { key, value } => {
                    if let Some(field) = HeaderField::from_key(&key) {
                        self.header
                            .set(field, value)
                            .map_err(|kind| self.error(kind))?;
                    } else if Field::from_key(&key).is_some() {
                        tracing::debug!(line = self.line, "archive has no header");
                        self.state = State::SeekingMetadata;
                        return self.step(Line::Field { key, value }, consumer);
                    } else {
                        return Err(self.error(DecodeErrorKind::UnknownHeaderKey(key)).into());
                    }
                }
            },
            State::SeekingMetadata => match line {
                Line::Blank => {}
                Line::Value(_) => return Err(self.error(DecodeErrorKind::MissingKey).into()),
                Line::Field { key, value } => {
                    self.set_field(&key, value)?;
                    self.state = State::Metadata;
                }
            },
            State::Metadata => match line {
                Line::Field { key, value } => self.set_field(&key, value)?,
                Line::Value(CONTENTS_MARKER) => {
                    if self.meta.entry_type() != Some(EntryType::RegularFile) {
                        return Err(self.error(DecodeErrorKind::MarkerForNonRegularFile).into());
                    }
                    let size = match self.meta.size() {
                        Some(size) => size,
                        None => return Err(self.error(DecodeErrorKind::MarkerWithoutSize).into()),
                    };
                    self.dispatch(consumer, Some(size))?;
                    self.state = State::ContentsEnd { expected: size };
                }
                Line::Value(_) => return Err(self.error(DecodeErrorKind::MissingKey).into()),
                Line::Blank => self.end_record(consumer, DecodeErrorKind::MissingContents)?,
            },
            State::ContentsEnd { expected } => match line {
                Line::Value(CONTENTS_MARKER) => self.state = State::SeekingMetadata,
                Line::Field { .. } => {
                    return Err(self.error(DecodeErrorKind::UnexpectedMetadata).into())
                }
                Line::Value(_) | Line::Blank => {
                    return Err(self.error(DecodeErrorKind::TrailingData { expected }).into())
                }
            },
        }
        Ok(())
    }

    fn finish<C: Consumer>(&mut self, consumer: &mut C) -> Result<(), C::Error> {
        match self.state {
            State::Header | State::SeekingMetadata => Ok(()),
            State::Metadata => self.end_record(consumer, DecodeErrorKind::EofBeforeContents),
            State::ContentsEnd { .. } => Err(self.error(DecodeErrorKind::EofInContents).into()),
        }
    }

    fn set_field(&mut self, key: &str, value: &str) -> Result<(), DecodeError> {
        if value.is_empty() {
            return Err(self.error(DecodeErrorKind::EmptyValue));
        }
        let field = Field::from_key(key)
            .ok_or_else(|| self.error(DecodeErrorKind::UnknownKey(key.to_string())))?;
        self.meta.set(field, value).map_err(|kind| self.error(kind))
    }

    /// Ends a record that has no contents marker.
    fn end_record<C: Consumer>(
        &mut self,
        consumer: &mut C,
        regular_file: DecodeErrorKind,
    ) -> Result<(), C::Error> {
        if self.meta.entry_type() == Some(EntryType::RegularFile) {
            return Err(self.error(regular_file).into());
        }
        self.dispatch(consumer, None)?;
        self.state = State::SeekingMetadata;
        Ok(())
    }

    fn dispatch<C: Consumer>(&mut self, consumer: &mut C, size: Option<u64>) -> Result<(), C::Error> {
        let meta = std::mem::take(&mut self.meta);
        let line = self.line;
        tracing::debug!(line, path = meta.path().unwrap_or_default(), "dispatching entry");

        let len = match size {
            Some(len) => len,
            None => return consumer.consume(meta, None, line),
        };

        self.pending = len;
        let payload = Payload {
            input: &mut self.input,
            remaining: &mut self.pending,
            seekable: &mut self.seekable,
            len,
            line,
        };
        consumer.consume(meta, Some(payload), line)?;

        if self.pending > 0 {
            let rest = Payload {
                input: &mut self.input,
                remaining: &mut self.pending,
                seekable: &mut self.seekable,
                len,
                line,
            };
            rest.skip()?;
        }
        Ok(())
    }
}
