use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;
use tokio_util::codec::Decoder;

use crate::serial::error::SerialPortError;

/// The ways a byte stream can fail to be a concatenation of json objects.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FramingError {
    /// A `}` appeared with no open object to close.
    #[error("unexpected '}}'. Input is not a valid stream of json objects")]
    UnexpectedClosingBrace,

    /// Input ended in the middle of an object.
    #[error("unexpected end of input inside a json object")]
    UnexpectedEof,

    /// The buffer handed to the splitter is shorter than what it already scanned.
    #[error("{scanned} bytes were already scanned, but the buffer only holds {len}")]
    ScanOffsetBeyondBuffer {
        /// Bytes scanned by previous calls.
        scanned: usize,

        /// Length of the buffer given now.
        len: usize,
    },
}

/// Finds the boundary of the next balanced `{...}` object in a growing buffer.
///
/// The splitter is meant to be called repeatedly with the same buffer
/// (possibly extended with more bytes at the end) until it yields an object.
/// It remembers how far it got, so bytes are only ever scanned once.
/// Once an object is yielded the caller must drop those bytes from the front
/// of the buffer before calling again.
#[derive(Debug, Default, Clone)]
pub struct JsonSplitter {
    depth: usize,
    in_string: bool,
    last: u8,

    /// How far into the buffer previous calls got without closing an object.
    scanned: usize,
}

impl JsonSplitter {
    /// Create a splitter in its initial state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan `data` for the end of the first object.
    ///
    /// Returns `Ok(Some(advance))` when `data[..advance]` holds exactly one balanced object
    /// (along with any whitespace preceding it), and `Ok(None)` when more bytes are needed.
    /// When `at_eof` is set no more bytes will arrive, and an unfinished object is an error.
    /// A remainder consisting only of whitespace is a clean end of input.
    pub fn split(&mut self, data: &[u8], at_eof: bool) -> Result<Option<usize>, FramingError> {
        if self.scanned > data.len() {
            return Err(FramingError::ScanOffsetBeyondBuffer {
                scanned: self.scanned,
                len: data.len(),
            });
        }

        for (index, &byte) in data.iter().enumerate().skip(self.scanned) {
            if self.in_string {
                // Only one byte of lookback: the escaped byte itself
                // can never start another escape.
                if self.last == b'\\' {
                    self.last = 0;
                } else if byte == b'"' {
                    self.last = 0;
                    self.in_string = false;
                } else {
                    self.last = byte;
                }
                continue;
            }

            self.last = byte;

            match byte {
                b'"' => self.in_string = true,
                b'{' => self.depth += 1,
                b'}' => {
                    if self.depth == 0 {
                        return Err(FramingError::UnexpectedClosingBrace);
                    }
                    self.depth -= 1;

                    if self.depth == 0 {
                        self.scanned = 0;
                        return Ok(Some(index + 1));
                    }
                }
                _ => {}
            }
        }

        if at_eof {
            if data.iter().all(u8::is_ascii_whitespace) {
                return Ok(None);
            }
            return Err(FramingError::UnexpectedEof);
        }

        self.scanned = data.len();

        Ok(None)
    }
}

fn trim_leading_whitespace(bytes: &[u8]) -> usize {
    bytes.iter().take_while(|byte| byte.is_ascii_whitespace()).count()
}

/// Yields one frame per json object found on the wire.
///
/// The controller does not need to delimit its objects in any way,
/// although whitespace (e.g. newlines) between them is tolerated and dropped.
#[derive(Debug, Default, Clone)]
pub struct JsonObjectCodec {
    splitter: JsonSplitter,
}

impl JsonObjectCodec {
    /// Create a new codec.
    pub fn new() -> Self {
        Self::default()
    }

    fn next_frame(
        &mut self,
        src: &mut BytesMut,
        at_eof: bool,
    ) -> Result<Option<Bytes>, SerialPortError> {
        match self.splitter.split(src, at_eof)? {
            Some(advance) => {
                let mut frame = src.split_to(advance);
                frame.advance(trim_leading_whitespace(&frame));

                Ok(Some(frame.freeze()))
            }
            None => {
                if at_eof {
                    // Only whitespace is left.
                    src.clear();
                    self.splitter = JsonSplitter::new();
                }
                Ok(None)
            }
        }
    }
}

impl Decoder for JsonObjectCodec {
    type Item = Bytes;
    type Error = SerialPortError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.next_frame(src, false)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.next_frame(src, true)
    }
}
