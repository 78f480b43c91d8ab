use std::{
    io::{self, Read},
    mem::replace,
    sync::{
        Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use crate::{
    buf::XmlBuf,
    encoding::{EncodingError, XmlCharEncoding, XmlCharEncodingHandler, lookup_char_encoding_handler},
    error::XmlParserErrors,
};

use super::DefaultFileIOCallbacks;

/// The minimum number of bytes requested from a source in one read.
pub(crate) const MINLEN: usize = 4000;

/// Size of the scratch buffer used for one conversion step.
const DECODE_STEP: usize = 16 * 1024;

/// Whether the bytes in a buffer still need conversion.
pub enum DecodeState {
    /// Bytes are appended to the decoded buffer as they arrive.
    Decoded,
    /// `raw` holds bytes that `handler` has not converted yet.
    RawPending {
        handler: XmlCharEncodingHandler,
        raw: XmlBuf,
    },
}

impl DecodeState {
    pub fn handler(&self) -> Option<&XmlCharEncodingHandler> {
        match self {
            Self::Decoded => None,
            Self::RawPending { handler, .. } => Some(handler),
        }
    }

    /// The number of raw bytes waiting for conversion.
    pub fn pending(&self) -> usize {
        match self {
            Self::Decoded => 0,
            Self::RawPending { raw, .. } => raw.len(),
        }
    }
}

impl std::fmt::Debug for DecodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Decoded => write!(f, "Decoded"),
            Self::RawPending { handler, raw } => f
                .debug_struct("RawPending")
                .field("handler", &handler.name())
                .field("raw", &raw.len())
                .finish(),
        }
    }
}

/// A source of bytes together with its decoded UTF-8 content.
pub struct XmlParserInputBuffer {
    pub(crate) context: Option<Box<dyn Read>>,
    pub(crate) state: DecodeState,
    /// Local buffer encoded in UTF-8
    pub buffer: XmlBuf,
    pub(crate) error: XmlParserErrors,
    /// Amount of raw bytes already converted
    pub(crate) rawconsumed: u64,
    /// Set when the source reported the end of data.
    pub(crate) eof: bool,
}

impl XmlParserInputBuffer {
    /// Create a buffer for progressive parsing.
    ///
    /// Bytes are supplied later with [`push_bytes`](Self::push_bytes).
    #[doc(alias = "xmlAllocParserInputBuffer")]
    pub fn new(enc: XmlCharEncoding) -> Self {
        let state = match lookup_char_encoding_handler(enc) {
            Ok(Some(handler)) => DecodeState::RawPending {
                handler,
                raw: XmlBuf::new(),
            },
            Ok(None) => DecodeState::Decoded,
            Err(err) => {
                log::debug!("no handler for {enc:?}: {err:?}");
                DecodeState::Decoded
            }
        };
        Self {
            context: None,
            state,
            buffer: XmlBuf::with_capacity(2 * MINLEN),
            error: XmlParserErrors::XmlErrOK,
            rawconsumed: 0,
            eof: false,
        }
    }

    /// Create a buffer over a memory area. The whole content is available at once.
    #[doc(alias = "xmlParserInputBufferCreateMem")]
    pub fn from_memory(mem: &[u8], enc: XmlCharEncoding) -> Option<Self> {
        let mut ret = Self::new(enc);
        ret.eof = true;
        (ret.push_bytes(mem) >= 0).then_some(ret)
    }

    #[doc(alias = "xmlParserInputBufferCreateString")]
    pub fn from_str(s: &str) -> Option<Self> {
        Self::from_memory(s.as_bytes(), XmlCharEncoding::None)
    }

    /// Create a buffer pulling its bytes from `reader`.
    #[doc(alias = "xmlParserInputBufferCreateIO")]
    #[doc(alias = "xmlParserInputBufferCreateFile")]
    pub fn from_reader(reader: impl Read + 'static, enc: XmlCharEncoding) -> Self {
        let mut ret = Self::new(enc);
        ret.context = Some(Box::new(reader));
        ret
    }

    /// Create a buffer for `uri` using the registered input callbacks.
    ///
    /// Callbacks are consulted from the most recently registered one.
    #[doc(alias = "xmlParserInputBufferCreateUrl")]
    pub fn from_uri(uri: &str, enc: XmlCharEncoding) -> Result<Self, XmlParserErrors> {
        if !XML_INPUT_CALLBACK_INITIALIZED.load(Ordering::Acquire) {
            register_default_input_callbacks();
        }

        let mut callbacks = XML_INPUT_CALLBACK_TABLE
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let callback = callbacks
            .iter_mut()
            .rev()
            .find(|callback| callback.is_match(uri))
            .ok_or(XmlParserErrors::XmlIOENOENT)?;
        let reader = callback
            .open(uri)
            .map_err(|err| XmlParserErrors::from(&err))?;
        Ok(Self::from_reader(reader, enc))
    }

    /// The handler converting the raw bytes, if any.
    pub fn encoder(&self) -> Option<&XmlCharEncodingHandler> {
        self.state.handler()
    }

    /// Whether more bytes may still be pulled from a source.
    pub fn has_reader(&self) -> bool {
        self.context.is_some()
    }

    pub fn error(&self) -> XmlParserErrors {
        self.error
    }

    /// Convert as much of the pending raw bytes as possible.
    ///
    /// After the end of data an unconverted tail is an encoding error.
    /// Returns the number of decoded bytes appended.
    pub(crate) fn decode(&mut self) -> Result<usize, XmlParserErrors> {
        let flush = self.eof;
        let DecodeState::RawPending { handler, raw } = &mut self.state else {
            return Ok(0);
        };

        let mut scratch = vec![0; 4 * DECODE_STEP];
        let mut total = 0;
        loop {
            let len = raw.len().min(DECODE_STEP);
            let last = len == raw.len();
            // An empty call still flushes the state kept by the decoder.
            if len == 0 && !flush {
                break;
            }
            let src = &raw.as_ref()[..len];
            match handler.decode(src, &mut scratch, flush && last) {
                Ok((read, write)) => {
                    if self.buffer.push_bytes(&scratch[..write]).is_err() {
                        self.error = XmlParserErrors::XmlErrNoMemory;
                        return Err(self.error);
                    }
                    raw.trim_head(read);
                    self.rawconsumed = self.rawconsumed.saturating_add(read as u64);
                    total += write;
                    if read == 0 || (read < len && last) || raw.is_empty() {
                        break;
                    }
                }
                Err(EncodingError::BufferTooShort) => break,
                Err(
                    err @ EncodingError::Malformed {
                        read,
                        write,
                        length,
                        offset,
                    },
                ) => {
                    let good = read.saturating_sub(length + offset);
                    if self.buffer.push_bytes(&scratch[..write]).is_err() {
                        self.error = XmlParserErrors::XmlErrNoMemory;
                        return Err(self.error);
                    }
                    raw.trim_head(good);
                    self.rawconsumed = self.rawconsumed.saturating_add(good as u64);
                    let bytes = raw.as_ref();
                    log::debug!(
                        "input conversion failed due to input error, bytes 0x{:02X} 0x{:02X} 0x{:02X} 0x{:02X}: {err}",
                        bytes.first().unwrap_or(&0),
                        bytes.get(1).unwrap_or(&0),
                        bytes.get(2).unwrap_or(&0),
                        bytes.get(3).unwrap_or(&0),
                    );
                    self.error = XmlParserErrors::XmlErrInvalidEncoding;
                    return Err(self.error);
                }
                Err(EncodingError::Other { msg }) => {
                    log::debug!("input conversion failed: {msg}");
                    self.error = XmlParserErrors::XmlIOEncoder;
                    return Err(self.error);
                }
            }
        }

        if flush && !raw.is_empty() {
            log::debug!("{} bytes left unconverted at the end of input", raw.len());
            self.error = XmlParserErrors::XmlErrInvalidEncoding;
            return Err(self.error);
        }
        Ok(total)
    }

    /// Replace the active handler.
    ///
    /// Pending raw bytes are converted again through `handler`, or appended as they are
    /// when `handler` is `None`. Bytes already decoded are kept.
    /// Returns the number of decoded bytes appended.
    pub(crate) fn switch_handler(
        &mut self,
        handler: Option<XmlCharEncodingHandler>,
    ) -> Result<usize, XmlParserErrors> {
        let raw = match replace(&mut self.state, DecodeState::Decoded) {
            DecodeState::RawPending { raw, .. } => raw,
            DecodeState::Decoded => XmlBuf::new(),
        };
        match handler {
            Some(handler) => {
                self.state = DecodeState::RawPending { handler, raw };
                self.decode()
            }
            None => {
                let len = raw.len();
                self.buffer.push_bytes(raw.as_ref()).map_err(|_| {
                    self.error = XmlParserErrors::XmlErrNoMemory;
                    self.error
                })?;
                self.rawconsumed = self.rawconsumed.saturating_add(len as u64);
                Ok(len)
            }
        }
    }

    /// Reinterpret the decoded bytes after the first `processed` ones as raw input
    /// for `handler`, and convert them.
    ///
    /// Returns the number of decoded bytes now available.
    pub(crate) fn reinterpret(
        &mut self,
        processed: usize,
        handler: XmlCharEncodingHandler,
    ) -> Result<usize, XmlParserErrors> {
        self.buffer.trim_head(processed);
        let mut raw = XmlBuf::new();
        raw.push_bytes(self.buffer.as_ref()).map_err(|_| {
            self.error = XmlParserErrors::XmlErrNoMemory;
            self.error
        })?;
        self.buffer.clear();
        self.rawconsumed = self.rawconsumed.saturating_add(processed as u64);
        self.state = DecodeState::RawPending { handler, raw };
        self.decode()
    }

    /// Refresh the content of the input buffer, the old data are considered consumed.
    ///
    /// Returns the number of chars read and stored in the buffer, or -1 in case of error.
    #[doc(alias = "xmlParserInputBufferRead")]
    pub fn read(&mut self, len: usize) -> i32 {
        self.grow(len)
    }

    /// Grow up the content of the input buffer, the old data are preserved.
    /// This routine handles the transcoding to internal UTF-8.
    ///
    /// Returns the number of chars read and stored in the buffer, or -1 in case of error.
    #[doc(alias = "xmlParserInputBufferGrow")]
    pub fn grow(&mut self, mut len: usize) -> i32 {
        if self.error.is_err() {
            return -1;
        }
        if len <= MINLEN && len != 4 {
            len = MINLEN;
        }

        let mut res = 0;
        if let Some(context) = self.context.as_mut() {
            let mut chunk = vec![0; len];
            let read = loop {
                match context.read(&mut chunk) {
                    Ok(read) => break read,
                    Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                    Err(err) => {
                        log::debug!("read failed: {err}");
                        self.error = XmlParserErrors::from(&err);
                        return -1;
                    }
                }
            };
            if read == 0 {
                self.eof = true;
                self.context = None;
            }
            let chunk = &chunk[..read];
            let pushed = match &mut self.state {
                DecodeState::Decoded => self.buffer.push_bytes(chunk),
                DecodeState::RawPending { raw, .. } => raw.push_bytes(chunk),
            };
            if pushed.is_err() {
                self.error = XmlParserErrors::XmlErrNoMemory;
                return -1;
            }
            res = read as i32;
        }

        if self.encoder().is_some() {
            match self.decode() {
                Ok(written) => res = written as i32,
                Err(_) => return -1,
            }
        }
        res
    }

    /// Push the content of the array in the input buffer.
    /// This is used when operating the parser in progressive (push) mode.
    ///
    /// Returns the number of chars read and stored in the buffer, or -1 in case of error.
    #[doc(alias = "xmlParserInputBufferPush")]
    pub fn push_bytes(&mut self, buf: &[u8]) -> i32 {
        if self.error.is_err() {
            return -1;
        }
        match &mut self.state {
            DecodeState::Decoded => {
                if self.buffer.push_bytes(buf).is_err() {
                    self.error = XmlParserErrors::XmlErrNoMemory;
                    return -1;
                }
                buf.len() as i32
            }
            DecodeState::RawPending { raw, .. } => {
                if raw.push_bytes(buf).is_err() {
                    self.error = XmlParserErrors::XmlErrNoMemory;
                    return -1;
                }
                self.decode().map_or(-1, |written| written as i32)
            }
        }
    }

    /// Mark the end of data and convert what is left.
    ///
    /// Returns the number of chars stored in the buffer, or -1 in case of error.
    pub fn flush(&mut self) -> i32 {
        if self.error.is_err() {
            return -1;
        }
        self.eof = true;
        self.decode().map_or(-1, |written| written as i32)
    }
}

impl std::fmt::Debug for XmlParserInputBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XmlParserInputBuffer")
            .field("has_reader", &self.context.is_some())
            .field("state", &self.state)
            .field("buffer", &self.buffer.len())
            .field("error", &self.error)
            .field("rawconsumed", &self.rawconsumed)
            .field("eof", &self.eof)
            .finish()
    }
}

pub trait XmlInputCallback: Send {
    fn is_match(&self, filename: &str) -> bool;
    fn open(&mut self, filename: &str) -> io::Result<Box<dyn Read>>;
}

pub(crate) const MAX_INPUT_CALLBACK: usize = 15;
pub(in crate::io) static XML_INPUT_CALLBACK_TABLE: Mutex<Vec<Box<dyn XmlInputCallback>>> =
    Mutex::new(vec![]);
pub(in crate::io) static XML_INPUT_CALLBACK_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// clears the entire input callback table. this includes the compiled-in I/O.
#[doc(alias = "xmlCleanupInputCallbacks")]
pub fn cleanup_input_callbacks() {
    let is_initialized = XML_INPUT_CALLBACK_INITIALIZED.load(Ordering::Acquire);
    if !is_initialized {
        return;
    }

    let mut callbacks = XML_INPUT_CALLBACK_TABLE
        .lock()
        .unwrap_or_else(|e| e.into_inner());
    callbacks.clear();

    XML_INPUT_CALLBACK_INITIALIZED.store(false, Ordering::Release);
}

/// Clear the top input callback from the input stack. this includes the compiled-in I/O.
/// Returns the number of input callback registered after execution.
///
/// Even if no callbacks are registered, this function does not fail and return `0`.
#[doc(alias = "xmlPopInputCallbacks")]
pub fn pop_input_callbacks() -> usize {
    let is_initialized = XML_INPUT_CALLBACK_INITIALIZED.load(Ordering::Acquire);
    if !is_initialized {
        return 0;
    }

    let mut callbacks = XML_INPUT_CALLBACK_TABLE
        .lock()
        .unwrap_or_else(|e| e.into_inner());
    callbacks.pop();
    callbacks.len()
}

/// Registers the default compiled-in I/O handlers.
#[doc(alias = "xmlRegisterDefaultInputCallbacks")]
pub fn register_default_input_callbacks() {
    if XML_INPUT_CALLBACK_INITIALIZED.load(Ordering::Acquire) {
        return;
    }

    if let Err(err) = register_input_callbacks(DefaultFileIOCallbacks) {
        log::debug!("failed to register the default file callbacks: {err}");
    }
    XML_INPUT_CALLBACK_INITIALIZED.store(true, Ordering::Release);
}

/// Register a new set of I/O callback for handling parser input.
/// If success, returns the registered handler number wrapped `Ok`, otherwise return `Err`.
///
/// This function fails if the number of callbacks exceeds `MAX_INPUT_CALLBACK`.
#[doc(alias = "xmlRegisterInputCallbacks")]
pub fn register_input_callbacks(callback: impl XmlInputCallback + 'static) -> io::Result<usize> {
    let mut callbacks = XML_INPUT_CALLBACK_TABLE
        .lock()
        .unwrap_or_else(|e| e.into_inner());
    if callbacks.len() == MAX_INPUT_CALLBACK {
        return Err(io::Error::other("Too many input callbacks."));
    }
    callbacks.push(Box::new(callback));
    XML_INPUT_CALLBACK_INITIALIZED.store(true, Ordering::Release);
    Ok(callbacks.len())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn memory_buffer_without_handler() {
        let buf = XmlParserInputBuffer::from_str("<doc/>").unwrap();
        assert_eq!(buf.buffer.as_ref(), b"<doc/>");
        assert!(buf.encoder().is_none());
        assert!(!buf.has_reader());
    }

    #[test]
    fn reader_is_pulled_through_handler() {
        let data = "<a>\u{e9}</a>"
            .encode_utf16()
            .flat_map(u16::to_le_bytes)
            .collect::<Vec<_>>();
        let mut buf = XmlParserInputBuffer::from_reader(Cursor::new(data), XmlCharEncoding::UTF16LE);
        assert!(buf.grow(MINLEN) > 0);
        assert_eq!(buf.buffer.as_ref(), "<a>\u{e9}</a>".as_bytes());
        assert_eq!(buf.grow(MINLEN), 0);
        assert!(buf.eof);
        assert!(!buf.has_reader());
    }

    #[test]
    fn split_sequence_waits_for_more_bytes() {
        let mut buf = XmlParserInputBuffer::new(XmlCharEncoding::UTF16LE);
        assert_eq!(buf.push_bytes(&[0x3C, 0x00, 0x61]), 1);
        assert_eq!(buf.state.pending(), 1);
        assert_eq!(buf.push_bytes(&[0x00]), 1);
        assert_eq!(buf.buffer.as_ref(), b"<a");
        assert_eq!(buf.state.pending(), 0);
    }

    #[test]
    fn dangling_tail_at_flush_is_an_error() {
        let mut buf = XmlParserInputBuffer::new(XmlCharEncoding::UTF16LE);
        buf.push_bytes(&[0x3C, 0x00, 0x61]);
        assert_eq!(buf.flush(), -1);
        assert_eq!(buf.error(), XmlParserErrors::XmlErrInvalidEncoding);
        assert_eq!(buf.buffer.as_ref(), b"<");
    }

    #[test]
    fn malformed_input_keeps_decoded_prefix() {
        let mut buf = XmlParserInputBuffer::new(XmlCharEncoding::ASCII);
        buf.switch_handler(crate::encoding::find_encoding_handler("US-ASCII"))
            .unwrap();
        assert_eq!(buf.push_bytes(b"ab\xFFcd"), -1);
        assert_eq!(buf.buffer.as_ref(), b"ab");
        assert_eq!(buf.error(), XmlParserErrors::XmlErrInvalidEncoding);
        assert_eq!(buf.push_bytes(b"more"), -1);
    }

    #[test]
    fn switch_handler_redecodes_pending_tail() {
        let mut buf = XmlParserInputBuffer::new(XmlCharEncoding::UTF16LE);
        buf.push_bytes(&[0x41, 0x00, 0x42]);
        assert_eq!(buf.buffer.as_ref(), b"A");
        buf.switch_handler(crate::encoding::find_encoding_handler("ISO-8859-1"))
            .unwrap();
        assert_eq!(buf.buffer.as_ref(), b"AB");
        assert_eq!(buf.encoder().map(|h| h.name()), Some("ISO-8859-1"));
    }

    #[test]
    fn reinterpret_moves_tail_to_raw() {
        let mut buf = XmlParserInputBuffer::from_memory(b"xx\xE9t\xE9", XmlCharEncoding::None).unwrap();
        let handler = crate::encoding::find_encoding_handler("ISO-8859-1").unwrap();
        buf.reinterpret(2, handler).unwrap();
        assert_eq!(buf.buffer.as_ref(), "\u{e9}t\u{e9}".as_bytes());
        assert_eq!(buf.rawconsumed, 5);
    }

    #[test]
    fn reinterpret_keeps_earlier_raw_accounting() {
        let mut buf = XmlParserInputBuffer::from_memory(b"abc\xE9", XmlCharEncoding::None).unwrap();
        buf.rawconsumed = 100;
        let handler = crate::encoding::find_encoding_handler("ISO-8859-1").unwrap();
        buf.reinterpret(3, handler).unwrap();
        assert_eq!(buf.buffer.as_ref(), "\u{e9}".as_bytes());
        assert_eq!(buf.rawconsumed, 104);
    }
}
