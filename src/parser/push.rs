use crate::{
    encoding::XmlCharEncoding,
    error::XmlParserErrors,
    io::{XmlParserInputBuffer, parser_get_directory},
};

use super::{
    XML_INPUT_PROGRESSIVE, XmlParserCtxt, XmlParserInput, XmlParserInputState, XmlParserOption,
};

impl XmlParserCtxt {
    /// Create a parser context for using the XML parser in push mode.
    /// The bytes of `chunk` are buffered and used to detect the encoding;
    /// they don't need to be fed in again through [`parse_chunk`](Self::parse_chunk).
    /// To allow content encoding detection, `chunk` should hold at least 4 bytes.
    /// The value of `filename` is used for fetching external entities
    /// and error/warning reports.
    ///
    /// Returns the new parser context or `None`
    #[doc(alias = "xmlCreatePushParserCtxt")]
    pub fn new_push(chunk: &[u8], filename: Option<&str>) -> Option<Self> {
        let mut ctxt = Self::new();
        ctxt.progressive = 1;
        ctxt.directory = filename.and_then(parser_get_directory);

        let mut input = XmlParserInput::new(Some(&mut ctxt))?;
        input.filename = filename.map(str::to_owned);
        input.directory = ctxt.directory.clone();
        input.buf = Some(XmlParserInputBuffer::new(XmlCharEncoding::None));
        input.flags |= XML_INPUT_PROGRESSIVE;
        if ctxt.input_push(input) < 0 {
            return None;
        }

        if !chunk.is_empty() && ctxt.push_raw(chunk) < 0 {
            ctxt.halt();
        }
        Some(ctxt)
    }

    /// Append raw bytes to the bottom input, reporting buffer failures.
    fn push_raw(&mut self, chunk: &[u8]) -> i32 {
        let Some(buf) = self.input_tab.first_mut().and_then(|input| input.buf.as_mut()) else {
            return -1;
        };
        let res = buf.push_bytes(chunk);
        if res < 0 {
            let code = buf.error();
            self.ctxt_err_io(code, None);
        }
        res
    }

    /// Run encoding detection and the XML declaration once enough bytes arrived.
    fn try_start(&mut self, terminate: bool) {
        if self.instate != XmlParserInputState::XmlParserStart {
            return;
        }
        if self.content_bytes().len() < 4 && !terminate {
            return;
        }
        self.detect_encoding();

        // Wait for the whole declaration before scanning it.
        let rest = self.content_bytes();
        if !terminate {
            if rest.len() < 6 && b"<?xml".starts_with(&rest[..rest.len().min(5)]) {
                return;
            }
            if rest.starts_with(b"<?xml")
                && matches!(rest[5], b' ' | b'\t' | b'\n' | b'\r')
                && !rest.windows(2).any(|w| w == b"?>")
            {
                return;
            }
        }
        self.start_after_detection();
    }

    /// Feed a chunk of the document.
    ///
    /// The bytes are decoded through the active handler. An incomplete multi-byte
    /// sequence at the end of `chunk` waits for the next call. With `terminate`,
    /// the decoder is flushed and the end of the document is reached.
    ///
    /// Returns the error code of the context.
    #[doc(alias = "xmlParseChunk")]
    pub fn parse_chunk(&mut self, chunk: &[u8], terminate: bool) -> XmlParserErrors {
        if self.disable_sax != 0 || self.input_tab.is_empty() {
            return self.error_code();
        }
        self.progressive = 1;

        // Keep a trailing CR back so a CRLF split over two chunks is one line end.
        let (chunk, end_in_cr) = match chunk.split_last() {
            Some((b'\r', head)) if !terminate => (head, true),
            _ => (chunk, false),
        };
        log::trace!(
            "feeding {} bytes to input {} (terminate: {terminate})",
            chunk.len(),
            self.input().map_or(0, |input| input.id())
        );

        if !chunk.is_empty() && self.push_raw(chunk) < 0 {
            self.halt();
            return self.error_code();
        }

        self.try_start(terminate);
        if self.instate == XmlParserInputState::XmlParserEOF {
            return self.error_code();
        }

        let lookup_limit = self.config.lookup_limit;
        if self.options & XmlParserOption::XmlParseHuge as i32 == 0
            && self.input().is_some_and(|input| {
                input.remainder_len() > lookup_limit || input.offset_from_base() > lookup_limit
            })
        {
            self.fatal_err(
                XmlParserErrors::XmlErrResourceLimit,
                Some("Huge input lookup"),
            );
            self.halt();
            return self.error_code();
        }

        if end_in_cr && self.push_raw(b"\r") < 0 {
            self.halt();
            return self.error_code();
        }

        if terminate {
            let flushed = self
                .input_tab
                .first_mut()
                .and_then(|input| input.buf.as_mut())
                .map(|buf| (buf.flush(), buf.error()));
            if let Some((res, code)) = flushed.filter(|&(res, _)| res < 0) {
                log::debug!("flushing the decoder returned {res}");
                self.ctxt_err_io(code, None);
                self.halt();
                return self.error_code();
            }
            self.instate = XmlParserInputState::XmlParserEOF;
        }
        self.error_code()
    }

    fn error_code(&self) -> XmlParserErrors {
        XmlParserErrors::try_from(self.err_no).unwrap_or(XmlParserErrors::XmlErrInternalError)
    }
}
