use std::{cell::RefCell, rc::Rc};

use crate::{
    encoding::{
        XmlCharEncoding, XmlCharEncodingHandler, lookup_char_encoding_handler,
        open_char_encoding_handler,
    },
    entities::{XmlEntity, XmlEntityType},
    error::XmlParserErrors,
    generic_error,
    globals::get_parser_debug_entities,
    io::{XmlParserInputBuffer, parser_get_directory},
};

use super::{
    INPUT_CHUNK, LINE_LEN, XML_INPUT_HAS_ENCODING, XmlParserCtxt, xml_err_internal,
};

/// An xmlParserInput is an input flow for the XML processor.
/// Each entity parsed is associated an xmlParserInput (except the
/// few predefined ones). This is the case both for internal entities
/// - in which case the flow is already completely in memory
/// - or external entities
/// - in which case we use the buf structure for
///   progressive reading and I18N conversions to the internal UTF-8 format.
#[doc(alias = "xmlParserInput")]
#[derive(Debug, Default)]
pub struct XmlParserInput {
    // UTF-8 encoded buffer
    pub buf: Option<XmlParserInputBuffer>,
    // The file analyzed, if any
    pub filename: Option<String>,
    // the directory/base of the file
    pub(crate) directory: Option<String>,
    // Current byte being parsed, as an index into the decoded buffer
    pub cur: usize,
    // Current line
    pub line: i32,
    // Current column
    pub col: i32,
    // How many bytes already consumed
    pub consumed: u64,
    // the encoding string for entity
    pub(crate) encoding: Option<String>,
    // the version string for entity
    pub(crate) version: Option<String>,
    // Was that entity marked standalone
    pub(crate) standalone: i32,
    // an unique identifier for the entity
    pub(crate) id: i32,
    // consumed bytes from parents
    pub(crate) parent_consumed: u64,
    // XML_INPUT_* flags
    pub flags: i32,
    // entity, if any
    pub(crate) entity: Option<Rc<RefCell<XmlEntity>>>,
}

impl XmlParserInput {
    /// Create a new input stream structure.
    ///
    /// Returns `None` if the context ran out of input identifiers.
    #[doc(alias = "xmlNewInputStream")]
    pub fn new(ctxt: Option<&mut XmlParserCtxt>) -> Option<Self> {
        let mut input = Self {
            line: 1,
            col: 1,
            ..Default::default()
        };

        // If the context is None the id cannot be initialized, but that
        // should not happen while parsing which is the situation where
        // the id is actually needed.
        if let Some(ctxt) = ctxt {
            if ctxt.input_id == i32::MAX {
                ctxt.err_memory();
                return None;
            }
            input.id = ctxt.input_id;
            ctxt.input_id += 1;
        }
        Some(input)
    }

    /// Create a new input stream structure encapsulating the input into
    /// a stream suitable for the parser.
    ///
    /// If `enc` is not `None`, the stream is switched to that encoding.
    #[doc(alias = "xmlNewIOInputStream")]
    pub fn from_io(
        ctxt: &mut XmlParserCtxt,
        buf: XmlParserInputBuffer,
        enc: XmlCharEncoding,
    ) -> Option<Self> {
        let mut input = Self::new(Some(ctxt))?;
        input.buf = Some(buf);
        if enc != XmlCharEncoding::None {
            ctxt.switch_encoding_of(&mut input, enc);
        }
        Some(input)
    }

    /// Create a new input stream based on a memory buffer.
    #[doc(alias = "xmlNewStringInputStream")]
    pub fn from_string(ctxt: &mut XmlParserCtxt, buffer: &str) -> Option<Self> {
        let Some(buf) = XmlParserInputBuffer::from_str(buffer) else {
            ctxt.err_memory();
            return None;
        };
        let mut input = Self::new(Some(ctxt))?;
        input.buf = Some(buf);
        Some(input)
    }

    /// Create a new input stream over `mem`.
    ///
    /// `encoding` names the encoding of `mem`. If it is `None`, the encoding is left
    /// to the detector. `flags` are `XML_INPUT_*` flags added to the new stream.
    #[doc(alias = "xmlNewInputMemory")]
    pub fn from_memory(
        ctxt: &mut XmlParserCtxt,
        url: Option<&str>,
        mem: &[u8],
        encoding: Option<&str>,
        flags: i32,
    ) -> Option<Self> {
        let Some(buf) = XmlParserInputBuffer::from_memory(mem, XmlCharEncoding::None) else {
            ctxt.err_memory();
            return None;
        };
        let mut input = Self::new(Some(ctxt))?;
        input.buf = Some(buf);
        input.filename = url.map(str::to_owned);
        input.flags |= flags;

        if let Some(encoding) = encoding {
            match open_char_encoding_handler(encoding) {
                Ok(handler) => {
                    let res = input.switch_encoding_handler(handler);
                    if ctxt.encoding_switch_status(res) < 0 {
                        return None;
                    }
                }
                Err(code) => {
                    ctxt.fatal_err(code, Some(encoding));
                    return None;
                }
            }
        }
        Some(input)
    }

    /// Create a new input stream based on a file or an URL.
    #[doc(alias = "xmlNewInputFromFile")]
    pub fn from_file(ctxt: &mut XmlParserCtxt, filename: &str) -> Option<Self> {
        let buf = match XmlParserInputBuffer::from_uri(filename, XmlCharEncoding::None) {
            Ok(buf) => buf,
            Err(code) => {
                ctxt.ctxt_err_io(code, Some(filename));
                return None;
            }
        };

        let mut input = Self::new(Some(ctxt))?;
        input.buf = Some(buf);

        let directory = parser_get_directory(filename);
        input.filename = Some(filename.to_owned());
        input.directory = directory.clone();
        if ctxt.directory.is_none() {
            ctxt.directory = directory;
        }
        Some(input)
    }

    /// Create a new input stream based on an entity.
    ///
    /// Entities without content are loaded through the external entity loader,
    /// or rejected if they cannot be.
    #[doc(alias = "xmlNewEntityInputStream")]
    pub fn from_entity(ctxt: &mut XmlParserCtxt, entity: Rc<RefCell<XmlEntity>>) -> Option<Self> {
        let ent = entity.borrow();
        let Some(content) = ent.content.as_deref() else {
            match ent.etype {
                XmlEntityType::XmlExternalGeneralUnparsedEntity => {
                    xml_err_internal!(ctxt, "Cannot parse entity {}\n", ent.name);
                }
                XmlEntityType::XmlExternalGeneralParsedEntity
                | XmlEntityType::XmlExternalParameterEntity => {
                    let (uri, external_id) = (ent.uri.clone(), ent.external_id.clone());
                    drop(ent);
                    let mut input =
                        ctxt.load_external_entity(uri.as_deref(), external_id.as_deref())?;
                    input.entity = Some(entity);
                    return Some(input);
                }
                XmlEntityType::XmlInternalGeneralEntity => {
                    xml_err_internal!(ctxt, "Internal entity {} without content !\n", ent.name);
                }
                XmlEntityType::XmlInternalParameterEntity => {
                    xml_err_internal!(
                        ctxt,
                        "Internal parameter entity {} without content !\n",
                        ent.name
                    );
                }
                XmlEntityType::XmlInternalPredefinedEntity => {
                    xml_err_internal!(ctxt, "Predefined entity {} without content !\n", ent.name);
                }
            }
            return None;
        };

        let Some(buf) = XmlParserInputBuffer::from_str(content) else {
            ctxt.err_memory();
            return None;
        };
        let filename = ent.uri.clone();
        drop(ent);

        let mut input = Self::new(Some(ctxt))?;
        input.buf = Some(buf);
        input.filename = filename;
        input.entity = Some(entity);
        Some(input)
    }

    /// The whole decoded buffer, including the bytes before the cursor.
    pub fn base_contents(&self) -> &[u8] {
        self.buf.as_ref().map_or(&[], |buf| buf.buffer.as_ref())
    }

    /// The decoded bytes from the cursor on.
    pub fn current_contents(&self) -> &[u8] {
        let content = self.base_contents();
        &content[self.cur.min(content.len())..]
    }

    /// Return the offset of `cur` from the start of the decoded buffer.
    pub fn offset_from_base(&self) -> usize {
        self.cur
    }

    /// Return the number of decoded bytes after the cursor.
    pub fn remainder_len(&self) -> usize {
        self.current_contents().len()
    }

    /// The byte at the cursor, or 0 at the end of the buffer.
    pub fn current_byte(&self) -> u8 {
        self.nth_byte(0)
    }

    pub fn nth_byte(&self, nth: usize) -> u8 {
        self.current_contents().get(nth).copied().unwrap_or(0)
    }

    /// The entity this stream reads from, if any.
    pub fn entity(&self) -> Option<&Rc<RefCell<XmlEntity>>> {
        self.entity.as_ref()
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn directory(&self) -> Option<&str> {
        self.directory.as_deref()
    }

    /// The version of the text declaration of this entity.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// The encoding named by the text declaration of this entity.
    pub fn encoding(&self) -> Option<&str> {
        self.encoding.as_deref()
    }

    /// Whether the stream still pulls from a source or through a decoder.
    /// Streams over memory are never grown nor shrunk by the context.
    pub(crate) fn is_live(&self) -> bool {
        self.buf
            .as_ref()
            .is_some_and(|buf| buf.encoder().is_some() || buf.has_reader())
    }

    /// This function removes used input for the parser.
    #[doc(alias = "xmlParserInputShrink")]
    #[deprecated = "Use XmlParserCtxt::force_shrink"]
    pub fn shrink(&mut self) {
        let Some(buf) = self.buf.as_mut() else {
            return;
        };

        let mut used = self.cur;
        // Do not shrink on large buffers whose only a tiny fraction was consumed
        if used > INPUT_CHUNK {
            let res = buf.buffer.trim_head(used - LINE_LEN);
            if res > 0 {
                used -= res;
                self.consumed = self.consumed.saturating_add(res as u64);
            }
        }

        if buf.buffer.len() <= INPUT_CHUNK {
            buf.read(2 * INPUT_CHUNK);
        }
        self.cur = used.min(buf.buffer.len());
    }

    /// This function increase the input for the parser. It tries to
    /// preserve pointers to the input buffer, and keep already read data.
    ///
    /// Returns the amount of char read, or -1 in case of error, 0 indicate the
    /// end of this entity
    #[doc(alias = "xmlParserInputGrow")]
    #[deprecated = "Use XmlParserCtxt::force_grow"]
    pub fn grow(&mut self, len: i32) -> i32 {
        if len < 0 {
            return -1;
        }
        // Don't grow memory buffers.
        if !self.is_live() {
            return 0;
        }
        let Some(buf) = self.buf.as_mut() else {
            return -1;
        };
        if buf.buffer.len() > self.cur + INPUT_CHUNK {
            return 0;
        }
        let ret = buf.grow(len as usize);
        debug_assert!(self.cur <= buf.buffer.len());
        ret
    }

    /// Resolve the handler of an EBCDIC stream.
    ///
    /// The first bytes are converted with the generic EBCDIC code page and searched for
    /// the encoding declaration. If none is found, the generic EBCDIC handler is returned.
    /// `Ok(None)` means the declaration names UTF-8.
    #[doc(alias = "xmlDetectEBCDIC")]
    pub(crate) fn detect_ebcdic(&self) -> Result<Option<XmlCharEncodingHandler>, XmlParserErrors> {
        let mut out = [0u8; 200];

        let mut handler = lookup_char_encoding_handler(XmlCharEncoding::EBCDIC)?;
        let Some(probe) = handler.as_mut() else {
            return Ok(None);
        };
        // Return the EBCDIC handler if decoding failed. The error will be reported later.
        let Ok((_, outlen)) = probe.decode(self.current_contents(), &mut out[..199], false) else {
            return lookup_char_encoding_handler(XmlCharEncoding::EBCDIC);
        };
        let out = &out[..outlen];
        let at = |i: usize| out.get(i).copied().unwrap_or(0);

        let mut i = 0;
        while i < out.len() {
            if out[i] == b'>' {
                break;
            }
            if out[i..].starts_with(b"encoding") {
                i += 8;
                while matches!(at(i), b' ' | b'\t' | b'\n' | b'\r') {
                    i += 1;
                }
                if at(i) != b'=' {
                    break;
                }
                i += 1;
                while matches!(at(i), b' ' | b'\t' | b'\n' | b'\r') {
                    i += 1;
                }
                let quote = at(i);
                if quote != b'\'' && quote != b'"' {
                    break;
                }
                i += 1;
                let start = i;
                while matches!(at(i), b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'.' | b'_' | b'-')
                {
                    i += 1;
                }
                if at(i) != quote {
                    break;
                }
                // the name only holds ASCII characters
                let name = String::from_utf8_lossy(&out[start..i]);
                log::debug!("EBCDIC declaration names '{name}'");
                return open_char_encoding_handler(&name);
            }
            i += 1;
        }

        // Encoding handlers are stateful, so we have to recreate them.
        lookup_char_encoding_handler(XmlCharEncoding::EBCDIC)
    }

    /// Install `handler` as the decoder of this stream.
    ///
    /// A handler named UTF-8 is the same as no handler. If another handler is already
    /// active, the bytes it has not converted yet go through `handler` instead.
    /// Otherwise the decoded bytes after the cursor are reinterpreted as raw input.
    #[doc(alias = "xmlSwitchInputEncoding")]
    pub(crate) fn switch_encoding_handler(
        &mut self,
        handler: Option<XmlCharEncodingHandler>,
    ) -> Result<(), XmlParserErrors> {
        self.flags |= XML_INPUT_HAS_ENCODING;
        let Some(buf) = self.buf.as_mut() else {
            return Err(XmlParserErrors::XmlErrInternalError);
        };

        // UTF-8 requires no encoding handler.
        let handler = handler.filter(|handler| !handler.name().eq_ignore_ascii_case("UTF-8"));

        let current = buf.encoder().map(|encoder| encoder.name().to_owned());
        match (current, handler) {
            (None, None) => Ok(()),
            (Some(current), Some(handler)) if current == handler.name() => Ok(()),
            (Some(current), handler) => {
                log::debug!(
                    "switching encoding from {current} to {}",
                    handler.as_ref().map_or("UTF-8", |h| h.name())
                );
                buf.switch_handler(handler).map(|_| ())
            }
            (None, Some(handler)) => {
                log::debug!("switching encoding to {}", handler.name());
                if buf.buffer.is_empty() {
                    return buf.switch_handler(Some(handler)).map(|_| ());
                }
                // Shrink the current input buffer.
                // Move it as the raw buffer and decode it again.
                let processed = self.cur;
                let res = buf.reinterpret(processed, handler);
                self.consumed = self.consumed.saturating_add(processed as u64);
                self.cur = 0;
                res.map(|_| ())
            }
        }
    }

    /// Build the excerpt of the current line shown under an error report,
    /// with a caret under the cursor.
    pub(crate) fn error_context(&self) -> Option<String> {
        let content = self.base_contents();
        if content.is_empty() {
            return None;
        }
        let at = |i: usize| content.get(i).copied().unwrap_or(0);
        let pos = self.cur.min(content.len());

        // skip backwards over any end-of-lines
        let mut cur = pos;
        while cur > 0 && matches!(at(cur), b'\n' | b'\r') {
            cur -= 1;
        }
        // search backwards for beginning-of-line
        let mut n = 0;
        while n < LINE_LEN && cur > 0 && !matches!(at(cur), b'\n' | b'\r') {
            cur -= 1;
            n += 1;
        }
        if n > 0 && matches!(at(cur), b'\n' | b'\r') {
            cur += 1;
        } else {
            // skip over continuation bytes
            while cur < pos && at(cur) & 0xC0 == 0x80 {
                cur += 1;
            }
        }
        let col = pos.saturating_sub(cur);

        let start = cur;
        let mut end = start;
        while end < content.len() && end - start < LINE_LEN && !matches!(at(end), 0 | b'\n' | b'\r')
        {
            end += 1;
        }
        let line = String::from_utf8_lossy(&content[start..end]);
        let pointer = content[start..end]
            .iter()
            .take(col)
            .map(|&b| if b == b'\t' { '\t' } else { ' ' })
            .collect::<String>();
        Some(format!("{line}\n{pointer}^\n"))
    }
}

impl XmlParserCtxt {
    /// Push an input stream onto the stack.
    ///
    /// Returns -1 in case of error or the index in the input stack
    #[doc(alias = "xmlPushInput")]
    pub fn push_input(&mut self, input: XmlParserInput) -> i32 {
        if get_parser_debug_entities() != 0 {
            if let (Some(_), Some(cur)) = (input.filename.as_ref(), self.input_tab.last()) {
                generic_error!(
                    "{}({}): ",
                    cur.filename.as_deref().unwrap_or("(null)"),
                    cur.line
                );
            }
            let name = input
                .entity
                .as_ref()
                .map(|ent| ent.borrow().name.clone())
                .or_else(|| input.filename.clone())
                .unwrap_or_default();
            generic_error!("Pushing input {} : {}\n", self.input_tab.len() + 1, name);
        }
        let before = self.input_tab.len();
        let ret = self.input_push(input);
        if ret < 0 || self.input_tab.len() == before {
            return -1;
        }
        ret
    }
}
