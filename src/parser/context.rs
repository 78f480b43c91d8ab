use crate::{
    encoding::{
        XmlCharEncoding, XmlCharEncodingHandler, lookup_char_encoding_handler,
        open_char_encoding_handler,
    },
    entities::{XML_ENT_CHECKED, XML_ENT_EXPANDING, XML_ENT_PARSED, XmlEntityType},
    error::{XmlError, XmlParserErrors},
    generic_error,
    globals::{
        GenericErrorContext, StructuredError, get_do_validity_checking_default_value,
        get_keep_blanks_default_value, get_line_numbers_default_value,
        get_load_ext_dtd_default_value, get_parser_debug_entities,
        get_pedantic_parser_default_value, get_substitute_entities_default_value,
    },
};

use super::{
    INPUT_CHUNK, LINE_LEN, XML_ENT_FIXED_COST, XML_INPUT_AUTO_ENCODING, XML_INPUT_AUTO_OTHER,
    XML_INPUT_AUTO_UTF8, XML_INPUT_AUTO_UTF16BE, XML_INPUT_AUTO_UTF16LE, XML_INPUT_ENCODING_ERROR,
    XML_INPUT_HAS_ENCODING, XML_INPUT_PROGRESSIVE, XML_INPUT_USES_ENC_DECL,
    XML_MAX_AMPLIFICATION_DEFAULT, XML_MAX_ERRORS, XML_MAX_LOOKUP_LIMIT, XML_MAX_TEXT_LENGTH,
    XML_PARSE_ALL_OPTIONS, XML_PARSER_MAX_DEPTH, XML_PARSER_MAX_DEPTH_HUGE, XmlParserInput,
    XmlParserInputState, XmlParserOption, XmlSAXHandler, XmlValidCtxt, get_external_entity_loader,
    xml_err_encoding_int, xml_fatal_err_msg,
};

/// Limits and defaults applied to a parser context when it is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XmlParserConfig {
    /// A combination of [`XmlParserOption`]s.
    pub options: i32,
    /// Allowed ratio between the size of expanded entities and the document.
    pub max_amplification: u32,
    pub max_errors: u16,
    pub max_warnings: u16,
    /// Lookahead the context tries to keep decoded.
    pub input_chunk: usize,
    /// Bytes kept before the cursor when the buffer is shrunk.
    pub line_len: usize,
    /// Maximum lookahead without `XML_PARSE_HUGE`.
    pub lookup_limit: usize,
}

impl XmlParserConfig {
    /// Snapshot the thread-local legacy defaults into a configuration.
    pub fn from_globals() -> Self {
        let mut options = 0;
        if get_load_ext_dtd_default_value() != 0 {
            options |= XmlParserOption::XmlParseDTDLoad as i32;
        }
        if get_do_validity_checking_default_value() != 0 {
            options |= XmlParserOption::XmlParseDTDValid as i32;
        }
        if get_pedantic_parser_default_value() != 0 {
            options |= XmlParserOption::XmlParsePedantic as i32;
        }
        if get_keep_blanks_default_value() == 0 {
            options |= XmlParserOption::XmlParseNoBlanks as i32;
        }
        if get_substitute_entities_default_value() != 0 {
            options |= XmlParserOption::XmlParseNoEnt as i32;
        }
        Self {
            options,
            ..Default::default()
        }
    }
}

impl Default for XmlParserConfig {
    fn default() -> Self {
        Self {
            options: 0,
            max_amplification: XML_MAX_AMPLIFICATION_DEFAULT,
            max_errors: XML_MAX_ERRORS,
            max_warnings: XML_MAX_ERRORS,
            input_chunk: INPUT_CHUNK,
            line_len: LINE_LEN,
            lookup_limit: XML_MAX_LOOKUP_LIMIT,
        }
    }
}

/// The parser context.
///
/// # Note
/// Only the input side of the parser state lives here: the stack of input
/// streams, the encoding state, the resource counters and the error state.
#[doc(alias = "xmlParserCtxt")]
pub struct XmlParserCtxt {
    // The SAX handler
    pub sax: Option<Box<XmlSAXHandler>>,
    // For SAX interface only, used by DOM build
    pub(crate) user_data: Option<GenericErrorContext>,
    // is the document well formed
    pub well_formed: i32,
    // shall we replace entities ?
    pub(crate) replace_entities: i32,
    // the XML version string
    pub version: Option<String>,
    // the declared encoding, if any
    pub encoding: Option<String>,
    // standalone document
    pub standalone: i32,

    // stack of inputs, the current one is the last
    pub input_tab: Vec<XmlParserInput>,

    // error code
    pub err_no: i32,

    // is the document valid
    pub valid: i32,
    // shall we try to validate ?
    pub validate: i32,
    // The validity context
    pub vctxt: XmlValidCtxt,

    // current type of input
    pub instate: XmlParserInputState,

    // the data directory
    pub(crate) directory: Option<String>,

    // ugly but ...
    pub keep_blanks: i32,
    // SAX callbacks are disabled
    pub disable_sax: i32,
    // to prevent entity substitution loops
    pub depth: i32,
    // signal pedantic warnings
    pub pedantic: i32,
    // should the external subset be loaded
    pub loadsubset: i32,
    // set line number in element content
    pub linenumbers: i32,
    // run in recovery mode
    pub recovery: i32,
    // is this a progressive parsing
    pub progressive: i32,
    // Extra options
    pub options: i32,

    // last error
    pub last_error: XmlError,

    // number of bytes read from external entities
    pub sizeentities: u64,
    // unique identifier for the next input
    pub(crate) input_id: i32,
    // volume of entity copy
    pub sizeentcopy: u64,

    pub nb_errors: u16,
    pub nb_warnings: u16,
    // maximum amplification factor
    pub max_ampl: u32,

    pub(crate) error_handler: Option<StructuredError>,
    pub(crate) error_ctxt: Option<GenericErrorContext>,

    pub config: XmlParserConfig,
}

/// The outcome of decoding one UTF-8 sequence.
enum Utf8Seq {
    Char(u32, usize),
    /// The buffer ends in the middle of a sequence that is valid so far.
    Incomplete,
    Invalid,
}

/// Decode the sequence starting with the non-ASCII byte `s[0]`.
fn decode_utf8(s: &[u8]) -> Utf8Seq {
    let c = s[0] as u32;
    let at = |i: usize| s.get(i).map(|&b| b as u32);
    let Some(c1) = at(1) else {
        return Utf8Seq::Incomplete;
    };
    if c1 & 0xC0 != 0x80 {
        return Utf8Seq::Invalid;
    }
    if c < 0xE0 {
        // 2-byte code
        if c < 0xC2 {
            return Utf8Seq::Invalid;
        }
        return Utf8Seq::Char(((c & 0x1F) << 6) | (c1 & 0x3F), 2);
    }

    let Some(c2) = at(2) else {
        return Utf8Seq::Incomplete;
    };
    if c2 & 0xC0 != 0x80 {
        return Utf8Seq::Invalid;
    }
    if c < 0xF0 {
        // 3-byte code
        let val = ((c & 0x0F) << 12) | ((c1 & 0x3F) << 6) | (c2 & 0x3F);
        if val < 0x800 || (0xD800..0xE000).contains(&val) {
            return Utf8Seq::Invalid;
        }
        return Utf8Seq::Char(val, 3);
    }

    if c >= 0xF5 {
        return Utf8Seq::Invalid;
    }
    let Some(c3) = at(3) else {
        return Utf8Seq::Incomplete;
    };
    if c3 & 0xC0 != 0x80 {
        return Utf8Seq::Invalid;
    }
    // 4-byte code
    let val = ((c & 0x07) << 18) | ((c1 & 0x3F) << 12) | ((c2 & 0x3F) << 6) | (c3 & 0x3F);
    if !(0x10000..0x110000).contains(&val) {
        return Utf8Seq::Invalid;
    }
    Utf8Seq::Char(val, 4)
}

/// Find the handler to use for `enc` on `input`.
fn resolve_encoding(
    input: &XmlParserInput,
    enc: XmlCharEncoding,
) -> Result<Option<XmlCharEncodingHandler>, XmlParserErrors> {
    match enc {
        XmlCharEncoding::None | XmlCharEncoding::UTF8 | XmlCharEncoding::ASCII => Ok(None),
        XmlCharEncoding::EBCDIC => input.detect_ebcdic(),
        _ => lookup_char_encoding_handler(enc),
    }
}

impl XmlParserCtxt {
    /// Allocate and initialize a new parser context with the current defaults.
    #[doc(alias = "xmlNewParserCtxt")]
    pub fn new() -> Self {
        Self::with_config(XmlParserConfig::from_globals())
    }

    /// Allocate and initialize a new parser context with `config`.
    #[doc(alias = "xmlInitSAXParserCtxt")]
    pub fn with_config(config: XmlParserConfig) -> Self {
        let mut ctxt = Self {
            sax: Some(Box::new(XmlSAXHandler::sax2())),
            user_data: None,
            well_formed: 1,
            replace_entities: 0,
            version: None,
            encoding: None,
            standalone: -1,
            input_tab: Vec::with_capacity(5),
            err_no: 0,
            valid: 1,
            validate: 0,
            vctxt: XmlValidCtxt::default(),
            instate: XmlParserInputState::XmlParserStart,
            directory: None,
            keep_blanks: 1,
            disable_sax: 0,
            depth: 0,
            pedantic: 0,
            loadsubset: 0,
            linenumbers: get_line_numbers_default_value(),
            recovery: 0,
            progressive: 0,
            options: 0,
            last_error: XmlError::default(),
            sizeentities: 0,
            input_id: 1,
            sizeentcopy: 0,
            nb_errors: 0,
            nb_warnings: 0,
            max_ampl: config.max_amplification.max(1),
            error_handler: None,
            error_ctxt: None,
            config,
        };
        ctxt.use_options(config.options);
        ctxt
    }

    /// The declared encoding, if any.
    pub fn encoding(&self) -> Option<&str> {
        self.encoding.as_deref()
    }

    /// The directory of the document entity, used to resolve relative references.
    pub fn directory(&self) -> Option<&str> {
        self.directory.as_deref()
    }

    pub fn set_user_data(&mut self, data: Option<GenericErrorContext>) {
        self.user_data = data;
    }

    /// The current input stream.
    pub fn input(&self) -> Option<&XmlParserInput> {
        self.input_tab.last()
    }

    pub fn input_mut(&mut self) -> Option<&mut XmlParserInput> {
        self.input_tab.last_mut()
    }

    /// The byte at the cursor of the current input, or 0.
    pub fn current_byte(&self) -> u8 {
        self.input().map_or(0, |input| input.current_byte())
    }

    pub fn nth_byte(&self, nth: usize) -> u8 {
        self.input().map_or(0, |input| input.nth_byte(nth))
    }

    /// The decoded bytes from the cursor of the current input on.
    pub fn content_bytes(&self) -> &[u8] {
        self.input().map_or(&[], |input| input.current_contents())
    }

    /// Mirror `options` into the legacy flags.
    ///
    /// Returns the option bits which were not recognized.
    #[doc(alias = "xmlCtxtUseOptions")]
    pub fn use_options(&mut self, options: i32) -> i32 {
        let has = |opt: XmlParserOption| options & opt as i32 != 0;

        self.options = options & XML_PARSE_ALL_OPTIONS;
        self.recovery = has(XmlParserOption::XmlParseRecover) as i32;
        self.replace_entities = has(XmlParserOption::XmlParseNoEnt) as i32;
        self.loadsubset = has(XmlParserOption::XmlParseDTDLoad) as i32;
        self.validate = has(XmlParserOption::XmlParseDTDValid) as i32;
        self.pedantic = has(XmlParserOption::XmlParsePedantic) as i32;
        self.keep_blanks = !has(XmlParserOption::XmlParseNoBlanks) as i32;
        self.linenumbers = 1;

        options & !XML_PARSE_ALL_OPTIONS
    }

    /// Reset a parser context.
    ///
    /// Inputs are dropped and every counter goes back to its initial value.
    /// Handlers and options are kept.
    #[doc(alias = "xmlCtxtReset")]
    pub fn reset(&mut self) {
        self.input_tab.clear();
        self.well_formed = 1;
        self.version = None;
        self.encoding = None;
        self.standalone = -1;
        self.err_no = 0;
        self.valid = 1;
        self.instate = XmlParserInputState::XmlParserStart;
        self.directory = None;
        self.disable_sax = 0;
        self.depth = 0;
        self.last_error.reset();
        self.sizeentities = 0;
        self.sizeentcopy = 0;
        self.nb_errors = 0;
        self.nb_warnings = 0;
        self.use_options(self.options);
    }

    /// Set the maximum amplification factor for entity expansion.
    ///
    /// Returns -1 for a factor of 0.
    #[doc(alias = "xmlCtxtSetMaxAmplification")]
    pub fn set_max_amplification(&mut self, max_ampl: u32) -> i32 {
        if max_ampl == 0 {
            return -1;
        }
        self.max_ampl = max_ampl;
        0
    }

    /// Blocks further parser processing don't override error.
    #[doc(alias = "xmlHaltParser")]
    pub fn halt(&mut self) {
        self.instate = XmlParserInputState::XmlParserEOF;
        self.disable_sax = 2;
    }

    /// Blocks further parser processing
    #[doc(alias = "xmlStopParser")]
    pub fn stop(&mut self) {
        self.halt();
        if self.err_no != XmlParserErrors::XmlErrNoMemory as i32 {
            self.err_no = XmlParserErrors::XmlErrUserStop as i32;
        }
    }

    /// Grow the input buffer.
    ///
    /// Returns the number of bytes read or -1 in case of error.
    #[doc(alias = "xmlParserGrow")]
    pub fn force_grow(&mut self) -> i32 {
        if self.disable_sax > 1 {
            return 0;
        }
        let progressive = self.progressive != 0 && self.input_tab.len() <= 1;
        let huge = self.options & XmlParserOption::XmlParseHuge as i32 != 0;
        let config = self.config;
        let Some(input) = self.input_tab.last() else {
            return 0;
        };
        let cur_end = input.remainder_len();
        let cur_base = input.offset_from_base();
        let Some(buf) = input.buf.as_ref() else {
            return 0;
        };
        // Don't grow push parser buffer.
        if progressive {
            return 0;
        }
        // Don't grow memory buffers.
        if !input.is_live() {
            return 0;
        }
        if buf.error().is_err() {
            return -1;
        }

        if (cur_end > config.lookup_limit || cur_base > config.lookup_limit) && !huge {
            xml_fatal_err_msg!(
                self,
                XmlParserErrors::XmlErrResourceLimit,
                "Buffer size limit exceeded, try XML_PARSE_HUGE\n"
            );
            self.halt();
            return -1;
        }

        if cur_end >= config.input_chunk {
            return 0;
        }

        let Some(buf) = self.input_tab.last_mut().and_then(|input| input.buf.as_mut()) else {
            return 0;
        };
        let ret = buf.grow(config.input_chunk);
        if ret < 0 {
            let code = buf.error();
            self.ctxt_err_io(code, None);
        }
        ret
    }

    /// Grow the input buffer if the lookahead runs short.
    pub fn grow(&mut self) {
        let chunk = self.config.input_chunk;
        if self.progressive == 0 && self.input().is_some_and(|input| input.remainder_len() < chunk)
        {
            self.force_grow();
        }
    }

    /// Shrink the input buffer.
    #[doc(alias = "xmlParserShrink")]
    pub fn force_shrink(&mut self) {
        let progressive = self.progressive != 0 && self.input_tab.len() <= 1;
        let config = self.config;
        let Some(input) = self.input_tab.last_mut() else {
            return;
        };
        let used = input.cur;
        // Don't shrink pull parser memory buffers.
        if !progressive && !input.is_live() {
            return;
        }
        let Some(buf) = input.buf.as_mut() else {
            return;
        };

        // Do not shrink on large buffers whose only a tiny fraction was consumed
        if used > config.input_chunk {
            let res = buf.buffer.trim_head(used - config.line_len);
            log::debug!("shrinking input {}: {res} bytes discarded", input.id);
            input.consumed = input.consumed.saturating_add(res as u64);
            input.cur -= res;
        }
    }

    /// Shrink the input buffer once most of it was consumed.
    pub fn shrink(&mut self) {
        let chunk = self.config.input_chunk;
        if self.progressive == 0
            && self
                .input()
                .is_some_and(|input| input.cur > 2 * chunk && input.remainder_len() < 2 * chunk)
        {
            self.force_shrink();
        }
    }

    /// Report an encoding error once per input and skip the offending byte.
    fn encoding_error(&mut self) {
        let Some(input) = self.input_tab.last_mut() else {
            return;
        };
        if input.flags & XML_INPUT_ENCODING_ERROR == 0 {
            input.flags |= XML_INPUT_ENCODING_ERROR;
            self.ctxt_err_io(XmlParserErrors::XmlErrInvalidEncoding, None);
        }
    }

    /// Whether the current byte is a pushed CR ending the buffer.
    /// It may be followed by a LF in the next chunk.
    fn pending_cr(&self) -> bool {
        self.instate != XmlParserInputState::XmlParserEOF
            && self.input().is_some_and(|input| {
                input.flags & XML_INPUT_PROGRESSIVE != 0 && input.current_contents() == b"\r"
            })
    }

    /// Skip to the next character.
    #[doc(alias = "xmlNextChar")]
    pub fn skip_char(&mut self) {
        let chunk = self.config.input_chunk;
        let Some(input) = self.input() else {
            return;
        };
        if input.remainder_len() < chunk {
            self.force_grow();
        }
        if self.pending_cr() {
            return;
        }
        let Some(input) = self.input_tab.last_mut() else {
            return;
        };
        let rest = input.current_contents();
        let Some(&c) = rest.first() else {
            return;
        };

        if c < 0x80 {
            let crlf = c == b'\r' && rest.get(1) == Some(&b'\n');
            if c == b'\n' || c == b'\r' {
                // 2.11 End-of-Line Handling
                input.cur += if crlf { 2 } else { 1 };
                input.line += 1;
                input.col = 1;
            } else {
                input.cur += 1;
                input.col += 1;
            }
            return;
        }

        let seq = decode_utf8(rest);
        input.col += 1;
        match seq {
            Utf8Seq::Char(_, len) => input.cur += len,
            Utf8Seq::Incomplete | Utf8Seq::Invalid => {
                input.cur += 1;
                self.encoding_error();
            }
        }
    }

    /// The current char value, if using UTF-8 this may actually span multiple bytes
    /// in the input buffer.
    ///
    /// Implement the end of line normalization:
    ///
    /// 2.11 End-of-Line Handling
    /// Wherever an external parsed entity or the literal entity value
    /// of an internal parsed entity contains either the literal two-character
    /// sequence "#xD#xA" or a standalone literal #xD, an XML processor
    /// must pass to the application the single character #xA.
    ///
    /// The cursor is not moved; pass the returned length to [`advance_char`](Self::advance_char).
    /// A length of 0 means there is no complete character available.
    ///
    /// Returns the current char value and its length
    #[doc(alias = "xmlCurrentChar")]
    pub fn current_char(&mut self) -> (char, usize) {
        let chunk = self.config.input_chunk;
        let Some(input) = self.input() else {
            return ('\0', 0);
        };
        if input.remainder_len() < chunk {
            self.force_grow();
        }
        if self.pending_cr() {
            return ('\0', 0);
        }
        let Some(input) = self.input() else {
            return ('\0', 0);
        };
        let rest = input.current_contents();
        let Some(&c) = rest.first() else {
            return ('\0', 0);
        };

        if c < 0x80 {
            return match c {
                b'\r' => ('\n', if rest.get(1) == Some(&b'\n') { 2 } else { 1 }),
                0 => {
                    xml_err_encoding_int!(
                        self,
                        XmlParserErrors::XmlErrInvalidChar,
                        "Char 0x{:X} out of allowed range\n",
                        0
                    );
                    ('\0', 1)
                }
                _ => (c as char, 1),
            };
        }

        match decode_utf8(rest) {
            Utf8Seq::Char(val, len) => (
                char::from_u32(val).unwrap_or(char::REPLACEMENT_CHARACTER),
                len,
            ),
            // An encoding problem may arise from a truncated input buffer
            // splitting a character in the middle. Wait for more data.
            Utf8Seq::Incomplete => ('\0', 0),
            Utf8Seq::Invalid => {
                self.encoding_error();
                (char::REPLACEMENT_CHARACTER, 1)
            }
        }
    }

    /// Move the cursor past a character of `len` bytes returned by
    /// [`current_char`](Self::current_char).
    #[doc(alias = "NEXTL")]
    pub fn advance_char(&mut self, len: usize) {
        let Some(input) = self.input_tab.last_mut() else {
            return;
        };
        let len = len.min(input.remainder_len());
        if len == 0 {
            return;
        }
        if matches!(input.current_byte(), b'\n' | b'\r') {
            input.line += 1;
            input.col = 1;
        } else {
            input.col += 1;
        }
        input.cur += len;
    }

    /// Consume the current character if `f` accepts it.
    pub fn consume_char_if(&mut self, f: impl FnOnce(&mut Self, char) -> bool) -> Option<char> {
        let (c, len) = self.current_char();
        if len == 0 || !f(self, c) {
            return None;
        }
        self.advance_char(len);
        Some(c)
    }

    /// Advance the cursor by `nth` bytes which hold no line break.
    pub fn advance(&mut self, nth: usize) {
        if self.content_bytes().len() < nth {
            self.force_grow();
        }
        if let Some(input) = self.input_tab.last_mut() {
            let nth = nth.min(input.remainder_len());
            input.cur += nth;
            input.col += nth as i32;
        }
    }

    /// Advance the current pointer.
    /// If `'\n'` is found, line number is also increased.
    pub fn advance_with_line_handling(&mut self, nth: usize) {
        if self.content_bytes().len() < nth {
            self.force_grow();
        }
        if let Some(input) = self.input_tab.last_mut() {
            let nth = nth.min(input.remainder_len());
            let skipped = &input.current_contents()[..nth];
            let lines = skipped.iter().filter(|&&b| b == b'\n').count();
            let tail = skipped.iter().rev().take_while(|&&b| b != b'\n').count();
            if lines > 0 {
                input.line += lines as i32;
                input.col = 1 + tail as i32;
            } else {
                input.col += nth as i32;
            }
            input.cur += nth;
        }
    }

    /// The current char value of a UTF-8 byte string.
    ///
    /// Invalid UTF-8 is read as ISO-Latin-1, one byte at a time.
    ///
    /// Returns the current char value and its length
    #[doc(alias = "xmlStringCurrentChar")]
    pub fn string_current_char(&self, cur: &[u8]) -> (char, usize) {
        let Some(&c) = cur.first() else {
            return ('\0', 0);
        };
        if c < 0x80 {
            return (c as char, 1);
        }
        match decode_utf8(cur) {
            Utf8Seq::Char(val, len) => (
                char::from_u32(val).unwrap_or(char::REPLACEMENT_CHARACTER),
                len,
            ),
            Utf8Seq::Incomplete | Utf8Seq::Invalid => (c as char, 1),
        }
    }

    /// Skip whitespace in the input stream.
    ///
    /// Finished entity inputs met on the way are popped.
    ///
    /// Returns the number of space chars skipped
    #[doc(alias = "xmlSkipBlankChars")]
    pub fn skip_blanks(&mut self) -> usize {
        let mut res = 0usize;
        while self.instate != XmlParserInputState::XmlParserEOF {
            match self.current_byte() {
                b'\r' if self.pending_cr() => break,
                b' ' | b'\t' | b'\n' | b'\r' => {
                    self.skip_char();
                    res = res.saturating_add(1);
                }
                0 if self.content_bytes().is_empty() => {
                    if self.force_grow() > 0 {
                        continue;
                    }
                    if self.input_tab.len() <= 1 {
                        break;
                    }
                    self.pop_input();
                }
                _ => break,
            }
        }
        res
    }

    /// Pushes a new parser input on top of the input stack
    ///
    /// Returns -1 in case of error, the index in the stack otherwise
    #[doc(alias = "inputPush")]
    pub fn input_push(&mut self, mut value: XmlParserInput) -> i32 {
        let depth = self.input_tab.len();
        let huge = self.options & XmlParserOption::XmlParseHuge as i32 != 0;
        if (depth > XML_PARSER_MAX_DEPTH && !huge) || depth > XML_PARSER_MAX_DEPTH_HUGE {
            xml_fatal_err_msg!(
                self,
                XmlParserErrors::XmlErrEntityLoop,
                "Maximum entity nesting depth exceeded\n"
            );
            self.halt();
            return -1;
        }
        if let Some(parent) = self.input_tab.last() {
            value.parent_consumed = parent
                .parent_consumed
                .saturating_add(parent.consumed)
                .saturating_add(parent.cur as u64);
        }
        self.input_tab.push(value);
        depth as i32
    }

    /// Pops the top parser input from the input stack
    ///
    /// Returns the input just removed
    #[doc(alias = "inputPop")]
    pub fn input_pop(&mut self) -> Option<XmlParserInput> {
        self.input_tab.pop()
    }

    /// The current input pointed by `self.input_tab.last()` came to an end
    /// pop it and return the next char.
    ///
    /// Returns the current byte in the parser context
    #[doc(alias = "xmlPopInput")]
    pub fn pop_input(&mut self) -> u8 {
        if self.input_tab.len() <= 1 {
            return 0;
        }
        if get_parser_debug_entities() != 0 {
            generic_error!("Popping input {}\n", self.input_tab.len());
        }

        if let Some(entity) = self.input().and_then(|input| input.entity().cloned()) {
            let consumed = self.input().map_or(0, |input| {
                input.consumed.saturating_add(input.offset_from_base() as u64)
            });
            // Add to sizeentities when parsing an external entity for the first time.
            {
                let mut ent = entity.borrow_mut();
                if ent.etype == XmlEntityType::XmlExternalParameterEntity
                    && ent.flags & XML_ENT_PARSED == 0
                {
                    ent.flags |= XML_ENT_PARSED;
                    self.sizeentities = self.sizeentities.saturating_add(consumed);
                }
            }
            self.entity_check(consumed);
            let mut ent = entity.borrow_mut();
            ent.flags |= XML_ENT_CHECKED;
            ent.flags &= !XML_ENT_EXPANDING;
            ent.expanded_size = consumed;
        }

        self.input_pop();
        if self.content_bytes().is_empty() {
            self.force_grow();
        }
        self.current_byte()
    }

    /// Check for non-linear entity expansion behaviour.
    ///
    /// `extra` is the number of bytes about to be copied from the entity.
    ///
    /// Returns `true` if the amplification limit is exceeded and parsing was halted.
    #[doc(alias = "xmlParserEntityCheck")]
    pub fn entity_check(&mut self, extra: u64) -> bool {
        if self.options & XmlParserOption::XmlParseHuge as i32 != 0 {
            return false;
        }
        let Some(input) = self.input() else {
            return false;
        };

        // Only check entities once.
        let (checked, own_size) = match input.entity() {
            Some(ent) => {
                let ent = ent.borrow();
                (
                    ent.flags & XML_ENT_CHECKED != 0,
                    ent.etype == XmlEntityType::XmlExternalParameterEntity
                        && ent.flags & XML_ENT_PARSED == 0,
                )
            }
            None => (false, true),
        };
        if checked {
            return false;
        }

        // Compute the number of bytes parsed in the document, including
        // external entities which were already parsed.
        let mut consumed = input.parent_consumed;
        if own_size {
            consumed = consumed
                .saturating_add(input.consumed)
                .saturating_add(input.offset_from_base() as u64);
        }
        consumed = consumed.saturating_add(self.sizeentities);

        // Add extra cost and some fixed cost.
        self.sizeentcopy = self
            .sizeentcopy
            .saturating_add(extra)
            .saturating_add(XML_ENT_FIXED_COST);

        // Prevent entity exponential check, not just replacement while
        // parsing the DTD
        if self.sizeentcopy > XML_MAX_TEXT_LENGTH
            && (self.sizeentcopy == u64::MAX
                || self.sizeentcopy / self.max_ampl.max(1) as u64 > consumed)
        {
            xml_fatal_err_msg!(
                self,
                XmlParserErrors::XmlErrResourceLimit,
                "Maximum entity amplification factor exceeded, see xmlCtxtSetMaxAmplification.\n"
            );
            self.halt();
            return true;
        }
        false
    }

    /// Load an external entity through the registered loader.
    #[doc(alias = "xmlLoadExternalEntity")]
    pub fn load_external_entity(
        &mut self,
        url: Option<&str>,
        id: Option<&str>,
    ) -> Option<XmlParserInput> {
        let loader = get_external_entity_loader();
        loader(url, id, self)
    }

    /// Handle the encoding detection at the start of an input.
    ///
    /// A byte order mark is skipped. If the first bytes identify a fixed encoding,
    /// the input is switched to it.
    #[doc(alias = "xmlDetectEncoding")]
    pub fn detect_encoding(&mut self) {
        if self.force_grow() < 0 {
            return;
        }
        let Some(input) = self.input_tab.last_mut() else {
            return;
        };
        let Some(&[b0, b1, b2, b3]) = input.current_contents().first_chunk::<4>() else {
            return;
        };

        if input.flags & XML_INPUT_HAS_ENCODING != 0 {
            // If the encoding was already set, only skip the BOM which was
            // possibly decoded to UTF-8.
            if [b0, b1, b2] == [0xEF, 0xBB, 0xBF] {
                input.cur += 3;
            }
            return;
        }

        let (enc, bom_size, auto_flag) = match [b0, b1, b2, b3] {
            [0x00, 0x00, 0x00, 0x3C] => (XmlCharEncoding::UCS4BE, 0, XML_INPUT_AUTO_OTHER),
            [0x00, 0x3C, 0x00, 0x3F] => (XmlCharEncoding::UTF16BE, 0, XML_INPUT_AUTO_UTF16BE),
            [0x3C, 0x00, 0x00, 0x00] => (XmlCharEncoding::UCS4LE, 0, XML_INPUT_AUTO_OTHER),
            [0x3C, 0x00, 0x3F, 0x00] => (XmlCharEncoding::UTF16LE, 0, XML_INPUT_AUTO_UTF16LE),
            [0x4C, 0x6F, 0xA7, 0x94] => (XmlCharEncoding::EBCDIC, 0, XML_INPUT_AUTO_OTHER),
            [0xEF, 0xBB, 0xBF, _] => (XmlCharEncoding::UTF8, 3, XML_INPUT_AUTO_UTF8),
            [0xFE, 0xFF, _, _] => (XmlCharEncoding::UTF16BE, 2, XML_INPUT_AUTO_UTF16BE),
            [0xFF, 0xFE, _, _] => (XmlCharEncoding::UTF16LE, 2, XML_INPUT_AUTO_UTF16LE),
            _ => (XmlCharEncoding::None, 0, 0),
        };

        if bom_size > 0 {
            input.cur += bom_size;
        }
        if enc != XmlCharEncoding::None {
            log::debug!("detected {enc:?} on input {}", input.id);
            input.flags |= auto_flag;
            self.switch_encoding(enc);
        }
    }

    /// Set the encoding from a declaration in the document.
    ///
    /// If no encoding was set yet, switch the encoding. Otherwise, only warn
    /// about encoding mismatches.
    #[doc(alias = "xmlSetDeclaredEncoding")]
    pub fn set_declared_encoding(&mut self, mut encoding: String) {
        let flags = self.input().map_or(0, |input| input.flags);
        if flags & XML_INPUT_HAS_ENCODING == 0
            && self.options & XmlParserOption::XmlParseIgnoreEnc as i32 == 0
        {
            // The name is kept even if the switch fails.
            self.switch_encoding_name(&encoding);
            if let Some(input) = self.input_mut() {
                input.flags |= XML_INPUT_USES_ENC_DECL;
            }
        } else if flags & XML_INPUT_AUTO_ENCODING != 0 {
            let (allowed, auto_enc): (&[&str], &str) = match flags & XML_INPUT_AUTO_ENCODING {
                XML_INPUT_AUTO_UTF16LE => (&["UTF-16", "UTF-16LE", "UTF16"], "UTF-16LE"),
                XML_INPUT_AUTO_UTF16BE => (&["UTF-16", "UTF-16BE", "UTF16"], "UTF-16BE"),
                XML_INPUT_AUTO_UTF8 => (&["UTF-8", "UTF8"], "UTF-8"),
                _ => (&[], ""),
            };

            if !allowed.is_empty()
                && !allowed
                    .iter()
                    .any(|name| name.eq_ignore_ascii_case(&encoding))
            {
                super::xml_warning_msg!(
                    self,
                    XmlParserErrors::XmlWarEncodingMismatch,
                    "Encoding '{}' doesn't match auto-detected '{}'\n",
                    &encoding,
                    auto_enc
                );
                encoding = auto_enc.to_owned();
            }
        }

        self.encoding = Some(encoding);
    }

    /// The encoding of the current input as the application should see it.
    ///
    /// Returns `None` if nothing was set, which means UTF-8.
    #[doc(alias = "xmlGetActualEncoding")]
    pub fn get_actual_encoding(&self) -> Option<&str> {
        let input = self.input()?;
        if input.flags & XML_INPUT_USES_ENC_DECL != 0
            || (input.flags & XML_INPUT_AUTO_ENCODING != 0 && self.encoding.is_some())
        {
            // Preserve encoding exactly
            return self.encoding.as_deref();
        }
        if let Some(encoder) = input.buf.as_ref().and_then(|buf| buf.encoder()) {
            return Some(encoder.name());
        }
        if input.flags & XML_INPUT_HAS_ENCODING != 0 {
            return Some("UTF-8");
        }
        None
    }

    /// Change the input functions when discovering the character encoding
    /// of a given entity.
    ///
    /// Returns 0 in case of success, -1 otherwise
    #[doc(alias = "xmlSwitchEncoding")]
    pub fn switch_encoding(&mut self, enc: XmlCharEncoding) -> i32 {
        let Some(input) = self.input() else {
            return -1;
        };
        let handler = match resolve_encoding(input, enc) {
            Ok(handler) => handler,
            Err(code) => {
                self.fatal_err(code, Some(enc.get_name().unwrap_or("<null>")));
                self.halt();
                return -1;
            }
        };

        let ret = self.switch_input_encoding(self.input_tab.len() - 1, handler);
        if ret >= 0 && enc == XmlCharEncoding::None {
            // Reset the flag so the declared encoding can be applied.
            if let Some(input) = self.input_mut() {
                input.flags &= !XML_INPUT_HAS_ENCODING;
            }
        }
        ret
    }

    /// Switch `input`, which is not on the stack yet, to `enc`.
    pub(crate) fn switch_encoding_of(
        &mut self,
        input: &mut XmlParserInput,
        enc: XmlCharEncoding,
    ) -> i32 {
        if input.buf.is_none() {
            return -1;
        }
        let handler = match resolve_encoding(input, enc) {
            Ok(handler) => handler,
            Err(code) => {
                self.fatal_err(code, Some(enc.get_name().unwrap_or("<null>")));
                self.halt();
                return -1;
            }
        };
        let ret = self.encoding_switch_status(input.switch_encoding_handler(handler));
        if ret >= 0 && enc == XmlCharEncoding::None {
            input.flags &= !XML_INPUT_HAS_ENCODING;
        }
        ret
    }

    /// Change the input functions when discovering the character encoding
    /// of a given entity.
    ///
    /// Returns 0 in case of success, -1 otherwise
    #[doc(alias = "xmlSwitchEncodingName")]
    pub fn switch_encoding_name(&mut self, encoding: &str) -> i32 {
        match open_char_encoding_handler(encoding) {
            Ok(handler) => {
                if self.input_tab.is_empty() {
                    return -1;
                }
                self.switch_input_encoding(self.input_tab.len() - 1, handler)
            }
            Err(code) => {
                self.fatal_err(code, Some(encoding));
                self.halt();
                -1
            }
        }
    }

    /// Change the input functions when discovering the character encoding
    /// of a given entity.
    ///
    /// Returns 0 in case of success, -1 otherwise
    #[doc(alias = "xmlSwitchToEncoding")]
    pub fn switch_to_encoding(&mut self, handler: XmlCharEncodingHandler) -> i32 {
        if self.input_tab.is_empty() {
            return -1;
        }
        self.switch_input_encoding(self.input_tab.len() - 1, Some(handler))
    }

    /// Change the input functions of the input at `index` in the stack when
    /// discovering the character encoding of a given entity.
    ///
    /// Returns 0 in case of success, -1 otherwise
    #[doc(alias = "xmlSwitchInputEncoding")]
    pub fn switch_input_encoding(
        &mut self,
        index: usize,
        handler: Option<XmlCharEncodingHandler>,
    ) -> i32 {
        let Some(input) = self.input_tab.get_mut(index) else {
            return -1;
        };
        if input.buf.is_none() {
            return -1;
        }
        let res = input.switch_encoding_handler(handler);
        self.encoding_switch_status(res)
    }

    /// Report the failure of an encoding switch.
    pub(crate) fn encoding_switch_status(&mut self, res: Result<(), XmlParserErrors>) -> i32 {
        match res {
            Ok(()) => 0,
            Err(XmlParserErrors::XmlErrNoMemory) => {
                self.err_memory();
                -1
            }
            Err(code) => {
                self.ctxt_err_io(code, None);
                self.halt();
                -1
            }
        }
    }
}

impl Default for XmlParserCtxt {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for XmlParserCtxt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XmlParserCtxt")
            .field("input_tab", &self.input_tab)
            .field("instate", &self.instate)
            .field("err_no", &self.err_no)
            .field("well_formed", &self.well_formed)
            .field("disable_sax", &self.disable_sax)
            .field("encoding", &self.encoding)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::*;
    use crate::{
        entities::XmlEntity,
        error::XmlErrorLevel,
        globals::set_pedantic_parser_default_value,
        io::XmlParserInputBuffer,
    };

    fn silent() -> XmlParserCtxt {
        let mut ctxt = XmlParserCtxt::new();
        ctxt.set_error_handler(Some(|_, _| {}), None);
        ctxt
    }

    fn with_bytes(bytes: &[u8]) -> XmlParserCtxt {
        let mut ctxt = silent();
        let input = XmlParserInput::from_memory(&mut ctxt, None, bytes, None, 0).unwrap();
        ctxt.input_push(input);
        ctxt
    }

    /// A reader producing the same byte forever.
    struct Endless(u8);

    impl Read for Endless {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            buf.fill(self.0);
            Ok(buf.len())
        }
    }

    #[test]
    fn defaults() {
        let ctxt = XmlParserCtxt::new();
        assert_eq!(ctxt.well_formed, 1);
        assert_eq!(ctxt.valid, 1);
        assert_eq!(ctxt.standalone, -1);
        assert_eq!(ctxt.instate, XmlParserInputState::XmlParserStart);
        assert_eq!(ctxt.max_ampl, XML_MAX_AMPLIFICATION_DEFAULT);
        assert_eq!(ctxt.keep_blanks, 1);
        assert_eq!(ctxt.input_id, 1);
    }

    #[test]
    fn defaults_follow_legacy_state() {
        set_pedantic_parser_default_value(1);
        let ctxt = XmlParserCtxt::new();
        set_pedantic_parser_default_value(0);
        assert_eq!(ctxt.pedantic, 1);
        assert_ne!(ctxt.options & XmlParserOption::XmlParsePedantic as i32, 0);
        assert_eq!(XmlParserCtxt::new().pedantic, 0);
    }

    #[test]
    fn use_options_reports_unknown_bits() {
        let mut ctxt = XmlParserCtxt::new();
        let rest = ctxt.use_options(
            XmlParserOption::XmlParseRecover as i32
                | XmlParserOption::XmlParseNoBlanks as i32
                | (1 << 28),
        );
        assert_eq!(rest, 1 << 28);
        assert_eq!(ctxt.recovery, 1);
        assert_eq!(ctxt.keep_blanks, 0);
        assert_eq!(ctxt.linenumbers, 1);
    }

    #[test]
    fn current_char_normalizes_line_ends() {
        let mut ctxt = with_bytes(b"a\r\nb\rc");
        assert_eq!(ctxt.current_char(), ('a', 1));
        ctxt.advance_char(1);
        assert_eq!(ctxt.current_char(), ('\n', 2));
        ctxt.advance_char(2);
        assert_eq!(ctxt.input().unwrap().line, 2);
        assert_eq!(ctxt.current_char(), ('b', 1));
        ctxt.advance_char(1);
        assert_eq!(ctxt.current_char(), ('\n', 1));
        ctxt.advance_char(1);
        assert_eq!(ctxt.current_char(), ('c', 1));
        assert_eq!(ctxt.input().unwrap().line, 3);
        ctxt.advance_char(1);
        assert_eq!(ctxt.current_char(), ('\0', 0));
    }

    #[test]
    fn skip_char_counts_columns_per_char() {
        let mut ctxt = with_bytes("\u{e9}\u{20ac}\u{1f600}x".as_bytes());
        ctxt.skip_char();
        ctxt.skip_char();
        ctxt.skip_char();
        let input = ctxt.input().unwrap();
        assert_eq!(input.cur, 9);
        assert_eq!(input.col, 4);
        assert_eq!(ctxt.err_no, 0);
    }

    #[test]
    fn invalid_utf8_is_reported_once() {
        let mut ctxt = with_bytes(b"\xC0\x80\xFF<");
        assert_eq!(ctxt.current_char(), (char::REPLACEMENT_CHARACTER, 1));
        assert_eq!(ctxt.err_no, XmlParserErrors::XmlErrInvalidEncoding as i32);
        ctxt.skip_char();
        ctxt.skip_char();
        ctxt.skip_char();
        assert_eq!(ctxt.nb_errors, 1);
        assert_eq!(ctxt.current_char(), ('<', 1));
    }

    #[test]
    fn surrogates_and_overlongs_are_rejected() {
        for bytes in [
            &b"\xED\xA0\x80"[..],
            b"\xE0\x9F\xBF",
            b"\xF0\x8F\xBF\xBF",
            b"\xF4\x90\x80\x80",
            b"\xF8\x90\x80\x80",
        ] {
            let mut ctxt = with_bytes(bytes);
            assert_eq!(ctxt.current_char().1, 1, "{bytes:x?}");
            assert_eq!(ctxt.err_no, XmlParserErrors::XmlErrInvalidEncoding as i32);
        }
    }

    #[test]
    fn truncated_sequence_waits() {
        let mut ctxt = with_bytes(b"\xE2\x82");
        assert_eq!(ctxt.current_char(), ('\0', 0));
        assert_eq!(ctxt.err_no, 0);
    }

    #[test]
    fn nul_byte_is_an_invalid_char() {
        let mut ctxt = with_bytes(b"\0a");
        assert_eq!(ctxt.current_char(), ('\0', 1));
        assert_eq!(ctxt.err_no, XmlParserErrors::XmlErrInvalidChar as i32);
        assert_eq!(ctxt.last_error.int1(), 0);
    }

    #[test]
    fn string_current_char_falls_back_to_latin1() {
        let ctxt = XmlParserCtxt::new();
        assert_eq!(ctxt.string_current_char(b""), ('\0', 0));
        assert_eq!(ctxt.string_current_char("\u{20ac}".as_bytes()), ('\u{20ac}', 3));
        assert_eq!(ctxt.string_current_char(b"\xE9t\xE9"), ('\u{e9}', 1));
    }

    #[test]
    fn skip_blanks_counts_crlf_once() {
        let mut ctxt = with_bytes(b" \t\r\n\nx");
        assert_eq!(ctxt.skip_blanks(), 4);
        assert_eq!(ctxt.current_byte(), b'x');
        assert_eq!(ctxt.input().unwrap().line, 3);
    }

    /// A context reading from an endless source with at least `len` bytes decoded.
    fn endless(byte: u8, len: usize, config: XmlParserConfig) -> XmlParserCtxt {
        let mut ctxt = XmlParserCtxt::with_config(config);
        ctxt.set_error_handler(Some(|_, _| {}), None);
        let buf = XmlParserInputBuffer::from_reader(Endless(byte), XmlCharEncoding::None);
        let input = XmlParserInput::from_io(&mut ctxt, buf, XmlCharEncoding::None).unwrap();
        ctxt.input_push(input);
        while ctxt.input().unwrap().remainder_len() < len {
            let buf = ctxt.input_mut().unwrap().buf.as_mut().unwrap();
            assert!(buf.grow(INPUT_CHUNK) > 0);
        }
        ctxt
    }

    #[test]
    fn shrink_keeps_a_line_of_context() {
        let mut ctxt = endless(b'a', 12_000, XmlParserConfig::default());
        ctxt.input_mut().unwrap().cur = 10_000;
        ctxt.force_shrink();
        let input = ctxt.input().unwrap();
        assert_eq!(input.cur, LINE_LEN);
        assert_eq!(input.consumed, 10_000 - LINE_LEN as u64);

        // Nothing to do below one chunk.
        ctxt.force_shrink();
        assert_eq!(ctxt.input().unwrap().cur, LINE_LEN);
    }

    #[test]
    fn shrink_saturates_consumed() {
        let mut ctxt = endless(b'a', 2 * INPUT_CHUNK, XmlParserConfig::default());
        let input = ctxt.input_mut().unwrap();
        input.consumed = u64::MAX - 10;
        input.cur = INPUT_CHUNK + 1;
        ctxt.force_shrink();
        assert_eq!(ctxt.input().unwrap().consumed, u64::MAX);
    }

    #[test]
    fn lookup_limit_halts() {
        let config = XmlParserConfig {
            lookup_limit: 3 * INPUT_CHUNK,
            ..Default::default()
        };
        let mut ctxt = endless(b' ', 0, config);
        let mut ret = 0;
        for _ in 0..100 {
            let end = ctxt.input().unwrap().base_contents().len();
            ctxt.input_mut().unwrap().cur = end;
            ret = ctxt.force_grow();
            if ret < 0 {
                break;
            }
        }
        assert_eq!(ret, -1);
        assert_eq!(ctxt.err_no, XmlParserErrors::XmlErrResourceLimit as i32);
        assert_eq!(ctxt.disable_sax, 2);
        assert_eq!(
            ctxt.last_error.message(),
            Some("Buffer size limit exceeded, try XML_PARSE_HUGE\n")
        );
    }

    #[test]
    fn halted_context_stops_reading() {
        let mut ctxt = endless(b'a', 0, XmlParserConfig::default());
        ctxt.halt();
        assert_eq!(ctxt.force_grow(), 0);
        ctxt.grow();
        assert_eq!(ctxt.current_char(), ('\0', 0));
        ctxt.skip_char();
        assert_eq!(ctxt.skip_blanks(), 0);
        assert_eq!(ctxt.input().unwrap().remainder_len(), 0);

        let mut ctxt = endless(b'a', 0, XmlParserConfig::default());
        ctxt.stop();
        assert_eq!(ctxt.current_char(), ('\0', 0));
        assert_eq!(ctxt.input().unwrap().remainder_len(), 0);
    }

    #[test]
    fn grow_keeps_a_chunk_ahead() {
        let mut ctxt = endless(b'a', 0, XmlParserConfig::default());
        ctxt.grow();
        assert!(ctxt.input().unwrap().remainder_len() >= INPUT_CHUNK);
        assert_eq!(ctxt.force_grow(), 0);
    }

    #[test]
    fn memory_inputs_never_grow() {
        let mut ctxt = with_bytes(b"<doc/>");
        assert_eq!(ctxt.force_grow(), 0);
    }

    #[test]
    fn bom_detection() {
        let mut ctxt = with_bytes(b"\xEF\xBB\xBF<doc/>");
        ctxt.detect_encoding();
        let input = ctxt.input().unwrap();
        assert_eq!(input.cur, 3);
        assert_eq!(input.flags & XML_INPUT_AUTO_ENCODING, XML_INPUT_AUTO_UTF8);
        assert_ne!(input.flags & XML_INPUT_HAS_ENCODING, 0);
        assert_eq!(ctxt.content_bytes(), b"<doc/>");

        let mut ctxt = with_bytes(b"\xFF\xFE<\0d\0/\0>\0");
        ctxt.detect_encoding();
        assert_eq!(ctxt.content_bytes(), b"<d/>");
        assert_eq!(ctxt.input().unwrap().consumed, 2);
        assert_eq!(ctxt.get_actual_encoding(), Some("UTF-16LE"));

        let mut ctxt = with_bytes(b"\0<\0?\0x\0m\0l");
        ctxt.detect_encoding();
        assert_eq!(ctxt.content_bytes(), b"<?xml");
        assert_eq!(ctxt.input().unwrap().cur, 0);

        let mut ctxt = with_bytes(b"<doc/>");
        ctxt.detect_encoding();
        let input = ctxt.input().unwrap();
        assert_eq!(input.flags & XML_INPUT_HAS_ENCODING, 0);
        assert_eq!(input.cur, 0);
        assert_eq!(ctxt.get_actual_encoding(), None);
    }

    #[test]
    fn declared_encoding_switches_once() {
        let mut ctxt = with_bytes(b"<?xml version='1.0'?><a>\xE9</a>");
        ctxt.set_declared_encoding("ISO-8859-1".to_owned());
        assert_eq!(ctxt.encoding(), Some("ISO-8859-1"));
        assert_ne!(ctxt.input().unwrap().flags & XML_INPUT_USES_ENC_DECL, 0);
        assert_eq!(ctxt.content_bytes(), "<?xml version='1.0'?><a>\u{e9}</a>".as_bytes());
        assert_eq!(ctxt.get_actual_encoding(), Some("ISO-8859-1"));

        assert_eq!(ctxt.switch_encoding_name("latin1"), 0);
        assert_eq!(ctxt.content_bytes(), "<?xml version='1.0'?><a>\u{e9}</a>".as_bytes());
    }

    #[test]
    fn declared_encoding_mismatch_warns() {
        let mut ctxt = with_bytes(b"\xFF\xFE<\0?\0x\0m\0l\0");
        ctxt.detect_encoding();
        ctxt.set_declared_encoding("UTF-16BE".to_owned());
        assert_eq!(ctxt.encoding(), Some("UTF-16LE"));
        assert_eq!(ctxt.last_error.code(), XmlParserErrors::XmlWarEncodingMismatch);
        assert_eq!(ctxt.last_error.level(), XmlErrorLevel::XmlErrWarning);
        assert_eq!(
            ctxt.last_error.message(),
            Some("Encoding 'UTF-16BE' doesn't match auto-detected 'UTF-16LE'\n")
        );

        let mut ctxt = with_bytes(b"\xFF\xFE<\0?\0x\0m\0l\0");
        ctxt.detect_encoding();
        ctxt.set_declared_encoding("utf-16".to_owned());
        assert_eq!(ctxt.encoding(), Some("utf-16"));
        assert_eq!(ctxt.nb_warnings, 0);
    }

    #[test]
    fn unsupported_declared_encoding_halts() {
        let mut ctxt = with_bytes(b"<?xml version='1.0' encoding='klingon'?>");
        ctxt.set_declared_encoding("klingon".to_owned());
        assert_eq!(ctxt.err_no, XmlParserErrors::XmlErrUnsupportedEncoding as i32);
        assert_eq!(ctxt.instate, XmlParserInputState::XmlParserEOF);
        assert_eq!(ctxt.last_error.str1(), Some("klingon"));
        assert_eq!(ctxt.encoding(), Some("klingon"));
        assert_eq!(ctxt.get_actual_encoding(), Some("klingon"));
    }

    #[test]
    fn unsupported_ebcdic_declaration_halts() {
        // <?xml encoding="klingon"?> in IBM037
        let mut ctxt = with_bytes(&[
            0x4C, 0x6F, 0xA7, 0x94, 0x93, 0x40, 0x85, 0x95, 0x83, 0x96, 0x84, 0x89, 0x95, 0x87,
            0x7E, 0x7F, 0x92, 0x93, 0x89, 0x95, 0x87, 0x96, 0x95, 0x7F, 0x6F, 0x6E,
        ]);
        ctxt.detect_encoding();
        assert_eq!(ctxt.err_no, XmlParserErrors::XmlErrUnsupportedEncoding as i32);
        assert_eq!(ctxt.instate, XmlParserInputState::XmlParserEOF);
        assert_eq!(ctxt.disable_sax, 2);
    }

    #[test]
    fn ignore_enc_keeps_bytes() {
        let mut ctxt = with_bytes(b"<a>\xC3\xA9</a>");
        ctxt.use_options(XmlParserOption::XmlParseIgnoreEnc as i32);
        ctxt.set_declared_encoding("ISO-8859-1".to_owned());
        assert_eq!(ctxt.content_bytes(), "<a>\u{e9}</a>".as_bytes());
        assert_eq!(ctxt.encoding(), Some("ISO-8859-1"));
    }

    #[test]
    fn nesting_depth_is_limited() {
        let mut ctxt = with_bytes(b"<doc/>");
        for _ in 0..XML_PARSER_MAX_DEPTH {
            let input = XmlParserInput::from_string(&mut ctxt, " ").unwrap();
            assert!(ctxt.input_push(input) >= 0);
        }
        let input = XmlParserInput::from_string(&mut ctxt, " ").unwrap();
        assert_eq!(ctxt.input_push(input), -1);
        assert_eq!(ctxt.err_no, XmlParserErrors::XmlErrEntityLoop as i32);
        assert_eq!(ctxt.input_tab.len(), XML_PARSER_MAX_DEPTH + 1);
    }

    #[test]
    fn huge_allows_deeper_nesting() {
        let mut ctxt = with_bytes(b"<doc/>");
        ctxt.use_options(XmlParserOption::XmlParseHuge as i32);
        for _ in 0..XML_PARSER_MAX_DEPTH_HUGE {
            let input = XmlParserInput::from_string(&mut ctxt, " ").unwrap();
            assert!(ctxt.input_push(input) >= 0);
        }
        let input = XmlParserInput::from_string(&mut ctxt, " ").unwrap();
        assert_eq!(ctxt.input_push(input), -1);
    }

    #[test]
    fn skip_blanks_pops_finished_entities() {
        let mut ctxt = with_bytes(b"  x");
        let entity =
            XmlEntity::internal("sp", XmlEntityType::XmlInternalParameterEntity, Some("   "))
                .into_shared();
        let input = XmlParserInput::from_entity(&mut ctxt, entity.clone()).unwrap();
        ctxt.input_push(input);
        assert_eq!(ctxt.skip_blanks(), 5);
        assert_eq!(ctxt.input_tab.len(), 1);
        assert_eq!(ctxt.current_byte(), b'x');
        assert_ne!(entity.borrow().flags & XML_ENT_CHECKED, 0);
        assert_eq!(ctxt.sizeentcopy, 3 + XML_ENT_FIXED_COST);
    }

    #[test]
    fn amplification_halts() {
        let mut ctxt = with_bytes(b"<doc>&big;</doc>");
        ctxt.input_mut().unwrap().cur = 5;
        assert!(!ctxt.entity_check(1000));
        assert!(ctxt.entity_check(XML_MAX_TEXT_LENGTH));
        assert_eq!(ctxt.err_no, XmlParserErrors::XmlErrResourceLimit as i32);
        assert_eq!(ctxt.disable_sax, 2);

        let mut ctxt = with_bytes(b"<doc>&big;</doc>");
        ctxt.use_options(XmlParserOption::XmlParseHuge as i32);
        assert!(!ctxt.entity_check(u64::MAX));
    }

    #[test]
    fn amplification_ratio_is_configurable() {
        let mut ctxt = with_bytes(b"<doc/>");
        assert_eq!(ctxt.set_max_amplification(0), -1);
        assert_eq!(ctxt.set_max_amplification(u32::MAX), 0);
        ctxt.input_mut().unwrap().consumed = 10;
        assert!(!ctxt.entity_check(XML_MAX_TEXT_LENGTH + 1));
    }

    #[test]
    fn halt_is_idempotent() {
        let mut ctxt = silent();
        ctxt.halt();
        ctxt.halt();
        assert_eq!(ctxt.instate, XmlParserInputState::XmlParserEOF);
        assert_eq!(ctxt.disable_sax, 2);
        ctxt.stop();
        assert_eq!(ctxt.err_no, XmlParserErrors::XmlErrUserStop as i32);
    }

    #[test]
    fn reset_clears_state() {
        let mut ctxt = with_bytes(b"<doc/>");
        ctxt.fatal_err(XmlParserErrors::XmlErrDocumentEnd, None);
        ctxt.encoding = Some("UTF-8".to_owned());
        ctxt.reset();
        assert!(ctxt.input_tab.is_empty());
        assert_eq!(ctxt.err_no, 0);
        assert_eq!(ctxt.well_formed, 1);
        assert_eq!(ctxt.nb_errors, 0);
        assert!(ctxt.encoding().is_none());
        assert!(ctxt.last_error.is_ok());
    }
}
