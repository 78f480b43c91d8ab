use crate::error::XmlParserErrors;

use super::{
    XML_DEFAULT_VERSION, XML_MAX_NAME_LENGTH, XML_MAX_TEXT_LENGTH, XmlParserCtxt,
    XmlParserInputState, XmlParserOption, xml_fatal_err_msg, xml_fatal_err_msg_str,
    xml_warning_msg,
};

fn is_blank(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | b'\n' | b'\r')
}

/// Parse the XML version value.
///
/// ```text
/// [26] VersionNum ::= '1.' [0-9]+
/// ```
///
/// In practice allow [0-9].[0-9]+ at that level
///
/// Returns the string giving the XML version number, or NULL
#[doc(alias = "xmlParseVersionNum")]
fn parse_version_num(ctxt: &mut XmlParserCtxt) -> Option<String> {
    let mut buf = String::with_capacity(10);
    buf.push(ctxt.consume_char_if(|_, c| c.is_ascii_digit())?);
    ctxt.consume_char_if(|_, c| c == '.')?;
    buf.push('.');
    while let Some(c) = ctxt.consume_char_if(|_, c| c.is_ascii_digit()) {
        buf.push(c);
    }
    Some(buf)
}

/// Parse the XML version.
///
/// ```text
/// [24] VersionInfo ::= S 'version' Eq (' VersionNum ' | " VersionNum ")
///
/// [25] Eq ::= S? '=' S?
/// ```
#[doc(alias = "xmlParseVersionInfo")]
fn parse_version_info(ctxt: &mut XmlParserCtxt) -> Option<String> {
    if !ctxt.content_bytes().starts_with(b"version") {
        return None;
    }
    ctxt.advance(7);
    ctxt.skip_blanks();
    if ctxt.consume_char_if(|_, c| c == '=').is_none() {
        ctxt.fatal_err(XmlParserErrors::XmlErrEqualRequired, None);
        return None;
    }
    ctxt.skip_blanks();
    let Some(quote) = ctxt.consume_char_if(|_, c| c == '"' || c == '\'') else {
        ctxt.fatal_err(XmlParserErrors::XmlErrStringNotStarted, None);
        return None;
    };
    let version = parse_version_num(ctxt);
    if ctxt.consume_char_if(|_, c| c == quote).is_none() {
        ctxt.fatal_err(XmlParserErrors::XmlErrStringNotClosed, None);
        return None;
    }
    version
}

/// Parse the XML encoding name
///
/// ```text
/// [81] EncName ::= [A-Za-z] ([A-Za-z0-9._] | '-')*
/// ```
#[doc(alias = "xmlParseEncName")]
fn parse_enc_name(ctxt: &mut XmlParserCtxt) -> Option<String> {
    let max_length = if ctxt.options & XmlParserOption::XmlParseHuge as i32 != 0 {
        XML_MAX_TEXT_LENGTH as usize
    } else {
        XML_MAX_NAME_LENGTH
    };
    let Some(first) = ctxt.consume_char_if(|_, c| c.is_ascii_alphabetic()) else {
        ctxt.fatal_err(XmlParserErrors::XmlErrEncodingName, None);
        return None;
    };
    let mut buf = String::with_capacity(10);
    buf.push(first);
    while let Some(c) =
        ctxt.consume_char_if(|_, c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        buf.push(c);
        if buf.len() > max_length {
            ctxt.fatal_err(XmlParserErrors::XmlErrNameTooLong, Some("EncName"));
            return None;
        }
    }
    Some(buf)
}

/// Parse the XML standalone declaration
///
/// ```text
/// [32] SDDecl ::= S 'standalone' Eq (("'" ('yes' | 'no') "'") | ('"' ('yes' | 'no')'"'))
/// ```
///
/// Returns:
/// - 1 if standalone="yes"
/// - 0 if standalone="no"
/// - -2 if standalone attribute is missing or invalid
#[doc(alias = "xmlParseSDDecl")]
fn parse_sddecl(ctxt: &mut XmlParserCtxt) -> i32 {
    ctxt.skip_blanks();
    if !ctxt.content_bytes().starts_with(b"standalone") {
        return -2;
    }
    ctxt.advance(10);
    ctxt.skip_blanks();
    if ctxt.consume_char_if(|_, c| c == '=').is_none() {
        ctxt.fatal_err(XmlParserErrors::XmlErrEqualRequired, None);
        return -2;
    }
    ctxt.skip_blanks();
    let Some(quote) = ctxt.consume_char_if(|_, c| c == '"' || c == '\'') else {
        ctxt.fatal_err(XmlParserErrors::XmlErrStringNotStarted, None);
        return -2;
    };
    let standalone = if ctxt.content_bytes().starts_with(b"no") {
        ctxt.advance(2);
        0
    } else if ctxt.content_bytes().starts_with(b"yes") {
        ctxt.advance(3);
        1
    } else {
        ctxt.fatal_err(XmlParserErrors::XmlErrStandaloneValue, None);
        -2
    };
    if ctxt.consume_char_if(|_, c| c == quote).is_none() {
        ctxt.fatal_err(XmlParserErrors::XmlErrStringNotClosed, None);
    }
    standalone
}

/// Recover from an unterminated declaration by skipping past the next `>`.
fn skip_declaration_end(ctxt: &mut XmlParserCtxt) {
    ctxt.fatal_err(XmlParserErrors::XmlErrXMLDeclNotFinished, None);
    ctxt.grow();
    while !ctxt.content_bytes().is_empty() {
        match ctxt.content_bytes().iter().position(|&c| c == b'>') {
            Some(pos) => {
                ctxt.advance_with_line_handling(pos + 1);
                break;
            }
            None => {
                ctxt.advance_with_line_handling(ctxt.content_bytes().len());
                ctxt.grow();
            }
        }
    }
}

impl XmlParserCtxt {
    /// Parse the XML encoding declaration
    ///
    /// ```text
    /// [80] EncodingDecl ::= S 'encoding' Eq ('"' EncName '"' |  "'" EncName "'")
    /// ```
    ///
    /// The name is handed to [`set_declared_encoding`](Self::set_declared_encoding).
    ///
    /// Returns the encoding the context settled on, or `None`.
    #[doc(alias = "xmlParseEncodingDecl")]
    pub fn parse_encoding_decl(&mut self) -> Option<String> {
        self.skip_blanks();
        if !self.content_bytes().starts_with(b"encoding") {
            return None;
        }
        self.advance(8);
        self.skip_blanks();
        if self.consume_char_if(|_, c| c == '=').is_none() {
            self.fatal_err(XmlParserErrors::XmlErrEqualRequired, None);
            return None;
        }
        self.skip_blanks();
        let Some(quote) = self.consume_char_if(|_, c| c == '"' || c == '\'') else {
            self.fatal_err(XmlParserErrors::XmlErrStringNotStarted, None);
            return None;
        };
        let encoding = parse_enc_name(self);
        if self.consume_char_if(|_, c| c == quote).is_none() {
            self.fatal_err(XmlParserErrors::XmlErrStringNotClosed, None);
            return None;
        }

        self.set_declared_encoding(encoding?);
        self.encoding.clone()
    }

    /// Parse an XML declaration header
    ///
    /// ```text
    /// [23] XMLDecl ::= '<?xml' VersionInfo EncodingDecl? SDDecl? S? '?>'
    /// ```
    #[doc(alias = "xmlParseXMLDecl")]
    pub fn parse_xml_decl(&mut self) {
        if !self.content_bytes().starts_with(b"<?xml") {
            self.fatal_err(XmlParserErrors::XmlErrXMLDeclNotStarted, None);
            return;
        }
        // This value for standalone indicates that the document has an
        // XML declaration but it does not have a standalone attribute.
        if let Some(input) = self.input_mut() {
            input.standalone = -2;
        }
        self.advance(5);

        if !is_blank(self.current_byte()) {
            xml_fatal_err_msg!(
                self,
                XmlParserErrors::XmlErrSpaceRequired,
                "Blank needed after '<?xml'\n"
            );
        }
        self.skip_blanks();

        // We must have the VersionInfo here.
        if let Some(version) = parse_version_info(self) {
            if version != XML_DEFAULT_VERSION {
                // Changed here for XML-1.0 5th edition
                if self.options & XmlParserOption::XmlParseOld10 as i32 == 0
                    && version.starts_with("1.")
                {
                    xml_warning_msg!(
                        self,
                        XmlParserErrors::XmlWarUnknownVersion,
                        "Unsupported version '{}'\n",
                        &version
                    );
                } else {
                    xml_fatal_err_msg_str!(
                        self,
                        XmlParserErrors::XmlErrUnknownVersion,
                        "Unsupported version '{}'\n",
                        &version
                    );
                }
            }
            self.version = Some(version);
        } else {
            self.fatal_err(XmlParserErrors::XmlErrVersionMissing, None);
        }

        // We may have the encoding declaration
        if !is_blank(self.current_byte()) {
            if self.content_bytes().starts_with(b"?>") {
                self.advance(2);
                return;
            }
            xml_fatal_err_msg!(self, XmlParserErrors::XmlErrSpaceRequired, "Blank needed here\n");
        }
        self.parse_encoding_decl();
        if self.instate == XmlParserInputState::XmlParserEOF {
            // The XML REC instructs us to stop parsing right here
            return;
        }

        // We may have the standalone status.
        if self.encoding.is_some() && !is_blank(self.current_byte()) {
            if self.content_bytes().starts_with(b"?>") {
                self.advance(2);
                return;
            }
            xml_fatal_err_msg!(self, XmlParserErrors::XmlErrSpaceRequired, "Blank needed here\n");
        }

        // We can grow the input buffer freely at that point
        self.grow();

        self.skip_blanks();
        let standalone = parse_sddecl(self);
        if let Some(input) = self.input_mut() {
            input.standalone = standalone;
        }
        self.skip_blanks();
        if self.content_bytes().starts_with(b"?>") {
            self.advance(2);
        } else if self.current_byte() == b'>' {
            // Deprecated old WD ...
            self.fatal_err(XmlParserErrors::XmlErrXMLDeclNotFinished, None);
            self.skip_char();
        } else {
            skip_declaration_end(self);
        }
    }

    /// Parse an XML declaration header for external entities
    ///
    /// ```text
    /// [77] TextDecl ::= '<?xml' VersionInfo? EncodingDecl S? '?>'
    /// ```
    #[doc(alias = "xmlParseTextDecl")]
    pub fn parse_text_decl(&mut self) {
        if !self.content_bytes().starts_with(b"<?xml") || !is_blank(self.nth_byte(5)) {
            self.fatal_err(XmlParserErrors::XmlErrXMLDeclNotStarted, None);
            return;
        }
        self.advance(5);

        if self.skip_blanks() == 0 {
            xml_fatal_err_msg!(
                self,
                XmlParserErrors::XmlErrSpaceRequired,
                "Space needed after '<?xml'\n"
            );
        }

        // We may have the VersionInfo here.
        let version = parse_version_info(self);
        if version.is_some() && self.skip_blanks() == 0 {
            xml_fatal_err_msg!(self, XmlParserErrors::XmlErrSpaceRequired, "Space needed here\n");
        }
        if let Some(input) = self.input_mut() {
            input.version = version.or_else(|| Some(XML_DEFAULT_VERSION.to_owned()));
        }

        // We must have the encoding declaration
        let encoding = self.parse_encoding_decl();
        if self.instate == XmlParserInputState::XmlParserEOF {
            return;
        }
        if encoding.is_none() {
            xml_fatal_err_msg!(
                self,
                XmlParserErrors::XmlErrMissingEncoding,
                "Missing encoding in text declaration\n"
            );
        }
        if let Some(input) = self.input_mut() {
            input.encoding = encoding;
        }

        self.skip_blanks();
        if self.content_bytes().starts_with(b"?>") {
            self.advance(2);
        } else if self.consume_char_if(|_, c| c == '>').is_some() {
            // Deprecated old WD ...
            self.fatal_err(XmlParserErrors::XmlErrXMLDeclNotFinished, None);
        } else {
            skip_declaration_end(self);
        }
    }

    /// Run the input side of the document start: encoding detection and the
    /// XML declaration, if any.
    ///
    /// Returns 0, or -1 if the document is not well-formed so far.
    pub fn start_document(&mut self) -> i32 {
        self.detect_encoding();
        self.start_after_detection()
    }

    /// The part of [`start_document`](Self::start_document) following encoding detection.
    pub(crate) fn start_after_detection(&mut self) -> i32 {
        if self.content_bytes().is_empty() {
            self.fatal_err(XmlParserErrors::XmlErrDocumentEmpty, None);
            return -1;
        }

        let rest = self.content_bytes();
        if rest.starts_with(b"<?xml") && rest.get(5).is_some_and(|&c| is_blank(c)) {
            self.parse_xml_decl();
            self.standalone = self.input().map_or(-1, |input| input.standalone);
        } else {
            self.version = Some(XML_DEFAULT_VERSION.to_owned());
        }

        if self.instate != XmlParserInputState::XmlParserEOF {
            self.instate = XmlParserInputState::XmlParserContent;
        }
        if self.well_formed == 0 { -1 } else { 0 }
    }
}
