//! Provide the parser context, the input streams and the character decoder.
//! This module is based on `libxml/parser.h`, `parserInternals.h`, `parserInternals.c`
//! and so on in `libxml2-v2.13`.
//!
//! Please refer to original libxml2 documents also.

// Copyright of the original code is the following.
// --------
// Summary: internals routines and limits exported by the parser.
// Description: this module exports a number of internal parsing routines
//              they are not really all intended for applications but
//              can prove useful doing low level processing.
//
// Copy: See Copyright for the status of this software.
//
// Author: Daniel Veillard
// --------
// parserInternals.c : Internal routines (and obsolete ones) needed for the
//                     XML and HTML parsers.
//
// See Copyright for the status of this software.
//
// daniel@veillard.com

mod context;
mod error;
mod input;
pub mod legacy;
mod loader;
#[cfg(feature = "libxml_push")]
mod push;
mod sax;
mod xmldecl;

use crate::{
    error::{XmlErrorDomain, XmlErrorLevel, XmlParserErrors, xml_simple_error},
    globals::parser_version,
};

pub use context::*;
pub(crate) use error::*;
pub use input::*;
pub use loader::*;
pub use sax::*;

/// The number of bytes the parser tries to keep ahead of the cursor.
pub const INPUT_CHUNK: usize = 4096;
/// The number of bytes kept before the cursor when the buffer is shrunk,
/// so that errors can still be shown in context.
pub const LINE_LEN: usize = 80;

/// Maximum size allowed for a single text node when building a tree.
/// Also the point from which entity amplification is checked.
pub const XML_MAX_TEXT_LENGTH: u64 = 10_000_000;
/// Maximum size allowed by the parser for ahead lookup.
/// Used to avoid accumulating more than this amount of unparsed data.
pub const XML_MAX_LOOKUP_LIMIT: usize = 10_000_000;
/// Maximum size allowed for a markup identifier without `XML_PARSE_HUGE`.
pub const XML_MAX_NAME_LENGTH: usize = 50000;
/// The version assumed when a document has no XML declaration.
pub const XML_DEFAULT_VERSION: &str = "1.0";
/// Maximum number of errors or warnings reported per context.
pub const XML_MAX_ERRORS: u16 = 100;
/// Default ratio between the size of expanded entities and the document size.
pub const XML_MAX_AMPLIFICATION_DEFAULT: u32 = 5;
/// Cost added for every entity reference when computing amplification.
pub const XML_ENT_FIXED_COST: u64 = 20;
/// Input stack depth accepted without `XML_PARSE_HUGE`.
pub const XML_PARSER_MAX_DEPTH: usize = 40;
/// Input stack depth never exceeded.
pub const XML_PARSER_MAX_DEPTH_HUGE: usize = 100;

// Input flags
//
// XML_INPUT_HAS_ENCODING: the encoding of the input is fixed, either by
// detection or by an explicit switch.
// XML_INPUT_AUTO_*: a 3-bit field telling which detector rule fixed the
// encoding. It is not a set of independent bits.
pub const XML_INPUT_HAS_ENCODING: i32 = 1 << 0;
pub const XML_INPUT_AUTO_ENCODING: i32 = 7 << 1;
pub const XML_INPUT_AUTO_UTF8: i32 = 1 << 1;
pub const XML_INPUT_AUTO_UTF16LE: i32 = 2 << 1;
pub const XML_INPUT_AUTO_UTF16BE: i32 = 3 << 1;
pub const XML_INPUT_AUTO_OTHER: i32 = 4 << 1;
pub const XML_INPUT_USES_ENC_DECL: i32 = 1 << 4;
pub const XML_INPUT_ENCODING_ERROR: i32 = 1 << 5;
pub const XML_INPUT_PROGRESSIVE: i32 = 1 << 6;

/// This is the set of XML parser options that can be passed down
/// to [`XmlParserCtxt::use_options`].
#[doc(alias = "xmlParserOption")]
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmlParserOption {
    XmlParseRecover = 1 << 0,    /* recover on errors */
    XmlParseNoEnt = 1 << 1,      /* substitute entities */
    XmlParseDTDLoad = 1 << 2,    /* load the external subset */
    XmlParseDTDAttr = 1 << 3,    /* default DTD attributes */
    XmlParseDTDValid = 1 << 4,   /* validate with the DTD */
    XmlParseNoError = 1 << 5,    /* suppress error reports */
    XmlParseNoWarning = 1 << 6,  /* suppress warning reports */
    XmlParsePedantic = 1 << 7,   /* pedantic error reporting */
    XmlParseNoBlanks = 1 << 8,   /* remove blank nodes */
    XmlParseSAX1 = 1 << 9,       /* use the SAX1 interface internally */
    XmlParseXInclude = 1 << 10,  /* Implement XInclude substitution  */
    XmlParseNoNet = 1 << 11,     /* Forbid network access */
    XmlParseNoDict = 1 << 12,    /* Do not reuse the context dictionary */
    XmlParseNsClean = 1 << 13,   /* remove redundant namespaces declarations */
    XmlParseNoCDATA = 1 << 14,   /* merge CDATA as text nodes */
    XmlParseNoXIncNode = 1 << 15, /* do not generate XINCLUDE START/END nodes */
    XmlParseCompact = 1 << 16,   /* compact small text nodes */
    XmlParseOld10 = 1 << 17,     /* parse using XML-1.0 before update 5 */
    XmlParseNoBaseFix = 1 << 18, /* do not fixup XINCLUDE xml:base uris */
    XmlParseHuge = 1 << 19,      /* relax any hardcoded limit from the parser */
    XmlParseOldSAX = 1 << 20,    /* parse using SAX2 interface before 2.7.0 */
    XmlParseIgnoreEnc = 1 << 21, /* ignore internal document encoding hint */
    XmlParseBigLines = 1 << 22,  /* Store big lines numbers in text PSVI field */
    XmlParseNoXXE = 1 << 23,     /* disable loading of external content */
}

/// Every option bit known to the parser.
pub(crate) const XML_PARSE_ALL_OPTIONS: i32 = (1 << 24) - 1;

/// The parser is now working also as a state based parser.
/// The recursive one use the state info for entities processing.
#[doc(alias = "xmlParserInputState")]
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum XmlParserInputState {
    XmlParserEOF = -1, /* nothing is to be parsed */
    #[default]
    XmlParserStart = 0, /* nothing has been parsed */
    XmlParserMisc,          /* Misc* before int subset */
    XmlParserPI,            /* Within a processing instruction */
    XmlParserDTD,           /* within some DTD content */
    XmlParserProlog,        /* Misc* after internal subset */
    XmlParserComment,       /* within a comment */
    XmlParserStartTag,      /* within a start tag */
    XmlParserContent,       /* within the content */
    XmlParserCDATASection,  /* within a CDATA section */
    XmlParserEndTag,        /* within a closing tag */
    XmlParserEntityDecl,    /* within an entity declaration */
    XmlParserEntityValue,   /* within an entity value in a decl */
    XmlParserAttributeValue, /* within an attribute value */
    XmlParserSystemLiteral, /* within a SYSTEM value */
    XmlParserEpilog,        /* the Misc* after the last end tag */
    XmlParserIgnore,        /* within an IGNORED section */
    XmlParserPublicLiteral, /* within a PUBLIC value */
}

/// Check the compiled lib version against the include one.
///
/// A different major version is reported as fatal, an older minor version as a warning.
/// Both go to the standard error.
#[doc(alias = "xmlCheckVersion")]
pub fn check_version(version: i32) {
    let myversion = parser_version().parse::<i32>().unwrap_or(0);

    if myversion / 10000 != version / 10000 {
        eprintln!(
            "Fatal: program compiled against libxml {} using libxml {}",
            version / 10000,
            myversion / 10000
        );
    } else if myversion / 100 < version / 100 {
        eprintln!(
            "Warning: program compiled against libxml {} using older {}",
            version / 100,
            myversion / 100
        );
    }
}

/// Append the char value in the array.
///
/// Returns the number of bytes written.
#[doc(alias = "xmlCopyCharMultiByte")]
pub fn copy_char_multi_byte(out: &mut [u8], val: u32) -> usize {
    if val >= 0x80 {
        let (lead, bits) = if val < 0x800 {
            ((val >> 6) | 0xC0, 0)
        } else if val < 0x10000 {
            ((val >> 12) | 0xE0, 6)
        } else if val < 0x110000 {
            ((val >> 18) | 0xF0, 12)
        } else {
            xml_simple_error(
                XmlErrorDomain::XmlFromParser,
                XmlParserErrors::XmlErrInvalidChar,
                XmlErrorLevel::XmlErrFatal,
                &format!("Internal error, xmlCopyCharMultiByte 0x{val:X} out of bound\n"),
                None,
            );
            return 0;
        };
        let len = bits / 6 + 2;
        if out.len() < len {
            return 0;
        }
        out[0] = lead as u8;
        for (i, shift) in (0..=bits).rev().step_by(6).enumerate() {
            out[i + 1] = ((val >> shift) & 0x3F) as u8 | 0x80;
        }
        return len;
    }
    match out.first_mut() {
        Some(b) => {
            *b = val as u8;
            1
        }
        None => 0,
    }
}

/// Append the char value in the array.
///
/// Returns the number of bytes written.
#[doc(alias = "xmlCopyChar")]
pub fn copy_char(val: u32, out: &mut [u8]) -> usize {
    copy_char_multi_byte(out, val)
}
