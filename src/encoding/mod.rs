//! Provide methods and data structures for decoding the input into UTF-8.
//!
//! This module is based on `libxml/encoding.h`, `encoding.c`, and so on in `libxml2-v2.13`.
//! Please refer to original libxml2 documents also.

// Copyright of the original code is the following.
// --------
// Summary: interface for the encoding conversion functions
// Description: interface for the encoding conversion functions needed for
//              XML basic encoding and iconv() support.
//
// Related specs are
// rfc2044        (UTF-8 and UTF-16) F. Yergeau Alis Technologies
// [ISO-10646]    UTF-8 and UTF-16 in Annexes
// [ISO-8859-1]   ISO Latin-1 characters codes.
// [UNICODE]      The Unicode Consortium, "The Unicode Standard --
//                Worldwide Character Encoding -- Version 1.0", Addison-
//                Wesley, Volume 1, 1991, Volume 2, 1992.  UTF-8 is
//                described in Unicode Technical Report #4.
// [US-ASCII]     Coded Character Set--7-bit American Standard Code for
//                Information Interchange, ANSI X3.4-1986.
//
// Copy: See Copyright for the status of this software.
//
// Author: Daniel Veillard

mod ebcdic;

use std::{
    borrow::Cow,
    collections::BTreeMap,
    fmt::Display,
    str::FromStr,
    sync::{Mutex, RwLock},
};

use encoding_rs::{Decoder, DecoderResult, Encoding};

use crate::error::{XmlErrorDomain, XmlErrorLevel, XmlParserErrors};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmlCharEncoding {
    Error = -1,
    None = 0,
    UTF8,
    UTF16LE,
    UTF16BE,
    UCS4LE,
    UCS4BE,
    EBCDIC,
    UCS4_2143,
    UCS4_3412,
    UCS2,
    ISO8859_1,
    ISO8859_2,
    ISO8859_3,
    ISO8859_4,
    ISO8859_5,
    ISO8859_6,
    ISO8859_7,
    ISO8859_8,
    ISO8859_9,
    ISO8859_10,
    ISO8859_13,
    ISO8859_14,
    ISO8859_15,
    ISO8859_16,
    ISO2022JP,
    ShiftJIS,
    EUCJP,
    ASCII,
}

impl XmlCharEncoding {
    /// The canonical name of this encoding, used in diagnostics.
    #[doc(alias = "xmlGetCharEncodingName")]
    pub fn get_name(&self) -> Option<&'static str> {
        match *self {
            Self::UTF8 => Some("UTF-8"),
            Self::UTF16LE | Self::UTF16BE => Some("UTF-16"),
            Self::EBCDIC => Some("EBCDIC"),
            Self::UCS4LE | Self::UCS4BE | Self::UCS4_2143 | Self::UCS4_3412 => {
                Some("ISO-10646-UCS-4")
            }
            Self::UCS2 => Some("ISO-10646-UCS-2"),
            Self::ISO8859_1 => Some("ISO-8859-1"),
            Self::ISO8859_2 => Some("ISO-8859-2"),
            Self::ISO8859_3 => Some("ISO-8859-3"),
            Self::ISO8859_4 => Some("ISO-8859-4"),
            Self::ISO8859_5 => Some("ISO-8859-5"),
            Self::ISO8859_6 => Some("ISO-8859-6"),
            Self::ISO8859_7 => Some("ISO-8859-7"),
            Self::ISO8859_8 => Some("ISO-8859-8"),
            Self::ISO8859_9 => Some("ISO-8859-9"),
            Self::ISO8859_10 => Some("ISO-8859-10"),
            Self::ISO8859_13 => Some("ISO-8859-13"),
            Self::ISO8859_14 => Some("ISO-8859-14"),
            Self::ISO8859_15 => Some("ISO-8859-15"),
            Self::ISO8859_16 => Some("ISO-8859-16"),
            Self::ISO2022JP => Some("ISO-2022-JP"),
            Self::ShiftJIS => Some("Shift-JIS"),
            Self::EUCJP => Some("EUC-JP"),
            Self::ASCII => Some("ASCII"),
            Self::Error | Self::None => None,
        }
    }
}

impl FromStr for XmlCharEncoding {
    type Err = EncodingError;

    #[doc(alias = "xmlParseCharEncoding")]
    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let name = get_encoding_alias(name).unwrap_or_else(|| name.to_uppercase());
        let enc = match name.as_str() {
            "" => XmlCharEncoding::None,
            "UTF-8" | "UTF8" => XmlCharEncoding::UTF8,
            "UTF-16" | "UTF16" | "UTF-16LE" => XmlCharEncoding::UTF16LE,
            "UTF-16BE" => XmlCharEncoding::UTF16BE,
            "ISO-10646-UCS-2" | "UCS-2" | "UCS2" => XmlCharEncoding::UCS2,
            "ISO-10646-UCS-4" | "UCS-4" | "UCS4" | "UCS-4BE" => XmlCharEncoding::UCS4BE,
            "UCS-4LE" => XmlCharEncoding::UCS4LE,
            "ISO-8859-1" | "ISO-LATIN-1" | "ISO LATIN 1" => XmlCharEncoding::ISO8859_1,
            "ISO-8859-2" | "ISO-LATIN-2" | "ISO LATIN 2" => XmlCharEncoding::ISO8859_2,
            "ISO-8859-3" => XmlCharEncoding::ISO8859_3,
            "ISO-8859-4" => XmlCharEncoding::ISO8859_4,
            "ISO-8859-5" => XmlCharEncoding::ISO8859_5,
            "ISO-8859-6" => XmlCharEncoding::ISO8859_6,
            "ISO-8859-7" => XmlCharEncoding::ISO8859_7,
            "ISO-8859-8" => XmlCharEncoding::ISO8859_8,
            "ISO-8859-9" => XmlCharEncoding::ISO8859_9,
            "ISO-8859-10" => XmlCharEncoding::ISO8859_10,
            "ISO-8859-13" => XmlCharEncoding::ISO8859_13,
            "ISO-8859-14" => XmlCharEncoding::ISO8859_14,
            "ISO-8859-15" => XmlCharEncoding::ISO8859_15,
            "ISO-8859-16" => XmlCharEncoding::ISO8859_16,
            "ISO-2022-JP" => XmlCharEncoding::ISO2022JP,
            "SHIFT_JIS" | "SHIFT-JIS" => XmlCharEncoding::ShiftJIS,
            "EUC-JP" => XmlCharEncoding::EUCJP,
            "EBCDIC" | "EBCDIC-US" | "IBM-037" | "IBM037" => XmlCharEncoding::EBCDIC,
            "ASCII" | "US-ASCII" => XmlCharEncoding::ASCII,
            _ => {
                return Err(EncodingError::Other {
                    msg: "No encoding matches.".into(),
                });
            }
        };
        Ok(enc)
    }
}

#[derive(Debug, Clone)]
pub enum EncodingError {
    /// The length of the output buffer is too short to store even one character.
    BufferTooShort,
    /// Malformed byte sequence is found.
    ///
    /// The input and output buffer have consumed `read` and `write` bytes respectively.
    /// Malformed sequence occurs `input[read-length-offset..read-offset]`.
    Malformed {
        read: usize,
        write: usize,
        length: usize,
        offset: usize,
    },
    /// Other errors.
    Other { msg: Cow<'static, str> },
}

impl EncodingError {
    pub fn buffer_too_short(&self) -> bool {
        matches!(self, EncodingError::BufferTooShort)
    }

    pub fn malformed(&self) -> bool {
        matches!(self, EncodingError::Malformed { .. })
    }
}

impl Display for EncodingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Encoding Error: ")?;
        match self {
            Self::BufferTooShort => write!(f, "Buffer too short"),
            Self::Malformed {
                read,
                length,
                offset,
                ..
            } => write!(
                f,
                "Malformed byte sequence occurs at {}..={}",
                read - length - offset,
                (read - offset).saturating_sub(1)
            ),
            Self::Other { msg } => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for EncodingError {}

/// A stateful converter from some encoding into UTF-8.
///
/// Two handlers with the same name are not interchangeable: a `Predefined` handler
/// keeps the state of partially received multi-byte sequences.
pub enum XmlCharEncodingHandler {
    Predefined(PredefinedEncodingHandler),
    Custom(CustomEncodingHandler),
}

impl XmlCharEncodingHandler {
    /// Decode `src` into UTF-8 bytes written to `dst`.
    ///
    /// Returns `(read, write)`. An incomplete sequence at the end of `src` is left unread
    /// unless `flush` is set, in which case stateful decoders report it as malformed.
    pub fn decode(
        &mut self,
        src: &[u8],
        dst: &mut [u8],
        flush: bool,
    ) -> Result<(usize, usize), EncodingError> {
        match self {
            Self::Predefined(handler) => handler.decode(src, dst, flush),
            Self::Custom(handler) => (handler.decode)(src, dst),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Predefined(handler) => handler.name(),
            Self::Custom(handler) => handler.name(),
        }
    }
}

impl std::fmt::Debug for XmlCharEncodingHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("XmlCharEncodingHandler")
            .field(&self.name())
            .finish()
    }
}

pub struct PredefinedEncodingHandler {
    name: &'static str,
    decoder: Decoder,
}

impl PredefinedEncodingHandler {
    pub fn decode(
        &mut self,
        src: &[u8],
        dst: &mut [u8],
        flush: bool,
    ) -> Result<(usize, usize), EncodingError> {
        let (res, read, write) = self
            .decoder
            .decode_to_utf8_without_replacement(src, dst, flush);
        match res {
            DecoderResult::InputEmpty | DecoderResult::OutputFull => Ok((read, write)),
            DecoderResult::Malformed(length, offset) => Err(EncodingError::Malformed {
                read,
                write,
                length: length as usize,
                offset: offset as usize,
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl From<&'static Encoding> for PredefinedEncodingHandler {
    fn from(value: &'static Encoding) -> Self {
        Self {
            name: value.name(),
            decoder: value.new_decoder_without_bom_handling(),
        }
    }
}

/// Decode the byte sequence `src` into the UTF-8 buffer `dst`.
///
/// Returns `Ok((read_bytes, write_bytes))`. A sequence truncated at the end of `src`
/// must be left unread.
pub type DecoderFunc = fn(src: &[u8], dst: &mut [u8]) -> Result<(usize, usize), EncodingError>;

#[derive(Debug, Clone)]
pub struct CustomEncodingHandler {
    name: Cow<'static, str>,
    decode: DecoderFunc,
}

impl CustomEncodingHandler {
    /// Create a handler which can be passed to [`register_char_encoding_handler`].
    ///
    /// The name is stored in uppercase.
    pub fn new(name: &str, decode: DecoderFunc) -> Self {
        Self {
            name: Cow::Owned(name.to_uppercase()),
            decode,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

macro_rules! xml_encoding_err {
    ($error:expr, $msg:literal, $val:expr) => {
        $crate::error::xml_simple_error(
            XmlErrorDomain::XmlFromI18N,
            $error,
            XmlErrorLevel::XmlErrFatal,
            &format!($msg, $val),
            Some($val.to_owned()),
        )
    };
}

const MAX_ENCODING_HANDLERS: usize = 50;
static HANDLERS: Mutex<Vec<CustomEncodingHandler>> = Mutex::new(vec![]);

/// Register a user-defined handler. Registered handlers take precedence over built-in ones
/// with the same name.
///
/// If too many handlers are registered (more than 50 handlers specifically), return `Err`.
#[doc(alias = "xmlRegisterCharEncodingHandler")]
pub fn register_char_encoding_handler(handler: CustomEncodingHandler) -> Result<(), EncodingError> {
    let mut handlers = HANDLERS.lock().unwrap_or_else(|e| e.into_inner());
    if handlers.len() >= MAX_ENCODING_HANDLERS {
        xml_encoding_err!(
            XmlParserErrors::XmlI18NExcessHandler,
            "xmlRegisterCharEncodingHandler: Too many handler registered, see {}\n",
            "MAX_ENCODING_HANDLERS"
        );
        return Err(EncodingError::Other {
            msg: "Too many CustomEncodingHandlers are registered.".into(),
        });
    }
    handlers.push(handler);
    Ok(())
}

/// Unregister all user-defined handlers and aliases.
#[doc(alias = "xmlCleanupCharEncodingHandlers")]
pub fn cleanup_char_encoding_handlers() {
    cleanup_encoding_aliases();
    HANDLERS.lock().unwrap_or_else(|e| e.into_inner()).clear();
}

fn decode_utf16(
    src: &[u8],
    dst: &mut [u8],
    unit: fn([u8; 2]) -> u16,
) -> Result<(usize, usize), EncodingError> {
    let (mut read, mut write) = (0, 0);
    while read + 2 <= src.len() {
        let first = unit([src[read], src[read + 1]]);
        let (c, len) = if (0xD800..0xDC00).contains(&first) {
            if read + 4 > src.len() {
                // the low surrogate has not arrived yet
                break;
            }
            let second = unit([src[read + 2], src[read + 3]]);
            if !(0xDC00..0xE000).contains(&second) {
                return Err(EncodingError::Malformed {
                    read: read + 2,
                    write,
                    length: 2,
                    offset: 0,
                });
            }
            let code = 0x10000 + (((first as u32) & 0x3FF) << 10) + ((second as u32) & 0x3FF);
            (char::from_u32(code), 4)
        } else {
            (char::from_u32(first as u32), 2)
        };
        let Some(c) = c else {
            return Err(EncodingError::Malformed {
                read: read + 2,
                write,
                length: 2,
                offset: 0,
            });
        };
        if write + c.len_utf8() > dst.len() {
            if write == 0 {
                return Err(EncodingError::BufferTooShort);
            }
            break;
        }
        c.encode_utf8(&mut dst[write..]);
        read += len;
        write += c.len_utf8();
    }
    Ok((read, write))
}

fn decode_utf16le(src: &[u8], dst: &mut [u8]) -> Result<(usize, usize), EncodingError> {
    decode_utf16(src, dst, u16::from_le_bytes)
}

fn decode_utf16be(src: &[u8], dst: &mut [u8]) -> Result<(usize, usize), EncodingError> {
    decode_utf16(src, dst, u16::from_be_bytes)
}

fn decode_ucs4(
    src: &[u8],
    dst: &mut [u8],
    unit: fn([u8; 4]) -> u32,
) -> Result<(usize, usize), EncodingError> {
    let (mut read, mut write) = (0, 0);
    for chunk in src.chunks_exact(4) {
        let code = unit([chunk[0], chunk[1], chunk[2], chunk[3]]);
        let c = char::from_u32(code).ok_or(EncodingError::Malformed {
            read: read + 4,
            write,
            length: 4,
            offset: 0,
        })?;
        if write + c.len_utf8() > dst.len() {
            if write == 0 {
                return Err(EncodingError::BufferTooShort);
            }
            break;
        }
        c.encode_utf8(&mut dst[write..]);
        read += 4;
        write += c.len_utf8();
    }
    Ok((read, write))
}

fn decode_ucs4le(src: &[u8], dst: &mut [u8]) -> Result<(usize, usize), EncodingError> {
    decode_ucs4(src, dst, u32::from_le_bytes)
}

fn decode_ucs4be(src: &[u8], dst: &mut [u8]) -> Result<(usize, usize), EncodingError> {
    decode_ucs4(src, dst, u32::from_be_bytes)
}

fn decode_latin1(src: &[u8], dst: &mut [u8]) -> Result<(usize, usize), EncodingError> {
    let (mut read, mut write) = (0, 0);
    for &b in src {
        let c = char::from(b);
        if write + c.len_utf8() > dst.len() {
            break;
        }
        c.encode_utf8(&mut dst[write..]);
        read += 1;
        write += c.len_utf8();
    }
    if read == 0 && !src.is_empty() {
        return Err(EncodingError::BufferTooShort);
    }
    Ok((read, write))
}

fn decode_ascii(src: &[u8], dst: &mut [u8]) -> Result<(usize, usize), EncodingError> {
    let len = src.len().min(dst.len());
    if let Some(pos) = src[..len].iter().position(|b| !b.is_ascii()) {
        dst[..pos].copy_from_slice(&src[..pos]);
        return Err(EncodingError::Malformed {
            read: pos + 1,
            write: pos,
            length: 1,
            offset: 0,
        });
    }
    dst[..len].copy_from_slice(&src[..len]);
    Ok((len, len))
}

const fn builtin(name: &'static str, decode: DecoderFunc) -> CustomEncodingHandler {
    CustomEncodingHandler {
        name: Cow::Borrowed(name),
        decode,
    }
}

// For UTF-16 and UCS-4, encoding_rs does not provide every variant this parser needs.
// Single-byte EBCDIC code pages are not provided at all.
const BUILTIN_HANDLERS: &[CustomEncodingHandler] = &[
    builtin("UTF-16LE", decode_utf16le),
    builtin("UTF-16BE", decode_utf16be),
    builtin("UTF-16", decode_utf16le),
    builtin("UCS-4LE", decode_ucs4le),
    builtin("UCS-4BE", decode_ucs4be),
    builtin("UCS-4", decode_ucs4be),
    builtin("ISO-10646-UCS-4", decode_ucs4be),
    builtin("ISO-8859-1", decode_latin1),
    builtin("ISO-LATIN-1", decode_latin1),
    builtin("ASCII", decode_ascii),
    builtin("US-ASCII", decode_ascii),
    builtin("IBM037", ebcdic::decode_ibm037),
    builtin("IBM-037", ebcdic::decode_ibm037),
    builtin("CP037", ebcdic::decode_ibm037),
    builtin("EBCDIC", ebcdic::decode_ibm037),
    builtin("EBCDIC-US", ebcdic::decode_ibm037),
    builtin("IBM500", ebcdic::decode_ibm500),
    builtin("IBM-500", ebcdic::decode_ibm500),
    builtin("CP500", ebcdic::decode_ibm500),
    builtin("EBCDIC-INT", ebcdic::decode_ibm500),
];

/// Search a handler for the well-known encoding `enc`.
///
/// `UTF8`, `None` and `ASCII` need no conversion, so `Ok(None)` is returned for them.
#[doc(alias = "xmlLookupCharEncodingHandler")]
pub fn lookup_char_encoding_handler(
    enc: XmlCharEncoding,
) -> Result<Option<XmlCharEncodingHandler>, XmlParserErrors> {
    let name = match enc {
        XmlCharEncoding::Error => return Err(XmlParserErrors::XmlErrUnsupportedEncoding),
        XmlCharEncoding::None | XmlCharEncoding::UTF8 | XmlCharEncoding::ASCII => {
            return Ok(None);
        }
        XmlCharEncoding::UTF16LE => "UTF-16LE",
        XmlCharEncoding::UTF16BE => "UTF-16BE",
        XmlCharEncoding::UCS4LE => "UCS-4LE",
        XmlCharEncoding::UCS4BE => "UCS-4BE",
        XmlCharEncoding::EBCDIC => "EBCDIC",
        XmlCharEncoding::UCS4_2143 | XmlCharEncoding::UCS4_3412 | XmlCharEncoding::UCS2 => {
            return Err(XmlParserErrors::XmlErrUnsupportedEncoding);
        }
        // Windows 1254 is the extention of ISO-8859-9 and is what encoding_rs provides.
        XmlCharEncoding::ISO8859_9 => "windows-1254",
        other => other
            .get_name()
            .ok_or(XmlParserErrors::XmlErrUnsupportedEncoding)?,
    };
    find_encoding_handler(name)
        .map(Some)
        .ok_or(XmlParserErrors::XmlErrUnsupportedEncoding)
}

/// Search a handler by name. The search is case-insensitive and user aliases are
/// consulted first.
#[doc(alias = "xmlFindCharEncodingHandler")]
pub fn find_encoding_handler(name: &str) -> Option<XmlCharEncodingHandler> {
    let name = get_encoding_alias(name).unwrap_or_else(|| name.to_uppercase());

    let handlers = HANDLERS.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(handler) = handlers.iter().find(|handler| handler.name() == name) {
        return Some(XmlCharEncodingHandler::Custom(handler.clone()));
    }
    drop(handlers);

    if let Some(handler) = BUILTIN_HANDLERS.iter().find(|handler| handler.name() == name) {
        return Some(XmlCharEncodingHandler::Custom(handler.clone()));
    }

    Encoding::for_label(name.as_bytes())
        .map(|enc| XmlCharEncodingHandler::Predefined(enc.into()))
}

/// Open a handler for the encoding named `name`.
///
/// UTF-8 needs no conversion, so `Ok(None)` is returned for it.
/// Unknown names result in `XmlErrUnsupportedEncoding`.
#[doc(alias = "xmlOpenCharEncodingHandler")]
pub fn open_char_encoding_handler(
    name: &str,
) -> Result<Option<XmlCharEncodingHandler>, XmlParserErrors> {
    let canonical = get_encoding_alias(name).unwrap_or_else(|| name.to_uppercase());
    if canonical == "UTF-8" || canonical == "UTF8" {
        return Ok(None);
    }
    if let Some(handler) = find_encoding_handler(name) {
        log::debug!("opened encoding handler '{}' for '{name}'", handler.name());
        return Ok(Some(handler));
    }
    // Fall back to the canonical name of a well-known encoding.
    match canonical.parse::<XmlCharEncoding>() {
        Ok(XmlCharEncoding::None) | Err(_) => Err(XmlParserErrors::XmlErrUnsupportedEncoding),
        Ok(enc) => lookup_char_encoding_handler(enc),
    }
}

static ENCODING_ALIASES: RwLock<BTreeMap<String, String>> = RwLock::new(BTreeMap::new());

/// Lookup an encoding name for the given alias.
#[doc(alias = "xmlGetEncodingAlias")]
pub fn get_encoding_alias(alias: &str) -> Option<String> {
    let aliases = ENCODING_ALIASES.read().unwrap_or_else(|e| e.into_inner());
    aliases.get(&alias.to_uppercase()).cloned()
}

/// Register an alias `alias` for the encoding `name`.
/// If `alias` already exists as an alias, it is overwritten.
///
/// # Note
/// `alias` and `name` are stored after converted to uppercase.
#[doc(alias = "xmlAddEncodingAlias")]
pub fn add_encoding_alias(name: &str, alias: &str) {
    let mut aliases = ENCODING_ALIASES.write().unwrap_or_else(|e| e.into_inner());
    aliases.insert(alias.to_uppercase(), name.to_uppercase());
}

/// Unregister an encoding alias.
/// Returns the removed encoding name, or `None` if `alias` was not registered.
#[doc(alias = "xmlDelEncodingAlias")]
pub fn del_encoding_alias(alias: &str) -> Option<String> {
    let mut aliases = ENCODING_ALIASES.write().unwrap_or_else(|e| e.into_inner());
    aliases.remove(&alias.to_uppercase())
}

#[doc(alias = "xmlCleanupEncodingAliases")]
pub fn cleanup_encoding_aliases() {
    let mut aliases = ENCODING_ALIASES.write().unwrap_or_else(|e| e.into_inner());
    aliases.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(handler: &mut XmlCharEncodingHandler, src: &[u8]) -> String {
        let mut out = vec![0; src.len() * 4 + 4];
        let (read, write) = handler.decode(src, &mut out, true).unwrap();
        assert_eq!(read, src.len());
        String::from_utf8(out[..write].to_vec()).unwrap()
    }

    #[test]
    fn lookup_fast_path_encodings_have_no_handler() {
        for enc in [
            XmlCharEncoding::None,
            XmlCharEncoding::UTF8,
            XmlCharEncoding::ASCII,
        ] {
            assert!(lookup_char_encoding_handler(enc).unwrap().is_none());
        }
        assert_eq!(
            lookup_char_encoding_handler(XmlCharEncoding::UCS4_2143).unwrap_err(),
            XmlParserErrors::XmlErrUnsupportedEncoding
        );
    }

    #[test]
    fn utf16_decoders() {
        let mut le = lookup_char_encoding_handler(XmlCharEncoding::UTF16LE)
            .unwrap()
            .unwrap();
        assert_eq!(decode_all(&mut le, b"<\x00?\x00"), "<?");
        let mut be = find_encoding_handler("utf-16be").unwrap();
        assert_eq!(be.name(), "UTF-16BE");
        assert_eq!(decode_all(&mut be, &[0xD8, 0x3D, 0xDE, 0x00]), "\u{1F600}");
    }

    #[test]
    fn utf16_split_surrogate_is_left_unread() {
        let mut be = find_encoding_handler("UTF-16BE").unwrap();
        let mut out = [0u8; 16];
        let (read, write) = be.decode(&[0x00, 0x41, 0xD8, 0x3D], &mut out, false).unwrap();
        assert_eq!((read, write), (2, 1));
    }

    #[test]
    fn utf16_lone_low_surrogate_is_malformed() {
        let mut le = find_encoding_handler("UTF-16LE").unwrap();
        let mut out = [0u8; 16];
        let err = le.decode(&[0x41, 0x00, 0x00, 0xDC], &mut out, false).unwrap_err();
        assert!(err.malformed());
    }

    #[test]
    fn ucs4_and_latin1() {
        let mut ucs4 = find_encoding_handler("UCS-4LE").unwrap();
        assert_eq!(decode_all(&mut ucs4, &[0x3C, 0, 0, 0, 0xE9, 0, 0, 0]), "<é");
        let mut latin1 = find_encoding_handler("iso-8859-1").unwrap();
        assert_eq!(decode_all(&mut latin1, &[0x41, 0x80, 0xFF]), "A\u{80}ÿ");
    }

    #[test]
    fn ascii_rejects_high_bytes() {
        let mut ascii = find_encoding_handler("US-ASCII").unwrap();
        let mut out = [0u8; 8];
        match ascii.decode(b"ab\xC3", &mut out, false) {
            Err(EncodingError::Malformed { read, write, .. }) => {
                assert_eq!((read, write), (3, 2));
                assert_eq!(&out[..2], b"ab");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn predefined_handler_keeps_partial_state() {
        let mut sjis = find_encoding_handler("Shift_JIS").unwrap();
        let mut out = [0u8; 16];
        // first byte of a two-byte sequence only
        let (read, write) = sjis.decode(&[0x82], &mut out, false).unwrap();
        assert_eq!((read, write), (1, 0));
        let (read, write) = sjis.decode(&[0xA0], &mut out, false).unwrap();
        assert_eq!(read, 1);
        assert_eq!(std::str::from_utf8(&out[..write]).unwrap(), "あ");
    }

    #[test]
    fn open_by_name() {
        assert!(open_char_encoding_handler("utf-8").unwrap().is_none());
        assert_eq!(
            open_char_encoding_handler("ebcdic").unwrap().unwrap().name(),
            "EBCDIC"
        );
        assert_eq!(
            open_char_encoding_handler("no-such-encoding").unwrap_err(),
            XmlParserErrors::XmlErrUnsupportedEncoding
        );
    }

    #[test]
    fn aliases_are_case_insensitive() {
        add_encoding_alias("ISO-8859-1", "my-latin");
        assert_eq!(get_encoding_alias("MY-LATIN").as_deref(), Some("ISO-8859-1"));
        let handler = find_encoding_handler("My-Latin").unwrap();
        assert_eq!(handler.name(), "ISO-8859-1");
        assert_eq!(del_encoding_alias("my-latin").as_deref(), Some("ISO-8859-1"));
        assert!(get_encoding_alias("my-latin").is_none());
    }

    #[test]
    fn parse_encoding_names() {
        assert_eq!("utf-16".parse::<XmlCharEncoding>().unwrap(), XmlCharEncoding::UTF16LE);
        assert_eq!("IBM037".parse::<XmlCharEncoding>().unwrap(), XmlCharEncoding::EBCDIC);
        assert_eq!("".parse::<XmlCharEncoding>().unwrap(), XmlCharEncoding::None);
        assert!("klingon".parse::<XmlCharEncoding>().is_err());
    }
}
