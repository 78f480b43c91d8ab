//! Provide methods and data structures for error handling.
//! This module is based on `libxml/xmlerror.h`, `error.c`, and so on in `libxml2-v2.13`.
//!
//! Please refer to original libxml2 documents also.

use std::{borrow::Cow, fmt::Display, io};

use crate::globals::{GLOBAL_STATE, GenericError, GenericErrorContext, StructuredError};

macro_rules! impl_xml_parser_errors {
    ( $( $variant:ident = $value:literal ),* $(,)? ) => {
        #[repr(C)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub enum XmlParserErrors {
            #[default]
            $(
                $variant = $value
            ),*
        }

        impl TryFrom<i32> for XmlParserErrors {
            type Error = anyhow::Error;
            fn try_from(value: i32) -> Result<Self, Self::Error> {
                $(
                    if value == Self:: $variant as i32 {
                        return Ok(Self:: $variant);
                    }
                )*
                Err(anyhow::anyhow!("Invalid convert from value '{value}' to {}", std::any::type_name::<Self>()))
            }
        }
    };
}

// `#[default]` lands on the first variant.
impl_xml_parser_errors!(
    XmlErrOK = 0,
    XmlErrInternalError = 1,
    XmlErrNoMemory = 2,
    XmlErrDocumentStart = 3,
    XmlErrDocumentEmpty = 4,
    XmlErrDocumentEnd = 5,
    XmlErrInvalidChar = 9,
    XmlErrUnparsedEntity = 28,
    XmlErrUnknownEncoding = 31,
    XmlErrUnsupportedEncoding = 32,
    XmlErrStringNotStarted = 33,
    XmlErrStringNotClosed = 34,
    XmlErrXMLDeclNotStarted = 56,
    XmlErrXMLDeclNotFinished = 57,
    XmlErrSpaceRequired = 65,
    XmlErrEqualRequired = 75,
    XmlErrStandaloneValue = 78,
    XmlErrEncodingName = 79,
    XmlErrInvalidEncoding = 81,
    XmlErrEntityLoop = 89,
    XmlErrVersionMissing = 96,
    XmlWarUnknownVersion = 97,
    XmlErrMissingEncoding = 101,
    XmlErrUnknownVersion = 108,
    XmlErrNameTooLong = 110,
    XmlErrUserStop = 111,
    XmlWarEncodingMismatch = 113,
    XmlErrResourceLimit = 114,
    XmlErrArgument = 115,
    XmlErrSystem = 116,
    XmlIOUnknown = 1500,
    XmlIOEACCES = 1501,
    XmlIOEAGAIN = 1502,
    XmlIOEINTR = 1514,
    XmlIOEINVAL = 1515,
    XmlIOEIO = 1516,
    XmlIOEISDIR = 1517,
    XmlIOENOENT = 1524,
    XmlIOENOMEM = 1527,
    XmlIOENOTDIR = 1530,
    XmlIOEPIPE = 1536,
    XmlIOETIMEOUT = 1541,
    XmlIONetworkAttempt = 1543,
    XmlIOEncoder = 1544,
    XmlIONoInput = 1547,
    XmlIOLoadError = 1549,
    XmlIOECONNREFUSED = 1552,
    XmlI18NNoName = 6000,
    XmlI18NNoHandler = 6001,
    XmlI18NExcessHandler = 6002,
    XmlI18NConvFailed = 6003,
    XmlI18NNoOutput = 6004,
    XmlBufOverflow = 7000,
);

impl XmlParserErrors {
    pub fn is_ok(&self) -> bool {
        *self == Self::XmlErrOK
    }

    pub fn is_err(&self) -> bool {
        !self.is_ok()
    }

    /// The standard message for this code.
    #[doc(alias = "xmlErrString")]
    pub fn message(&self) -> &'static str {
        match self {
            Self::XmlErrOK => "Success",
            Self::XmlErrInternalError => "Internal error",
            Self::XmlErrNoMemory => "Out of memory",
            Self::XmlErrDocumentStart => "Start tag expected, '<' not found",
            Self::XmlErrDocumentEmpty => "Document is empty",
            Self::XmlErrDocumentEnd => "Extra content at the end of the document",
            Self::XmlErrInvalidChar => "Invalid character",
            Self::XmlErrUnparsedEntity => "Cannot parse unparsed entity",
            Self::XmlErrUnknownEncoding => "Unknown encoding",
            Self::XmlErrUnsupportedEncoding => "Unsupported encoding",
            Self::XmlErrStringNotStarted => "String not started expecting ' or \"",
            Self::XmlErrStringNotClosed => "String not closed expecting \" or '",
            Self::XmlErrXMLDeclNotStarted => "Parsing XML declaration: '<?xml' expected",
            Self::XmlErrXMLDeclNotFinished => "Parsing XML declaration: '?>' expected",
            Self::XmlErrSpaceRequired => "Blank needed here",
            Self::XmlErrEqualRequired => "'=' expected",
            Self::XmlErrStandaloneValue => "Standalone accepts only 'yes' or 'no'",
            Self::XmlErrEncodingName => "Invalid encoding name",
            Self::XmlErrInvalidEncoding => "Invalid bytes in character encoding",
            Self::XmlErrEntityLoop => "Detected an entity reference loop",
            Self::XmlErrVersionMissing => "Malformed declaration expecting version",
            Self::XmlWarUnknownVersion => "Unsupported version",
            Self::XmlErrMissingEncoding => "Document labelled UTF-16 but has UTF-8 content",
            Self::XmlErrUnknownVersion => "Unknown version",
            Self::XmlErrNameTooLong => "Name too long",
            Self::XmlErrUserStop => "Stopped by user",
            Self::XmlWarEncodingMismatch => "Encoding mismatch",
            Self::XmlErrResourceLimit => "Resource limit exceeded",
            Self::XmlErrArgument => "Invalid argument",
            Self::XmlErrSystem => "Out of system resources",
            Self::XmlIOUnknown => "Unknown IO error",
            Self::XmlIOEACCES => "Permission denied",
            Self::XmlIOEAGAIN => "Resource temporarily unavailable",
            Self::XmlIOEINTR => "Interrupted function call",
            Self::XmlIOEINVAL => "Invalid argument",
            Self::XmlIOEIO => "Input/output error",
            Self::XmlIOEISDIR => "Is a directory",
            Self::XmlIOENOENT => "No such file or directory",
            Self::XmlIOENOMEM => "Not enough space",
            Self::XmlIOENOTDIR => "Not a directory",
            Self::XmlIOEPIPE => "Broken pipe",
            Self::XmlIOETIMEOUT => "Operation timed out",
            Self::XmlIONetworkAttempt => "Attempt to load network entity",
            Self::XmlIOEncoder => "encoder error",
            Self::XmlIONoInput => "no input",
            Self::XmlIOLoadError => "failed to load external entity",
            Self::XmlIOECONNREFUSED => "Connection refused",
            Self::XmlI18NNoName => "No encoding name",
            Self::XmlI18NNoHandler => "No encoding handler",
            Self::XmlI18NExcessHandler => "Too many encoding handlers",
            Self::XmlI18NConvFailed => "Conversion failed",
            Self::XmlI18NNoOutput => "No output",
            Self::XmlBufOverflow => "Buffer overflow",
        }
    }
}

impl From<&io::Error> for XmlParserErrors {
    fn from(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::XmlIOENOENT,
            io::ErrorKind::PermissionDenied => Self::XmlIOEACCES,
            io::ErrorKind::WouldBlock => Self::XmlIOEAGAIN,
            io::ErrorKind::Interrupted => Self::XmlIOEINTR,
            io::ErrorKind::InvalidInput => Self::XmlIOEINVAL,
            io::ErrorKind::IsADirectory => Self::XmlIOEISDIR,
            io::ErrorKind::NotADirectory => Self::XmlIOENOTDIR,
            io::ErrorKind::OutOfMemory => Self::XmlIOENOMEM,
            io::ErrorKind::BrokenPipe => Self::XmlIOEPIPE,
            io::ErrorKind::TimedOut => Self::XmlIOETIMEOUT,
            io::ErrorKind::ConnectionRefused => Self::XmlIOECONNREFUSED,
            io::ErrorKind::UnexpectedEof | io::ErrorKind::Other => Self::XmlIOEIO,
            _ => Self::XmlIOUnknown,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum XmlErrorDomain {
    #[default]
    XmlFromNone = 0,
    XmlFromParser = 1,
    XmlFromTree = 2,
    XmlFromNamespace = 3,
    XmlFromDTD = 4,
    XmlFromHTML = 5,
    XmlFromMemory = 6,
    XmlFromOutput = 7,
    XmlFromIO = 8,
    XmlFromValid = 23,
    XmlFromI18N = 27,
    XmlFromBuffer = 29,
    XmlFromURI = 30,
}

impl Display for XmlErrorDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::XmlFromNone => "",
            Self::XmlFromParser => "parser ",
            Self::XmlFromTree => "tree ",
            Self::XmlFromNamespace => "namespace ",
            Self::XmlFromDTD | Self::XmlFromValid => "validity ",
            Self::XmlFromHTML => "HTML parser ",
            Self::XmlFromMemory => "memory ",
            Self::XmlFromOutput => "output ",
            Self::XmlFromIO => "I/O ",
            Self::XmlFromI18N => "encoding ",
            Self::XmlFromBuffer => "internal buffer ",
            Self::XmlFromURI => "URI ",
        };
        write!(f, "{s}")
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum XmlErrorLevel {
    #[default]
    XmlErrNone = 0,
    /// A simple warning
    XmlErrWarning = 1,
    /// A recoverable error
    XmlErrError = 2,
    /// A fatal error
    XmlErrFatal = 3,
}

impl Display for XmlErrorLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::XmlErrNone => Ok(()),
            Self::XmlErrWarning => write!(f, "warning : "),
            Self::XmlErrError | Self::XmlErrFatal => write!(f, "error : "),
        }
    }
}

/// An error reported by the input layer.
#[derive(Debug, Clone, Default)]
pub struct XmlError {
    pub(crate) domain: XmlErrorDomain,
    pub(crate) code: XmlParserErrors,
    pub(crate) message: Option<Cow<'static, str>>,
    pub(crate) level: XmlErrorLevel,
    pub(crate) file: Option<Cow<'static, str>>,
    pub(crate) line: usize,
    pub(crate) str1: Option<Cow<'static, str>>,
    pub(crate) str2: Option<Cow<'static, str>>,
    pub(crate) str3: Option<Cow<'static, str>>,
    pub(crate) int1: i32,
    pub(crate) col: usize,
}

impl XmlError {
    pub fn domain(&self) -> XmlErrorDomain {
        self.domain
    }

    pub fn code(&self) -> XmlParserErrors {
        self.code
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn level(&self) -> XmlErrorLevel {
        self.level
    }

    pub fn file(&self) -> Option<&str> {
        self.file.as_deref()
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn col(&self) -> usize {
        self.col
    }

    pub fn str1(&self) -> Option<&str> {
        self.str1.as_deref()
    }

    pub fn str2(&self) -> Option<&str> {
        self.str2.as_deref()
    }

    pub fn str3(&self) -> Option<&str> {
        self.str3.as_deref()
    }

    pub fn int1(&self) -> i32 {
        self.int1
    }

    pub fn is_ok(&self) -> bool {
        self.code.is_ok()
    }

    pub fn is_err(&self) -> bool {
        self.code.is_err()
    }

    #[doc(alias = "xmlResetError")]
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl Display for XmlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(file) = self.file.as_deref() {
            write!(f, "{file}:{}: ", self.line)?;
        } else if self.line != 0 && self.domain == XmlErrorDomain::XmlFromParser {
            write!(f, "Entity: line {}: ", self.line)?;
        }
        write!(f, "{}{}", self.domain, self.level)?;
        match self.message.as_deref() {
            Some(msg) if msg.ends_with('\n') => write!(f, "{msg}"),
            Some(msg) => writeln!(f, "{msg}"),
            None => writeln!(f, "out of memory error"),
        }
    }
}

impl std::error::Error for XmlError {}

/// Write `msg` to the standard error.
/// This is used when no generic error handler is registered.
pub fn generic_error_default(_context: Option<GenericErrorContext>, msg: &str) {
    eprint!("{msg}");
}

/// A resolved destination of one diagnostic.
pub enum XmlErrorChannel {
    Structured(StructuredError, Option<GenericErrorContext>),
    Generic(GenericError, Option<GenericErrorContext>),
    Stderr,
}

/// The handler slots consulted for one diagnostic.
///
/// Fields are listed in their precedence order. When every slot is empty,
/// the report is written to the standard error.
#[derive(Default)]
pub struct XmlErrorSlots {
    pub context_structured: Option<(StructuredError, Option<GenericErrorContext>)>,
    pub sax_structured: Option<(StructuredError, Option<GenericErrorContext>)>,
    pub global_structured: Option<(StructuredError, Option<GenericErrorContext>)>,
    pub context_generic: Option<(GenericError, Option<GenericErrorContext>)>,
    pub global_generic: Option<(GenericError, Option<GenericErrorContext>)>,
}

impl XmlErrorSlots {
    /// Slots with only the global handlers filled in.
    pub fn from_globals() -> Self {
        GLOBAL_STATE.with_borrow(|state| Self {
            global_structured: state
                .structured_error
                .map(|f| (f, state.structured_error_context.clone())),
            global_generic: state
                .generic_error
                .map(|f| (f, state.generic_error_context.clone())),
            ..Default::default()
        })
    }
}

/// Pick the highest-precedence channel among `slots`.
pub fn resolve_channel(slots: XmlErrorSlots) -> XmlErrorChannel {
    let XmlErrorSlots {
        context_structured,
        sax_structured,
        global_structured,
        context_generic,
        global_generic,
    } = slots;
    [context_structured, sax_structured, global_structured]
        .into_iter()
        .flatten()
        .map(|(f, data)| XmlErrorChannel::Structured(f, data))
        .chain(
            [context_generic, global_generic]
                .into_iter()
                .flatten()
                .map(|(f, data)| XmlErrorChannel::Generic(f, data)),
        )
        .next()
        .unwrap_or(XmlErrorChannel::Stderr)
}

/// Deliver `error` to `channel`.
///
/// Generic channels and the standard error receive the formatted report followed by
/// `context`, the excerpt of the input around the error position, if any.
pub fn dispatch_error(channel: XmlErrorChannel, error: &XmlError, context: Option<&str>) {
    match channel {
        XmlErrorChannel::Structured(f, data) => f(data, error),
        XmlErrorChannel::Generic(f, data) => {
            f(data.clone(), &error.to_string());
            if let Some(context) = context {
                f(data, context);
            }
        }
        XmlErrorChannel::Stderr => {
            generic_error_default(None, &error.to_string());
            if let Some(context) = context {
                generic_error_default(None, context);
            }
        }
    }
}

/// Report an error which is not associated with any parser context.
///
/// The error is stored as the global last error and delivered to the global handlers.
#[doc(alias = "__xmlSimpleError")]
pub(crate) fn xml_simple_error(
    domain: XmlErrorDomain,
    code: XmlParserErrors,
    level: XmlErrorLevel,
    msg: &str,
    str1: Option<String>,
) {
    if code.is_ok() {
        return;
    }
    let error = XmlError {
        domain,
        code,
        message: Some(Cow::Owned(msg.to_owned())),
        level,
        str1: str1.map(Cow::Owned),
        ..Default::default()
    };
    GLOBAL_STATE.with_borrow_mut(|state| state.last_error = error.clone());
    dispatch_error(resolve_channel(XmlErrorSlots::from_globals()), &error, None);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn structured_a(_: Option<GenericErrorContext>, _: &XmlError) {}
    fn structured_b(_: Option<GenericErrorContext>, _: &XmlError) {}
    fn generic_a(_: Option<GenericErrorContext>, _: &str) {}

    #[test]
    fn codes_follow_libxml_numbering() {
        assert_eq!(XmlParserErrors::XmlErrInvalidEncoding as i32, 81);
        assert_eq!(XmlParserErrors::XmlErrResourceLimit as i32, 114);
        assert_eq!(XmlParserErrors::XmlIONetworkAttempt as i32, 1543);
        assert_eq!(
            XmlParserErrors::try_from(113).unwrap(),
            XmlParserErrors::XmlWarEncodingMismatch
        );
        assert!(XmlParserErrors::try_from(-5).is_err());
        assert_eq!(XmlParserErrors::default(), XmlParserErrors::XmlErrOK);
    }

    #[test]
    fn display_matches_report_format() {
        let err = XmlError {
            domain: XmlErrorDomain::XmlFromParser,
            code: XmlParserErrors::XmlErrInvalidEncoding,
            message: Some("Input is not proper UTF-8\n".into()),
            level: XmlErrorLevel::XmlErrFatal,
            file: Some("doc.xml".into()),
            line: 3,
            ..Default::default()
        };
        assert_eq!(
            err.to_string(),
            "doc.xml:3: parser error : Input is not proper UTF-8\n"
        );

        let warning = XmlError {
            domain: XmlErrorDomain::XmlFromIO,
            level: XmlErrorLevel::XmlErrWarning,
            message: Some("no input".into()),
            ..Default::default()
        };
        assert_eq!(warning.to_string(), "I/O warning : no input\n");
    }

    #[test]
    fn resolve_channel_precedence() {
        let slots = XmlErrorSlots {
            sax_structured: Some((structured_b, None)),
            global_structured: Some((structured_a, None)),
            context_generic: Some((generic_a, None)),
            ..Default::default()
        };
        match resolve_channel(slots) {
            XmlErrorChannel::Structured(f, _) => {
                assert_eq!(f as usize, structured_b as StructuredError as usize)
            }
            _ => panic!("structured channel expected"),
        }

        let slots = XmlErrorSlots {
            context_generic: Some((generic_a, None)),
            global_generic: Some((generic_error_default, None)),
            ..Default::default()
        };
        match resolve_channel(slots) {
            XmlErrorChannel::Generic(f, _) => {
                assert_eq!(f as usize, generic_a as GenericError as usize)
            }
            _ => panic!("generic channel expected"),
        }

        assert!(matches!(
            resolve_channel(XmlErrorSlots::default()),
            XmlErrorChannel::Stderr
        ));
    }

    #[test]
    fn io_error_kinds_map_to_codes() {
        let err = io::Error::new(io::ErrorKind::NotFound, "missing");
        assert_eq!(XmlParserErrors::from(&err), XmlParserErrors::XmlIOENOENT);
        let err = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        assert_eq!(XmlParserErrors::from(&err), XmlParserErrors::XmlIOEACCES);
    }
}
