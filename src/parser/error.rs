use std::borrow::Cow;

use crate::{
    error::{
        XmlError, XmlErrorDomain, XmlErrorLevel, XmlErrorSlots, XmlParserErrors, dispatch_error,
        resolve_channel,
    },
    globals::{GLOBAL_STATE, GenericErrorContext, StructuredError},
};

use super::{XmlParserCtxt, XmlParserInputState};

impl XmlParserCtxt {
    /// Handle an out-of-memory condition.
    ///
    /// The context is stopped and the error is reported without a message.
    #[doc(alias = "xmlCtxtErrMemory")]
    pub fn err_memory(&mut self) {
        self.err_no = XmlParserErrors::XmlErrNoMemory as i32;
        self.instate = XmlParserInputState::XmlParserEOF;
        self.well_formed = 0;
        self.disable_sax = 2;

        let error = XmlError {
            domain: XmlErrorDomain::XmlFromParser,
            code: XmlParserErrors::XmlErrNoMemory,
            level: XmlErrorLevel::XmlErrFatal,
            ..Default::default()
        };
        self.last_error = error.clone();
        GLOBAL_STATE.with_borrow_mut(|state| state.last_error = error.clone());
        let slots = self.error_slots(XmlErrorDomain::XmlFromParser, XmlErrorLevel::XmlErrFatal);
        dispatch_error(resolve_channel(slots), &error, None);
    }

    /// Register a structured error handler for this context.
    ///
    /// It takes precedence over every other handler.
    #[doc(alias = "xmlCtxtSetErrorHandler")]
    pub fn set_error_handler(
        &mut self,
        handler: Option<StructuredError>,
        data: Option<GenericErrorContext>,
    ) {
        self.error_handler = handler;
        self.error_ctxt = data;
    }

    /// Collect the handlers that may receive a diagnostic of `domain` and `level`.
    fn error_slots(&self, domain: XmlErrorDomain, level: XmlErrorLevel) -> XmlErrorSlots {
        let mut slots = XmlErrorSlots::from_globals();
        slots.context_structured = self
            .error_handler
            .map(|handler| (handler, self.error_ctxt.clone()));
        if let Some(sax) = self.sax.as_deref() {
            slots.sax_structured = sax
                .structured()
                .map(|handler| (handler, self.user_data.clone()));
        }
        let warning = level == XmlErrorLevel::XmlErrWarning;
        slots.context_generic = if matches!(
            domain,
            XmlErrorDomain::XmlFromValid | XmlErrorDomain::XmlFromDTD
        ) {
            let handler = if warning {
                self.vctxt.warning
            } else {
                self.vctxt.error
            };
            handler.map(|handler| (handler, self.vctxt.user_data.clone()))
        } else {
            self.sax.as_deref().and_then(|sax| {
                let handler = if warning { sax.warning } else { sax.error };
                handler.map(|handler| (handler, self.user_data.clone()))
            })
        };
        slots
    }

    /// Report a diagnostic raised while parsing.
    ///
    /// Messages beyond the per-context limits are counted but dropped.
    /// An error or a fatal error is recorded in `err_no`. A fatal error also marks the
    /// document as not well-formed and disables further callbacks unless recovering.
    #[doc(alias = "xmlCtxtErr", alias = "xmlCtxtVErr")]
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn ctxt_err(
        &mut self,
        domain: XmlErrorDomain,
        code: XmlParserErrors,
        level: XmlErrorLevel,
        str1: Option<&str>,
        str2: Option<&str>,
        str3: Option<&str>,
        int1: i32,
        msg: &str,
    ) {
        if code == XmlParserErrors::XmlErrNoMemory {
            self.err_memory();
            return;
        }

        // Stopped by the user or out of memory
        if self.disable_sax > 1 {
            return;
        }

        if level == XmlErrorLevel::XmlErrWarning {
            if self.nb_warnings >= self.config.max_warnings {
                return;
            }
            self.nb_warnings += 1;
        } else {
            if self.nb_errors >= self.config.max_errors {
                return;
            }
            self.nb_errors += 1;
        }

        let (file, line, col, context) = self.error_location();
        let error = XmlError {
            domain,
            code,
            message: Some(Cow::Owned(msg.to_owned())),
            level,
            file: file.map(Cow::Owned),
            line,
            str1: str1.map(|s| Cow::Owned(s.to_owned())),
            str2: str2.map(|s| Cow::Owned(s.to_owned())),
            str3: str3.map(|s| Cow::Owned(s.to_owned())),
            int1,
            col,
        };

        let suppressed = self.options & super::XmlParserOption::XmlParseNoError as i32 != 0
            || (level == XmlErrorLevel::XmlErrWarning
                && self.options & super::XmlParserOption::XmlParseNoWarning as i32 != 0);
        if !suppressed {
            let slots = self.error_slots(domain, level);
            dispatch_error(resolve_channel(slots), &error, context.as_deref());
        }

        GLOBAL_STATE.with_borrow_mut(|state| state.last_error = error.clone());
        self.last_error = error;

        if level >= XmlErrorLevel::XmlErrError {
            self.err_no = code as i32;
        }
        if level == XmlErrorLevel::XmlErrFatal {
            self.well_formed = 0;
            if self.recovery == 0 {
                self.disable_sax = 1;
            }
        }
    }

    /// File, line, column and context excerpt for a diagnostic.
    ///
    /// An input without a file name, such as an internal entity, is located
    /// through the input below it.
    fn error_location(&self) -> (Option<String>, usize, usize, Option<String>) {
        let Some(mut input) = self.input_tab.last() else {
            return (None, 0, 0, None);
        };
        if input.filename.is_none() && self.input_tab.len() > 1 {
            input = &self.input_tab[self.input_tab.len() - 2];
        }
        (
            input.filename.clone(),
            input.line.max(0) as usize,
            input.col.max(0) as usize,
            input.error_context(),
        )
    }

    /// Handle an I/O error.
    ///
    /// A missing resource or a refused network access is only a warning
    /// unless the document is validated.
    #[doc(alias = "xmlCtxtErrIO")]
    pub fn ctxt_err_io(&mut self, code: XmlParserErrors, uri: Option<&str>) {
        if code == XmlParserErrors::XmlErrNoMemory {
            self.err_memory();
            return;
        }

        let level = if matches!(
            code,
            XmlParserErrors::XmlIOENOENT
                | XmlParserErrors::XmlIONetworkAttempt
                | XmlParserErrors::XmlIOUnknown
        ) {
            if self.validate != 0 {
                XmlErrorLevel::XmlErrError
            } else {
                XmlErrorLevel::XmlErrWarning
            }
        } else {
            XmlErrorLevel::XmlErrFatal
        };

        let errstr = code.message();
        let msg = match uri {
            Some(uri) => format!("failed to load \"{uri}\": {errstr}\n"),
            None => format!("{errstr}\n"),
        };
        self.ctxt_err(
            XmlErrorDomain::XmlFromIO,
            code,
            level,
            uri,
            None,
            None,
            0,
            &msg,
        );
    }

    /// Handle a fatal parser error, i.e. violating Well-Formedness constraints
    #[doc(alias = "xmlFatalErr")]
    pub fn fatal_err(&mut self, code: XmlParserErrors, info: Option<&str>) {
        let errmsg = code.message();
        let msg = match info {
            Some(info) => format!("{errmsg}: {info}\n"),
            None => format!("{errmsg}\n"),
        };
        self.ctxt_err(
            XmlErrorDomain::XmlFromParser,
            code,
            XmlErrorLevel::XmlErrFatal,
            info,
            None,
            None,
            0,
            &msg,
        );
    }

    /// Handle an internal error
    #[doc(alias = "xmlErrInternal")]
    pub fn err_internal(&mut self, msg: &str, str1: Option<&str>) {
        self.ctxt_err(
            XmlErrorDomain::XmlFromParser,
            XmlParserErrors::XmlErrInternalError,
            XmlErrorLevel::XmlErrFatal,
            str1,
            None,
            None,
            0,
            msg,
        );
    }

    /// Handle an encoding error carrying an integer.
    #[doc(alias = "xmlErrEncodingInt")]
    pub fn err_encoding_int(&mut self, code: XmlParserErrors, msg: &str, val: i32) {
        self.ctxt_err(
            XmlErrorDomain::XmlFromParser,
            code,
            XmlErrorLevel::XmlErrFatal,
            None,
            None,
            None,
            val,
            msg,
        );
    }
}

/// Handle a fatal parser error, i.e. violating Well-Formedness constraints
#[doc(alias = "xmlFatalErrMsg")]
macro_rules! xml_fatal_err_msg {
    ($ctxt:expr, $code:expr, $msg:literal) => {
        $ctxt.ctxt_err(
            $crate::error::XmlErrorDomain::XmlFromParser,
            $code,
            $crate::error::XmlErrorLevel::XmlErrFatal,
            None,
            None,
            None,
            0,
            $msg,
        )
    };
}
pub(crate) use xml_fatal_err_msg;

/// Handle a fatal parser error, i.e. violating Well-Formedness constraints
#[doc(alias = "xmlFatalErrMsgStr")]
macro_rules! xml_fatal_err_msg_str {
    ($ctxt:expr, $code:expr, $msg:literal, $val:expr) => {{
        let val: &str = $val;
        let msg = format!($msg, val);
        $ctxt.ctxt_err(
            $crate::error::XmlErrorDomain::XmlFromParser,
            $code,
            $crate::error::XmlErrorLevel::XmlErrFatal,
            Some(val),
            None,
            None,
            0,
            &msg,
        )
    }};
}
pub(crate) use xml_fatal_err_msg_str;

/// Handle a warning.
#[doc(alias = "xmlWarningMsg")]
macro_rules! xml_warning_msg {
    ($ctxt:expr, $code:expr, $msg:literal, $str1:expr) => {{
        let str1: &str = $str1;
        let msg = format!($msg, str1);
        $ctxt.ctxt_err(
            $crate::error::XmlErrorDomain::XmlFromParser,
            $code,
            $crate::error::XmlErrorLevel::XmlErrWarning,
            Some(str1),
            None,
            None,
            0,
            &msg,
        )
    }};
    ($ctxt:expr, $code:expr, $msg:literal, $str1:expr, $str2:expr) => {{
        let (str1, str2): (&str, &str) = ($str1, $str2);
        let msg = format!($msg, str1, str2);
        $ctxt.ctxt_err(
            $crate::error::XmlErrorDomain::XmlFromParser,
            $code,
            $crate::error::XmlErrorLevel::XmlErrWarning,
            Some(str1),
            Some(str2),
            None,
            0,
            &msg,
        )
    }};
}
pub(crate) use xml_warning_msg;

/// Handle an internal error
#[doc(alias = "xmlErrInternal")]
macro_rules! xml_err_internal {
    ($ctxt:expr, $msg:literal) => {
        $ctxt.err_internal($msg, None)
    };
    ($ctxt:expr, $msg:literal, $s:expr) => {{
        let s: &str = &$s;
        let msg = format!($msg, s);
        $ctxt.err_internal(&msg, Some(s))
    }};
}
pub(crate) use xml_err_internal;

/// Handle an encoding error
#[doc(alias = "xmlErrEncodingInt")]
macro_rules! xml_err_encoding_int {
    ($ctxt:expr, $code:expr, $msg:literal, $val:expr) => {{
        let val: i32 = $val;
        $ctxt.err_encoding_int($code, &format!($msg, val), val)
    }};
}
pub(crate) use xml_err_encoding_int;

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::parser::{
        XML_MAX_ERRORS, XmlParserInput, XmlParserOption, XmlSAXHandler, XmlValidCtxt,
    };

    thread_local! {
        static SEEN: RefCell<Vec<String>> = const { RefCell::new(vec![]) };
    }

    fn record_structured(_: Option<GenericErrorContext>, err: &XmlError) {
        SEEN.with_borrow_mut(|seen| seen.push(format!("structured:{:?}", err.code())));
    }

    fn record_generic(_: Option<GenericErrorContext>, msg: &str) {
        SEEN.with_borrow_mut(|seen| seen.push(format!("generic:{msg}")));
    }

    fn record_valid(_: Option<GenericErrorContext>, msg: &str) {
        SEEN.with_borrow_mut(|seen| seen.push(format!("valid:{msg}")));
    }

    fn take_seen() -> Vec<String> {
        SEEN.with_borrow_mut(std::mem::take)
    }

    #[test]
    fn fatal_error_updates_state() {
        let mut ctxt = XmlParserCtxt::new();
        ctxt.set_error_handler(Some(record_structured), None);
        ctxt.fatal_err(XmlParserErrors::XmlErrDocumentEmpty, None);
        assert_eq!(ctxt.err_no, XmlParserErrors::XmlErrDocumentEmpty as i32);
        assert_eq!(ctxt.well_formed, 0);
        assert_eq!(ctxt.disable_sax, 1);
        assert_eq!(ctxt.last_error.message(), Some("Document is empty\n"));
        assert_eq!(take_seen(), ["structured:XmlErrDocumentEmpty"]);

        let mut ctxt = XmlParserCtxt::new();
        ctxt.set_error_handler(Some(record_structured), None);
        ctxt.recovery = 1;
        ctxt.fatal_err(XmlParserErrors::XmlErrDocumentEnd, Some("extra"));
        assert_eq!(ctxt.disable_sax, 0);
        assert_eq!(ctxt.last_error.str1(), Some("extra"));
        take_seen();
    }

    #[test]
    fn warnings_leave_err_no_alone() {
        let mut ctxt = XmlParserCtxt::new();
        ctxt.set_error_handler(Some(record_structured), None);
        xml_warning_msg!(
            ctxt,
            XmlParserErrors::XmlWarEncodingMismatch,
            "Encoding '{}' doesn't match auto-detected '{}'\n",
            "UTF-16BE",
            "UTF-16LE"
        );
        assert_eq!(ctxt.err_no, 0);
        assert_eq!(ctxt.well_formed, 1);
        assert_eq!(ctxt.last_error.str2(), Some("UTF-16LE"));
        take_seen();
    }

    #[test]
    fn errors_are_capped() {
        let mut ctxt = XmlParserCtxt::new();
        ctxt.set_error_handler(Some(record_structured), None);
        ctxt.recovery = 1;
        for _ in 0..150 {
            ctxt.fatal_err(XmlParserErrors::XmlErrDocumentEnd, None);
        }
        assert_eq!(ctxt.nb_errors, XML_MAX_ERRORS);
        assert_eq!(take_seen().len(), XML_MAX_ERRORS as usize);
    }

    #[test]
    fn halted_context_stays_silent() {
        let mut ctxt = XmlParserCtxt::new();
        ctxt.set_error_handler(Some(record_structured), None);
        ctxt.halt();
        ctxt.fatal_err(XmlParserErrors::XmlErrDocumentEnd, None);
        assert!(take_seen().is_empty());
        assert_eq!(ctxt.nb_errors, 0);
    }

    #[test]
    fn sax_and_valid_slots() {
        let mut ctxt = XmlParserCtxt::new();
        let mut sax = XmlSAXHandler::sax2();
        sax.error = Some(record_generic);
        sax.warning = Some(record_generic);
        ctxt.sax = Some(Box::new(sax));
        ctxt.vctxt = XmlValidCtxt::new(Some(record_valid), None, None);

        ctxt.ctxt_err(
            XmlErrorDomain::XmlFromValid,
            XmlParserErrors::XmlErrInternalError,
            XmlErrorLevel::XmlErrError,
            None,
            None,
            None,
            0,
            "bad\n",
        );
        ctxt.ctxt_err(
            XmlErrorDomain::XmlFromParser,
            XmlParserErrors::XmlErrInternalError,
            XmlErrorLevel::XmlErrError,
            None,
            None,
            None,
            0,
            "worse\n",
        );
        assert_eq!(
            take_seen(),
            ["valid:validity error : bad\n", "generic:parser error : worse\n"]
        );

        let mut sax = XmlSAXHandler::sax2();
        sax.serror = Some(record_structured);
        sax.error = Some(record_generic);
        ctxt.sax = Some(Box::new(sax));
        ctxt.err_internal("oops\n", None);
        assert_eq!(take_seen(), ["structured:XmlErrInternalError"]);
    }

    #[test]
    fn noerror_suppresses_delivery_only() {
        let mut ctxt = XmlParserCtxt::new();
        ctxt.set_error_handler(Some(record_structured), None);
        ctxt.options |= XmlParserOption::XmlParseNoError as i32;
        ctxt.fatal_err(XmlParserErrors::XmlErrDocumentEnd, None);
        assert!(take_seen().is_empty());
        assert_eq!(ctxt.last_error.code(), XmlParserErrors::XmlErrDocumentEnd);
    }

    #[test]
    fn io_levels() {
        let mut ctxt = XmlParserCtxt::new();
        ctxt.set_error_handler(Some(record_structured), None);
        ctxt.ctxt_err_io(XmlParserErrors::XmlIOENOENT, Some("missing.xml"));
        assert_eq!(ctxt.last_error.level(), XmlErrorLevel::XmlErrWarning);
        assert_eq!(
            ctxt.last_error.message(),
            Some("failed to load \"missing.xml\": No such file or directory\n")
        );
        ctxt.validate = 1;
        ctxt.ctxt_err_io(XmlParserErrors::XmlIOENOENT, None);
        assert_eq!(ctxt.last_error.level(), XmlErrorLevel::XmlErrError);
        ctxt.ctxt_err_io(XmlParserErrors::XmlIOEACCES, None);
        assert_eq!(ctxt.last_error.level(), XmlErrorLevel::XmlErrFatal);
        take_seen();
    }

    #[test]
    fn memory_error_halts() {
        let mut ctxt = XmlParserCtxt::new();
        ctxt.set_error_handler(Some(record_structured), None);
        ctxt.err_memory();
        assert_eq!(ctxt.disable_sax, 2);
        assert_eq!(ctxt.instate, XmlParserInputState::XmlParserEOF);
        assert!(ctxt.last_error.message().is_none());
        take_seen();
    }

    #[test]
    fn entity_errors_point_at_parent() {
        let mut ctxt = XmlParserCtxt::new();
        ctxt.set_error_handler(Some(record_structured), None);
        let mut doc = XmlParserInput::from_string(&mut ctxt, "<doc>\n&e;</doc>").unwrap();
        doc.filename = Some("doc.xml".to_owned());
        doc.line = 2;
        ctxt.input_push(doc);
        let ent = XmlParserInput::from_string(&mut ctxt, "text").unwrap();
        ctxt.input_push(ent);
        ctxt.fatal_err(XmlParserErrors::XmlErrInvalidChar, None);
        assert_eq!(ctxt.last_error.file(), Some("doc.xml"));
        assert_eq!(ctxt.last_error.line(), 2);
        take_seen();
    }
}
