//! Thread-local global state: default handlers, legacy parser defaults and the last error.

use std::{
    any::Any,
    borrow::Cow,
    cell::RefCell,
    sync::{Arc, Mutex, MutexGuard},
};

use const_format::concatcp;

use crate::{
    error::{XmlError, generic_error_default},
    parser::XmlExternalEntityLoader,
};

pub type GenericError = fn(Option<GenericErrorContext>, &str);
pub type StructuredError = fn(Option<GenericErrorContext>, &XmlError);

/// User data passed back to error handlers.
#[derive(Clone)]
pub struct GenericErrorContext {
    context: Arc<Mutex<Box<dyn Any + Send>>>,
}

impl GenericErrorContext {
    pub fn new<T: Send + 'static>(context: T) -> Self {
        Self {
            context: Arc::new(Mutex::new(Box::new(context))),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, Box<dyn Any + Send>> {
        self.context.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for GenericErrorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenericErrorContext").finish_non_exhaustive()
    }
}

pub struct XmlGlobalState {
    parser_version: Cow<'static, str>,
    pub(crate) generic_error: Option<GenericError>,
    pub(crate) generic_error_context: Option<GenericErrorContext>,
    pub(crate) structured_error: Option<StructuredError>,
    pub(crate) structured_error_context: Option<GenericErrorContext>,
    pub(crate) external_entity_loader: Option<XmlExternalEntityLoader>,
    pub(crate) substitute_entities_default_value: i32,
    pub(crate) do_validity_checking_default_value: i32,
    pub(crate) get_warnings_default_value: i32,
    pub(crate) keep_blanks_default_value: i32,
    pub(crate) line_numbers_default_value: i32,
    pub(crate) load_ext_dtd_default_value: i32,
    pub(crate) parser_debug_entities: i32,
    pub(crate) pedantic_parser_default_value: i32,
    pub(crate) indent_tree_output: i32,
    pub(crate) last_error: XmlError,
}

impl XmlGlobalState {
    fn new() -> Self {
        const VERSION_STRING: &str = concatcp!(
            "{:0>2}{:0>2}{:0>2}",
            env!("CARGO_PKG_VERSION_MAJOR"),
            env!("CARGO_PKG_VERSION_MINOR"),
            env!("CARGO_PKG_VERSION_PATCH")
        );
        Self {
            parser_version: Cow::Borrowed(VERSION_STRING),
            generic_error: None,
            generic_error_context: None,
            structured_error: None,
            structured_error_context: None,
            external_entity_loader: None,
            substitute_entities_default_value: 0,
            do_validity_checking_default_value: 0,
            get_warnings_default_value: 1,
            keep_blanks_default_value: 1,
            line_numbers_default_value: 0,
            load_ext_dtd_default_value: 0,
            parser_debug_entities: 0,
            pedantic_parser_default_value: 0,
            indent_tree_output: 1,
            last_error: XmlError::default(),
        }
    }
}

thread_local! {
    pub static GLOBAL_STATE: RefCell<XmlGlobalState> = RefCell::new(XmlGlobalState::new());
}

/// The library version as a six digit string, such as `"000100"`.
pub fn parser_version() -> Cow<'static, str> {
    GLOBAL_STATE.with_borrow(|state| state.parser_version.clone())
}

/// Set new generic error function and generic error context.
///
/// If `func` is `None`, messages are written to the standard error.
/// If `context` is `None`, current context is clear and no context is set.
#[doc(alias = "xmlSetGenericErrorFunc")]
pub fn set_generic_error(func: Option<GenericError>, context: Option<GenericErrorContext>) {
    GLOBAL_STATE.with_borrow_mut(|state| {
        state.generic_error = func;
        state.generic_error_context = context;
    });
}

/// Set new structured error function and its context.
#[doc(alias = "xmlSetStructuredErrorFunc")]
pub fn set_structured_error(func: Option<StructuredError>, context: Option<GenericErrorContext>) {
    GLOBAL_STATE.with_borrow_mut(|state| {
        state.structured_error = func;
        state.structured_error_context = context;
    });
}

/// Write `msg` to the global generic error channel.
pub fn generic_error(msg: &str) {
    let (func, context) = GLOBAL_STATE.with_borrow(|state| {
        (
            state.generic_error.unwrap_or(generic_error_default),
            state.generic_error_context.clone(),
        )
    });
    func(context, msg);
}

/// Get the last global error registered.
#[doc(alias = "xmlGetLastError")]
pub fn get_last_error() -> XmlError {
    GLOBAL_STATE.with_borrow(|state| state.last_error.clone())
}

#[doc(alias = "xmlResetLastError")]
pub fn reset_last_error() {
    GLOBAL_STATE.with_borrow_mut(|state| state.last_error.reset());
}

macro_rules! default_value_accessors {
    ( $( $field:ident => $getter:ident, $setter:ident );* $(;)? ) => {
        $(
            pub fn $getter() -> i32 {
                GLOBAL_STATE.with_borrow(|state| state.$field)
            }

            pub fn $setter(value: i32) {
                GLOBAL_STATE.with_borrow_mut(|state| state.$field = value);
            }
        )*
    };
}

default_value_accessors!(
    substitute_entities_default_value => get_substitute_entities_default_value, set_substitute_entities_default_value;
    do_validity_checking_default_value => get_do_validity_checking_default_value, set_do_validity_checking_default_value;
    get_warnings_default_value => get_get_warnings_default_value, set_get_warnings_default_value;
    keep_blanks_default_value => get_keep_blanks_default_value, set_keep_blanks_default_value;
    line_numbers_default_value => get_line_numbers_default_value, set_line_numbers_default_value;
    load_ext_dtd_default_value => get_load_ext_dtd_default_value, set_load_ext_dtd_default_value;
    parser_debug_entities => get_parser_debug_entities, set_parser_debug_entities;
    pedantic_parser_default_value => get_pedantic_parser_default_value, set_pedantic_parser_default_value;
    indent_tree_output => get_indent_tree_output, set_indent_tree_output;
);
