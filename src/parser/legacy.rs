//! Deprecated process-wide defaults.
//!
//! These toggles only change the defaults seen by parser contexts created
//! afterwards on the same thread. Prefer passing [`XmlParserOption`]s through
//! [`XmlParserConfig`] or [`XmlParserCtxt::use_options`].
//!
//! [`XmlParserOption`]: super::XmlParserOption
//! [`XmlParserConfig`]: super::XmlParserConfig
//! [`XmlParserCtxt::use_options`]: super::XmlParserCtxt::use_options

use crate::globals::{
    get_keep_blanks_default_value, get_line_numbers_default_value,
    get_pedantic_parser_default_value, get_substitute_entities_default_value,
    set_indent_tree_output, set_keep_blanks_default_value, set_line_numbers_default_value,
    set_pedantic_parser_default_value, set_substitute_entities_default_value,
};

pub use crate::globals::{
    set_do_validity_checking_default_value, set_get_warnings_default_value,
    set_load_ext_dtd_default_value, set_parser_debug_entities,
};

fn replace(get: fn() -> i32, set: fn(i32), val: i32) -> i32 {
    let old = get();
    set(val);
    old
}

/// Set and return the previous value for default entity support.
#[doc(alias = "xmlSubstituteEntitiesDefault")]
#[deprecated = "Use the modern options API with XML_PARSE_NOENT"]
pub fn xml_substitute_entities_default(val: i32) -> i32 {
    replace(
        get_substitute_entities_default_value,
        set_substitute_entities_default_value,
        val,
    )
}

/// Set and return the previous value for default blanks text nodes support.
///
/// Dropping blanks also turns the indentation of saved trees back on.
#[doc(alias = "xmlKeepBlanksDefault")]
#[deprecated = "Use the modern options API with XML_PARSE_NOBLANKS"]
pub fn xml_keep_blanks_default(val: i32) -> i32 {
    let old = replace(
        get_keep_blanks_default_value,
        set_keep_blanks_default_value,
        val,
    );
    if val == 0 {
        set_indent_tree_output(1);
    }
    old
}

/// Set and return the previous value for enabling pedantic warnings.
#[doc(alias = "xmlPedanticParserDefault")]
#[deprecated = "Use the modern options API with XML_PARSE_PEDANTIC"]
pub fn xml_pedantic_parser_default(val: i32) -> i32 {
    replace(
        get_pedantic_parser_default_value,
        set_pedantic_parser_default_value,
        val,
    )
}

/// Set and return the previous value for enabling line numbers in elements contents.
#[doc(alias = "xmlLineNumbersDefault")]
#[deprecated = "The modern options API always enables line numbers"]
pub fn xml_line_numbers_default(val: i32) -> i32 {
    replace(
        get_line_numbers_default_value,
        set_line_numbers_default_value,
        val,
    )
}
