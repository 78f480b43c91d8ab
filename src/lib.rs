//! The streaming input layer of an XML parser.
//!
//! Bytes are pulled from readers or pushed by the application, decoded to UTF-8
//! through the [`encoding`] registry, and read one character at a time by the
//! [`parser::XmlParserCtxt`], which also keeps the stack of entity inputs, the
//! resource limits and the error state.

pub mod buf;
pub mod encoding;
pub mod entities;
pub mod error;
pub mod globals;
pub mod io;
pub mod parser;

/// Format a message and hand it to the thread's generic error handler.
#[macro_export]
macro_rules! generic_error {
    ($($arg:tt)*) => {
        $crate::globals::generic_error(&format!($($arg)*))
    };
}
