//! The error-reporting slots of the SAX handler and of the validity context.
//!
//! Content callbacks are not part of the input layer. Only the handlers
//! consulted when a diagnostic is dispatched live here.

use crate::globals::{GenericError, GenericErrorContext, StructuredError};

/// The magic number marking a SAX2 handler.
/// `serror` is consulted only when `initialized` holds this value.
pub const XML_SAX2_MAGIC: u32 = 0xDEEDBEAF;

pub type WarningSAXFunc = GenericError;
pub type ErrorSAXFunc = GenericError;

/// A SAX handler reduced to its diagnostic callbacks.
#[doc(alias = "xmlSAXHandler")]
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlSAXHandler {
    pub warning: Option<WarningSAXFunc>,
    pub error: Option<ErrorSAXFunc>,
    pub initialized: u32,
    pub serror: Option<StructuredError>,
}

impl XmlSAXHandler {
    /// A SAX2 handler without any callback.
    pub fn sax2() -> Self {
        Self {
            initialized: XML_SAX2_MAGIC,
            ..Default::default()
        }
    }

    /// The structured handler, if this is a SAX2 handler.
    pub(crate) fn structured(&self) -> Option<StructuredError> {
        self.serror.filter(|_| self.initialized == XML_SAX2_MAGIC)
    }
}

/// The callbacks used for diagnostics from the validity and DTD domains.
#[doc(alias = "xmlValidCtxt")]
#[derive(Debug, Clone, Default)]
pub struct XmlValidCtxt {
    pub(crate) user_data: Option<GenericErrorContext>,
    pub error: Option<GenericError>,
    pub warning: Option<GenericError>,
}

impl XmlValidCtxt {
    pub fn new(
        error: Option<GenericError>,
        warning: Option<GenericError>,
        user_data: Option<GenericErrorContext>,
    ) -> Self {
        Self {
            user_data,
            error,
            warning,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::XmlError;

    fn serror(_: Option<GenericErrorContext>, _: &XmlError) {}

    #[test]
    fn serror_requires_sax2_magic() {
        let mut sax = XmlSAXHandler {
            serror: Some(serror),
            ..Default::default()
        };
        assert!(sax.structured().is_none());
        sax.initialized = XML_SAX2_MAGIC;
        assert!(sax.structured().is_some());
    }
}
