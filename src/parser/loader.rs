use crate::{
    error::{XmlErrorDomain, XmlErrorLevel, XmlParserErrors},
    globals::GLOBAL_STATE,
    io::is_network_uri,
};

use super::{XmlParserCtxt, XmlParserInput, XmlParserOption};

/// External entity loaders types.
///
/// Returns the entity input parser.
#[doc(alias = "xmlExternalEntityLoader")]
pub type XmlExternalEntityLoader =
    fn(url: Option<&str>, id: Option<&str>, context: &mut XmlParserCtxt) -> Option<XmlParserInput>;

/// Changes the default external entity resolver function for the current thread.
///
/// `None` restores the default loader.
#[doc(alias = "xmlSetExternalEntityLoader")]
pub fn set_external_entity_loader(f: Option<XmlExternalEntityLoader>) {
    GLOBAL_STATE.with_borrow_mut(|state| state.external_entity_loader = f);
}

/// Returns the external entity loader in use on the current thread.
#[doc(alias = "xmlGetExternalEntityLoader")]
pub fn get_external_entity_loader() -> XmlExternalEntityLoader {
    GLOBAL_STATE
        .with_borrow(|state| state.external_entity_loader)
        .unwrap_or(default_external_entity_loader)
}

/// Open `url` as a file.
///
/// With `XML_PARSE_NONET`, network resources are refused.
///
/// Returns the new input, or `None`.
#[doc(alias = "xmlDefaultExternalEntityLoader")]
pub fn default_external_entity_loader(
    url: Option<&str>,
    id: Option<&str>,
    ctxt: &mut XmlParserCtxt,
) -> Option<XmlParserInput> {
    let Some(url) = url else {
        let id = id.unwrap_or("NULL");
        let level = if ctxt.validate != 0 {
            XmlErrorLevel::XmlErrError
        } else {
            XmlErrorLevel::XmlErrWarning
        };
        ctxt.ctxt_err(
            XmlErrorDomain::XmlFromIO,
            XmlParserErrors::XmlIOLoadError,
            level,
            Some(id),
            None,
            None,
            0,
            &format!("failed to load external entity \"{id}\"\n"),
        );
        return None;
    };

    if ctxt.options & XmlParserOption::XmlParseNoNet as i32 != 0 && is_network_uri(url) {
        ctxt.ctxt_err_io(XmlParserErrors::XmlIONetworkAttempt, Some(url));
        return None;
    }
    XmlParserInput::from_file(ctxt, url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn literal_loader(
        url: Option<&str>,
        _id: Option<&str>,
        ctxt: &mut XmlParserCtxt,
    ) -> Option<XmlParserInput> {
        let mut input = XmlParserInput::from_string(ctxt, "<literal/>")?;
        input.filename = url.map(str::to_owned);
        Some(input)
    }

    fn silent() -> XmlParserCtxt {
        let mut ctxt = XmlParserCtxt::new();
        ctxt.set_error_handler(Some(|_, _| {}), None);
        ctxt
    }

    #[test]
    fn custom_loader_is_used_until_reset() {
        set_external_entity_loader(Some(literal_loader));
        let mut ctxt = silent();
        let input = ctxt.load_external_entity(Some("anything.ent"), None).unwrap();
        assert_eq!(input.current_contents(), b"<literal/>");
        assert_eq!(input.filename.as_deref(), Some("anything.ent"));

        set_external_entity_loader(None);
        assert!(ctxt.load_external_entity(Some("/nonexistent/anything.ent"), None).is_none());
        assert_eq!(ctxt.last_error.code(), XmlParserErrors::XmlIOENOENT);
    }

    #[test]
    fn missing_url_is_a_warning() {
        let mut ctxt = silent();
        assert!(ctxt.load_external_entity(None, Some("-//X//Y")).is_none());
        assert_eq!(ctxt.last_error.code(), XmlParserErrors::XmlIOLoadError);
        assert_eq!(ctxt.last_error.level(), XmlErrorLevel::XmlErrWarning);
        assert_eq!(ctxt.last_error.str1(), Some("-//X//Y"));
        assert_eq!(ctxt.well_formed, 1);

        ctxt.use_options(XmlParserOption::XmlParseDTDValid as i32);
        ctxt.load_external_entity(None, None);
        assert_eq!(ctxt.last_error.level(), XmlErrorLevel::XmlErrError);
        assert_eq!(
            ctxt.last_error.message(),
            Some("failed to load external entity \"NULL\"\n")
        );
    }

    #[test]
    fn nonet_refuses_network() {
        let mut ctxt = silent();
        ctxt.use_options(XmlParserOption::XmlParseNoNet as i32);
        assert!(
            ctxt.load_external_entity(Some("http://example.org/a.dtd"), None)
                .is_none()
        );
        assert_eq!(ctxt.last_error.code(), XmlParserErrors::XmlIONetworkAttempt);
        assert_eq!(ctxt.last_error.str1(), Some("http://example.org/a.dtd"));
    }
}
