//! Provide the entity record consumed by entity input streams.
//! This module is based on `libxml/entities.h`, `entities.c` and so on in `libxml2-v2.13`.
//!
//! Only what the input layer needs is kept: the declaration data used to open
//! a stream and the flags used for loop and amplification bookkeeping.
//!
//! Please refer to original libxml2 documents also.

use std::{cell::RefCell, rc::Rc};

// Entity flags
//
// XML_ENT_PARSED: The entity was parsed and `children` points to the
// content.
// XML_ENT_CHECKED: The entity was checked for loops.
pub const XML_ENT_PARSED: i32 = 1 << 0;
pub const XML_ENT_CHECKED: i32 = 1 << 1;
pub const XML_ENT_EXPANDING: i32 = 1 << 2;
pub const XML_ENT_CHECKED_LT: i32 = 1 << 3;
pub const XML_ENT_CONTAINS_LT: i32 = 1 << 4;

/// The different valid entity types.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum XmlEntityType {
    #[default]
    XmlInternalGeneralEntity = 1,
    XmlExternalGeneralParsedEntity = 2,
    XmlExternalGeneralUnparsedEntity = 3,
    XmlInternalParameterEntity = 4,
    XmlExternalParameterEntity = 5,
    XmlInternalPredefinedEntity = 6,
}

impl TryFrom<i32> for XmlEntityType {
    type Error = anyhow::Error;
    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::XmlInternalGeneralEntity),
            2 => Ok(Self::XmlExternalGeneralParsedEntity),
            3 => Ok(Self::XmlExternalGeneralUnparsedEntity),
            4 => Ok(Self::XmlInternalParameterEntity),
            5 => Ok(Self::XmlExternalParameterEntity),
            6 => Ok(Self::XmlInternalPredefinedEntity),
            _ => Err(anyhow::anyhow!(
                "Invalid convert from value '{value}' to {}",
                std::any::type_name::<Self>()
            )),
        }
    }
}

/// An entity declaration.
#[derive(Debug, Clone, Default)]
pub struct XmlEntity {
    // Entity name
    pub name: String,
    // The entity type
    pub etype: XmlEntityType,
    // content or ndata if unparsed
    pub content: Option<String>,
    // External identifier for PUBLIC
    pub external_id: Option<String>,
    // URI for a SYSTEM or PUBLIC Entity
    pub system_id: Option<String>,
    // the full URI as computed
    pub uri: Option<String>,
    // various flags
    pub flags: i32,
    // expanded size
    pub expanded_size: u64,
}

impl XmlEntity {
    /// Create an internal entity whose replacement text is `content`.
    pub fn internal(name: &str, etype: XmlEntityType, content: Option<&str>) -> Self {
        Self {
            name: name.to_owned(),
            etype,
            content: content.map(str::to_owned),
            ..Default::default()
        }
    }

    /// Create an external entity declared with `SYSTEM` (and optionally `PUBLIC`) identifiers.
    pub fn external(
        name: &str,
        etype: XmlEntityType,
        external_id: Option<&str>,
        system_id: &str,
    ) -> Self {
        Self {
            name: name.to_owned(),
            etype,
            external_id: external_id.map(str::to_owned),
            system_id: Some(system_id.to_owned()),
            uri: Some(system_id.to_owned()),
            ..Default::default()
        }
    }

    /// Wrap into the shared handle held by input streams.
    pub fn into_shared(self) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_types_convert_from_libxml_numbers() {
        assert_eq!(
            XmlEntityType::try_from(5).unwrap(),
            XmlEntityType::XmlExternalParameterEntity
        );
        assert!(XmlEntityType::try_from(0).is_err());
    }

    #[test]
    fn external_entity_records_uri() {
        let ent = XmlEntity::external(
            "chap",
            XmlEntityType::XmlExternalGeneralParsedEntity,
            None,
            "chap1.xml",
        );
        assert_eq!(ent.uri.as_deref(), Some("chap1.xml"));
        assert!(ent.content.is_none());
    }
}
