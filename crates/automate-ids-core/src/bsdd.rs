//! # bsDD Module
//!
//! buildingSMART Data Dictionary classes and the dictionaries indexing them.
//!
//! Two JSON shapes are accepted:
//! - a project sheet: `{"dictionaryUri", "name", "classes": [...]}` or a bare
//!   array of classes
//! - a `Class/v1` response of the bsDD REST API
//!
//! Both share the class layout of the API (`code`/`referenceCode`, `uri`,
//! `classProperties[]`), so one set of wire structs parses them.

use crate::error::{CoreError, Result};
use crate::rules::ValuePattern;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Path segment separating a dictionary URI from a class code.
const CLASS_SEGMENT: &str = "/class/";

// =============================================================================
// WIRE FORMAT
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SheetWire {
    Document(DocumentWire),
    Classes(Vec<ClassWire>),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentWire {
    dictionary_uri: Option<String>,
    #[serde(alias = "dictionaryName")]
    name: Option<String>,
    classes: Vec<ClassWire>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClassWire {
    uri: Option<String>,
    code: Option<String>,
    reference_code: Option<String>,
    name: Option<String>,
    dictionary_uri: Option<String>,
    #[serde(default)]
    class_properties: Vec<PropertyWire>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PropertyWire {
    name: Option<String>,
    property_code: Option<String>,
    code: Option<String>,
    property_set: Option<String>,
    is_required: Option<bool>,
    #[serde(default)]
    allowed_values: Vec<AllowedValueWire>,
    pattern: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AllowedValueWire {
    value: Option<String>,
    code: Option<String>,
}

// =============================================================================
// DOMAIN TYPES
// =============================================================================

/// A property a bsDD class expects on its members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BsddProperty {
    pub name: String,
    pub code: Option<String>,
    pub property_set: Option<String>,
    pub required: bool,
    pub allowed_values: Vec<String>,
    pub pattern: Option<ValuePattern>,
}

impl BsddProperty {
    /// Check a present value against allowed values and pattern.
    pub fn accepts(&self, value: &str) -> bool {
        let allowed = self.allowed_values.is_empty() || self.allowed_values.iter().any(|v| v == value);
        let patterned = self.pattern.as_ref().is_none_or(|p| p.is_match(value));
        allowed && patterned
    }
}

/// One bsDD classification entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BsddClass {
    pub uri: Option<String>,
    pub dictionary_uri: String,
    pub code: String,
    pub name: Option<String>,
    pub properties: Vec<BsddProperty>,
}

impl BsddClass {
    /// Parse a `Class/v1` API response.
    pub fn from_api_json(json: &str) -> Result<Self> {
        let wire: ClassWire = serde_json::from_str(json)?;
        Self::from_wire(wire, None)
    }

    /// Properties marked as required.
    pub fn required_properties(&self) -> impl Iterator<Item = &BsddProperty> {
        self.properties.iter().filter(|p| p.required)
    }

    fn from_wire(wire: ClassWire, fallback_dictionary: Option<&str>) -> Result<Self> {
        let code = wire
            .code
            .or(wire.reference_code)
            .or_else(|| {
                wire.uri
                    .as_deref()
                    .and_then(|uri| uri.rsplit('/').next())
                    .filter(|segment| !segment.is_empty())
                    .map(str::to_string)
            })
            .ok_or_else(|| CoreError::Bsdd("class has neither code nor uri".to_string()))?;

        let dictionary_uri = wire
            .dictionary_uri
            .or_else(|| fallback_dictionary.map(str::to_string))
            .or_else(|| wire.uri.as_deref().and_then(dictionary_uri_of))
            .ok_or_else(|| CoreError::Bsdd(format!("class {} has no dictionary URI", code)))?;

        let properties = wire
            .class_properties
            .into_iter()
            .map(BsddProperty::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            uri: wire.uri,
            dictionary_uri,
            code,
            name: wire.name,
            properties,
        })
    }
}

impl TryFrom<PropertyWire> for BsddProperty {
    type Error = CoreError;

    fn try_from(wire: PropertyWire) -> Result<Self> {
        let code = wire.property_code.or(wire.code);
        let name = wire
            .name
            .or_else(|| code.clone())
            .ok_or_else(|| CoreError::Bsdd("class property has neither name nor code".to_string()))?;
        let pattern = match wire.pattern.as_deref().filter(|p| !p.is_empty()) {
            Some(source) => Some(ValuePattern::new(source)?),
            None => None,
        };
        Ok(Self {
            name,
            code,
            property_set: wire.property_set,
            required: wire.is_required.unwrap_or(false),
            allowed_values: wire
                .allowed_values
                .into_iter()
                .filter_map(|v| v.value.or(v.code))
                .collect(),
            pattern,
        })
    }
}

/// Dictionary URI of a bsDD class URI, e.g.
/// `https://identifier.buildingsmart.org/uri/org/dict/1.0/class/X` -> `.../dict/1.0`.
pub fn dictionary_uri_of(class_uri: &str) -> Option<String> {
    class_uri
        .split_once(CLASS_SEGMENT)
        .map(|(dictionary, _)| dictionary.to_string())
}

/// Classes of one bsDD dictionary, indexed by code and by URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BsddDictionary {
    pub uri: String,
    pub name: Option<String>,
    classes: BTreeMap<String, BsddClass>,
    uri_index: BTreeMap<String, String>,
}

impl BsddDictionary {
    /// Create an empty dictionary.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            name: None,
            classes: BTreeMap::new(),
            uri_index: BTreeMap::new(),
        }
    }

    /// Parse a sheet. Classes are grouped by dictionary URI.
    pub fn from_sheet_json(json: &str) -> Result<Vec<Self>> {
        let sheet: SheetWire = serde_json::from_str(json)?;
        let (fallback, name, wires) = match sheet {
            SheetWire::Document(doc) => (doc.dictionary_uri, doc.name, doc.classes),
            SheetWire::Classes(classes) => (None, None, classes),
        };
        let classes = wires
            .into_iter()
            .map(|wire| BsddClass::from_wire(wire, fallback.as_deref()))
            .collect::<Result<Vec<_>>>()?;

        let mut dictionaries = Self::from_classes(classes);
        if let (Some(name), Some(fallback)) = (name, fallback.as_deref()) {
            for dictionary in dictionaries.iter_mut().filter(|d| d.uri == fallback) {
                dictionary.name = Some(name.clone());
            }
        }
        Ok(dictionaries)
    }

    /// Group classes into dictionaries, ordered by dictionary URI.
    pub fn from_classes(classes: Vec<BsddClass>) -> Vec<Self> {
        let mut grouped: BTreeMap<String, Self> = BTreeMap::new();
        for class in classes {
            grouped
                .entry(class.dictionary_uri.clone())
                .or_insert_with_key(|uri| Self::new(uri.clone()))
                .insert(class);
        }
        grouped.into_values().collect()
    }

    /// Add or replace a class.
    pub fn insert(&mut self, class: BsddClass) {
        if let Some(uri) = &class.uri {
            self.uri_index.insert(uri.clone(), class.code.clone());
        }
        self.classes.insert(class.code.clone(), class);
    }

    /// Move all classes of `other` into `self`. Later classes win on code clashes.
    pub fn merge(&mut self, other: Self) {
        if self.name.is_none() {
            self.name = other.name;
        }
        for class in other.classes.into_values() {
            self.insert(class);
        }
    }

    pub fn class_by_code(&self, code: &str) -> Option<&BsddClass> {
        self.classes.get(code)
    }

    pub fn class_by_uri(&self, uri: &str) -> Option<&BsddClass> {
        self.uri_index.get(uri).and_then(|code| self.classes.get(code))
    }

    pub fn classes(&self) -> impl Iterator<Item = &BsddClass> {
        self.classes.values()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

// =============================================================================
// TESTS
// =============================================================================
