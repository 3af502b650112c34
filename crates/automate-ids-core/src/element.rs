//! # Element Module
//!
//! Typed view of a Speckle object for rule evaluation.
//!
//! A `ModelElement` is extracted once per traversed object. It carries the
//! identity used in reports (`ObjectInfo`), the Revit parameters, values
//! found under the nested `properties` map, and classifications.

use crate::traversal::TraversalContext;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Speckle type of a Revit parameter object.
pub const REVIT_PARAMETER_TYPE: &str = "Objects.BuiltElements.Revit.Parameter";

/// Speckle type of a Revit instance whose type data lives in `definition`.
pub const REVIT_INSTANCE_TYPE: &str = "Objects.Other.Revit.RevitInstance";

/// Placeholder for identity fields the object does not provide.
pub const UNKNOWN: &str = "Unknown";

/// Parameters that carry a classification code, with their system name.
const CLASSIFICATION_PARAMETERS: &[(&str, &str)] = &[
    ("OmniClass Number", "OmniClass"),
    ("Assembly Code", "Uniformat"),
    ("Classification.Uniclass.Pr.Number", "Uniclass"),
];

/// Members of a `parameters` object that are not parameters.
const PARAMETER_BOOKKEEPING: &[&str] = &["id", "speckle_type", "applicationId", "totalChildrenCount"];

/// One named value attached to an element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    /// Value rendered as text; `None` for JSON null.
    pub value: Option<String>,
    pub speckle_type: Option<String>,
    pub units: Option<String>,
    pub internal_name: Option<String>,
    /// Enclosing group for values read from `properties` (e.g. "Identity Data").
    pub property_set: Option<String>,
}

impl Parameter {
    /// Create an untyped parameter.
    pub fn new(name: impl Into<String>, value: Option<String>) -> Self {
        Self {
            name: name.into(),
            value,
            speckle_type: None,
            units: None,
            internal_name: None,
            property_set: None,
        }
    }

    /// Create a Revit parameter.
    pub fn revit(name: impl Into<String>, value: Option<String>) -> Self {
        Self {
            speckle_type: Some(REVIT_PARAMETER_TYPE.to_string()),
            ..Self::new(name, value)
        }
    }

    fn from_object(obj: &Map<String, Value>, property_set: Option<&str>) -> Option<Self> {
        let name = obj.get("name").and_then(Value::as_str)?;
        Some(Self {
            name: name.to_string(),
            value: obj.get("value").and_then(scalar_text),
            speckle_type: str_member(obj, "speckle_type"),
            units: str_member(obj, "units"),
            internal_name: str_member(obj, "applicationInternalName"),
            property_set: property_set.map(str::to_string),
        })
    }
}

/// A classification reference carried by an element.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Classification {
    pub system: String,
    pub code: String,
}

impl Classification {
    pub fn new(system: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            code: code.into(),
        }
    }
}

/// Identity row used in reports and result messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub family: String,
    pub id: String,
}

/// A model element as seen by the rule evaluator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelElement {
    pub id: Option<String>,
    pub name: Option<String>,
    pub speckle_type: Option<String>,
    pub category: Option<String>,
    pub type_name: Option<String>,
    pub family: Option<String>,
    pub ifc_type: Option<String>,
    pub material: Option<String>,
    /// The object has a non-empty `parameters` member.
    pub has_parameters: bool,
    pub parameters: Vec<Parameter>,
    pub classifications: Vec<Classification>,
    /// Top-level scalar members rendered as text.
    pub attributes: BTreeMap<String, String>,
}

impl ModelElement {
    /// Extract an element from a Speckle object.
    pub fn from_base(obj: &Map<String, Value>) -> Self {
        let (type_name, family) = type_and_family(obj);

        let mut parameters = Vec::new();
        let mut has_parameters = false;
        if let Some(Value::Object(params)) = obj.get("parameters") {
            for (key, value) in params {
                if PARAMETER_BOOKKEEPING.contains(&key.as_str()) {
                    continue;
                }
                if let Some(param) = value.as_object().and_then(|p| Parameter::from_object(p, None)) {
                    parameters.push(param);
                }
            }
            has_parameters = !parameters.is_empty();
        }
        if let Some(Value::Object(props)) = obj.get("properties") {
            collect_properties(props, None, &mut parameters);
        }

        let attributes = obj
            .iter()
            .filter_map(|(key, value)| scalar_text(value).map(|text| (key.clone(), text)))
            .collect();

        let mut element = Self {
            id: str_member(obj, "id"),
            name: str_member(obj, "name"),
            speckle_type: str_member(obj, "speckle_type"),
            category: str_member(obj, "category"),
            type_name,
            family,
            ifc_type: str_member(obj, "ifcType")
                .or_else(|| str_member(obj, "IfcType"))
                .or_else(|| str_member(obj, "ifc_type")),
            material: None,
            has_parameters,
            parameters,
            classifications: Vec::new(),
            attributes,
        };
        element.material = material_of(obj, &element);
        element.classifications = classifications_of(obj, &element);
        element
    }

    /// Create an element with only identity fields set. Used by tests and tools.
    pub fn named(id: impl Into<String>, name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            name: Some(name.into()),
            category: Some(category.into()),
            ..Self::default()
        }
    }

    /// First parameter with the given name.
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// First parameter with the given name inside the given property set.
    ///
    /// Revit parameters have no set and match any `property_set`.
    pub fn parameter_in(&self, property_set: Option<&str>, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| {
            p.name == name
                && match (property_set, p.property_set.as_deref()) {
                    (None, _) | (Some(_), None) => true,
                    (Some(wanted), Some(actual)) => wanted == actual,
                }
        })
    }

    /// Resolve an attribute by name (case-insensitive for the identity fields).
    pub fn attribute(&self, name: &str) -> Option<&str> {
        let identity = match name.to_ascii_lowercase().as_str() {
            "name" => self.name.as_deref(),
            "type" | "typename" => self.type_name.as_deref(),
            "family" => self.family.as_deref(),
            "category" => self.category.as_deref(),
            "speckle_type" => self.speckle_type.as_deref(),
            _ => None,
        };
        identity.or_else(|| {
            self.attributes.get(name).map(String::as_str).or_else(|| {
                self.attributes
                    .iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(name))
                    .map(|(_, value)| value.as_str())
            })
        })
    }

    /// Identity row with `Unknown` placeholders.
    pub fn object_info(&self) -> ObjectInfo {
        let or_unknown = |v: &Option<String>| v.clone().unwrap_or_else(|| UNKNOWN.to_string());
        ObjectInfo {
            name: or_unknown(&self.name),
            type_name: or_unknown(&self.type_name),
            family: or_unknown(&self.family),
            id: or_unknown(&self.id),
        }
    }
}

/// Extract one element per traversal context, in traversal order.
pub fn extract_elements(contexts: &[TraversalContext<'_>]) -> Vec<ModelElement> {
    contexts
        .iter()
        .map(|context| ModelElement::from_base(context.current))
        .collect()
}

fn str_member(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Render a scalar JSON value as text. Objects, arrays and null give `None`.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn type_and_family(obj: &Map<String, Value>) -> (Option<String>, Option<String>) {
    let is_instance = obj.get("speckle_type").and_then(Value::as_str) == Some(REVIT_INSTANCE_TYPE);
    if is_instance {
        if let Some(Value::Object(definition)) = obj.get("definition") {
            return (str_member(definition, "type"), str_member(definition, "family"));
        }
    }
    (str_member(obj, "type"), str_member(obj, "family"))
}

/// Walk the nested `properties` map. Leaves `{name, value}` become parameters;
/// scalar leaves become parameters named after their key.
fn collect_properties(map: &Map<String, Value>, set: Option<&str>, out: &mut Vec<Parameter>) {
    for (key, value) in map {
        match value {
            Value::Object(child) if child.contains_key("name") && child.contains_key("value") => {
                if let Some(param) = Parameter::from_object(child, set) {
                    out.push(param);
                }
            }
            Value::Object(child) => collect_properties(child, Some(key.as_str()), out),
            other => {
                if let Some(text) = scalar_text(other) {
                    let mut param = Parameter::new(key.clone(), Some(text));
                    param.property_set = set.map(str::to_string);
                    out.push(param);
                }
            }
        }
    }
}

fn material_of(obj: &Map<String, Value>, element: &ModelElement) -> Option<String> {
    match obj.get("material") {
        Some(Value::String(name)) => return Some(name.clone()),
        Some(Value::Object(material)) => {
            if let Some(name) = str_member(material, "name") {
                return Some(name);
            }
        }
        _ => {}
    }
    str_member(obj, "materialName").or_else(|| {
        ["Material", "Structural Material"]
            .iter()
            .find_map(|name| element.parameter(name).and_then(|p| p.value.clone()))
            .filter(|v| !v.trim().is_empty())
    })
}

fn classifications_of(obj: &Map<String, Value>, element: &ModelElement) -> Vec<Classification> {
    let mut out = Vec::new();
    if let Some(Value::Array(items)) = obj.get("classifications") {
        for item in items.iter().filter_map(Value::as_object) {
            let system = str_member(item, "system").or_else(|| str_member(item, "name"));
            let code = str_member(item, "code")
                .or_else(|| str_member(item, "identification"))
                .or_else(|| str_member(item, "value"));
            if let (Some(system), Some(code)) = (system, code) {
                out.push(Classification::new(system, code));
            }
        }
    }
    for (param_name, system) in CLASSIFICATION_PARAMETERS {
        if let Some(code) = element
            .parameter(param_name)
            .and_then(|p| p.value.as_deref())
            .map(str::trim)
            .filter(|code| !code.is_empty())
        {
            out.push(Classification::new(*system, code));
        }
    }
    out
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn window() -> Value {
        json!({
            "id": "w1",
            "speckle_type": "Objects.BuiltElements.Revit.FamilyInstance",
            "name": "Window 900x1200",
            "category": "Windows",
            "type": "900x1200",
            "family": "Fixed",
            "parameters": {
                "id": "params",
                "speckle_type": "Base",
                "OMNICLASS_CODE": {
                    "speckle_type": REVIT_PARAMETER_TYPE,
                    "name": "OmniClass Number",
                    "value": "23.30.20.17",
                    "applicationInternalName": "OMNICLASS_CODE"
                },
                "WIDTH": {
                    "speckle_type": REVIT_PARAMETER_TYPE,
                    "name": "Width",
                    "value": 900,
                    "units": "mm"
                }
            }
        })
    }

    #[test]
    fn extracts_identity_and_parameters() {
        let value = window();
        let element = ModelElement::from_base(value.as_object().unwrap());

        assert_eq!(element.id.as_deref(), Some("w1"));
        assert_eq!(element.category.as_deref(), Some("Windows"));
        assert!(element.has_parameters);
        assert_eq!(element.parameters.len(), 2);

        let width = element.parameter("Width").unwrap();
        assert_eq!(width.value.as_deref(), Some("900"));
        assert_eq!(width.units.as_deref(), Some("mm"));
        assert_eq!(
            element.parameter("OmniClass Number").unwrap().internal_name.as_deref(),
            Some("OMNICLASS_CODE")
        );
    }

    #[test]
    fn omniclass_parameter_becomes_classification() {
        let value = window();
        let element = ModelElement::from_base(value.as_object().unwrap());
        assert_eq!(
            element.classifications,
            vec![Classification::new("OmniClass", "23.30.20.17")]
        );
    }

    #[test]
    fn revit_instance_reads_type_from_definition() {
        let value = json!({
            "id": "i1",
            "speckle_type": REVIT_INSTANCE_TYPE,
            "type": "ignored",
            "definition": {"speckle_type": "Base", "type": "T-900", "family": "Casement"}
        });
        let element = ModelElement::from_base(value.as_object().unwrap());
        assert_eq!(element.type_name.as_deref(), Some("T-900"));
        assert_eq!(element.family.as_deref(), Some("Casement"));
    }

    #[test]
    fn object_info_fills_unknown() {
        let value = json!({"speckle_type": "Base"});
        let info = ModelElement::from_base(value.as_object().unwrap()).object_info();
        assert_eq!(info.id, UNKNOWN);
        assert_eq!(info.name, UNKNOWN);
        assert_eq!(info.family, UNKNOWN);
    }

    #[test]
    fn nested_properties_are_collected_with_set() {
        let value = json!({
            "id": "d1",
            "speckle_type": "Objects.Data.DataObject",
            "properties": {
                "Parameters": {
                    "Identity Data": {
                        "Fire Rating": {"name": "Fire Rating", "value": "EI60"}
                    }
                },
                "Pset_DoorCommon": {"IsExternal": true}
            }
        });
        let element = ModelElement::from_base(value.as_object().unwrap());
        assert!(!element.has_parameters);

        let fire = element.parameter_in(Some("Identity Data"), "Fire Rating").unwrap();
        assert_eq!(fire.value.as_deref(), Some("EI60"));
        assert!(element.parameter_in(Some("Pset_Other"), "Fire Rating").is_none());

        let external = element.parameter_in(Some("Pset_DoorCommon"), "IsExternal").unwrap();
        assert_eq!(external.value.as_deref(), Some("true"));
    }

    #[test]
    fn explicit_classifications_and_material() {
        let value = json!({
            "id": "c1",
            "speckle_type": "Base",
            "material": {"name": "Concrete C30/37"},
            "classifications": [
                {"system": "Uniclass", "code": "Pr_20_93"},
                {"name": "NL-SfB", "identification": "21.12"},
                {"system": "Broken"}
            ]
        });
        let element = ModelElement::from_base(value.as_object().unwrap());
        assert_eq!(element.material.as_deref(), Some("Concrete C30/37"));
        assert_eq!(element.classifications.len(), 2);
        assert_eq!(element.classifications[1], Classification::new("NL-SfB", "21.12"));
    }

    #[test]
    fn attribute_lookup_is_case_insensitive_for_identity() {
        let value = window();
        let element = ModelElement::from_base(value.as_object().unwrap());
        assert_eq!(element.attribute("NAME"), Some("Window 900x1200"));
        assert_eq!(element.attribute("Family"), Some("Fixed"));
        assert_eq!(element.attribute("SPECKLE_TYPE"), element.speckle_type.as_deref());
        assert_eq!(element.attribute("missing"), None);
    }
}
