//! # IDS Module
//!
//! Parser for buildingSMART Information Delivery Specification (IDS 1.0)
//! documents.
//!
//! The XML is read with quick-xml into a small element tree, then each
//! `<specification>` is lowered into a `Requirement`. Namespace prefixes are
//! ignored (`xs:restriction` and `restriction` are the same). Facets the
//! evaluator cannot check are listed in `IdsDocument::skipped` instead of
//! failing the parse.

use crate::error::{CoreError, Result};
use crate::rules::{
    parse_scaled, Applicability, Bound, Cardinality, Facet, Filter, Requirement, RequirementSource,
    ValueConstraint,
};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::collections::BTreeMap;

/// A parsed IDS document.
#[derive(Debug, Clone, Default)]
pub struct IdsDocument {
    pub title: Option<String>,
    pub requirements: Vec<Requirement>,
    /// Human-readable notes about ignored facets and specifications.
    pub skipped: Vec<String>,
}

impl IdsDocument {
    /// Parse an IDS XML document.
    pub fn parse(xml: &str) -> Result<Self> {
        let root = read_tree(xml)?;
        if root.name != "ids" {
            return Err(CoreError::ids(
                root.position,
                format!("expected <ids> root, found <{}>", root.name),
            ));
        }

        let mut doc = Self {
            title: root
                .child("info")
                .and_then(|info| info.child("title"))
                .map(|t| t.text.clone())
                .filter(|t| !t.is_empty()),
            ..Self::default()
        };

        let specifications = root
            .child("specifications")
            .map(|s| s.children_named("specification").collect::<Vec<_>>())
            .unwrap_or_default();

        for (index, spec) in specifications.into_iter().enumerate() {
            if let Some(requirement) = doc.lower_specification(spec, index)? {
                doc.requirements.push(requirement);
            }
        }
        Ok(doc)
    }

    fn lower_specification(&mut self, spec: &XmlNode, index: usize) -> Result<Option<Requirement>> {
        let name = spec
            .attr("name")
            .map(str::to_string)
            .unwrap_or_else(|| format!("Specification {}", index + 1));

        let Some(requirements) = spec.child("requirements").filter(|r| !r.children.is_empty()) else {
            return Err(CoreError::ids(
                spec.position,
                format!("specification '{}' has no requirements", name),
            ));
        };

        // Every applicability filter must lower, or the specification is skipped.
        let mut filters = Vec::new();
        if let Some(applicability) = spec.child("applicability") {
            for node in &applicability.children {
                match self.lower_filter(node, &name)? {
                    Some(filter) => filters.push(filter),
                    None => {
                        self.skipped
                            .push(format!("{}: skipped, applicability cannot be checked", name));
                        return Ok(None);
                    }
                }
            }
        }

        let mut facets = Vec::new();
        for node in &requirements.children {
            if let Some(facet) = self.lower_facet(node, &name)? {
                facets.push(facet);
            }
        }
        if facets.is_empty() {
            self.skipped
                .push(format!("{}: no supported requirements", name));
            return Ok(None);
        }

        let mut requirement =
            Requirement::new(name, RequirementSource::Ids, Applicability::new(filters), facets);
        requirement.identifier = spec.attr("identifier").map(str::to_string);
        requirement.instructions = spec
            .attr("instructions")
            .or_else(|| spec.attr("description"))
            .map(str::to_string);
        Ok(Some(requirement))
    }

    fn lower_filter(&mut self, node: &XmlNode, spec: &str) -> Result<Option<Filter>> {
        let filter = match node.name.as_str() {
            "entity" => {
                let names = match parse_value(node.child("name"))? {
                    ValueConstraint::Equals(entity) => {
                        ValueConstraint::Equals(entity.to_ascii_uppercase())
                    }
                    ValueConstraint::OneOf(options) => ValueConstraint::OneOf(
                        options.iter().map(|o| o.to_ascii_uppercase()).collect(),
                    ),
                    pattern @ ValueConstraint::Pattern(_) => pattern,
                    _ => return Ok(self.skip(spec, "entity applicability without a name")),
                };
                if node.child("predefinedType").is_some() {
                    self.skipped
                        .push(format!("{}: predefinedType of {} ignored", spec, names));
                }
                Filter::Entity(names)
            }
            "property" => {
                let Some(name) = node.child("baseName").and_then(simple_text) else {
                    return Ok(self.skip(spec, "property applicability without a simple baseName"));
                };
                Filter::Property {
                    property_set: node.child("propertySet").and_then(simple_text),
                    name,
                    value: parse_value(node.child("value"))?,
                }
            }
            "attribute" => {
                let Some(name) = node.child("name").and_then(simple_text) else {
                    return Ok(self.skip(spec, "attribute applicability without a simple name"));
                };
                Filter::Attribute {
                    name,
                    value: parse_value(node.child("value"))?,
                }
            }
            "classification" => Filter::Classification {
                system: node.child("system").and_then(simple_text),
                value: parse_value(node.child("value"))?,
            },
            other => return Ok(self.skip(spec, &format!("{} applicability", other))),
        };
        Ok(Some(filter))
    }

    fn lower_facet(&mut self, node: &XmlNode, spec: &str) -> Result<Option<Facet>> {
        let cardinality = match node.attr("cardinality") {
            None => Cardinality::Required,
            Some(text) => Cardinality::from_ids(text).ok_or_else(|| {
                CoreError::ids(node.position, format!("unknown cardinality '{}'", text))
            })?,
        };

        let facet = match node.name.as_str() {
            "property" => {
                let Some(name) = node.child("baseName").and_then(simple_text) else {
                    return Ok(self.skip(spec, "property requirement without a simple baseName"));
                };
                Facet::Property {
                    property_set: node.child("propertySet").and_then(simple_text),
                    name,
                    value: parse_value(node.child("value"))?,
                    cardinality,
                    revit_only: false,
                }
            }
            "attribute" => {
                let Some(name) = node.child("name").and_then(simple_text) else {
                    return Ok(self.skip(spec, "attribute requirement without a simple name"));
                };
                Facet::Attribute {
                    name,
                    value: parse_value(node.child("value"))?,
                    cardinality,
                }
            }
            "classification" => Facet::Classification {
                system: node.child("system").and_then(simple_text),
                value: parse_value(node.child("value"))?,
                cardinality,
            },
            "material" => Facet::Material {
                value: parse_value(node.child("value"))?,
                cardinality,
            },
            other => return Ok(self.skip(spec, &format!("{} requirement", other))),
        };
        Ok(Some(facet))
    }

    fn skip<T>(&mut self, spec: &str, what: &str) -> Option<T> {
        self.skipped.push(format!("{}: {} is not supported", spec, what));
        None
    }
}

/// Text of a `<simpleValue>` child, if that is how the value is given.
fn simple_text(node: &XmlNode) -> Option<String> {
    node.child("simpleValue")
        .map(|v| v.text.clone())
        .filter(|t| !t.is_empty())
}

/// Lower an IDS value (`<simpleValue>` or `<xs:restriction>`) into a constraint.
fn parse_value(node: Option<&XmlNode>) -> Result<ValueConstraint> {
    let Some(node) = node else {
        return Ok(ValueConstraint::Any);
    };
    if let Some(simple) = node.child("simpleValue") {
        return Ok(ValueConstraint::Equals(simple.text.clone()));
    }
    let Some(restriction) = node.child("restriction") else {
        return Ok(ValueConstraint::Any);
    };

    let facet_value = |child: &XmlNode| -> Result<String> {
        child
            .attr("value")
            .map(str::to_string)
            .ok_or_else(|| CoreError::ids(child.position, format!("<{}> without value", child.name)))
    };
    let bound = |child: &XmlNode, inclusive: bool| -> Result<Bound> {
        let text = facet_value(child)?;
        let value = parse_scaled(&text).ok_or_else(|| {
            CoreError::ids(child.position, format!("bound '{}' is not a decimal number", text))
        })?;
        Ok(Bound { value, inclusive })
    };
    let length = |child: &XmlNode| -> Result<usize> {
        let text = facet_value(child)?;
        text.trim().parse().map_err(|_| {
            CoreError::ids(child.position, format!("length '{}' is not an integer", text))
        })
    };

    let mut options = Vec::new();
    let mut pattern = None;
    let mut min = None;
    let mut max = None;
    let mut min_len = None;
    let mut max_len = None;

    for child in &restriction.children {
        match child.name.as_str() {
            "enumeration" => options.push(facet_value(child)?),
            "pattern" => pattern = Some(facet_value(child)?),
            "minInclusive" => min = Some(bound(child, true)?),
            "minExclusive" => min = Some(bound(child, false)?),
            "maxInclusive" => max = Some(bound(child, true)?),
            "maxExclusive" => max = Some(bound(child, false)?),
            "length" => {
                let n = length(child)?;
                min_len = Some(n);
                max_len = Some(n);
            }
            "minLength" => min_len = Some(length(child)?),
            "maxLength" => max_len = Some(length(child)?),
            _ => {}
        }
    }

    if !options.is_empty() {
        Ok(ValueConstraint::OneOf(options))
    } else if let Some(source) = pattern {
        ValueConstraint::pattern(&source)
    } else if min.is_some() || max.is_some() {
        Ok(ValueConstraint::Bounds { min, max })
    } else if min_len.is_some() || max_len.is_some() {
        Ok(ValueConstraint::Length {
            min: min_len,
            max: max_len,
        })
    } else {
        Ok(ValueConstraint::Any)
    }
}

// =============================================================================
// XML TREE
// =============================================================================

/// Minimal element tree: local names only, text concatenated.
#[derive(Debug, Clone, Default)]
struct XmlNode {
    name: String,
    attrs: BTreeMap<String, String>,
    text: String,
    children: Vec<XmlNode>,
    position: u64,
}

impl XmlNode {
    fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> {
        self.children.iter().filter(move |c| c.name == name)
    }

    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }
}

fn local(name: &[u8]) -> String {
    String::from_utf8_lossy(name).to_string()
}

fn open_node(start: &BytesStart<'_>, position: u64) -> Result<XmlNode> {
    let mut attrs = BTreeMap::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| CoreError::ids(position, e.to_string()))?;
        let value = attr
            .unescape_value()
            .map_err(|e| CoreError::ids(position, e.to_string()))?;
        attrs.insert(local(attr.key.local_name().as_ref()), value.to_string());
    }
    Ok(XmlNode {
        name: local(start.local_name().as_ref()),
        attrs,
        position,
        ..XmlNode::default()
    })
}

fn read_tree(xml: &str) -> Result<XmlNode> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;

    loop {
        let position = reader.buffer_position() as u64;
        let event = reader
            .read_event()
            .map_err(|e| CoreError::ids(position, e.to_string()))?;

        match event {
            Event::Start(start) => stack.push(open_node(&start, position)?),
            Event::Empty(start) => {
                let node = open_node(&start, position)?;
                attach(&mut stack, &mut root, node, position)?;
            }
            Event::End(_) => {
                let node = stack
                    .pop()
                    .ok_or_else(|| CoreError::ids(position, "unbalanced closing tag"))?;
                attach(&mut stack, &mut root, node, position)?;
            }
            Event::Text(text) => {
                let text = text
                    .unescape()
                    .map_err(|e| CoreError::ids(position, e.to_string()))?;
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text);
                }
            }
            Event::CData(data) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(CoreError::ids(
            reader.buffer_position() as u64,
            "unexpected end of document",
        ));
    }
    root.ok_or_else(|| CoreError::ids(0, "document has no root element"))
}

fn attach(
    stack: &mut [XmlNode],
    root: &mut Option<XmlNode>,
    node: XmlNode,
    position: u64,
) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None if root.is_none() => *root = Some(node),
        None => return Err(CoreError::ids(position, "multiple root elements")),
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
