//! # Rules Module
//!
//! Declarative requirements and the small predicates they are built from.
//!
//! Every source of rules lowers into the same `Requirement` form:
//! - the single demo rule taken from the function inputs
//! - each IDS `<specification>`
//! - one classification requirement covering every loaded bsDD dictionary
//!
//! The evaluator interprets requirements against model elements. The
//! predicates below are also usable on their own.

use crate::bsdd::BsddDictionary;
use crate::element::{ModelElement, Parameter, REVIT_PARAMETER_TYPE};
use crate::error::{CoreError, Result};
use crate::evaluator::Outcome;
use crate::inputs::FunctionInputs;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;

/// Fixed-point scale for numeric bounds (six decimal places).
pub const NUMERIC_SCALE: i128 = 1_000_000;

/// Revit categories standing in for IFC entities.
const ENTITY_CATEGORIES: &[(&str, &[&str])] = &[
    ("IFCWALL", &["Walls"]),
    ("IFCWALLSTANDARDCASE", &["Walls"]),
    ("IFCWINDOW", &["Windows"]),
    ("IFCDOOR", &["Doors"]),
    ("IFCSLAB", &["Floors"]),
    ("IFCROOF", &["Roofs"]),
    ("IFCCOLUMN", &["Columns", "Structural Columns"]),
    ("IFCBEAM", &["Structural Framing"]),
    ("IFCSTAIR", &["Stairs"]),
    ("IFCRAILING", &["Railings"]),
    ("IFCCOVERING", &["Ceilings"]),
    ("IFCFURNISHINGELEMENT", &["Furniture"]),
    ("IFCSPACE", &["Rooms"]),
    ("IFCCURTAINWALL", &["Curtain Panels"]),
    ("IFCPLATE", &["Curtain Panels"]),
];

// =============================================================================
// PREDICATES
// =============================================================================

/// Element category equals `category`.
pub fn is_category(category: &str) -> impl Fn(&ModelElement) -> bool + use<> {
    let category = category.to_string();
    move |element| element.category.as_deref() == Some(category.as_str())
}

/// Element speckle_type equals `speckle_type`.
pub fn speckle_type_is(speckle_type: &str) -> impl Fn(&ModelElement) -> bool + use<> {
    let speckle_type = speckle_type.to_string();
    move |element| element.speckle_type.as_deref() == Some(speckle_type.as_str())
}

/// Parameter name equals `name`.
pub fn parameter_name_is(name: &str) -> impl Fn(&Parameter) -> bool + use<> {
    let name = name.to_string();
    move |parameter| parameter.name == name
}

/// Parameter value starts with `prefix`. A parameter without value never matches.
pub fn value_starts_with(prefix: &str) -> impl Fn(&Parameter) -> bool + use<> {
    let prefix = prefix.to_string();
    move |parameter| {
        parameter
            .value
            .as_deref()
            .is_some_and(|value| value.starts_with(prefix.as_str()))
    }
}

/// Parameter name starts with a prefix that is not allowed (e.g. "Ifc", "Pset").
pub fn forbidden_prefix(prefix: &str) -> impl Fn(&Parameter) -> bool + use<> {
    let prefix = prefix.to_string();
    move |parameter| parameter.name.starts_with(prefix.as_str())
}

/// The parameter is a Revit parameter object.
pub fn is_revit_parameter(parameter: &Parameter) -> bool {
    parameter.speckle_type.as_deref() == Some(REVIT_PARAMETER_TYPE)
}

/// The value is absent, empty or whitespace.
pub fn has_missing_value(parameter: &Parameter) -> bool {
    parameter
        .value
        .as_deref()
        .is_none_or(|value| value.trim().is_empty())
}

/// The value is still the authoring tool default.
pub fn has_default_value(parameter: &Parameter) -> bool {
    parameter.value.as_deref() == Some("Default")
}

/// The element carries a parameter with this name.
pub fn parameter_exists(name: &str, element: &ModelElement) -> bool {
    element.parameter(name).is_some()
}

/// Check a Revit parameter against a required value prefix.
///
/// Returns `None` for non-Revit parameters.
pub fn evaluate_parameter(parameter: &Parameter, rule: &str) -> Option<Outcome> {
    if !is_revit_parameter(parameter) {
        return None;
    }
    if has_missing_value(parameter) {
        return Some(Outcome::Missing);
    }
    if value_starts_with(rule)(parameter) {
        Some(Outcome::Passing)
    } else {
        Some(Outcome::Invalid)
    }
}

/// The element stands for the given IFC entity (e.g. `IFCWINDOW`).
pub fn entity_matches(entity: &str, element: &ModelElement) -> bool {
    entity_in(&ValueConstraint::Equals(entity.to_ascii_uppercase()), element)
}

/// The element stands for an IFC entity whose upper-case name satisfies `names`.
pub fn entity_in(names: &ValueConstraint, element: &ModelElement) -> bool {
    if element
        .ifc_type
        .as_deref()
        .is_some_and(|ifc| names.matches(&ifc.to_ascii_uppercase()))
    {
        return true;
    }
    let Some(category) = element.category.as_deref() else {
        return false;
    };
    ENTITY_CATEGORIES
        .iter()
        .filter(|(_, categories)| categories.contains(&category))
        .any(|(name, _)| names.matches(name))
}

// =============================================================================
// VALUE CONSTRAINTS
// =============================================================================

/// An anchored regular expression, compared by its source text.
#[derive(Debug, Clone)]
pub struct ValuePattern {
    source: String,
    regex: Regex,
}

impl ValuePattern {
    /// Compile `source` so it must match the whole value.
    pub fn new(source: &str) -> Result<Self> {
        let regex = Regex::new(&format!("^(?:{})$", source))
            .map_err(|e| CoreError::InvalidPattern(format!("{}: {}", source, e)))?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }
}

impl PartialEq for ValuePattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for ValuePattern {}

/// One end of a numeric range, in `NUMERIC_SCALE` units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bound {
    pub value: i128,
    pub inclusive: bool,
}

impl Bound {
    pub fn inclusive(value: i128) -> Self {
        Self {
            value,
            inclusive: true,
        }
    }

    pub fn exclusive(value: i128) -> Self {
        Self {
            value,
            inclusive: false,
        }
    }
}

/// Constraint on a textual value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueConstraint {
    /// Any value, as long as one is present.
    Any,
    Equals(String),
    OneOf(Vec<String>),
    Prefix(String),
    Pattern(ValuePattern),
    Bounds { min: Option<Bound>, max: Option<Bound> },
    /// Character count range, inclusive.
    Length { min: Option<usize>, max: Option<usize> },
}

impl ValueConstraint {
    /// Compile a pattern constraint.
    pub fn pattern(source: &str) -> Result<Self> {
        ValuePattern::new(source).map(Self::Pattern)
    }

    /// Check a present value.
    pub fn matches(&self, value: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Equals(expected) => value == expected,
            Self::OneOf(options) => options.iter().any(|o| o == value),
            Self::Prefix(prefix) => value.starts_with(prefix.as_str()),
            Self::Pattern(pattern) => pattern.is_match(value),
            Self::Bounds { min, max } => {
                let Some(number) = parse_scaled(value) else {
                    return false;
                };
                let above_min = min.is_none_or(|b| {
                    if b.inclusive {
                        number >= b.value
                    } else {
                        number > b.value
                    }
                });
                let below_max = max.is_none_or(|b| {
                    if b.inclusive {
                        number <= b.value
                    } else {
                        number < b.value
                    }
                });
                above_min && below_max
            }
            Self::Length { min, max } => {
                let len = value.chars().count();
                min.is_none_or(|m| len >= m) && max.is_none_or(|m| len <= m)
            }
        }
    }
}

impl fmt::Display for ValueConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "any value"),
            Self::Equals(v) => write!(f, "'{}'", v),
            Self::OneOf(options) => write!(f, "one of [{}]", options.join(", ")),
            Self::Prefix(p) => write!(f, "prefixed '{}'", p),
            Self::Pattern(p) => write!(f, "matching /{}/", p.source()),
            Self::Bounds { min, max } => {
                write!(f, "in range ")?;
                match min {
                    Some(b) => write!(f, "{}{}", if b.inclusive { '[' } else { '(' }, format_scaled(b.value))?,
                    None => write!(f, "(-inf")?,
                }
                write!(f, ", ")?;
                match max {
                    Some(b) => write!(f, "{}{}", format_scaled(b.value), if b.inclusive { ']' } else { ')' }),
                    None => write!(f, "+inf)"),
                }
            }
            Self::Length { min, max } => write!(
                f,
                "length {}..{}",
                min.map(|m| m.to_string()).unwrap_or_default(),
                max.map(|m| m.to_string()).unwrap_or_default()
            ),
        }
    }
}

/// Parse a decimal number into `NUMERIC_SCALE` fixed-point units.
///
/// Accepts an `e`/`E` exponent. Digits past the sixth decimal are truncated.
pub fn parse_scaled(text: &str) -> Option<i128> {
    let text = text.trim();
    let (mantissa, exponent) = match text.find(['e', 'E']) {
        Some(at) => (&text[..at], text[at + 1..].parse::<i64>().ok()?),
        None => (text, 0),
    };
    let (negative, digits) = match mantissa.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, mantissa.strip_prefix('+').unwrap_or(mantissa)),
    };
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, f),
        None => (digits, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.bytes().all(|b| b.is_ascii_digit()) || !frac_part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    // Power of ten, in scaled units, of the first mantissa digit.
    let mut power = i64::try_from(int_part.len())
        .ok()?
        .checked_add(exponent)?
        .checked_add(5)?;
    let mut value: i128 = 0;
    for b in int_part.bytes().chain(frac_part.bytes()) {
        if power < 0 {
            break;
        }
        let digit = i128::from(b - b'0');
        if digit != 0 {
            let place = 10i128.checked_pow(u32::try_from(power).ok()?)?;
            value = value.checked_add(digit.checked_mul(place)?)?;
        }
        power -= 1;
    }

    Some(if negative { -value } else { value })
}

fn format_scaled(value: i128) -> String {
    let sign = if value < 0 { "-" } else { "" };
    let abs = value.abs();
    let int_part = abs / NUMERIC_SCALE;
    let frac = abs % NUMERIC_SCALE;
    if frac == 0 {
        format!("{}{}", sign, int_part)
    } else {
        let frac = format!("{:06}", frac);
        format!("{}{}.{}", sign, int_part, frac.trim_end_matches('0'))
    }
}

// =============================================================================
// REQUIREMENTS
// =============================================================================

/// How a facet treats an absent value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Cardinality {
    /// Absent is `Missing`.
    #[default]
    Required,
    /// Absent is `NotApplicable`; present must match.
    Optional,
    /// A matching value is `Invalid`.
    Prohibited,
}

impl Cardinality {
    /// Parse an IDS `cardinality` attribute.
    pub fn from_ids(text: &str) -> Option<Self> {
        match text {
            "required" => Some(Self::Required),
            "optional" => Some(Self::Optional),
            "prohibited" => Some(Self::Prohibited),
            _ => None,
        }
    }
}

/// An applicability filter. All filters of a requirement must match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Category(String),
    /// Upper-case IFC entity name, e.g. `IFCWALL`, or a set of them.
    Entity(ValueConstraint),
    SpeckleType(String),
    HasParameters,
    HasClassification,
    Classification { system: Option<String>, value: ValueConstraint },
    Property { property_set: Option<String>, name: String, value: ValueConstraint },
    Attribute { name: String, value: ValueConstraint },
}

impl Filter {
    pub fn matches(&self, element: &ModelElement) -> bool {
        match self {
            Self::Category(category) => is_category(category)(element),
            Self::Entity(names) => entity_in(names, element),
            Self::SpeckleType(t) => speckle_type_is(t)(element),
            Self::HasParameters => element.has_parameters,
            Self::HasClassification => !element.classifications.is_empty(),
            Self::Classification { system, value } => element.classifications.iter().any(|c| {
                system.as_deref().is_none_or(|s| s == c.system) && value.matches(&c.code)
            }),
            Self::Property {
                property_set,
                name,
                value,
            } => element
                .parameter_in(property_set.as_deref(), name)
                .and_then(|p| p.value.as_deref())
                .is_some_and(|v| value.matches(v)),
            Self::Attribute { name, value } => {
                element.attribute(name).is_some_and(|v| value.matches(v))
            }
        }
    }
}

/// Which elements a requirement governs. Empty matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Applicability {
    pub filters: Vec<Filter>,
}

impl Applicability {
    pub fn new(filters: Vec<Filter>) -> Self {
        Self { filters }
    }

    pub fn matches(&self, element: &ModelElement) -> bool {
        self.filters.iter().all(|f| f.matches(element))
    }
}

/// A single check applied to an applicable element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Facet {
    Property {
        property_set: Option<String>,
        name: String,
        value: ValueConstraint,
        cardinality: Cardinality,
        /// Only consider Revit parameter objects.
        revit_only: bool,
    },
    Attribute {
        name: String,
        value: ValueConstraint,
        cardinality: Cardinality,
    },
    Classification {
        system: Option<String>,
        value: ValueConstraint,
        cardinality: Cardinality,
    },
    Material {
        value: ValueConstraint,
        cardinality: Cardinality,
    },
    /// Classification code must exist in a loaded bsDD dictionary, with its required properties.
    BsddClass,
}

impl Facet {
    /// Short label used in finding messages.
    pub fn label(&self) -> String {
        match self {
            Self::Property {
                property_set, name, ..
            } => match property_set {
                Some(set) => format!("property {}.{}", set, name),
                None => format!("property {}", name),
            },
            Self::Attribute { name, .. } => format!("attribute {}", name),
            Self::Classification { system, .. } => match system {
                Some(system) => format!("classification {}", system),
                None => "classification".to_string(),
            },
            Self::Material { .. } => "material".to_string(),
            Self::BsddClass => "bsDD class".to_string(),
        }
    }
}

/// Where a requirement came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequirementSource {
    Demo,
    Ids,
    Bsdd,
}

/// An applicability filter bound to one or more facet checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub name: String,
    pub identifier: Option<String>,
    pub instructions: Option<String>,
    pub source: RequirementSource,
    pub applicability: Applicability,
    pub facets: Vec<Facet>,
}

impl Requirement {
    pub fn new(
        name: impl Into<String>,
        source: RequirementSource,
        applicability: Applicability,
        facets: Vec<Facet>,
    ) -> Self {
        Self {
            name: name.into(),
            identifier: None,
            instructions: None,
            source,
            applicability,
            facets,
        }
    }

    /// The single-category / single-property / prefix rule from the inputs.
    ///
    /// Elements without the parameter are not applicable.
    pub fn demo(category: &str, property: &str, rule: &str) -> Self {
        Self::new(
            format!("{} - {} - {}", category, property, rule),
            RequirementSource::Demo,
            Applicability::new(vec![
                Filter::Category(category.to_string()),
                Filter::HasParameters,
            ]),
            vec![Facet::Property {
                property_set: None,
                name: property.to_string(),
                value: ValueConstraint::Prefix(rule.to_string()),
                cardinality: Cardinality::Optional,
                revit_only: true,
            }],
        )
    }

    /// Every classified element must use a class of one of `dictionaries`.
    pub fn bsdd<'a>(dictionaries: impl IntoIterator<Item = &'a BsddDictionary>) -> Self {
        let names: Vec<&str> = dictionaries
            .into_iter()
            .map(|d| d.name.as_deref().unwrap_or(d.uri.as_str()))
            .collect();
        Self::new(
            format!("bsDD: {}", names.join(", ")),
            RequirementSource::Bsdd,
            Applicability::new(vec![Filter::HasClassification]),
            vec![Facet::BsddClass],
        )
    }
}

/// The full set of requirements for one run, plus the bsDD data they need.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    requirements: Vec<Requirement>,
    dictionaries: BTreeMap<String, BsddDictionary>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rule set holding the demo requirement, if the inputs name a property.
    pub fn from_inputs(inputs: &FunctionInputs) -> Self {
        let mut set = Self::new();
        if !inputs.single_property.trim().is_empty() {
            set.push(Requirement::demo(
                &inputs.single_category,
                &inputs.single_property,
                &inputs.single_rule,
            ));
        }
        set
    }

    pub fn push(&mut self, requirement: Requirement) {
        self.requirements.push(requirement);
    }

    pub fn extend(&mut self, requirements: impl IntoIterator<Item = Requirement>) {
        self.requirements.extend(requirements);
    }

    /// Register a dictionary with the single bsDD requirement.
    ///
    /// Adding a dictionary with a known URI merges it into the existing one.
    /// The bsDD requirement keeps the position of the first dictionary added.
    pub fn add_dictionary(&mut self, dictionary: BsddDictionary) {
        match self.dictionaries.get_mut(&dictionary.uri) {
            Some(existing) => existing.merge(dictionary),
            None => {
                self.dictionaries.insert(dictionary.uri.clone(), dictionary);
            }
        }

        let requirement = Requirement::bsdd(self.dictionaries.values());
        match self
            .requirements
            .iter_mut()
            .find(|r| r.source == RequirementSource::Bsdd)
        {
            Some(existing) => *existing = requirement,
            None => self.push(requirement),
        }
    }

    pub fn dictionary(&self, uri: &str) -> Option<&BsddDictionary> {
        self.dictionaries.get(uri)
    }

    /// Loaded dictionaries in URI order.
    pub fn dictionaries(&self) -> impl Iterator<Item = &BsddDictionary> {
        self.dictionaries.values()
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    pub fn len(&self) -> usize {
        self.requirements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }
}

// =============================================================================
// TESTS
// =============================================================================
