//! # Evaluator Module
//!
//! Interprets a `RuleSet` against model elements.
//!
//! For every element (traversal order) and every requirement (rule set
//! order) one `Finding` is produced. A requirement whose applicability does
//! not match yields `NotApplicable`. Otherwise each facet is checked and the
//! worst outcome wins:
//!
//! ```text
//! Missing > Invalid > Passing > NotApplicable
//! ```
//!
//! The evaluator is a pure function of its input.

use crate::bsdd::BsddDictionary;
use crate::element::ModelElement;
use crate::rules::{is_revit_parameter, Cardinality, Facet, Requirement, RuleSet, ValueConstraint};
use serde::Serialize;
use std::fmt;

/// Result of checking one requirement on one element.
///
/// Variants are declared from best to worst so `Ord` ranks severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    NotApplicable,
    Passing,
    Invalid,
    Missing,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotApplicable => "not_applicable",
            Self::Passing => "passing",
            Self::Invalid => "invalid",
            Self::Missing => "missing",
        }
    }

    /// Capitalized name, used as result category and report status.
    pub fn title(&self) -> &'static str {
        match self {
            Self::NotApplicable => "Not applicable",
            Self::Passing => "Passing",
            Self::Invalid => "Invalid",
            Self::Missing => "Missing",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Invalid | Self::Missing)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One (element, requirement) verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    /// Position of the element in the evaluated slice.
    pub element_index: usize,
    pub element_id: Option<String>,
    /// Position of the requirement in the rule set.
    pub requirement_index: usize,
    pub requirement: String,
    pub outcome: Outcome,
    pub message: String,
}

/// Outcome of a single facet with its explanation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacetResult {
    pub outcome: Outcome,
    pub message: String,
}

impl FacetResult {
    fn new(outcome: Outcome, message: impl Into<String>) -> Self {
        Self {
            outcome,
            message: message.into(),
        }
    }
}

/// Evaluate every requirement against every element.
pub fn evaluate(elements: &[ModelElement], rules: &RuleSet) -> Vec<Finding> {
    let mut findings = Vec::with_capacity(elements.len().saturating_mul(rules.len()));
    for (element_index, element) in elements.iter().enumerate() {
        for (requirement_index, requirement) in rules.requirements().iter().enumerate() {
            let result = evaluate_requirement(element, requirement, rules);
            findings.push(Finding {
                element_index,
                element_id: element.id.clone(),
                requirement_index,
                requirement: requirement.name.clone(),
                outcome: result.outcome,
                message: result.message,
            });
        }
    }
    findings
}

/// Evaluate one requirement. The first facet with the worst outcome explains it.
pub fn evaluate_requirement(
    element: &ModelElement,
    requirement: &Requirement,
    rules: &RuleSet,
) -> FacetResult {
    if !requirement.applicability.matches(element) {
        return FacetResult::new(Outcome::NotApplicable, "not applicable");
    }

    let mut worst: Option<FacetResult> = None;
    for facet in &requirement.facets {
        let result = evaluate_facet(element, facet, rules);
        if worst.as_ref().is_none_or(|w| result.outcome > w.outcome) {
            worst = Some(result);
        }
    }

    match worst {
        Some(result) => FacetResult::new(
            result.outcome,
            format!("{}: {}", requirement.name, result.message),
        ),
        None => FacetResult::new(Outcome::NotApplicable, "no checks"),
    }
}

/// Evaluate one facet on an applicable element.
pub fn evaluate_facet(element: &ModelElement, facet: &Facet, rules: &RuleSet) -> FacetResult {
    let label = facet.label();
    match facet {
        Facet::Property {
            property_set,
            name,
            value,
            cardinality,
            revit_only,
        } => {
            let observed = element
                .parameter_in(property_set.as_deref(), name)
                .filter(|p| !revit_only || is_revit_parameter(p))
                .map(|p| p.value.as_deref().unwrap_or(""));
            judge(&label, observed, value, *cardinality)
        }
        Facet::Attribute {
            name,
            value,
            cardinality,
        } => judge(&label, element.attribute(name), value, *cardinality),
        Facet::Classification {
            system,
            value,
            cardinality,
        } => {
            let codes: Vec<&str> = element
                .classifications
                .iter()
                .filter(|c| system.as_deref().is_none_or(|s| s == c.system))
                .map(|c| c.code.as_str())
                .collect();
            let observed = codes
                .iter()
                .find(|code| value.matches(code))
                .or_else(|| codes.first())
                .copied();
            judge(&label, observed, value, *cardinality)
        }
        Facet::Material { value, cardinality } => {
            judge(&label, element.material.as_deref(), value, *cardinality)
        }
        Facet::BsddClass => bsdd_class(element, rules),
    }
}

/// Apply a constraint and cardinality to an observed value.
///
/// `None` means the value is absent. A present but blank value counts as missing
/// unless the facet is prohibited.
fn judge(
    label: &str,
    observed: Option<&str>,
    constraint: &ValueConstraint,
    cardinality: Cardinality,
) -> FacetResult {
    let blank = observed.is_none_or(|v| v.trim().is_empty());
    match cardinality {
        Cardinality::Prohibited => match observed {
            Some(v) if !blank && constraint.matches(v) => {
                FacetResult::new(Outcome::Invalid, format!("{} '{}' is prohibited", label, v))
            }
            _ => FacetResult::new(Outcome::Passing, format!("{} is absent", label)),
        },
        Cardinality::Optional if observed.is_none() => {
            FacetResult::new(Outcome::NotApplicable, format!("{} is absent", label))
        }
        Cardinality::Required | Cardinality::Optional => match observed {
            Some(v) if !blank => {
                if constraint.matches(v) {
                    FacetResult::new(Outcome::Passing, format!("{} is '{}'", label, v))
                } else {
                    FacetResult::new(
                        Outcome::Invalid,
                        format!("{} is '{}', expected {}", label, v, constraint),
                    )
                }
            }
            _ => FacetResult::new(Outcome::Missing, format!("{} is missing", label)),
        },
    }
}

/// The first classification found in any loaded dictionary decides the class.
fn bsdd_class(element: &ModelElement, rules: &RuleSet) -> FacetResult {
    let dictionaries: Vec<&BsddDictionary> = rules.dictionaries().collect();
    if dictionaries.is_empty() {
        return FacetResult::new(Outcome::NotApplicable, "no bsDD dictionary is loaded");
    }

    let class = element.classifications.iter().find_map(|c| {
        dictionaries.iter().find_map(|dictionary| {
            dictionary
                .class_by_code(&c.code)
                .or_else(|| dictionary.class_by_uri(&c.code))
        })
    });
    let Some(class) = class else {
        let codes: Vec<&str> = element
            .classifications
            .iter()
            .map(|c| c.code.as_str())
            .collect();
        let uris: Vec<&str> = dictionaries.iter().map(|d| d.uri.as_str()).collect();
        return FacetResult::new(
            Outcome::Invalid,
            format!(
                "classification [{}] is not a class of {}",
                codes.join(", "),
                uris.join(", ")
            ),
        );
    };

    let mut worst = FacetResult::new(
        Outcome::Passing,
        format!("classified as bsDD class {}", class.code),
    );
    for property in class.required_properties() {
        let observed = element
            .parameter_in(property.property_set.as_deref(), &property.name)
            .or_else(|| {
                property
                    .code
                    .as_deref()
                    .and_then(|code| element.parameter_in(property.property_set.as_deref(), code))
            })
            .and_then(|p| p.value.as_deref())
            .filter(|v| !v.trim().is_empty());

        let result = match observed {
            None => FacetResult::new(
                Outcome::Missing,
                format!(
                    "property {} required by bsDD class {} is missing",
                    property.name, class.code
                ),
            ),
            Some(v) if !property.accepts(v) => FacetResult::new(
                Outcome::Invalid,
                format!(
                    "property {} is '{}', not allowed by bsDD class {}",
                    property.name, v, class.code
                ),
            ),
            Some(_) => continue,
        };
        if result.outcome > worst.outcome {
            worst = result;
        }
    }
    worst
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bsdd::{BsddClass, BsddProperty};
    use crate::element::{Classification, Parameter};
    use crate::rules::{Applicability, Filter, RequirementSource};

    const DICT: &str = "https://identifier.buildingsmart.org/uri/acme/walls/1.0";

    fn window(value: Option<&str>) -> ModelElement {
        let mut element = ModelElement::named("w1", "Window A", "Windows");
        element.has_parameters = true;
        if let Some(v) = value {
            element
                .parameters
                .push(Parameter::revit("OmniClass Number", Some(v.to_string())));
        }
        element
    }

    fn demo_rules() -> RuleSet {
        let mut rules = RuleSet::new();
        rules.push(Requirement::demo("Windows", "OmniClass Number", "23.30.20"));
        rules
    }

    fn single(facet: Facet) -> RuleSet {
        let mut rules = RuleSet::new();
        rules.push(Requirement::new(
            "test",
            RequirementSource::Ids,
            Applicability::default(),
            vec![facet],
        ));
        rules
    }

    #[test]
    fn outcome_ordering() {
        assert!(Outcome::Missing > Outcome::Invalid);
        assert!(Outcome::Invalid > Outcome::Passing);
        assert!(Outcome::Passing > Outcome::NotApplicable);
        assert!(Outcome::Missing.is_failure());
        assert!(!Outcome::Passing.is_failure());
    }

    #[test]
    fn demo_rule_outcomes() {
        let rules = demo_rules();
        let elements = vec![
            window(Some("23.30.20.17")),
            window(Some("23.30.10")),
            window(Some("")),
            window(None),
        ];
        let outcomes: Vec<Outcome> = evaluate(&elements, &rules)
            .into_iter()
            .map(|f| f.outcome)
            .collect();
        assert_eq!(
            outcomes,
            vec![
                Outcome::Passing,
                Outcome::Invalid,
                Outcome::Missing,
                Outcome::NotApplicable
            ]
        );
    }

    #[test]
    fn demo_rule_ignores_non_revit_parameter() {
        let mut element = window(None);
        element
            .parameters
            .push(Parameter::new("OmniClass Number", Some("99".into())));
        let findings = evaluate(&[element], &demo_rules());
        assert_eq!(findings[0].outcome, Outcome::NotApplicable);
    }

    #[test]
    fn invalid_message_names_value_and_expectation() {
        let findings = evaluate(&[window(Some("23.30.10"))], &demo_rules());
        assert_eq!(
            findings[0].message,
            "Windows - OmniClass Number - 23.30.20: property OmniClass Number is '23.30.10', expected prefixed '23.30.20'"
        );
        assert_eq!(findings[0].element_id.as_deref(), Some("w1"));
    }

    #[test]
    fn required_and_prohibited_cardinality() {
        let required = single(Facet::Attribute {
            name: "Mark".into(),
            value: ValueConstraint::Any,
            cardinality: Cardinality::Required,
        });
        let mut element = ModelElement::named("e", "E", "Walls");
        assert_eq!(evaluate(&[element.clone()], &required)[0].outcome, Outcome::Missing);
        element.attributes.insert("Mark".into(), "A1".into());
        assert_eq!(evaluate(&[element.clone()], &required)[0].outcome, Outcome::Passing);

        let prohibited = single(Facet::Material {
            value: ValueConstraint::Equals("Asbestos".into()),
            cardinality: Cardinality::Prohibited,
        });
        assert_eq!(evaluate(&[element.clone()], &prohibited)[0].outcome, Outcome::Passing);
        element.material = Some("Asbestos".into());
        assert_eq!(evaluate(&[element], &prohibited)[0].outcome, Outcome::Invalid);
    }

    #[test]
    fn classification_facet_prefers_matching_code() {
        let rules = single(Facet::Classification {
            system: Some("OmniClass".into()),
            value: ValueConstraint::Prefix("23".into()),
            cardinality: Cardinality::Required,
        });
        let mut element = ModelElement::named("e", "E", "Windows");
        element.classifications = vec![
            Classification::new("OmniClass", "21.10"),
            Classification::new("OmniClass", "23.30"),
        ];
        assert_eq!(evaluate(&[element.clone()], &rules)[0].outcome, Outcome::Passing);
        element.classifications.remove(1);
        assert_eq!(evaluate(&[element], &rules)[0].outcome, Outcome::Invalid);
    }

    #[test]
    fn worst_facet_wins() {
        let mut rules = RuleSet::new();
        rules.push(Requirement::new(
            "two facets",
            RequirementSource::Ids,
            Applicability::new(vec![Filter::Category("Walls".into())]),
            vec![
                Facet::Attribute {
                    name: "Name".into(),
                    value: ValueConstraint::Equals("Wrong".into()),
                    cardinality: Cardinality::Required,
                },
                Facet::Material {
                    value: ValueConstraint::Any,
                    cardinality: Cardinality::Required,
                },
            ],
        ));
        let wall = ModelElement::named("w", "Wall", "Walls");
        let findings = evaluate(&[wall], &rules);
        assert_eq!(findings[0].outcome, Outcome::Missing);
        assert!(findings[0].message.contains("material is missing"));
    }

    fn dictionary() -> BsddDictionary {
        let mut dict = BsddDictionary::new(DICT);
        dict.insert(BsddClass {
            uri: Some(format!("{}/class/EW", DICT)),
            dictionary_uri: DICT.to_string(),
            code: "EW".into(),
            name: Some("External wall".into()),
            properties: vec![BsddProperty {
                name: "FireRating".into(),
                code: None,
                property_set: None,
                required: true,
                allowed_values: vec!["EI60".into(), "EI90".into()],
                pattern: None,
            }],
        });
        dict
    }

    #[test]
    fn bsdd_class_and_required_properties() {
        let mut rules = RuleSet::new();
        rules.add_dictionary(dictionary());

        let mut wall = ModelElement::named("w", "Wall", "Walls");
        wall.classifications = vec![Classification::new("acme", "XX")];
        assert_eq!(evaluate(&[wall.clone()], &rules)[0].outcome, Outcome::Invalid);

        wall.classifications = vec![Classification::new("acme", "EW")];
        assert_eq!(evaluate(&[wall.clone()], &rules)[0].outcome, Outcome::Missing);

        wall.parameters.push(Parameter::revit("FireRating", Some("EI30".into())));
        assert_eq!(evaluate(&[wall.clone()], &rules)[0].outcome, Outcome::Invalid);

        wall.parameters[0].value = Some("EI60".into());
        assert_eq!(evaluate(&[wall], &rules)[0].outcome, Outcome::Passing);
    }

    fn single_class_dictionary(uri: &str, code: &str) -> BsddDictionary {
        let mut dict = BsddDictionary::new(uri);
        dict.insert(BsddClass {
            uri: None,
            dictionary_uri: uri.to_string(),
            code: code.into(),
            name: None,
            properties: Vec::new(),
        });
        dict
    }

    #[test]
    fn classes_may_come_from_any_loaded_dictionary() {
        const DOORS: &str = "https://identifier.buildingsmart.org/uri/acme/doors/1.0";
        const WINDOWS: &str = "https://identifier.buildingsmart.org/uri/acme/windows/1.0";
        let mut rules = RuleSet::new();
        rules.add_dictionary(single_class_dictionary(DOORS, "D1"));
        rules.add_dictionary(single_class_dictionary(WINDOWS, "W1"));
        assert_eq!(rules.len(), 1);

        let mut door = ModelElement::named("d", "Door", "Doors");
        door.classifications = vec![Classification::new("doors", "D1")];
        let mut window = ModelElement::named("w", "Window", "Windows");
        window.classifications = vec![Classification::new("windows", "W1")];
        let mut stray = ModelElement::named("s", "Stray", "Walls");
        stray.classifications = vec![Classification::new("walls", "X9")];

        let findings = evaluate(&[door, window, stray], &rules);
        let outcomes: Vec<Outcome> = findings.iter().map(|f| f.outcome).collect();
        assert_eq!(
            outcomes,
            vec![Outcome::Passing, Outcome::Passing, Outcome::Invalid]
        );
        assert!(findings[2]
            .message
            .ends_with(&format!("classification [X9] is not a class of {}, {}", DOORS, WINDOWS)));
    }

    #[test]
    fn unclassified_elements_are_outside_bsdd_requirements() {
        let mut rules = RuleSet::new();
        rules.add_dictionary(dictionary());
        let wall = ModelElement::named("w", "Wall", "Walls");
        assert_eq!(evaluate(&[wall], &rules)[0].outcome, Outcome::NotApplicable);
    }

    #[test]
    fn findings_follow_element_then_requirement_order() {
        let mut rules = demo_rules();
        rules.push(Requirement::demo("Windows", "Mark", "W"));
        let elements = vec![window(Some("23.30.20")), window(None)];
        let order: Vec<(usize, usize)> = evaluate(&elements, &rules)
            .iter()
            .map(|f| (f.element_index, f.requirement_index))
            .collect();
        assert_eq!(order, vec![(0, 0), (0, 1), (1, 0), (1, 1)]);
    }
}
