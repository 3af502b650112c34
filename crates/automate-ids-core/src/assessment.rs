//! # Assessment Module
//!
//! Per-element verdicts aggregated from findings.
//!
//! Each element keeps the worst outcome across the requirements that apply to
//! it. Elements no requirement applies to are left out. Rates are integer
//! basis points (1/100 of a percent), rounded half up.

use crate::element::{ModelElement, ObjectInfo};
use crate::evaluator::{Finding, Outcome};
use serde::Serialize;

/// Basis points in one hundred percent.
pub const FULL_RATE: u64 = 10_000;

/// One element with its worst outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssessedObject {
    pub info: ObjectInfo,
    /// The real object id, `None` if the object has none.
    #[serde(skip)]
    pub object_id: Option<String>,
    pub outcome: Outcome,
    /// Message of the finding that decided the outcome.
    pub message: String,
}

/// Pass, invalid and missing rates in basis points.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rates {
    pub passing: u64,
    pub invalid: u64,
    pub missing: u64,
}

/// Render basis points as a percentage with two decimals, e.g. `66.67%`.
pub fn format_rate(basis_points: u64) -> String {
    format!("{}.{:02}%", basis_points / 100, basis_points % 100)
}

/// Aggregated result of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assessment {
    objects: Vec<AssessedObject>,
}

impl Assessment {
    /// Keep the worst applicable outcome per element, in element order.
    pub fn from_findings(elements: &[ModelElement], findings: &[Finding]) -> Self {
        let mut worst: Vec<Option<&Finding>> = vec![None; elements.len()];
        for finding in findings {
            if finding.outcome == Outcome::NotApplicable {
                continue;
            }
            let Some(slot) = worst.get_mut(finding.element_index) else {
                continue;
            };
            if slot.is_none_or(|current| finding.outcome > current.outcome) {
                *slot = Some(finding);
            }
        }

        let objects = elements
            .iter()
            .zip(worst)
            .filter_map(|(element, finding)| {
                finding.map(|f| AssessedObject {
                    info: element.object_info(),
                    object_id: element.id.clone(),
                    outcome: f.outcome,
                    message: f.message.clone(),
                })
            })
            .collect();
        Self { objects }
    }

    /// Every assessed object, in element order.
    pub fn objects(&self) -> &[AssessedObject] {
        &self.objects
    }

    /// Objects with the given outcome, in element order.
    pub fn group(&self, outcome: Outcome) -> impl Iterator<Item = &AssessedObject> {
        self.objects.iter().filter(move |o| o.outcome == outcome)
    }

    /// Report rows of a group.
    pub fn infos(&self, outcome: Outcome) -> Vec<ObjectInfo> {
        self.group(outcome).map(|o| o.info.clone()).collect()
    }

    /// Ids of a group. Objects without an id are skipped.
    pub fn object_ids(&self, outcome: Outcome) -> Vec<String> {
        self.group(outcome)
            .filter_map(|o| o.object_id.clone())
            .collect()
    }

    pub fn count(&self, outcome: Outcome) -> usize {
        self.group(outcome).count()
    }

    /// Number of assessed objects.
    pub fn total(&self) -> usize {
        self.objects.len()
    }

    pub fn has_failures(&self) -> bool {
        self.objects.iter().any(|o| o.outcome.is_failure())
    }

    /// `Found N objects with <state> parameters: name (Type: t, ID: id); ...`
    pub fn summary_message(&self, outcome: Outcome) -> String {
        let rows: Vec<String> = self
            .group(outcome)
            .map(|o| format!("{} (Type: {}, ID: {})", o.info.name, o.info.type_name, o.info.id))
            .collect();
        format!(
            "Found {} objects with {} parameters: {}",
            rows.len(),
            outcome.as_str(),
            rows.join("; ")
        )
    }

    /// Group rates. All zero when nothing was assessed.
    pub fn rates(&self) -> Rates {
        let total = self.total() as u64;
        let rate = |count: usize| -> u64 {
            if total == 0 {
                0
            } else {
                (count as u64 * FULL_RATE * 2 + total) / (total * 2)
            }
        };
        Rates {
            passing: rate(self.count(Outcome::Passing)),
            invalid: rate(self.count(Outcome::Invalid)),
            missing: rate(self.count(Outcome::Missing)),
        }
    }

    /// `Pass rate: 66.67%, Invalid rate: 33.33%, Missing rate: 0.00%`
    pub fn rate_message(&self) -> String {
        let rates = self.rates();
        format!(
            "Pass rate: {}, Invalid rate: {}, Missing rate: {}",
            format_rate(rates.passing),
            format_rate(rates.invalid),
            format_rate(rates.missing)
        )
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(element_index: usize, requirement_index: usize, outcome: Outcome) -> Finding {
        Finding {
            element_index,
            element_id: None,
            requirement_index,
            requirement: format!("r{}", requirement_index),
            outcome,
            message: format!("{:?}", outcome),
        }
    }

    fn elements(n: usize) -> Vec<ModelElement> {
        (0..n)
            .map(|i| ModelElement::named(format!("id{}", i), format!("E{}", i), "Windows"))
            .collect()
    }

    #[test]
    fn worst_outcome_per_element() {
        let elements = elements(3);
        let findings = vec![
            finding(0, 0, Outcome::Passing),
            finding(0, 1, Outcome::Invalid),
            finding(1, 0, Outcome::Passing),
            finding(1, 1, Outcome::NotApplicable),
            finding(2, 0, Outcome::NotApplicable),
            finding(2, 1, Outcome::NotApplicable),
        ];
        let assessment = Assessment::from_findings(&elements, &findings);
        assert_eq!(assessment.total(), 2);
        assert_eq!(assessment.object_ids(Outcome::Invalid), vec!["id0"]);
        assert_eq!(assessment.object_ids(Outcome::Passing), vec!["id1"]);
        assert!(assessment.has_failures());
        assert_eq!(assessment.objects()[0].message, "Invalid");
    }

    #[test]
    fn rates_round_half_up() {
        let elements = elements(3);
        let findings = vec![
            finding(0, 0, Outcome::Passing),
            finding(1, 0, Outcome::Passing),
            finding(2, 0, Outcome::Invalid),
        ];
        let assessment = Assessment::from_findings(&elements, &findings);
        assert_eq!(
            assessment.rates(),
            Rates {
                passing: 6667,
                invalid: 3333,
                missing: 0
            }
        );
        assert_eq!(
            assessment.rate_message(),
            "Pass rate: 66.67%, Invalid rate: 33.33%, Missing rate: 0.00%"
        );
    }

    #[test]
    fn empty_assessment_has_zero_rates() {
        let assessment = Assessment::default();
        assert_eq!(assessment.rates(), Rates::default());
        assert!(!assessment.has_failures());
        assert_eq!(
            assessment.summary_message(Outcome::Missing),
            "Found 0 objects with missing parameters: "
        );
    }

    #[test]
    fn summary_lists_objects_with_unknown_placeholders() {
        let mut elements = elements(2);
        elements[1] = ModelElement::default();
        let findings = vec![finding(0, 0, Outcome::Missing), finding(1, 0, Outcome::Missing)];
        let assessment = Assessment::from_findings(&elements, &findings);
        assert_eq!(
            assessment.summary_message(Outcome::Missing),
            "Found 2 objects with missing parameters: E0 (Type: Unknown, ID: id0); Unknown (Type: Unknown, ID: Unknown)"
        );
        // The object without an id is reported but cannot be attached.
        assert_eq!(assessment.object_ids(Outcome::Missing), vec!["id0"]);
    }

    #[test]
    fn format_rate_pads_fraction() {
        assert_eq!(format_rate(10_000), "100.00%");
        assert_eq!(format_rate(5), "0.05%");
    }
}
