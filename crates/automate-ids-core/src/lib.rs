//! # automate-ids-core
//!
//! Deterministic compliance engine behind the IDS / bsDD Automate function.
//!
//! Data flows one way:
//!
//! ```text
//! ObjectStore -> traverse -> extract_elements -> evaluate(RuleSet) -> Assessment -> report
//! ```
//!
//! The crate does no I/O and never logs. Everything that talks to a server
//! lives in the `automate-ids` binary.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::panic))]

pub mod assessment;
pub mod bsdd;
pub mod context;
pub mod element;
pub mod error;
pub mod evaluator;
pub mod graph;
pub mod ids;
pub mod inputs;
pub mod report;
pub mod rules;
pub mod traversal;

pub use assessment::{format_rate, AssessedObject, Assessment, Rates};
pub use bsdd::{BsddClass, BsddDictionary, BsddProperty};
pub use context::AutomationRunData;
pub use element::{extract_elements, Classification, ModelElement, ObjectInfo, Parameter};
pub use error::{CoreError, Result};
pub use evaluator::{evaluate, Finding, Outcome};
pub use graph::ObjectStore;
pub use ids::IdsDocument;
pub use inputs::{FunctionInputs, ReportFormat, ThresholdMode};
pub use report::{render, Criteria};
pub use rules::{
    Applicability, Cardinality, Facet, Filter, Requirement, RequirementSource, RuleSet,
    ValueConstraint,
};
pub use traversal::{traverse, TraversalContext};

/// Traverse a resolved root object and extract its elements.
pub fn elements_of(root: &serde_json::Value) -> Vec<ModelElement> {
    extract_elements(&traverse(root))
}

/// Evaluate `rules` against `elements` and aggregate the findings.
pub fn assess(elements: &[ModelElement], rules: &RuleSet) -> (Vec<Finding>, Assessment) {
    let findings = evaluate(elements, rules);
    let assessment = Assessment::from_findings(elements, &findings);
    (findings, assessment)
}
