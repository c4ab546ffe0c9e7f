//! # Variable Interpolation
//!
//! Substitutes `${name}` placeholders in template strings using two lookup
//! scopes: caller-supplied inputs and already-produced step results.
//!
//! ## Template Syntax
//!
//! A placeholder is the literal text `${name}` where `name` is an input key
//! or an earlier step's identifier. Unresolved placeholders are left
//! verbatim; no error is raised.
//!
//! ## Usage
//!
//! ```rust
//! use clipflow_engine::resolve::interpolate;
//! use clipflow_engine::value::{StepValue, ValueMap};
//!
//! let mut inputs = ValueMap::new();
//! inputs.insert("subject".into(), StepValue::Text("a red fox".into()));
//! let results = ValueMap::new();
//!
//! let resolved = interpolate("a painting of ${subject}", &inputs, &results);
//! assert_eq!(resolved, "a painting of a red fox");
//! ```

use crate::value::ValueMap;

/// Replace every `${key}` placeholder in `template` with the key's rendered
/// value, first from `inputs`, then from `results`.
///
/// Pure function: neither scope is mutated. Placeholders that match no key
/// in either scope remain untouched, which also means references to steps
/// that have not run yet stay verbatim.
pub fn interpolate(template: &str, inputs: &ValueMap, results: &ValueMap) -> String {
    let mut rendered = template.to_string();
    for (key, value) in inputs.iter().chain(results.iter()) {
        let placeholder = format!("${{{key}}}");
        if rendered.contains(&placeholder) {
            rendered = rendered.replace(&placeholder, &value.render());
        }
    }
    rendered
}
