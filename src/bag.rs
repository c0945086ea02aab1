//! Input and output field bags exchanged with the form layer
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Two numbers closer than this are the same value for change detection.
pub const EQUIVALENCE_EPSILON: f64 = 1e-9;

/// A raw value entered by an operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, minicbor::Encode, minicbor::Decode)]
#[serde(untagged)]
pub enum FieldValue {
    #[n(0)]
    Number(#[n(0)] f64),
    #[n(1)]
    Text(#[n(0)] String),
    #[n(2)]
    Null,
}

impl FieldValue {
    /// Numeric reading of the value. Null, blank or non-numeric text and
    /// non-finite numbers are all unset.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) if n.is_finite() => Some(*n),
            FieldValue::Number(_) => None,
            FieldValue::Text(s) => parse_number(s),
            FieldValue::Null => None,
        }
    }

    /// Trimmed string form used for equivalence checks. Null renders empty.
    pub fn display_form(&self) -> String {
        match self {
            FieldValue::Number(n) => n.to_string(),
            FieldValue::Text(s) => s.trim().to_string(),
            FieldValue::Null => String::new(),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<Option<f64>> for FieldValue {
    fn from(value: Option<f64>) -> Self {
        value.map_or(FieldValue::Null, FieldValue::Number)
    }
}

fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Strict equality, equal trimmed string forms, or numerically equal within
/// [`EQUIVALENCE_EPSILON`].
pub fn are_equivalent(a: &FieldValue, b: &FieldValue) -> bool {
    if a == b || a.display_form() == b.display_form() {
        return true;
    }
    match (a.as_number(), b.as_number()) {
        (Some(x), Some(y)) => (x - y).abs() < EQUIVALENCE_EPSILON,
        _ => false,
    }
}

/// Operator entry for one form: field path to raw value.
#[derive(
    Debug, Clone, Default, PartialEq, Serialize, Deserialize, minicbor::Encode, minicbor::Decode,
)]
#[serde(transparent)]
pub struct InputBag {
    #[n(0)]
    fields: BTreeMap<String, FieldValue>,
}

impl InputBag {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set(mut self, path: &str, value: impl Into<FieldValue>) -> Self {
        self.insert(path, value);
        self
    }
    pub fn insert(&mut self, path: &str, value: impl Into<FieldValue>) {
        self.fields.insert(path.to_string(), value.into());
    }
    pub fn remove(&mut self, path: &str) -> Option<FieldValue> {
        self.fields.remove(path)
    }
    pub fn get(&self, path: &str) -> Option<&FieldValue> {
        self.fields.get(path)
    }
    /// Numeric value at `path`, `None` when absent or unset.
    pub fn number(&self, path: &str) -> Option<f64> {
        self.fields.get(path).and_then(FieldValue::as_number)
    }
    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.fields.iter()
    }
    pub fn len(&self) -> usize {
        self.fields.len()
    }
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Flatten a nested JSON document into dotted paths. Array elements use
    /// their index as a path segment.
    pub fn from_json(value: &Value) -> Self {
        let mut bag = Self::new();
        flatten_into(&mut bag.fields, "", value);
        bag
    }

    /// Write every derived field over the raw entry, unset outputs as null.
    pub fn merge_outputs(&mut self, outputs: &OutputBag) {
        for (path, value) in outputs.iter() {
            let value = match value {
                Some(text) => FieldValue::Text(text.clone()),
                None => FieldValue::Null,
            };
            self.fields.insert(path.clone(), value);
        }
    }
}

fn join_path(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        segment.to_string()
    } else {
        format!("{prefix}.{segment}")
    }
}

fn flatten_into(out: &mut BTreeMap<String, FieldValue>, prefix: &str, value: &Value) {
    let leaf = match value {
        Value::Object(map) => {
            for (key, nested) in map {
                flatten_into(out, &join_path(prefix, key), nested);
            }
            return;
        }
        Value::Array(items) => {
            for (index, nested) in items.iter().enumerate() {
                flatten_into(out, &join_path(prefix, &index.to_string()), nested);
            }
            return;
        }
        Value::Null => FieldValue::Null,
        Value::Bool(b) => FieldValue::Text(b.to_string()),
        Value::Number(n) => n.as_f64().map_or(FieldValue::Null, FieldValue::Number),
        Value::String(s) => FieldValue::Text(s.clone()),
    };
    // a bare scalar has no path to live under
    if !prefix.is_empty() {
        out.insert(prefix.to_string(), leaf);
    }
}

/// Paths whose values differ between two entries. A path present on only
/// one side is always dirty, even when its value is blank.
pub fn dirty_fields(previous: &InputBag, current: &InputBag) -> Vec<String> {
    let keys: BTreeSet<&String> = previous.fields.keys().chain(current.fields.keys()).collect();

    keys.into_iter()
        .filter(|key| match (previous.fields.get(*key), current.fields.get(*key)) {
            (Some(before), Some(after)) => !are_equivalent(before, after),
            _ => true,
        })
        .cloned()
        .collect()
}

/// Derived fields: path to a fixed-point string, or `None` when the inputs
/// do not determine the value yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutputBag {
    fields: BTreeMap<String, Option<String>>,
}

impl OutputBag {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn insert(&mut self, path: &str, value: Option<String>) {
        self.fields.insert(path.to_string(), value);
    }
    /// The formatted value, `None` when the field is unset or unknown.
    pub fn get(&self, path: &str) -> Option<&str> {
        self.fields.get(path).and_then(|v| v.as_deref())
    }
    pub fn contains(&self, path: &str) -> bool {
        self.fields.contains_key(path)
    }
    pub fn is_null(&self, path: &str) -> bool {
        matches!(self.fields.get(path), Some(None))
    }
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Option<String>)> {
        self.fields.iter()
    }
    pub fn len(&self) -> usize {
        self.fields.len()
    }
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
    pub fn to_json(&self) -> Value {
        let map = self
            .fields
            .iter()
            .map(|(path, value)| (path.clone(), value.clone().map_or(Value::Null, Value::String)))
            .collect();
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn number_reads_treat_blank_and_garbage_as_unset() {
        let bag = InputBag::new()
            .set("a", " 12.5 ")
            .set("b", "")
            .set("c", "abc")
            .set("d", f64::NAN)
            .set("e", 4.0)
            .set("f", FieldValue::Null);

        assert_eq!(bag.number("a"), Some(12.5));
        assert_eq!(bag.number("b"), None);
        assert_eq!(bag.number("c"), None);
        assert_eq!(bag.number("d"), None);
        assert_eq!(bag.number("e"), Some(4.0));
        assert_eq!(bag.number("f"), None);
        assert_eq!(bag.number("missing"), None);
    }

    #[test]
    fn from_json_flattens_nested_documents() {
        let doc = json!({
            "rc417Weighting": { "row1": { "rawWeight": 545.5 }, "row2": { "rawWeight": "505" } },
            "checks": [true, null],
            "ncr": { "quantity": null }
        });

        let bag = InputBag::from_json(&doc);

        assert_eq!(bag.number("rc417Weighting.row1.rawWeight"), Some(545.5));
        assert_eq!(bag.number("rc417Weighting.row2.rawWeight"), Some(505.0));
        assert_eq!(bag.get("checks.0"), Some(&FieldValue::Text("true".into())));
        assert_eq!(bag.get("checks.1"), Some(&FieldValue::Null));
        assert_eq!(bag.get("ncr.quantity"), Some(&FieldValue::Null));
        assert_eq!(bag.len(), 5);
    }

    #[test]
    fn equivalence_rules() {
        assert!(are_equivalent(&"1004.00".into(), &"1004".into()));
        assert!(are_equivalent(&FieldValue::Number(1004.0), &"1004".into()));
        assert!(are_equivalent(&" ok ".into(), &"ok".into()));
        assert!(are_equivalent(&FieldValue::Null, &"".into()));
        assert!(!are_equivalent(&"abc".into(), &"abd".into()));
        assert!(!are_equivalent(&"1.5".into(), &"1.6".into()));
    }

    #[test]
    fn dirty_fields_ignores_formatting_only_edits() {
        let before = InputBag::new().set("a", "10").set("b", 2.0).set("c", "x");
        let after = InputBag::new()
            .set("a", "10.000")
            .set("b", 3.0)
            .set("d", "new");

        assert_eq!(dirty_fields(&before, &after), vec!["b", "c", "d"]);
    }

    #[test]
    fn dirty_fields_counts_one_sided_blanks() {
        let before = InputBag::new().set("a", "");
        let after = InputBag::new().set("b", FieldValue::Null);

        assert_eq!(dirty_fields(&before, &after), vec!["a", "b"]);
        assert!(dirty_fields(&before, &before.clone()).is_empty());
    }

    #[test]
    fn merge_outputs_overwrites_derived_paths() {
        let mut outputs = OutputBag::new();
        outputs.insert("total", Some("10.00".into()));
        outputs.insert("rate", None);

        let mut bag = InputBag::new().set("total", "stale").set("raw", 1.0);
        bag.merge_outputs(&outputs);

        assert_eq!(bag.get("total"), Some(&FieldValue::Text("10.00".into())));
        assert_eq!(bag.get("rate"), Some(&FieldValue::Null));
        assert_eq!(bag.number("raw"), Some(1.0));
    }

    #[test]
    fn output_bag_json_keeps_nulls() {
        let mut outputs = OutputBag::new();
        outputs.insert("a", Some("1.0".into()));
        outputs.insert("b", None);

        assert_eq!(outputs.to_json(), json!({ "a": "1.0", "b": null }));
        assert!(outputs.is_null("b"));
        assert!(!outputs.is_null("a"));
        assert!(!outputs.is_null("zzz"));
    }
}
