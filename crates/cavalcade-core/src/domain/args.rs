//! Argument bundle passed to callables.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::errors::CavalcadeError;

/// Positional and keyword arguments for one call.
///
/// Values are JSON so that callables of any shape can share one
/// object-safe signature. Use [`Args::arg`] / [`Args::kwarg`] to decode a
/// slot into a concrete type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Args {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub positional: Vec<Value>,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub keyword: Map<String, Value>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_positional<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            positional: values.into_iter().map(Into::into).collect(),
            keyword: Map::new(),
        }
    }

    pub fn from_keyword<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Self {
            positional: Vec::new(),
            keyword: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn with_arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    pub fn with_kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.keyword.insert(name.into(), value.into());
        self
    }

    /// Combine a task's bound arguments with the ones given at submission.
    ///
    /// Positional: bound first, then submitted.
    /// Keyword: submitted overlaid by bound, so bound keys win.
    pub fn merge(bound: &Args, submitted: Args) -> Args {
        let Args {
            positional: submitted_positional,
            mut keyword,
        } = submitted;

        let mut positional = bound.positional.clone();
        positional.extend(submitted_positional);

        for (k, v) in &bound.keyword {
            keyword.insert(k.clone(), v.clone());
        }

        Args {
            positional,
            keyword,
        }
    }

    pub fn len(&self) -> usize {
        self.positional.len() + self.keyword.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keyword.is_empty()
    }

    /// Decode the positional argument at `index`.
    pub fn arg<T: DeserializeOwned>(&self, index: usize) -> Result<T, CavalcadeError> {
        let value = self
            .positional
            .get(index)
            .ok_or_else(|| CavalcadeError::Argument {
                slot: index.to_string(),
                reason: "missing".to_string(),
            })?;
        decode(index.to_string(), value)
    }

    /// Decode the keyword argument `name`.
    pub fn kwarg<T: DeserializeOwned>(&self, name: &str) -> Result<T, CavalcadeError> {
        let value = self
            .keyword
            .get(name)
            .ok_or_else(|| CavalcadeError::Argument {
                slot: name.to_string(),
                reason: "missing".to_string(),
            })?;
        decode(name.to_string(), value)
    }
}

fn decode<T: DeserializeOwned>(slot: String, value: &Value) -> Result<T, CavalcadeError> {
    T::deserialize(value).map_err(|e| CavalcadeError::Argument {
        slot,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[test]
    fn bound_positional_come_first() {
        let bound = Args::from_positional([1, 2]);
        let merged = Args::merge(&bound, Args::from_positional([3]));
        assert_eq!(merged.positional, vec![json!(1), json!(2), json!(3)]);
    }

    #[rstest]
    #[case::collision(json!({"x": 1}), json!({"x": 2}), json!({"x": 1}))]
    #[case::disjoint(json!({"x": 1}), json!({"y": 2}), json!({"x": 1, "y": 2}))]
    #[case::bound_empty(json!({}), json!({"y": 2}), json!({"y": 2}))]
    fn bound_keyword_wins(#[case] bound: Value, #[case] submitted: Value, #[case] expected: Value) {
        let bound = Args {
            keyword: bound.as_object().cloned().unwrap(),
            ..Args::default()
        };
        let submitted = Args {
            keyword: submitted.as_object().cloned().unwrap(),
            ..Args::default()
        };

        let merged = Args::merge(&bound, submitted);
        assert_eq!(Value::Object(merged.keyword), expected);
    }

    #[test]
    fn typed_accessors_decode() {
        let args = Args::new().with_arg(21).with_kwarg("label", "answer");

        let x: i64 = args.arg(0).unwrap();
        let label: String = args.kwarg("label").unwrap();
        assert_eq!(x, 21);
        assert_eq!(label, "answer");
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn missing_slot_is_an_argument_error() {
        let args = Args::new();
        let err = args.arg::<i64>(0).unwrap_err();
        assert!(matches!(err, CavalcadeError::Argument { ref slot, .. } if slot == "0"));
    }

    #[test]
    fn wrong_type_is_an_argument_error() {
        let args = Args::new().with_kwarg("x", "not a number");
        let err = args.kwarg::<i64>("x").unwrap_err();
        assert!(matches!(err, CavalcadeError::Argument { ref slot, .. } if slot == "x"));
    }
}
