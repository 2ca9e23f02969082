//! Decoding helpers for resource properties.
//!
//! CloudFormation hands every scalar property to the handler as a string,
//! so booleans arrive as `"true"` or `"false"`. These helpers accept either
//! form and reject anything else.
use serde::Deserialize;

#[derive(Deserialize)]
#[serde(untagged)]
enum BoolOrString {
    Bool(bool),
    String(String),
}

fn coerce<E: serde::de::Error>(value: BoolOrString) -> Result<bool, E> {
    match value {
        BoolOrString::Bool(b) => Ok(b),
        BoolOrString::String(s) => match s.as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(E::custom(format!(
                "expected a boolean or \"true\"/\"false\", found \"{other}\""
            ))),
        },
    }
}

/// Deserializes a boolean that may be encoded as a string.
///
/// Use with `#[serde(default, deserialize_with = "crate::props::bool")]`.
pub fn bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    coerce(BoolOrString::deserialize(deserializer)?)
}

/// Deserializes an optional boolean that may be encoded as a string.
///
/// Use with `#[serde(default, deserialize_with = "crate::props::option_bool")]`.
pub fn option_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<BoolOrString>::deserialize(deserializer)?
        .map(coerce)
        .transpose()
}

#[cfg(test)]
mod test {
    #[derive(Debug, PartialEq, serde::Deserialize)]
    struct Flags {
        #[serde(default, deserialize_with = "crate::props::bool")]
        required: bool,
        #[serde(default, deserialize_with = "crate::props::option_bool")]
        optional: Option<bool>,
    }

    fn flags(value: serde_json::Value) -> Result<Flags, serde_json::Error> {
        serde_json::from_value(value)
    }

    #[test]
    fn strings_are_coerced() {
        assert_eq!(
            Flags {
                required: true,
                optional: Some(false)
            },
            flags(serde_json::json!({ "required": "true", "optional": "false" })).unwrap()
        );
    }

    #[test]
    fn native_booleans_pass_through() {
        assert_eq!(
            Flags {
                required: false,
                optional: Some(true)
            },
            flags(serde_json::json!({ "required": false, "optional": true })).unwrap()
        );
    }

    #[test]
    fn missing_and_null() {
        assert_eq!(
            Flags {
                required: false,
                optional: None
            },
            flags(serde_json::json!({ "optional": null })).unwrap()
        );
    }

    #[test]
    fn other_strings_are_rejected() {
        let err = flags(serde_json::json!({ "required": "yes" })).unwrap_err();
        assert!(err.to_string().contains("\"yes\""), "{err}");
    }
}
