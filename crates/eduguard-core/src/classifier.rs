//! Educational / non-educational classification of incoming messages.
//!
//! The model is asked for strict JSON. Whatever comes back is validated here
//! and anything unusable is an error, never an implicit "educational".

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ClassificationError;

/// Category used when the model omits one or returns a non-string.
pub const UNKNOWN_CATEGORY: &str = "unknown";

/// Transient verdict for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationResult {
    pub is_educational: bool,
    pub category: String,
}

/// Anything that can judge whether a message is on-topic.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<ClassificationResult, ClassificationError>;
}

/// Build the single-turn classification instruction for `message`.
pub fn classification_prompt(message: &str) -> String {
    format!(
        "Classify the following user question. Respond strictly in JSON with fields \
         isEducational (boolean) and category (string). Consider a topic educational only \
         if it is clearly academic (math, science, programming, history, languages, \
         economics, study skills). Question: \"\"\"{message}\"\"\""
    )
}

/// Validate raw model output into a [`ClassificationResult`].
///
/// `isEducational` is coerced with JavaScript truthiness (`0`, `""`, `null`
/// and a missing field are all `false`); `category` falls back to
/// [`UNKNOWN_CATEGORY`].
pub fn parse_classification(raw: &str) -> Result<ClassificationResult, ClassificationError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ClassificationError::Empty);
    }

    let parsed: Value = serde_json::from_str(raw).map_err(|e| {
        tracing::error!(error = %e, raw = %raw, "failed to parse classification response");
        ClassificationError::Malformed {
            reason: e.to_string(),
        }
    })?;

    let Value::Object(fields) = parsed else {
        tracing::error!(raw = %raw, "classification response is not a JSON object");
        return Err(ClassificationError::Malformed {
            reason: "expected a JSON object".to_owned(),
        });
    };

    let is_educational = fields.get("isEducational").is_some_and(truthy);
    let category = match fields.get("category") {
        Some(Value::String(s)) => s.clone(),
        _ => UNKNOWN_CATEGORY.to_owned(),
    };

    Ok(ClassificationResult {
        is_educational,
        category,
    })
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_well_formed_verdict() {
        let verdict = parse_classification(r#"{"isEducational": true, "category": "Mathematics"}"#)
            .expect("verdict");
        assert!(verdict.is_educational);
        assert_eq!(verdict.category, "Mathematics");
    }

    #[test]
    fn empty_or_blank_is_an_error() {
        assert!(matches!(parse_classification(""), Err(ClassificationError::Empty)));
        assert!(matches!(parse_classification("  \n"), Err(ClassificationError::Empty)));
    }

    #[test]
    fn invalid_json_is_an_error() {
        let err = parse_classification("Sure! It is educational.").unwrap_err();
        assert!(matches!(err, ClassificationError::Malformed { .. }));
    }

    #[test]
    fn non_object_json_is_an_error() {
        assert!(matches!(
            parse_classification("true"),
            Err(ClassificationError::Malformed { .. })
        ));
        assert!(matches!(
            parse_classification(r#"["math"]"#),
            Err(ClassificationError::Malformed { .. })
        ));
    }

    #[test]
    fn category_defaults_to_unknown() {
        let verdict = parse_classification(r#"{"isEducational": true, "category": 42}"#).unwrap();
        assert_eq!(verdict.category, UNKNOWN_CATEGORY);
        let verdict = parse_classification(r#"{"isEducational": true}"#).unwrap();
        assert_eq!(verdict.category, UNKNOWN_CATEGORY);
    }

    #[test]
    fn is_educational_uses_truthiness() {
        let cases = [
            (r#"{"isEducational": "yes"}"#, true),
            (r#"{"isEducational": ""}"#, false),
            (r#"{"isEducational": 1}"#, true),
            (r#"{"isEducational": 0}"#, false),
            (r#"{"isEducational": null}"#, false),
            (r#"{"category": "math"}"#, false),
        ];
        for (raw, expected) in cases {
            assert_eq!(parse_classification(raw).unwrap().is_educational, expected, "{raw}");
        }
    }

    #[test]
    fn prompt_embeds_question() {
        let prompt = classification_prompt("What is a derivative?");
        assert!(prompt.ends_with("Question: \"\"\"What is a derivative?\"\"\""));
        assert!(prompt.contains("isEducational (boolean)"));
    }
}
