//! # Model Validation
//!
//! Runs the schema declared for a form and/or a custom validation function against the whole
//! model and merges what they report.
//!
//! - With only one validator its result is returned unchanged.
//! - With both, errors are merged key by key; for a key reported by both, the schema's
//!   messages come before the custom ones.
//! - With neither, the result is an empty mapping.
//!
//! Either validator may return a pending result.  The merged result is ready only when both
//! parts were ready; otherwise it is a future that waits for both.
//!
//! ```rust
//! use formulary::{ValidationErrors, Validation, validate_model};
//! use serde_json::json;
//!
//! let custom = |model: &serde_json::Value| -> Validation {
//!     let mut errors = ValidationErrors::new();
//!     if model["title"].as_str().unwrap_or_default().is_empty() {
//!         errors.push("title", "title is required");
//!     }
//!     errors.into()
//! };
//!
//! let result = validate_model(&json!({}), None, Some(&custom));
//! let errors = result.try_ready().unwrap();
//! assert_eq!(errors.messages("title"), ["title is required".to_string()]);
//! ```

use std::future::IntoFuture;
use std::rc::Rc;

use serde_json::Value;

use crate::errors::ValidationErrors;
use crate::schema::{Schema, Validation};

/// A form-level validation function supplied by the application.
pub type CustomValidation = Rc<dyn Fn(&Value) -> Validation>;

/// Validates `model` against `schema` and `custom`, merging their errors.
pub fn validate_model(
    model: &Value,
    schema: Option<&dyn Schema>,
    custom: Option<&dyn Fn(&Value) -> Validation>,
) -> Validation {
    let from_schema = schema.map(|schema| schema.validate(model));
    let from_custom = custom.map(|custom| custom(model));

    match (from_schema, from_custom) {
        (None, None) => Validation::Ready(ValidationErrors::new()),
        (Some(only), None) | (None, Some(only)) => only,
        (Some(Validation::Ready(schema)), Some(Validation::Ready(custom))) => {
            Validation::Ready(schema.merge(custom))
        }
        (Some(schema), Some(custom)) => {
            tracing::debug!("waiting on pending validators");
            Validation::pending(async move {
                let (schema, custom) =
                    futures::join!(schema.into_future(), custom.into_future());
                schema.merge(custom)
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldSchema;
    use serde_json::json;
    use std::time::Duration;

    struct FixedSchema {
        errors: Value,
        delay: Option<Duration>,
    }

    impl Schema for FixedSchema {
        fn get_field(&self, _name: &str) -> Option<FieldSchema> {
            None
        }

        fn validate(&self, _model: &Value) -> Validation {
            let errors = ValidationErrors::from_value(self.errors.clone()).unwrap();
            match self.delay {
                None => errors.into(),
                Some(delay) => Validation::pending(async move {
                    tokio::time::sleep(delay).await;
                    errors
                }),
            }
        }
    }

    fn errors(value: Value) -> ValidationErrors {
        ValidationErrors::from_value(value).unwrap()
    }

    #[test]
    fn no_validators_yield_empty_result() {
        let result = validate_model(&json!({}), None, None);
        assert!(result.try_ready().unwrap().is_empty());
    }

    #[test]
    fn sync_schema_errors_pass_through_unchanged() {
        let schema = FixedSchema {
            errors: json!({"login": ["login is required"], "password": ["password is required"]}),
            delay: None,
        };
        let result = validate_model(&json!({}), Some(&schema), None);
        let result = result.try_ready().unwrap();
        assert_eq!(
            result,
            errors(json!({"login": ["login is required"], "password": ["password is required"]}))
        );
    }

    #[test]
    fn sync_validators_merge_schema_first() {
        let schema = FixedSchema {
            errors: json!({"login": ["from schema"]}),
            delay: None,
        };
        let custom = |_: &Value| -> Validation { errors(json!({"login": ["from custom"]})).into() };
        let result = validate_model(&json!({}), Some(&schema), Some(&custom));
        assert_eq!(
            result.try_ready().unwrap(),
            errors(json!({"login": ["from schema", "from custom"]}))
        );
    }

    #[tokio::test]
    async fn delayed_custom_validator_merges_after_schema() {
        let schema = FixedSchema {
            errors: json!({"login": ["from schema"]}),
            delay: None,
        };
        let custom = |_: &Value| -> Validation {
            Validation::pending(async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                errors(json!({"login": ["async validation failed"]}))
            })
        };
        let result = validate_model(&json!({"login": "test2"}), Some(&schema), Some(&custom));
        assert!(!result.is_ready());
        assert_eq!(
            result.await,
            errors(json!({"login": ["from schema", "async validation failed"]}))
        );
    }

    #[tokio::test]
    async fn delayed_schema_keeps_its_place_in_the_order() {
        let schema = FixedSchema {
            errors: json!({"login": ["slow schema"]}),
            delay: Some(Duration::from_millis(30)),
        };
        let custom = |_: &Value| -> Validation { errors(json!({"login": ["quick custom"]})).into() };
        let merged = validate_model(&json!({}), Some(&schema), Some(&custom)).await;
        assert_eq!(merged, errors(json!({"login": ["slow schema", "quick custom"]})));
    }

    #[tokio::test]
    async fn pending_custom_alone_resolves_to_its_errors() {
        let custom = |_: &Value| -> Validation {
            Validation::pending(async { errors(json!({"login": ["async validation failed"]})) })
        };
        let merged = validate_model(&json!({}), None, Some(&custom)).await;
        assert_eq!(merged, errors(json!({"login": ["async validation failed"]})));
    }
}
