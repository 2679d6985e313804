//! Field-level validation of payloads against composed resource metadata.

use super::error::{FieldError, ValidationError};
use super::metadata::{FieldDescriptor, OrgUnitOwnership, ResourceMetadata};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Where a field lives in composed metadata
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldLocation {
    /// Physical resource owning the field
    pub resource: String,
    /// Innermost link field leading to `resource`, `None` for the top resource
    pub link: Option<String>,
    /// Number of links followed from the top resource
    pub depth: usize,
}

/// Outcome recorded for one field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOutcome {
    Valid,
    Invalid(Vec<FieldError>),
}

/// Per-field outcomes of one validation call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationResult {
    fields: BTreeMap<String, FieldOutcome>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `field` valid, discarding earlier errors
    pub fn mark_valid(&mut self, field: &str) {
        self.fields.insert(field.to_string(), FieldOutcome::Valid);
    }

    /// Record an error against `field` unless it is already valid
    pub fn record(&mut self, field: &str, error: FieldError) {
        match self.fields.get_mut(field) {
            Some(FieldOutcome::Valid) => {}
            Some(FieldOutcome::Invalid(errors)) => errors.push(error),
            None => {
                self.fields
                    .insert(field.to_string(), FieldOutcome::Invalid(vec![error]));
            }
        }
    }

    pub fn outcome(&self, field: &str) -> Option<&FieldOutcome> {
        self.fields.get(field)
    }

    pub fn is_valid(&self) -> bool {
        self.fields
            .values()
            .all(|outcome| matches!(outcome, FieldOutcome::Valid))
    }

    /// Errors of every invalid field
    pub fn errors(&self) -> BTreeMap<String, Vec<FieldError>> {
        self.fields
            .iter()
            .filter_map(|(field, outcome)| match outcome {
                FieldOutcome::Invalid(errors) => Some((field.clone(), errors.clone())),
                FieldOutcome::Valid => None,
            })
            .collect()
    }
}

fn value_matches(value: &Value, allowed: &[String]) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => allowed.iter().any(|a| a == s),
        other => {
            let rendered = other.to_string();
            allowed.iter().any(|a| *a == rendered)
        }
    }
}

fn check_value(name: &str, value: &Value, field: &FieldDescriptor) -> Result<(), ValidationError> {
    let Some(allowed) = field.allowed_values() else {
        return Ok(());
    };
    if value_matches(value, &allowed) {
        Ok(())
    } else {
        Err(ValidationError::InvalidValue {
            field: name.to_string(),
            value: value.clone(),
            allowed,
        })
    }
}

/// Checks payload fields against composed metadata
///
/// A field is accepted when the top resource declares it, or when a nested
/// custom resource owned by the organizational unit does. Enumerated fields
/// must carry one of their permitted values (`null` always passes).
#[derive(Debug, Clone, Default)]
pub struct ResourceValidator {
    ownership: OrgUnitOwnership,
}

impl ResourceValidator {
    pub fn new(ownership: OrgUnitOwnership) -> Self {
        Self { ownership }
    }

    pub fn ownership(&self) -> &OrgUnitOwnership {
        &self.ownership
    }

    /// Find the resource that accepts `name = value`
    ///
    /// Returns on the first path where the field is valid. When no path
    /// accepts it, an `InvalidValue` seen on some path wins over
    /// `UnknownField`.
    pub fn locate(
        &self,
        name: &str,
        value: &Value,
        metadata: &ResourceMetadata,
    ) -> Result<FieldLocation, ValidationError> {
        self.search(name, value, metadata, None, 0)
    }

    fn search(
        &self,
        name: &str,
        value: &Value,
        metadata: &ResourceMetadata,
        via: Option<&str>,
        depth: usize,
    ) -> Result<FieldLocation, ValidationError> {
        if let Some(field) = metadata.content.get(name) {
            check_value(name, value, field)?;
            return Ok(FieldLocation {
                resource: metadata.physical_name().to_string(),
                link: via.map(str::to_string),
                depth,
            });
        }

        let mut rejection = None;
        for (link, field) in &metadata.content {
            let (Some(target), Some(nested)) = (field.res_target.as_deref(), field.nested.as_deref())
            else {
                continue;
            };
            if !self.ownership.owns(target) {
                continue;
            }

            match self.search(name, value, nested, Some(link), depth + 1) {
                Ok(location) => return Ok(location),
                Err(e @ ValidationError::InvalidValue { .. }) => {
                    rejection.get_or_insert(e);
                }
                Err(_) => {}
            }
        }

        Err(rejection.unwrap_or_else(|| ValidationError::UnknownField {
            field: name.to_string(),
        }))
    }

    /// Validate one field
    ///
    /// With `throw_on_error` a failure is returned as the error; otherwise it
    /// is recorded in `result` and `Ok(false)` is returned.
    pub fn validate_field(
        &self,
        name: &str,
        value: Option<&Value>,
        metadata: &ResourceMetadata,
        throw_on_error: bool,
        result: &mut ValidationResult,
    ) -> Result<bool, ValidationError> {
        let value = value.unwrap_or(&Value::Null);
        match self.locate(name, value, metadata) {
            Ok(_) => {
                result.mark_valid(name);
                Ok(true)
            }
            Err(e) if throw_on_error => Err(e),
            Err(e) => {
                tracing::debug!("Field '{}' rejected: {}", name, e);
                result.record(name, e.to_field_error());
                Ok(false)
            }
        }
    }

    /// Validate every field of `payload`
    ///
    /// With `throw_on_error` any failure is raised as one
    /// [`ValidationError::Failed`] carrying every field error.
    pub fn validate_resources(
        &self,
        payload: &Map<String, Value>,
        metadata: &ResourceMetadata,
        throw_on_error: bool,
    ) -> Result<ValidationResult, ValidationError> {
        let mut result = ValidationResult::new();
        for (name, value) in payload {
            self.validate_field(name, Some(value), metadata, false, &mut result)?;
        }

        if throw_on_error && !result.is_valid() {
            let errors = result.errors();
            tracing::warn!(
                "Payload for {} failed validation on {} field(s)",
                metadata.name,
                errors.len()
            );
            return Err(ValidationError::Failed(errors));
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn profile_metadata() -> ResourceMetadata {
        serde_json::from_value(json!({
            "name": "profile",
            "content": {
                "email": {},
                "status": {"values": {"active": {}, "inactive": {}, "__invalid_value__": {}}},
                "loyalty": {
                    "resTarget": "cusLoyalty",
                    "nested": {
                        "name": "cusLoyalty",
                        "content": {"tier": {"values": ["gold", "silver"]}, "points": {}}
                    }
                },
                "foreign": {
                    "resTarget": "cusForeign",
                    "nested": {"name": "cusForeign", "content": {"secret": {}}}
                }
            },
            "compatibleResources": ["profile"]
        }))
        .unwrap()
    }

    fn validator() -> ResourceValidator {
        ResourceValidator::new(OrgUnitOwnership::new(["cusLoyalty"]))
    }

    #[test]
    fn test_known_field_is_valid() {
        let mut result = ValidationResult::new();
        let valid = validator()
            .validate_field("email", Some(&json!("a@b.c")), &profile_metadata(), true, &mut result)
            .unwrap();
        assert!(valid);
        assert_eq!(result.outcome("email"), Some(&FieldOutcome::Valid));
    }

    #[test]
    fn test_invalid_enum_value() {
        let mut result = ValidationResult::new();
        let err = validator()
            .validate_field("status", Some(&json!("bogus")), &profile_metadata(), true, &mut result)
            .unwrap_err();
        assert_eq!(
            err.allowed_values(),
            Some(&["active".to_string(), "inactive".to_string()][..])
        );
    }

    #[test]
    fn test_null_passes_enum() {
        let mut result = ValidationResult::new();
        assert!(validator()
            .validate_field("status", None, &profile_metadata(), true, &mut result)
            .unwrap());
    }

    #[test]
    fn test_nested_field_located_via_link() {
        let location = validator()
            .locate("points", &json!(10), &profile_metadata())
            .unwrap();
        assert_eq!(location.resource, "cusLoyalty");
        assert_eq!(location.link.as_deref(), Some("loyalty"));
    }

    #[test]
    fn test_unowned_nested_resource_is_ignored() {
        let err = validator()
            .locate("secret", &json!("x"), &profile_metadata())
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnknownField {
                field: "secret".to_string()
            }
        );
    }

    #[test]
    fn test_nested_invalid_value_wins_over_unknown() {
        let err = validator()
            .locate("tier", &json!("bronze"), &profile_metadata())
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidValue { .. }));
    }

    #[test]
    fn test_non_throwing_accumulates() {
        let payload = json!({"email": "a@b.c", "nickname": "x", "status": "bogus"});
        let result = validator()
            .validate_resources(payload.as_object().unwrap(), &profile_metadata(), false)
            .unwrap();
        assert!(!result.is_valid());
        let errors = result.errors();
        assert_eq!(errors.len(), 2);
        assert!(errors.contains_key("nickname"));
        assert_eq!(
            errors["status"][0].data,
            Some(vec!["active".to_string(), "inactive".to_string()])
        );
    }

    #[test]
    fn test_throwing_raises_failed() {
        let payload = json!({"nickname": "x"});
        let err = validator()
            .validate_resources(payload.as_object().unwrap(), &profile_metadata(), true)
            .unwrap_err();
        match err {
            ValidationError::Failed(errors) => assert!(errors.contains_key("nickname")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_valid_field_never_overwritten() {
        let mut result = ValidationResult::new();
        result.mark_valid("email");
        result.record(
            "email",
            FieldError {
                message: "Unknown field 'email'".to_string(),
                data: None,
            },
        );
        assert!(result.is_valid());
    }

    #[test]
    fn test_fresh_accumulator_per_call() {
        let v = validator();
        let metadata = profile_metadata();
        let bad = json!({"nickname": "x"});
        let good = json!({"email": "a@b.c"});
        assert!(!v
            .validate_resources(bad.as_object().unwrap(), &metadata, false)
            .unwrap()
            .is_valid());
        assert!(v
            .validate_resources(good.as_object().unwrap(), &metadata, false)
            .unwrap()
            .is_valid());
    }

    fn two_path_metadata() -> ResourceMetadata {
        serde_json::from_value(json!({
            "name": "profile",
            "content": {
                "email": {},
                "alpha": {
                    "resTarget": "cusB",
                    "nested": {"name": "cusB", "content": {"f": {"values": ["x"]}}}
                },
                "beta": {
                    "resTarget": "cusA",
                    "nested": {"name": "cusA", "content": {"f": {"values": ["y"]}}}
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_field_valid_on_one_nested_path_is_accepted() {
        let v = ResourceValidator::new(OrgUnitOwnership::new(["cusA", "cusB"]));
        let metadata = two_path_metadata();

        let location = v.locate("f", &json!("y"), &metadata).unwrap();
        assert_eq!(location.resource, "cusA");
        assert_eq!(location.link.as_deref(), Some("beta"));

        let payload = json!({"f": "y"});
        let result = v
            .validate_resources(payload.as_object().unwrap(), &metadata, true)
            .unwrap();
        assert_eq!(result.outcome("f"), Some(&FieldOutcome::Valid));

        let err = v.locate("f", &json!("z"), &metadata).unwrap_err();
        assert_eq!(err.allowed_values(), Some(&["x".to_string()][..]));
    }

    #[test]
    fn test_second_level_field_carries_innermost_link() {
        let metadata: ResourceMetadata = serde_json::from_value(json!({
            "name": "profile",
            "content": {
                "linkA": {
                    "resTarget": "cusA",
                    "nested": {
                        "name": "cusA",
                        "content": {
                            "a": {},
                            "linkB": {
                                "resTarget": "cusB",
                                "nested": {"name": "cusB", "content": {"b": {}}}
                            }
                        }
                    }
                }
            }
        }))
        .unwrap();
        let v = ResourceValidator::new(OrgUnitOwnership::new(["cusA", "cusB"]));

        let first = v.locate("a", &json!(1), &metadata).unwrap();
        assert_eq!(first.link.as_deref(), Some("linkA"));
        assert_eq!(first.depth, 1);

        let deep = v.locate("b", &json!("deep"), &metadata).unwrap();
        assert_eq!(deep.resource, "cusB");
        assert_eq!(deep.link.as_deref(), Some("linkB"));
        assert_eq!(deep.depth, 2);
    }
}
