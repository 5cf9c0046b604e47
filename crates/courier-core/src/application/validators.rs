//! Built-in reply validators and the registry that resolves them.

use async_trait::async_trait;
use dashmap::DashMap;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::{Arc, OnceLock};

use crate::domain::collaborators::Validator;
use crate::domain::execution::Execution;
use crate::domain::validation::{ValidationOutcome, ValidatorKind};
use crate::CoreError;

const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]+$";

static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();

fn email_regex() -> Result<&'static Regex, CoreError> {
    if let Some(re) = EMAIL_REGEX.get() {
        return Ok(re);
    }
    let re = Regex::new(EMAIL_PATTERN)
        .map_err(|e| CoreError::Validation(format!("Invalid email pattern: {}", e)))?;
    Ok(EMAIL_REGEX.get_or_init(|| re))
}

/// Non-empty text, optionally length-bounded
pub struct TextValidator {
    min_len: Option<usize>,
    max_len: Option<usize>,
}

#[async_trait]
impl Validator for TextValidator {
    fn kind(&self) -> &str {
        "text"
    }

    async fn validate(
        &self,
        input: &str,
        _execution: &Execution,
        _step_index: u32,
    ) -> Result<ValidationOutcome, CoreError> {
        let text = input.trim();
        if text.is_empty() {
            return Ok(ValidationOutcome::invalid("Please reply with a text message."));
        }
        let len = text.chars().count();
        if let Some(min) = self.min_len {
            if len < min {
                return Ok(ValidationOutcome::invalid(format!(
                    "Your answer must have at least {} characters.",
                    min
                )));
            }
        }
        if let Some(max) = self.max_len {
            if len > max {
                return Ok(ValidationOutcome::invalid(format!(
                    "Your answer must have at most {} characters.",
                    max
                )));
            }
        }
        Ok(ValidationOutcome::valid(json!(text)))
    }
}

/// Decimal number with optional inclusive bounds; accepts a comma as decimal separator
pub struct NumberValidator {
    min: Option<f64>,
    max: Option<f64>,
}

#[async_trait]
impl Validator for NumberValidator {
    fn kind(&self) -> &str {
        "number"
    }

    async fn validate(
        &self,
        input: &str,
        _execution: &Execution,
        _step_index: u32,
    ) -> Result<ValidationOutcome, CoreError> {
        let normalized = input.trim().replace(',', ".");
        let number = match normalized.parse::<f64>() {
            Ok(n) if n.is_finite() => n,
            _ => return Ok(ValidationOutcome::invalid("Please reply with a number.")),
        };
        if self.min.is_some_and(|min| number < min) || self.max.is_some_and(|max| number > max) {
            let range = match (self.min, self.max) {
                (Some(min), Some(max)) => format!("between {} and {}", min, max),
                (Some(min), None) => format!("of at least {}", min),
                (None, Some(max)) => format!("of at most {}", max),
                (None, None) => String::new(),
            };
            return Ok(ValidationOutcome::invalid(format!(
                "Please reply with a number {}.",
                range
            )));
        }
        Ok(ValidationOutcome::valid(json!(number)))
    }
}

/// Email address, normalised to lower case
pub struct EmailValidator;

#[async_trait]
impl Validator for EmailValidator {
    fn kind(&self) -> &str {
        "email"
    }

    async fn validate(
        &self,
        input: &str,
        _execution: &Execution,
        _step_index: u32,
    ) -> Result<ValidationOutcome, CoreError> {
        let email = input.trim();
        if !email_regex()?.is_match(email) {
            return Ok(ValidationOutcome::invalid(
                "Please reply with a valid email address.",
            ));
        }
        Ok(ValidationOutcome::valid(json!(email.to_lowercase())))
    }
}

/// Phone number: digits with common separators and an optional leading `+`
pub struct PhoneValidator;

#[async_trait]
impl Validator for PhoneValidator {
    fn kind(&self) -> &str {
        "phone"
    }

    async fn validate(
        &self,
        input: &str,
        _execution: &Execution,
        _step_index: u32,
    ) -> Result<ValidationOutcome, CoreError> {
        let trimmed = input.trim();
        let body = trimmed.strip_prefix('+').unwrap_or(trimmed);
        let well_formed = body
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '-' | '(' | ')' | '.'));
        let digits: String = body.chars().filter(|c| c.is_ascii_digit()).collect();

        if !well_formed || !(8..=15).contains(&digits.len()) {
            return Ok(ValidationOutcome::invalid(
                "Please reply with a valid phone number.",
            ));
        }
        Ok(ValidationOutcome::valid(json!(digits)))
    }
}

/// Text that fully matches a regular expression
pub struct PatternValidator {
    regex: Regex,
}

impl PatternValidator {
    /// Compile `pattern`, anchored so the whole input must match
    pub fn new(pattern: &str) -> Result<Self, CoreError> {
        let regex = Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| {
            CoreError::Validation(format!("Invalid pattern '{}': {}", pattern, e))
        })?;
        Ok(Self { regex })
    }
}

#[async_trait]
impl Validator for PatternValidator {
    fn kind(&self) -> &str {
        "pattern"
    }

    async fn validate(
        &self,
        input: &str,
        _execution: &Execution,
        _step_index: u32,
    ) -> Result<ValidationOutcome, CoreError> {
        let text = input.trim();
        if !self.regex.is_match(text) {
            return Ok(ValidationOutcome::invalid(
                "Your answer is not in the expected format.",
            ));
        }
        Ok(ValidationOutcome::valid(json!(text)))
    }
}

/// One of a fixed set of options, by name (case-insensitive) or 1-based index
pub struct ChoiceValidator {
    options: Vec<String>,
}

#[async_trait]
impl Validator for ChoiceValidator {
    fn kind(&self) -> &str {
        "choice"
    }

    async fn validate(
        &self,
        input: &str,
        _execution: &Execution,
        _step_index: u32,
    ) -> Result<ValidationOutcome, CoreError> {
        let text = input.trim();
        let by_index = text
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| self.options.get(i));
        let lowered = text.to_lowercase();
        let chosen = by_index.or_else(|| {
            self.options
                .iter()
                .find(|option| option.trim().to_lowercase() == lowered)
        });

        match chosen {
            Some(option) => Ok(ValidationOutcome::valid(Value::String(option.clone()))),
            None => Ok(ValidationOutcome::invalid(format!(
                "Please choose one of: {}.",
                self.options.join(", ")
            ))),
        }
    }
}

/// Resolves a step's [`ValidatorKind`] to a validator instance
pub struct ValidatorRegistry {
    custom: DashMap<String, Arc<dyn Validator>>,
}

impl Default for ValidatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidatorRegistry {
    /// Registry with the built-in validators only
    pub fn new() -> Self {
        Self {
            custom: DashMap::new(),
        }
    }

    /// Register a named validator for `ValidatorKind::Custom`
    pub fn register(&self, name: impl Into<String>, validator: Arc<dyn Validator>) {
        self.custom.insert(name.into(), validator);
    }

    /// Resolve the validator for a step
    pub fn resolve(&self, kind: &ValidatorKind) -> Result<Arc<dyn Validator>, CoreError> {
        let validator: Arc<dyn Validator> = match kind {
            ValidatorKind::Text { min_len, max_len } => Arc::new(TextValidator {
                min_len: *min_len,
                max_len: *max_len,
            }),
            ValidatorKind::Number { min, max } => Arc::new(NumberValidator {
                min: *min,
                max: *max,
            }),
            ValidatorKind::Email => Arc::new(EmailValidator),
            ValidatorKind::Phone => Arc::new(PhoneValidator),
            ValidatorKind::Pattern { regex } => Arc::new(PatternValidator::new(regex)?),
            ValidatorKind::Choice { options } => {
                if options.is_empty() {
                    return Err(CoreError::Validation(
                        "Choice validator needs at least one option".to_string(),
                    ));
                }
                Arc::new(ChoiceValidator {
                    options: options.clone(),
                })
            }
            ValidatorKind::Custom { name } => self
                .custom
                .get(name)
                .map(|v| v.value().clone())
                .ok_or_else(|| {
                    CoreError::Validation(format!("No validator registered as '{}'", name))
                })?,
        };
        Ok(validator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SenderId, TenantId, WorkflowId};

    fn execution() -> Execution {
        Execution::new(
            WorkflowId("wf".to_string()),
            TenantId("acme".to_string()),
            SenderId("5511".to_string()),
        )
    }

    async fn check(kind: ValidatorKind, input: &str) -> ValidationOutcome {
        let registry = ValidatorRegistry::new();
        let validator = registry.resolve(&kind).unwrap();
        validator.validate(input, &execution(), 0).await.unwrap()
    }

    #[tokio::test]
    async fn test_text_bounds() {
        let kind = ValidatorKind::Text {
            min_len: Some(3),
            max_len: Some(5),
        };
        assert!(!check(kind.clone(), "  ").await.is_valid);
        assert!(!check(kind.clone(), "ab").await.is_valid);
        assert!(!check(kind.clone(), "abcdef").await.is_valid);

        let ok = check(kind, " abcd ").await;
        assert!(ok.is_valid);
        assert_eq!(ok.processed_data, Some(json!("abcd")));
    }

    #[tokio::test]
    async fn test_number() {
        let kind = ValidatorKind::Number {
            min: Some(1.0),
            max: Some(10.0),
        };
        let ok = check(kind.clone(), "7,5").await;
        assert!(ok.is_valid);
        assert_eq!(ok.processed_data, Some(json!(7.5)));

        assert!(!check(kind.clone(), "eleven").await.is_valid);
        assert!(!check(kind.clone(), "NaN").await.is_valid);
        let out_of_range = check(kind, "11").await;
        assert!(!out_of_range.is_valid);
        assert_eq!(
            out_of_range.error_message.as_deref(),
            Some("Please reply with a number between 1 and 10.")
        );
    }

    #[tokio::test]
    async fn test_email_and_phone() {
        let email = check(ValidatorKind::Email, " Ana@Example.COM ").await;
        assert!(email.is_valid);
        assert_eq!(email.processed_data, Some(json!("ana@example.com")));
        assert!(!check(ValidatorKind::Email, "ana@").await.is_valid);

        let phone = check(ValidatorKind::Phone, "+55 (11) 99999-0000").await;
        assert!(phone.is_valid);
        assert_eq!(phone.processed_data, Some(json!("5511999990000")));
        assert!(!check(ValidatorKind::Phone, "12ab34").await.is_valid);
        assert!(!check(ValidatorKind::Phone, "123").await.is_valid);
    }

    #[tokio::test]
    async fn test_pattern_is_anchored() {
        let kind = ValidatorKind::Pattern {
            regex: r"[A-Z]{3}-\d{4}".to_string(),
        };
        assert!(check(kind.clone(), "ABC-1234").await.is_valid);
        assert!(!check(kind, "xABC-1234").await.is_valid);

        let registry = ValidatorRegistry::new();
        let broken = ValidatorKind::Pattern {
            regex: "(".to_string(),
        };
        assert!(matches!(
            registry.resolve(&broken),
            Err(CoreError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_choice_by_name_or_index() {
        let kind = ValidatorKind::Choice {
            options: vec!["Yes".to_string(), "No".to_string()],
        };
        let by_name = check(kind.clone(), "yes").await;
        assert_eq!(by_name.processed_data, Some(json!("Yes")));
        let by_index = check(kind.clone(), "2").await;
        assert_eq!(by_index.processed_data, Some(json!("No")));
        assert!(!check(kind, "maybe").await.is_valid);
    }

    struct AlwaysValid;

    #[async_trait]
    impl Validator for AlwaysValid {
        fn kind(&self) -> &str {
            "always"
        }

        async fn validate(
            &self,
            input: &str,
            _execution: &Execution,
            _step_index: u32,
        ) -> Result<ValidationOutcome, CoreError> {
            Ok(ValidationOutcome::valid(json!(input)))
        }
    }

    #[tokio::test]
    async fn test_custom_registration() {
        let registry = ValidatorRegistry::new();
        let kind = ValidatorKind::Custom {
            name: "always".to_string(),
        };
        assert!(registry.resolve(&kind).is_err());

        registry.register("always", Arc::new(AlwaysValid));
        let validator = registry.resolve(&kind).unwrap();
        assert_eq!(validator.kind(), "always");
    }
}
