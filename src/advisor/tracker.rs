//! Parameter tracker — the per-session state machine over the five required
//! loan parameters.
//!
//! Every write validates the value against its field domain first; a value
//! that fails validation leaves tracker state completely unchanged. The
//! store persists value, tracking boolean, and derived completion percent in
//! one transaction, so readers never observe them out of step.

use std::sync::{Arc, Mutex};

use serde_json::Value;

use super::errors::AdvisorError;
use super::store::SessionStore;
use super::types::{
    EmploymentStatus, LoanParameters, LoanPurpose, ParameterField, ParameterTracking,
};

// ─── Domain Bounds ──────────────────────────────────────────────────────────

const LOAN_AMOUNT_MIN: i64 = 100_000;
const LOAN_AMOUNT_MAX: i64 = 100_000_000;
const ANNUAL_INCOME_MIN: i64 = 100_000;
const ANNUAL_INCOME_MAX: i64 = 50_000_000;
const CREDIT_SCORE_MIN: i64 = 300;
const CREDIT_SCORE_MAX: i64 = 850;

// ─── Validated Values ───────────────────────────────────────────────────────

/// A value that passed its field's domain check, ready to persist.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidatedValue {
    Int(i64),
    Float(f64),
    Employment(EmploymentStatus),
    Purpose(LoanPurpose),
}

/// Outcome of a successful `set`.
#[derive(Debug, Clone)]
pub struct SetOutcome {
    pub field: ParameterField,
    /// True when the write changed stored state (new field, or new value).
    pub changed: bool,
    pub tracking: ParameterTracking,
}

// ─── Normalisation ──────────────────────────────────────────────────────────

/// Interpret colloquial Indian magnitudes: a raw value ≤ 10 is crores, a
/// value in (10, 1000] is lakhs, anything larger is already INR. The result
/// must still pass the field's bounds or the write is rejected.
pub fn normalise_monetary(raw: f64) -> i64 {
    let inr = if raw <= 10.0 {
        raw * 10_000_000.0
    } else if raw <= 1000.0 {
        raw * 100_000.0
    } else {
        raw
    };
    inr.round() as i64
}

/// Pull a numeric magnitude out of a JSON value. Strings tolerate currency
/// symbols, commas, and surrounding whitespace.
fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned: String = s
                .trim()
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                .collect();
            if cleaned.is_empty() {
                None
            } else {
                cleaned.parse().ok()
            }
        }
        _ => None,
    }
}

fn coerce_string(value: &Value) -> Option<String> {
    value.as_str().map(|s| s.trim().to_lowercase())
}

// ─── Validation ─────────────────────────────────────────────────────────────

fn invalid(field: ParameterField, reason: impl Into<String>) -> AdvisorError {
    AdvisorError::Validation {
        field: field.as_str().to_string(),
        reason: reason.into(),
    }
}

/// Validate a raw JSON value against a field's domain. Monetary fields are
/// normalised before the bounds check.
pub fn validate(field: ParameterField, value: &Value) -> Result<ValidatedValue, AdvisorError> {
    match field {
        ParameterField::LoanAmount => {
            let raw = coerce_number(value).ok_or_else(|| invalid(field, "expected a number"))?;
            let amount = normalise_monetary(raw);
            if !(LOAN_AMOUNT_MIN..=LOAN_AMOUNT_MAX).contains(&amount) {
                return Err(invalid(
                    field,
                    format!("must be within [{LOAN_AMOUNT_MIN}, {LOAN_AMOUNT_MAX}] INR"),
                ));
            }
            Ok(ValidatedValue::Int(amount))
        }
        ParameterField::AnnualIncome => {
            let raw = coerce_number(value).ok_or_else(|| invalid(field, "expected a number"))?;
            let income = normalise_monetary(raw);
            if !(ANNUAL_INCOME_MIN..=ANNUAL_INCOME_MAX).contains(&income) {
                return Err(invalid(
                    field,
                    format!("must be within [{ANNUAL_INCOME_MIN}, {ANNUAL_INCOME_MAX}] INR"),
                ));
            }
            Ok(ValidatedValue::Int(income))
        }
        ParameterField::CreditScore => {
            let raw = coerce_number(value).ok_or_else(|| invalid(field, "expected a number"))?;
            if raw.fract() != 0.0 {
                return Err(invalid(field, "must be a whole number"));
            }
            let score = raw as i64;
            if !(CREDIT_SCORE_MIN..=CREDIT_SCORE_MAX).contains(&score) {
                return Err(invalid(
                    field,
                    format!("must be within [{CREDIT_SCORE_MIN}, {CREDIT_SCORE_MAX}]"),
                ));
            }
            Ok(ValidatedValue::Int(score))
        }
        ParameterField::EmploymentStatus => {
            let raw = coerce_string(value).ok_or_else(|| invalid(field, "expected a string"))?;
            EmploymentStatus::parse(&raw)
                .map(ValidatedValue::Employment)
                .ok_or_else(|| invalid(field, format!("unknown employment status '{raw}'")))
        }
        ParameterField::LoanPurpose => {
            let raw = coerce_string(value).ok_or_else(|| invalid(field, "expected a string"))?;
            LoanPurpose::parse(&raw)
                .map(ValidatedValue::Purpose)
                .ok_or_else(|| invalid(field, format!("unknown loan purpose '{raw}'")))
        }
        ParameterField::DebtToIncomeRatio => {
            let ratio = coerce_number(value).ok_or_else(|| invalid(field, "expected a number"))?;
            if !(0.0..=1.0).contains(&ratio) {
                return Err(invalid(field, "must be within [0, 1]"));
            }
            Ok(ValidatedValue::Float(ratio))
        }
        ParameterField::EmploymentDuration => {
            let raw = coerce_number(value).ok_or_else(|| invalid(field, "expected a number"))?;
            if raw.fract() != 0.0 || raw < 0.0 {
                return Err(invalid(field, "must be a non-negative whole number of months"));
            }
            Ok(ValidatedValue::Int(raw as i64))
        }
    }
}

// ─── ParameterTracker ───────────────────────────────────────────────────────

/// Per-session parameter state machine over the shared store.
pub struct ParameterTracker {
    store: Arc<Mutex<SessionStore>>,
}

impl ParameterTracker {
    pub fn new(store: Arc<Mutex<SessionStore>>) -> Self {
        Self { store }
    }

    /// Validate and persist one parameter. Idempotent: setting the same
    /// value yields the same state; overwriting with a new validated value
    /// is allowed and the newest value wins.
    pub fn set(
        &self,
        session_id: &str,
        field: ParameterField,
        value: &Value,
    ) -> Result<SetOutcome, AdvisorError> {
        let validated = validate(field, value)?;

        let store = lock_store(&self.store)?;
        let current = store.get_parameters(session_id)?;
        let changed = !already_holds(&current, field, &validated);

        let tracking = match &validated {
            ValidatedValue::Int(v) => store.write_parameter(session_id, field, v)?,
            ValidatedValue::Float(v) => store.write_parameter(session_id, field, v)?,
            ValidatedValue::Employment(v) => {
                store.write_parameter(session_id, field, &v.as_str())?
            }
            ValidatedValue::Purpose(v) => store.write_parameter(session_id, field, &v.as_str())?,
        };

        Ok(SetOutcome {
            field,
            changed,
            tracking,
        })
    }

    /// Current parameters and tracking for a session.
    pub fn get(
        &self,
        session_id: &str,
    ) -> Result<(LoanParameters, ParameterTracking), AdvisorError> {
        let store = lock_store(&self.store)?;
        Ok((
            store.get_parameters(session_id)?,
            store.get_tracking(session_id)?,
        ))
    }

    /// Missing required fields, in the fixed priority order.
    pub fn missing(&self, session_id: &str) -> Result<Vec<ParameterField>, AdvisorError> {
        let (_, tracking) = self.get(session_id)?;
        Ok(missing_from(&tracking))
    }

    pub fn is_complete(&self, session_id: &str) -> Result<bool, AdvisorError> {
        let (_, tracking) = self.get(session_id)?;
        Ok(tracking.is_complete())
    }
}

/// Lock the shared store, surfacing poisoning as an internal error.
pub(crate) fn lock_store(
    store: &Mutex<SessionStore>,
) -> Result<std::sync::MutexGuard<'_, SessionStore>, AdvisorError> {
    store.lock().map_err(|_| AdvisorError::Internal {
        reason: "session store lock poisoned".into(),
    })
}

/// Missing required fields for a tracking row, in priority order.
pub fn missing_from(tracking: &ParameterTracking) -> Vec<ParameterField> {
    ParameterField::REQUIRED
        .iter()
        .copied()
        .filter(|f| !tracking.is_collected(*f))
        .collect()
}

/// Whether the stored parameters already hold this exact value.
fn already_holds(params: &LoanParameters, field: ParameterField, value: &ValidatedValue) -> bool {
    match (field, value) {
        (ParameterField::LoanAmount, ValidatedValue::Int(v)) => params.loan_amount == Some(*v),
        (ParameterField::AnnualIncome, ValidatedValue::Int(v)) => {
            params.annual_income == Some(*v)
        }
        (ParameterField::CreditScore, ValidatedValue::Int(v)) => params.credit_score == Some(*v),
        (ParameterField::EmploymentStatus, ValidatedValue::Employment(v)) => {
            params.employment_status == Some(*v)
        }
        (ParameterField::LoanPurpose, ValidatedValue::Purpose(v)) => {
            params.loan_purpose == Some(*v)
        }
        (ParameterField::DebtToIncomeRatio, ValidatedValue::Float(v)) => {
            params.debt_to_income_ratio == Some(*v)
        }
        (ParameterField::EmploymentDuration, ValidatedValue::Int(v)) => {
            params.employment_duration == Some(*v)
        }
        _ => false,
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tracker_with_session() -> (ParameterTracker, String) {
        let store = Arc::new(Mutex::new(SessionStore::open(":memory:").unwrap()));
        let session = store.lock().unwrap().open_session(None, None).unwrap();
        (ParameterTracker::new(store), session.id)
    }

    #[test]
    fn test_normalise_crores() {
        assert_eq!(normalise_monetary(2.0), 20_000_000);
        assert_eq!(normalise_monetary(0.5), 5_000_000);
    }

    #[test]
    fn test_normalise_lakhs() {
        assert_eq!(normalise_monetary(15.0), 1_500_000);
        assert_eq!(normalise_monetary(500.0), 50_000_000);
    }

    #[test]
    fn test_normalise_plain_inr_passthrough() {
        assert_eq!(normalise_monetary(2_000_000.0), 2_000_000);
        assert_eq!(normalise_monetary(100_000.0), 100_000);
    }

    #[test]
    fn test_validate_loan_amount_bounds() {
        assert!(validate(ParameterField::LoanAmount, &json!(2_000_000)).is_ok());
        // 50,000 is above the lakh band, stays as-is, and is below the floor.
        assert!(validate(ParameterField::LoanAmount, &json!(50_000)).is_err());
        assert!(validate(ParameterField::LoanAmount, &json!(200_000_000)).is_err());
    }

    #[test]
    fn test_validate_amount_from_string_with_symbols() {
        let v = validate(ParameterField::LoanAmount, &json!("₹20,00,000")).unwrap();
        assert_eq!(v, ValidatedValue::Int(2_000_000));
    }

    #[test]
    fn test_validate_credit_score() {
        assert!(validate(ParameterField::CreditScore, &json!(760)).is_ok());
        assert!(validate(ParameterField::CreditScore, &json!(950)).is_err());
        assert!(validate(ParameterField::CreditScore, &json!(299)).is_err());
        assert!(validate(ParameterField::CreditScore, &json!(700.5)).is_err());
    }

    #[test]
    fn test_validate_enums_strict() {
        assert!(validate(ParameterField::EmploymentStatus, &json!("salaried")).is_ok());
        assert!(validate(ParameterField::EmploymentStatus, &json!("SALARIED")).is_ok());
        assert!(validate(ParameterField::EmploymentStatus, &json!("astronaut")).is_err());
        assert!(validate(ParameterField::LoanPurpose, &json!("gold-backed")).is_ok());
        assert!(validate(ParameterField::LoanPurpose, &json!("boat")).is_err());
    }

    #[test]
    fn test_validate_optionals() {
        assert!(validate(ParameterField::DebtToIncomeRatio, &json!(0.35)).is_ok());
        assert!(validate(ParameterField::DebtToIncomeRatio, &json!(1.2)).is_err());
        assert!(validate(ParameterField::EmploymentDuration, &json!(36)).is_ok());
        assert!(validate(ParameterField::EmploymentDuration, &json!(-3)).is_err());
    }

    #[test]
    fn test_set_persists_and_updates_tracking() {
        let (tracker, session) = tracker_with_session();

        let outcome = tracker
            .set(&session, ParameterField::LoanAmount, &json!(2_000_000))
            .unwrap();
        assert!(outcome.changed);
        assert_eq!(outcome.tracking.completion_percent, 20);

        let (params, tracking) = tracker.get(&session).unwrap();
        assert_eq!(params.loan_amount, Some(2_000_000));
        assert!(tracking.loan_amount_collected);
    }

    #[test]
    fn test_set_is_idempotent() {
        let (tracker, session) = tracker_with_session();

        let first = tracker
            .set(&session, ParameterField::CreditScore, &json!(760))
            .unwrap();
        let second = tracker
            .set(&session, ParameterField::CreditScore, &json!(760))
            .unwrap();

        assert!(first.changed);
        assert!(!second.changed);
        assert_eq!(first.tracking, second.tracking);
    }

    #[test]
    fn test_overwrite_newest_value_wins() {
        let (tracker, session) = tracker_with_session();

        tracker
            .set(&session, ParameterField::LoanAmount, &json!(500_000))
            .unwrap();
        let outcome = tracker
            .set(&session, ParameterField::LoanAmount, &json!(800_000))
            .unwrap();

        assert!(outcome.changed);
        let (params, tracking) = tracker.get(&session).unwrap();
        assert_eq!(params.loan_amount, Some(800_000));
        assert_eq!(tracking.completion_percent, 20);
    }

    #[test]
    fn test_invalid_value_leaves_state_unchanged() {
        let (tracker, session) = tracker_with_session();
        tracker
            .set(&session, ParameterField::CreditScore, &json!(700))
            .unwrap();

        let before = tracker.get(&session).unwrap();
        let err = tracker
            .set(&session, ParameterField::CreditScore, &json!(950))
            .unwrap_err();
        assert!(matches!(err, AdvisorError::Validation { ref field, .. } if field == "creditScore"));

        let after = tracker.get(&session).unwrap();
        assert_eq!(before.0, after.0);
        assert_eq!(before.1, after.1);
    }

    #[test]
    fn test_missing_follows_priority_order() {
        let (tracker, session) = tracker_with_session();

        tracker
            .set(&session, ParameterField::LoanAmount, &json!(500_000))
            .unwrap();
        tracker
            .set(&session, ParameterField::LoanPurpose, &json!("education"))
            .unwrap();

        let missing = tracker.missing(&session).unwrap();
        assert_eq!(
            missing,
            vec![
                ParameterField::AnnualIncome,
                ParameterField::EmploymentStatus,
                ParameterField::CreditScore,
            ]
        );
    }

    #[test]
    fn test_completion_percent_values() {
        let (tracker, session) = tracker_with_session();
        let steps: [(ParameterField, Value); 5] = [
            (ParameterField::LoanAmount, json!(2_000_000)),
            (ParameterField::AnnualIncome, json!(1_500_000)),
            (ParameterField::EmploymentStatus, json!("salaried")),
            (ParameterField::CreditScore, json!(760)),
            (ParameterField::LoanPurpose, json!("vehicle")),
        ];

        let mut expected = 0u8;
        for (field, value) in steps {
            let outcome = tracker.set(&session, field, &value).unwrap();
            expected += 20;
            assert_eq!(outcome.tracking.completion_percent, expected);
        }
        assert!(tracker.is_complete(&session).unwrap());
    }

    #[test]
    fn test_unknown_session_is_not_found() {
        let (tracker, _) = tracker_with_session();
        let err = tracker
            .set("missing", ParameterField::LoanAmount, &json!(500_000))
            .unwrap_err();
        assert!(matches!(err, AdvisorError::SessionNotFound { .. }));
    }
}
