//! Scoring engine — ranks the lender catalogue for a complete parameter set.
//!
//! Two paths share one contract: the rule-based scorer (always available)
//! and the neural scorer (primary when enabled and its assets load). Any
//! neural failure falls back to rules for that request; the user never sees
//! the difference, and both paths emit the same deterministic explanations.
//!
//! Submodules:
//! - `catalogue`: the static lender set
//! - `rules`: reference scorer — eligibility checks, score blend, reasons
//! - `neural`: ONNX scorer with standardised feature vectors

pub mod catalogue;
pub mod neural;
pub mod rules;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::advisor::errors::AdvisorError;
use crate::advisor::types::LoanParameters;

pub use catalogue::{Lender, LenderCatalogue};
pub use neural::NeuralScorer;
pub use rules::Applicant;

/// Default number of matches a scoring run keeps.
pub const DEFAULT_TOP_K: usize = 5;

// ─── LenderMatch ────────────────────────────────────────────────────────────

/// One ranked (session, lender) result row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LenderMatch {
    pub lender_id: i64,
    pub lender_name: String,
    pub interest_rate: f64,
    pub eligibility_score: i64,
    pub affordability_score: i64,
    pub specialisation_score: i64,
    pub final_score: i64,
    pub confidence: i64,
    pub reasons: Vec<String>,
    pub warnings: Vec<String>,
    pub rank: u32,
}

// ─── ScoringEngine ──────────────────────────────────────────────────────────

/// Which scoring path produced a ranking. Logged, never surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringPath {
    RuleBased,
    Neural,
}

/// Process-wide scoring facade over the two paths.
pub struct ScoringEngine {
    catalogue: Arc<LenderCatalogue>,
    neural: Option<NeuralScorer>,
    currency: String,
}

impl ScoringEngine {
    /// Build the engine. The neural path is attempted iff the feature flag is
    /// on AND both assets load; otherwise it is silently disabled and the
    /// rule-based path serves every request.
    pub fn new(
        catalogue: Arc<LenderCatalogue>,
        neural_enabled: bool,
        model_path: &str,
        scaler_path: &str,
        currency: impl Into<String>,
    ) -> Self {
        let neural = if neural_enabled {
            match NeuralScorer::load(model_path, scaler_path) {
                Ok(scorer) => {
                    tracing::info!(model = %model_path, "neural scoring path enabled");
                    Some(scorer)
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        model = %model_path,
                        "neural assets unavailable — rule-based path only"
                    );
                    None
                }
            }
        } else {
            None
        };

        Self {
            catalogue,
            neural,
            currency: currency.into(),
        }
    }

    /// Engine with the rule-based path only (tests, neural disabled).
    pub fn rule_based(catalogue: Arc<LenderCatalogue>, currency: impl Into<String>) -> Self {
        Self {
            catalogue,
            neural: None,
            currency: currency.into(),
        }
    }

    pub fn catalogue(&self) -> &LenderCatalogue {
        &self.catalogue
    }

    /// Rank the catalogue for a complete parameter set.
    ///
    /// Errors only when the parameter set is incomplete; a neural failure is
    /// absorbed by falling back to the rule-based path for this request.
    pub fn score(
        &self,
        params: &LoanParameters,
        k: usize,
    ) -> Result<(Vec<LenderMatch>, ScoringPath), AdvisorError> {
        let applicant =
            Applicant::from_parameters(params).ok_or(AdvisorError::MatchingFailed {
                reason: "parameter set incomplete".into(),
            })?;

        if let Some(ref neural) = self.neural {
            match neural.score(&applicant, &self.catalogue, k, &self.currency) {
                Ok(matches) => return Ok((matches, ScoringPath::Neural)),
                Err(e) => {
                    tracing::warn!(error = %e, "neural inference failed — falling back to rules");
                }
            }
        }

        Ok((
            rules::score_all(&applicant, &self.catalogue, k, &self.currency),
            ScoringPath::RuleBased,
        ))
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advisor::types::{EmploymentStatus, LoanPurpose};

    fn complete_params() -> LoanParameters {
        LoanParameters {
            loan_amount: Some(2_000_000),
            annual_income: Some(1_500_000),
            employment_status: Some(EmploymentStatus::Salaried),
            credit_score: Some(760),
            loan_purpose: Some(LoanPurpose::Vehicle),
            ..Default::default()
        }
    }

    #[test]
    fn test_incomplete_params_rejected() {
        let engine = ScoringEngine::rule_based(
            Arc::new(LenderCatalogue::load_embedded().unwrap()),
            "₹",
        );
        let err = engine.score(&LoanParameters::default(), 5).unwrap_err();
        assert!(matches!(err, AdvisorError::MatchingFailed { .. }));
    }

    #[test]
    fn test_rule_based_path_when_neural_disabled() {
        let engine = ScoringEngine::rule_based(
            Arc::new(LenderCatalogue::load_embedded().unwrap()),
            "₹",
        );
        let (matches, path) = engine.score(&complete_params(), 5).unwrap();
        assert_eq!(path, ScoringPath::RuleBased);
        assert!(!matches.is_empty());
        assert!(matches.len() <= 5);
    }

    #[test]
    fn test_missing_neural_assets_fall_back_to_identical_rule_output() {
        let catalogue = Arc::new(LenderCatalogue::load_embedded().unwrap());
        // Flag on, assets missing: construction logs and disables the path.
        let engine = ScoringEngine::new(
            Arc::clone(&catalogue),
            true,
            "/nonexistent/model.onnx",
            "/nonexistent/scaler.json",
            "₹",
        );
        let reference = ScoringEngine::rule_based(catalogue, "₹");

        let (got, path) = engine.score(&complete_params(), 5).unwrap();
        let (expected, _) = reference.score(&complete_params(), 5).unwrap();
        assert_eq!(path, ScoringPath::RuleBased);
        let got_ids: Vec<i64> = got.iter().map(|m| m.lender_id).collect();
        let expected_ids: Vec<i64> = expected.iter().map(|m| m.lender_id).collect();
        assert_eq!(got_ids, expected_ids);
    }

    #[test]
    fn test_match_serialises_camel_case() {
        let m = LenderMatch {
            lender_id: 1,
            lender_name: "Test".into(),
            interest_rate: 8.5,
            eligibility_score: 100,
            affordability_score: 58,
            specialisation_score: 100,
            final_score: 85,
            confidence: 100,
            reasons: vec![],
            warnings: vec![],
            rank: 1,
        };
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["lenderId"], 1);
        assert_eq!(json["finalScore"], 85);
        assert_eq!(json["specialisationScore"], 100);
    }
}
