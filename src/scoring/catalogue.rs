//! Lender catalogue — the static set of lenders matches are ranked over.
//!
//! Loaded once at startup from the embedded YAML seed (or a configured
//! override file) and shared process-wide. No mutation path exists after
//! boot.

use serde::{Deserialize, Serialize};

use crate::advisor::types::{EmploymentStatus, LoanPurpose};

/// Sentinel in `employment_types` meaning every category is accepted.
const ANY_EMPLOYMENT: &str = "any";

/// Seed file embedded in the binary. `LENDER_SEED_PATH` overrides it.
const EMBEDDED_SEED: &str = include_str!("lenders.yaml");

// ─── Types ──────────────────────────────────────────────────────────────────

/// A single lender record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lender {
    pub id: i64,
    pub name: String,
    /// Annual interest rate, percent.
    pub interest_rate: f64,
    pub min_loan_amount: i64,
    pub max_loan_amount: i64,
    /// Minimum monthly income, INR.
    pub min_income: i64,
    pub min_credit_score: i64,
    /// Accepted employment categories; `"any"` accepts everything.
    pub employment_types: Vec<String>,
    /// Purpose this lender specialises in, if any.
    #[serde(default)]
    pub loan_purpose: Option<LoanPurpose>,
    /// Eligibility tag feeding the specialisation bonus table.
    #[serde(default)]
    pub special_eligibility: Option<String>,
    pub processing_time_days: u32,
    #[serde(default)]
    pub features: Vec<String>,
}

impl Lender {
    /// Whether this lender accepts the given employment category.
    pub fn accepts_employment(&self, status: EmploymentStatus) -> bool {
        self.employment_types
            .iter()
            .any(|t| t == ANY_EMPLOYMENT || t == status.as_str())
    }

    /// Whether any feature tag contains `marker`.
    pub fn has_feature(&self, marker: &str) -> bool {
        self.features.iter().any(|f| f.contains(marker))
    }
}

#[derive(Debug, Deserialize)]
struct SeedFile {
    lenders: Vec<Lender>,
}

/// The read-only lender set.
#[derive(Debug)]
pub struct LenderCatalogue {
    lenders: Vec<Lender>,
}

impl LenderCatalogue {
    /// Load the embedded seed.
    pub fn load_embedded() -> Result<Self, serde_yaml::Error> {
        Self::from_yaml(EMBEDDED_SEED)
    }

    /// Load a seed file from disk (config override).
    pub fn load_from_path(path: &str) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(Self::from_yaml(&raw)?)
    }

    fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        let seed: SeedFile = serde_yaml::from_str(raw)?;
        Ok(Self {
            lenders: seed.lenders,
        })
    }

    pub fn list(&self) -> &[Lender] {
        &self.lenders
    }

    pub fn by_id(&self, id: i64) -> Option<&Lender> {
        self.lenders.iter().find(|l| l.id == id)
    }

    pub fn len(&self) -> usize {
        self.lenders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lenders.is_empty()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_seed_loads() {
        let catalogue = LenderCatalogue::load_embedded().unwrap();
        assert!(catalogue.len() >= 10, "seed should carry a full catalogue");
    }

    #[test]
    fn test_by_id() {
        let catalogue = LenderCatalogue::load_embedded().unwrap();
        let lender = catalogue.by_id(2).unwrap();
        assert_eq!(lender.loan_purpose, Some(LoanPurpose::Vehicle));
        assert!(catalogue.by_id(99_999).is_none());
    }

    #[test]
    fn test_any_employment_sentinel() {
        let catalogue = LenderCatalogue::load_embedded().unwrap();
        let any_lender = catalogue
            .list()
            .iter()
            .find(|l| l.employment_types.iter().any(|t| t == "any"))
            .unwrap();
        assert!(any_lender.accepts_employment(EmploymentStatus::Unemployed));

        let salaried_only = catalogue.by_id(10).unwrap();
        assert!(salaried_only.accepts_employment(EmploymentStatus::Salaried));
        assert!(!salaried_only.accepts_employment(EmploymentStatus::Student));
    }

    #[test]
    fn test_feature_marker_lookup() {
        let catalogue = LenderCatalogue::load_embedded().unwrap();
        let premium = catalogue.by_id(1).unwrap();
        assert!(premium.has_feature("premium"));
        assert!(premium.has_feature("large"));
        assert!(!premium.has_feature("instant"));
    }

    #[test]
    fn test_seed_rows_are_internally_consistent() {
        let catalogue = LenderCatalogue::load_embedded().unwrap();
        for lender in catalogue.list() {
            assert!(
                lender.min_loan_amount < lender.max_loan_amount,
                "lender {} has inverted loan range",
                lender.id
            );
            assert!(lender.interest_rate > 0.0);
            assert!(!lender.employment_types.is_empty());
        }
    }
}
