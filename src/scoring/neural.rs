//! Neural lender scorer — ONNX inference over standardised feature vectors.
//!
//! The scorer loads two artefacts at boot: a JSON standardisation descriptor
//! (ordered feature names, per-feature mean and standard deviation) and the
//! model graph. Per lender it derives a 10-dimensional feature vector,
//! standardises it, and reads a match probability from the model. Reasons
//! and warnings come from the same deterministic rule set as the reference
//! scorer so explanations are identical across paths.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tract_onnx::prelude::*;

use super::catalogue::{Lender, LenderCatalogue};
use super::rules::{
    self, Applicant, EligibilityChecks,
};
use super::LenderMatch;

/// Fixed feature vector width.
const FEATURE_COUNT: usize = 10;

/// Presentation factors: the component scores shown next to a neural final
/// score are synthesised from it for parity with the rule-based path.
const ELIGIBILITY_FACTOR: f64 = 0.8;
const AFFORDABILITY_FACTOR: f64 = 0.75;
const SPECIALISATION_FACTOR: f64 = 0.65;

type OnnxPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

// ─── Scaler Descriptor ──────────────────────────────────────────────────────

/// The standardisation descriptor stored alongside the model.
#[derive(Debug, Clone, Deserialize)]
pub struct ScalerSpec {
    pub feature_names: Vec<String>,
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
    pub input_size: usize,
}

impl ScalerSpec {
    /// Parse and validate a descriptor document.
    pub fn from_json(raw: &str) -> Result<Self> {
        let spec: ScalerSpec = serde_json::from_str(raw).context("malformed scaler JSON")?;
        if spec.input_size != FEATURE_COUNT {
            bail!(
                "scaler input_size {} does not match expected {FEATURE_COUNT}",
                spec.input_size
            );
        }
        if spec.mean.len() != spec.input_size
            || spec.std.len() != spec.input_size
            || spec.feature_names.len() != spec.input_size
        {
            bail!("scaler vectors do not match input_size {}", spec.input_size);
        }
        Ok(spec)
    }

    /// Standardise a raw feature vector in place.
    pub fn standardise(&self, features: &mut [f64]) {
        for (i, value) in features.iter_mut().enumerate() {
            let std = if self.std[i].abs() < f64::EPSILON {
                1.0
            } else {
                self.std[i]
            };
            *value = (*value - self.mean[i]) / std;
        }
    }
}

// ─── Feature Derivation ─────────────────────────────────────────────────────

/// Derive the 10-feature vector for one (applicant, lender) pair:
/// four normalised magnitudes, three binary compatibilities, three ratios.
pub fn feature_vector(applicant: &Applicant, lender: &Lender) -> [f64; FEATURE_COUNT] {
    let monthly_income = applicant.monthly_income() as f64;

    let employment_match = if lender.accepts_employment(applicant.employment_status) {
        1.0
    } else {
        0.0
    };
    let purpose_match = if lender.loan_purpose.is_none()
        || lender.loan_purpose == Some(applicant.loan_purpose)
    {
        1.0
    } else {
        0.0
    };
    let special_match = if rules::special_eligibility_applies(applicant, lender) {
        1.0
    } else {
        0.0
    };

    // Ratio guards: a lender with no minimum contributes a neutral 1.0.
    let income_multiple = if lender.min_income > 0 {
        monthly_income / lender.min_income as f64
    } else {
        1.0
    };

    [
        applicant.loan_amount as f64 / 1_000_000.0,
        applicant.annual_income as f64 / 500_000.0,
        applicant.credit_score as f64 / 850.0,
        lender.interest_rate / 20.0,
        employment_match,
        purpose_match,
        special_match,
        applicant.loan_amount as f64 / lender.max_loan_amount as f64,
        income_multiple,
        (applicant.credit_score - lender.min_credit_score) as f64 / 550.0,
    ]
}

// ─── NeuralScorer ───────────────────────────────────────────────────────────

/// Shared, inference-thread-safe ONNX scorer. Init-once at boot.
pub struct NeuralScorer {
    plan: OnnxPlan,
    scaler: ScalerSpec,
}

impl NeuralScorer {
    /// Load the model graph and scaler descriptor. Either missing or
    /// malformed asset fails the load — the engine then runs rules only.
    pub fn load(model_path: &str, scaler_path: &str) -> Result<Self> {
        let scaler_raw = std::fs::read_to_string(scaler_path)
            .with_context(|| format!("reading scaler descriptor {scaler_path}"))?;
        let scaler = ScalerSpec::from_json(&scaler_raw)?;

        let plan = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("reading model graph {model_path}"))?
            .into_optimized()
            .context("optimising model graph")?
            .into_runnable()
            .context("building runnable plan")?;

        Ok(Self { plan, scaler })
    }

    /// Probability in [0, 1] that this lender is a good match.
    fn probability(&self, applicant: &Applicant, lender: &Lender) -> Result<f64> {
        let mut features = feature_vector(applicant, lender);
        self.scaler.standardise(&mut features);

        let input: Tensor = tract_ndarray::Array2::from_shape_vec(
            (1, FEATURE_COUNT),
            features.iter().map(|v| *v as f32).collect(),
        )
        .context("building input tensor")?
        .into();

        let outputs = self
            .plan
            .run(tvec!(input.into()))
            .context("model inference")?;
        let view = outputs[0]
            .to_array_view::<f32>()
            .context("reading model output")?;
        let prob = view
            .iter()
            .next()
            .copied()
            .context("model produced no output values")?;

        Ok(f64::from(prob).clamp(0.0, 1.0))
    }

    /// Rank the catalogue by model probability, keeping the top `k`.
    ///
    /// Explanations come from the deterministic rule set; the component
    /// scores shown next to the final score are synthesised by fixed factors.
    pub fn score(
        &self,
        applicant: &Applicant,
        catalogue: &LenderCatalogue,
        k: usize,
        currency: &str,
    ) -> Result<Vec<LenderMatch>> {
        let mut matches = Vec::new();

        for lender in catalogue.list() {
            let probability = self.probability(applicant, lender)?;
            let final_score = (probability * 100.0).round() as i64;
            if final_score == 0 {
                continue;
            }

            let checks = EligibilityChecks::evaluate(applicant, lender);
            let affordability = rules::affordability_score(lender);

            matches.push(LenderMatch {
                lender_id: lender.id,
                lender_name: lender.name.clone(),
                interest_rate: lender.interest_rate,
                eligibility_score: ((final_score as f64) * ELIGIBILITY_FACTOR).round() as i64,
                affordability_score: ((final_score as f64) * AFFORDABILITY_FACTOR).round()
                    as i64,
                specialisation_score: ((final_score as f64) * SPECIALISATION_FACTOR).round()
                    as i64,
                final_score,
                confidence: rules::confidence_score(applicant, checks.score()),
                reasons: rules::build_reasons(
                    applicant,
                    lender,
                    &checks,
                    affordability,
                    currency,
                ),
                warnings: rules::build_warnings(applicant, lender, currency),
                rank: 0,
            });
        }

        matches.sort_by(|a, b| {
            b.final_score
                .cmp(&a.final_score)
                .then(a.lender_id.cmp(&b.lender_id))
        });
        matches.truncate(k);
        for (i, m) in matches.iter_mut().enumerate() {
            m.rank = (i + 1) as u32;
        }
        Ok(matches)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
