//! Rule-based lender scorer — the reference scoring path, always available.
//!
//! Five boolean eligibility checks gate each lender; affordability inverts
//! the interest rate over the documented catalogue range; specialisation
//! rewards purpose and eligibility-tag matches. Reasons and warnings are
//! generated deterministically from which checks passed and which score
//! ranges were hit, so two runs over the same inputs produce identical
//! rankings and identical explanation text.

use crate::advisor::types::{EmploymentStatus, LoanParameters, LoanPurpose};

use super::catalogue::{Lender, LenderCatalogue};
use super::LenderMatch;

// ─── Constants ──────────────────────────────────────────────────────────────

/// Documented reference bounds for the affordability inversion.
const MIN_RATE: f64 = 2.99;
const MAX_RATE: f64 = 15.99;

/// Weights for the final blend.
const W_ELIGIBILITY: f64 = 0.40;
const W_AFFORDABILITY: f64 = 0.35;
const W_SPECIALISATION: f64 = 0.25;

/// Minimum passed checks for a lender to stay in the ranking.
const MIN_CHECKS_PASSED: u8 = 4;

// ─── Applicant ──────────────────────────────────────────────────────────────

/// A fully-collected parameter set, as the scorer consumes it.
#[derive(Debug, Clone, Copy)]
pub struct Applicant {
    pub loan_amount: i64,
    pub annual_income: i64,
    pub employment_status: EmploymentStatus,
    pub credit_score: i64,
    pub loan_purpose: LoanPurpose,
    pub debt_to_income_ratio: Option<f64>,
    pub employment_duration: Option<i64>,
}

impl Applicant {
    /// Build from collected parameters; `None` while any required field is
    /// still missing.
    pub fn from_parameters(params: &LoanParameters) -> Option<Self> {
        Some(Self {
            loan_amount: params.loan_amount?,
            annual_income: params.annual_income?,
            employment_status: params.employment_status?,
            credit_score: params.credit_score?,
            loan_purpose: params.loan_purpose?,
            debt_to_income_ratio: params.debt_to_income_ratio,
            employment_duration: params.employment_duration,
        })
    }

    pub fn monthly_income(&self) -> i64 {
        self.annual_income / 12
    }
}

// ─── Eligibility ────────────────────────────────────────────────────────────

/// The five boolean eligibility checks for one (applicant, lender) pair.
#[derive(Debug, Clone, Copy)]
pub struct EligibilityChecks {
    pub amount_in_range: bool,
    pub income_sufficient: bool,
    pub credit_sufficient: bool,
    pub employment_accepted: bool,
    pub purpose_compatible: bool,
}

impl EligibilityChecks {
    pub fn evaluate(applicant: &Applicant, lender: &Lender) -> Self {
        Self {
            amount_in_range: applicant.loan_amount >= lender.min_loan_amount
                && applicant.loan_amount <= lender.max_loan_amount,
            income_sufficient: applicant.monthly_income() >= lender.min_income,
            credit_sufficient: applicant.credit_score >= lender.min_credit_score,
            employment_accepted: lender.accepts_employment(applicant.employment_status),
            purpose_compatible: lender.loan_purpose.is_none()
                || lender.loan_purpose == Some(applicant.loan_purpose),
        }
    }

    pub fn passed_count(&self) -> u8 {
        [
            self.amount_in_range,
            self.income_sufficient,
            self.credit_sufficient,
            self.employment_accepted,
            self.purpose_compatible,
        ]
        .iter()
        .filter(|b| **b)
        .count() as u8
    }

    pub fn score(&self) -> i64 {
        100 * self.passed_count() as i64 / 5
    }
}

// ─── Score Components ───────────────────────────────────────────────────────

/// Interest rate linearly inverted over the documented range, clamped.
pub fn affordability_score(lender: &Lender) -> i64 {
    let score = (MAX_RATE - lender.interest_rate) / (MAX_RATE - MIN_RATE) * 100.0;
    score.clamp(0.0, 100.0).round() as i64
}

/// Whether the lender's special-eligibility tag applies to this applicant.
pub fn special_eligibility_applies(applicant: &Applicant, lender: &Lender) -> bool {
    let Some(ref tag) = lender.special_eligibility else {
        return false;
    };
    if tag.contains("high-income") {
        return applicant.annual_income >= 100_000;
    }
    if tag.contains("student") {
        return applicant.loan_purpose == LoanPurpose::Education;
    }
    if tag.contains("business") {
        return applicant.employment_status == EmploymentStatus::SelfEmployed;
    }
    if tag.contains("startup") {
        return applicant.loan_purpose == LoanPurpose::Startup;
    }
    if tag.contains("eco") {
        return applicant.loan_purpose == LoanPurpose::Eco;
    }
    if tag.contains("luxury") {
        return applicant.loan_purpose == LoanPurpose::Vehicle
            && applicant.loan_amount >= 50_000;
    }
    // veteran/military tags carry no user-side signal in this model.
    false
}

/// Specialisation score: purpose alignment, eligibility tags, feature bonuses.
pub fn specialisation_score(applicant: &Applicant, lender: &Lender) -> i64 {
    let mut score: i64 = 50;

    match lender.loan_purpose {
        Some(purpose) if purpose == applicant.loan_purpose => score = 100,
        Some(_) => score = 20,
        None => {}
    }

    if special_eligibility_applies(applicant, lender) {
        score += 30;
    }
    if applicant.credit_score >= 750 && lender.has_feature("premium") {
        score += 20;
    }
    if applicant.loan_amount >= 100_000 && lender.has_feature("large") {
        score += 15;
    }

    score.clamp(0, 100)
}

/// Confidence: eligibility adjusted by the optional profile signals.
pub fn confidence_score(applicant: &Applicant, eligibility: i64) -> i64 {
    let mut confidence = eligibility as f64;
    if applicant.debt_to_income_ratio.is_some_and(|dti| dti < 0.4) {
        confidence += 10.0;
    }
    if applicant.employment_duration.is_some_and(|months| months >= 24) {
        confidence += 5.0;
    }
    if eligibility < 90 {
        confidence *= 0.9;
    }
    confidence.clamp(0.0, 100.0).round() as i64
}

// ─── Explanation Text ───────────────────────────────────────────────────────

/// Format an INR amount with Indian digit grouping (…,XX,XX,000).
pub fn format_amount(currency: &str, amount: i64) -> String {
    let digits = amount.abs().to_string();
    let grouped = if digits.len() <= 3 {
        digits
    } else {
        let (head, tail) = digits.split_at(digits.len() - 3);
        let mut parts: Vec<String> = Vec::new();
        let head_bytes = head.as_bytes();
        let mut i = head_bytes.len();
        while i > 2 {
            parts.push(String::from_utf8_lossy(&head_bytes[i - 2..i]).into_owned());
            i -= 2;
        }
        parts.push(String::from_utf8_lossy(&head_bytes[..i]).into_owned());
        parts.reverse();
        format!("{},{}", parts.join(","), tail)
    };
    let sign = if amount < 0 { "-" } else { "" };
    format!("{sign}{currency}{grouped}")
}

/// Deterministic reasons for one scored lender. Shared with the neural path
/// so explanations stay consistent regardless of which scorer ran.
pub fn build_reasons(
    applicant: &Applicant,
    lender: &Lender,
    checks: &EligibilityChecks,
    affordability: i64,
    currency: &str,
) -> Vec<String> {
    let mut reasons = Vec::new();

    if checks.passed_count() == 5 {
        reasons.push("meets all eligibility criteria".to_string());
    }
    if affordability >= 80 {
        reasons.push(format!(
            "competitive interest rate of {}%",
            lender.interest_rate
        ));
    } else if affordability >= 50 {
        reasons.push(format!(
            "moderate interest rate of {}%",
            lender.interest_rate
        ));
    }
    if lender.loan_purpose == Some(applicant.loan_purpose) {
        reasons.push(format!("specialises in {} loans", applicant.loan_purpose));
    }
    if checks.credit_sufficient && applicant.credit_score >= lender.min_credit_score + 100 {
        reasons.push(format!(
            "credit score of {} comfortably clears the {} minimum",
            applicant.credit_score, lender.min_credit_score
        ));
    }
    if checks.income_sufficient
        && lender.min_income > 0
        && applicant.monthly_income() >= 2 * lender.min_income
    {
        reasons.push(format!(
            "income well above the required {} per month",
            format_amount(currency, lender.min_income)
        ));
    }
    if special_eligibility_applies(applicant, lender) {
        if let Some(ref tag) = lender.special_eligibility {
            reasons.push(format!("qualifies for {tag} eligibility benefits"));
        }
    }
    if lender.processing_time_days <= 3 {
        reasons.push(format!(
            "fast processing in {} days",
            lender.processing_time_days
        ));
    }

    reasons
}

/// Borderline-case warnings.
pub fn build_warnings(applicant: &Applicant, lender: &Lender, currency: &str) -> Vec<String> {
    let mut warnings = Vec::new();

    if applicant.loan_amount as f64 > 0.9 * lender.max_loan_amount as f64 {
        warnings.push(format!(
            "requested amount is close to the lender's {} maximum",
            format_amount(currency, lender.max_loan_amount)
        ));
    }

    let monthly = applicant.monthly_income() as f64;
    let min_income = lender.min_income as f64;
    if min_income > 0.0 && monthly >= min_income && monthly < 1.5 * min_income {
        warnings.push("income is close to the lender's minimum requirement".to_string());
    }

    let credit_margin = applicant.credit_score - lender.min_credit_score;
    if (0..50).contains(&credit_margin) {
        warnings.push("credit score is close to the lender's minimum".to_string());
    }

    warnings
}

// ─── Scoring ────────────────────────────────────────────────────────────────

/// Score one lender. Returns `None` when fewer than four checks pass — the
/// lender is assigned final score 0 and excluded from the ranking.
pub fn score_lender(applicant: &Applicant, lender: &Lender, currency: &str) -> Option<LenderMatch> {
    let checks = EligibilityChecks::evaluate(applicant, lender);
    if checks.passed_count() < MIN_CHECKS_PASSED {
        return None;
    }

    let eligibility = checks.score();
    let affordability = affordability_score(lender);
    let specialisation = specialisation_score(applicant, lender);

    let final_score = (W_ELIGIBILITY * eligibility as f64
        + W_AFFORDABILITY * affordability as f64
        + W_SPECIALISATION * specialisation as f64)
        .round() as i64;
    if final_score == 0 {
        return None;
    }

    Some(LenderMatch {
        lender_id: lender.id,
        lender_name: lender.name.clone(),
        interest_rate: lender.interest_rate,
        eligibility_score: eligibility,
        affordability_score: affordability,
        specialisation_score: specialisation,
        final_score,
        confidence: confidence_score(applicant, eligibility),
        reasons: build_reasons(applicant, lender, &checks, affordability, currency),
        warnings: build_warnings(applicant, lender, currency),
        rank: 0,
    })
}

/// Rank the full catalogue for an applicant and keep the top `k`.
pub fn score_all(
    applicant: &Applicant,
    catalogue: &LenderCatalogue,
    k: usize,
    currency: &str,
) -> Vec<LenderMatch> {
    let mut matches: Vec<LenderMatch> = catalogue
        .list()
        .iter()
        .filter_map(|lender| score_lender(applicant, lender, currency))
        .collect();

    // Deterministic order: final score descending, lender id as tie-break.
    matches.sort_by(|a, b| {
        b.final_score
            .cmp(&a.final_score)
            .then(a.lender_id.cmp(&b.lender_id))
    });
    matches.truncate(k);
    for (i, m) in matches.iter_mut().enumerate() {
        m.rank = (i + 1) as u32;
    }
    matches
}

// ─── Tests ──────────────────────────────────────────────────────────────────
