//! Shared types for the advisor core.
//!
//! Sessions, loan parameters, tracking rows, and conversation messages used
//! across the store, tracker, and orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scoring::LenderMatch;

// ─── Loan Parameters ────────────────────────────────────────────────────────

/// Employment category accepted by the lender catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmploymentStatus {
    Salaried,
    SelfEmployed,
    Freelancer,
    Student,
    Unemployed,
}

impl EmploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmploymentStatus::Salaried => "salaried",
            EmploymentStatus::SelfEmployed => "self-employed",
            EmploymentStatus::Freelancer => "freelancer",
            EmploymentStatus::Student => "student",
            EmploymentStatus::Unemployed => "unemployed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "salaried" => Some(EmploymentStatus::Salaried),
            "self-employed" => Some(EmploymentStatus::SelfEmployed),
            "freelancer" => Some(EmploymentStatus::Freelancer),
            "student" => Some(EmploymentStatus::Student),
            "unemployed" => Some(EmploymentStatus::Unemployed),
            _ => None,
        }
    }
}

impl std::fmt::Display for EmploymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the loan is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoanPurpose {
    Home,
    Vehicle,
    Education,
    Business,
    Startup,
    Eco,
    Emergency,
    GoldBacked,
    Personal,
}

impl LoanPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanPurpose::Home => "home",
            LoanPurpose::Vehicle => "vehicle",
            LoanPurpose::Education => "education",
            LoanPurpose::Business => "business",
            LoanPurpose::Startup => "startup",
            LoanPurpose::Eco => "eco",
            LoanPurpose::Emergency => "emergency",
            LoanPurpose::GoldBacked => "gold-backed",
            LoanPurpose::Personal => "personal",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "home" => Some(LoanPurpose::Home),
            "vehicle" => Some(LoanPurpose::Vehicle),
            "education" => Some(LoanPurpose::Education),
            "business" => Some(LoanPurpose::Business),
            "startup" => Some(LoanPurpose::Startup),
            "eco" => Some(LoanPurpose::Eco),
            "emergency" => Some(LoanPurpose::Emergency),
            "gold-backed" => Some(LoanPurpose::GoldBacked),
            "personal" => Some(LoanPurpose::Personal),
            _ => None,
        }
    }
}

impl std::fmt::Display for LoanPurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The structured loan profile collected over the conversation.
///
/// Every field is optional until the user supplies it; an invalid value is
/// never persisted, so a populated field is always within its domain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanParameters {
    /// Requested amount in INR, within [1e5, 1e8].
    pub loan_amount: Option<i64>,
    /// Annual income in INR, within [1e5, 5e7].
    pub annual_income: Option<i64>,
    pub employment_status: Option<EmploymentStatus>,
    /// Bureau score within [300, 850].
    pub credit_score: Option<i64>,
    pub loan_purpose: Option<LoanPurpose>,
    /// Optional: total monthly debt / monthly income, within [0, 1].
    pub debt_to_income_ratio: Option<f64>,
    /// Optional: months in current employment, ≥ 0.
    pub employment_duration: Option<i64>,
}

// ─── Parameter Fields ───────────────────────────────────────────────────────

/// One of the collectable loan parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterField {
    LoanAmount,
    AnnualIncome,
    EmploymentStatus,
    CreditScore,
    LoanPurpose,
    DebtToIncomeRatio,
    EmploymentDuration,
}

impl ParameterField {
    /// The five required fields in fixed priority order. This order is the
    /// sole tie-break used when deciding which parameter to ask for next.
    pub const REQUIRED: [ParameterField; 5] = [
        ParameterField::LoanAmount,
        ParameterField::AnnualIncome,
        ParameterField::EmploymentStatus,
        ParameterField::CreditScore,
        ParameterField::LoanPurpose,
    ];

    /// Wire name (camelCase, as the HTTP API spells it).
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterField::LoanAmount => "loanAmount",
            ParameterField::AnnualIncome => "annualIncome",
            ParameterField::EmploymentStatus => "employmentStatus",
            ParameterField::CreditScore => "creditScore",
            ParameterField::LoanPurpose => "loanPurpose",
            ParameterField::DebtToIncomeRatio => "debtToIncomeRatio",
            ParameterField::EmploymentDuration => "employmentDuration",
        }
    }

    /// Column name in the loan_parameters relation.
    pub fn column(&self) -> &'static str {
        match self {
            ParameterField::LoanAmount => "loan_amount",
            ParameterField::AnnualIncome => "annual_income",
            ParameterField::EmploymentStatus => "employment_status",
            ParameterField::CreditScore => "credit_score",
            ParameterField::LoanPurpose => "loan_purpose",
            ParameterField::DebtToIncomeRatio => "debt_to_income_ratio",
            ParameterField::EmploymentDuration => "employment_duration",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "loanAmount" => Some(ParameterField::LoanAmount),
            "annualIncome" => Some(ParameterField::AnnualIncome),
            "employmentStatus" => Some(ParameterField::EmploymentStatus),
            "creditScore" => Some(ParameterField::CreditScore),
            "loanPurpose" => Some(ParameterField::LoanPurpose),
            "debtToIncomeRatio" => Some(ParameterField::DebtToIncomeRatio),
            "employmentDuration" => Some(ParameterField::EmploymentDuration),
            _ => None,
        }
    }

    /// Whether this field counts toward completion.
    pub fn is_required(&self) -> bool {
        Self::REQUIRED.contains(self)
    }

    /// Short human phrasing for deterministic questions and acknowledgements.
    pub fn describe(&self) -> &'static str {
        match self {
            ParameterField::LoanAmount => "the loan amount you need",
            ParameterField::AnnualIncome => "your annual income",
            ParameterField::EmploymentStatus => "your employment status",
            ParameterField::CreditScore => "your credit score",
            ParameterField::LoanPurpose => "what the loan is for",
            ParameterField::DebtToIncomeRatio => "your debt-to-income ratio",
            ParameterField::EmploymentDuration => "how long you have been employed",
        }
    }
}

impl std::fmt::Display for ParameterField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-session completion tracking. The booleans and the derived percent are
/// always written in the same transaction as the underlying value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterTracking {
    pub loan_amount_collected: bool,
    pub annual_income_collected: bool,
    pub employment_status_collected: bool,
    pub credit_score_collected: bool,
    pub loan_purpose_collected: bool,
    pub completion_percent: u8,
}

impl ParameterTracking {
    /// Number of required fields currently collected.
    pub fn collected_count(&self) -> u8 {
        [
            self.loan_amount_collected,
            self.annual_income_collected,
            self.employment_status_collected,
            self.credit_score_collected,
            self.loan_purpose_collected,
        ]
        .iter()
        .filter(|b| **b)
        .count() as u8
    }

    pub fn is_complete(&self) -> bool {
        self.collected_count() == 5
    }

    pub fn is_collected(&self, field: ParameterField) -> bool {
        match field {
            ParameterField::LoanAmount => self.loan_amount_collected,
            ParameterField::AnnualIncome => self.annual_income_collected,
            ParameterField::EmploymentStatus => self.employment_status_collected,
            ParameterField::CreditScore => self.credit_score_collected,
            ParameterField::LoanPurpose => self.loan_purpose_collected,
            _ => false,
        }
    }
}

// ─── Sessions ───────────────────────────────────────────────────────────────

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
    Expired,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
            SessionStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(SessionStatus::Active),
            "completed" => Some(SessionStatus::Completed),
            "expired" => Some(SessionStatus::Expired),
            _ => None,
        }
    }
}

/// Metadata for a conversation session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// UUIDv4 identifier, opaque to clients.
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    /// Hard expiry: creation + 24 h.
    pub expires_at: DateTime<Utc>,
    pub status: SessionStatus,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

impl Session {
    /// A session accepts turns iff active and not yet past expiry.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.status == SessionStatus::Active && now < self.expires_at
    }
}

/// Everything a turn needs about a session, loaded in one call.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub session: Session,
    pub parameters: LoanParameters,
    pub tracking: ParameterTracking,
    pub history: Vec<StoredMessage>,
}

// ─── Conversation Messages ──────────────────────────────────────────────────

/// Who authored a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Bot,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Bot => "bot",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(MessageRole::User),
            "bot" => Some(MessageRole::Bot),
            _ => None,
        }
    }
}

/// Which agent produced a bot message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentType {
    Conv,
    Extract,
}

impl AgentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::Conv => "conv",
            AgentType::Extract => "extract",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "conv" => Some(AgentType::Conv),
            "extract" => Some(AgentType::Extract),
            _ => None,
        }
    }
}

/// A single message stored in conversation history. Append-only; rows are
/// never rewritten or reordered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    /// Auto-incremented row id (set by the store on insert).
    pub id: i64,
    pub session_id: String,
    pub role: MessageRole,
    pub content: String,
    pub agent_type: Option<AgentType>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

// ─── Turn Results ───────────────────────────────────────────────────────────

/// What the orchestrator decided at the end of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnAction {
    Continue,
    TriggerMatching,
    MatchingFailed,
}

/// The outcome of one `user message → bot reply` cycle.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnResult {
    pub reply: String,
    pub action: TurnAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matches: Option<Vec<LenderMatch>>,
    pub completion_percent: u8,
    pub session_id: String,
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_employment_round_trip() {
        for status in [
            EmploymentStatus::Salaried,
            EmploymentStatus::SelfEmployed,
            EmploymentStatus::Freelancer,
            EmploymentStatus::Student,
            EmploymentStatus::Unemployed,
        ] {
            assert_eq!(EmploymentStatus::parse(status.as_str()), Some(status));
        }
        assert!(EmploymentStatus::parse("retired").is_none());
    }

    #[test]
    fn test_purpose_serde_kebab_case() {
        let json = serde_json::to_string(&LoanPurpose::GoldBacked).unwrap();
        assert_eq!(json, "\"gold-backed\"");
        // "self-employed" is not a purpose — must not deserialize.
        assert!(serde_json::from_str::<LoanPurpose>("\"self-employed\"").is_err());
    }

    #[test]
    fn test_required_field_order_is_fixed() {
        let names: Vec<&str> = ParameterField::REQUIRED.iter().map(|f| f.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "loanAmount",
                "annualIncome",
                "employmentStatus",
                "creditScore",
                "loanPurpose"
            ]
        );
    }

    #[test]
    fn test_tracking_counts_and_completion() {
        let mut tracking = ParameterTracking::default();
        assert_eq!(tracking.collected_count(), 0);
        assert!(!tracking.is_complete());

        tracking.loan_amount_collected = true;
        tracking.credit_score_collected = true;
        assert_eq!(tracking.collected_count(), 2);

        tracking.annual_income_collected = true;
        tracking.employment_status_collected = true;
        tracking.loan_purpose_collected = true;
        assert!(tracking.is_complete());
    }

    #[test]
    fn test_session_usability() {
        let now = Utc::now();
        let session = Session {
            id: "x".into(),
            created_at: now,
            last_activity: now,
            expires_at: now + chrono::Duration::hours(24),
            status: SessionStatus::Active,
            user_agent: None,
            ip_address: None,
        };
        assert!(session.is_usable(now));
        assert!(!session.is_usable(now + chrono::Duration::hours(25)));

        let closed = Session {
            status: SessionStatus::Completed,
            ..session
        };
        assert!(!closed.is_usable(now));
    }

    #[test]
    fn test_loan_parameters_camel_case_wire_shape() {
        let params = LoanParameters {
            loan_amount: Some(2_000_000),
            loan_purpose: Some(LoanPurpose::Vehicle),
            ..Default::default()
        };
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["loanAmount"], 2_000_000);
        assert_eq!(json["loanPurpose"], "vehicle");
    }
}
