//! Extraction agent — mines validated loan parameters from recent dialogue.
//!
//! The LLM is asked for a single JSON object carrying any subset of the
//! seven parameter fields. Its reply is untrusted text: the first balanced
//! JSON object is pulled out (fenced code blocks tolerated), each key is
//! type-coerced, enum strings pass through fixed synonym tables, and every
//! surviving entry is revalidated against its field domain. Anything
//! malformed is dropped silently — extraction failure is observable only as
//! "no new parameters learned".

use std::sync::Arc;

use serde_json::Value;

use crate::llm::{ChatMessage, GenerationProfile, TextGenerator};

use super::tracker;
use super::types::{MessageRole, ParameterField, StoredMessage};

/// How many recent dialogue turns the extraction prompt carries.
const DIALOGUE_WINDOW: usize = 5;

const SYSTEM_PROMPT: &str = "\
You are a data extraction assistant for a loan advisory service. Read the \
conversation and extract any loan parameters the user has clearly stated.

Return ONLY a JSON object. Include a key only when the user actually stated \
its value. Keys:
- loanAmount: number, as the user said it (\"2 crore\" -> 2, \"15 lakhs\" -> 15, \"Rs 20,00,000\" -> 2000000)
- annualIncome: number, same convention as loanAmount
- employmentStatus: one of salaried, self-employed, freelancer, student, unemployed
- creditScore: integer
- loanPurpose: one of home, vehicle, education, business, startup, eco, emergency, gold-backed, personal
- debtToIncomeRatio: number between 0 and 1, only if clearly stated
- employmentDuration: months of employment, only if clearly stated

If a category is implied rather than named, map it (a car or bike is a \
vehicle loan; an MBA is education; a software engineer is salaried). If \
nothing was stated, return {}.";

// ─── Synonym Tables ─────────────────────────────────────────────────────────

/// Canonicalise a free-text employment phrase. Exact enum names win;
/// otherwise the first synonym table hit applies. Unknown strings are
/// discarded by the caller.
pub fn canonical_employment(raw: &str) -> Option<&'static str> {
    let text = raw.trim().to_lowercase();
    if let Some(status) = super::types::EmploymentStatus::parse(&text) {
        return Some(status.as_str());
    }

    const TABLE: &[(&str, &[&str])] = &[
        (
            "self-employed",
            &[
                "self employed",
                "self-employed",
                "business owner",
                "entrepreneur",
                "own business",
                "shop owner",
                "proprietor",
            ],
        ),
        (
            "freelancer",
            &["freelance", "consultant", "contractor", "gig worker"],
        ),
        (
            "student",
            &["student", "studying", "college", "university"],
        ),
        (
            "unemployed",
            &["unemployed", "jobless", "not working", "between jobs"],
        ),
        (
            "salaried",
            &[
                "salaried",
                "salary",
                "employed",
                "employee",
                "software engineer",
                "engineer",
                "working professional",
                "private sector",
                "government job",
                "full-time job",
                "job",
            ],
        ),
    ];

    for (canonical, synonyms) in TABLE {
        if synonyms.iter().any(|s| text.contains(s)) {
            return Some(canonical);
        }
    }
    None
}

/// Canonicalise a free-text loan purpose phrase.
pub fn canonical_purpose(raw: &str) -> Option<&'static str> {
    let text = raw.trim().to_lowercase();
    if let Some(purpose) = super::types::LoanPurpose::parse(&text) {
        return Some(purpose.as_str());
    }

    const TABLE: &[(&str, &[&str])] = &[
        ("eco", &["eco", "solar", "green energy", "renewable"]),
        (
            "gold-backed",
            &["gold", "jewellery", "jewelry"],
        ),
        (
            "vehicle",
            &[
                "vehicle", "car", "bike", "motorcycle", "scooter", "bmw", "suv",
                "truck", "two-wheeler", "auto",
            ],
        ),
        (
            "home",
            &["home", "house", "flat", "apartment", "property", "mortgage"],
        ),
        (
            "education",
            &[
                "education", "study", "studies", "mba", "degree", "masters",
                "course", "tuition", "school fees",
            ],
        ),
        (
            "startup",
            &["startup", "start-up", "start up", "venture", "new company"],
        ),
        (
            "business",
            &["business", "working capital", "expansion", "shop"],
        ),
        (
            "emergency",
            &["emergency", "medical", "hospital", "urgent"],
        ),
        (
            "personal",
            &["personal", "wedding", "travel", "vacation", "renovation"],
        ),
    ];

    for (canonical, synonyms) in TABLE {
        if synonyms.iter().any(|s| text.contains(s)) {
            return Some(canonical);
        }
    }
    None
}

// ─── Reply Parsing ──────────────────────────────────────────────────────────

/// Pull the first balanced JSON object literal out of untrusted text.
/// Fenced code blocks need no special handling — the brace scan walks
/// straight past the fence markers. String-aware: braces inside JSON
/// strings don't affect depth.
pub fn extract_json_object(text: &str) -> Option<Value> {
    find_json_object(text).map(|(_, value)| value)
}

/// As [`extract_json_object`], but also reports the byte range the object
/// occupies so callers can splice it out of the surrounding text.
pub fn find_json_object(text: &str) -> Option<(std::ops::Range<usize>, Value)> {
    let bytes = text.as_bytes();
    let mut start: Option<usize> = None;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' if start.is_some() => in_string = true,
            b'{' => {
                if start.is_none() {
                    start = Some(i);
                }
                depth += 1;
            }
            b'}' => {
                if let Some(s) = start {
                    depth -= 1;
                    if depth == 0 {
                        if let Ok(v) = serde_json::from_str::<Value>(&text[s..=i]) {
                            if v.is_object() {
                                return Some((s..i + 1, v));
                            }
                        }
                        // Not valid JSON — keep scanning for a later object.
                        start = None;
                    }
                }
            }
            _ => {}
        }
    }
    None
}

/// Map a reply key (tolerating snake_case drift) to a parameter field.
fn field_for_key(key: &str) -> Option<ParameterField> {
    if let Some(field) = ParameterField::parse(key) {
        return Some(field);
    }
    match key {
        "loan_amount" => Some(ParameterField::LoanAmount),
        "annual_income" => Some(ParameterField::AnnualIncome),
        "employment_status" => Some(ParameterField::EmploymentStatus),
        "credit_score" => Some(ParameterField::CreditScore),
        "loan_purpose" => Some(ParameterField::LoanPurpose),
        "debt_to_income_ratio" => Some(ParameterField::DebtToIncomeRatio),
        "employment_duration" => Some(ParameterField::EmploymentDuration),
        _ => None,
    }
}

/// Parse an LLM reply into validated (field, value) pairs.
///
/// Post-processing order: JSON extraction, key coercion, synonym
/// canonicalisation for the enum fields, then a full domain validation.
/// Entries that fail any step are dropped, never substituted.
pub fn parse_reply(reply: &str) -> Vec<(ParameterField, Value)> {
    let Some(object) = extract_json_object(reply) else {
        return Vec::new();
    };
    let Some(map) = object.as_object() else {
        return Vec::new();
    };

    let mut extracted = Vec::new();
    for (key, raw) in map {
        let Some(field) = field_for_key(key) else {
            continue;
        };

        let candidate = match field {
            ParameterField::EmploymentStatus => raw
                .as_str()
                .and_then(canonical_employment)
                .map(|s| Value::String(s.to_string())),
            ParameterField::LoanPurpose => raw
                .as_str()
                .and_then(canonical_purpose)
                .map(|s| Value::String(s.to_string())),
            _ => Some(raw.clone()),
        };

        let Some(candidate) = candidate else {
            continue;
        };
        if tracker::validate(field, &candidate).is_ok() {
            extracted.push((field, candidate));
        }
    }
    extracted
}

// ─── ExtractionAgent ────────────────────────────────────────────────────────

/// LLM-backed parameter miner over the recent dialogue window.
pub struct ExtractionAgent {
    gateway: Arc<dyn TextGenerator>,
}

impl ExtractionAgent {
    pub fn new(gateway: Arc<dyn TextGenerator>) -> Self {
        Self { gateway }
    }

    /// Build the extraction prompt from the dialogue window plus the new
    /// utterance.
    fn build_prompt(history: &[StoredMessage], user_text: &str) -> Vec<ChatMessage> {
        let mut dialogue = String::new();
        let window_start = history.len().saturating_sub(DIALOGUE_WINDOW);
        for msg in &history[window_start..] {
            let speaker = match msg.role {
                MessageRole::User => "User",
                MessageRole::Bot => "Advisor",
            };
            dialogue.push_str(&format!("{speaker}: {}\n", msg.content));
        }
        dialogue.push_str(&format!("User: {user_text}\n"));

        vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(format!(
                "Conversation:\n{dialogue}\nExtract the loan parameters as JSON."
            )),
        ]
    }

    /// Mine parameters from the dialogue. Never raises on malformed LLM
    /// output — gateway failures and unparseable replies both yield an
    /// empty result.
    pub async fn extract(
        &self,
        history: &[StoredMessage],
        user_text: &str,
    ) -> Vec<(ParameterField, Value)> {
        let prompt = Self::build_prompt(history, user_text);
        match self
            .gateway
            .generate(prompt, GenerationProfile::extraction())
            .await
        {
            Ok(reply) => {
                let extracted = parse_reply(&reply);
                tracing::debug!(
                    extracted = extracted.len(),
                    "extraction agent parsed reply"
                );
                extracted
            }
            Err(e) => {
                tracing::warn!(error = %e, "extraction call failed — no parameters learned");
                Vec::new()
            }
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedGenerator;
    use crate::llm::LlmError;
    use serde_json::json;

    #[test]
    fn test_extract_json_object_plain() {
        let v = extract_json_object(r#"{"loanAmount": 2000000}"#).unwrap();
        assert_eq!(v["loanAmount"], 2_000_000);
    }

    #[test]
    fn test_extract_json_object_fenced() {
        let reply = "Here you go:\n```json\n{\"creditScore\": 760}\n```\nDone.";
        let v = extract_json_object(reply).unwrap();
        assert_eq!(v["creditScore"], 760);
    }

    #[test]
    fn test_extract_json_object_with_brace_in_string() {
        let reply = r#"{"loanPurpose": "vehicle", "note": "from {user}"}"#;
        let v = extract_json_object(reply).unwrap();
        assert_eq!(v["loanPurpose"], "vehicle");
    }

    #[test]
    fn test_extract_json_object_none_for_prose() {
        assert!(extract_json_object("I could not find any parameters.").is_none());
    }

    #[test]
    fn test_employment_synonyms() {
        assert_eq!(canonical_employment("software engineer"), Some("salaried"));
        assert_eq!(canonical_employment("I am Employed"), Some("salaried"));
        assert_eq!(canonical_employment("business owner"), Some("self-employed"));
        assert_eq!(canonical_employment("freelance designer"), Some("freelancer"));
        assert_eq!(canonical_employment("astronaut"), None);
    }

    #[test]
    fn test_purpose_synonyms() {
        assert_eq!(canonical_purpose("BMW"), Some("vehicle"));
        assert_eq!(canonical_purpose("a new car"), Some("vehicle"));
        assert_eq!(canonical_purpose("MBA"), Some("education"));
        assert_eq!(canonical_purpose("solar panels"), Some("eco"));
        assert_eq!(canonical_purpose("gold loan"), Some("gold-backed"));
        assert_eq!(canonical_purpose("yacht"), None);
    }

    #[test]
    fn test_parse_reply_canonicalises_and_validates() {
        let reply = r#"{"loanAmount": 2, "employmentStatus": "software engineer",
                        "loanPurpose": "BMW", "creditScore": 760}"#;
        let extracted = parse_reply(reply);
        assert_eq!(extracted.len(), 4);

        let purpose = extracted
            .iter()
            .find(|(f, _)| *f == ParameterField::LoanPurpose)
            .unwrap();
        assert_eq!(purpose.1, json!("vehicle"));
        let employment = extracted
            .iter()
            .find(|(f, _)| *f == ParameterField::EmploymentStatus)
            .unwrap();
        assert_eq!(employment.1, json!("salaried"));
    }

    #[test]
    fn test_parse_reply_drops_invalid_entries() {
        // 950 is out of credit range; "yacht" is no known purpose; the
        // malformed key is ignored. Only the amount survives.
        let reply = r#"{"loanAmount": 500000, "creditScore": 950,
                        "loanPurpose": "yacht", "favouriteColour": "blue"}"#;
        let extracted = parse_reply(reply);
        assert_eq!(extracted.len(), 1);
        assert_eq!(extracted[0].0, ParameterField::LoanAmount);
    }

    #[test]
    fn test_parse_reply_accepts_snake_case_drift() {
        let reply = r#"{"annual_income": 15, "credit_score": 700}"#;
        let extracted = parse_reply(reply);
        assert_eq!(extracted.len(), 2);
    }

    #[test]
    fn test_parse_reply_empty_for_garbage() {
        assert!(parse_reply("no json here").is_empty());
        assert!(parse_reply("{broken json").is_empty());
        assert!(parse_reply("[1, 2, 3]").is_empty());
    }

    #[tokio::test]
    async fn test_extract_happy_path() {
        let gateway = Arc::new(ScriptedGenerator::new(vec![Ok(
            r#"{"loanAmount": 20, "loanPurpose": "car"}"#.to_string(),
        )]));
        let agent = ExtractionAgent::new(gateway);

        let extracted = agent.extract(&[], "I need 20 lakhs for a car").await;
        assert_eq!(extracted.len(), 2);
    }

    #[tokio::test]
    async fn test_extract_swallows_gateway_errors() {
        let gateway = Arc::new(ScriptedGenerator::new(vec![Err(LlmError::Timeout {
            duration_secs: 10,
        })]));
        let agent = ExtractionAgent::new(gateway);

        let extracted = agent.extract(&[], "hello").await;
        assert!(extracted.is_empty());
    }

    #[tokio::test]
    async fn test_prompt_windows_last_five_turns() {
        let gateway = Arc::new(ScriptedGenerator::new(vec![Ok("{}".to_string())]));
        let agent = ExtractionAgent::new(Arc::clone(&gateway) as Arc<dyn TextGenerator>);

        let history: Vec<StoredMessage> = (0..8)
            .map(|i| StoredMessage {
                id: i,
                session_id: "s".into(),
                role: if i % 2 == 0 { MessageRole::User } else { MessageRole::Bot },
                content: format!("turn {i}"),
                agent_type: None,
                metadata: None,
                created_at: chrono::Utc::now(),
            })
            .collect();

        agent.extract(&history, "latest").await;

        let prompts = gateway.prompts.lock().unwrap();
        let user_prompt = &prompts[0][1].content;
        assert!(user_prompt.contains("turn 7"));
        assert!(user_prompt.contains("turn 3"));
        assert!(!user_prompt.contains("turn 2"));
        assert!(user_prompt.contains("latest"));
    }
}
