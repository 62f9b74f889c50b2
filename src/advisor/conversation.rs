//! Conversation agent — produces either a tool-call directive or a
//! user-visible reply, never both.
//!
//! Tool calling here is a text-level protocol, not a framework primitive:
//! the model embeds a JSON directive in its reply and the orchestrator
//! parses it out. All model output is treated as untrusted text and
//! sanitised before anything reaches the user — no code fences, no stray
//! tool-call fragments, no trailing progress annotations.

use std::sync::Arc;

use serde_json::Value;

use crate::llm::{ChatMessage, GenerationProfile, LlmError, TextGenerator};

use super::extraction::{extract_json_object, find_json_object};
use super::types::{LoanParameters, MessageRole, ParameterField, StoredMessage};

/// Directive name the model must use to request extraction.
const EXTRACT_TOOL: &str = "extract_parameters";

/// Dialogue turns included in the conversation prompt.
const DIALOGUE_WINDOW: usize = 8;

const SYSTEM_PROMPT: &str = "\
You are a friendly loan advisor helping a user find matching lenders. You \
need five details before matching can run: loan amount, annual income, \
employment status, credit score, and loan purpose.

Decide between exactly two kinds of output:

1. If the user's LAST message states loan details that are NOT yet in the \
collected list, reply with ONLY this JSON and nothing else:
{\"tool_call\": \"extract_parameters\", \"message_to_analyze\": \"<the user's last message>\"}

2. Otherwise reply with short, warm prose: acknowledge what is already \
collected and ask for the FIRST item in the missing list. If nothing is \
missing, congratulate the user and say you are preparing their matches.

Never mix JSON and prose. Never mention tools, extraction, or internal \
state. Ask for one detail at a time.";

// ─── Agent Reply ────────────────────────────────────────────────────────────

/// What the conversation model decided to do.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentReply {
    /// The model wants extraction run over a dialogue fragment.
    Directive { message_to_analyze: String },
    /// Sanitised prose ready to surface.
    Prose(String),
}

// ─── Parsing & Sanitisation ─────────────────────────────────────────────────

/// Extract a tool-call directive from untrusted model output, if present.
pub fn parse_directive(text: &str) -> Option<String> {
    let object = extract_json_object(text)?;
    if object.get("tool_call")?.as_str()? != EXTRACT_TOOL {
        return None;
    }
    Some(
        object
            .get("message_to_analyze")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    )
}

/// Strip everything a user must never see: code fences, embedded tool-call
/// JSON, and trailing bracketed action/progress annotations.
pub fn sanitize_reply(text: &str) -> String {
    let mut cleaned = text.to_string();

    // Splice out any embedded tool-call objects wholesale, pretty-printed
    // or not, using the spans the scanner reports.
    while let Some((range, object)) = find_json_object(&cleaned) {
        if object.get("tool_call").is_none() {
            break;
        }
        cleaned.replace_range(range, "");
    }

    let mut lines: Vec<&str> = cleaned
        .lines()
        .filter(|line| !line.trim().starts_with("```"))
        .collect();

    // Trailing annotations like "[Progress: 60%]" or "(action: continue)".
    while let Some(last) = lines.last() {
        let trimmed = last.trim();
        let annotated = (trimmed.starts_with('[') && trimmed.ends_with(']'))
            || (trimmed.starts_with('(') && trimmed.ends_with(')'));
        if trimmed.is_empty() || annotated {
            lines.pop();
        } else {
            break;
        }
    }

    lines.join("\n").trim().to_string()
}

// ─── Deterministic Templates ────────────────────────────────────────────────

/// Fallback question for the highest-priority missing field. Used whenever
/// the model's reply is unusable.
pub fn fallback_question(field: ParameterField) -> String {
    match field {
        ParameterField::LoanAmount => {
            "How much would you like to borrow? You can say it any way you like — \
             for example \"5 lakhs\" or \"2 crore\"."
                .to_string()
        }
        ParameterField::AnnualIncome => {
            "Could you tell me your annual income? An approximate figure is fine.".to_string()
        }
        ParameterField::EmploymentStatus => {
            "What best describes your employment — salaried, self-employed, \
             freelancer, student, or currently not working?"
                .to_string()
        }
        ParameterField::CreditScore => {
            "Do you know your credit score? It's usually a number between 300 and 850."
                .to_string()
        }
        ParameterField::LoanPurpose => {
            "What will the loan be for — a home, a vehicle, education, business, \
             or something else?"
                .to_string()
        }
        _ => format!("Could you tell me {}?", field.describe()),
    }
}

/// Reply when every required parameter is in.
pub fn completion_message() -> String {
    "Wonderful — I have everything I need! Let me find the lenders that best \
     match your profile."
        .to_string()
}

/// Brief apology used when the model fails and nothing is missing to ask for.
pub fn rephrase_request() -> String {
    "Sorry, I didn't quite catch that — could you rephrase?".to_string()
}

/// One-line summary of collected parameters for the prompt.
fn summarise_parameters(params: &LoanParameters) -> String {
    let mut parts = Vec::new();
    if let Some(amount) = params.loan_amount {
        parts.push(format!("loan amount: {amount} INR"));
    }
    if let Some(income) = params.annual_income {
        parts.push(format!("annual income: {income} INR"));
    }
    if let Some(status) = params.employment_status {
        parts.push(format!("employment: {status}"));
    }
    if let Some(score) = params.credit_score {
        parts.push(format!("credit score: {score}"));
    }
    if let Some(purpose) = params.loan_purpose {
        parts.push(format!("purpose: {purpose}"));
    }
    if parts.is_empty() {
        "nothing yet".to_string()
    } else {
        parts.join(", ")
    }
}

// ─── ConversationAgent ──────────────────────────────────────────────────────

/// LLM-backed reply generator grounded in tracker state.
pub struct ConversationAgent {
    gateway: Arc<dyn TextGenerator>,
}

impl ConversationAgent {
    pub fn new(gateway: Arc<dyn TextGenerator>) -> Self {
        Self { gateway }
    }

    fn build_prompt(
        history: &[StoredMessage],
        params: &LoanParameters,
        missing: &[ParameterField],
    ) -> Vec<ChatMessage> {
        let missing_list = if missing.is_empty() {
            "none — all details collected".to_string()
        } else {
            missing
                .iter()
                .map(|f| f.describe())
                .collect::<Vec<_>>()
                .join(", ")
        };

        let mut messages = vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::system(format!(
                "Collected so far: {}.\nStill missing (in priority order): {}.",
                summarise_parameters(params),
                missing_list
            )),
        ];

        let window_start = history.len().saturating_sub(DIALOGUE_WINDOW);
        for msg in &history[window_start..] {
            messages.push(match msg.role {
                MessageRole::User => ChatMessage::user(msg.content.clone()),
                MessageRole::Bot => ChatMessage::assistant(msg.content.clone()),
            });
        }

        messages
    }

    /// Ask the model for the next turn's output.
    pub async fn reply(
        &self,
        history: &[StoredMessage],
        params: &LoanParameters,
        missing: &[ParameterField],
    ) -> Result<AgentReply, LlmError> {
        let prompt = Self::build_prompt(history, params, missing);
        let raw = self
            .gateway
            .generate(prompt, GenerationProfile::conversation())
            .await?;

        if let Some(message_to_analyze) = parse_directive(&raw) {
            return Ok(AgentReply::Directive { message_to_analyze });
        }

        let prose = sanitize_reply(&raw);
        if prose.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(AgentReply::Prose(prose))
    }

    /// Synthesise a natural acknowledgement after extraction learned new
    /// values while the model's first turn was a tool request. Runs under
    /// the extraction profile to keep phrasing stable.
    pub async fn acknowledge(
        &self,
        learned: &[(ParameterField, Value)],
        next_missing: Option<ParameterField>,
    ) -> Result<String, LlmError> {
        let learned_list = learned
            .iter()
            .map(|(field, value)| format!("{}: {}", field.describe(), value))
            .collect::<Vec<_>>()
            .join(", ");
        let next = match next_missing {
            Some(field) => format!("Then ask for {}.", field.describe()),
            None => "All details are collected; say you are preparing their matches.".to_string(),
        };

        let prompt = vec![
            ChatMessage::system(
                "You are a friendly loan advisor. Write ONE short reply (at most \
                 two sentences). Confirm the details just captured in natural \
                 language, without repeating raw numbers back in clinical form. \
                 Never output JSON.",
            ),
            ChatMessage::user(format!("Just captured — {learned_list}. {next}")),
        ];

        let raw = self
            .gateway
            .generate(prompt, GenerationProfile::extraction())
            .await?;
        let prose = sanitize_reply(&raw);
        if prose.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(prose)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
