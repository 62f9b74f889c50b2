//! Orchestrator — the single external entry point for a chat turn.
//!
//! One turn: validate the session, persist the user message, mine
//! parameters from the dialogue, commit them through the tracker, ask the
//! conversation agent for a reply grounded in the updated state, run
//! matching once the tracker reports completion, and persist the bot reply
//! with its action metadata.
//!
//! Failure posture: extraction errors are swallowed (observable only as "no
//! new parameters"); a conversation failure falls back to a deterministic
//! question for the top-priority missing field; a scoring failure reports
//! `matching_failed` without voiding the reply. Only store and session
//! errors surface to the caller. The orchestrator never calls itself —
//! tool-call handling is resolved inline.

use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::scoring::{LenderMatch, ScoringEngine, DEFAULT_TOP_K};

use super::conversation::{self, AgentReply, ConversationAgent};
use super::errors::AdvisorError;
use super::extraction::ExtractionAgent;
use super::store::{SessionLocks, SessionStore};
use super::tracker::{lock_store, missing_from, ParameterTracker};
use super::types::{AgentType, MessageRole, ParameterField, TurnAction, TurnResult};

/// Coordinates the two agents, the tracker, and the scoring engine for one
/// session turn at a time.
pub struct Orchestrator {
    store: Arc<Mutex<SessionStore>>,
    locks: SessionLocks,
    tracker: ParameterTracker,
    extraction: ExtractionAgent,
    conversation: ConversationAgent,
    engine: Arc<ScoringEngine>,
    top_k: usize,
}

impl Orchestrator {
    pub fn new(
        store: Arc<Mutex<SessionStore>>,
        gateway: Arc<dyn crate::llm::TextGenerator>,
        engine: Arc<ScoringEngine>,
    ) -> Self {
        Self {
            tracker: ParameterTracker::new(Arc::clone(&store)),
            extraction: ExtractionAgent::new(Arc::clone(&gateway)),
            conversation: ConversationAgent::new(gateway),
            store,
            locks: SessionLocks::new(),
            engine,
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn tracker(&self) -> &ParameterTracker {
        &self.tracker
    }

    /// Handle one `user message → bot reply` cycle.
    pub async fn handle_turn(
        &self,
        session_id: &str,
        user_text: &str,
    ) -> Result<TurnResult, AdvisorError> {
        // Phase 1 (locked): validate the session and persist the user
        // message so history reflects what was said even if the turn is
        // cancelled later.
        let (history, window) = {
            let _guard = self.locks.acquire(session_id).await;
            let store = lock_store(&self.store)?;
            let snapshot = store.load(session_id)?;
            let user_msg =
                store.append_message(session_id, MessageRole::User, user_text, None, None)?;
            let mut window = snapshot.history.clone();
            window.push(user_msg);
            (snapshot.history, window)
        };

        // Phase 2 (unlocked): mine parameters. Gateway failures are
        // swallowed here — the turn proceeds with nothing learned.
        let extracted = self.extraction.extract(&history, user_text).await;

        // Phase 3 (locked): commit what was learned; collect what actually
        // changed state, then read the updated view the reply is grounded in.
        let (learned, params, tracking) = {
            let _guard = self.locks.acquire(session_id).await;
            let mut learned: Vec<(ParameterField, Value)> = Vec::new();
            for (field, value) in &extracted {
                match self.tracker.set(session_id, *field, value) {
                    Ok(outcome) if outcome.changed => learned.push((*field, value.clone())),
                    Ok(_) => {}
                    Err(AdvisorError::Validation { field, reason }) => {
                        // Extraction revalidates before handing values over,
                        // so this is unexpected — log and move on.
                        tracing::warn!(%field, %reason, "extracted value rejected by tracker");
                    }
                    Err(e) => return Err(e),
                }
            }
            let (params, tracking) = self.tracker.get(session_id)?;
            (learned, params, tracking)
        };

        let missing = missing_from(&tracking);
        tracing::info!(
            session = session_id,
            learned = learned.len(),
            completion = tracking.completion_percent,
            "turn state after extraction"
        );

        // Phase 4 (unlocked): produce the reply from the updated state.
        let reply_text = self
            .compose_reply(&window, &params, &missing, &learned)
            .await;

        // Phase 5: run matching when the tracker reports completion.
        let (action, matches) = if tracking.is_complete() {
            match self.run_matching(session_id) {
                Ok(matches) => (TurnAction::TriggerMatching, Some(matches)),
                Err(e) => {
                    tracing::warn!(session = session_id, error = %e, "matching failed");
                    (TurnAction::MatchingFailed, None)
                }
            }
        } else {
            (TurnAction::Continue, None)
        };

        // Phase 6 (locked): persist the bot reply with its metadata and
        // touch the session.
        {
            let _guard = self.locks.acquire(session_id).await;
            let store = lock_store(&self.store)?;
            let metadata = serde_json::json!({
                "action": action,
                "completionPercent": tracking.completion_percent,
            });
            store.append_message(
                session_id,
                MessageRole::Bot,
                &reply_text,
                Some(AgentType::Conv),
                Some(&metadata),
            )?;
            store.touch(session_id)?;
        }

        Ok(TurnResult {
            reply: reply_text,
            action,
            matches,
            completion_percent: tracking.completion_percent,
            session_id: session_id.to_string(),
        })
    }

    /// Resolve the conversation agent's output into user-visible prose.
    ///
    /// A tool-call directive is honoured only when extraction actually
    /// learned something this turn: then a constrained acknowledgement call
    /// confirms the values. Otherwise the directive is discarded in favour
    /// of the deterministic question. Any agent failure lands on the same
    /// deterministic fallback.
    async fn compose_reply(
        &self,
        window: &[super::types::StoredMessage],
        params: &super::types::LoanParameters,
        missing: &[ParameterField],
        learned: &[(ParameterField, Value)],
    ) -> String {
        match self.conversation.reply(window, params, missing).await {
            Ok(AgentReply::Prose(prose)) => prose,
            Ok(AgentReply::Directive { .. }) if !learned.is_empty() => {
                match self
                    .conversation
                    .acknowledge(learned, missing.first().copied())
                    .await
                {
                    Ok(ack) => ack,
                    Err(e) => {
                        tracing::warn!(error = %e, "acknowledgement call failed — using template");
                        deterministic_reply(missing)
                    }
                }
            }
            Ok(AgentReply::Directive { .. }) => {
                // Nothing new was learned; a second extraction pass would
                // find nothing either. Ask the deterministic question.
                deterministic_reply(missing)
            }
            Err(e) => {
                tracing::warn!(error = %e, "conversation call failed — using template");
                deterministic_reply(missing)
            }
        }
    }

    /// Score the catalogue and persist the ranking atomically.
    fn run_matching(&self, session_id: &str) -> Result<Vec<LenderMatch>, AdvisorError> {
        let (params, _) = self.tracker.get(session_id)?;
        let (matches, path) = self.engine.score(&params, self.top_k)?;
        tracing::info!(
            session = session_id,
            matches = matches.len(),
            ?path,
            "matching complete"
        );
        let store = lock_store(&self.store)?;
        store.replace_matches(session_id, &matches)?;
        Ok(matches)
    }
}

/// Deterministic fallback prose for the current tracker state.
fn deterministic_reply(missing: &[ParameterField]) -> String {
    match missing.first() {
        Some(field) => conversation::fallback_question(*field),
        None => conversation::completion_message(),
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
