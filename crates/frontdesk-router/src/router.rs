//! The chat router: everything deterministic runs before the LLM.
//!
//! Priority per incoming message: FSM flows → storefront FAQ →
//! email-OTP gate → booking-intent datetime injection → LLM tool loop →
//! post-processor.

use std::sync::Arc;

use tracing::{debug, info};

use frontdesk_agent::prompt::build_system_prompt;
use frontdesk_agent::tool_loop::run_tool_loop;
use frontdesk_agent::tools::tool_definitions;
use frontdesk_agent::{
    ChatRequest, LlmProvider, Message, Role, ToolContext, ToolExecutor,
};
use frontdesk_booking::resolve_datetime;
use frontdesk_core::types::{SessionId, Tenant};
use frontdesk_core::{Clock, FrontdeskError, Result};
use frontdesk_store::sessions::SessionStore;
use frontdesk_store::verification::{OtpOutcome, VerificationStore};

use crate::faq::storefront_answer;
use crate::fsm::{self, FsmContext, FsmState};
use crate::intent::{classify_intent, Intent};
use crate::otp;
use crate::postprocess::{post_process, PostProcessContext};

pub struct RouterDeps {
    pub provider: Arc<dyn LlmProvider>,
    pub executor: Arc<ToolExecutor>,
    pub sessions: Arc<SessionStore>,
    pub verifications: Arc<VerificationStore>,
    pub clock: Clock,
    pub model: String,
    /// Tenant policy: demand a verified email before free-form chat.
    pub require_email_verification: bool,
}

pub struct RouterReply {
    pub text: String,
    /// False when a deterministic branch answered.
    pub llm_used: bool,
    pub tools_used: Vec<String>,
}

impl RouterReply {
    fn deterministic(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            llm_used: false,
            tools_used: Vec::new(),
        }
    }
}

pub struct ChatRouter {
    deps: RouterDeps,
}

impl ChatRouter {
    pub fn new(deps: RouterDeps) -> Self {
        Self { deps }
    }

    /// Handle one user message on a session and produce the reply text.
    pub async fn handle_message(
        &self,
        tenant: &Tenant,
        session_id: &SessionId,
        text: &str,
        client_tz: Option<&str>,
    ) -> Result<RouterReply> {
        let sessions = &self.deps.sessions;
        let session = sessions
            .get(session_id)?
            .ok_or_else(|| FrontdeskError::NotFound(format!("session {session_id}")))?;
        sessions.append_message(session_id, "user", text)?;

        // 1. FSM stateful flows consume the message deterministically.
        let fsm_ctx = fsm::load(&session);
        if let Some(reply) = self.drive_fsm(tenant, &session, &fsm_ctx, text)? {
            sessions.append_message(session_id, "assistant", &reply.text)?;
            return Ok(reply);
        }

        // 2. Storefront FAQ: canned answers, no LLM round-trip.
        if let Some(answer) = storefront_answer(&tenant.slug, text) {
            debug!("storefront FAQ hit");
            sessions.append_message(session_id, "assistant", answer)?;
            return Ok(RouterReply::deterministic(answer));
        }

        // 3. Email verification gate.
        if self.deps.require_email_verification && !session.email_verified {
            let reply = self.start_email_gate(&session, text)?;
            sessions.append_message(session_id, "assistant", &reply.text)?;
            return Ok(reply);
        }

        // 4. Booking intent: resolve the date/time ahead of the LLM and
        // pin it so the model cannot hallucinate a different day.
        let mut context_messages: Vec<Message> = Vec::new();
        if classify_intent(text) == Intent::Book {
            if let Some(resolved) = resolve_datetime(
                text,
                client_tz,
                tenant.timezone,
                Some(&tenant.hours),
                self.deps.clock.now_utc(),
            ) {
                info!(start = %resolved.start_utc, "datetime resolved pre-LLM");
                context_messages.push(Message {
                    role: Role::System,
                    content: format!(
                        "RESOLVED DATE/TIME: start={}, end={}, confidence={}, reasons=[{}]. \
                         Do NOT re-ask the customer for the date/time.",
                        resolved.start_utc.to_rfc3339(),
                        resolved.end_utc.to_rfc3339(),
                        resolved.confidence,
                        resolved.reasons.join(", ")
                    ),
                });
            }
        }

        // 5. LLM tool-use loop.
        let history = sessions.history(session_id, 40)?;
        let mut messages: Vec<Message> = history
            .iter()
            .map(|m| Message {
                role: if m.role == "assistant" {
                    Role::Assistant
                } else {
                    Role::User
                },
                content: m.content.clone(),
            })
            .collect();
        // Inject resolver context just before the latest user turn.
        if !context_messages.is_empty() {
            let insert_at = messages.len().saturating_sub(1);
            for (i, m) in context_messages.into_iter().enumerate() {
                messages.insert(insert_at + i, m);
            }
        }

        let request = ChatRequest {
            model: self.deps.model.clone(),
            system: build_system_prompt(tenant, &self.deps.clock),
            messages,
            max_tokens: 1024,
            tools: tool_definitions(),
            raw_messages: None,
        };

        let tool_ctx = ToolContext {
            tenant: tenant.clone(),
            session: session.clone(),
        };
        let (response, trace) =
            run_tool_loop(self.deps.provider.as_ref(), request, &self.deps.executor, &tool_ctx)
                .await
                .map_err(|e| FrontdeskError::LlmProvider(e.to_string()))?;

        // 6. Post-processing backstops the prompt rules in code.
        let final_text = post_process(
            &response.content,
            &PostProcessContext {
                tools_succeeded: &trace.tools_succeeded,
                channel: session.channel,
            },
        );

        sessions.append_message(session_id, "assistant", &final_text)?;
        Ok(RouterReply {
            text: final_text,
            llm_used: true,
            tools_used: trace.tools_used,
        })
    }

    /// Consume a message owed to an in-flight deterministic flow.
    fn drive_fsm(
        &self,
        _tenant: &Tenant,
        session: &frontdesk_store::models::SessionRecord,
        fsm_ctx: &FsmContext,
        text: &str,
    ) -> Result<Option<RouterReply>> {
        match fsm_ctx.state {
            FsmState::Idle => Ok(None),
            FsmState::AwaitingEmail => {
                let Some(email) = otp::extract_email(text) else {
                    return Ok(Some(RouterReply::deterministic(
                        "I didn't catch an email address there — could you type it out for me? \
                         I'll send a 6-digit verification code.",
                    )));
                };
                self.begin_otp(session, &email).map(Some)
            }
            FsmState::AwaitingOtp => {
                let Some(code) = otp::extract_code(text) else {
                    return Ok(Some(RouterReply::deterministic(
                        "That doesn't look like the 6-digit code. Please enter the code from \
                         the email, or send a different email address to start over.",
                    )));
                };
                match self.deps.verifications.attempt(&session.id, &code)? {
                    OtpOutcome::Verified { email } => {
                        self.deps.sessions.mark_email_verified(&session.id, &email)?;
                        let mut cleared = fsm_ctx.clone();
                        cleared.state = FsmState::Idle;
                        cleared.pending_email = None;
                        self.deps
                            .sessions
                            .set_metadata(&session.id, &fsm::store(session, &cleared))?;
                        Ok(Some(RouterReply::deterministic(
                            "You're verified — thanks! Now, how can I help with your booking?",
                        )))
                    }
                    OtpOutcome::Mismatch { remaining } => {
                        Ok(Some(RouterReply::deterministic(format!(
                            "That code doesn't match. You have {remaining} more \
                             {} before I need to send a fresh code.",
                            if remaining == 1 { "try" } else { "tries" }
                        ))))
                    }
                    OtpOutcome::NotPending => {
                        let mut cleared = fsm_ctx.clone();
                        cleared.state = FsmState::AwaitingEmail;
                        cleared.pending_email = None;
                        self.deps
                            .sessions
                            .set_metadata(&session.id, &fsm::store(session, &cleared))?;
                        Ok(Some(RouterReply::deterministic(
                            "That code has expired. What email address should I send a new \
                             one to?",
                        )))
                    }
                }
            }
        }
    }

    /// First touch of the email gate: use an address from the message if
    /// one is there, otherwise ask for it.
    fn start_email_gate(
        &self,
        session: &frontdesk_store::models::SessionRecord,
        text: &str,
    ) -> Result<RouterReply> {
        match otp::extract_email(text) {
            Some(email) => self.begin_otp(session, &email),
            None => {
                let mut fsm_ctx = fsm::load(session);
                fsm_ctx.state = FsmState::AwaitingEmail;
                self.deps
                    .sessions
                    .set_metadata(&session.id, &fsm::store(session, &fsm_ctx))?;
                Ok(RouterReply::deterministic(
                    "Happy to help! First I need to verify your email — what address should \
                     I send a 6-digit code to?",
                ))
            }
        }
    }

    fn begin_otp(
        &self,
        session: &frontdesk_store::models::SessionRecord,
        email: &str,
    ) -> Result<RouterReply> {
        let code = otp::generate_code();
        let issued = self
            .deps
            .verifications
            .begin(&session.id, email, &code)?;
        if !issued {
            return Ok(RouterReply::deterministic(
                "I've sent several codes to that address recently — please wait a bit and \
                 try again, or use a different email.",
            ));
        }

        // The email delivery service is an external collaborator; the
        // code itself never appears in chat or logs.
        info!(
            email_hash = %frontdesk_core::mask::email_hash(email),
            "verification code issued"
        );

        let mut fsm_ctx = fsm::load(session);
        fsm_ctx.state = FsmState::AwaitingOtp;
        fsm_ctx.pending_email = Some(email.to_string());
        self.deps
            .sessions
            .set_metadata(&session.id, &fsm::store(session, &fsm_ctx))?;

        Ok(RouterReply::deterministic(format!(
            "I've sent a 6-digit code to {}. Enter it here to verify.",
            frontdesk_core::mask::mask_email(email)
        )))
    }
}
