//! Coordination engine — the eight-step negotiation protocol
//!
//! The engine owns each session from creation to its terminal state and is
//! the only writer of its fields. External readers get snapshot copies via
//! the query API, which also works mid-run because the engine writes a
//! fresh snapshot into the shared map after every step.
//!
//! Steps: initiate → broadcast → collect constraints → generate proposal →
//! evaluate → refine (≤ max_rounds) → validate (dry-run) → execute.
//! Recoverable errors become terminal session states, never panics.

use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::agents::{AgentRegistry, CritiqueDecision, Proposal};
use crate::config::CoordinationConfig;
use crate::error::{BlockOpsError, Result};
use crate::ledger::{DecisionRecorder, Ledger, Transaction};

use super::message::{Message, MessageKind, COORDINATOR, SMART_CONTRACT};
use super::session::{
    Agreement, CoordinationSession, FailureReason, NegotiationRound, ScenarioSpec, SessionState,
    SessionSummary,
};

/// Drives coordination sessions over the shared registry and ledger.
///
/// Both collaborators are injected so hosts and tests can build fresh
/// instances per case instead of reaching for process-wide state.
pub struct Coordinator {
    config: CoordinationConfig,
    registry: Arc<AgentRegistry>,
    ledger: Arc<Ledger>,
    recorder: DecisionRecorder,
    sessions: RwLock<HashMap<String, CoordinationSession>>,
    session_seq: AtomicU64,
    message_seq: AtomicU64,
}

impl Coordinator {
    pub fn new(
        config: CoordinationConfig,
        registry: Arc<AgentRegistry>,
        ledger: Arc<Ledger>,
    ) -> Self {
        info!(
            timeout_secs = config.timeout_secs,
            max_rounds = config.max_rounds,
            "coordinator initialized"
        );
        Self {
            config,
            registry,
            recorder: DecisionRecorder::new(ledger.clone()),
            ledger,
            sessions: RwLock::new(HashMap::new()),
            session_seq: AtomicU64::new(0),
            message_seq: AtomicU64::new(0),
        }
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Run the full protocol for one scenario and return the terminal
    /// session. Failures surface as session state, not errors.
    pub async fn coordinate(&self, spec: ScenarioSpec) -> CoordinationSession {
        let seq = self.session_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let session_id = format!("COORD-{seq:05}");
        let mut session = CoordinationSession::new(session_id, &spec);
        let started = Instant::now();
        let deadline = started + Duration::from_secs(self.config.timeout_secs);

        info!(
            session_id = %session.session_id,
            initiator = %session.initiator,
            intent = %session.intent,
            "coordination session started"
        );
        self.store_snapshot(&session).await;

        match self.run(&mut session, started, deadline).await {
            Ok(()) => {
                info!(
                    session_id = %session.session_id,
                    rounds = session.rounds.len(),
                    "coordination completed"
                );
            }
            Err(err) => {
                let terminal = match &err {
                    BlockOpsError::DeadlineExceeded { .. } => SessionState::Timeout,
                    _ => SessionState::Failed,
                };
                let failure = match err {
                    BlockOpsError::PolicyViolation { code, reason } => FailureReason {
                        code,
                        detail: reason,
                    },
                    other => FailureReason {
                        code: other.reason_code().to_string(),
                        detail: other.to_string(),
                    },
                };
                warn!(
                    session_id = %session.session_id,
                    state = %terminal,
                    code = %failure.code,
                    detail = %failure.detail,
                    "coordination ended early"
                );
                session.failure = Some(failure);
                // Every live state may move to FAILED / TIMEOUT.
                let _ = session.transition(terminal);
            }
        }

        session.ended_at = Some(Utc::now());
        self.store_snapshot(&session).await;
        session
    }

    async fn run(
        &self,
        session: &mut CoordinationSession,
        started: Instant,
        deadline: Instant,
    ) -> Result<()> {
        self.step_initiate(session)?;
        self.step_broadcast(session);
        self.store_snapshot(session).await;
        self.check_deadline(started, deadline)?;

        self.step_collect_constraints(session, started, deadline)
            .await?;
        self.store_snapshot(session).await;
        self.check_deadline(started, deadline)?;

        let proposal = self.step_generate_proposal(session, started, deadline).await?;
        self.store_snapshot(session).await;
        self.check_deadline(started, deadline)?;

        let accepted = self
            .step_negotiate(session, proposal, started, deadline)
            .await?;
        self.store_snapshot(session).await;
        self.check_deadline(started, deadline)?;

        let tx = self.step_validate(session, &accepted)?;
        self.store_snapshot(session).await;

        // The deadline only gates entry into EXECUTING; once past this
        // point the ledger write runs to completion.
        self.check_deadline(started, deadline)?;
        self.step_execute(session, accepted, tx).await
    }

    /// Step 1: validate the scenario and declare the initiator's intent
    fn step_initiate(&self, session: &mut CoordinationSession) -> Result<()> {
        debug!(session_id = %session.session_id, "step 1: initiate negotiation");

        if session.participants.is_empty() {
            return Err(BlockOpsError::InvalidScenario(
                "participant list is empty".to_string(),
            ));
        }
        if !session.participants.contains(&session.initiator) {
            return Err(BlockOpsError::InvalidScenario(format!(
                "initiator {} is not a participant",
                session.initiator
            )));
        }
        for id in &session.participants {
            if !self.registry.contains(id) {
                return Err(BlockOpsError::UnknownAgent(id.clone()));
            }
        }

        let sender = session.initiator.clone();
        let recipients = non_initiators(session);
        let content = json!({
            "intent": session.intent,
            "context": serde_json::to_value(&session.context)?,
        });
        self.push_message(session, sender, recipients, MessageKind::Intent, content);
        Ok(())
    }

    /// Step 2: engine announcement to every participant. Pure fan-out.
    fn step_broadcast(&self, session: &mut CoordinationSession) {
        debug!(session_id = %session.session_id, "step 2: broadcast intent");
        let recipients = session.participants.clone();
        let content = json!({
            "announcement": format!("Coordination session {} initiated", session.session_id),
            "initiator": session.initiator,
            "intent": session.intent,
            "please_provide": "constraints",
        });
        self.push_message(session, COORDINATOR, recipients, MessageKind::Inform, content);
    }

    /// Step 3: query each non-initiator for its constraints, in
    /// registration order. Unavailable agents or replies slower than half
    /// the session budget count as "no constraint"; a call still pending
    /// at the session deadline times the session out.
    async fn step_collect_constraints(
        &self,
        session: &mut CoordinationSession,
        started: Instant,
        deadline: Instant,
    ) -> Result<()> {
        session.transition(SessionState::CollectingConstraints)?;
        debug!(session_id = %session.session_id, "step 3: collect constraints");

        let half_budget = Duration::from_secs(self.config.timeout_secs) / 2;
        let ordered: Vec<String> = self
            .registry
            .in_registration_order(&session.participants)
            .into_iter()
            .cloned()
            .collect();

        for agent_id in ordered {
            if agent_id == session.initiator {
                continue;
            }
            let agent = self.registry.get(&agent_id)?;
            let initiator = session.initiator.clone();

            self.push_message(
                session,
                COORDINATOR,
                vec![agent_id.clone()],
                MessageKind::Query,
                json!({
                    "query": "What are your constraints for this coordination?",
                    "about": "constraints",
                }),
            );

            let call_started = Instant::now();
            match timeout_at(deadline, agent.propose_constraint(&session.context)).await {
                Err(_) => return Err(self.deadline_error(started)),
                Ok(Err(err)) => {
                    warn!(
                        agent_id = %agent_id,
                        error = %err,
                        "constraint unavailable; continuing without"
                    );
                    self.push_unavailable_constraint(session, initiator);
                }
                Ok(Ok(record)) => {
                    if call_started.elapsed() > half_budget {
                        warn!(
                            agent_id = %agent_id,
                            "constraint reply slower than half the session budget; discarding"
                        );
                        self.push_unavailable_constraint(session, initiator);
                    } else {
                        let content = json!({
                            "type": record.kind,
                            "constraints": serde_json::to_value(&record)?,
                        });
                        self.push_message(
                            session,
                            agent_id.clone(),
                            vec![initiator],
                            MessageKind::Constraint,
                            content,
                        );
                        session.constraints.insert(agent_id.clone(), record);
                    }
                }
            }
            self.check_deadline(started, deadline)?;
        }

        info!(
            session_id = %session.session_id,
            count = session.constraints.len(),
            "constraints collected"
        );
        Ok(())
    }

    fn push_unavailable_constraint(&self, session: &mut CoordinationSession, initiator: String) {
        self.push_message(
            session,
            COORDINATOR,
            vec![initiator],
            MessageKind::Constraint,
            json!({ "type": "unavailable", "constraints": {} }),
        );
    }

    /// Step 4: only the initiator is asked for a proposal; its failure is
    /// fatal to the session.
    async fn step_generate_proposal(
        &self,
        session: &mut CoordinationSession,
        started: Instant,
        deadline: Instant,
    ) -> Result<Proposal> {
        session.transition(SessionState::GeneratingProposal)?;
        debug!(session_id = %session.session_id, "step 4: generate proposal");

        let proposal = self
            .call_initiator(session, &[], started, deadline)
            .await?;
        self.push_proposal_message(session, &proposal)?;
        Ok(proposal)
    }

    async fn call_initiator(
        &self,
        session: &CoordinationSession,
        critiques: &[CritiqueDecision],
        started: Instant,
        deadline: Instant,
    ) -> Result<Proposal> {
        let initiator = self.registry.get(&session.initiator)?;
        match timeout_at(
            deadline,
            initiator.generate_proposal(&session.context, &session.constraints, critiques),
        )
        .await
        {
            Err(_) => Err(self.deadline_error(started)),
            Ok(Err(err)) => Err(BlockOpsError::AgentUnavailable {
                agent: session.initiator.clone(),
                reason: err.to_string(),
            }),
            Ok(Ok(proposal)) => Ok(proposal),
        }
    }

    fn push_proposal_message(
        &self,
        session: &mut CoordinationSession,
        proposal: &Proposal,
    ) -> Result<()> {
        let sender = session.initiator.clone();
        let recipients = non_initiators(session);
        let content = serde_json::to_value(proposal)?;
        self.push_message(session, sender, recipients, MessageKind::Proposal, content);
        Ok(())
    }

    /// Steps 5-6: evaluate and refine until every non-initiator accepts or
    /// the round cap is reached.
    async fn step_negotiate(
        &self,
        session: &mut CoordinationSession,
        mut proposal: Proposal,
        started: Instant,
        deadline: Instant,
    ) -> Result<Proposal> {
        session.transition(SessionState::Negotiating)?;
        let max_rounds = self.config.max_rounds;

        for round in 1..=max_rounds {
            let round_started = Instant::now();
            debug!(
                session_id = %session.session_id,
                round,
                max_rounds,
                "steps 5-6: negotiation round"
            );

            let mut critiques: Vec<CritiqueDecision> = Vec::new();
            let ordered: Vec<String> = self
                .registry
                .in_registration_order(&session.participants)
                .into_iter()
                .cloned()
                .collect();

            for agent_id in ordered {
                if agent_id == session.initiator {
                    continue;
                }
                let agent = self.registry.get(&agent_id)?;
                let decision =
                    match timeout_at(deadline, agent.critique(&proposal, &session.context)).await {
                        Err(_) => return Err(self.deadline_error(started)),
                        Ok(Err(err)) => {
                            return Err(BlockOpsError::AgentUnavailable {
                                agent: agent_id.clone(),
                                reason: err.to_string(),
                            })
                        }
                        Ok(Ok(decision)) => decision,
                    };
                self.check_deadline(started, deadline)?;

                let kind = if decision.verdict.is_accept() {
                    MessageKind::Accept
                } else {
                    MessageKind::Critique
                };
                let recipients = vec![session.initiator.clone(), COORDINATOR.to_string()];
                self.push_message(
                    session,
                    agent_id,
                    recipients,
                    kind,
                    serde_json::to_value(&decision)?,
                );
                critiques.push(decision);
            }

            let all_accept = critiques.iter().all(|c| c.verdict.is_accept());
            session.rounds.push(NegotiationRound {
                round_number: round,
                proposal: proposal.clone(),
                critiques: critiques.clone(),
                duration_secs: round_started.elapsed().as_secs_f64(),
            });
            self.store_snapshot(session).await;

            if all_accept {
                info!(
                    session_id = %session.session_id,
                    round,
                    quantity = proposal.proposed_quantity,
                    "proposal accepted by all participants"
                );
                session.final_proposal = Some(proposal.clone());
                return Ok(proposal);
            }

            if round == max_rounds {
                break;
            }

            debug!(
                session_id = %session.session_id,
                critiques = critiques.len(),
                "refining proposal from critiques"
            );
            proposal = self
                .call_initiator(session, &critiques, started, deadline)
                .await?;
            self.push_proposal_message(session, &proposal)?;
        }

        Err(BlockOpsError::NoAgreement { rounds: max_rounds })
    }

    /// Step 7: dry-run the smart contract against the prospective
    /// transaction. Nothing is written to the ledger here.
    fn step_validate(
        &self,
        session: &mut CoordinationSession,
        proposal: &Proposal,
    ) -> Result<Transaction> {
        session.transition(SessionState::Validating)?;
        debug!(session_id = %session.session_id, "step 7: validate agreement");

        let tx = self.recorder.build_agreement_transaction(
            &session.session_id,
            &session.initiator,
            proposal,
            &session.context,
            &session.participants,
        )?;
        let report = self.ledger.validator().validate(&tx);
        let recipients = session.participants.clone();

        if report.valid {
            self.push_message(
                session,
                SMART_CONTRACT,
                recipients,
                MessageKind::Accept,
                json!({
                    "agent": SMART_CONTRACT,
                    "decision": "accept",
                    "reasoning": report.overall_reason,
                    "confidence": 1.0,
                }),
            );
            Ok(tx)
        } else {
            let code = report
                .failure_code()
                .unwrap_or("POLICY_VIOLATION")
                .to_string();
            self.push_message(
                session,
                SMART_CONTRACT,
                recipients,
                MessageKind::Critique,
                json!({
                    "agent": SMART_CONTRACT,
                    "decision": "critique",
                    "reasoning": report.overall_reason.clone(),
                    "confidence": 1.0,
                }),
            );
            Err(BlockOpsError::PolicyViolation {
                code,
                reason: report.overall_reason,
            })
        }
    }

    /// Step 8: commit the agreement to the ledger and announce execution
    async fn step_execute(
        &self,
        session: &mut CoordinationSession,
        proposal: Proposal,
        tx: Transaction,
    ) -> Result<()> {
        session.transition(SessionState::Executing)?;
        debug!(session_id = %session.session_id, "step 8: execute agreement");

        let agreement = Agreement {
            session_id: session.session_id.clone(),
            proposal,
            participants: session.participants.clone(),
            reached_at: Utc::now(),
        };
        session.agreement = Some(agreement.clone());

        let receipt = self.recorder.record(tx).await.map_err(|err| match err {
            rejected @ BlockOpsError::LedgerRejected(_) => rejected,
            other => BlockOpsError::LedgerRejected(other.to_string()),
        })?;
        session.ledger_receipt = Some(receipt.clone());

        let recipients = session.participants.clone();
        self.push_message(
            session,
            COORDINATOR,
            recipients,
            MessageKind::Inform,
            json!({
                "announcement": "Agreement executed and recorded to the ledger",
                "status": "executed",
                "agreement": serde_json::to_value(&agreement)?,
                "receipt": serde_json::to_value(&receipt)?,
            }),
        );

        session.transition(SessionState::Completed)
    }

    fn push_message(
        &self,
        session: &mut CoordinationSession,
        sender: impl Into<String>,
        recipients: Vec<String>,
        kind: MessageKind,
        content: serde_json::Value,
    ) {
        let seq = self.message_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let message = Message {
            message_id: format!("MSG-{seq:05}"),
            session_id: session.session_id.clone(),
            timestamp: Utc::now(),
            sender: sender.into(),
            recipients,
            kind,
            content,
        };
        debug!(
            session_id = %session.session_id,
            kind = %message.kind,
            sender = %message.sender,
            "message appended"
        );
        session.messages.push(message);
    }

    fn check_deadline(&self, started: Instant, deadline: Instant) -> Result<()> {
        if Instant::now() >= deadline {
            Err(self.deadline_error(started))
        } else {
            Ok(())
        }
    }

    fn deadline_error(&self, started: Instant) -> BlockOpsError {
        BlockOpsError::DeadlineExceeded {
            elapsed_ms: started.elapsed().as_millis() as u64,
            budget_ms: self.config.timeout_secs * 1000,
        }
    }

    async fn store_snapshot(&self, session: &CoordinationSession) {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.session_id.clone(), session.clone());
    }

    /// Snapshot copy of a session
    pub async fn session(&self, id: &str) -> Result<CoordinationSession> {
        let sessions = self.sessions.read().await;
        sessions
            .get(id)
            .cloned()
            .ok_or_else(|| BlockOpsError::NotFound(format!("session {id}")))
    }

    /// Compact rows for every known session, ordered by id
    pub async fn list_sessions(&self) -> Vec<SessionSummary> {
        let sessions = self.sessions.read().await;
        let mut rows: Vec<SessionSummary> = sessions.values().map(|s| s.summary()).collect();
        rows.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        rows
    }

    /// Snapshot of a session's full message log
    pub async fn messages(&self, session_id: &str) -> Result<Vec<Message>> {
        Ok(self.session(session_id).await?.messages)
    }
}

fn non_initiators(session: &CoordinationSession) -> Vec<String> {
    session
        .participants
        .iter()
        .filter(|p| **p != session.initiator)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{
        Adjustment, ConstraintMap, ConstraintRecord, FacilityAgent, FinancialAgent,
        ConstraintsSatisfied, ReasoningAgent, Verdict,
    };
    use crate::config::{LedgerConfig, ValidatorConfig};
    use crate::coordination::{ScenarioContext, Urgency};
    use crate::ledger::{detail_decimal, BlockPayload, SmartContractValidator};
    use async_trait::async_trait;
    use rust_decimal::prelude::ToPrimitive;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    /// Scripted initiator: first proposes the required quantity bounded by
    /// declared budgets only, then tightens toward whatever the critiques
    /// suggest. Ignoring quantity caps up front forces a second round when
    /// storage is the binding constraint.
    struct StubSupply;

    fn budget_bounded_quantity(
        required: u64,
        price: Decimal,
        constraints: &ConstraintMap,
    ) -> u64 {
        let mut quantity = required;
        for record in constraints.values() {
            if let Some(amount) = record.max_amount {
                if let Some(limit) = (amount / price).floor().to_u64() {
                    quantity = quantity.min(limit);
                }
            }
        }
        quantity
    }

    #[async_trait]
    impl ReasoningAgent for StubSupply {
        fn id(&self) -> &str {
            "SC"
        }

        fn role(&self) -> &str {
            "Supply Chain Management"
        }

        async fn propose_constraint(&self, _: &ScenarioContext) -> Result<ConstraintRecord> {
            Ok(ConstraintRecord::new("supply_chain"))
        }

        async fn generate_proposal(
            &self,
            context: &ScenarioContext,
            constraints: &ConstraintMap,
            critiques: &[CritiqueDecision],
        ) -> Result<Proposal> {
            let price = context.price_per_unit;
            let mut quantity =
                budget_bounded_quantity(context.required_quantity, price, constraints);
            for critique in critiques {
                if let Some(adjustment) = &critique.suggested_adjustments {
                    if let Some(limit) = adjustment.max_quantity {
                        quantity = quantity.min(limit);
                    }
                    if let Some(cost) = adjustment.max_cost {
                        if let Some(limit) = (cost / price).floor().to_u64() {
                            quantity = quantity.min(limit);
                        }
                    }
                }
            }
            let cost = Decimal::from(quantity) * price;
            Ok(Proposal {
                item_name: context.item.clone(),
                proposed_quantity: quantity,
                proposed_cost: cost,
                price_per_unit: price,
                reasoning: format!("order {quantity} units"),
                confidence: 0.9,
                constraints_satisfied: ConstraintsSatisfied {
                    budget: cost <= context.budget_remaining,
                    storage: quantity <= context.storage_available,
                },
            })
        }

        async fn critique(
            &self,
            _: &Proposal,
            _: &ScenarioContext,
        ) -> Result<CritiqueDecision> {
            Ok(CritiqueDecision {
                agent: "SC".to_string(),
                verdict: Verdict::Accept,
                reasoning: "own proposal".to_string(),
                confidence: 0.9,
                suggested_adjustments: None,
            })
        }
    }

    /// Rejects every proposal outright, without suggesting adjustments
    struct VetoAgent {
        id: &'static str,
    }

    #[async_trait]
    impl ReasoningAgent for VetoAgent {
        fn id(&self) -> &str {
            self.id
        }

        fn role(&self) -> &str {
            "Facility Management"
        }

        async fn propose_constraint(&self, context: &ScenarioContext) -> Result<ConstraintRecord> {
            let mut record = ConstraintRecord::new("facility");
            record.max_quantity = Some(context.storage_available);
            Ok(record)
        }

        async fn generate_proposal(
            &self,
            _: &ScenarioContext,
            _: &ConstraintMap,
            _: &[CritiqueDecision],
        ) -> Result<Proposal> {
            unimplemented!("never the initiator")
        }

        async fn critique(
            &self,
            _: &Proposal,
            _: &ScenarioContext,
        ) -> Result<CritiqueDecision> {
            Ok(CritiqueDecision {
                agent: self.id.to_string(),
                verdict: Verdict::Critique,
                reasoning: "unacceptable regardless of quantity".to_string(),
                confidence: 0.9,
                suggested_adjustments: None,
            })
        }
    }

    /// Financial agent whose constraint reply takes `delay` to arrive
    struct SlowFin {
        delay: Duration,
    }

    #[async_trait]
    impl ReasoningAgent for SlowFin {
        fn id(&self) -> &str {
            "FIN"
        }

        fn role(&self) -> &str {
            "Financial Management"
        }

        async fn propose_constraint(&self, context: &ScenarioContext) -> Result<ConstraintRecord> {
            tokio::time::sleep(self.delay).await;
            let mut record = ConstraintRecord::new("financial");
            record.max_amount = Some(context.budget_remaining);
            Ok(record)
        }

        async fn generate_proposal(
            &self,
            _: &ScenarioContext,
            _: &ConstraintMap,
            _: &[CritiqueDecision],
        ) -> Result<Proposal> {
            unimplemented!("never the initiator")
        }

        async fn critique(
            &self,
            proposal: &Proposal,
            context: &ScenarioContext,
        ) -> Result<CritiqueDecision> {
            let accept = proposal.proposed_cost <= context.budget_remaining;
            Ok(CritiqueDecision {
                agent: "FIN".to_string(),
                verdict: if accept { Verdict::Accept } else { Verdict::Critique },
                reasoning: "budget check".to_string(),
                confidence: 0.9,
                suggested_adjustments: (!accept).then(|| Adjustment {
                    max_cost: Some(context.budget_remaining),
                    max_quantity: None,
                }),
            })
        }
    }

    fn coordinator_with(
        agents: Vec<Arc<dyn ReasoningAgent>>,
        timeout_secs: u64,
    ) -> Coordinator {
        let registry = Arc::new(AgentRegistry::new());
        for agent in agents {
            registry.register(agent);
        }
        let ledger = Arc::new(
            Ledger::new(
                LedgerConfig::fast(),
                SmartContractValidator::new(ValidatorConfig::default()),
            )
            .unwrap(),
        );
        Coordinator::new(
            CoordinationConfig {
                timeout_secs,
                max_rounds: 3,
            },
            registry,
            ledger,
        )
    }

    fn standard_agents() -> Vec<Arc<dyn ReasoningAgent>> {
        vec![
            Arc::new(StubSupply),
            Arc::new(FinancialAgent::new("FIN")),
            Arc::new(FacilityAgent::new("FAC")),
        ]
    }

    fn spec(context: ScenarioContext) -> ScenarioSpec {
        ScenarioSpec {
            initiator: "SC".to_string(),
            participants: vec!["SC".to_string(), "FIN".to_string(), "FAC".to_string()],
            intent: format!(
                "Order {} units of {}",
                context.required_quantity, context.item
            ),
            context,
        }
    }

    fn context(
        required_quantity: u64,
        budget_remaining: Decimal,
        storage_available: u64,
    ) -> ScenarioContext {
        ScenarioContext {
            item: "PPE Masks N95".to_string(),
            current_stock: 200,
            required_quantity,
            price_per_unit: dec!(2.00),
            budget_remaining,
            storage_available,
            urgency: Urgency::Medium,
            supplier: Some("MedSupply Corp".to_string()),
        }
    }

    fn message_kinds(session: &CoordinationSession) -> Vec<MessageKind> {
        session.messages.iter().map(|m| m.kind).collect()
    }

    fn assert_timestamps_non_decreasing(session: &CoordinationSession) {
        for pair in session.messages.windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }
    }

    #[tokio::test]
    async fn test_scenario_storage_bounded_agreement() {
        let coordinator = coordinator_with(standard_agents(), 30);
        let session = coordinator.coordinate(spec(context(1000, dec!(2000), 800))).await;

        assert_eq!(session.state, SessionState::Completed, "{:?}", session.failure);
        assert_eq!(session.rounds.len(), 2);
        assert_eq!(session.rounds[0].proposal.proposed_quantity, 1000);

        let final_proposal = session.final_proposal.as_ref().unwrap();
        assert_eq!(final_proposal.proposed_quantity, 800);
        assert_eq!(final_proposal.proposed_cost, dec!(1600.00));

        let receipt = session.ledger_receipt.as_ref().unwrap();
        assert_eq!(receipt.block_index, 1);

        let block = coordinator.ledger().block(1).await.unwrap();
        let BlockPayload::Transactions { transactions, .. } = &block.payload else {
            panic!("expected transaction block");
        };
        assert_eq!(transactions.len(), 1);
        assert_eq!(
            detail_decimal(&transactions[0].details, "quantity"),
            Some(dec!(800))
        );
        assert_eq!(
            detail_decimal(&transactions[0].details, "amount"),
            Some(dec!(1600.00))
        );

        assert!(coordinator.ledger().validate_chain().await.valid);
        assert_timestamps_non_decreasing(&session);

        // Full message trace for the two-round run.
        use MessageKind::*;
        assert_eq!(
            message_kinds(&session),
            vec![
                Intent, Inform, Query, Constraint, Query, Constraint, Proposal, Accept,
                Critique, Proposal, Accept, Accept, Accept, Inform,
            ]
        );
    }

    #[tokio::test]
    async fn test_scenario_budget_bounded_agreement() {
        let coordinator = coordinator_with(standard_agents(), 30);
        let session = coordinator
            .coordinate(spec(context(1000, dec!(1200), 1000)))
            .await;

        assert_eq!(session.state, SessionState::Completed, "{:?}", session.failure);
        assert!(session.rounds.len() <= 2);
        let final_proposal = session.final_proposal.as_ref().unwrap();
        assert_eq!(final_proposal.proposed_quantity, 600);
        assert_eq!(final_proposal.proposed_cost, dec!(1200.00));
    }

    #[tokio::test]
    async fn test_scenario_simultaneous_tight_constraints() {
        let coordinator = coordinator_with(standard_agents(), 30);
        let session = coordinator
            .coordinate(spec(context(2000, dec!(1500), 700)))
            .await;

        assert_eq!(session.state, SessionState::Completed, "{:?}", session.failure);
        let final_proposal = session.final_proposal.as_ref().unwrap();
        // Storage is the tighter bound.
        assert_eq!(final_proposal.proposed_quantity, 700);
        assert_eq!(final_proposal.proposed_cost, dec!(1400.00));
    }

    #[tokio::test]
    async fn test_scenario_no_agreement() {
        let agents: Vec<Arc<dyn ReasoningAgent>> = vec![
            Arc::new(StubSupply),
            Arc::new(FinancialAgent::new("FIN")),
            Arc::new(VetoAgent { id: "FAC" }),
        ];
        let coordinator = coordinator_with(agents, 30);
        let session = coordinator.coordinate(spec(context(1000, dec!(2000), 800))).await;

        assert_eq!(session.state, SessionState::Failed);
        assert_eq!(session.rounds.len(), 3);
        assert_eq!(session.failure.as_ref().unwrap().code, "NO_AGREEMENT");
        assert!(session.ledger_receipt.is_none());
        assert_eq!(coordinator.ledger().stats().await.total_blocks, 1);
    }

    #[tokio::test]
    async fn test_scenario_policy_violation_at_validation() {
        let coordinator = coordinator_with(standard_agents(), 30);
        // 1500 units at $50 = $75,000: unanimously acceptable, over the
        // $50,000 autonomous cap.
        let mut ctx = context(1500, dec!(100000), 2000);
        ctx.price_per_unit = dec!(50.00);
        let session = coordinator.coordinate(spec(ctx)).await;

        assert_eq!(session.state, SessionState::Failed);
        assert_eq!(session.failure.as_ref().unwrap().code, "BUDGET_OVER_LIMIT");
        assert!(session.ledger_receipt.is_none());
        assert_eq!(coordinator.ledger().stats().await.total_blocks, 1);

        // The validator's verdict is the last message.
        let last = session.messages.last().unwrap();
        assert_eq!(last.kind, MessageKind::Critique);
        assert_eq!(last.sender, SMART_CONTRACT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scenario_deadline_exceeded() {
        let agents: Vec<Arc<dyn ReasoningAgent>> = vec![
            Arc::new(StubSupply),
            Arc::new(SlowFin {
                delay: Duration::from_secs(3),
            }),
            Arc::new(FacilityAgent::new("FAC")),
        ];
        let coordinator = coordinator_with(agents, 1);
        let session = coordinator.coordinate(spec(context(1000, dec!(2000), 800))).await;

        assert_eq!(session.state, SessionState::Timeout);
        assert_eq!(session.failure.as_ref().unwrap().code, "DEADLINE_EXCEEDED");
        assert!(!session.messages.is_empty());
        assert!(session.ledger_receipt.is_none());
        assert_eq!(coordinator.ledger().stats().await.total_blocks, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_constraint_reply_is_discarded_not_fatal() {
        // Slower than timeout/2 but faster than the deadline: treated as
        // "no constraint" and the session still completes.
        let agents: Vec<Arc<dyn ReasoningAgent>> = vec![
            Arc::new(StubSupply),
            Arc::new(SlowFin {
                delay: Duration::from_millis(700),
            }),
            Arc::new(FacilityAgent::new("FAC")),
        ];
        let coordinator = coordinator_with(agents, 1);
        let session = coordinator.coordinate(spec(context(1000, dec!(2000), 800))).await;

        assert_eq!(session.state, SessionState::Completed, "{:?}", session.failure);
        assert!(!session.constraints.contains_key("FIN"));
        assert!(session.constraints.contains_key("FAC"));
    }

    #[tokio::test]
    async fn test_unknown_participant_fails_session() {
        let coordinator = coordinator_with(standard_agents(), 30);
        let mut bad_spec = spec(context(1000, dec!(2000), 800));
        bad_spec.participants.push("GHOST".to_string());
        let session = coordinator.coordinate(bad_spec).await;

        assert_eq!(session.state, SessionState::Failed);
        assert_eq!(session.failure.as_ref().unwrap().code, "UNKNOWN_AGENT");
    }

    #[tokio::test]
    async fn test_invalid_scenarios_fail_session() {
        let coordinator = coordinator_with(standard_agents(), 30);

        let mut no_participants = spec(context(1000, dec!(2000), 800));
        no_participants.participants.clear();
        let session = coordinator.coordinate(no_participants).await;
        assert_eq!(session.state, SessionState::Failed);
        assert_eq!(session.failure.as_ref().unwrap().code, "INVALID_SCENARIO");

        let mut foreign_initiator = spec(context(1000, dec!(2000), 800));
        foreign_initiator.initiator = "FIN".to_string();
        foreign_initiator.participants = vec!["SC".to_string(), "FAC".to_string()];
        let session = coordinator.coordinate(foreign_initiator).await;
        assert_eq!(session.state, SessionState::Failed);
        assert_eq!(session.failure.as_ref().unwrap().code, "INVALID_SCENARIO");
    }

    #[tokio::test]
    async fn test_ledger_duplicate_fails_session() {
        let coordinator = coordinator_with(standard_agents(), 30);
        // Occupy the id the first session will derive.
        let mut details = serde_json::Map::new();
        details.insert("note".into(), json!("occupies TX-COORD-00001"));
        coordinator
            .ledger()
            .submit(Transaction::with_id(
                "TX-COORD-00001",
                "SC",
                "PURCHASE_ORDER",
                details,
            ))
            .await;

        let session = coordinator.coordinate(spec(context(1000, dec!(2000), 800))).await;
        assert_eq!(session.state, SessionState::Failed);
        assert_eq!(session.failure.as_ref().unwrap().code, "LEDGER_REJECTED");
    }

    #[tokio::test]
    async fn test_terminal_sessions_read_back_identically() {
        let coordinator = coordinator_with(standard_agents(), 30);
        let session = coordinator.coordinate(spec(context(1000, dec!(2000), 800))).await;

        let first = coordinator.session(&session.session_id).await.unwrap();
        let second = coordinator.session(&session.session_id).await.unwrap();
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
        assert_eq!(
            serde_json::to_string(&session).unwrap(),
            serde_json::to_string(&first).unwrap()
        );
    }

    #[tokio::test]
    async fn test_session_queries() {
        let coordinator = coordinator_with(standard_agents(), 30);
        let a = coordinator.coordinate(spec(context(1000, dec!(2000), 800))).await;
        let b = coordinator.coordinate(spec(context(500, dec!(2000), 800))).await;

        let rows = coordinator.list_sessions().await;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].session_id, a.session_id);
        assert_eq!(rows[1].session_id, b.session_id);

        let messages = coordinator.messages(&a.session_id).await.unwrap();
        assert_eq!(messages.len(), a.messages.len());
        assert!(matches!(
            coordinator.session("COORD-99999").await,
            Err(BlockOpsError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_round_cap_is_never_exceeded() {
        let agents: Vec<Arc<dyn ReasoningAgent>> = vec![
            Arc::new(StubSupply),
            Arc::new(VetoAgent { id: "FIN" }),
            Arc::new(VetoAgent { id: "FAC" }),
        ];
        let coordinator = coordinator_with(agents, 30);
        let session = coordinator.coordinate(spec(context(1000, dec!(2000), 800))).await;
        assert!(session.rounds.len() <= 3);
        assert_eq!(session.state, SessionState::Failed);
    }
}
