//! Built-in rule-based agents
//!
//! Deterministic implementations of [`ReasoningAgent`] for the three
//! hospital roles. They reproduce the reasoning an LLM-backed agent would
//! apply to these scenarios (tightest-constraint procurement, budget and
//! storage gating) without any I/O, which makes them suitable both for the
//! demo host and as realistic fixtures.

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::json;

use crate::coordination::{ScenarioContext, Urgency};
use crate::error::Result;

use super::traits::{
    Adjustment, ConstraintMap, ConstraintRecord, ConstraintsSatisfied, CritiqueDecision, Proposal,
    ReasoningAgent, Verdict,
};

fn proposal_confidence(urgency: Urgency) -> f64 {
    match urgency {
        Urgency::Low => 0.88,
        Urgency::Medium => 0.90,
        Urgency::High => 0.93,
        Urgency::Critical => 0.95,
    }
}

/// Quantity affordable under `amount` at the given unit price
fn quantity_for_amount(amount: Decimal, price: Decimal) -> Option<u64> {
    if price <= Decimal::ZERO {
        return None;
    }
    (amount / price).floor().to_u64()
}

/// Tightest-constraint proposal: the required quantity bounded by every
/// declared budget and storage limit, further tightened by any suggested
/// adjustments from the previous round's critiques.
fn bounded_proposal(
    context: &ScenarioContext,
    constraints: &ConstraintMap,
    critiques: &[CritiqueDecision],
) -> Proposal {
    let price = context.price_per_unit;
    let mut quantity = context.required_quantity;
    let mut bounds: Vec<String> = Vec::new();

    for (agent, record) in constraints {
        if let Some(limit) = record.max_quantity {
            if limit < quantity {
                quantity = limit;
                bounds.push(format!("{agent} caps quantity at {limit}"));
            }
        }
        if let Some(amount) = record.max_amount {
            if let Some(limit) = quantity_for_amount(amount, price) {
                if limit < quantity {
                    quantity = limit;
                    bounds.push(format!("{agent} caps spend at ${amount}"));
                }
            }
        }
    }

    for critique in critiques {
        let Some(adjustment) = &critique.suggested_adjustments else {
            continue;
        };
        if let Some(limit) = adjustment.max_quantity {
            if limit < quantity {
                quantity = limit;
                bounds.push(format!("{} requested at most {limit}", critique.agent));
            }
        }
        if let Some(cost) = adjustment.max_cost {
            if let Some(limit) = quantity_for_amount(cost, price) {
                if limit < quantity {
                    quantity = limit;
                    bounds.push(format!("{} capped cost at ${cost}", critique.agent));
                }
            }
        }
    }

    let cost = Decimal::from(quantity) * price;
    let reasoning = if bounds.is_empty() {
        format!(
            "Proposing the full required quantity of {} units at ${price}/unit",
            quantity
        )
    } else {
        format!(
            "Proposing {} units (required: {}): {}",
            quantity,
            context.required_quantity,
            bounds.join("; ")
        )
    };

    Proposal {
        item_name: context.item.clone(),
        proposed_quantity: quantity,
        proposed_cost: cost,
        price_per_unit: price,
        reasoning,
        confidence: proposal_confidence(context.urgency),
        constraints_satisfied: ConstraintsSatisfied {
            budget: cost <= context.budget_remaining,
            storage: quantity <= context.storage_available,
        },
    }
}

/// Procurement initiator. Proposes the tightest quantity that satisfies
/// every declared constraint and refines toward suggested adjustments.
pub struct SupplyChainAgent {
    id: String,
}

impl SupplyChainAgent {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[async_trait]
impl ReasoningAgent for SupplyChainAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn role(&self) -> &str {
        "Supply Chain Management"
    }

    async fn propose_constraint(&self, context: &ScenarioContext) -> Result<ConstraintRecord> {
        let mut record = ConstraintRecord::new("supply_chain");
        record
            .extras
            .insert("current_stock".into(), json!(context.current_stock));
        record
            .extras
            .insert("required_quantity".into(), json!(context.required_quantity));
        record
            .extras
            .insert("urgency".into(), json!(context.urgency.to_string()));
        Ok(record)
    }

    async fn generate_proposal(
        &self,
        context: &ScenarioContext,
        constraints: &ConstraintMap,
        critiques: &[CritiqueDecision],
    ) -> Result<Proposal> {
        Ok(bounded_proposal(context, constraints, critiques))
    }

    async fn critique(
        &self,
        proposal: &Proposal,
        context: &ScenarioContext,
    ) -> Result<CritiqueDecision> {
        // The supply view only asks that the order moves stock toward the
        // requirement; sizing against budget/storage belongs to the others.
        let verdict = if proposal.proposed_quantity > 0 {
            Verdict::Accept
        } else {
            Verdict::Critique
        };
        Ok(CritiqueDecision {
            agent: self.id.clone(),
            verdict,
            reasoning: format!(
                "Order of {} units against requirement of {}",
                proposal.proposed_quantity, context.required_quantity
            ),
            confidence: 0.90,
            suggested_adjustments: None,
        })
    }
}

/// Budget guardian. Declares the remaining budget as its cap and rejects
/// any proposal that overspends it.
pub struct FinancialAgent {
    id: String,
}

impl FinancialAgent {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[async_trait]
impl ReasoningAgent for FinancialAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn role(&self) -> &str {
        "Financial Management"
    }

    async fn propose_constraint(&self, context: &ScenarioContext) -> Result<ConstraintRecord> {
        let mut record = ConstraintRecord::new("financial");
        record.max_amount = Some(context.budget_remaining);
        record
            .extras
            .insert("risk_tolerance".into(), json!("medium"));
        Ok(record)
    }

    async fn generate_proposal(
        &self,
        context: &ScenarioContext,
        constraints: &ConstraintMap,
        critiques: &[CritiqueDecision],
    ) -> Result<Proposal> {
        Ok(bounded_proposal(context, constraints, critiques))
    }

    async fn critique(
        &self,
        proposal: &Proposal,
        context: &ScenarioContext,
    ) -> Result<CritiqueDecision> {
        let budget = context.budget_remaining;
        if proposal.proposed_cost <= budget {
            Ok(CritiqueDecision {
                agent: self.id.clone(),
                verdict: Verdict::Accept,
                reasoning: format!(
                    "Cost ${} within budget ${budget}",
                    proposal.proposed_cost
                ),
                confidence: 0.95,
                suggested_adjustments: None,
            })
        } else {
            Ok(CritiqueDecision {
                agent: self.id.clone(),
                verdict: Verdict::Critique,
                reasoning: format!(
                    "Cost ${} exceeds budget ${budget}",
                    proposal.proposed_cost
                ),
                confidence: 0.90,
                suggested_adjustments: Some(Adjustment {
                    max_cost: Some(budget),
                    max_quantity: quantity_for_amount(budget, proposal.price_per_unit),
                }),
            })
        }
    }
}

/// Storage guardian. Declares available storage as its cap and rejects any
/// proposal that would not fit.
pub struct FacilityAgent {
    id: String,
}

impl FacilityAgent {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[async_trait]
impl ReasoningAgent for FacilityAgent {
    fn id(&self) -> &str {
        &self.id
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
        context: &ScenarioContext,
        constraints: &ConstraintMap,
        critiques: &[CritiqueDecision],
    ) -> Result<Proposal> {
        Ok(bounded_proposal(context, constraints, critiques))
    }

    async fn critique(
        &self,
        proposal: &Proposal,
        context: &ScenarioContext,
    ) -> Result<CritiqueDecision> {
        let storage = context.storage_available;
        if proposal.proposed_quantity <= storage {
            Ok(CritiqueDecision {
                agent: self.id.clone(),
                verdict: Verdict::Accept,
                reasoning: format!(
                    "Quantity {} fits storage capacity of {storage}",
                    proposal.proposed_quantity
                ),
                confidence: 0.93,
                suggested_adjustments: None,
            })
        } else {
            Ok(CritiqueDecision {
                agent: self.id.clone(),
                verdict: Verdict::Critique,
                reasoning: format!(
                    "Quantity {} exceeds available storage of {storage}",
                    proposal.proposed_quantity
                ),
                confidence: 0.92,
                suggested_adjustments: Some(Adjustment {
                    max_quantity: Some(storage),
                    max_cost: None,
                }),
            })
        }
    }
}
