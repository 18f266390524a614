use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{info, warn};

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::intent::IntentId;
use crate::domain::policy::{ExternalPolicyId, Policy, PolicyRecord};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EnforcementError {
    #[error("policy rejected by enforcement: {0}")]
    Rejected(String),
    #[error("enforcement transport failure: {0}")]
    Transport(String),
    #[error("enforcement response could not be decoded: {0}")]
    Decode(String),
}

/// The downstream service that applies policies.
#[async_trait]
pub trait EnforcementClient: Send + Sync {
    async fn create(&self, policy: &Policy) -> Result<ExternalPolicyId, EnforcementError>;
    async fn update(&self, id: &ExternalPolicyId, policy: &Policy)
        -> Result<(), EnforcementError>;
    async fn delete(&self, id: &ExternalPolicyId) -> Result<(), EnforcementError>;
}

/// One planned change, in execution order.
#[derive(Clone, Debug, PartialEq)]
pub enum ReconcileStep {
    Delete { record: PolicyRecord },
    Update { record: PolicyRecord, policy: Policy },
    Unchanged { record: PolicyRecord },
    Create { policy: Policy },
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReconcilePlan {
    pub steps: Vec<ReconcileStep>,
}

impl ReconcilePlan {
    pub fn count(&self, predicate: impl Fn(&ReconcileStep) -> bool) -> usize {
        self.steps.iter().filter(|step| predicate(step)).count()
    }
}

/// A change that reached the enforcement side.
#[derive(Clone, Debug, PartialEq)]
pub enum AppliedStep {
    Created(PolicyRecord),
    Updated(PolicyRecord),
    Deleted(PolicyRecord),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReconcileOutcome {
    /// The intent's records after convergence, oldest first.
    pub records: Vec<PolicyRecord>,
    pub applied: Vec<AppliedStep>,
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ReconcileError {
    #[error("enforcement failed after {} applied step(s): {source}", .applied.len())]
    Enforcement {
        #[source]
        source: EnforcementError,
        applied: Vec<AppliedStep>,
    },
}

impl ReconcileError {
    pub fn applied(&self) -> &[AppliedStep] {
        match self {
            Self::Enforcement { applied, .. } => applied,
        }
    }
}

/// Orders stored records oldest first, breaking ties by id.
pub fn oldest_first(records: &[PolicyRecord]) -> Vec<PolicyRecord> {
    let mut ordered = records.to_vec();
    ordered.sort_by(|left, right| {
        left.created_at.cmp(&right.created_at).then_with(|| left.id.0.cmp(&right.id.0))
    });
    ordered
}

/// Plans how to converge `old` onto `new` by position.
///
/// Surplus old records are deleted oldest first, surviving records are
/// overwritten in order, and surplus new policies are created. Overwrites
/// that would not change the stored policy are planned as `Unchanged`.
pub fn plan_reconciliation(old: &[PolicyRecord], new: &[Policy]) -> ReconcilePlan {
    let ordered = oldest_first(old);
    let surplus = ordered.len().saturating_sub(new.len());
    let (retired, kept) = ordered.split_at(surplus);

    let mut steps: Vec<ReconcileStep> =
        retired.iter().cloned().map(|record| ReconcileStep::Delete { record }).collect();

    for (record, policy) in kept.iter().zip(new) {
        if record.policy == *policy {
            steps.push(ReconcileStep::Unchanged { record: record.clone() });
        } else {
            steps.push(ReconcileStep::Update { record: record.clone(), policy: policy.clone() });
        }
    }

    steps.extend(new.iter().skip(kept.len()).cloned().map(|policy| ReconcileStep::Create { policy }));

    ReconcilePlan { steps }
}

/// Executes reconciliation plans against an enforcement client.
///
/// Execution stops at the first enforcement failure. Nothing already applied
/// is undone; the error lists what went through so the caller can persist it.
pub struct PolicyReconciler<'a> {
    enforcement: &'a dyn EnforcementClient,
    audit: Option<&'a dyn AuditSink>,
    correlation_id: String,
    actor: String,
}

impl<'a> PolicyReconciler<'a> {
    pub fn new(enforcement: &'a dyn EnforcementClient) -> Self {
        Self {
            enforcement,
            audit: None,
            correlation_id: "unassigned".to_owned(),
            actor: "reconciler".to_owned(),
        }
    }

    pub fn with_audit(
        mut self,
        sink: &'a dyn AuditSink,
        correlation_id: impl Into<String>,
        actor: impl Into<String>,
    ) -> Self {
        self.audit = Some(sink);
        self.correlation_id = correlation_id.into();
        self.actor = actor.into();
        self
    }

    /// Enforces the freshly translated policies of a new intent.
    pub async fn enroll(
        &self,
        intent_id: &IntentId,
        policies: &[Policy],
        now: DateTime<Utc>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        self.reconcile(intent_id, &[], policies, now).await
    }

    pub async fn reconcile(
        &self,
        intent_id: &IntentId,
        old: &[PolicyRecord],
        new: &[Policy],
        now: DateTime<Utc>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let plan = plan_reconciliation(old, new);
        let context = self.context(intent_id);
        info!(
            event_name = "reconcile.plan_built",
            intent_id = %intent_id,
            correlation_id = %self.correlation_id,
            old = old.len(),
            new = new.len(),
            steps = plan.steps.len(),
            "reconciling intent policies"
        );

        let mut outcome = ReconcileOutcome::default();
        let mut created = 0_i64;

        for step in plan.steps {
            match step {
                ReconcileStep::Delete { record } => {
                    self.delete(&context, &record, &outcome.applied).await?;
                    outcome.applied.push(AppliedStep::Deleted(record));
                }
                ReconcileStep::Unchanged { record } => outcome.records.push(record),
                ReconcileStep::Update { mut record, policy } => {
                    if record.external_id.is_assigned() {
                        self.enforcement
                            .update(&record.external_id, &policy)
                            .await
                            .map_err(|source| self.failed(&context, &policy, source, &outcome))?;
                    } else {
                        record.external_id = self
                            .enforcement
                            .create(&policy)
                            .await
                            .map_err(|source| self.failed(&context, &policy, source, &outcome))?;
                    }
                    record.policy = policy;
                    record.updated_at = now;
                    self.succeeded(&context, "policy.updated", &record);
                    outcome.records.push(record.clone());
                    outcome.applied.push(AppliedStep::Updated(record));
                }
                ReconcileStep::Create { policy } => {
                    let external_id = self
                        .enforcement
                        .create(&policy)
                        .await
                        .map_err(|source| self.failed(&context, &policy, source, &outcome))?;
                    // Keeps a batch in translation order under oldest-first ordering.
                    let created_at = now + Duration::microseconds(created);
                    created += 1;
                    let record =
                        PolicyRecord::new(intent_id.clone(), external_id, policy, created_at);
                    self.succeeded(&context, "policy.created", &record);
                    outcome.records.push(record.clone());
                    outcome.applied.push(AppliedStep::Created(record));
                }
            }
        }

        Ok(outcome)
    }

    /// Withdraws every policy of a deleted intent, oldest first.
    pub async fn retire(
        &self,
        intent_id: &IntentId,
        records: &[PolicyRecord],
    ) -> Result<Vec<AppliedStep>, ReconcileError> {
        let context = self.context(intent_id);
        let mut applied = Vec::with_capacity(records.len());
        for record in oldest_first(records) {
            self.delete(&context, &record, &applied).await?;
            applied.push(AppliedStep::Deleted(record));
        }
        Ok(applied)
    }

    async fn delete(
        &self,
        context: &AuditContext,
        record: &PolicyRecord,
        applied: &[AppliedStep],
    ) -> Result<(), ReconcileError> {
        if record.external_id.is_assigned() {
            if let Err(source) = self.enforcement.delete(&record.external_id).await {
                self.emit_failure(context, &record.policy, &source);
                return Err(ReconcileError::Enforcement { source, applied: applied.to_vec() });
            }
        }
        self.succeeded(context, "policy.deleted", record);
        Ok(())
    }

    fn failed(
        &self,
        context: &AuditContext,
        policy: &Policy,
        source: EnforcementError,
        outcome: &ReconcileOutcome,
    ) -> ReconcileError {
        self.emit_failure(context, policy, &source);
        ReconcileError::Enforcement { source, applied: outcome.applied.clone() }
    }

    fn emit_failure(&self, context: &AuditContext, policy: &Policy, source: &EnforcementError) {
        warn!(
            event_name = "policy.enforcement_failed",
            correlation_id = %context.correlation_id,
            user = %policy.user,
            error = %source,
            "enforcement call failed, aborting reconciliation"
        );
        if let Some(sink) = self.audit {
            sink.emit(
                AuditEvent::new(
                    context,
                    "policy.enforcement_failed",
                    AuditCategory::Enforcement,
                    AuditOutcome::Failed,
                )
                .with_metadata("user", policy.user.clone())
                .with_metadata("error", source.to_string()),
            );
        }
    }

    fn succeeded(&self, context: &AuditContext, event_type: &str, record: &PolicyRecord) {
        if let Some(sink) = self.audit {
            sink.emit(
                AuditEvent::new(
                    context,
                    event_type,
                    AuditCategory::Enforcement,
                    AuditOutcome::Success,
                )
                .with_metadata("record_id", record.id.to_string())
                .with_metadata("external_id", record.external_id.to_string())
                .with_metadata("user", record.policy.user.clone()),
            );
        }
    }

    fn context(&self, intent_id: &IntentId) -> AuditContext {
        AuditContext::new(Some(intent_id.clone()), self.correlation_id.clone(), self.actor.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use super::{
        oldest_first, plan_reconciliation, AppliedStep, EnforcementClient, EnforcementError,
        PolicyReconciler, ReconcileError, ReconcileStep,
    };
    use crate::audit::InMemoryAuditSink;
    use crate::domain::intent::{Blockchain, IntentId};
    use crate::domain::policy::{CostProfile, ExternalPolicyId, Policy, PolicyRecord, PolicyRecordId};

    #[derive(Default)]
    struct RecordingEnforcement {
        calls: Mutex<Vec<String>>,
        fail_on_call: Option<usize>,
    }

    impl RecordingEnforcement {
        fn failing_on(call: usize) -> Self {
            Self { calls: Mutex::new(Vec::new()), fail_on_call: Some(call) }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().expect("calls lock").clone()
        }

        fn record(&self, call: String) -> Result<usize, EnforcementError> {
            let mut calls = self.calls.lock().expect("calls lock");
            let index = calls.len();
            if self.fail_on_call == Some(index) {
                return Err(EnforcementError::Rejected(format!("refused {call}")));
            }
            calls.push(call);
            Ok(index)
        }
    }

    #[async_trait]
    impl EnforcementClient for RecordingEnforcement {
        async fn create(&self, policy: &Policy) -> Result<ExternalPolicyId, EnforcementError> {
            let index = self.record(format!("create {}", policy.user))?;
            Ok(ExternalPolicyId(format!("pdp-{index}")))
        }

        async fn update(
            &self,
            id: &ExternalPolicyId,
            policy: &Policy,
        ) -> Result<(), EnforcementError> {
            self.record(format!("update {id} {}", policy.user)).map(|_| ())
        }

        async fn delete(&self, id: &ExternalPolicyId) -> Result<(), EnforcementError> {
            self.record(format!("delete {id}")).map(|_| ())
        }
    }

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 10, minute, 0).single().expect("valid timestamp")
    }

    fn policy(user: &str) -> Policy {
        Policy { user: user.to_owned(), ..Policy::default() }
    }

    fn record(id: &str, user: &str, created_minute: u32) -> PolicyRecord {
        PolicyRecord {
            id: PolicyRecordId(id.to_owned()),
            intent_id: IntentId("intent-1".to_owned()),
            external_id: ExternalPolicyId(format!("ext-{id}")),
            policy: policy(user),
            created_at: at(created_minute),
            updated_at: at(created_minute),
        }
    }

    #[test]
    fn shrinking_deletes_oldest_then_updates_positionally() {
        let old = vec![record("b", "second", 5), record("a", "first", 1)];
        let plan = plan_reconciliation(&old, &[policy("fresh")]);

        assert_eq!(plan.steps.len(), 2);
        assert!(matches!(&plan.steps[0], ReconcileStep::Delete { record } if record.id.0 == "a"));
        assert!(matches!(
            &plan.steps[1],
            ReconcileStep::Update { record, policy } if record.id.0 == "b" && policy.user == "fresh"
        ));
    }

    #[test]
    fn growing_updates_then_creates_surplus() {
        let old = vec![record("a", "first", 1)];
        let plan = plan_reconciliation(&old, &[policy("first"), policy("second"), policy("third")]);

        assert!(matches!(&plan.steps[0], ReconcileStep::Unchanged { record } if record.id.0 == "a"));
        assert_eq!(plan.count(|step| matches!(step, ReconcileStep::Create { .. })), 2);
        assert_eq!(plan.count(|step| matches!(step, ReconcileStep::Delete { .. })), 0);
    }

    #[test]
    fn equal_timestamps_fall_back_to_id_order() {
        let old = vec![record("z", "late", 1), record("m", "early", 1)];
        let plan = plan_reconciliation(&old, &[]);

        let deleted: Vec<&str> = plan
            .steps
            .iter()
            .filter_map(|step| match step {
                ReconcileStep::Delete { record } => Some(record.id.0.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(deleted, vec!["m", "z"]);
    }

    #[tokio::test]
    async fn shrinking_reconcile_deletes_one_and_advances_survivor() {
        let enforcement = RecordingEnforcement::default();
        let sink = InMemoryAuditSink::default();
        let reconciler = PolicyReconciler::new(&enforcement).with_audit(&sink, "req-9", "test");
        let old = vec![record("a", "first", 1), record("b", "second", 5)];
        let mut replacement = policy("second");
        replacement.cost_profile = CostProfile::Performance;

        let outcome = reconciler
            .reconcile(&IntentId("intent-1".to_owned()), &old, &[replacement.clone()], at(30))
            .await
            .expect("reconcile succeeds");

        assert_eq!(enforcement.calls(), vec!["delete ext-a", "update ext-b second"]);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].id.0, "b");
        assert_eq!(outcome.records[0].policy, replacement);
        assert_eq!(outcome.records[0].created_at, at(5));
        assert_eq!(outcome.records[0].updated_at, at(30));
        assert_eq!(sink.event_types(), vec!["policy.deleted", "policy.updated"]);
    }

    #[tokio::test]
    async fn identical_policy_is_left_untouched() {
        let enforcement = RecordingEnforcement::default();
        let reconciler = PolicyReconciler::new(&enforcement);
        let old = vec![record("a", "first", 1)];

        let outcome = reconciler
            .reconcile(&IntentId("intent-1".to_owned()), &old, &[policy("first")], at(30))
            .await
            .expect("reconcile succeeds");

        assert!(enforcement.calls().is_empty());
        assert!(outcome.applied.is_empty());
        assert_eq!(outcome.records, old);
    }

    #[tokio::test]
    async fn created_records_keep_translation_order() {
        let enforcement = RecordingEnforcement::default();
        let reconciler = PolicyReconciler::new(&enforcement);

        let outcome = reconciler
            .enroll(&IntentId("intent-2".to_owned()), &[policy("c"), policy("a")], at(0))
            .await
            .expect("enroll succeeds");

        assert_eq!(outcome.records[0].external_id, ExternalPolicyId("pdp-0".to_owned()));
        assert!(outcome.records[0].created_at < outcome.records[1].created_at);
        assert_eq!(
            outcome.records[1].created_at - outcome.records[0].created_at,
            Duration::microseconds(1)
        );
        let users: Vec<String> =
            oldest_first(&outcome.records).into_iter().map(|record| record.policy.user).collect();
        assert_eq!(users, vec!["c", "a"]);
    }

    #[tokio::test]
    async fn failure_aborts_and_reports_applied_steps() {
        let enforcement = RecordingEnforcement::failing_on(1);
        let sink = InMemoryAuditSink::default();
        let reconciler = PolicyReconciler::new(&enforcement).with_audit(&sink, "req-1", "test");
        let old = vec![record("a", "first", 1)];
        let mut changed = policy("first");
        changed.blockchain_pool.insert(Blockchain::Bitcoin);

        let error = reconciler
            .reconcile(
                &IntentId("intent-1".to_owned()),
                &old,
                &[changed, policy("second"), policy("third")],
                at(30),
            )
            .await
            .expect_err("second call fails");

        let ReconcileError::Enforcement { source, applied } = error;
        assert_eq!(source, EnforcementError::Rejected("refused create second".to_owned()));
        assert_eq!(applied.len(), 1);
        assert!(matches!(&applied[0], AppliedStep::Updated(record) if record.id.0 == "a"));
        assert_eq!(enforcement.calls().len(), 1);
        assert_eq!(sink.event_types(), vec!["policy.updated", "policy.enforcement_failed"]);
    }

    #[tokio::test]
    async fn unenforced_records_are_enrolled_on_update_and_skipped_on_delete() {
        let enforcement = RecordingEnforcement::default();
        let reconciler = PolicyReconciler::new(&enforcement);
        let mut local = record("a", "first", 1);
        local.external_id = ExternalPolicyId::default();

        let outcome = reconciler
            .reconcile(&IntentId("intent-1".to_owned()), &[local.clone()], &[policy("other")], at(9))
            .await
            .expect("reconcile succeeds");
        assert_eq!(outcome.records[0].external_id, ExternalPolicyId("pdp-0".to_owned()));

        let retired = reconciler
            .retire(&IntentId("intent-1".to_owned()), &[local])
            .await
            .expect("retire succeeds");
        assert_eq!(retired.len(), 1);
        assert_eq!(enforcement.calls(), vec!["create other"]);
    }
}
