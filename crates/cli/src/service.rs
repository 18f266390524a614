//! Intent lifecycle: translate, enforce, persist.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use chainpolicy_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use chainpolicy_core::domain::intent::{Intent, IntentId, IntentRecord};
use chainpolicy_core::domain::policy::{Policy, PolicyRecord};
use chainpolicy_core::errors::{ApplicationError, DomainError};
use chainpolicy_core::reconcile::{
    AppliedStep, EnforcementClient, PolicyReconciler, ReconcileError, ReconcileOutcome,
};
use chainpolicy_core::refiner::Refiner;
use chainpolicy_core::translator::{RateTable, SelectionBaselines, Translator};
use chainpolicy_db::repositories::{
    load_rate_table, ConversionRateRepository, IntentRepository, PolicyRecordRepository,
    RepositoryError,
};

const ACTOR: &str = "chainpolicy-cli";

/// An intent together with the policy records currently enforced for it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IntentView {
    pub intent: IntentRecord,
    pub policies: Vec<PolicyRecord>,
}

pub struct IntentService<'a> {
    intents: &'a dyn IntentRepository,
    records: &'a dyn PolicyRecordRepository,
    rates: &'a dyn ConversionRateRepository,
    enforcement: &'a dyn EnforcementClient,
    audit: &'a dyn AuditSink,
    baselines: SelectionBaselines,
    correlation_id: String,
}

pub(crate) fn persistence(error: RepositoryError) -> ApplicationError {
    ApplicationError::Persistence(error.to_string())
}

impl<'a> IntentService<'a> {
    pub fn new(
        intents: &'a dyn IntentRepository,
        records: &'a dyn PolicyRecordRepository,
        rates: &'a dyn ConversionRateRepository,
        enforcement: &'a dyn EnforcementClient,
        audit: &'a dyn AuditSink,
        baselines: SelectionBaselines,
    ) -> Self {
        Self {
            intents,
            records,
            rates,
            enforcement,
            audit,
            baselines,
            correlation_id: "unassigned".to_owned(),
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    /// Parses and translates with the currently stored conversion rates.
    pub async fn translate(&self, text: &str) -> Result<(Intent, Vec<Policy>), ApplicationError> {
        let refiner = self.refiner().await?;
        refiner.refine_with_intent(text).map_err(|error| DomainError::from(error).into())
    }

    pub async fn create(
        &self,
        owner: &str,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<IntentView, ApplicationError> {
        let owner = owner.trim();
        if owner.is_empty() {
            return Err(DomainError::InvariantViolation("intent owner must not be empty".to_owned())
                .into());
        }

        let (_, policies) = self.translate(text).await?;
        let intent = IntentRecord {
            id: IntentId::generate(),
            owner: owner.to_owned(),
            text: text.trim().to_owned(),
            created_at: now,
            updated_at: now,
        };
        let outcome = self.reconciler().enroll(&intent.id, &policies, now).await;

        // Only keep the intent once some policy reached enforcement, so the
        // records persisted below always have an owning row.
        let enforced = match &outcome {
            Ok(_) => true,
            Err(error) => !error.applied().is_empty(),
        };
        if enforced {
            self.intents.save(intent.clone()).await.map_err(persistence)?;
        }
        let policies = self.settle(outcome).await?;

        self.record(&intent.id, "intent.created", policies.len());
        info!(
            event_name = "intent.created",
            intent_id = %intent.id,
            correlation_id = %self.correlation_id,
            policies = policies.len(),
            "intent created"
        );
        Ok(IntentView { intent, policies })
    }

    /// Replaces the text of an intent and converges its policies onto the new
    /// translation. The stored text only changes once enforcement succeeded.
    pub async fn update(
        &self,
        id: &IntentId,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<IntentView, ApplicationError> {
        let mut intent = self.find(id).await?;
        let (_, policies) = self.translate(text).await?;
        let stored = self.records.list_for_intent(id).await.map_err(persistence)?;

        let outcome = self.reconciler().reconcile(id, &stored, &policies, now).await;
        let policies = self.settle(outcome).await?;

        intent.text = text.trim().to_owned();
        intent.updated_at = now;
        self.intents.save(intent.clone()).await.map_err(persistence)?;

        self.record(id, "intent.updated", policies.len());
        info!(
            event_name = "intent.updated",
            intent_id = %id,
            correlation_id = %self.correlation_id,
            policies = policies.len(),
            "intent updated"
        );
        Ok(IntentView { intent, policies })
    }

    /// Withdraws every policy of the intent, then removes it. Returns the
    /// number of retired policies.
    pub async fn delete(&self, id: &IntentId) -> Result<usize, ApplicationError> {
        self.find(id).await?;
        let stored = self.records.list_for_intent(id).await.map_err(persistence)?;

        let retired = match self.reconciler().retire(id, &stored).await {
            Ok(applied) => applied.len(),
            Err(error) => return Err(self.partial_failure(error).await),
        };

        self.records.delete_for_intent(id).await.map_err(persistence)?;
        self.intents.delete(id).await.map_err(persistence)?;

        self.record(id, "intent.deleted", retired);
        info!(
            event_name = "intent.deleted",
            intent_id = %id,
            correlation_id = %self.correlation_id,
            retired,
            "intent deleted"
        );
        Ok(retired)
    }

    pub async fn list(&self, owner: &str) -> Result<Vec<IntentView>, ApplicationError> {
        let intents = self.intents.list_for_owner(owner.trim()).await.map_err(persistence)?;
        let mut views = Vec::with_capacity(intents.len());
        for intent in intents {
            let policies = self.records.list_for_intent(&intent.id).await.map_err(persistence)?;
            views.push(IntentView { intent, policies });
        }
        Ok(views)
    }

    pub async fn show(&self, id: &IntentId) -> Result<IntentView, ApplicationError> {
        let intent = self.find(id).await?;
        let policies = self.records.list_for_intent(id).await.map_err(persistence)?;
        Ok(IntentView { intent, policies })
    }

    async fn find(&self, id: &IntentId) -> Result<IntentRecord, ApplicationError> {
        self.intents
            .find_by_id(id)
            .await
            .map_err(persistence)?
            .ok_or_else(|| DomainError::IntentNotFound(id.to_string()).into())
    }

    async fn refiner(&self) -> Result<Refiner<RateTable>, ApplicationError> {
        let rates = load_rate_table(self.rates).await.map_err(persistence)?;
        Ok(Refiner::new(Translator::new(rates, self.baselines.clone())))
    }

    fn reconciler(&self) -> PolicyReconciler<'a> {
        PolicyReconciler::new(self.enforcement).with_audit(
            self.audit,
            self.correlation_id.clone(),
            ACTOR,
        )
    }

    async fn settle(
        &self,
        outcome: Result<ReconcileOutcome, ReconcileError>,
    ) -> Result<Vec<PolicyRecord>, ApplicationError> {
        match outcome {
            Ok(outcome) => {
                self.persist(&outcome.applied).await?;
                Ok(outcome.records)
            }
            Err(error) => Err(self.partial_failure(error).await),
        }
    }

    /// Stores whatever reached enforcement before the failure so the database
    /// keeps matching the PDP.
    async fn partial_failure(&self, error: ReconcileError) -> ApplicationError {
        if let Err(persist_error) = self.persist(error.applied()).await {
            return persist_error;
        }
        ApplicationError::Integration(error.to_string())
    }

    async fn persist(&self, applied: &[AppliedStep]) -> Result<(), ApplicationError> {
        for step in applied {
            match step {
                AppliedStep::Created(record) | AppliedStep::Updated(record) => {
                    self.records.save(record.clone()).await.map_err(persistence)?;
                }
                AppliedStep::Deleted(record) => match self.records.delete(&record.id).await {
                    Ok(()) | Err(RepositoryError::NotFound(_)) => {}
                    Err(error) => return Err(persistence(error)),
                },
            }
        }
        Ok(())
    }

    fn record(&self, intent_id: &IntentId, event_type: &str, policies: usize) {
        let context =
            AuditContext::new(Some(intent_id.clone()), self.correlation_id.clone(), ACTOR);
        self.audit.emit(
            AuditEvent::new(&context, event_type, AuditCategory::Persistence, AuditOutcome::Success)
                .with_metadata("policies", policies.to_string()),
        );
    }
}
