use std::sync::Mutex;

use async_trait::async_trait;
use chainpolicy_cli::service::IntentService;
use chainpolicy_core::audit::InMemoryAuditSink;
use chainpolicy_core::domain::intent::{Currency, IntentId};
use chainpolicy_core::domain::policy::{CostProfile, ExternalPolicyId, Policy};
use chainpolicy_core::errors::{ApplicationError, DomainError};
use chainpolicy_core::reconcile::{EnforcementClient, EnforcementError};
use chainpolicy_core::translator::SelectionBaselines;
use chainpolicy_db::repositories::{
    ConversionRate, ConversionRateRepository, InMemoryConversionRateRepository,
    InMemoryIntentRepository, InMemoryPolicyRecordRepository, IntentRepository,
    PolicyRecordRepository,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;

#[derive(Default)]
struct ScriptedEnforcement {
    calls: Mutex<Vec<String>>,
    fail_on_call: Mutex<Option<usize>>,
}

impl ScriptedEnforcement {
    fn fail_on(&self, call: usize) {
        *self.fail_on_call.lock().expect("lock") = Some(call);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("lock").clone()
    }

    fn record(&self, call: String) -> Result<usize, EnforcementError> {
        let mut calls = self.calls.lock().expect("lock");
        let index = calls.len();
        if *self.fail_on_call.lock().expect("lock") == Some(index) {
            return Err(EnforcementError::Transport("pdp unreachable".to_owned()));
        }
        calls.push(call);
        Ok(index)
    }
}

#[async_trait]
impl EnforcementClient for ScriptedEnforcement {
    async fn create(&self, policy: &Policy) -> Result<ExternalPolicyId, EnforcementError> {
        let index = self.record(format!("create {}", policy.user))?;
        Ok(ExternalPolicyId(format!("pdp-{index}")))
    }

    async fn update(&self, id: &ExternalPolicyId, policy: &Policy) -> Result<(), EnforcementError> {
        self.record(format!("update {id} {}", policy.user)).map(|_| ())
    }

    async fn delete(&self, id: &ExternalPolicyId) -> Result<(), EnforcementError> {
        self.record(format!("delete {id}")).map(|_| ())
    }
}

#[derive(Default)]
struct Fixture {
    intents: InMemoryIntentRepository,
    records: InMemoryPolicyRecordRepository,
    rates: InMemoryConversionRateRepository,
    enforcement: ScriptedEnforcement,
    audit: InMemoryAuditSink,
}

impl Fixture {
    async fn with_chf_rate() -> Self {
        let fixture = Self::default();
        fixture
            .rates
            .save_rate(ConversionRate {
                currency: Currency::Chf,
                rate: Decimal::new(109, 2),
                updated_at: at(0),
            })
            .await
            .expect("seed rate");
        fixture
    }

    fn service(&self) -> IntentService<'_> {
        IntentService::new(
            &self.intents,
            &self.records,
            &self.rates,
            &self.enforcement,
            &self.audit,
            SelectionBaselines::default(),
        )
        .with_correlation_id("test-correlation")
    }
}

fn at(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 4, 2, 9, 0, 0).single().expect("timestamp") + Duration::minutes(minutes)
}

const TWO_USERS: &str =
    "for a and b select the fastest blockchain until the daily costs reach chf 20";

#[tokio::test]
async fn create_enforces_and_persists_every_policy() {
    let fixture = Fixture::with_chf_rate().await;

    let view = fixture.service().create("alice", TWO_USERS, at(1)).await.expect("create");

    assert_eq!(fixture.enforcement.calls(), vec!["create a", "create b"]);
    assert_eq!(view.policies.len(), 2);
    assert_eq!(view.policies[1].policy.threshold, Decimal::new(218, 1));
    assert_eq!(view.policies[0].external_id, ExternalPolicyId("pdp-0".to_owned()));

    let stored = fixture.records.list_for_intent(&view.intent.id).await.expect("records");
    assert_eq!(stored, view.policies);
    assert_eq!(
        fixture.audit.event_types(),
        vec!["policy.created", "policy.created", "intent.created"]
    );
}

#[tokio::test]
async fn update_deletes_the_oldest_surplus_and_overwrites_the_rest() {
    let fixture = Fixture::with_chf_rate().await;
    let created = fixture.service().create("alice", TWO_USERS, at(1)).await.expect("create");

    let updated = fixture
        .service()
        .update(&created.intent.id, "for c select the cheapest blockchain as default", at(30))
        .await
        .expect("update");

    assert_eq!(
        fixture.enforcement.calls(),
        vec!["create a", "create b", "delete pdp-0", "update pdp-1 c"]
    );
    assert_eq!(updated.policies.len(), 1);
    let survivor = &updated.policies[0];
    assert_eq!(survivor.id, created.policies[1].id);
    assert_eq!(survivor.policy.user, "c");
    assert_eq!(survivor.policy.cost_profile, CostProfile::Economic);
    assert_eq!(survivor.updated_at, at(30));
    assert_eq!(updated.intent.text, "for c select the cheapest blockchain as default");

    let stored = fixture.records.list_for_intent(&created.intent.id).await.expect("records");
    assert_eq!(stored, updated.policies);
}

#[tokio::test]
async fn update_with_identical_translation_makes_no_enforcement_calls() {
    let fixture = Fixture::with_chf_rate().await;
    let created = fixture.service().create("alice", TWO_USERS, at(1)).await.expect("create");

    let updated =
        fixture.service().update(&created.intent.id, TWO_USERS, at(5)).await.expect("update");

    assert_eq!(fixture.enforcement.calls().len(), 2);
    assert_eq!(updated.policies, created.policies);
    assert_eq!(updated.intent.updated_at, at(5));
}

#[tokio::test]
async fn enforcement_failure_keeps_applied_steps_and_the_old_text() {
    let fixture = Fixture::with_chf_rate().await;
    let created = fixture.service().create("alice", TWO_USERS, at(1)).await.expect("create");
    fixture.enforcement.fail_on(3);

    let error = fixture
        .service()
        .update(&created.intent.id, "for c select bitcoin as default", at(30))
        .await
        .expect_err("second enforcement call fails");

    assert!(matches!(error, ApplicationError::Integration(ref message) if message.contains("pdp unreachable")));
    let stored = fixture.records.list_for_intent(&created.intent.id).await.expect("records");
    assert_eq!(stored, vec![created.policies[1].clone()]);

    let intent = fixture.intents.find_by_id(&created.intent.id).await.expect("find").expect("exists");
    assert_eq!(intent.text, TWO_USERS);
    assert!(fixture.audit.event_types().contains(&"policy.enforcement_failed".to_owned()));
}

#[tokio::test]
async fn create_rejected_by_enforcement_leaves_nothing_stored() {
    let fixture = Fixture::with_chf_rate().await;
    fixture.enforcement.fail_on(0);

    let error = fixture
        .service()
        .create("alice", TWO_USERS, at(1))
        .await
        .expect_err("first enforcement call fails");

    assert!(matches!(error, ApplicationError::Integration(_)));
    assert!(fixture.enforcement.calls().is_empty());
    assert!(fixture.intents.list_for_owner("alice").await.expect("list").is_empty());
}

#[tokio::test]
async fn create_interrupted_midway_keeps_the_enforced_policy() {
    let fixture = Fixture::with_chf_rate().await;
    fixture.enforcement.fail_on(1);

    fixture.service().create("alice", TWO_USERS, at(1)).await.expect_err("second call fails");

    let intents = fixture.intents.list_for_owner("alice").await.expect("list");
    assert_eq!(intents.len(), 1);
    let stored = fixture.records.list_for_intent(&intents[0].id).await.expect("records");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].policy.user, "a");
    assert_eq!(stored[0].external_id, ExternalPolicyId("pdp-0".to_owned()));
}

#[tokio::test]
async fn delete_retires_policies_before_removing_the_intent() {
    let fixture = Fixture::with_chf_rate().await;
    let created = fixture.service().create("alice", TWO_USERS, at(1)).await.expect("create");

    let retired = fixture.service().delete(&created.intent.id).await.expect("delete");

    assert_eq!(retired, 2);
    assert_eq!(&fixture.enforcement.calls()[2..], ["delete pdp-0", "delete pdp-1"]);
    assert!(fixture.records.list_for_intent(&created.intent.id).await.expect("records").is_empty());
    assert_eq!(fixture.intents.find_by_id(&created.intent.id).await.expect("find"), None);
}

#[tokio::test]
async fn unknown_intents_and_blank_owners_are_rejected() {
    let fixture = Fixture::with_chf_rate().await;
    let missing = IntentId("missing".to_owned());

    let update = fixture.service().update(&missing, TWO_USERS, at(1)).await;
    assert!(matches!(
        update,
        Err(ApplicationError::Domain(DomainError::IntentNotFound(ref id))) if id == "missing"
    ));
    assert!(matches!(
        fixture.service().delete(&missing).await,
        Err(ApplicationError::Domain(DomainError::IntentNotFound(_)))
    ));
    assert!(matches!(
        fixture.service().create("  ", TWO_USERS, at(1)).await,
        Err(ApplicationError::Domain(DomainError::InvariantViolation(_)))
    ));
}

#[tokio::test]
async fn parse_failures_never_reach_enforcement() {
    let fixture = Fixture::with_chf_rate().await;

    let error = fixture
        .service()
        .create("alice", "for a select the slowest blockchain", at(1))
        .await
        .expect_err("grammar violation");

    assert!(matches!(error, ApplicationError::Domain(DomainError::Parse(_))));
    assert!(fixture.enforcement.calls().is_empty());
    assert!(fixture.intents.list_for_owner("alice").await.expect("list").is_empty());
}

#[tokio::test]
async fn list_returns_each_intent_with_its_policies() {
    let fixture = Fixture::with_chf_rate().await;
    fixture.service().create("alice", TWO_USERS, at(1)).await.expect("first");
    fixture
        .service()
        .create("alice", "for z select eos as default", at(2))
        .await
        .expect("second");

    let views = fixture.service().list("alice").await.expect("list");

    assert_eq!(views.len(), 2);
    assert_eq!(views[0].policies.len(), 2);
    assert_eq!(views[1].policies[0].policy.user, "z");
}
