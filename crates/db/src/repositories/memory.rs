use std::collections::HashMap;

use rust_decimal::Decimal;
use tokio::sync::RwLock;

use chainpolicy_core::domain::intent::{Currency, IntentId, IntentRecord};
use chainpolicy_core::domain::policy::{PolicyRecord, PolicyRecordId};

use super::{
    ConversionRate, ConversionRateRepository, IntentRepository, PolicyRecordRepository,
    RepositoryError,
};

#[derive(Default)]
pub struct InMemoryIntentRepository {
    intents: RwLock<HashMap<String, IntentRecord>>,
}

#[async_trait::async_trait]
impl IntentRepository for InMemoryIntentRepository {
    async fn find_by_id(&self, id: &IntentId) -> Result<Option<IntentRecord>, RepositoryError> {
        Ok(self.intents.read().await.get(&id.0).cloned())
    }

    async fn list_for_owner(&self, owner: &str) -> Result<Vec<IntentRecord>, RepositoryError> {
        let mut intents: Vec<IntentRecord> = self
            .intents
            .read()
            .await
            .values()
            .filter(|intent| intent.owner == owner)
            .cloned()
            .collect();
        intents.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.0.cmp(&b.id.0)));
        Ok(intents)
    }

    async fn save(&self, intent: IntentRecord) -> Result<(), RepositoryError> {
        let mut intents = self.intents.write().await;
        let created_at = intents.get(&intent.id.0).map(|existing| existing.created_at);
        let mut intent = intent;
        if let Some(created_at) = created_at {
            intent.created_at = created_at;
        }
        intents.insert(intent.id.0.clone(), intent);
        Ok(())
    }

    async fn delete(&self, id: &IntentId) -> Result<bool, RepositoryError> {
        Ok(self.intents.write().await.remove(&id.0).is_some())
    }
}

/// Does not cascade from intent deletion; callers remove records explicitly.
#[derive(Default)]
pub struct InMemoryPolicyRecordRepository {
    records: RwLock<HashMap<String, PolicyRecord>>,
}

#[async_trait::async_trait]
impl PolicyRecordRepository for InMemoryPolicyRecordRepository {
    async fn list_for_intent(
        &self,
        intent_id: &IntentId,
    ) -> Result<Vec<PolicyRecord>, RepositoryError> {
        let mut records: Vec<PolicyRecord> = self
            .records
            .read()
            .await
            .values()
            .filter(|record| &record.intent_id == intent_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.0.cmp(&b.id.0)));
        Ok(records)
    }

    async fn save(&self, record: PolicyRecord) -> Result<(), RepositoryError> {
        let mut records = self.records.write().await;
        let created_at = records.get(&record.id.0).map(|existing| existing.created_at);
        let mut record = record;
        if let Some(created_at) = created_at {
            record.created_at = created_at;
        }
        records.insert(record.id.0.clone(), record);
        Ok(())
    }

    async fn delete(&self, id: &PolicyRecordId) -> Result<(), RepositoryError> {
        self.records
            .write()
            .await
            .remove(&id.0)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::NotFound(format!("policy record {id}")))
    }

    async fn delete_for_intent(&self, intent_id: &IntentId) -> Result<u64, RepositoryError> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, record| &record.intent_id != intent_id);
        Ok((before - records.len()) as u64)
    }
}

#[derive(Default)]
pub struct InMemoryConversionRateRepository {
    rates: RwLock<HashMap<Currency, ConversionRate>>,
}

#[async_trait::async_trait]
impl ConversionRateRepository for InMemoryConversionRateRepository {
    async fn find_rate(&self, currency: Currency) -> Result<Option<Decimal>, RepositoryError> {
        Ok(self.rates.read().await.get(&currency).map(|rate| rate.rate))
    }

    async fn save_rate(&self, rate: ConversionRate) -> Result<(), RepositoryError> {
        self.rates.write().await.insert(rate.currency, rate);
        Ok(())
    }

    async fn list_rates(&self) -> Result<Vec<ConversionRate>, RepositoryError> {
        let mut rates: Vec<ConversionRate> = self.rates.read().await.values().cloned().collect();
        rates.sort_by_key(|rate| rate.currency.as_str());
        Ok(rates)
    }
}
