use async_trait::async_trait;
use tracing::debug;

use chainpolicy_core::domain::policy::{ExternalPolicyId, Policy};
use chainpolicy_core::reconcile::{EnforcementClient, EnforcementError};

/// Stand-in used when enforcement is disabled. Every call succeeds and created
/// policies receive no external id.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopEnforcementClient;

#[async_trait]
impl EnforcementClient for NoopEnforcementClient {
    async fn create(&self, policy: &Policy) -> Result<ExternalPolicyId, EnforcementError> {
        debug!(event_name = "pdp.disabled", user = %policy.user, "enforcement disabled, skipping create");
        Ok(ExternalPolicyId::default())
    }

    async fn update(&self, _id: &ExternalPolicyId, policy: &Policy) -> Result<(), EnforcementError> {
        debug!(event_name = "pdp.disabled", user = %policy.user, "enforcement disabled, skipping update");
        Ok(())
    }

    async fn delete(&self, _id: &ExternalPolicyId) -> Result<(), EnforcementError> {
        Ok(())
    }
}
