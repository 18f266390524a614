use chainpolicy_core::config::PdpConfig;
use chainpolicy_core::domain::intent::Currency;
use chainpolicy_core::domain::policy::{
    CostProfile, ExternalPolicyId, Policy, PolicyInterval, TimeWindows,
};
use chainpolicy_core::reconcile::{EnforcementClient, EnforcementError};
use chainpolicy_pdp::{PdpClient, PdpClientError};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer, token: Option<&str>) -> PdpClient {
    let config = PdpConfig {
        enabled: true,
        base_url: format!("{}/", server.uri()),
        timeout_secs: 5,
        api_token: token.map(SecretString::from),
    };
    PdpClient::new(&config, TimeWindows::default()).expect("client builds")
}

fn bounded_policy(user: &str) -> Policy {
    Policy {
        user: user.to_owned(),
        cost_profile: CostProfile::Performance,
        interval: PolicyInterval::Daily,
        currency: Currency::Usd,
        threshold: Decimal::new(218, 1),
        ..Policy::default()
    }
}

fn created(id: &str) -> ResponseTemplate {
    ResponseTemplate::new(201).set_body_json(json!({ "policy": { "_id": id } }))
}

#[tokio::test]
async fn bounded_policy_for_unknown_user_bootstraps_a_default_policy() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/policies/client1"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/policies"))
        .and(body_partial_json(json!({ "username": "client1", "interval": "default", "costProfile": "performance" })))
        .respond_with(created("default-1"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/policies"))
        .and(body_partial_json(json!({ "username": "client1", "interval": "daily", "cost": 21.8, "_id": "" })))
        .respond_with(created("bounded-1"))
        .expect(1)
        .mount(&server)
        .await;

    let id = client_for(&server, None).create(&bounded_policy("client1")).await.expect("create");

    assert_eq!(id, ExternalPolicyId("bounded-1".to_owned()));
}

#[tokio::test]
async fn known_user_skips_the_bootstrap() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/policies/client1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/policies"))
        .and(body_partial_json(json!({ "_id": "bounded-1", "interval": "daily" })))
        .respond_with(created("bounded-1"))
        .expect(1)
        .mount(&server)
        .await;

    client_for(&server, None)
        .update(&ExternalPolicyId("bounded-1".to_owned()), &bounded_policy("client1"))
        .await
        .expect("update");
}

#[tokio::test]
async fn default_policy_is_posted_without_a_user_lookup() {
    let server = MockServer::start().await;
    Mock::given(method("GET")).respond_with(ResponseTemplate::new(404)).expect(0).mount(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/policies"))
        .and(header("authorization", "Bearer pdp-token"))
        .respond_with(created("default-9"))
        .expect(1)
        .mount(&server)
        .await;

    let id = client_for(&server, Some("pdp-token"))
        .create(&Policy::baseline_for("client9"))
        .await
        .expect("create");

    assert_eq!(id.0, "default-9");
}

#[tokio::test]
async fn rejection_surfaces_the_pdp_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/policies"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "message": "username missing" })))
        .mount(&server)
        .await;

    let error = client_for(&server, None)
        .create(&Policy::baseline_for("client1"))
        .await
        .expect_err("rejected");

    assert_eq!(error, EnforcementError::Rejected("username missing".to_owned()));
}

#[tokio::test]
async fn malformed_success_body_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/policies"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "ok": true })))
        .mount(&server)
        .await;

    let error = client_for(&server, None)
        .create(&Policy::baseline_for("client1"))
        .await
        .expect_err("decode failure");

    assert!(matches!(error, EnforcementError::Decode(_)));
}

#[tokio::test]
async fn delete_targets_the_policy_resource_and_tolerates_missing_policies() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/policy/abc"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/policy/gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, None);
    client.delete(&ExternalPolicyId("abc".to_owned())).await.expect("delete");
    client.delete(&ExternalPolicyId("gone".to_owned())).await.expect("missing is fine");
}

#[tokio::test]
async fn user_and_policy_ids_are_sent_as_single_path_segments() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/policies/a%2Fb%3Fx=1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/policies"))
        .and(body_partial_json(json!({ "username": "a/b?x=1", "interval": "daily" })))
        .respond_with(created("bounded-7"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/policy/p%23frag"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, None);
    let id = client.create(&bounded_policy("a/b?x=1")).await.expect("create");
    assert_eq!(id, ExternalPolicyId("bounded-7".to_owned()));
    client.delete(&ExternalPolicyId("p#frag".to_owned())).await.expect("delete");
}

#[test]
fn base_url_must_be_a_hierarchical_url() {
    let config = PdpConfig {
        enabled: true,
        base_url: "not a url".to_owned(),
        timeout_secs: 5,
        api_token: None,
    };

    assert!(matches!(
        PdpClient::new(&config, TimeWindows::default()),
        Err(PdpClientError::InvalidBaseUrl { .. })
    ));
}

#[tokio::test]
async fn unreachable_pdp_is_a_transport_error() {
    // A pooled server keeps listening after drop; a bare one actually shuts down.
    let server = MockServer::builder().start().await;
    let client = client_for(&server, None);
    drop(server);

    let error = client.create(&Policy::baseline_for("client1")).await.expect_err("no server");

    assert!(matches!(error, EnforcementError::Transport(_)));
}
