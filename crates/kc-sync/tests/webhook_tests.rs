//! Logout broadcast and IDMS webhook delivery tests.

use kc_sync::logout::broadcast_logout;
use kc_sync::webhooks::{EventType, IdmsClient, UserUpdate};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn broadcast_collects_one_result_per_endpoint_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ok"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/refuses"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let urls = vec![
        format!("{}/ok", server.uri()),
        format!("{}/refuses", server.uri()),
        // nothing listens on the discard port
        "http://127.0.0.1:9/unreachable".to_string(),
    ];
    let results = broadcast_logout(&urls).await.unwrap();

    assert_eq!(results.len(), 3);
    assert!(results[0].ok);
    assert_eq!(results[0].status, Some(200));
    assert!(!results[1].ok);
    assert_eq!(results[1].status, Some(500));
    assert!(!results[2].ok);
    assert!(results[2].error.is_some());
}

#[tokio::test]
async fn broadcast_of_nothing_is_empty() {
    let results = broadcast_logout(&[]).await.unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn idms_update_is_delivered_with_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/webhooks/user_data_update"))
        .and(header("Authorization", "Bearer hook-secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let client = IdmsClient::new(server.uri(), "hook-secret").unwrap();
    let response = client
        .post_user_data_update(
            vec![UserUpdate {
                id: "jo".to_string(),
                event: EventType::Updated,
            }],
            vec![],
        )
        .await;
    assert_eq!(response, Some(serde_json::json!({"ok": true})));
}

#[tokio::test]
async fn idms_rejection_is_swallowed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/webhooks/user_data_update"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let client = IdmsClient::new(server.uri(), "hook-secret").unwrap();
    let response = client
        .post_user_data_update(
            vec![UserUpdate {
                id: "jo".to_string(),
                event: EventType::Updated,
            }],
            vec![],
        )
        .await;
    assert_eq!(response, None);
}

#[tokio::test]
async fn idms_refuses_empty_updates_without_calling_out() {
    let server = MockServer::start().await;
    let client = IdmsClient::new(server.uri(), "hook-secret").unwrap();
    assert_eq!(client.post_user_data_update(vec![], vec![]).await, None);
    assert!(server.received_requests().await.unwrap().is_empty());
}
