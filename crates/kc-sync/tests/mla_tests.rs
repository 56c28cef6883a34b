//! MLA client behavior against a mocked upstream.

use kc_cache::{CacheBackend, InMemoryCache};
use kc_core::RELEASE_VERSION;
use kc_sync::config::MlaConfig;
use kc_sync::mla::MlaClient;
use kc_sync::traits::SyncApi;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer, backend: Arc<InMemoryCache>) -> MlaClient {
    let config = MlaConfig {
        base_url: format!("{}/2/", server.uri()),
        api_key: "key".to_string(),
        api_secret: "secret".to_string(),
        cache_ttl_secs: 3600,
    };
    MlaClient::new(config, backend).unwrap()
}

fn member_body(expiring_date: &str) -> serde_json::Value {
    serde_json::json!({
        "meta": {"status": "success", "code": "200"},
        "data": [{"membership": {"expiring_date": expiring_date}}]
    })
}

#[tokio::test]
async fn active_member_has_future_expiry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2/members/12345"))
        .respond_with(ResponseTemplate::new(200).set_body_json(member_body("31/12/2099")))
        .mount(&server)
        .await;

    let client = client_for(&server, Arc::new(InMemoryCache::new()));
    assert!(client.is_member("12345").await);
}

#[tokio::test]
async fn expired_member_has_past_expiry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2/members/12345"))
        .respond_with(ResponseTemplate::new(200).set_body_json(member_body("01/01/2020")))
        .mount(&server)
        .await;

    let client = client_for(&server, Arc::new(InMemoryCache::new()));
    assert!(!client.is_member("12345").await);
}

#[tokio::test]
async fn unparsable_expiry_fails_closed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2/members/12345"))
        .respond_with(ResponseTemplate::new(200).set_body_json(member_body("sometime soon")))
        .mount(&server)
        .await;

    let client = client_for(&server, Arc::new(InMemoryCache::new()));
    assert!(!client.is_member("12345").await);
}

#[tokio::test]
async fn missing_expiry_fails_closed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2/members/12345"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "meta": {"status": "success", "code": "200"},
            "data": [{"membership": {}}]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, Arc::new(InMemoryCache::new()));
    assert!(!client.is_member("12345").await);
}

#[tokio::test]
async fn error_envelope_is_not_membership() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2/members/12345"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "meta": {"status": "error", "code": "404", "message": "no such member"},
            "data": []
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, Arc::new(InMemoryCache::new()));
    assert!(!client.is_member("12345").await);
}

#[tokio::test]
async fn upstream_failure_never_raises_from_is_member() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2/members/12345"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = client_for(&server, Arc::new(InMemoryCache::new()));
    assert!(!client.is_member("12345").await);
}

#[tokio::test]
async fn malformed_email_is_rejected_before_any_call() {
    let server = MockServer::start().await;
    let client = client_for(&server, Arc::new(InMemoryCache::new()));
    assert!(client.search("not-an-email").await.is_err());
}

#[tokio::test]
async fn search_multiple_falls_back_to_later_candidate() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2/members"))
        .and(query_param("email", "a@x.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "meta": {"status": "success", "code": "200"},
            "data": [{"total_num_results": 0, "search_results": []}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/2/members"))
        .and(query_param("email", "b@y.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "meta": {"status": "success", "code": "200"},
            "data": [{
                "total_num_results": 1,
                "search_results": [{
                    "id": "77001",
                    "membership": {
                        "class_code": "REG",
                        "year_joined": "2015",
                        "membership_years": "2015-2025"
                    },
                    "general": {
                        "title": "Dr.",
                        "first_name": "B",
                        "last_name": "Yoon",
                        "email": "b@y.com",
                        "addresses": []
                    }
                }]
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, Arc::new(InMemoryCache::new()));
    let emails = vec!["a@x.com".to_string(), "b@y.com".to_string()];
    let outcome = client.search_multiple(&emails).await;
    assert_eq!(client.sync_id(&outcome).as_deref(), Some("77001"));
}

#[tokio::test]
async fn cache_hit_skips_the_network_entirely() {
    // no mocks mounted: any request would 404 and surface as NotFound
    let server = MockServer::start().await;
    let backend = Arc::new(InMemoryCache::new());

    let body = serde_json::to_vec(&serde_json::json!({
        "meta": {"status": "success", "code": "200"},
        "data": [{
            "total_num_results": 1,
            "search_results": [{
                "id": "12345",
                "membership": {
                    "class_code": "REG",
                    "year_joined": "2010",
                    "membership_years": "2010-2025"
                },
                "general": {
                    "title": "Dr.",
                    "first_name": "X",
                    "last_name": "Y",
                    "addresses": []
                }
            }]
        }]
    }))
    .unwrap();
    backend
        .set(
            "mla_search_x@y.com",
            &body,
            Duration::from_secs(300),
            RELEASE_VERSION,
        )
        .await;

    let client = client_for(&server, Arc::clone(&backend));
    let outcome = client.search("x@y.com").await.unwrap();
    assert_eq!(client.sync_id(&outcome).as_deref(), Some("12345"));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn is_member_is_idempotent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2/members/12345"))
        .respond_with(ResponseTemplate::new(200).set_body_json(member_body("31/12/2099")))
        .mount(&server)
        .await;

    let client = client_for(&server, Arc::new(InMemoryCache::new()));
    let first = client.is_member("12345").await;
    let second = client.is_member("12345").await;
    assert_eq!(first, second);
    // the second check came from cache
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}
