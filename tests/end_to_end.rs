//! End-to-end scenarios (spec §8 "literal" list), against a `wiremock`
//! stand-in for the upstream.

use flagcache::{FlagCache, FlagCacheOptions};
use serde_json::json;
use test_log::test;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn options_for(mock_server: &MockServer) -> FlagCacheOptions {
    FlagCacheOptions::new(mock_server.uri())
        .with_refresh_interval(std::time::Duration::from_secs(3600))
        .with_max_retries(0)
}

#[test(tokio::test)]
async fn brazil_launch_deterministic_local_flag() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/flags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 1, "key": "brazil_launch", "tags": []}
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/flags/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "key": "brazil_launch",
            "id": 1,
            "enabled": true,
            "segments": [{
                "rank": 0,
                "constraints": [{"property": "country", "operator": "EQ", "value": "BR"}],
                "rollout_percent": 100,
                "distributions": [{"variant_key": "on", "percent": 100}]
            }],
            "variants": [{"key": "on", "attachment": {"enabled": true}}],
            "tags": []
        })))
        .mount(&mock_server)
        .await;

    let cache = FlagCache::new(options_for(&mock_server)).unwrap();
    cache.start(tokio_util::sync::CancellationToken::new()).await.unwrap();

    let br = flagcache::EvaluationContext::new("u1").with_attribute("country", "BR");
    let us = flagcache::EvaluationContext::new("u1").with_attribute("country", "US");

    assert!(cache.bool_value("brazil_launch", &br, false).await);
    assert!(!cache.bool_value("brazil_launch", &us, false).await);

    // Zero upstream calls were issued by evaluation itself — only the one
    // refresh during `start` hit `/api/v1/flags` and `/api/v1/flags/1`.
    assert_eq!(mock_server.received_requests().await.unwrap().len(), 2);

    cache.stop().await.unwrap();
}

#[test(tokio::test)]
async fn gradual_partial_rollout_goes_remote() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/flags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 2, "key": "gradual", "tags": []}
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/flags/2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "key": "gradual",
            "id": 2,
            "enabled": true,
            "segments": [{
                "rank": 0,
                "constraints": [],
                "rollout_percent": 30,
                "distributions": [{"variant_key": "enabled", "percent": 100}]
            }],
            "variants": [],
            "tags": []
        })))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/v1/evaluation"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "flagKey": "gradual",
            "variantKey": "enabled",
            "variantID": 1,
            "variantAttachment": {"enabled": true}
        })))
        .mount(&mock_server)
        .await;

    let cache = FlagCache::new(options_for(&mock_server)).unwrap();
    cache.start(tokio_util::sync::CancellationToken::new()).await.unwrap();

    let ctx = flagcache::EvaluationContext::new("u1");
    assert!(cache.bool_value("gradual", &ctx, false).await);

    cache.stop().await.unwrap();
}

#[test(tokio::test)]
async fn circuit_opens_after_max_failures() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/flags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 3, "key": "gradual", "tags": []}
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/flags/3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "key": "gradual",
            "id": 3,
            "enabled": true,
            "segments": [{
                "rank": 0,
                "constraints": [],
                "rollout_percent": 30,
                "distributions": [{"variant_key": "enabled", "percent": 100}]
            }],
            "variants": [],
            "tags": []
        })))
        .mount(&mock_server)
        .await;

    // No mock for POST /api/v1/evaluation -> wiremock answers 404, which our
    // client treats as a terminal (non-retryable) failure that still counts
    // against the breaker.
    let mut options = options_for(&mock_server);
    options.circuit.threshold = 3;
    options.circuit.timeout = std::time::Duration::from_millis(50);

    let cache = FlagCache::new(options).unwrap();
    cache.start(tokio_util::sync::CancellationToken::new()).await.unwrap();

    let ctx = flagcache::EvaluationContext::new("u1");
    for _ in 0..3 {
        let _ = cache.evaluate("gradual", &ctx).await;
    }

    let started = std::time::Instant::now();
    let result = cache.evaluate("gradual", &ctx).await;
    assert!(started.elapsed() < std::time::Duration::from_millis(20));
    assert!(matches!(result, Err(flagcache::FlagCacheError::Evaluation { .. }) | Ok(_)));

    cache.stop().await.unwrap();
}

/// Grab an ephemeral port by binding then immediately dropping a listener.
/// Good enough for a single-process test suite; a true TOCTOU race against
/// another process binding first is not a concern here.
fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn signed_body(secret: &str, body: &str) -> String {
    use hmac::{Hmac, Mac};
    let mut mac = Hmac::<sha2::Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[test(tokio::test)]
async fn webhook_invalidation_triggers_refresh() {
    let mock_server = MockServer::start().await;
    let secret = "shared-secret";
    let webhook_port = free_port();

    Mock::given(method("GET"))
        .and(path("/api/v1/flags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 4, "key": "feat_x", "tags": []}
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/flags/4"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "key": "feat_x",
            "id": 4,
            "enabled": true,
            "segments": [],
            "variants": [],
            "tags": []
        })))
        .mount(&mock_server)
        .await;

    let options = options_for(&mock_server).with_webhook(webhook_port, Some(secret.to_string()));
    let cache = FlagCache::new(options).unwrap();
    cache.start(tokio_util::sync::CancellationToken::new()).await.unwrap();

    let ctx = flagcache::EvaluationContext::new("u1");

    // Cached and locally evaluated: no matching segment, but still a cache
    // hit (distinct from the post-invalidation "flag not cached" reason).
    let before = cache.evaluate("feat_x", &ctx).await.unwrap();
    assert_eq!(before.evaluation_reason, "no segment matched");

    // A wrong signature must be rejected and must not invalidate anything.
    let body = json!({
        "event": "flag.deleted",
        "flag_keys": ["feat_x"],
        "timestamp": "2026-01-01T00:00:00Z"
    })
    .to_string();
    let http = reqwest::Client::new();
    let rejected = http
        .post(format!("http://127.0.0.1:{webhook_port}/webhook"))
        .header("x-flagcache-signature", "0000")
        .body(body.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(rejected.status(), reqwest::StatusCode::UNAUTHORIZED);
    let still_cached = cache.evaluate("feat_x", &ctx).await.unwrap();
    assert_eq!(still_cached.evaluation_reason, "no segment matched");

    // A correctly signed `flag.deleted` event actually deletes the flag —
    // the deletion happens synchronously in the handler before it responds,
    // so the cache miss is observable immediately after the request returns.
    let signature = signed_body(secret, &body);
    let accepted = http
        .post(format!("http://127.0.0.1:{webhook_port}/webhook"))
        .header("x-flagcache-signature", signature)
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(accepted.status(), reqwest::StatusCode::OK);

    let after = cache.evaluate("feat_x", &ctx).await.unwrap();
    assert_eq!(after.evaluation_reason, "flag not cached");

    cache.stop().await.unwrap();
}

#[test(tokio::test)]
async fn disk_warm_start_survives_dead_upstream() {
    let dir = tempfile::tempdir().unwrap();
    let disk_path = dir.path().join("mirror.json");

    // First run: populate the mirror against a live upstream.
    {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/flags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 5, "key": "warm_flag", "tags": []}
            ])))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/flags/5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "key": "warm_flag",
                "id": 5,
                "enabled": true,
                "segments": [],
                "variants": [],
                "tags": []
            })))
            .mount(&mock_server)
            .await;

        let options = options_for(&mock_server).with_disk(true, disk_path.to_str().unwrap());
        let cache = FlagCache::new(options).unwrap();
        cache.start(tokio_util::sync::CancellationToken::new()).await.unwrap();
        cache.stop().await.unwrap();
    }

    // Second run: upstream refuses every connection; `start` must still
    // succeed off the mirror.
    let dead_endpoint = "http://127.0.0.1:1";
    let options = FlagCacheOptions::new(dead_endpoint)
        .with_max_retries(0)
        .with_refresh_interval(std::time::Duration::from_secs(3600))
        .with_disk(true, disk_path.to_str().unwrap());
    let mut options = options;
    options.initial_timeout = std::time::Duration::from_millis(200);

    let cache = FlagCache::new(options).unwrap();
    cache.start(tokio_util::sync::CancellationToken::new()).await.unwrap();

    let ctx = flagcache::EvaluationContext::new("u1");
    assert!(cache.bool_value("warm_flag", &ctx, false).await);

    cache.stop().await.unwrap();
}

#[test(tokio::test)]
async fn filter_correctness_keeps_only_matching_tag() {
    let mock_server = MockServer::start().await;

    let mut summaries = vec![json!({"id": 100, "key": "untagged", "tags": []})];
    for i in 0..3 {
        summaries.push(json!({"id": i, "key": format!("tagged_{i}"), "tags": ["user-service"]}));
    }

    Mock::given(method("GET"))
        .and(path("/api/v1/flags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(summaries)))
        .mount(&mock_server)
        .await;

    for i in 0..3 {
        Mock::given(method("GET"))
            .and(path(format!("/api/v1/flags/{i}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "key": format!("tagged_{i}"),
                "id": i,
                "enabled": true,
                "segments": [],
                "variants": [],
                "tags": ["user-service"]
            })))
            .mount(&mock_server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/api/v1/flags/100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "key": "untagged",
            "id": 100,
            "enabled": true,
            "segments": [],
            "variants": [],
            "tags": []
        })))
        .mount(&mock_server)
        .await;

    let mut filter = flagcache::FilterOptions::default();
    filter.service_name = Some("user-service".to_string());
    filter.require_service_tag = true;

    let options = options_for(&mock_server).with_filter(filter);
    let cache = FlagCache::new(options).unwrap();
    cache.start(tokio_util::sync::CancellationToken::new()).await.unwrap();

    let ctx = flagcache::EvaluationContext::new("u1");
    assert!(cache.evaluate("tagged_0", &ctx).await.is_ok());
    let untagged = cache.evaluate("untagged", &ctx).await;
    assert!(matches!(
        untagged,
        Ok(ref r) if r.evaluation_reason == "flag not cached"
    ));

    cache.stop().await.unwrap();
}
