mod common;

use reqwest::StatusCode;
use serde_json::json;

use common::TestServer;
use metrics_relay::{HashKey, Kind, Metric, MetricPayload, MetricsError};

#[tokio::test]
async fn plain_text_updates_accumulate() {
    let srv = TestServer::in_memory(HashKey::disabled()).await;
    let http = reqwest::Client::new();

    for path in [
        "/update/counter/PollCount/123",
        "/update/counter/PollCount/77",
        "/update/gauge/Alloc/111.222",
        "/update/gauge/Alloc/222.333",
    ] {
        let resp = http.post(srv.url(path)).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK, "{path}");
    }

    let counter = http.get(srv.url("/value/counter/PollCount")).send().await.unwrap();
    assert_eq!(counter.status(), StatusCode::OK);
    assert_eq!(counter.text().await.unwrap(), "200");

    let gauge = http.get(srv.url("/value/gauge/Alloc")).send().await.unwrap();
    assert_eq!(gauge.text().await.unwrap(), "222.333");

    srv.stop().await;
}

#[tokio::test]
async fn plain_text_error_statuses() {
    let srv = TestServer::in_memory(HashKey::disabled()).await;
    let http = reqwest::Client::new();

    let cases = [
        ("/update/histogram/h/1", StatusCode::NOT_IMPLEMENTED),
        ("/update/counter/PollCount/value", StatusCode::BAD_REQUEST),
        ("/update/gauge/Alloc/none", StatusCode::BAD_REQUEST),
    ];
    for (path, want) in cases {
        let resp = http.post(srv.url(path)).send().await.unwrap();
        assert_eq!(resp.status(), want, "{path}");
    }

    let resp = http.get(srv.url("/value/counter/missing")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], 404);

    let resp = http.get(srv.url("/value/summary/x")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_IMPLEMENTED);

    assert!(srv.storage.get_all().await.unwrap().is_empty());
    srv.stop().await;
}

#[tokio::test]
async fn json_update_is_signed_and_verified() {
    let key = HashKey::new("secret");
    let srv = TestServer::in_memory(key.clone()).await;
    let http = reqwest::Client::new();

    let signed = MetricPayload::from(Metric::counter("PollCount", 5).signed(&key));
    let resp = http.post(srv.url("/update/")).json(&signed).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let stored: MetricPayload = resp.json().await.unwrap();
    assert_eq!(stored.delta, Some(5));
    assert!(stored.hash.is_some());
    assert_eq!(stored.validate(&key).unwrap(), Metric::counter("PollCount", 5).signed(&key));

    // unsigned input is accepted
    let unsigned = MetricPayload::from(Metric::counter("PollCount", 1));
    let resp = http.post(srv.url("/update/")).json(&unsigned).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = http
        .post(srv.url("/value/"))
        .json(&json!({"id": "PollCount", "type": "counter"}))
        .send()
        .await
        .unwrap();
    let read: MetricPayload = resp.json().await.unwrap();
    assert_eq!(read.delta, Some(6));
    assert!(read.validate(&key).is_ok());

    srv.stop().await;
}

#[tokio::test]
async fn wrong_hash_leaves_store_unchanged() {
    let srv = TestServer::in_memory(HashKey::new("secret")).await;
    let http = reqwest::Client::new();

    let resp = http
        .post(srv.url("/update/"))
        .json(&json!({"id": "X", "type": "counter", "delta": 5, "hash": "deadbeef"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // signed with a different key
    let forged = MetricPayload::from(Metric::counter("X", 5).signed(&HashKey::new("other")));
    let resp = http.post(srv.url("/update/")).json(&forged).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    assert!(srv.storage.get_all().await.unwrap().is_empty());
    srv.stop().await;
}

#[tokio::test]
async fn json_routes_map_errors_to_400_and_404() {
    let srv = TestServer::in_memory(HashKey::disabled()).await;
    let http = reqwest::Client::new();

    let bad_type = json!({"id": "x", "type": "summary", "value": 1.0});
    let resp = http.post(srv.url("/update/")).json(&bad_type).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let missing_delta = json!({"id": "c", "type": "counter"});
    let resp = http.post(srv.url("/update/")).json(&missing_delta).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = http
        .post(srv.url("/update/"))
        .header("Content-Type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], 400);

    let resp = http
        .post(srv.url("/value/"))
        .json(&json!({"id": "nope", "type": "gauge"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    srv.stop().await;
}

#[tokio::test]
async fn invalid_entry_rejects_whole_batch() {
    let srv = TestServer::in_memory(HashKey::disabled()).await;
    let http = reqwest::Client::new();

    let batch = json!([
        {"id": "PollCount", "type": "counter", "delta": 1},
        {"id": "Alloc", "type": "gauge"},
    ]);
    let resp = http.post(srv.url("/updates/")).json(&batch).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(srv.storage.get_all().await.unwrap().is_empty());

    let batch = json!([
        {"id": "PollCount", "type": "counter", "delta": 1},
        {"id": "PollCount", "type": "counter", "delta": 2},
        {"id": "Alloc", "type": "gauge", "value": 3.5},
    ]);
    let resp = http.post(srv.url("/updates/")).json(&batch).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let stored: Vec<MetricPayload> = resp.json().await.unwrap();
    let deltas: Vec<_> = stored.iter().map(|p| p.delta).collect();
    assert_eq!(deltas, vec![Some(1), Some(3), None]);
    assert_eq!(stored[2].value, Some(3.5));

    srv.stop().await;
}

#[tokio::test]
async fn index_and_ping() {
    let srv = TestServer::in_memory(HashKey::disabled()).await;
    srv.storage.update_one(Metric::gauge("Alloc", 111.222)).await.unwrap();
    srv.storage.update_one(Metric::counter("PollCount", 333)).await.unwrap();

    let http = reqwest::Client::new();
    let resp = http.get(srv.url("/ping")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = http.get(srv.url("/")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let html = resp.text().await.unwrap();
    assert!(html.contains("<td>Alloc</td><td>111.222</td>"));
    assert!(html.contains("<td>PollCount</td><td>333</td>"));
    assert!(html.find("Alloc").unwrap() < html.find("PollCount").unwrap());

    srv.stop().await;
}

#[tokio::test]
async fn closed_store_answers_503() {
    let srv = TestServer::in_memory(HashKey::disabled()).await;
    srv.storage.close().await;

    let http = reqwest::Client::new();
    let resp = http.post(srv.url("/update/counter/c/1")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

    // reads are still served
    let err = srv.storage.get_one("c", Kind::Counter).await.unwrap_err();
    assert!(matches!(err, MetricsError::NotFound { .. }));
    srv.stop().await;
}

#[tokio::test]
async fn requests_outside_trusted_subnet_are_forbidden() {
    let srv = TestServer::restricted("10.0.0.0/8").await;
    let http = reqwest::Client::new();

    let resp = http
        .post(srv.url("/update/counter/c/1"))
        .header("X-Real-IP", "10.1.2.3")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = http
        .post(srv.url("/update/counter/c/1"))
        .header("X-Real-IP", "192.168.1.1")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], 403);

    let resp = http
        .post(srv.url("/updates/"))
        .header("X-Forwarded-For", "172.16.0.2, 10.0.0.1")
        .json(&json!([{"id": "c", "type": "counter", "delta": 5}]))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // the loopback peer is outside 10.0.0.0/8
    let resp = http.get(srv.url("/ping")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // only the first request was applied
    assert_eq!(
        srv.storage.get_one("c", Kind::Counter).await.unwrap(),
        Metric::counter("c", 1)
    );
    srv.stop().await;
}

#[tokio::test]
async fn peer_address_is_checked_without_proxy_headers() {
    let srv = TestServer::restricted("127.0.0.0/8").await;
    let client = srv.client(1);

    let report = metrics_relay::Report::new(vec![Metric::counter("PollCount", 2)]);
    client.send_batch(&report).await.unwrap();
    client.send_each(&report).await.unwrap();

    assert_eq!(
        srv.storage.get_one("PollCount", Kind::Counter).await.unwrap(),
        Metric::counter("PollCount", 4)
    );
    srv.stop().await;
}

#[tokio::test]
async fn negative_counter_deltas_are_accepted() {
    let srv = TestServer::in_memory(HashKey::disabled()).await;
    let http = reqwest::Client::new();

    let resp = http.post(srv.url("/update/counter/balance/10")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let resp = http.post(srv.url("/update/counter/balance/-4")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = http
        .post(srv.url("/update/"))
        .json(&json!({"id": "balance", "type": "counter", "delta": -7}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let stored: MetricPayload = resp.json().await.unwrap();
    assert_eq!(stored.delta, Some(-1));

    let value = http.get(srv.url("/value/counter/balance")).send().await.unwrap();
    assert_eq!(value.text().await.unwrap(), "-1");
    srv.stop().await;
}
