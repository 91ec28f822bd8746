//! End-to-end REST flows: inheritance, versioning, snapshots.

use reqwest::{Method, StatusCode};
use serde_json::{json, Value};

mod common;

const ENV_BASE: &str = "/api/applications/shop/environments";

async fn create_item(client: &reqwest::Client, base: &str, env: &str, key: &str, value: &str) -> Value {
    let res = client
        .post(format!("{base}{ENV_BASE}/{env}/items"))
        .json(&json!({ "key": key, "value": value, "author": "alice" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    res.json().await.unwrap()
}

#[tokio::test]
async fn child_environment_overrides_parent() {
    let server = common::start_server().await;
    common::seed_shop(&server.center);
    let client = reqwest::Client::new();
    let base = server.url();

    create_item(&client, &base, "prod", "timeout", "30").await;
    create_item(&client, &base, "prod", "retries", "3").await;
    create_item(&client, &base, "prod-east", "timeout", "10").await;

    let merged: Value = client
        .get(format!("{base}{ENV_BASE}/prod-east/config"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(merged["chain"], json!(["prod", "prod-east"]));
    assert_eq!(merged["entries"]["timeout"]["value"], "10");
    assert_eq!(merged["entries"]["timeout"]["sourceEnvironmentId"], "prod-east");
    assert_eq!(merged["entries"]["retries"]["value"], "3");
    assert_eq!(merged["entries"]["retries"]["sourceEnvironmentId"], "prod");

    let key: Value = client
        .get(format!("{base}{ENV_BASE}/prod-east/config/retries"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(key["sourceEnvironmentId"], "prod");

    let drift: Value = client
        .get(format!("{base}/api/applications/shop/differences"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(drift["keys"]["timeout"]["environments"]["prod-east"], "10");
    assert!(drift["keys"].get("retries").is_none());
}

#[tokio::test]
async fn reparenting_into_a_cycle_is_rejected() {
    let server = common::start_server().await;
    common::seed_shop(&server.center);
    let client = reqwest::Client::new();

    let res = client
        .put(format!("{}{ENV_BASE}/prod/parent", server.url()))
        .json(&json!({ "parentEnvironmentId": "prod-east" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "CYCLIC_INHERITANCE");

    let chain: Value = client
        .get(format!("{}{ENV_BASE}/prod-east/chain", server.url()))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(chain, json!(["prod", "prod-east"]));
}

#[tokio::test]
async fn stale_expected_version_conflicts_and_rollback_restores() {
    let server = common::start_server().await;
    common::seed_shop(&server.center);
    let client = reqwest::Client::new();
    let base = server.url();

    let created = create_item(&client, &base, "prod", "timeout", "30").await;
    assert_eq!(created["versionNumber"], 1);
    assert_eq!(created["changeType"], "CREATE");

    let updated: Value = client
        .put(format!("{base}{ENV_BASE}/prod/items/timeout?expectedVersion=1"))
        .json(&json!({ "value": "60", "author": "bob" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(updated["versionNumber"], 2);

    let stale = client
        .put(format!("{base}{ENV_BASE}/prod/items/timeout?expectedVersion=1"))
        .json(&json!({ "value": "90" }))
        .send()
        .await
        .unwrap();
    assert_eq!(stale.status(), StatusCode::CONFLICT);
    let body: Value = stale.json().await.unwrap();
    assert_eq!(body["error"], "VERSION_CONFLICT");
    assert_eq!(body["details"]["actual"], 2);

    let rolled: Value = client
        .post(format!("{base}{ENV_BASE}/prod/items/timeout/rollback"))
        .json(&json!({ "targetVersion": 1, "author": "carol" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(rolled["versionNumber"], 3);
    assert_eq!(rolled["value"], "30");

    let history: Vec<Value> = client
        .get(format!("{base}{ENV_BASE}/prod/items/timeout/history"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let numbers: Vec<u64> = history.iter().map(|v| v["versionNumber"].as_u64().unwrap()).collect();
    assert_eq!(numbers, vec![3, 2, 1]);

    let diff: Value = client
        .get(format!("{base}{ENV_BASE}/prod/versions/compare?from=1&to=2"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(diff["changed"]["timeout"], json!({ "from": "30", "to": "60" }));
}

#[tokio::test]
async fn invalid_document_cannot_be_published() {
    let server = common::start_server().await;
    common::seed_shop(&server.center);
    let client = reqwest::Client::new();
    let base = server.url();

    let staged: Value = client
        .post(format!("{base}{ENV_BASE}/prod/snapshots"))
        .json(&json!({ "author": "alice", "document": { "a.b": 1, "a": { "b": 2 }, "c": null } }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = staged["id"].as_u64().unwrap();
    assert_eq!(staged["status"], "STAGED");

    let report: Value = client
        .get(format!("{base}/api/snapshots/{id}/validate"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(report["valid"], false);
    let reasons: Vec<&str> = report["violations"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["reason"].as_str().unwrap())
        .collect();
    assert!(reasons.contains(&"DUPLICATE_KEY"));
    assert!(reasons.contains(&"NULL_VALUE"));

    let res = client
        .post(format!("{base}/api/snapshots/{id}/publish"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "VALIDATION_FAILED");

    let published = client
        .get(format!("{base}{ENV_BASE}/prod/snapshots/published"))
        .send()
        .await
        .unwrap();
    assert_eq!(published.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn client_read_switches_from_live_to_published() {
    let server = common::start_server().await;
    common::seed_shop(&server.center);
    let client = reqwest::Client::new();
    let base = server.url();

    create_item(&client, &base, "prod", "timeout", "30").await;

    let live: Value = client
        .get(format!("{base}/api/client/configs/shop/prod-east"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(live["source"], "live");
    assert_eq!(live["config"]["timeout"], "30");

    let staged: Value = client
        .post(format!("{base}{ENV_BASE}/prod-east/snapshots"))
        .json(&json!({ "name": "first" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = staged["id"].as_u64().unwrap();
    let published: Value = client
        .post(format!("{base}/api/snapshots/{id}/publish?author=alice"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(published["status"], "PUBLISHED");
    assert_eq!(published["publishedBy"], "alice");

    create_item(&client, &base, "prod", "retries", "3").await;

    let served: Value = client
        .get(format!("{base}/api/client/configs/shop/prod-east"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(served["source"], "published");
    assert_eq!(served["snapshotId"], id);
    assert!(served["config"].get("retries").is_none());

    let stats: Value = client
        .get(format!("{base}{ENV_BASE}/prod-east/snapshots/statistics"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["publishedSnapshots"], 1);
}

#[tokio::test]
async fn admin_routes_require_the_api_key() {
    let server = common::start_server().await;
    let client = reqwest::Client::new();

    let anonymous = client
        .get(format!("{}/admin/status", server.url()))
        .send()
        .await
        .unwrap();
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let authorized = server.admin(&client, Method::GET, "/admin/status").send().await.unwrap();
    assert_eq!(authorized.status(), StatusCode::OK);
    let body: Value = authorized.json().await.unwrap();
    assert_eq!(body["status"], "operational");
}

#[tokio::test]
async fn responses_carry_a_request_id() {
    let server = common::start_server().await;
    let res = reqwest::get(format!("{}/health", server.url())).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn file_import_writes_item_versions() {
    let server = common::start_server().await;
    common::seed_shop(&server.center);
    let client = reqwest::Client::new();
    let base = server.url();
    create_item(&client, &base, "prod", "timeout", "30").await;

    let yaml = "timeout: 45\ndb:\n  host: db.internal\n  pool:\n    size: 10\n";
    let res = client
        .post(format!("{base}{ENV_BASE}/prod/import?format=yaml&author=importer"))
        .body(yaml)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let report: Value = res.json().await.unwrap();
    assert_eq!(report["created"], 2);
    assert_eq!(report["updated"], 1);
    assert_eq!(report["unchanged"], 0);
    assert_eq!(report["versions"].as_array().unwrap().len(), 3);

    let merged: Value = client
        .get(format!("{base}{ENV_BASE}/prod/config"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(merged["entries"]["timeout"]["value"], "45");
    assert_eq!(merged["entries"]["db.pool.size"]["value"], "10");

    let history: Value = client
        .get(format!("{base}{ENV_BASE}/prod/items/timeout/history"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history[0]["author"], "importer");
    assert_eq!(history[0]["changeType"], "UPDATE");

    let res = client
        .post(format!("{base}{ENV_BASE}/prod/import?format=properties"))
        .body("timeout=45\nregion=east\n")
        .send()
        .await
        .unwrap();
    let report: Value = res.json().await.unwrap();
    assert_eq!((report["created"].as_u64(), report["unchanged"].as_u64()), (Some(1), Some(1)));
}

#[tokio::test]
async fn file_import_rejects_unknown_format_and_bad_documents() {
    let server = common::start_server().await;
    common::seed_shop(&server.center);
    let client = reqwest::Client::new();
    let base = server.url();

    let res = client
        .post(format!("{base}{ENV_BASE}/prod/import?format=xml"))
        .body("<config/>")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "INVALID_REQUEST");

    let res = client
        .post(format!("{base}{ENV_BASE}/prod/import?format=json"))
        .body(r#"{"a.b": "1", "a": {"b": "2"}}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let versions: Value = client
        .get(format!("{base}{ENV_BASE}/prod/versions"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(versions.as_array().unwrap().len(), 0);
}
