//! `warden acl token update` against a mocked ACL HTTP API

use serde_json::json;
use warden_cli::command::token_update::{TokenUpdateArgs, token_update};
use warden_cli::{HttpAclStore, HttpClientConfig};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const READ_ONLY_ID: &str = "5e52a099-4c90-c067-5478-980f06be9a22";
const WRITE_ID: &str = "7c4a1b2e-91f0-4a55-b0a4-1d2f3e4a5b6c";

async fn mount_catalog(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/v1/acl/tokens"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"AccessorID": "aaaa1111-0000-0000-0000-000000000000", "Description": "agent",
             "Policies": [{"ID": READ_ONLY_ID, "Name": "read-only"}], "Local": false,
             "Legacy": false, "CreateIndex": 5, "ModifyIndex": 5},
            {"AccessorID": "bbbb2222-0000-0000-0000-000000000000", "Description": "other",
             "Policies": [], "Local": false, "Legacy": false, "CreateIndex": 6, "ModifyIndex": 6}
        ])))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/acl/policies"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"ID": READ_ONLY_ID, "Name": "read-only", "Description": "", "CreateIndex": 3, "ModifyIndex": 3},
            {"ID": WRITE_ID, "Name": "write", "Description": "", "CreateIndex": 4, "ModifyIndex": 4}
        ])))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/acl/token/aaaa1111-0000-0000-0000-000000000000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "AccessorID": "aaaa1111-0000-0000-0000-000000000000",
            "SecretID": "3b5e1f0a-0000-0000-0000-000000000000",
            "Description": "agent",
            "Policies": [{"ID": READ_ONLY_ID, "Name": "read-only"}],
            "Local": false,
            "CreateTime": "2018-10-24T16:25:06.921933Z",
            "CreateIndex": 5,
            "ModifyIndex": 5
        })))
        .mount(server)
        .await;
}

fn store_for(server: &MockServer) -> HttpAclStore {
    HttpAclStore::new(HttpClientConfig::new(&server.uri()).with_token("default-token")).unwrap()
}

#[tokio::test]
async fn test_merge_by_prefix_over_http() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;

    Mock::given(method("PUT"))
        .and(path("/v1/acl/token/aaaa1111-0000-0000-0000-000000000000"))
        .and(header("X-Consul-Token", "operator"))
        .and(body_partial_json(json!({
            "Description": "",
            "Policies": [
                {"ID": READ_ONLY_ID, "Name": "read-only"},
                {"ID": WRITE_ID}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "AccessorID": "aaaa1111-0000-0000-0000-000000000000",
            "SecretID": "3b5e1f0a-0000-0000-0000-000000000000",
            "Description": "agent",
            "Policies": [
                {"ID": READ_ONLY_ID, "Name": "read-only"},
                {"ID": WRITE_ID, "Name": "write"}
            ],
            "CreateIndex": 5,
            "ModifyIndex": 9
        })))
        .expect(1)
        .mount(&server)
        .await;

    let args = TokenUpdateArgs {
        id: "aaaa".to_string(),
        policy_ids: vec!["7c4a".to_string()],
        merge_policies: true,
        ..Default::default()
    };
    let token = token_update(&store_for(&server), "", "operator", &args)
        .await
        .unwrap();

    assert_eq!(token.modify_index, 9);
    assert_eq!(token.policies[1].name, "write");
}

#[tokio::test]
async fn test_unknown_policy_prefix_writes_nothing() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;

    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let args = TokenUpdateArgs {
        id: "aaaa".to_string(),
        policy_ids: vec!["ffff".to_string()],
        ..Default::default()
    };
    let err = token_update(&store_for(&server), "", "", &args)
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Error resolving policy ID ffff: No such policy ID with prefix: ffff"
    );
}

#[tokio::test]
async fn test_server_rejection_is_reported() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;

    Mock::given(method("PUT"))
        .and(path("/v1/acl/token/aaaa1111-0000-0000-0000-000000000000"))
        .respond_with(ResponseTemplate::new(403).set_body_string("Permission denied"))
        .mount(&server)
        .await;

    let args = TokenUpdateArgs {
        id: "aaaa1111".to_string(),
        description: "renamed".to_string(),
        policy_names: vec!["write".to_string()],
        ..Default::default()
    };
    let err = token_update(&store_for(&server), "", "", &args)
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Failed to update token aaaa1111-0000-0000-0000-000000000000: Unexpected response code: 403 (Permission denied)"
    );
}
