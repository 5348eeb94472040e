//! Integration tests for the Rover adapter against a mock HTTP server.

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use usernaut_connector::{
    AuthConfig, BackendSettings, BackendType, ConnectionSettings, HttpClientConfig, MembershipOps,
    TeamOps, UserOps,
};
use usernaut_connector_rover::RoverConnector;
use usernaut_core::{Team, User};

fn connector(base_url: &str) -> RoverConnector {
    let settings = BackendSettings {
        name: "rover-main".to_string(),
        type_: BackendType::Rover,
        enabled: true,
        depends_on: None,
        connection: ConnectionSettings {
            base_url: base_url.to_string(),
            auth: AuthConfig::Bearer {
                token: "svc-token".to_string(),
            },
            params: Default::default(),
        },
    };
    let http = HttpClientConfig {
        max_retries: 0,
        ..Default::default()
    };
    RoverConnector::new(&settings, &http).unwrap()
}

#[tokio::test]
async fn test_team_id_is_the_group_name() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/groups"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;

    let team = connector(&server.uri())
        .create_team(&Team {
            name: "data-platform-group".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(team.id, "data-platform-group");
}

#[tokio::test]
async fn test_create_team_conflict_is_absorbed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/groups"))
        .respond_with(ResponseTemplate::new(409))
        .mount(&server)
        .await;

    let team = connector(&server.uri())
        .create_team(&Team {
            name: "existing-group".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(team.id, "existing-group");
}

#[tokio::test]
async fn test_user_lifecycle_is_directory_owned() {
    let server = MockServer::start().await;
    let conn = connector(&server.uri());

    let created = conn
        .create_user(&User {
            user_name: "alice".to_string(),
            email: "alice@x".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(created.id, "alice");

    conn.delete_user("alice").await.unwrap();

    let (by_id, by_email) = conn.fetch_all_users().await.unwrap();
    assert!(by_id.is_empty() && by_email.is_empty());

    // None of the above may touch the network.
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_membership_round_trip() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/groups/g/members"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"uid": "alice", "cn": "Alice Example"},
            {"uid": "bob", "cn": "Bob Example"}
        ])))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/groups/g/members/carol"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/v1/groups/g/members/bob"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let conn = connector(&server.uri());
    let members = conn.fetch_team_members_by_team_id("g").await.unwrap();
    assert_eq!(members.len(), 2);
    assert!(members.contains_key("alice"));

    conn.add_users_to_team("g", &["carol".to_string()]).await.unwrap();
    conn.remove_users_from_team("g", &["bob".to_string()]).await.unwrap();
}

#[tokio::test]
async fn test_remove_missing_member_is_success() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/v1/groups/g/members/ghost"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    connector(&server.uri())
        .remove_users_from_team("g", &["ghost".to_string()])
        .await
        .unwrap();
}
