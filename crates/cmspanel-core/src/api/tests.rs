use std::sync::Arc;

use httpmock::prelude::*;
use serde_json::{json, Value};

use super::*;
use crate::auth::{CredentialStore, MemoryStore, SessionContext, SessionController, SessionEvent, SessionState};
use crate::models::{Role, SettingsPatch};

fn admin_json() -> Value {
    json!({ "id": 1, "email": "a@b.com", "name": "Ada", "role": "admin" })
}

fn api_client(server: &MockServer, store: Arc<dyn CredentialStore>) -> ApiClient {
    let session = SessionContext::new(store);
    ApiClient::new(ClientOptions::new(server.base_url()), session).unwrap()
}

#[tokio::test]
async fn requests_carry_the_current_token() {
    let server = MockServer::start_async().await;
    let with_abc = server.mock(|when, then| {
        when.method(GET).path("/posts").header("authorization", "Bearer abc");
        then.status(200).json_body(json!([{ "id": 1, "title": "Hello" }]));
    });
    let with_def = server.mock(|when, then| {
        when.method(GET).path("/pages").header("authorization", "Bearer def");
        then.status(200).json_body(json!({ "data": [] }));
    });

    let store = Arc::new(MemoryStore::new());
    let client = api_client(&server, store.clone());

    store.set_token("abc").await.unwrap();
    let posts: Vec<Value> = client.list(Resource::Posts).await.unwrap();
    assert_eq!(posts.len(), 1);

    store.set_token("def").await.unwrap();
    let pages: Vec<Value> = client.list(Resource::Pages).await.unwrap();
    assert!(pages.is_empty());

    with_abc.assert();
    with_def.assert();
}

#[tokio::test]
async fn rolling_refresh_replaces_the_stored_token() {
    let server = MockServer::start_async().await;
    let first = server.mock(|when, then| {
        when.method(GET).path("/settings/website").header("authorization", "Bearer abc");
        then.status(200)
            .header("x-refresh-token", "rolled")
            .json_body(json!({ "maintenanceMode": false, "comingSoonMode": true }));
    });
    let second = server.mock(|when, then| {
        when.method(PUT)
            .path("/settings/website")
            .header("authorization", "Bearer rolled")
            .json_body(json!({ "maintenanceMode": true }));
        then.status(200)
            .json_body(json!({ "maintenanceMode": true, "comingSoonMode": true }));
    });

    let store = Arc::new(MemoryStore::new());
    store.set_token("abc").await.unwrap();
    let client = api_client(&server, store.clone());
    let mut events = client.session().subscribe_events();

    let settings = client.website_settings().await.unwrap();
    assert!(settings.coming_soon_mode);
    assert_eq!(store.get_token().await.unwrap().as_deref(), Some("rolled"));
    assert_eq!(events.try_recv().unwrap(), SessionEvent::TokenRefreshed);

    let patch = SettingsPatch {
        maintenance_mode: Some(true),
        ..Default::default()
    };
    let settings = client.update_website_settings(&patch).await.unwrap();
    assert!(settings.maintenance_mode);

    first.assert();
    second.assert();
}

#[tokio::test]
async fn refresh_header_on_error_response_still_rolls_token() {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(GET).path("/posts/99");
        then.status(404)
            .header("x-refresh-token", "rolled")
            .json_body(json!({ "error": "Post not found" }));
    });

    let store = Arc::new(MemoryStore::new());
    store.set_token("abc").await.unwrap();
    let client = api_client(&server, store.clone());

    let err = client.fetch::<Value>(Resource::Posts, "99").await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound(ref m) if m == "Post not found"));
    assert_eq!(store.get_token().await.unwrap().as_deref(), Some("rolled"));
}

#[tokio::test]
async fn unauthorized_response_drops_the_session() {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(POST).path("/auth/login");
        then.status(200).json_body(json!({ "token": "xyz", "user": admin_json() }));
    });
    server.mock(|when, then| {
        when.method(DELETE).path("/messages/5");
        then.status(401).json_body(json!({ "error": "Token expired" }));
    });

    let store = Arc::new(MemoryStore::with_profile_cache());
    let client = api_client(&server, store.clone());
    let session = SessionController::new(client.clone());
    assert!(session.login("a@b.com", "pw").await);
    assert_eq!(session.user().map(|u| u.role), Some(Role::Admin));

    let mut events = client.session().subscribe_events();
    let err = client.remove(Resource::Messages, "5").await.unwrap_err();
    assert!(err.is_unauthorized());

    assert_eq!(store.get_token().await.unwrap(), None);
    assert_eq!(store.get_profile().await.unwrap(), None);

    let snapshot = session.snapshot();
    assert_eq!(snapshot.state, SessionState::Anonymous);
    assert!(snapshot.user.is_none());
    assert!(snapshot.error.is_some());
    assert!(matches!(events.try_recv().unwrap(), SessionEvent::Expired { .. }));
}

#[tokio::test]
async fn other_errors_pass_through_untouched() {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(POST).path("/team");
        then.status(422).json_body(json!({ "error": "Name is required" }));
    });
    server.mock(|when, then| {
        when.method(PUT).path("/users/3");
        then.status(403).json_body(json!({ "message": "Admins only" }));
    });
    server.mock(|when, then| {
        when.method(GET).path("/media");
        then.status(500).body("upstream exploded");
    });

    let store = Arc::new(MemoryStore::new());
    store.set_token("abc").await.unwrap();
    let client = api_client(&server, store.clone());

    let err = client.create::<Value, _>(Resource::Team, &json!({})).await.unwrap_err();
    assert!(matches!(err, ApiError::Rejected { status: 422, ref message } if message == "Name is required"));

    let err = client
        .update::<Value, _>(Resource::Users, "3", &json!({ "role": "admin" }))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::AccessDenied(ref m) if m == "Admins only"));

    let err = client.list::<Value>(Resource::Media).await.unwrap_err();
    assert!(matches!(err, ApiError::ServerError(ref m) if m == "upstream exploded"));

    // None of these touch the session
    assert_eq!(store.get_token().await.unwrap().as_deref(), Some("abc"));
}

#[tokio::test]
async fn login_sends_no_retry_and_makes_one_attempt() {
    let server = MockServer::start_async().await;
    let login = server.mock(|when, then| {
        when.method(POST).path("/auth/login");
        then.status(429);
    });

    let client = api_client(&server, Arc::new(MemoryStore::new()));
    let err = client.login("a@b.com", "pw").await.unwrap_err();
    assert!(matches!(err, ApiError::RateLimited));
    assert_eq!(login.hits(), 1);
}

#[tokio::test]
async fn unauthenticated_requests_still_go_out() {
    let server = MockServer::start_async().await;
    let public = server.mock(|when, then| {
        when.method(GET).path("/settings/website");
        then.status(200).json_body(json!({ "maintenanceMode": true }));
    });

    let client = api_client(&server, Arc::new(MemoryStore::new()));
    let settings = client.website_settings().await.unwrap();
    assert!(settings.maintenance_mode);
    assert!(!settings.coming_soon_mode);
    public.assert();
}

#[tokio::test]
async fn profile_update_round_trip() {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(PUT)
            .path("/auth/profile")
            .header("authorization", "Bearer abc")
            .json_body(json!({ "name": "Grace" }));
        then.status(200).json_body(json!({ "user": {
            "id": 1, "email": "a@b.com", "name": "Grace", "role": "redakteur"
        }}));
    });

    let store = Arc::new(MemoryStore::new());
    store.set_token("abc").await.unwrap();
    let client = api_client(&server, store);

    let patch = crate::models::ProfilePatch {
        name: Some("Grace".to_string()),
        ..Default::default()
    };
    let user = client.update_profile(&patch).await.unwrap();
    assert_eq!(user.name.as_deref(), Some("Grace"));
    assert_eq!(user.role, Role::Editor);
}

#[tokio::test]
async fn notifications_endpoints() {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(GET).path("/notifications");
        then.status(200).json_body(json!([
            { "id": 2, "title": "New message", "read": false, "createdAt": "2026-03-01T10:00:00Z" },
            { "id": 1, "title": "Welcome", "message": "Hi", "read": true, "createdAt": "2026-02-01T10:00:00Z" }
        ]));
    });
    let mark = server.mock(|when, then| {
        when.method(PUT).path("/notifications/2/read");
        then.status(204);
    });

    let store = Arc::new(MemoryStore::new());
    store.set_token("abc").await.unwrap();
    let client = api_client(&server, store);

    let notifications = client.notifications().await.unwrap();
    assert_eq!(notifications.len(), 2);
    assert_eq!(notifications[1].message.as_deref(), Some("Hi"));

    client.mark_notification_read(2).await.unwrap();
    mark.assert();
}
