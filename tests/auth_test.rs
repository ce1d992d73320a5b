mod common;

use common::{MockTransport, Reply};
use sessionnet::{
    Client, Credential, CredentialStore, FileCredentialStore, MemoryCredentialStore, NetError,
    RequestOptions, SessionConfig,
};

const BASE: &str = "https://api.example.com";
const HOST: &str = "api.example.com";

fn client_with_store(mock: &MockTransport, store: &MemoryCredentialStore) -> Client {
    Client::builder()
        .transport_factory(mock.factory())
        .credential_store(store.clone())
        .build()
}

#[tokio::test]
async fn test_token_header_rotates_credential() {
    let mock = MockTransport::new();
    mock.on("/login", Reply::status(200).with_header("token", "new"));
    mock.on("/me", Reply::json(200, r#"{"id":"u1"}"#));
    let store = MemoryCredentialStore::new();
    store.set(HOST, Credential::new("old"));
    let client = client_with_store(&mock, &store);
    client
        .create_session(BASE, SessionConfig::default().token_header("Token"))
        .unwrap();

    client.post(BASE, "/login", RequestOptions::new()).await.unwrap();
    client.get(BASE, "/me", RequestOptions::new()).await.unwrap();

    assert_eq!(mock.requests_to("/login")[0].header("authorization"), Some("Bearer old"));
    assert_eq!(mock.requests_to("/me")[0].header("authorization"), Some("Bearer new"));
    assert_eq!(store.get(HOST), Some(Credential::new("new")));
}

#[tokio::test]
async fn test_bearer_prefix_is_stripped_from_captured_token() {
    let mock = MockTransport::new();
    mock.on("/login", Reply::status(200).with_header("token", "Bearer abc123"));
    let store = MemoryCredentialStore::new();
    let client = client_with_store(&mock, &store);
    client
        .create_session(BASE, SessionConfig::default().token_header("token"))
        .unwrap();

    client.post(BASE, "/login", RequestOptions::new()).await.unwrap();

    assert_eq!(store.get(HOST).unwrap().expose(), "abc123");
}

#[tokio::test]
async fn test_no_token_header_configured_leaves_store_alone() {
    let mock = MockTransport::new();
    mock.on("/login", Reply::status(200).with_header("token", "ignored"));
    let store = MemoryCredentialStore::new();
    let client = client_with_store(&mock, &store);
    client.create_session(BASE, SessionConfig::default()).unwrap();

    client.post(BASE, "/login", RequestOptions::new()).await.unwrap();

    assert!(store.get(HOST).is_none());
    assert_eq!(mock.requests()[0].header("authorization"), None);
}

#[tokio::test]
async fn test_per_request_authorization_wins() {
    let mock = MockTransport::new();
    mock.on("/me", Reply::status(200));
    let store = MemoryCredentialStore::new();
    store.set(HOST, Credential::new("stored"));
    let client = client_with_store(&mock, &store);
    client.create_session(BASE, SessionConfig::default()).unwrap();

    let options = RequestOptions::new()
        .header("Authorization", "Basic dXNlcjpwYXNz")
        .unwrap();
    client.get(BASE, "/me", options).await.unwrap();

    assert_eq!(mock.requests()[0].header("authorization"), Some("Basic dXNlcjpwYXNz"));
}

#[tokio::test]
async fn test_unauthorized_cancels_siblings_on_same_session() {
    let mock = MockTransport::new();
    mock.on("/slow", Reply::Hang);
    mock.on("/expired", Reply::status(401));
    let client = Client::builder().transport_factory(mock.factory()).build();
    client
        .create_session(BASE, SessionConfig::default().cancel_on_unauthorized(true))
        .unwrap();
    client
        .create_session("https://other.example.com", SessionConfig::default())
        .unwrap();

    let sibling = {
        let client = client.clone();
        tokio::spawn(async move { client.get(BASE, "/slow", RequestOptions::new()).await })
    };
    let other = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .get(
                    "https://other.example.com",
                    "/slow",
                    RequestOptions::new().task_id("other-origin"),
                )
                .await
        })
    };
    mock.wait_for_requests(2).await;

    let response = client.get(BASE, "/expired", RequestOptions::new()).await.unwrap();
    assert_eq!(response.code, 401);
    assert_eq!(sibling.await.unwrap().unwrap_err(), NetError::Cancelled);

    let other_session = client.get_session("https://other.example.com").unwrap();
    assert!(other_session.has_task("other-origin"));
    client.cancel_request("other-origin").unwrap();
    assert_eq!(other.await.unwrap().unwrap_err(), NetError::Cancelled);
}

#[tokio::test]
async fn test_unauthorized_without_flag_cancels_nothing() {
    let mock = MockTransport::new();
    mock.on("/slow", Reply::Hang);
    mock.on("/expired", Reply::status(401));
    let client = Client::builder().transport_factory(mock.factory()).build();
    client.create_session(BASE, SessionConfig::default()).unwrap();

    let sibling = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .get(BASE, "/slow", RequestOptions::new().task_id("sibling"))
                .await
        })
    };
    mock.wait_for_requests(1).await;

    client.get(BASE, "/expired", RequestOptions::new()).await.unwrap();
    assert!(client.get_session(BASE).unwrap().has_task("sibling"));

    client.cancel_request("sibling").unwrap();
    assert_eq!(sibling.await.unwrap().unwrap_err(), NetError::Cancelled);
}

#[tokio::test]
async fn test_invalidate_clears_credential() {
    let mock = MockTransport::new();
    let store = MemoryCredentialStore::new();
    store.set(HOST, Credential::new("abc"));
    let client = client_with_store(&mock, &store);
    client.create_session(BASE, SessionConfig::default()).unwrap();

    client.invalidate_session(BASE).unwrap();

    assert!(store.get(HOST).is_none());
}

#[tokio::test]
async fn test_file_store_survives_new_client() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("credentials.json");

    let mock = MockTransport::new();
    mock.on("/login", Reply::status(200).with_header("token", "persisted"));
    mock.on("/me", Reply::status(200));

    {
        let client = Client::builder()
            .transport_factory(mock.factory())
            .credential_store(FileCredentialStore::open(&path).unwrap())
            .build();
        client
            .create_session(BASE, SessionConfig::default().token_header("token"))
            .unwrap();
        client.post(BASE, "/login", RequestOptions::new()).await.unwrap();
    }

    let client = Client::builder()
        .transport_factory(mock.factory())
        .credential_store(FileCredentialStore::open(&path).unwrap())
        .build();
    client.create_session(BASE, SessionConfig::default()).unwrap();
    client.get(BASE, "/me", RequestOptions::new()).await.unwrap();

    assert_eq!(mock.requests_to("/me")[0].header("authorization"), Some("Bearer persisted"));
}
