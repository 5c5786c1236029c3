//! End-to-end tests against a mock backend

use serde_json::json;
use tessera_client::{ApiKey, ChannelState, Client, ClientOptions};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_against(server: &MockServer, options: ClientOptions) -> Client {
    Client::new(
        "org1",
        "inst1",
        ApiKey {
            id: "key1".to_string(),
            secret: "sec1".to_string(),
        },
        ClientOptions {
            cms_origin: server.uri(),
            ..options
        },
    )
    .unwrap()
}

async fn mount_templates(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/v1/org/org1/instance/inst1/template/all"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{
                "_id": "t1",
                "name": "blog",
                "props": [{
                    "id": "p1",
                    "name": "title",
                    "label": "Title",
                    "type": "STRING",
                    "required": true,
                    "array": false
                }]
            }]
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn requests_carry_the_api_key_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/org/org1/instance/inst1/template/all"))
        .and(header("authorization", "ApiKey key1.sec1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_against(&server, ClientOptions::default());
    let templates = client.templates().get_all(false).await.unwrap();
    assert!(templates.is_empty());
}

#[tokio::test]
async fn cached_reads_share_one_network_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/org/org1/instance/inst1/language/all"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{ "_id": "l1", "code": "en", "name": "English" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_against(
        &server,
        ClientOptions {
            use_mem_cache: true,
            ..Default::default()
        },
    );
    let first = client.languages().get_all(false).await.unwrap();
    let second = client.languages().get_all(false).await.unwrap();
    assert_eq!(first[0].code, "en");
    assert_eq!(second.len(), 1);
}

#[tokio::test]
async fn parsed_entries_flow_through_entry_repository() {
    let server = MockServer::start().await;
    mount_templates(&server).await;
    Mock::given(method("GET"))
        .and(path(
            "/api/v1/org/org1/instance/inst1/template/t1/entry/all/parsed",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{
                "_id": "e1",
                "templateId": "t1",
                "statuses": [],
                "meta": { "en": { "title": "Hello", "slug": "hello" } },
                "content": {}
            }]
        })))
        .mount(&server)
        .await;

    let client = client_against(
        &server,
        ClientOptions {
            use_mem_cache: true,
            ..Default::default()
        },
    );
    let entries = client.entries().get_all("blog", false).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(
        entries[0].meta["en"]["title"],
        serde_json::Value::String("Hello".to_string())
    );

    let by_slug = client
        .entries()
        .get_by_slug("hello", "blog", false)
        .await
        .unwrap();
    assert_eq!(by_slug.id, "e1");
}

#[tokio::test]
async fn schema_violations_surface_as_validation_errors() {
    let server = MockServer::start().await;
    mount_templates(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v1/org/org1/instance/inst1/group/all"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": [] })))
        .mount(&server)
        .await;

    let client = client_against(&server, ClientOptions::default());
    let err = client
        .entries()
        .create(
            "blog",
            tessera_client::types::EntryParsedCreateData {
                statuses: vec![],
                meta: vec![tessera_client::types::EntryParsedMeta {
                    lng: "en".to_string(),
                    data: serde_json::Map::new(),
                }],
                content: vec![],
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, tessera_client::Error::Validation { .. }));
    assert!(err.to_string().contains("title"));
}

#[tokio::test]
async fn connect_is_a_noop_without_socket() {
    let server = MockServer::start().await;
    let client = client_against(&server, ClientOptions::default());
    assert_eq!(client.channel().state(), ChannelState::Disconnected);
    client.connect().await.unwrap();
    assert_eq!(client.channel().state(), ChannelState::Disconnected);
}
