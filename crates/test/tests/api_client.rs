use libcat_api::{ApiClient, ApiError, BorrowRequest, LibraryApi, ReturnRequest};
use libcat_core::{EntityId, EntityKind};
use serde_json::json;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn client(server: &MockServer) -> ApiClient {
    ApiClient::new(&server.uri()).unwrap()
}

#[tokio::test]
async fn lists_books_with_mixed_id_types() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/books"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 1, "title": "Dune", "author": 1, "publisher": "p-1", "genre": null,
             "borrower": null, "borrowdate": null, "returndate": null},
            {"id": "2", "title": null, "author": 2, "borrower": "Grace",
             "borrowdate": "2024-02-01", "returndate": "2024-05-01"}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let books = client(&server).await.list_books().await.unwrap();
    assert_eq!(books.len(), 2);
    assert_eq!(books[0].id, EntityId::from(1));
    assert_eq!(books[0].publisher, Some(EntityId::from("p-1")));
    assert_eq!(books[0].genre, None);
    assert_eq!(books[1].title, "");
    assert!(books[1].is_borrowed());
}

#[tokio::test]
async fn lists_named_collections() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/borrower"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{"id": "b-1", "name": "Grace"}])),
        )
        .mount(&server)
        .await;

    let borrowers = client(&server)
        .await
        .list_named(EntityKind::Borrower)
        .await
        .unwrap();
    assert_eq!(borrowers[0].name, "Grace");
}

#[tokio::test]
async fn fetches_records_by_id_in_server_order() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/author"))
        .and(query_param("id", "7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 7, "name": "Ursula K. Le Guin", "born": 1929}
        ])))
        .mount(&server)
        .await;

    let records = client(&server)
        .await
        .fetch_records(EntityKind::Author, "7")
        .await
        .unwrap();
    let keys: Vec<_> = records[0].keys().cloned().collect();
    assert_eq!(keys, vec!["id", "name", "born"]);
}

#[tokio::test]
async fn borrow_posts_wire_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/borrow"))
        .and(body_json(json!({
            "bookid": "3",
            "name": "Ada",
            "borrowDate": "2024-01-31",
            "returnDate": "2024-04-30",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "ok"})))
        .expect(1)
        .mount(&server)
        .await;

    client(&server)
        .await
        .borrow(&BorrowRequest {
            bookid: EntityId::from(3),
            name: "Ada".to_string(),
            borrow_date: "2024-01-31".to_string(),
            return_date: "2024-04-30".to_string(),
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn failed_return_carries_server_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/return"))
        .and(body_json(json!({"bookid": "2"})))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({"error": "database offline"})),
        )
        .mount(&server)
        .await;

    let err = client(&server)
        .await
        .return_book(&ReturnRequest {
            bookid: EntityId::from(2),
        })
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(500));
    assert_eq!(err.server_message(), Some("database offline"));
}

#[tokio::test]
async fn error_without_json_body_has_no_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/removeBorrowers"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let err = client(&server).await.remove_borrowers().await.unwrap_err();
    assert!(matches!(err, ApiError::Status { status: 502, message: None }));
}

#[tokio::test]
async fn describe_sends_label_and_name() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/description"))
        .and(query_param("type", "Genre"))
        .and(query_param("name", "Science Fiction"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"description": "**Speculative**"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let text = client(&server)
        .await
        .describe(EntityKind::Genre, "Science Fiction")
        .await
        .unwrap();
    assert_eq!(text.as_deref(), Some("**Speculative**"));
}

#[tokio::test]
async fn empty_description_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/description"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"description": ""})))
        .mount(&server)
        .await;

    let text = client(&server)
        .await
        .describe(EntityKind::Books, "Dune")
        .await
        .unwrap();
    assert_eq!(text, None);
}

#[tokio::test]
async fn unreachable_backend_is_transport_error() {
    let client = ApiClient::new("http://127.0.0.1:9").unwrap();
    let err = client.list_books().await.unwrap_err();
    assert!(matches!(err, ApiError::Http(_)));
    assert_eq!(err.status(), None);
}
