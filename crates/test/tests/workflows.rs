use libcat_api::LibraryApi;
use libcat_application::{
    BorrowForm, DescriptionState, LoanDetails, NoticeLevel, ReturnForm, ViewerPage,
    clear_all_and_reload, fetch_description, load_catalog, open_viewer,
};
use libcat_core::{BookStatus, EntityId, EntityKind, QueryParams};
use libcat_test::{FakeApi, record, sample_collections};
use serde_json::json;

#[tokio::test]
async fn borrow_then_reload_matches_local_state() {
    let api = FakeApi::new(sample_collections());
    let mut catalog = load_catalog(&api).await.unwrap();

    let draft = BorrowForm {
        book_id: Some(EntityId::from(1)),
        borrower: "Ada".to_string(),
        borrow_date: "2024-11-30".to_string(),
    }
    .prepare()
    .unwrap();
    let request = catalog.apply_borrow(&draft).unwrap();
    assert_eq!(request.return_date, "2025-02-28");

    let result = api.borrow(&request).await;
    let notice = catalog.settle_borrow(&draft.book_id, &result);
    assert_eq!(notice.level, NoticeLevel::Info);

    let reloaded = load_catalog(&api).await.unwrap();
    assert_eq!(reloaded.rows(), catalog.rows());
}

#[tokio::test]
async fn rejected_borrow_sends_nothing() {
    let api = FakeApi::new(sample_collections());
    let mut catalog = load_catalog(&api).await.unwrap();
    let calls_after_load = api.calls().len();

    let draft = BorrowForm {
        book_id: Some(EntityId::from(2)),
        borrower: "Ada".to_string(),
        borrow_date: "2024-03-01".to_string(),
    }
    .prepare()
    .unwrap();
    assert!(catalog.apply_borrow(&draft).is_err());
    assert_eq!(api.calls().len(), calls_after_load);
}

#[tokio::test]
async fn failed_return_rolls_back_to_server_state() {
    let api = FakeApi::new(sample_collections()).failing_writes(500, None);
    let mut catalog = load_catalog(&api).await.unwrap();
    let before = catalog.rows();

    let draft = ReturnForm {
        book_id: Some(EntityId::from(2)),
        return_date: "2024-04-01".to_string(),
    }
    .prepare()
    .unwrap();
    let request = catalog.apply_return(&draft).unwrap();
    let result = api.return_book(&request).await;
    let notice = catalog.settle_return(&draft.book_id, &result);

    assert_eq!(notice.message, "Error returning book: Failed to return book");
    assert_eq!(catalog.rows(), before);
}

#[tokio::test]
async fn clear_all_empties_loans() {
    let api = FakeApi::new(sample_collections());
    let catalog = clear_all_and_reload(&api).await.unwrap();
    assert!(catalog.rows().iter().all(|row| row.status == BookStatus::Present));
    assert!(catalog.borrowers().is_empty());
    assert!(catalog.return_candidates().is_empty());
}

#[tokio::test]
async fn viewer_page_then_description() {
    let api = FakeApi::new(sample_collections())
        .with_records(
            EntityKind::Books,
            "2",
            vec![record(json!({
                "id": 2,
                "title": "Foundation",
                "author": 2,
                "borrower": "Grace",
                "borrowdate": "2024-02-01",
                "returndate": "2024-05-01",
            }))],
        )
        .with_records(
            EntityKind::Author,
            "2",
            vec![record(json!({"id": 2, "name": "Isaac Asimov"}))],
        )
        .with_description(Ok(Some("Psychohistory <em>saga</em>.".to_string())));

    let params = QueryParams::parse("?type=books&id=2");
    let ViewerPage::Entity(page) = open_viewer(&api, &params).await else {
        panic!("expected entity page");
    };
    assert!(matches!(page.loan, Some(LoanDetails::OnLoan(ref loan)) if loan.borrower == "Grace"));

    let subject = page.subject.unwrap();
    let DescriptionState::Ready(document) = fetch_description(&api, &subject).await else {
        panic!("expected description");
    };
    assert_eq!(document.plain_text(), "Psychohistory saga.");
}
