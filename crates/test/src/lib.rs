//! Test helpers and fixtures.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use libcat_api::{
    ApiError, BorrowRequest, CatalogCollections, LibraryApi, Record, Result, ReturnRequest,
};
use libcat_core::{Book, EntityId, EntityKind, NamedEntity};
use serde_json::Value;

pub fn make_book(id: i64, title: &str, borrower: Option<&str>) -> Book {
    Book {
        id: EntityId::from(id),
        title: title.to_string(),
        author: None,
        publisher: None,
        genre: None,
        borrower: borrower.map(str::to_string),
        borrowdate: borrower.map(|_| "2024-02-01".to_string()),
        returndate: borrower.map(|_| "2024-05-01".to_string()),
    }
}

pub fn make_named(id: i64, name: &str) -> NamedEntity {
    NamedEntity {
        id: EntityId::from(id),
        name: name.to_string(),
    }
}

/// Three books: "Dune" on the shelf, "Foundation" lent to Grace, and
/// "Solaris" whose author is not in the author list.
pub fn sample_collections() -> CatalogCollections {
    let dune = Book {
        author: Some(EntityId::from(1)),
        publisher: Some(EntityId::from(1)),
        genre: Some(EntityId::from(1)),
        ..make_book(1, "Dune", None)
    };
    let foundation = Book {
        author: Some(EntityId::from(2)),
        publisher: Some(EntityId::from(1)),
        genre: Some(EntityId::from(1)),
        ..make_book(2, "Foundation", Some("Grace"))
    };
    let solaris = Book {
        author: Some(EntityId::from(99)),
        ..make_book(3, "Solaris", None)
    };
    CatalogCollections {
        books: vec![dune, foundation, solaris],
        authors: vec![make_named(1, "Frank Herbert"), make_named(2, "Isaac Asimov")],
        publishers: vec![make_named(1, "Chilton")],
        genres: vec![make_named(1, "Science Fiction")],
        borrowers: vec![make_named(1, "Grace")],
    }
}

/// Builds a [`Record`] from a JSON object literal.
pub fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        other => panic!("record fixture must be an object, got {other}"),
    }
}

fn server_error(status: u16) -> ApiError {
    ApiError::Status {
        status,
        message: None,
    }
}

/// In-memory [`LibraryApi`]. Every call is logged as `METHOD /path[?query]`.
/// Accepted writes update the stored collections, so a reload sees them.
pub struct FakeApi {
    collections: Mutex<CatalogCollections>,
    records: HashMap<(EntityKind, String), Vec<Record>>,
    failing_lists: HashSet<EntityKind>,
    failing_records: HashSet<EntityKind>,
    write_error: Option<(u16, Option<String>)>,
    fail_remove_borrowers: bool,
    description: std::result::Result<Option<String>, u16>,
    calls: Mutex<Vec<String>>,
}

impl FakeApi {
    pub fn new(collections: CatalogCollections) -> Self {
        Self {
            collections: Mutex::new(collections),
            records: HashMap::new(),
            failing_lists: HashSet::new(),
            failing_records: HashSet::new(),
            write_error: None,
            fail_remove_borrowers: false,
            description: Ok(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Listing `kind` answers 500.
    pub fn failing_list(mut self, kind: EntityKind) -> Self {
        self.failing_lists.insert(kind);
        self
    }

    /// Fetching any `kind` record by id answers 500.
    pub fn failing_records(mut self, kind: EntityKind) -> Self {
        self.failing_records.insert(kind);
        self
    }

    pub fn failing_writes(mut self, status: u16, message: Option<&str>) -> Self {
        self.write_error = Some((status, message.map(str::to_string)));
        self
    }

    pub fn failing_remove_borrowers(mut self) -> Self {
        self.fail_remove_borrowers = true;
        self
    }

    pub fn with_records(mut self, kind: EntityKind, id: &str, records: Vec<Record>) -> Self {
        self.records.insert((kind, id.to_string()), records);
        self
    }

    /// `Err(status)` makes the description service answer with that status.
    pub fn with_description(
        mut self,
        description: std::result::Result<Option<String>, u16>,
    ) -> Self {
        self.description = description;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    pub fn collections(&self) -> CatalogCollections {
        lock(&self.collections).clone()
    }

    fn record_call(&self, call: String) {
        lock(&self.calls).push(call);
    }

    fn check_write(&self) -> Result<()> {
        match &self.write_error {
            Some((status, message)) => Err(ApiError::Status {
                status: *status,
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl LibraryApi for FakeApi {
    async fn list_books(&self) -> Result<Vec<Book>> {
        self.record_call(format!("GET /{}", EntityKind::Books.endpoint()));
        if self.failing_lists.contains(&EntityKind::Books) {
            return Err(server_error(500));
        }
        Ok(lock(&self.collections).books.clone())
    }

    async fn list_named(&self, kind: EntityKind) -> Result<Vec<NamedEntity>> {
        self.record_call(format!("GET /{}", kind.endpoint()));
        if self.failing_lists.contains(&kind) {
            return Err(server_error(500));
        }
        let collections = lock(&self.collections);
        let entities = match kind {
            EntityKind::Author => &collections.authors,
            EntityKind::Publisher => &collections.publishers,
            EntityKind::Genre => &collections.genres,
            EntityKind::Borrower => &collections.borrowers,
            EntityKind::Books => return Ok(Vec::new()),
        };
        Ok(entities.clone())
    }

    async fn fetch_records(&self, kind: EntityKind, id: &str) -> Result<Vec<Record>> {
        self.record_call(format!("GET /{}?id={id}", kind.endpoint()));
        if self.failing_records.contains(&kind) {
            return Err(server_error(500));
        }
        Ok(self
            .records
            .get(&(kind, id.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn borrow(&self, request: &BorrowRequest) -> Result<()> {
        self.record_call("POST /api/borrow".to_string());
        self.check_write()?;
        let mut collections = lock(&self.collections);
        if let Some(book) = collections.books.iter_mut().find(|b| b.id == request.bookid) {
            book.borrower = Some(request.name.clone());
            book.borrowdate = Some(request.borrow_date.clone());
            book.returndate = Some(request.return_date.clone());
        }
        Ok(())
    }

    async fn return_book(&self, request: &ReturnRequest) -> Result<()> {
        self.record_call("POST /api/return".to_string());
        self.check_write()?;
        let mut collections = lock(&self.collections);
        if let Some(book) = collections.books.iter_mut().find(|b| b.id == request.bookid) {
            book.borrower = None;
            book.borrowdate = None;
            book.returndate = None;
        }
        Ok(())
    }

    async fn remove_borrowers(&self) -> Result<()> {
        self.record_call("POST /api/removeBorrowers".to_string());
        if self.fail_remove_borrowers {
            return Err(server_error(500));
        }
        let mut collections = lock(&self.collections);
        collections.borrowers.clear();
        for book in &mut collections.books {
            book.borrower = None;
            book.borrowdate = None;
            book.returndate = None;
        }
        Ok(())
    }

    async fn describe(&self, kind: EntityKind, name: &str) -> Result<Option<String>> {
        self.record_call(format!(
            "GET /api/description?type={}&name={name}",
            kind.description_label()
        ));
        match &self.description {
            Ok(text) => Ok(text.clone()),
            Err(status) => Err(server_error(*status)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_has_one_loan() {
        let collections = sample_collections();
        let borrowed: Vec<_> = collections
            .books
            .iter()
            .filter(|book| book.is_borrowed())
            .map(|book| book.title.as_str())
            .collect();
        assert_eq!(borrowed, vec!["Foundation"]);
    }

    #[tokio::test]
    async fn accepted_borrow_is_visible_on_reload() {
        let api = FakeApi::new(sample_collections());
        api.borrow(&BorrowRequest {
            bookid: EntityId::from(1),
            name: "Ada".to_string(),
            borrow_date: "2024-01-15".to_string(),
            return_date: "2024-04-15".to_string(),
        })
        .await
        .unwrap();
        let books = api.list_books().await.unwrap();
        assert_eq!(books[0].borrower.as_deref(), Some("Ada"));
        assert_eq!(api.calls(), vec!["POST /api/borrow", "GET /api/books"]);
    }

    #[tokio::test]
    async fn rejected_write_leaves_state_alone() {
        let api = FakeApi::new(sample_collections()).failing_writes(409, Some("on loan"));
        let err = api
            .return_book(&ReturnRequest {
                bookid: EntityId::from(2),
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "on loan");
        assert!(api.collections().books[1].is_borrowed());
    }
}
