//! HTTP access to the library catalog backend.

use async_trait::async_trait;
use libcat_core::{Book, EntityId, EntityKind, NamedEntity};
use serde::{Deserialize, Serialize};

mod client;
mod error;

pub use client::ApiClient;
pub use error::{ApiError, Result};

/// A backend record as an ordered JSON object.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// The five collections a catalog is built from.
#[derive(Debug, Clone, Default)]
pub struct CatalogCollections {
    pub books: Vec<Book>,
    pub authors: Vec<NamedEntity>,
    pub publishers: Vec<NamedEntity>,
    pub genres: Vec<NamedEntity>,
    pub borrowers: Vec<NamedEntity>,
}

/// Body of `POST /api/borrow`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowRequest {
    pub bookid: EntityId,
    pub name: String,
    #[serde(rename = "borrowDate")]
    pub borrow_date: String,
    #[serde(rename = "returnDate")]
    pub return_date: String,
}

/// Body of `POST /api/return`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnRequest {
    pub bookid: EntityId,
}

/// Operations the catalog and viewer need from the backend.
#[async_trait]
pub trait LibraryApi: Send + Sync {
    async fn list_books(&self) -> Result<Vec<Book>>;

    /// Lists authors, publishers, genres or borrowers.
    async fn list_named(&self, kind: EntityKind) -> Result<Vec<NamedEntity>>;

    /// `GET /api/{kind}?id={id}`; the backend answers with a (possibly empty) array.
    async fn fetch_records(&self, kind: EntityKind, id: &str) -> Result<Vec<Record>>;

    async fn borrow(&self, request: &BorrowRequest) -> Result<()>;

    async fn return_book(&self, request: &ReturnRequest) -> Result<()>;

    async fn remove_borrowers(&self) -> Result<()>;

    /// Markdown description of a named entity, `None` when the service had none.
    async fn describe(&self, kind: EntityKind, name: &str) -> Result<Option<String>>;
}
