//! Catalog state and the borrow / return / clear-all workflows.
//!
//! The [`Catalog`] is the only record of book loan state within a session.
//! Table rows and the two book selectors are projections of it. Writes are
//! applied optimistically, marked pending, and reconciled once the backend
//! answers: a failed request restores the row as it was before the write.

pub use libcat_api::CatalogCollections;
use libcat_api::{ApiError, BorrowRequest, LibraryApi, ReturnRequest};
use libcat_core::{
    Book, BookStatus, EntityId, EntityKind, LookupMap, NamedEntity, format_date,
    loan_return_date, parse_date,
};
use tracing::{info, warn};

pub const LOAD_FAILED_MESSAGE: &str =
    "There was an error loading the library data. Please try refreshing the page.";

pub const CLEAR_ALL_CONFIRMATION: &str =
    "Are you sure you want to clear all borrowing data? This action cannot be undone.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    MissingFields,
    InvalidDate,
    BookNotFound,
    AlreadyBorrowed,
    NotBorrowed,
    WriteInFlight,
}

impl Rejection {
    pub fn message(&self) -> &'static str {
        match self {
            Rejection::MissingFields => "Please fill in all fields.",
            Rejection::InvalidDate => "Please enter dates as YYYY-MM-DD.",
            Rejection::BookNotFound => "No book found with that ID.",
            Rejection::AlreadyBorrowed => "This book is already borrowed.",
            Rejection::NotBorrowed => "This book is not currently borrowed.",
            Rejection::WriteInFlight => {
                "This book is still waiting for the server. Please try again shortly."
            }
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for Rejection {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// A message for the user, shown as an alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

impl From<Rejection> for Notice {
    fn from(rejection: Rejection) -> Self {
        Notice::error(rejection.message())
    }
}

/// Fetches all five collections concurrently. The first failure fails the
/// whole load; nothing partial is returned.
pub async fn fetch_collections(api: &dyn LibraryApi) -> Result<CatalogCollections, ApiError> {
    let (books, authors, publishers, genres, borrowers) = futures::try_join!(
        api.list_books(),
        api.list_named(EntityKind::Author),
        api.list_named(EntityKind::Publisher),
        api.list_named(EntityKind::Genre),
        api.list_named(EntityKind::Borrower),
    )?;
    Ok(CatalogCollections {
        books,
        authors,
        publishers,
        genres,
        borrowers,
    })
}

pub async fn load_catalog(api: &dyn LibraryApi) -> Result<Catalog, ApiError> {
    let collections = fetch_collections(api).await?;
    Ok(Catalog::from_collections(collections))
}

/// Purges every loan on the backend, then reloads the catalog. A failed purge
/// is logged and the reload still happens, so the screen shows what the
/// backend actually holds.
pub async fn clear_all_and_reload(api: &dyn LibraryApi) -> Result<Catalog, ApiError> {
    match api.remove_borrowers().await {
        Ok(()) => info!("cleared all borrowing data"),
        Err(err) => warn!(error = %err, "clearing borrowing data failed"),
    }
    load_catalog(api).await
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Synced,
    /// A write was applied locally and the backend has not answered yet.
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub book: Book,
    pub sync: SyncState,
    previous: Option<Book>,
}

impl CatalogEntry {
    fn new(book: Book) -> Self {
        Self {
            book,
            sync: SyncState::Synced,
            previous: None,
        }
    }

    fn begin_write(&mut self) {
        self.previous = Some(self.book.clone());
        self.sync = SyncState::Pending;
    }

    /// Leaves synced entries untouched.
    fn settle(&mut self, accepted: bool) {
        if self.sync != SyncState::Pending {
            return;
        }
        if let Some(previous) = self.previous.take()
            && !accepted
        {
            self.book = previous;
        }
        self.sync = SyncState::Synced;
    }

    fn ensure_writable(&self) -> Result<(), Rejection> {
        match self.sync {
            SyncState::Synced => Ok(()),
            SyncState::Pending => Err(Rejection::WriteInFlight),
        }
    }
}

/// One row of the book table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookRow {
    pub id: EntityId,
    pub title: String,
    pub author: String,
    pub publisher: String,
    pub genre: String,
    pub borrower: String,
    pub borrow_date: String,
    pub return_date: String,
    pub status: BookStatus,
    pub pending: bool,
}

/// An entry of the borrow or return selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectOption {
    pub id: EntityId,
    pub label: String,
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
    authors: LookupMap,
    publishers: LookupMap,
    genres: LookupMap,
    borrowers: Vec<NamedEntity>,
}

impl Catalog {
    pub fn from_collections(collections: CatalogCollections) -> Self {
        let catalog = Self {
            entries: collections.books.into_iter().map(CatalogEntry::new).collect(),
            authors: LookupMap::from_entities(&collections.authors),
            publishers: LookupMap::from_entities(&collections.publishers),
            genres: LookupMap::from_entities(&collections.genres),
            borrowers: collections.borrowers,
        };
        info!(
            books = catalog.entries.len(),
            authors = catalog.authors.len(),
            publishers = catalog.publishers.len(),
            genres = catalog.genres.len(),
            borrowers = catalog.borrowers.len(),
            "catalog loaded"
        );
        catalog
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn entry(&self, id: &EntityId) -> Option<&CatalogEntry> {
        self.entries.iter().find(|entry| entry.book.id == *id)
    }

    fn entry_mut(&mut self, id: &EntityId) -> Option<&mut CatalogEntry> {
        self.entries.iter_mut().find(|entry| entry.book.id == *id)
    }

    /// Re-applies the writes still pending in `previous` on top of this freshly
    /// loaded catalog. The loaded row becomes the rollback snapshot, so a later
    /// failure restores what the backend reported.
    pub fn carry_pending(&mut self, previous: &Catalog) {
        for old in previous.entries.iter().filter(|e| e.sync == SyncState::Pending) {
            if let Some(entry) = self.entry_mut(&old.book.id) {
                entry.begin_write();
                entry.book = old.book.clone();
            }
        }
    }

    pub fn borrowers(&self) -> &[NamedEntity] {
        &self.borrowers
    }

    /// Rows in server order.
    pub fn rows(&self) -> Vec<BookRow> {
        self.entries.iter().map(|entry| self.row_for(entry)).collect()
    }

    pub fn row(&self, id: &EntityId) -> Option<BookRow> {
        self.entry(id).map(|entry| self.row_for(entry))
    }

    fn row_for(&self, entry: &CatalogEntry) -> BookRow {
        let book = &entry.book;
        let loan = book.loan();
        BookRow {
            id: book.id.clone(),
            title: book.title.clone(),
            author: self.authors.name_or_unknown(book.author.as_ref()),
            publisher: self.publishers.name_or_unknown(book.publisher.as_ref()),
            genre: self.genres.name_or_unknown(book.genre.as_ref()),
            borrower: loan.as_ref().map(|l| l.borrower.clone()).unwrap_or_default(),
            borrow_date: loan.as_ref().map(|l| l.borrow_date.clone()).unwrap_or_default(),
            return_date: loan.as_ref().map(|l| l.return_date.clone()).unwrap_or_default(),
            status: book.status(),
            pending: entry.sync == SyncState::Pending,
        }
    }

    /// Books that can be borrowed.
    pub fn borrow_candidates(&self) -> Vec<SelectOption> {
        self.options_with_status(BookStatus::Present)
    }

    /// Books that can be returned.
    pub fn return_candidates(&self) -> Vec<SelectOption> {
        self.options_with_status(BookStatus::Borrowed)
    }

    fn options_with_status(&self, status: BookStatus) -> Vec<SelectOption> {
        self.entries
            .iter()
            .filter(|entry| entry.book.status() == status)
            .map(|entry| SelectOption {
                id: entry.book.id.clone(),
                label: format!("{} - {}", entry.book.id, entry.book.title),
            })
            .collect()
    }

    /// Indices of the rows whose title matches `query`. Hidden rows stay in
    /// the catalog.
    pub fn visible_indices(&self, query: &str) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| title_matches(&entry.book.title, query))
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Marks the book as borrowed and returns the request to send.
    pub fn apply_borrow(&mut self, draft: &BorrowDraft) -> Result<BorrowRequest, Rejection> {
        let entry = self
            .entry_mut(&draft.book_id)
            .ok_or(Rejection::BookNotFound)?;
        entry.ensure_writable()?;
        if entry.book.status() == BookStatus::Borrowed {
            return Err(Rejection::AlreadyBorrowed);
        }

        entry.begin_write();
        entry.book.borrower = Some(draft.borrower.clone());
        entry.book.borrowdate = Some(draft.borrow_date.clone());
        entry.book.returndate = Some(draft.return_date.clone());
        Ok(draft.request())
    }

    /// Reconciles a pending borrow with the backend's answer. The notice is
    /// produced even when the row is no longer pending.
    pub fn settle_borrow(&mut self, id: &EntityId, outcome: &Result<(), ApiError>) -> Notice {
        if let Some(entry) = self.entry_mut(id) {
            entry.settle(outcome.is_ok());
        }
        borrow_notice(id, outcome)
    }

    /// Clears the loan on the book and returns the request to send.
    pub fn apply_return(&mut self, draft: &ReturnDraft) -> Result<ReturnRequest, Rejection> {
        let entry = self
            .entry_mut(&draft.book_id)
            .ok_or(Rejection::BookNotFound)?;
        entry.ensure_writable()?;
        if entry.book.status() != BookStatus::Borrowed {
            return Err(Rejection::NotBorrowed);
        }

        entry.begin_write();
        entry.book.borrower = None;
        entry.book.borrowdate = None;
        entry.book.returndate = None;
        Ok(draft.request())
    }

    /// Reconciles a pending return with the backend's answer.
    pub fn settle_return(&mut self, id: &EntityId, outcome: &Result<(), ApiError>) -> Notice {
        if let Some(entry) = self.entry_mut(id) {
            entry.settle(outcome.is_ok());
        }
        return_notice(id, outcome)
    }
}

/// The alert for a borrow reply.
pub fn borrow_notice(id: &EntityId, outcome: &Result<(), ApiError>) -> Notice {
    match outcome {
        Ok(()) => {
            info!(book = %id, "book borrowed");
            Notice::info(format!("Book ID {id} has been successfully borrowed."))
        }
        Err(err) => {
            warn!(book = %id, error = %err, "borrow rejected");
            Notice::error(format!(
                "Error borrowing book: {}",
                failure_message(err, "Failed to borrow book")
            ))
        }
    }
}

/// The alert for a return reply.
pub fn return_notice(id: &EntityId, outcome: &Result<(), ApiError>) -> Notice {
    match outcome {
        Ok(()) => {
            info!(book = %id, "book returned");
            Notice::info(format!("Book ID {id} has been successfully returned."))
        }
        Err(err) => {
            warn!(book = %id, error = %err, "return rejected");
            Notice::error(format!(
                "Error returning book: {}",
                failure_message(err, "Failed to return book")
            ))
        }
    }
}

fn failure_message(err: &ApiError, fallback: &str) -> String {
    match err {
        ApiError::Status { message, .. } => message.clone().unwrap_or_else(|| fallback.to_string()),
        other => other.to_string(),
    }
}

/// Case-insensitive substring match on a title. A blank query matches everything.
pub fn title_matches(title: &str, query: &str) -> bool {
    let query = query.trim();
    if query.is_empty() {
        return true;
    }
    title.to_lowercase().contains(&query.to_lowercase())
}

/// Raw input of the borrow form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BorrowForm {
    pub book_id: Option<EntityId>,
    pub borrower: String,
    pub borrow_date: String,
}

/// A borrow that passed presence checks and has its return date computed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BorrowDraft {
    pub book_id: EntityId,
    pub borrower: String,
    pub borrow_date: String,
    pub return_date: String,
}

impl BorrowForm {
    pub fn prepare(&self) -> Result<BorrowDraft, Rejection> {
        let borrower = self.borrower.trim();
        let date = self.borrow_date.trim();
        let book_id = match &self.book_id {
            Some(id) if !id.as_str().is_empty() => id.clone(),
            _ => return Err(Rejection::MissingFields),
        };
        if borrower.is_empty() || date.is_empty() {
            return Err(Rejection::MissingFields);
        }
        let borrow_date = parse_date(date).ok_or(Rejection::InvalidDate)?;

        Ok(BorrowDraft {
            book_id,
            borrower: borrower.to_string(),
            borrow_date: format_date(borrow_date),
            return_date: format_date(loan_return_date(borrow_date)),
        })
    }
}

impl BorrowDraft {
    pub fn confirmation(&self) -> String {
        format!("Are you sure you want to borrow Book ID {}?", self.book_id)
    }

    pub fn request(&self) -> BorrowRequest {
        BorrowRequest {
            bookid: self.book_id.clone(),
            name: self.borrower.clone(),
            borrow_date: self.borrow_date.clone(),
            return_date: self.return_date.clone(),
        }
    }
}

/// Raw input of the return form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReturnForm {
    pub book_id: Option<EntityId>,
    pub return_date: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnDraft {
    pub book_id: EntityId,
    pub return_date: String,
}

impl ReturnForm {
    pub fn prepare(&self) -> Result<ReturnDraft, Rejection> {
        let return_date = self.return_date.trim();
        match &self.book_id {
            Some(id) if !id.as_str().is_empty() && !return_date.is_empty() => Ok(ReturnDraft {
                book_id: id.clone(),
                return_date: return_date.to_string(),
            }),
            _ => Err(Rejection::MissingFields),
        }
    }
}

impl ReturnDraft {
    pub fn confirmation(&self) -> String {
        format!("Are you sure you want to return Book ID {}?", self.book_id)
    }

    pub fn request(&self) -> ReturnRequest {
        ReturnRequest {
            bookid: self.book_id.clone(),
        }
    }
}
