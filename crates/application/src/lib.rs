//! Application orchestration layer for the library catalog.

use libcat_api::ApiError;
use libcat_core::{EntityId, Settings};

mod catalog;
mod viewer;

pub use catalog::{
    BookRow, BorrowDraft, BorrowForm, CLEAR_ALL_CONFIRMATION, Catalog, CatalogCollections,
    CatalogEntry, LOAD_FAILED_MESSAGE, Notice, NoticeLevel, Rejection, ReturnDraft, ReturnForm,
    SelectOption, SyncState, borrow_notice, clear_all_and_reload, fetch_collections,
    load_catalog, return_notice,
};
pub use viewer::{
    AVAILABLE_FOR_BORROWING, DescriptionState, DescriptionSubject, ENTITY_NOT_FOUND, EntityPage,
    INVALID_PARAMETERS, LoanDetails, NO_DESCRIPTION, Property, ViewerPage, ViewerTarget,
    description_error_message, fetch_description, load_entity, open_viewer,
};

#[derive(Debug, Clone)]
pub enum CatalogState {
    Loading,
    Ready(Catalog),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct AppContext {
    pub settings: Settings,
    pub catalog: CatalogState,
    pub search_query: String,
    /// Position within the visible (filtered) rows.
    pub selected: usize,
}

impl AppContext {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            catalog: CatalogState::Loading,
            search_query: String::new(),
            selected: 0,
        }
    }

    pub fn with_catalog(mut self, catalog: Catalog) -> Self {
        self.set_catalog(catalog);
        self
    }

    /// Replaces the catalog; writes still awaiting the backend stay applied.
    pub fn set_catalog(&mut self, mut catalog: Catalog) {
        if let CatalogState::Ready(previous) = &self.catalog {
            catalog.carry_pending(previous);
        }
        self.catalog = CatalogState::Ready(catalog);
        self.clamp_selection();
    }

    pub fn catalog(&self) -> Option<&Catalog> {
        match &self.catalog {
            CatalogState::Ready(catalog) => Some(catalog),
            _ => None,
        }
    }

    pub fn catalog_mut(&mut self) -> Option<&mut Catalog> {
        match &mut self.catalog {
            CatalogState::Ready(catalog) => Some(catalog),
            _ => None,
        }
    }

    /// Every reply yields a notice, whatever happened to the catalog meanwhile.
    pub fn settle_borrow(&mut self, id: &EntityId, outcome: &Result<(), ApiError>) -> Notice {
        match self.catalog_mut() {
            Some(catalog) => catalog.settle_borrow(id, outcome),
            None => borrow_notice(id, outcome),
        }
    }

    pub fn settle_return(&mut self, id: &EntityId, outcome: &Result<(), ApiError>) -> Notice {
        match self.catalog_mut() {
            Some(catalog) => catalog.settle_return(id, outcome),
            None => return_notice(id, outcome),
        }
    }

    pub fn visible_indices(&self) -> Vec<usize> {
        self.catalog()
            .map(|catalog| catalog.visible_indices(&self.search_query))
            .unwrap_or_default()
    }

    pub fn set_search_query(&mut self, query: String) {
        self.search_query = query;
        self.clamp_selection();
    }

    pub fn select_next(&mut self) {
        let len = self.visible_indices().len();
        if len > 0 {
            self.selected = (self.selected + 1).min(len - 1);
        }
    }

    pub fn select_prev(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    pub fn selected_book_id(&self) -> Option<EntityId> {
        let catalog = self.catalog()?;
        let index = *self.visible_indices().get(self.selected)?;
        catalog.entries().get(index).map(|entry| entry.book.id.clone())
    }

    fn clamp_selection(&mut self) {
        let len = self.visible_indices().len();
        self.selected = self.selected.min(len.saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use libcat_test::{make_book, sample_collections};

    fn borrow_book_one(ctx: &mut AppContext) {
        let draft = BorrowForm {
            book_id: Some(EntityId::from(1)),
            borrower: "Ada".to_string(),
            borrow_date: "2024-03-10".to_string(),
        }
        .prepare()
        .unwrap();
        ctx.catalog_mut().unwrap().apply_borrow(&draft).unwrap();
    }

    #[test]
    fn selection_follows_search() {
        let mut ctx = AppContext::new(Settings::default())
            .with_catalog(Catalog::from_collections(sample_collections()));
        ctx.select_next();
        ctx.select_next();
        assert_eq!(ctx.selected_book_id(), Some(EntityId::from(3)));

        ctx.set_search_query("dune".to_string());
        assert_eq!(ctx.selected, 0);
        assert_eq!(ctx.selected_book_id(), Some(EntityId::from(1)));

        ctx.set_search_query("nothing matches".to_string());
        assert_eq!(ctx.selected_book_id(), None);
    }

    #[test]
    fn loading_context_has_no_rows() {
        let ctx = AppContext::new(Settings::default());
        assert!(ctx.visible_indices().is_empty());
        assert_eq!(ctx.selected_book_id(), None);
    }

    #[test]
    fn reload_keeps_selection_in_range() {
        let mut ctx = AppContext::new(Settings::default())
            .with_catalog(Catalog::from_collections(sample_collections()));
        ctx.select_next();
        ctx.select_next();
        ctx.set_catalog(Catalog::from_collections(CatalogCollections {
            books: vec![make_book(9, "Solaris", None)],
            ..CatalogCollections::default()
        }));
        assert_eq!(ctx.selected, 0);
        assert_eq!(ctx.selected_book_id(), Some(EntityId::from(9)));
    }

    #[test]
    fn reply_after_reload_rolls_back_to_reloaded_row() {
        let mut ctx = AppContext::new(Settings::default())
            .with_catalog(Catalog::from_collections(sample_collections()));
        borrow_book_one(&mut ctx);

        ctx.set_catalog(Catalog::from_collections(sample_collections()));
        let row = ctx.catalog().unwrap().row(&EntityId::from(1)).unwrap();
        assert!(row.pending);
        assert_eq!(row.borrower, "Ada");

        let err = ApiError::Status {
            status: 409,
            message: Some("Book already on loan".to_string()),
        };
        let notice = ctx.settle_borrow(&EntityId::from(1), &Err(err));
        assert_eq!(notice.level, NoticeLevel::Error);
        assert_eq!(notice.message, "Error borrowing book: Book already on loan");
        let row = ctx.catalog().unwrap().row(&EntityId::from(1)).unwrap();
        assert!(!row.pending);
        assert_eq!(row.borrower, "");
    }

    #[test]
    fn reply_after_failed_load_still_notifies() {
        let mut ctx = AppContext::new(Settings::default())
            .with_catalog(Catalog::from_collections(sample_collections()));
        borrow_book_one(&mut ctx);
        ctx.catalog = CatalogState::Failed(LOAD_FAILED_MESSAGE.to_string());

        let notice = ctx.settle_borrow(&EntityId::from(1), &Ok(()));
        assert_eq!(notice.message, "Book ID 1 has been successfully borrowed.");
        let err = ApiError::Status {
            status: 500,
            message: None,
        };
        let notice = ctx.settle_return(&EntityId::from(2), &Err(err));
        assert_eq!(notice.message, "Error returning book: Failed to return book");
    }
}
