//! Terminal UI for the library catalog.

use std::collections::VecDeque;
use std::io::{self, Stdout};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{event, terminal};
use libcat_api::LibraryApi;
use libcat_application::{
    AppContext, BookRow, BorrowDraft, BorrowForm, CLEAR_ALL_CONFIRMATION, CatalogState,
    DescriptionState, LOAD_FAILED_MESSAGE, Notice, NoticeLevel, ReturnDraft, ReturnForm,
    SelectOption, ViewerPage, ViewerTarget, clear_all_and_reload, fetch_description,
    load_catalog, load_entity, open_viewer,
};
use libcat_core::{
    BookStatus, EntityId, EntityKind, QueryParams, Theme, format_date, loan_return_date,
    parse_date,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{
    Block, Borders, Cell, Clear, HighlightSpacing, Paragraph, Row, Table, TableState, Wrap,
};
use tokio::runtime::Handle;
use tracing::{error, info};
use unicode_width::UnicodeWidthStr;

mod tasks;
mod viewer;

use tasks::{TaskResult, Tasks};
use viewer::ViewerScreen;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiExit {
    Quit,
}

#[derive(Debug, Clone)]
pub struct UiOutcome {
    pub ctx: AppContext,
    pub exit: UiExit,
}

pub struct Ui {
    ctx: AppContext,
    tasks: Tasks,
    search_panel: SearchPanel,
    borrow_panel: BorrowPanel,
    return_panel: ReturnPanel,
    confirm: Option<PendingAction>,
    alerts: VecDeque<Notice>,
    viewers: Vec<ViewerScreen>,
    next_screen_id: u64,
    status: Option<String>,
}

impl Ui {
    pub fn new(mut ctx: AppContext, api: Arc<dyn LibraryApi>, runtime: Handle) -> Self {
        ctx.settings.normalize();
        Self {
            ctx,
            tasks: Tasks::new(api, runtime),
            search_panel: SearchPanel::default(),
            borrow_panel: BorrowPanel::default(),
            return_panel: ReturnPanel::default(),
            confirm: None,
            alerts: VecDeque::new(),
            viewers: Vec::new(),
            next_screen_id: 0,
            status: None,
        }
    }

    /// Starts on a viewer screen for a `type=..&id=..` query.
    pub fn with_view(mut self, query: &str) -> Self {
        let params = QueryParams::parse(query);
        let screen = self.push_screen(query.to_string());
        self.tasks.spawn(move |api| async move {
            let page = open_viewer(api.as_ref(), &params).await;
            TaskResult::ViewerLoaded { screen, page }
        });
        self
    }

    pub fn run(&mut self) -> anyhow::Result<UiOutcome> {
        if matches!(self.ctx.catalog, CatalogState::Loading) {
            self.reload_catalog();
        }
        let mut terminal = setup_terminal()?;
        terminal.clear().ok();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.event_loop(&mut terminal)
        }));
        let restore_result = restore_terminal(&mut terminal);

        match (result, restore_result) {
            (Ok(Ok(outcome)), Ok(())) => Ok(outcome),
            (Ok(Ok(_)), Err(err)) => Err(err),
            (Ok(Err(err)), Ok(())) => Err(err),
            (Ok(_), Err(err)) => Err(err),
            (Err(panic), Ok(())) => Err(anyhow::anyhow!(panic_to_string(panic))),
            (Err(panic), Err(err)) => Err(anyhow::anyhow!(
                "{}\n(additionally failed to restore terminal: {err})",
                panic_to_string(panic)
            )),
        }
    }

    fn accent_color(&self) -> Color {
        match self.ctx.settings.theme {
            Theme::Light => Color::Blue,
            Theme::Dark => Color::Yellow,
        }
    }

    fn event_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    ) -> anyhow::Result<UiOutcome> {
        let tick_rate = Duration::from_millis(250);
        let mut needs_redraw = true;

        loop {
            for result in self.tasks.drain() {
                self.apply_task_result(result);
                needs_redraw = true;
            }

            if needs_redraw {
                terminal.draw(|frame| self.draw(frame.area(), frame))?;
                needs_redraw = false;
            }

            if !event::poll(tick_rate)? {
                continue;
            }

            match event::read()? {
                Event::Resize(_, _) => {
                    needs_redraw = true;
                }
                Event::Key(key) => {
                    if key.kind == KeyEventKind::Release {
                        continue;
                    }

                    needs_redraw = true;
                    if let Some(exit) = self.handle_key(key)? {
                        return Ok(UiOutcome {
                            ctx: self.ctx.clone(),
                            exit,
                        });
                    }
                }
                _ => {}
            }
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> anyhow::Result<Option<UiExit>> {
        if !self.alerts.is_empty() {
            self.handle_alert_key(key)
        } else if self.confirm.is_some() {
            self.handle_confirm_key(key)
        } else if self.borrow_panel.open {
            self.handle_borrow_panel_key(key)
        } else if self.return_panel.open {
            self.handle_return_panel_key(key)
        } else if self.search_panel.open {
            self.handle_search_panel_key(key)
        } else if !self.viewers.is_empty() {
            self.handle_viewer_key(key)
        } else {
            self.handle_main_key(key)
        }
    }

    fn apply_task_result(&mut self, result: TaskResult) {
        match result {
            TaskResult::CatalogLoaded(Ok(catalog)) => {
                self.status = None;
                self.ctx.set_catalog(catalog);
            }
            TaskResult::CatalogLoaded(Err(err)) => {
                error!(error = %err, "catalog load failed");
                self.status = None;
                self.ctx.catalog = CatalogState::Failed(LOAD_FAILED_MESSAGE.to_string());
                self.alerts.push_back(Notice::error(LOAD_FAILED_MESSAGE));
            }
            TaskResult::Borrowed { id, result } => {
                let notice = self.ctx.settle_borrow(&id, &result);
                self.alerts.push_back(notice);
            }
            TaskResult::Returned { id, result } => {
                let notice = self.ctx.settle_return(&id, &result);
                self.alerts.push_back(notice);
            }
            TaskResult::ViewerLoaded { screen, page } => {
                let subject = match &page {
                    ViewerPage::Entity(entity) => entity.subject.clone(),
                    ViewerPage::Message(_) => None,
                };
                let Some(viewer) = self.viewers.iter_mut().find(|v| v.id == screen) else {
                    return;
                };
                viewer.page = Some(page);
                viewer.selected_link = 0;
                if let Some(subject) = subject {
                    viewer.description = Some(DescriptionState::Loading);
                    self.tasks.spawn(move |api| async move {
                        let state = fetch_description(api.as_ref(), &subject).await;
                        TaskResult::DescriptionLoaded { screen, state }
                    });
                }
            }
            TaskResult::DescriptionLoaded { screen, state } => {
                if let Some(viewer) = self.viewers.iter_mut().find(|v| v.id == screen) {
                    viewer.description = Some(state);
                }
            }
        }
    }

    fn reload_catalog(&mut self) {
        self.status = Some("Loading library data…".to_string());
        self.tasks.spawn(|api| async move {
            TaskResult::CatalogLoaded(load_catalog(api.as_ref()).await)
        });
    }

    fn push_screen(&mut self, title: String) -> u64 {
        self.next_screen_id += 1;
        let id = self.next_screen_id;
        self.viewers.push(ViewerScreen::new(id, title));
        id
    }

    fn open_target(&mut self, target: ViewerTarget) {
        let screen = self.push_screen(target.link());
        self.tasks.spawn(move |api| async move {
            let page = load_entity(api.as_ref(), &target).await;
            TaskResult::ViewerLoaded { screen, page }
        });
    }

    fn selected_row(&self) -> Option<BookRow> {
        let id = self.ctx.selected_book_id()?;
        self.ctx.catalog()?.row(&id)
    }

    /// Opens the viewer for the selected book, or for one of its references.
    fn open_selected(&mut self, kind: EntityKind) {
        let Some(id) = self.ctx.selected_book_id() else {
            return;
        };
        let reference = match kind {
            EntityKind::Books => Some(id),
            _ => self
                .ctx
                .catalog()
                .and_then(|catalog| catalog.entry(&id))
                .and_then(|entry| match kind {
                    EntityKind::Author => entry.book.author.clone(),
                    EntityKind::Publisher => entry.book.publisher.clone(),
                    EntityKind::Genre => entry.book.genre.clone(),
                    _ => None,
                }),
        };
        if let Some(reference) = reference {
            self.open_target(ViewerTarget::new(kind, &reference));
        }
    }

    fn handle_main_key(&mut self, key: KeyEvent) -> anyhow::Result<Option<UiExit>> {
        match key.code {
            KeyCode::Esc | KeyCode::Char('q') => Ok(Some(UiExit::Quit)),
            KeyCode::Down | KeyCode::Char('j') => {
                self.ctx.select_next();
                Ok(None)
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.ctx.select_prev();
                Ok(None)
            }
            KeyCode::Char('/') => {
                self.search_panel.open = true;
                self.search_panel.snapshot = self.ctx.search_query.clone();
                Ok(None)
            }
            KeyCode::Char('b') => {
                self.open_borrow_panel();
                Ok(None)
            }
            KeyCode::Char('r') => {
                self.open_return_panel();
                Ok(None)
            }
            KeyCode::Char('C') => {
                if self.ctx.catalog().is_some() {
                    self.confirm = Some(PendingAction::ClearAll);
                }
                Ok(None)
            }
            KeyCode::Char('R') => {
                self.reload_catalog();
                Ok(None)
            }
            KeyCode::Enter | KeyCode::Char('v') => {
                self.open_selected(EntityKind::Books);
                Ok(None)
            }
            KeyCode::Char('a') => {
                self.open_selected(EntityKind::Author);
                Ok(None)
            }
            KeyCode::Char('p') => {
                self.open_selected(EntityKind::Publisher);
                Ok(None)
            }
            KeyCode::Char('g') => {
                self.open_selected(EntityKind::Genre);
                Ok(None)
            }
            KeyCode::Char('t') => {
                self.ctx.settings.cycle_theme();
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    fn handle_alert_key(&mut self, key: KeyEvent) -> anyhow::Result<Option<UiExit>> {
        if matches!(key.code, KeyCode::Enter | KeyCode::Esc | KeyCode::Char(' ')) {
            self.alerts.pop_front();
        }
        Ok(None)
    }

    fn handle_confirm_key(&mut self, key: KeyEvent) -> anyhow::Result<Option<UiExit>> {
        match key.code {
            KeyCode::Enter | KeyCode::Char('y') | KeyCode::Char('Y') => {
                if let Some(action) = self.confirm.take() {
                    self.run_action(action);
                }
            }
            KeyCode::Esc | KeyCode::Char('n') | KeyCode::Char('N') => {
                self.confirm = None;
            }
            _ => {}
        }
        Ok(None)
    }

    fn run_action(&mut self, action: PendingAction) {
        match action {
            PendingAction::Borrow(draft) => {
                let Some(catalog) = self.ctx.catalog_mut() else {
                    return;
                };
                match catalog.apply_borrow(&draft) {
                    Ok(request) => {
                        info!(
                            book = %draft.book_id,
                            borrower = %draft.borrower,
                            "borrow requested"
                        );
                        self.borrow_panel.open = false;
                        let id = draft.book_id;
                        self.tasks.spawn(move |api| async move {
                            let result = api.borrow(&request).await;
                            TaskResult::Borrowed { id, result }
                        });
                    }
                    Err(rejection) => self.alerts.push_back(rejection.into()),
                }
            }
            PendingAction::Return(draft) => {
                let Some(catalog) = self.ctx.catalog_mut() else {
                    return;
                };
                match catalog.apply_return(&draft) {
                    Ok(request) => {
                        info!(book = %draft.book_id, "return requested");
                        self.return_panel.open = false;
                        let id = draft.book_id;
                        self.tasks.spawn(move |api| async move {
                            let result = api.return_book(&request).await;
                            TaskResult::Returned { id, result }
                        });
                    }
                    Err(rejection) => self.alerts.push_back(rejection.into()),
                }
            }
            PendingAction::ClearAll => {
                self.status = Some("Clearing borrowing data…".to_string());
                self.tasks.spawn(|api| async move {
                    TaskResult::CatalogLoaded(clear_all_and_reload(api.as_ref()).await)
                });
            }
        }
    }

    fn handle_search_panel_key(&mut self, key: KeyEvent) -> anyhow::Result<Option<UiExit>> {
        if key.modifiers.contains(KeyModifiers::CONTROL)
            && let KeyCode::Char('u') = key.code
        {
            self.ctx.set_search_query(String::new());
            return Ok(None);
        }

        match key.code {
            KeyCode::Esc => {
                let snapshot = std::mem::take(&mut self.search_panel.snapshot);
                self.ctx.set_search_query(snapshot);
                self.search_panel.open = false;
            }
            KeyCode::Enter => {
                self.search_panel.open = false;
            }
            KeyCode::Down => self.ctx.select_next(),
            KeyCode::Up => self.ctx.select_prev(),
            KeyCode::Backspace => {
                let mut query = self.ctx.search_query.clone();
                query.pop();
                self.ctx.set_search_query(query);
            }
            KeyCode::Char(ch) if !ch.is_control() => {
                let mut query = self.ctx.search_query.clone();
                query.push(ch);
                self.ctx.set_search_query(query);
            }
            _ => {}
        }
        Ok(None)
    }

    fn open_borrow_panel(&mut self) {
        let Some(catalog) = self.ctx.catalog() else {
            return;
        };
        let options = catalog.borrow_candidates();
        let preferred = self.ctx.selected_book_id();
        self.borrow_panel = BorrowPanel::new(options, preferred.as_ref(), today());
    }

    fn open_return_panel(&mut self) {
        let Some(catalog) = self.ctx.catalog() else {
            return;
        };
        let options = catalog.return_candidates();
        let preferred = self.ctx.selected_book_id();
        self.return_panel = ReturnPanel::new(options, preferred.as_ref(), today());
    }

    fn handle_borrow_panel_key(&mut self, key: KeyEvent) -> anyhow::Result<Option<UiExit>> {
        let panel = &mut self.borrow_panel;
        if key.modifiers.contains(KeyModifiers::CONTROL)
            && let KeyCode::Char('u') = key.code
        {
            if let Some(field) = panel.focused_text() {
                field.clear();
            }
            return Ok(None);
        }

        match key.code {
            KeyCode::Esc => panel.open = false,
            KeyCode::Tab | KeyCode::Down => panel.focus = panel.focus.next(),
            KeyCode::BackTab | KeyCode::Up => panel.focus = panel.focus.prev(),
            KeyCode::Left if panel.focus == BorrowField::Book => panel.book.prev(),
            KeyCode::Right if panel.focus == BorrowField::Book => panel.book.next(),
            KeyCode::Enter => match panel.form().prepare() {
                Ok(draft) => self.confirm = Some(PendingAction::Borrow(draft)),
                Err(rejection) => self.alerts.push_back(rejection.into()),
            },
            KeyCode::Backspace => {
                if let Some(field) = panel.focused_text() {
                    field.pop();
                }
            }
            KeyCode::Char(ch) if !ch.is_control() => {
                if let Some(field) = panel.focused_text() {
                    field.push(ch);
                }
            }
            _ => {}
        }
        Ok(None)
    }

    fn handle_return_panel_key(&mut self, key: KeyEvent) -> anyhow::Result<Option<UiExit>> {
        let panel = &mut self.return_panel;
        if key.modifiers.contains(KeyModifiers::CONTROL)
            && let KeyCode::Char('u') = key.code
        {
            if panel.date_focused {
                panel.return_date.clear();
            }
            return Ok(None);
        }

        match key.code {
            KeyCode::Esc => panel.open = false,
            KeyCode::Tab | KeyCode::BackTab | KeyCode::Down | KeyCode::Up => {
                panel.date_focused = !panel.date_focused;
            }
            KeyCode::Left if !panel.date_focused => panel.book.prev(),
            KeyCode::Right if !panel.date_focused => panel.book.next(),
            KeyCode::Enter => match panel.form().prepare() {
                Ok(draft) => self.confirm = Some(PendingAction::Return(draft)),
                Err(rejection) => self.alerts.push_back(rejection.into()),
            },
            KeyCode::Backspace if panel.date_focused => {
                panel.return_date.pop();
            }
            KeyCode::Char(ch) if panel.date_focused && !ch.is_control() => {
                panel.return_date.push(ch);
            }
            _ => {}
        }
        Ok(None)
    }

    fn handle_viewer_key(&mut self, key: KeyEvent) -> anyhow::Result<Option<UiExit>> {
        let Some(screen) = self.viewers.last_mut() else {
            return Ok(None);
        };
        match key.code {
            KeyCode::Esc | KeyCode::Backspace => {
                self.viewers.pop();
            }
            KeyCode::Char('q') => return Ok(Some(UiExit::Quit)),
            KeyCode::Down | KeyCode::Char('j') => screen.select_next_link(),
            KeyCode::Up | KeyCode::Char('k') => screen.select_prev_link(),
            KeyCode::PageDown => screen.scroll = screen.scroll.saturating_add(10),
            KeyCode::PageUp => screen.scroll = screen.scroll.saturating_sub(10),
            KeyCode::Home => screen.scroll = 0,
            KeyCode::Enter => {
                if let Some(target) = screen.selected_target() {
                    self.open_target(target);
                }
            }
            KeyCode::Char('t') => self.ctx.settings.cycle_theme(),
            _ => {}
        }
        Ok(None)
    }

    fn footer_lines(&self) -> Vec<Line<'static>> {
        let key =
            |k: &str| Span::styled(k.to_string(), Style::default().add_modifier(Modifier::BOLD));

        if !self.alerts.is_empty() {
            return vec![Line::from(vec![key("Enter"), Span::raw(" dismiss")])];
        }
        if self.confirm.is_some() {
            return vec![Line::from(vec![
                key("y/Enter"),
                Span::raw(" confirm  "),
                key("n/Esc"),
                Span::raw(" cancel"),
            ])];
        }
        if self.borrow_panel.open || self.return_panel.open {
            return vec![Line::from(vec![
                key("Tab"),
                Span::raw(" next field  "),
                key("←/→"),
                Span::raw(" change book  "),
                key("Enter"),
                Span::raw(" submit  "),
                key("Esc"),
                Span::raw(" cancel"),
            ])];
        }
        if self.search_panel.open {
            return vec![Line::from(vec![
                key("Esc"),
                Span::raw(" cancel  "),
                key("Enter"),
                Span::raw(" keep  "),
                key("Ctrl+u"),
                Span::raw(" clear"),
            ])];
        }
        if self.viewers.len() == 1 {
            return vec![Line::from(vec![
                key("Esc"),
                Span::raw(" back to catalog  "),
                key("↑/↓"),
                Span::raw(" link  "),
                key("Enter"),
                Span::raw(" open  "),
                key("PgUp/PgDn"),
                Span::raw(" scroll"),
            ])];
        }
        if !self.viewers.is_empty() {
            return vec![Line::from(vec![
                key("Esc"),
                Span::raw(" back  "),
                key("↑/↓"),
                Span::raw(" link  "),
                key("Enter"),
                Span::raw(" open  "),
                key("PgUp/PgDn"),
                Span::raw(" scroll"),
            ])];
        }

        vec![
            Line::from(vec![
                key("q"),
                Span::raw(" quit  "),
                key("↑/↓"),
                Span::raw(" move  "),
                key("Enter"),
                Span::raw(" details  "),
                key("a/p/g"),
                Span::raw(" author/publisher/genre  "),
                key("/"),
                Span::raw(" search"),
            ]),
            Line::from(vec![
                key("b"),
                Span::raw(" borrow  "),
                key("r"),
                Span::raw(" return  "),
                key("C"),
                Span::raw(" clear all  "),
                key("R"),
                Span::raw(" reload  "),
                key("t"),
                Span::raw(" theme"),
            ]),
        ]
    }

    fn header_lines(&self) -> Vec<Line<'static>> {
        let mut lines = vec![Line::from(vec![
            Span::styled(
                "Library Catalog",
                Style::default().add_modifier(Modifier::BOLD),
            ),
            Span::raw(format!(" · {}", self.ctx.settings.api_url)),
        ])];

        if let Some(status) = &self.status {
            lines.push(Line::from(Span::styled(
                status.clone(),
                Style::default().fg(self.accent_color()),
            )));
        } else if self.search_panel.open || !self.ctx.search_query.trim().is_empty() {
            let mut spans = vec![
                Span::styled("Search: ", Style::default().add_modifier(Modifier::BOLD)),
                Span::raw(self.ctx.search_query.clone()),
            ];
            if self.search_panel.open {
                spans.push(Span::styled("▏", Style::default().fg(self.accent_color())));
            }
            lines.push(Line::from(spans));
        } else if self.tasks.busy() {
            lines.push(Line::from(Span::styled(
                "Working…",
                Style::default().fg(Color::DarkGray),
            )));
        }

        lines
    }

    fn draw(&mut self, area: Rect, frame: &mut ratatui::Frame) {
        frame.render_widget(Clear, area);

        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(0),
                Constraint::Length(3),
            ])
            .split(area);

        let title = Paragraph::new(Text::from(self.header_lines()))
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::BOTTOM));
        frame.render_widget(title, layout[0]);

        if self.viewers.is_empty() {
            self.draw_catalog(frame, layout[1]);
        } else {
            self.draw_viewer(frame, layout[1]);
        }

        let footer = Paragraph::new(Text::from(self.footer_lines()))
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::TOP));
        frame.render_widget(footer, layout[2]);

        if self.borrow_panel.open {
            self.draw_borrow_panel(area, frame);
        }
        if self.return_panel.open {
            self.draw_return_panel(area, frame);
        }
        if let Some(action) = &self.confirm {
            self.draw_confirm(action, area, frame);
        }
        if let Some(notice) = self.alerts.front() {
            self.draw_alert(notice, area, frame);
        }
    }

    fn draw_catalog(&self, frame: &mut ratatui::Frame, area: Rect) {
        let catalog = match &self.ctx.catalog {
            CatalogState::Ready(catalog) => catalog,
            CatalogState::Loading => {
                let block = Block::default().borders(Borders::ALL).title("Books");
                frame.render_widget(Paragraph::new("Loading library data…").block(block), area);
                return;
            }
            CatalogState::Failed(message) => {
                let block = Block::default().borders(Borders::ALL).title("Books");
                let lines = vec![
                    Line::raw(message.clone()),
                    Line::raw(""),
                    Line::raw("Press R to reload."),
                ];
                let paragraph = Paragraph::new(Text::from(lines))
                    .block(block)
                    .wrap(Wrap { trim: true });
                frame.render_widget(paragraph, area);
                return;
            }
        };

        let visible = self.ctx.visible_indices();
        let title = if self.ctx.search_query.trim().is_empty() {
            format!("Books ({})", catalog.len())
        } else {
            format!("Books · {}/{} matches", visible.len(), catalog.len())
        };
        let block = Block::default().borders(Borders::ALL).title(title);

        if catalog.is_empty() || visible.is_empty() {
            let mut lines = Vec::new();
            if catalog.is_empty() {
                lines.push(Line::raw("No books in the catalog."));
            } else {
                lines.push(Line::raw("No matches."));
                lines.push(Line::raw(""));
                lines.push(Line::raw(format!("Query: {}", self.ctx.search_query.trim())));
                lines.push(Line::raw("Tip: press / to edit the search, Ctrl+u to clear."));
            }
            let paragraph = Paragraph::new(Text::from(lines))
                .block(block)
                .wrap(Wrap { trim: true });
            frame.render_widget(paragraph, area);
            return;
        }

        let rows: Vec<Row> = visible
            .iter()
            .filter_map(|idx| catalog.entries().get(*idx))
            .filter_map(|entry| catalog.row(&entry.book.id))
            .map(|row| table_row(&row))
            .collect();

        let header = Row::new(TABLE_COLUMNS.iter().map(|(name, _)| Cell::from(*name)))
            .style(Style::default().add_modifier(Modifier::BOLD));
        let widths = TABLE_COLUMNS.iter().map(|(_, width)| *width);

        let highlight_style = Style::default()
            .fg(Color::Black)
            .bg(self.accent_color())
            .add_modifier(Modifier::BOLD);

        let table = Table::new(rows, widths)
            .header(header)
            .block(block)
            .row_highlight_style(highlight_style)
            .highlight_symbol("> ")
            .highlight_spacing(HighlightSpacing::Always);

        let mut state = TableState::default();
        state.select(Some(self.ctx.selected.min(visible.len().saturating_sub(1))));
        frame.render_stateful_widget(table, area, &mut state);
    }

    fn draw_viewer(&self, frame: &mut ratatui::Frame, area: Rect) {
        let Some(screen) = self.viewers.last() else {
            return;
        };
        let block = Block::default().borders(Borders::ALL).title(Span::styled(
            screen.heading(),
            Style::default().add_modifier(Modifier::BOLD),
        ));
        let inner_width = block.inner(area).width as usize;
        let lines = screen.body_lines(inner_width, self.accent_color());
        let paragraph = Paragraph::new(Text::from(lines))
            .block(block)
            .wrap(Wrap { trim: false })
            .scroll((screen.scroll, 0));
        frame.render_widget(paragraph, area);
    }

    fn draw_borrow_panel(&self, area: Rect, frame: &mut ratatui::Frame) {
        let panel = &self.borrow_panel;
        let accent = self.accent_color();
        let return_date = parse_date(&panel.borrow_date)
            .map(|date| format_date(loan_return_date(date)))
            .unwrap_or_else(|| "-".to_string());
        let lines = vec![
            chooser_line("Book", &panel.book, panel.focus == BorrowField::Book, accent),
            field_line(
                "Borrower",
                &panel.borrower,
                panel.focus == BorrowField::Borrower,
                accent,
            ),
            field_line(
                "Borrow date",
                &panel.borrow_date,
                panel.focus == BorrowField::BorrowDate,
                accent,
            ),
            Line::from(vec![
                Span::styled("Return date: ", Style::default().add_modifier(Modifier::BOLD)),
                Span::styled(return_date, Style::default().fg(Color::Gray)),
            ]),
        ];
        draw_popup(frame, area, "Borrow a Book", lines, 64, 36);
    }

    fn draw_return_panel(&self, area: Rect, frame: &mut ratatui::Frame) {
        let panel = &self.return_panel;
        let accent = self.accent_color();
        let lines = vec![
            chooser_line("Book", &panel.book, !panel.date_focused, accent),
            field_line("Return date", &panel.return_date, panel.date_focused, accent),
        ];
        draw_popup(frame, area, "Return a Book", lines, 64, 30);
    }

    fn draw_confirm(&self, action: &PendingAction, area: Rect, frame: &mut ratatui::Frame) {
        let popup_area = centered_rect(50, 24, area);
        let width = popup_area.width.saturating_sub(2) as usize;
        let mut lines: Vec<Line> = wrap_text(&action.confirmation(), width)
            .into_iter()
            .map(Line::raw)
            .collect();
        lines.push(Line::raw(""));
        lines.push(Line::from(vec![
            Span::styled("y", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(" confirm  "),
            Span::styled("n", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(" cancel"),
        ]));
        draw_popup(frame, area, "Confirm", lines, 50, 24);
    }

    fn draw_alert(&self, notice: &Notice, area: Rect, frame: &mut ratatui::Frame) {
        let popup_area = centered_rect(50, 24, area);
        frame.render_widget(Clear, popup_area);

        let (title, color) = match notice.level {
            NoticeLevel::Info => ("Notice", self.accent_color()),
            NoticeLevel::Error => ("Error", Color::Red),
        };
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(color))
            .title(Span::styled(
                title,
                Style::default().fg(color).add_modifier(Modifier::BOLD),
            ));
        let inner = block.inner(popup_area);
        frame.render_widget(block, popup_area);

        let mut lines: Vec<Line> = wrap_text(&notice.message, inner.width as usize)
            .into_iter()
            .map(Line::raw)
            .collect();
        if self.alerts.len() > 1 {
            lines.push(Line::raw(""));
            lines.push(Line::from(Span::styled(
                format!("({} more)", self.alerts.len() - 1),
                Style::default().fg(Color::DarkGray),
            )));
        }
        frame.render_widget(Paragraph::new(Text::from(lines)), inner);
    }
}

const TABLE_COLUMNS: [(&str, Constraint); 9] = [
    ("ID", Constraint::Length(6)),
    ("Title", Constraint::Fill(3)),
    ("Author", Constraint::Fill(2)),
    ("Publisher", Constraint::Fill(2)),
    ("Genre", Constraint::Fill(2)),
    ("Borrower", Constraint::Fill(2)),
    ("Borrow Date", Constraint::Length(11)),
    ("Return Date", Constraint::Length(11)),
    ("Status", Constraint::Length(10)),
];

fn table_row(row: &BookRow) -> Row<'static> {
    let status_style = match (row.pending, row.status) {
        (true, _) => Style::default()
            .fg(Color::DarkGray)
            .add_modifier(Modifier::ITALIC),
        (false, BookStatus::Borrowed) => Style::default().fg(Color::Red),
        (false, BookStatus::Present) => Style::default().fg(Color::Green),
    };
    let status = if row.pending {
        format!("{}…", row.status)
    } else {
        row.status.to_string()
    };
    Row::new(vec![
        Cell::from(row.id.to_string()),
        Cell::from(row.title.clone()),
        Cell::from(row.author.clone()),
        Cell::from(row.publisher.clone()),
        Cell::from(row.genre.clone()),
        Cell::from(row.borrower.clone()),
        Cell::from(row.borrow_date.clone()),
        Cell::from(row.return_date.clone()),
        Cell::from(Span::styled(status, status_style)),
    ])
}

enum PendingAction {
    Borrow(BorrowDraft),
    Return(ReturnDraft),
    ClearAll,
}

impl PendingAction {
    fn confirmation(&self) -> String {
        match self {
            PendingAction::Borrow(draft) => draft.confirmation(),
            PendingAction::Return(draft) => draft.confirmation(),
            PendingAction::ClearAll => CLEAR_ALL_CONFIRMATION.to_string(),
        }
    }
}

#[derive(Default)]
struct SearchPanel {
    open: bool,
    /// Query to restore on Esc.
    snapshot: String,
}

/// A selector over borrow or return candidates.
#[derive(Default)]
struct BookChooser {
    options: Vec<SelectOption>,
    selected: usize,
}

impl BookChooser {
    fn new(options: Vec<SelectOption>, preferred: Option<&EntityId>) -> Self {
        let selected = preferred
            .and_then(|id| options.iter().position(|option| option.id == *id))
            .unwrap_or(0);
        Self { options, selected }
    }

    fn current(&self) -> Option<&SelectOption> {
        self.options.get(self.selected)
    }

    fn next(&mut self) {
        if !self.options.is_empty() {
            self.selected = (self.selected + 1) % self.options.len();
        }
    }

    fn prev(&mut self) {
        if !self.options.is_empty() {
            self.selected = (self.selected + self.options.len() - 1) % self.options.len();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum BorrowField {
    #[default]
    Book,
    Borrower,
    BorrowDate,
}

impl BorrowField {
    fn next(self) -> Self {
        match self {
            BorrowField::Book => BorrowField::Borrower,
            BorrowField::Borrower => BorrowField::BorrowDate,
            BorrowField::BorrowDate => BorrowField::Book,
        }
    }

    fn prev(self) -> Self {
        match self {
            BorrowField::Book => BorrowField::BorrowDate,
            BorrowField::Borrower => BorrowField::Book,
            BorrowField::BorrowDate => BorrowField::Borrower,
        }
    }
}

#[derive(Default)]
struct BorrowPanel {
    open: bool,
    focus: BorrowField,
    book: BookChooser,
    borrower: String,
    borrow_date: String,
}

impl BorrowPanel {
    fn new(options: Vec<SelectOption>, preferred: Option<&EntityId>, today: String) -> Self {
        Self {
            open: true,
            focus: BorrowField::Book,
            book: BookChooser::new(options, preferred),
            borrower: String::new(),
            borrow_date: today,
        }
    }

    fn focused_text(&mut self) -> Option<&mut String> {
        match self.focus {
            BorrowField::Book => None,
            BorrowField::Borrower => Some(&mut self.borrower),
            BorrowField::BorrowDate => Some(&mut self.borrow_date),
        }
    }

    fn form(&self) -> BorrowForm {
        BorrowForm {
            book_id: self.book.current().map(|option| option.id.clone()),
            borrower: self.borrower.clone(),
            borrow_date: self.borrow_date.clone(),
        }
    }
}

#[derive(Default)]
struct ReturnPanel {
    open: bool,
    date_focused: bool,
    book: BookChooser,
    return_date: String,
}

impl ReturnPanel {
    fn new(options: Vec<SelectOption>, preferred: Option<&EntityId>, today: String) -> Self {
        Self {
            open: true,
            date_focused: false,
            book: BookChooser::new(options, preferred),
            return_date: today,
        }
    }

    fn form(&self) -> ReturnForm {
        ReturnForm {
            book_id: self.book.current().map(|option| option.id.clone()),
            return_date: self.return_date.clone(),
        }
    }
}

fn today() -> String {
    format_date(chrono::Local::now().date_naive())
}

fn field_line(label: &str, value: &str, focused: bool, accent: Color) -> Line<'static> {
    let mut spans = vec![
        Span::styled(format!("{label}: "), Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(value.to_string()),
    ];
    if focused {
        spans.push(Span::styled("▏", Style::default().fg(accent)));
    }
    Line::from(spans)
}

fn chooser_line(label: &str, chooser: &BookChooser, focused: bool, accent: Color) -> Line<'static> {
    let text = match chooser.current() {
        Some(option) => format!("‹ {} ›", option.label),
        None => "(no books available)".to_string(),
    };
    let style = if focused {
        Style::default()
            .fg(Color::Black)
            .bg(accent)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::Gray)
    };
    Line::from(vec![
        Span::styled(format!("{label}: "), Style::default().add_modifier(Modifier::BOLD)),
        Span::styled(text, style),
    ])
}

fn draw_popup(
    frame: &mut ratatui::Frame,
    area: Rect,
    title: &str,
    lines: Vec<Line<'static>>,
    percent_x: u16,
    percent_y: u16,
) {
    let popup_area = centered_rect(percent_x, percent_y, area);
    frame.render_widget(Clear, popup_area);

    let block = Block::default().borders(Borders::ALL).title(Span::styled(
        title.to_string(),
        Style::default().add_modifier(Modifier::BOLD),
    ));
    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let paragraph = Paragraph::new(Text::from(lines))
        .wrap(Wrap { trim: true })
        .alignment(Alignment::Left);
    frame.render_widget(paragraph, inner);
}

fn setup_terminal() -> anyhow::Result<Terminal<CrosstermBackend<Stdout>>> {
    terminal::enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    crossterm::execute!(stdout, EnterAlternateScreen).context("enter alt screen")?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).context("create terminal")
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> anyhow::Result<()> {
    terminal::disable_raw_mode().context("disable raw mode")?;
    crossterm::execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("leave alt screen")?;
    Ok(())
}

fn panic_to_string(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panic: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panic: {s}")
    } else {
        "panic: (unknown payload)".to_string()
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

fn wrap_text(text: &str, max_width: usize) -> Vec<String> {
    if max_width == 0 {
        return vec![text.to_string()];
    }

    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_width = 0usize;

    for word in text.split_whitespace() {
        let word_width = UnicodeWidthStr::width(word);
        let sep_width = if current.is_empty() { 0 } else { 1 };

        if current_width + sep_width + word_width <= max_width {
            if !current.is_empty() {
                current.push(' ');
                current_width += 1;
            }
            current.push_str(word);
            current_width += word_width;
            continue;
        }

        if !current.is_empty() {
            lines.push(std::mem::take(&mut current));
            current_width = 0;
        }

        if word_width <= max_width {
            current.push_str(word);
            current_width = word_width;
            continue;
        }

        let mut chunk = String::new();
        let mut chunk_width = 0usize;
        for ch in word.chars() {
            let mut buf = [0u8; 4];
            let s = ch.encode_utf8(&mut buf);
            let w = UnicodeWidthStr::width(s);
            if chunk_width + w > max_width && !chunk.is_empty() {
                lines.push(std::mem::take(&mut chunk));
                chunk_width = 0;
            }
            chunk.push(ch);
            chunk_width += w;
        }
        if !chunk.is_empty() {
            current_width = chunk_width;
            current = chunk;
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }

    if lines.is_empty() {
        vec![String::new()]
    } else {
        lines
    }
}
