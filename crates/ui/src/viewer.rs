use libcat_application::{
    AVAILABLE_FOR_BORROWING, DescriptionState, EntityPage, LoanDetails, Property, ViewerPage,
    ViewerTarget,
};
use libcat_engine::{BlockKind, Document, InlineStyle};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};

/// One entry of the viewer stack.
pub(crate) struct ViewerScreen {
    pub(crate) id: u64,
    /// What was asked for, shown while the page loads.
    pub(crate) title: String,
    pub(crate) page: Option<ViewerPage>,
    pub(crate) description: Option<DescriptionState>,
    pub(crate) selected_link: usize,
    pub(crate) scroll: u16,
}

impl ViewerScreen {
    pub(crate) fn new(id: u64, title: String) -> Self {
        Self {
            id,
            title,
            page: None,
            description: None,
            selected_link: 0,
            scroll: 0,
        }
    }

    pub(crate) fn entity(&self) -> Option<&EntityPage> {
        match &self.page {
            Some(ViewerPage::Entity(page)) => Some(page),
            _ => None,
        }
    }

    pub(crate) fn links(&self) -> Vec<&ViewerTarget> {
        self.entity()
            .map(|page| {
                page.properties
                    .iter()
                    .filter_map(|property| match property {
                        Property::Link { target, .. } => Some(target),
                        Property::Text { .. } => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn selected_target(&self) -> Option<ViewerTarget> {
        self.links().get(self.selected_link).map(|target| (*target).clone())
    }

    pub(crate) fn select_next_link(&mut self) {
        let len = self.links().len();
        if len > 0 {
            self.selected_link = (self.selected_link + 1).min(len - 1);
        }
    }

    pub(crate) fn select_prev_link(&mut self) {
        self.selected_link = self.selected_link.saturating_sub(1);
    }

    pub(crate) fn heading(&self) -> String {
        match &self.page {
            Some(ViewerPage::Entity(page)) => page.heading.clone(),
            Some(ViewerPage::Message(_)) => "Entity Details".to_string(),
            None => format!("Loading {}", self.title),
        }
    }

    pub(crate) fn body_lines(&self, width: usize, accent: Color) -> Vec<Line<'static>> {
        let page = match &self.page {
            None => return vec![Line::raw("Loading…")],
            Some(ViewerPage::Message(message)) => return vec![Line::raw(message.clone())],
            Some(ViewerPage::Entity(page)) => page,
        };

        let bold = Style::default().add_modifier(Modifier::BOLD);
        let mut lines = Vec::new();
        let mut link_idx = 0usize;
        for property in &page.properties {
            match property {
                Property::Text { label, value } => lines.push(Line::from(vec![
                    Span::styled(format!("{label}: "), bold),
                    Span::raw(value.clone()),
                ])),
                Property::Link { label, name, .. } => {
                    let mut style = Style::default()
                        .fg(accent)
                        .add_modifier(Modifier::UNDERLINED);
                    if link_idx == self.selected_link {
                        style = style.add_modifier(Modifier::REVERSED);
                    }
                    link_idx += 1;
                    lines.push(Line::from(vec![
                        Span::styled(format!("{label}: "), bold),
                        Span::styled(name.clone(), style),
                    ]));
                }
            }
        }

        if let Some(loan) = &page.loan {
            lines.push(Line::raw(""));
            lines.push(section_heading("Borrowing Details", accent));
            match loan {
                LoanDetails::OnLoan(loan) => {
                    for (label, value) in [
                        ("Borrower", &loan.borrower),
                        ("Borrow Date", &loan.borrow_date),
                        ("Return Date", &loan.return_date),
                    ] {
                        lines.push(Line::from(vec![
                            Span::styled(format!("{label}: "), bold),
                            Span::raw(value.clone()),
                        ]));
                    }
                }
                LoanDetails::Available => lines.push(Line::raw(AVAILABLE_FOR_BORROWING)),
            }
        }

        if let Some(description) = &self.description {
            lines.push(Line::raw(""));
            lines.push(section_heading("Description", accent));
            match description {
                DescriptionState::Loading => lines.push(Line::raw("Loading description…")),
                DescriptionState::Ready(document) => {
                    lines.extend(document_lines(document, width, accent));
                }
                DescriptionState::Failed(message) => lines.push(Line::from(Span::styled(
                    message.clone(),
                    Style::default().fg(Color::Red),
                ))),
            }
        }

        lines
    }
}

fn section_heading(text: &str, accent: Color) -> Line<'static> {
    Line::from(Span::styled(
        text.to_string(),
        Style::default().fg(accent).add_modifier(Modifier::BOLD),
    ))
}

fn inline_style(style: InlineStyle) -> Style {
    let mut out = Style::default();
    if style.strong {
        out = out.add_modifier(Modifier::BOLD);
    }
    if style.emphasis {
        out = out.add_modifier(Modifier::ITALIC);
    }
    if style.code {
        out = out.fg(Color::Cyan);
    }
    out
}

/// Lays out a rendered description, one line per block, blank lines between
/// blocks except inside a run of list items.
pub(crate) fn document_lines(
    document: &Document,
    width: usize,
    accent: Color,
) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    let mut previous: Option<&BlockKind> = None;
    for block in &document.blocks {
        let in_list = matches!(previous, Some(BlockKind::ListItem { .. }))
            && matches!(block.kind, BlockKind::ListItem { .. });
        if previous.is_some() && !in_list {
            lines.push(Line::raw(""));
        }
        previous = Some(&block.kind);

        let spans = || {
            block
                .spans
                .iter()
                .map(|inline| Span::styled(inline.text.clone(), inline_style(inline.style)))
                .collect::<Vec<_>>()
        };
        match &block.kind {
            BlockKind::Heading(level) => {
                let mut style = Style::default().fg(accent).add_modifier(Modifier::BOLD);
                if *level == 1 {
                    style = style.add_modifier(Modifier::UNDERLINED);
                }
                lines.push(Line::from(Span::styled(block.text(), style)));
            }
            BlockKind::Paragraph => lines.push(Line::from(spans())),
            BlockKind::ListItem { marker, depth } => {
                let mut line = vec![Span::raw(format!("{}{marker} ", "  ".repeat(*depth)))];
                line.extend(spans());
                lines.push(Line::from(line));
            }
            BlockKind::Quote => {
                let mut line = vec![Span::styled("│ ", Style::default().fg(Color::DarkGray))];
                line.extend(spans().into_iter().map(|span| {
                    let style = span.style.add_modifier(Modifier::ITALIC);
                    span.style(style)
                }));
                lines.push(Line::from(line));
            }
            BlockKind::CodeBlock => {
                for code in block.text().lines() {
                    lines.push(Line::from(Span::styled(
                        format!("  {code}"),
                        Style::default().fg(Color::Cyan),
                    )));
                }
            }
            BlockKind::Rule => lines.push(Line::from(Span::styled(
                "─".repeat(width.max(3)),
                Style::default().fg(Color::DarkGray),
            ))),
        }
    }
    lines
}
