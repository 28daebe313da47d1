//! Markdown rendering for entity descriptions.
//!
//! Descriptions arrive as Markdown from the description service. They are
//! parsed into a small block model the terminal UI can lay out. Raw HTML,
//! block or inline, never reaches the output.

use pulldown_cmark::{Event, HeadingLevel, Parser, Tag, TagEnd};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub kind: BlockKind,
    pub spans: Vec<Inline>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockKind {
    Heading(u8),
    Paragraph,
    /// `marker` is `•` for bullets or `N.` for ordered lists; `depth` starts at 0.
    ListItem { marker: String, depth: usize },
    CodeBlock,
    /// Paragraph inside a block quote.
    Quote,
    Rule,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inline {
    pub text: String,
    pub style: InlineStyle,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InlineStyle {
    pub emphasis: bool,
    pub strong: bool,
    pub code: bool,
}

impl Block {
    fn new(kind: BlockKind) -> Self {
        Self {
            kind,
            spans: Vec::new(),
        }
    }

    pub fn text(&self) -> String {
        self.spans.iter().map(|span| span.text.as_str()).collect()
    }

    fn push(&mut self, text: &str, style: InlineStyle) {
        if text.is_empty() {
            return;
        }
        match self.spans.last_mut() {
            Some(last) if last.style == style => last.text.push_str(text),
            _ => self.spans.push(Inline {
                text: text.to_string(),
                style,
            }),
        }
    }
}

impl Document {
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Text of every block, one block per line.
    pub fn plain_text(&self) -> String {
        self.blocks
            .iter()
            .map(Block::text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub fn render_markdown(source: &str) -> Document {
    let mut builder = Builder::default();
    for event in Parser::new(source) {
        builder.event(event);
    }
    builder.finish()
}

#[derive(Default)]
struct Builder {
    blocks: Vec<Block>,
    current: Option<Block>,
    // Next number per open list; `None` for bullet lists.
    lists: Vec<Option<u64>>,
    emphasis: usize,
    strong: usize,
    quotes: usize,
    in_code_block: bool,
}

impl Builder {
    fn style(&self) -> InlineStyle {
        InlineStyle {
            emphasis: self.emphasis > 0,
            strong: self.strong > 0,
            code: false,
        }
    }

    fn begin(&mut self, kind: BlockKind) {
        self.flush();
        self.current = Some(Block::new(kind));
    }

    fn flush(&mut self) {
        if let Some(mut block) = self.current.take() {
            if block.kind == BlockKind::CodeBlock {
                if let Some(last) = block.spans.last_mut() {
                    let trimmed = last.text.trim_end_matches('\n').len();
                    last.text.truncate(trimmed);
                }
            }
            if !block.spans.iter().all(|span| span.text.trim().is_empty()) {
                self.blocks.push(block);
            }
        }
    }

    fn push_text(&mut self, text: &str, style: InlineStyle) {
        if self.current.is_none() {
            self.current = Some(Block::new(BlockKind::Paragraph));
        }
        if let Some(block) = self.current.as_mut() {
            block.push(text, style);
        }
    }

    fn event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                self.begin(BlockKind::Heading(heading_rank(level)));
            }
            Event::End(TagEnd::Heading(_)) => self.flush(),
            Event::Start(Tag::Paragraph) => {
                // Loose list items wrap their text in a paragraph; keep it on the marker line.
                let continues_item = self.current.as_ref().is_some_and(|block| {
                    matches!(block.kind, BlockKind::ListItem { .. }) && block.spans.is_empty()
                });
                if !continues_item {
                    let kind = if self.quotes > 0 {
                        BlockKind::Quote
                    } else {
                        BlockKind::Paragraph
                    };
                    self.begin(kind);
                }
            }
            Event::End(TagEnd::Paragraph) => self.flush(),
            Event::Start(Tag::List(first)) => {
                self.flush();
                self.lists.push(first);
            }
            Event::End(TagEnd::List(_)) => {
                self.flush();
                self.lists.pop();
            }
            Event::Start(Tag::Item) => {
                let marker = match self.lists.last_mut() {
                    Some(Some(next)) => {
                        let marker = format!("{next}.");
                        *next += 1;
                        marker
                    }
                    _ => "•".to_string(),
                };
                let depth = self.lists.len().saturating_sub(1);
                self.begin(BlockKind::ListItem { marker, depth });
            }
            Event::End(TagEnd::Item) => self.flush(),
            Event::Start(Tag::CodeBlock(_)) => {
                self.begin(BlockKind::CodeBlock);
                self.in_code_block = true;
            }
            Event::End(TagEnd::CodeBlock) => {
                self.in_code_block = false;
                self.flush();
            }
            Event::Start(Tag::BlockQuote(..)) => {
                self.flush();
                self.quotes += 1;
            }
            Event::End(TagEnd::BlockQuote(..)) => {
                self.flush();
                self.quotes = self.quotes.saturating_sub(1);
            }
            Event::Start(Tag::Emphasis) => self.emphasis += 1,
            Event::End(TagEnd::Emphasis) => self.emphasis = self.emphasis.saturating_sub(1),
            Event::Start(Tag::Strong) => self.strong += 1,
            Event::End(TagEnd::Strong) => self.strong = self.strong.saturating_sub(1),
            Event::Text(text) => {
                let style = if self.in_code_block {
                    InlineStyle {
                        code: true,
                        ..InlineStyle::default()
                    }
                } else {
                    self.style()
                };
                self.push_text(&text, style);
            }
            Event::Code(text) => {
                let style = InlineStyle {
                    code: true,
                    ..self.style()
                };
                self.push_text(&text, style);
            }
            Event::SoftBreak | Event::HardBreak => {
                if self.current.is_some() {
                    self.push_text(" ", self.style());
                }
            }
            Event::Rule => {
                self.flush();
                self.blocks.push(Block::new(BlockKind::Rule));
            }
            // Raw HTML is dropped.
            Event::Html(_) | Event::InlineHtml(_) => {}
            _ => {}
        }
    }

    fn finish(mut self) -> Document {
        self.flush();
        Document {
            blocks: self.blocks,
        }
    }
}

fn heading_rank(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}
