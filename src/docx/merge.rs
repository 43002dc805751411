//! `{tag}` merging over one WordprocessingML part.
//!
//! The part is cut into paragraphs (`<w:p>`) and the XML between them. All
//! `<w:t>` text of a paragraph is joined before tags are looked for, so a tag
//! that Word split across several runs still matches. Rendered output goes
//! back into the run that held the tag's `{`; the other runs keep their
//! formatting and lose only the characters the tag consumed.
//!
//! A section whose tags sit in different paragraphs repeats whole
//! paragraphs, or whole table rows when both tags are in rows of one table.

use std::{iter::Peekable, ops::Range};

use quick_xml::{Reader, escape::partial_escape, events::Event};
use serde_json::Value;

use super::{MergeOptions, TemplateError};

const TEXT_CLOSE: &str = "</w:t>";
const BREAK: &str = "</w:t><w:br/><w:t xml:space=\"preserve\">";

/// Merge `data` into one XML part.
pub fn merge_part(xml: &str, data: &Value, options: &MergeOptions) -> Result<String, TemplateError> {
    let mut scanned = scan(xml)?;
    let blocks = build_blocks(&mut scanned, options)?;

    let mut out = String::with_capacity(xml.len());
    let mut ctx = vec![data];
    Renderer {
        nodes: &scanned.nodes,
        options,
    }
    .blocks(&blocks, &mut ctx, &mut out)?;
    Ok(out)
}

// ---------------------------------------------------------------------------
// XML scanning
// ---------------------------------------------------------------------------

enum Piece<'a> {
    Xml(&'a str),
    /// `open` is the original `<w:t ...>` tag; `range` indexes the
    /// paragraph's joined text.
    Text { open: &'a str, range: Range<usize> },
}

struct Paragraph<'a> {
    source: &'a str,
    pieces: Vec<Piece<'a>>,
    text: String,
    tokens: Vec<Token>,
    /// Innermost table row holding this paragraph
    row: Option<usize>,
}

impl Paragraph<'_> {
    /// The single tag of a paragraph that holds nothing else but whitespace.
    fn lone_tag(&self) -> Option<&Token> {
        match self.tokens.as_slice() {
            [tok] => {
                let mut outside = self.text[..tok.start]
                    .chars()
                    .chain(self.text[tok.end..].chars());
                outside.all(char::is_whitespace).then_some(tok)
            }
            _ => None,
        }
    }

    /// Index of the text piece holding byte `pos` of the joined text.
    fn owner(&self, pos: usize) -> usize {
        self.pieces
            .iter()
            .position(|p| matches!(p, Piece::Text { range, .. } if range.contains(&pos)))
            .unwrap_or(0)
    }

    /// Append the part of `range` that falls into each text piece.
    fn distribute(&self, range: Range<usize>, texts: &mut [String]) {
        for (i, piece) in self.pieces.iter().enumerate() {
            if let Piece::Text { range: own, .. } = piece {
                let start = own.start.max(range.start);
                let end = own.end.min(range.end);
                if start < end {
                    texts[i].push_str(&self.text[start..end]);
                }
            }
        }
    }
}

struct ParagraphBuilder<'a> {
    start: usize,
    piece_start: usize,
    pieces: Vec<Piece<'a>>,
    text: String,
    row: Option<usize>,
}

impl<'a> ParagraphBuilder<'a> {
    fn new(start: usize, row: Option<usize>) -> Self {
        Self {
            start,
            piece_start: start,
            pieces: Vec::new(),
            text: String::new(),
            row,
        }
    }

    fn push_text(&mut self, xml: &'a str, open: Range<usize>, decoded: &str, after: usize) {
        self.pieces.push(Piece::Xml(&xml[self.piece_start..open.start]));
        let range = self.text.len()..self.text.len() + decoded.len();
        self.text.push_str(decoded);
        self.pieces.push(Piece::Text {
            open: &xml[open],
            range,
        });
        self.piece_start = after;
    }

    fn finish(mut self, xml: &'a str, end: usize) -> Result<Paragraph<'a>, TemplateError> {
        self.pieces.push(Piece::Xml(&xml[self.piece_start..end]));
        let tokens = tokenize(&self.text)?;
        Ok(Paragraph {
            source: &xml[self.start..end],
            pieces: self.pieces,
            text: self.text,
            tokens,
            row: self.row,
        })
    }
}

/// A part cut into paragraphs, the markup between them, and zero-width
/// markers where table rows begin and end.
enum Node<'a> {
    Raw(&'a str),
    Para(Paragraph<'a>),
    RowStart,
    RowEnd,
}

impl<'a> Node<'a> {
    fn para(&self) -> Option<&Paragraph<'a>> {
        match self {
            Node::Para(p) => Some(p),
            _ => None,
        }
    }
}

/// Node indices of a table row's markers, and the table it belongs to.
#[derive(Debug, Clone, Copy)]
struct Row {
    start: usize,
    end: usize,
    table: Option<usize>,
}

struct Scanned<'a> {
    xml: &'a str,
    nodes: Vec<Node<'a>>,
    /// Byte offset in `xml` where each node begins
    starts: Vec<usize>,
    rows: Vec<Row>,
}

impl<'a> Scanned<'a> {
    fn push(&mut self, node: Node<'a>, at: usize) {
        self.nodes.push(node);
        self.starts.push(at);
    }

    fn flush(&mut self, from: usize, to: usize) {
        let xml = self.xml;
        if from < to {
            self.push(Node::Raw(&xml[from..to]), from);
        }
    }

    /// The XML covered by a range of nodes.
    fn source(&self, nodes: Range<usize>) -> &'a str {
        let at = |n: usize| self.starts.get(n).copied().unwrap_or(self.xml.len());
        &self.xml[at(nodes.start)..at(nodes.end)]
    }
}

fn position(reader: &Reader<&[u8]>) -> usize {
    reader.buffer_position() as usize
}

fn xml_error(reader: &Reader<&[u8]>, err: impl std::fmt::Display) -> TemplateError {
    TemplateError::Xml(format!("{err} at byte {}", position(reader)))
}

/// Start of the tag that ends just before `end`. Attribute values cannot
/// hold a raw `<`.
fn tag_start(xml: &str, end: usize) -> usize {
    xml[..end].rfind('<').unwrap_or(end)
}

/// Decoded content of the `<w:t>` just opened, and the offset past its
/// `</w:t>`.
fn read_text(reader: &mut Reader<&[u8]>) -> Result<(String, usize), TemplateError> {
    let mut text = String::new();
    loop {
        match reader.read_event().map_err(|e| xml_error(reader, e))? {
            Event::Text(t) => {
                let decoded = t.unescape().map_err(|e| xml_error(reader, e))?;
                text.push_str(&decoded);
            }
            Event::CData(c) => text.push_str(&String::from_utf8_lossy(&c)),
            Event::End(tag) if tag.name().as_ref() == b"w:t" => {
                return Ok((text, position(reader)));
            }
            Event::Eof => return Err(xml_error(reader, "unterminated <w:t>")),
            _ => {}
        }
    }
}

fn scan(xml: &str) -> Result<Scanned<'_>, TemplateError> {
    let mut scanned = Scanned {
        xml,
        nodes: Vec::new(),
        starts: Vec::new(),
        rows: Vec::new(),
    };
    let mut open_rows: Vec<usize> = Vec::new();
    let mut open_tables: Vec<usize> = Vec::new();
    let mut table_count = 0;

    let mut raw_start = 0;
    let mut depth = 0usize;
    let mut para: Option<ParagraphBuilder<'_>> = None;

    let mut reader = Reader::from_str(xml);
    loop {
        let event = reader.read_event().map_err(|e| xml_error(&reader, e))?;
        let end = position(&reader);
        match event {
            Event::Start(tag) => match tag.name().as_ref() {
                b"w:p" => {
                    let start = tag_start(xml, end);
                    if depth == 0 {
                        scanned.flush(raw_start, start);
                        para = Some(ParagraphBuilder::new(start, open_rows.last().copied()));
                    }
                    depth += 1;
                }
                b"w:t" if depth > 0 => {
                    let (text, after) = read_text(&mut reader)?;
                    if let Some(builder) = para.as_mut() {
                        builder.push_text(xml, tag_start(xml, end)..end, &text, after);
                    }
                }
                b"w:tbl" if depth == 0 => {
                    open_tables.push(table_count);
                    table_count += 1;
                }
                b"w:tr" if depth == 0 => {
                    let start = tag_start(xml, end);
                    scanned.flush(raw_start, start);
                    raw_start = start;
                    open_rows.push(scanned.rows.len());
                    scanned.rows.push(Row {
                        start: scanned.nodes.len(),
                        end: usize::MAX,
                        table: open_tables.last().copied(),
                    });
                    scanned.push(Node::RowStart, start);
                }
                _ => {}
            },
            Event::End(tag) => match tag.name().as_ref() {
                b"w:p" if depth > 0 => {
                    depth -= 1;
                    if depth == 0 {
                        if let Some(builder) = para.take() {
                            let start = builder.start;
                            scanned.push(Node::Para(builder.finish(xml, end)?), start);
                        }
                        raw_start = end;
                    }
                }
                b"w:tbl" if depth == 0 => {
                    open_tables.pop();
                }
                b"w:tr" if depth == 0 => {
                    scanned.flush(raw_start, end);
                    raw_start = end;
                    if let Some(id) = open_rows.pop() {
                        scanned.rows[id].end = scanned.nodes.len();
                        scanned.push(Node::RowEnd, end);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    if depth > 0 {
        return Err(TemplateError::Xml("unterminated <w:p>".to_string()));
    }
    if !open_rows.is_empty() {
        return Err(TemplateError::Xml("unterminated <w:tr>".to_string()));
    }
    scanned.flush(raw_start, xml.len());
    Ok(scanned)
}

/// Whether `fragment` closes every element it opens and nothing else.
fn is_balanced(fragment: &str) -> bool {
    let mut reader = Reader::from_str(fragment);
    let mut depth = 0usize;
    loop {
        match reader.read_event() {
            Ok(Event::Start(_)) => depth += 1,
            Ok(Event::End(_)) => match depth.checked_sub(1) {
                Some(d) => depth = d,
                None => return false,
            },
            Ok(Event::Eof) => return depth == 0,
            Ok(_) => {}
            Err(_) => return false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tags
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagKind {
    Value,
    Open,
    Inverted,
    Close,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Token {
    /// Byte range of `{...}` in the paragraph text
    start: usize,
    end: usize,
    kind: TagKind,
    name: String,
    /// Tag of a section that spans paragraphs; rendered as nothing
    hidden: bool,
}

fn snippet(s: &str) -> String {
    s.chars().take(40).collect()
}

fn tokenize(text: &str) -> Result<Vec<Token>, TemplateError> {
    let mut tokens = Vec::new();
    let mut pos = 0;

    while let Some(offset) = text[pos..].find('{') {
        let start = pos + offset;
        let close = text[start + 1..]
            .find('}')
            .map(|i| start + 1 + i)
            .ok_or_else(|| TemplateError::UnclosedTag(snippet(&text[start..])))?;

        let inner = &text[start + 1..close];
        if inner.contains('{') {
            return Err(TemplateError::UnclosedTag(snippet(&text[start..=close])));
        }

        let inner = inner.trim();
        let (kind, name) = match inner.chars().next() {
            Some('#') => (TagKind::Open, &inner[1..]),
            Some('^') => (TagKind::Inverted, &inner[1..]),
            Some('/') => (TagKind::Close, &inner[1..]),
            _ => (TagKind::Value, inner),
        };
        let name = name.trim();
        if name.is_empty() {
            return Err(TemplateError::EmptyTag(text[start..=close].to_string()));
        }

        tokens.push(Token {
            start,
            end: close + 1,
            kind,
            name: name.to_string(),
            hidden: false,
        });
        pos = close + 1;
    }

    Ok(tokens)
}

enum Inline<'t> {
    Text(Range<usize>),
    Value(&'t Token),
    Section {
        open: &'t Token,
        children: Vec<Inline<'t>>,
    },
}

/// Nest a paragraph's tokens into sections that open and close inside it.
fn inline_tree(tokens: &[Token], text_len: usize) -> Result<Vec<Inline<'_>>, TemplateError> {
    let mut root = Vec::new();
    let mut stack: Vec<(&Token, Vec<Inline<'_>>)> = Vec::new();
    let mut cursor = 0;

    for tok in tokens {
        let current = match stack.last_mut() {
            Some((_, children)) => children,
            None => &mut root,
        };
        if cursor < tok.start {
            current.push(Inline::Text(cursor..tok.start));
        }
        cursor = tok.end;
        if tok.hidden {
            continue;
        }

        match tok.kind {
            TagKind::Value => current.push(Inline::Value(tok)),
            TagKind::Open | TagKind::Inverted => stack.push((tok, Vec::new())),
            TagKind::Close => {
                let Some((open, children)) = stack.pop() else {
                    return Err(TemplateError::UnopenedSection(tok.name.clone()));
                };
                if open.name != tok.name {
                    return Err(TemplateError::MismatchedSection {
                        expected: open.name.clone(),
                        found: tok.name.clone(),
                    });
                }
                let parent = match stack.last_mut() {
                    Some((_, children)) => children,
                    None => &mut root,
                };
                parent.push(Inline::Section { open, children });
            }
        }
    }

    if let Some((open, _)) = stack.pop() {
        return Err(TemplateError::UnclosedSection(open.name.clone()));
    }
    if cursor < text_len {
        root.push(Inline::Text(cursor..text_len));
    }
    Ok(root)
}

// ---------------------------------------------------------------------------
// Sections spanning paragraphs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct TagRef {
    node: usize,
    token: usize,
}

struct Pair {
    open: TagRef,
    close: TagRef,
    name: String,
    inverted: bool,
}

/// Match every section tag in the part. Returns the pairs whose tags sit in
/// different paragraphs, ordered by opening tag.
fn pair_tags(nodes: &[Node<'_>]) -> Result<Vec<Pair>, TemplateError> {
    let mut stack: Vec<(TagRef, &Token)> = Vec::new();
    let mut pairs = Vec::new();

    for (n, node) in nodes.iter().enumerate() {
        let Some(para) = node.para() else { continue };
        for (t, tok) in para.tokens.iter().enumerate() {
            let here = TagRef { node: n, token: t };
            match tok.kind {
                TagKind::Value => {}
                TagKind::Open | TagKind::Inverted => stack.push((here, tok)),
                TagKind::Close => {
                    let Some((open, open_tok)) = stack.pop() else {
                        return Err(TemplateError::UnopenedSection(tok.name.clone()));
                    };
                    if open_tok.name != tok.name {
                        return Err(TemplateError::MismatchedSection {
                            expected: open_tok.name.clone(),
                            found: tok.name.clone(),
                        });
                    }
                    if open.node != n {
                        pairs.push(Pair {
                            open,
                            close: here,
                            name: tok.name.clone(),
                            inverted: open_tok.kind == TagKind::Inverted,
                        });
                    }
                }
            }
        }
    }

    if let Some((_, tok)) = stack.pop() {
        return Err(TemplateError::UnclosedSection(tok.name.clone()));
    }
    pairs.sort_by_key(|p| p.open);
    Ok(pairs)
}

/// Whether the paragraphs among `range` hold no text besides `tag`.
fn only_tag(nodes: &[Node<'_>], range: Range<usize>, tag: TagRef) -> bool {
    nodes[range.clone()]
        .iter()
        .zip(range)
        .all(|(node, n)| match node.para() {
            None => true,
            Some(p) if n == tag.node => p
                .lone_tag()
                .is_some_and(|t| t.start == p.tokens[tag.token].start),
            Some(p) => p.text.trim().is_empty(),
        })
}

/// Node ranges a spanning section consumes (`outer`) and repeats (`body`).
///
/// Tags in rows of the same table expand to whole rows; otherwise to whole
/// paragraphs. With paragraph loops on, a unit holding nothing but its tag
/// is dropped instead of repeated.
fn expand(scanned: &Scanned<'_>, pair: &Pair, options: &MergeOptions) -> (Range<usize>, Range<usize>) {
    let nodes = &scanned.nodes;
    let row_of = |r: TagRef| nodes[r.node].para().and_then(|p| p.row);

    match (row_of(pair.open), row_of(pair.close)) {
        (Some(r1), Some(r2)) if scanned.rows[r1].table == scanned.rows[r2].table => {
            let (first, last) = (scanned.rows[r1], scanned.rows[r2]);
            let droppable = r1 != r2 && options.paragraph_loop;
            let drop_first = droppable && only_tag(nodes, first.start..first.end, pair.open);
            let drop_last = droppable && only_tag(nodes, last.start..last.end, pair.close);

            let outer = first.start..last.end + 1;
            let start = if drop_first { first.end + 1 } else { first.start };
            let end = if drop_last { last.start } else { last.end + 1 };
            (outer, start..end)
        }
        _ => {
            let (first, last) = (pair.open.node, pair.close.node);
            let drop_first = options.paragraph_loop && only_tag(nodes, first..first + 1, pair.open);
            let drop_last = options.paragraph_loop && only_tag(nodes, last..last + 1, pair.close);

            let outer = first..last + 1;
            let start = if drop_first { first + 1 } else { first };
            let end = if drop_last { last } else { last + 1 };
            (outer, start..end)
        }
    }
}

fn hide(nodes: &mut [Node<'_>], tag: TagRef) {
    if let Node::Para(p) = &mut nodes[tag.node] {
        p.tokens[tag.token].hidden = true;
    }
}

struct Spanning {
    name: String,
    inverted: bool,
    outer: Range<usize>,
    body: Range<usize>,
}

enum Block {
    Node(usize),
    Section {
        name: String,
        inverted: bool,
        body: Vec<Block>,
    },
}

fn build_blocks(scanned: &mut Scanned<'_>, options: &MergeOptions) -> Result<Vec<Block>, TemplateError> {
    let pairs = pair_tags(&scanned.nodes)?;

    let mut spans = Vec::with_capacity(pairs.len());
    for pair in &pairs {
        let (outer, body) = expand(scanned, pair, options);
        let sources = [scanned.source(outer.clone()), scanned.source(body.clone())];
        if !sources.into_iter().all(is_balanced) {
            return Err(TemplateError::UnbalancedSection(pair.name.clone()));
        }
        spans.push(Spanning {
            name: pair.name.clone(),
            inverted: pair.inverted,
            outer,
            body,
        });
    }
    for pair in &pairs {
        hide(&mut scanned.nodes, pair.open);
        hide(&mut scanned.nodes, pair.close);
    }

    // Outer sections first; equal ranges keep opening-tag order.
    spans.sort_by(|a, b| {
        a.outer
            .start
            .cmp(&b.outer.start)
            .then(b.outer.end.cmp(&a.outer.end))
    });
    nest(&mut spans.into_iter().peekable(), 0..scanned.nodes.len())
}

fn nest(
    spans: &mut Peekable<std::vec::IntoIter<Spanning>>,
    range: Range<usize>,
) -> Result<Vec<Block>, TemplateError> {
    let mut blocks = Vec::new();
    let mut pos = range.start;

    while let Some(span) = spans.next_if(|s| s.outer.start < range.end) {
        if span.outer.start < pos || span.outer.end > range.end {
            return Err(TemplateError::OverlappingSections(span.name));
        }
        blocks.extend((pos..span.outer.start).map(Block::Node));
        let body = nest(spans, span.body.clone())?;
        blocks.push(Block::Section {
            name: span.name,
            inverted: span.inverted,
            body,
        });
        pos = span.outer.end;
    }

    blocks.extend((pos..range.end).map(Block::Node));
    Ok(blocks)
}

// ---------------------------------------------------------------------------
// Data lookup
// ---------------------------------------------------------------------------

fn child<'v>(value: &'v Value, key: &str) -> Option<&'v Value> {
    match value {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

/// Resolve `name` against the context stack, innermost scope first. `.` is
/// the current scope; `a.b` walks into the first scope that has `a`.
fn lookup<'v>(ctx: &[&'v Value], name: &str) -> Option<&'v Value> {
    if name == "." {
        return ctx.last().copied();
    }
    let mut parts = name.split('.');
    let head = parts.next()?;
    let found = ctx.iter().rev().find_map(|scope| child(scope, head))?;
    parts.try_fold(found, |value, key| child(value, key))
}

fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_none_or(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(_)) => true,
    }
}

/// One entry per repetition; `Some` pushes a new scope for that repetition.
fn section_scopes(value: Option<&Value>, inverted: bool) -> Vec<Option<&Value>> {
    if inverted {
        return if truthy(value) { vec![] } else { vec![None] };
    }
    match value {
        Some(Value::Array(items)) => items.iter().map(Some).collect(),
        Some(obj @ Value::Object(_)) => vec![Some(obj)],
        other if truthy(other) => vec![None],
        _ => vec![],
    }
}

fn display(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

struct Renderer<'n, 'a, 'o> {
    nodes: &'n [Node<'a>],
    options: &'o MergeOptions,
}

impl Renderer<'_, '_, '_> {
    fn blocks<'v>(
        &self,
        blocks: &[Block],
        ctx: &mut Vec<&'v Value>,
        out: &mut String,
    ) -> Result<(), TemplateError> {
        for block in blocks {
            match block {
                Block::Node(i) => match &self.nodes[*i] {
                    Node::Raw(raw) => out.push_str(raw),
                    Node::Para(para) => self.paragraph(para, ctx, out)?,
                    Node::RowStart | Node::RowEnd => {}
                },
                Block::Section {
                    name,
                    inverted,
                    body,
                } => {
                    for scope in section_scopes(lookup(ctx, name), *inverted) {
                        if let Some(scope) = scope {
                            ctx.push(scope);
                        }
                        let result = self.blocks(body, ctx, out);
                        if scope.is_some() {
                            ctx.pop();
                        }
                        result?;
                    }
                }
            }
        }
        Ok(())
    }

    fn paragraph<'v>(
        &self,
        para: &Paragraph<'_>,
        ctx: &mut Vec<&'v Value>,
        out: &mut String,
    ) -> Result<(), TemplateError> {
        if para.tokens.is_empty() {
            out.push_str(para.source);
            return Ok(());
        }

        let mut texts = vec![String::new(); para.pieces.len()];
        for item in inline_tree(&para.tokens, para.text.len())? {
            match item {
                Inline::Text(range) => para.distribute(range, &mut texts),
                Inline::Value(tok) => {
                    texts[para.owner(tok.start)].push_str(&display(lookup(ctx, &tok.name)))
                }
                Inline::Section { open, children } => {
                    let mut rendered = String::new();
                    self.section_text(para, open, &children, ctx, &mut rendered);
                    texts[para.owner(open.start)].push_str(&rendered);
                }
            }
        }
        self.emit(para, &texts, out);
        Ok(())
    }

    fn section_text<'v>(
        &self,
        para: &Paragraph<'_>,
        open: &Token,
        children: &[Inline<'_>],
        ctx: &mut Vec<&'v Value>,
        out: &mut String,
    ) {
        let scopes = section_scopes(lookup(ctx, &open.name), open.kind == TagKind::Inverted);
        for scope in scopes {
            if let Some(scope) = scope {
                ctx.push(scope);
            }
            self.inline_text(para, children, ctx, out);
            if scope.is_some() {
                ctx.pop();
            }
        }
    }

    fn inline_text<'v>(
        &self,
        para: &Paragraph<'_>,
        items: &[Inline<'_>],
        ctx: &mut Vec<&'v Value>,
        out: &mut String,
    ) {
        for item in items {
            match item {
                Inline::Text(range) => out.push_str(&para.text[range.clone()]),
                Inline::Value(tok) => out.push_str(&display(lookup(ctx, &tok.name))),
                Inline::Section { open, children } => {
                    self.section_text(para, open, children, ctx, out)
                }
            }
        }
    }

    fn emit(&self, para: &Paragraph<'_>, texts: &[String], out: &mut String) {
        for (piece, text) in para.pieces.iter().zip(texts) {
            match piece {
                Piece::Xml(xml) => out.push_str(xml),
                Piece::Text { open, .. } => {
                    if open.contains("xml:space") {
                        out.push_str(open);
                    } else {
                        out.push_str("<w:t xml:space=\"preserve\">");
                    }
                    self.text(text, out);
                    out.push_str(TEXT_CLOSE);
                }
            }
        }
    }

    fn text(&self, text: &str, out: &mut String) {
        if !self.options.linebreaks || !text.contains('\n') {
            out.push_str(&partial_escape(text));
            return;
        }
        for (i, line) in text.split('\n').enumerate() {
            if i > 0 {
                out.push_str(BREAK);
            }
            out.push_str(&partial_escape(line.trim_end_matches('\r')));
        }
    }
}
