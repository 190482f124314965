use crate::data_mw::{split_top_level, TransclusionInfo, DATA_MW};
use crate::provenance::{DataParsoid, ProvenanceKind, SourceRange, Syntax, WhitespaceHints};
use crate::token::{Attributes, TagToken, TextToken, Token};
use logos::Logos;
use std::collections::{HashSet, VecDeque};
use tracing::trace;

/// Inline lexemes of wiki markup. Line-start constructs (headings, lists,
/// tables) are recognized by hand before the lexer runs on a line.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
enum Lexeme {
    #[token("[[")]
    LinkOpen,

    #[token("]]")]
    LinkClose,

    #[token("{{")]
    TemplateOpen,

    #[token("}}")]
    TemplateClose,

    #[token("||")]
    DoublePipe,

    #[token("!!")]
    DoubleBang,

    #[regex("'{2,}")]
    Quotes,

    #[token("<!--")]
    CommentOpen,

    #[token("<")]
    Angle,

    #[token("\n")]
    Newline,

    #[regex(r"[^\[\]{}|!'<\n]+")]
    Text,
}

/// HTML tags passed through as elements. Anything else is literal text.
const HTML_TAGS: &[&str] = &[
    "abbr", "b", "big", "blockquote", "br", "caption", "center", "cite", "code", "dd", "del",
    "div", "dl", "dt", "em", "font", "h1", "h2", "h3", "h4", "h5", "h6", "hr", "i", "ins", "kbd",
    "li", "ol", "p", "q", "s", "small", "span", "strike", "strong", "sub", "sup", "table", "td",
    "th", "tr", "tt", "u", "ul", "var", "wbr",
];

pub const VOID_TAGS: &[&str] = &["br", "hr", "img", "meta", "wbr"];

const IMAGE_NAMESPACES: &[&str] = &["File:", "Image:"];

const IMAGE_KEYWORDS: &[&str] = &[
    "thumb", "thumbnail", "frame", "framed", "frameless", "none", "left", "right", "center",
    "centre", "border", "upright", "baseline", "middle", "top", "bottom",
];

const IMAGE_PREFIXES: &[&str] = &["alt=", "link=", "upright=", "page=", "class=", "lang="];

/// Lazy tokenizer over one source text.
///
/// Every token carries absolute source offsets (`base` + local offset). Input
/// that does not form a recognized construct degrades to text; nothing here
/// returns an error.
pub struct Tokenizer<'a> {
    src: &'a str,
    base: usize,
    pos: usize,
    queue: VecDeque<Token>,
    at_line_start: bool,
    table_depth: usize,
    cell_line: Option<&'static str>,
    quotes: Vec<&'static str>,
    extension_tags: HashSet<String>,
    done: bool,
}

impl<'a> Tokenizer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            src,
            base: 0,
            pos: 0,
            queue: VecDeque::new(),
            at_line_start: true,
            table_depth: 0,
            cell_line: None,
            quotes: Vec::new(),
            extension_tags: HashSet::new(),
            done: false,
        }
    }

    /// Offset added to every source position this tokenizer reports.
    pub fn with_offset(mut self, base: usize) -> Self {
        self.base = base;
        self
    }

    /// Tag names whose whole `<name>...</name>` block is handed to an extension.
    pub fn with_extension_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extension_tags = tags.into_iter().map(|t| t.into().to_lowercase()).collect();
        self
    }

    fn range(&self, start: usize, end: usize) -> SourceRange {
        SourceRange::new(self.base + start, self.base + end)
    }

    fn data(&self, start: usize, end: usize) -> DataParsoid {
        DataParsoid::with_range(self.base + start, self.base + end)
    }

    fn emit(&mut self, token: Token) {
        self.queue.push_back(token);
    }

    fn push_text(&mut self, start: usize, end: usize) {
        let src = self.src;
        let range = self.range(start, end);
        let value = &src[start..end];
        if let Some(Token::Text(last)) = self.queue.back_mut() {
            if let Some(prev) = last.range.filter(|r| r.end == range.start) {
                last.value.push_str(value);
                last.range = Some(SourceRange::new(prev.start, range.end));
                self.pos = end;
                return;
            }
        }
        self.emit(Token::Text(TextToken::new(value, Some(range))));
        self.pos = end;
    }

    fn line_end(&self, from: usize) -> usize {
        self.src[from..]
            .find('\n')
            .map(|i| from + i)
            .unwrap_or(self.src.len())
    }

    // Line-start constructs

    fn line_start(&mut self) -> bool {
        let src = self.src;
        let line_end = self.line_end(self.pos);
        let line = &src[self.pos..line_end];

        if self.table_depth > 0 && self.table_line(line, line_end) {
            return true;
        }
        if line.starts_with("{|") {
            self.table_open(line_end);
            return true;
        }
        if line.starts_with('=') && self.heading(line_end) {
            return true;
        }
        if line.starts_with("----") {
            let dashes = line.bytes().take_while(|b| *b == b'-').count();
            let data = self.data(self.pos, self.pos + dashes);
            self.emit(Token::SelfClosingTag(TagToken::new("hr").data(data)));
            self.pos += dashes;
            return true;
        }

        let bullets = line
            .bytes()
            .take_while(|b| matches!(b, b'*' | b'#' | b':' | b';'))
            .count();
        if bullets > 0 {
            let data = self.data(self.pos, self.pos + bullets);
            let token = TagToken::new("listItem")
                .attr("bullets", &line[..bullets])
                .data(data);
            self.emit(Token::SelfClosingTag(token));
            self.pos += bullets;
            return true;
        }

        false
    }

    fn table_open(&mut self, line_end: usize) {
        let attrs = parse_attributes(&self.src[self.pos + 2..line_end]);
        let data = self.data(self.pos, line_end);
        self.emit(Token::StartTag(TagToken {
            name: "table".to_string(),
            attrs,
            data,
        }));
        self.table_depth += 1;
        self.pos = line_end;
    }

    fn table_line(&mut self, line: &str, line_end: usize) -> bool {
        let start = self.pos;
        if line.starts_with("|}") {
            self.emit(Token::EndTag(TagToken::new("table").data(self.data(start, start + 2))));
            self.table_depth -= 1;
            self.pos = start + 2;
        } else if line.starts_with("|-") {
            let dashes = line[1..].bytes().take_while(|b| *b == b'-').count();
            let attrs = parse_attributes(&line[1 + dashes..]);
            let data = self.data(start, line_end);
            self.emit(Token::StartTag(TagToken {
                name: "tr".to_string(),
                attrs,
                data,
            }));
            self.pos = line_end;
        } else if line.starts_with("|+") {
            self.emit(Token::StartTag(TagToken::new("caption").data(self.data(start, start + 2))));
            self.pos = start + 2;
        } else if line.starts_with('|') {
            self.emit(Token::StartTag(TagToken::new("td").data(self.data(start, start + 1))));
            self.cell_line = Some("td");
            self.pos = start + 1;
        } else if line.starts_with('!') {
            self.emit(Token::StartTag(TagToken::new("th").data(self.data(start, start + 1))));
            self.cell_line = Some("th");
            self.pos = start + 1;
        } else {
            return false;
        }
        true
    }

    fn heading(&mut self, line_end: usize) -> bool {
        let src = self.src;
        let start = self.pos;
        let line = &src[start..line_end];
        let body_len = line.trim_end_matches([' ', '\t']).len();
        let body = &line.as_bytes()[..body_len];

        let open = body.iter().take_while(|b| **b == b'=').count();
        if open == body_len {
            return false;
        }
        let close = body.iter().rev().take_while(|b| **b == b'=').count();
        let level = open.min(close).min(6);
        if level == 0 {
            return false;
        }

        let content = &line[level..body_len - level];
        let after_lead = content.trim_start_matches([' ', '\t']);
        let leading = &content[..content.len() - after_lead.len()];
        let trailing = &after_lead[after_lead.trim_end_matches([' ', '\t']).len()..];

        let inner_start = start + level + leading.len();
        let inner_end = start + body_len - level - trailing.len();
        let name = format!("h{}", level);

        let mut data = self.data(start, inner_start);
        data.ws = Some(WhitespaceHints {
            leading: leading.to_string(),
            trailing: trailing.to_string(),
        });
        self.emit(Token::StartTag(TagToken::new(name.clone()).data(data)));

        self.pos = inner_start;
        while self.pos < inner_end {
            self.inline_step(inner_end);
        }
        self.close_quotes(inner_end);

        self.emit(Token::EndTag(TagToken::new(name).data(self.data(inner_end, line_end))));
        self.pos = line_end;
        true
    }

    // Inline constructs

    fn inline_step(&mut self, limit: usize) {
        let mut lexer = Lexeme::lexer(&self.src[self.pos..limit]);
        let Some(result) = lexer.next() else {
            self.pos = limit;
            return;
        };
        let start = self.pos;
        let end = start + lexer.span().end;

        match result {
            Ok(Lexeme::Newline) => {
                self.close_quotes(start);
                self.emit(Token::Newline(Some(self.range(start, end))));
                self.pos = end;
                self.at_line_start = true;
                self.cell_line = None;
            }
            Ok(Lexeme::Quotes) => self.quote_run(start, end),
            Ok(Lexeme::LinkOpen) => {
                if !self.link(start, limit) {
                    self.push_text(start, end);
                }
            }
            Ok(Lexeme::TemplateOpen) => {
                if !self.template(start, limit) {
                    self.push_text(start, end);
                }
            }
            Ok(Lexeme::CommentOpen) => {
                if !self.comment(start, limit) {
                    trace!(pos = self.base + start, "unterminated comment, treating as text");
                    self.push_text(start, end);
                }
            }
            Ok(Lexeme::Angle) => {
                if !self.angle(start, limit) {
                    self.push_text(start, end);
                }
            }
            Ok(Lexeme::DoublePipe) if self.cell_line.is_some() => {
                let kind = self.cell_line.unwrap_or("td");
                self.cell(kind, start, end);
            }
            Ok(Lexeme::DoubleBang) if self.cell_line == Some("th") => {
                self.cell("th", start, end);
            }
            Ok(_) | Err(_) => self.push_text(start, end),
        }
    }

    fn cell(&mut self, kind: &'static str, start: usize, end: usize) {
        self.close_quotes(start);
        let data = self.data(start, end).stx(Syntax::Row);
        self.emit(Token::StartTag(TagToken::new(kind).data(data)));
        self.pos = end;
    }

    fn quote_run(&mut self, start: usize, end: usize) {
        let mut p = start;
        let mut n = end - start;
        if n == 4 {
            self.push_text(p, p + 1);
            p += 1;
            n = 3;
        } else if n > 5 {
            self.push_text(p, p + n - 5);
            p += n - 5;
            n = 5;
        }

        match n {
            2 => self.toggle_quote("i", p, p + 2),
            3 => self.toggle_quote("b", p, p + 3),
            _ => {
                let first = if self.quotes.last() == Some(&"i") { "i" } else { "b" };
                let (a, b) = if first == "i" { ("i", "b") } else { ("b", "i") };
                let split = p + quote_width(a);
                self.toggle_quote(a, p, split);
                self.toggle_quote(b, split, p + 5);
            }
        }
        self.pos = end;
    }

    fn toggle_quote(&mut self, tag: &'static str, start: usize, end: usize) {
        let Some(idx) = self.quotes.iter().rposition(|t| *t == tag) else {
            self.emit(Token::StartTag(TagToken::new(tag).data(self.data(start, end))));
            self.quotes.push(tag);
            return;
        };

        // Close what is nested inside, close the target, then reopen the rest.
        let reopen: Vec<&'static str> = self.quotes.drain(idx + 1..).collect();
        for inner in reopen.iter().rev() {
            let mut data = self.data(start, start);
            data.auto_inserted_end = true;
            self.emit(Token::EndTag(TagToken::new(*inner).data(data)));
        }
        self.quotes.pop();
        self.emit(Token::EndTag(TagToken::new(tag).data(self.data(start, end))));
        for inner in reopen {
            let mut data = self.data(end, end);
            data.auto_inserted_start = true;
            self.emit(Token::StartTag(TagToken::new(inner).data(data)));
            self.quotes.push(inner);
        }
    }

    fn close_quotes(&mut self, pos: usize) {
        self.close_quotes_above(0, pos);
    }

    fn close_quotes_above(&mut self, depth: usize, pos: usize) {
        while self.quotes.len() > depth {
            let Some(tag) = self.quotes.pop() else { break };
            let mut data = self.data(pos, pos);
            data.auto_inserted_end = true;
            self.emit(Token::EndTag(TagToken::new(tag).data(data)));
        }
    }

    fn link(&mut self, start: usize, limit: usize) -> bool {
        let Some(close) = find_close(self.src, start + 2, limit, b"[[", b"]]", false) else {
            return false;
        };
        let src = self.src;
        let inner = &src[start + 2..close];
        let parts = split_top_level(inner, '|');
        let target = parts[0];
        if target.trim().is_empty() || target.contains(['<', '>', '{', '}', '[', ']']) {
            return false;
        }

        if IMAGE_NAMESPACES.iter().any(|ns| target.trim_start().starts_with(ns)) {
            self.image(start, close, &parts);
            return true;
        }

        let href = format!("./{}", target);
        if parts.len() == 1 {
            let data = self.data(start, start + 2).stx(Syntax::Simple);
            self.emit(Token::StartTag(wiki_link(&href).data(data)));
            self.push_text(start + 2, close);
        } else {
            let text_start = start + 2 + target.len() + 1;
            let data = self.data(start, text_start).stx(Syntax::Piped);
            self.emit(Token::StartTag(wiki_link(&href).data(data)));

            let depth = self.quotes.len();
            self.pos = text_start;
            while self.pos < close {
                self.inline_step(close);
            }
            self.close_quotes_above(depth, close);
        }

        self.emit(Token::EndTag(TagToken::new("a").data(self.data(close, close + 2))));
        self.pos = close + 2;
        true
    }

    fn image(&mut self, start: usize, close: usize, parts: &[&str]) {
        let end = close + 2;
        let file = parts[0].trim();
        let options = &parts[1..];
        let caption_idx = options.iter().rposition(|o| !is_image_option(o));
        let kept: Vec<&str> = options
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != caption_idx)
            .map(|(_, o)| *o)
            .collect();

        let framed = kept
            .iter()
            .any(|o| matches!(o.trim(), "thumb" | "thumbnail" | "frame" | "framed"));
        let (name, ty) = if framed {
            ("figure", "mw:Image/Thumb")
        } else {
            ("span", "mw:Image")
        };

        let data = self
            .data(start, end)
            .widths(end - start, 0)
            .src(&self.src[start..end]);
        let open = TagToken::new(name)
            .attr("typeof", ty)
            .attr("data-file", file)
            .attr("data-options", kept.join("|"))
            .data(data);
        self.emit(Token::StartTag(open));
        self.emit(Token::SelfClosingTag(
            TagToken::new("img").attr("resource", format!("./{}", file)),
        ));
        if let Some(idx) = caption_idx {
            self.emit(Token::StartTag(TagToken::new("figcaption")));
            self.emit(Token::text(options[idx], None));
            self.emit(Token::EndTag(TagToken::new("figcaption")));
        }
        self.emit(Token::EndTag(TagToken::new(name)));
        self.pos = end;
    }

    fn template(&mut self, start: usize, limit: usize) -> bool {
        let Some(close) = find_close(self.src, start + 2, limit, b"{{", b"}}", true) else {
            return false;
        };
        let info = TransclusionInfo::parse(&self.src[start + 2..close]);
        if info.target.is_empty() || info.target.contains(['<', '>', '[', ']', '{', '}']) {
            return false;
        }

        let end = close + 2;
        let data = self
            .data(start, end)
            .widths(end - start, 0)
            .src(&self.src[start..end])
            .kind(ProvenanceKind::Transclusion {
                target: info.target.clone(),
            });
        let token = TagToken::new("template")
            .attr("target", info.target.as_str())
            .attr(DATA_MW, info.to_json())
            .data(data);
        self.emit(Token::SelfClosingTag(token));
        self.pos = end;
        true
    }

    fn comment(&mut self, start: usize, limit: usize) -> bool {
        let body_start = start + 4;
        let Some(idx) = self.src[body_start..limit].find("-->") else {
            return false;
        };
        let src = self.src;
        let end = body_start + idx + 3;
        let value = &src[body_start..body_start + idx];
        self.emit(Token::Comment(TextToken::new(value, Some(self.range(start, end)))));
        self.pos = end;
        true
    }

    fn angle(&mut self, start: usize, limit: usize) -> bool {
        let src = self.src;
        let rest = &src[start..limit];
        let closing = rest.starts_with("</");
        let name_start = if closing { 2 } else { 1 };
        let name_len = rest[name_start..]
            .bytes()
            .take_while(|b| b.is_ascii_alphanumeric())
            .count();
        if name_len == 0 {
            return false;
        }
        let after_name = name_start + name_len;
        if !matches!(rest.as_bytes().get(after_name), Some(b' ' | b'\t' | b'/' | b'>')) {
            return false;
        }
        let Some(gt) = rest.find('>') else {
            return false;
        };
        if rest[1..gt].contains(['<', '\n']) {
            return false;
        }

        let name = rest[name_start..after_name].to_ascii_lowercase();
        let raw_attrs = &rest[after_name..gt];
        let self_close = raw_attrs.trim_end().ends_with('/');
        let raw_attrs = raw_attrs.trim_end().trim_end_matches('/');
        let open_end = start + gt + 1;

        if !closing && name == "nowiki" {
            return self.nowiki(start, open_end, limit, self_close);
        }
        if !closing && self.extension_tags.contains(&name) {
            return self.extension(&name, raw_attrs, start, open_end, limit, self_close);
        }
        if !HTML_TAGS.contains(&name.as_str()) {
            return false;
        }

        let mut data = self.data(start, open_end).stx(Syntax::Html);
        if closing {
            data.src = Some(self.src[start..open_end].to_string());
            self.emit(Token::EndTag(TagToken::new(name).data(data)));
        } else {
            data.self_close = self_close;
            let token = TagToken {
                name,
                attrs: parse_attributes(raw_attrs),
                data,
            };
            if self_close || VOID_TAGS.contains(&token.name.as_str()) {
                self.emit(Token::SelfClosingTag(token));
            } else {
                self.emit(Token::StartTag(token));
            }
        }
        self.pos = open_end;
        true
    }

    fn nowiki(&mut self, start: usize, open_end: usize, limit: usize, self_close: bool) -> bool {
        let mut data = self.data(start, open_end).stx(Syntax::Html);
        if self_close {
            data.self_close = true;
            let token = TagToken::new("span").attr("typeof", "mw:Nowiki").data(data);
            self.emit(Token::SelfClosingTag(token));
            self.pos = open_end;
            return true;
        }

        let Some(idx) = self.src[open_end..limit].find("</nowiki>") else {
            return false;
        };
        let close_start = open_end + idx;
        let close_end = close_start + "</nowiki>".len();

        let token = TagToken::new("span").attr("typeof", "mw:Nowiki").data(data);
        self.emit(Token::StartTag(token));
        if close_start > open_end {
            let range = self.range(open_end, close_start);
            self.emit(Token::Text(TextToken::new(&self.src[open_end..close_start], Some(range))));
        }
        let close = self.data(close_start, close_end).stx(Syntax::Html);
        self.emit(Token::EndTag(TagToken::new("span").data(close)));
        self.pos = close_end;
        true
    }

    fn extension(
        &mut self,
        name: &str,
        raw_attrs: &str,
        start: usize,
        open_end: usize,
        limit: usize,
        self_close: bool,
    ) -> bool {
        let (end, close_width) = if self_close {
            (open_end, 0)
        } else {
            let close_tag = format!("</{}>", name);
            let Some(idx) = self.src[open_end..limit].find(&close_tag) else {
                trace!(pos = self.base + start, name, "unclosed extension tag, treating as text");
                return false;
            };
            (open_end + idx + close_tag.len(), close_tag.len())
        };

        let data = self
            .data(start, end)
            .widths(open_end - start, close_width)
            .src(&self.src[start..end])
            .kind(ProvenanceKind::Extension {
                name: name.to_string(),
            });
        self.emit(Token::SelfClosingTag(TagToken {
            name: name.to_string(),
            attrs: parse_attributes(raw_attrs),
            data,
        }));
        self.pos = end;
        true
    }
}

impl Iterator for Tokenizer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        loop {
            if let Some(token) = self.queue.pop_front() {
                return Some(token);
            }
            if self.done {
                return None;
            }
            if self.pos >= self.src.len() {
                self.close_quotes(self.pos);
                self.emit(Token::EndOfInput(self.base + self.pos));
                self.done = true;
                continue;
            }
            if self.at_line_start {
                self.at_line_start = false;
                if self.line_start() {
                    continue;
                }
            }
            self.inline_step(self.src.len());
        }
    }
}

/// Tokenize a whole source text.
pub fn tokenize(source: &str) -> Vec<Token> {
    Tokenizer::new(source).collect()
}

fn quote_width(tag: &str) -> usize {
    if tag == "b" {
        3
    } else {
        2
    }
}

fn wiki_link(href: &str) -> TagToken {
    TagToken::new("a").attr("rel", "mw:WikiLink").attr("href", href)
}

fn is_image_option(option: &str) -> bool {
    let option = option.trim();
    if IMAGE_KEYWORDS.contains(&option) || IMAGE_PREFIXES.iter().any(|p| option.starts_with(p)) {
        return true;
    }
    match option.strip_suffix("px") {
        Some(size) => {
            !size.is_empty() && size.bytes().all(|b| b.is_ascii_digit() || b == b'x')
        }
        None => false,
    }
}

/// Find the delimiter closing a construct opened just before `from`.
fn find_close(
    src: &str,
    from: usize,
    limit: usize,
    open: &[u8],
    close: &[u8],
    multiline: bool,
) -> Option<usize> {
    let bytes = src.as_bytes();
    let mut depth = 1usize;
    let mut i = from;
    while i < limit {
        if bytes[i] == b'\n' && !multiline {
            return None;
        }
        if i + 2 <= limit && &bytes[i..i + 2] == open {
            depth += 1;
            i += 2;
            continue;
        }
        if i + 2 <= limit && &bytes[i..i + 2] == close {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
            i += 2;
            continue;
        }
        i += 1;
    }
    None
}

/// Parse HTML-style attributes. The first occurrence of a duplicate key wins.
pub fn parse_attributes(text: &str) -> Attributes {
    let mut attrs = Attributes::new();
    let mut rest = text;

    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            break;
        }
        let name_len = rest
            .find(|c: char| c.is_whitespace() || c == '=')
            .unwrap_or(rest.len());
        if name_len == 0 {
            // Stray '=' with no name.
            rest = &rest[1..];
            continue;
        }
        let name = rest[..name_len].to_ascii_lowercase();
        rest = rest[name_len..].trim_start();

        let value = if let Some(after_eq) = rest.strip_prefix('=') {
            let after_eq = after_eq.trim_start();
            match after_eq.chars().next() {
                Some(quote @ ('"' | '\'')) => {
                    let body = &after_eq[1..];
                    let close = body.find(quote).unwrap_or(body.len());
                    rest = body.get(close + 1..).unwrap_or("");
                    body[..close].to_string()
                }
                _ => {
                    let len = after_eq.find(char::is_whitespace).unwrap_or(after_eq.len());
                    rest = &after_eq[len..];
                    after_eq[..len].to_string()
                }
            }
        } else {
            String::new()
        };

        attrs.insert_first(name, value);
    }

    attrs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(tokens: &[Token]) -> Vec<String> {
        tokens
            .iter()
            .map(|t| match t {
                Token::StartTag(t) => format!("<{}>", t.name),
                Token::EndTag(t) => format!("</{}>", t.name),
                Token::SelfClosingTag(t) => format!("<{}/>", t.name),
                Token::Text(t) => t.value.clone(),
                Token::Comment(t) => format!("<!--{}-->", t.value),
                Token::Newline(_) => "NL".to_string(),
                Token::EndOfInput(_) => "EOF".to_string(),
            })
            .collect()
    }

    #[test]
    fn test_plain_text() {
        let tokens = tokenize("Hello world!");
        assert_eq!(names(&tokens), vec!["Hello world!", "EOF"]);
        assert_eq!(tokens[0].range(), Some(SourceRange::new(0, 12)));
    }

    #[test]
    fn test_heading() {
        let tokens = tokenize("== Title ==\n");
        assert_eq!(names(&tokens), vec!["<h2>", "Title", "</h2>", "NL", "EOF"]);
        let Token::StartTag(open) = &tokens[0] else { panic!("expected start tag") };
        assert_eq!(open.range(), Some(SourceRange::new(0, 3)));
        assert_eq!(open.data.ws.as_ref().unwrap().leading, " ");
        assert_eq!(tokens[2].range(), Some(SourceRange::new(8, 11)));
    }

    #[test]
    fn test_unbalanced_heading_level() {
        let tokens = tokenize("===a==");
        assert_eq!(names(&tokens), vec!["<h2>", "=a", "</h2>", "EOF"]);
    }

    #[test]
    fn test_quotes() {
        let tokens = tokenize("''a'''b'''''");
        assert_eq!(
            names(&tokens),
            vec!["<i>", "a", "<b>", "b", "</b>", "</i>", "EOF"]
        );
    }

    #[test]
    fn test_unclosed_quote_closes_at_line_end() {
        let tokens = tokenize("'''bold\nnext");
        assert_eq!(names(&tokens), vec!["<b>", "bold", "</b>", "NL", "next", "EOF"]);
        let Token::EndTag(close) = &tokens[2] else { panic!("expected end tag") };
        assert!(close.data.auto_inserted_end);
        assert_eq!(close.range(), Some(SourceRange::new(7, 7)));
    }

    #[test]
    fn test_links() {
        let tokens = tokenize("[[Foo]] [[Bar|the ''bar'']]");
        assert_eq!(
            names(&tokens),
            vec!["<a>", "Foo", "</a>", " ", "<a>", "the ", "<i>", "bar", "</i>", "</a>", "EOF"]
        );
        let Token::StartTag(piped) = &tokens[4] else { panic!("expected start tag") };
        assert_eq!(piped.attrs.get("href"), Some("./Bar"));
        assert_eq!(piped.data.stx, Some(Syntax::Piped));
        assert_eq!(piped.range(), Some(SourceRange::new(8, 14)));
    }

    #[test]
    fn test_image_link() {
        let tokens = tokenize("[[File:A.png|thumb|A caption]]");
        let Token::StartTag(figure) = &tokens[0] else { panic!("expected start tag") };
        assert_eq!(figure.name, "figure");
        assert_eq!(figure.attrs.get("data-file"), Some("File:A.png"));
        assert_eq!(figure.attrs.get("data-options"), Some("thumb"));
        assert!(names(&tokens).contains(&"A caption".to_string()));
    }

    #[test]
    fn test_template_spans_lines() {
        let tokens = tokenize("a{{Foo|x\n|k=v}}b");
        assert_eq!(names(&tokens), vec!["a", "<template/>", "b", "EOF"]);
        let Token::SelfClosingTag(tpl) = &tokens[1] else { panic!("expected template") };
        assert_eq!(tpl.data.src.as_deref(), Some("{{Foo|x\n|k=v}}"));
        assert_eq!(tpl.attrs.get("target"), Some("Foo"));
    }

    #[test]
    fn test_lists_and_rules() {
        let tokens = tokenize("*# item\n----");
        assert_eq!(names(&tokens), vec!["<listItem/>", " item", "NL", "<hr/>", "EOF"]);
    }

    #[test]
    fn test_table() {
        let tokens = tokenize("{| class=\"x\"\n|-\n| a || b\n|}");
        assert_eq!(
            names(&tokens),
            vec![
                "<table>", "NL", "<tr>", "NL", "<td>", " a ", "<td>", " b", "NL", "</table>",
                "EOF"
            ]
        );
        let Token::StartTag(table) = &tokens[0] else { panic!("expected table") };
        assert_eq!(table.attrs.get("class"), Some("x"));
    }

    #[test]
    fn test_html_and_unknown_tags() {
        let tokens = tokenize("<b class=x>y</b><foo>");
        assert_eq!(names(&tokens), vec!["<b>", "y", "</b>", "<foo>", "EOF"]);
    }

    #[test]
    fn test_extension_block() {
        let source = "<gallery mode=\"x\">\nA.png\n</gallery>";
        let tokens: Vec<_> = Tokenizer::new(source)
            .with_extension_tags(["gallery"])
            .collect();
        let Token::SelfClosingTag(ext) = &tokens[0] else { panic!("expected extension") };
        assert_eq!(ext.name, "gallery");
        assert_eq!(ext.attrs.get("mode"), Some("x"));
        assert_eq!(ext.data.tag_widths, Some((18, 10).into()));
        assert_eq!(ext.range(), Some(SourceRange::new(0, source.len())));
    }

    #[test]
    fn test_leniency() {
        for source in ["]] }} [[ {{", "<!-- open", "'", "</b>", "<gallery>x", "{{{1}}}"] {
            let tokens = tokenize(source);
            let text: String = tokens
                .iter()
                .filter_map(|t| match t {
                    Token::Text(t) => Some(t.value.as_str()),
                    _ => None,
                })
                .collect();
            if source != "</b>" {
                assert_eq!(text, source);
            }
        }
    }

    #[test]
    fn test_offset() {
        let tokens: Vec<_> = Tokenizer::new("[[A]]").with_offset(10).collect();
        assert_eq!(tokens[0].range(), Some(SourceRange::new(10, 12)));
        assert_eq!(tokens.last(), Some(&Token::EndOfInput(15)));
    }

    #[test]
    fn test_parse_attributes() {
        let attrs = parse_attributes(r#" a="1" b='2' c=3 d a="dup""#);
        let pairs: Vec<_> = attrs.iter().collect();
        assert_eq!(pairs, vec![("a", "1"), ("b", "2"), ("c", "3"), ("d", "")]);
    }
}
