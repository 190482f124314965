use super::SyncStage;
use crate::error::PipelineResult;
use crate::options::PipelineOptions;
use wikitext_parser::{DataParsoid, TagToken, Token};

/// Turns `listItem` tokens into nested `ul`/`ol`/`dl` structures.
///
/// Open lists are tracked as a stack of bullet characters. A new item keeps
/// the levels it shares with the open stack, closes the rest and opens what is
/// new. `;` and `:` share one `dl`, so switching between them at the deepest
/// level only swaps the item.
#[derive(Debug, Default)]
pub struct ListHandler {
    levels: Vec<char>,
    newline: Option<Token>,
}

impl ListHandler {
    pub fn for_options(_opts: &PipelineOptions) -> Option<Box<dyn SyncStage>> {
        Some(Box::new(ListHandler::default()))
    }

    fn list_item(&mut self, tag: TagToken, out: &mut Vec<Token>) {
        let bullets: Vec<char> = tag.attrs.get("bullets").unwrap_or("*").chars().collect();
        let pos = tag.range().map_or(0, |r| r.start);
        let close_pos = self.newline.as_ref().and_then(Token::start).unwrap_or(pos);

        let prefix = self
            .levels
            .iter()
            .zip(&bullets)
            .take_while(|(a, b)| a == b)
            .count();
        let dl_switch = prefix + 1 == bullets.len()
            && prefix + 1 == self.levels.len()
            && is_definition(bullets[prefix])
            && is_definition(self.levels[prefix]);
        let keep = if dl_switch { prefix + 1 } else { prefix };

        self.close_to(keep, close_pos, out);
        let mut data = Some(tag.data);

        if keep > 0 && keep == bullets.len() {
            let old = self.levels[keep - 1];
            out.push(end(item_tag(old), close_pos));
            self.flush_newline(out);
            self.levels[keep - 1] = bullets[keep - 1];
            out.push(start(item_tag(bullets[keep - 1]), data.take().unwrap_or_default()));
            return;
        }

        self.flush_newline(out);
        for (idx, bullet) in bullets.iter().enumerate().skip(keep) {
            out.push(start(list_tag(*bullet), zero_width(pos)));
            let item_data = if idx + 1 == bullets.len() {
                data.take().unwrap_or_default()
            } else {
                zero_width(pos)
            };
            out.push(start(item_tag(*bullet), item_data));
            self.levels.push(*bullet);
        }
    }

    fn close_to(&mut self, depth: usize, pos: usize, out: &mut Vec<Token>) {
        while self.levels.len() > depth {
            if let Some(bullet) = self.levels.pop() {
                out.push(end(item_tag(bullet), pos));
                out.push(end(list_tag(bullet), pos));
            }
        }
    }

    fn flush_newline(&mut self, out: &mut Vec<Token>) {
        if let Some(newline) = self.newline.take() {
            out.push(newline);
        }
    }

    fn close_all(&mut self, fallback: usize, out: &mut Vec<Token>) {
        let pos = self.newline.as_ref().and_then(Token::start).unwrap_or(fallback);
        self.close_to(0, pos, out);
        self.flush_newline(out);
    }
}

impl SyncStage for ListHandler {
    fn name(&self) -> &'static str {
        "lists"
    }

    fn process(&mut self, token: Token, out: &mut Vec<Token>) -> PipelineResult<()> {
        match token {
            Token::SelfClosingTag(tag) if tag.name == "listItem" => self.list_item(tag, out),
            _ if self.levels.is_empty() => out.push(token),
            Token::Newline(_) if self.newline.is_none() => self.newline = Some(token),
            Token::Newline(_) | Token::EndOfInput(_) => {
                let fallback = token.start().unwrap_or(0);
                self.close_all(fallback, out);
                out.push(token);
            }
            // Content continuing the current item's line.
            _ if self.newline.is_none() => out.push(token),
            _ => {
                let fallback = token.start().unwrap_or(0);
                self.close_all(fallback, out);
                out.push(token);
            }
        }
        Ok(())
    }

    fn finish(&mut self, out: &mut Vec<Token>) -> PipelineResult<()> {
        let fallback = out.last().and_then(Token::end).unwrap_or(0);
        self.close_all(fallback, out);
        Ok(())
    }
}

fn is_definition(bullet: char) -> bool {
    matches!(bullet, ';' | ':')
}

fn list_tag(bullet: char) -> &'static str {
    match bullet {
        '#' => "ol",
        ';' | ':' => "dl",
        _ => "ul",
    }
}

fn item_tag(bullet: char) -> &'static str {
    match bullet {
        ';' => "dt",
        ':' => "dd",
        _ => "li",
    }
}

fn zero_width(pos: usize) -> DataParsoid {
    DataParsoid::with_range(pos, pos)
}

fn start(name: &str, data: DataParsoid) -> Token {
    Token::StartTag(TagToken::new(name).data(data))
}

fn end(name: &str, pos: usize) -> Token {
    Token::EndTag(TagToken::new(name).data(zero_width(pos)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wikitext_parser::{build_tree, tokenize, Document, Element, Node};

    fn lists(source: &str) -> Document {
        build_tree(ListHandler::default().run(tokenize(source)).unwrap())
    }

    fn element(node: &Node) -> &Element {
        node.as_element().expect("expected element")
    }

    fn shape(el: &Element) -> String {
        let inner: Vec<String> = el
            .children
            .iter()
            .filter_map(Node::as_element)
            .map(shape)
            .collect();
        if inner.is_empty() {
            el.name.clone()
        } else {
            format!("{}({})", el.name, inner.join(" "))
        }
    }

    #[test]
    fn test_flat_list() {
        let doc = lists("* a\n* b\n");
        assert_eq!(shape(&doc.body), "body(ul(li li))");
        let ul = element(&doc.children()[0]);
        let first = element(&ul.children[0]);
        assert_eq!(first.range().map(|r| (r.start, r.end)), Some((0, 3)));
        assert_eq!(first.text_content(), " a");
    }

    #[test]
    fn test_nested_and_mixed() {
        let doc = lists("* a\n*# b\n*# c\n* d");
        assert_eq!(shape(&doc.body), "body(ul(li(ol(li li)) li))");
    }

    #[test]
    fn test_definition_list_shares_dl() {
        let doc = lists("; term\n: def\n");
        assert_eq!(shape(&doc.body), "body(dl(dt dd))");
    }

    #[test]
    fn test_list_ends_at_plain_line() {
        let doc = lists("# one\nafter");
        assert_eq!(shape(&doc.body), "body(ol(li))");
        let Node::Text(text) = &doc.children()[1] else {
            panic!("expected text after the list");
        };
        assert_eq!(text.value, "\nafter");
    }

    #[test]
    fn test_ranges_stay_valid() {
        let source = "* a\n** b\n# c\n\n: d";
        let doc = lists(source);
        assert!(doc.validate_provenance(0, source.len()).is_ok());
        assert_eq!(shape(&doc.body), "body(ul(li(ul(li))) ol(li) dl(dd))");
    }
}
