use super::{is_block_tag, SyncStage};
use crate::error::PipelineResult;
use crate::options::PipelineOptions;
use wikitext_parser::tokenizer::VOID_TAGS;
use wikitext_parser::{DataParsoid, TagToken, Token};

/// Wraps runs of top-level inline content in `p` elements.
///
/// Whitespace, newlines and comments between blocks are held back until the
/// next token shows whether they belong inside a paragraph or between blocks.
/// A blank line ends the current paragraph.
#[derive(Debug, Default)]
pub struct ParagraphWrapper {
    open: Vec<String>,
    in_paragraph: bool,
    held: Vec<Token>,
    newlines: usize,
    last_pos: usize,
}

impl ParagraphWrapper {
    pub fn for_options(opts: &PipelineOptions) -> Option<Box<dyn SyncStage>> {
        if opts.in_block_token {
            None
        } else {
            Some(Box::new(ParagraphWrapper::default()))
        }
    }

    fn held_start(&self) -> Option<usize> {
        self.held.first().and_then(Token::start)
    }

    fn close_paragraph(&mut self, pos: Option<usize>, out: &mut Vec<Token>) {
        if self.in_paragraph {
            let pos = self.held_start().or(pos).unwrap_or(self.last_pos);
            out.push(Token::EndTag(
                TagToken::new("p").data(DataParsoid::with_range(pos, pos)),
            ));
            self.in_paragraph = false;
        }
        out.append(&mut self.held);
        self.newlines = 0;
    }

    fn inline(&mut self, token: Token, out: &mut Vec<Token>) {
        if !self.in_paragraph {
            out.append(&mut self.held);
            let pos = token.start().unwrap_or(self.last_pos);
            out.push(Token::StartTag(
                TagToken::new("p").data(DataParsoid::with_range(pos, pos)),
            ));
            self.in_paragraph = true;
        } else {
            out.append(&mut self.held);
        }
        self.newlines = 0;
        self.track(&token);
        out.push(token);
    }

    /// Keep the stack of open elements in step with the stream.
    fn track(&mut self, token: &Token) {
        match token {
            Token::StartTag(tag) if !VOID_TAGS.contains(&tag.name.as_str()) => {
                self.open.push(tag.name.clone())
            }
            Token::EndTag(tag) => {
                if let Some(idx) = self.open.iter().rposition(|name| *name == tag.name) {
                    self.open.truncate(idx);
                }
            }
            _ => {}
        }
    }
}

impl SyncStage for ParagraphWrapper {
    fn name(&self) -> &'static str {
        "paragraphs"
    }

    fn process(&mut self, token: Token, out: &mut Vec<Token>) -> PipelineResult<()> {
        if let Some(end) = token.end() {
            self.last_pos = self.last_pos.max(end);
        }

        if !self.open.is_empty() {
            self.track(&token);
            out.append(&mut self.held);
            out.push(token);
            return Ok(());
        }

        let block = matches!(
            &token,
            Token::StartTag(tag) | Token::SelfClosingTag(tag) if is_block_tag(&tag.name)
        );
        match token {
            Token::Newline(_) => {
                self.newlines += 1;
                if self.newlines >= 2 && self.in_paragraph {
                    let pos = token.start();
                    self.close_paragraph(pos, out);
                    out.push(token);
                    return Ok(());
                }
                self.held.push(token);
            }
            Token::Comment(_) => self.held.push(token),
            Token::Text(_) if token.is_whitespace_text() => self.held.push(token),
            Token::EndOfInput(_) => {
                self.close_paragraph(token.start(), out);
                out.push(token);
            }
            _ if block => {
                self.close_paragraph(token.start(), out);
                self.track(&token);
                out.push(token);
            }
            _ => self.inline(token, out),
        }
        Ok(())
    }

    fn finish(&mut self, out: &mut Vec<Token>) -> PipelineResult<()> {
        let pos = self.last_pos;
        self.close_paragraph(Some(pos), out);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::ListHandler;
    use wikitext_parser::{build_tree, serialize, tokenize, Document, Node};

    fn paragraphs(source: &str) -> Document {
        let tokens = ListHandler::default().run(tokenize(source)).unwrap();
        build_tree(ParagraphWrapper::default().run(tokens).unwrap())
    }

    fn names(doc: &Document) -> Vec<String> {
        doc.children()
            .iter()
            .map(|n| n.node_name().to_string())
            .collect()
    }

    #[test]
    fn test_single_paragraph() {
        let doc = paragraphs("one\ntwo");
        assert_eq!(names(&doc), vec!["p"]);
        assert_eq!(doc.children()[0].text_content(), "one\ntwo");
    }

    #[test]
    fn test_blank_line_splits() {
        let doc = paragraphs("one\n\ntwo");
        assert_eq!(names(&doc), vec!["p", "#text", "p"]);
    }

    #[test]
    fn test_blocks_are_not_wrapped() {
        let doc = paragraphs("== H ==\ntext ''i''\n* item\n<div>x</div>");
        assert_eq!(names(&doc), vec!["h2", "#text", "p", "#text", "ul", "#text", "div"]);
        let p = doc.children()[2].as_element().unwrap();
        assert_eq!(p.children.len(), 2);
    }

    #[test]
    fn test_leading_whitespace_stays_outside() {
        let doc = paragraphs("\n\n<!-- c -->\nbody");
        let names = names(&doc);
        assert_eq!(names.last().map(String::as_str), Some("p"));
        assert!(matches!(doc.children()[0], Node::Text(_)));
    }

    #[test]
    fn test_ranges_valid_and_markup_reproduced() {
        let source = "a\n\nb ''c''\n----\nd";
        let doc = paragraphs(source);
        assert!(doc.validate_provenance(0, source.len()).is_ok());
        assert_eq!(serialize(&doc), source);
    }
}
