pub mod data_mw;
pub mod dom;
pub mod error;
pub mod provenance;
pub mod selective_serializer;
pub mod serializer;
pub mod token;
pub mod tokenizer;
pub mod tree_builder;
pub mod visitor;

pub use dom::{Comment, Document, Element, Node, Text};
pub use error::{ParseError, ParseResult, SerializeError, SerializeResult};
pub use provenance::{DataParsoid, ProvenanceKind, SourceRange, Syntax, TagWidths};
pub use selective_serializer::{OriginalPage, SelectiveOutput, SelectiveSerializer, SerializeStats};
pub use serializer::{serialize, ExtensionSerializer, Markup, Serializer, SerializerHooks};
pub use token::{Attributes, TagToken, TextToken, Token};
pub use tokenizer::{tokenize, Tokenizer};
pub use tree_builder::{build_tree, TreeBuilder};

/// Tokenize and build a tree without running any transform stages.
pub fn parse(source: &str) -> Document {
    build_tree(Tokenizer::new(source))
}

#[cfg(test)]
mod tests_serializer;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic() {
        let doc = parse("== Title ==");
        assert_eq!(doc.children().len(), 1);
        assert_eq!(doc.children()[0].node_name(), "h2");
        assert!(doc.validate_provenance(0, 11).is_ok());
    }
}
