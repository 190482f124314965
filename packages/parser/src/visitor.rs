use crate::dom::{Comment, Document, Element, Node, Text};

/// Visitor pattern for traversing document trees immutably
///
/// Default implementations walk the entire tree. Override specific visit_*
/// methods to act on particular node kinds.
pub trait Visitor: Sized {
    fn visit_document(&mut self, doc: &Document) {
        walk_document(self, doc);
    }

    fn visit_node(&mut self, node: &Node) {
        walk_node(self, node);
    }

    fn visit_element(&mut self, element: &Element) {
        walk_element(self, element);
    }

    fn visit_text(&mut self, _text: &Text) {
        // Leaf node, no children to walk
    }

    fn visit_comment(&mut self, _comment: &Comment) {
        // Leaf node, no children to walk
    }
}

/// Mutable visitor pattern for transforming document trees
pub trait VisitorMut: Sized {
    fn visit_document_mut(&mut self, doc: &mut Document) {
        walk_document_mut(self, doc);
    }

    fn visit_node_mut(&mut self, node: &mut Node) {
        walk_node_mut(self, node);
    }

    fn visit_element_mut(&mut self, element: &mut Element) {
        walk_element_mut(self, element);
    }

    fn visit_text_mut(&mut self, _text: &mut Text) {}

    fn visit_comment_mut(&mut self, _comment: &mut Comment) {}
}

pub fn walk_document<V: Visitor>(visitor: &mut V, doc: &Document) {
    visitor.visit_element(&doc.body);
}

pub fn walk_node<V: Visitor>(visitor: &mut V, node: &Node) {
    match node {
        Node::Element(el) => visitor.visit_element(el),
        Node::Text(t) => visitor.visit_text(t),
        Node::Comment(c) => visitor.visit_comment(c),
    }
}

pub fn walk_element<V: Visitor>(visitor: &mut V, element: &Element) {
    for child in &element.children {
        visitor.visit_node(child);
    }
}

pub fn walk_document_mut<V: VisitorMut>(visitor: &mut V, doc: &mut Document) {
    visitor.visit_element_mut(&mut doc.body);
}

pub fn walk_node_mut<V: VisitorMut>(visitor: &mut V, node: &mut Node) {
    match node {
        Node::Element(el) => visitor.visit_element_mut(el),
        Node::Text(t) => visitor.visit_text_mut(t),
        Node::Comment(c) => visitor.visit_comment_mut(c),
    }
}

pub fn walk_element_mut<V: VisitorMut>(visitor: &mut V, element: &mut Element) {
    for child in &mut element.children {
        visitor.visit_node_mut(child);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ElementCounter {
        count: usize,
    }

    impl Visitor for ElementCounter {
        fn visit_element(&mut self, element: &Element) {
            self.count += 1;
            walk_element(self, element);
        }
    }

    struct Renamer;

    impl VisitorMut for Renamer {
        fn visit_element_mut(&mut self, element: &mut Element) {
            if element.name == "b" {
                element.name = "strong".to_string();
            }
            walk_element_mut(self, element);
        }
    }

    fn sample() -> Document {
        let mut doc = Document::new();
        let b = Element::new("b").with_child(Node::text("x"));
        doc.body
            .children
            .push(Node::Element(Element::new("p").with_child(Node::Element(b))));
        doc
    }

    #[test]
    fn test_visitor_counts_elements() {
        let mut counter = ElementCounter { count: 0 };
        counter.visit_document(&sample());
        assert_eq!(counter.count, 3);
    }

    #[test]
    fn test_visitor_mut_renames() {
        let mut doc = sample();
        Renamer.visit_document_mut(&mut doc);
        assert!(doc.to_html().contains("<strong>x</strong>"));
    }
}
