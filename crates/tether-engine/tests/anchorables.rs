//! Properties of description building: serialization, immutability of the
//! described tree, element-edge spans, and decorated or wrapped content.

use tether_engine::anchoring::containers::ROOT_CONTAINER_META;
use tether_engine::anchoring::NON_ANCHORABLE_ATTRIBUTE;
use tether_engine::{
    describe_range, resolve_range, DocTree, DomSpan, NodeId, Pointer, RangeDescription,
};

fn chapter_doc() -> (DocTree, NodeId, Vec<NodeId>) {
    let mut tree = DocTree::new("body");
    tree.set_meta(ROOT_CONTAINER_META, "tag:example.org,2024,chapter-1");
    let section = tree.new_element("div");
    tree.set_attr(section, "id", "Section1");
    tree.append_child(tree.root(), section);
    let mut texts = Vec::new();
    for para in [
        "Opening remarks introduce the subject gently.",
        "The middle paragraph carries the argument forward.",
        "Closing remarks summarize what was established.",
    ] {
        let p = tree.new_element("p");
        tree.append_child(section, p);
        let t = tree.new_text(para);
        tree.append_child(p, t);
        texts.push(t);
    }
    (tree, section, texts)
}

#[test]
fn describing_does_not_mutate_the_tree() {
    let (mut tree, _, texts) = chapter_doc();
    let before = tree.to_markup(tree.root());

    let mut span = DomSpan::collapsed_at(texts[0]);
    span.set_start(texts[0], 8);
    span.set_end(texts[2], 7);
    describe_range(&mut tree, Some(&span)).unwrap();

    assert_eq!(tree.to_markup(tree.root()), before);
}

#[test]
fn resolving_does_not_mutate_the_tree() {
    let (mut tree, _, texts) = chapter_doc();
    let mut span = DomSpan::collapsed_at(texts[1]);
    span.set_start(texts[1], 4);
    span.set_end(texts[1], 10);
    let described = describe_range(&mut tree, Some(&span)).unwrap();

    let before = tree.to_markup(tree.root());
    resolve_range(&described.description, &tree, None).unwrap();
    assert_eq!(tree.to_markup(tree.root()), before);
}

#[test]
fn resolution_is_idempotent() {
    let (mut tree, _, texts) = chapter_doc();
    let mut span = DomSpan::collapsed_at(texts[0]);
    span.set_start(texts[0], 0);
    span.set_end(texts[1], 10);
    let described = describe_range(&mut tree, Some(&span)).unwrap();

    let first = resolve_range(&described.description, &tree, None).unwrap();
    described.description.attach_locator(None);
    let second = resolve_range(&described.description, &tree, None).unwrap();
    assert_eq!(first, second);
}

#[test]
fn descriptions_survive_serialization() {
    let (mut tree, _, texts) = chapter_doc();
    let mut span = DomSpan::collapsed_at(texts[1]);
    span.set_start(texts[1], 4);
    span.set_end(texts[1], 26);
    let described = describe_range(&mut tree, Some(&span)).unwrap();

    let json = serde_json::to_string(&described.description).unwrap();
    let revived: RangeDescription = serde_json::from_str(&json).unwrap();
    assert_eq!(revived, described.description);

    let resolved = resolve_range(&revived, &tree, None).unwrap();
    assert_eq!(resolved.start.node, texts[1]);
    assert_eq!(resolved.start.offset, 4);
    assert_eq!(resolved.end.offset, 26);
}

#[test]
fn described_container_id_comes_from_document_meta() {
    let (mut tree, _, texts) = chapter_doc();
    let mut span = DomSpan::collapsed_at(texts[0]);
    span.set_start(texts[0], 0);
    span.set_end(texts[0], 7);
    let described = describe_range(&mut tree, Some(&span)).unwrap();
    assert_eq!(
        described.container_id.as_deref(),
        Some("tag:example.org,2024,chapter-1")
    );
}

#[test]
fn element_span_produces_element_pointers() {
    let (mut tree, section, texts) = chapter_doc();
    let p = tree.parent(texts[1]).unwrap();
    let img = tree.new_element("img");
    tree.set_attr(img, "id", "figure-2");
    tree.insert_before(p, img, texts[1]);

    let span = DomSpan::select_node(&tree, img);
    let described = describe_range(&mut tree, Some(&span)).unwrap();
    let RangeDescription::Dom(desc) = &described.description else {
        panic!("expected a dom description");
    };
    assert!(matches!(desc.start, Pointer::Element(_)));
    assert!(matches!(desc.end, Pointer::Element(_)));

    let resolved = resolve_range(&described.description, &tree, None).unwrap();
    assert_eq!(resolved, DomSpan::select_node(&tree, img));
    let _ = section;
}

#[test]
fn span_inside_non_anchorable_wrapper_describes_and_resolves() {
    let mut tree = DocTree::new("body");
    let section = tree.new_element("div");
    tree.set_attr(section, "id", "Section1");
    tree.append_child(tree.root(), section);
    let wrapper = tree.new_element("span");
    tree.set_attr(wrapper, NON_ANCHORABLE_ATTRIBUTE, "true");
    tree.append_child(section, wrapper);
    let t = tree.new_text("content kept inside a structural wrapper");
    tree.append_child(wrapper, t);

    let mut span = DomSpan::collapsed_at(t);
    span.set_start(t, 8);
    span.set_end(t, 12);
    let described = describe_range(&mut tree, Some(&span)).unwrap();

    let resolved = resolve_range(&described.description, &tree, None).unwrap();
    assert_eq!(resolved.start.node, t);
    assert_eq!(resolved.start.offset, 8);
    assert_eq!(resolved.text(&tree), "kept");
}

#[test]
fn empty_description_wraps_the_named_container() {
    let mut tree = DocTree::new("body");
    tree.set_meta(ROOT_CONTAINER_META, "tag:example.org,2024,page");
    let question = tree.new_element("object");
    tree.set_attr(question, "data-stable-id", "tag:example.org,2024,q-1");
    tree.append_child(tree.root(), question);
    let t = tree.new_text("Which answer is correct?");
    tree.append_child(question, t);

    let description = RangeDescription::empty();
    let resolved =
        resolve_range(&description, &tree, Some("tag:example.org,2024,q-1")).unwrap();
    assert_eq!(resolved.text(&tree), "Which answer is correct?");

    // Without a container id the whole document is covered.
    let whole = resolve_range(&description, &tree, None).unwrap();
    assert_eq!(whole.text(&tree), tree.text_content(tree.root()));
}

#[test]
fn whitespace_only_span_cannot_be_described() {
    let mut tree = DocTree::new("body");
    let section = tree.new_element("div");
    tree.set_attr(section, "id", "Section1");
    tree.append_child(tree.root(), section);
    let blank = tree.new_text("   \n   ");
    tree.append_child(section, blank);

    let mut span = DomSpan::collapsed_at(blank);
    span.set_start(blank, 1);
    span.set_end(blank, 4);
    assert!(describe_range(&mut tree, Some(&span)).is_err());
}
