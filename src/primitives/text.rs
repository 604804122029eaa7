//! Static text and comment items.

use super::item::{with_item, ItemId, ItemKind};
use crate::dom::{self, DomNodeId};
use crate::template::TemplateItem;

pub struct TextItem {
    pub text: String,
    pub is_comment: bool,
    pub node: Option<DomNodeId>,
}

impl TextItem {
    pub fn new(template: &TemplateItem) -> Self {
        let (text, is_comment) = match template {
            TemplateItem::Comment(text) => (text.clone(), true),
            TemplateItem::Text(text) => (text.clone(), false),
            _ => (String::new(), false),
        };
        Self {
            text,
            is_comment,
            node: None,
        }
    }
}

fn text_item<R>(id: ItemId, f: impl FnOnce(&mut TextItem) -> R) -> Option<R> {
    with_item(id, |slot| match &mut slot.kind {
        ItemKind::Text(text) => Some(f(text)),
        _ => None,
    })
    .flatten()
}

pub fn render(id: ItemId, parent: DomNodeId, anchor: Option<DomNodeId>) {
    let Some((text, is_comment)) = text_item(id, |t| (t.text.clone(), t.is_comment)) else {
        return;
    };
    let node = if is_comment {
        dom::create_comment(&text)
    } else {
        dom::create_text(&text)
    };
    dom::insert_before(parent, node, anchor);
    text_item(id, |t| t.node = Some(node));
}

pub fn unrender(id: ItemId, should_destroy: bool) {
    let node = text_item(id, |t| t.node.take()).flatten();
    if let (Some(node), true) = (node, should_destroy) {
        dom::destroy(node);
    }
}

pub fn to_string(id: ItemId) -> String {
    text_item(id, |t| if t.is_comment { String::new() } else { t.text.clone() }).unwrap_or_default()
}
