//! Document
//!
//! A [`DomTree`] plus the document-wide state: focus, window scroll and the
//! address it was loaded from.

use crate::{DomError, DomResult, DomTree, NodeId, ScrollOffset, Selection};

/// HTML Document
#[derive(Debug, Clone, Default)]
pub struct Document {
    tree: DomTree,
    url: String,
    focused: Option<NodeId>,
    window_scroll: ScrollOffset,
}

impl Document {
    /// Create a new empty document
    pub fn new(url: &str) -> Self {
        Self {
            tree: DomTree::new(),
            url: url.to_string(),
            focused: None,
            window_scroll: ScrollOffset::default(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn set_url(&mut self, url: &str) {
        self.url = url.to_string();
    }

    pub fn tree(&self) -> &DomTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut DomTree {
        &mut self.tree
    }

    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    fn find_tag(&self, parent: NodeId, tag: &str) -> Option<NodeId> {
        self.tree
            .children(parent)
            .find(|c| self.tree.is_tag(*c, tag))
    }

    /// The `<html>` element
    pub fn document_element(&self) -> Option<NodeId> {
        self.find_tag(NodeId::ROOT, "html")
    }

    /// The `<head>` element
    pub fn head(&self) -> Option<NodeId> {
        self.document_element()
            .and_then(|html| self.find_tag(html, "head"))
    }

    /// The `<body>` element
    pub fn body(&self) -> Option<NodeId> {
        self.document_element()
            .and_then(|html| self.find_tag(html, "body"))
    }

    /// Text of the `<title>` element
    pub fn title(&self) -> Option<String> {
        let head = self.head()?;
        let title = self.find_tag(head, "title")?;
        Some(self.tree.text_content(title).trim().to_string())
    }

    // === Focus ===

    pub fn focus(&mut self, id: NodeId) {
        self.focused = Some(id);
    }

    pub fn blur(&mut self) {
        self.focused = None;
    }

    /// Focused element, if it is still connected
    pub fn active_element(&self) -> Option<NodeId> {
        self.focused.filter(|f| self.tree.is_connected(*f))
    }

    pub fn is_focused(&self, id: NodeId) -> bool {
        self.active_element() == Some(id)
    }

    // === Properties ===

    /// Current form value of an element
    pub fn value(&self, id: NodeId) -> String {
        let Some(el) = self.tree.element(id) else {
            return String::new();
        };
        if let Some(v) = &el.state.value {
            return v.clone();
        }
        if el.is("textarea") {
            return self.tree.text_content(id);
        }
        if el.is("select") {
            return self
                .selected_index(id)
                .and_then(|i| self.options(id).get(i).copied())
                .map(|option| self.option_value(option))
                .unwrap_or_default();
        }
        el.get_attr("value").unwrap_or_default().to_string()
    }

    /// Set the live form value, returns true if it changed. A select picks
    /// the first option with that value and keeps its selection when none
    /// matches.
    pub fn set_value(&mut self, id: NodeId, value: &str) -> DomResult<bool> {
        let current = self.value(id);
        if self.tree.is_tag(id, "select") {
            let found = self
                .options(id)
                .iter()
                .position(|&option| self.option_value(option) == value);
            return match found {
                Some(index) => self.set_selected_index(id, index),
                None => Ok(false),
            };
        }
        let el = self
            .tree
            .element_mut(id)
            .ok_or(DomError::NotAnElement(id))?;
        el.state.value = Some(value.to_string());
        Ok(current != value)
    }

    // === Select ===

    /// `option` elements of a select, in document order
    pub fn options(&self, id: NodeId) -> Vec<NodeId> {
        self.tree
            .descendants(id)
            .into_iter()
            .filter(|&n| self.tree.is_tag(n, "option"))
            .collect()
    }

    /// Submitted value of an option: its `value` attribute or its text
    pub fn option_value(&self, option: NodeId) -> String {
        match self.tree.attr(option, "value") {
            Some(v) => v.to_string(),
            None => self.tree.text_content(option).trim().to_string(),
        }
    }

    /// Selected option of a select. Without live state the last option
    /// marked `selected` wins, else the first option.
    pub fn selected_index(&self, id: NodeId) -> Option<usize> {
        let el = self.tree.element(id)?;
        let options = self.options(id);
        if options.is_empty() {
            return None;
        }
        if let Some(index) = el.state.selected_index.filter(|&i| i < options.len()) {
            return Some(index);
        }
        options
            .iter()
            .rposition(|&o| self.tree.has_attr(o, "selected"))
            .or(Some(0))
    }

    /// Select the option at `index`, returns true if the selection moved
    pub fn set_selected_index(&mut self, id: NodeId, index: usize) -> DomResult<bool> {
        let count = self.options(id).len();
        if index >= count {
            return Err(DomError::OptionOutOfRange { index, len: count });
        }
        let current = self.selected_index(id);
        let el = self
            .tree
            .element_mut(id)
            .ok_or(DomError::NotAnElement(id))?;
        el.state.selected_index = Some(index);
        Ok(current != Some(index))
    }

    /// Checkedness of a checkbox/radio
    pub fn checked(&self, id: NodeId) -> bool {
        self.tree
            .element(id)
            .map(|el| el.state.checked.unwrap_or_else(|| el.has_attr("checked")))
            .unwrap_or(false)
    }

    /// Open state of a details element
    pub fn open(&self, id: NodeId) -> bool {
        self.tree
            .element(id)
            .map(|el| el.state.open.unwrap_or_else(|| el.has_attr("open")))
            .unwrap_or(false)
    }

    /// Set a boolean attribute as property and attribute presence together
    pub fn set_boolean(&mut self, id: NodeId, name: &str, on: bool) -> DomResult<bool> {
        let el = self
            .tree
            .element_mut(id)
            .ok_or(DomError::NotAnElement(id))?;
        match name {
            "checked" => el.state.checked = Some(on),
            "open" => el.state.open = Some(on),
            _ => {}
        }
        let changed = if on {
            el.set_attr(name, "")
        } else {
            el.remove_attr(name).is_some()
        };
        Ok(changed)
    }

    /// Toggle the `hidden` attribute
    pub fn set_hidden(&mut self, id: NodeId, hidden: bool) -> DomResult<bool> {
        self.set_boolean(id, "hidden", hidden)
    }

    pub fn is_hidden(&self, id: NodeId) -> bool {
        self.tree.has_attr(id, "hidden")
    }

    pub fn selection(&self, id: NodeId) -> Option<Selection> {
        self.tree.element(id).and_then(|el| el.state.selection)
    }

    pub fn set_selection(&mut self, id: NodeId, selection: Selection) -> DomResult<()> {
        let el = self
            .tree
            .element_mut(id)
            .ok_or(DomError::NotAnElement(id))?;
        el.state.selection = Some(selection);
        Ok(())
    }

    // === Inline style ===

    /// Value of one declaration in the `style` attribute
    pub fn style_property(&self, id: NodeId, name: &str) -> Option<String> {
        let style = self.tree.attr(id, "style")?;
        style_declarations(style)
            .into_iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    /// Set one declaration of the `style` attribute, keeping the others in
    /// place. Returns true if the attribute changed.
    pub fn set_style_property(&mut self, id: NodeId, name: &str, value: &str) -> DomResult<bool> {
        let mut declarations = style_declarations(self.tree.attr(id, "style").unwrap_or_default());
        match declarations.iter_mut().find(|(k, _)| k == name) {
            Some(entry) => entry.1 = value.to_string(),
            None => declarations.push((name.to_string(), value.to_string())),
        }
        let style = declarations
            .iter()
            .map(|(k, v)| format!("{k}: {v};"))
            .collect::<Vec<_>>()
            .join(" ");
        self.tree.set_attr(id, "style", &style)
    }

    // === Scroll ===

    pub fn window_scroll(&self) -> ScrollOffset {
        self.window_scroll
    }

    pub fn scroll_window_to(&mut self, offset: ScrollOffset) {
        self.window_scroll = offset;
    }

    pub fn scroll(&self, id: NodeId) -> ScrollOffset {
        self.tree
            .element(id)
            .map(|el| el.state.scroll)
            .unwrap_or_default()
    }

    pub fn scroll_to(&mut self, id: NodeId, offset: ScrollOffset) -> DomResult<()> {
        let el = self
            .tree
            .element_mut(id)
            .ok_or(DomError::NotAnElement(id))?;
        el.state.scroll = offset;
        Ok(())
    }
}

fn style_declarations(style: &str) -> Vec<(String, String)> {
    style
        .split(';')
        .filter_map(|decl| {
            let (k, v) = decl.split_once(':')?;
            let k = k.trim().to_ascii_lowercase();
            (!k.is_empty()).then(|| (k, v.trim().to_string()))
        })
        .collect()
}
