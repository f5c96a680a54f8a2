use std::collections::{HashMap, HashSet};

use crate::topo::{GraphStore, ROOT_ID};

/// UI state of a synthetic sibling group, persisted across normalization
/// passes under the group's stable id.
#[derive(Clone, Copy, Debug, Default)]
pub struct GroupUiState {
    pub expanded: bool,
    pub offset: usize,
    pub full_size: bool,
}

/// Per-entity UI state, kept outside the domain entities and keyed by id so
/// the store stays a pure data model and rendering stays testable.
pub struct ViewState {
    expanded: HashMap<String, bool>,
    selected_nodes: HashSet<String>,
    selected_links: HashSet<String>,
    pinned: HashSet<String>,
    hovered: Option<String>,
    group_states: HashMap<String, GroupUiState>,
    structure_revision: u64,
    emphasis_revision: u64,
}

impl ViewState {
    pub fn new() -> Self {
        Self {
            expanded: HashMap::new(),
            selected_nodes: HashSet::new(),
            selected_links: HashSet::new(),
            pinned: HashSet::new(),
            hovered: None,
            group_states: HashMap::new(),
            structure_revision: 0,
            emphasis_revision: 0,
        }
    }

    /// Bumped when expansion, grouping or pagination changed, i.e. whenever
    /// the normalized tree must be rebuilt.
    pub fn structure_revision(&self) -> u64 {
        self.structure_revision
    }

    /// Bumped on selection/hover changes that only affect emphasis.
    pub fn emphasis_revision(&self) -> u64 {
        self.emphasis_revision
    }

    fn touch_structure(&mut self) {
        self.structure_revision = self.structure_revision.wrapping_add(1);
    }

    fn touch_emphasis(&mut self) {
        self.emphasis_revision = self.emphasis_revision.wrapping_add(1);
    }

    pub fn is_expanded(&self, id: &str) -> bool {
        self.expanded.get(id).copied().unwrap_or(id == ROOT_ID)
    }

    pub fn set_expanded(&mut self, id: &str, expanded: bool) {
        self.expanded.insert(id.to_owned(), expanded);
        self.touch_structure();
    }

    /// Collapsing a node collapses its whole subtree, so re-expanding the
    /// node later reveals only its direct children.
    pub fn collapse_recursive(&mut self, store: &GraphStore, id: &str) {
        let mut stack = vec![id.to_owned()];
        while let Some(current) = stack.pop() {
            self.expanded.insert(current.clone(), false);
            if let Some(node) = store.node(&current) {
                stack.extend(node.children.iter().cloned());
            }
        }
        self.touch_structure();
    }

    pub fn group_state(&self, gid: &str) -> GroupUiState {
        self.group_states.get(gid).copied().unwrap_or_default()
    }

    pub fn set_group_state(&mut self, gid: &str, state: GroupUiState) {
        self.group_states.insert(gid.to_owned(), state);
        self.touch_structure();
    }

    pub fn is_group_known(&self, gid: &str) -> bool {
        self.group_states.contains_key(gid)
    }

    pub fn remember_group(&mut self, gid: &str) {
        // no revision bump: recording a default state changes nothing visible
        self.group_states.entry(gid.to_owned()).or_default();
    }

    pub fn is_node_selected(&self, id: &str) -> bool {
        self.selected_nodes.contains(id)
    }

    pub fn is_link_selected(&self, id: &str) -> bool {
        self.selected_links.contains(id)
    }

    pub fn selected_nodes(&self) -> impl Iterator<Item = &String> {
        self.selected_nodes.iter()
    }

    pub fn selected_links(&self) -> impl Iterator<Item = &String> {
        self.selected_links.iter()
    }

    pub fn select_node(&mut self, id: &str, selected: bool) {
        let changed = if selected {
            self.selected_nodes.insert(id.to_owned())
        } else {
            self.selected_nodes.remove(id)
        };
        if changed {
            self.touch_emphasis();
        }
    }

    pub fn select_link(&mut self, id: &str, selected: bool) {
        let changed = if selected {
            self.selected_links.insert(id.to_owned())
        } else {
            self.selected_links.remove(id)
        };
        if changed {
            self.touch_emphasis();
        }
    }

    pub fn clear_selection(&mut self) -> (Vec<String>, Vec<String>) {
        let nodes = self.selected_nodes.drain().collect::<Vec<_>>();
        let links = self.selected_links.drain().collect::<Vec<_>>();
        if !nodes.is_empty() || !links.is_empty() {
            self.touch_emphasis();
        }
        (nodes, links)
    }

    pub fn hovered(&self) -> Option<&str> {
        self.hovered.as_deref()
    }

    pub fn set_hovered(&mut self, id: Option<String>) {
        if self.hovered != id {
            self.hovered = id;
            self.touch_emphasis();
        }
    }

    pub fn is_hovered(&self, id: &str) -> bool {
        self.hovered.as_deref() == Some(id)
    }

    /// Selected or hovered: the condition under which event-based links to
    /// this entity become visible.
    pub fn is_active(&self, id: &str) -> bool {
        self.is_node_selected(id) || self.is_hovered(id)
    }

    pub fn is_pinned(&self, id: &str) -> bool {
        self.pinned.contains(id)
    }

    pub fn set_pinned(&mut self, id: &str, pinned: bool) {
        if pinned {
            self.pinned.insert(id.to_owned());
        } else {
            self.pinned.remove(id);
        }
        self.touch_emphasis();
    }

    pub fn unpin_all(&mut self) {
        if !self.pinned.is_empty() {
            self.pinned.clear();
            self.touch_emphasis();
        }
    }
}

impl Default for ViewState {
    fn default() -> Self {
        Self::new()
    }
}
