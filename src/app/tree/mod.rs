mod leveling;

use std::collections::{HashMap, HashSet};

use crate::app::config::TopologyConfig;
use crate::app::view_state::ViewState;
use crate::topo::{GraphStore, Node, ROOT_ID};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WrapperKind {
    Normal,
    /// Level placeholder, never drawn.
    Hidden,
    Group,
}

/// One slot of the normalized render tree. Wrappers are arena-allocated and
/// reference each other by index; node ids point back into the store.
#[derive(Clone, Debug)]
pub struct Wrapper {
    pub id: String,
    pub kind: WrapperKind,
    pub node_id: Option<String>,
    pub weight: i64,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
}

#[derive(Clone, Debug)]
pub struct GroupInfo {
    pub id: String,
    pub wrapper: usize,
    pub name: String,
    pub type_key: String,
    pub weight: i64,
    pub tags: Vec<String>,
    pub members: Vec<String>,
    pub visible: Vec<String>,
    pub hidden_count: usize,
    /// Members forced to the front by `sort_first`, exempt from paging.
    pub fronted: usize,
}

/// Output of one normalization pass: filtered clone of the store tree with
/// sibling groups collapsed into Group wrappers and Hidden padding chains so
/// equal-weight nodes share a depth. Rebuilt from scratch whenever the store
/// generation or the view structure revision moves.
pub struct NormalizedTree {
    pub wrappers: Vec<Wrapper>,
    pub root: usize,
    pub groups: HashMap<String, GroupInfo>,
    pub node_group: HashMap<String, String>,
    pub node_wrapper: HashMap<String, usize>,
}

impl NormalizedTree {
    fn push(&mut self, wrapper: Wrapper) -> usize {
        let idx = self.wrappers.len();
        if let Some(parent) = wrapper.parent {
            self.wrappers[parent].children.push(idx);
        }
        self.wrappers.push(wrapper);
        idx
    }

    pub fn wrapper(&self, idx: usize) -> &Wrapper {
        &self.wrappers[idx]
    }

    pub fn depth(&self, idx: usize) -> usize {
        let mut depth = 0;
        let mut cursor = self.wrappers[idx].parent;
        while let Some(parent) = cursor {
            depth += 1;
            cursor = self.wrappers[parent].parent;
        }
        depth
    }

    /// Wrapper that stands in for `id` on screen: the node itself when
    /// rendered, its enclosing group when paged away, else the nearest
    /// rendered ancestor. None once the walk reaches the root.
    pub fn resolve_endpoint(&self, store: &GraphStore, id: &str) -> Option<usize> {
        let mut cursor = id.to_owned();
        loop {
            if cursor == ROOT_ID {
                return None;
            }
            if let Some(&idx) = self.node_wrapper.get(&cursor) {
                return Some(idx);
            }
            if let Some(gid) = self.node_group.get(&cursor) {
                return self.groups.get(gid).map(|group| group.wrapper);
            }
            cursor = store.node(&cursor)?.parent.clone()?;
        }
    }
}

/// Build the render tree: filtered clone with grouping, then leveling.
/// Grouping must run before leveling so padding chains account for group
/// wrappers and their visible members.
pub fn normalize(
    store: &GraphStore,
    view: &mut ViewState,
    config: &TopologyConfig,
) -> NormalizedTree {
    let mut tree = NormalizedTree {
        wrappers: Vec::new(),
        root: 0,
        groups: HashMap::new(),
        node_group: HashMap::new(),
        node_wrapper: HashMap::new(),
    };

    let active_tags = store
        .node_tag_states()
        .iter()
        .filter(|(_, active)| **active)
        .map(|(tag, _)| tag.clone())
        .collect::<HashSet<_>>();

    tree.root = tree.push(Wrapper {
        id: ROOT_ID.to_owned(),
        kind: WrapperKind::Normal,
        node_id: Some(ROOT_ID.to_owned()),
        weight: 0,
        parent: None,
        children: Vec::new(),
    });
    tree.node_wrapper.insert(ROOT_ID.to_owned(), tree.root);

    let root_idx = tree.root;
    clone_children(store, view, config, &active_tags, &mut tree, ROOT_ID, root_idx);
    leveling::level(store, &mut tree);
    tree
}

fn has_active_tag(node: &Node, active_tags: &HashSet<String>) -> bool {
    node.tags.iter().any(|tag| active_tags.contains(tag))
}

fn clone_node(
    store: &GraphStore,
    view: &mut ViewState,
    config: &TopologyConfig,
    active_tags: &HashSet<String>,
    tree: &mut NormalizedTree,
    node_id: &str,
    parent: usize,
) {
    let weight = store.effective_weight(node_id);
    let idx = tree.push(Wrapper {
        id: node_id.to_owned(),
        kind: WrapperKind::Normal,
        node_id: Some(node_id.to_owned()),
        weight,
        parent: Some(parent),
        children: Vec::new(),
    });
    tree.node_wrapper.insert(node_id.to_owned(), idx);

    if view.is_expanded(node_id) {
        clone_children(store, view, config, active_tags, tree, node_id, idx);
    }
}

fn clone_children(
    store: &GraphStore,
    view: &mut ViewState,
    config: &TopologyConfig,
    active_tags: &HashSet<String>,
    tree: &mut NormalizedTree,
    parent_id: &str,
    parent_idx: usize,
) {
    let Some(parent_node) = store.node(parent_id) else {
        return;
    };

    let mut children = parent_node
        .children
        .iter()
        .filter_map(|id| store.node(id))
        .filter(|child| has_active_tag(child, active_tags))
        .collect::<Vec<_>>();
    children.sort_by(|a, b| {
        b.sort_first
            .cmp(&a.sort_first)
            .then_with(|| (config.compare_nodes)(*a, *b))
    });

    // partition by (classification key, effective weight); only oversized
    // partitions become groups
    let mut bucket_sizes: HashMap<(String, i64), usize> = HashMap::new();
    let keys = children
        .iter()
        .map(|child| {
            let key = (config.group_type)(child)
                .map(|type_key| (type_key, store.effective_weight(&child.id)));
            if let Some(key) = &key {
                *bucket_sizes.entry(key.clone()).or_insert(0) += 1;
            }
            key
        })
        .collect::<Vec<_>>();

    let mut emitted_groups = HashSet::new();
    for (child, key) in children.iter().zip(&keys) {
        let grouped = key
            .as_ref()
            .is_some_and(|key| bucket_sizes[key] > config.group_size);
        if !grouped {
            clone_node(store, view, config, active_tags, tree, &child.id, parent_idx);
            continue;
        }

        let key = key.clone().unwrap_or_default();
        if !emitted_groups.insert(key.clone()) {
            continue;
        }

        let members = children
            .iter()
            .zip(&keys)
            .filter(|(_, k)| k.as_ref() == Some(&key))
            .map(|(member, _)| *member)
            .collect::<Vec<_>>();
        emit_group(
            store, view, config, active_tags, tree, parent_id, parent_idx, key, &members,
        );
    }
}

#[allow(clippy::too_many_arguments)]
fn emit_group(
    store: &GraphStore,
    view: &mut ViewState,
    config: &TopologyConfig,
    active_tags: &HashSet<String>,
    tree: &mut NormalizedTree,
    parent_id: &str,
    parent_idx: usize,
    key: (String, i64),
    members: &[&Node],
) {
    let (type_key, weight) = key;
    let gid = format!("{parent_id}_{type_key}_{weight}");
    view.remember_group(&gid);
    let state = view.group_state(&gid);

    let wrapper = tree.push(Wrapper {
        id: gid.clone(),
        kind: WrapperKind::Group,
        node_id: None,
        weight,
        parent: Some(parent_idx),
        children: Vec::new(),
    });

    // sort_first members are always shown, ahead of the paging window
    let (fronted, paged): (Vec<&&Node>, Vec<&&Node>) =
        members.iter().partition(|member| member.sort_first);
    let mut visible = Vec::new();
    if state.expanded {
        visible.extend(fronted.iter().map(|member| member.id.clone()));
        let window = if state.full_size {
            paged.as_slice()
        } else {
            let start = state.offset.min(paged.len());
            let end = (start + config.group_size).min(paged.len());
            &paged[start..end]
        };
        visible.extend(window.iter().map(|member| member.id.clone()));
    }

    let mut tags = Vec::new();
    for member in members {
        for tag in &member.tags {
            if !tags.contains(tag) {
                tags.push(tag.clone());
            }
        }
        tree.node_group.insert(member.id.clone(), gid.clone());
    }

    // shown members render as siblings of the group wrapper, not children,
    // so leveling and layout treat them like ordinary nodes
    for member_id in &visible {
        clone_node(store, view, config, active_tags, tree, member_id, parent_idx);
    }

    let name = members
        .first()
        .map(|member| (config.group_name)(*member))
        .unwrap_or_else(|| type_key.clone());
    let hidden_count = members.len() - visible.len();
    tree.groups.insert(
        gid.clone(),
        GroupInfo {
            id: gid,
            wrapper,
            name,
            type_key,
            weight,
            tags,
            members: members.iter().map(|member| member.id.clone()).collect(),
            visible,
            hidden_count,
            fronted: fronted.len(),
        },
    );
}
