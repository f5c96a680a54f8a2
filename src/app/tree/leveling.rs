use std::collections::HashMap;

use crate::topo::GraphStore;

use super::{NormalizedTree, Wrapper, WrapperKind};

/// Pad the cloned tree so every node of a given weight sits at the same
/// depth. Weights are processed ascending; each pass pulls the nodes whose
/// weight first appears at that level down to one past the deepest slot used
/// by lighter nodes, inserting Hidden wrapper chains where the parent is too
/// shallow. Chains are shared between siblings through a (parent, weight)
/// cache so one pass never stacks parallel padding columns.
pub(super) fn level(store: &GraphStore, tree: &mut NormalizedTree) {
    for &weight in store.weights() {
        if weight == 0 {
            continue;
        }
        let parent_depth = layer_height(tree, tree.root, weight - 1, 0);
        let mut cache = HashMap::new();
        pad_weight(tree, tree.root, weight, 0, parent_depth, &mut cache);
    }
}

/// Deepest depth occupied by wrappers of weight <= `weight`.
fn layer_height(tree: &NormalizedTree, idx: usize, weight: i64, depth: i64) -> i64 {
    if tree.wrappers[idx].weight > weight {
        return depth - 1;
    }
    let mut max = depth;
    for &child in &tree.wrappers[idx].children {
        max = max.max(layer_height(tree, child, weight, depth + 1));
    }
    max
}

fn pad_weight(
    tree: &mut NormalizedTree,
    idx: usize,
    weight: i64,
    depth: i64,
    parent_depth: i64,
    cache: &mut HashMap<String, usize>,
) {
    let own_weight = tree.wrappers[idx].weight;
    if own_weight > weight {
        return;
    }
    if own_weight == weight {
        if let Some(parent) = tree.wrappers[idx].parent
            && tree.wrappers[parent].weight != weight
            && depth != parent_depth + 1
        {
            let key = format!("{}/{}", tree.wrappers[parent].id, weight);
            let tail = match cache.get(&key) {
                Some(&tail) => tail,
                None => {
                    let count = (parent_depth + 1 - depth) as usize;
                    let tail = build_chain(tree, idx, parent, weight, depth, count);
                    cache.insert(key, tail);
                    tail
                }
            };
            reattach(tree, idx, tail);
        }
        return;
    }

    let children = tree.wrappers[idx].children.clone();
    for child in children {
        pad_weight(tree, child, weight, depth + 1, parent_depth, cache);
    }
}

/// Grow a chain of `count` Hidden wrappers under `parent`, returning the
/// deepest one. Ids derive from the first node that needed the chain.
fn build_chain(
    tree: &mut NormalizedTree,
    for_idx: usize,
    parent: usize,
    weight: i64,
    depth: i64,
    count: usize,
) -> usize {
    let base_id = tree.wrappers[for_idx].id.clone();
    let mut tail = parent;
    for step in 0..count {
        tail = tree.push(Wrapper {
            id: format!("{base_id}_{}", depth + step as i64),
            kind: WrapperKind::Hidden,
            node_id: None,
            weight,
            parent: Some(tail),
            children: Vec::new(),
        });
    }
    tail
}

fn reattach(tree: &mut NormalizedTree, idx: usize, new_parent: usize) {
    if let Some(old_parent) = tree.wrappers[idx].parent {
        tree.wrappers[old_parent].children.retain(|&child| child != idx);
    }
    tree.wrappers[idx].parent = Some(new_parent);
    tree.wrappers[new_parent].children.push(idx);
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::app::config::demo_config;
    use crate::app::view_state::ViewState;
    use crate::topo::{GraphStore, LinkTagState, ROOT_ID, Weight};

    use super::super::normalize;
    use super::*;

    fn event_based(_tag: &str) -> LinkTagState {
        LinkTagState::EventBased
    }

    fn add(store: &mut GraphStore, id: &str, parent: &str, weight: i64) {
        store
            .add_node(
                id,
                &["infrastructure"],
                json!({"Name": id, "Type": "x"}),
                Weight::Fixed(weight),
            )
            .unwrap();
        store.set_parent(id, parent).unwrap();
    }

    #[test]
    fn equal_weight_nodes_share_a_depth() {
        let mut store = GraphStore::new(event_based);
        add(&mut store, "a", ROOT_ID, 1);
        add(&mut store, "b", "a", 3);
        add(&mut store, "c", ROOT_ID, 3);
        store.active_node_tag("infrastructure");

        let mut view = ViewState::new();
        view.set_expanded("a", true);
        let tree = normalize(&store, &mut view, &demo_config());

        let b = tree.node_wrapper["b"];
        let c = tree.node_wrapper["c"];
        assert_eq!(tree.depth(b), 2);
        assert_eq!(tree.depth(c), 2, "c must be padded down to b's depth");

        let pad = tree.wrappers[c].parent.unwrap();
        assert_eq!(tree.wrappers[pad].kind, WrapperKind::Hidden);
        assert_eq!(tree.wrappers[pad].id, "c_1");
        assert_eq!(tree.wrappers[pad].weight, 3);
    }

    #[test]
    fn siblings_share_one_padding_chain() {
        let mut store = GraphStore::new(event_based);
        add(&mut store, "a", ROOT_ID, 1);
        add(&mut store, "b", "a", 3);
        add(&mut store, "c", ROOT_ID, 3);
        add(&mut store, "d", ROOT_ID, 3);
        store.active_node_tag("infrastructure");

        let mut view = ViewState::new();
        view.set_expanded("a", true);
        let tree = normalize(&store, &mut view, &demo_config());

        let hidden = tree
            .wrappers
            .iter()
            .enumerate()
            .filter(|(_, wrapper)| wrapper.kind == WrapperKind::Hidden)
            .map(|(idx, _)| idx)
            .collect::<Vec<_>>();
        assert_eq!(hidden.len(), 1);

        let c = tree.node_wrapper["c"];
        let d = tree.node_wrapper["d"];
        assert_eq!(tree.wrappers[c].parent, tree.wrappers[d].parent);
        assert_eq!(tree.wrappers[c].parent, Some(hidden[0]));
    }

    #[test]
    fn aligned_nodes_get_no_padding() {
        let mut store = GraphStore::new(event_based);
        add(&mut store, "a", ROOT_ID, 1);
        add(&mut store, "b", ROOT_ID, 1);
        store.active_node_tag("infrastructure");

        let mut view = ViewState::new();
        let tree = normalize(&store, &mut view, &demo_config());
        assert!(
            tree.wrappers
                .iter()
                .all(|wrapper| wrapper.kind != WrapperKind::Hidden)
        );
    }

    #[test]
    fn multi_level_gap_builds_a_full_chain() {
        let mut store = GraphStore::new(event_based);
        add(&mut store, "a", ROOT_ID, 1);
        add(&mut store, "b", "a", 2);
        add(&mut store, "c", "b", 5);
        add(&mut store, "d", ROOT_ID, 5);
        store.active_node_tag("infrastructure");

        let mut view = ViewState::new();
        view.set_expanded("a", true);
        view.set_expanded("b", true);
        let tree = normalize(&store, &mut view, &demo_config());

        let c = tree.node_wrapper["c"];
        let d = tree.node_wrapper["d"];
        assert_eq!(tree.depth(c), 3);
        assert_eq!(tree.depth(d), 3);

        // d needs two Hidden wrappers between it and the root
        let mut cursor = tree.wrappers[d].parent;
        let mut hidden = 0;
        while let Some(idx) = cursor {
            if tree.wrappers[idx].kind == WrapperKind::Hidden {
                hidden += 1;
            }
            cursor = tree.wrappers[idx].parent;
        }
        assert_eq!(hidden, 2);
    }
}
