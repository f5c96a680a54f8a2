use std::collections::HashMap;

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

pub const ROOT_ID: &str = "root";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkTagState {
    Hidden,
    EventBased,
    Visible,
}

pub type WeightFn = fn(&Node) -> i64;
pub type LinkTagPolicy = fn(&str) -> LinkTagState;

/// Node weight: either fixed at creation or derived from the node payload on
/// every read, so a payload update can move the node to another level.
#[derive(Clone, Copy)]
pub enum Weight {
    Fixed(i64),
    Dynamic(WeightFn),
}

#[derive(Clone)]
pub struct Node {
    pub id: String,
    pub tags: Vec<String>,
    pub data: Value,
    pub weight: Weight,
    pub parent: Option<String>,
    pub children: Vec<String>,
    pub revision: u64,
    pub highlighted: bool,
    pub sort_first: bool,
}

impl Node {
    fn new(id: String, tags: Vec<String>, data: Value, weight: Weight) -> Self {
        Self {
            id,
            tags,
            data,
            weight,
            parent: None,
            children: Vec::new(),
            revision: 0,
            highlighted: false,
            sort_first: false,
        }
    }

    fn own_weight(&self) -> i64 {
        match self.weight {
            Weight::Fixed(weight) => weight,
            Weight::Dynamic(weight_fn) => weight_fn(self),
        }
    }
}

#[derive(Clone)]
pub struct Link {
    pub id: String,
    pub tags: Vec<String>,
    pub source: String,
    pub target: String,
    pub data: Value,
    pub revision: u64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("entity {0:?} already exists")]
    DuplicateEntity(String),
    #[error("entity {0:?} does not exist")]
    UnknownEntity(String),
    #[error("reparenting {child:?} under {parent:?} would create a cycle")]
    CyclicReparent { child: String, parent: String },
}

/// In-memory topology graph: a parent/child tree of nodes rooted at a
/// synthetic root, plus an overlay graph of links that never affects tree
/// shape. All references are string ids resolved through the store; entities
/// never hold pointers into each other.
pub struct GraphStore {
    nodes: HashMap<String, Node>,
    links: HashMap<String, Link>,
    node_tag_states: HashMap<String, bool>,
    node_tag_counts: HashMap<String, usize>,
    link_tag_states: HashMap<String, LinkTagState>,
    link_tag_counts: HashMap<String, usize>,
    default_link_tag_state: LinkTagPolicy,
    weights: Vec<i64>,
    generation: u64,
    link_epoch: u64,
    data_epoch: u64,
}

impl GraphStore {
    pub fn new(default_link_tag_state: LinkTagPolicy) -> Self {
        let mut store = Self {
            nodes: HashMap::new(),
            links: HashMap::new(),
            node_tag_states: HashMap::new(),
            node_tag_counts: HashMap::new(),
            link_tag_states: HashMap::new(),
            link_tag_counts: HashMap::new(),
            default_link_tag_state,
            weights: Vec::new(),
            generation: 0,
            link_epoch: 0,
            data_epoch: 0,
        };

        let root = Node::new(
            ROOT_ID.to_owned(),
            vec![ROOT_ID.to_owned()],
            serde_json::json!({ "Name": "root", "Type": "root" }),
            Weight::Fixed(0),
        );
        store.nodes.insert(root.id.clone(), root);
        store.register_weight(0);
        store
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.default_link_tag_state);
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn link(&self, id: &str) -> Option<&Link> {
        self.links.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Distinct effective weights seen so far, ascending.
    pub fn weights(&self) -> &[i64] {
        &self.weights
    }

    /// Bumped on every mutation that can change tree shape or leveling.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Bumped on every mutation that can change link visibility.
    pub fn link_epoch(&self) -> u64 {
        self.link_epoch
    }

    /// Bumped on every payload update, including ones that leave the weight
    /// class and therefore the generation untouched.
    pub fn data_epoch(&self) -> u64 {
        self.data_epoch
    }

    pub fn node_tag_states(&self) -> &HashMap<String, bool> {
        &self.node_tag_states
    }

    pub fn link_tag_states(&self) -> &HashMap<String, LinkTagState> {
        &self.link_tag_states
    }

    pub fn link_tag_state(&self, tag: &str) -> LinkTagState {
        self.link_tag_states
            .get(tag)
            .copied()
            .unwrap_or(LinkTagState::Hidden)
    }

    #[cfg(test)]
    pub(crate) fn node_tag_count(&self, tag: &str) -> usize {
        self.node_tag_counts.get(tag).copied().unwrap_or(0)
    }

    #[cfg(test)]
    pub(crate) fn link_tag_count(&self, tag: &str) -> usize {
        self.link_tag_counts.get(tag).copied().unwrap_or(0)
    }

    /// Effective weight: a node never weighs less than its parent, enforced
    /// at read time by clamping along the parent chain.
    pub fn effective_weight(&self, id: &str) -> i64 {
        let mut chain = Vec::new();
        let mut cursor = self.nodes.get(id);
        while let Some(node) = cursor {
            chain.push(node);
            cursor = node.parent.as_deref().and_then(|pid| self.nodes.get(pid));
        }

        let mut weight = 0;
        for node in chain.into_iter().rev() {
            weight = node.own_weight().max(weight);
        }
        weight
    }

    fn register_weight(&mut self, weight: i64) {
        if let Err(position) = self.weights.binary_search(&weight) {
            self.weights.insert(position, weight);
        }
    }

    fn invalidate(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.link_epoch = self.link_epoch.wrapping_add(1);
    }

    fn invalidate_links(&mut self) {
        self.link_epoch = self.link_epoch.wrapping_add(1);
    }

    pub fn add_node(
        &mut self,
        id: &str,
        tags: &[&str],
        data: Value,
        weight: Weight,
    ) -> Result<(), StoreError> {
        if self.nodes.contains_key(id) {
            return Err(StoreError::DuplicateEntity(id.to_owned()));
        }

        let node = Node::new(
            id.to_owned(),
            tags.iter().map(|tag| (*tag).to_owned()).collect(),
            data,
            weight,
        );

        for tag in &node.tags {
            *self.node_tag_counts.entry(tag.clone()).or_insert(0) += 1;
            self.node_tag_states.entry(tag.clone()).or_insert(false);
        }

        self.nodes.insert(node.id.clone(), node);
        self.register_weight(self.effective_weight(id));
        self.invalidate();
        Ok(())
    }

    pub fn update_node(&mut self, id: &str, data: Value) -> bool {
        let prev_weight = self.effective_weight(id);
        let Some(node) = self.nodes.get_mut(id) else {
            return false;
        };
        node.data = data;
        node.revision += 1;
        self.data_epoch += 1;

        // a payload change can move the node to another level
        let next_weight = self.effective_weight(id);
        if next_weight != prev_weight {
            self.register_weight(next_weight);
            self.invalidate();
        }
        true
    }

    pub fn del_node(&mut self, id: &str) -> bool {
        if id == ROOT_ID {
            return false;
        }
        let Some(node) = self.nodes.remove(id) else {
            return false;
        };

        if let Some(parent_id) = &node.parent
            && let Some(parent) = self.nodes.get_mut(parent_id)
        {
            parent.children.retain(|child| child != id);
        }

        let dangling = self
            .links
            .values()
            .filter(|link| link.source == id || link.target == id)
            .map(|link| link.id.clone())
            .collect::<Vec<_>>();
        for link_id in dangling {
            self.del_link(&link_id);
        }

        for tag in &node.tags {
            self.release_node_tag(tag);
        }

        debug!(node = id, "removed node");
        self.invalidate();
        true
    }

    fn release_node_tag(&mut self, tag: &str) {
        if let Some(count) = self.node_tag_counts.get_mut(tag) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.node_tag_counts.remove(tag);
                self.node_tag_states.remove(tag);
            }
        }
    }

    pub fn set_parent(&mut self, child_id: &str, parent_id: &str) -> Result<(), StoreError> {
        if !self.nodes.contains_key(child_id) {
            return Err(StoreError::UnknownEntity(child_id.to_owned()));
        }
        if !self.nodes.contains_key(parent_id) {
            return Err(StoreError::UnknownEntity(parent_id.to_owned()));
        }

        // walking up from the new parent must never reach the child
        let mut cursor = Some(parent_id.to_owned());
        while let Some(id) = cursor {
            if id == child_id {
                return Err(StoreError::CyclicReparent {
                    child: child_id.to_owned(),
                    parent: parent_id.to_owned(),
                });
            }
            cursor = self.nodes.get(&id).and_then(|node| node.parent.clone());
        }

        let prev_parent = self
            .nodes
            .get(child_id)
            .and_then(|child| child.parent.clone());
        if let Some(prev_id) = prev_parent
            && let Some(prev) = self.nodes.get_mut(&prev_id)
        {
            prev.children.retain(|id| id != child_id);
        }

        if let Some(parent) = self.nodes.get_mut(parent_id) {
            parent.children.push(child_id.to_owned());
        }
        if let Some(child) = self.nodes.get_mut(child_id) {
            child.parent = Some(parent_id.to_owned());
        }

        self.register_weight(self.effective_weight(child_id));
        self.invalidate();
        Ok(())
    }

    pub fn add_link(
        &mut self,
        id: &str,
        source: &str,
        target: &str,
        tags: &[&str],
        data: Value,
    ) -> Result<(), StoreError> {
        if self.links.contains_key(id) {
            return Err(StoreError::DuplicateEntity(id.to_owned()));
        }
        if !self.nodes.contains_key(source) {
            return Err(StoreError::UnknownEntity(source.to_owned()));
        }
        if !self.nodes.contains_key(target) {
            return Err(StoreError::UnknownEntity(target.to_owned()));
        }

        let link = Link {
            id: id.to_owned(),
            tags: tags.iter().map(|tag| (*tag).to_owned()).collect(),
            source: source.to_owned(),
            target: target.to_owned(),
            data,
            revision: 0,
        };

        for tag in &link.tags {
            *self.link_tag_counts.entry(tag.clone()).or_insert(0) += 1;
            if !self.link_tag_states.contains_key(tag) {
                let state = (self.default_link_tag_state)(tag);
                self.link_tag_states.insert(tag.clone(), state);
            }
        }

        self.links.insert(link.id.clone(), link);
        self.invalidate_links();
        Ok(())
    }

    pub fn update_link(&mut self, id: &str, data: Value) -> bool {
        let Some(link) = self.links.get_mut(id) else {
            return false;
        };
        link.data = data;
        link.revision += 1;
        self.invalidate_links();
        true
    }

    pub fn del_link(&mut self, id: &str) -> bool {
        let Some(link) = self.links.remove(id) else {
            return false;
        };

        for tag in &link.tags {
            if let Some(count) = self.link_tag_counts.get_mut(tag) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    self.link_tag_counts.remove(tag);
                    self.link_tag_states.remove(tag);
                }
            }
        }

        self.invalidate_links();
        true
    }

    pub fn show_node_tag(&mut self, tag: &str, active: bool) {
        self.node_tag_states.insert(tag.to_owned(), active);
        self.invalidate();
    }

    /// Radio semantics: activating a tag deactivates every other one.
    pub fn active_node_tag(&mut self, tag: &str) {
        for state in self.node_tag_states.values_mut() {
            *state = false;
        }
        self.node_tag_states.insert(tag.to_owned(), true);
        self.invalidate();
    }

    pub fn set_link_tag_state(&mut self, tag: &str, state: LinkTagState) {
        self.link_tag_states.insert(tag.to_owned(), state);
        self.invalidate_links();
    }

    pub fn set_highlighted(&mut self, id: &str, highlighted: bool) -> bool {
        let Some(node) = self.nodes.get_mut(id) else {
            return false;
        };
        if node.highlighted != highlighted {
            node.highlighted = highlighted;
            // sort_first fronts the node in its sibling group
            node.sort_first = highlighted;
            self.invalidate();
        }
        true
    }

    /// Deep payload match: true when every requested value appears somewhere
    /// in the node payload.
    pub fn search_nodes(&self, values: &[Value]) -> Vec<&Node> {
        if values.is_empty() {
            return Vec::new();
        }

        self.nodes
            .values()
            .filter(|node| node.id != ROOT_ID)
            .filter(|node| {
                values
                    .iter()
                    .all(|value| payload_contains(&node.data, value))
            })
            .collect()
    }
}

fn payload_contains(data: &Value, expected: &Value) -> bool {
    match data {
        Value::Object(map) => map.values().any(|value| payload_contains(value, expected)),
        Value::Array(items) => items.iter().any(|value| payload_contains(value, expected)),
        leaf => leaf == expected,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn event_based(_tag: &str) -> LinkTagState {
        LinkTagState::EventBased
    }

    fn store_with_chain() -> GraphStore {
        let mut store = GraphStore::new(event_based);
        store
            .add_node("host", &["infrastructure"], json!({"Name": "host"}), Weight::Fixed(1))
            .unwrap();
        store
            .add_node("eth0", &["infrastructure"], json!({"Name": "eth0"}), Weight::Fixed(1))
            .unwrap();
        store.set_parent("host", ROOT_ID).unwrap();
        store.set_parent("eth0", "host").unwrap();
        store
    }

    #[test]
    fn duplicate_node_is_rejected() {
        let mut store = store_with_chain();
        let err = store
            .add_node("host", &[], json!({}), Weight::Fixed(1))
            .unwrap_err();
        assert_eq!(err, StoreError::DuplicateEntity("host".to_owned()));
    }

    #[test]
    fn unknown_ids_are_noops() {
        let mut store = store_with_chain();
        assert!(!store.update_node("missing", json!({})));
        assert!(!store.del_node("missing"));
        assert!(!store.update_link("missing", json!({})));
        assert!(!store.del_link("missing"));
    }

    #[test]
    fn tree_shape_holds_after_reparenting() {
        let mut store = store_with_chain();
        store
            .add_node("host2", &["infrastructure"], json!({}), Weight::Fixed(1))
            .unwrap();
        store.set_parent("host2", ROOT_ID).unwrap();
        store.set_parent("eth0", "host2").unwrap();

        assert_eq!(store.node("eth0").unwrap().parent.as_deref(), Some("host2"));
        assert!(store.node("host").unwrap().children.is_empty());
        assert_eq!(store.node("host2").unwrap().children, vec!["eth0"]);

        for node in store.nodes() {
            if node.id == ROOT_ID {
                assert!(node.parent.is_none());
            } else {
                assert!(node.parent.is_some(), "{} must have a parent", node.id);
            }
        }
    }

    #[test]
    fn cyclic_reparent_is_rejected() {
        let mut store = store_with_chain();
        let err = store.set_parent("host", "eth0").unwrap_err();
        assert_eq!(
            err,
            StoreError::CyclicReparent {
                child: "host".to_owned(),
                parent: "eth0".to_owned(),
            }
        );
        assert_eq!(
            store.set_parent("host", "host").unwrap_err(),
            StoreError::CyclicReparent {
                child: "host".to_owned(),
                parent: "host".to_owned(),
            }
        );

        // the failed call must not have detached the child
        assert_eq!(store.node("host").unwrap().parent.as_deref(), Some(ROOT_ID));
    }

    #[test]
    fn payload_update_bumps_the_data_epoch() {
        let mut store = store_with_chain();
        let generation = store.generation();
        let epoch = store.data_epoch();

        assert!(store.update_node("eth0", json!({"Name": "eth0", "State": "down"})));
        assert_eq!(store.generation(), generation, "weight class did not move");
        assert!(store.data_epoch() > epoch);
    }

    #[test]
    fn effective_weight_is_clamped_to_parent() {
        let mut store = GraphStore::new(event_based);
        store
            .add_node("heavy", &[], json!({}), Weight::Fixed(5))
            .unwrap();
        store
            .add_node("light", &[], json!({}), Weight::Fixed(1))
            .unwrap();
        store.set_parent("heavy", ROOT_ID).unwrap();
        store.set_parent("light", "heavy").unwrap();

        assert_eq!(store.effective_weight("heavy"), 5);
        assert_eq!(store.effective_weight("light"), 5);
    }

    #[test]
    fn del_node_cascades_to_links_and_tags() {
        let mut store = store_with_chain();
        store
            .add_node("tap0", &["virtual"], json!({}), Weight::Fixed(2))
            .unwrap();
        store.set_parent("tap0", "host").unwrap();
        store
            .add_link("l2", "eth0", "tap0", &["layer2"], json!({}))
            .unwrap();

        assert_eq!(store.node_tag_count("virtual"), 1);
        assert_eq!(store.link_tag_count("layer2"), 1);

        assert!(store.del_node("tap0"));
        assert!(store.link("l2").is_none());
        assert_eq!(store.node_tag_count("virtual"), 0);
        assert!(!store.node_tag_states().contains_key("virtual"));
        assert_eq!(store.link_tag_count("layer2"), 0);
        assert!(!store.link_tag_states().contains_key("layer2"));
        assert!(!store.node("host").unwrap().children.contains(&"tap0".to_owned()));
    }

    #[test]
    fn tag_counts_track_live_entities() {
        let mut store = GraphStore::new(event_based);
        store
            .add_node("a", &["infrastructure"], json!({}), Weight::Fixed(1))
            .unwrap();
        store
            .add_node("b", &["infrastructure"], json!({}), Weight::Fixed(1))
            .unwrap();
        assert_eq!(store.node_tag_count("infrastructure"), 2);

        store.del_node("a");
        assert_eq!(store.node_tag_count("infrastructure"), 1);
        assert!(store.node_tag_states().contains_key("infrastructure"));

        store.del_node("b");
        assert_eq!(store.node_tag_count("infrastructure"), 0);
        assert!(!store.node_tag_states().contains_key("infrastructure"));
    }

    #[test]
    fn active_node_tag_is_exclusive() {
        let mut store = GraphStore::new(event_based);
        store
            .add_node("a", &["infrastructure"], json!({}), Weight::Fixed(1))
            .unwrap();
        store
            .add_node("b", &["kubernetes"], json!({}), Weight::Fixed(1))
            .unwrap();

        store.active_node_tag("infrastructure");
        store.active_node_tag("kubernetes");

        let active = store
            .node_tag_states()
            .iter()
            .filter(|(_, on)| **on)
            .map(|(tag, _)| tag.clone())
            .collect::<Vec<_>>();
        assert_eq!(active, vec!["kubernetes".to_owned()]);
    }

    #[test]
    fn link_tags_take_the_default_policy_state() {
        fn policy(tag: &str) -> LinkTagState {
            if tag == "layer2" {
                LinkTagState::Visible
            } else {
                LinkTagState::EventBased
            }
        }

        let mut store = GraphStore::new(policy);
        store.add_node("a", &[], json!({}), Weight::Fixed(1)).unwrap();
        store.add_node("b", &[], json!({}), Weight::Fixed(1)).unwrap();
        store
            .add_link("l", "a", "b", &["layer2", "overlay"], json!({}))
            .unwrap();

        assert_eq!(store.link_tag_state("layer2"), LinkTagState::Visible);
        assert_eq!(store.link_tag_state("overlay"), LinkTagState::EventBased);
    }

    #[test]
    fn dynamic_weight_follows_payload_updates() {
        fn by_payload(node: &Node) -> i64 {
            node.data.get("Weight").and_then(Value::as_i64).unwrap_or(0)
        }

        let mut store = GraphStore::new(event_based);
        store
            .add_node("n", &[], json!({"Weight": 1}), Weight::Dynamic(by_payload))
            .unwrap();
        store.set_parent("n", ROOT_ID).unwrap();
        assert_eq!(store.effective_weight("n"), 1);

        let generation = store.generation();
        assert!(store.update_node("n", json!({"Weight": 3})));
        assert_eq!(store.effective_weight("n"), 3);
        assert!(store.weights().contains(&3));
        assert_ne!(store.generation(), generation);
    }

    #[test]
    fn search_matches_nested_payload_values() {
        let mut store = GraphStore::new(event_based);
        store
            .add_node(
                "tap",
                &[],
                json!({"Neutron": {"IPV4": ["10.0.0.1/24"]}, "Type": "tap"}),
                Weight::Fixed(1),
            )
            .unwrap();

        let hits = store.search_nodes(&[json!("tap"), json!("10.0.0.1/24")]);
        assert_eq!(hits.len(), 1);
        assert!(store.search_nodes(&[json!("absent")]).is_empty());
    }
}
