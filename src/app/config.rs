use std::cmp::Ordering;
use std::collections::HashMap;

use serde_json::Value;
use thiserror::Error;
use tracing::info;

use crate::topo::{Link, LinkTagPolicy, LinkTagState, Node, WeightFn};

/// Visual attributes resolved from a node payload on every render pass;
/// results are never cached across payload changes.
#[derive(Clone, Debug, Default)]
pub struct NodeAttrs {
    pub name: String,
    pub classes: Vec<String>,
    pub icon: String,
    pub badges: Vec<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LinkAttrs {
    pub classes: Vec<String>,
    pub directed: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MenuCommand {
    ToggleExpand,
    TogglePin,
    Callback(fn(&Node)),
}

#[derive(Clone, Debug)]
pub struct MenuEntry {
    pub label: String,
    pub disabled: bool,
    pub command: MenuCommand,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("group size must be at least 2, got {0}")]
    GroupSizeTooSmall(usize),
}

/// Caller-supplied policy: attribute resolvers, sibling comparator, grouping
/// rules, level titles, link-tag defaults and outbound callbacks. All
/// dispatch is through explicit function-typed fields validated at startup.
#[derive(Clone)]
pub struct TopologyConfig {
    pub node_attrs: fn(&Node) -> NodeAttrs,
    pub link_attrs: fn(&Link) -> LinkAttrs,
    pub compare_nodes: fn(&Node, &Node) -> Ordering,
    pub group_type: fn(&Node) -> Option<String>,
    pub group_name: fn(&Node) -> String,
    pub group_size: usize,
    pub node_menu: fn(&Node) -> Vec<MenuEntry>,
    pub weight_titles: HashMap<i64, String>,
    pub default_link_tag_state: LinkTagPolicy,
    pub default_node_tag: String,
    /// Weight for feed nodes that do not carry an explicit one.
    pub default_weight: WeightFn,
    pub on_node_selected: Option<fn(&Node, bool)>,
    pub on_link_selected: Option<fn(&Link, bool)>,
    pub on_node_clicked: Option<fn(&Node)>,
    pub on_node_double_clicked: Option<fn(&Node)>,
    pub on_link_tag_change: Option<fn(&HashMap<String, LinkTagState>)>,
}

impl TopologyConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.group_size < 2 {
            return Err(ConfigError::GroupSizeTooSmall(self.group_size));
        }
        Ok(())
    }

    pub fn weight_title(&self, weight: i64) -> String {
        self.weight_titles
            .get(&weight)
            .cloned()
            .unwrap_or_else(|| format!("Level {weight}"))
    }
}

fn payload_str<'a>(data: &'a Value, key: &str) -> &'a str {
    data.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn demo_node_attrs(node: &Node) -> NodeAttrs {
    let mut name = payload_str(&node.data, "Name").to_owned();
    if name.is_empty() {
        name = node.id.clone();
    }
    if name.len() > 24 {
        name.truncate(24);
        name.push('.');
    }

    let node_type = payload_str(&node.data, "Type");
    let mut classes = vec![node_type.to_owned()];
    let icon = match node_type {
        "host" | "libvirt" => "🖥",
        "switch" | "bridge" | "ovsbridge" | "vhost" => "🔀",
        "interface" | "tap" | "tun" | "veth" | "device" => "🔌",
        "netns" | "namespace" => "📦",
        "geneve" | "vxlan" | "gre" => "🚇",
        _ => "●",
    };

    let mut badges = Vec::new();
    if node.data.get("Captures").is_some() {
        badges.push("C".to_owned());
    }
    if payload_str(&node.data, "State") == "DOWN" {
        classes.push("down".to_owned());
        badges.push("!".to_owned());
    }

    NodeAttrs {
        name,
        classes,
        icon: icon.to_owned(),
        badges,
    }
}

fn demo_link_attrs(link: &Link) -> LinkAttrs {
    LinkAttrs {
        classes: vec![payload_str(&link.data, "RelationType").to_owned()],
        directed: link.data.get("Directed").and_then(Value::as_bool).unwrap_or(false),
    }
}

fn demo_compare_nodes(a: &Node, b: &Node) -> Ordering {
    let name = |node: &Node| payload_str(&node.data, "Name").to_owned();
    let state_rank = |node: &Node| match payload_str(&node.data, "State") {
        "DOWN" => 0,
        "running" | "UP" => 1,
        _ => 2,
    };
    state_rank(a)
        .cmp(&state_rank(b))
        .then_with(|| name(a).cmp(&name(b)))
        .then_with(|| a.id.cmp(&b.id))
}

fn demo_group_type(node: &Node) -> Option<String> {
    match payload_str(&node.data, "Type") {
        "" | "host" => None,
        other => Some(other.to_owned()),
    }
}

fn demo_group_name(node: &Node) -> String {
    format!("{}(s)", payload_str(&node.data, "Type"))
}

fn demo_node_menu(node: &Node) -> Vec<MenuEntry> {
    fn capture(node: &Node) {
        info!(node = node.id.as_str(), "capture requested");
    }
    fn flows(node: &Node) {
        info!(node = node.id.as_str(), "flow view requested");
    }

    vec![
        MenuEntry {
            label: "Expand/Collapse".to_owned(),
            disabled: node.children.is_empty(),
            command: MenuCommand::ToggleExpand,
        },
        MenuEntry {
            label: "Pin".to_owned(),
            disabled: false,
            command: MenuCommand::TogglePin,
        },
        MenuEntry {
            label: "Capture".to_owned(),
            disabled: false,
            command: MenuCommand::Callback(capture),
        },
        MenuEntry {
            label: "Flows".to_owned(),
            disabled: true,
            command: MenuCommand::Callback(flows),
        },
    ]
}

fn demo_link_tag_state(tag: &str) -> LinkTagState {
    match tag {
        "layer2" => LinkTagState::EventBased,
        "overlay" | "tunnel" => LinkTagState::Visible,
        _ => LinkTagState::EventBased,
    }
}

/// Weight used for feed nodes without an explicit one: classify by payload
/// type so physical, virtual and compute layers land on distinct levels.
pub fn demo_weight(node: &Node) -> i64 {
    match payload_str(&node.data, "Type") {
        "host" | "switch" | "interface" => 13,
        "bridge" | "ovsbridge" | "vhost" => 14,
        "port" | "ovsport" | "patch" => 15,
        "tap" | "tun" | "veth" | "device" => 17,
        "netns" | "namespace" => 18,
        "libvirt" => 19,
        _ => 0,
    }
}

pub fn demo_config() -> TopologyConfig {
    let weight_titles = [
        (0, "Not classified"),
        (13, "Physical"),
        (14, "Bridges"),
        (15, "Ports"),
        (17, "Virtual"),
        (18, "Namespaces"),
        (19, "VMs"),
    ]
    .into_iter()
    .map(|(weight, title)| (weight, title.to_owned()))
    .collect();

    TopologyConfig {
        node_attrs: demo_node_attrs,
        link_attrs: demo_link_attrs,
        compare_nodes: demo_compare_nodes,
        group_type: demo_group_type,
        group_name: demo_group_name,
        group_size: 4,
        node_menu: demo_node_menu,
        weight_titles,
        default_link_tag_state: demo_link_tag_state,
        default_node_tag: "infrastructure".to_owned(),
        default_weight: demo_weight,
        on_node_selected: None,
        on_link_selected: None,
        on_node_clicked: None,
        on_node_double_clicked: None,
        on_link_tag_change: None,
    }
}
