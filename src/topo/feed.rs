use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::warn;

use super::store::{GraphStore, ROOT_ID, Weight, WeightFn};

/// On-disk topology description. Mutations still flow through the store API
/// one by one, the file is only a convenience producer for them.
#[derive(Clone, Debug, Deserialize)]
pub struct TopologyFile {
    #[serde(default)]
    pub nodes: Vec<FeedNode>,
    #[serde(default)]
    pub links: Vec<FeedLink>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct FeedNode {
    pub id: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub weight: Option<i64>,
    #[serde(default)]
    pub data: Value,
}

#[derive(Clone, Debug, Deserialize)]
pub struct FeedLink {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub data: Value,
}

pub fn load_topology_file(path: &Path) -> Result<TopologyFile> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read topology file {}", path.display()))?;
    let file: TopologyFile = serde_json::from_str(&raw)
        .with_context(|| format!("invalid topology JSON in {}", path.display()))?;

    if file.nodes.is_empty() {
        return Err(anyhow!("topology file {} contains no nodes", path.display()));
    }
    Ok(file)
}

/// Replay a topology file into the store. Nodes without an explicit weight
/// get the dynamic default so their level follows the payload. Entries that
/// reference unknown ids are skipped with a warning rather than aborting the
/// whole feed.
pub fn apply_topology(
    store: &mut GraphStore,
    file: &TopologyFile,
    default_weight: WeightFn,
) -> (usize, usize) {
    let mut nodes_applied = 0;
    for node in &file.nodes {
        let tags = node.tags.iter().map(String::as_str).collect::<Vec<_>>();
        let weight = match node.weight {
            Some(weight) => Weight::Fixed(weight),
            None => Weight::Dynamic(default_weight),
        };
        match store.add_node(&node.id, &tags, node.data.clone(), weight) {
            Ok(()) => nodes_applied += 1,
            Err(error) => warn!(node = node.id.as_str(), %error, "skipping feed node"),
        }
    }

    for node in &file.nodes {
        let parent = node.parent.as_deref().unwrap_or(ROOT_ID);
        if let Err(error) = store.set_parent(&node.id, parent) {
            warn!(node = node.id.as_str(), parent, %error, "skipping feed parent");
        }
    }

    let mut links_applied = 0;
    for link in &file.links {
        let tags = link.tags.iter().map(String::as_str).collect::<Vec<_>>();
        match store.add_link(&link.id, &link.source, &link.target, &tags, link.data.clone()) {
            Ok(()) => links_applied += 1,
            Err(error) => warn!(link = link.id.as_str(), %error, "skipping feed link"),
        }
    }

    (nodes_applied, links_applied)
}

/// Built-in two-host topology used when no file is given: enough taps per
/// vhost to exercise grouping, plus a vxlan tunnel between the vhosts so IP
/// path tracing has a routed case.
pub fn demo_topology() -> TopologyFile {
    let mut nodes = Vec::new();
    let mut links = Vec::new();

    let infra = vec!["infrastructure".to_owned()];

    for (host_index, host) in ["host1", "host2"].iter().enumerate() {
        let peer_net = if host_index == 0 { 2 } else { 1 };
        let own_net = host_index + 1;

        nodes.push(FeedNode {
            id: (*host).to_owned(),
            parent: None,
            tags: infra.clone(),
            weight: None,
            data: json!({ "Name": host, "Type": "host" }),
        });

        let vhost = format!("vhost{own_net}");
        nodes.push(FeedNode {
            id: vhost.clone(),
            parent: Some((*host).to_owned()),
            tags: infra.clone(),
            weight: None,
            data: json!({
                "Name": vhost,
                "Type": "vhost",
                "IPV4": [format!("192.168.0.{own_net}/24")],
                "Tunnels": [{
                    "Type": "vxlan",
                    "DestinationIP": format!("192.168.0.{peer_net}"),
                    "Prefix": format!("10.0.{peer_net}.1/32"),
                }],
            }),
        });

        nodes.push(FeedNode {
            id: format!("eth0-{host}"),
            parent: Some((*host).to_owned()),
            tags: infra.clone(),
            weight: None,
            data: json!({ "Name": "eth0", "Type": "interface", "MTU": 1500 }),
        });
        links.push(FeedLink {
            id: format!("uplink-{host}"),
            source: format!("eth0-{host}"),
            target: vhost.clone(),
            tags: vec!["layer2".to_owned()],
            data: json!({}),
        });

        // six taps per host so the default group size of four overflows
        for tap_index in 1..=6 {
            let tap = format!("tap{own_net}-{tap_index}");
            nodes.push(FeedNode {
                id: tap.clone(),
                parent: Some((*host).to_owned()),
                tags: infra.clone(),
                weight: None,
                data: json!({
                    "Name": tap,
                    "Type": "tap",
                    "Neutron": { "IPV4": [format!("10.0.{own_net}.{tap_index}/24")] },
                }),
            });
            links.push(FeedLink {
                id: format!("{tap}-vhost"),
                source: tap.clone(),
                target: vhost.clone(),
                tags: vec!["layer2".to_owned()],
                data: json!({}),
            });

            if tap_index <= 2 {
                let vm = format!("vm{own_net}-{tap_index}");
                nodes.push(FeedNode {
                    id: vm.clone(),
                    parent: Some((*host).to_owned()),
                    tags: vec!["compute".to_owned()],
                    weight: None,
                    data: json!({ "Name": vm, "Type": "libvirt", "State": "running" }),
                });
                links.push(FeedLink {
                    id: format!("{tap}-vm"),
                    source: tap.clone(),
                    target: vm,
                    tags: vec!["layer2".to_owned()],
                    data: json!({}),
                });
            }
        }

        let netns = format!("netns{own_net}");
        nodes.push(FeedNode {
            id: netns.clone(),
            parent: Some((*host).to_owned()),
            tags: vec!["compute".to_owned()],
            weight: None,
            data: json!({ "Name": netns, "Type": "netns" }),
        });
    }

    links.push(FeedLink {
        id: "vhost-peering".to_owned(),
        source: "vhost1".to_owned(),
        target: "vhost2".to_owned(),
        tags: vec!["overlay".to_owned()],
        data: json!({ "Type": "vxlan" }),
    });

    TopologyFile { nodes, links }
}

#[cfg(test)]
mod tests {
    use crate::topo::store::LinkTagState;

    use super::*;

    fn event_based(_tag: &str) -> LinkTagState {
        LinkTagState::EventBased
    }

    fn weight_one(_node: &crate::topo::store::Node) -> i64 {
        1
    }

    #[test]
    fn demo_topology_replays_cleanly() {
        let mut store = GraphStore::new(event_based);
        let file = demo_topology();
        let (nodes, links) = apply_topology(&mut store, &file, weight_one);

        assert_eq!(nodes, file.nodes.len());
        assert_eq!(links, file.links.len());
        assert_eq!(store.node("vhost1").unwrap().parent.as_deref(), Some("host1"));
        assert_eq!(store.node("host1").unwrap().parent.as_deref(), Some(ROOT_ID));
    }

    #[test]
    fn feed_skips_broken_entries_without_aborting() {
        let mut store = GraphStore::new(event_based);
        let file = TopologyFile {
            nodes: vec![
                FeedNode {
                    id: "a".to_owned(),
                    parent: None,
                    tags: vec![],
                    weight: Some(1),
                    data: json!({}),
                },
                FeedNode {
                    id: "a".to_owned(),
                    parent: None,
                    tags: vec![],
                    weight: Some(1),
                    data: json!({}),
                },
            ],
            links: vec![FeedLink {
                id: "broken".to_owned(),
                source: "a".to_owned(),
                target: "missing".to_owned(),
                tags: vec![],
                data: json!({}),
            }],
        };

        let (nodes, links) = apply_topology(&mut store, &file, weight_one);
        assert_eq!(nodes, 1);
        assert_eq!(links, 0);
    }
}
