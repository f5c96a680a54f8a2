use serde_json::Value;
use tracing::debug;

use super::store::GraphStore;

/// A resolved path between two addressable endpoints. Hops may contain gaps
/// (e.g. a tap without an attached VM); consecutive present hops get a
/// highlight link, gaps are skipped without bridging.
#[derive(Clone, Debug, Default)]
pub struct TracedPath {
    pub hops: Vec<Option<String>>,
    pub tunnel: Option<Value>,
}

impl TracedPath {
    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }

    pub fn present_hops(&self) -> impl Iterator<Item = &String> {
        self.hops.iter().flatten()
    }
}

fn ipv4_matches(addresses: &Value, addr: &str) -> bool {
    addresses
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .any(|cidr| cidr.split('/').next() == Some(addr))
}

/// Resolve an IPv4 address to the tap-like node carrying it in its
/// `Neutron.IPV4` payload entry.
pub fn node_by_ipv4<'a>(store: &'a GraphStore, addr: &str) -> Option<&'a str> {
    store
        .nodes()
        .find(|node| ipv4_matches(&node.data["Neutron"]["IPV4"], addr))
        .map(|node| node.id.as_str())
}

/// First link neighbor of `id` whose payload `Type` equals `node_type`.
pub fn neighbor_by_type<'a>(
    store: &'a GraphStore,
    id: &str,
    node_type: &str,
) -> Option<&'a str> {
    for link in store.links() {
        let other = if link.source == id {
            &link.target
        } else if link.target == id {
            &link.source
        } else {
            continue;
        };
        if let Some(node) = store.node(other)
            && node.data["Type"].as_str() == Some(node_type)
        {
            return Some(node.id.as_str());
        }
    }
    None
}

/// Compute the node sequence between two IPv4 endpoints.
///
/// Both addresses resolve to tap nodes; each tap has a `vhost` neighbor and
/// possibly a `libvirt` VM neighbor. Taps sharing a vhost yield the short
/// local path. Otherwise the source vhost's `Tunnels` payload entries are
/// searched for one terminating at the destination vhost with a matching
/// prefix, yielding the host-to-host path annotated with that tunnel.
pub fn find_path(store: &GraphStore, src_addr: &str, dst_addr: &str) -> TracedPath {
    let mut path = TracedPath::default();

    let Some(src_tap) = node_by_ipv4(store, src_addr) else {
        return path;
    };
    let Some(dst_tap) = node_by_ipv4(store, dst_addr) else {
        return path;
    };
    let Some(src_vhost) = neighbor_by_type(store, src_tap, "vhost") else {
        return path;
    };
    let Some(dst_vhost) = neighbor_by_type(store, dst_tap, "vhost") else {
        return path;
    };

    let src_vm = neighbor_by_type(store, src_tap, "libvirt");
    let dst_vm = neighbor_by_type(store, dst_tap, "libvirt");

    let owned = |id: &str| Some(id.to_owned());

    if src_vhost == dst_vhost {
        path.hops = vec![
            src_vm.and_then(owned),
            owned(src_tap),
            owned(src_vhost),
            owned(dst_tap),
            dst_vm.and_then(owned),
        ];
        return path;
    }

    let (Some(src_vhost_node), Some(dst_vhost_node)) =
        (store.node(src_vhost), store.node(dst_vhost))
    else {
        return path;
    };

    let dst_ips = dst_vhost_node.data["IPV4"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .filter_map(|cidr| cidr.split('/').next())
        .map(str::to_owned)
        .collect::<Vec<_>>();

    let tunnel = src_vhost_node.data["Tunnels"]
        .as_array()
        .into_iter()
        .flatten()
        .find(|tunnel| {
            let dest_ip = tunnel["DestinationIP"].as_str().unwrap_or_default();
            let prefix = tunnel["Prefix"]
                .as_str()
                .and_then(|prefix| prefix.split('/').next())
                .unwrap_or_default();
            dst_ips.iter().any(|ip| ip == dest_ip) && prefix == dst_addr
        });

    let Some(tunnel) = tunnel else {
        debug!(src_addr, dst_addr, "no tunnel route between vhosts");
        return path;
    };

    let src_host = store.node(src_tap).and_then(|node| node.parent.clone());
    let dst_host = store.node(dst_tap).and_then(|node| node.parent.clone());

    path.tunnel = Some(tunnel.clone());
    path.hops = vec![
        src_vm.and_then(owned),
        owned(src_tap),
        owned(src_vhost),
        src_host,
        dst_host,
        owned(dst_vhost),
        owned(dst_tap),
        dst_vm.and_then(owned),
    ];
    path
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::topo::store::{LinkTagState, ROOT_ID, Weight};

    use super::*;

    fn event_based(_tag: &str) -> LinkTagState {
        LinkTagState::EventBased
    }

    fn tap(addr: &str) -> Value {
        json!({ "Type": "tap", "Neutron": { "IPV4": [format!("{addr}/24")] } })
    }

    fn local_vhost_topology() -> GraphStore {
        let mut store = GraphStore::new(event_based);
        store
            .add_node("host1", &[], json!({"Type": "host"}), Weight::Fixed(1))
            .unwrap();
        store.set_parent("host1", ROOT_ID).unwrap();

        store
            .add_node("vhost1", &[], json!({"Type": "vhost"}), Weight::Fixed(2))
            .unwrap();
        store
            .add_node("tapA", &[], tap("10.0.0.1"), Weight::Fixed(2))
            .unwrap();
        store
            .add_node("tapB", &[], tap("10.0.0.2"), Weight::Fixed(2))
            .unwrap();
        store
            .add_node("vmA", &[], json!({"Type": "libvirt"}), Weight::Fixed(3))
            .unwrap();
        store
            .add_node("vmB", &[], json!({"Type": "libvirt"}), Weight::Fixed(3))
            .unwrap();
        for id in ["vhost1", "tapA", "tapB", "vmA", "vmB"] {
            store.set_parent(id, "host1").unwrap();
        }

        store
            .add_link("la", "tapA", "vhost1", &["layer2"], json!({}))
            .unwrap();
        store
            .add_link("lb", "tapB", "vhost1", &["layer2"], json!({}))
            .unwrap();
        store
            .add_link("va", "tapA", "vmA", &["layer2"], json!({}))
            .unwrap();
        store
            .add_link("vb", "tapB", "vmB", &["layer2"], json!({}))
            .unwrap();
        store
    }

    #[test]
    fn taps_behind_the_same_vhost_yield_the_local_path() {
        let store = local_vhost_topology();
        let path = find_path(&store, "10.0.0.1", "10.0.0.2");

        let hops = path
            .hops
            .iter()
            .map(|hop| hop.as_deref().unwrap_or("-"))
            .collect::<Vec<_>>();
        assert_eq!(hops, vec!["vmA", "tapA", "vhost1", "tapB", "vmB"]);
        assert!(path.tunnel.is_none());
    }

    #[test]
    fn unknown_address_yields_an_empty_path() {
        let store = local_vhost_topology();
        assert!(find_path(&store, "10.0.0.1", "9.9.9.9").is_empty());
        assert!(find_path(&store, "9.9.9.9", "10.0.0.2").is_empty());
    }

    #[test]
    fn missing_vm_leaves_a_gap_hop() {
        let mut store = local_vhost_topology();
        store.del_node("vmA");

        let path = find_path(&store, "10.0.0.1", "10.0.0.2");
        assert_eq!(path.hops.len(), 5);
        assert!(path.hops[0].is_none());
        assert_eq!(path.hops[1].as_deref(), Some("tapA"));
    }

    #[test]
    fn routed_path_goes_through_the_matching_tunnel() {
        let mut store = GraphStore::new(event_based);
        for (host, vhost, tap_id, addr, vhost_data) in [
            (
                "host1",
                "vhost1",
                "tapA",
                "10.0.0.1",
                json!({
                    "Type": "vhost",
                    "Tunnels": [
                        { "DestinationIP": "192.168.0.2", "Prefix": "10.0.0.2/32", "Type": "vxlan" },
                    ],
                }),
            ),
            (
                "host2",
                "vhost2",
                "tapB",
                "10.0.0.2",
                json!({ "Type": "vhost", "IPV4": ["192.168.0.2/24"] }),
            ),
        ] {
            store
                .add_node(host, &[], json!({"Type": "host"}), Weight::Fixed(1))
                .unwrap();
            store.set_parent(host, ROOT_ID).unwrap();
            store.add_node(vhost, &[], vhost_data, Weight::Fixed(2)).unwrap();
            store.set_parent(vhost, host).unwrap();
            store.add_node(tap_id, &[], tap(addr), Weight::Fixed(2)).unwrap();
            store.set_parent(tap_id, host).unwrap();
            store
                .add_link(&format!("{tap_id}-link"), tap_id, vhost, &["layer2"], json!({}))
                .unwrap();
        }

        let path = find_path(&store, "10.0.0.1", "10.0.0.2");
        let hops = path
            .hops
            .iter()
            .map(|hop| hop.as_deref().unwrap_or("-"))
            .collect::<Vec<_>>();
        assert_eq!(
            hops,
            vec!["-", "tapA", "vhost1", "host1", "host2", "vhost2", "tapB", "-"]
        );
        assert_eq!(path.tunnel.as_ref().unwrap()["Type"], json!("vxlan"));
    }
}
