use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use crate::topo::{LinkTagState, ROOT_ID, apply_topology, find_path};

use super::config::MenuCommand;
use super::view_state::ViewState;
use super::{PendingClick, ViewModel};

/// Single clicks wait this long for a possible double click, well under the
/// transition length so selection still feels immediate.
pub(in crate::app) const CLICK_DEBOUNCE_SECS: f64 = 0.17;

impl ViewModel {
    pub(in crate::app) fn select_node(&mut self, id: &str, additive: bool) {
        if additive {
            let selected = !self.view.is_node_selected(id);
            self.view.select_node(id, selected);
            if let Some(callback) = self.config.on_node_selected
                && let Some(node) = self.store.node(id)
            {
                callback(node, selected);
            }
            return;
        }

        let (nodes, links) = self.view.clear_selection();
        if let Some(callback) = self.config.on_node_selected {
            for cleared in nodes.iter().filter(|cleared| *cleared != id) {
                if let Some(node) = self.store.node(cleared) {
                    callback(node, false);
                }
            }
        }
        if let Some(callback) = self.config.on_link_selected {
            for cleared in &links {
                if let Some(link) = self.store.link(cleared) {
                    callback(link, false);
                }
            }
        }

        self.view.select_node(id, true);
        if let Some(callback) = self.config.on_node_selected
            && let Some(node) = self.store.node(id)
        {
            callback(node, true);
        }
    }

    pub(in crate::app) fn select_link(&mut self, id: &str, additive: bool) {
        let selected = if additive {
            !self.view.is_link_selected(id)
        } else {
            self.unselect_all();
            true
        };
        self.view.select_link(id, selected);
        if let Some(callback) = self.config.on_link_selected
            && let Some(link) = self.store.link(id)
        {
            callback(link, selected);
        }
    }

    pub(in crate::app) fn unselect_all(&mut self) {
        let (nodes, links) = self.view.clear_selection();
        if let Some(callback) = self.config.on_node_selected {
            for cleared in &nodes {
                if let Some(node) = self.store.node(cleared) {
                    callback(node, false);
                }
            }
        }
        if let Some(callback) = self.config.on_link_selected {
            for cleared in &links {
                if let Some(link) = self.store.link(cleared) {
                    callback(link, false);
                }
            }
        }
    }

    pub(in crate::app) fn toggle_expand(&mut self, id: &str) {
        if self.view.is_expanded(id) {
            self.view.collapse_recursive(&self.store, id);
        } else {
            self.view.set_expanded(id, true);
        }
    }

    pub(in crate::app) fn set_pinned(&mut self, id: &str, pinned: bool) {
        self.view.set_pinned(id, pinned);
        self.follow = pinned.then(|| id.to_owned());
    }

    pub(in crate::app) fn unpin_all(&mut self) {
        self.view.unpin_all();
        self.follow = None;
    }

    /// Make a node reachable on screen: expand its ancestor chain and, when
    /// it sits in a sibling group, expand that group. Paging is handled by
    /// the node's `sort_first` flag fronting it past the offset window.
    pub(in crate::app) fn show_node(&mut self, id: &str) {
        let mut ancestors = Vec::new();
        let mut cursor = self.store.node(id).and_then(|node| node.parent.clone());
        while let Some(parent_id) = cursor {
            cursor = self
                .store
                .node(&parent_id)
                .and_then(|node| node.parent.clone());
            if parent_id != ROOT_ID {
                ancestors.push(parent_id);
            }
        }
        for ancestor in ancestors {
            self.view.set_expanded(&ancestor, true);
        }

        if let Some(node) = self.store.node(id)
            && let Some(parent_id) = node.parent.clone()
            && let Some(type_key) = (self.config.group_type)(node)
        {
            let weight = self.store.effective_weight(id);
            let gid = format!("{parent_id}_{type_key}_{weight}");
            let mut state = self.view.group_state(&gid);
            state.expanded = true;
            self.view.set_group_state(&gid, state);
        }
    }

    pub(in crate::app) fn register_click(&mut self, id: &str, at: f64, ctrl: bool) {
        self.pending_click = Some(PendingClick {
            id: id.to_owned(),
            at,
            ctrl,
        });
    }

    pub(in crate::app) fn register_double_click(&mut self, id: &str) {
        // the double click swallows the pending single click
        self.pending_click = None;
        self.toggle_expand(id);
        if let Some(callback) = self.config.on_node_double_clicked
            && let Some(node) = self.store.node(id)
        {
            callback(node);
        }
    }

    pub(in crate::app) fn flush_pending_click(&mut self, now: f64) {
        let Some(pending) = &self.pending_click else {
            return;
        };
        if now - pending.at < CLICK_DEBOUNCE_SECS {
            return;
        }

        let Some(pending) = self.pending_click.take() else {
            return;
        };
        self.select_node(&pending.id, pending.ctrl);
        if let Some(callback) = self.config.on_node_clicked
            && let Some(node) = self.store.node(&pending.id)
        {
            callback(node);
        }
    }

    pub(in crate::app) fn hover(&mut self, id: Option<String>) {
        self.view.set_hovered(id);
    }

    pub(in crate::app) fn apply_menu_command(&mut self, id: &str, command: MenuCommand) {
        match command {
            MenuCommand::ToggleExpand => self.toggle_expand(id),
            MenuCommand::TogglePin => {
                let pinned = !self.view.is_pinned(id);
                self.set_pinned(id, pinned);
            }
            MenuCommand::Callback(callback) => {
                if let Some(node) = self.store.node(id) {
                    callback(node);
                }
            }
        }
    }

    pub(in crate::app) fn toggle_group(&mut self, gid: &str) {
        let mut state = self.view.group_state(gid);
        state.expanded = !state.expanded;
        self.view.set_group_state(gid, state);
    }

    pub(in crate::app) fn group_prev(&mut self, gid: &str) {
        let mut state = self.view.group_state(gid);
        state.offset = state.offset.saturating_sub(self.config.group_size);
        self.view.set_group_state(gid, state);
    }

    pub(in crate::app) fn group_next(&mut self, gid: &str) {
        let mut state = self.view.group_state(gid);
        state.offset += self.config.group_size;
        self.view.set_group_state(gid, state);
    }

    pub(in crate::app) fn group_show_all(&mut self, gid: &str) {
        let mut state = self.view.group_state(gid);
        state.full_size = true;
        self.view.set_group_state(gid, state);
    }

    /// Highlight the traced path between the two entered IPv4 addresses:
    /// mark every hop, force it on screen, and stitch synthetic links tagged
    /// `tunnel` between consecutive present hops. Gaps stay gaps.
    pub(in crate::app) fn trace_path(&mut self) {
        self.clear_traced_path();

        let src = self.trace_src.trim().to_owned();
        let dst = self.trace_dst.trim().to_owned();
        if src.is_empty() || dst.is_empty() {
            return;
        }

        let path = find_path(&self.store, &src, &dst);
        if path.is_empty() {
            debug!(src, dst, "path trace found nothing");
            self.trace_notice = Some(format!("no path found between {src} and {dst}"));
            return;
        }

        let hops = path.present_hops().cloned().collect::<Vec<_>>();
        for hop in &hops {
            self.store.set_highlighted(hop, true);
            self.show_node(hop);
            self.traced_nodes.push(hop.clone());
        }

        for pair in path.hops.windows(2) {
            let [Some(source), Some(target)] = pair else {
                continue;
            };
            let id = Uuid::new_v4().to_string();
            let data = json!({
                "SourceIP": src,
                "DestinationIP": dst,
                "Tunnel": path.tunnel,
            });
            if self
                .store
                .add_link(&id, source, target, &["tunnel"], data)
                .is_ok()
            {
                self.traced_links.push(id);
            }
        }
        self.store.set_link_tag_state("tunnel", LinkTagState::Visible);
        info!(src, dst, hops = hops.len(), "traced path");
    }

    pub(in crate::app) fn clear_traced_path(&mut self) {
        for id in std::mem::take(&mut self.traced_links) {
            self.store.del_link(&id);
        }
        for id in std::mem::take(&mut self.traced_nodes) {
            self.store.set_highlighted(&id, false);
        }
        self.trace_notice = None;
    }

    /// Drop every bit of state and replay the topology from scratch.
    pub(in crate::app) fn reset(&mut self) {
        self.store.reset();
        self.view = ViewState::new();
        self.anim.clear();
        self.scene_cache.invalidate();
        self.tree = None;
        self.tree_key = None;
        self.traced_nodes.clear();
        self.traced_links.clear();
        self.trace_notice = None;
        self.search.clear();
        self.search_match_cache = None;
        self.prev_nodes.clear();
        self.prev_groups.clear();
        self.prev_links.clear();
        self.last_link_tags = None;
        self.follow = None;
        self.pending_click = None;
        self.context_target = None;
        self.fit_requested = true;

        let (nodes, links) =
            apply_topology(&mut self.store, &self.topology, self.config.default_weight);
        self.store.active_node_tag(&self.config.default_node_tag);
        info!(nodes, links, "reset topology");
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::app::config::demo_config;
    use crate::topo::{FeedLink, FeedNode, TopologyFile};

    use super::*;

    fn feed_node(id: &str, parent: Option<&str>, data: serde_json::Value) -> FeedNode {
        FeedNode {
            id: id.to_owned(),
            parent: parent.map(str::to_owned),
            tags: vec!["infrastructure".to_owned()],
            weight: None,
            data,
        }
    }

    fn feed_link(id: &str, source: &str, target: &str) -> FeedLink {
        FeedLink {
            id: id.to_owned(),
            source: source.to_owned(),
            target: target.to_owned(),
            tags: vec!["layer2".to_owned()],
            data: json!({}),
        }
    }

    fn tap_data(name: &str, addr: &str) -> serde_json::Value {
        json!({
            "Name": name,
            "Type": "tap",
            "Neutron": { "IPV4": [format!("{addr}/24")] },
        })
    }

    fn local_topology() -> TopologyFile {
        TopologyFile {
            nodes: vec![
                feed_node("host1", None, json!({"Name": "host1", "Type": "host"})),
                feed_node("vhost1", Some("host1"), json!({"Name": "vhost1", "Type": "vhost"})),
                feed_node("tapA", Some("host1"), tap_data("tapA", "10.0.0.1")),
                feed_node("tapB", Some("host1"), tap_data("tapB", "10.0.0.2")),
                feed_node("vmA", Some("host1"), json!({"Name": "vmA", "Type": "libvirt"})),
                feed_node("vmB", Some("host1"), json!({"Name": "vmB", "Type": "libvirt"})),
            ],
            links: vec![
                feed_link("la", "tapA", "vhost1"),
                feed_link("lb", "tapB", "vhost1"),
                feed_link("va", "tapA", "vmA"),
                feed_link("vb", "tapB", "vmB"),
            ],
        }
    }

    fn model() -> ViewModel {
        ViewModel::new(local_topology(), demo_config())
    }

    #[test]
    fn plain_selection_is_exclusive_ctrl_is_additive() {
        let mut model = model();

        model.select_node("tapA", false);
        model.select_node("tapB", false);
        assert!(!model.view.is_node_selected("tapA"));
        assert!(model.view.is_node_selected("tapB"));

        model.select_node("tapA", true);
        assert!(model.view.is_node_selected("tapA"));
        assert!(model.view.is_node_selected("tapB"));

        model.select_node("tapA", true);
        assert!(!model.view.is_node_selected("tapA"));
    }

    #[test]
    fn click_fires_only_after_the_debounce_window() {
        let mut model = model();

        model.register_click("tapA", 10.0, false);
        model.flush_pending_click(10.1);
        assert!(!model.view.is_node_selected("tapA"));

        model.flush_pending_click(10.2);
        assert!(model.view.is_node_selected("tapA"));
        assert!(model.pending_click.is_none());
    }

    #[test]
    fn double_click_cancels_the_pending_click_and_toggles_expansion() {
        let mut model = model();
        model.view.set_expanded("host1", true);

        model.register_click("host1", 10.0, false);
        model.register_double_click("host1");
        model.flush_pending_click(11.0);

        assert!(!model.view.is_node_selected("host1"));
        assert!(!model.view.is_expanded("host1"));
        // children were collapsed along with the node
        assert!(!model.view.is_expanded("tapA"));
    }

    #[test]
    fn tracing_a_full_path_adds_one_link_per_consecutive_pair() {
        let mut model = model();
        model.trace_src = "10.0.0.1".to_owned();
        model.trace_dst = "10.0.0.2".to_owned();

        let links_before = model.store.link_count();
        model.trace_path();

        // vmA - tapA - vhost1 - tapB - vmB
        assert_eq!(model.traced_links.len(), 4);
        assert_eq!(model.store.link_count(), links_before + 4);
        assert!(model.trace_notice.is_none());
        assert_eq!(
            model.store.link_tag_state("tunnel"),
            crate::topo::LinkTagState::Visible,
        );
        assert!(model.store.node("vhost1").unwrap().highlighted);
        assert!(model.view.is_expanded("host1"));
    }

    #[test]
    fn tracing_across_a_gap_skips_the_missing_hop() {
        let mut model = model();
        model.store.del_node("vmA");
        model.trace_src = "10.0.0.1".to_owned();
        model.trace_dst = "10.0.0.2".to_owned();

        model.trace_path();
        assert_eq!(model.traced_links.len(), 3, "the gap must not be bridged");
    }

    #[test]
    fn failed_trace_surfaces_a_notice() {
        let mut model = model();
        model.trace_src = "10.0.0.1".to_owned();
        model.trace_dst = "9.9.9.9".to_owned();

        model.trace_path();
        assert!(model.trace_notice.is_some());
        assert!(model.traced_links.is_empty());
    }

    #[test]
    fn clearing_a_trace_removes_links_and_flags() {
        let mut model = model();
        model.trace_src = "10.0.0.1".to_owned();
        model.trace_dst = "10.0.0.2".to_owned();
        model.trace_path();

        let links_before = model.store.link_count();
        model.clear_traced_path();
        assert_eq!(model.store.link_count(), links_before - 4);
        assert!(!model.store.node("vhost1").unwrap().highlighted);
    }

    #[test]
    fn reset_rebuilds_the_store_and_drops_view_state() {
        let mut model = model();
        model.select_node("tapA", false);
        model.set_pinned("tapB", true);
        let nodes = model.store.node_count();

        model.reset();
        assert_eq!(model.store.node_count(), nodes);
        assert!(!model.view.is_node_selected("tapA"));
        assert!(!model.view.is_pinned("tapB"));
        assert!(model.follow.is_none());
    }

    #[test]
    fn search_matches_refresh_after_a_payload_update() {
        let mut model = model();
        model.search = "maintenance".to_owned();

        let before = model.cached_search_matches().unwrap();
        assert!(!before.contains("tapA"));

        // weight class unchanged, only the payload moved
        model.store.update_node(
            "tapA",
            json!({"Name": "tapA", "Type": "tap", "State": "maintenance"}),
        );
        let after = model.cached_search_matches().unwrap();
        assert!(after.contains("tapA"));
    }

    #[test]
    fn show_node_expands_ancestors_and_the_enclosing_group() {
        let mut model = model();
        model.show_node("tapA");

        assert!(model.view.is_expanded("host1"));
        let weight = model.store.effective_weight("tapA");
        let state = model.view.group_state(&format!("host1_tap_{weight}"));
        assert!(state.expanded);
    }
}
