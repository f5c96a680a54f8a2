use eframe::egui::{Color32, Ui};

use crate::topo::LinkTagState;

use super::super::ViewModel;

impl ViewModel {
    pub(in crate::app) fn draw_controls(&mut self, ui: &mut Ui) {
        ui.heading("Topology Controls");
        ui.separator();
        ui.add_space(4.0);

        ui.label("Search (name or payload value)")
            .on_hover_text("Fuzzy-highlight matching nodes without changing the rendered tree.");
        ui.text_edit_singleline(&mut self.search)
            .on_hover_text("Type to highlight matching nodes, then pick one from the details panel.");

        ui.separator();

        // exactly one node tag is active at a time
        ui.label("Node tag");
        let mut tags = self
            .store
            .node_tag_states()
            .iter()
            .map(|(tag, active)| (tag.clone(), *active))
            .collect::<Vec<_>>();
        tags.sort_by(|a, b| a.0.cmp(&b.0));
        let mut activate = None;
        ui.horizontal_wrapped(|ui| {
            for (tag, active) in &tags {
                if ui.selectable_label(*active, tag.as_str()).clicked() && !*active {
                    activate = Some(tag.clone());
                }
            }
        });
        if let Some(tag) = activate {
            self.store.active_node_tag(&tag);
        }

        ui.separator();

        ui.label("Link tags")
            .on_hover_text("Visibility per link tag, limited to links present in the current view.");
        if let Some(link_tags) = self.last_link_tags.clone() {
            let mut entries = link_tags.into_iter().collect::<Vec<_>>();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            for (tag, state) in entries {
                let mut next = state;
                ui.horizontal(|ui| {
                    ui.label(&tag);
                    ui.selectable_value(&mut next, LinkTagState::Hidden, "hidden");
                    ui.selectable_value(&mut next, LinkTagState::EventBased, "on event");
                    ui.selectable_value(&mut next, LinkTagState::Visible, "visible");
                });
                if next != state {
                    self.store.set_link_tag_state(&tag, next);
                }
            }
        } else {
            ui.label("No links in the current view.");
        }

        ui.separator();

        ui.label("Trace IPv4 path");
        ui.horizontal(|ui| {
            ui.label("from");
            ui.text_edit_singleline(&mut self.trace_src);
        });
        ui.horizontal(|ui| {
            ui.label("to");
            ui.text_edit_singleline(&mut self.trace_dst);
        });
        ui.horizontal(|ui| {
            if ui.button("Trace").clicked() {
                self.trace_path();
            }
            if ui.button("Clear").clicked() {
                self.clear_traced_path();
            }
        });
        if let Some(notice) = self.trace_notice.clone() {
            ui.colored_label(Color32::from_rgb(230, 160, 90), notice);
        }

        ui.separator();

        ui.horizontal(|ui| {
            if ui.button("Fit view").clicked() {
                self.fit_requested = true;
            }
            if ui.button("Unpin all").clicked() {
                self.unpin_all();
            }
            if ui.button("Collapse all").clicked() {
                let hosts = self
                    .store
                    .node(crate::topo::ROOT_ID)
                    .map(|root| root.children.clone())
                    .unwrap_or_default();
                for host in hosts {
                    self.view.collapse_recursive(&self.store, &host);
                }
            }
        });
    }
}
