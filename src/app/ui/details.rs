use eframe::egui::{self, RichText, Ui};
use serde_json::Value;

use super::super::ViewModel;

fn payload_rows(ui: &mut Ui, data: &Value) {
    let Some(map) = data.as_object() else {
        return;
    };
    for (key, value) in map {
        match value {
            Value::String(text) => {
                ui.label(format!("{key}: {text}"));
            }
            other => {
                ui.label(format!("{key}: {other}"));
            }
        }
    }
}

impl ViewModel {
    pub(in crate::app) fn draw_details(&mut self, ui: &mut Ui) {
        ui.heading("Selection Details");
        ui.add_space(6.0);

        let mut selected_nodes = self.view.selected_nodes().cloned().collect::<Vec<_>>();
        let mut selected_links = self.view.selected_links().cloned().collect::<Vec<_>>();
        selected_nodes.sort();
        selected_links.sort();

        if selected_nodes.is_empty() && selected_links.is_empty() {
            ui.label("Select a node or link in the graph.");
        }

        for id in &selected_nodes {
            let Some(node) = self.store.node(id) else {
                continue;
            };
            let attrs = (self.config.node_attrs)(node);
            ui.label(RichText::new(&attrs.name).strong());
            ui.small(node.id.as_str());
            ui.label(format!("tags: {}", node.tags.join(", ")));
            ui.label(format!(
                "level: {}",
                self.config.weight_title(self.store.effective_weight(id))
            ));
            ui.label(format!("children: {}", node.children.len()));
            payload_rows(ui, &node.data);
            ui.separator();
        }

        for id in &selected_links {
            let Some(link) = self.store.link(id) else {
                continue;
            };
            ui.label(RichText::new(format!("{} -> {}", link.source, link.target)).strong());
            ui.small(link.id.as_str());
            ui.label(format!("tags: {}", link.tags.join(", ")));
            payload_rows(ui, &link.data);
            ui.separator();
        }

        if self.search.trim().is_empty() {
            return;
        }

        ui.label(RichText::new("Search matches").strong());
        let Some(matches) = self.cached_search_matches() else {
            return;
        };
        if matches.is_empty() {
            ui.label("No nodes match the search.");
            return;
        }

        let mut ids = matches.iter().cloned().collect::<Vec<_>>();
        ids.sort();
        let mut focus = None;
        egui::ScrollArea::vertical()
            .id_salt("search_matches_scroll")
            .max_height(280.0)
            .auto_shrink([false, false])
            .show(ui, |ui| {
                for id in &ids {
                    let Some(node) = self.store.node(id) else {
                        continue;
                    };
                    let attrs = (self.config.node_attrs)(node);
                    if ui
                        .link(format!("{} ({})", attrs.name, node.id))
                        .on_hover_text("Select and reveal this node.")
                        .clicked()
                    {
                        focus = Some(id.clone());
                    }
                }
            });
        if let Some(id) = focus {
            self.select_node(&id, false);
            self.show_node(&id);
            self.follow = Some(id);
        }
    }
}
