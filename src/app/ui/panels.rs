use eframe::egui::{self, Align, Context, Layout, Vec2};
use tracing::info;

use crate::topo::{GraphStore, TopologyFile, apply_topology};

use super::super::config::TopologyConfig;
use super::super::render::anim::Animator;
use super::super::render::scene::SceneCache;
use super::super::view_state::ViewState;
use super::super::ViewModel;

impl ViewModel {
    pub(in crate::app) fn new(topology: TopologyFile, config: TopologyConfig) -> Self {
        let mut store = GraphStore::new(config.default_link_tag_state);
        let (nodes, links) = apply_topology(&mut store, &topology, config.default_weight);
        store.active_node_tag(&config.default_node_tag);
        info!(nodes, links, "topology applied");

        Self {
            store,
            view: ViewState::new(),
            config,
            topology,
            search: String::new(),
            trace_src: String::new(),
            trace_dst: String::new(),
            trace_notice: None,
            traced_nodes: Vec::new(),
            traced_links: Vec::new(),
            pan: Vec2::ZERO,
            zoom: 1.0,
            follow: None,
            fit_requested: true,
            pending_click: None,
            context_target: None,
            tree: None,
            positions: Vec::new(),
            tree_key: None,
            scene_cache: SceneCache::new(),
            anim: Animator::new(),
            prev_nodes: Vec::new(),
            prev_groups: Vec::new(),
            prev_links: Vec::new(),
            last_link_tags: None,
            search_match_cache: None,
        }
    }

    pub(in crate::app) fn show(
        &mut self,
        ctx: &Context,
        source: &str,
        reload_requested: &mut bool,
        is_loading: bool,
    ) {
        egui::TopBottomPanel::top("top_bar")
            .resizable(false)
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.heading("topolens");
                    ui.separator();
                    ui.label(format!("source: {source}"));
                    ui.label(format!("nodes: {}", self.store.node_count()));
                    ui.label(format!("links: {}", self.store.link_count()));
                    let reload_button =
                        ui.add_enabled(!is_loading, egui::Button::new("Reload topology"));
                    if reload_button.clicked() {
                        *reload_requested = true;
                    }
                    if ui.button("Reset").clicked() {
                        self.reset();
                    }
                    ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                        if let Some(hovered) = self.view.hovered() {
                            ui.label(hovered.to_owned());
                        }
                    });
                });
            });

        egui::SidePanel::left("controls")
            .resizable(true)
            .default_width(350.0)
            .show(ctx, |ui| self.draw_controls(ui));

        egui::SidePanel::right("details")
            .resizable(true)
            .default_width(360.0)
            .show(ctx, |ui| self.draw_details(ui));

        egui::CentralPanel::default().show(ctx, |ui| {
            if is_loading {
                ui.vertical_centered(|ui| {
                    ui.add_space(120.0);
                    ui.heading("Reloading topology...");
                    ui.add_space(8.0);
                    ui.spinner();
                });
            } else {
                self.draw_graph(ui);
            }
        });
    }
}
