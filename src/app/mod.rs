use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;

use eframe::egui::{self, Context, Vec2};

use crate::topo::{GraphStore, LinkTagState, TopologyFile, load_topology_file};

pub mod config;
mod interaction;
mod render;
mod tree;
mod ui;
mod view_state;

use config::TopologyConfig;
use render::anim::Animator;
use render::scene::SceneCache;
use tree::NormalizedTree;
use view_state::ViewState;

pub struct TopolensApp {
    topology_path: Option<PathBuf>,
    config: TopologyConfig,
    state: AppState,
    reload_rx: Option<Receiver<LoadResult>>,
}

type LoadResult = Result<TopologyFile, String>;

enum AppState {
    Loading { rx: Receiver<LoadResult> },
    Ready(Box<ViewModel>),
    Error(String),
}

struct ViewModel {
    store: GraphStore,
    view: ViewState,
    config: TopologyConfig,
    topology: TopologyFile,
    search: String,
    trace_src: String,
    trace_dst: String,
    trace_notice: Option<String>,
    traced_nodes: Vec<String>,
    traced_links: Vec<String>,
    pan: Vec2,
    zoom: f32,
    follow: Option<String>,
    fit_requested: bool,
    pending_click: Option<PendingClick>,
    context_target: Option<String>,
    tree: Option<NormalizedTree>,
    positions: Vec<Vec2>,
    tree_key: Option<(u64, u64)>,
    scene_cache: SceneCache,
    anim: Animator,
    prev_nodes: Vec<String>,
    prev_groups: Vec<String>,
    prev_links: Vec<String>,
    last_link_tags: Option<HashMap<String, LinkTagState>>,
    search_match_cache: Option<SearchMatchCache>,
}

/// Single click waiting out the double-click window before it fires.
struct PendingClick {
    id: String,
    at: f64,
    ctrl: bool,
}

struct SearchMatchCache {
    query: String,
    generation: u64,
    data_epoch: u64,
    matches: Arc<HashSet<String>>,
}

impl TopolensApp {
    pub fn new(
        _cc: &eframe::CreationContext<'_>,
        topology_path: Option<PathBuf>,
        config: TopologyConfig,
    ) -> Self {
        let state = Self::start_load(topology_path.clone());
        Self {
            topology_path,
            config,
            state,
            reload_rx: None,
        }
    }

    fn spawn_load(topology_path: Option<PathBuf>) -> Receiver<LoadResult> {
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            let result = match topology_path {
                Some(path) => load_topology_file(&path).map_err(|error| format!("{error:#}")),
                None => Ok(crate::topo::demo_topology()),
            };
            let _ = tx.send(result);
        });

        rx
    }

    fn start_load(topology_path: Option<PathBuf>) -> AppState {
        AppState::Loading {
            rx: Self::spawn_load(topology_path),
        }
    }

}

impl eframe::App for TopolensApp {
    fn update(&mut self, ctx: &Context, _frame: &mut eframe::Frame) {
        let mut transition = None;

        match &mut self.state {
            AppState::Loading { rx } => {
                if let Ok(result) = rx.try_recv() {
                    transition = Some(match result {
                        Ok(topology) => {
                            AppState::Ready(Box::new(ViewModel::new(topology, self.config.clone())))
                        }
                        Err(error) => AppState::Error(error),
                    });
                }

                egui::CentralPanel::default().show(ctx, |ui| {
                    ui.vertical_centered(|ui| {
                        ui.add_space(120.0);
                        ui.heading("Loading topology...");
                        ui.add_space(8.0);
                        ui.spinner();
                    });
                });
            }
            AppState::Error(error) => {
                egui::CentralPanel::default().show(ctx, |ui| {
                    ui.heading("Failed to load topology");
                    ui.add_space(6.0);
                    ui.label(error.as_str());
                    ui.add_space(10.0);
                    if ui.button("Retry").clicked() {
                        transition = Some(Self::start_load(self.topology_path.clone()));
                    }
                });
            }
            AppState::Ready(model) => {
                let mut reload_requested = false;
                let is_reloading = self.reload_rx.is_some();
                let source = match &self.topology_path {
                    Some(path) => path.display().to_string(),
                    None => "built-in demo topology".to_owned(),
                };
                model.show(ctx, &source, &mut reload_requested, is_reloading);

                if reload_requested && self.reload_rx.is_none() {
                    self.reload_rx = Some(Self::spawn_load(self.topology_path.clone()));
                }

                if let Some(rx) = self.reload_rx.take() {
                    match rx.try_recv() {
                        Ok(result) => {
                            transition = Some(match result {
                                Ok(topology) => AppState::Ready(Box::new(ViewModel::new(
                                    topology,
                                    self.config.clone(),
                                ))),
                                Err(error) => AppState::Error(error),
                            });
                        }
                        Err(TryRecvError::Empty) => {
                            self.reload_rx = Some(rx);
                        }
                        Err(TryRecvError::Disconnected) => {
                            transition =
                                Some(AppState::Error("Background load worker disconnected".to_owned()));
                        }
                    }
                }
            }
        }

        if let Some(next_state) = transition {
            self.reload_rx = None;
            self.state = next_state;
        }
    }
}
