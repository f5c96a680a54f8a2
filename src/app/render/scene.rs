use std::collections::HashMap;

use eframe::egui::Vec2;

use crate::app::config::{LinkAttrs, NodeAttrs, TopologyConfig};
use crate::app::tree::{NormalizedTree, WrapperKind};
use crate::app::view_state::ViewState;
use crate::layout::{NODE_HEIGHT, NODE_WIDTH};
use crate::topo::{GraphStore, LinkTagState, ROOT_ID};

#[derive(Clone, Debug, PartialEq)]
pub struct LevelBand {
    pub weight: i64,
    pub title: String,
    pub top: f32,
    pub bottom: f32,
}

pub struct SceneNode {
    pub id: String,
    pub wrapper: usize,
    pub position: Vec2,
    pub attrs: NodeAttrs,
    pub weight: i64,
    pub selected: bool,
    pub hovered: bool,
    pub pinned: bool,
    pub highlighted: bool,
    pub expanded: bool,
    pub child_count: usize,
}

pub struct SceneGroup {
    pub id: String,
    pub wrapper: usize,
    pub name: String,
    pub position: Vec2,
    pub span: (f32, f32),
    pub expanded: bool,
    pub hidden_count: usize,
    pub prev_enabled: bool,
    pub next_enabled: bool,
    pub show_all_enabled: bool,
}

pub struct SceneLink {
    pub id: String,
    /// Wrapper ids the endpoints resolved to, usable as animation anchors.
    pub source_id: String,
    pub target_id: String,
    pub source: Vec2,
    pub target: Vec2,
    pub attrs: LinkAttrs,
    pub selected: bool,
    pub emphasized: bool,
}

/// One fully resolved frame of the graph, in world coordinates. Everything a
/// painter needs and nothing it has to look up; building it touches no
/// drawing surface.
pub struct Scene {
    pub bands: Vec<LevelBand>,
    pub nodes: Vec<SceneNode>,
    pub groups: Vec<SceneGroup>,
    pub links: Vec<SceneLink>,
    /// Link-tag states restricted to tags carried by links whose endpoints
    /// exist in the current view.
    pub link_tags: HashMap<String, LinkTagState>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
struct StructureKey {
    generation: u64,
    structure_revision: u64,
}

#[derive(Clone, Copy, PartialEq, Eq)]
struct LinkKey {
    link_epoch: u64,
    generation: u64,
    structure_revision: u64,
    emphasis_revision: u64,
}

#[derive(Clone)]
struct ResolvedLink {
    id: String,
    source: usize,
    target: usize,
    selected: bool,
    emphasized: bool,
}

/// Caches for the expensive derived sets. Keys carry the store counters and
/// view revisions, so a mutation anywhere invalidates synchronously and a
/// stale frame can never be served.
#[derive(Default)]
pub struct SceneCache {
    bands: Option<(StructureKey, Vec<LevelBand>)>,
    links: Option<(LinkKey, Vec<ResolvedLink>)>,
}

impl SceneCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invalidate(&mut self) {
        self.bands = None;
        self.links = None;
    }
}

pub fn build_scene(
    cache: &mut SceneCache,
    store: &GraphStore,
    view: &ViewState,
    config: &TopologyConfig,
    tree: &NormalizedTree,
    positions: &[Vec2],
) -> Scene {
    let bands = level_bands(cache, store, view, config, tree, positions);
    let nodes = scene_nodes(store, view, config, tree, positions);
    let groups = scene_groups(view, config, tree, positions);
    let resolved = resolved_links(cache, store, view, tree);
    let links = resolved
        .iter()
        .filter_map(|link| {
            let raw = store.link(&link.id)?;
            Some(SceneLink {
                id: link.id.clone(),
                source_id: tree.wrappers[link.source].id.clone(),
                target_id: tree.wrappers[link.target].id.clone(),
                source: positions[link.source],
                target: positions[link.target],
                attrs: (config.link_attrs)(raw),
                selected: link.selected,
                emphasized: link.emphasized,
            })
        })
        .collect();
    let link_tags = view_link_tags(store, tree);

    Scene {
        bands,
        nodes,
        groups,
        links,
        link_tags,
    }
}

/// Horizontal level bands, one per weight with rendered wrappers, ascending.
/// Each band is clipped against the band below it so they tile instead of
/// overlapping when levels share depths.
fn level_bands(
    cache: &mut SceneCache,
    store: &GraphStore,
    view: &ViewState,
    config: &TopologyConfig,
    tree: &NormalizedTree,
    positions: &[Vec2],
) -> Vec<LevelBand> {
    let key = StructureKey {
        generation: store.generation(),
        structure_revision: view.structure_revision(),
    };
    if let Some((cached_key, bands)) = &cache.bands
        && *cached_key == key
    {
        return bands.clone();
    }

    let mut bands: Vec<LevelBand> = Vec::new();
    for &weight in store.weights() {
        if weight == 0 {
            continue;
        }

        let mut top = f32::MAX;
        let mut bottom = f32::MIN;
        for (idx, wrapper) in tree.wrappers.iter().enumerate() {
            if wrapper.weight == weight {
                top = top.min(positions[idx].y - NODE_HEIGHT / 2.0);
                bottom = bottom.max(positions[idx].y + NODE_HEIGHT / 2.0);
            }
        }
        if top > bottom {
            continue;
        }

        if let Some(previous) = bands.last() {
            top = top.max(previous.bottom);
        }
        bands.push(LevelBand {
            weight,
            title: config.weight_title(weight),
            top,
            bottom: bottom.max(top),
        });
    }

    cache.bands = Some((key, bands.clone()));
    bands
}

fn scene_nodes(
    store: &GraphStore,
    view: &ViewState,
    config: &TopologyConfig,
    tree: &NormalizedTree,
    positions: &[Vec2],
) -> Vec<SceneNode> {
    tree.wrappers
        .iter()
        .enumerate()
        .filter(|(_, wrapper)| wrapper.kind == WrapperKind::Normal && wrapper.id != ROOT_ID)
        .filter_map(|(idx, wrapper)| {
            let node = store.node(wrapper.node_id.as_deref()?)?;
            Some(SceneNode {
                id: node.id.clone(),
                wrapper: idx,
                position: positions[idx],
                attrs: (config.node_attrs)(node),
                weight: wrapper.weight,
                selected: view.is_node_selected(&node.id),
                hovered: view.is_hovered(&node.id),
                pinned: view.is_pinned(&node.id),
                highlighted: node.highlighted,
                expanded: view.is_expanded(&node.id),
                child_count: node.children.len(),
            })
        })
        .collect()
}

fn scene_groups(
    view: &ViewState,
    config: &TopologyConfig,
    tree: &NormalizedTree,
    positions: &[Vec2],
) -> Vec<SceneGroup> {
    let mut groups = tree
        .groups
        .values()
        .map(|group| {
            let state = view.group_state(&group.id);
            let paged_total = group.members.len() - group.fronted;

            let mut left = positions[group.wrapper].x - NODE_WIDTH / 2.0;
            let mut right = positions[group.wrapper].x + NODE_WIDTH / 2.0;
            for member in &group.visible {
                if let Some(&idx) = tree.node_wrapper.get(member) {
                    left = left.min(positions[idx].x - NODE_WIDTH / 2.0);
                    right = right.max(positions[idx].x + NODE_WIDTH / 2.0);
                }
            }

            SceneGroup {
                id: group.id.clone(),
                wrapper: group.wrapper,
                name: group.name.clone(),
                position: positions[group.wrapper],
                span: (left, right),
                expanded: state.expanded,
                hidden_count: group.hidden_count,
                prev_enabled: state.expanded && !state.full_size && state.offset > 0,
                next_enabled: state.expanded
                    && !state.full_size
                    && state.offset + config.group_size < paged_total,
                show_all_enabled: state.expanded
                    && !state.full_size
                    && paged_total > config.group_size,
            }
        })
        .collect::<Vec<_>>();
    groups.sort_by(|a, b| a.id.cmp(&b.id));
    groups
}

/// A link makes it on screen when it is selected, carries a Visible tag, or
/// carries an EventBased tag while one endpoint is selected or hovered.
/// Endpoints resolve to the nearest rendered stand-in; links collapsing onto
/// a single wrapper or reaching the root are dropped.
fn resolved_links<'a>(
    cache: &'a mut SceneCache,
    store: &GraphStore,
    view: &ViewState,
    tree: &NormalizedTree,
) -> &'a Vec<ResolvedLink> {
    let key = LinkKey {
        link_epoch: store.link_epoch(),
        generation: store.generation(),
        structure_revision: view.structure_revision(),
        emphasis_revision: view.emphasis_revision(),
    };
    let fresh = matches!(&cache.links, Some((cached_key, _)) if *cached_key == key);
    if !fresh {
        cache.links = None;
    }

    let (_, links) = cache
        .links
        .get_or_insert_with(|| (key, compute_resolved(store, view, tree)));
    links
}

fn compute_resolved(
    store: &GraphStore,
    view: &ViewState,
    tree: &NormalizedTree,
) -> Vec<ResolvedLink> {
    let mut resolved = Vec::new();
    for link in store.links() {
        let selected = view.is_link_selected(&link.id);
        let endpoint_active = view.is_active(&link.source) || view.is_active(&link.target);
        let visible = selected
            || link.tags.iter().any(|tag| match store.link_tag_state(tag) {
                LinkTagState::Visible => true,
                LinkTagState::EventBased => endpoint_active,
                LinkTagState::Hidden => false,
            });
        if !visible {
            continue;
        }

        let Some(source) = tree.resolve_endpoint(store, &link.source) else {
            continue;
        };
        let Some(target) = tree.resolve_endpoint(store, &link.target) else {
            continue;
        };
        if source == target {
            continue;
        }

        resolved.push(ResolvedLink {
            id: link.id.clone(),
            source,
            target,
            selected,
            emphasized: endpoint_active,
        });
    }
    resolved.sort_by(|a, b| a.id.cmp(&b.id));
    resolved
}

fn view_link_tags(store: &GraphStore, tree: &NormalizedTree) -> HashMap<String, LinkTagState> {
    let mut tags = HashMap::new();
    for link in store.links() {
        let source = tree.resolve_endpoint(store, &link.source);
        let target = tree.resolve_endpoint(store, &link.target);
        let (Some(source), Some(target)) = (source, target) else {
            continue;
        };
        if source == target {
            continue;
        }
        for tag in &link.tags {
            tags.insert(tag.clone(), store.link_tag_state(tag));
        }
    }
    tags
}
