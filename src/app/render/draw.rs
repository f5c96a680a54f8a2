use std::collections::HashSet;
use std::sync::Arc;

use eframe::egui::{
    self, Align2, Color32, FontId, Pos2, Rect, Sense, Stroke, Ui, Vec2, pos2, vec2,
};
use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;
use serde_json::Value;

use crate::layout::{NODE_HEIGHT, NODE_WIDTH, tree_layout};

use super::super::tree::normalize;
use super::super::{SearchMatchCache, ViewModel};
use super::diff::diff;
use super::scene::{Scene, build_scene};

const BACKGROUND: Color32 = Color32::from_rgb(19, 23, 29);
const NODE_COLOR: Color32 = Color32::from_rgb(108, 160, 214);
const DOWN_COLOR: Color32 = Color32::from_rgb(214, 96, 88);
const SELECTED_COLOR: Color32 = Color32::from_rgb(245, 206, 93);
const HOVERED_COLOR: Color32 = Color32::from_rgb(255, 164, 101);
const TRACED_COLOR: Color32 = Color32::from_rgb(246, 137, 92);
const MATCHED_COLOR: Color32 = Color32::from_rgb(103, 196, 255);
const GROUP_COLOR: Color32 = Color32::from_rgb(140, 150, 164);

/// Node disc radius in world units; NODE_WIDTH leaves room around it for the
/// label and the group bracket.
const NODE_RADIUS: f32 = 26.0;

fn link_key(id: &str) -> String {
    format!("link:{id}")
}

fn world_to_screen(rect: Rect, pan: Vec2, zoom: f32, world: Vec2) -> Pos2 {
    rect.center() + pan + world * zoom
}

fn screen_to_world(rect: Rect, pan: Vec2, zoom: f32, screen: Pos2) -> Vec2 {
    (screen - rect.center() - pan) / zoom
}

fn circle_visible(rect: Rect, position: Pos2, radius: f32) -> bool {
    !(position.x + radius < rect.left()
        || position.x - radius > rect.right()
        || position.y + radius < rect.top()
        || position.y - radius > rect.bottom())
}

fn blend_color(base: Color32, overlay: Color32, amount: f32) -> Color32 {
    let amount = amount.clamp(0.0, 1.0);
    let inverse = 1.0 - amount;

    Color32::from_rgba_unmultiplied(
        ((base.r() as f32 * inverse) + (overlay.r() as f32 * amount)) as u8,
        ((base.g() as f32 * inverse) + (overlay.g() as f32 * amount)) as u8,
        ((base.b() as f32 * inverse) + (overlay.b() as f32 * amount)) as u8,
        ((base.a() as f32 * inverse) + (overlay.a() as f32 * amount)) as u8,
    )
}

fn dim_color(color: Color32, factor: f32) -> Color32 {
    let factor = factor.clamp(0.0, 1.0);
    Color32::from_rgba_unmultiplied(
        (color.r() as f32 * factor) as u8,
        (color.g() as f32 * factor) as u8,
        (color.b() as f32 * factor) as u8,
        (color.a() as f32 * (0.45 + (factor * 0.55))) as u8,
    )
}

fn with_alpha(color: Color32, alpha: f32) -> Color32 {
    Color32::from_rgba_unmultiplied(
        color.r(),
        color.g(),
        color.b(),
        (color.a() as f32 * alpha.clamp(0.0, 1.0)) as u8,
    )
}

fn segment_distance(point: Pos2, a: Pos2, b: Pos2) -> f32 {
    let ab = b - a;
    let length_sq = ab.length_sq();
    if length_sq <= f32::EPSILON {
        return point.distance(a);
    }
    let t = ((point - a).dot(ab) / length_sq).clamp(0.0, 1.0);
    point.distance(a + ab * t)
}

fn fuzzy_match_score(matcher: &SkimMatcherV2, text: &str, query: &str) -> Option<i64> {
    matcher
        .fuzzy_match(text, query)
        .or_else(|| matcher.fuzzy_match(&text.to_ascii_lowercase(), &query.to_ascii_lowercase()))
}

#[derive(Clone, Copy)]
enum GroupAction {
    Toggle,
    Prev,
    Next,
    ShowAll,
}

impl ViewModel {
    /// Rebuild the normalized tree and its layout when the store generation
    /// or the view structure revision moved since the cached pass.
    pub(in crate::app) fn ensure_tree(&mut self) {
        let key = (self.store.generation(), self.view.structure_revision());
        if self.tree_key == Some(key) && self.tree.is_some() {
            return;
        }

        let tree = normalize(&self.store, &mut self.view, &self.config);
        let children = tree
            .wrappers
            .iter()
            .map(|wrapper| wrapper.children.clone())
            .collect::<Vec<_>>();
        self.positions = tree_layout(&children, tree.root);
        self.tree = Some(tree);
        self.tree_key = Some(key);
    }

    fn handle_zoom(&mut self, ui: &Ui, rect: Rect, response: &egui::Response) {
        if !response.hovered() {
            return;
        }

        let scroll = ui.input(|input| input.raw_scroll_delta.y);
        if scroll.abs() <= f32::EPSILON {
            return;
        }

        let pointer = ui
            .input(|input| input.pointer.hover_pos())
            .unwrap_or_else(|| rect.center());
        let world_before = screen_to_world(rect, self.pan, self.zoom, pointer);

        let zoom_factor = (1.0 + (scroll * 0.0018)).clamp(0.85, 1.15);
        self.zoom = (self.zoom * zoom_factor).clamp(0.05, 6.0);
        self.pan = pointer - rect.center() - (world_before * self.zoom);
    }

    fn handle_pan(&mut self, response: &egui::Response) {
        if response.dragged_by(egui::PointerButton::Secondary)
            || response.dragged_by(egui::PointerButton::Middle)
        {
            self.pan += response.drag_delta();
        }
    }

    fn fit_view(&mut self, rect: Rect, scene: &Scene) {
        let mut min = vec2(f32::MAX, f32::MAX);
        let mut max = vec2(f32::MIN, f32::MIN);
        for position in scene
            .nodes
            .iter()
            .map(|node| node.position)
            .chain(scene.groups.iter().map(|group| group.position))
        {
            min = min.min(position);
            max = max.max(position);
        }
        if min.x > max.x {
            self.zoom = 1.0;
            self.pan = Vec2::ZERO;
            return;
        }

        min -= vec2(NODE_WIDTH, NODE_HEIGHT) * 0.5;
        max += vec2(NODE_WIDTH, NODE_HEIGHT) * 0.5;
        let size = max - min;
        self.zoom = (rect.width() / size.x.max(1.0))
            .min(rect.height() / size.y.max(1.0))
            .clamp(0.05, 1.2);
        self.pan = -((min + max) * 0.5) * self.zoom;
    }

    pub(in crate::app) fn cached_search_matches(&mut self) -> Option<Arc<HashSet<String>>> {
        let query = self.search.trim();
        if query.is_empty() {
            return None;
        }

        if let Some(cached) = &self.search_match_cache
            && cached.generation == self.store.generation()
            && cached.data_epoch == self.store.data_epoch()
            && cached.query == query
        {
            return Some(Arc::clone(&cached.matches));
        }

        let matcher = SkimMatcherV2::default();
        let mut matches = self
            .store
            .nodes()
            .filter(|node| {
                let attrs = (self.config.node_attrs)(node);
                fuzzy_match_score(&matcher, &attrs.name, query).is_some()
                    || fuzzy_match_score(&matcher, &node.id, query).is_some()
            })
            .map(|node| node.id.clone())
            .collect::<HashSet<_>>();
        // exact payload-value hits count too, e.g. searching for an address
        for node in self.store.search_nodes(&[Value::String(query.to_owned())]) {
            matches.insert(node.id.clone());
        }
        let matches = Arc::new(matches);

        self.search_match_cache = Some(SearchMatchCache {
            query: query.to_owned(),
            generation: self.store.generation(),
            data_epoch: self.store.data_epoch(),
            matches: Arc::clone(&matches),
        });

        Some(matches)
    }

    pub(in crate::app) fn draw_graph(&mut self, ui: &mut Ui) {
        self.ensure_tree();

        let (rect, response) = ui.allocate_exact_size(ui.available_size(), Sense::click_and_drag());
        let painter = ui.painter_at(rect);
        painter.rect_filled(rect, 0.0, BACKGROUND);

        self.handle_zoom(ui, rect, &response);
        self.handle_pan(&response);

        let now = ui.input(|input| input.time);
        let ctrl = ui.input(|input| input.modifiers.command);
        let pointer = response.hover_pos();

        let scene = {
            let Some(tree) = &self.tree else {
                return;
            };
            build_scene(
                &mut self.scene_cache,
                &self.store,
                &self.view,
                &self.config,
                tree,
                &self.positions,
            )
        };

        if self.last_link_tags.as_ref() != Some(&scene.link_tags) {
            if let Some(callback) = self.config.on_link_tag_change {
                callback(&scene.link_tags);
            }
            self.last_link_tags = Some(scene.link_tags.clone());
        }

        if self.fit_requested {
            self.fit_view(rect, &scene);
            self.fit_requested = false;
        }
        if let Some(id) = self.follow.clone() {
            if let Some(node) = scene.nodes.iter().find(|node| node.id == id) {
                self.pan = -(node.position * self.zoom);
            }
            // one-shot centering unless the node is pinned
            if !self.view.is_pinned(&id) {
                self.follow = None;
            }
        }

        let node_ids = scene
            .nodes
            .iter()
            .map(|node| node.id.clone())
            .collect::<Vec<_>>();
        let group_ids = scene
            .groups
            .iter()
            .map(|group| group.id.clone())
            .collect::<Vec<_>>();
        let link_ids = scene
            .links
            .iter()
            .map(|link| link.id.clone())
            .collect::<Vec<_>>();

        for node in &scene.nodes {
            self.anim.target(&node.id, node.position, now);
        }
        for group in &scene.groups {
            self.anim.target(&group.id, group.position, now);
        }
        for link in &scene.links {
            self.anim
                .target(&link_key(&link.id), (link.source + link.target) * 0.5, now);
        }
        for exited in diff(&self.prev_nodes, &node_ids, Clone::clone).exited {
            self.anim.exit(exited, now);
        }
        for exited in diff(&self.prev_groups, &group_ids, Clone::clone).exited {
            self.anim.exit(exited, now);
        }
        for exited in diff(&self.prev_links, &link_ids, Clone::clone).exited {
            self.anim.exit(&link_key(exited), now);
        }

        let matches = self.cached_search_matches();
        let search_active = matches.as_ref().is_some_and(|matches| !matches.is_empty());

        let pan = self.pan;
        let zoom = self.zoom;
        let to_screen = |world: Vec2| world_to_screen(rect, pan, zoom, world);

        for (index, band) in scene.bands.iter().enumerate() {
            let top = to_screen(vec2(0.0, band.top)).y;
            let bottom = to_screen(vec2(0.0, band.bottom)).y;
            let fill = if index % 2 == 0 {
                Color32::from_rgba_unmultiplied(34, 41, 51, 90)
            } else {
                Color32::from_rgba_unmultiplied(26, 31, 39, 90)
            };
            painter.rect_filled(
                Rect::from_min_max(pos2(rect.left(), top), pos2(rect.right(), bottom)),
                0.0,
                fill,
            );
            painter.line_segment(
                [pos2(rect.left(), top), pos2(rect.right(), top)],
                Stroke::new(1.0, Color32::from_rgba_unmultiplied(70, 80, 92, 60)),
            );
            painter.text(
                pos2(rect.left() + 10.0, (top + bottom) / 2.0),
                Align2::LEFT_CENTER,
                &band.title,
                FontId::proportional(13.0),
                Color32::from_gray(150),
            );
        }

        for link in &scene.links {
            let alpha = self
                .anim
                .sample(&link_key(&link.id), now)
                .map(|sample| sample.alpha)
                .unwrap_or(1.0);
            let source_world = self
                .anim
                .sample(&link.source_id, now)
                .map(|sample| sample.position)
                .unwrap_or(link.source);
            let target_world = self
                .anim
                .sample(&link.target_id, now)
                .map(|sample| sample.position)
                .unwrap_or(link.target);
            let start = to_screen(source_world);
            let end = to_screen(target_world);

            let (width, color) = if link.selected {
                (2.6, SELECTED_COLOR)
            } else if link.emphasized {
                (2.0, TRACED_COLOR)
            } else {
                (1.4, Color32::from_rgba_unmultiplied(120, 130, 142, 180))
            };
            let stroke = Stroke::new(
                (width * zoom.sqrt()).clamp(0.7, 4.5),
                with_alpha(color, alpha),
            );
            if link.attrs.directed {
                painter.arrow(start, end - start, stroke);
            } else {
                painter.line_segment([start, end], stroke);
            }
        }

        let mut group_hits: Vec<(Rect, String, GroupAction)> = Vec::new();
        for group in &scene.groups {
            let sample = self.anim.sample(&group.id, now);
            let (world, alpha) = sample
                .map(|sample| (sample.position, sample.alpha))
                .unwrap_or((group.position, 1.0));
            let position = to_screen(world);

            if !group.expanded {
                // collapsed placeholder standing in for all members
                let size = vec2(NODE_WIDTH * 0.8, 52.0) * zoom;
                let frame = Rect::from_center_size(position, size);
                painter.rect_filled(frame, 6.0, with_alpha(Color32::from_rgb(40, 48, 60), alpha));
                painter.rect_stroke(
                    frame,
                    6.0,
                    Stroke::new(1.2, with_alpha(GROUP_COLOR, alpha)),
                    egui::StrokeKind::Outside,
                );
                painter.text(
                    position,
                    Align2::CENTER_CENTER,
                    &group.name,
                    FontId::proportional((13.0 * zoom).clamp(9.0, 18.0)),
                    with_alpha(Color32::from_gray(220), alpha),
                );
                let bubble = frame.right_top() + vec2(-4.0, 4.0);
                painter.circle_filled(bubble, 11.0 * zoom.clamp(0.5, 1.2), with_alpha(GROUP_COLOR, alpha));
                painter.text(
                    bubble,
                    Align2::CENTER_CENTER,
                    format!("+{}", group.hidden_count),
                    FontId::proportional((10.0 * zoom).clamp(8.0, 14.0)),
                    with_alpha(Color32::BLACK, alpha),
                );
                group_hits.push((frame, group.id.clone(), GroupAction::Toggle));
                continue;
            }

            let left = to_screen(vec2(group.span.0, world.y)).x;
            let right = to_screen(vec2(group.span.1, world.y)).x;
            let bracket_y = position.y + (NODE_RADIUS + 34.0) * zoom;
            let stroke = Stroke::new(1.4, with_alpha(GROUP_COLOR, alpha));
            painter.line_segment([pos2(left, bracket_y), pos2(right, bracket_y)], stroke);
            painter.line_segment(
                [pos2(left, bracket_y), pos2(left, bracket_y - 6.0)],
                stroke,
            );
            painter.line_segment(
                [pos2(right, bracket_y), pos2(right, bracket_y - 6.0)],
                stroke,
            );

            let center_x = (left + right) / 2.0;
            let label = if group.hidden_count > 0 {
                format!("{} (+{})", group.name, group.hidden_count)
            } else {
                group.name.clone()
            };
            let label_pos = pos2(center_x, bracket_y + 12.0);
            painter.text(
                label_pos,
                Align2::CENTER_CENTER,
                &label,
                FontId::proportional(12.0),
                with_alpha(Color32::from_gray(200), alpha),
            );
            group_hits.push((
                Rect::from_center_size(label_pos, vec2(label.len() as f32 * 7.0, 16.0)),
                group.id.clone(),
                GroupAction::Toggle,
            ));

            let control = |center: Pos2, text: &str, enabled: bool| -> Rect {
                let color = if enabled {
                    Color32::from_gray(220)
                } else {
                    Color32::from_gray(90)
                };
                painter.text(
                    center,
                    Align2::CENTER_CENTER,
                    text,
                    FontId::proportional(13.0),
                    with_alpha(color, alpha),
                );
                Rect::from_center_size(center, vec2(22.0, 18.0))
            };

            let prev_rect = control(pos2(left - 14.0, bracket_y), "<", group.prev_enabled);
            if group.prev_enabled {
                group_hits.push((prev_rect, group.id.clone(), GroupAction::Prev));
            }
            let next_rect = control(pos2(right + 14.0, bracket_y), ">", group.next_enabled);
            if group.next_enabled {
                group_hits.push((next_rect, group.id.clone(), GroupAction::Next));
            }
            let all_rect = control(
                pos2(center_x, bracket_y + 28.0),
                "show all",
                group.show_all_enabled,
            );
            if group.show_all_enabled {
                group_hits.push((
                    Rect::from_center_size(all_rect.center(), vec2(56.0, 18.0)),
                    group.id.clone(),
                    GroupAction::ShowAll,
                ));
            }
        }

        let radius = (NODE_RADIUS * zoom).clamp(5.0, 46.0);
        let mut node_hits: Vec<(String, Pos2)> = Vec::new();
        for node in &scene.nodes {
            let sample = self.anim.sample(&node.id, now);
            let (world, alpha) = sample
                .map(|sample| (sample.position, sample.alpha))
                .unwrap_or((node.position, 1.0));
            let position = to_screen(world);
            if !circle_visible(rect, position, radius + 40.0) {
                continue;
            }
            node_hits.push((node.id.clone(), position));

            let is_down = node.attrs.classes.iter().any(|class| class == "down");
            let base = if is_down { DOWN_COLOR } else { NODE_COLOR };
            let is_match = matches
                .as_ref()
                .is_some_and(|matches| matches.contains(&node.id));
            let mut color = if node.selected {
                SELECTED_COLOR
            } else if node.hovered {
                HOVERED_COLOR
            } else if node.highlighted {
                blend_color(base, TRACED_COLOR, 0.65)
            } else if is_match {
                blend_color(base, MATCHED_COLOR, 0.68)
            } else if search_active {
                dim_color(base, 0.42)
            } else {
                base
            };
            color = with_alpha(color, alpha);

            painter.circle_filled(position, radius, color);
            painter.circle_stroke(
                position,
                radius,
                Stroke::new(
                    if node.selected { 2.2 } else { 1.0 },
                    with_alpha(Color32::from_rgba_unmultiplied(15, 15, 15, 190), alpha),
                ),
            );
            if node.highlighted {
                painter.circle_stroke(
                    position,
                    radius + 4.0,
                    Stroke::new(1.6, with_alpha(TRACED_COLOR, alpha)),
                );
            }

            painter.text(
                position,
                Align2::CENTER_CENTER,
                &node.attrs.icon,
                FontId::proportional((radius * 1.1).clamp(9.0, 30.0)),
                with_alpha(Color32::from_gray(240), alpha),
            );

            let show_label =
                node.selected || node.hovered || node.highlighted || is_match || zoom > 0.45;
            if show_label {
                painter.text(
                    position + vec2(0.0, radius + 6.0),
                    Align2::CENTER_TOP,
                    &node.attrs.name,
                    FontId::proportional((12.0 * zoom).clamp(9.0, 16.0)),
                    with_alpha(Color32::from_gray(225), alpha),
                );
            }

            for (index, badge) in node.attrs.badges.iter().enumerate() {
                let center = position + vec2(radius * 0.8, -radius * 0.8) + vec2(index as f32 * 14.0, 0.0);
                painter.circle_filled(center, 7.0, with_alpha(Color32::from_gray(235), alpha));
                painter.text(
                    center,
                    Align2::CENTER_CENTER,
                    badge,
                    FontId::proportional(9.0),
                    with_alpha(Color32::BLACK, alpha),
                );
            }

            if !node.expanded && node.child_count > 0 {
                let bubble = position + vec2(radius * 0.8, radius * 0.8);
                painter.circle_filled(bubble, 9.0, with_alpha(GROUP_COLOR, alpha));
                painter.text(
                    bubble,
                    Align2::CENTER_CENTER,
                    format!("+{}", node.child_count),
                    FontId::proportional(9.0),
                    with_alpha(Color32::BLACK, alpha),
                );
            }

            if node.pinned {
                painter.text(
                    position + vec2(-radius * 0.9, -radius * 0.9),
                    Align2::CENTER_CENTER,
                    "📌",
                    FontId::proportional(12.0),
                    with_alpha(Color32::from_gray(240), alpha),
                );
            }
        }

        // ghosts of elements fading out; link tracks carry no geometry
        for (key, sample) in self.anim.exiting(now) {
            if key.starts_with("link:") {
                continue;
            }
            let position = to_screen(sample.position);
            painter.circle_filled(
                position,
                radius,
                with_alpha(dim_color(NODE_COLOR, 0.6), sample.alpha),
            );
        }

        if scene.nodes.is_empty() && scene.groups.is_empty() {
            painter.text(
                rect.center(),
                Align2::CENTER_CENTER,
                "No nodes visible for the active tag filters.",
                FontId::proportional(14.0),
                Color32::from_gray(160),
            );
        }

        let hovered_node = pointer.and_then(|pointer| {
            node_hits
                .iter()
                .map(|(id, position)| (id, position.distance(pointer)))
                .filter(|(_, distance)| *distance <= radius)
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(id, _)| id.clone())
        });
        self.hover(hovered_node.clone());
        if hovered_node.is_some() {
            ui.output_mut(|output| {
                output.cursor_icon = egui::CursorIcon::PointingHand;
            });
        }

        if response.double_clicked() {
            if let Some(id) = &hovered_node {
                self.register_double_click(id);
            }
        } else if response.clicked() {
            if let Some(id) = &hovered_node {
                self.register_click(id, now, ctrl);
            } else if let Some(pointer) = pointer {
                let group_hit = group_hits
                    .iter()
                    .find(|(hit_rect, _, _)| hit_rect.contains(pointer))
                    .map(|(_, gid, action)| (gid.clone(), *action));
                let link_hit = scene
                    .links
                    .iter()
                    .find(|link| {
                        segment_distance(pointer, to_screen(link.source), to_screen(link.target))
                            <= 6.0
                    })
                    .map(|link| link.id.clone());

                if let Some((gid, action)) = group_hit {
                    match action {
                        GroupAction::Toggle => self.toggle_group(&gid),
                        GroupAction::Prev => self.group_prev(&gid),
                        GroupAction::Next => self.group_next(&gid),
                        GroupAction::ShowAll => self.group_show_all(&gid),
                    }
                } else if let Some(link_id) = link_hit {
                    self.select_link(&link_id, ctrl);
                } else {
                    self.unselect_all();
                }
            }
        }

        if response.secondary_clicked() && hovered_node.is_some() {
            self.context_target = hovered_node.clone();
        }
        if let Some(target) = self.context_target.clone()
            && let Some(node) = self.store.node(&target)
        {
            let entries = (self.config.node_menu)(node);
            let mut chosen = None;
            response.context_menu(|ui| {
                for entry in &entries {
                    if ui
                        .add_enabled(!entry.disabled, egui::Button::new(&entry.label))
                        .clicked()
                    {
                        chosen = Some(entry.command);
                        ui.close();
                    }
                }
            });
            if let Some(command) = chosen {
                self.apply_menu_command(&target, command);
                self.context_target = None;
            }
        }

        self.flush_pending_click(now);
        if self.pending_click.is_some() || self.anim.prune(now) {
            ui.ctx().request_repaint();
        }

        self.prev_nodes = node_ids;
        self.prev_groups = group_ids;
        self.prev_links = link_ids;
    }
}
