use std::collections::HashMap;

use eframe::egui::Vec2;

/// Transition length in seconds, shared by position moves and fades.
pub const TRANSITION_SECS: f64 = 0.5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Enter,
    Move,
    Exit,
}

#[derive(Clone, Copy, Debug)]
struct Track {
    from: Vec2,
    to: Vec2,
    alpha_from: f32,
    alpha_to: f32,
    started_at: f64,
    phase: Phase,
}

impl Track {
    fn progress(&self, now: f64) -> f32 {
        let t = ((now - self.started_at) / TRANSITION_SECS).clamp(0.0, 1.0) as f32;
        // smoothstep
        t * t * (3.0 - 2.0 * t)
    }

    fn position(&self, now: f64) -> Vec2 {
        let t = self.progress(now);
        self.from + (self.to - self.from) * t
    }

    fn alpha(&self, now: f64) -> f32 {
        let t = self.progress(now);
        self.alpha_from + (self.alpha_to - self.alpha_from) * t
    }

    fn done(&self, now: f64) -> bool {
        now - self.started_at >= TRANSITION_SECS
    }
}

/// Per-element transition tracks keyed by element id. Elements enter with a
/// fade-in, move towards retargeted positions, and fade out on exit before
/// being pruned. Retargeting an in-flight track restarts it from the current
/// interpolated value, never from the stale endpoint.
#[derive(Default)]
pub struct Animator {
    tracks: HashMap<String, Track>,
}

pub struct Sample {
    pub position: Vec2,
    pub alpha: f32,
    pub exiting: bool,
}

impl Animator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare where an element should be. New ids start an enter fade at
    /// the target; known ids start a move when the target changed.
    pub fn target(&mut self, id: &str, position: Vec2, now: f64) {
        match self.tracks.get_mut(id) {
            None => {
                self.tracks.insert(
                    id.to_owned(),
                    Track {
                        from: position,
                        to: position,
                        alpha_from: 0.0,
                        alpha_to: 1.0,
                        started_at: now,
                        phase: Phase::Enter,
                    },
                );
            }
            Some(track) => {
                if track.phase == Phase::Exit {
                    // element came back mid-fade: revive it in place
                    *track = Track {
                        from: track.position(now),
                        to: position,
                        alpha_from: track.alpha(now),
                        alpha_to: 1.0,
                        started_at: now,
                        phase: Phase::Move,
                    };
                } else if track.to != position {
                    *track = Track {
                        from: track.position(now),
                        to: position,
                        alpha_from: track.alpha(now),
                        alpha_to: 1.0,
                        started_at: now,
                        phase: Phase::Move,
                    };
                }
            }
        }
    }

    pub fn exit(&mut self, id: &str, now: f64) {
        if let Some(track) = self.tracks.get_mut(id)
            && track.phase != Phase::Exit
        {
            *track = Track {
                from: track.position(now),
                to: track.position(now),
                alpha_from: track.alpha(now),
                alpha_to: 0.0,
                started_at: now,
                phase: Phase::Exit,
            };
        }
    }

    pub fn sample(&self, id: &str, now: f64) -> Option<Sample> {
        self.tracks.get(id).map(|track| Sample {
            position: track.position(now),
            alpha: track.alpha(now),
            exiting: track.phase == Phase::Exit,
        })
    }

    /// Drop exit tracks that have fully faded. Returns true when any track
    /// is still in flight, i.e. another repaint is needed.
    pub fn prune(&mut self, now: f64) -> bool {
        self.tracks
            .retain(|_, track| !(track.phase == Phase::Exit && track.done(now)));
        self.tracks.values().any(|track| !track.done(now))
    }

    /// Tracks currently fading out, for drawing exit ghosts of elements that
    /// are no longer part of the scene.
    pub fn exiting(&self, now: f64) -> impl Iterator<Item = (&str, Sample)> {
        self.tracks
            .iter()
            .filter(|(_, track)| track.phase == Phase::Exit)
            .map(move |(id, track)| {
                (
                    id.as_str(),
                    Sample {
                        position: track.position(now),
                        alpha: track.alpha(now),
                        exiting: true,
                    },
                )
            })
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
    }

    pub fn is_tracked(&self, id: &str) -> bool {
        self.tracks.contains_key(id)
    }
}
