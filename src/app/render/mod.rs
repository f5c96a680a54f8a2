pub mod anim;
pub mod diff;
mod draw;
pub mod scene;
