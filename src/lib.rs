//! BeadCanvas: editing core for bead and pixel-art patterns.
//!
//! A [`project::Session`] owns the grid, history, palette and renderer of one
//! open pattern. Hosts feed pointer input through
//! [`components::tools::InteractionController`] and read the rendered layers
//! back from `session.renderer.surfaces`.

#![allow(clippy::too_many_arguments)]
#![allow(clippy::type_complexity)]

pub mod logger;

pub mod canvas;
pub mod cli;
pub mod components;
pub mod ops;
pub mod project;
pub mod render;
pub mod selection;
pub mod settings;
pub mod signals;
pub mod symmetry;
pub mod util;

pub use canvas::{Cell, CanvasState};
pub use components::palette::{CellKind, DisplayMode, Palette, PaletteEntry};
pub use project::{CreateOptions, Session};
