pub mod canvas_ops;
pub mod export;
pub mod fill;
pub mod scripting;
pub mod text;
