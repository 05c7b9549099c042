pub mod color_usage;
pub mod history;
pub mod palette;
pub mod tools;
