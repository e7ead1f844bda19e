pub mod actions;
pub mod catalog;
pub mod components;
pub mod constants;
pub mod level;
pub mod player;
pub mod systems;
