pub mod event;
pub mod pattern;
