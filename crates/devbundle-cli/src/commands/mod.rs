pub mod config;
pub mod css;
pub mod dev;
pub mod entries;
pub mod version;
