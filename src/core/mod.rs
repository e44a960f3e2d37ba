pub mod catalog;
pub mod images;
pub mod params;
pub mod scenarios;
pub mod settings;
pub mod setup;
pub mod system;
