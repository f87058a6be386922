pub mod generate;
pub mod load_config;
pub mod stage;
