pub mod dump_config;
pub mod estimate;
