//! Configuration module for Pricewatch
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use pricewatch::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("config.toml")).unwrap();
//! println!("Run {} in {} mode", config.run.name, config.run.mode.as_str());
//! ```

mod parser;
mod types;
mod validation;

pub use types::{
    Config, CrawlerConfig, FieldRule, OutputConfig, PaginationConfig, PaginationStrategy,
    ProductConfig, RunConfig, RunMode, SiteConfig, UserAgentConfig,
};

pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
