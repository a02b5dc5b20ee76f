pub mod commands;
pub mod handlers;

// Re-export commonly used handler functions for convenience
pub use handlers::{CrawlCommand, parse_seed_url, parse_url_line, write_report};

// Re-export crawl functionality from arachne-core
pub use arachne_core::crawl::{CrawlOptions, execute_crawl, extract_url_path};

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);
