pub mod crawl;
pub mod graph;
pub mod render;
pub mod report;

pub use graph::{TreeNode, build_tree};
pub use render::render_tree;

const BANNER: &str = r#"
   __ _ _ __ __ _  ___| |__  _ __   ___
  / _` | '__/ _` |/ __| '_ \| '_ \ / _ \
 | (_| | | | (_| | (__| | | | | | |  __/
  \__,_|_|  \__,_|\___|_| |_|_| |_|\___|
"#;

/// Prints the banner to stderr so stdout carries only the report.
pub fn print_banner() {
    eprintln!("{}", BANNER);
    eprintln!("  bounded-depth link crawler v{}\n", env!("CARGO_PKG_VERSION"));
}
