use anyhow::Context;
use arachne_core::crawl::{CrawlFailureCallback, CrawlOptions, execute_crawl, http_fetcher};
use arachne_core::report::{ReportFormat, generate_report, save_report};
use arachne_scanner::TransportPolicy;
use clap::ArgMatches;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

/// Parse a single line as a URL, trying to add http:// if needed
pub fn parse_url_line(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    // Try to parse as-is
    if Url::parse(line).is_ok() {
        return Some(line.to_string());
    }

    // Try adding http://
    let with_scheme = format!("http://{}", line);
    if Url::parse(&with_scheme).is_ok() {
        return Some(with_scheme);
    }

    None
}

/// clap value parser for the seed URL. The result is normalized so that
/// links back to the seed compare equal to it.
pub fn parse_seed_url(value: &str) -> Result<String, String> {
    parse_url_line(value)
        .and_then(|line| Url::parse(&line).ok())
        .map(|url| url.to_string())
        .ok_or_else(|| format!("'{}' is not a valid URL", value))
}

/// Everything the crawl handler needs, pulled out of the parsed arguments.
#[derive(Debug, Clone)]
pub struct CrawlCommand {
    pub options: CrawlOptions,
    pub format: ReportFormat,
    pub output: Option<PathBuf>,
    pub quiet: bool,
}

impl CrawlCommand {
    pub fn from_matches(matches: &ArgMatches) -> Result<Self, String> {
        let quiet = matches.get_flag("quiet");
        let url = matches
            .get_one::<String>("url")
            .cloned()
            .ok_or_else(|| "--url is required".to_string())?;
        let max_depth = *matches.get_one::<usize>("depth").unwrap_or(&3);
        let timeout = *matches.get_one::<u64>("timeout").unwrap_or(&5);
        let transport = if matches.get_flag("strict") {
            TransportPolicy::Strict
        } else {
            TransportPolicy::Lenient
        };

        let format_name = matches
            .get_one::<String>("format")
            .map(String::as_str)
            .unwrap_or("text");
        let format = ReportFormat::from_str(format_name)
            .ok_or_else(|| format!("Unknown report format '{}'", format_name))?;

        let output = matches
            .get_one::<String>("output")
            .map(|path| PathBuf::from(shellexpand::tilde(path).into_owned()));

        Ok(Self {
            options: CrawlOptions {
                url,
                max_depth,
                timeout: Duration::from_secs(timeout),
                transport,
                show_progress_bars: !quiet,
            },
            format,
            output,
            quiet,
        })
    }
}

/// Render the report and either print it or write it to `output`.
pub fn write_report(
    data: &arachne_core::report::ReportData,
    format: ReportFormat,
    output: Option<&PathBuf>,
) -> anyhow::Result<Option<String>> {
    let report = generate_report(data, format).context("Failed to serialize report")?;
    match output {
        Some(path) => {
            save_report(&report, path)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            Ok(None)
        }
        None => Ok(Some(report)),
    }
}

fn init_tracing(quiet: bool) {
    let level = if quiet {
        tracing::Level::WARN
    } else {
        tracing::Level::INFO
    };
    // Logs go to stderr so the report owns stdout.
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .try_init();
}

pub async fn handle_crawl(matches: &ArgMatches) {
    let command = match CrawlCommand::from_matches(matches) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{} {}", "✗".red().bold(), e);
            std::process::exit(1);
        }
    };
    init_tracing(command.quiet);
    debug!("Crawl configuration: {:?}", command);

    let CrawlCommand {
        options,
        format,
        output,
        quiet,
    } = command;

    if !quiet {
        eprintln!(
            "{} Crawling {} with depth: {}",
            "→".blue(),
            options.url.bright_white(),
            options.max_depth
        );
    }

    let fetcher = match http_fetcher(&options) {
        Ok(fetcher) => fetcher,
        Err(e) => {
            eprintln!("{} Failed to create HTTP client: {}", "✗".red().bold(), e);
            std::process::exit(1);
        }
    };

    let cancel = CancellationToken::new();
    let ctrl_c_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_token.cancel();
        }
    });

    let failure_callback: CrawlFailureCallback = Arc::new(|line: String| {
        eprintln!("{}", line.red());
    });

    let data = execute_crawl(options, fetcher, cancel, Some(failure_callback)).await;

    if !quiet {
        eprintln!("{} Fetching stats & building hierarchy\n", "✓".green().bold());
    }

    match write_report(&data, format, output.as_ref()) {
        Ok(Some(report)) => print!("{}", report),
        Ok(None) => {
            if let Some(path) = output {
                eprintln!(
                    "{} Report saved to {}",
                    "✓".green().bold(),
                    path.display().to_string().bright_white()
                );
            }
        }
        Err(e) => {
            eprintln!("{} {:#}", "✗".red().bold(), e);
            std::process::exit(1);
        }
    }
}
