use crate::CLAP_STYLING;
use crate::handlers::parse_seed_url;
use arachne_core::crawl::DEFAULT_URL;
use clap::arg;

pub fn command_argument_builder() -> clap::Command {
    clap::Command::new("arachne")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("arachne")
        .about("Crawl a site to a fixed depth and print the discovered link hierarchy")
        .styles(CLAP_STYLING)
        .arg(arg!(-q --"quiet" "Suppress banner, progress and informational logs").required(false))
        .arg(
            arg!(-u --"url" <URL>)
                .required(false)
                .help("The URL to start crawling from")
                .value_parser(parse_seed_url)
                .default_value(DEFAULT_URL),
        )
        .arg(
            arg!(-d --"depth" <DEPTH>)
                .required(false)
                .help("How many levels of links to follow, the seed being level one")
                .value_parser(clap::value_parser!(usize))
                .default_value("3"),
        )
        .arg(
            arg!(-t --"timeout" <SECONDS>)
                .required(false)
                .help("Per-fetch timeout in seconds")
                .value_parser(clap::value_parser!(u64).range(1..))
                .default_value("5"),
        )
        .arg(
            arg!(--"strict")
                .required(false)
                .help("Record transport errors as failures instead of empty pages")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            arg!(-f --"format" <FORMAT>)
                .required(false)
                .help("Report format: text, json")
                .value_parser(["text", "json"])
                .default_value("text"),
        )
        .arg(
            arg!(-o --"output" <PATH>)
                .required(false)
                .help("Save report to file (default: print to stdout)"),
        )
}
