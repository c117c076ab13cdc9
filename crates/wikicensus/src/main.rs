use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser};
use env_logger::Builder;
use log::{LevelFilter, error, info};
use wikicensus_core::api::ConfluenceClient;
use wikicensus_core::config::CrawlConfig;
use wikicensus_core::crawl::{CrawlOptions, crawl_all, crawl_space_keys};
use wikicensus_core::report::{
    DEFAULT_INDEX_FILENAME, ReportOptions, ReportSummary, write_report, write_space_pages,
};

#[derive(Debug, Parser)]
#[command(
    name = "wikicensus",
    version,
    about = "Crawl Confluence spaces and pages into a static HTML census"
)]
struct Cli {
    /// Crawl every space and write the index plus one page per space
    #[arg(long)]
    all: bool,
    /// Fetch pages and blog posts of each space (default)
    #[arg(long, overrides_with = "no_pages")]
    pages: bool,
    /// Only list spaces
    #[arg(long, overrides_with = "pages")]
    no_pages: bool,
    /// Crawl only these spaces and write their pages
    #[arg(value_name = "SPACE_KEY")]
    space_keys: Vec<String>,
    #[arg(long, value_name = "DIR", default_value = "html")]
    htmldir: PathBuf,
    #[arg(long, value_name = "FILE", default_value = DEFAULT_INDEX_FILENAME)]
    index_name: String,
    /// Credentials file (defaults to ./keys.toml when present)
    #[arg(long, value_name = "PATH")]
    keys: Option<PathBuf>,
    /// Skip the analytics view counts even when a session token is configured
    #[arg(long)]
    no_views: bool,
    /// Skip the per-page read restriction lookups
    #[arg(long)]
    no_restrictions: bool,
    /// Skip the per-page label lookups
    #[arg(long)]
    no_labels: bool,
    #[arg(long, short, action = clap::ArgAction::Count, help = "More output, starting from info: -v debug, -vv trace")]
    verbose: u8,
    #[arg(long, short, action = clap::ArgAction::Count, help = "Less output, starting from info: -q warn, -qq error")]
    quiet: u8,
}

/// Info by default; each `-v` raises and each `-q` lowers the level by one.
fn log_level(verbose: u8, quiet: u8) -> LevelFilter {
    match 2 + i16::from(verbose) - i16::from(quiet) {
        ..=0 => LevelFilter::Error,
        1 => LevelFilter::Warn,
        2 => LevelFilter::Info,
        3 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    Builder::new()
        .filter_level(log_level(cli.verbose, cli.quiet))
        .init();

    if !cli.all && cli.space_keys.is_empty() {
        let mut command = Cli::command();
        command.print_help()?;
        println!();
        return Ok(());
    }

    run(cli).inspect_err(|err| error!("{err:#}"))
}

fn run(cli: Cli) -> Result<()> {
    if cli.all && !cli.space_keys.is_empty() {
        bail!("--all cannot be combined with explicit space keys");
    }
    validate_index_name(&cli.index_name)?;

    dotenvy::dotenv().ok();
    let config = CrawlConfig::from_env(cli.keys.as_deref())?;
    let mut client = ConfluenceClient::new(&config)?;
    let options = CrawlOptions {
        include_pages: !cli.no_pages,
        fetch_views: !cli.no_views,
        fetch_restrictions: !cli.no_restrictions,
        fetch_labels: !cli.no_labels,
    };
    let report = ReportOptions {
        output_dir: cli.htmldir.clone(),
        index_filename: cli.index_name.clone(),
    };

    let summary = if cli.all {
        info!("Crawling all spaces on {}", config.site);
        let result = crawl_all(&mut client, &options).context("crawl failed")?;
        write_report(&result, &report)?
    } else {
        let keys = normalize_keys(&cli.space_keys);
        info!("Crawling {} on {}", keys.join(", "), config.site);
        let result = crawl_space_keys(&mut client, &keys, &options).context("crawl failed")?;
        write_space_pages(&result, &report)?
    };

    print_summary(&summary, &report.output_dir);
    Ok(())
}

fn validate_index_name(name: &str) -> Result<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed.contains(['/', '\\']) || trimmed == "." || trimmed == ".." {
        bail!("--index-name must be a plain file name, got {name:?}");
    }
    Ok(())
}

/// Trimmed, deduplicated keys in the order given.
fn normalize_keys(keys: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::with_capacity(keys.len());
    for key in keys.iter().map(|key| key.trim()).filter(|key| !key.is_empty()) {
        if !normalized.iter().any(|seen| seen == key) {
            normalized.push(key.to_string());
        }
    }
    normalized
}

fn print_summary(summary: &ReportSummary, output_dir: &Path) {
    println!("report");
    println!("output_dir: {}", normalize_path(output_dir));
    println!("files_written: {}", summary.files.len());
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_pages_overrides_pages() {
        let cli = Cli::try_parse_from(["wikicensus", "--all", "--pages", "--no-pages"])
            .expect("parse args");
        assert!(cli.all);
        assert!(cli.no_pages);
        assert_eq!(log_level(cli.verbose, cli.quiet), LevelFilter::Info);
        assert_eq!(cli.htmldir, PathBuf::from("html"));
        assert_eq!(cli.index_name, DEFAULT_INDEX_FILENAME);
    }

    #[test]
    fn verbosity_flags_move_away_from_info() {
        let louder = Cli::try_parse_from(["wikicensus", "--all", "-v"]).expect("parse args");
        assert_eq!(log_level(louder.verbose, louder.quiet), LevelFilter::Debug);
        let loudest = Cli::try_parse_from(["wikicensus", "--all", "-vvv"]).expect("parse args");
        assert_eq!(log_level(loudest.verbose, loudest.quiet), LevelFilter::Trace);
        let quieter = Cli::try_parse_from(["wikicensus", "--all", "-q"]).expect("parse args");
        assert_eq!(log_level(quieter.verbose, quieter.quiet), LevelFilter::Warn);
        let silent = Cli::try_parse_from(["wikicensus", "--all", "-qqq"]).expect("parse args");
        assert_eq!(log_level(silent.verbose, silent.quiet), LevelFilter::Error);
    }

    #[test]
    fn detail_lookups_have_opt_outs() {
        let cli = Cli::try_parse_from(["wikicensus", "ENG", "--no-restrictions", "--no-labels"])
            .expect("parse args");
        assert!(cli.no_restrictions);
        assert!(cli.no_labels);
        assert!(!cli.no_views);
    }

    #[test]
    fn space_keys_are_positional() {
        let cli = Cli::try_parse_from(["wikicensus", "ENG", "OPS", "--htmldir", "out"])
            .expect("parse args");
        assert_eq!(cli.space_keys, vec!["ENG", "OPS"]);
        assert_eq!(cli.htmldir, PathBuf::from("out"));
    }

    #[test]
    fn all_with_keys_is_rejected() {
        let cli = Cli::try_parse_from(["wikicensus", "--all", "ENG"]).expect("parse args");
        let err = run(cli).expect_err("must reject");
        assert!(err.to_string().contains("--all"));
    }

    #[test]
    fn index_name_must_be_a_file_name() {
        assert!(validate_index_name("spaces.html").is_ok());
        assert!(validate_index_name("../index.html").is_err());
        assert!(validate_index_name(" ").is_err());
    }

    #[test]
    fn keys_are_trimmed_and_deduplicated() {
        let keys = vec![" ENG ".to_string(), "OPS".to_string(), "ENG".to_string()];
        assert_eq!(normalize_keys(&keys), vec!["ENG", "OPS"]);
    }
}
