//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Fetch URLs through one persistent HTTP session.
///
/// Fetcher downloads every URL into the output directory using shared
/// headers and cookies, optionally clearing anti-bot challenges first.
#[derive(Parser, Debug)]
#[command(name = "fetcher")]
#[command(author, version, about)]
pub struct Args {
    /// URLs to download (read from stdin when omitted)
    pub urls: Vec<String>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Directory downloads are written to [default: .]
    #[arg(short = 'o', long)]
    pub output_dir: Option<PathBuf>,

    /// Maximum concurrent downloads (1-100) [default: 10]
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: Option<u8>,

    /// Connect-failure retries per request (0-10) [default: 3]
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u8).range(0..=10))]
    pub max_retries: Option<u8>,

    /// Extra session header, as `Name: value` (repeatable)
    #[arg(short = 'H', long = "header", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Session cookie, as `name=value` (repeatable)
    #[arg(long = "cookie", value_parser = parse_cookie)]
    pub cookies: Vec<(String, String)>,

    /// Session User-Agent
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Session Referer
    #[arg(long)]
    pub referer: Option<String>,

    /// Do not send the Referer header with downloads
    #[arg(long)]
    pub no_referer: bool,

    /// Clear the anti-bot challenge of each origin before downloading
    #[arg(long)]
    pub challenge: bool,

    /// Per-request timeout in seconds (1-3600)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub timeout: Option<u64>,

    /// Skip TLS certificate verification
    #[arg(long)]
    pub insecure: bool,

    /// Config file to use instead of the default location
    #[arg(long)]
    pub config: Option<PathBuf>,
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected `Name: value`, got {raw:?}"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("header name is empty in {raw:?}"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

fn parse_cookie(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected `name=value`, got {raw:?}"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("cookie name is empty in {raw:?}"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}
