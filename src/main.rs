//! CLI entry point for the fetcher tool.

use std::collections::BTreeSet;
use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use fetcher_core::{
    ChallengeSolver, ConcurrentFetcher, DEFAULT_WORKERS, RequestExecutor, RequestOptions,
    SessionManager,
};
use tracing::{debug, info, warn};
use url::Url;

mod app_config;
mod cli;
mod output_names;
mod progress;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let loaded = app_config::load_config(args.config.as_deref())?;
    if loaded.loaded_from_file {
        debug!(path = ?loaded.path, "config file loaded");
    }
    let file = loaded.config;

    let input_text = if !args.urls.is_empty() {
        args.urls.join("\n")
    } else if !io::stdin().is_terminal() {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        info!("No input provided. Pipe URLs via stdin or pass as arguments.");
        info!("Example: echo 'https://example.com/file.jpg' | fetcher");
        return Ok(());
    };

    let urls: Vec<String> = input_text
        .split_whitespace()
        .filter(|candidate| match Url::parse(candidate) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => true,
            _ => {
                warn!(input = %candidate, "Skipped unrecognized input");
                false
            }
        })
        .map(ToString::to_string)
        .collect();
    if urls.is_empty() {
        info!("No valid URLs found in input");
        return Ok(());
    }

    let mut session_config = file.session.clone();
    if let Some(max_retries) = args.max_retries {
        session_config.max_retries = u32::from(max_retries);
    }
    if args.insecure {
        session_config.verify_tls = false;
    }
    session_config.validate()?;

    let mut headers: Vec<(String, String)> = file.headers.clone().into_iter().collect();
    if let Some(user_agent) = args.user_agent.clone().or(file.user_agent.clone()) {
        headers.push(("User-Agent".to_string(), user_agent));
    }
    if let Some(referer) = args.referer.clone().or(file.referer.clone()) {
        headers.push(("Referer".to_string(), referer));
    }
    headers.extend(args.headers.iter().cloned());

    let session = Arc::new(
        SessionManager::open_with_config(headers, session_config)
            .context("Failed to open HTTP session")?,
    );
    if !args.cookies.is_empty() {
        session.update_cookies(args.cookies.iter().cloned())?;
    }

    if args.challenge {
        let solver = ChallengeSolver::new(Arc::clone(&session));
        for origin in origins(&urls) {
            match solver.solve(&origin, Vec::<(String, String)>::new()).await {
                Ok(result) => info!(origin = %origin, tokens = result.tokens.len(), "challenge cleared"),
                Err(e) => warn!(origin = %origin, error = %e, "challenge not cleared"),
            }
        }
    }

    let output_dir = args
        .output_dir
        .clone()
        .or(file.output_dir.clone())
        .unwrap_or_else(|| PathBuf::from("."));
    tokio::fs::create_dir_all(&output_dir)
        .await
        .with_context(|| format!("Failed to create output directory '{}'", output_dir.display()))?;

    let workers = args
        .concurrency
        .or(file.concurrency)
        .map_or(DEFAULT_WORKERS, usize::from);
    let fetcher = ConcurrentFetcher::new(workers)?;

    let mut options = RequestOptions::new().has_referer(!args.no_referer);
    if let Some(timeout) = args.timeout {
        options = options.timeout(Duration::from_secs(timeout));
    }

    info!(urls = urls.len(), workers, output_dir = %output_dir.display(), "Fetcher starting");
    let names = output_names::plan_names(&output_dir, &urls);
    let bar = progress::download_bar(urls.len(), args.quiet);
    let executor = RequestExecutor::new(Arc::clone(&session));
    let job_bar = bar.clone();
    let stats = fetcher
        .run(
            move |url, name: String| {
                let executor = executor.clone();
                let output_dir = output_dir.clone();
                let options = options.clone();
                let bar = job_bar.clone();
                async move {
                    bar.set_message(url.clone());
                    let result = executor
                        .download_with(&url, &output_dir, Some(&name), options)
                        .await;
                    bar.inc(1);
                    if let Ok(path) = &result {
                        debug!(url = %url, path = %path.display(), "saved");
                    }
                    result
                }
            },
            urls.into_iter().zip(names),
        )
        .await?;
    bar.finish_and_clear();

    session.close(true);
    info!(
        completed = stats.completed(),
        failed = stats.failed(),
        panicked = stats.panicked(),
        total = stats.total(),
        "Download complete"
    );

    Ok(())
}

/// Distinct `scheme://host[:port]/` roots of `urls`, in first-seen order.
fn origins(urls: &[String]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    urls.iter()
        .filter_map(|raw| Url::parse(raw).ok())
        .map(|url| url.origin().ascii_serialization() + "/")
        .filter(|origin| seen.insert(origin.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::origins;

    #[test]
    fn test_origins_are_deduplicated_in_order() {
        let urls = vec![
            "https://b.example/1.jpg".to_string(),
            "https://a.example/x".to_string(),
            "https://b.example/2.jpg".to_string(),
            "http://b.example:8080/3".to_string(),
        ];
        assert_eq!(
            origins(&urls),
            vec![
                "https://b.example/".to_string(),
                "https://a.example/".to_string(),
                "http://b.example:8080/".to_string(),
            ]
        );
    }
}
