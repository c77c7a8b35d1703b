//! Access-Sweep main entry point
//!
//! This is the command-line interface for the Access-Sweep audit crawler.

use access_sweep::browser::driver_factory;
use access_sweep::config::{load_config_with_hash, stamp_audit_name, BrowserFamily, Config};
use access_sweep::crawler::{run_workers, CrawlContext};
use access_sweep::output::{
    collect_statistics, import_sites, print_statistics, shuffle_sites, verify_pages_scanned,
    CsvSinks, ProgressBar, ResultSink,
};
use access_sweep::state::{Analytics, SiteAssignment};
use access_sweep::url::{netloc, UrlFilter};
use anyhow::Context;
use clap::Parser;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

/// Access-Sweep: a browser-driven accessibility audit crawler
///
/// Access-Sweep loads every configured site in a real browser, follows links
/// within each site up to a page cap, runs the enabled audit plugins at every
/// viewport and writes the results as CSV files.
#[derive(Parser, Debug)]
#[command(name = "access-sweep")]
#[command(version = "1.0.0")]
#[command(about = "A browser-driven accessibility audit crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors and do not print the progress bar
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and list the sites that would be audited, then exit
    #[arg(long)]
    dry_run: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load configuration {}", cli.config.display()))?;
    config.audit.audit_name = stamp_audit_name(&config.audit.audit_name, &chrono::Local::now());

    let results_dir = config.results_dir();
    fs::create_dir_all(&results_dir)
        .with_context(|| format!("failed to create {}", results_dir.display()))?;
    fs::copy(&cli.config, results_dir.join("config.toml"))
        .context("failed to copy the configuration into the results directory")?;
    fs::write(results_dir.join("config.sha256"), &config_hash)?;

    setup_logging(&results_dir, &config.audit.audit_name, cli.verbose, cli.quiet)?;
    tracing::info!(
        "Configuration loaded from {} (hash: {})",
        cli.config.display(),
        config_hash
    );
    if let (BrowserFamily::Chrome, Some(driver)) =
        (config.browser.family, &config.browser.chrome_driver_location)
    {
        tracing::info!(
            "chrome-driver-location {} is ignored; the browser is driven over DevTools",
            driver.display()
        );
    }

    let mut sites = import_sites(&config).context("failed to import the site lists")?;
    if config.audit.shuffle_base_urls {
        shuffle_sites(&mut sites, &mut rand::thread_rng());
    }

    if cli.dry_run {
        print_plan(&config, &sites);
        return Ok(());
    }

    handle_audit(config, sites, cli.quiet)
}

/// Routes log lines to `<results>/<audit>.log`
fn setup_logging(results_dir: &Path, audit_name: &str, verbose: u8, quiet: bool) -> anyhow::Result<()> {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("access_sweep=info,warn"),
            1 => EnvFilter::new("access_sweep=debug,info"),
            2 => EnvFilter::new("access_sweep=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    let log_path = results_dir.join(format!("{}.log", audit_name));
    let log_file = File::create(&log_path)
        .with_context(|| format!("failed to create log file {}", log_path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(log_file))
        .with_ansi(false)
        .with_target(false)
        .with_thread_names(true)
        .init();
    Ok(())
}

fn print_plan(config: &Config, sites: &[SiteAssignment]) {
    println!("=== Access-Sweep Dry Run ===\n");
    println!("Audit: {}", config.audit.audit_name);
    println!("  Results: {}", config.results_dir().display());
    println!("  Browser: {:?}", config.browser.family);
    println!("  Workers: {}", config.audit.thread_count);
    println!("  Pages per site: {}", config.audit.max_links_per_domain);

    println!("\nViewports ({}):", config.viewports.len());
    for viewport in &config.viewports {
        println!("  - {} ({}x{})", viewport.name, viewport.width, viewport.height);
    }

    println!("\nPlugins:");
    for plugin in config.enabled_plugins() {
        match &plugin.viewport_to_test {
            Some(viewport) => println!("  - {} (only at {})", plugin.name, viewport),
            None => println!("  - {}", plugin.name),
        }
    }

    println!("\nSites ({}):", sites.len());
    for site in sites {
        println!(
            "  - {} [{}] {}{}",
            site.organisation,
            site.sector,
            site.url,
            if site.supports_head { "" } else { " (GET only)" }
        );
    }
}

fn handle_audit(config: Config, sites: Vec<SiteAssignment>, quiet: bool) -> anyhow::Result<()> {
    let config = Arc::new(config);
    let sinks: Arc<dyn ResultSink> = Arc::new(CsvSinks::new(config.results_dir()));

    let progress = if quiet {
        ProgressBar::quiet(Arc::clone(&sinks))
    } else {
        ProgressBar::new(Arc::clone(&sinks))
    };
    let analytics = Arc::new(
        Analytics::new(config.audit.max_links_per_domain).with_sink(Arc::new(progress)),
    );
    for site in &sites {
        analytics.add_base_url(&site.url);
    }

    let netlocs: Vec<String> = sites
        .iter()
        .filter_map(|site| url::Url::parse(&site.url).ok())
        .filter_map(|url| netloc(&url))
        .collect();
    let url_filter = UrlFilter::standard(config.crawler.only_allow_https, netlocs);

    let ctx = CrawlContext::new(Arc::clone(&config), Arc::clone(&analytics), url_filter, sinks)?;
    let factory = driver_factory(&config.browser, &config.results_dir());

    let summary = run_workers(&ctx, factory, sites).map_err(|e| {
        tracing::error!("Audit aborted: {}", e);
        e
    })?;
    tracing::info!(
        "Crawled {} sites ({} failed), {} pages audited",
        summary.sites_crawled,
        summary.sites_failed,
        summary.pages_scanned
    );

    let stats = collect_statistics(&analytics);
    verify_pages_scanned(&stats);
    if !quiet {
        print_statistics(&stats);
    }
    Ok(())
}
