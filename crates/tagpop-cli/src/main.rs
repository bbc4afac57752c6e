use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::{env, io};

use anyhow::Context;
use clap::{CommandFactory, Parser};
use clap_complete::{generate, Shell};
use tagpop_crawler::{
    CacheScope, CrawlReport, CrawlerConfig, FetchClient, NoopRenderer, NullStore, OnError,
    Pipeline, Renderer, StartLevel, TieredCache,
};
use tagpop_extract::set_name::parse_card_url;
use tagpop_extract::{
    extract_cards, extract_categories, extract_grade_rows, extract_sets, extract_years, CardCtx,
    SetCtx, SportCtx, Url, YearCtx,
};
use tagpop_store::SqliteStore;
use tokio::runtime;

const LOG_LEVELS: &str = "tagpop_crawler=info,tagpop_store=info,tagpop_extract=warn";

/// TAG population report crawler
#[derive(Debug, Parser)]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: SubCommand,
}

#[derive(Debug, clap::Subcommand)]
pub enum SubCommand {
    #[command(name = "crawl")]
    Crawl(CrawlArgs),
    #[command(name = "extract")]
    Extract(ExtractArgs),
    #[command(name = "cache")]
    Cache(CacheArgs),
    #[command(hide = true)]
    Completion,
}

/// Crawl population reports into a SQLite database
#[derive(Debug, clap::Args)]
pub struct CrawlArgs {
    /// Path to the SQLite database receiving crawled rows
    #[arg(long, default_value = "tagpop.db")]
    pub db: PathBuf,
    /// Optional default crawler yaml configuration file
    #[arg(env = "TAGPOP_CRAWLER_CONFIG", long)]
    pub crawler_config: Option<PathBuf>,
    /// Write the run report as JSON to this file
    #[arg(long)]
    pub report: Option<PathBuf>,
    /// Override the site root
    #[arg(long)]
    pub base_url: Option<String>,
    /// Override crawler's user agent
    #[arg(long)]
    pub user_agent: Option<String>,
    /// Override the request timeout, in seconds
    #[arg(long)]
    pub request_timeout: Option<u64>,
    /// Override the minimum gap between requests to one host, in seconds
    #[arg(long)]
    pub min_request_interval: Option<f32>,
    /// Override the idle connections kept per host
    #[arg(long)]
    pub max_connections_per_host: Option<usize>,
    /// Render pages that need JavaScript with headless Chromium
    #[arg(long)]
    pub render: bool,
    /// Override the rendering timeout, in seconds
    #[arg(long)]
    pub render_timeout: Option<u64>,
    /// Override the length under which a page is considered a shell
    #[arg(long)]
    pub min_document_length: Option<usize>,
    /// Override how many years are crawled at once
    #[arg(long)]
    pub concurrent_years: Option<usize>,
    /// Override how many sets are crawled at once per year
    #[arg(long)]
    pub concurrent_sets: Option<usize>,
    /// Override how many cards are crawled at once per set
    #[arg(long)]
    pub concurrent_cards: Option<usize>,
    /// Override the attempts made for each page
    #[arg(long)]
    pub max_attempts: Option<u32>,
    /// Override the exponential backoff base, in seconds
    #[arg(long)]
    pub backoff_base: Option<f64>,
    /// Override the maximum random jitter added to backoffs, in seconds
    #[arg(long)]
    pub jitter_max: Option<f64>,
    /// Override the durable cache directory
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,
    /// Fetch every page, bypassing the cache
    #[arg(long)]
    pub no_cache: bool,
    /// Override the number of rows written per transaction
    #[arg(long)]
    pub batch_size: Option<usize>,
    /// Crawl and extract without writing anything
    #[arg(long)]
    pub dry_run: bool,
    /// Override the level the crawl starts at
    #[arg(value_enum, long)]
    pub start_level: Option<StartLevel>,
    /// Sports to crawl, discovered from the site when absent
    #[arg(long = "sport")]
    pub sports: Vec<String>,
    /// Only crawl these years
    #[arg(long = "year")]
    pub years: Vec<String>,
    /// Only crawl these set titles
    #[arg(long = "set")]
    pub sets: Vec<String>,
    /// Only crawl these card names
    #[arg(long = "card")]
    pub cards: Vec<String>,
    /// Card pages to crawl when starting at the card level
    #[arg(long = "card-url")]
    pub card_urls: Vec<String>,
    /// Override the handling of a sport that fails
    #[arg(value_enum, long)]
    pub on_sport_error: Option<OnError>,
    /// No SIGINT handling
    #[arg(long)]
    pub no_sigint: bool,
    /// When quiet no logs are outputted
    #[arg(long, short)]
    pub quiet: bool,
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<CrawlerConfig> {
    match path {
        Some(path) => {
            let file =
                File::open(path).with_context(|| format!("Couldn't open {}", path.display()))?;
            serde_yaml::from_reader(file)
                .with_context(|| format!("Invalid crawler configuration {}", path.display()))
        }
        None => Ok(CrawlerConfig::default()),
    }
}

impl TryFrom<&CrawlArgs> for CrawlerConfig {
    type Error = anyhow::Error;

    fn try_from(args: &CrawlArgs) -> Result<Self, Self::Error> {
        let mut conf = load_config(args.crawler_config.as_ref())?;
        if let Some(base_url) = &args.base_url {
            conf.base_url = base_url.to_string();
        }
        if let Some(user_agent) = &args.user_agent {
            conf.user_agent = user_agent.to_string();
        }
        if let Some(request_timeout) = args.request_timeout {
            conf.request_timeout = request_timeout;
        }
        if let Some(min_request_interval) = args.min_request_interval {
            conf.min_request_interval = min_request_interval;
        }
        if let Some(max_connections_per_host) = args.max_connections_per_host {
            conf.max_connections_per_host = max_connections_per_host;
        }
        if args.render {
            conf.render_fallback = true;
        }
        if let Some(render_timeout) = args.render_timeout {
            conf.render_timeout = render_timeout;
        }
        if let Some(min_document_length) = args.min_document_length {
            conf.min_document_length = min_document_length;
        }
        if let Some(years) = args.concurrent_years {
            conf.concurrency.years = years;
        }
        if let Some(sets) = args.concurrent_sets {
            conf.concurrency.sets = sets;
        }
        if let Some(cards) = args.concurrent_cards {
            conf.concurrency.cards = cards;
        }
        if let Some(max_attempts) = args.max_attempts {
            conf.retry.max_attempts = max_attempts;
        }
        if let Some(backoff_base) = args.backoff_base {
            conf.retry.backoff_base = backoff_base;
        }
        if let Some(jitter_max) = args.jitter_max {
            conf.retry.jitter_max = jitter_max;
        }
        if let Some(cache_dir) = &args.cache_dir {
            conf.cache.dir = cache_dir.clone();
        }
        if args.no_cache {
            conf.cache.enabled = false;
        }
        if let Some(batch_size) = args.batch_size {
            conf.batch_size = batch_size;
        }
        if args.dry_run {
            conf.dry_run = true;
        }
        if let Some(start_level) = args.start_level {
            conf.start_level = start_level;
        }
        if !args.sports.is_empty() {
            conf.sports = args.sports.clone();
        }
        if !args.years.is_empty() {
            conf.filters.years = args.years.clone();
        }
        if !args.sets.is_empty() {
            conf.filters.sets = args.sets.clone();
        }
        if !args.cards.is_empty() {
            conf.filters.cards = args.cards.clone();
        }
        if !args.card_urls.is_empty() {
            conf.seed_card_urls = args.card_urls.clone();
        }
        if let Some(on_sport_error) = args.on_sport_error {
            conf.on_sport_error = on_sport_error;
        }
        if args.no_sigint {
            conf.handle_sigint = false;
        }
        conf.validate()?;
        Ok(conf)
    }
}

pub fn crawl(args: CrawlArgs) -> anyhow::Result<()> {
    let conf: CrawlerConfig = (&args).try_into()?;
    let rt = runtime::Builder::new_multi_thread().enable_all().build()?;
    let report = rt.block_on(run_crawl(conf, &args.db))?;

    println!("{report}");
    if let Some(path) = &args.report {
        let file =
            File::create(path).with_context(|| format!("Couldn't create {}", path.display()))?;
        serde_json::to_writer_pretty(file, &report)?;
    }
    for failed in report.failed_sports() {
        log::warn!("Sport {} failed", failed.sport);
    }
    Ok(())
}

async fn run_crawl(conf: CrawlerConfig, db: &Path) -> anyhow::Result<CrawlReport> {
    let renderer = renderer(conf.render_fallback).await?;
    if conf.dry_run {
        Pipeline::new(conf, NullStore, renderer)?.run().await
    } else {
        let store = SqliteStore::open(db, conf.batch_size)?;
        Pipeline::new(conf, store, renderer)?.run().await
    }
}

#[cfg(feature = "chromium")]
async fn renderer(enabled: bool) -> anyhow::Result<Arc<dyn Renderer>> {
    if enabled {
        Ok(Arc::new(tagpop_crawler::ChromiumRenderer::launch().await?))
    } else {
        Ok(Arc::new(NoopRenderer))
    }
}

#[cfg(not(feature = "chromium"))]
async fn renderer(enabled: bool) -> anyhow::Result<Arc<dyn Renderer>> {
    if enabled {
        log::warn!("Built without the chromium feature, pages needing rendering will fail");
    }
    Ok(Arc::new(NoopRenderer))
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum Level {
    Index,
    Sport,
    Year,
    Set,
    Card,
}

/// Extract one page and print the result as JSON to stdout
#[derive(Debug, clap::Args)]
#[command(group = clap::ArgGroup::new("page").required(true))]
pub struct ExtractArgs {
    /// Level of the page
    #[arg(value_enum, long, short)]
    pub level: Level,
    /// A local html page to extract
    #[arg(group = "page", long)]
    pub file: Option<PathBuf>,
    /// A distant page to extract
    #[arg(group = "page", long)]
    pub url: Option<String>,
    /// Site root used to resolve the links of a local page
    #[arg(long, default_value = "https://my.taggrading.com")]
    pub base_url: String,
    /// Render the page with headless Chromium when it needs JavaScript
    #[arg(long, conflicts_with = "file")]
    pub render: bool,
    /// Sport of the page, taken from a card URL when absent
    #[arg(long)]
    pub sport: Option<String>,
    #[arg(long)]
    pub year: Option<String>,
    #[arg(long)]
    pub set: Option<String>,
    #[arg(long)]
    pub card: Option<String>,
}

pub fn extract(args: ExtractArgs) -> anyhow::Result<()> {
    let (html, page) = if let Some(url) = &args.url {
        let conf = CrawlerConfig {
            render_fallback: args.render,
            min_request_interval: 0.0,
            ..Default::default()
        };
        let rt = runtime::Builder::new_current_thread().enable_all().build()?;
        let fetched = rt.block_on(async {
            let client = FetchClient::new(&conf, renderer(args.render).await?)?;
            Ok::<_, anyhow::Error>(client.fetch(url).await?)
        })?;
        (fetched.html, Url::parse(url)?)
    } else if let Some(path) = &args.file {
        let html = fs::read_to_string(path)
            .with_context(|| format!("Couldn't read {}", path.display()))?;
        (html, Url::parse(&args.base_url)?)
    } else {
        anyhow::bail!("Missing `url` or `file`");
    };

    let location = parse_card_url(&page);
    let year = args
        .year
        .clone()
        .or_else(|| location.as_ref().map(|l| l.year.clone()))
        .unwrap_or_default();
    let set_title = args
        .set
        .clone()
        .or_else(|| location.as_ref().map(|l| l.set_title.clone()))
        .unwrap_or_default();
    let sport = args
        .sport
        .clone()
        .or_else(|| location.as_ref().map(|l| l.sport.clone()))
        .unwrap_or_else(|| "Baseball".to_string());
    let page_url = page.to_string();

    let json = match args.level {
        Level::Index => serde_json::to_string_pretty(&extract_categories(&html, &page))?,
        Level::Sport => {
            let ctx = SportCtx {
                sport,
                sport_url: page_url,
            };
            serde_json::to_string_pretty(&extract_years(&html, &ctx, &page))?
        }
        Level::Year => {
            let ctx = YearCtx {
                sport,
                year,
                year_url: page_url,
            };
            serde_json::to_string_pretty(&extract_sets(&html, &ctx, &page))?
        }
        Level::Set => {
            let ctx = SetCtx {
                sport,
                year,
                set_title,
                set_url: page_url,
            };
            serde_json::to_string_pretty(&extract_cards(&html, &ctx, &page))?
        }
        Level::Card => {
            let card_name = args
                .card
                .clone()
                .or_else(|| location.as_ref().map(|l| l.card_name.clone()))
                .unwrap_or_default();
            let ctx = CardCtx {
                sport,
                year,
                set_title,
                card_name,
                card_url: page_url,
            };
            serde_json::to_string_pretty(&extract_grade_rows(&html, &ctx, &page))?
        }
    };
    println!("{json}");
    Ok(())
}

/// Inspect and prune the page cache
#[derive(Debug, clap::Args)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub cmd: CacheCmd,
    /// Optional default crawler yaml configuration file
    #[arg(env = "TAGPOP_CRAWLER_CONFIG", long, global = true)]
    pub crawler_config: Option<PathBuf>,
    /// Override the durable cache directory
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,
}

#[derive(Debug, clap::Subcommand)]
pub enum CacheCmd {
    /// Print entry counts and sizes
    Stats,
    /// Remove cached pages, all of them by default
    Clear {
        /// Only pages of this sport
        #[arg(long, conflicts_with = "scope")]
        sport: Option<String>,
        /// Only pages of this level
        #[arg(long)]
        scope: Option<CacheScope>,
    },
    /// Remove expired pages
    Cleanup,
}

pub fn cache(args: CacheArgs) -> anyhow::Result<()> {
    let mut conf = load_config(args.crawler_config.as_ref())?.cache;
    if let Some(dir) = args.cache_dir {
        conf.dir = dir;
    }
    conf.enabled = true;

    let rt = runtime::Builder::new_current_thread().enable_all().build()?;
    rt.block_on(async {
        let cache = TieredCache::new(&conf);
        match args.cmd {
            CacheCmd::Stats => println!("{}", cache.stats().await),
            CacheCmd::Clear { sport, scope } => {
                let removed = match (sport, scope) {
                    (Some(sport), _) => cache.clear_sport(&sport).await,
                    (None, Some(scope)) => cache.clear_scope(scope).await,
                    (None, None) => cache.clear_all().await,
                };
                println!("Removed {removed} cached pages");
            }
            CacheCmd::Cleanup => {
                let removed = cache.cleanup_expired().await;
                println!("Removed {removed} expired pages");
            }
        }
    });
    Ok(())
}

fn init_logs(quiet: bool) {
    if quiet {
        return;
    }
    if env::var_os("RUST_LOG").is_none() {
        env::set_var("RUST_LOG", LOG_LEVELS);
    }
    env_logger::init();
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.cmd {
        SubCommand::Crawl(args) => {
            init_logs(args.quiet);
            crawl(args)
        }
        SubCommand::Extract(args) => {
            init_logs(false);
            extract(args)
        }
        SubCommand::Cache(args) => {
            init_logs(false);
            cache(args)
        }
        SubCommand::Completion => {
            generate(Shell::Bash, &mut Args::command(), "tagpop", &mut io::stdout());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crawl_args(argv: &[&str]) -> CrawlArgs {
        let argv = ["tagpop", "crawl"].iter().chain(argv).copied();
        match Args::parse_from(argv).cmd {
            SubCommand::Crawl(args) => args,
            cmd => panic!("Unexpected command {cmd:?}"),
        }
    }

    #[test]
    fn flags_override_the_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("crawler.yaml");
        fs::write(
            &file,
            "userAgent: from-file\nbatchSize: 10\nconcurrency:\n  years: 3\nsports: [Hockey]\n",
        )
        .unwrap();

        let args = crawl_args(&[
            "--crawler-config",
            file.to_str().unwrap(),
            "--batch-size",
            "50",
            "--sport",
            "Baseball",
            "--year",
            "1989",
            "--dry-run",
            "--no-sigint",
        ]);
        let conf = CrawlerConfig::try_from(&args).unwrap();

        assert_eq!(conf.user_agent, "from-file");
        assert_eq!(conf.batch_size, 50);
        assert_eq!(conf.concurrency.years, 3);
        assert_eq!(conf.sports, vec!["Baseball".to_string()]);
        assert_eq!(conf.filters.years, vec!["1989".to_string()]);
        assert!(conf.dry_run);
        assert!(!conf.handle_sigint);
    }

    #[test]
    fn invalid_overrides_are_rejected() {
        let args = crawl_args(&["--concurrent-sets", "0"]);
        assert!(CrawlerConfig::try_from(&args).is_err());

        let args = crawl_args(&["--start-level", "card"]);
        assert!(CrawlerConfig::try_from(&args).is_err());
    }

    #[test]
    fn cli_is_well_formed() {
        Args::command().debug_assert();
    }
}
