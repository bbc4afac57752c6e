use std::future;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use futures::{stream, StreamExt};
use tagpop_extract::set_name::{
    build_set_page_url, parse_card_url, pop_report_url, sport_path_name, sport_url, year_url,
};
use tagpop_extract::text::normalize;
use tagpop_extract::{
    extract_cards, extract_categories, extract_grade_rows, extract_sets, extract_years, CardCtx,
    Extracted, SetCtx, SetPerYear, SportCtx, YearCtx, DEFAULT_CATEGORIES,
};
use url::Url;

use crate::cache::{CacheKey, CacheScope, TieredCache};
use crate::config::{CrawlerConfig, OnError, StartLevel};
use crate::error::FetchError;
use crate::fetch::FetchClient;
use crate::render::Renderer;
use crate::retry::Retry;
use crate::stats::{CrawlReport, RunStats, RunSummary, SportReport};
use crate::store::{Records, Store};

/// Card page to crawl with the number identifying it within its set.
type CardSeed = (CardCtx, Option<String>);

/// Walks sport, year, set and card pages, persisting what each level yields.
pub struct Pipeline<S> {
    config: CrawlerConfig,
    base: Url,
    client: FetchClient,
    cache: TieredCache,
    retry: Retry,
    store: Arc<S>,
}

impl<S: Store> Pipeline<S> {
    /// Validates `config` and prepares a run, no request is made yet.
    pub fn new(
        config: CrawlerConfig,
        store: S,
        renderer: Arc<dyn Renderer>,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        let base = Url::parse(&config.base_url)
            .with_context(|| format!("Invalid base URL {}", config.base_url))?;
        let client = FetchClient::new(&config, renderer)?;

        Ok(Self {
            cache: TieredCache::new(&config.cache),
            retry: Retry::new(&config.retry),
            store: Arc::new(store),
            client,
            base,
            config,
        })
    }

    pub fn config(&self) -> &CrawlerConfig {
        &self.config
    }

    pub fn cache(&self) -> &TieredCache {
        &self.cache
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Crawls every configured or discovered sport one after the other.
    pub async fn run(&self) -> anyhow::Result<CrawlReport> {
        if self.config.handle_sigint {
            tokio::select! {
                report = self.run_sports() => report,
                _ = tokio::signal::ctrl_c() => Err(anyhow!("Interrupted")),
            }
        } else {
            self.run_sports().await
        }
    }

    /// Crawls a single sport from the configured start level.
    pub async fn crawl_sport(&self, sport: &str) -> anyhow::Result<RunSummary> {
        let stats = RunStats::new();
        self.crawl_sport_with(sport, &stats).await?;
        Ok(stats.summary())
    }

    async fn run_sports(&self) -> anyhow::Result<CrawlReport> {
        let run_stats = RunStats::new();
        let sports = self.sports(&run_stats).await;
        log::info!("Crawling {} sports from the {} level", sports.len(), self.config.start_level);

        let mut reports = vec![];
        for sport in sports {
            log::info!("Crawling {sport}");
            let stats = RunStats::new();
            let res = self.crawl_sport_with(&sport, &stats).await;
            let summary = stats.summary();

            let error = match res {
                Ok(()) => {
                    log::info!("Finished {sport}\n{summary}");
                    None
                }
                Err(e) => match self.config.on_sport_error {
                    OnError::SkipAndLog => {
                        log::warn!("Skipping sport {sport}: {e:#}");
                        Some(format!("{e:#}"))
                    }
                    OnError::Fail => return Err(e.context(format!("Crawling {sport} failed"))),
                },
            };
            reports.push(SportReport {
                succeeded: error.is_none(),
                sport,
                error,
                summary,
            });
        }

        let mut total = run_stats.summary();
        for report in &reports {
            total.absorb(&report.summary);
        }
        Ok(CrawlReport {
            dry_run: self.config.dry_run,
            sports: reports,
            total,
        })
    }

    async fn sports(&self, stats: &RunStats) -> Vec<String> {
        let configured = &self.config.sports;
        match self.config.start_level {
            StartLevel::Card => {
                let mut sports: Vec<String> = vec![];
                for (ctx, _) in self.card_seeds() {
                    let wanted = configured.is_empty()
                        || configured.iter().any(|s| s.eq_ignore_ascii_case(&ctx.sport));
                    if wanted && !sports.iter().any(|s| s.eq_ignore_ascii_case(&ctx.sport)) {
                        sports.push(ctx.sport);
                    }
                }
                sports
            }
            _ if !configured.is_empty() => configured.clone(),
            _ => self.discover_sports(stats).await,
        }
    }

    async fn discover_sports(&self, stats: &RunStats) -> Vec<String> {
        let found = match pop_report_url(&self.base) {
            Ok(url) => {
                match self
                    .page(stats, CacheScope::Categories, &CacheKey::index(), url.as_str())
                    .await
                {
                    Ok(html) => extract_categories(&html, &self.base)
                        .children
                        .into_iter()
                        .map(|c| c.name)
                        .collect(),
                    Err(e) => {
                        log::warn!("Couldn't discover sports, using the default list: {e}");
                        vec![]
                    }
                }
            }
            Err(e) => {
                log::warn!("Couldn't build the pop-report URL: {e}");
                vec![]
            }
        };

        let sports = if found.is_empty() {
            DEFAULT_CATEGORIES.iter().map(|s| s.to_string()).collect()
        } else {
            found
        };
        RunStats::add(&stats.categories, sports.len());
        sports
    }

    async fn crawl_sport_with(&self, sport: &str, stats: &RunStats) -> anyhow::Result<()> {
        let path_name = sport_path_name(sport);
        let filters = &self.config.filters;

        match self.config.start_level {
            StartLevel::Category => {
                let ctx = SportCtx {
                    sport: sport.to_string(),
                    sport_url: sport_url(&self.base, &path_name)?.to_string(),
                };
                self.crawl_sport_page(&ctx, stats).await
            }
            StartLevel::Year => {
                let mut years = vec![];
                for year in &filters.years {
                    let year = normalize(year);
                    years.push(YearCtx {
                        sport: sport.to_string(),
                        year_url: year_url(&self.base, &path_name, &year)?.to_string(),
                        year,
                    });
                }
                self.crawl_years(years, stats).await;
                Ok(())
            }
            StartLevel::Set => {
                let mut sets = vec![];
                for year in &filters.years {
                    for title in &filters.sets {
                        let year = normalize(year);
                        let set_title = normalize(title);
                        sets.push(SetCtx {
                            sport: sport.to_string(),
                            set_url: build_set_page_url(&self.base, sport, &year, &set_title)?
                                .to_string(),
                            year,
                            set_title,
                        });
                    }
                }
                self.crawl_sets(sets, stats).await;
                Ok(())
            }
            StartLevel::Card => {
                let cards = self
                    .card_seeds()
                    .into_iter()
                    .filter(|(ctx, _)| ctx.sport.eq_ignore_ascii_case(sport))
                    .collect();
                self.crawl_cards(cards, stats).await;
                Ok(())
            }
        }
    }

    fn card_seeds(&self) -> Vec<CardSeed> {
        self.config
            .seed_card_urls
            .iter()
            .filter_map(|seed| {
                let location = Url::parse(seed).ok().as_ref().and_then(parse_card_url);
                match location {
                    Some(loc) => Some((
                        CardCtx {
                            sport: loc.sport,
                            year: loc.year,
                            set_title: loc.set_title,
                            card_name: loc.card_name,
                            card_url: seed.clone(),
                        },
                        Some(loc.card_number),
                    )),
                    None => {
                        log::warn!("Skipping seed {seed}: not a card page URL");
                        None
                    }
                }
            })
            .collect()
    }

    // Levels

    async fn crawl_sport_page(&self, ctx: &SportCtx, stats: &RunStats) -> anyhow::Result<()> {
        let key = CacheKey::sport(&ctx.sport);
        let html = self
            .page(stats, CacheScope::Years, &key, &ctx.sport_url)
            .await?;
        let out = extract_years(&html, ctx, &self.base);
        let years = self
            .split(stats, out, &stats.years, |y| {
                self.config.filters.accept_year(&y.year)
            })
            .await?;
        log::info!("Found {} years for {}", years.len(), ctx.sport);

        let children = years.iter().map(YearCtx::from).collect();
        self.persist(stats, Records::Years(years)).await?;
        self.crawl_years(children, stats).await;
        Ok(())
    }

    async fn crawl_years(&self, years: Vec<YearCtx>, stats: &RunStats) {
        stream::iter(years)
            .map(|ctx| async move {
                if let Err(e) = self.crawl_year(&ctx, stats).await {
                    log::warn!("Skipping year {} {}: {e:#}", ctx.sport, ctx.year);
                }
            })
            .buffer_unordered(self.config.concurrency.years)
            .for_each(|_| future::ready(()))
            .await;
    }

    async fn crawl_year(&self, ctx: &YearCtx, stats: &RunStats) -> anyhow::Result<()> {
        let key = CacheKey::year(&ctx.sport, &ctx.year);
        let html = self.page(stats, CacheScope::Sets, &key, &ctx.year_url).await?;
        let out = extract_sets(&html, ctx, &self.base);
        let sets = self
            .split(stats, out, &stats.sets, |s| {
                self.config.filters.accept_set(&s.set_title)
            })
            .await?;
        log::debug!("Found {} sets for {} {}", sets.len(), ctx.sport, ctx.year);

        let mut children = vec![];
        for set in &sets {
            match self.set_page_url(set) {
                Some(set_url) => children.push(SetCtx {
                    sport: set.sport.clone(),
                    year: set.year.clone(),
                    set_title: set.set_title.clone(),
                    set_url,
                }),
                None => {
                    log::debug!("Skipping set {}: no page URL", set.set_title);
                    RunStats::incr(&stats.skipped);
                }
            }
        }
        self.persist(stats, Records::Sets(sets)).await?;
        self.crawl_sets(children, stats).await;
        Ok(())
    }

    fn set_page_url(&self, set: &SetPerYear) -> Option<String> {
        if let Some(url) = set.set_page_url() {
            return Some(url.to_string());
        }
        build_set_page_url(&self.base, &set.sport, &set.year, &set.set_title)
            .map(|url| url.to_string())
            .ok()
    }

    async fn crawl_sets(&self, sets: Vec<SetCtx>, stats: &RunStats) {
        stream::iter(sets)
            .map(|ctx| async move {
                if let Err(e) = self.crawl_set(&ctx, stats).await {
                    log::warn!("Skipping set {} {}: {e:#}", ctx.year, ctx.set_title);
                }
            })
            .buffer_unordered(self.config.concurrency.sets)
            .for_each(|_| future::ready(()))
            .await;
    }

    async fn crawl_set(&self, ctx: &SetCtx, stats: &RunStats) -> anyhow::Result<()> {
        let key = CacheKey::set(&ctx.sport, &ctx.year, &ctx.set_title);
        let html = self.page(stats, CacheScope::Cards, &key, &ctx.set_url).await?;
        let out = extract_cards(&html, ctx, &self.base);
        let cards = self
            .split(stats, out, &stats.cards, |c| {
                self.config.filters.accept_card(&c.card_name)
            })
            .await?;
        log::debug!("Found {} cards in {} {}", cards.len(), ctx.year, ctx.set_title);

        let mut children = vec![];
        for card in &cards {
            match card.card_page_url() {
                Some(card_url) => children.push((
                    CardCtx {
                        sport: card.sport.clone(),
                        year: card.year.clone(),
                        set_title: card.set_title.clone(),
                        card_name: card.card_name.clone(),
                        card_url: card_url.to_string(),
                    },
                    card.card_number.clone(),
                )),
                None => {
                    log::debug!("Skipping card {}: no page URL", card.card_name);
                    RunStats::incr(&stats.skipped);
                }
            }
        }
        self.persist(stats, Records::Cards(cards)).await?;
        self.crawl_cards(children, stats).await;
        Ok(())
    }

    async fn crawl_cards(&self, cards: Vec<CardSeed>, stats: &RunStats) {
        stream::iter(cards)
            .map(|(ctx, number)| async move {
                if let Err(e) = self.crawl_card(&ctx, number.as_deref(), stats).await {
                    log::warn!("Skipping card {}: {e:#}", ctx.card_url);
                }
            })
            .buffer_unordered(self.config.concurrency.cards)
            .for_each(|_| future::ready(()))
            .await;
    }

    async fn crawl_card(
        &self,
        ctx: &CardCtx,
        number: Option<&str>,
        stats: &RunStats,
    ) -> anyhow::Result<()> {
        let key = CacheKey::card(&ctx.sport, &ctx.year, &ctx.set_title, &ctx.card_name, number);
        let html = self
            .page(stats, CacheScope::CardDetails, &key, &ctx.card_url)
            .await?;
        let out = extract_grade_rows(&html, ctx, &self.base);
        let rows = self.split(stats, out, &stats.grade_rows, |_| true).await?;
        self.persist(stats, Records::GradeRows(rows)).await
    }

    // Shared steps

    /// Returns the page body from the cache or the network.
    async fn page(
        &self,
        stats: &RunStats,
        scope: CacheScope,
        key: &CacheKey,
        url: &str,
    ) -> Result<String, FetchError> {
        if let Some(html) = self.cache.get(scope, key).await {
            log::debug!("Cache hit for {url}");
            RunStats::incr(&stats.cache_hits);
            return Ok(html);
        }
        if self.cache.is_enabled() {
            RunStats::incr(&stats.cache_misses);
        }

        let label = format!("Fetching {url}");
        let fetched = self
            .retry
            .run(&label, stats, || self.client.fetch(url))
            .await?;
        RunStats::incr(&stats.pages_fetched);
        if fetched.rendered {
            RunStats::incr(&stats.pages_rendered);
        }

        self.cache.set(scope, key, &fetched.html).await;
        Ok(fetched.html)
    }

    /// Writes the TOTALS of a page and returns its accepted children.
    async fn split<T, F>(
        &self,
        stats: &RunStats,
        out: Extracted<T>,
        counter: &AtomicU64,
        keep: F,
    ) -> anyhow::Result<Vec<T>>
    where
        F: Fn(&T) -> bool,
    {
        RunStats::add(&stats.skipped, out.skipped);
        RunStats::add(&stats.totals, out.totals.len());
        self.persist(stats, Records::Totals(out.totals)).await?;

        let children = out
            .children
            .into_iter()
            .filter(|child| keep(child))
            .collect::<Vec<_>>();
        RunStats::add(counter, children.len());
        Ok(children)
    }

    async fn persist(&self, stats: &RunStats, records: Records) -> anyhow::Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let table = records.table();
        stats.record_planned(table, records.len());

        if self.config.dry_run {
            log::info!("Dry run, would write {} rows to {}", records.len(), table.as_str());
            return Ok(());
        }

        let records = Arc::new(records);
        let label = format!("Writing {}", table.as_str());
        let counts = self
            .retry
            .run(&label, stats, || {
                let store = self.store.clone();
                let records = records.clone();
                async move {
                    match tokio::task::spawn_blocking(move || store.upsert(&records)).await {
                        Ok(res) => res,
                        Err(e) => Err(anyhow!("Store task failed: {e}")),
                    }
                }
            })
            .await?;

        stats.record_upsert(table, &counts);
        if counts.failed > 0 {
            log::warn!("Couldn't write {} rows to {}", counts.failed, table.as_str());
        }
        Ok(())
    }
}
