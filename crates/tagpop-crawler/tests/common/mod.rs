#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tagpop_crawler::anyhow;
use tagpop_crawler::{
    CacheConfig, CrawlerConfig, NoopRenderer, Pipeline, Renderer, RetryConfig, Store,
    UpsertCounts,
};
use tagpop_extract::{CardPerSet, GradeRow, Scope, SetPerYear, TotalsRollup, YearIndexEntry};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const INDEX: &str = include_str!("../../../tagpop-extract/tests/fixtures/pop_report_index.html");
pub const SPORT: &str = include_str!("../../../tagpop-extract/tests/fixtures/sport_baseball.html");
pub const YEAR_1989: &str =
    include_str!("../../../tagpop-extract/tests/fixtures/year_baseball_1989.html");
pub const YEAR_1990: &str =
    include_str!("../../../tagpop-extract/tests/fixtures/year_baseball_1990.html");
pub const SET_DONRUSS: &str = include_str!("../../../tagpop-extract/tests/fixtures/set_donruss.html");
pub const SET_UPPER_DECK: &str =
    include_str!("../../../tagpop-extract/tests/fixtures/set_upper_deck.html");
pub const CARD: &str = include_str!("../../../tagpop-extract/tests/fixtures/card_gary_carter.html");

pub const GARY_CARTER: &str = "/pop-report/Baseball/1989/Donruss/Gary%20Carter/53";
pub const KEN_GRIFFEY: &str = "/pop-report/Baseball/1990/Upper%20Deck/Ken%20Griffey%20Jr./1";

/// Every page of the Baseball fixtures, keyed by request path.
pub fn baseball_pages() -> Vec<(&'static str, &'static str)> {
    vec![
        ("/pop-report/Baseball", SPORT),
        ("/pop-report/Baseball/1989", YEAR_1989),
        ("/pop-report/Baseball/1990", YEAR_1990),
        ("/pop-report/Baseball/1989/Donruss", SET_DONRUSS),
        ("/pop-report/Baseball/1990/Upper%20Deck", SET_UPPER_DECK),
        (GARY_CARTER, CARD),
        (KEN_GRIFFEY, CARD),
    ]
}

pub async fn mount_page(server: &MockServer, route: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

pub async fn mount_baseball(server: &MockServer) {
    mount_pages(server, baseball_pages()).await;
}

pub async fn mount_pages(server: &MockServer, pages: Vec<(&str, &str)>) {
    for (route, body) in pages {
        mount_page(server, route, body).await;
    }
}

/// A fast, quiet configuration crawling Baseball from `server`.
pub fn config(server: &MockServer) -> CrawlerConfig {
    CrawlerConfig {
        base_url: server.uri(),
        request_timeout: 5,
        min_request_interval: 0.0,
        min_document_length: 0,
        render_fallback: false,
        handle_sigint: false,
        sports: vec!["Baseball".into()],
        retry: RetryConfig {
            max_attempts: 1,
            backoff_base: 0.0,
            jitter_max: 0.0,
        },
        cache: CacheConfig {
            enabled: false,
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn pipeline<S: Store>(config: CrawlerConfig, store: S) -> Pipeline<S> {
    Pipeline::new(config, store, Arc::new(NoopRenderer)).unwrap()
}

/// Renderer answering every URL with the same document.
pub struct FakeRenderer {
    html: String,
    calls: AtomicUsize,
}

impl FakeRenderer {
    pub fn new(html: &str) -> Arc<Self> {
        Arc::new(Self {
            html: html.to_string(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Renderer for FakeRenderer {
    async fn render(&self, _url: &str, _timeout: Duration) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.html.clone())
    }
}

type SetKey = (String, String, String);
type CardKey = (String, String, String, String);
type RowKey = (String, String, String, String, String);
type RollupKey = (Scope, String, String, String, String);

/// Store state keyed exactly like the SQLite tables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct State {
    pub years: BTreeMap<(String, String), YearIndexEntry>,
    pub sets: BTreeMap<SetKey, SetPerYear>,
    pub cards: BTreeMap<CardKey, CardPerSet>,
    pub grade_rows: BTreeMap<RowKey, GradeRow>,
    pub totals: BTreeMap<RollupKey, TotalsRollup>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn snapshot(&self) -> State {
        self.state.lock().unwrap().clone()
    }
}

fn upsert_into<K: Ord, V: Clone>(
    map: &mut BTreeMap<K, V>,
    rows: &[V],
    key: impl Fn(&V) -> K,
) -> UpsertCounts {
    let mut counts = UpsertCounts::default();
    for row in rows {
        match map.insert(key(row), row.clone()) {
            Some(_) => counts.updated += 1,
            None => counts.inserted += 1,
        }
    }
    counts
}

impl Store for MemoryStore {
    fn upsert_year_index(&self, rows: &[YearIndexEntry]) -> anyhow::Result<UpsertCounts> {
        let mut state = self.state.lock().unwrap();
        Ok(upsert_into(&mut state.years, rows, |r| {
            (r.sport.clone(), r.year.clone())
        }))
    }

    fn upsert_sets_per_year(&self, rows: &[SetPerYear]) -> anyhow::Result<UpsertCounts> {
        let mut state = self.state.lock().unwrap();
        Ok(upsert_into(&mut state.sets, rows, |r| {
            (r.sport.clone(), r.year.clone(), r.set_title.clone())
        }))
    }

    fn upsert_cards_per_set(&self, rows: &[CardPerSet]) -> anyhow::Result<UpsertCounts> {
        let mut state = self.state.lock().unwrap();
        Ok(upsert_into(&mut state.cards, rows, |r| {
            (
                r.sport.clone(),
                r.year.clone(),
                r.set_title.clone(),
                r.card_name.clone(),
            )
        }))
    }

    fn upsert_card_grade_rows(&self, rows: &[GradeRow]) -> anyhow::Result<UpsertCounts> {
        let mut state = self.state.lock().unwrap();
        Ok(upsert_into(&mut state.grade_rows, rows, |r| {
            (
                r.sport.clone(),
                r.year.clone(),
                r.set_title.clone(),
                r.card_name.clone(),
                r.cert_number.clone(),
            )
        }))
    }

    fn upsert_totals_rollups(&self, rows: &[TotalsRollup]) -> anyhow::Result<UpsertCounts> {
        let mut state = self.state.lock().unwrap();
        Ok(upsert_into(&mut state.totals, rows, |r| {
            (
                r.scope,
                r.sport.clone(),
                r.year.clone().unwrap_or_default(),
                r.set_title.clone().unwrap_or_default(),
                r.card_name.clone().unwrap_or_default(),
            )
        }))
    }
}
