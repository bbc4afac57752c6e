use chrono::NaiveDate;
use tagpop_extract::{
    extract_cards, extract_categories, extract_grade_rows, extract_sets, extract_years, CardCtx,
    MetricValue, Scope, SetCtx, SportCtx, Url, YearCtx,
};

const SPORT: &str = include_str!("fixtures/sport_baseball.html");
const YEAR_1989: &str = include_str!("fixtures/year_baseball_1989.html");
const SET_DONRUSS: &str = include_str!("fixtures/set_donruss.html");
const CARD: &str = include_str!("fixtures/card_gary_carter.html");
const INDEX: &str = include_str!("fixtures/pop_report_index.html");

fn base() -> Url {
    Url::parse("https://my.taggrading.com").unwrap()
}

#[test]
fn index_lists_sports() {
    let out = extract_categories(INDEX, &base());
    let names = out.children.iter().map(|c| c.name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, vec!["Baseball", "Hockey", "Other Sports"]);
}

#[test]
fn sport_page() {
    let ctx = SportCtx {
        sport: "Baseball".into(),
        sport_url: "https://my.taggrading.com/pop-report/Baseball".into(),
    };
    let out = extract_years(SPORT, &ctx, &base());
    let years = out.children.iter().map(|y| y.year.as_str()).collect::<Vec<_>>();
    assert_eq!(years, vec!["1989", "1990"]);
    assert_eq!(out.totals.len(), 1);
    assert_eq!(out.totals[0].scope, Scope::Sport);
    assert_eq!(out.totals[0].metrics.num_sets, Some(MetricValue::Count(4)));
    assert_eq!(out.totals[0].metrics.total_graded, Some(MetricValue::Count(1092)));
}

#[test]
fn year_page_routes_totals_apart() {
    let ctx = YearCtx {
        sport: "Baseball".into(),
        year: "1989".into(),
        year_url: "https://my.taggrading.com/pop-report/Baseball/1989".into(),
    };
    let out = extract_sets(YEAR_1989, &ctx, &base());

    let titles = out.children.iter().map(|s| s.set_title.as_str()).collect::<Vec<_>>();
    assert_eq!(titles, vec!["Donruss", "DonrussNight Moves"]);
    assert!(out.children.iter().all(|s| !s.set_title.eq_ignore_ascii_case("totals")));
    assert_eq!(out.skipped, 1);

    let night_moves = &out.children[1];
    assert_eq!(
        night_moves.set_page_url(),
        Some("https://my.taggrading.com/pop-report/Baseball/1989/Donruss?setName=Night+Moves")
    );
    assert_eq!(night_moves.metrics.get("grade_10"), None);
    assert_eq!(night_moves.metrics.get("grade_8.5"), Some(&MetricValue::Count(1)));

    assert_eq!(out.totals.len(), 1);
    assert_eq!(out.totals[0].scope, Scope::Year);
    assert_eq!(out.totals[0].metrics.total, Some(MetricValue::Count(1018)));
}

#[test]
fn set_page() {
    let ctx = SetCtx {
        sport: "Baseball".into(),
        year: "1989".into(),
        set_title: "Donruss".into(),
        set_url: "https://my.taggrading.com/pop-report/Baseball/1989/Donruss".into(),
    };
    let out = extract_cards(SET_DONRUSS, &ctx, &base());
    assert_eq!(out.children.len(), 1);
    assert_eq!(out.children[0].card_name, "Gary Carter");
    assert_eq!(out.skipped, 1);
    assert_eq!(out.totals.len(), 1);
    assert_eq!(out.totals[0].scope, Scope::Set);
    assert_eq!(out.totals[0].set_title.as_deref(), Some("Donruss"));
}

#[test]
fn card_page_rejects_incomplete_rows() {
    let ctx = CardCtx {
        sport: "Baseball".into(),
        year: "1989".into(),
        set_title: "Donruss".into(),
        card_name: "Gary Carter".into(),
        card_url: "https://my.taggrading.com/pop-report/Baseball/1989/Donruss/Gary%20Carter/53"
            .into(),
    };
    let out = extract_grade_rows(CARD, &ctx, &base());

    assert_eq!(out.children.len(), 2);
    assert_eq!(out.skipped, 2);
    assert!(out.totals.is_empty());

    let first = &out.children[0];
    assert_eq!(first.cert_number, "X3032464");
    assert_eq!(first.tag_grade, "8.5");
    assert_eq!(first.rank.as_deref(), Some("1"));
    assert_eq!(first.rank_by_grade.as_deref(), Some("1"));
    assert_eq!(first.chronology.as_deref(), Some("1ST"));
    assert_eq!(
        first.report_url.as_deref(),
        Some("https://my.taggrading.com/card/X3032464")
    );
    assert_eq!(first.completed_date_raw.as_deref(), Some("11-02-2023"));
    assert_eq!(first.completed_date_iso, NaiveDate::from_ymd_opt(2023, 11, 2));

    let second = &out.children[1];
    assert_eq!(second.cert_number, "X3032999");
    assert_eq!(second.report_url, None);
    assert_eq!(second.completed_date_raw.as_deref(), Some("02-30-2024"));
    assert_eq!(second.completed_date_iso, None);
}

#[test]
fn card_page_without_grade_table() {
    let ctx = CardCtx {
        sport: "Baseball".into(),
        year: "1989".into(),
        set_title: "Donruss".into(),
        card_name: "Gary Carter".into(),
        card_url: "https://my.taggrading.com/x".into(),
    };
    let out = extract_grade_rows(SET_DONRUSS, &ctx, &base());
    assert!(out.children.is_empty());
    assert_eq!(out.skipped, 0);
}
