mod cards;
mod categories;
mod grade_rows;
mod model;
mod sets;
mod table;
mod years;

pub mod set_name;
pub mod text;

pub use cards::extract_cards;
pub use categories::{extract_categories, DEFAULT_CATEGORIES};
pub use grade_rows::{extract_grade_rows, parse_date};
pub use model::{
    CardCtx, CardPerSet, Category, Extracted, GradeRow, MetricValue, Metrics, Scope, SetCtx,
    SetPerYear, SportCtx, TotalsRollup, YearCtx, YearIndexEntry,
};
pub use sets::extract_sets;
pub use table::has_content;
pub use years::extract_years;

pub use url::Url;
