use std::collections::BTreeMap;

use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::{
    error::{Error, Result},
    query::{build_query_params, FilterState, QueryParams},
    state::{Epoch, ViewState},
    transport::{data_array, Transport},
};

const CHART_FAILED_MESSAGE: &str = "Failed to load chart data";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Bar,
    Line,
    Pie,
    Radar,
    WordCloud,
}

/// One analytics endpoint and the chart it feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    BotRate,
    Sentiment,
    Keywords,
    ReviewTrend,
    QueryDistribution,
    ResponseTime,
    SubQueryEfficiency,
    SearchQuality,
}

/// How a metric's rows map onto a chart: the row field holding the label and
/// one `(dataset label, row field)` pair per dataset.
struct Layout {
    path: &'static str,
    chart: ChartKind,
    label_field: &'static str,
    datasets: &'static [(&'static str, &'static str)],
}

impl Metric {
    fn layout(self) -> Layout {
        match self {
            Self::BotRate => Layout {
                path: "/api/dashboard/bot_rate",
                chart: ChartKind::Bar,
                label_field: "date",
                datasets: &[("Bot Rate (%)", "bot_rate")],
            },
            Self::Sentiment => Layout {
                path: "/api/dashboard/sentiment",
                chart: ChartKind::Pie,
                label_field: "sentiment",
                datasets: &[("Sentiment Distribution", "count")],
            },
            Self::Keywords => Layout {
                path: "/api/dashboard/wordcloud",
                chart: ChartKind::WordCloud,
                label_field: "text",
                datasets: &[("Keyword Frequency", "value")],
            },
            Self::ReviewTrend => Layout {
                path: "/api/dashboard/review_trend",
                chart: ChartKind::Line,
                label_field: "date",
                datasets: &[("Review Count", "review_count")],
            },
            Self::QueryDistribution => Layout {
                path: "/api/search_dashboard/query_distribution",
                chart: ChartKind::Pie,
                label_field: "type",
                datasets: &[("Query Distribution", "percentage")],
            },
            Self::ResponseTime => Layout {
                path: "/api/search_dashboard/response_time",
                chart: ChartKind::Bar,
                label_field: "type",
                datasets: &[("Average Response Time (ms)", "time")],
            },
            Self::SubQueryEfficiency => Layout {
                path: "/api/search_dashboard/sub_query_efficiency",
                chart: ChartKind::Line,
                label_field: "month",
                datasets: &[
                    ("Average Sub-queries", "avg_count"),
                    ("Sub-query Generation Time (ms)", "avg_time"),
                ],
            },
            Self::SearchQuality => Layout {
                path: "/api/search_dashboard/search_quality",
                chart: ChartKind::Radar,
                label_field: "aspect",
                datasets: &[("Search Quality Score", "score")],
            },
        }
    }

    pub fn path(self) -> &'static str {
        self.layout().path
    }

    pub fn chart(self) -> ChartKind {
        self.layout().chart
    }
}

/// A dashboard screen: the charts it shows and the filters they accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Board {
    /// Review analytics, filtered by date range, authenticity and sentiment.
    Reviews,
    /// Search performance, filtered by date range only.
    Search,
}

impl Board {
    pub fn metrics(self) -> &'static [Metric] {
        match self {
            Self::Reviews => &[
                Metric::BotRate,
                Metric::Sentiment,
                Metric::Keywords,
                Metric::ReviewTrend,
            ],
            Self::Search => &[
                Metric::QueryDistribution,
                Metric::ResponseTime,
                Metric::SubQueryEfficiency,
                Metric::SearchQuality,
            ],
        }
    }

    pub fn params(self, filter: &FilterState) -> QueryParams {
        let params = build_query_params(filter);
        match self {
            Self::Reviews => params,
            Self::Search => params.dates_only(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dataset {
    pub label: String,
    pub values: Vec<f64>,
}

/// Chart-ready data: one label per point and one or more value series.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalyticsSeries {
    pub labels: Vec<String>,
    pub datasets: Vec<Dataset>,
}

impl AnalyticsSeries {
    /// Maps the `data` rows of `metric`'s endpoint onto its chart layout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedResponse`] if a row is not an object, or
    /// lacks its label or one of its values.
    pub fn from_rows(metric: Metric, rows: &[Value]) -> Result<Self> {
        let layout = metric.layout();
        let mut series = Self {
            labels: Vec::with_capacity(rows.len()),
            datasets: layout
                .datasets
                .iter()
                .map(|(label, _)| Dataset {
                    label: (*label).to_string(),
                    values: Vec::with_capacity(rows.len()),
                })
                .collect(),
        };

        for row in rows {
            if !row.is_object() {
                return Err(Error::MalformedResponse(format!(
                    "{metric:?} row is not an object: {row}"
                )));
            }
            series
                .labels
                .push(label(metric, layout.label_field, row.get(layout.label_field))?);
            for (dataset, (_, field)) in series.datasets.iter_mut().zip(layout.datasets) {
                dataset.values.push(number(metric, field, row.get(*field))?);
            }
        }
        Ok(series)
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

fn label(metric: Metric, field: &str, value: Option<&Value>) -> Result<String> {
    match value {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        other => Err(Error::MalformedResponse(format!(
            "{metric:?} row has no usable `{field}` label: {other:?}"
        ))),
    }
}

/// SQL decimals arrive as strings, so numeric strings are accepted.
fn number(metric: Metric, field: &str, value: Option<&Value>) -> Result<f64> {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| {
        Error::MalformedResponse(format!(
            "{metric:?} row has no numeric `{field}`: {value:?}"
        ))
    })
}

/// Per-chart data of a board, plus the error of each chart whose last fetch
/// failed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Charts {
    series: BTreeMap<Metric, AnalyticsSeries>,
    errors: BTreeMap<Metric, String>,
}

impl Charts {
    pub fn series(&self, metric: Metric) -> Option<&AnalyticsSeries> {
        self.series.get(&metric)
    }

    pub fn error(&self, metric: Metric) -> Option<&str> {
        self.errors.get(&metric).map(String::as_str)
    }

    pub fn failed(&self) -> impl Iterator<Item = Metric> + '_ {
        self.errors.keys().copied()
    }
}

pub type DashboardView = ViewState<Charts>;

/// One analytics cycle: a board and a single params snapshot.
#[derive(Debug, Clone)]
pub struct Cycle {
    epoch: Epoch,
    board: Board,
    params: QueryParams,
}

impl Cycle {
    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn params(&self) -> &QueryParams {
        &self.params
    }
}

#[derive(Debug)]
pub struct CycleReport {
    epoch: Epoch,
    outcomes: Vec<(Metric, Result<AnalyticsSeries>)>,
}

impl CycleReport {
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|(_, outcome)| outcome.is_ok())
    }
}

pub struct DashboardAggregator<T> {
    transport: T,
    board: Board,
}

impl<T: Transport> DashboardAggregator<T> {
    pub fn new(transport: T, board: Board) -> Self {
        Self { transport, board }
    }

    pub fn board(&self) -> Board {
        self.board
    }

    /// Takes a snapshot of `filter` and opens a new epoch on `view`.
    pub fn begin(&self, view: &mut DashboardView, filter: &FilterState) -> Cycle {
        Cycle {
            epoch: view.begin(),
            board: self.board,
            params: self.board.params(filter),
        }
    }

    /// Fetches every chart of the cycle concurrently. One chart failing does
    /// not stop the others.
    pub async fn run_cycle(&self, cycle: &Cycle) -> CycleReport {
        info!(board = ?cycle.board, params = ?cycle.params, "refreshing dashboard");
        let fetches = cycle.board.metrics().iter().map(|&metric| async move {
            let outcome = self.fetch(metric, &cycle.params).await;
            (metric, outcome)
        });
        CycleReport {
            epoch: cycle.epoch,
            outcomes: join_all(fetches).await,
        }
    }

    pub async fn fetch(&self, metric: Metric, params: &QueryParams) -> Result<AnalyticsSeries> {
        let body = self.transport.get_json(metric.path(), params).await?;
        AnalyticsSeries::from_rows(metric, &data_array(body)?)
    }

    /// Stores the outcome of a cycle unless a newer cycle has started.
    ///
    /// Fresh series replace old ones; a chart whose fetch failed keeps its
    /// previous series and records its error. The cycle fails as a whole if
    /// any chart failed.
    pub fn commit(view: &mut DashboardView, report: CycleReport) -> bool {
        let total = report.outcomes.len();
        view.finish(report.epoch, |charts| {
            let mut failed = 0;
            for (metric, outcome) in report.outcomes {
                match outcome {
                    Ok(series) => {
                        charts.errors.remove(&metric);
                        charts.series.insert(metric, series);
                    }
                    Err(e) => {
                        warn!("Problem while fetching {metric:?}: {e}");
                        failed += 1;
                        charts
                            .errors
                            .insert(metric, e.user_message(CHART_FAILED_MESSAGE));
                    }
                }
            }
            if failed == 0 {
                info!(charts = total, "dashboard refreshed");
                None
            } else {
                Some(format!("Failed to load {failed} of {total} charts"))
            }
        })
    }

    pub async fn refresh(&self, view: &mut DashboardView, filter: &FilterState) {
        let cycle = self.begin(view, filter);
        let report = self.run_cycle(&cycle).await;
        Self::commit(view, report);
    }
}

/// Headline numbers of the search board.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchSummary {
    pub avg_response_ms: Option<f64>,
    pub latest_sub_query_count: Option<f64>,
    pub avg_quality_score: Option<f64>,
}

impl SearchSummary {
    pub fn from_charts(charts: &Charts) -> Self {
        let first = |metric| {
            charts
                .series(metric)
                .and_then(|s| s.datasets.first())
                .map(|d| d.values.as_slice())
                .filter(|v| !v.is_empty())
        };
        Self {
            avg_response_ms: first(Metric::ResponseTime).map(|v| mean(v).round()),
            latest_sub_query_count: first(Metric::SubQueryEfficiency)
                .and_then(|v| v.last().copied()),
            avg_quality_score: first(Metric::SearchQuality).map(mean),
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}
