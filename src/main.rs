use std::process::exit;

use anyhow::{Context, Result};
use clap::Parser;
use review_dashboard_client::{
    dashboard::{Board, DashboardAggregator, DashboardView, SearchSummary},
    query::FilterState,
    search::{SearchDispatcher, SearchMode, SearchView},
    settings::{Args, Command, Settings},
    state::Phase,
    HttpTransport,
};
use serde::Serialize;
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let settings =
        Settings::load(args.config.as_deref()).context("Problem while loading settings")?;
    init_tracing(&settings.log.level);

    let transport = HttpTransport::new(settings.backend.url.clone(), settings.backend.timeout())
        .context("Problem while creating the HTTP client")?;

    let phase = match args.command {
        Command::Search { query, deep, limit } => {
            let mode = if deep {
                SearchMode::Deep
            } else {
                SearchMode::Shallow
            };
            let dispatcher = SearchDispatcher::new(transport);
            let mut view = SearchView::default();
            dispatcher
                .dispatch(
                    &mut view,
                    &query,
                    limit.unwrap_or(settings.search.default_limit),
                    mode,
                )
                .await;
            print(&view)?;
            view.phase()
        }
        Command::Dashboard {
            range,
            real_reviews,
            sentiment,
        } => {
            let filter = FilterState {
                real_reviews,
                sentiment,
                ..range.filter()
            };
            let aggregator = DashboardAggregator::new(transport, Board::Reviews);
            let mut view = DashboardView::default();
            aggregator.refresh(&mut view, &filter).await;
            print(&view)?;
            view.phase()
        }
        Command::SearchMetrics { range } => {
            let aggregator = DashboardAggregator::new(transport, Board::Search);
            let mut view = DashboardView::default();
            aggregator.refresh(&mut view, &range.filter()).await;
            print(&json!({
                "view": &view,
                "summary": SearchSummary::from_charts(view.data()),
            }))?;
            view.phase()
        }
    };

    if phase == Phase::Failed {
        exit(1);
    }
    Ok(())
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
