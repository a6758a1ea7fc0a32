// src/settings.rs

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use chrono::NaiveDate;
use clap::{Args as ClapArgs, Parser, Subcommand};
use config::{builder::DefaultState, ConfigBuilder, ConfigError, Environment, File, FileFormat};
use reqwest::Url;
use serde::Deserialize;

use crate::query::{Authenticity, FilterState, Sentiment};

const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:5000";
const DEFAULT_LOG_LEVEL: &str = "info";
const ENV_PREFIX: &str = "REVIEW_DASH";

#[derive(Parser, Debug)]
#[command(version, about = "Review analytics and search client")]
pub struct Args {
    /// Path to the local configuration TOML file.
    #[arg(short, value_name = "CONFIG_PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Search the review corpus.
    Search {
        /// Search keywords.
        query: String,

        /// Let the backend expand the query into sub-queries.
        #[arg(long)]
        deep: bool,

        /// Number of results, between 1 and 30.
        #[arg(short, long)]
        limit: Option<i64>,
    },
    /// Review analytics: bot rate, sentiment, keywords and review trend.
    Dashboard {
        #[command(flatten)]
        range: DateRange,

        /// Only genuine (`true`) or only bot-written (`false`) reviews.
        #[arg(long, value_name = "true|false")]
        real_reviews: Option<Authenticity>,

        /// One of `positive`, `neutral` or `negative`.
        #[arg(long)]
        sentiment: Option<Sentiment>,
    },
    /// Search performance metrics.
    SearchMetrics {
        #[command(flatten)]
        range: DateRange,
    },
}

#[derive(ClapArgs, Debug, Clone, Copy, Default)]
pub struct DateRange {
    /// First day, as YYYY-MM-DD. (inclusive)
    #[arg(long)]
    pub start: Option<NaiveDate>,

    /// Last day, as YYYY-MM-DD. (inclusive)
    #[arg(long)]
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn filter(self) -> FilterState {
        FilterState {
            start_date: self.start,
            end_date: self.end,
            ..FilterState::default()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Backend {
    #[serde(deserialize_with = "deserialize_url")]
    pub url: Url,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Backend {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchSettings {
    pub default_limit: i64,
}

#[derive(Debug, Deserialize)]
pub struct LogSettings {
    pub level: String,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub backend: Backend,
    pub search: SearchSettings,
    pub log: LogSettings,
}

impl Settings {
    /// Loads settings from defaults, the optional TOML file at `path` and
    /// `REVIEW_DASH__*` environment variables, in that order.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::<DefaultState>::default()
            .set_default("backend.url", DEFAULT_BACKEND_URL)?
            .set_default("search.default_limit", i64::from(crate::search::DEFAULT_LIMIT))?
            .set_default("log.level", DEFAULT_LOG_LEVEL)?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }
        let cfg = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        cfg.try_deserialize()
    }
}

fn deserialize_url<'de, D>(deserializer: D) -> Result<Url, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use std::{env, io::Write, sync::Mutex};

    use clap::Parser;
    use tempfile::NamedTempFile;

    use super::*;

    // `Settings::load` reads the process environment.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults_without_file() {
        let _env = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings.backend.url.as_str(), "http://127.0.0.1:5000/");
        assert_eq!(settings.backend.timeout(), None);
        assert_eq!(settings.search.default_limit, 10);
        assert_eq!(settings.log.level, "info");
    }

    #[test]
    fn file_overrides_defaults() {
        let _env = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let file = write_config(
            r#"
            [backend]
            url = "http://reviews.internal:8080/insight"
            timeout_secs = 15

            [search]
            default_limit = 20
            "#,
        );
        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(
            settings.backend.url.as_str(),
            "http://reviews.internal:8080/insight"
        );
        assert_eq!(settings.backend.timeout(), Some(Duration::from_secs(15)));
        assert_eq!(settings.search.default_limit, 20);
        assert_eq!(settings.log.level, "info");
    }

    #[test]
    fn invalid_url_is_rejected() {
        let _env = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let file = write_config(
            r#"
            [backend]
            url = "not a url"
            "#,
        );
        assert!(Settings::load(Some(file.path())).is_err());
    }

    #[test]
    fn environment_overrides_file() {
        let _env = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let file = write_config(
            r#"
            [backend]
            url = "http://reviews.internal:8080"

            [search]
            default_limit = 20
            "#,
        );
        env::set_var("REVIEW_DASH__BACKEND__URL", "http://env.example:9000");
        env::set_var("REVIEW_DASH__SEARCH__DEFAULT_LIMIT", "25");
        let loaded = Settings::load(Some(file.path()));
        env::remove_var("REVIEW_DASH__BACKEND__URL");
        env::remove_var("REVIEW_DASH__SEARCH__DEFAULT_LIMIT");

        let settings = loaded.unwrap();
        assert_eq!(settings.backend.url.as_str(), "http://env.example:9000/");
        assert_eq!(settings.search.default_limit, 25);
        assert_eq!(settings.log.level, "info");
    }

    #[test]
    fn dashboard_args_parse() {
        let args = Args::try_parse_from([
            "review-dash",
            "dashboard",
            "--start",
            "2022-09-01",
            "--real-reviews",
            "false",
            "--sentiment",
            "negative",
        ])
        .unwrap();
        match args.command {
            Command::Dashboard {
                range,
                real_reviews,
                sentiment,
            } => {
                assert_eq!(range.start, NaiveDate::from_ymd_opt(2022, 9, 1));
                assert_eq!(range.end, None);
                assert_eq!(real_reviews, Some(Authenticity::Bot));
                assert_eq!(sentiment, Some(Sentiment::Negative));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn search_args_parse() {
        let args = Args::try_parse_from([
            "review-dash",
            "-c",
            "dash.toml",
            "search",
            "dry skin",
            "--deep",
            "--limit",
            "5",
        ])
        .unwrap();
        assert_eq!(args.config, Some(PathBuf::from("dash.toml")));
        match args.command {
            Command::Search { query, deep, limit } => {
                assert_eq!(query, "dry skin");
                assert!(deep);
                assert_eq!(limit, Some(5));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn bad_date_is_rejected() {
        assert!(
            Args::try_parse_from(["review-dash", "search-metrics", "--start", "09/01/2022"])
                .is_err()
        );
    }
}
