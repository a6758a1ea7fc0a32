use std::{collections::BTreeMap, str::FromStr};

use chrono::{DateTime, Local, NaiveDate};
use serde::Serialize;
use thiserror::Error;

pub(crate) const START_DATE: &str = "start_date";
pub(crate) const END_DATE: &str = "end_date";
const REAL_REVIEWS: &str = "real_reviews";
const SENTIMENT: &str = "sentiment";

/// Wire format of the date filters.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Whether to restrict the analytics to genuine or to bot-written reviews.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authenticity {
    Real,
    Bot,
}

impl Authenticity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Real => "true",
            Self::Bot => "false",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Neutral => "neutral",
            Self::Negative => "negative",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized filter value: {0:?}")]
pub struct ParseFilterError(String);

/// Parses a select-box value. The empty string means "no constraint".
pub fn parse_optional<T: FromStr>(value: &str) -> Result<Option<T>, T::Err> {
    let value = value.trim();
    if value.is_empty() {
        Ok(None)
    } else {
        value.parse().map(Some)
    }
}

impl FromStr for Authenticity {
    type Err = ParseFilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "true" | "real" => Ok(Self::Real),
            "false" | "bot" => Ok(Self::Bot),
            _ => Err(ParseFilterError(s.to_string())),
        }
    }
}

impl FromStr for Sentiment {
    type Err = ParseFilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "positive" => Ok(Self::Positive),
            "neutral" => Ok(Self::Neutral),
            "negative" => Ok(Self::Negative),
            _ => Err(ParseFilterError(s.to_string())),
        }
    }
}

/// The filters an operator has selected on a dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterState {
    /// First day of the range. (inclusive)
    pub start_date: Option<NaiveDate>,
    /// Last day of the range. (inclusive)
    pub end_date: Option<NaiveDate>,
    pub real_reviews: Option<Authenticity>,
    pub sentiment: Option<Sentiment>,
}

impl FilterState {
    /// Sets the date range from date-picker values, keeping the local
    /// calendar day that was selected.
    #[must_use]
    pub fn with_local_range(
        mut self,
        start: Option<DateTime<Local>>,
        end: Option<DateTime<Local>>,
    ) -> Self {
        self.start_date = start.map(|d| d.date_naive());
        self.end_date = end.map(|d| d.date_naive());
        self
    }
}

/// Query-string parameters sent with every analytics fetch of a cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct QueryParams(BTreeMap<String, String>);

impl QueryParams {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Only the date range; the search-metrics endpoints take nothing else.
    #[must_use]
    pub fn dates_only(&self) -> Self {
        Self(
            self.0
                .iter()
                .filter(|(k, _)| *k == START_DATE || *k == END_DATE)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    fn insert(&mut self, key: &str, value: String) {
        if !value.is_empty() {
            self.0.insert(key.to_string(), value);
        }
    }
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Builds the query parameters for `filter`.
///
/// A key is present iff its filter is set.
pub fn build_query_params(filter: &FilterState) -> QueryParams {
    let mut params = QueryParams::default();
    if let Some(date) = filter.start_date {
        params.insert(START_DATE, format_date(date));
    }
    if let Some(date) = filter.end_date {
        params.insert(END_DATE, format_date(date));
    }
    if let Some(real) = filter.real_reviews {
        params.insert(REAL_REVIEWS, real.as_str().to_string());
    }
    if let Some(sentiment) = filter.sentiment {
        params.insert(SENTIMENT, sentiment.as_str().to_string());
    }
    params
}
