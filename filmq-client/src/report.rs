//! Typed rendering of accumulated query results.
//!
//! Every result line has the shape `"key","value"`. The parser is selected by
//! query: query 1 maps movie titles to genre lists, the others map a key to a
//! numeric metric.

use crate::accumulator::ResultDocument;
use filmq_protocol::QueryId;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// A metric value; kept as text when it does not parse as a number.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ReportValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl ReportValue {
    fn float(raw: &str) -> Self {
        raw.parse()
            .map(ReportValue::Float)
            .unwrap_or_else(|_| ReportValue::Text(raw.to_string()))
    }

    fn integer(raw: &str) -> Self {
        raw.parse()
            .map(ReportValue::Integer)
            .unwrap_or_else(|_| ReportValue::Text(raw.to_string()))
    }
}

/// Rendered result of one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryReport {
    /// Query 1: movie title to its genres.
    MovieGenres(BTreeMap<String, Vec<String>>),
    /// Query 2: country to total investment.
    CountryInvestment(BTreeMap<String, ReportValue>),
    /// Query 3: movie title to average rating.
    MovieRatings(BTreeMap<String, ReportValue>),
    /// Query 4: actor to number of appearances.
    ActorAppearances(BTreeMap<String, ReportValue>),
    /// Query 5: sentiment to revenue/budget ratio.
    SentimentRatios(BTreeMap<String, ReportValue>),
}

impl QueryReport {
    /// Parses the accumulated text of `query`. Malformed lines are skipped.
    pub fn parse(query: QueryId, text: &str) -> Self {
        match query {
            QueryId::Q1 => QueryReport::MovieGenres(
                pairs(text)
                    .map(|(title, genres)| (title, parse_genres(&genres)))
                    .collect(),
            ),
            QueryId::Q2 => QueryReport::CountryInvestment(metrics(text, ReportValue::float)),
            QueryId::Q3 => QueryReport::MovieRatings(metrics(text, ReportValue::float)),
            QueryId::Q4 => QueryReport::ActorAppearances(metrics(text, ReportValue::integer)),
            QueryId::Q5 => QueryReport::SentimentRatios(metrics(text, ReportValue::float)),
        }
    }

    /// Number of entries in the report.
    pub fn len(&self) -> usize {
        match self {
            QueryReport::MovieGenres(entries) => entries.len(),
            QueryReport::CountryInvestment(entries)
            | QueryReport::MovieRatings(entries)
            | QueryReport::ActorAppearances(entries)
            | QueryReport::SentimentRatios(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_json(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// Renders every query present in `document` to JSON, keyed like the document.
pub fn render_document(
    document: &ResultDocument,
) -> Result<BTreeMap<String, Value>, serde_json::Error> {
    QueryId::ALL
        .iter()
        .filter_map(|query| {
            let key = query.key();
            document.get(&key).map(|text| (key, *query, text))
        })
        .map(|(key, query, text)| {
            QueryReport::parse(query, text)
                .to_json()
                .map(|value| (key, value))
        })
        .collect()
}

fn pairs(text: &str) -> impl Iterator<Item = (String, String)> + '_ {
    text.lines().filter(|line| !line.is_empty()).filter_map(|line| {
        let (key, value) = line.split_once("\",\"")?;
        Some((
            key.trim_matches('"').to_string(),
            value.trim_matches('"').to_string(),
        ))
    })
}

fn metrics(text: &str, parse: fn(&str) -> ReportValue) -> BTreeMap<String, ReportValue> {
    pairs(text).map(|(key, raw)| (key, parse(&raw))).collect()
}

fn parse_genres(raw: &str) -> Vec<String> {
    let inner = raw.trim_matches(['[', ']']);
    if inner.is_empty() {
        return Vec::new();
    }
    inner
        .split(", ")
        .map(|genre| genre.trim_matches('\'').to_string())
        .collect()
}
