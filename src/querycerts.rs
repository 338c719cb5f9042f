//! The certification search API service.
//!
//! Given a free-text term, find lead-certification records whose address,
//! OPA account number, inspector, or owner matches it, newest certifications
//! first. The term is matched case-insensitively as a substring of each of
//! those columns; an empty term returns the newest records unconditionally.
//!
//! The response carries the normalized records plus a `metadata` block with
//! the raw upstream feature count, so the dashboard can tell "no matches"
//! apart from "matches existed but none had a usable address".

use anyhow::{anyhow, Result};
use lambda_http::http::StatusCode;
use serde_json::{json, Value};

use crate::{
    arcgis::{Client, QuerySpec},
    iso_timestamp, normalize, ApiResponse, Invocation,
};

/// How many records a search returns when the caller does not say.
const DEFAULT_LIMIT: u32 = 25;

/// The most records one search may ask for.
const MAX_LIMIT: u32 = 100;

/// The columns the free-text term is matched against.
const SEARCH_FIELDS: &[&str] = &[
    "ADDRESS",
    "FULL_ADDRESS",
    "OPA_ACCOUNT_NUM",
    "INSPECTOR",
    "PROPERTY_OWNER",
    "OWNER_NAME",
];

const ORDER_BY: &str = "CERT_DATE DESC";

/// WGS 84; the dashboard never maps these, but fixing the spatial reference
/// keeps responses stable if the layer's default ever changes.
const OUT_SR: u32 = 4326;

/// Attribution string echoed in the response metadata.
const SOURCE: &str = "Philadelphia Department of Public Health lead certification records";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub term: String,
    pub limit: u32,
}

impl SearchQuery {
    /// Extract and validate the search parameters of an invocation.
    ///
    /// A missing limit defaults; a present-but-non-numeric one is the
    /// caller's bug and is rejected rather than silently defaulted.
    pub fn from_invocation(inv: &Invocation) -> Result<Self> {
        let term = inv.param("search").unwrap_or_default();

        let limit = match inv.param("limit") {
            None => DEFAULT_LIMIT,
            Some(raw) => raw.trim().parse::<u32>().map_err(|_| {
                anyhow!(
                    "illegal limit parameter: {:?} is not a non-negative integer",
                    raw
                )
            })?,
        };

        Ok(SearchQuery {
            term,
            limit: limit.min(MAX_LIMIT),
        })
    }

    /// The filter expression for the upstream query.
    pub fn where_clause(&self) -> String {
        let term = self.term.trim();

        if term.is_empty() {
            return "1=1".to_owned();
        }

        // Single quotes double inside the upstream's SQL string literals.
        let escaped = term.replace('\'', "''");

        let conditions: Vec<String> = SEARCH_FIELDS
            .iter()
            .map(|field| format!("UPPER({}) LIKE UPPER('%{}%')", field, escaped))
            .collect();

        format!("1=1 AND ({})", conditions.join(" OR "))
    }

    /// The complete upstream query this search turns into.
    pub fn to_spec(&self) -> QuerySpec {
        QuerySpec {
            where_clause: self.where_clause(),
            out_sr: Some(OUT_SR),
            result_record_count: Some(self.limit),
            order_by_fields: Some(ORDER_BY.to_owned()),
            ..QuerySpec::default()
        }
    }
}

pub async fn handler(inv: &Invocation, arcgis: &Client) -> ApiResponse {
    let query = match SearchQuery::from_invocation(inv) {
        Ok(q) => q,
        Err(e) => return ApiResponse::error(StatusCode::BAD_REQUEST, format!("{e:#}")),
    };

    println!("*** search: term={:?} limit={}", query.term, query.limit);

    match run(&query, arcgis).await {
        Ok(body) => ApiResponse::ok(body),
        Err(e) => ApiResponse::error(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}")),
    }
}

async fn run(query: &SearchQuery, arcgis: &Client) -> Result<Value> {
    let features = arcgis.query(&query.to_spec()).await?.into_features()?;
    let total_features = features.len();

    let records = normalize::normalize(&features);
    let valid_records = records.len();

    println!("+++ got {total_features} features, {valid_records} with usable addresses");

    Ok(json!({
        "success": true,
        "data": records,
        "totalRows": valid_records,
        "metadata": {
            "timestamp": iso_timestamp(),
            "source": SOURCE,
            "total_features": total_features,
            "valid_records": valid_records,
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn invocation(params: &[(&str, &str)], payload: Option<Value>) -> Invocation {
        Invocation {
            params: params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
            payload,
        }
    }

    #[test]
    fn empty_term_yields_the_true_predicate() {
        let query = SearchQuery {
            term: "   ".to_owned(),
            limit: 25,
        };
        assert_eq!(query.where_clause(), "1=1");
    }

    #[test]
    fn term_expands_to_all_six_columns() {
        let query = SearchQuery {
            term: "NORRIS".to_owned(),
            limit: 25,
        };
        let clause = query.where_clause();

        assert!(clause.starts_with("1=1 AND ("));
        assert!(clause.ends_with(')'));
        assert_eq!(clause.matches(" OR ").count(), SEARCH_FIELDS.len() - 1);

        for field in SEARCH_FIELDS {
            assert!(
                clause.contains(&format!("UPPER({}) LIKE UPPER('%NORRIS%')", field)),
                "missing condition for {field} in {clause}"
            );
        }
    }

    #[test]
    fn single_quotes_are_doubled() {
        let query = SearchQuery {
            term: "O'BRIEN'S".to_owned(),
            limit: 25,
        };
        let clause = query.where_clause();

        assert!(clause.contains("%O''BRIEN''S%"));
        // Every quote doubled means the literal count stays even.
        assert_eq!(clause.matches('\'').count() % 2, 0);
        assert!(!clause.contains("'%O'B"));
    }

    #[test]
    fn limits_default_and_cap() {
        let q = SearchQuery::from_invocation(&invocation(&[], None)).unwrap();
        assert_eq!(q.limit, 25);

        for (raw, expected) in [("0", 0), ("1", 1), ("100", 100), ("500", 100)] {
            let q = SearchQuery::from_invocation(&invocation(&[("limit", raw)], None)).unwrap();
            assert_eq!(q.limit, expected, "limit={raw}");
        }
    }

    #[test]
    fn malformed_limits_are_rejected() {
        for raw in ["abc", "-5", "2.5", ""] {
            let err = SearchQuery::from_invocation(&invocation(&[("limit", raw)], None))
                .unwrap_err()
                .to_string();
            assert!(
                err.starts_with("illegal limit parameter"),
                "limit={raw:?} gave: {err}"
            );
        }
    }

    #[test]
    fn parameters_fall_back_to_the_request_body() {
        let q = SearchQuery::from_invocation(&invocation(
            &[],
            Some(json!({ "search": "NORRIS", "limit": 5 })),
        ))
        .unwrap();

        assert_eq!(q.term, "NORRIS");
        assert_eq!(q.limit, 5);
    }

    #[test]
    fn spec_fixes_the_non_negotiable_parameters() {
        let query = SearchQuery {
            term: String::new(),
            limit: 25,
        };
        let params = query.to_spec().to_params();

        assert!(params.contains(&("outFields", "*".to_owned())));
        assert!(params.contains(&("returnGeometry", "false".to_owned())));
        assert!(params.contains(&("outSR", "4326".to_owned())));
        assert!(params.contains(&("f", "json".to_owned())));
        assert!(params.contains(&("resultRecordCount", "25".to_owned())));
        assert!(params.contains(&("orderByFields", "CERT_DATE DESC".to_owned())));
    }
}
