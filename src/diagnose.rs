//! The upstream diagnostics API service.
//!
//! The city's feature service has broken underneath us more than once, in
//! ways that a plain "search returned an error" message does not untangle:
//! the whole service can be down, queries can fail while the metadata
//! document still loads, the layer can be emptied out, or a column we filter
//! on can be renamed. This endpoint runs four fixed probes against the
//! layer, in order, and assembles a report:
//!
//! 1. the service metadata document;
//! 2. a tiny unfiltered sample, which also yields the field inventory;
//! 3. the canned address search (substring `NORRIS`);
//! 4. an account-number not-null filter.
//!
//! Embedded ArcGIS errors are captured per probe and the report is still
//! produced. Only a transport-level failure (network, non-2xx, junk JSON)
//! aborts the endpoint into its 500 shape. On top of the raw probe results
//! the report carries `recommendations` (every matching rule of a fixed,
//! ordered list) and a single first-match `quick_diagnosis`, which the
//! dashboard's support page displays verbatim. The rules are evaluated in
//! the documented order; their outcomes are only mutually exclusive because
//! of that order.

use anyhow::Result;
use lambda_http::http::StatusCode;
use reqwest::Url;
use serde_json::{json, Value};

use crate::{
    arcgis::{Client, EnvelopeError, Feature, FeatureSet, FieldDef, QuerySpec},
    iso_timestamp, ApiResponse,
};

/// Record count for the unfiltered sample probe.
const SAMPLE_COUNT: u32 = 3;

/// The canned substring for the address-search probe. Chosen because the
/// layer has always held a handful of records on Norris Street.
const ADDRESS_PROBE_TERM: &str = "NORRIS";

const ADDRESS_PROBE_COUNT: u32 = 5;
const ACCOUNT_PROBE_COUNT: u32 = 3;

fn sample_spec() -> QuerySpec {
    QuerySpec {
        result_record_count: Some(SAMPLE_COUNT),
        ..QuerySpec::default()
    }
}

fn address_spec() -> QuerySpec {
    QuerySpec {
        where_clause: format!("UPPER(ADDRESS) LIKE UPPER('%{}%')", ADDRESS_PROBE_TERM),
        result_record_count: Some(ADDRESS_PROBE_COUNT),
        ..QuerySpec::default()
    }
}

fn account_spec() -> QuerySpec {
    QuerySpec {
        where_clause: "OPA_ACCOUNT_NUM IS NOT NULL".to_owned(),
        result_record_count: Some(ACCOUNT_PROBE_COUNT),
        ..QuerySpec::default()
    }
}

pub async fn handler(arcgis: &Client) -> ApiResponse {
    match run(arcgis).await {
        Ok(report) => ApiResponse::ok(report),
        Err(e) => {
            println!("*** diagnostic probes aborted: {e:#}");

            ApiResponse {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                body: json!({
                    "success": false,
                    "error": format!("{e:#}"),
                    "stack": format!("{e:?}"),
                    "timestamp": iso_timestamp(),
                    "note": "This is a network or API connection error",
                }),
            }
        }
    }
}

async fn run(arcgis: &Client) -> Result<Value> {
    println!("*** diagnose: probing {}", arcgis.layer_url());

    // Probe 1: can we even fetch the service metadata document?

    let info_url = arcgis.info_url();
    println!("+++ service info: {info_url}");
    let info = arcgis.service_info().await?;
    let service_error = embedded_error(&info);
    let raw_service_error = info.get("error").cloned().unwrap_or(Value::Null);

    // Probe 2: a tiny unfiltered sample, which also shows us the fields.

    let sample_url = arcgis.query_url(&sample_spec());
    println!("+++ sample data: {sample_url}");
    let sample = arcgis.query_envelope(&sample_spec()).await?;

    // Probe 3: the canned address search.

    let address_url = arcgis.query_url(&address_spec());
    println!("+++ address search: {address_url}");
    let address = arcgis.query_envelope(&address_spec()).await?;

    // Probe 4: records with an OPA account number.

    let account_url = arcgis.query_url(&account_spec());
    println!("+++ account search: {account_url}");
    let account = arcgis.query_envelope(&account_spec()).await?;

    Ok(json!({
        "success": true,
        "timestamp": iso_timestamp(),
        "tests": {
            "service_info": {
                "success": service_error.is_none(),
                "data": info,
                "url": info_url.to_string(),
                "error": raw_service_error,
            },
            "sample_data": {
                "success": sample.error.is_none(),
                "recordCount": sample.feature_count().unwrap_or(0),
                "fields": sample.fields.as_deref().unwrap_or_default(),
                "sampleRecords": sample_records(&sample, 2),
                "url": sample_url.to_string(),
                "error": &sample.error,
            },
            "address_search": {
                "success": address.error.is_none(),
                "searchTerm": ADDRESS_PROBE_TERM,
                "recordCount": address.feature_count().unwrap_or(0),
                "sampleRecords": sample_records(&address, 2),
                "url": address_url.to_string(),
                "error": &address.error,
            },
            "opa_search": {
                "success": account.error.is_none(),
                "recordCount": account.feature_count().unwrap_or(0),
                "sampleRecords": sample_records(&account, 1),
                "url": account_url.to_string(),
                "error": &account.error,
            },
        },
        "field_analysis": field_analysis(sample.fields.as_deref()),
        "recommendations": recommendations(service_error.as_ref(), &sample, &address),
        "quick_diagnosis": quick_diagnosis(
            service_error.as_ref(),
            &sample,
            &address,
            arcgis.layer_url(),
        ),
    }))
}

/// ArcGIS signals trouble by the *presence* of an `error` key; the shape of
/// what's inside is less dependable. Odd shapes get stuffed into the message
/// wholesale rather than dropped.
fn embedded_error(envelope: &Value) -> Option<EnvelopeError> {
    let raw = envelope.get("error")?;

    Some(match serde_json::from_value(raw.clone()) {
        Ok(err) => err,
        Err(_) => EnvelopeError {
            code: None,
            message: Some(raw.to_string()),
            details: Vec::new(),
        },
    })
}

fn sample_records(fs: &FeatureSet, limit: usize) -> Vec<Feature> {
    fs.features
        .as_deref()
        .unwrap_or_default()
        .iter()
        .take(limit)
        .cloned()
        .collect()
}

fn classify(fields: &[FieldDef], needles: &[&str]) -> Vec<Value> {
    fields
        .iter()
        .filter(|f| {
            let name = f.name.to_lowercase();
            needles.iter().any(|needle| name.contains(needle))
        })
        .map(|f| json!({ "name": f.name, "alias": f.alias }))
        .collect()
}

/// Guess which columns the search endpoint should be filtering on, from the
/// field inventory of the sample probe. Null when that probe carried no
/// `fields` key.
fn field_analysis(fields: Option<&[FieldDef]>) -> Value {
    let fields = match fields {
        Some(f) => f,
        None => return Value::Null,
    };

    let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();

    json!({
        "total_fields": fields.len(),
        "field_names": names,
        "likely_address_fields": classify(fields, &["address", "addr"]),
        "likely_opa_fields": classify(fields, &["opa", "account"]),
        "likely_cert_fields": classify(fields, &["cert", "status", "date"]),
    })
}

fn error_recommendation(priority: &str, issue: &str, solution: &str, err: &EnvelopeError) -> Value {
    json!({
        "priority": priority,
        "issue": issue,
        "message": err.message,
        "solution": solution,
        "code": err.code,
    })
}

/// Every rule that matches contributes an entry, in this fixed order.
fn recommendations(
    service_error: Option<&EnvelopeError>,
    sample: &FeatureSet,
    address: &FeatureSet,
) -> Vec<Value> {
    let mut recs = Vec::new();

    if let Some(err) = service_error {
        recs.push(error_recommendation(
            "CRITICAL",
            "Service Info Error",
            "The ArcGIS service is not accessible. Check if the service URL is correct and the service is online.",
            err,
        ));
    }

    if let Some(err) = &sample.error {
        recs.push(error_recommendation(
            "HIGH",
            "Sample Data Error",
            "Query syntax or parameters are incorrect. Check the WHERE clause and field names.",
            err,
        ));
    }

    if let Some(err) = &address.error {
        recs.push(error_recommendation(
            "HIGH",
            "Address Search Error",
            "Address search syntax is wrong. Check the field name for addresses in the database.",
            err,
        ));
    }

    // Present-but-empty only; a missing `features` array is a malformed
    // response, not an empty layer.
    if service_error.is_none() && sample.error.is_none() && sample.feature_count() == Some(0) {
        recs.push(json!({
            "priority": "MEDIUM",
            "issue": "No Data Returned",
            "message": "API is working but no records found",
            "solution": "Database might be empty, have access restrictions, or require authentication.",
        }));
    }

    if sample.error.is_none() {
        if let Some(n) = sample.feature_count().filter(|&n| n > 0) {
            recs.push(json!({
                "priority": "SUCCESS",
                "issue": "API Working!",
                "message": format!("Successfully retrieved {} sample records", n),
                "solution": "API is working correctly. Use the field names from field_analysis section for your queries.",
            }));
        }
    }

    if address.error.is_none() {
        if let Some(n) = address.feature_count().filter(|&n| n > 0) {
            recs.push(json!({
                "priority": "SUCCESS",
                "issue": "Address Search Working!",
                "message": format!("Found {} records for \"{}\"", n, ADDRESS_PROBE_TERM),
                "solution": "Address search is working. Dashboard searches should work as well.",
            }));
        }
    }

    recs
}

/// First matching rule wins; the order is the contract.
fn quick_diagnosis(
    service_error: Option<&EnvelopeError>,
    sample: &FeatureSet,
    address: &FeatureSet,
    layer_url: &Url,
) -> Value {
    if service_error.is_some() {
        return json!({
            "status": "FAILED",
            "message": "Cannot connect to Philadelphia API",
            "action": format!("Check if the service URL is correct: {}", layer_url),
        });
    }

    if sample.error.is_some() {
        return json!({
            "status": "CONNECTION_OK_QUERY_FAILED",
            "message": "Can connect to API but queries are failing",
            "action": "Check the field names and query syntax in the search endpoint",
        });
    }

    if sample.feature_count().map_or(true, |n| n == 0) {
        return json!({
            "status": "EMPTY_DATABASE",
            "message": "API works but no data found",
            "action": "Database might be empty or require authentication",
        });
    }

    if address.error.is_some() {
        return json!({
            "status": "BASIC_OK_SEARCH_FAILED",
            "message": "Basic queries work but address search fails",
            "action": "Fix the ADDRESS field name in search queries",
        });
    }

    json!({
        "status": "ALL_SYSTEMS_GO",
        "message": "API is working correctly!",
        "action": "The search endpoint should work now. Try your search again.",
    })
}
