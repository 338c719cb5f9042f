//! The Lambda-powered Philadelphia lead-certification search services.
//!
//! This library crate implements the endpoints behind the lead-certification
//! dashboard. The common codebase is compiled into three different
//! executables: `leadcert-lambda-proxyevent` speaks AWS API Gateway's "proxy
//! event" framework and is what we actually deploy; `leadcert-lambda-bare` is
//! a plain JSON-in/JSON-out server that is useful for local testing; and
//! `leadcert-lambda-oneshot` runs a single endpoint from the command line.
//!
//! The upstream is the city's public ArcGIS feature service holding the
//! lead-certification records. We hold one reqwest client for it in the
//! `Services` state object; beyond that every invocation is stateless, and a
//! request's only side effect is its own outbound query.

use lambda_http::http::StatusCode;
use lambda_runtime::{tracing, Error};
use serde_json::{json, Value};
use std::collections::HashMap;

mod arcgis;
mod diagnose;
pub mod gateway;
mod health;
mod normalize;
mod querycerts;

/// The production feature layer for lead certifications. Overridable through
/// the `LEADCERT_LAYER_URL` environment variable.
pub const DEFAULT_LAYER_URL: &str =
    "https://services.arcgis.com/fLeGjb7u4uXqeF9q/arcgis/rest/services/lhhp_lead_certifications/FeatureServer/0";

/// The endpoints this deployment package provides. Each one is deployed as
/// its own Lambda function; we recognize which one we are from the suffix of
/// the invoked function ARN.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Search,
    Diagnose,
    Health,
}

impl Endpoint {
    pub fn from_arn(arn: &str) -> Option<Self> {
        if arn.ends_with("search") {
            Some(Endpoint::Search)
        } else if arn.ends_with("diagnose") {
            Some(Endpoint::Diagnose)
        } else if arn.ends_with("health") {
            Some(Endpoint::Health)
        } else {
            None
        }
    }

    /// Method allow-list advertised in the CORS headers.
    pub fn allowed_methods(&self) -> &'static str {
        match self {
            Endpoint::Search => "GET, POST, OPTIONS",
            Endpoint::Diagnose => "GET, OPTIONS",
            Endpoint::Health => "GET, OPTIONS",
        }
    }
}

/// Resolve an invoked function ARN to one of our endpoints.
pub fn resolve_endpoint(arn: &str) -> Result<Endpoint, Error> {
    // Local testing environment?
    let arn = if arn.ends_with(":test_function") {
        std::env::var("LEADCERT_LOCALTEST_ARN").unwrap()
    } else {
        arn.to_owned()
    };

    Endpoint::from_arn(&arn)
        .ok_or_else(|| -> Error { format!("unhandled function: {}", arn).into() })
}

/// A transport-neutral request: the query-string parameters and the JSON
/// body, if any. The proxyevent layer builds one from the real HTTP request;
/// the bare and oneshot entrypoints synthesize one from a plain JSON payload.
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    pub params: HashMap<String, String>,
    pub payload: Option<Value>,
}

impl Invocation {
    pub fn from_payload(payload: Option<Value>) -> Self {
        Invocation {
            params: HashMap::new(),
            payload,
        }
    }

    /// Look up a request parameter. The query string wins; otherwise a field
    /// of the JSON body is used, carried the way a query string would carry
    /// it (scalars stringified). JSON `null` counts as absent.
    pub fn param(&self, name: &str) -> Option<String> {
        if let Some(value) = self.params.get(name) {
            return Some(value.clone());
        }

        match self.payload.as_ref()?.get(name)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// What a handler hands back to whichever transport invoked it: a status code
/// plus the JSON body. The proxyevent layer wraps this in HTTP headers; the
/// bare and oneshot entrypoints emit the body alone.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl ApiResponse {
    pub fn ok(body: Value) -> Self {
        ApiResponse {
            status: StatusCode::OK,
            body,
        }
    }

    /// The flat error object every failing endpoint returns.
    pub fn error(status: StatusCode, message: impl std::fmt::Display) -> Self {
        ApiResponse {
            status,
            body: json!({ "success": false, "error": message.to_string() }),
        }
    }
}

/// ISO-8601 UTC with millisecond precision and a trailing `Z` -- the same
/// shape JavaScript's `Date.toISOString()` emits, which is what the dashboard
/// already parses.
pub(crate) fn iso_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

pub struct Services {
    arcgis: arcgis::Client,
}

impl Services {
    /// Create the state object for the lead-certification Lambda services.
    pub fn init() -> Result<Self, Error> {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_target(false) // don't print the module name
            .without_time() // don't print time (CloudWatch has it)
            .init();

        let layer_url =
            std::env::var("LEADCERT_LAYER_URL").unwrap_or_else(|_| DEFAULT_LAYER_URL.to_owned());

        Services::for_layer(layer_url)
    }

    /// Like [`Services::init`], but pointed at a specific feature layer and
    /// leaving process-global logging state alone. This is the seam the tests
    /// use to aim at a stub server.
    pub fn for_layer(layer_url: impl AsRef<str>) -> Result<Self, Error> {
        Ok(Services {
            arcgis: arcgis::Client::new(layer_url)?,
        })
    }

    /// Handle an invocation of one of the lead-certification APIs.
    ///
    /// We *could* provide a separate deployment package for each different
    /// API, but it is straightforward enough to bundle them all into one
    /// executable and "know" which function is being invoked by looking at
    /// the suffix of the function ARN.
    pub async fn dispatch(
        &self,
        arn: String,
        invocation: Invocation,
    ) -> Result<ApiResponse, Error> {
        let endpoint = resolve_endpoint(&arn)?;
        Ok(self.invoke(endpoint, invocation).await)
    }

    /// Run one endpoint. Handler failures become response envelopes here, not
    /// invocation failures: the dashboard always gets JSON back.
    pub async fn invoke(&self, endpoint: Endpoint, invocation: Invocation) -> ApiResponse {
        match endpoint {
            Endpoint::Search => querycerts::handler(&invocation, &self.arcgis).await,
            Endpoint::Diagnose => diagnose::handler(&self.arcgis).await,
            Endpoint::Health => health::handler(),
        }
    }
}
