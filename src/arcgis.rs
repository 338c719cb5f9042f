//! Talking to an ArcGIS feature service over its REST query API.
//!
//! The lead-certification records live in a public feature layer hosted on
//! the city's ArcGIS Online account. Everything we do is read-only and goes
//! through two URL shapes: `<layer>?f=json` for the service metadata and
//! `<layer>/query?...` for attribute queries. Geometry is never requested.
//!
//! A successful query can still carry a failure: ArcGIS is fond of returning
//! HTTP 200 with an `error` object inside the JSON envelope. The `query`
//! method treats that as a hard failure; `query_envelope` hands the envelope
//! back as-is so the diagnostics endpoint can look at what happened.

use anyhow::{anyhow, bail, Context, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The pieces of a feature-layer attribute query. `to_params` turns this
/// into the `key=value` pairs the REST API expects; optional fields are
/// simply left off the URL.
#[derive(Debug, Clone)]
pub struct QuerySpec {
    pub where_clause: String,
    pub out_fields: String,
    pub return_geometry: bool,
    pub out_sr: Option<u32>,
    pub result_record_count: Option<u32>,
    pub order_by_fields: Option<String>,
}

impl Default for QuerySpec {
    fn default() -> Self {
        QuerySpec {
            where_clause: "1=1".to_owned(),
            out_fields: "*".to_owned(),
            return_geometry: false,
            out_sr: None,
            result_record_count: None,
            order_by_fields: None,
        }
    }
}

impl QuerySpec {
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("where", self.where_clause.clone()),
            ("outFields", self.out_fields.clone()),
            ("returnGeometry", self.return_geometry.to_string()),
            ("f", "json".to_owned()),
        ];

        if let Some(sr) = self.out_sr {
            params.push(("outSR", sr.to_string()));
        }

        if let Some(count) = self.result_record_count {
            params.push(("resultRecordCount", count.to_string()));
        }

        if let Some(order) = &self.order_by_fields {
            params.push(("orderByFields", order.clone()));
        }

        params
    }
}

/// One record from the layer. We only ever ask for attributes, so that is
/// all we model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feature {
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

/// A column definition from the layer's `fields` metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: Option<String>,
    pub alias: Option<String>,
}

/// The `error` object ArcGIS embeds in an otherwise-successful response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeError {
    pub code: Option<i64>,
    pub message: Option<String>,
    #[serde(default)]
    pub details: Vec<String>,
}

impl EnvelopeError {
    /// A one-line rendering for logs and error responses. ArcGIS does not
    /// reliably fill in any particular field, so fall through the ones that
    /// exist.
    pub fn describe(&self) -> String {
        let message = match (&self.message, self.details.first()) {
            (Some(m), _) => m.clone(),
            (None, Some(d)) => d.clone(),
            (None, None) => "unspecified error".to_owned(),
        };

        match self.code {
            Some(code) => format!("{} (code {})", message, code),
            None => message,
        }
    }
}

/// The response envelope of a feature query.
#[derive(Debug, Clone, Deserialize)]
pub struct FeatureSet {
    pub error: Option<EnvelopeError>,
    pub features: Option<Vec<Feature>>,
    pub fields: Option<Vec<FieldDef>>,
}

impl FeatureSet {
    pub fn feature_count(&self) -> Option<usize> {
        self.features.as_ref().map(|f| f.len())
    }

    /// Take the features out, insisting that the array was actually there.
    pub fn into_features(self) -> Result<Vec<Feature>> {
        self.features
            .ok_or_else(|| anyhow!("malformed upstream response: no `features` array"))
    }
}

/// A read-only client for one feature layer.
pub struct Client {
    http: reqwest::Client,
    layer: Url,
}

impl Client {
    pub fn new(layer_url: impl AsRef<str>) -> Result<Self> {
        let trimmed = layer_url.as_ref().trim().trim_end_matches('/');
        let layer = Url::parse(trimmed)
            .with_context(|| format!("illegal feature layer URL `{}`", trimmed))?;

        let http = reqwest::Client::builder()
            .build()
            .context("error initializing the HTTP client")?;

        Ok(Client { http, layer })
    }

    pub fn layer_url(&self) -> &Url {
        &self.layer
    }

    /// The URL of the service metadata document.
    pub fn info_url(&self) -> Url {
        let mut url = self.layer.clone();
        url.query_pairs_mut().append_pair("f", "json");
        url
    }

    /// The URL of an attribute query against the layer.
    pub fn query_url(&self, spec: &QuerySpec) -> Url {
        let mut url = self.layer.clone();
        let path = format!("{}/query", url.path().trim_end_matches('/'));
        url.set_path(&path);
        url.query_pairs_mut().extend_pairs(spec.to_params());
        url
    }

    async fn fetch(&self, url: Url) -> Result<Value> {
        let resp = self
            .http
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("error contacting {}", url))?;

        let status = resp.status();

        if !status.is_success() {
            bail!("upstream service returned HTTP {}", status.as_u16());
        }

        resp.json()
            .await
            .with_context(|| format!("error parsing response from {} as JSON", url))
    }

    /// Fetch the layer's metadata document, raw. The caller decides what an
    /// embedded `error` object means.
    pub async fn service_info(&self) -> Result<Value> {
        self.fetch(self.info_url()).await
    }

    /// Run a query and return the envelope whether or not it carries an
    /// embedded error.
    pub async fn query_envelope(&self, spec: &QuerySpec) -> Result<FeatureSet> {
        let value = self.fetch(self.query_url(spec)).await?;
        serde_json::from_value(value).context("unexpected shape of upstream query response")
    }

    /// Run a query, treating an embedded error as a failure.
    pub async fn query(&self, spec: &QuerySpec) -> Result<FeatureSet> {
        let fs = self.query_envelope(spec).await?;

        if let Some(err) = &fs.error {
            bail!("upstream query failed: {}", err.describe());
        }

        Ok(fs)
    }
}
