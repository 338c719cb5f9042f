//! Reshaping upstream features into the dashboard's record schema.
//!
//! The feature layer's column names have drifted over the years, and exports
//! from different city systems disagree about what the "address" or "owner"
//! column is called. Each logical attribute therefore has an ordered list of
//! candidate upstream field names, and the first usable value wins. A value
//! is usable if it is non-null and, for strings, non-blank after trimming.
//!
//! Records that end up with no usable address are dropped entirely. That is
//! the sole exclusion rule: the dashboard keys its cards on the address, so a
//! record without one cannot be rendered anyway.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::arcgis::Feature;

/// Placeholder address for records missing every address field. Records
/// carrying this value are filtered out before the response is assembled.
pub const ADDRESS_UNAVAILABLE: &str = "Address Not Available";

/// Default compliance status when the upstream record does not carry one.
pub const STATUS_UNKNOWN: &str = "Unknown";

const OBJECTID_FIELDS: &[&str] = &["OBJECTID", "objectid", "FID"];
const ADDRESS_FIELDS: &[&str] = &["ADDRESS", "FULL_ADDRESS"];
const OPA_FIELDS: &[&str] = &["OPA_ACCOUNT_NUM", "OPA_ACCOUNT", "OPA_NUMBER"];
const CERT_DATE_FIELDS: &[&str] = &["CERT_DATE", "CERTIFICATION_DATE", "LEAD_CERT_DATE"];
const CERT_EXPIRY_FIELDS: &[&str] = &["CERT_EXPIRY_DATE", "EXPIRATION_DATE", "CERT_EXPIRY"];
const CERT_STATUS_FIELDS: &[&str] = &["CERT_STATUS", "STATUS"];
const CERT_TYPE_FIELDS: &[&str] = &["CERT_TYPE", "CERTIFICATION_TYPE"];
const INSPECTOR_FIELDS: &[&str] = &["INSPECTOR", "INSPECTOR_NAME", "INSPECTOR_COMPANY"];
const OWNER_FIELDS: &[&str] = &["PROPERTY_OWNER", "OWNER_NAME", "OWNER"];
const COMPLIANCE_FIELDS: &[&str] = &["COMPLIANCE_STATUS", "COMPLIANCE"];

/// The fixed record shape the dashboard consumes. Dates stay in whatever
/// representation the upstream used (epoch milliseconds, usually); we do not
/// reformat values, only pick which ones to carry.
#[derive(Debug, Clone, Serialize)]
pub struct NormalizedRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub objectid: Option<i64>,
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opa_account_num: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert_date: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert_expiry: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert_status: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert_type: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inspector: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property_owner: Option<Value>,
    pub compliance_status: String,
}

fn usable(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    }
}

fn first_usable(attrs: &Map<String, Value>, candidates: &[&str]) -> Option<Value> {
    candidates
        .iter()
        .filter_map(|name| attrs.get(*name))
        .find(|value| usable(value))
        .cloned()
}

/// The first usable *string* among the address candidates, trimmed; numeric
/// or otherwise odd address values are skipped rather than stringified.
fn address_of(attrs: &Map<String, Value>) -> String {
    for name in ADDRESS_FIELDS {
        if let Some(Value::String(s)) = attrs.get(*name) {
            let trimmed = s.trim();

            if !trimmed.is_empty() {
                return trimmed.to_owned();
            }
        }
    }

    ADDRESS_UNAVAILABLE.to_owned()
}

impl NormalizedRecord {
    pub fn from_feature(feature: &Feature) -> Self {
        let attrs = &feature.attributes;

        let compliance_status = match first_usable(attrs, COMPLIANCE_FIELDS) {
            Some(Value::String(s)) => s.trim().to_owned(),
            _ => STATUS_UNKNOWN.to_owned(),
        };

        NormalizedRecord {
            objectid: first_usable(attrs, OBJECTID_FIELDS).and_then(|v| v.as_i64()),
            address: address_of(attrs),
            opa_account_num: first_usable(attrs, OPA_FIELDS),
            cert_date: first_usable(attrs, CERT_DATE_FIELDS),
            cert_expiry: first_usable(attrs, CERT_EXPIRY_FIELDS),
            cert_status: first_usable(attrs, CERT_STATUS_FIELDS),
            cert_type: first_usable(attrs, CERT_TYPE_FIELDS),
            inspector: first_usable(attrs, INSPECTOR_FIELDS),
            property_owner: first_usable(attrs, OWNER_FIELDS),
            compliance_status,
        }
    }

    pub fn has_usable_address(&self) -> bool {
        !self.address.is_empty() && self.address != ADDRESS_UNAVAILABLE
    }
}

/// Map upstream features to records and drop the ones with no usable
/// address, preserving upstream order.
pub fn normalize(features: &[Feature]) -> Vec<NormalizedRecord> {
    features
        .iter()
        .map(NormalizedRecord::from_feature)
        .filter(|rec| rec.has_usable_address())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn feature(attrs: Value) -> Feature {
        serde_json::from_value(json!({ "attributes": attrs })).unwrap()
    }

    #[test]
    fn primary_address_wins_over_alternate() {
        let recs = normalize(&[feature(json!({
            "ADDRESS": " 1913 NORRIS ST ",
            "FULL_ADDRESS": "1913 NORRIS ST, PHILADELPHIA PA"
        }))]);

        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].address, "1913 NORRIS ST");
    }

    #[test]
    fn alternate_address_fills_in_for_missing_primary() {
        let recs = normalize(&[feature(json!({
            "FULL_ADDRESS": "2240 N 15TH ST"
        }))]);

        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].address, "2240 N 15TH ST");
    }

    #[test]
    fn blank_primary_address_falls_through() {
        let recs = normalize(&[feature(json!({
            "ADDRESS": "   ",
            "FULL_ADDRESS": "2240 N 15TH ST"
        }))]);

        assert_eq!(recs[0].address, "2240 N 15TH ST");
    }

    #[test]
    fn records_without_usable_address_are_dropped_in_order() {
        let recs = normalize(&[
            feature(json!({ "ADDRESS": "100 MAIN ST" })),
            feature(json!({ "OPA_ACCOUNT_NUM": "871234560" })),
            feature(json!({ "ADDRESS": null, "FULL_ADDRESS": "" })),
            feature(json!({ "ADDRESS": "102 MAIN ST" })),
        ]);

        let addresses: Vec<&str> = recs.iter().map(|r| r.address.as_str()).collect();
        assert_eq!(addresses, vec!["100 MAIN ST", "102 MAIN ST"]);
    }

    #[test]
    fn upstream_record_carrying_the_sentinel_is_dropped_too() {
        let recs = normalize(&[feature(json!({ "ADDRESS": ADDRESS_UNAVAILABLE }))]);
        assert!(recs.is_empty());
    }

    #[test]
    fn zero_features_normalize_to_nothing() {
        assert!(normalize(&[]).is_empty());
    }

    #[test]
    fn synonym_precedence_is_positional() {
        let rec = NormalizedRecord::from_feature(&feature(json!({
            "ADDRESS": "100 MAIN ST",
            "OPA_ACCOUNT": "111111111",
            "OPA_ACCOUNT_NUM": "222222222",
            "FID": 77
        })));

        assert_eq!(rec.opa_account_num, Some(json!("222222222")));
        assert_eq!(rec.objectid, Some(77));
    }

    #[test]
    fn compliance_status_defaults_to_unknown() {
        let rec = NormalizedRecord::from_feature(&feature(json!({
            "ADDRESS": "100 MAIN ST"
        })));
        assert_eq!(rec.compliance_status, "Unknown");

        let rec = NormalizedRecord::from_feature(&feature(json!({
            "ADDRESS": "100 MAIN ST",
            "COMPLIANCE_STATUS": " Compliant "
        })));
        assert_eq!(rec.compliance_status, "Compliant");
    }

    #[test]
    fn values_pass_through_unreformatted() {
        let rec = NormalizedRecord::from_feature(&feature(json!({
            "ADDRESS": "100 MAIN ST",
            "CERT_DATE": 1714521600000i64,
            "INSPECTOR_NAME": "ACME ENVIRONMENTAL"
        })));

        // Epoch milliseconds stay numeric; the dashboard formats them.
        assert_eq!(rec.cert_date, Some(json!(1714521600000i64)));
        assert_eq!(rec.inspector, Some(json!("ACME ENVIRONMENTAL")));
    }

    #[test]
    fn absent_attributes_are_omitted_from_json() {
        let rec = NormalizedRecord::from_feature(&feature(json!({
            "ADDRESS": "100 MAIN ST"
        })));

        let value = serde_json::to_value(&rec).unwrap();
        let keys: Vec<&str> = value.as_object().unwrap().keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["address", "compliance_status"]);
    }
}
