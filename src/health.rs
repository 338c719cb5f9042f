//! The health-check API service. Answers without touching the upstream, so
//! it only tells you that the Lambda plumbing itself is alive.

use serde_json::json;

use crate::{iso_timestamp, ApiResponse};

pub fn handler() -> ApiResponse {
    ApiResponse::ok(json!({
        "message": "Hello World!",
        "timestamp": iso_timestamp(),
        "status": "Working",
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_reports_working() {
        let resp = handler();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body["message"], json!("Hello World!"));
        assert_eq!(resp.body["status"], json!("Working"));
        assert!(resp.body["timestamp"].as_str().unwrap().ends_with('Z'));
    }
}
