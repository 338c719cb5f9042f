//! Plumbing between API Gateway's proxy-event requests and our handlers.
//!
//! The endpoint modules speak [`Invocation`] and [`ApiResponse`]; this layer
//! resolves which endpoint the invoked function ARN names, peels the query
//! string and JSON body out of the HTTP request, short-circuits CORS
//! preflights, and stamps the headers the dashboard's browser needs on the
//! way out. The dashboard is served from a different origin than the API, so
//! every response must carry the permissive CORS set or the browser drops it
//! on the floor.

use lambda_http::{
    http::{
        header::{
            ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
            ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE,
        },
        Method, StatusCode,
    },
    Body, Error, Request, RequestExt, RequestPayloadExt, Response,
};
use serde_json::Value;
use std::collections::HashMap;

use crate::{resolve_endpoint, ApiResponse, Endpoint, Invocation, Services};

pub async fn handle(req: Request, services: &Services) -> Result<Response<Body>, Error> {
    let context = req.lambda_context();
    let cfg = context.env_config;
    println!("*** fn name={} version={}", cfg.function_name, cfg.version);

    let endpoint = resolve_endpoint(&context.invoked_function_arn)?;

    if req.method() == Method::OPTIONS {
        return preflight(endpoint);
    }

    let invocation = match invocation_of(&req) {
        Ok(inv) => inv,
        Err(e) => return render(endpoint, ApiResponse::error(StatusCode::BAD_REQUEST, e)),
    };

    render(endpoint, services.invoke(endpoint, invocation).await)
}

fn invocation_of(req: &Request) -> Result<Invocation, String> {
    let params: HashMap<String, String> = req
        .query_string_parameters()
        .iter()
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect();

    // Only JSON and form bodies get parsed; anything else reads as no body.
    let payload: Option<Value> = req
        .payload()
        .map_err(|e| format!("invalid request body: {}", e))?;

    Ok(Invocation { params, payload })
}

/// An empty 200 wearing the CORS headers, answering an `OPTIONS` probe.
fn preflight(endpoint: Endpoint) -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .header(ACCESS_CONTROL_ALLOW_METHODS, endpoint.allowed_methods())
        .header(ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type")
        .body(Body::Empty)?)
}

fn render(endpoint: Endpoint, api: ApiResponse) -> Result<Response<Body>, Error> {
    let body = serde_json::to_string(&api.body)?;

    Ok(Response::builder()
        .status(api.status)
        .header(CONTENT_TYPE, "application/json")
        .header(ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .header(ACCESS_CONTROL_ALLOW_METHODS, endpoint.allowed_methods())
        .header(ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type")
        .body(Body::Text(body))?)
}
