//! "Proxy event" version of the lead-certification Lambda implementations.
//!
//! This executable defines a server that expects to be interacted with
//! according to AWS API Gateway's "proxy event" protocol: real HTTP requests
//! with query strings, bodies, CORS preflights, and response headers. This is
//! what the cloud deployment runs. The "bare" version of the server is
//! simpler and is more useful for local testing.

use lambda_http::{run, service_fn, Error, Request};

use leadcert_lambda::{gateway, Services};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let svcs = Services::init()?;
    let ref_svcs = &svcs;

    run(service_fn(|req: Request| async move {
        gateway::handle(req, ref_svcs).await
    }))
    .await?;
    Ok(())
}
