//! "Oneshot" version of the lead-certification Lambda implementations.
//!
//! This executable runs one API function, based on arguments given on the
//! command line, and prints the JSON response body to stdout.

use lambda_runtime::Error;
use serde_json::Value;
use std::env;

use leadcert_lambda::{Invocation, Services};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let mut args = env::args();
    args.next(); // skip argv[0]

    let arn = args.next().ok_or_else(|| -> Error {
        "first argument should be ARN to use (search, diagnose, health)".into()
    })?;

    // The payload argument is optional; diagnose and health don't take one.
    let payload = match args.next() {
        Some(json_text) => Some(serde_json::from_str::<Value>(&json_text)?),
        None => None,
    };

    let svcs = Services::init()?;
    let result = svcs.dispatch(arn, Invocation::from_payload(payload)).await?;

    serde_json::to_writer(std::io::stdout().lock(), &result.body)?;
    Ok(())
}
