//! "Bare" version of the lead-certification Lambda implementations.
//!
//! This executable defines a server that you can easily interact with
//! locally: plain JSON in, plain JSON out, no API Gateway framing. Request
//! parameters ride in the payload object, e.g. `{"search": "NORRIS",
//! "limit": 5}`. For the cloud deployment we use the "proxy event" version,
//! which has the additional infrastructure to interact with AWS API
//! Gateway's "proxy event" framework.

use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use serde_json::Value;

use leadcert_lambda::{Invocation, Services};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let svcs = Services::init()?;
    let ref_svcs = &svcs;

    run(service_fn(|event: LambdaEvent<Value>| async move {
        let (payload, context) = event.into_parts();
        let response = ref_svcs
            .dispatch(
                context.invoked_function_arn,
                Invocation::from_payload(Some(payload)),
            )
            .await?;
        Ok::<Value, Error>(response.body)
    }))
    .await?;
    Ok(())
}
