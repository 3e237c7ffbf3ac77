use aws_config::BehaviorVersion;
use aws_sdk_cloudfront::Client as CloudFrontClient;
use lambda_runtime::{run, service_fn, tracing, Error};
mod event_handler;
use event_handler::function_handler;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing::subscriber::fmt().json().init();
    let distribution_id = std::env::var("DISTRIBUTION_ID")
        .map_err(|_| Error::from("DISTRIBUTION_ID environment variable is not set"))?;
    let shared_config = aws_config::load_defaults(BehaviorVersion::v2025_01_17()).await;
    let cloudfront_client = CloudFrontClient::new(&shared_config);
    run(service_fn(|event| function_handler(event, &cloudfront_client, &distribution_id))).await
}
