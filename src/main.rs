use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use aws_config::{BehaviorVersion, Region};
use cdn_invalidation::invalidation_stack::{self, stack_outputs};
use cdn_invalidation::{packaging, StackSettings};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "CloudFront in front of a private S3 bucket, invalidated on upload"
)]
struct Cli {
    #[command(flatten)]
    settings: StackSettings,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the CloudFormation template, or write it to a file.
    Synth {
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Print the order CloudFormation will create the resources in.
    Plan,
    /// Create or update the stack and wait for it to finish.
    Deploy {
        /// Bucket holding the function's zip artifact.
        #[arg(long, env = "CDN_INVALIDATION_ARTIFACT_BUCKET")]
        artifact_bucket: String,
        /// Path to a compiled `bootstrap` executable to package and upload.
        #[arg(long, conflicts_with = "artifact_key")]
        bootstrap: Option<PathBuf>,
        /// Key of an artifact already in the artifact bucket.
        #[arg(long)]
        artifact_key: Option<String>,
    },
    /// Delete the stack and wait until it is gone.
    Destroy,
}

async fn load_aws_config(region: &str) -> aws_config::SdkConfig {
    aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_string()))
        .load()
        .await
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let settings = cli.settings;
    settings.validate()?;
    let definition = invalidation_stack::build(&settings)?;
    let stack = &definition.stack;

    match cli.command {
        Command::Synth { out } => {
            let body = stack.template.to_json_pretty()?;
            match out {
                Some(path) => {
                    std::fs::write(&path, body)
                        .with_context(|| format!("writing template to {}", path.display()))?;
                    tracing::info!("Wrote template for {} to {}", stack.stack_name, path.display());
                }
                None => println!("{body}"),
            }
        }
        Command::Plan => {
            let order = aws_cfn_stack::graph::dependency_order(&stack.template)?;
            for (i, logical_id) in order.iter().enumerate() {
                let ty = stack
                    .template
                    .resource(logical_id)
                    .map(|r| r.ty.as_str())
                    .unwrap_or_default();
                println!("{:>2}. {logical_id} ({ty})", i + 1);
            }
        }
        Command::Deploy { artifact_bucket, bootstrap, artifact_key } => {
            let config = load_aws_config(&settings.region).await;
            let key = match (bootstrap, artifact_key) {
                (Some(path), _) => {
                    let s3 = aws_sdk_s3::Client::new(&config);
                    packaging::package_and_upload(
                        &s3,
                        &artifact_bucket,
                        &settings.function_name,
                        &path,
                    )
                    .await?
                }
                (None, Some(key)) => key,
                (None, None) => bail!("deploy needs either --bootstrap or --artifact-key"),
            };
            let parameters = definition.artifact_parameters(&artifact_bucket, &key);
            let cfn = aws_sdk_cloudformation::Client::new(&config);
            let outputs = aws_cfn_stack::deploy::deploy_stack(&cfn, stack, &parameters).await?;
            for (name, value) in outputs.iter() {
                println!("{name} = {value}");
            }
            if let Some(domain) = outputs.get(stack_outputs::DISTRIBUTION_DOMAIN_NAME) {
                println!("served at https://{domain}/");
            }
            if let Some(bucket) = outputs.get(stack_outputs::BUCKET_NAME) {
                // direct reads are expected to be denied. only the distribution
                // may read the bucket.
                let endpoint = aws_regions::s3_regional_domain(bucket, &settings.region);
                println!("direct bucket endpoint https://{endpoint}/");
            }
        }
        Command::Destroy => {
            let config = load_aws_config(&settings.region).await;
            let cfn = aws_sdk_cloudformation::Client::new(&config);
            aws_cfn_stack::deploy::delete_stack(&cfn, &stack.stack_name).await?;
            tracing::info!("Deleted {}", stack.stack_name);
        }
    }
    Ok(())
}
