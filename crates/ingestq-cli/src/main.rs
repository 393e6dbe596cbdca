use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

mod payload;
#[cfg(test)]
mod test;

#[tokio::main]
pub async fn main() {
    env_logger::init();
    if let Err(e) = Cli::parse().run().await {
        eprintln!("{:#}", e);
        std::process::exit(1);
    }
}

#[derive(Debug, Parser)]
#[command(name = "ingestq")]
#[command(about = "provision S3 -> SQS ingestion infrastructure", long_about = None)]
pub struct Cli {
    /// Use static test credentials (LocalStack)
    #[arg(long, global = true)]
    local: bool,

    /// Override the AWS endpoint URL
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Override the AWS region
    #[arg(long, global = true)]
    region: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Provision the queue, DLQ, policies and bucket notification for a table
    Provision {
        /// Path to the JSON payload (reads stdin if omitted)
        payload: Option<PathBuf>,

        /// Failed receives before a message moves to the DLQ
        #[arg(long, default_value_t = ingestq::DEFAULT_MAX_RECEIVE_COUNT)]
        max_receive_count: u32,

        /// Restrict the bucket notification to keys with this prefix
        #[arg(long)]
        prefix: Option<String>,

        /// Skip creating the dead letter queue
        #[arg(long)]
        no_dlq: bool,

        /// Merge into the bucket's existing notification configuration
        /// instead of replacing it (the default replace drops any
        /// notifications other tools configured on the bucket)
        #[arg(long)]
        merge: bool,

        /// Abort the whole run after this many seconds
        #[arg(long, default_value_t = 60)]
        timeout_secs: u64,
    },
    /// Best-effort removal of previously provisioned resources
    Teardown {
        /// Table whose ingestion queue should be removed
        #[arg(long)]
        table: String,

        /// Bucket whose notifications should be cleared
        #[arg(long)]
        bucket: String,

        /// AWS account id owning the queue
        #[arg(long)]
        account: String,
    },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        let Cli {
            local,
            endpoint,
            region,
            command,
        } = self;

        match command {
            Commands::Provision {
                payload,
                max_receive_count,
                prefix,
                no_dlq,
                merge,
                timeout_secs,
            } => {
                // payload validation happens before any AWS call
                let request = payload::load(payload.as_deref())?;

                let config = load_aws_config(local, endpoint.as_deref(), region).await;
                let provisioner = ingestq::Provisioner::from_config(config)?;
                let options = ingestq::ProvisionOptions {
                    max_receive_count,
                    prefix,
                    skip_dlq: no_dlq,
                    merge_notifications: merge,
                };

                let summary = tokio::time::timeout(
                    Duration::from_secs(timeout_secs),
                    provisioner.provision(&request, &options),
                )
                .await
                .with_context(|| format!("provisioning timed out after {timeout_secs}s"))??;

                println!("{}", serde_json::to_string_pretty(&summary)?);
            }
            Commands::Teardown {
                table,
                bucket,
                account,
            } => {
                let config = load_aws_config(local, endpoint.as_deref(), region).await;
                let provisioner = ingestq::Provisioner::from_config(config)?;

                let report = provisioner
                    .teardown(&account, &ingestq::queue_name(&table), &bucket)
                    .await;
                println!("{}", serde_json::to_string_pretty(&report)?);

                report.into_result()?;
            }
        }

        Ok(())
    }
}

async fn load_aws_config(
    local: bool,
    endpoint: Option<&str>,
    region: Option<String>,
) -> aws_config::SdkConfig {
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .retry_config(aws_config::retry::RetryConfig::adaptive().with_max_attempts(3));

    if let Some(region) = region {
        loader = loader.region(aws_config::Region::new(region));
    } else if local {
        loader = loader.region("us-east-1");
    }

    if let Some(endpoint) = endpoint {
        log::debug!("using endpoint override {endpoint}");
        loader = loader.endpoint_url(endpoint);
    }

    if local {
        loader = loader.credentials_provider(aws_sdk_sqs::config::Credentials::new(
            "test", "test", None, None, "static",
        ));
    }

    loader.load().await
}
