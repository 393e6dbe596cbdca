use assert_cmd::Command;
use predicates::prelude::*;
use testcontainers::ContainerAsync;
use testcontainers_modules::{
    localstack::LocalStack,
    testcontainers::{runners::AsyncRunner, Image, ImageExt, TestcontainersError},
};

pub async fn localstack() -> Result<(String, ContainerAsync<LocalStack>), TestcontainersError> {
    let request = LocalStack::default()
        .with_tag("latest")
        .with_env_var("SERVICES", "sqs:4576,s3")
        .with_env_var("SKIP_SSL_CERT_DOWNLOAD", "1");
    let container = request.start().await?;

    let host_ip = container.get_host().await?;
    let host_port = container.get_host_port_ipv4(4566).await?;
    let endpoint_url = format!("http://{host_ip}:{host_port}");

    Ok((endpoint_url, container))
}

pub async fn create_test_bucket<I: Image>(
    container: &ContainerAsync<I>,
    name: &str,
) -> Result<(), TestcontainersError> {
    let create_bucket_command = testcontainers::core::ExecCommand::new([
        "awslocal",
        "s3api",
        "create-bucket",
        "--bucket",
        name,
    ])
    .with_container_ready_conditions(vec![testcontainers::core::WaitFor::message_on_stdout(
        "AWS s3.CreateBucket => 200",
    )]);

    container.exec(create_bucket_command).await?;

    Ok(())
}

fn payload(bucket: &str, table: &str) -> String {
    format!(
        r#"{{
            "s3_ingestion_path": "s3://{bucket}/raw/{table}/",
            "table_name": "{table}",
            "aws_account_id": "000000000000"
        }}"#
    )
}

#[tokio::test]
async fn command_does_not_exist() {
    let mut cmd = Command::cargo_bin("ingestq").unwrap();

    cmd.arg("something");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("error: unrecognized subcommand"));

    ()
}

#[tokio::test]
async fn rejects_a_malformed_payload() {
    let mut cmd = Command::cargo_bin("ingestq").unwrap();

    cmd.arg("provision");
    cmd.write_stdin("{not json");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("payload"));

    ()
}

#[tokio::test]
async fn rejects_a_malformed_ingestion_path() {
    let mut cmd = Command::cargo_bin("ingestq").unwrap();

    // valid JSON, but the path is not an s3:// URI; fails before any AWS call
    cmd.args(["--local", "provision"]);
    cmd.write_stdin(
        r#"{
            "s3_ingestion_path": "my-bucket/raw/customers/",
            "table_name": "customers",
            "aws_account_id": "000000000000"
        }"#,
    );
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("s3://"));

    ()
}

#[tokio::test]
async fn provision_wires_queue_and_bucket() {
    let (endpoint, container) = localstack().await.unwrap();

    create_test_bucket(&container, "ingest-bucket").await.unwrap();

    let mut cmd = Command::cargo_bin("ingestq").unwrap();

    cmd.args(["--local", "--endpoint", &endpoint]);
    cmd.arg("provision");
    cmd.write_stdin(payload("ingest-bucket", "customers"));

    cmd.assert().success().stdout(
        predicate::str::contains("customers-ingestion-queue")
            .and(predicate::str::contains(
                "arn:aws:sqs:us-east-1:000000000000:customers-ingestion-queue",
            ))
            .and(predicate::str::contains("customers-ingestion-queue-dlq"))
            .and(predicate::str::contains(
                "customers-event-forward-to--customers-ingestion-queue",
            )),
    );

    container.stop().await.unwrap();

    ()
}

#[tokio::test]
async fn teardown_reports_partial_failure_on_a_missing_queue() {
    let (endpoint, container) = localstack().await.unwrap();

    create_test_bucket(&container, "teardown-bucket").await.unwrap();

    let mut cmd = Command::cargo_bin("ingestq").unwrap();

    cmd.args(["--local", "--endpoint", &endpoint]);
    cmd.args([
        "teardown",
        "--table",
        "never-provisioned",
        "--bucket",
        "teardown-bucket",
        "--account",
        "000000000000",
    ]);

    // the queue was never created: its steps fail, the bucket step still runs
    cmd.assert()
        .failure()
        .stdout(
            predicate::str::contains("delete_queue")
                .and(predicate::str::contains("clear_notifications"))
                .and(predicate::str::contains("clear_policy")),
        )
        .stderr(predicate::str::contains("teardown incomplete"));

    container.stop().await.unwrap();

    ()
}
