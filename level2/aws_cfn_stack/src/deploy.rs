//! Create, update and delete a synthesized stack through the CloudFormation API,
//! polling until the stack settles.

use std::collections::BTreeMap;
use std::time::Duration;

use aws_sdk_cloudformation::error::DisplayErrorContext;
use aws_sdk_cloudformation::types::{Capability, OnFailure, Parameter, Stack, StackStatus};
use aws_sdk_cloudformation::Client;
use stack_lib::{Result, StackError};

use crate::SavedStack;

const POLL_INTERVAL: Duration = Duration::from_millis(700);

/// where a stack is after its most recent operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackProgress {
    InProgress,
    Complete,
    Failed(String),
}

pub fn classify_status(status: Option<&StackStatus>, reason: Option<&str>) -> StackProgress {
    let failed = || {
        StackProgress::Failed(reason.unwrap_or("Failed to get stack failure reason").to_string())
    };
    let status = match status {
        Some(s) => s,
        None => return failed(),
    };
    match status {
        StackStatus::CreateComplete
        | StackStatus::UpdateComplete
        | StackStatus::DeleteComplete
        | StackStatus::ImportComplete => StackProgress::Complete,

        StackStatus::CreateInProgress
        | StackStatus::DeleteInProgress
        | StackStatus::ImportInProgress
        | StackStatus::ImportRollbackInProgress
        | StackStatus::ReviewInProgress
        | StackStatus::RollbackInProgress
        | StackStatus::UpdateCompleteCleanupInProgress
        | StackStatus::UpdateInProgress
        | StackStatus::UpdateRollbackCompleteCleanupInProgress
        | StackStatus::UpdateRollbackInProgress => StackProgress::InProgress,

        // rolled back updates leave the old stack running, but the
        // requested change did not happen, so we report it as a failure.
        _ => failed(),
    }
}

fn is_missing_stack_error(msg: &str) -> bool {
    msg.contains("does not exist")
}

/// Ok(None) if the stack does not exist.
pub async fn describe_stack(client: &Client, name: &str) -> Result<Option<Stack>> {
    match client.describe_stacks().stack_name(name).send().await {
        Ok(d) => Ok(d.stacks().first().cloned()),
        Err(e) => {
            let e_str = format!("{}", DisplayErrorContext(&e));
            if is_missing_stack_error(&e_str) {
                return Ok(None);
            }
            Err(StackError::aws(e_str))
        }
    }
}

pub async fn does_stack_exist(client: &Client, name: &str) -> Result<bool> {
    Ok(describe_stack(client, name).await?.is_some())
}

fn stack_outputs(stack: &Stack) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for output in stack.outputs() {
        if let (Some(key), Some(val)) = (output.output_key(), output.output_value()) {
            out.insert(key.to_string(), val.to_string());
        }
    }
    out
}

/// polls until the stack reaches a terminal state, returning its outputs.
///
/// a create that fails with `OnFailure::Delete` passes through
/// `DELETE_IN_PROGRESS` and then disappears. The reason CloudFormation gave
/// while it was still visible is what gets reported.
pub async fn wait_for_output(client: &Client, name: &str) -> Result<BTreeMap<String, String>> {
    let mut last_reason: Option<String> = None;
    loop {
        tokio::time::sleep(POLL_INTERVAL).await;
        let failed = |reason: Option<String>| StackError::StackFailed {
            stack: name.to_string(),
            reason: reason.unwrap_or_else(|| "stack not found".to_string()),
        };
        let stack = describe_stack(client, name).await?.ok_or_else(|| failed(last_reason.clone()))?;
        if let Some(reason) = stack.stack_status_reason().filter(|r| !r.is_empty()) {
            last_reason = Some(reason.to_string());
        }
        if stack.stack_status() == Some(&StackStatus::DeleteComplete) {
            return Err(failed(last_reason));
        }
        match classify_status(stack.stack_status(), stack.stack_status_reason()) {
            StackProgress::Complete => return Ok(stack_outputs(&stack)),
            StackProgress::Failed(reason) => {
                return Err(StackError::StackFailed { stack: name.to_string(), reason });
            }
            StackProgress::InProgress => {
                tracing::debug!(stack = name, status = ?stack.stack_status(), "still waiting");
            }
        }
    }
}

fn to_parameters(parameters: &[(String, String)]) -> Vec<Parameter> {
    parameters
        .iter()
        .map(|(k, v)| Parameter::builder().parameter_key(k).parameter_value(v).build())
        .collect()
}

pub async fn create_or_update_stack(
    client: &Client,
    name: &str,
    body: &str,
    parameters: &[(String, String)],
) -> Result<()> {
    let exists = does_stack_exist(client, name).await?;
    if exists {
        tracing::info!("Updating {name} ...");
        let res = client
            .update_stack()
            .capabilities(Capability::CapabilityNamedIam)
            .capabilities(Capability::CapabilityIam)
            .stack_name(name)
            .template_body(body)
            .set_parameters(Some(to_parameters(parameters)))
            .send()
            .await;
        if let Err(e) = res {
            let e_str = format!("{}", DisplayErrorContext(&e));
            if e_str.contains("No updates are to be performed") {
                tracing::info!("{name} is already up to date");
                return Ok(());
            }
            return Err(StackError::aws(e_str));
        }
    } else {
        tracing::info!("Creating {name} ...");
        client
            .create_stack()
            .on_failure(OnFailure::Delete)
            .capabilities(Capability::CapabilityNamedIam)
            .capabilities(Capability::CapabilityIam)
            .stack_name(name)
            .template_body(body)
            .set_parameters(Some(to_parameters(parameters)))
            .send()
            .await
            .map_err(|e| StackError::aws(format!("{}", DisplayErrorContext(&e))))?;
    }
    Ok(())
}

/// deploys the stack and waits for it to settle. returns the stack outputs.
pub async fn deploy_stack(
    client: &Client,
    stack: &SavedStack,
    parameters: &[(String, String)],
) -> Result<BTreeMap<String, String>> {
    let stack_name = &stack.stack_name;
    tracing::info!(
        stack = %stack_name,
        resources = stack.template.resources.len(),
        "About to deploy stack"
    );
    for (logical_id, resource) in stack.template.resources.iter() {
        tracing::debug!(%logical_id, ty = %resource.ty, "resource");
    }
    let template_body = stack.template.to_json_pretty()?;
    create_or_update_stack(client, stack_name, &template_body, parameters).await?;
    wait_for_output(client, stack_name).await
}

/// deletes the stack and waits until CloudFormation no longer reports it.
/// deleting a stack that does not exist is not an error.
pub async fn delete_stack(client: &Client, name: &str) -> Result<()> {
    if !does_stack_exist(client, name).await? {
        tracing::info!("Stack {name} does not exist, nothing to delete");
        return Ok(());
    }
    tracing::info!("Deleting {name} ...");
    client
        .delete_stack()
        .stack_name(name)
        .send()
        .await
        .map_err(|e| StackError::aws(format!("{}", DisplayErrorContext(&e))))?;
    loop {
        tokio::time::sleep(POLL_INTERVAL).await;
        let stack = match describe_stack(client, name).await? {
            Some(s) => s,
            None => return Ok(()),
        };
        match classify_status(stack.stack_status(), stack.stack_status_reason()) {
            StackProgress::Complete => return Ok(()),
            StackProgress::Failed(reason) => {
                return Err(StackError::StackFailed { stack: name.to_string(), reason });
            }
            StackProgress::InProgress => {
                tracing::debug!(stack = name, "still deleting");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_cloudformation::operation::describe_stacks::DescribeStacksOutput;
    use aws_sdk_cloudformation::primitives::DateTime;
    use aws_sdk_cloudformation::types::Output;
    use aws_smithy_mocks::{mock, mock_client};

    #[test]
    fn terminal_statuses_are_classified() {
        let status = |s: StackStatus| classify_status(Some(&s), None);
        assert_eq!(status(StackStatus::CreateComplete), StackProgress::Complete);
        assert_eq!(status(StackStatus::UpdateComplete), StackProgress::Complete);
        assert_eq!(status(StackStatus::UpdateInProgress), StackProgress::InProgress);
        assert_eq!(status(StackStatus::ReviewInProgress), StackProgress::InProgress);
        assert_eq!(
            classify_status(Some(&StackStatus::RollbackComplete), Some("Bucket already exists")),
            StackProgress::Failed("Bucket already exists".to_string())
        );
        assert_eq!(
            classify_status(Some(&StackStatus::UpdateRollbackComplete), None),
            StackProgress::Failed("Failed to get stack failure reason".to_string())
        );
        assert!(matches!(classify_status(None, None), StackProgress::Failed(_)));
    }

    fn stack(status: StackStatus, reason: Option<&str>) -> Stack {
        Stack::builder()
            .stack_name("cloudfront-s3-invalidation-lambda-demo")
            .stack_status(status)
            .set_stack_status_reason(reason.map(str::to_string))
            .creation_time(DateTime::from_secs(0))
            .build()
    }

    fn described(stack: Option<Stack>) -> DescribeStacksOutput {
        DescribeStacksOutput::builder().set_stacks(stack.map(|s| vec![s])).build()
    }

    #[tokio::test]
    async fn failed_create_reports_reason_after_rollback_delete() {
        let reason = "cdk-cloudfront-s3-demo-bucket already exists";
        let creating = mock!(Client::describe_stacks)
            .then_output(|| described(Some(stack(StackStatus::CreateInProgress, None))));
        let rolling_back = mock!(Client::describe_stacks).then_output(move || {
            described(Some(stack(StackStatus::DeleteInProgress, Some(reason))))
        });
        let deleting = mock!(Client::describe_stacks)
            .then_output(|| described(Some(stack(StackStatus::DeleteInProgress, Some("")))));
        let gone = mock!(Client::describe_stacks).then_output(|| described(None));
        let client =
            mock_client!(aws_sdk_cloudformation, [&creating, &rolling_back, &deleting, &gone]);

        let err = wait_for_output(&client, "cloudfront-s3-invalidation-lambda-demo")
            .await
            .unwrap_err();
        match err {
            StackError::StackFailed { reason: got, .. } => assert_eq!(got, reason),
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(gone.num_calls(), 1);
    }

    #[tokio::test]
    async fn completed_stack_returns_outputs() {
        let done = mock!(Client::describe_stacks).then_output(|| {
            let mut complete = stack(StackStatus::CreateComplete, None);
            complete.outputs = Some(vec![Output::builder()
                .output_key("DistributionId")
                .output_value("E2EXAMPLE")
                .build()]);
            described(Some(complete))
        });
        let client = mock_client!(aws_sdk_cloudformation, [&done]);
        let outputs = wait_for_output(&client, "cloudfront-s3-invalidation-lambda-demo")
            .await
            .unwrap();
        assert_eq!(outputs.get("DistributionId").map(String::as_str), Some("E2EXAMPLE"));
    }

    #[test]
    fn missing_stack_message_is_detected() {
        assert!(is_missing_stack_error("ValidationError: Stack with id foo does not exist"));
        assert!(!is_missing_stack_error("Throttling: Rate exceeded"));
    }

    #[test]
    fn parameters_are_converted() {
        let params = to_parameters(&[("ArtifactKey".to_string(), "fn_1234.zip".to_string())]);
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].parameter_key(), Some("ArtifactKey"));
        assert_eq!(params[0].parameter_value(), Some("fn_1234.zip"));
    }
}
