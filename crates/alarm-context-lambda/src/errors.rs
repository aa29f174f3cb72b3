use alarm_context_core::{AwsApiError, CoreError};
use aws_sdk_cloudwatch::config::http::HttpResponse;
use aws_sdk_cloudwatch::error::{BuildError, DisplayErrorContext, ProvideErrorMetadata, SdkError};

use crate::config::ConfigError;

/// Errors from one alarm invocation.
#[derive(Debug, thiserror::Error)]
pub enum AlarmError {
    /// Missing or malformed environment.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    /// Parsing, validation or rendering failed.
    #[error("alarm processing error: {0}")]
    Core(#[from] CoreError),
    /// An AWS API call failed.
    #[error("{0}")]
    Aws(#[from] AwsApiError),
    /// The SNS event carried no record to process.
    #[error("SNS event has no records")]
    EmptyEvent,
}

/// Converts SDK failures into [`AwsApiError`] at the call site:
/// `client.describe_instances().send().await.aws("ec2", "DescribeInstances")?`.
pub trait AwsResultExt<T> {
    fn aws(self, service: &'static str, operation: &'static str) -> Result<T, AwsApiError>;
}

impl<T, E> AwsResultExt<T> for Result<T, SdkError<E, HttpResponse>>
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    fn aws(self, service: &'static str, operation: &'static str) -> Result<T, AwsApiError> {
        self.map_err(|err| classify(service, operation, err))
    }
}

/// Maps a request builder's missing-field error onto the operation it was for.
pub fn build_error(
    service: &'static str,
    operation: &'static str,
) -> impl Fn(BuildError) -> AwsApiError {
    move |err| AwsApiError::validation(service, operation, err.to_string())
}

fn classify<E>(
    service: &'static str,
    operation: &'static str,
    err: SdkError<E, HttpResponse>,
) -> AwsApiError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    let message = DisplayErrorContext(&err).to_string();
    match &err {
        SdkError::ConstructionFailure(_) => AwsApiError::validation(service, operation, message),
        SdkError::ServiceError(context) => {
            let code = context.err().code().map(str::to_string);
            let server_error = context.raw().status().as_u16() >= 500;
            let text = context.err().message().map(str::to_string).unwrap_or(message);
            let mut api_error = AwsApiError::new(service, operation, code, text);
            api_error.retryable |= server_error;
            api_error
        }
        _ => AwsApiError::transport(service, operation, message),
    }
}
