use alarm_context_lambda::{Config, Enricher};
use aws_config::BehaviorVersion;
use aws_lambda_events::event::sns::SnsEvent;
use lambda_runtime::{Error, LambdaEvent, service_fn};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_ansi(false)
        .with_target(false)
        .without_time()
        .init();

    let config = Config::from_env()?;
    let sdk = aws_config::defaults(BehaviorVersion::latest()).load().await;
    info!(
        region = %config.region,
        bedrock = config.bedrock.is_some(),
        "alarm context function starting"
    );
    let enricher = Enricher::new(config, sdk);
    let enricher = &enricher;

    lambda_runtime::run(service_fn(move |event: LambdaEvent<SnsEvent>| async move {
        match enricher.handle(event.payload).await {
            Ok(message_id) => {
                info!(message_id = %message_id, "alarm email sent");
                Ok::<(), Error>(())
            }
            Err(err) => {
                error!(error = %err, "alarm enrichment failed");
                Err(err.into())
            }
        }
    }))
    .await
}
