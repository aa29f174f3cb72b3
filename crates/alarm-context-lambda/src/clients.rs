use aws_config::{Region, SdkConfig};

use crate::logs::LogsClient;

/// AWS Health is served from a single global endpoint.
const HEALTH_REGION: &str = "us-east-1";

/// Every client an invocation needs, pointed at the alarm's region.
///
/// Built once per invocation from the cold-start SDK config and passed
/// explicitly to whatever makes calls.
pub struct AwsClients {
    pub region: String,
    pub cloudwatch: aws_sdk_cloudwatch::Client,
    pub logs: LogsClient,
    pub xray: aws_sdk_xray::Client,
    pub ec2: aws_sdk_ec2::Client,
    pub autoscaling: aws_sdk_autoscaling::Client,
    pub ssm: aws_sdk_ssm::Client,
    pub ecs: aws_sdk_ecs::Client,
    pub rds: aws_sdk_rds::Client,
    pub pi: aws_sdk_pi::Client,
    pub s3: aws_sdk_s3::Client,
    pub eks: aws_sdk_eks::Client,
    pub dynamodb: aws_sdk_dynamodb::Client,
    pub lambda: aws_sdk_lambda::Client,
    pub elb: aws_sdk_elasticloadbalancingv2::Client,
    pub apigateway: aws_sdk_apigateway::Client,
    pub sns: aws_sdk_sns::Client,
    pub synthetics: aws_sdk_synthetics::Client,
    pub cloudformation: aws_sdk_cloudformation::Client,
    pub health: aws_sdk_health::Client,
}

impl AwsClients {
    pub fn for_region(base: &SdkConfig, region: &str) -> Self {
        let config = with_region(base, region);
        Self {
            region: region.to_string(),
            cloudwatch: aws_sdk_cloudwatch::Client::new(&config),
            logs: LogsClient::new(aws_sdk_cloudwatchlogs::Client::new(&config)),
            xray: aws_sdk_xray::Client::new(&config),
            ec2: aws_sdk_ec2::Client::new(&config),
            autoscaling: aws_sdk_autoscaling::Client::new(&config),
            ssm: aws_sdk_ssm::Client::new(&config),
            ecs: aws_sdk_ecs::Client::new(&config),
            rds: aws_sdk_rds::Client::new(&config),
            pi: aws_sdk_pi::Client::new(&config),
            s3: aws_sdk_s3::Client::new(&config),
            eks: aws_sdk_eks::Client::new(&config),
            dynamodb: aws_sdk_dynamodb::Client::new(&config),
            lambda: aws_sdk_lambda::Client::new(&config),
            elb: aws_sdk_elasticloadbalancingv2::Client::new(&config),
            apigateway: aws_sdk_apigateway::Client::new(&config),
            sns: aws_sdk_sns::Client::new(&config),
            synthetics: aws_sdk_synthetics::Client::new(&config),
            cloudformation: aws_sdk_cloudformation::Client::new(&config),
            health: aws_sdk_health::Client::new(&with_region(base, HEALTH_REGION)),
        }
    }
}

/// A copy of `base` targeting another region.
pub fn with_region(base: &SdkConfig, region: &str) -> SdkConfig {
    base.to_builder().region(Region::new(region.to_string())).build()
}
