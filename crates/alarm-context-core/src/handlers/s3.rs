use chrono::Duration;

use crate::error::CoreError;
use crate::links;

use super::{HandlerPlan, RequestEnv, ResourceRequest, metric_widgets};

const STORAGE_METRICS: &[(&str, &str)] = &[("NumberOfObjects", "Average"), ("BucketSizeBytes", "Average")];

const REQUEST_METRICS: &[(&str, &str)] = &[
    ("AllRequests", "Sum"),
    ("GetRequests", "Sum"),
    ("PutRequests", "Sum"),
    ("DeleteRequests", "Sum"),
    ("HeadRequests", "Sum"),
    ("PostRequests", "Sum"),
    ("ListRequests", "Sum"),
    ("BytesDownloaded", "Sum"),
    ("BytesUploaded", "Sum"),
    ("4xxErrors", "Sum"),
    ("5xxErrors", "Sum"),
    ("FirstByteLatency", "Average"),
    ("TotalRequestLatency", "Average"),
];

const REPLICATION_METRICS: &[(&str, &str)] = &[
    ("OperationsFailedReplication", "Sum"),
    ("OperationsPendingReplication", "Maximum"),
    ("ReplicationLatency", "Maximum"),
    ("BytesPendingReplication", "Maximum"),
];

const STORAGE_LENS_METRICS: &[(&str, &str)] = &[
    ("StorageBytes", "Sum"),
    ("SelectScannedBytes", "Sum"),
    ("SelectReturnedBytes", "Sum"),
    ("SelectRequests", "Sum"),
    ("ReplicatedStorageBytesSource", "Sum"),
    ("ReplicatedStorageBytes", "Sum"),
    ("PutRequests", "Sum"),
    ("PostRequests", "Sum"),
    ("ObjectCount", "Sum"),
    ("NonCurrentVersionStorageBytes", "Sum"),
    ("ListRequests", "Sum"),
    ("IncompleteMultipartUploadStorageBytes", "Sum"),
    ("IncompleteMPUStorageBytesOlderThan7Days", "Sum"),
    ("EncryptedStorageBytes", "Sum"),
    ("UnencryptedStorageBytes", "Sum"),
    ("HeadRequests", "Sum"),
    ("GetRequests", "Sum"),
    ("DeleteRequests", "Sum"),
    ("DeleteMarkerStorageBytes", "Sum"),
    ("CurrentVersionStorageBytes", "Sum"),
    ("BytesUploaded", "Sum"),
    ("BytesDownloaded", "Sum"),
    ("AllRequests", "Sum"),
    ("AllUnsupportedSignatureRequests", "Sum"),
    ("AllUnsupportedTLSRequests", "Sum"),
    ("AllSSEKMSRequests", "Sum"),
    ("5xxErrors", "Sum"),
    ("4xxErrors", "Sum"),
    ("200OKStatusCount", "Sum"),
];

/// Storage Lens publishes daily; charts need a much wider window.
const STORAGE_LENS_LOOKBACK_MINUTES: i64 = 5000;
const STORAGE_LENS_LOOKAHEAD_MINUTES: i64 = 100;

/// S3 metric groups are additive: every group whose dimensions are present
/// contributes its widgets.
pub fn plan(env: &RequestEnv<'_>) -> Result<Option<HandlerPlan>, CoreError> {
    let dims = env.dimensions;
    let ns = env.namespace;
    let mut plan = HandlerPlan::new().link("S3 automatic dashboard", links::legend_dashboard(env.region, "S3"));

    let bucket = dims.get("BucketName").or_else(|| dims.get("bucket_name"));
    let destination = dims.get("DestinationBucket");

    if let Some(storage_bucket) = bucket.or(destination) {
        plan = plan.widgets(metric_widgets(ns, &[("BucketName", storage_bucket)], STORAGE_METRICS, 3600));
    }

    if let (Some(bucket), Some(filter)) = (bucket, dims.get("FilterId")) {
        plan = plan.widgets(metric_widgets(
            ns,
            &[("BucketName", bucket), ("FilterId", filter)],
            REQUEST_METRICS,
            60,
        ));
    }

    if let (Some(source), Some(destination), Some(rule)) = (dims.get("SourceBucket"), destination, dims.get("RuleId")) {
        plan = plan.widgets(metric_widgets(
            ns,
            &[("SourceBucket", source), ("DestinationBucket", destination), ("RuleId", rule)],
            REPLICATION_METRICS,
            60,
        ));
    }

    if let (Some(bucket), Some(account), Some(region), Some(configuration)) = (
        bucket,
        dims.get("aws_account_number"),
        dims.get("aws_region"),
        dims.get("configuration_id"),
    ) {
        plan = plan.widgets(metric_widgets(
            ns,
            &[
                ("bucket_name", bucket),
                ("aws_account_number", account),
                ("aws_region", region),
                ("configuration_id", configuration),
            ],
            STORAGE_LENS_METRICS,
            86400,
        ));
        let change = env.window.change;
        plan.widget_window = Some((
            change - Duration::minutes(STORAGE_LENS_LOOKBACK_MINUTES),
            change + Duration::minutes(STORAGE_LENS_LOOKAHEAD_MINUTES),
        ));
    }

    if let Some(bucket) = bucket.or(destination) {
        plan = plan.resource(ResourceRequest::S3BucketTags {
            bucket: bucket.to_string(),
        });
    }

    Ok(Some(plan))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing::{Fixture, titles};

    #[test]
    fn bucket_with_filter_adds_request_metrics() {
        let fixture = Fixture::new(&[("FilterId", "EntireBucket"), ("BucketName", "logs")]);
        let plan = plan(&fixture.env("AWS/S3", "5xxErrors")).unwrap().unwrap();
        let titles = titles(&plan);
        assert_eq!(titles.len(), 15);
        assert_eq!(titles[1], "BucketSizeBytes");
        assert_eq!(titles[14], "TotalRequestLatency");
        assert_eq!(plan.widgets[0].period, 3600);
        assert!(plan.widget_window.is_none());
        assert_eq!(plan.resources, vec![ResourceRequest::S3BucketTags { bucket: "logs".into() }]);
    }

    #[test]
    fn replication_uses_destination_for_storage() {
        let fixture = Fixture::new(&[("SourceBucket", "a"), ("DestinationBucket", "b"), ("RuleId", "r1")]);
        let plan = plan(&fixture.env("AWS/S3", "ReplicationLatency")).unwrap().unwrap();
        assert_eq!(plan.widgets.len(), 6);
        assert_eq!(plan.widgets[2].title, "OperationsFailedReplication");
        assert_eq!(plan.resources, vec![ResourceRequest::S3BucketTags { bucket: "b".into() }]);
    }

    #[test]
    fn storage_lens_widens_widget_window() {
        let fixture = Fixture::new(&[
            ("bucket_name", "data"),
            ("aws_account_number", "123456789012"),
            ("aws_region", "us-east-1"),
            ("configuration_id", "default-account-dashboard"),
        ]);
        let plan = plan(&fixture.env("AWS/S3/Storage-Lens", "StorageBytes")).unwrap().unwrap();
        assert_eq!(plan.widgets.len(), 2 + 29);
        let (start, end) = plan.widget_window.unwrap();
        assert_eq!(fixture.window.change - start, Duration::minutes(5000));
        assert_eq!(end - fixture.window.change, Duration::minutes(100));
    }

    #[test]
    fn no_dimensions_still_links_dashboard() {
        let fixture = Fixture::new(&[]);
        let plan = plan(&fixture.env("AWS/S3", "BucketSizeBytes")).unwrap().unwrap();
        assert_eq!(plan.links.len(), 1);
        assert!(plan.widgets.is_empty());
        assert!(plan.resources.is_empty());
    }
}
