use alarm_context_core::ResourceOutcome;
use aws_sdk_dynamodb::types::TableDescription;
use serde_json::{Value, json};
use tracing::warn;

use super::{tag, tags_table, text};
use crate::clients::AwsClients;
use crate::convert::aws_time_text;
use crate::errors::{AlarmError, AwsResultExt};

const SERVICE: &str = "dynamodb";

pub async fn table(clients: &AwsClients, table: &str) -> Result<ResourceOutcome, AlarmError> {
    let output = clients
        .dynamodb
        .describe_table()
        .table_name(table)
        .send()
        .await
        .aws(SERVICE, "DescribeTable")?;
    let Some(description) = output.table() else {
        warn!(table, "DynamoDB table not found");
        return Ok(ResourceOutcome::default());
    };

    let mut outcome = ResourceOutcome::default().info(format!("DynamoDB Table: {table}"), table_json(description));
    if let Some(arn) = text(description.table_arn()) {
        let tagged = clients
            .dynamodb
            .list_tags_of_resource()
            .resource_arn(arn)
            .send()
            .await
            .aws(SERVICE, "ListTagsOfResource")?;
        outcome.tags = tagged.tags().iter().filter_map(|t| tag(t.key(), t.value())).collect();
        outcome.tables.push(tags_table(&format!("DynamoDB Table Tags: {table}"), &outcome.tags));
    }
    Ok(outcome)
}

fn table_json(table: &TableDescription) -> Value {
    json!({
        "TableName": table.table_name(),
        "TableArn": table.table_arn(),
        "TableStatus": table.table_status().map(|s| s.as_str()),
        "CreationDateTime": aws_time_text(table.creation_date_time()),
        "ItemCount": table.item_count(),
        "TableSizeBytes": table.table_size_bytes(),
        "BillingMode": table
            .billing_mode_summary()
            .and_then(|summary| summary.billing_mode())
            .map(|mode| mode.as_str()),
        "ProvisionedThroughput": table.provisioned_throughput().map(|throughput| json!({
            "ReadCapacityUnits": throughput.read_capacity_units(),
            "WriteCapacityUnits": throughput.write_capacity_units(),
            "NumberOfDecreasesToday": throughput.number_of_decreases_today(),
        })),
        "KeySchema": table
            .key_schema()
            .iter()
            .map(|key| key.attribute_name())
            .collect::<Vec<_>>(),
        "GlobalSecondaryIndexes": table
            .global_secondary_indexes()
            .iter()
            .map(|index| json!({
                "IndexName": index.index_name(),
                "IndexStatus": index.index_status().map(|s| s.as_str()),
                "ItemCount": index.item_count(),
            }))
            .collect::<Vec<_>>(),
    })
}
