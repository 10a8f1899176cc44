use crate::models::UsageGroup;
use crate::providers::{ClientError, UsageDataSource, UsageQuery};
use async_trait::async_trait;
use aws_sdk_costexplorer::error::DisplayErrorContext;
use aws_sdk_costexplorer::operation::get_cost_and_usage::GetCostAndUsageOutput;
use aws_sdk_costexplorer::types::{
    DateInterval, Dimension, DimensionValues, Expression, Granularity, GroupDefinition,
    GroupDefinitionType,
};
use aws_sdk_costexplorer::Client;
use tracing::{info, warn};

pub struct CostExplorerSource {
    client: Client,
}

impl CostExplorerSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn dimension(key: Dimension, value: &str) -> Expression {
        Expression::builder()
            .dimensions(DimensionValues::builder().key(key).values(value).build())
            .build()
    }

    fn groups_from_output(output: &GetCostAndUsageOutput, metric: &str) -> Vec<UsageGroup> {
        let buckets = output.results_by_time();
        if buckets.len() > 1 {
            warn!(
                buckets = buckets.len(),
                "Expected one monthly bucket, reading only the first"
            );
        }
        let Some(bucket) = buckets.first() else {
            return Vec::new();
        };

        bucket
            .groups()
            .iter()
            .map(|group| UsageGroup {
                usage_type: group.keys().first().cloned(),
                raw_quantity: group
                    .metrics()
                    .and_then(|metrics| metrics.get(metric))
                    .and_then(|value| value.amount())
                    .map(ToString::to_string),
            })
            .collect()
    }
}

#[async_trait]
impl UsageDataSource for CostExplorerSource {
    async fn query(&self, query: &UsageQuery) -> Result<Vec<UsageGroup>, ClientError> {
        // Cost Explorer treats End as exclusive.
        let interval = DateInterval::builder()
            .start(query.period.start.to_string())
            .end(query.period.exclusive_end().to_string())
            .build()
            .map_err(|e| ClientError::new(e.to_string()))?;

        let filter = Expression::builder()
            .and(Self::dimension(Dimension::Service, &query.service))
            .and(Self::dimension(Dimension::Region, &query.region))
            .build();

        let output = self
            .client
            .get_cost_and_usage()
            .time_period(interval)
            .granularity(Granularity::Monthly)
            .filter(filter)
            .group_by(
                GroupDefinition::builder()
                    .r#type(GroupDefinitionType::Dimension)
                    .key(query.group_by)
                    .build(),
            )
            .metrics(query.metric)
            .send()
            .await
            .map_err(|e| ClientError::new(DisplayErrorContext(&e).to_string()))?;

        info!("Cost Explorer data fetched successfully");
        Ok(Self::groups_from_output(&output, query.metric))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_costexplorer::types::{Group, MetricValue, ResultByTime};

    fn group(key: &str, amount: Option<&str>) -> Group {
        let builder = Group::builder().keys(key);
        match amount {
            Some(a) => builder
                .metrics("UsageQuantity", MetricValue::builder().amount(a).unit("Hrs").build())
                .build(),
            None => builder.build(),
        }
    }

    #[test]
    fn groups_map_first_key_and_metric_amount() {
        let output = GetCostAndUsageOutput::builder()
            .results_by_time(
                ResultByTime::builder()
                    .groups(group("APS3-BoxUsage:c5.xlarge", Some("40")))
                    .groups(group("APS3-DataTransfer-Out-Bytes", None))
                    .build(),
            )
            .build();

        let groups = CostExplorerSource::groups_from_output(&output, "UsageQuantity");
        assert_eq!(
            groups,
            vec![
                UsageGroup::new("APS3-BoxUsage:c5.xlarge", "40"),
                UsageGroup {
                    usage_type: Some("APS3-DataTransfer-Out-Bytes".into()),
                    raw_quantity: None,
                },
            ]
        );
    }

    #[test]
    fn empty_response_yields_no_groups() {
        let output = GetCostAndUsageOutput::builder().build();
        assert!(CostExplorerSource::groups_from_output(&output, "UsageQuantity").is_empty());
    }

    #[test]
    fn only_first_bucket_is_read() {
        let output = GetCostAndUsageOutput::builder()
            .results_by_time(
                ResultByTime::builder()
                    .groups(group("BoxUsage:t2.micro", Some("1")))
                    .build(),
            )
            .results_by_time(
                ResultByTime::builder()
                    .groups(group("BoxUsage:t2.large", Some("2")))
                    .build(),
            )
            .build();

        let groups = CostExplorerSource::groups_from_output(&output, "UsageQuantity");
        assert_eq!(groups, vec![UsageGroup::new("BoxUsage:t2.micro", "1")]);
    }
}
