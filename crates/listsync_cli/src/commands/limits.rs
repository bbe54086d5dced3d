use chrono::{DateTime, Utc};
use listsync::rest::RateLimitStatus;

use super::shared::{CommandResult, OutputFormat, build_client, print_rows};
use crate::config::Config;

/// Rate limit information for display.
#[derive(Debug, Clone, serde::Serialize, tabled::Tabled)]
pub(crate) struct RateLimitDisplay {
    #[tabled(rename = "Resource")]
    pub resource: String,
    #[tabled(rename = "Endpoint")]
    pub endpoint: String,
    #[tabled(rename = "Limit")]
    pub limit: u32,
    #[tabled(rename = "Remaining")]
    pub remaining: u32,
    #[tabled(rename = "Resets At")]
    pub reset_at: String,
    #[tabled(rename = "Resets In")]
    pub reset_in: String,
}

impl RateLimitDisplay {
    pub(crate) fn from_status(status: RateLimitStatus, now: DateTime<Utc>) -> Self {
        let reset_duration = status.reset_at.signed_duration_since(now);
        let reset_in = if reset_duration.num_seconds() > 0 {
            format_duration(reset_duration)
        } else {
            "now".to_string()
        };

        Self {
            resource: status.resource_family,
            endpoint: status.endpoint,
            limit: status.limit,
            remaining: status.remaining,
            reset_at: status.reset_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            reset_in,
        }
    }
}

/// Resource family of an endpoint path: `/lists/members` belongs to `lists`.
fn family_of(endpoint: &str) -> Option<&str> {
    endpoint
        .trim_start_matches('/')
        .split('/')
        .next()
        .filter(|family| !family.is_empty())
}

/// Resource families to request for the given filters.
pub(crate) fn requested_families(resources: &[String], endpoint: Option<&str>) -> Vec<String> {
    if !resources.is_empty() {
        return resources.to_vec();
    }
    endpoint
        .and_then(family_of)
        .map(|family| vec![family.to_string()])
        .unwrap_or_default()
}

/// Keep only `endpoint`, accepting it with or without the leading slash.
pub(crate) fn select_endpoint(
    limits: Vec<RateLimitStatus>,
    endpoint: Option<&str>,
) -> Result<Vec<RateLimitStatus>, String> {
    let Some(endpoint) = endpoint else {
        return Ok(limits);
    };
    let wanted = format!("/{}", endpoint.trim_start_matches('/'));
    let selected: Vec<_> = limits
        .into_iter()
        .filter(|limit| limit.endpoint == wanted)
        .collect();
    if selected.is_empty() {
        return Err(format!("No rate limit reported for endpoint '{}'", wanted));
    }
    Ok(selected)
}

/// Show the remote service's current rate limits.
pub(crate) async fn handle_limits(
    resources: &[String],
    endpoint: Option<&str>,
    output: OutputFormat,
    config: &Config,
) -> CommandResult {
    let client = build_client(config, config.sync.no_rate_limit)?;
    let families = requested_families(resources, endpoint);
    let limits = client.inner().rate_limit_status(&families).await?;
    let limits = select_endpoint(limits, endpoint)?;

    let now = Utc::now();
    let rows: Vec<RateLimitDisplay> = limits
        .into_iter()
        .map(|status| RateLimitDisplay::from_status(status, now))
        .collect();
    print_rows(rows, output)
}

fn format_duration(duration: chrono::Duration) -> String {
    let total_secs = duration.num_seconds();
    if total_secs < 60 {
        format!("{}s", total_secs)
    } else if total_secs < 3600 {
        let mins = total_secs / 60;
        let secs = total_secs % 60;
        if secs > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}m", mins)
        }
    } else {
        let hours = total_secs / 3600;
        let mins = (total_secs % 3600) / 60;
        if mins > 0 {
            format!("{}h {}m", hours, mins)
        } else {
            format!("{}h", hours)
        }
    }
}
