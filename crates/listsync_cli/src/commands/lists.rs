use listsync::{CollectionRef, SyncContext};

use super::shared::{CommandResult, OutputFormat, build_client, print_rows};
use crate::config::Config;

/// Which of the caller's lists to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ListFilter {
    All,
    /// Exact list ids.
    Ids(Vec<String>),
    /// Lists whose name contains any of these.
    Names(Vec<String>),
}

impl ListFilter {
    /// Build a filter from the comma-separated `--id` or `--name` value.
    pub(crate) fn from_args(ids: Option<&str>, names: Option<&str>) -> Result<Self, String> {
        match (ids, names) {
            (Some(ids), _) => split_csv(ids, "list id").map(Self::Ids),
            (None, Some(names)) => split_csv(names, "list name").map(Self::Names),
            (None, None) => Ok(Self::All),
        }
    }

    fn matches(&self, collection: &CollectionRef) -> bool {
        match self {
            Self::All => true,
            Self::Ids(ids) => ids.iter().any(|id| *id == collection.id),
            Self::Names(names) => names.iter().any(|name| collection.name.contains(name.as_str())),
        }
    }
}

fn split_csv(value: &str, what: &str) -> Result<Vec<String>, String> {
    let parts: Vec<String> = value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect();
    if parts.is_empty() {
        return Err(format!("Expected at least one {what}"));
    }
    Ok(parts)
}

/// One list for display.
#[derive(Debug, Clone, serde::Serialize, tabled::Tabled)]
pub(crate) struct ListDisplay {
    #[tabled(rename = "Id")]
    pub id: String,
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Members")]
    pub members: usize,
}

impl From<CollectionRef> for ListDisplay {
    fn from(collection: CollectionRef) -> Self {
        Self {
            id: collection.id,
            name: collection.name,
            members: collection.member_count,
        }
    }
}

pub(crate) fn select_lists(collections: Vec<CollectionRef>, filter: &ListFilter) -> Vec<ListDisplay> {
    collections
        .into_iter()
        .filter(|collection| filter.matches(collection))
        .map(ListDisplay::from)
        .collect()
}

/// Show the caller's lists with their member counts.
pub(crate) async fn handle_lists(
    ids: Option<&str>,
    names: Option<&str>,
    output: OutputFormat,
    config: &Config,
) -> CommandResult {
    let filter = ListFilter::from_args(ids, names)?;
    let client = build_client(config, config.sync.no_rate_limit)?;
    let ctx = SyncContext::builder().client(client).build()?;

    let rows = select_lists(ctx.collections().await?, &filter);
    tracing::debug!(shown = rows.len(), "Listing lists");
    print_rows(rows, output)
}
