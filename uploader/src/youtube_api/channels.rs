//! YouTube Channels API types.

use serde::{Deserialize, Serialize};

/// Response structure for the `channels.list` API call.
///
/// See: <https://developers.google.com/youtube/v3/docs/channels/list>
#[derive(Debug, Serialize, Deserialize)]
pub struct ChannelListResponse {
    /// A list of channels that match the request criteria.
    ///
    /// YouTube leaves the field out entirely when nothing matches.
    #[serde(default)]
    pub items: Vec<Channel>,
    #[serde(rename = "pageInfo")]
    pub page_info: PageInfo,
}

/// A `channel` resource, reduced to its identifier.
///
/// See: <https://developers.google.com/youtube/v3/docs/channels#resource>
#[derive(Debug, Serialize, Deserialize)]
pub struct Channel {
    /// The ID that YouTube uses to uniquely identify the channel.
    pub id: String,
}

/// Paging details for lists of resources.
///
/// See: <https://developers.google.com/youtube/v3/docs/pageInfo>
#[derive(Debug, Serialize, Deserialize)]
pub struct PageInfo {
    /// The total number of results in the result set.
    #[serde(rename = "totalResults")]
    pub total_results: u32,
    /// The number of results included in the API response.
    #[serde(rename = "resultsPerPage")]
    pub results_per_page: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_without_channel() {
        let response: ChannelListResponse = serde_json::from_str(
            r#"{"kind": "youtube#channelListResponse", "pageInfo": {"totalResults": 0, "resultsPerPage": 1}}"#,
        )
        .unwrap();
        assert!(response.items.is_empty());
        assert_eq!(response.page_info.total_results, 0);
    }
}
