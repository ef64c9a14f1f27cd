//! HTTP client for the TomTom Traffic Index site and ranking API.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use mobility_core::ports::PortError;

use crate::{CatalogCity, DailyStat, TrafficIndexPort};

/// Page data of the ranking page, which lists every city in the index.
pub const CATALOG_URL: &str =
    "https://www.tomtom.com/en_gb/traffic-index/page-data/ranking/page-data.json";

/// Per-city daily statistics; the city's API key is appended.
pub const DAILY_STATS_URL: &str = "https://api.midway.tomtom.com/ranking/dailyStats/";

/// Envelope of the ranking page data.
#[derive(Debug, Deserialize)]
struct PageData {
    result: PageResult,
}

#[derive(Debug, Deserialize)]
struct PageResult {
    data: PageQuery,
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    #[serde(rename = "allCitiesJson")]
    all_cities: CityEdges,
}

#[derive(Debug, Deserialize)]
struct CityEdges {
    edges: Vec<CityEdge>,
}

#[derive(Debug, Deserialize)]
struct CityEdge {
    node: CatalogCity,
}

impl PageData {
    fn into_cities(self) -> Vec<CatalogCity> {
        self.result
            .data
            .all_cities
            .edges
            .into_iter()
            .map(|edge| edge.node)
            .collect()
    }
}

/// Traffic index backend talking to the public TomTom endpoints.
pub struct TomTomClient {
    client: Client,
    catalog_url: String,
    stats_url: String,
}

impl TomTomClient {
    /// Create a client bound to the public endpoints.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self::with_urls(client, CATALOG_URL, DAILY_STATS_URL)
    }

    /// Create a client bound to custom endpoints.
    #[must_use]
    pub fn with_urls<C: Into<String>, S: Into<String>>(
        client: Client,
        catalog_url: C,
        stats_url: S,
    ) -> Self {
        Self {
            client,
            catalog_url: catalog_url.into(),
            stats_url: stats_url.into(),
        }
    }
}

#[async_trait]
impl TrafficIndexPort for TomTomClient {
    async fn city_catalog(&self) -> Result<Vec<CatalogCity>, PortError> {
        let page = fetch_json::<PageData>(self.client.get(&self.catalog_url)).await?;
        Ok(page.into_cities())
    }

    async fn daily_stats(&self, api_key: &str) -> Result<Vec<DailyStat>, PortError> {
        fetch_json::<Vec<DailyStat>>(self.client.get(format!("{}{api_key}", self.stats_url))).await
    }
}

// Small helper to fetch and decode JSON with status handling.
async fn fetch_json<T: DeserializeOwned>(req: RequestBuilder) -> Result<T, PortError> {
    req.send()
        .await
        .map_err(PortError::from)?
        .error_for_status()
        .map_err(PortError::from)?
        .json()
        .await
        .map_err(PortError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_data_unwraps_to_catalog_cities() {
        let json = r#"{
            "componentChunkName": "component---src-templates-ranking-js",
            "result": {"data": {"allCitiesJson": {"edges": [
                {"node": {"name": "Tokyo", "country": "JP", "countryName": "Japan",
                          "continent": "Asia", "key": "tokyo", "rank": 12}},
                {"node": {"name": "Bengaluru", "country": "IN", "countryName": "India",
                          "continent": "Asia", "key": "bengaluru"}}
            ]}}}
        }"#;
        let page: PageData = serde_json::from_str(json).expect("valid page data");
        let cities = page.into_cities();
        assert_eq!(cities.len(), 2);
        assert_eq!(cities[0].country_name, "Japan");
        assert_eq!(cities[1].key, "bengaluru");
    }

    #[test]
    fn daily_stats_decode() {
        let json = r#"[{"date": "2021-03-01", "congestion": 23, "diffRatio": -0.15, "week": 9},
                      {"date": "2021-03-02", "congestion": null, "diffRatio": null}]"#;
        let stats: Vec<DailyStat> = serde_json::from_str(json).expect("valid series");
        assert_eq!(stats[0].congestion, Some(23.0));
        assert_eq!(stats[0].diff_ratio, Some(-0.15));
        assert_eq!(stats[1].congestion, None);
        assert_eq!(stats[1].date.to_string(), "2021-03-02");
    }
}
