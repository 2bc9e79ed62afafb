//! Client for the api.um.warszawa.pl vehicle-location endpoint.

use serde::Deserialize;
use url::Url;

use crate::error::{Error, Result};
use crate::fetch::HttpClient;

const VEHICLES_URL: &str = "https://api.um.warszawa.pl/api/action/busestrams_get/";
const RESOURCE_ID: &str = "f2e5503e927d-4ad3-9500-4ab9e55deb59";

/// One vehicle as reported by the API.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiVehicle {
    #[serde(rename = "Lat")]
    pub lat: f64,
    #[serde(rename = "Lon")]
    pub lon: f64,
    /// `YYYY-MM-DD HH:MM:SS`, Warsaw local.
    #[serde(rename = "Time")]
    pub time: String,
    #[serde(rename = "Lines")]
    pub lines: String,
    #[serde(rename = "Brigade")]
    pub brigade: String,
    #[serde(rename = "VehicleNumber", default)]
    pub vehicle_number: String,
}

/// The response envelope: a non-empty `Error` means the API refused the
/// request even with a 200 status.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "Error", default)]
    error: String,
    #[serde(rename = "Result", default)]
    result: Vec<ApiVehicle>,
}

pub struct VehicleApi<C> {
    pub key: String,
    pub client: C,
}

impl<C: HttpClient> VehicleApi<C> {
    pub fn new(key: String, client: C) -> Self {
        Self { key, client }
    }

    fn build_url(&self, vehicle_type: &str) -> Result<Url> {
        Ok(Url::parse_with_params(
            VEHICLES_URL,
            &[
                ("resource_id", RESOURCE_ID),
                ("apikey", self.key.as_str()),
                ("type", vehicle_type),
            ],
        )?)
    }

    /// Fetches positions of one vehicle type: `"1"` buses, `"2"` trams.
    pub async fn get(&self, vehicle_type: &str) -> Result<Vec<ApiVehicle>> {
        let url = self.build_url(vehicle_type)?;
        let req = reqwest::Request::new(reqwest::Method::GET, url.clone());
        let resp = self.client.execute(req).await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Request {
                // Keep the key out of logs.
                url: url.as_str().replace(&self.key, "xxxxxx"),
                status: status.to_string(),
                code: status.as_u16(),
            });
        }

        let envelope: Envelope = resp.json().await?;
        if !envelope.error.is_empty() {
            return Err(Error::Api(envelope.error));
        }
        Ok(envelope.result)
    }

    /// Fetches trams, then buses, and concatenates the lists.
    pub async fn get_all(&self) -> Result<Vec<ApiVehicle>> {
        let mut all = self.get("2").await?;
        all.extend(self.get("1").await?);
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_error_field_defaults_to_empty() {
        let parsed: Envelope = serde_json::from_str(
            r#"{"Result": [{"Lat": 52.22, "Lon": 21.0, "Time": "2024-05-06 11:45:00",
                "Lines": "503", "Brigade": "1", "VehicleNumber": "1000"}]}"#,
        )
        .unwrap();
        assert!(parsed.error.is_empty());
        assert_eq!(parsed.result.len(), 1);
        assert_eq!(parsed.result[0].lines, "503");
    }

    #[test]
    fn envelope_with_error_and_no_result() {
        let parsed: Envelope =
            serde_json::from_str(r#"{"Error": "Błędny apikey lub jego brak"}"#).unwrap();
        assert_eq!(parsed.error, "Błędny apikey lub jego brak");
        assert!(parsed.result.is_empty());
    }

    #[test]
    fn url_carries_key_and_type() {
        let api = VehicleApi::new("sekret".into(), crate::fetch::BasicClient::new());
        let url = api.build_url("2").unwrap();
        let query: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(query.contains(&("resource_id".into(), RESOURCE_ID.into())));
        assert!(query.contains(&("apikey".into(), "sekret".into())));
        assert!(query.contains(&("type".into(), "2".into())));
    }
}
