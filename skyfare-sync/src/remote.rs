use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::json;

use skyfare_core::gateway::{GatewayError, GatewayResult, RemoteGateway};
use skyfare_core::models::{Booking, Flight, UserProfile};
use skyfare_store::app_config::GatewayConfig;

/// HTTP implementation of the remote query interface against a
/// PostgREST-style endpoint: one route per table, `eq.`/`in.(..)` filters
/// in the query string, upserts via `Prefer: resolution=merge-duplicates`.
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpGateway {
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}/{}", self.base_url, table));
        if let Some(key) = &self.api_key {
            builder = builder
                .header("apikey", key)
                .bearer_auth(key);
        }
        builder
    }

    async fn send(builder: RequestBuilder) -> GatewayResult<Response> {
        let response = builder
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GatewayError::ErrorResponse {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    async fn fetch<T: DeserializeOwned>(builder: RequestBuilder) -> GatewayResult<T> {
        let response = Self::send(builder).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))
    }
}

#[async_trait]
impl RemoteGateway for HttpGateway {
    async fn fetch_flights(&self) -> GatewayResult<Vec<Flight>> {
        let flights: Vec<Flight> = Self::fetch(
            self.request(Method::GET, "flights").query(&[("select", "*")]),
        )
        .await?;
        for flight in &flights {
            flight
                .validate()
                .map_err(|e| GatewayError::Decode(e.to_string()))?;
        }
        Ok(flights)
    }

    async fn fetch_flights_by_ids(&self, ids: &[String]) -> GatewayResult<Vec<Flight>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let membership = format!("in.({})", ids.join(","));
        Self::fetch(
            self.request(Method::GET, "flights")
                .query(&[("select", "*"), ("id", membership.as_str())]),
        )
        .await
    }

    async fn fetch_user_bookings(&self, user_id: &str) -> GatewayResult<Vec<Booking>> {
        let filter = format!("eq.{user_id}");
        Self::fetch(
            self.request(Method::GET, "bookings")
                .query(&[("select", "*"), ("user_id", filter.as_str())]),
        )
        .await
    }

    async fn fetch_user_profile(&self, user_id: &str) -> GatewayResult<Option<UserProfile>> {
        let filter = format!("eq.{user_id}");
        let mut users: Vec<UserProfile> = Self::fetch(
            self.request(Method::GET, "users")
                .query(&[("select", "*"), ("id", filter.as_str())]),
        )
        .await?;
        Ok(if users.is_empty() {
            None
        } else {
            Some(users.swap_remove(0))
        })
    }

    async fn push_booking(&self, booking: &Booking) -> GatewayResult<()> {
        Self::send(
            self.request(Method::POST, "bookings")
                .header("Prefer", "resolution=merge-duplicates")
                .json(booking),
        )
        .await?;
        Ok(())
    }

    async fn update_flight_seats(
        &self,
        flight_id: &str,
        available_seats: i32,
    ) -> GatewayResult<()> {
        let filter = format!("eq.{flight_id}");
        Self::send(
            self.request(Method::PATCH, "flights")
                .query(&[("id", filter.as_str())])
                .json(&json!({ "available_seats": available_seats })),
        )
        .await?;
        Ok(())
    }

    async fn count_flights(&self) -> GatewayResult<u64> {
        let response = Self::send(
            self.request(Method::HEAD, "flights")
                .header("Prefer", "count=exact"),
        )
        .await?;

        // Count arrives as the total in "Content-Range: 0-24/3573".
        let range = response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| GatewayError::Decode("missing content-range header".to_string()))?;
        range
            .rsplit('/')
            .next()
            .and_then(|total| total.parse::<u64>().ok())
            .ok_or_else(|| GatewayError::Decode(format!("unparseable content-range: {range}")))
    }
}
