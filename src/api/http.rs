//! reqwest-backed marketplace client

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, StatusCode, header::HeaderName};
use serde::{Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::{
    api::MarketplaceApi,
    config::AppConfig,
    dto::{
        cart::{
            AddCartItemRequest, AddCartItemResponse, AddItemOutcome, ExtendReservationResponse,
            UpdateCartItemRequest,
        },
        checkout::{CheckoutRequest, CheckoutResponse},
        delivery::{DeliveryCheckRequest, DeliveryTarget},
    },
    error::{AppError, AppResult},
    models::{CartGroup, DeliveryCheckResult, DeliverySlot, LoyaltyAccount, ProductId, SellerId},
    response::{ApiResponse, ErrorBody},
    services::reservation::parse_reserved_at,
};

const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

#[derive(Debug, Clone)]
pub struct HttpMarketplaceApi {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpMarketplaceApi {
    pub fn new(config: &AppConfig) -> AppResult<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.session_token.clone(),
        })
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let request_id = Uuid::new_v4().to_string();
        tracing::debug!(%method, %url, %request_id, "marketplace request");
        let mut request = self
            .client
            .request(method, url)
            .header(REQUEST_ID_HEADER, request_id);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        request
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> AppResult<T> {
        let response = request.send().await.map_err(network_error)?;
        let status = response.status();

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &text));
        }

        let body: ApiResponse<T> = response
            .json()
            .await
            .map_err(|err| AppError::InvalidResponse(err.to_string()))?;
        body.into_data()
    }

    async fn send_empty(&self, request: RequestBuilder) -> AppResult<()> {
        let response = request.send().await.map_err(network_error)?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &text));
        }
        Ok(())
    }

    async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> AppResult<T> {
        self.send(self.request(reqwest::Method::POST, path).json(body))
            .await
    }
}

fn network_error(err: reqwest::Error) -> AppError {
    AppError::Network(err.to_string())
}

/// Maps a non-2xx answer onto the cart error taxonomy.
pub fn classify_failure(status: StatusCode, body: &str) -> AppError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = if parsed.message.is_empty() {
        body.trim().to_string()
    } else {
        parsed.message.clone()
    };
    let mentions_expiry = parsed
        .code
        .as_deref()
        .is_some_and(|code| code.contains("expired"))
        || message.to_lowercase().contains("expired");

    match status {
        StatusCode::UNAUTHORIZED => AppError::Unauthorized,
        StatusCode::NOT_FOUND => AppError::NotFound,
        StatusCode::CONFLICT | StatusCode::GONE if mentions_expiry => AppError::StaleReservation,
        StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
            AppError::StockUnavailable(message)
        }
        StatusCode::BAD_REQUEST => AppError::Rejected(message),
        status if status.is_server_error() => AppError::Network(format!("{status}: {message}")),
        status => AppError::Rejected(format!("{status}: {message}")),
    }
}

#[async_trait]
impl MarketplaceApi for HttpMarketplaceApi {
    async fn fetch_cart(&self) -> AppResult<Vec<CartGroup>> {
        self.send(self.request(reqwest::Method::GET, "/api/cart"))
            .await
    }

    async fn add_cart_item(&self, request: AddCartItemRequest) -> AppResult<AddItemOutcome> {
        let response: AddCartItemResponse = self.post("/api/cart", &request).await?;
        Ok(AddItemOutcome {
            quantity: response.quantity,
            reserved_at: response.reserved_at(),
        })
    }

    async fn update_cart_item(&self, product_id: ProductId, quantity: i32) -> AppResult<()> {
        let request = self
            .request(reqwest::Method::PATCH, &format!("/api/cart/{product_id}"))
            .json(&UpdateCartItemRequest { quantity });
        self.send_empty(request).await
    }

    async fn remove_cart_item(&self, product_id: ProductId) -> AppResult<()> {
        let request = self.request(reqwest::Method::DELETE, &format!("/api/cart/{product_id}"));
        self.send_empty(request).await
    }

    async fn extend_reservation(&self, product_id: ProductId) -> AppResult<DateTime<Utc>> {
        let request = self.request(
            reqwest::Method::POST,
            &format!("/api/cart/{product_id}/extend"),
        );
        let response: ExtendReservationResponse = self.send(request).await?;
        parse_reserved_at(&response.reserved_at).ok_or_else(|| {
            AppError::InvalidResponse(format!("bad reserved_at {:?}", response.reserved_at))
        })
    }

    async fn check_delivery(
        &self,
        seller_id: SellerId,
        target: &DeliveryTarget,
    ) -> AppResult<DeliveryCheckResult> {
        self.post(
            "/api/delivery/check",
            &DeliveryCheckRequest::new(seller_id, target),
        )
        .await
    }

    async fn get_loyalty(&self, seller_id: SellerId) -> AppResult<Option<LoyaltyAccount>> {
        let request = self.request(reqwest::Method::GET, &format!("/api/loyalty/{seller_id}"));
        match self.send(request).await {
            Ok(account) => Ok(Some(account)),
            Err(AppError::NotFound) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn delivery_slots(&self, seller_id: SellerId) -> AppResult<Vec<DeliverySlot>> {
        let request = self.request(
            reqwest::Method::GET,
            &format!("/api/sellers/{seller_id}/delivery-slots"),
        );
        self.send(request).await
    }

    async fn submit_checkout(&self, request: &CheckoutRequest) -> AppResult<CheckoutResponse> {
        self.post("/api/orders/checkout", request).await
    }
}
