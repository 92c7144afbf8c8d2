use std::time::Duration;

use log::{debug, info};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::wire::{
    Auction, AuctionStatus, AmountValue, BidRequest, ListingCreated, LoginReply, LoginRequest,
    NewListing, RegisterRequest, UserRecord, TOKEN_HEADER,
};
use crate::error::{ClientError, ClientResult};
use crate::poll::{poll_until, Clock, PollSettings, Polled};

/// Status and decoded body of one exchange with the service.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: StatusCode,
    /// JSON body; plain-text bodies are kept as a JSON string, empty ones as `null`.
    pub body: Value,
}

impl ApiResponse {
    fn read(response: reqwest::blocking::Response) -> ClientResult<Self> {
        let status = response.status();
        let text = response.text()?;
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or_else(|_| Value::String(text))
        };
        Ok(Self { status, body })
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn json<T: DeserializeOwned>(&self) -> ClientResult<T> {
        Ok(T::deserialize(&self.body)?)
    }

    /// Error text sent by the service, either `{"message": ..}` or a bare string.
    pub fn message(&self) -> Option<&str> {
        self.body
            .get("message")
            .and_then(Value::as_str)
            .or_else(|| self.body.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// One named user of the auction service.
pub struct Actor {
    name: String,
    base_url: String,
    http: Client,
    credentials: Option<Credentials>,
    token: Option<String>,
    user_id: Option<String>,
    item_id: Option<String>,
    auction_id: Option<String>,
    bid_id: Option<String>,
    last_response: Option<ApiResponse>,
}

impl Actor {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        request_timeout: Duration,
    ) -> ClientResult<Self> {
        let http = Client::builder().timeout(request_timeout).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Ok(Self {
            name: name.into(),
            base_url,
            http,
            credentials: None,
            token: None,
            user_id: None,
            item_id: None,
            auction_id: None,
            bid_id: None,
            last_response: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn item_id(&self) -> Option<&str> {
        self.item_id.as_deref()
    }

    pub fn auction_id(&self) -> Option<&str> {
        self.auction_id.as_deref()
    }

    pub fn bid_id(&self) -> Option<&str> {
        self.bid_id.as_deref()
    }

    pub fn last_response(&self) -> Option<&ApiResponse> {
        self.last_response.as_ref()
    }

    /// Use credentials of an account that was registered outside this actor.
    pub fn use_credentials(&mut self, credentials: Credentials) {
        self.credentials = Some(credentials);
    }

    /// `GET /`, the unauthenticated liveness route.
    pub fn ping(&mut self) -> ClientResult<&ApiResponse> {
        self.begin();
        let response = self.send(self.http.get(self.url("/")))?;
        self.record(response)
    }

    pub fn register(
        &mut self,
        username: &str,
        email: &str,
        password: &str,
    ) -> ClientResult<&ApiResponse> {
        self.begin();
        let request = RegisterRequest {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        };
        let response = self.send(self.http.post(self.url("/users/register")).json(&request))?;

        self.settle(response, |actor, user: UserRecord| {
            actor.user_id = Some(user.id);
            actor.credentials = Some(Credentials {
                username: request.username,
                email: request.email,
                password: request.password,
            });
        })
    }

    pub fn authenticate(&mut self) -> ClientResult<&ApiResponse> {
        self.begin();
        let credentials = self.credentials.as_ref().ok_or_else(|| ClientError::NotRegistered {
            actor: self.name.clone(),
        })?;
        let request = LoginRequest {
            email: credentials.email.clone(),
            password: credentials.password.clone(),
        };
        let response = self.send(self.http.post(self.url("/users/login")).json(&request))?;

        self.settle(response, |actor, reply: LoginReply| {
            actor.token = Some(reply.token);
        })
    }

    pub fn create_listing(&mut self, listing: &NewListing) -> ClientResult<&ApiResponse> {
        self.post_listing(listing, true)
    }

    /// Same request as [`Actor::create_listing`] with the session token left out.
    pub fn create_listing_without_token(
        &mut self,
        listing: &NewListing,
    ) -> ClientResult<&ApiResponse> {
        self.post_listing(listing, false)
    }

    fn post_listing(&mut self, listing: &NewListing, attach_token: bool) -> ClientResult<&ApiResponse> {
        self.begin();
        let mut request = self.http.post(self.url("/items")).json(listing);
        if attach_token {
            request = request.header(TOKEN_HEADER, self.require_token()?);
        }
        let response = self.send(request)?;

        self.settle(response, |actor, created: ListingCreated| {
            actor.item_id = Some(created.item.id);
            actor.auction_id = Some(created.auction.id);
        })
    }

    pub fn list_listings(&mut self) -> ClientResult<&ApiResponse> {
        self.get_authenticated("/items", None)
    }

    pub fn get_listing(&mut self, item_id: &str) -> ClientResult<&ApiResponse> {
        self.get_authenticated(&format!("/items/{}", item_id), None)
    }

    pub fn get_auction(&mut self, auction_id: &str) -> ClientResult<&ApiResponse> {
        self.get_authenticated(&format!("/auctions/{}", auction_id), None)
    }

    pub fn list_auctions(&mut self, status: Option<AuctionStatus>) -> ClientResult<&ApiResponse> {
        self.get_authenticated("/auctions", status)
    }

    pub fn list_completed_auctions(&mut self) -> ClientResult<&ApiResponse> {
        self.list_auctions(Some(AuctionStatus::Completed))
    }

    pub fn place_bid(&mut self, auction_id: &str, amount: AmountValue) -> ClientResult<&ApiResponse> {
        self.begin();
        let token = self.require_token()?;
        let request = self
            .http
            .post(self.url(&format!("/auctions/{}/bids", auction_id)))
            .header(TOKEN_HEADER, token)
            .json(&BidRequest { amount });
        let response = self.send(request)?;

        self.settle(response, |actor, auction: Auction| {
            actor.bid_id = auction.bids.last().map(|bid| bid.id.clone());
        })
    }

    /// Poll `GET /auctions/{id}` until the auction reports `status`.
    ///
    /// The returned value is the last response seen; when `satisfied` is
    /// false the budget in `settings` ran out first.
    pub fn wait_for_auction_status(
        &mut self,
        auction_id: &str,
        status: AuctionStatus,
        clock: &dyn Clock,
        settings: PollSettings,
    ) -> ClientResult<Polled<ApiResponse>> {
        let polled = poll_until(
            clock,
            settings,
            || self.get_auction(auction_id).map(ApiResponse::clone),
            |response| {
                response.is_success()
                    && response
                        .json::<Auction>()
                        .map(|auction| auction.auction_status == status)
                        .unwrap_or(false)
            },
        )?;

        info!(
            "{}: auction {} {} after {} attempt(s) in {:?}",
            self.name,
            auction_id,
            if polled.satisfied { "reached the expected status" } else { "did not change in time" },
            polled.attempts,
            polled.elapsed
        );
        Ok(polled)
    }

    fn get_authenticated(
        &mut self,
        path: &str,
        status: Option<AuctionStatus>,
    ) -> ClientResult<&ApiResponse> {
        self.begin();
        let token = self.require_token()?;
        let mut request = self.http.get(self.url(path)).header(TOKEN_HEADER, token);
        if let Some(status) = status {
            request = request.query(&[("status", status.to_string())]);
        }
        let response = self.send(request)?;
        self.record(response)
    }

    // A failed operation must not leave an earlier reply behind.
    fn begin(&mut self) {
        self.last_response = None;
    }

    fn require_token(&self) -> ClientResult<&str> {
        self.token.as_deref().ok_or_else(|| ClientError::NotAuthenticated {
            actor: self.name.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn send(&self, request: RequestBuilder) -> ClientResult<ApiResponse> {
        let request = request.build()?;
        debug!("{}: {} {}", self.name, request.method(), request.url());

        let response = ApiResponse::read(self.http.execute(request)?)?;
        debug!("{}: <- {}", self.name, response.status);
        Ok(response)
    }

    fn record(&mut self, response: ApiResponse) -> ClientResult<&ApiResponse> {
        Ok(&*self.last_response.insert(response))
    }

    // Records the response, then hands a decoded success body to `apply`.
    fn settle<T, F>(&mut self, response: ApiResponse, apply: F) -> ClientResult<&ApiResponse>
    where
        T: DeserializeOwned,
        F: FnOnce(&mut Self, T),
    {
        let decoded = response.is_success().then(|| response.json::<T>());
        self.last_response = Some(response);

        if let Some(decoded) = decoded {
            apply(self, decoded?);
        }
        self.last_response.as_ref().ok_or_else(|| ClientError::NoResponse {
            actor: self.name.clone(),
        })
    }
}
