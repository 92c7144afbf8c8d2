use actix_web::http::StatusCode;
use actix_web::{error, web, HttpRequest, HttpResponse, ResponseError, Result};
use chrono::Utc;
use serde::de::DeserializeOwned;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::client::wire::{BidRequest, LoginRequest, NewListing, RegisterRequest, UserId, TOKEN_HEADER};
use super::domain::{handle, Command, CommandSuccess, Errors, Repository};
use super::types::{ApiError, AppState, AuctionQuery, Claims};

pub const LIVENESS_BODY: &str = "Server is running!";

// Initialize application state
pub fn init_app_state() -> AppState {
    Arc::new(Mutex::new(Repository::default()))
}

impl ResponseError for Errors {
    fn status_code(&self) -> StatusCode {
        match self {
            Errors::Unauthorized | Errors::UnknownUser | Errors::WrongPassword => {
                StatusCode::UNAUTHORIZED
            }
            Errors::UnknownItem(_) | Errors::UnknownAuction(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ApiError {
            message: self.to_string(),
        })
    }
}

fn lock(data: &web::Data<AppState>) -> Result<MutexGuard<'_, Repository>> {
    data.lock()
        .map_err(|_| error::ErrorInternalServerError("repository lock poisoned"))
}

// Read the auth-token header and resolve it to the user it was issued to
fn get_auth_user(req: &HttpRequest, repository: &Repository) -> Option<UserId> {
    let token = req.headers().get(TOKEN_HEADER)?.to_str().ok()?;
    let claims = Claims::decode(token)?;
    let session_user = repository.session_user(token)?;

    (*session_user == claims.user_id).then_some(claims.user_id)
}

fn require_user(req: &HttpRequest, data: &web::Data<AppState>) -> Result<UserId> {
    let repository = lock(data)?;
    Ok(get_auth_user(req, &repository).ok_or(Errors::Unauthorized)?)
}

// Bodies of authenticated writes are decoded only after the token is checked
fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, Errors> {
    serde_json::from_slice(body).map_err(|err| Errors::Invalid(err.to_string()))
}

fn execute(command: Command, data: &web::Data<AppState>) -> Result<HttpResponse> {
    let mut repository = lock(data)?;
    let success = handle(command, &mut repository)?;

    let mut response = HttpResponse::Ok();
    if let CommandSuccess::LoggedIn(reply) = &success {
        response.insert_header((TOKEN_HEADER, reply.token.clone()));
    }
    Ok(response.json(success))
}

async fn root() -> HttpResponse {
    HttpResponse::Ok().content_type("text/plain").body(LIVENESS_BODY)
}

async fn register(
    request: web::Json<RegisterRequest>,
    data: web::Data<AppState>,
) -> Result<HttpResponse> {
    let command = Command::Register {
        at: Utc::now(),
        request: request.into_inner(),
    };
    execute(command, &data)
}

async fn login(request: web::Json<LoginRequest>, data: web::Data<AppState>) -> Result<HttpResponse> {
    let command = Command::Login {
        at: Utc::now(),
        request: request.into_inner(),
    };
    execute(command, &data)
}

// Get all items
async fn get_items(req: HttpRequest, data: web::Data<AppState>) -> Result<HttpResponse> {
    require_user(&req, &data)?;
    let repository = lock(&data)?;
    Ok(HttpResponse::Ok().json(repository.items()))
}

// Get item by ID
async fn get_item(
    req: HttpRequest,
    path: web::Path<String>,
    data: web::Data<AppState>,
) -> Result<HttpResponse> {
    require_user(&req, &data)?;
    let item_id = path.into_inner();
    let repository = lock(&data)?;

    match repository.item(&item_id) {
        Some(item) => Ok(HttpResponse::Ok().json(item)),
        None => Err(Errors::UnknownItem(item_id).into()),
    }
}

// Create an item together with its auction
async fn create_item(
    req: HttpRequest,
    body: web::Bytes,
    data: web::Data<AppState>,
) -> Result<HttpResponse> {
    let seller = require_user(&req, &data)?;
    let listing: NewListing = parse_body(&body)?;

    let command = Command::AddListing {
        at: Utc::now(),
        seller,
        listing,
    };
    execute(command, &data)
}

// Get all auctions, optionally filtered by status
async fn get_auctions(
    req: HttpRequest,
    query: web::Query<AuctionQuery>,
    data: web::Data<AppState>,
) -> Result<HttpResponse> {
    require_user(&req, &data)?;
    let repository = lock(&data)?;
    Ok(HttpResponse::Ok().json(repository.auctions(query.status)))
}

// Get auction by ID
async fn get_auction(
    req: HttpRequest,
    path: web::Path<String>,
    data: web::Data<AppState>,
) -> Result<HttpResponse> {
    require_user(&req, &data)?;
    let auction_id = path.into_inner();
    let repository = lock(&data)?;

    match repository.auction(&auction_id) {
        Some(auction) => Ok(HttpResponse::Ok().json(auction)),
        None => Err(Errors::UnknownAuction(auction_id).into()),
    }
}

// Place a bid on an auction
async fn place_bid(
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Bytes,
    data: web::Data<AppState>,
) -> Result<HttpResponse> {
    let bidder = require_user(&req, &data)?;
    let bid: BidRequest = parse_body(&body)?;

    let command = Command::PlaceBid {
        at: Utc::now(),
        bidder,
        auction_id: path.into_inner(),
        amount: bid.amount,
    };
    execute(command, &data)
}

// Configure routes
pub fn configure_app(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("")
            .route("/", web::get().to(root))
            .route("/users/register", web::post().to(register))
            .route("/users/login", web::post().to(login))
            .route("/items", web::get().to(get_items))
            .route("/items", web::post().to(create_item))
            .route("/items/{id}", web::get().to(get_item))
            .route("/auctions", web::get().to(get_auctions))
            .route("/auctions/{id}", web::get().to(get_auction))
            .route("/auctions/{id}/bids", web::post().to(place_bid)),
    );
}
