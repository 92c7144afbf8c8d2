// src/sandbox/domain.rs
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::client::wire::{
    AmountValue, Auction, AuctionId, AuctionStatus, Bid, Item, ItemId, ListingCreated, LoginReply,
    LoginRequest, NewListing, RegisterRequest, UserId, UserRecord,
};
use super::types::Claims;

pub const MAX_BID: AmountValue = 100_000_000.0;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Errors {
    #[error("{0}")]
    Invalid(String),

    #[error("Access denied")]
    Unauthorized,

    #[error("Username is already taken: {0}")]
    UsernameTaken(String),

    #[error("Email is already registered: {0}")]
    EmailTaken(String),

    #[error("User does not exist")]
    UnknownUser,

    #[error("Password is wrong")]
    WrongPassword,

    #[error("Unknown item: {0}")]
    UnknownItem(ItemId),

    #[error("Unknown auction: {0}")]
    UnknownAuction(AuctionId),

    #[error("Auction is completed. No further bids accepted: {0}")]
    AuctionHasEnded(AuctionId),

    #[error("User cannot bid for their own item: {0:?}")]
    SellerCannotPlaceBids((UserId, AuctionId)),
}

#[derive(Debug, Clone)]
struct StoredUser {
    record: UserRecord,
    password: String,
}

/// Everything the sandbox knows, in insertion order.
#[derive(Debug, Default)]
pub struct Repository {
    users: Vec<StoredUser>,
    sessions: HashMap<String, UserId>,
    items: Vec<Item>,
    auctions: Vec<Auction>,
}

impl Repository {
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn item(&self, item_id: &str) -> Option<&Item> {
        self.items.iter().find(|item| item.id == item_id)
    }

    pub fn auctions(&self, status: Option<AuctionStatus>) -> Vec<&Auction> {
        self.auctions
            .iter()
            .filter(|auction| status.map_or(true, |status| auction.auction_status == status))
            .collect()
    }

    pub fn auction(&self, auction_id: &str) -> Option<&Auction> {
        self.auctions.iter().find(|auction| auction.id == auction_id)
    }

    /// User a session token was issued to.
    pub fn session_user(&self, token: &str) -> Option<&UserId> {
        self.sessions.get(token)
    }

    fn auction_mut(&mut self, auction_id: &str) -> Option<&mut Auction> {
        self.auctions.iter_mut().find(|auction| auction.id == auction_id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Register {
        at: DateTime<Utc>,
        request: RegisterRequest,
    },
    Login {
        at: DateTime<Utc>,
        request: LoginRequest,
    },
    AddListing {
        at: DateTime<Utc>,
        seller: UserId,
        listing: NewListing,
    },
    PlaceBid {
        at: DateTime<Utc>,
        bidder: UserId,
        auction_id: AuctionId,
        amount: AmountValue,
    },
}

/// Serialized as the bare inner value, which is the route's response body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CommandSuccess {
    Registered(UserRecord),
    LoggedIn(LoginReply),
    ListingAdded(ListingCreated),
    BidAccepted(Auction),
}

pub fn handle(command: Command, repository: &mut Repository) -> Result<CommandSuccess, Errors> {
    match command {
        Command::Register { at, request } => {
            validate_registration(&request)?;
            let email = request.email.to_lowercase();

            if repository.users.iter().any(|user| user.record.username == request.username) {
                return Err(Errors::UsernameTaken(request.username));
            }
            if repository.users.iter().any(|user| user.record.email == email) {
                return Err(Errors::EmailTaken(email));
            }

            let record = UserRecord {
                id: new_id(),
                username: request.username,
                email,
                created_at: Some(at),
            };
            repository.users.push(StoredUser {
                record: record.clone(),
                password: request.password,
            });
            Ok(CommandSuccess::Registered(record))
        }

        Command::Login { at, request } => {
            let email = request.email.to_lowercase();
            let user = repository
                .users
                .iter()
                .find(|user| user.record.email == email)
                .ok_or(Errors::UnknownUser)?;
            if user.password != request.password {
                return Err(Errors::WrongPassword);
            }

            let user_id = user.record.id.clone();
            let token = Claims::new(user_id.clone(), at).encode();
            repository.sessions.insert(token.clone(), user_id);
            Ok(CommandSuccess::LoggedIn(LoginReply { token }))
        }

        Command::AddListing { at, seller, listing } => {
            validate_listing(&listing)?;
            let item_id = new_id();
            let auction_id = new_id();

            let item = Item {
                id: item_id.clone(),
                title: listing.title,
                condition: listing.condition,
                description: listing.description,
                user_id: seller.clone(),
                auction_id: Some(auction_id.clone()),
                created_at: Some(at),
            };
            // The seller holds the opening zero bid, so an auction nobody
            // bids on is won by its owner.
            let auction = Auction {
                id: auction_id,
                item_id,
                auction_status: AuctionStatus::Open,
                closing_time: listing.closing_time,
                winner_id: Some(seller.clone()),
                winner_amount: 0.0,
                bids: vec![Bid {
                    id: new_id(),
                    user_id: seller,
                    amount: 0.0,
                    created_at: Some(at),
                }],
            };

            repository.items.push(item.clone());
            repository.auctions.push(auction.clone());
            Ok(CommandSuccess::ListingAdded(ListingCreated { item, auction }))
        }

        Command::PlaceBid { at, bidder, auction_id, amount } => {
            validate_amount(amount)?;
            let auction = repository
                .auction(&auction_id)
                .ok_or_else(|| Errors::UnknownAuction(auction_id.clone()))?;
            let seller = repository
                .item(&auction.item_id)
                .map(|item| item.user_id.clone())
                .ok_or_else(|| Errors::UnknownItem(auction.item_id.clone()))?;
            validate_bid(&bidder, &seller, auction, at)?;

            let auction = repository
                .auction_mut(&auction_id)
                .ok_or_else(|| Errors::UnknownAuction(auction_id.clone()))?;
            auction.bids.push(Bid {
                id: new_id(),
                user_id: bidder.clone(),
                amount,
                created_at: Some(at),
            });
            // Ties keep the earlier bidder in front.
            if amount > auction.winner_amount {
                auction.winner_amount = amount;
                auction.winner_id = Some(bidder);
            }
            Ok(CommandSuccess::BidAccepted(auction.clone()))
        }
    }
}

pub fn validate_bid(
    bidder: &UserId,
    seller: &UserId,
    auction: &Auction,
    at: DateTime<Utc>,
) -> Result<(), Errors> {
    if auction.auction_status == AuctionStatus::Completed || auction.closing_time <= at {
        return Err(Errors::AuctionHasEnded(auction.id.clone()));
    }
    if bidder == seller {
        return Err(Errors::SellerCannotPlaceBids((bidder.clone(), auction.id.clone())));
    }
    Ok(())
}

/// Mark every open auction whose closing time has passed as completed.
pub fn close_overdue(repository: &mut Repository, now: DateTime<Utc>) -> Vec<AuctionId> {
    repository
        .auctions
        .iter_mut()
        .filter(|auction| auction.auction_status == AuctionStatus::Open && auction.closing_time <= now)
        .map(|auction| {
            auction.auction_status = AuctionStatus::Completed;
            auction.id.clone()
        })
        .collect()
}

fn validate_registration(request: &RegisterRequest) -> Result<(), Errors> {
    check_length("username", &request.username, 3, 256)?;
    check_length("email", &request.email, 3, 256)?;
    check_length("password", &request.password, 8, 1024)?;
    if !request.email.contains('@') {
        return Err(Errors::Invalid(format!("\"email\" must be a valid email: {}", request.email)));
    }
    Ok(())
}

fn validate_listing(listing: &NewListing) -> Result<(), Errors> {
    check_length("title", &listing.title, 1, 256)?;
    check_length("description", &listing.description, 1, 32768)
}

fn validate_amount(amount: AmountValue) -> Result<(), Errors> {
    if !(0.0..=MAX_BID).contains(&amount) {
        return Err(Errors::Invalid(format!(
            "\"amount\" must be between 0 and {}, got {}",
            MAX_BID, amount
        )));
    }
    Ok(())
}

fn check_length(field: &str, value: &str, min: usize, max: usize) -> Result<(), Errors> {
    let length = value.chars().count();
    if length < min || length > max {
        return Err(Errors::Invalid(format!(
            "\"{}\" length must be between {} and {} characters",
            field, min, max
        )));
    }
    Ok(())
}

fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}
