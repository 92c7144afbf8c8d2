use std::time::Duration;

use auction_probe::client::{Auction, AuctionStatus, Credentials, Item, ListingCreated, NewListing};
use auction_probe::poll::{ManualClock, PollSettings, SystemClock};
use auction_probe::ClientError;
use chrono::Duration as ChronoDuration;
use reqwest::StatusCode;
use serde_json::Value;

#[path = "utils/mod.rs"]
mod utils;
use utils::*;

#[test]
fn ping_reads_plain_text_liveness() {
    let sandbox = start_sandbox();
    let mut olga = actor(&sandbox, "Olga");

    let response = olga.ping().unwrap();

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, Value::String("Server is running!".to_string()));
    assert_eq!(olga.last_response().unwrap().status, StatusCode::OK);
}

#[test]
fn register_then_authenticate_stores_identity_and_token() {
    let sandbox = start_sandbox();
    let mut nick = actor(&sandbox, "Nick");

    let response = nick.register("nick", "nick@example.com", PASSWORD).unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert!(nick.user_id().is_some());
    assert!(nick.token().is_none());

    let response = nick.authenticate().unwrap();
    assert_eq!(response.status, StatusCode::OK);
    let token = response.body["auth-token"].as_str().unwrap().to_string();
    assert_eq!(nick.token(), Some(token.as_str()));
}

#[test]
fn duplicate_registration_is_rejected() {
    let sandbox = start_sandbox();
    signed_in(&sandbox, "Olga");
    let mut impostor = actor(&sandbox, "Impostor");

    let status = impostor
        .register("olga", "someone-else@example.com", PASSWORD)
        .unwrap()
        .status;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(impostor.user_id(), None);
    assert!(impostor.credentials().is_none());
}

#[test]
fn authenticate_requires_registration() {
    let sandbox = start_sandbox();
    let mut mary = actor(&sandbox, "Mary");

    let err = mary.authenticate().unwrap_err();

    assert!(matches!(err, ClientError::NotRegistered { ref actor } if actor == "Mary"));
    assert!(mary.last_response().is_none());
}

#[test]
fn wrong_password_is_unauthorized_and_leaves_no_token() {
    let sandbox = start_sandbox();
    signed_in(&sandbox, "Olga");
    let mut guesser = actor(&sandbox, "Guesser");
    guesser.use_credentials(Credentials {
        username: "olga".to_string(),
        email: "olga@example.com".to_string(),
        password: "not the password".to_string(),
    });

    let status = guesser.authenticate().unwrap().status;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(guesser.token(), None);
}

#[test]
fn authenticated_operations_need_a_token() {
    let sandbox = start_sandbox();
    let mut mary = actor(&sandbox, "Mary");
    mary.register("mary", "mary@example.com", PASSWORD).unwrap();

    let err = mary.list_listings().unwrap_err();
    assert!(matches!(err, ClientError::NotAuthenticated { .. }));
    let err = mary.create_listing(&open_listing("Bike")).unwrap_err();
    assert!(matches!(err, ClientError::NotAuthenticated { .. }));
}

#[test]
fn listing_without_token_is_unauthorized_whatever_the_payload() {
    let sandbox = start_sandbox();
    let mut olga = signed_in(&sandbox, "Olga");
    let invalid = NewListing {
        title: String::new(),
        description: String::new(),
        ..open_listing("ignored")
    };

    for listing in [open_listing("Lamp"), invalid] {
        let status = olga.create_listing_without_token(&listing).unwrap().status;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
    assert_eq!(olga.item_id(), None);
    assert_eq!(olga.auction_id(), None);

    let items: Vec<Item> = olga.list_listings().unwrap().json().unwrap();
    assert!(items.is_empty());
}

#[test]
fn create_listing_returns_item_and_open_auction() {
    let sandbox = start_sandbox();
    let mut olga = signed_in(&sandbox, "Olga");

    let created: ListingCreated = olga.create_listing(&open_listing("Lamp")).unwrap().json().unwrap();

    assert_eq!(olga.item_id(), Some(created.item.id.as_str()));
    assert_eq!(olga.auction_id(), Some(created.auction.id.as_str()));
    assert_eq!(created.item.user_id, olga.user_id().unwrap());
    assert_eq!(created.auction.item_id, created.item.id);
    assert_eq!(created.auction.auction_status, AuctionStatus::Open);
    assert_eq!(created.auction.winner_id.as_deref(), olga.user_id());
    assert_eq!(created.auction.winner_amount, 0.0);
}

#[test]
fn unknown_ids_are_not_found() {
    let sandbox = start_sandbox();
    let mut nick = signed_in(&sandbox, "Nick");

    assert_eq!(nick.get_listing("no-such-item").unwrap().status, StatusCode::NOT_FOUND);
    assert_eq!(nick.get_auction("no-such-auction").unwrap().status, StatusCode::NOT_FOUND);
    assert_eq!(nick.place_bid("no-such-auction", 10.0).unwrap().status, StatusCode::NOT_FOUND);
}

#[test]
fn owner_cannot_bid_at_any_amount() {
    let sandbox = start_sandbox();
    let mut mary = signed_in(&sandbox, "Mary");
    let auction_id = list_open_item(&mut mary, "Chair");

    for amount in [0.0, 1.0, 30.0, 100_000_000.0] {
        let response = mary.place_bid(&auction_id, amount).unwrap();
        assert_eq!(response.status, StatusCode::BAD_REQUEST, "amount {}", amount);
        assert!(response.message().unwrap().contains("cannot bid"));
    }
    assert_eq!(mary.bid_id(), None);

    let auction: Auction = mary.get_auction(&auction_id).unwrap().json().unwrap();
    assert_eq!(auction.bids.len(), 1);
}

#[test]
fn higher_bid_takes_the_lead_and_tie_keeps_it() {
    let sandbox = start_sandbox();
    let mut mary = signed_in(&sandbox, "Mary");
    let mut nick = signed_in(&sandbox, "Nick");
    let mut olga = signed_in(&sandbox, "Olga");
    let auction_id = list_open_item(&mut mary, "Chair");

    let auction: Auction = nick.place_bid(&auction_id, 10.0).unwrap().json().unwrap();
    assert_eq!(auction.winner_id.as_deref(), nick.user_id());
    assert_eq!(auction.winner_amount, 10.0);

    let auction: Auction = olga.place_bid(&auction_id, 10.0).unwrap().json().unwrap();
    assert_eq!(auction.winner_id.as_deref(), nick.user_id());
    assert_eq!(auction.winner_amount, 10.0);
    assert_eq!(olga.bid_id(), Some(auction.bids.last().unwrap().id.as_str()));

    let auction: Auction = olga.place_bid(&auction_id, 11.0).unwrap().json().unwrap();
    assert_eq!(auction.winner_id.as_deref(), olga.user_id());
    assert_eq!(auction.winner_amount, 11.0);
    let amounts: Vec<f64> = auction.bids.iter().map(|bid| bid.amount).collect();
    assert_eq!(amounts, vec![0.0, 10.0, 10.0, 11.0]);
}

#[test]
fn out_of_range_bid_is_rejected() {
    let sandbox = start_sandbox();
    let mut mary = signed_in(&sandbox, "Mary");
    let mut nick = signed_in(&sandbox, "Nick");
    let auction_id = list_open_item(&mut mary, "Chair");

    for amount in [-1.0, 100_000_000.5] {
        let status = nick.place_bid(&auction_id, amount).unwrap().status;
        assert_eq!(status, StatusCode::BAD_REQUEST, "amount {}", amount);
    }
    assert_eq!(nick.bid_id(), None);
}

#[test]
fn bid_after_closing_time_is_rejected() {
    let sandbox = start_sandbox();
    let mut mary = signed_in(&sandbox, "Mary");
    let mut nick = signed_in(&sandbox, "Nick");
    mary.create_listing(&closed_listing("Vase")).unwrap();
    let auction_id = mary.auction_id().unwrap().to_string();

    let response = nick.place_bid(&auction_id, 5.0).unwrap();

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.message().unwrap().contains("completed"));
}

#[test]
fn completed_list_holds_only_closed_auctions() {
    let sandbox = start_sandbox();
    let mut olga = signed_in(&sandbox, "Olga");
    let mut nick = signed_in(&sandbox, "Nick");
    let mut mary = signed_in(&sandbox, "Mary");
    list_open_item(&mut olga, "Lamp");
    list_open_item(&mut nick, "Bike");
    mary.create_listing(&closed_listing("Vase")).unwrap();
    let closing = mary.auction_id().unwrap().to_string();

    let completed: Vec<Auction> = olga.list_completed_auctions().unwrap().json().unwrap();
    assert!(completed.is_empty());

    assert_eq!(sandbox.close_overdue_now(), vec![closing.clone()]);

    let completed: Vec<Auction> = olga.list_completed_auctions().unwrap().json().unwrap();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].id, closing);
    assert_eq!(completed[0].auction_status, AuctionStatus::Completed);

    let open: Vec<Auction> = olga.list_auctions(Some(AuctionStatus::Open)).unwrap().json().unwrap();
    assert_eq!(open.len(), 2);
    let all: Vec<Auction> = olga.list_auctions(None).unwrap().json().unwrap();
    assert_eq!(all.len(), 3);
}

#[test]
fn wait_for_auction_status_sees_the_closer() {
    let sandbox = start_sandbox_with_closer(Duration::from_millis(50));
    let mut mary = signed_in(&sandbox, "Mary");
    let mut nick = signed_in(&sandbox, "Nick");
    mary.create_listing(&listing_closing_in("Clock", ChronoDuration::milliseconds(300)))
        .unwrap();
    let auction_id = mary.auction_id().unwrap().to_string();
    let settings = PollSettings::new(Duration::from_millis(50), Duration::from_secs(10));

    let polled = nick
        .wait_for_auction_status(&auction_id, AuctionStatus::Completed, &SystemClock, settings)
        .unwrap();

    assert!(polled.satisfied);
    let auction: Auction = polled.value.json().unwrap();
    assert_eq!(auction.auction_status, AuctionStatus::Completed);
    assert_eq!(auction.winner_id.as_deref(), mary.user_id());
}

#[test]
fn wait_for_auction_status_gives_up_on_an_open_auction() {
    let sandbox = start_sandbox();
    let mut mary = signed_in(&sandbox, "Mary");
    let auction_id = list_open_item(&mut mary, "Lamp");
    let clock = ManualClock::new();
    let settings = PollSettings::new(Duration::from_secs(5), Duration::from_secs(20));

    let polled = mary
        .wait_for_auction_status(&auction_id, AuctionStatus::Completed, &clock, settings)
        .unwrap();

    assert!(!polled.satisfied);
    assert_eq!(polled.attempts, 5);
    assert_eq!(polled.elapsed, settings.timeout);
    let auction: Auction = polled.value.json().unwrap();
    assert_eq!(auction.auction_status, AuctionStatus::Open);
}

#[test]
fn transport_failure_is_an_error_not_a_response() {
    let mut olga = auction_probe::Actor::new("Olga", "http://127.0.0.1:1", request_timeout()).unwrap();

    let err = olga.ping().unwrap_err();

    assert!(matches!(err, ClientError::Http(_)));
    assert!(olga.last_response().is_none());
}

#[test]
fn failed_operation_leaves_no_stale_response() {
    let sandbox = start_sandbox();
    let mut mary = actor(&sandbox, "Mary");
    mary.register("mary", "mary@example.com", PASSWORD).unwrap();
    assert_eq!(mary.last_response().unwrap().status, StatusCode::OK);

    let err = mary.list_listings().unwrap_err();

    assert!(matches!(err, ClientError::NotAuthenticated { .. }));
    assert!(mary.last_response().is_none());
}

#[test]
fn rejected_bid_replaces_the_previous_response() {
    let sandbox = start_sandbox();
    let mut mary = signed_in(&sandbox, "Mary");
    let auction_id = list_open_item(&mut mary, "Chair");
    assert_eq!(mary.last_response().unwrap().status, StatusCode::OK);

    mary.place_bid(&auction_id, 30.0).unwrap();

    assert_eq!(mary.last_response().unwrap().status, StatusCode::BAD_REQUEST);
}

#[test]
fn fractional_bids_are_compared_exactly() {
    let sandbox = start_sandbox();
    let mut mary = signed_in(&sandbox, "Mary");
    let mut nick = signed_in(&sandbox, "Nick");
    let mut olga = signed_in(&sandbox, "Olga");
    let auction_id = list_open_item(&mut mary, "Chair");

    nick.place_bid(&auction_id, 10.5).unwrap();
    let auction: Auction = olga.place_bid(&auction_id, 10.25).unwrap().json().unwrap();
    assert_eq!(auction.winner_id.as_deref(), nick.user_id());
    assert_eq!(auction.winner_amount, 10.5);

    let auction: Auction = olga.place_bid(&auction_id, 10.75).unwrap().json().unwrap();
    assert_eq!(auction.winner_id.as_deref(), olga.user_id());
    assert_eq!(auction.winner_amount, 10.75);
}
