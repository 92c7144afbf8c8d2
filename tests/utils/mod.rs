#![allow(dead_code)]
use auction_probe::client::{Actor, Condition, NewListing};
use auction_probe::sandbox::{self, Sandbox, SandboxConfig};
use chrono::{Duration as ChronoDuration, Utc};
use std::time::Duration;
// See https://users.rust-lang.org/t/sharing-code-and-macros-in-tests-directory/3098/7

pub const PASSWORD: &str = "aPassword";

pub fn request_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Sandbox without a background closer; tests close auctions explicitly.
pub fn start_sandbox() -> Sandbox {
    sandbox::spawn(SandboxConfig {
        close_every: None,
        ..SandboxConfig::default()
    })
    .expect("sandbox should start")
}

pub fn start_sandbox_with_closer(period: Duration) -> Sandbox {
    sandbox::spawn(SandboxConfig {
        close_every: Some(period),
        ..SandboxConfig::default()
    })
    .expect("sandbox should start")
}

pub fn actor(sandbox: &Sandbox, name: &str) -> Actor {
    Actor::new(name, sandbox.base_url(), request_timeout()).expect("actor should build")
}

/// Actor that has registered and logged in.
pub fn signed_in(sandbox: &Sandbox, name: &str) -> Actor {
    let mut actor = actor(sandbox, name);
    let username = name.to_lowercase();
    let email = format!("{}@example.com", username);

    let status = actor.register(&username, &email, PASSWORD).unwrap().status;
    assert!(status.is_success(), "{} could not register: {}", name, status);
    let status = actor.authenticate().unwrap().status;
    assert!(status.is_success(), "{} could not log in: {}", name, status);
    actor
}

pub fn listing_closing_in(title: &str, closes_in: ChronoDuration) -> NewListing {
    NewListing {
        title: title.to_string(),
        condition: Condition::New,
        description: format!("{} for sale", title),
        closing_time: Utc::now() + closes_in,
    }
}

pub fn open_listing(title: &str) -> NewListing {
    listing_closing_in(title, ChronoDuration::days(1))
}

pub fn closed_listing(title: &str) -> NewListing {
    listing_closing_in(title, ChronoDuration::seconds(-1))
}

/// Lists an open item for `seller` and returns its auction id.
pub fn list_open_item(seller: &mut Actor, title: &str) -> String {
    let status = seller.create_listing(&open_listing(title)).unwrap().status;
    assert!(status.is_success(), "{} could not list {}: {}", seller.name(), title, status);
    seller.auction_id().expect("auction id").to_string()
}
