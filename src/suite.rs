//! The auction acceptance suite.
//!
//! Three users take part: Olga, Nick and Mary. Everyone registers and logs
//! in, each lists one item, and Nick and Olga bid on Mary's item, which is
//! the only listing set to close during the run. The suite then waits for
//! the service to close that auction and checks the recorded winner.

use std::time::Duration;

use anyhow::{bail, ensure, Context};
use chrono::{DateTime, Utc};
use reqwest::StatusCode;

use crate::client::{Actor, ApiResponse, Auction, AuctionStatus, AmountValue, Condition, Item, NewListing};
use crate::config::RunConfig;
use crate::error::{ClientResult, ScenarioError};
use crate::poll::{Clock, SystemClock};
use crate::scenario::{Report, Scenario, Step};

const PASSWORD: &str = "aPassword";

/// Mary rejects her own bid at any amount; this one is arbitrary.
const SELF_BID: AmountValue = 30.0;

/// Bids on Mary's item as (bidder, amount, expected leader afterwards).
/// The last bid ties the highest one and must leave Nick in front.
const ROUNDS: [(Who, AmountValue, Who); 4] = [
    (Who::Nick, 20.0, Who::Nick),
    (Who::Olga, 25.0, Who::Olga),
    (Who::Nick, 50.0, Who::Nick),
    (Who::Olga, 50.0, Who::Nick),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Who {
    Olga,
    Nick,
    Mary,
}

/// State shared by the suite's steps: the three actors and run settings.
pub struct AuctionWorld {
    pub olga: Actor,
    pub nick: Actor,
    pub mary: Actor,
    config: RunConfig,
    clock: Box<dyn Clock>,
}

impl AuctionWorld {
    pub fn new(config: RunConfig) -> ClientResult<Self> {
        Self::with_clock(config, Box::new(SystemClock))
    }

    pub fn with_clock(config: RunConfig, clock: Box<dyn Clock>) -> ClientResult<Self> {
        let actor = |name: &str| Actor::new(name, config.base_url.as_str(), config.request_timeout);

        Ok(Self {
            olga: actor("Olga")?,
            nick: actor("Nick")?,
            mary: actor("Mary")?,
            config,
            clock,
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn actor(&self, who: Who) -> &Actor {
        match who {
            Who::Olga => &self.olga,
            Who::Nick => &self.nick,
            Who::Mary => &self.mary,
        }
    }

    pub fn actor_mut(&mut self, who: Who) -> &mut Actor {
        match who {
            Who::Olga => &mut self.olga,
            Who::Nick => &mut self.nick,
            Who::Mary => &mut self.mary,
        }
    }
}

/// The suite's steps with their dependency chain.
pub fn scenario() -> Result<Scenario<AuctionWorld>, ScenarioError> {
    Scenario::builder()
        .step(Step::new("TC0", "The service answers the liveness probe", service_is_up))
        .step(Step::new("TC1", "Olga, Nick and Mary register", register_everyone).after("TC0"))
        .step(Step::new("TC2", "Olga, Nick and Mary log in and receive tokens", authenticate_everyone).after("TC1"))
        .step(
            Step::new("TC3", "Olga cannot list an item without a token", listing_requires_token)
                .after("TC1"),
        )
        .step(Step::new("TC4", "Olga lists an item", olga_lists_item).after("TC2"))
        .step(Step::new("TC5", "Nick lists an item", nick_lists_item).after("TC4"))
        .step(Step::new("TC6", "Mary lists an item that closes soon", mary_lists_item).after("TC5"))
        .step(Step::new("TC7", "Nick and Olga browse three items", browse_items).after("TC6"))
        .step(Step::new("TC8", "Nick and Olga read Mary's item", read_marys_item).after("TC6"))
        .step(Step::new("TC9", "Mary cannot bid on her own item", owner_cannot_bid).after("TC6"))
        .step(Step::new("TC10", "Nick and Olga bid on Mary's item in turn", bid_in_turn).after("TC6"))
        .step(Step::new("TC11", "Nick wins Mary's item once the auction closes", winner_after_close).after("TC10"))
        .step(Step::new("TC12", "Olga browses the sold items", browse_sold_items).after("TC11"))
        .step(Step::new("TC13", "Mary reads the bid history of her sold item", read_bid_history).after("TC11"))
        .build()
}

/// Run the suite against `config.base_url`.
pub fn run(config: RunConfig) -> anyhow::Result<Report> {
    let mut world = AuctionWorld::new(config).context("building actors")?;
    let scenario = scenario()?;
    Ok(scenario.run(&mut world))
}

fn service_is_up(world: &mut AuctionWorld) -> anyhow::Result<()> {
    let response = world.olga.ping()?;
    expect_status(response, StatusCode::OK, "liveness probe")
}

fn register_everyone(world: &mut AuctionWorld) -> anyhow::Result<()> {
    for who in [Who::Olga, Who::Nick, Who::Mary] {
        let actor = world.actor_mut(who);
        let username = actor.name().to_lowercase();
        let email = format!("{}@example.com", username);
        let label = format!("{} registers", actor.name());

        let response = actor.register(&username, &email, PASSWORD)?;
        expect_status(response, StatusCode::OK, &label)?;
        ensure!(actor.user_id().is_some(), "{}: no user id returned", label);
    }
    Ok(())
}

fn authenticate_everyone(world: &mut AuctionWorld) -> anyhow::Result<()> {
    for who in [Who::Olga, Who::Nick, Who::Mary] {
        let actor = world.actor_mut(who);
        let label = format!("{} logs in", actor.name());

        let response = actor.authenticate()?;
        expect_status(response, StatusCode::OK, &label)?;
        ensure!(actor.token().is_some(), "{}: no token returned", label);
    }
    Ok(())
}

fn listing_requires_token(world: &mut AuctionWorld) -> anyhow::Result<()> {
    let listing = new_listing("Olga's unlisted lamp", world.config.open_listing_lifetime)?;
    let response = world.olga.create_listing_without_token(&listing)?;
    expect_status(response, StatusCode::UNAUTHORIZED, "listing without a token")
}

fn olga_lists_item(world: &mut AuctionWorld) -> anyhow::Result<()> {
    let lifetime = world.config.open_listing_lifetime;
    list_item(&mut world.olga, "Olga's armchair", lifetime)
}

fn nick_lists_item(world: &mut AuctionWorld) -> anyhow::Result<()> {
    let lifetime = world.config.open_listing_lifetime;
    list_item(&mut world.nick, "Nick's road bike", lifetime)
}

fn mary_lists_item(world: &mut AuctionWorld) -> anyhow::Result<()> {
    let lifetime = world.config.closing_offset;
    list_item(&mut world.mary, "Mary's record player", lifetime)
}

fn browse_items(world: &mut AuctionWorld) -> anyhow::Result<()> {
    let marys_item = listed_item(&world.mary)?;

    for who in [Who::Nick, Who::Olga] {
        let actor = world.actor_mut(who);
        let label = format!("{} browses items", actor.name());

        let response = actor.list_listings()?;
        expect_status(response, StatusCode::OK, &label)?;
        let items: Vec<Item> = response.json()?;
        ensure!(items.len() == 3, "{}: expected 3 items, got {}", label, items.len());
        ensure!(
            items.iter().any(|item| item.id == marys_item),
            "{}: Mary's item {} is missing",
            label,
            marys_item
        );
    }
    Ok(())
}

fn read_marys_item(world: &mut AuctionWorld) -> anyhow::Result<()> {
    let marys_item = listed_item(&world.mary)?;
    let marys_auction = listed_auction(&world.mary)?;
    let mary = user_id(&world.mary)?;

    for who in [Who::Nick, Who::Olga] {
        let actor = world.actor_mut(who);
        let label = format!("{} reads Mary's item", actor.name());

        let response = actor.get_listing(&marys_item)?;
        expect_status(response, StatusCode::OK, &label)?;
        let item: Item = response.json()?;
        ensure!(item.id == marys_item, "{}: got item {}", label, item.id);
        ensure!(item.user_id == mary, "{}: item belongs to {}", label, item.user_id);

        let response = actor.get_auction(&marys_auction)?;
        expect_status(response, StatusCode::OK, &label)?;
        let auction: Auction = response.json()?;
        ensure!(auction.item_id == marys_item, "{}: auction is for item {}", label, auction.item_id);
        ensure!(
            auction.auction_status == AuctionStatus::Open,
            "{}: auction is already {}",
            label,
            auction.auction_status
        );
    }
    Ok(())
}

fn owner_cannot_bid(world: &mut AuctionWorld) -> anyhow::Result<()> {
    let marys_auction = listed_auction(&world.mary)?;

    let response = world.mary.place_bid(&marys_auction, SELF_BID)?;
    expect_status(response, StatusCode::BAD_REQUEST, "Mary bids on her own item")?;
    ensure!(world.mary.bid_id().is_none(), "Mary's rejected bid was recorded");
    Ok(())
}

fn bid_in_turn(world: &mut AuctionWorld) -> anyhow::Result<()> {
    let marys_auction = listed_auction(&world.mary)?;
    let mut highest: AmountValue = 0.0;

    for (bidder, amount, leader) in ROUNDS {
        let leader_id = user_id(world.actor(leader))?;
        let leader_name = world.actor(leader).name().to_string();
        highest = highest.max(amount);

        let actor = world.actor_mut(bidder);
        let label = format!("{} bids {}", actor.name(), amount);
        let response = actor.place_bid(&marys_auction, amount)?;
        expect_status(response, StatusCode::OK, &label)?;

        let auction: Auction = response.json()?;
        ensure!(
            auction.winner_id.as_deref() == Some(leader_id.as_str()),
            "{}: expected {} to lead, winner is {:?}",
            label,
            leader_name,
            auction.winner_id
        );
        ensure!(
            auction.winner_amount == highest,
            "{}: expected winning amount {}, got {}",
            label,
            highest,
            auction.winner_amount
        );
    }
    Ok(())
}

fn winner_after_close(world: &mut AuctionWorld) -> anyhow::Result<()> {
    let marys_auction = listed_auction(&world.mary)?;
    let nick = user_id(&world.nick)?;
    let settings = world.config.poll;

    let polled = world.nick.wait_for_auction_status(
        &marys_auction,
        AuctionStatus::Completed,
        world.clock.as_ref(),
        settings,
    )?;
    expect_status(&polled.value, StatusCode::OK, "reading Mary's auction")?;

    let auction: Auction = polled.value.json()?;
    ensure!(
        polled.satisfied,
        "auction still {} after {} attempt(s) over {:?}",
        auction.auction_status,
        polled.attempts,
        polled.elapsed
    );
    ensure!(
        auction.winner_id.as_deref() == Some(nick.as_str()),
        "expected Nick ({}) to win, winner is {:?}",
        nick,
        auction.winner_id
    );
    ensure!(auction.winner_amount == 50.0, "expected a winning amount of 50, got {}", auction.winner_amount);
    ensure!(
        auction.bids.len() == ROUNDS.len() + 1,
        "expected the opening bid and {} accepted bids, got {} bids",
        ROUNDS.len(),
        auction.bids.len()
    );
    Ok(())
}

fn browse_sold_items(world: &mut AuctionWorld) -> anyhow::Result<()> {
    let marys_auction = listed_auction(&world.mary)?;

    let response = world.olga.list_completed_auctions()?;
    expect_status(response, StatusCode::OK, "Olga lists completed auctions")?;
    let auctions: Vec<Auction> = response.json()?;

    match auctions.as_slice() {
        [sold] if sold.id == marys_auction => Ok(()),
        [other] => bail!("expected Mary's auction {}, got {}", marys_auction, other.id),
        _ => bail!("expected exactly one completed auction, got {}", auctions.len()),
    }
}

fn read_bid_history(world: &mut AuctionWorld) -> anyhow::Result<()> {
    let marys_auction = listed_auction(&world.mary)?;
    let olgas_last_bid = world.olga.bid_id().context("Olga has no recorded bid")?.to_string();
    let mut expected_bidders = vec![user_id(&world.mary)?];
    for (bidder, _, _) in ROUNDS {
        expected_bidders.push(user_id(world.actor(bidder))?);
    }

    let response = world.mary.get_auction(&marys_auction)?;
    expect_status(response, StatusCode::OK, "Mary reads her auction")?;
    let auction: Auction = response.json()?;

    let amounts: Vec<AmountValue> = auction.bids.iter().map(|bid| bid.amount).collect();
    let mut expected_amounts = vec![0.0];
    expected_amounts.extend(ROUNDS.iter().map(|(_, amount, _)| *amount));
    ensure!(amounts == expected_amounts, "expected bids {:?}, got {:?}", expected_amounts, amounts);

    let bidders: Vec<&str> = auction.bids.iter().map(|bid| bid.user_id.as_str()).collect();
    ensure!(bidders == expected_bidders, "expected bidders {:?}, got {:?}", expected_bidders, bidders);

    let last = auction.bids.last().map(|bid| bid.id.as_str());
    ensure!(
        last == Some(olgas_last_bid.as_str()),
        "expected Olga's bid {} last, got {:?}",
        olgas_last_bid,
        last
    );
    Ok(())
}

fn list_item(actor: &mut Actor, title: &str, lifetime: Duration) -> anyhow::Result<()> {
    let label = format!("{} lists {:?}", actor.name(), title);
    let listing = new_listing(title, lifetime)?;

    let response = actor.create_listing(&listing)?;
    expect_status(response, StatusCode::OK, &label)?;
    ensure!(
        actor.item_id().is_some() && actor.auction_id().is_some(),
        "{}: item or auction id missing",
        label
    );
    Ok(())
}

fn new_listing(title: &str, lifetime: Duration) -> anyhow::Result<NewListing> {
    Ok(NewListing {
        title: title.to_string(),
        condition: Condition::Used,
        description: format!("{} in good working order", title),
        closing_time: closing_time(lifetime)?,
    })
}

fn closing_time(lifetime: Duration) -> anyhow::Result<DateTime<Utc>> {
    Ok(Utc::now() + chrono::Duration::from_std(lifetime)?)
}

fn expect_status(response: &ApiResponse, expected: StatusCode, what: &str) -> anyhow::Result<()> {
    ensure!(
        response.status == expected,
        "{}: expected {}, got {}{}",
        what,
        expected,
        response.status,
        response.message().map(|m| format!(" ({})", m)).unwrap_or_default()
    );
    Ok(())
}

fn user_id(actor: &Actor) -> anyhow::Result<String> {
    actor
        .user_id()
        .map(str::to_string)
        .with_context(|| format!("{} has no user id", actor.name()))
}

fn listed_item(actor: &Actor) -> anyhow::Result<String> {
    actor
        .item_id()
        .map(str::to_string)
        .with_context(|| format!("{} has no listed item", actor.name()))
}

fn listed_auction(actor: &Actor) -> anyhow::Result<String> {
    actor
        .auction_id()
        .map(str::to_string)
        .with_context(|| format!("{} has no auction", actor.name()))
}
