//! In-memory stand-in for the auction service.
//!
//! Serves the same routes as the real deployment from a single locked
//! repository and closes overdue auctions on a timer, so the suite and its
//! building blocks can be exercised without a database or a cron job.

pub mod app;
pub mod domain;
pub mod types;

use std::io;
use std::net::SocketAddr;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use actix_web::dev::{Server, ServerHandle};
use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};
use chrono::Utc;
use log::{error, info};

use crate::client::wire::AuctionId;
use app::configure_app;
pub use app::init_app_state;
use domain::close_overdue;
use types::AppState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxConfig {
    pub host: String,
    /// 0 picks a free port.
    pub port: u16,
    /// Period of the auction closer; `None` leaves closing to the caller.
    pub close_every: Option<Duration>,
    pub workers: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            close_every: Some(Duration::from_secs(1)),
            workers: 1,
        }
    }
}

fn bind(state: AppState, config: &SandboxConfig, handle_signals: bool) -> io::Result<(Server, SocketAddr)> {
    let data = web::Data::new(state);
    let server = HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .wrap(Logger::default())
            .configure(configure_app)
    })
    .workers(config.workers.max(1));
    let server = if handle_signals { server } else { server.disable_signals() };

    let server = server.bind((config.host.as_str(), config.port))?;
    let addr = server
        .addrs()
        .first()
        .copied()
        .ok_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, "sandbox bound no address"))?;
    Ok((server.run(), addr))
}

fn close_now(state: &AppState) -> Vec<AuctionId> {
    match state.lock() {
        Ok(mut repository) => {
            let closed = close_overdue(&mut repository, Utc::now());
            for auction_id in &closed {
                info!("Closing auction {}", auction_id);
            }
            closed
        }
        Err(_) => {
            error!("Auction closer skipped: repository lock poisoned");
            Vec::new()
        }
    }
}

async fn run_closer(state: AppState, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    loop {
        ticker.tick().await;
        close_now(&state);
    }
}

/// Serve the sandbox on the current actix system until it is stopped.
pub async fn serve(config: SandboxConfig) -> io::Result<()> {
    let state = init_app_state();
    let (server, addr) = bind(state.clone(), &config, true)?;

    info!("Sandbox listening on http://{}", addr);
    if let Some(period) = config.close_every {
        actix_web::rt::spawn(run_closer(state, period));
    }
    server.await
}

/// Running sandbox on a background thread. Dropping it stops the server.
pub struct Sandbox {
    base_url: String,
    state: AppState,
    handle: ServerHandle,
}

impl Sandbox {
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Run one pass of the auction closer immediately.
    pub fn close_overdue_now(&self) -> Vec<AuctionId> {
        close_now(&self.state)
    }
}

impl Drop for Sandbox {
    fn drop(&mut self) {
        // Sends the stop command; completion is not awaited.
        let _ = self.handle.stop(false);
    }
}

/// Start a sandbox on its own thread and wait until it is listening.
pub fn spawn(config: SandboxConfig) -> io::Result<Sandbox> {
    let state = init_app_state();
    let server_state = state.clone();
    let (tx, rx) = mpsc::channel();

    thread::Builder::new()
        .name("auction-sandbox".to_string())
        .spawn(move || {
            actix_web::rt::System::new().block_on(async move {
                match bind(server_state.clone(), &config, false) {
                    Ok((server, addr)) => {
                        if let Some(period) = config.close_every {
                            actix_web::rt::spawn(run_closer(server_state, period));
                        }
                        let _ = tx.send(Ok((addr, server.handle())));
                        if let Err(err) = server.await {
                            error!("Sandbox stopped with an error: {}", err);
                        }
                    }
                    Err(err) => {
                        let _ = tx.send(Err(err));
                    }
                }
            })
        })?;

    let (addr, handle) = rx.recv().map_err(|_| {
        io::Error::new(io::ErrorKind::Other, "sandbox thread exited before binding")
    })??;
    info!("Sandbox listening on http://{}", addr);

    Ok(Sandbox {
        base_url: format!("http://{}", addr),
        state,
        handle,
    })
}
