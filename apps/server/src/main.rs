#![warn(clippy::all, clippy::pedantic)]

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use actix_web::{App, HttpServer, web};
use nimbus_prober::{Config, Nimbus};
use tokio_util::sync::CancellationToken;
use tracing::info;

mod error;
mod routes;
mod state;

use error::AppError;
use logger::init_tracing;
use state::AppState;

#[actix_web::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Config::from_env()?;
    info!("{}", config);

    let ip: IpAddr = config.server.bind.parse()?;
    let addr = SocketAddr::new(ip, config.server.port);

    let nimbus = Arc::new(Nimbus::open(config, CancellationToken::new()).await?);

    let mut background = Vec::new();
    if nimbus.config.scheduler.enabled {
        background.push(nimbus.scheduler().start(nimbus.lifetime.clone()));
    }
    background.push(nimbus.retention().start_periodic_sweep(nimbus.lifetime.clone()));

    let result = run_server(addr, web::Data::new(AppState::new(nimbus.clone()))).await;

    nimbus.shutdown();
    for task in background {
        let _ = task.await;
    }

    result
}

async fn run_server(addr: SocketAddr, state: web::Data<AppState>) -> Result<(), AppError> {
    info!("Listening on {}", addr);

    HttpServer::new(move || App::new().app_data(state.clone()).configure(routes::routes))
        .bind(addr)?
        .run()
        .await?;

    Ok(())
}
