use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod alarm;
mod api;
mod auth;
mod balance;
mod bills;
mod config;
mod documents;
mod error;
mod notify;
mod payments;
mod schemas;
mod store;
mod sync;

use crate::alarm::AlarmManager;
use crate::api::AppState;
use crate::config::Config;
use crate::notify::Inbox;
use crate::payments::PaymentSimulator;
use crate::store::{MemoryStore, MongoStore, Store};
use crate::sync::DataContext;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().map_err(|err| {
        error!(error = %err, "invalid configuration");
        std::io::Error::new(std::io::ErrorKind::InvalidInput, err)
    })?;

    let store = match &config.mongodb_uri {
        Some(uri) => {
            info!(database = %config.database, "connecting to MongoDB");
            let store = MongoStore::connect(uri, &config.database)
                .await
                .map_err(|err| std::io::Error::new(std::io::ErrorKind::ConnectionRefused, err))?;
            info!("Connected");
            Store::Mongo(store)
        }
        None => {
            info!("MONGODB_URI not set, using in-memory storage");
            Store::Memory(MemoryStore::new())
        }
    };

    let ctx = DataContext::new(store);
    let inbox = Arc::new(Inbox::default());
    let alarms = Arc::new(AlarmManager::new(ctx.clone(), config.alarm_lead));

    let listener = ctx.spawn_listener(config.sync_interval);
    let collector = inbox.spawn_collector(&ctx);
    let ticker = alarms.spawn(config.alarm_interval);

    let state = web::Data::new(AppState {
        ctx: ctx.clone(),
        alarms,
        payments: PaymentSimulator::new(config.payment_limit),
        inbox,
        secret: config.secret.clone(),
        max_document_bytes: config.max_document_bytes,
    });

    let json_limit = config.max_document_bytes * 2;
    info!(bind = %config.bind, "starting HTTP server");
    let result = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(Cors::permissive())
            .app_data(state.clone())
            .app_data(web::JsonConfig::default().limit(json_limit))
            .configure(api::configure)
    })
    .bind(config.bind.as_str())?
    .run()
    .await;

    listener.abort();
    ticker.abort();
    // Let queued remote writes land before exiting
    ctx.settled().await;
    collector.abort();
    info!("shut down");
    result
}
