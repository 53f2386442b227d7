use std::time::Duration;

use actix_web::{
    dev::{Server, Service},
    http::KeepAlive,
    middleware::Logger,
    web,
    App,
    HttpServer,
};
use futures::future::{ok, Either};
use log::*;
use settlement_engine::{
    events::{EventHandlers, EventHooks, EventProducers},
    LedgerApi,
    SettlementApi,
    SqliteDatabase,
};

use crate::{
    config::{ServerConfig, HMAC_HEADER},
    errors::ServerError,
    helpers::get_remote_ip,
    middleware::HmacMiddlewareFactory,
    routes::{
        health,
        OrderCommissionsRoute,
        OrderPaidRoute,
        OrderRefundedRoute,
        PaymentFailedRoute,
        PointsRoute,
        SubmitOrderRoute,
        TeamLeaderboardRoute,
        UserLeaderboardRoute,
    },
};

const EVENT_BUFFER_SIZE: usize = 64;

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, config.max_connections)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.migrate().await.map_err(|e| ServerError::InitializeError(format!("Could not run migrations. {e}")))?;
    let handlers = EventHandlers::new(EVENT_BUFFER_SIZE, logging_hooks());
    let producers = handlers.producers();
    handlers.start_handlers().await;
    let srv = create_server_instance(config, db, producers)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

/// Hooks that write settlement outcomes to the log
pub fn logging_hooks() -> EventHooks {
    let mut hooks = EventHooks::default();
    hooks
        .on_order_settled(|ev| {
            let outcome = ev.outcome;
            if outcome.newly_settled {
                info!(
                    "📬️ Order {} settled. Commission total {}, {} points granted",
                    outcome.order.order_id, outcome.commissions.total, outcome.points.points_granted
                );
            }
            Box::pin(async {})
        })
        .on_settlement_failed(|ev| {
            warn!("📬️ Settlement of order {} failed (retryable: {}). {}", ev.order_id, ev.retryable, ev.reason);
            Box::pin(async {})
        })
        .on_order_refunded(|ev| {
            info!(
                "📬️ Order {} refunded. {} reservations released",
                ev.outcome.order.order_id,
                ev.outcome.released.len()
            );
            Box::pin(async {})
        });
    hooks
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    producers: EventProducers,
) -> Result<Server, ServerError> {
    let srv = HttpServer::new(move || {
        let settlement_api =
            SettlementApi::new(db.clone(), producers.clone()).with_point_rules(config.point_rules);
        let ledger_api = LedgerApi::new(db.clone());
        let app = App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("asp::access_log"))
            .app_data(web::Data::new(settlement_api))
            .app_data(web::Data::new(ledger_api));
        let use_x_forwarded_for = config.use_x_forwarded_for;
        let use_forwarded = config.use_forwarded;
        let whitelist = config.webhook.whitelist.clone();
        let hmac = HmacMiddlewareFactory::new(HMAC_HEADER, config.webhook.hmac_secret.clone(), config.webhook.hmac_checks);
        let webhook_scope = web::scope("/webhook")
            .service(OrderPaidRoute::<SqliteDatabase>::new())
            .service(OrderRefundedRoute::<SqliteDatabase>::new())
            .service(PaymentFailedRoute::<SqliteDatabase>::new())
            .wrap(hmac)
            .wrap_fn(move |req, srv| {
                let peer_ip = get_remote_ip(req.request(), use_x_forwarded_for, use_forwarded);
                let whitelisted = match (peer_ip, &whitelist) {
                    (Some(ip), Some(whitelist)) => {
                        info!("💻️ Webhook call from {ip}");
                        whitelist.contains(&ip)
                    },
                    (_, None) => true,
                    (None, Some(_)) => {
                        warn!("💻️ No IP address found in webhook request, denying access.");
                        false
                    },
                };
                if whitelisted {
                    Either::Left(srv.call(req))
                } else {
                    Either::Right(ok(req.error_response(ServerError::ForbiddenPeer)))
                }
            });
        app.service(health)
            .service(SubmitOrderRoute::<SqliteDatabase>::new())
            .service(OrderCommissionsRoute::<SqliteDatabase>::new())
            .service(PointsRoute::<SqliteDatabase>::new())
            .service(UserLeaderboardRoute::<SqliteDatabase>::new())
            .service(TeamLeaderboardRoute::<SqliteDatabase>::new())
            .service(webhook_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}
