//! Request handler definitions
//!
//! Define each route and its handler here. Handlers that are more than a line or two go into a separate function.
//!
//! Every handler is async. Settlement work runs on the database pool, so a slow settlement never blocks the worker
//! thread for other requests.
use std::str::FromStr;

use actix_web::{get, web, HttpResponse, Responder};
use log::*;
use settlement_engine::{
    db_types::{LeaderboardPeriod, NewOrder, OrderId, ProfileId},
    settlement_objects::OrderPaid,
    traits::{LedgerQueries, SettlementDatabase},
    LedgerApi,
    SettlementApi,
};

use crate::{
    data_objects::{Leaderboard, LeaderboardParams, OrderCommissions, OrderNotification, PointHistory},
    errors::ServerError,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Orders  ----------------------------------------------------
route!(submit_order => Post "/orders" impl SettlementDatabase);
/// Route handler for order ingestion
///
/// Checkout posts the order with its lines here before it is paid. Posting the same order id again is harmless: the
/// stored order is returned with a `200 OK` instead of `201 Created`.
pub async fn submit_order<B: SettlementDatabase>(
    body: web::Json<NewOrder>,
    api: web::Data<SettlementApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order = body.into_inner();
    debug!("💻️ POST new order {} for shop {}", order.order_id, order.shop_id);
    let (order, created) = api.submit_order(order).await?;
    if created {
        Ok(HttpResponse::Created().json(order))
    } else {
        Ok(HttpResponse::Ok().json(order))
    }
}

route!(order_commissions => Get "/orders/{order_id}/commissions" impl LedgerQueries);
/// Route handler for the commission ledger of an order
pub async fn order_commissions<B: LedgerQueries>(
    path: web::Path<OrderId>,
    api: web::Data<LedgerApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    debug!("💻️ GET commissions for order {order_id}");
    let commission_total = api
        .commission_total(&order_id)
        .await?
        .ok_or_else(|| ServerError::NoRecordFound(format!("Order {order_id} does not exist")))?;
    let entries = api.commissions_for_order(&order_id).await?;
    Ok(HttpResponse::Ok().json(OrderCommissions { order_id, commission_total, entries }))
}

//----------------------------------------------   Webhooks  ----------------------------------------------------
route!(order_paid => Post "/order_paid" impl SettlementDatabase);
/// Route handler for the "order paid" webhook
///
/// Settles the order and returns the [`settlement_engine::settlement_objects::SettlementOutcome`]. Replays of the same
/// event return `200 OK` with `newly_settled: false`. Failures leave nothing behind and return a non-2xx status, so
/// the payment layer retries the webhook later.
pub async fn order_paid<B: SettlementDatabase>(
    body: web::Json<OrderPaid>,
    api: web::Data<SettlementApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let event = body.into_inner();
    info!("💻️ Order paid webhook for order {}", event.order_id);
    let outcome = api.order_paid(event).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

route!(order_refunded => Post "/order_refunded" impl SettlementDatabase);
pub async fn order_refunded<B: SettlementDatabase>(
    body: web::Json<OrderNotification>,
    api: web::Data<SettlementApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let OrderNotification { order_id } = body.into_inner();
    info!("💻️ Order refunded webhook for order {order_id}");
    let outcome = api.order_refunded(&order_id).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

route!(payment_failed => Post "/payment_failed" impl SettlementDatabase);
pub async fn payment_failed<B: SettlementDatabase>(
    body: web::Json<OrderNotification>,
    api: web::Data<SettlementApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let OrderNotification { order_id } = body.into_inner();
    info!("💻️ Payment failed webhook for order {order_id}");
    let order = api.payment_failed(&order_id).await?;
    Ok(HttpResponse::Ok().json(order))
}

//----------------------------------------------   Points  ----------------------------------------------------
route!(points => Get "/points/{beneficiary}" impl LedgerQueries);
/// Route handler for the point history of a profile. The balance is the sum of all its point events.
pub async fn points<B: LedgerQueries>(
    path: web::Path<ProfileId>,
    api: web::Data<LedgerApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let beneficiary = path.into_inner();
    debug!("💻️ GET points for {beneficiary}");
    let events = api.point_events_for_beneficiary(&beneficiary).await?;
    let balance = events.iter().fold(0i64, |total, e| total.saturating_add(e.points));
    Ok(HttpResponse::Ok().json(PointHistory { beneficiary, balance, events }))
}

//----------------------------------------------   Leaderboards  ----------------------------------------------------
route!(user_leaderboard => Get "/leaderboard/users" impl LedgerQueries);
/// Route handler for the monthly user leaderboard
///
/// Query parameters (all optional):
/// * `period` - the month, as `YYYY-MM`. Defaults to the current month.
/// * `shop_id` - restrict the board to one shop.
/// * `limit` - the number of entries to return. Must be at least 1.
pub async fn user_leaderboard<B: LedgerQueries>(
    query: web::Query<LeaderboardParams>,
    api: web::Data<LedgerApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let params = query.into_inner();
    let period = parse_period(params.period.as_deref())?;
    debug!("💻️ GET user leaderboard for {period}");
    let entries = api.user_leaderboard(period, params.shop_id, params.limit).await?;
    Ok(HttpResponse::Ok().json(Leaderboard { period, entries }))
}

route!(team_leaderboard => Get "/leaderboard/teams" impl LedgerQueries);
/// Route handler for the monthly team leaderboard. Takes the same query parameters as the user leaderboard.
pub async fn team_leaderboard<B: LedgerQueries>(
    query: web::Query<LeaderboardParams>,
    api: web::Data<LedgerApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let params = query.into_inner();
    let period = parse_period(params.period.as_deref())?;
    debug!("💻️ GET team leaderboard for {period}");
    let entries = api.team_leaderboard(period, params.shop_id, params.limit).await?;
    Ok(HttpResponse::Ok().json(Leaderboard { period, entries }))
}

fn parse_period(period: Option<&str>) -> Result<LeaderboardPeriod, ServerError> {
    match period {
        Some(s) => LeaderboardPeriod::from_str(s).map_err(|e| ServerError::InvalidQuery(e.to_string())),
        None => Ok(LeaderboardPeriod::current()),
    }
}
