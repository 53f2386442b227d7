use std::{env, net::IpAddr};

use asp_common::{
    helpers::{parse_boolean_flag, parse_integer},
    Secret,
};
use log::*;
use settlement_engine::helpers::PointRules;

const DEFAULT_ASP_HOST: &str = "127.0.0.1";
const DEFAULT_ASP_PORT: u16 = 8370;
const DEFAULT_MAX_CONNECTIONS: u32 = 25;
pub const HMAC_HEADER: &str = "X-Settlement-Hmac-Sha256";

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub max_connections: u32,
    /// If true, the X-Forwarded-For header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_x_forwarded_for: bool,
    /// If true, the Forwarded header will be used to determine the client's IP address.
    pub use_forwarded: bool,
    pub webhook: WebhookConfig,
    pub point_rules: PointRules,
}

#[derive(Clone, Debug)]
pub struct WebhookConfig {
    pub hmac_secret: Secret<String>,
    pub hmac_checks: bool,
    /// If supplied, requests against /webhook endpoints will be checked against this list of peer addresses.
    pub whitelist: Option<Vec<IpAddr>>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self { hmac_secret: Secret::default(), hmac_checks: true, whitelist: None }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_ASP_HOST.to_string(),
            port: DEFAULT_ASP_PORT,
            database_url: String::default(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            use_x_forwarded_for: false,
            use_forwarded: false,
            webhook: WebhookConfig::default(),
            point_rules: PointRules::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("ASP_HOST").ok().unwrap_or_else(|| DEFAULT_ASP_HOST.into());
        let port = env::var("ASP_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for ASP_PORT. {e} Using the default, {DEFAULT_ASP_PORT}, instead."
                    );
                    DEFAULT_ASP_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_ASP_PORT);
        let database_url = env::var("ASP_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ ASP_DATABASE_URL is not set. Please set it to the URL for the settlement database.");
            String::default()
        });
        let max_connections = parse_integer::<u32>(env::var("ASP_MAX_CONNECTIONS").ok())
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_MAX_CONNECTIONS);
        let use_x_forwarded_for = parse_boolean_flag(env::var("ASP_USE_X_FORWARDED_FOR").ok(), false);
        let use_forwarded = parse_boolean_flag(env::var("ASP_USE_FORWARDED").ok(), false);
        let webhook = WebhookConfig::from_env_or_defaults();
        let point_rules = point_rules_from_env();
        Self { host, port, database_url, max_connections, use_x_forwarded_for, use_forwarded, webhook, point_rules }
    }
}

impl WebhookConfig {
    pub fn from_env_or_defaults() -> Self {
        let hmac_secret = env::var("ASP_HMAC_SECRET").ok().unwrap_or_else(|| {
            error!("🪛️ ASP_HMAC_SECRET is not set. Please set it to the key the payment layer signs webhooks with.");
            String::default()
        });
        let hmac_secret = Secret::new(hmac_secret);
        let hmac_checks = parse_boolean_flag(env::var("ASP_HMAC_CHECKS").ok(), true);
        if !hmac_checks {
            warn!("🚨️ Webhook HMAC checks are disabled. Anyone who can reach the server can settle orders.");
        }
        let whitelist = env::var("ASP_WEBHOOK_IP_WHITELIST").ok().and_then(|s| parse_whitelist(&s));
        match &whitelist {
            Some(whitelist) if whitelist.is_empty() => {
                warn!(
                    "🚨️ The webhook IP whitelist was configured, but is empty. The server will run, but won't \
                     authorise any incoming webhooks."
                );
            },
            None => {
                info!("🪛️ No webhook IP whitelist is set. Only HMAC validation will be used.");
            },
            Some(v) => {
                let addrs = v.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(", ");
                info!("🪛️ Webhook IP whitelist: {addrs}");
            },
        }
        Self { hmac_secret, hmac_checks, whitelist }
    }
}

/// Parses a comma-separated whitelist. "none", "false" and "0" disable the whitelist; invalid entries are skipped.
pub fn parse_whitelist(s: &str) -> Option<Vec<IpAddr>> {
    if ["none", "false", "0"].contains(&s.trim().to_lowercase().as_str()) {
        info!(
            "🪛️ Webhook IP whitelist is disabled. If this is not what you want, set ASP_WEBHOOK_IP_WHITELIST to a \
             comma-separated list of IP addresses to enable it."
        );
        return None;
    }
    let ip_addrs = s
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| {
            s.parse()
                .map_err(|e| {
                    warn!("🪛️ Ignoring invalid IP address ({s}) in ASP_WEBHOOK_IP_WHITELIST: {e}");
                })
                .ok()
        })
        .collect::<Vec<IpAddr>>();
    Some(ip_addrs)
}

fn point_rules_from_env() -> PointRules {
    let defaults = PointRules::default();
    let read = |name: &str, default: i64| {
        let value = env::var(name).ok();
        match parse_integer::<i64>(value.clone()) {
            Some(v) if v >= 0 => v,
            _ => {
                if let Some(v) = value {
                    warn!("🪛️ Invalid configuration value for {name}: {v}. Using the default value of {default}.");
                }
                default
            },
        }
    };
    let rules = PointRules {
        order_success: read("ASP_POINTS_ORDER_SUCCESS", defaults.order_success),
        item_sold: read("ASP_POINTS_ITEM_SOLD", defaults.item_sold),
        new_customer: read("ASP_POINTS_NEW_CUSTOMER", defaults.new_customer),
    };
    info!(
        "🪛️ Point rules: {} per order, {} per item, {} per new customer",
        rules.order_success, rules.item_sold, rules.new_customer
    );
    rules
}
