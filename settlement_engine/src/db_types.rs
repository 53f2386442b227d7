//! Data types shared by the settlement engine, its database backends and API clients.
//!
//! Row types (`Order`, `OrderLine`, `CommissionEntry`, ...) derive [`FromRow`] and map one-to-one onto the tables in
//! the SQLite migrations. `New*` types carry the data needed to create a row.
use std::{collections::HashSet, fmt::Display, str::FromStr};

use asp_common::{CommissionRate, Money};
use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

use crate::traits::ValidationError;

#[derive(Debug, Clone, Error)]
#[error("Conversion error: {0}")]
pub struct ConversionError(String);

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Type, Serialize, Deserialize)]
        #[sqlx(transparent)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new<S: Into<String>>(id: S) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// The storefront's identifier for an order
    OrderId
);
string_id!(OrderLineId);
string_id!(ProductId);
string_id!(MerchantId);
string_id!(
    /// A specific sellable inventory record
    StockUnitId
);
string_id!(VariantId);
string_id!(
    /// An authenticated user profile. Affiliates (beneficiaries) and logged-in customers are both profiles.
    ProfileId
);
string_id!(
    /// An anonymous buyer session
    SessionId
);
string_id!(ShopId);
string_id!(TeamId);

//--------------------------------------   PaymentStatus     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum PaymentStatus {
    /// Checkout completed, payment not yet captured
    Pending,
    /// Payment captured. Only paid orders are settled.
    Paid,
    /// Payment capture failed. The order is never settled.
    Failed,
    /// A paid order that has been refunded
    Refunded,
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "Pending"),
            PaymentStatus::Paid => write!(f, "Paid"),
            PaymentStatus::Failed => write!(f, "Failed"),
            PaymentStatus::Refunded => write!(f, "Refunded"),
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Paid" => Ok(Self::Paid),
            "Failed" => Ok(Self::Failed),
            "Refunded" => Ok(Self::Refunded),
            s => Err(ConversionError(format!("Invalid payment status: {s}"))),
        }
    }
}

//--------------------------------------       Order         ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_id: OrderId,
    pub shop_id: ShopId,
    /// The beneficiary of commissions and points for this order, if any
    pub affiliate_id: Option<ProfileId>,
    pub customer_profile_id: Option<ProfileId>,
    pub buyer_session_id: Option<SessionId>,
    pub payment_status: PaymentStatus,
    /// Always equal to the sum of the order's commission ledger amounts
    pub commission_total: Money,
    pub settled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn is_settled(&self) -> bool {
        self.settled_at.is_some()
    }

    /// The buyer identity used to deduplicate new-customer bonuses. An authenticated profile takes precedence over an
    /// anonymous session.
    pub fn buyer_identity(&self) -> Option<BuyerIdentity> {
        BuyerIdentity::from_parts(self.customer_profile_id.as_ref(), self.buyer_session_id.as_ref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: i64,
    pub line_id: OrderLineId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub stock_unit_id: Option<StockUnitId>,
    pub quantity: i64,
    pub line_total: Money,
    pub commission_override: Option<CommissionRate>,
    /// Lines for digital or untracked goods do not take part in inventory reservation
    pub track_inventory: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderLine {
    pub line_id: OrderLineId,
    pub product_id: ProductId,
    #[serde(default)]
    pub stock_unit_id: Option<StockUnitId>,
    pub quantity: i64,
    pub line_total: Money,
    #[serde(default)]
    pub commission_override: Option<CommissionRate>,
    #[serde(default = "default_true")]
    pub track_inventory: bool,
}

fn default_true() -> bool {
    true
}

impl NewOrderLine {
    pub fn new<L: Into<OrderLineId>, P: Into<ProductId>>(line_id: L, product_id: P, quantity: i64, total: Money) -> Self {
        Self {
            line_id: line_id.into(),
            product_id: product_id.into(),
            stock_unit_id: None,
            quantity,
            line_total: total,
            commission_override: None,
            track_inventory: true,
        }
    }

    pub fn with_stock_unit<S: Into<StockUnitId>>(mut self, unit: S) -> Self {
        self.stock_unit_id = Some(unit.into());
        self
    }

    pub fn with_commission_override(mut self, rate: CommissionRate) -> Self {
        self.commission_override = Some(rate);
        self
    }

    pub fn untracked(mut self) -> Self {
        self.track_inventory = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub order_id: OrderId,
    pub shop_id: ShopId,
    #[serde(default)]
    pub affiliate_id: Option<ProfileId>,
    #[serde(default)]
    pub customer_profile_id: Option<ProfileId>,
    #[serde(default)]
    pub buyer_session_id: Option<SessionId>,
    pub lines: Vec<NewOrderLine>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl NewOrder {
    pub fn new<O: Into<OrderId>, S: Into<ShopId>>(order_id: O, shop_id: S) -> Self {
        Self {
            order_id: order_id.into(),
            shop_id: shop_id.into(),
            affiliate_id: None,
            customer_profile_id: None,
            buyer_session_id: None,
            lines: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_affiliate<P: Into<ProfileId>>(mut self, affiliate: P) -> Self {
        self.affiliate_id = Some(affiliate.into());
        self
    }

    pub fn with_customer<P: Into<ProfileId>>(mut self, customer: P) -> Self {
        self.customer_profile_id = Some(customer.into());
        self
    }

    pub fn with_session<S: Into<SessionId>>(mut self, session: S) -> Self {
        self.buyer_session_id = Some(session.into());
        self
    }

    pub fn with_line(mut self, line: NewOrderLine) -> Self {
        self.lines.push(line);
        self
    }

    /// Checks that the order is well-formed before it is written: it has at least one line, line ids are unique,
    /// quantities are positive and line totals are not negative.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.lines.is_empty() {
            return Err(ValidationError::EmptyOrder(self.order_id.clone()));
        }
        let mut seen = HashSet::with_capacity(self.lines.len());
        for line in &self.lines {
            if !seen.insert(&line.line_id) {
                return Err(ValidationError::DuplicateLine(line.line_id.clone()));
            }
            if line.quantity <= 0 {
                return Err(ValidationError::NonPositiveQuantity { line_id: line.line_id.clone(), quantity: line.quantity });
            }
            if line.line_total < Money::ZERO {
                return Err(ValidationError::NegativeLineTotal(line.line_id.clone()));
            }
        }
        Ok(())
    }
}

//--------------------------------------   Catalog context   ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Merchant {
    pub merchant_id: MerchantId,
    pub default_commission_rate: Option<CommissionRate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Product {
    pub product_id: ProductId,
    pub merchant_id: Option<MerchantId>,
    pub commission_rate: Option<CommissionRate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The read-only catalog data the rate resolver needs for a single order line.
///
/// Missing products or merchants simply leave the corresponding rate empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromRow)]
pub struct CatalogContext {
    pub product_rate: Option<CommissionRate>,
    pub merchant_default_rate: Option<CommissionRate>,
}

impl CatalogContext {
    pub fn new(product_rate: Option<CommissionRate>, merchant_default_rate: Option<CommissionRate>) -> Self {
        Self { product_rate, merchant_default_rate }
    }
}

//--------------------------------------  CommissionStatus   ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum CommissionStatus {
    /// Written at settlement, awaiting confirmation
    Pending,
    Confirmed,
    /// Paid out to the affiliate. Terminal.
    Paid,
    /// Voided, usually by a refund. Terminal.
    Cancelled,
}

impl CommissionStatus {
    /// Commission statuses only move forward: `Pending -> Confirmed -> Paid`, and anything not yet paid can be
    /// cancelled.
    pub fn can_transition_to(&self, next: CommissionStatus) -> bool {
        use CommissionStatus::*;
        matches!((self, next), (Pending, Confirmed) | (Pending, Cancelled) | (Confirmed, Paid) | (Confirmed, Cancelled))
    }
}

impl Display for CommissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommissionStatus::Pending => write!(f, "Pending"),
            CommissionStatus::Confirmed => write!(f, "Confirmed"),
            CommissionStatus::Paid => write!(f, "Paid"),
            CommissionStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl FromStr for CommissionStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Confirmed" => Ok(Self::Confirmed),
            "Paid" => Ok(Self::Paid),
            "Cancelled" => Ok(Self::Cancelled),
            s => Err(ConversionError(format!("Invalid commission status: {s}"))),
        }
    }
}

/// One commission ledger row. There is exactly one per order line, keyed by `order_line_id`.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct CommissionEntry {
    pub id: i64,
    pub order_line_id: OrderLineId,
    pub order_id: OrderId,
    pub affiliate_id: ProfileId,
    pub rate: CommissionRate,
    pub amount: Money,
    pub status: CommissionStatus,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The computed commission for one line, prior to being written to the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCommissionEntry {
    pub order_line_id: OrderLineId,
    pub order_id: OrderId,
    pub affiliate_id: ProfileId,
    pub rate: CommissionRate,
    pub amount: Money,
}

//--------------------------------------     Point events    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
pub enum PointEventType {
    OrderSuccess,
    ItemSold,
    NewCustomerSignup,
}

impl PointEventType {
    fn key_prefix(&self) -> &'static str {
        match self {
            PointEventType::OrderSuccess => "order_success",
            PointEventType::ItemSold => "item_sold",
            PointEventType::NewCustomerSignup => "new_customer_signup",
        }
    }
}

impl Display for PointEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PointEventType::OrderSuccess => write!(f, "OrderSuccess"),
            PointEventType::ItemSold => write!(f, "ItemSold"),
            PointEventType::NewCustomerSignup => write!(f, "NewCustomerSignup"),
        }
    }
}

impl FromStr for PointEventType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OrderSuccess" => Ok(Self::OrderSuccess),
            "ItemSold" => Ok(Self::ItemSold),
            "NewCustomerSignup" => Ok(Self::NewCustomerSignup),
            s => Err(ConversionError(format!("Invalid point event type: {s}"))),
        }
    }
}

/// Who placed an order. Profiles and sessions live in disjoint key spaces, so a profile and a session that happen to
/// share an id are still different buyers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuyerIdentity {
    Profile(ProfileId),
    Session(SessionId),
}

impl BuyerIdentity {
    pub fn from_parts(profile: Option<&ProfileId>, session: Option<&SessionId>) -> Option<Self> {
        match (profile, session) {
            (Some(p), _) => Some(Self::Profile(p.clone())),
            (None, Some(s)) => Some(Self::Session(s.clone())),
            (None, None) => None,
        }
    }
}

impl Display for BuyerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuyerIdentity::Profile(p) => write!(f, "profile:{}", escape_key_part(p.as_str())),
            BuyerIdentity::Session(s) => write!(f, "session:{}", escape_key_part(s.as_str())),
        }
    }
}

/// The natural key of a point event. Its string form is stored in a `UNIQUE` column, so a second grant with the same
/// key is rejected by the ledger itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PointEventKey {
    OrderSuccess { shop_id: ShopId, order_id: OrderId, beneficiary: ProfileId },
    ItemSold { shop_id: ShopId, line_id: OrderLineId, beneficiary: ProfileId },
    NewCustomerSignup { shop_id: ShopId, buyer: BuyerIdentity, beneficiary: ProfileId },
}

impl PointEventKey {
    pub fn event_type(&self) -> PointEventType {
        match self {
            PointEventKey::OrderSuccess { .. } => PointEventType::OrderSuccess,
            PointEventKey::ItemSold { .. } => PointEventType::ItemSold,
            PointEventKey::NewCustomerSignup { .. } => PointEventType::NewCustomerSignup,
        }
    }

    pub fn shop_id(&self) -> &ShopId {
        match self {
            PointEventKey::OrderSuccess { shop_id, .. } |
            PointEventKey::ItemSold { shop_id, .. } |
            PointEventKey::NewCustomerSignup { shop_id, .. } => shop_id,
        }
    }

    pub fn beneficiary(&self) -> &ProfileId {
        match self {
            PointEventKey::OrderSuccess { beneficiary, .. } |
            PointEventKey::ItemSold { beneficiary, .. } |
            PointEventKey::NewCustomerSignup { beneficiary, .. } => beneficiary,
        }
    }

    /// The id of the entity that produced the event: an order, an order line or a buyer
    pub fn source_id(&self) -> String {
        match self {
            PointEventKey::OrderSuccess { order_id, .. } => order_id.to_string(),
            PointEventKey::ItemSold { line_id, .. } => line_id.to_string(),
            PointEventKey::NewCustomerSignup { buyer, .. } => buyer.to_string(),
        }
    }
}

impl Display for PointEventKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (source_kind, source) = match self {
            PointEventKey::OrderSuccess { order_id, .. } => ("order", escape_key_part(order_id.as_str())),
            PointEventKey::ItemSold { line_id, .. } => ("line", escape_key_part(line_id.as_str())),
            PointEventKey::NewCustomerSignup { buyer, .. } => ("buyer", buyer.to_string()),
        };
        write!(
            f,
            "{}|shop:{}|{source_kind}:{source}|beneficiary:{}",
            self.event_type().key_prefix(),
            escape_key_part(self.shop_id().as_str()),
            escape_key_part(self.beneficiary().as_str())
        )
    }
}

fn escape_key_part(s: &str) -> String {
    s.replace('\\', "\\\\").replace('|', "\\|")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPointEvent {
    pub key: PointEventKey,
    pub order_id: OrderId,
    pub points: i64,
}

/// An append-only point ledger row. Never updated after insertion.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct PointEvent {
    pub id: i64,
    pub dedup_key: String,
    pub event_type: PointEventType,
    pub shop_id: ShopId,
    pub source_id: String,
    pub beneficiary_id: ProfileId,
    pub order_id: OrderId,
    pub points: i64,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------      Inventory      ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct StockUnit {
    pub stock_unit_id: StockUnitId,
    pub variant_id: Option<VariantId>,
    pub available: i64,
    pub reserved: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewStockUnit {
    pub stock_unit_id: StockUnitId,
    #[serde(default)]
    pub variant_id: Option<VariantId>,
    pub available: i64,
}

impl NewStockUnit {
    pub fn new<S: Into<StockUnitId>>(stock_unit_id: S, available: i64) -> Self {
        Self { stock_unit_id: stock_unit_id.into(), variant_id: None, available }
    }

    pub fn for_variant<V: Into<VariantId>>(mut self, variant: V) -> Self {
        self.variant_id = Some(variant.into());
        self
    }
}

/// Catalog-facing mirror of the counters of its stock units
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Variant {
    pub variant_id: VariantId,
    pub product_id: Option<ProductId>,
    pub available: i64,
    pub reserved: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum ReservationStatus {
    Active,
    /// Given back to stock by a refund or because no line references the unit any more
    Released,
}

impl Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReservationStatus::Active => write!(f, "Active"),
            ReservationStatus::Released => write!(f, "Released"),
        }
    }
}

/// The consolidated quantity an order holds against one stock unit, keyed by `(order_id, stock_unit_id)`.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Reservation {
    pub id: i64,
    pub order_id: OrderId,
    pub stock_unit_id: StockUnitId,
    pub quantity: i64,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    /// The quantity currently held against the stock unit. Released reservations hold nothing.
    pub fn held_quantity(&self) -> i64 {
        match self.status {
            ReservationStatus::Active => self.quantity,
            ReservationStatus::Released => 0,
        }
    }
}

//--------------------------------------     Leaderboards    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeaderboardScope {
    /// Ranked per beneficiary profile
    Users,
    /// Ranked per team, summing the points of the team's members
    Teams,
}

impl Display for LeaderboardScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LeaderboardScope::Users => write!(f, "users"),
            LeaderboardScope::Teams => write!(f, "teams"),
        }
    }
}

/// A calendar month (UTC)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LeaderboardPeriod {
    year: i32,
    month: u32,
}

impl LeaderboardPeriod {
    pub fn new(year: i32, month: u32) -> Result<Self, ConversionError> {
        if NaiveDate::from_ymd_opt(year, month, 1).is_none() {
            return Err(ConversionError(format!("{year}-{month} is not a valid month")));
        }
        Ok(Self { year, month })
    }

    pub fn containing(ts: DateTime<Utc>) -> Self {
        Self { year: ts.year(), month: ts.month() }
    }

    pub fn current() -> Self {
        Self::containing(Utc::now())
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn next(&self) -> Self {
        match self.month {
            12 => Self { year: self.year + 1, month: 1 },
            m => Self { year: self.year, month: m + 1 },
        }
    }

    /// Start of the month, inclusive
    pub fn start(&self) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(self.year, self.month, 1, 0, 0, 0).single().unwrap_or_default()
    }

    /// Start of the following month, exclusive
    pub fn end(&self) -> DateTime<Utc> {
        self.next().start()
    }
}

impl Display for LeaderboardPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for LeaderboardPeriod {
    type Err = ConversionError;

    /// Parses `YYYY-MM`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s.split_once('-').ok_or_else(|| ConversionError(format!("'{s}' is not YYYY-MM")))?;
        let year = year.parse::<i32>().map_err(|e| ConversionError(format!("Invalid year in '{s}': {e}")))?;
        let month = month.parse::<u32>().map_err(|e| ConversionError(format!("Invalid month in '{s}': {e}")))?;
        Self::new(year, month)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// Competition rank: ties share a rank and the next rank is skipped
    pub rank: i64,
    /// A profile id or team id, depending on the scope
    pub subject_id: String,
    pub points: i64,
}
