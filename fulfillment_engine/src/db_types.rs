use std::{
    collections::BTreeMap,
    fmt::Display,
    str::FromStr,
};

use chrono::{DateTime, Utc};
use log::*;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid value: {0}")]
pub struct ConversionError(String);

/// Stores a serde value as a JSON-encoded TEXT column.
#[cfg(feature = "sqlite")]
macro_rules! json_text_column {
    ($t:ty) => {
        impl sqlx::Type<sqlx::Sqlite> for $t {
            fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
                <String as sqlx::Type<sqlx::Sqlite>>::type_info()
            }

            fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
                <String as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for $t {
            fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
                let text = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
                Ok(serde_json::from_str(text)?)
            }
        }

        impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for $t {
            fn encode_by_ref(&self, buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>) -> sqlx::encode::IsNull {
                let text = serde_json::to_string(self).unwrap_or_default();
                <String as sqlx::Encode<sqlx::Sqlite>>::encode(text, buf)
            }
        }
    };
}

//--------------------------------------        OrderNo        ---------------------------------------------------------
/// The human-readable order number. Unique across all orders.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Type)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct OrderNo(pub String);

impl FromStr for OrderNo {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderNo {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrderNo {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for OrderNo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl OrderNo {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The idempotency key for ledger movements made on behalf of one line of this order.
    pub fn line_token(&self, line_index: i64) -> String {
        format!("{}#{line_index}", self.0)
    }
}

//--------------------------------------      Attributes       ---------------------------------------------------------
/// A set of attribute key/value pairs, e.g. `{color: red, size: L}`. Keys are always kept in sorted order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(BTreeMap<String, String>);

#[cfg(feature = "sqlite")]
json_text_column!(Attributes);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.0.insert(key.to_string(), value.to_string());
        self
    }

    pub fn insert<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True if every key/value pair in `partial` appears identically in `self`.
    pub fn is_superset_of(&self, partial: &Attributes) -> bool {
        partial.iter().all(|(k, v)| self.0.get(k) == Some(v))
    }

    /// Returns a copy of these attributes without any of the given keys.
    pub fn without_keys<S: AsRef<str>>(&self, keys: &[S]) -> Self {
        let map = self.0.iter().filter(|(k, _)| !keys.iter().any(|s| s.as_ref() == k.as_str()));
        Self(map.map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    /// Returns a copy of these attributes, overlaid with the values in `other`.
    pub fn merged_with(&self, other: &Attributes) -> Self {
        let mut result = self.clone();
        other.iter().for_each(|(k, v)| result.insert(k.clone(), v.clone()));
        result
    }

    pub fn into_inner(self) -> BTreeMap<String, String> {
        self.0
    }
}

impl From<BTreeMap<String, String>> for Attributes {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Attributes {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl Display for Attributes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pairs = self.0.iter().map(|(k, v)| format!("{k}:{v}")).collect::<Vec<String>>().join(", ");
        write!(f, "{{{pairs}}}")
    }
}

//--------------------------------------    AttributesHash     ---------------------------------------------------------
/// The content hash of a normalized attribute set. See [`crate::helpers::attributes_hash`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct AttributesHash(pub String);

impl Display for AttributesHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AttributesHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------   OrderStatusType     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatusType {
    /// Paid for, but the shipping details still need to be supplied.
    Draft,
    /// The order has been created and stock is reserved. Waiting for the payment to be confirmed.
    PendingPayment,
    /// Paid for and waiting to be shipped.
    Pending,
    /// An admin has asked the customer to resubmit the order details.
    NeedResubmit,
    Shipped,
    Completed,
    Cancelled,
    Refunded,
}

impl OrderStatusType {
    /// Statuses from which an order can still be cancelled and have its reservations released.
    pub fn is_pre_shipment(&self) -> bool {
        matches!(self, Self::Draft | Self::PendingPayment | Self::Pending | Self::NeedResubmit)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Refunded)
    }
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatusType::Draft => write!(f, "draft"),
            OrderStatusType::PendingPayment => write!(f, "pending_payment"),
            OrderStatusType::Pending => write!(f, "pending"),
            OrderStatusType::NeedResubmit => write!(f, "need_resubmit"),
            OrderStatusType::Shipped => write!(f, "shipped"),
            OrderStatusType::Completed => write!(f, "completed"),
            OrderStatusType::Cancelled => write!(f, "cancelled"),
            OrderStatusType::Refunded => write!(f, "refunded"),
        }
    }
}

impl FromStr for OrderStatusType {
    type Err = ConversionError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "pending_payment" => Ok(Self::PendingPayment),
            "pending" => Ok(Self::Pending),
            "need_resubmit" => Ok(Self::NeedResubmit),
            "shipped" => Ok(Self::Shipped),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            "refunded" => Ok(Self::Refunded),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

impl From<String> for OrderStatusType {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid order status: {value}. But this conversion cannot fail. Defaulting to pending_payment");
            OrderStatusType::PendingPayment
        })
    }
}

//--------------------------------------      ProductType      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProductType {
    Physical,
    Virtual,
}

impl ProductType {
    pub fn pool_kind(&self) -> PoolKind {
        match self {
            ProductType::Physical => PoolKind::Physical,
            ProductType::Virtual => PoolKind::Virtual,
        }
    }
}

impl Display for ProductType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProductType::Physical => write!(f, "physical"),
            ProductType::Virtual => write!(f, "virtual"),
        }
    }
}

//--------------------------------------        PoolKind       ---------------------------------------------------------
/// Physical pools hold fungible counters. Virtual pools hold discrete, single-use items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PoolKind {
    Physical,
    Virtual,
}

impl Display for PoolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolKind::Physical => write!(f, "physical"),
            PoolKind::Virtual => write!(f, "virtual"),
        }
    }
}

//--------------------------------------     InventoryMode     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum InventoryMode {
    /// The customer picks the attribute combination.
    #[default]
    Fixed,
    /// The system picks a bound pool at random.
    Random,
}

//--------------------------------------     AttributeMode     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeMode {
    UserSelect,
    BlindBox,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDef {
    pub name: String,
    pub mode: AttributeMode,
    #[serde(default)]
    pub options: Vec<String>,
}

impl AttributeDef {
    pub fn user_select(name: &str) -> Self {
        Self { name: name.to_string(), mode: AttributeMode::UserSelect, options: vec![] }
    }

    pub fn blind_box(name: &str) -> Self {
        Self { name: name.to_string(), mode: AttributeMode::BlindBox, options: vec![] }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeDefs(pub Vec<AttributeDef>);

#[cfg(feature = "sqlite")]
json_text_column!(AttributeDefs);

impl AttributeDefs {
    pub fn names_with_mode(&self, mode: AttributeMode) -> Vec<&str> {
        self.0.iter().filter(|d| d.mode == mode).map(|d| d.name.as_str()).collect()
    }
}

//--------------------------------------      CatalogItem      ---------------------------------------------------------
/// The subset of a catalog item that the allocation engine needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct CatalogItem {
    pub id: i64,
    pub sku: String,
    pub name: String,
    pub product_type: ProductType,
    pub inventory_mode: InventoryMode,
    pub attribute_defs: AttributeDefs,
    pub auto_delivery: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CatalogItem {
    pub fn user_select_attributes(&self) -> Vec<&str> {
        self.attribute_defs.names_with_mode(AttributeMode::UserSelect)
    }

    pub fn blind_box_attributes(&self) -> Vec<&str> {
        self.attribute_defs.names_with_mode(AttributeMode::BlindBox)
    }

    pub fn has_blind_box(&self) -> bool {
        !self.blind_box_attributes().is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCatalogItem {
    pub sku: String,
    pub name: String,
    pub product_type: ProductType,
    #[serde(default)]
    pub inventory_mode: InventoryMode,
    #[serde(default)]
    pub attribute_defs: AttributeDefs,
    #[serde(default)]
    pub auto_delivery: bool,
}

impl NewCatalogItem {
    pub fn new(sku: &str, name: &str, product_type: ProductType) -> Self {
        Self {
            sku: sku.to_string(),
            name: name.to_string(),
            product_type,
            inventory_mode: InventoryMode::Fixed,
            attribute_defs: AttributeDefs::default(),
            auto_delivery: false,
        }
    }

    pub fn with_attribute(mut self, def: AttributeDef) -> Self {
        self.attribute_defs.0.push(def);
        self
    }

    pub fn with_inventory_mode(mut self, mode: InventoryMode) -> Self {
        self.inventory_mode = mode;
        self
    }

    pub fn with_auto_delivery(mut self, auto_delivery: bool) -> Self {
        self.auto_delivery = auto_delivery;
        self
    }
}

//--------------------------------------       StockPool       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct StockPool {
    pub id: i64,
    pub name: String,
    pub sku: Option<String>,
    pub attributes: Attributes,
    /// Total physical stock on hand.
    pub stock: i64,
    /// The purchasable ceiling. May be less than `stock`.
    pub available_quantity: i64,
    pub sold_quantity: i64,
    pub reserved_quantity: i64,
    pub safety_stock: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StockCheckError {
    #[error("Stock pool {0} is not active")]
    Inactive(i64),
    #[error("Stock pool {0} is sold out")]
    SoldOut(i64),
    #[error("Insufficient stock in pool {pool_id}. Requested {requested}, but only {available} are available")]
    Insufficient { pool_id: i64, requested: i64, available: i64 },
}

impl StockPool {
    /// Units not yet sold or reserved, ignoring the purchasable ceiling.
    pub fn remaining_stock(&self) -> i64 {
        self.stock - self.sold_quantity - self.reserved_quantity
    }

    /// Units that can still be sold, i.e. `max(0, available_quantity - sold - reserved)`.
    pub fn available_stock(&self) -> i64 {
        (self.available_quantity - self.sold_quantity - self.reserved_quantity).max(0)
    }

    pub fn can_purchase(&self, quantity: i64) -> Result<(), StockCheckError> {
        if !self.is_active {
            return Err(StockCheckError::Inactive(self.id));
        }
        let available = self.available_stock();
        if available <= 0 {
            return Err(StockCheckError::SoldOut(self.id));
        }
        if quantity > available {
            return Err(StockCheckError::Insufficient { pool_id: self.id, requested: quantity, available });
        }
        let remaining = self.remaining_stock();
        if quantity > remaining {
            return Err(StockCheckError::Insufficient { pool_id: self.id, requested: quantity, available: remaining });
        }
        Ok(())
    }

    pub fn is_low_stock(&self) -> bool {
        self.remaining_stock() <= self.safety_stock
    }

    pub fn is_deletable(&self) -> bool {
        self.sold_quantity == 0 && self.reserved_quantity == 0
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewStockPool {
    pub name: String,
    pub sku: Option<String>,
    #[serde(default)]
    pub attributes: Attributes,
    pub stock: i64,
    /// Defaults to `stock` when omitted.
    pub available_quantity: Option<i64>,
    #[serde(default)]
    pub safety_stock: i64,
}

impl NewStockPool {
    pub fn new(name: &str, stock: i64) -> Self {
        Self { name: name.to_string(), stock, ..Default::default() }
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_available_quantity(mut self, available: i64) -> Self {
        self.available_quantity = Some(available);
        self
    }

    pub fn with_safety_stock(mut self, safety_stock: i64) -> Self {
        self.safety_stock = safety_stock;
        self
    }
}

//--------------------------------------    InventoryLogType   ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum InventoryLogType {
    Reserve,
    Deduct,
    Release,
    Adjust,
}

impl Display for InventoryLogType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InventoryLogType::Reserve => write!(f, "reserve"),
            InventoryLogType::Deduct => write!(f, "deduct"),
            InventoryLogType::Release => write!(f, "release"),
            InventoryLogType::Adjust => write!(f, "adjust"),
        }
    }
}

//--------------------------------------      InventoryLog     ---------------------------------------------------------
/// An audit entry for a single movement on a stock pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct InventoryLog {
    pub id: i64,
    pub pool_id: i64,
    pub kind: InventoryLogType,
    pub quantity: i64,
    pub stock_before: i64,
    pub stock_after: i64,
    pub available_before: i64,
    pub available_after: i64,
    pub reserved_before: i64,
    pub reserved_after: i64,
    pub sold_before: i64,
    pub sold_after: i64,
    pub correlation_id: Option<String>,
    pub operator: Option<String>,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------       Binding         ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Binding {
    pub id: i64,
    pub catalog_item_id: i64,
    pub pool_kind: PoolKind,
    pub pool_id: i64,
    pub attributes: Attributes,
    pub attributes_hash: AttributesHash,
    pub is_random: bool,
    /// The weight of this binding in a random draw.
    pub priority: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBinding {
    pub catalog_item_id: i64,
    pub pool_kind: PoolKind,
    pub pool_id: i64,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default)]
    pub is_random: bool,
    #[serde(default = "default_priority")]
    pub priority: i64,
}

fn default_priority() -> i64 {
    1
}

impl NewBinding {
    pub fn new(catalog_item_id: i64, pool_kind: PoolKind, pool_id: i64, attributes: Attributes) -> Self {
        Self { catalog_item_id, pool_kind, pool_id, attributes, is_random: false, priority: default_priority() }
    }

    pub fn random(mut self, priority: i64) -> Self {
        self.is_random = true;
        self.priority = priority;
        self
    }
}

//--------------------------------------      VirtualPool      ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct VirtualPool {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct VirtualPoolStats {
    pub total: i64,
    pub available: i64,
    pub reserved: i64,
    pub sold: i64,
    pub invalid: i64,
}

//--------------------------------------   VirtualStockStatus  ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum VirtualStockStatus {
    Available,
    Reserved,
    Sold,
    Invalid,
}

impl Display for VirtualStockStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VirtualStockStatus::Available => write!(f, "available"),
            VirtualStockStatus::Reserved => write!(f, "reserved"),
            VirtualStockStatus::Sold => write!(f, "sold"),
            VirtualStockStatus::Invalid => write!(f, "invalid"),
        }
    }
}

//--------------------------------------    VirtualStockItem   ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct VirtualStockItem {
    pub id: i64,
    pub pool_id: i64,
    /// The opaque credential that is handed to the customer on delivery.
    pub content: String,
    pub remark: Option<String>,
    pub status: VirtualStockStatus,
    pub order_no: Option<OrderNo>,
    pub batch_no: Option<String>,
    pub reserved_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub delivered_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewVirtualItem {
    pub content: String,
    pub remark: Option<String>,
}

//--------------------------------------     DeliveryOrder     ---------------------------------------------------------
/// The order in which available virtual items are drawn from a pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOrder {
    Newest,
    Oldest,
    #[default]
    Random,
}

impl DeliveryOrder {
    pub fn order_by_clause(&self) -> &'static str {
        match self {
            DeliveryOrder::Newest => "created_at DESC, id DESC",
            DeliveryOrder::Oldest => "created_at ASC, id ASC",
            DeliveryOrder::Random => "RANDOM()",
        }
    }
}

impl Display for DeliveryOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryOrder::Newest => write!(f, "newest"),
            DeliveryOrder::Oldest => write!(f, "oldest"),
            DeliveryOrder::Random => write!(f, "random"),
        }
    }
}

impl FromStr for DeliveryOrder {
    type Err = ConversionError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "newest" => Ok(Self::Newest),
            "oldest" => Ok(Self::Oldest),
            "random" => Ok(Self::Random),
            s => Err(ConversionError(format!("Invalid delivery order: {s}"))),
        }
    }
}

//--------------------------------------        Order          ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub id: i64,
    pub order_no: OrderNo,
    pub customer_id: String,
    pub status: OrderStatusType,
    pub receiver_name: Option<String>,
    pub receiver_phone: Option<String>,
    pub receiver_address: Option<String>,
    pub tracking_no: Option<String>,
    pub promo_code_id: Option<i64>,
    pub payment_method_id: Option<i64>,
    pub remark: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn has_shipping_info(&self) -> bool {
        let filled = |s: &Option<String>| s.as_deref().map(|v| !v.trim().is_empty()).unwrap_or(false);
        filled(&self.receiver_name) && filled(&self.receiver_address)
    }
}

//--------------------------------------       OrderLine       ---------------------------------------------------------
/// A line item as the customer sees it. The attributes here are the ones the customer chose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct OrderLine {
    pub id: i64,
    pub order_id: i64,
    pub line_index: i64,
    pub catalog_item_id: i64,
    pub sku: String,
    pub name: String,
    pub product_type: ProductType,
    pub quantity: i64,
    pub attributes: Attributes,
}

//--------------------------------------     LineAllocation    ---------------------------------------------------------
/// The pool a line was allocated from, and the attributes it actually received. Kept apart from [`OrderLine`] so
/// that blind-box outcomes are not exposed before the order is paid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct LineAllocation {
    pub id: i64,
    pub order_id: i64,
    pub line_index: i64,
    pub pool_kind: PoolKind,
    pub pool_id: Option<i64>,
    pub quantity: i64,
    pub actual_attributes: Attributes,
}

//--------------------------------------     PaymentMethod     ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PaymentMethod {
    pub id: i64,
    pub name: String,
    /// Seconds between payment status checks. Zero means "use the default".
    pub poll_interval_secs: i64,
    pub check_url: Option<String>,
    pub refund_url: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewPaymentMethod {
    pub name: String,
    #[serde(default)]
    pub poll_interval_secs: i64,
    pub check_url: Option<String>,
    pub refund_url: Option<String>,
}

impl NewPaymentMethod {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string(), ..Default::default() }
    }

    pub fn with_poll_interval(mut self, secs: i64) -> Self {
        self.poll_interval_secs = secs;
        self
    }

    pub fn with_urls(mut self, check_url: &str, refund_url: &str) -> Self {
        self.check_url = Some(check_url.to_string());
        self.refund_url = Some(refund_url.to_string());
        self
    }
}

//--------------------------------------      OrderPayment     ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct OrderPayment {
    pub id: i64,
    pub order_id: i64,
    pub payment_method_id: Option<i64>,
    pub transaction_id: Option<String>,
    pub paid_at: DateTime<Utc>,
    pub data: Option<String>,
}

//--------------------------------------       PromoCode       ---------------------------------------------------------
/// Hold bookkeeping for a discount code. The discount itself is computed elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PromoCode {
    pub id: i64,
    pub code: String,
    pub total: i64,
    pub reserved: i64,
    pub used: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl PromoCode {
    pub fn remaining(&self) -> i64 {
        self.total - self.reserved - self.used
    }
}

//--------------------------------------      OrderSerial      ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct OrderSerial {
    pub id: i64,
    pub order_id: i64,
    pub serial: String,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------      PollingTask      ---------------------------------------------------------
/// A scheduled, recurring payment status check for one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingTask {
    pub order_id: i64,
    pub payment_method_id: i64,
    pub added_at: DateTime<Utc>,
    pub next_check_at: DateTime<Utc>,
    pub interval_seconds: i64,
    pub retry_count: u32,
}

impl PollingTask {
    pub fn new(order_id: i64, payment_method_id: i64, interval_seconds: i64, now: DateTime<Utc>) -> Self {
        Self { order_id, payment_method_id, added_at: now, next_check_at: now, interval_seconds, retry_count: 0 }
    }
}

/// The persisted form of a [`PollingTask`]. The order id is the key, and the rest is kept as an opaque blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingTaskData {
    pub payment_method_id: i64,
    pub added_at: DateTime<Utc>,
    pub next_check_at: DateTime<Utc>,
    pub interval_seconds: i64,
    pub retry_count: u32,
}

impl From<&PollingTask> for PollingTaskData {
    fn from(task: &PollingTask) -> Self {
        Self {
            payment_method_id: task.payment_method_id,
            added_at: task.added_at,
            next_check_at: task.next_check_at,
            interval_seconds: task.interval_seconds,
            retry_count: task.retry_count,
        }
    }
}

impl PollingTaskData {
    pub fn into_task(self, order_id: i64) -> PollingTask {
        PollingTask {
            order_id,
            payment_method_id: self.payment_method_id,
            added_at: self.added_at,
            next_check_at: self.next_check_at,
            interval_seconds: self.interval_seconds,
            retry_count: self.retry_count,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn pool(stock: i64, available: i64, sold: i64, reserved: i64) -> StockPool {
        StockPool {
            id: 1,
            name: "pool".into(),
            sku: None,
            attributes: Attributes::default(),
            stock,
            available_quantity: available,
            sold_quantity: sold,
            reserved_quantity: reserved,
            safety_stock: 2,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn available_stock_is_clamped() {
        assert_eq!(pool(10, 10, 3, 2).available_stock(), 5);
        assert_eq!(pool(10, 4, 3, 2).available_stock(), 0);
        assert_eq!(pool(10, 4, 3, 2).remaining_stock(), 5);
    }

    #[test]
    fn can_purchase_checks() {
        let p = pool(10, 10, 3, 2);
        assert!(p.can_purchase(5).is_ok());
        assert!(matches!(p.can_purchase(6), Err(StockCheckError::Insufficient { available: 5, .. })));
        assert!(matches!(pool(10, 5, 3, 2).can_purchase(1), Err(StockCheckError::SoldOut(1))));
        let mut inactive = pool(10, 10, 0, 0);
        inactive.is_active = false;
        assert!(matches!(inactive.can_purchase(1), Err(StockCheckError::Inactive(1))));
    }

    #[test]
    fn low_stock() {
        assert!(!pool(10, 10, 3, 2).is_low_stock());
        assert!(pool(10, 10, 6, 2).is_low_stock());
    }

    #[test]
    fn superset() {
        let full = Attributes::new().with("color", "red").with("size", "L");
        assert!(full.is_superset_of(&Attributes::new().with("color", "red")));
        assert!(full.is_superset_of(&Attributes::new()));
        assert!(!full.is_superset_of(&Attributes::new().with("color", "blue")));
        assert!(!full.is_superset_of(&Attributes::new().with("weight", "1kg")));
    }

    #[test]
    fn order_status_round_trip() {
        for s in ["draft", "pending_payment", "pending", "need_resubmit", "shipped", "completed", "cancelled"] {
            let status = OrderStatusType::from_str(s).unwrap();
            assert_eq!(status.to_string(), s);
        }
        assert!(OrderStatusType::from_str("paid").is_err());
    }
}
