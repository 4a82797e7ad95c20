use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde::Deserialize;
use serde_json::Value;

use crate::services::normalize::{strip_alpha_prefix, trimmed};
use crate::services::pms::PmsBooking;

/// Guest details the chat bot collected for one order.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct GuestOrder {
    #[serde(default)]
    pub guest_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub check_in: Option<String>,
    #[serde(default)]
    pub special_requests: Vec<String>,
    #[serde(default)]
    pub arrival_time: Option<String>,
    #[serde(default)]
    pub line_user_id: Option<String>,
    #[serde(default, alias = "display_name")]
    pub line_display_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Guest orders keyed by external order id, in file order.
#[derive(Debug, Clone, Default)]
pub struct GuestOrderPool {
    entries: Vec<(String, GuestOrder)>,
    index: HashMap<String, usize>,
}

impl GuestOrderPool {
    /// Build from the bot's `{ "<order id>": { ... } }` document. Records that
    /// fail to decode are logged and left out.
    pub fn from_json(document: &Value) -> Self {
        let mut pool = Self::default();
        let Some(object) = document.as_object() else {
            if !document.is_null() {
                tracing::warn!("guest_orders document is not an object; ignoring");
            }
            return pool;
        };
        for (order_id, record) in object {
            match serde_json::from_value::<GuestOrder>(record.clone()) {
                Ok(order) => pool.insert(order_id.clone(), order),
                Err(error) => {
                    tracing::warn!(order_id = %order_id, error = %error, "Skipping malformed guest order");
                }
            }
        }
        pool
    }

    pub fn insert(&mut self, order_id: String, order: GuestOrder) {
        if let Some(&position) = self.index.get(&order_id) {
            self.entries[position].1 = order;
            return;
        }
        self.index.insert(order_id.clone(), self.entries.len());
        self.entries.push((order_id, order));
    }

    pub fn get(&self, order_id: &str) -> Option<&GuestOrder> {
        self.index.get(order_id).map(|&i| &self.entries[i].1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &GuestOrder)> {
        self.entries.iter().map(|(id, order)| (id.as_str(), order))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct UserProfiles(HashMap<String, UserProfile>);

impl UserProfiles {
    pub fn from_json(document: &Value) -> Self {
        let Some(object) = document.as_object() else {
            return Self::default();
        };
        let profiles = object
            .iter()
            .filter_map(|(user_id, record)| {
                match serde_json::from_value::<UserProfile>(record.clone()) {
                    Ok(profile) => Some((user_id.clone(), profile)),
                    Err(error) => {
                        tracing::warn!(user_id = %user_id, error = %error, "Skipping malformed user profile");
                        None
                    }
                }
            })
            .collect();
        Self(profiles)
    }

    pub fn display_name(&self, user_id: &str) -> Option<&str> {
        self.0
            .get(user_id)
            .and_then(|profile| trimmed(profile.display_name.as_deref()))
    }
}

/// Find the bot guest order for a booking. Priority: full OTA reference,
/// numeric OTA reference, PMS id, then guest name + check-in date.
///
/// The name/date fallback returns the first candidate in pool order when
/// several qualify; which one is "right" has never been specified.
pub fn match_guest_order<'a>(
    booking: &PmsBooking,
    guest_name: &str,
    pool: &'a GuestOrderPool,
) -> Option<&'a GuestOrder> {
    if let Some(reference) = booking.ota_reference() {
        if let Some(order) = pool.get(reference) {
            return Some(order);
        }
        let numeric = strip_alpha_prefix(reference);
        if !numeric.is_empty() && numeric != reference {
            if let Some(order) = pool.get(numeric) {
                return Some(order);
            }
        }
    }

    if let Some(order) = pool.get(booking.booking_id.trim()) {
        return Some(order);
    }

    let booking_key = name_key(guest_name);
    let check_in = booking.check_in_date?.format("%Y-%m-%d").to_string();
    if booking_key.is_empty() {
        return None;
    }

    pool.iter().find_map(|(order_id, order)| {
        let order_date = trimmed(order.check_in.as_deref())?;
        if order_date != check_in {
            return None;
        }
        let order_key = name_key(order.guest_name.as_deref().unwrap_or_default());
        if order_key.is_empty() {
            return None;
        }
        if booking_key.contains(&order_key) || order_key.contains(&booking_key) {
            tracing::debug!(
                booking_id = %booking.booking_id,
                order_id = %order_id,
                "Guest order matched by name and check-in date"
            );
            Some(order)
        } else {
            None
        }
    })
}

fn name_key(name: &str) -> String {
    name.chars()
        .filter(|ch| !ch.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Read-only access to the chat bot's JSON files, re-read on every request
/// unless a short TTL cache is configured.
#[derive(Clone)]
pub struct BotDataStore {
    guest_orders_path: PathBuf,
    user_profiles_path: PathBuf,
    cache: Option<Cache<PathBuf, Arc<Value>>>,
}

impl BotDataStore {
    pub fn new(guest_orders_path: PathBuf, user_profiles_path: PathBuf, ttl_seconds: u64) -> Self {
        let cache = (ttl_seconds > 0).then(|| {
            Cache::builder()
                .max_capacity(8)
                .time_to_live(Duration::from_secs(ttl_seconds))
                .build()
        });
        Self {
            guest_orders_path,
            user_profiles_path,
            cache,
        }
    }

    pub async fn guest_orders(&self) -> GuestOrderPool {
        let document = self.read_document(&self.guest_orders_path).await;
        GuestOrderPool::from_json(&document)
    }

    pub async fn user_profiles(&self) -> UserProfiles {
        let document = self.read_document(&self.user_profiles_path).await;
        UserProfiles::from_json(&document)
    }

    async fn read_document(&self, path: &Path) -> Arc<Value> {
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(path).await {
                return hit;
            }
        }

        let document = Arc::new(read_json_file(path).await);
        if let Some(cache) = &self.cache {
            cache.insert(path.to_path_buf(), document.clone()).await;
        }
        document
    }
}

async fn read_json_file(path: &Path) -> Value {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Value::Null,
        Err(error) => {
            tracing::warn!(path = %path.display(), error = %error, "Bot data file unreadable");
            return Value::Null;
        }
    };
    serde_json::from_str(&raw).unwrap_or_else(|error| {
        tracing::warn!(path = %path.display(), error = %error, "Bot data file is not valid JSON");
        Value::Null
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn booking(id: &str, ota: Option<&str>) -> PmsBooking {
        PmsBooking {
            booking_id: id.to_string(),
            ota_booking_id: ota.map(str::to_string),
            check_in_date: NaiveDate::from_ymd_opt(2026, 10, 16),
            ..PmsBooking::default()
        }
    }

    fn pool() -> GuestOrderPool {
        GuestOrderPool::from_json(&json!({
            "RMAG998": { "guest_name": "full ota", "check_in": "2026-10-16" },
            "1671721966": { "guest_name": "numeric ota", "check_in": "2026-10-16" },
            "00605201": { "guest_name": "pms id", "check_in": "2026-10-16" },
            "broken": { "special_requests": "not a list" },
            "L1": { "guest_name": "John Smith", "check_in": "2026-10-16" },
            "L2": { "guest_name": "john", "check_in": "2026-10-16" },
            "L3": { "guest_name": "", "check_in": "2026-10-16" }
        }))
    }

    fn matched_name(order: Option<&GuestOrder>) -> Option<&str> {
        order.and_then(|o| o.guest_name.as_deref())
    }

    #[test]
    fn malformed_records_are_dropped() {
        let pool = pool();
        assert_eq!(pool.len(), 6);
        assert!(pool.get("broken").is_none());
        assert!(GuestOrderPool::from_json(&json!([1, 2])).is_empty());
    }

    #[test]
    fn exact_ota_reference_wins() {
        let pool = pool();
        let b = booking("00605201", Some("RMAG998"));
        assert_eq!(matched_name(match_guest_order(&b, "", &pool)), Some("full ota"));
    }

    #[test]
    fn numeric_ota_reference_then_pms_id() {
        let pool = pool();
        let b = booking("00605201", Some("RMAG1671721966"));
        assert_eq!(matched_name(match_guest_order(&b, "", &pool)), Some("numeric ota"));

        let b = booking("00605201", Some("RMBK555"));
        assert_eq!(matched_name(match_guest_order(&b, "", &pool)), Some("pms id"));
    }

    #[test]
    fn fuzzy_match_needs_same_date_and_contained_name() {
        let pool = pool();
        let b = booking("X1", None);
        assert_eq!(
            matched_name(match_guest_order(&b, "JOHN SMITH", &pool)),
            Some("John Smith")
        );
        // Either direction of containment counts; first in file order wins.
        assert_eq!(
            matched_name(match_guest_order(&b, "Johnny", &pool)),
            Some("john")
        );

        let mut other_day = booking("X1", None);
        other_day.check_in_date = NaiveDate::from_ymd_opt(2026, 10, 17);
        assert!(match_guest_order(&other_day, "John Smith", &pool).is_none());
    }

    #[test]
    fn blank_names_never_fuzzy_match() {
        let pool = pool();
        assert!(match_guest_order(&booking("X1", None), "   ", &pool).is_none());
    }

    #[test]
    fn profiles_skip_bad_records() {
        let profiles = UserProfiles::from_json(&json!({
            "U1": { "display_name": "阿明" },
            "U2": { "display_name": 42 },
            "U3": { "display_name": "  " }
        }));
        assert_eq!(profiles.display_name("U1"), Some("阿明"));
        assert_eq!(profiles.display_name("U2"), None);
        assert_eq!(profiles.display_name("U3"), None);
    }

    #[tokio::test]
    async fn store_reads_files_and_tolerates_missing_ones() {
        let dir = tempfile::tempdir().expect("tempdir");
        let orders_path = dir.path().join("guest_orders.json");
        tokio::fs::write(&orders_path, r#"{"RMAG1": {"guest_name": "A"}}"#)
            .await
            .expect("write orders");

        let store = BotDataStore::new(orders_path.clone(), dir.path().join("missing.json"), 0);
        assert_eq!(store.guest_orders().await.len(), 1);
        assert!(store.user_profiles().await.display_name("U1").is_none());

        tokio::fs::write(&orders_path, "{ not json")
            .await
            .expect("rewrite orders");
        assert!(store.guest_orders().await.is_empty());
    }

    #[tokio::test]
    async fn cached_store_serves_previous_read_within_ttl() {
        let dir = tempfile::tempdir().expect("tempdir");
        let orders_path = dir.path().join("guest_orders.json");
        tokio::fs::write(&orders_path, r#"{"A": {}}"#).await.expect("write");

        let store = BotDataStore::new(orders_path.clone(), dir.path().join("p.json"), 60);
        assert_eq!(store.guest_orders().await.len(), 1);
        tokio::fs::write(&orders_path, r#"{"A": {}, "B": {}}"#)
            .await
            .expect("rewrite");
        assert_eq!(store.guest_orders().await.len(), 1);
    }
}
