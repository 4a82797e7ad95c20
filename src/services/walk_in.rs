use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::{AppError, AppResult};
use crate::services::normalize::phone_suffix;
use crate::services::pms::PmsBooking;

/// A walk-in phone only counts as identified with at least this many digits.
pub const MIN_MATCH_DIGITS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WalkInStatus {
    Pending,
    CheckedIn,
    Mismatch,
    Cancelled,
}

impl WalkInStatus {
    /// Entries still waiting for the PMS to catch up.
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Pending | Self::Mismatch)
    }
}

/// A same-day reservation taken by staff, kept outside the PMS until the
/// matching PMS booking shows up.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WalkInPendingOrder {
    pub order_id: String,
    pub item_id: String,
    pub guest_name: String,
    pub phone: String,
    #[serde(default)]
    pub arrival_time: Option<String>,
    #[serde(default)]
    pub room_type_code: Option<String>,
    #[serde(default)]
    pub room_count: Option<i64>,
    #[serde(default)]
    pub nights: Option<i64>,
    pub check_in_date: NaiveDate,
    #[serde(default)]
    pub line_user_id: Option<String>,
    #[serde(default)]
    pub line_display_name: Option<String>,
    #[serde(default)]
    pub staff_note: Option<String>,
    pub status: WalkInStatus,
    #[serde(default)]
    pub auto_matched: bool,
    #[serde(default)]
    pub matched_pms_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct NewWalkIn {
    pub order_id: Option<String>,
    pub guest_name: String,
    pub phone: String,
    pub arrival_time: Option<String>,
    pub room_type_code: Option<String>,
    pub room_count: Option<i64>,
    pub nights: Option<i64>,
    pub check_in_date: NaiveDate,
    pub line_user_id: Option<String>,
    pub line_display_name: Option<String>,
    pub staff_note: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WalkInMatch {
    pub matched: bool,
    pub updated_entry: WalkInPendingOrder,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfirmOutcome {
    pub entry: WalkInPendingOrder,
    pub warning: Option<String>,
}

/// Compare a walk-in's phone suffix with every PMS row from today. A hit marks
/// the entry checked in and records which PMS booking it matched.
pub fn match_walk_in(entry: &WalkInPendingOrder, today_rows: &[PmsBooking]) -> WalkInMatch {
    let suffix = phone_suffix(&entry.phone);
    let hit = (suffix.len() >= MIN_MATCH_DIGITS)
        .then(|| {
            today_rows.iter().find(|row| {
                row.contact_phone
                    .as_deref()
                    .map(phone_suffix)
                    .is_some_and(|candidate| candidate == suffix)
            })
        })
        .flatten();

    let Some(row) = hit else {
        return WalkInMatch {
            matched: false,
            updated_entry: entry.clone(),
        };
    };

    let mut updated = entry.clone();
    updated.status = WalkInStatus::CheckedIn;
    updated.auto_matched = true;
    updated.matched_pms_id = Some(row.booking_id.trim().to_string());
    updated.updated_at = Some(Utc::now());
    WalkInMatch {
        matched: true,
        updated_entry: updated,
    }
}

/// One element of the ledger file. Elements that fail to decode are written
/// back untouched and are invisible to every ledger operation.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
enum LedgerRecord {
    Entry(WalkInPendingOrder),
    Unreadable(Value),
}

impl LedgerRecord {
    fn decode(record: Value) -> Self {
        match serde_json::from_value::<WalkInPendingOrder>(record.clone()) {
            Ok(entry) => Self::Entry(entry),
            Err(error) => {
                tracing::warn!(
                    error = %error,
                    order_id = record.get("order_id").and_then(|v| v.as_str()).unwrap_or(""),
                    "Walk-in ledger entry unreadable; leaving it in place"
                );
                Self::Unreadable(record)
            }
        }
    }

    fn entry(&self) -> Option<&WalkInPendingOrder> {
        match self {
            Self::Entry(entry) => Some(entry),
            Self::Unreadable(_) => None,
        }
    }

    fn entry_mut(&mut self) -> Option<&mut WalkInPendingOrder> {
        match self {
            Self::Entry(entry) => Some(entry),
            Self::Unreadable(_) => None,
        }
    }

    fn into_entry(self) -> Option<WalkInPendingOrder> {
        match self {
            Self::Entry(entry) => Some(entry),
            Self::Unreadable(_) => None,
        }
    }

    fn item_id(&self) -> Option<&str> {
        match self {
            Self::Entry(entry) => Some(entry.item_id.as_str()),
            Self::Unreadable(record) => record.get("item_id").and_then(|v| v.as_str()),
        }
    }
}

/// JSON-array ledger of walk-ins. One order may carry several line items (one
/// per room type), each with its own `item_id`. All read-modify-write cycles go
/// through one mutex and each write replaces the file via rename.
pub struct WalkInLedger {
    path: PathBuf,
    lock: Mutex<()>,
}

impl WalkInLedger {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    pub async fn list(&self) -> AppResult<Vec<WalkInPendingOrder>> {
        let _guard = self.lock.lock().await;
        let records = load_records(&self.path).await?;
        Ok(records.into_iter().filter_map(LedgerRecord::into_entry).collect())
    }

    /// Append a line item. Passing an existing `order_id` adds another item to
    /// that order; its `item_id` is `<order_id>-<n>`.
    pub async fn create(&self, input: NewWalkIn) -> AppResult<WalkInPendingOrder> {
        let _guard = self.lock.lock().await;
        let mut records = load_records(&self.path).await?;

        let order_id = input
            .order_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(generate_order_id);
        let item_id = next_item_id(&records, &order_id);

        let entry = WalkInPendingOrder {
            order_id,
            item_id,
            guest_name: input.guest_name.trim().to_string(),
            phone: input.phone.trim().to_string(),
            arrival_time: input.arrival_time,
            room_type_code: input.room_type_code,
            room_count: input.room_count,
            nights: input.nights,
            check_in_date: input.check_in_date,
            line_user_id: input.line_user_id,
            line_display_name: input.line_display_name,
            staff_note: input.staff_note,
            status: WalkInStatus::Pending,
            auto_matched: false,
            matched_pms_id: None,
            created_at: Utc::now(),
            updated_at: None,
        };
        records.push(LedgerRecord::Entry(entry.clone()));
        store_records(&self.path, &records).await?;
        tracing::info!(order_id = %entry.order_id, item_id = %entry.item_id, "Walk-in item created");
        Ok(entry)
    }

    /// Auto-confirm today's pending entries against today's PMS check-ins.
    /// Returns the entries that flipped to checked in.
    pub async fn reconcile_today(
        &self,
        today: NaiveDate,
        today_rows: &[PmsBooking],
    ) -> AppResult<Vec<WalkInPendingOrder>> {
        let _guard = self.lock.lock().await;
        let mut records = load_records(&self.path).await?;

        let mut matched = Vec::new();
        for entry in records.iter_mut().filter_map(LedgerRecord::entry_mut) {
            if entry.status != WalkInStatus::Pending || entry.check_in_date != today {
                continue;
            }
            let outcome = match_walk_in(entry, today_rows);
            if outcome.matched {
                tracing::info!(
                    item_id = %entry.item_id,
                    pms_id = outcome.updated_entry.matched_pms_id.as_deref().unwrap_or(""),
                    "Walk-in auto-matched to PMS booking"
                );
                *entry = outcome.updated_entry;
                matched.push(entry.clone());
            }
        }

        if !matched.is_empty() {
            store_records(&self.path, &records).await?;
        }
        Ok(matched)
    }

    /// Staff confirmation of one line item, addressed by item id or, failing
    /// that, by order id (first item of the order). Without a phone match the
    /// item becomes `mismatch` and a warning is returned; `force` checks it in
    /// regardless.
    pub async fn confirm(
        &self,
        id: &str,
        today_rows: &[PmsBooking],
        force: bool,
    ) -> AppResult<ConfirmOutcome> {
        let _guard = self.lock.lock().await;
        let mut records = load_records(&self.path).await?;
        let entry = find_entry(&mut records, id)?;

        match entry.status {
            WalkInStatus::Cancelled => {
                return Err(AppError::Conflict(format!(
                    "Walk-in item {} is cancelled.",
                    entry.item_id
                )));
            }
            WalkInStatus::CheckedIn => {
                return Ok(ConfirmOutcome {
                    entry: entry.clone(),
                    warning: None,
                });
            }
            WalkInStatus::Pending | WalkInStatus::Mismatch => {}
        }

        let outcome = match_walk_in(entry, today_rows);
        let warning = if outcome.matched {
            *entry = outcome.updated_entry;
            None
        } else if force {
            entry.status = WalkInStatus::CheckedIn;
            entry.auto_matched = false;
            entry.updated_at = Some(Utc::now());
            Some("No PMS booking matched this phone; checked in by staff override.".to_string())
        } else {
            entry.status = WalkInStatus::Mismatch;
            entry.updated_at = Some(Utc::now());
            tracing::warn!(item_id = %entry.item_id, "Walk-in confirmation found no PMS phone match");
            Some("No PMS check-in today matches this phone number.".to_string())
        };

        let confirmed = entry.clone();
        store_records(&self.path, &records).await?;
        Ok(ConfirmOutcome {
            entry: confirmed,
            warning,
        })
    }

    /// Soft cancel of one line item; the record stays in the ledger.
    pub async fn cancel(&self, id: &str) -> AppResult<WalkInPendingOrder> {
        let _guard = self.lock.lock().await;
        let mut records = load_records(&self.path).await?;
        let entry = find_entry(&mut records, id)?;
        if entry.status == WalkInStatus::CheckedIn {
            return Err(AppError::Conflict(format!(
                "Walk-in item {} is already checked in.",
                entry.item_id
            )));
        }
        entry.status = WalkInStatus::Cancelled;
        entry.updated_at = Some(Utc::now());
        let cancelled = entry.clone();
        store_records(&self.path, &records).await?;
        tracing::info!(item_id = %cancelled.item_id, "Walk-in item cancelled");
        Ok(cancelled)
    }

    /// Daily cleanup: keep checked-in entries and today's open entries.
    /// Unreadable records are never dropped.
    pub async fn purge(&self, today: NaiveDate) -> AppResult<usize> {
        let _guard = self.lock.lock().await;
        let mut records = load_records(&self.path).await?;
        let before = records.len();
        records.retain(|record| match record {
            LedgerRecord::Entry(entry) => {
                entry.status == WalkInStatus::CheckedIn
                    || (entry.status.is_open() && entry.check_in_date == today)
            }
            LedgerRecord::Unreadable(_) => true,
        });
        let removed = before - records.len();
        if removed > 0 {
            store_records(&self.path, &records).await?;
        }
        Ok(removed)
    }
}

fn find_entry<'a>(
    records: &'a mut [LedgerRecord],
    id: &str,
) -> AppResult<&'a mut WalkInPendingOrder> {
    let id = id.trim();
    let position = records
        .iter()
        .position(|record| record.entry().is_some_and(|entry| entry.item_id == id))
        .or_else(|| {
            records
                .iter()
                .position(|record| record.entry().is_some_and(|entry| entry.order_id == id))
        });
    let not_found = || AppError::NotFound(format!("Walk-in item or order {id} not found."));
    let position = position.ok_or_else(not_found)?;
    records[position].entry_mut().ok_or_else(not_found)
}

fn next_item_id(records: &[LedgerRecord], order_id: &str) -> String {
    let taken = |candidate: &str| records.iter().any(|record| record.item_id() == Some(candidate));
    let mut n = records
        .iter()
        .filter_map(LedgerRecord::entry)
        .filter(|entry| entry.order_id == order_id)
        .count()
        + 1;
    loop {
        let candidate = format!("{order_id}-{n}");
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

fn generate_order_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string().to_uppercase();
    format!("WI{}", &id[..10])
}

async fn load_records(path: &Path) -> AppResult<Vec<LedgerRecord>> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(error) => {
            return Err(AppError::Internal(format!(
                "Could not read walk-in ledger: {error}"
            )))
        }
    };
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }

    // A ledger that is not an array is refused rather than overwritten.
    let records = serde_json::from_str::<Vec<Value>>(&raw)
        .map_err(|error| AppError::Internal(format!("Walk-in ledger is corrupt: {error}")))?;
    Ok(records.into_iter().map(LedgerRecord::decode).collect())
}

async fn store_records(path: &Path, records: &[LedgerRecord]) -> AppResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|error| AppError::Internal(format!("Could not create ledger dir: {error}")))?;
    }
    let body = serde_json::to_vec_pretty(records)
        .map_err(|error| AppError::Internal(format!("Could not encode walk-in ledger: {error}")))?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, body)
        .await
        .map_err(|error| AppError::Internal(format!("Could not write walk-in ledger: {error}")))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|error| AppError::Internal(format!("Could not replace walk-in ledger: {error}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).expect("date")
    }

    fn new_walk_in(phone: &str, day: NaiveDate) -> NewWalkIn {
        NewWalkIn {
            guest_name: "陳小姐".to_string(),
            phone: phone.to_string(),
            check_in_date: day,
            ..NewWalkIn::default()
        }
    }

    fn pms_row(id: &str, phone: &str) -> PmsBooking {
        PmsBooking {
            booking_id: id.to_string(),
            contact_phone: Some(phone.to_string()),
            ..PmsBooking::default()
        }
    }

    fn ledger() -> (tempfile::TempDir, WalkInLedger) {
        let dir = tempfile::tempdir().expect("tempdir");
        let ledger = WalkInLedger::new(dir.path().join("nested").join("same_day_bookings.json"));
        (dir, ledger)
    }

    #[tokio::test]
    async fn formatted_local_and_international_phones_match() {
        let (_dir, ledger) = ledger();
        let entry = ledger
            .create(new_walk_in("0912-345-678", today()))
            .await
            .expect("create");

        let outcome = match_walk_in(&entry, &[pms_row("B1", "0922000000"), pms_row("B2", "+886912345678")]);
        assert!(outcome.matched);
        assert_eq!(outcome.updated_entry.status, WalkInStatus::CheckedIn);
        assert!(outcome.updated_entry.auto_matched);
        assert_eq!(outcome.updated_entry.matched_pms_id.as_deref(), Some("B2"));
    }

    #[tokio::test]
    async fn short_or_missing_phones_never_match() {
        let (_dir, ledger) = ledger();
        let entry = ledger
            .create(new_walk_in("345-678", today()))
            .await
            .expect("create");
        assert!(!match_walk_in(&entry, &[pms_row("B1", "345678")]).matched);

        let blank = ledger.create(new_walk_in("", today())).await.expect("create");
        assert!(!match_walk_in(&blank, &[pms_row("B1", "")]).matched);
    }

    #[tokio::test]
    async fn reconcile_only_touches_todays_pending_entries() {
        let (_dir, ledger) = ledger();
        let yesterday = today().pred_opt().expect("date");
        let todays = ledger
            .create(new_walk_in("0912345678", today()))
            .await
            .expect("create");
        ledger
            .create(new_walk_in("0912345678", yesterday))
            .await
            .expect("create");

        let rows = [pms_row("P9", "886-912-345-678")];
        let matched = ledger.reconcile_today(today(), &rows).await.expect("reconcile");
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].order_id, todays.order_id);

        let stored = ledger.list().await.expect("list");
        let statuses = stored.iter().map(|e| e.status).collect::<Vec<_>>();
        assert_eq!(statuses, vec![WalkInStatus::CheckedIn, WalkInStatus::Pending]);

        // Idempotent: nothing left to match.
        assert!(ledger.reconcile_today(today(), &rows).await.expect("again").is_empty());
    }

    #[tokio::test]
    async fn confirm_without_match_flags_mismatch_then_force_checks_in() {
        let (_dir, ledger) = ledger();
        let entry = ledger
            .create(new_walk_in("0912345678", today()))
            .await
            .expect("create");

        let outcome = ledger
            .confirm(&entry.order_id, &[pms_row("P1", "0987654321")], false)
            .await
            .expect("confirm");
        assert_eq!(outcome.entry.status, WalkInStatus::Mismatch);
        assert!(outcome.warning.is_some());

        let outcome = ledger
            .confirm(&entry.order_id, &[], true)
            .await
            .expect("force");
        assert_eq!(outcome.entry.status, WalkInStatus::CheckedIn);
        assert!(!outcome.entry.auto_matched);
        assert!(outcome.warning.is_some());
    }

    #[tokio::test]
    async fn confirm_with_match_checks_in_quietly() {
        let (_dir, ledger) = ledger();
        let entry = ledger
            .create(new_walk_in("0912345678", today()))
            .await
            .expect("create");
        let outcome = ledger
            .confirm(&entry.order_id, &[pms_row("P1", "912345678")], false)
            .await
            .expect("confirm");
        assert_eq!(outcome.entry.status, WalkInStatus::CheckedIn);
        assert_eq!(outcome.warning, None);
    }

    #[tokio::test]
    async fn cancel_keeps_the_record() {
        let (_dir, ledger) = ledger();
        let entry = ledger
            .create(new_walk_in("0912345678", today()))
            .await
            .expect("create");
        let cancelled = ledger.cancel(&entry.order_id).await.expect("cancel");
        assert_eq!(cancelled.status, WalkInStatus::Cancelled);
        assert_eq!(ledger.list().await.expect("list").len(), 1);

        assert!(matches!(
            ledger.confirm(&entry.order_id, &[], true).await,
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            ledger.cancel("missing").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn one_order_holds_several_line_items() {
        let (_dir, ledger) = ledger();
        let mut input = new_walk_in("0912345678", today());
        input.order_id = Some("WI10161200".to_string());
        input.room_type_code = Some("SD".to_string());
        let first = ledger.create(input.clone()).await.expect("first item");
        input.room_type_code = Some("ST".to_string());
        let second = ledger.create(input).await.expect("second item");

        assert_eq!(first.item_id, "WI10161200-1");
        assert_eq!(second.item_id, "WI10161200-2");
        assert_eq!(second.order_id, first.order_id);

        let cancelled = ledger.cancel(&second.item_id).await.expect("cancel item");
        assert_eq!(cancelled.room_type_code.as_deref(), Some("ST"));

        // An order id addresses the order's first item.
        let outcome = ledger
            .confirm("WI10161200", &[], true)
            .await
            .expect("confirm by order");
        assert_eq!(outcome.entry.item_id, first.item_id);

        let statuses = ledger
            .list()
            .await
            .expect("list")
            .into_iter()
            .map(|e| (e.item_id, e.status))
            .collect::<Vec<_>>();
        assert_eq!(
            statuses,
            vec![
                ("WI10161200-1".to_string(), WalkInStatus::CheckedIn),
                ("WI10161200-2".to_string(), WalkInStatus::Cancelled),
            ]
        );
    }

    #[tokio::test]
    async fn purge_keeps_checked_in_and_todays_open_entries() {
        let (_dir, ledger) = ledger();
        let yesterday = today().pred_opt().expect("date");
        let old_pending = ledger
            .create(new_walk_in("0911111111", yesterday))
            .await
            .expect("create");
        let old_checked = ledger
            .create(new_walk_in("0922222222", yesterday))
            .await
            .expect("create");
        ledger
            .confirm(&old_checked.order_id, &[], true)
            .await
            .expect("force");
        let todays = ledger
            .create(new_walk_in("0933333333", today()))
            .await
            .expect("create");
        let cancelled = ledger
            .create(new_walk_in("0944444444", today()))
            .await
            .expect("create");
        ledger.cancel(&cancelled.order_id).await.expect("cancel");

        assert_eq!(ledger.purge(today()).await.expect("purge"), 2);
        let remaining = ledger
            .list()
            .await
            .expect("list")
            .into_iter()
            .map(|e| e.order_id)
            .collect::<Vec<_>>();
        assert_eq!(remaining, vec![old_checked.order_id, todays.order_id]);
        assert!(!remaining.contains(&old_pending.order_id));
    }

    #[tokio::test]
    async fn unreadable_entries_are_hidden_but_survive_writes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ledger.json");
        tokio::fs::write(
            &path,
            r#"[{"order_id": "LEGACY", "item_id": "LEGACY-1", "guest_name": "B"},
                {"order_id": "WI1", "item_id": "WI1-1", "guest_name": "A",
                "phone": "0912345678", "check_in_date": "2026-10-15", "status": "pending",
                "created_at": "2026-10-15T01:00:00Z"}]"#,
        )
        .await
        .expect("write");
        let ledger = WalkInLedger::new(path.clone());
        let entries = ledger.list().await.expect("list");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].order_id, "WI1");
        assert!(matches!(ledger.cancel("LEGACY").await, Err(AppError::NotFound(_))));

        let mut input = new_walk_in("0922000000", today());
        input.order_id = Some("LEGACY".to_string());
        let created = ledger.create(input).await.expect("create");
        assert_eq!(created.item_id, "LEGACY-2");
        assert_eq!(ledger.purge(today()).await.expect("purge"), 1);

        let raw = tokio::fs::read_to_string(&path).await.expect("read");
        let stored: Vec<Value> = serde_json::from_str(&raw).expect("array");
        assert_eq!(stored.len(), 2);
        assert_eq!(
            stored[0],
            serde_json::json!({ "order_id": "LEGACY", "item_id": "LEGACY-1", "guest_name": "B" })
        );
        assert_eq!(stored[1]["item_id"], "LEGACY-2");
    }

    #[tokio::test]
    async fn corrupt_ledger_is_refused() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ledger.json");
        tokio::fs::write(&path, "{ broken").await.expect("write");
        let ledger = WalkInLedger::new(path);
        assert!(matches!(ledger.list().await, Err(AppError::Internal(_))));
        assert!(matches!(
            ledger.create(new_walk_in("0912345678", today())).await,
            Err(AppError::Internal(_))
        ));
    }
}
