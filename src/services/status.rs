use crate::services::pms::AssignmentTransition;

pub const STATUS_CHECKED_IN: &str = "I";
pub const STATUS_CHECKED_OUT: &str = "CO";

const CHECK_IN_MARKER: &str = "C/I";
const CHECK_OUT_MARKER: &str = "C/O";
const ROOM_CHANGE_MARKER: &str = "CHGROOM";

/// PMS order status codes and their display names.
const STATUS_NAMES: &[(&str, &str)] = &[
    ("O", "confirmed"),
    ("I", "checked-in"),
    ("N", "new"),
    ("R", "reserved"),
    ("D", "cancelled"),
    ("C", "cancelled"),
    ("S", "no-show"),
    ("CO", "checked-out"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedStatus {
    pub code: String,
    pub name: &'static str,
    /// A mid-stay room change appears in the assignment history.
    pub room_changed: bool,
}

pub fn status_name(code: &str) -> &'static str {
    STATUS_NAMES
        .iter()
        .find(|(known, _)| *known == code)
        .map(|(_, name)| *name)
        .unwrap_or("unknown")
}

/// Effective status from room-assignment history.
///
/// The order-level status goes stale after a `CHGROOM` room change, so any
/// room still checked in wins over it; a history made only of checkouts means
/// checked out; otherwise the most recent transition (latest begin date, then
/// latest position) is used, and the raw PMS status when there is no history.
pub fn resolve_status(
    raw_status: Option<&str>,
    transitions: &[AssignmentTransition],
) -> ResolvedStatus {
    let history = transitions
        .iter()
        .map(|t| (t, t.status_code.trim()))
        .filter(|(_, code)| !code.is_empty())
        .collect::<Vec<_>>();

    let room_changed = history
        .iter()
        .any(|(_, code)| code.contains(ROOM_CHANGE_MARKER));

    let code = if history.iter().any(|(_, code)| is_in_house(code)) {
        STATUS_CHECKED_IN.to_string()
    } else if !history.is_empty() && history.iter().all(|(_, code)| *code == CHECK_OUT_MARKER) {
        STATUS_CHECKED_OUT.to_string()
    } else if let Some((_, latest)) = history
        .iter()
        .enumerate()
        .max_by_key(|(index, (t, _))| (t.begin_date, *index))
        .map(|(_, entry)| *entry)
    {
        latest.to_string()
    } else {
        raw_status.map(str::trim).unwrap_or_default().to_string()
    };

    ResolvedStatus {
        name: status_name(&code),
        code,
        room_changed,
    }
}

fn is_in_house(code: &str) -> bool {
    code.contains(CHECK_IN_MARKER) && !code.starts_with(CHECK_OUT_MARKER)
}
