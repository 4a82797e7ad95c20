use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::services::pms::RoomLine;

pub const UNKNOWN_ROOM_TYPE: &str = "unknown room type";

const DEFAULT_ROOM_TYPES: &[(&str, &str)] = &[
    ("SD", "Standard Double"),
    ("ST", "Standard Triple"),
    ("SQ", "Standard Quad"),
    ("CD", "Classic Double"),
    ("CQ", "Classic Quad"),
    ("DD", "Deluxe Double"),
    ("ED", "Executive Double"),
    ("WD", "Ocean View Double"),
    ("WQ", "Ocean View Quad"),
    ("VD", "VIP Double"),
    ("VQ", "VIP Quad"),
    ("FM", "Family Room"),
    ("AD", "Accessible Double"),
    ("AQ", "Accessible Quad"),
];

/// Static room-type code lookup, loaded once at startup.
#[derive(Debug, Clone)]
pub struct RoomTypeTable {
    names: HashMap<String, String>,
}

impl Default for RoomTypeTable {
    fn default() -> Self {
        Self {
            names: DEFAULT_ROOM_TYPES
                .iter()
                .map(|(code, name)| ((*code).to_string(), (*name).to_string()))
                .collect(),
        }
    }
}

impl RoomTypeTable {
    /// Read a `{ "CODE": "Name" }` JSON file, falling back to the built-in table.
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };
        match std::fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|raw| {
                serde_json::from_str::<HashMap<String, String>>(&raw).map_err(|e| e.to_string())
            }) {
            Ok(names) => {
                tracing::info!(path = %path.display(), entries = names.len(), "Loaded room type table");
                Self {
                    names: names
                        .into_iter()
                        .map(|(code, name)| (code.trim().to_string(), name))
                        .collect(),
                }
            }
            Err(error) => {
                tracing::warn!(path = %path.display(), error = %error, "Room type table unreadable, using defaults");
                Self::default()
            }
        }
    }

    pub fn name_for<'a>(&'a self, code: &'a str) -> &'a str {
        let code = code.trim();
        self.names.get(code).map(String::as_str).unwrap_or(code)
    }

    /// "Standard Double x2, Family Room" style label for a booking's line items.
    pub fn label_for(&self, rooms: &[RoomLine]) -> String {
        let mut counts: BTreeMap<&str, i64> = BTreeMap::new();
        let mut order: Vec<&str> = Vec::new();
        for room in rooms {
            let code = room.room_type_code.as_deref().map(str::trim).unwrap_or("");
            if code.is_empty() {
                continue;
            }
            let count = room.room_count.filter(|n| *n > 0).unwrap_or(1);
            if !counts.contains_key(code) {
                order.push(code);
            }
            *counts.entry(code).or_insert(0) += count;
        }

        let parts = order
            .into_iter()
            .map(|code| {
                let name = self.name_for(code);
                match counts.get(code).copied().unwrap_or(1) {
                    n if n > 1 => format!("{name} x{n}"),
                    _ => name.to_string(),
                }
            })
            .collect::<Vec<_>>();

        if parts.is_empty() {
            UNKNOWN_ROOM_TYPE.to_string()
        } else {
            parts.join(", ")
        }
    }
}
