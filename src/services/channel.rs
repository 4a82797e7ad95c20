use std::fmt;

/// Booking channel derived from the OTA reference the PMS stores on a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Agoda,
    BookingCom,
    Expedia,
    Ctrip,
    DirectWebsite,
    ManualEntry,
    OtaUnspecified,
}

impl Channel {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Agoda => "Agoda",
            Self::BookingCom => "Booking.com",
            Self::Expedia => "Expedia",
            Self::Ctrip => "Ctrip",
            Self::DirectWebsite => "direct website",
            Self::ManualEntry => "manual-entry",
            Self::OtaUnspecified => "OTA-unspecified",
        }
    }

    /// Channels whose guests settle the balance at the front desk. Every other
    /// channel is collected by the OTA before arrival.
    pub const fn requires_payment_on_arrival(self) -> bool {
        matches!(
            self,
            Self::DirectWebsite | Self::ManualEntry | Self::BookingCom
        )
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered, case-sensitive prefix table. First match wins.
pub const OTA_PREFIX_TABLE: &[(&str, Channel)] = &[
    ("RMAG", Channel::Agoda),
    ("RMBK", Channel::BookingCom),
    ("RMEX", Channel::Expedia),
    ("RMCPT", Channel::Ctrip),
    ("RMPGP", Channel::DirectWebsite),
];

pub fn classify_channel(ota_reference: Option<&str>) -> Channel {
    classify_with(OTA_PREFIX_TABLE, ota_reference)
}

pub fn classify_with(table: &[(&str, Channel)], ota_reference: Option<&str>) -> Channel {
    let Some(reference) = ota_reference.map(str::trim).filter(|value| !value.is_empty()) else {
        return Channel::ManualEntry;
    };

    if let Some((_, channel)) = table
        .iter()
        .find(|(prefix, _)| reference.starts_with(prefix))
    {
        return *channel;
    }

    if looks_like_ota_reference(reference) {
        Channel::OtaUnspecified
    } else {
        // Placeholder text typed into the OTA field ("-", "none") by staff.
        Channel::ManualEntry
    }
}

fn looks_like_ota_reference(reference: &str) -> bool {
    reference.len() >= 4
        && reference
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
        && reference.chars().any(|ch| ch.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::{classify_channel, classify_with, Channel};

    #[test]
    fn missing_reference_is_manual_entry() {
        assert_eq!(classify_channel(None), Channel::ManualEntry);
        assert_eq!(classify_channel(Some("")), Channel::ManualEntry);
        assert_eq!(classify_channel(Some("   ")), Channel::ManualEntry);
        assert_eq!(classify_channel(None).as_str(), "manual-entry");
    }

    #[test]
    fn known_prefixes_map_to_channels() {
        assert_eq!(classify_channel(Some("RMAG998")), Channel::Agoda);
        assert_eq!(classify_channel(Some("RMBK5512345")), Channel::BookingCom);
        assert_eq!(classify_channel(Some("RMEX77")), Channel::Expedia);
        assert_eq!(classify_channel(Some("RMCPT1200")), Channel::Ctrip);
        assert_eq!(
            classify_channel(Some("RMPGP20260101")).as_str(),
            "direct website"
        );
    }

    #[test]
    fn prefix_match_is_case_sensitive() {
        assert_eq!(classify_channel(Some("rmag998")), Channel::OtaUnspecified);
    }

    #[test]
    fn first_matching_prefix_wins() {
        let table = [("RMB", Channel::Expedia), ("RMBK", Channel::BookingCom)];
        assert_eq!(classify_with(&table, Some("RMBK123")), Channel::Expedia);

        let reversed = [("RMBK", Channel::BookingCom), ("RMB", Channel::Expedia)];
        assert_eq!(classify_with(&reversed, Some("RMBK123")), Channel::BookingCom);
        assert_eq!(classify_with(&reversed, Some("RMBX123")), Channel::Expedia);
    }

    #[test]
    fn unknown_reference_shape_falls_back() {
        assert_eq!(classify_channel(Some("XYZ123456")), Channel::OtaUnspecified);
        assert_eq!(classify_channel(Some("n/a")), Channel::ManualEntry);
    }

    #[test]
    fn pay_on_arrival_allow_list() {
        assert!(Channel::DirectWebsite.requires_payment_on_arrival());
        assert!(Channel::ManualEntry.requires_payment_on_arrival());
        assert!(Channel::BookingCom.requires_payment_on_arrival());
        assert!(!Channel::Agoda.requires_payment_on_arrival());
        assert!(!Channel::OtaUnspecified.requires_payment_on_arrival());
    }
}
