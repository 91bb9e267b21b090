//! Contextual constraints.
//!
//! Predicates a call site can opt into per request: business hours (weekday
//! plus time window) and a source-IP allow-list. Each predicate is
//! deny-by-default when the context lacks the data it needs.

use std::fmt;
use std::net::IpAddr;

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use time::macros::time;
use time::{OffsetDateTime, Time, UtcOffset, Weekday};

use crate::config::ConfigError;

/// Identifies a contextual predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    /// Weekday and time-of-day window.
    BusinessHours,
    /// Source-IP allow-list.
    IpAllowList,
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BusinessHours => f.write_str("business_hours"),
            Self::IpAllowList => f.write_str("ip_allow_list"),
        }
    }
}

// =============================================================================
// Business Hours
// =============================================================================

/// Weekdays plus a half-open local time window `[start, end)`.
///
/// A window with `end < start` runs overnight; its early-morning part belongs
/// to the weekday on which it started. `start == end` permits nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusinessHours {
    /// Days on which access is permitted.
    pub weekdays: Vec<Weekday>,
    /// Start of the window, local time.
    pub start: Time,
    /// End of the window, local time.
    pub end: Time,
    /// Offset used to convert the evaluation timestamp to local time.
    pub utc_offset: UtcOffset,
}

impl Default for BusinessHours {
    /// Monday to Friday, 08:00 to 18:00 UTC.
    fn default() -> Self {
        Self {
            weekdays: vec![
                Weekday::Monday,
                Weekday::Tuesday,
                Weekday::Wednesday,
                Weekday::Thursday,
                Weekday::Friday,
            ],
            start: time!(08:00),
            end: time!(18:00),
            utc_offset: UtcOffset::UTC,
        }
    }
}

impl BusinessHours {
    /// Sets the local time window.
    #[must_use]
    pub fn with_window(mut self, start: Time, end: Time) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    /// Sets the weekdays.
    #[must_use]
    pub fn with_weekdays(mut self, weekdays: impl IntoIterator<Item = Weekday>) -> Self {
        self.weekdays = weekdays.into_iter().collect();
        self
    }

    /// Sets the local offset.
    #[must_use]
    pub fn with_offset(mut self, utc_offset: UtcOffset) -> Self {
        self.utc_offset = utc_offset;
        self
    }

    /// Returns `true` if `at` falls inside the window on a permitted weekday.
    #[must_use]
    pub fn permits(&self, at: OffsetDateTime) -> bool {
        let local = at.to_offset(self.utc_offset);
        let now = local.time();
        let day = local.weekday();

        let opened_on = if self.start < self.end {
            (self.start <= now && now < self.end).then_some(day)
        } else if self.start > self.end {
            if now >= self.start {
                Some(day)
            } else if now < self.end {
                Some(day.previous())
            } else {
                None
            }
        } else {
            None
        };

        opened_on.is_some_and(|day| self.weekdays.contains(&day))
    }
}

// =============================================================================
// IP Allow-List
// =============================================================================

/// Set of CIDR networks a request must originate from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IpAllowList {
    networks: Vec<IpNetwork>,
}

impl IpAllowList {
    /// Creates an allow-list from parsed networks.
    #[must_use]
    pub fn new(networks: Vec<IpNetwork>) -> Self {
        Self { networks }
    }

    /// Parses CIDR strings such as `10.0.0.0/8` or `192.168.1.7`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the first unparsable entry.
    pub fn parse<I, S>(cidrs: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let networks = cidrs
            .into_iter()
            .map(|cidr| {
                let cidr = cidr.as_ref();
                cidr.trim().parse::<IpNetwork>().map_err(|e| {
                    ConfigError::InvalidValue(format!("invalid network '{cidr}': {e}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { networks })
    }

    /// Returns the networks.
    #[must_use]
    pub fn networks(&self) -> &[IpNetwork] {
        &self.networks
    }

    /// Returns `true` if `ip` lies in one of the networks. A missing address never does.
    #[must_use]
    pub fn permits(&self, ip: Option<IpAddr>) -> bool {
        ip.is_some_and(|ip| self.networks.iter().any(|network| network.contains(ip)))
    }
}

// =============================================================================
// Constraint Set
// =============================================================================

/// The contextual predicates a call site opted into.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstraintSet {
    /// Business-hours window, if required.
    pub business_hours: Option<BusinessHours>,
    /// Source-IP allow-list, if required.
    pub ip_allow_list: Option<IpAllowList>,
}

impl ConstraintSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires business hours.
    #[must_use]
    pub fn with_business_hours(mut self, hours: BusinessHours) -> Self {
        self.business_hours = Some(hours);
        self
    }

    /// Requires a source-IP allow-list.
    #[must_use]
    pub fn with_ip_allow_list(mut self, list: IpAllowList) -> Self {
        self.ip_allow_list = Some(list);
        self
    }

    /// Returns the first failing predicate, if any.
    #[must_use]
    pub fn first_violation(
        &self,
        at: OffsetDateTime,
        source_ip: Option<IpAddr>,
    ) -> Option<ConstraintKind> {
        if let Some(hours) = &self.business_hours
            && !hours.permits(at)
        {
            return Some(ConstraintKind::BusinessHours);
        }
        if let Some(list) = &self.ip_allow_list
            && !list.permits(source_ip)
        {
            return Some(ConstraintKind::IpAllowList);
        }
        None
    }
}
