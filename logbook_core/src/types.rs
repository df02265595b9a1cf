//! Core domain types for the rowing club logbook.
//!
//! This module defines the records exchanged with a [`crate::Database`]:
//! - Boats, groups, members and administrators
//! - Outings (boat trips) and the draft used to record them
//! - Year-over-year statistics, composed with the record they describe
//! - Sort flags for member listings

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;

/// Backend-assigned group identity
pub type GroupId = u32;

/// Backend-assigned member identity
pub type MemberId = u32;

/// Outing identity: the creation timestamp in milliseconds since the epoch
pub type OutingId = i64;

/// Maximum number of rower slots in a boat
pub const MAX_ROWERS: usize = 8;

// ============================================================================
// Colour
// ============================================================================

/// Display colour of a group, written as `#RRGGBB`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Colour {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl Colour {
    pub const fn rgb(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }
}

impl fmt::Display for Colour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.red, self.green, self.blue)
    }
}

impl FromStr for Colour {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        let hex = s.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(crate::Error::IllegalArgument(format!(
                "invalid colour '{}', expected #RRGGBB",
                s
            )));
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16)
                .map_err(|e| crate::Error::IllegalArgument(format!("invalid colour '{}': {}", s, e)))
        };
        Ok(Self::rgb(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }
}

impl Serialize for Colour {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Colour {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Roster Types
// ============================================================================

/// A boat owned by the club
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BoatInfo {
    pub name: String,
    pub boat_type: Option<String>,
    /// Whether the boat is at the boathouse and available
    pub in_house: bool,
}

/// A group of members (e.g. "Senior", "Junior", "Guest")
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupInfo {
    pub id: GroupId,
    pub name: String,
    pub description: Option<String>,
    pub colour: Colour,
    /// The group new members join when none is given
    pub is_default: bool,
}

/// A club member
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemberInfo {
    pub id: MemberId,
    pub surname: String,
    /// Empty when the member has no recorded forename
    pub forename: String,
    pub date_of_birth: NaiveDate,
    pub group: GroupInfo,
}

/// An account allowed to administer the logbook
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AdminInfo {
    pub username: String,
    /// Opaque credential, stored as given
    pub password: String,
    pub name: String,
    pub is_root: bool,
    pub comment: Option<String>,
}

// ============================================================================
// Outing Types
// ============================================================================

/// A recorded boat trip
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutingInfo {
    pub id: OutingId,
    pub date: NaiveDate,
    /// One to eight rowers; the first slot is always filled
    pub rowers: Vec<MemberId>,
    pub cox: Option<MemberId>,
    pub time_out: NaiveTime,
    /// None while the crew is still on the water
    pub time_in: Option<NaiveTime>,
    pub comment: Option<String>,
    pub destination: Option<String>,
    pub boat_name: String,
    /// Kilometres rowed; 0 when unknown
    pub distance: u32,
}

impl OutingInfo {
    /// Whether the crew has not returned yet
    pub fn in_progress(&self) -> bool {
        self.time_in.is_none()
    }

    /// Whether the given member rowed or coxed this outing
    pub fn has_crew_member(&self, id: MemberId) -> bool {
        self.rowers.contains(&id) || self.cox == Some(id)
    }

    /// All crew members, rowers first
    pub fn crew(&self) -> impl Iterator<Item = MemberId> + '_ {
        self.rowers.iter().copied().chain(self.cox)
    }
}

/// Caller-supplied fields of an outing, used to add or overwrite one
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutingDraft {
    pub date: NaiveDate,
    /// Entries past the eighth are ignored
    pub rowers: Vec<MemberId>,
    pub cox: Option<MemberId>,
    pub time_out: NaiveTime,
    pub time_in: Option<NaiveTime>,
    pub comment: Option<String>,
    pub destination: Option<String>,
    pub boat_name: String,
    pub distance: u32,
}

impl OutingDraft {
    pub(crate) fn into_outing(self, id: OutingId) -> OutingInfo {
        let mut rowers = self.rowers;
        rowers.truncate(MAX_ROWERS);
        OutingInfo {
            id,
            date: self.date,
            rowers,
            cox: self.cox,
            time_out: self.time_out,
            time_in: self.time_in,
            comment: self.comment,
            destination: self.destination,
            boat_name: self.boat_name,
            distance: self.distance,
        }
    }
}

// ============================================================================
// Statistic Types
// ============================================================================

/// Outing counts and distances for the current and the previous calendar year
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Statistic {
    pub this_year_outings: u32,
    pub this_year_km: u32,
    pub last_year_outings: u32,
    pub last_year_km: u32,
}

impl Statistic {
    pub fn new(
        this_year_outings: u32,
        this_year_km: u32,
        last_year_outings: u32,
        last_year_km: u32,
    ) -> Self {
        Self {
            this_year_outings,
            this_year_km,
            last_year_outings,
            last_year_km,
        }
    }
}

/// Statistics for a single boat
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BoatStatistic {
    pub boat: BoatInfo,
    pub statistic: Statistic,
}

/// Statistics for a single member
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemberStatistic {
    pub member: MemberInfo,
    pub statistic: Statistic,
}

/// Statistics for all members of a group
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupStatistic {
    pub group: GroupInfo,
    pub statistic: Statistic,
}

// ============================================================================
// Sort Flags
// ============================================================================

/// Bit flags selecting the order of member listings.
///
/// The numeric values are shared with every frontend and must not change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SortMode(u8);

impl SortMode {
    /// Alphabetical by forename (the default)
    pub const ALPHABETICAL_FORENAME: SortMode = SortMode(0);
    /// Alphabetical by surname
    pub const ALPHABETICAL_SURNAME: SortMode = SortMode(1);
    /// Cluster by group before sorting alphabetically
    pub const GROUP: SortMode = SortMode(2);
    /// No grouping
    pub const INDIVIDUAL: SortMode = SortMode(0);

    pub const fn from_bits(bits: u8) -> Self {
        SortMode(bits & 0b11)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn by_surname(self) -> bool {
        self.0 & Self::ALPHABETICAL_SURNAME.0 != 0
    }

    pub const fn by_group(self) -> bool {
        self.0 & Self::GROUP.0 != 0
    }
}

impl BitOr for SortMode {
    type Output = SortMode;

    fn bitor(self, rhs: SortMode) -> SortMode {
        SortMode(self.0 | rhs.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statistic_keeps_last_year_outings() {
        // Regression: last-year outings used to be copied from this year's count.
        let stat = Statistic::new(12, 140, 7, 95);
        assert_eq!(stat.this_year_outings, 12);
        assert_eq!(stat.last_year_outings, 7);
        assert_eq!(stat.this_year_km, 140);
        assert_eq!(stat.last_year_km, 95);
    }

    #[test]
    fn test_sort_mode_bits() {
        assert_eq!(SortMode::ALPHABETICAL_FORENAME.bits(), 0);
        assert_eq!(SortMode::ALPHABETICAL_SURNAME.bits(), 1);
        assert_eq!(SortMode::GROUP.bits(), 2);
        assert_eq!(SortMode::INDIVIDUAL.bits(), 0);

        let mode = SortMode::GROUP | SortMode::ALPHABETICAL_SURNAME;
        assert_eq!(mode.bits(), 3);
        assert!(mode.by_group());
        assert!(mode.by_surname());
        assert!(!SortMode::default().by_group());
        assert_eq!(SortMode::from_bits(0xFF).bits(), 3);
    }

    #[test]
    fn test_colour_parse_and_display() {
        let colour: Colour = "#FF0000".parse().unwrap();
        assert_eq!(colour, Colour::rgb(255, 0, 0));
        assert_eq!(colour.to_string(), "#FF0000");
        assert_eq!("00a0ff".parse::<Colour>().unwrap(), Colour::rgb(0, 160, 255));
        assert!("#FF00".parse::<Colour>().is_err());
        assert!("#GG0000".parse::<Colour>().is_err());
    }

    #[test]
    fn test_colour_serializes_as_hex() {
        let json = serde_json::to_string(&Colour::rgb(1, 2, 3)).unwrap();
        assert_eq!(json, "\"#010203\"");
        let back: Colour = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Colour::rgb(1, 2, 3));
    }

    #[test]
    fn test_draft_truncates_rowers() {
        let draft = OutingDraft {
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            rowers: (1..=10).collect(),
            cox: None,
            time_out: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            time_in: None,
            comment: None,
            destination: None,
            boat_name: "Nixe".into(),
            distance: 0,
        };
        let outing = draft.into_outing(1);
        assert_eq!(outing.rowers, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert!(outing.in_progress());
    }
}
