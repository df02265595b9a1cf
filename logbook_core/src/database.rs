//! Persistence contract for club data.
//!
//! Every storage backend implements [`Database`]. The rules all backends
//! share:
//!
//! - Lookups of absent entries return `Ok(None)`, never an error.
//! - Invalid input fails with [`Error::IllegalArgument`] and writes nothing.
//! - Collisions with a unique entry fail with [`Error::EntryAlreadyExists`].
//! - Storage faults fail with an error for which [`Error::is_fatal`] holds;
//!   callers should log it, tell the user, and stop.
//! - `modify_*` operations overwrite every field. There is no partial
//!   update and no conflict detection: the last write wins.
//! - Lists of boats, groups and admins are sorted alphabetically; member
//!   lists follow the requested [`SortMode`].
//!
//! [`Error::IllegalArgument`]: crate::Error::IllegalArgument
//! [`Error::EntryAlreadyExists`]: crate::Error::EntryAlreadyExists
//! [`Error::is_fatal`]: crate::Error::is_fatal

use crate::{
    AdminInfo, BoatInfo, BoatStatistic, Colour, GroupId, GroupInfo, GroupStatistic, MemberId,
    MemberInfo, MemberStatistic, OutingDraft, OutingId, OutingInfo, Result, SortMode,
};
use chrono::NaiveDate;
use std::cmp::Ordering;

/// Storage backend for the logbook
pub trait Database {
    // ---- Boats --------------------------------------------------------------

    /// Add a boat; the name must be non-empty and unused.
    fn add_boat(&mut self, name: &str, boat_type: Option<&str>, in_house: bool) -> Result<()>;

    fn get_boat(&self, name: &str) -> Result<Option<BoatInfo>>;

    /// Overwrite the boat `old` refers to. Renaming carries its outings along.
    fn modify_boat(
        &mut self,
        old: &BoatInfo,
        name: &str,
        boat_type: Option<&str>,
        in_house: bool,
    ) -> Result<()>;

    fn get_boats(&self) -> Result<Vec<BoatInfo>>;

    /// Boats that are (or are not) at the boathouse
    fn get_boats_in_house(&self, in_house: bool) -> Result<Vec<BoatInfo>> {
        Ok(self
            .get_boats()?
            .into_iter()
            .filter(|b| b.in_house == in_house)
            .collect())
    }

    fn get_boat_statistic(&self, name: &str) -> Result<Option<BoatStatistic>>;

    fn get_boats_statistics(&self) -> Result<Vec<BoatStatistic>>;

    // ---- Members ------------------------------------------------------------

    /// Add a member and return the assigned id.
    ///
    /// A missing forename is stored as an empty string. The group must exist.
    fn add_member(
        &mut self,
        surname: &str,
        forename: Option<&str>,
        date_of_birth: NaiveDate,
        group_id: GroupId,
    ) -> Result<MemberId>;

    fn get_member(&self, id: MemberId) -> Result<Option<MemberInfo>>;

    fn modify_member(
        &mut self,
        id: MemberId,
        surname: &str,
        forename: Option<&str>,
        date_of_birth: NaiveDate,
        group_id: GroupId,
    ) -> Result<()>;

    /// All members, alphabetical by forename
    fn get_members(&self) -> Result<Vec<MemberInfo>> {
        self.get_members_sorted(SortMode::default())
    }

    fn get_members_sorted(&self, sorting: SortMode) -> Result<Vec<MemberInfo>>;

    fn get_member_statistics(&self, id: MemberId) -> Result<Option<MemberStatistic>>;

    fn get_members_statistics(&self) -> Result<Vec<MemberStatistic>> {
        self.get_members_statistics_sorted(SortMode::default())
    }

    fn get_members_statistics_sorted(&self, sorting: SortMode) -> Result<Vec<MemberStatistic>>;

    // ---- Groups -------------------------------------------------------------

    /// Add a group and return the assigned id.
    ///
    /// Flagging a group as default clears the flag on every other group.
    fn add_group(
        &mut self,
        name: &str,
        description: Option<&str>,
        colour: Colour,
        is_default: bool,
    ) -> Result<GroupId>;

    fn modify_group(
        &mut self,
        id: GroupId,
        name: &str,
        description: Option<&str>,
        colour: Colour,
        is_default: bool,
    ) -> Result<()>;

    fn get_group(&self, id: GroupId) -> Result<Option<GroupInfo>>;

    fn get_groups(&self) -> Result<Vec<GroupInfo>>;

    /// The group new members join when none is given, if one is flagged
    fn get_default_group(&self) -> Result<Option<GroupInfo>> {
        Ok(self.get_groups()?.into_iter().find(|g| g.is_default))
    }

    fn get_group_statistic(&self, id: GroupId) -> Result<Option<GroupStatistic>>;

    fn get_groups_statistics(&self) -> Result<Vec<GroupStatistic>>;

    // ---- Outings ------------------------------------------------------------

    /// Record an outing and return its creation id.
    ///
    /// The first rower and the boat must exist; rowers past the eighth are
    /// ignored.
    fn add_outing(&mut self, outing: OutingDraft) -> Result<OutingId>;

    /// Outings on the given calendar day
    fn get_outings(&self, date: NaiveDate) -> Result<Vec<OutingInfo>>;

    fn modify_outing(&mut self, id: OutingId, outing: OutingDraft) -> Result<()>;

    // ---- Admins -------------------------------------------------------------

    fn add_admin(
        &mut self,
        username: &str,
        password: &str,
        name: &str,
        is_root: bool,
        comment: Option<&str>,
    ) -> Result<()>;

    fn get_admin(&self, username: &str) -> Result<Option<AdminInfo>>;

    fn get_admins(&self) -> Result<Vec<AdminInfo>>;
}

/// Compare display text case-insensitively, falling back to exact order
pub(crate) fn cmp_text(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

/// Order members according to `sorting`.
///
/// With [`SortMode::GROUP`] members are clustered by group name first. Ties
/// on the primary name fall back to the other name, then to the id, so the
/// result is a total order.
pub fn sort_members_by<T, F>(items: &mut [T], sorting: SortMode, member: F)
where
    F: Fn(&T) -> &MemberInfo,
{
    items.sort_by(|a, b| {
        let (a, b) = (member(a), member(b));
        let by_group = if sorting.by_group() {
            cmp_text(&a.group.name, &b.group.name).then(a.group.id.cmp(&b.group.id))
        } else {
            Ordering::Equal
        };
        let by_name = if sorting.by_surname() {
            cmp_text(&a.surname, &b.surname).then_with(|| cmp_text(&a.forename, &b.forename))
        } else {
            cmp_text(&a.forename, &b.forename).then_with(|| cmp_text(&a.surname, &b.surname))
        };
        by_group.then(by_name).then(a.id.cmp(&b.id))
    });
}
