//! In-memory logbook backend.
//!
//! [`MemoryDatabase`] holds the whole club in memory and enforces every rule
//! of the [`Database`] contract. The file backend ([`crate::store`]) wraps it
//! and persists the result of each mutation.

use crate::database::{cmp_text, sort_members_by};
use crate::statistics::StatisticWindow;
use crate::{
    AdminInfo, BoatInfo, BoatStatistic, Colour, Database, Error, GroupId, GroupInfo,
    GroupStatistic, MemberId, MemberInfo, MemberStatistic, OutingDraft, OutingId, OutingInfo,
    Result, SortMode,
};
use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A member as stored; the group is resolved on read
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemberRecord {
    pub id: MemberId,
    pub surname: String,
    pub forename: String,
    pub date_of_birth: NaiveDate,
    pub group_id: GroupId,
}

/// Roster data: everything except outings
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClubData {
    #[serde(default)]
    pub boats: BTreeMap<String, BoatInfo>,
    #[serde(default)]
    pub groups: BTreeMap<GroupId, GroupInfo>,
    #[serde(default)]
    pub members: BTreeMap<MemberId, MemberRecord>,
    #[serde(default)]
    pub admins: BTreeMap<String, AdminInfo>,
    #[serde(default)]
    pub last_group_id: GroupId,
    #[serde(default)]
    pub last_member_id: MemberId,
}

/// Logbook backend kept entirely in memory
#[derive(Clone, Debug, Default)]
pub struct MemoryDatabase {
    club: ClubData,
    outings: BTreeMap<OutingId, OutingInfo>,
    reference_date: Option<NaiveDate>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a database from persisted parts
    pub fn from_parts(club: ClubData, outings: impl IntoIterator<Item = OutingInfo>) -> Self {
        Self {
            club,
            outings: outings.into_iter().map(|o| (o.id, o)).collect(),
            reference_date: None,
        }
    }

    /// Compute statistics relative to `date` instead of today
    pub fn with_reference_date(mut self, date: NaiveDate) -> Self {
        self.reference_date = Some(date);
        self
    }

    pub fn set_reference_date(&mut self, date: Option<NaiveDate>) {
        self.reference_date = date;
    }

    pub fn club(&self) -> &ClubData {
        &self.club
    }

    pub fn outing(&self, id: OutingId) -> Option<&OutingInfo> {
        self.outings.get(&id)
    }

    /// Every outing, oldest first
    pub fn all_outings(&self) -> impl Iterator<Item = &OutingInfo> {
        self.outings.values()
    }

    /// Outings in the given calendar year, in date order
    pub fn outings_in_year(&self, year: i32) -> Vec<OutingInfo> {
        let mut outings: Vec<_> = self
            .outings
            .values()
            .filter(|o| o.date.year() == year)
            .cloned()
            .collect();
        outings.sort_by(|a, b| (a.date, a.time_out, a.id).cmp(&(b.date, b.time_out, b.id)));
        outings
    }

    fn window(&self) -> StatisticWindow {
        match self.reference_date {
            Some(date) => StatisticWindow::for_date(date),
            None => StatisticWindow::current(),
        }
    }

    fn resolve_member(&self, record: &MemberRecord) -> Result<MemberInfo> {
        let group = self.club.groups.get(&record.group_id).ok_or_else(|| {
            Error::Database(format!(
                "member {} refers to missing group {}",
                record.id, record.group_id
            ))
        })?;
        Ok(MemberInfo {
            id: record.id,
            surname: record.surname.clone(),
            forename: record.forename.clone(),
            date_of_birth: record.date_of_birth,
            group: group.clone(),
        })
    }

    fn member_statistic(&self, member: MemberInfo) -> MemberStatistic {
        let statistic = self
            .window()
            .collect(self.outings.values(), |o| o.has_crew_member(member.id));
        MemberStatistic { member, statistic }
    }

    fn group_statistic(&self, group: GroupInfo) -> GroupStatistic {
        let members = &self.club.members;
        let statistic = self.window().collect(self.outings.values(), |o| {
            o.crew()
                .any(|id| members.get(&id).is_some_and(|m| m.group_id == group.id))
        });
        GroupStatistic { group, statistic }
    }

    fn boat_statistic(&self, boat: BoatInfo) -> BoatStatistic {
        let statistic = self
            .window()
            .collect(self.outings.values(), |o| o.boat_name == boat.name);
        BoatStatistic { boat, statistic }
    }

    fn check_member_unique(
        &self,
        id: Option<MemberId>,
        surname: &str,
        forename: &str,
        date_of_birth: NaiveDate,
    ) -> Result<()> {
        let clash = self.club.members.values().any(|m| {
            Some(m.id) != id
                && m.surname == surname
                && m.forename == forename
                && m.date_of_birth == date_of_birth
        });
        if clash {
            return Err(Error::exists(format!(
                "member '{}, {}' born {}",
                surname, forename, date_of_birth
            )));
        }
        Ok(())
    }

    fn check_group_exists(&self, group_id: GroupId) -> Result<()> {
        if !self.club.groups.contains_key(&group_id) {
            return Err(Error::illegal(format!("no group with id {}", group_id)));
        }
        Ok(())
    }

    fn check_group_name_unique(&self, id: Option<GroupId>, name: &str) -> Result<()> {
        if self
            .club
            .groups
            .values()
            .any(|g| Some(g.id) != id && g.name == name)
        {
            return Err(Error::exists(format!("group '{}'", name)));
        }
        Ok(())
    }

    fn claim_default(&mut self, id: GroupId) {
        for group in self.club.groups.values_mut() {
            if group.id != id && group.is_default {
                tracing::debug!("Group '{}' is no longer the default group", group.name);
                group.is_default = false;
            }
        }
    }

    fn validate_outing(&self, outing: &OutingDraft) -> Result<()> {
        let first = outing
            .rowers
            .first()
            .ok_or_else(|| Error::illegal("an outing needs at least one rower"))?;
        if !self.club.members.contains_key(first) {
            return Err(Error::illegal(format!("no member with id {}", first)));
        }

        let mut crew: Vec<MemberId> = outing
            .rowers
            .iter()
            .take(crate::MAX_ROWERS)
            .copied()
            .chain(outing.cox)
            .collect();
        if let Some(missing) = crew.iter().find(|id| !self.club.members.contains_key(*id)) {
            return Err(Error::illegal(format!("no member with id {}", missing)));
        }
        crew.sort_unstable();
        if crew.windows(2).any(|pair| pair[0] == pair[1]) {
            return Err(Error::illegal("a member appears twice in the crew"));
        }

        if !self.club.boats.contains_key(&outing.boat_name) {
            return Err(Error::illegal(format!("no boat named '{}'", outing.boat_name)));
        }
        Ok(())
    }

    fn next_outing_id(&self) -> OutingId {
        let now = Utc::now().timestamp_millis();
        match self.outings.keys().next_back() {
            Some(&last) if last >= now => last + 1,
            _ => now,
        }
    }
}

/// Trimmed `value`, or an error naming `field` when nothing is left
fn require<'a>(field: &str, value: &'a str) -> Result<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::illegal(format!("{} must not be empty", field)));
    }
    Ok(value)
}

impl Database for MemoryDatabase {
    fn add_boat(&mut self, name: &str, boat_type: Option<&str>, in_house: bool) -> Result<()> {
        let name = require("boat name", name)?;
        if self.club.boats.contains_key(name) {
            return Err(Error::exists(format!("boat '{}'", name)));
        }
        self.club.boats.insert(
            name.to_string(),
            BoatInfo {
                name: name.to_string(),
                boat_type: boat_type.map(str::to_string),
                in_house,
            },
        );
        tracing::debug!("Added boat '{}'", name);
        Ok(())
    }

    fn get_boat(&self, name: &str) -> Result<Option<BoatInfo>> {
        Ok(self.club.boats.get(name).cloned())
    }

    fn modify_boat(
        &mut self,
        old: &BoatInfo,
        name: &str,
        boat_type: Option<&str>,
        in_house: bool,
    ) -> Result<()> {
        let name = require("boat name", name)?;
        if !self.club.boats.contains_key(&old.name) {
            return Err(Error::illegal(format!("no boat named '{}'", old.name)));
        }
        if name != old.name && self.club.boats.contains_key(name) {
            return Err(Error::exists(format!("boat '{}'", name)));
        }

        self.club.boats.remove(&old.name);
        self.club.boats.insert(
            name.to_string(),
            BoatInfo {
                name: name.to_string(),
                boat_type: boat_type.map(str::to_string),
                in_house,
            },
        );

        if name != old.name {
            let mut moved = 0;
            for outing in self.outings.values_mut().filter(|o| o.boat_name == old.name) {
                outing.boat_name = name.to_string();
                moved += 1;
            }
            tracing::debug!("Renamed boat '{}' to '{}' ({} outings)", old.name, name, moved);
        }
        Ok(())
    }

    fn get_boats(&self) -> Result<Vec<BoatInfo>> {
        let mut boats: Vec<_> = self.club.boats.values().cloned().collect();
        boats.sort_by(|a, b| cmp_text(&a.name, &b.name));
        Ok(boats)
    }

    fn get_boat_statistic(&self, name: &str) -> Result<Option<BoatStatistic>> {
        Ok(self
            .club
            .boats
            .get(name)
            .cloned()
            .map(|boat| self.boat_statistic(boat)))
    }

    fn get_boats_statistics(&self) -> Result<Vec<BoatStatistic>> {
        Ok(self
            .get_boats()?
            .into_iter()
            .map(|boat| self.boat_statistic(boat))
            .collect())
    }

    fn add_member(
        &mut self,
        surname: &str,
        forename: Option<&str>,
        date_of_birth: NaiveDate,
        group_id: GroupId,
    ) -> Result<MemberId> {
        let surname = require("surname", surname)?;
        let forename = forename.map(str::trim).unwrap_or_default();
        self.check_group_exists(group_id)?;
        self.check_member_unique(None, surname, forename, date_of_birth)?;

        let id = self.club.last_member_id + 1;
        self.club.last_member_id = id;
        self.club.members.insert(
            id,
            MemberRecord {
                id,
                surname: surname.to_string(),
                forename: forename.to_string(),
                date_of_birth,
                group_id,
            },
        );
        tracing::debug!("Added member {} '{}'", id, surname);
        Ok(id)
    }

    fn get_member(&self, id: MemberId) -> Result<Option<MemberInfo>> {
        self.club
            .members
            .get(&id)
            .map(|record| self.resolve_member(record))
            .transpose()
    }

    fn modify_member(
        &mut self,
        id: MemberId,
        surname: &str,
        forename: Option<&str>,
        date_of_birth: NaiveDate,
        group_id: GroupId,
    ) -> Result<()> {
        let surname = require("surname", surname)?;
        let forename = forename.map(str::trim).unwrap_or_default();
        if !self.club.members.contains_key(&id) {
            return Err(Error::illegal(format!("no member with id {}", id)));
        }
        self.check_group_exists(group_id)?;
        self.check_member_unique(Some(id), surname, forename, date_of_birth)?;

        self.club.members.insert(
            id,
            MemberRecord {
                id,
                surname: surname.to_string(),
                forename: forename.to_string(),
                date_of_birth,
                group_id,
            },
        );
        Ok(())
    }

    fn get_members_sorted(&self, sorting: SortMode) -> Result<Vec<MemberInfo>> {
        let mut members = self
            .club
            .members
            .values()
            .map(|record| self.resolve_member(record))
            .collect::<Result<Vec<_>>>()?;
        sort_members_by(&mut members, sorting, |m| m);
        Ok(members)
    }

    fn get_member_statistics(&self, id: MemberId) -> Result<Option<MemberStatistic>> {
        Ok(self.get_member(id)?.map(|m| self.member_statistic(m)))
    }

    fn get_members_statistics_sorted(&self, sorting: SortMode) -> Result<Vec<MemberStatistic>> {
        Ok(self
            .get_members_sorted(sorting)?
            .into_iter()
            .map(|m| self.member_statistic(m))
            .collect())
    }

    fn add_group(
        &mut self,
        name: &str,
        description: Option<&str>,
        colour: Colour,
        is_default: bool,
    ) -> Result<GroupId> {
        let name = require("group name", name)?;
        self.check_group_name_unique(None, name)?;

        let id = self.club.last_group_id + 1;
        self.club.last_group_id = id;
        self.club.groups.insert(
            id,
            GroupInfo {
                id,
                name: name.to_string(),
                description: description.map(str::to_string),
                colour,
                is_default,
            },
        );
        if is_default {
            self.claim_default(id);
        }
        tracing::debug!("Added group {} '{}'", id, name);
        Ok(id)
    }

    fn modify_group(
        &mut self,
        id: GroupId,
        name: &str,
        description: Option<&str>,
        colour: Colour,
        is_default: bool,
    ) -> Result<()> {
        let name = require("group name", name)?;
        if !self.club.groups.contains_key(&id) {
            return Err(Error::illegal(format!("no group with id {}", id)));
        }
        self.check_group_name_unique(Some(id), name)?;

        self.club.groups.insert(
            id,
            GroupInfo {
                id,
                name: name.to_string(),
                description: description.map(str::to_string),
                colour,
                is_default,
            },
        );
        if is_default {
            self.claim_default(id);
        }
        Ok(())
    }

    fn get_group(&self, id: GroupId) -> Result<Option<GroupInfo>> {
        Ok(self.club.groups.get(&id).cloned())
    }

    fn get_groups(&self) -> Result<Vec<GroupInfo>> {
        let mut groups: Vec<_> = self.club.groups.values().cloned().collect();
        groups.sort_by(|a, b| cmp_text(&a.name, &b.name).then(a.id.cmp(&b.id)));
        Ok(groups)
    }

    fn get_group_statistic(&self, id: GroupId) -> Result<Option<GroupStatistic>> {
        Ok(self
            .club
            .groups
            .get(&id)
            .cloned()
            .map(|g| self.group_statistic(g)))
    }

    fn get_groups_statistics(&self) -> Result<Vec<GroupStatistic>> {
        Ok(self
            .get_groups()?
            .into_iter()
            .map(|g| self.group_statistic(g))
            .collect())
    }

    fn add_outing(&mut self, outing: OutingDraft) -> Result<OutingId> {
        self.validate_outing(&outing)?;
        let id = self.next_outing_id();
        self.outings.insert(id, outing.into_outing(id));
        tracing::debug!("Recorded outing {}", id);
        Ok(id)
    }

    fn get_outings(&self, date: NaiveDate) -> Result<Vec<OutingInfo>> {
        let mut outings: Vec<_> = self
            .outings
            .values()
            .filter(|o| o.date == date)
            .cloned()
            .collect();
        outings.sort_by(|a, b| (a.time_out, a.id).cmp(&(b.time_out, b.id)));
        Ok(outings)
    }

    fn modify_outing(&mut self, id: OutingId, outing: OutingDraft) -> Result<()> {
        if !self.outings.contains_key(&id) {
            return Err(Error::illegal(format!("no outing with id {}", id)));
        }
        self.validate_outing(&outing)?;
        self.outings.insert(id, outing.into_outing(id));
        Ok(())
    }

    fn add_admin(
        &mut self,
        username: &str,
        password: &str,
        name: &str,
        is_root: bool,
        comment: Option<&str>,
    ) -> Result<()> {
        let username = require("username", username)?;
        require("password", password)?;
        if self.club.admins.contains_key(username) {
            return Err(Error::exists(format!("admin '{}'", username)));
        }
        self.club.admins.insert(
            username.to_string(),
            AdminInfo {
                username: username.to_string(),
                password: password.to_string(),
                name: name.to_string(),
                is_root,
                comment: comment.map(str::to_string),
            },
        );
        tracing::debug!("Added admin '{}'", username);
        Ok(())
    }

    fn get_admin(&self, username: &str) -> Result<Option<AdminInfo>> {
        Ok(self.club.admins.get(username).cloned())
    }

    fn get_admins(&self) -> Result<Vec<AdminInfo>> {
        let mut admins: Vec<_> = self.club.admins.values().cloned().collect();
        admins.sort_by(|a, b| cmp_text(&a.username, &b.username));
        Ok(admins)
    }
}
