//! Year-over-year outing statistics.
//!
//! Counts cover the calendar year of a reference date and the year before.

use crate::{OutingInfo, Statistic};
use chrono::{Datelike, Local, NaiveDate};

/// Calendar years a statistic is computed for
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatisticWindow {
    this_year: i32,
}

impl StatisticWindow {
    /// Window around the given reference date
    pub fn for_date(date: NaiveDate) -> Self {
        Self {
            this_year: date.year(),
        }
    }

    /// Window around today (local time)
    pub fn current() -> Self {
        Self::for_date(Local::now().date_naive())
    }

    pub fn this_year(&self) -> i32 {
        self.this_year
    }

    /// Sum the outings accepted by `include`
    pub fn collect<'a, I, F>(&self, outings: I, mut include: F) -> Statistic
    where
        I: IntoIterator<Item = &'a OutingInfo>,
        F: FnMut(&OutingInfo) -> bool,
    {
        let mut stat = Statistic::default();
        for outing in outings {
            let year = outing.date.year();
            if year != self.this_year && year != self.this_year - 1 {
                continue;
            }
            if !include(outing) {
                continue;
            }
            if year == self.this_year {
                stat.this_year_outings += 1;
                stat.this_year_km = stat.this_year_km.saturating_add(outing.distance);
            } else {
                stat.last_year_outings += 1;
                stat.last_year_km = stat.last_year_km.saturating_add(outing.distance);
            }
        }
        stat
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn outing(id: i64, date: (i32, u32, u32), boat: &str, rowers: Vec<u32>, km: u32) -> OutingInfo {
        OutingInfo {
            id,
            date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            rowers,
            cox: None,
            time_out: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            time_in: None,
            comment: None,
            destination: None,
            boat_name: boat.into(),
            distance: km,
        }
    }

    #[test]
    fn test_counts_split_by_year() {
        let outings = vec![
            outing(1, (2024, 3, 1), "Nixe", vec![1], 10),
            outing(2, (2024, 7, 9), "Nixe", vec![1, 2], 14),
            outing(3, (2023, 12, 31), "Nixe", vec![2], 8),
            outing(4, (2022, 6, 1), "Nixe", vec![1], 20),
            outing(5, (2024, 8, 2), "Undine", vec![1], 5),
        ];
        let window = StatisticWindow::for_date(NaiveDate::from_ymd_opt(2024, 9, 1).unwrap());

        let nixe = window.collect(&outings, |o| o.boat_name == "Nixe");
        assert_eq!(nixe, Statistic::new(2, 24, 1, 8));

        let member_one = window.collect(&outings, |o| o.has_crew_member(1));
        assert_eq!(member_one, Statistic::new(3, 29, 0, 0));
    }

    #[test]
    fn test_empty_input() {
        let window = StatisticWindow::for_date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(window.collect(&Vec::<OutingInfo>::new(), |_| true), Statistic::default());
        assert_eq!(window.this_year(), 2024);
    }
}
