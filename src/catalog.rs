use crate::candidate::CandidateProduct;
use crate::error::{EtlError, EtlResult};
use anyhow::Result;
use chrono::{Datelike, Days, NaiveDate};
use geo::MultiPolygon;

/// Acquisition dates and cloud cover accepted by a catalog query.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub cloud_cover: (f64, f64),
}

impl SearchWindow {
    pub fn new(start: NaiveDate, end: NaiveDate, cloud_cover: (f64, f64)) -> EtlResult<Self> {
        if end < start {
            return Err(EtlError::Configuration(format!(
                "end date {end} is before start date {start}"
            )));
        }
        let (min, max) = cloud_cover;
        if !(0.0..=100.0).contains(&min) || !(0.0..=100.0).contains(&max) || min > max {
            return Err(EtlError::Configuration(format!(
                "invalid cloud cover range [{min}, {max}]"
            )));
        }
        Ok(Self {
            start,
            end,
            cloud_cover,
        })
    }

    /// The 30 days before the first day of the month containing `today`.
    pub fn previous_month(today: NaiveDate, cloud_cover: (f64, f64)) -> EtlResult<Self> {
        let end = today.with_day0(0).unwrap_or(today);
        let start = end.checked_sub_days(Days::new(30)).unwrap_or(end);
        Self::new(start, end, cloud_cover)
    }

    /// Interval in the `start/end` form of a STAC `datetime` filter.
    pub fn datetime_interval(&self) -> String {
        format!(
            "{}T00:00:00Z/{}T23:59:59Z",
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d")
        )
    }
}

pub trait Catalog {
    /// Products whose footprint intersects `footprint`, in catalog order.
    async fn query(
        &self,
        footprint: &MultiPolygon<f64>,
        window: &SearchWindow,
    ) -> Result<Vec<CandidateProduct>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_previous_month_window() {
        let window = SearchWindow::previous_month(date(2024, 5, 17), (0.0, 30.0)).unwrap();
        assert_eq!(window.end, date(2024, 5, 1));
        assert_eq!(window.start, date(2024, 4, 1));
    }

    #[test]
    fn test_datetime_interval() {
        let window = SearchWindow::new(date(2024, 4, 1), date(2024, 5, 1), (0.0, 30.0)).unwrap();
        assert_eq!(
            window.datetime_interval(),
            "2024-04-01T00:00:00Z/2024-05-01T23:59:59Z"
        );
    }

    #[test]
    fn test_rejects_bad_windows() {
        assert!(SearchWindow::new(date(2024, 5, 1), date(2024, 4, 1), (0.0, 30.0)).is_err());
        assert!(SearchWindow::new(date(2024, 4, 1), date(2024, 5, 1), (40.0, 30.0)).is_err());
        assert!(SearchWindow::new(date(2024, 4, 1), date(2024, 5, 1), (0.0, 130.0)).is_err());
    }
}
