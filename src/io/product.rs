//! Acquisition date and platform extraction from product names.

use chrono::{Datelike, NaiveDate};
use regex::Regex;

use crate::core::constants::{DatestringConvention, SensorProfile};
use crate::core::radiometry;

/// Acquisition date encoded in a product name.
///
/// `Nss` reads the `D<yy><ddd>` field of NOAA CLASS level-1b names (years
/// from 70 on are 19yy); `Compact` takes the first `YYYYMMDD` run that is a
/// real calendar date.
pub fn parse_product_date(name: &str, convention: DatestringConvention) -> Option<NaiveDate> {
    match convention {
        DatestringConvention::Nss => {
            let re = Regex::new(r"(?:^|\.)D(\d{2})(\d{3})(?:\.|$)").ok()?;
            let caps = re.captures(name)?;
            let yy: i32 = caps[1].parse().ok()?;
            let doy: u32 = caps[2].parse().ok()?;
            let year = if yy >= 70 { 1900 + yy } else { 2000 + yy };
            NaiveDate::from_yo_opt(year, doy)
        }
        DatestringConvention::Compact => {
            let re = Regex::new(r"(\d{4})(\d{2})(\d{2})").ok()?;
            let found = re.captures_iter(name).find_map(|caps| {
                let year: i32 = caps[1].parse().ok()?;
                let month: u32 = caps[2].parse().ok()?;
                let day: u32 = caps[3].parse().ok()?;
                NaiveDate::from_ymd_opt(year, month, day)
            });
            found
        }
    }
}

/// Built-in profile id of the platform named in a product
/// (`NSS.GHRR.NJ...` or EUMETSAT `..._M02_...`)
pub fn parse_platform(name: &str) -> Option<&'static str> {
    let nss = Regex::new(r"NSS\.[A-Z]{4}\.([A-Z0-9]{2})\.").ok()?;
    if let Some(caps) = nss.captures(name) {
        return SensorProfile::nss_profile_id(&caps[1]);
    }
    let eps = Regex::new(r"_(M0[12])_").ok()?;
    let id = eps.captures(name).and_then(|caps| match &caps[1] {
        "M02" => Some("METOPA"),
        "M01" => Some("METOPB"),
        _ => None,
    });
    id
}

/// Date-derived values of one product
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProductDate {
    pub date: NaiveDate,
    pub day_of_year: u32,
    /// Earth-sun distance correction
    pub distance_correction: f64,
}

impl ProductDate {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            day_of_year: date.ordinal(),
            distance_correction: radiometry::distance_correction_for_date(date),
        }
    }

    pub fn from_name(name: &str, profile: &SensorProfile) -> Option<Self> {
        let parsed = parse_product_date(name, profile.datestring).map(Self::new);
        if parsed.is_none() {
            log::warn!("No {:?} datestring in product name '{}'", profile.datestring, name);
        }
        parsed
    }
}
