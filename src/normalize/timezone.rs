// src/normalize/timezone.rs
//! Wall-clock conversion between IANA zones for calendar times like `3:00am`.

use anyhow::{anyhow, Result};
use chrono::{LocalResult, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use metrics::counter;

/// Times the calendar shows instead of a clock reading.
const NON_CLOCK_TIMES: [&str; 2] = ["all day", "tentative"];

/// Input layout: `dd/mm/yyyy h:mma`, e.g. `01/06/2025 3:00am`.
const SOURCE_FORMAT: &str = "%d/%m/%Y %I:%M%p";
const TARGET_FORMAT: &str = "%H:%M";

pub fn parse_zone(name: &str) -> Result<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|e| anyhow!("unknown timezone '{}': {e}", name.trim()))
}

pub fn is_non_clock_time(time: &str) -> bool {
    let t = time.trim();
    NON_CLOCK_TIMES.iter().any(|s| s.eq_ignore_ascii_case(t))
}

/// Convert `time` on `date` from `from` to `to`, formatted as 24-hour `HH:MM`.
///
/// Never fails: empty inputs and non-clock sentinels come back untouched, and
/// anything unparseable is logged and returned as-is.
pub fn convert_time_zone(date: &str, time: &str, from: Tz, to: Tz) -> String {
    if date.is_empty() || time.is_empty() {
        return time.to_string();
    }
    if is_non_clock_time(time) {
        return time.to_string();
    }

    match try_convert(date, time, from, to) {
        Ok(converted) => converted,
        Err(e) => {
            tracing::warn!(target: "normalize", %date, %time, error = %e, "time conversion failed");
            counter!("tz_convert_failures_total").increment(1);
            time.to_string()
        }
    }
}

fn try_convert(date: &str, time: &str, from: Tz, to: Tz) -> Result<String> {
    let naive = NaiveDateTime::parse_from_str(&format!("{date} {time}"), SOURCE_FORMAT)?;

    // Ambiguous fall-back hour resolves to standard time.
    let local = match from.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(_, standard) => standard,
        LocalResult::None => return Err(anyhow!("{naive} does not exist in {from}")),
    };

    Ok(local.with_timezone(&to).format(TARGET_FORMAT).to_string())
}

/// Source/target pair used by the row normalizer.
#[derive(Debug, Clone, Copy)]
pub struct ZonePair {
    pub source: Tz,
    /// `None` keeps the scraped time as-is.
    pub target: Option<Tz>,
}

impl ZonePair {
    pub fn convert(&self, date: &str, time: &str) -> String {
        match self.target {
            Some(target) => convert_time_zone(date, time, self.source, target),
            None => time.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn berlin() -> Tz {
        parse_zone("Europe/Berlin").unwrap()
    }

    fn new_york() -> Tz {
        parse_zone("America/New_York").unwrap()
    }

    #[test]
    fn berlin_morning_is_previous_evening_in_new_york() {
        // CEST (+2) → EDT (-4)
        assert_eq!(
            convert_time_zone("01/06/2025", "3:00am", berlin(), new_york()),
            "21:00"
        );
        assert_eq!(
            convert_time_zone("15/01/2025", "2:30pm", berlin(), new_york()),
            "08:30"
        );
    }

    #[test]
    fn uppercase_meridiem_and_padded_hour_parse() {
        assert_eq!(
            convert_time_zone("01/06/2025", "03:15PM", berlin(), berlin()),
            "15:15"
        );
    }

    #[test]
    fn non_clock_sentinels_pass_through_any_case() {
        for t in ["All Day", "all day", "TENTATIVE", "Tentative"] {
            assert_eq!(convert_time_zone("01/06/2025", t, berlin(), new_york()), t);
        }
    }

    #[test]
    fn empty_inputs_return_time_unchanged() {
        assert_eq!(convert_time_zone("", "3:00am", berlin(), new_york()), "3:00am");
        assert_eq!(convert_time_zone("01/06/2025", "", berlin(), new_york()), "");
    }

    #[test]
    fn garbage_is_returned_verbatim() {
        assert_eq!(
            convert_time_zone("01/06/2025", "Day 2", berlin(), new_york()),
            "Day 2"
        );
        assert_eq!(
            convert_time_zone("31/02/2025", "3:00am", berlin(), new_york()),
            "3:00am"
        );
    }

    #[test]
    fn converted_time_maps_back_to_the_same_instant() {
        let out = convert_time_zone("10/03/2025", "9:45am", berlin(), new_york());
        let back_naive = NaiveDateTime::new(
            chrono::NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            NaiveTime::parse_from_str(&out, TARGET_FORMAT).unwrap(),
        );
        let back = new_york()
            .from_local_datetime(&back_naive)
            .single()
            .unwrap()
            .with_timezone(&berlin());
        assert_eq!(back.format("%H:%M").to_string(), "09:45");
    }

    #[test]
    fn zone_pair_without_target_keeps_time() {
        let zones = ZonePair {
            source: berlin(),
            target: None,
        };
        assert_eq!(zones.convert("01/06/2025", "3:00am"), "3:00am");
    }

    #[test]
    fn unknown_zone_name_is_an_error() {
        assert!(parse_zone("Mars/Olympus").is_err());
    }
}
