// src/gps/nmea.rs
//! NMEA sentence parsing

use super::data::FixState;
use chrono::{Duration, NaiveDate, NaiveTime, TimeZone, Utc};

const KNOTS_TO_MPS: f64 = 0.514_444;

/// Parse a single NMEA sentence and update the fix state.
///
/// Returns true when the sentence carried a position, i.e. when a new sample
/// may be emitted from the state.
pub fn parse_nmea_sentence(state: &mut FixState, line: &str) -> bool {
    if !checksum_ok(line) {
        return false;
    }

    let body = line.split('*').next().unwrap_or(line);
    let parts: Vec<&str> = body.split(',').collect();

    if line.starts_with("$GPGGA") || line.starts_with("$GNGGA") {
        parse_gga(state, &parts)
    } else if line.starts_with("$GPRMC") || line.starts_with("$GNRMC") {
        parse_rmc(state, &parts)
    } else {
        false
    }
}

/// Verify the `*hh` checksum when present. Sentences without one are accepted.
pub fn checksum_ok(line: &str) -> bool {
    let Some(stripped) = line.strip_prefix('$') else {
        return false;
    };
    let Some((payload, checksum)) = stripped.split_once('*') else {
        return true;
    };
    let Ok(expected) = u8::from_str_radix(checksum.trim(), 16) else {
        return false;
    };
    payload.bytes().fold(0u8, |acc, b| acc ^ b) == expected
}

/// Convert ddmm.mmmm plus hemisphere into signed decimal degrees
fn parse_coordinate(value: &str, hemisphere: &str) -> Option<f64> {
    if value.is_empty() || hemisphere.is_empty() {
        return None;
    }
    let raw = value.parse::<f64>().ok()?;
    let degrees = (raw / 100.0).trunc();
    let minutes = raw - degrees * 100.0;
    let decimal = degrees + minutes / 60.0;
    match hemisphere {
        "S" | "W" => Some(-decimal),
        "N" | "E" => Some(decimal),
        _ => None,
    }
}

/// Parse hhmmss(.sss)
fn parse_time(value: &str) -> Option<NaiveTime> {
    if value.len() < 6 {
        return None;
    }
    let hours = value.get(0..2)?.parse::<u32>().ok()?;
    let minutes = value.get(2..4)?.parse::<u32>().ok()?;
    let seconds = value.get(4..)?.parse::<f64>().ok()?;
    let millis = ((seconds.fract()) * 1000.0).round() as u32;
    NaiveTime::from_hms_milli_opt(hours, minutes, seconds.trunc() as u32, millis.min(999))
}

/// Parse ddmmyy
fn parse_date(value: &str) -> Option<NaiveDate> {
    if value.len() != 6 {
        return None;
    }
    let day = value.get(0..2)?.parse::<u32>().ok()?;
    let month = value.get(2..4)?.parse::<u32>().ok()?;
    let year = value.get(4..6)?.parse::<i32>().ok()?;
    let century = if year < 80 { 2000 } else { 1900 };
    NaiveDate::from_ymd_opt(century + year, month, day)
}

/// Combine a time of day with the last known date.
///
/// A time far behind the previous fix means midnight UTC passed before the next
/// RMC brought the new date, so the date is carried forward a day.
fn update_fix_time(state: &mut FixState, time: &str) {
    let Some(time) = parse_time(time) else {
        return;
    };
    let date = state.fix_date.unwrap_or_else(|| Utc::now().date_naive());
    let mut fix_time = Utc.from_utc_datetime(&date.and_time(time));

    if let Some(previous) = state.fix_time {
        if previous - fix_time > Duration::hours(12) {
            fix_time += Duration::days(1);
            if state.fix_date.is_some() {
                state.fix_date = Some(fix_time.date_naive());
            }
        }
    }
    state.fix_time = Some(fix_time);
}

/// Parse GGA (Global Positioning System Fix Data) sentence
fn parse_gga(state: &mut FixState, parts: &[&str]) -> bool {
    if parts.len() < 10 {
        return false;
    }

    // Fix quality (field 6)
    state.fix_quality = parts[6].parse::<u8>().ok();

    // Number of satellites (field 7)
    state.satellites = parts[7].parse::<u8>().ok();

    // HDOP (field 8)
    state.hdop = parts[8].parse::<f64>().ok();

    // Altitude (field 9)
    state.altitude = parts[9].parse::<f64>().ok();

    let latitude = parse_coordinate(parts[2], parts[3]);
    let longitude = parse_coordinate(parts[4], parts[5]);
    if latitude.is_none() || longitude.is_none() {
        return false;
    }

    update_fix_time(state, parts[1]);
    state.latitude = latitude;
    state.longitude = longitude;
    true
}

/// Parse RMC (Recommended Minimum Course) sentence
fn parse_rmc(state: &mut FixState, parts: &[&str]) -> bool {
    if parts.len() < 10 {
        return false;
    }

    if let Some(date) = parse_date(parts[9]) {
        state.fix_date = Some(date);
    }

    // Status 'V' means the receiver has no valid fix
    if parts[2] != "A" {
        return false;
    }

    // Speed over ground in knots (field 7)
    state.speed = parts[7].parse::<f64>().ok().map(|knots| knots * KNOTS_TO_MPS);

    let latitude = parse_coordinate(parts[3], parts[4]);
    let longitude = parse_coordinate(parts[5], parts[6]);
    if latitude.is_none() || longitude.is_none() {
        return false;
    }

    update_fix_time(state, parts[1]);
    state.latitude = latitude;
    state.longitude = longitude;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_gga_parsing() {
        let mut state = FixState::new();
        let gga = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47";

        assert!(parse_nmea_sentence(&mut state, gga));

        assert!((state.latitude.unwrap() - 48.1173).abs() < 0.0001);
        assert!((state.longitude.unwrap() - 11.5167).abs() < 0.0001);
        assert_eq!(state.satellites, Some(8));
        assert_eq!(state.hdop, Some(0.9));
        assert_eq!(state.altitude, Some(545.4));
        assert_eq!(state.fix_quality, Some(1));
        assert!(state.has_fix());
    }

    #[test]
    fn test_rmc_parsing() {
        let mut state = FixState::new();
        let rmc = "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A";

        assert!(parse_nmea_sentence(&mut state, rmc));

        // 22.4 knots is about 11.52 m/s
        assert!((state.speed.unwrap() - 11.52).abs() < 0.01);
        let fix_time = state.fix_time.unwrap();
        assert_eq!(fix_time.year(), 1994);
        assert_eq!(fix_time.hour(), 12);
        assert_eq!(fix_time.second(), 19);
    }

    #[test]
    fn test_time_after_midnight_rolls_date_forward() {
        let mut state = FixState::new();
        state.fix_date = NaiveDate::from_ymd_opt(2026, 10, 15);

        update_fix_time(&mut state, "235959");
        let before = state.fix_time.unwrap();
        update_fix_time(&mut state, "000001");
        let after = state.fix_time.unwrap();

        assert_eq!(after - before, Duration::seconds(2));
        assert_eq!(after.day(), 16);
        assert_eq!(state.fix_date, NaiveDate::from_ymd_opt(2026, 10, 16));

        // A later GGA on the new day keeps counting forward
        update_fix_time(&mut state, "000005");
        assert_eq!(state.fix_time.unwrap() - after, Duration::seconds(4));
    }

    #[test]
    fn test_no_fix_gga() {
        let mut state = FixState::new();
        let gga = "$GPGGA,123520,4807.038,N,01131.000,E,0,00,,,M,,M,,*58";

        assert!(parse_nmea_sentence(&mut state, gga));
        assert!(!state.has_fix());
        assert!(state.to_sample().is_none());
    }

    #[test]
    fn test_bad_checksum_ignored() {
        let mut state = FixState::new();
        let gga = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*00";

        assert!(!parse_nmea_sentence(&mut state, gga));
        assert!(state.latitude.is_none());
    }

    #[test]
    fn test_southern_western_hemisphere() {
        assert!((parse_coordinate("3352.000", "S").unwrap() + 33.8667).abs() < 0.0001);
        assert!((parse_coordinate("15112.000", "W").unwrap() + 151.2).abs() < 0.0001);
        assert!(parse_coordinate("3352.000", "").is_none());
    }

    #[test]
    fn test_invalid_sentence() {
        let mut state = FixState::new();
        let invalid = "$INVALID,123,456";

        assert!(!parse_nmea_sentence(&mut state, invalid));

        // Should not crash and should not set any values
        assert!(state.latitude.is_none());
        assert!(state.longitude.is_none());
    }
}
