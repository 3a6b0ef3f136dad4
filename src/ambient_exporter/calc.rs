// ambient_exporter - Prometheus metrics exporter for Ambient Weather stations
//
// Copyright 2024 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

//! Derived temperatures. All temperatures are in fahrenheit.

const WIND_CHILL_MAX_TEMP: f64 = 40.0;
const WIND_CHILL_MIN_SPEED: f64 = 5.0;
const HEAT_INDEX_MIN_TEMP: f64 = 80.0;

/// Temperature with wind chill applied, given wind speed in miles per hour.
///
/// The formula is only valid at or below 40°F with a wind speed of at least 5mph. Outside
/// of that range the temperature is returned unchanged.
pub fn wind_chill(temp_f: f64, wind_speed_mph: f64) -> f64 {
    if temp_f > WIND_CHILL_MAX_TEMP || wind_speed_mph < WIND_CHILL_MIN_SPEED {
        return temp_f;
    }

    let wind_exp = wind_speed_mph.powf(0.16);
    35.74 + (0.6215 * temp_f) - (35.75 * wind_exp) + (0.4275 * temp_f * wind_exp)
}

/// Heat index given relative humidity (0-100).
///
/// See <https://www.wpc.ncep.noaa.gov/html/heatindex_equation.shtml>
pub fn heat_index(temp_f: f64, rh: f64) -> f64 {
    if temp_f < HEAT_INDEX_MIN_TEMP {
        return temp_f;
    }

    let simple = 0.5 * (temp_f + 61.0 + ((temp_f - 68.0) * 1.2) + (rh * 0.094));
    if simple < HEAT_INDEX_MIN_TEMP {
        return simple;
    }

    let hi = -42.379 + 2.04901523 * temp_f + 10.14333127 * rh
        - 0.22475541 * temp_f * rh
        - 0.00683783 * temp_f * temp_f
        - 0.05481717 * rh * rh
        + 0.00122874 * temp_f * temp_f * rh
        + 0.00085282 * temp_f * rh * rh
        - 0.00000199 * temp_f * temp_f * rh * rh;

    if rh < 13.0 && (80.0..=112.0).contains(&temp_f) {
        hi - ((13.0 - rh) / 4.0) * ((17.0 - (temp_f - 95.0).abs()) / 17.0).sqrt()
    } else if rh > 85.0 && (80.0..=87.0).contains(&temp_f) {
        hi + ((rh - 85.0) / 10.0) * ((87.0 - temp_f) / 5.0)
    } else {
        hi
    }
}

/// Dew point given relative humidity (0-100), using the Magnus approximation.
pub fn dew_point(temp_f: f64, rh: f64) -> f64 {
    const A: f64 = 17.625;
    const B: f64 = 243.04;

    let temp_c = (temp_f - 32.0) * 5.0 / 9.0;
    let alpha = (rh / 100.0).ln() + ((A * temp_c) / (B + temp_c));
    (B * alpha / (A - alpha)) * 9.0 / 5.0 + 32.0
}

#[cfg(test)]
mod tests {
    use super::{dew_point, heat_index, wind_chill};

    fn assert_near(expected: f64, actual: f64, tolerance: f64) {
        assert!(
            (expected - actual).abs() <= tolerance,
            "expected {} +/- {}, got {}",
            expected,
            tolerance,
            actual
        );
    }

    #[test]
    fn test_wind_chill_too_warm() {
        assert_eq!(45.0, wind_chill(45.0, 10.0));
    }

    #[test]
    fn test_wind_chill_too_calm() {
        assert_eq!(30.0, wind_chill(30.0, 4.9));
    }

    #[test]
    fn test_wind_chill_applied() {
        assert_near(21.25, wind_chill(30.0, 10.0), 0.01);
        assert_near(-22.0, wind_chill(0.0, 20.0), 0.01);
    }

    #[test]
    fn test_wind_chill_at_threshold() {
        assert!(wind_chill(40.0, 5.0) < 40.0);
    }

    #[test]
    fn test_heat_index_too_cool() {
        assert_eq!(75.0, heat_index(75.0, 90.0));
    }

    #[test]
    fn test_heat_index_simple() {
        assert_near(79.58, heat_index(80.0, 40.0), 0.001);
    }

    #[test]
    fn test_heat_index_regression() {
        assert_near(96.81, heat_index(85.0, 80.0), 0.01);
    }

    #[test]
    fn test_heat_index_low_humidity_adjustment() {
        assert_near(94.12, heat_index(100.0, 10.0), 0.01);
    }

    #[test]
    fn test_heat_index_high_humidity_adjustment() {
        assert_near(91.99, heat_index(82.0, 90.0), 0.01);
    }

    #[test]
    fn test_dew_point() {
        assert_near(50.6, dew_point(70.0, 50.0), 0.2);
        assert_near(78.14, dew_point(85.0, 80.0), 0.01);
    }

    #[test]
    fn test_dew_point_saturated() {
        assert_near(60.0, dew_point(60.0, 100.0), 0.0001);
    }
}
