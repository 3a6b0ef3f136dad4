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

use crate::calc;
use crate::metrics::{GaugeVec, StationMetrics};
use crate::report::{Fields, ReportError};
use prometheus_client::encoding::EncodeLabelSet;
use std::any::Any;
use std::fmt::Debug;
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};

/// Number of auxiliary temperature, humidity, and soil sensors a station can report.
const NUM_SLOTS: usize = 10;

const RAIN_PERIODS: [(&str, &str); 7] = [
    ("hourlyrainin", "hourly"),
    ("dailyrainin", "daily"),
    ("weeklyrainin", "weekly"),
    ("monthlyrainin", "monthly"),
    ("yearlyrainin", "yearly"),
    ("totalrainin", "total"),
    ("eventrainin", "event"),
];

/// Sets metrics from the fields of weather station reports.
#[derive(Debug)]
pub struct Translator {
    metrics: StationMetrics,
    verbose: bool,
}

impl Translator {
    pub fn new(metrics: StationMetrics, verbose: bool) -> Self {
        Translator { metrics, verbose }
    }

    pub fn metrics(&self) -> &StationMetrics {
        &self.metrics
    }

    /// Update metrics from a single report sent by the station at `remote_address`.
    ///
    /// Fields that are missing or can't be parsed leave their metric unchanged, except for
    /// numbered sensors: when those stop being reported, their metrics are removed. This
    /// method never panics, any unexpected failure is logged and the report is dropped.
    pub fn translate(&self, remote_address: &str, fields: &Fields) {
        let res = panic::catch_unwind(AssertUnwindSafe(|| self.apply(remote_address, fields)));
        if let Err(e) = res {
            tracing::error!(
                message = "failed to translate weather station report",
                remote_address = %remote_address,
                error = %panic_message(e.as_ref()),
            );
        }
    }

    fn apply(&self, remote_address: &str, fields: &Fields) {
        self.numbered_sensors(remote_address, fields);

        let m = &self.metrics;
        self.set(
            &m.temperature,
            &m.sensor_labels(remote_address, "indoor"),
            fields.number("tempinf"),
        );

        self.outdoor(remote_address, fields);
        self.scalars(remote_address, fields);
        self.station_type(remote_address, fields);
    }

    fn numbered_sensors(&self, remote_address: &str, fields: &Fields) {
        let m = &self.metrics;

        for i in 1..=NUM_SLOTS {
            let slot = i.to_string();
            let temp_field = format!("temp{}f", i);
            if fields.contains(&temp_field) {
                let labels = m.sensor_labels(remote_address, &slot);
                self.set(&m.temperature, &labels, fields.number(&temp_field));
                self.set(&m.battery, &labels, fields.number(&format!("batt{}", i)));
            } else {
                m.remove_sensor(&m.battery, &slot);
                m.remove_sensor(&m.temperature, &slot);
            }

            let soil = format!("soil{}", i);
            let soil_field = format!("soilhum{}", i);
            if fields.contains(&soil_field) {
                let labels = m.sensor_labels(remote_address, &soil);
                self.set(&m.humidity, &labels, fields.number(&soil_field));
                self.set(&m.battery, &labels, fields.number(&format!("battsm{}", i)));
            } else {
                m.remove_sensor(&m.humidity, &soil);
                m.remove_sensor(&m.battery, &soil);
            }

            let humidity_field = format!("humidity{}", i);
            if fields.contains(&humidity_field) {
                let labels = m.sensor_labels(remote_address, &slot);
                self.set(&m.humidity, &labels, fields.number(&humidity_field));
            } else {
                m.remove_sensor(&m.humidity, &slot);
            }
        }
    }

    /// Outdoor temperature and everything derived from it. Nothing is set unless `tempf`
    /// can be parsed.
    fn outdoor(&self, remote_address: &str, fields: &Fields) {
        let m = &self.metrics;
        let temp_f = match self.value(fields.number("tempf")) {
            Some(v) => v,
            None => return,
        };

        m.temperature
            .set(&m.sensor_labels(remote_address, "outdoor"), temp_f);
        let mut feels_like = temp_f;

        if let Some(wind_speed) = self.value(fields.number("windspeedmph")) {
            m.wind_speed
                .set(&m.type_labels(remote_address, "sustained"), wind_speed);
            if temp_f <= 40.0 {
                feels_like = calc::wind_chill(temp_f, wind_speed);
            }
        }

        if let Some(humidity) = self.value(fields.number("humidity")) {
            m.humidity
                .set(&m.sensor_labels(remote_address, "outdoor"), humidity);
            m.temperature.set(
                &m.sensor_labels(remote_address, "dewpoint"),
                calc::dew_point(temp_f, humidity),
            );
            if temp_f >= 80.0 {
                feels_like = calc::heat_index(temp_f, humidity);
            }
        }

        m.temperature
            .set(&m.sensor_labels(remote_address, "feelsLike"), feels_like);
    }

    fn scalars(&self, remote_address: &str, fields: &Fields) {
        let m = &self.metrics;

        self.set(&m.battery, &m.sensor_labels(remote_address, "outdoor"), fields.number("battout"));
        self.set(&m.battery, &m.sensor_labels(remote_address, "indoor"), fields.number("battin"));
        self.set(
            &m.battery,
            &m.sensor_labels(remote_address, "lightning"),
            fields.number("batt_lightning"),
        );
        self.set(&m.humidity, &m.sensor_labels(remote_address, "indoor"), fields.number("humidityin"));
        self.set(&m.barometer, &m.type_labels(remote_address, "relative"), fields.number("baromrelin"));
        self.set(&m.barometer, &m.type_labels(remote_address, "absolute"), fields.number("baromabsin"));
        self.set(&m.wind_dir, &m.period_labels(remote_address, "current"), fields.number("winddir"));
        self.set(
            &m.wind_dir,
            &m.period_labels(remote_address, "avg10m"),
            fields.number("winddir_avg10m"),
        );
        self.set(&m.wind_speed, &m.type_labels(remote_address, "gusts"), fields.number("windgustmph"));
        self.set(
            &m.solar_radiation,
            &m.station_labels(remote_address),
            fields.number("solarradiation"),
        );

        for (field, period) in RAIN_PERIODS {
            self.set(&m.rain, &m.period_labels(remote_address, period), fields.number(field));
        }

        self.set(&m.ultraviolet, &m.station_labels(remote_address), fields.number("uv"));
        self.set(
            &m.lightning_strikes,
            &m.period_labels(remote_address, "day"),
            fields.number("lightning_day"),
        );
        self.set(
            &m.lightning_distance,
            &m.station_labels(remote_address),
            fields.number("lightning_distance"),
        );
        self.set(
            &m.lightning_last_strike,
            &m.station_labels(remote_address),
            fields.number("lightning_time"),
        );
    }

    fn station_type(&self, remote_address: &str, fields: &Fields) {
        if let Ok(station_type) = fields.string("stationtype") {
            let m = &self.metrics;
            m.station_type
                .set(&m.type_labels(remote_address, &station_type), 1.0);
        }
    }

    fn set<L>(&self, gauge: &GaugeVec<L>, labels: &L, value: Result<f64, ReportError>)
    where
        L: EncodeLabelSet + Clone + Debug + Hash + Eq + Send + Sync + 'static,
    {
        if let Some(v) = self.value(value) {
            gauge.set(labels, v);
        }
    }

    fn value(&self, value: Result<f64, ReportError>) -> Option<f64> {
        match value {
            Ok(v) => Some(v),
            Err(ReportError::MissingField(_)) => None,
            Err(e) => {
                if self.verbose {
                    tracing::warn!(message = "failed to parse report field", error = %e);
                }
                None
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}
