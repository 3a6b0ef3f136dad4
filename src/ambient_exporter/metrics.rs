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

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::AtomicU64;
use std::sync::{Mutex, PoisonError};

/// Labels for metrics that come from a particular sensor (indoor, outdoor, numbered, soil).
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct SensorLabels {
    pub remote_address: String,
    pub name: String,
    pub sensor: String,
}

/// Labels for metrics reported over a particular period (hourly, daily, avg10m, etc.).
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct PeriodLabels {
    pub remote_address: String,
    pub name: String,
    pub period: String,
}

/// Labels for metrics that only identify the station.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct StationLabels {
    pub remote_address: String,
    pub name: String,
}

/// Labels for metrics with a `type` discriminator (barometer, wind speed, station type).
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct TypeLabels {
    pub remote_address: String,
    pub name: String,
    pub r#type: String,
}

/// A family of `f64` gauges that supports removing series by partial label match.
///
/// Every series that has been set is tracked so that series can be found and removed
/// later without knowing every label value (e.g. the remote address a sensor last
/// reported from).
#[derive(Debug)]
pub struct GaugeVec<L> {
    family: Family<L, Gauge<f64, AtomicU64>>,
    series: Mutex<HashMap<L, Gauge<f64, AtomicU64>>>,
}

impl<L> GaugeVec<L>
where
    L: EncodeLabelSet + Clone + Debug + Hash + Eq + Send + Sync + 'static,
{
    fn register(reg: &mut Registry, name: &str, help: &str) -> Self {
        let family = Family::<L, Gauge<f64, AtomicU64>>::default();
        reg.register(name, help, family.clone());

        Self {
            family,
            series: Mutex::new(HashMap::new()),
        }
    }

    pub fn set(&self, labels: &L, value: f64) {
        let mut series = self.series.lock().unwrap_or_else(PoisonError::into_inner);
        let gauge = self.family.get_or_create(labels).clone();
        gauge.set(value);
        series.insert(labels.clone(), gauge);
    }

    /// Current value of the series with exactly these labels, if it exists.
    pub fn get(&self, labels: &L) -> Option<f64> {
        let series = self.series.lock().unwrap_or_else(PoisonError::into_inner);
        series.get(labels).map(|g| g.get())
    }

    /// Remove every series whose labels match `predicate`, returning the number removed.
    pub fn remove_matching<F>(&self, predicate: F) -> usize
    where
        F: Fn(&L) -> bool,
    {
        let mut series = self.series.lock().unwrap_or_else(PoisonError::into_inner);
        let matched: Vec<L> = series.keys().filter(|l| predicate(l)).cloned().collect();

        for labels in matched.iter() {
            series.remove(labels);
            self.family.remove(labels);
        }

        matched.len()
    }
}

/// Holder for all metrics that can be set from a weather station report.
///
/// All metrics are created and registered upon call to `StationMetrics::new()`. Every metric
/// has a `remote_address` label set to the address of the reporting station and a `name`
/// label set to the configured station name (which may be empty).
#[derive(Debug)]
pub struct StationMetrics {
    name: String,
    pub temperature: GaugeVec<SensorLabels>,
    pub battery: GaugeVec<SensorLabels>,
    pub humidity: GaugeVec<SensorLabels>,
    pub barometer: GaugeVec<TypeLabels>,
    pub wind_dir: GaugeVec<PeriodLabels>,
    pub wind_speed: GaugeVec<TypeLabels>,
    pub solar_radiation: GaugeVec<StationLabels>,
    pub rain: GaugeVec<PeriodLabels>,
    pub ultraviolet: GaugeVec<StationLabels>,
    pub lightning_strikes: GaugeVec<PeriodLabels>,
    pub lightning_last_strike: GaugeVec<StationLabels>,
    pub lightning_distance: GaugeVec<StationLabels>,
    pub station_type: GaugeVec<TypeLabels>,
}

impl StationMetrics {
    /// Create a new `StationMetrics` and register each metric with the provided `Registry`.
    ///
    /// If `prefix` is not empty, metrics are registered with a sub-registry so that each
    /// metric name becomes `$PREFIX_$NAME`.
    pub fn new(reg: &mut Registry, name: &str, prefix: &str) -> Self {
        let reg = if prefix.is_empty() {
            reg
        } else {
            reg.sub_registry_with_prefix(prefix)
        };

        Self {
            name: name.to_owned(),
            temperature: GaugeVec::register(reg, "temperature", "Temperature in fahrenheit"),
            battery: GaugeVec::register(reg, "battery", "Battery status (1 = ok, 0 = low)"),
            humidity: GaugeVec::register(reg, "humidity", "Relative humidity (0-100)"),
            barometer: GaugeVec::register(reg, "barometer", "Barometric pressure in inches of mercury"),
            wind_dir: GaugeVec::register(reg, "wind_dir", "Wind direction in degrees"),
            wind_speed: GaugeVec::register(reg, "wind_speed_mph", "Wind speed in miles per hour"),
            solar_radiation: GaugeVec::register(reg, "solar_radiation", "Solar radiation in W/m2"),
            rain: GaugeVec::register(reg, "rain_in", "Rain in inches"),
            ultraviolet: GaugeVec::register(reg, "ultraviolet", "Ultra violet index"),
            lightning_strikes: GaugeVec::register(reg, "lightning_strikes", "Lightning strikes"),
            lightning_last_strike: GaugeVec::register(
                reg,
                "lightning_last_strike",
                "Time of the last lightning strike in seconds since the epoch",
            ),
            lightning_distance: GaugeVec::register(
                reg,
                "lightning_distance",
                "Distance of the last lightning strike in km",
            ),
            station_type: GaugeVec::register(reg, "stationtype_info", "Station type, value is always 1"),
        }
    }

    pub fn sensor_labels(&self, remote_address: &str, sensor: &str) -> SensorLabels {
        SensorLabels {
            remote_address: remote_address.to_owned(),
            name: self.name.clone(),
            sensor: sensor.to_owned(),
        }
    }

    pub fn period_labels(&self, remote_address: &str, period: &str) -> PeriodLabels {
        PeriodLabels {
            remote_address: remote_address.to_owned(),
            name: self.name.clone(),
            period: period.to_owned(),
        }
    }

    pub fn type_labels(&self, remote_address: &str, kind: &str) -> TypeLabels {
        TypeLabels {
            remote_address: remote_address.to_owned(),
            name: self.name.clone(),
            r#type: kind.to_owned(),
        }
    }

    pub fn station_labels(&self, remote_address: &str) -> StationLabels {
        StationLabels {
            remote_address: remote_address.to_owned(),
            name: self.name.clone(),
        }
    }

    /// Remove the series for `sensor` of this station from `gauge`, regardless of the
    /// remote address it was reported from.
    pub fn remove_sensor(&self, gauge: &GaugeVec<SensorLabels>, sensor: &str) -> usize {
        gauge.remove_matching(|l| l.name == self.name && l.sensor == sensor)
    }
}

#[cfg(test)]
mod tests {
    use super::{SensorLabels, StationMetrics};
    use prometheus_client::encoding::text::encode;
    use prometheus_client::registry::Registry;

    fn scrape(reg: &Registry) -> String {
        let mut buf = String::new();
        encode(&mut buf, reg).unwrap();
        buf
    }

    #[test]
    fn test_metrics_registration() {
        let mut reg = Registry::default();
        let _metrics = StationMetrics::new(&mut reg, "home", "");
        let text = scrape(&reg);

        for name in [
            "temperature",
            "battery",
            "humidity",
            "barometer",
            "wind_dir",
            "wind_speed_mph",
            "solar_radiation",
            "rain_in",
            "ultraviolet",
            "lightning_strikes",
            "lightning_last_strike",
            "lightning_distance",
            "stationtype_info",
        ] {
            assert!(text.contains(&format!("# TYPE {} gauge", name)), "missing {}", name);
        }
    }

    #[test]
    fn test_metrics_prefix() {
        let mut reg = Registry::default();
        let metrics = StationMetrics::new(&mut reg, "home", "ambient");
        metrics
            .temperature
            .set(&metrics.sensor_labels("10.0.0.5", "outdoor"), 72.0);
        let text = scrape(&reg);

        assert!(text.contains("# TYPE ambient_temperature gauge"));
        assert!(text.contains(r#"ambient_temperature{remote_address="10.0.0.5",name="home",sensor="outdoor"}"#));
    }

    #[test]
    fn test_empty_station_name_is_kept_as_label() {
        let mut reg = Registry::default();
        let metrics = StationMetrics::new(&mut reg, "", "");
        metrics.ultraviolet.set(&metrics.station_labels("10.0.0.5"), 3.0);
        let text = scrape(&reg);

        assert!(text.contains(r#"ultraviolet{remote_address="10.0.0.5",name=""}"#));
    }

    #[test]
    fn test_type_labels_encoding() {
        let mut reg = Registry::default();
        let metrics = StationMetrics::new(&mut reg, "home", "");
        metrics
            .barometer
            .set(&metrics.type_labels("10.0.0.5", "relative"), 29.92);
        let text = scrape(&reg);

        assert!(text.contains(r#"barometer{remote_address="10.0.0.5",name="home",type="relative"}"#));
    }

    #[test]
    fn test_set_and_get() {
        let mut reg = Registry::default();
        let metrics = StationMetrics::new(&mut reg, "home", "");
        let labels = metrics.period_labels("10.0.0.5", "daily");

        assert_eq!(None, metrics.rain.get(&labels));
        metrics.rain.set(&labels, 0.25);
        assert_eq!(Some(0.25), metrics.rain.get(&labels));
    }

    #[test]
    fn test_remove_matching() {
        let mut reg = Registry::default();
        let metrics = StationMetrics::new(&mut reg, "home", "");
        let labels = metrics.sensor_labels("10.0.0.5", "1");

        metrics.battery.set(&labels, 1.0);
        assert_eq!(1, metrics.battery.remove_matching(|l| l == &labels));
        assert_eq!(0, metrics.battery.remove_matching(|l| l == &labels));
        assert_eq!(None, metrics.battery.get(&labels));
        assert!(!scrape(&reg).contains(r#"sensor="1""#));
    }

    #[test]
    fn test_get_does_not_create_series() {
        let mut reg = Registry::default();
        let metrics = StationMetrics::new(&mut reg, "home", "");
        let labels = metrics.sensor_labels("10.0.0.5", "7");

        assert_eq!(None, metrics.temperature.get(&labels));
        metrics.temperature.set(&labels, 50.0);
        metrics.remove_sensor(&metrics.temperature, "7");
        assert_eq!(None, metrics.temperature.get(&labels));
        assert!(!scrape(&reg).contains(r#"sensor="7""#));
    }

    #[test]
    fn test_concurrent_set_and_remove() {
        let mut reg = Registry::default();
        let metrics = std::sync::Arc::new(StationMetrics::new(&mut reg, "home", ""));
        let labels = metrics.sensor_labels("10.0.0.5", "3");

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let metrics = metrics.clone();
                let labels = labels.clone();
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        if i % 2 == 0 {
                            metrics.temperature.set(&labels, 65.0);
                        } else {
                            metrics.remove_sensor(&metrics.temperature, "3");
                        }
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        // Tracked series and exposed series agree after any interleaving.
        let exposed = scrape(&reg).contains(r#"sensor="3""#);
        assert_eq!(exposed, metrics.temperature.get(&labels).is_some());
    }

    #[test]
    fn test_remove_sensor_any_remote_address() {
        let mut reg = Registry::default();
        let metrics = StationMetrics::new(&mut reg, "home", "");
        let first = metrics.sensor_labels("10.0.0.5", "2");
        let second = metrics.sensor_labels("10.0.0.6", "2");
        let other = metrics.sensor_labels("10.0.0.5", "3");

        metrics.temperature.set(&first, 70.0);
        metrics.temperature.set(&second, 71.0);
        metrics.temperature.set(&other, 72.0);

        assert_eq!(2, metrics.remove_sensor(&metrics.temperature, "2"));
        assert_eq!(None, metrics.temperature.get(&first));
        assert_eq!(None, metrics.temperature.get(&second));
        assert_eq!(Some(72.0), metrics.temperature.get(&other));
    }

    #[test]
    fn test_remove_sensor_other_station_untouched() {
        let mut reg = Registry::default();
        let home = StationMetrics::new(&mut reg, "home", "");
        let labels = home.sensor_labels("10.0.0.5", "soil1");
        let cabin = SensorLabels {
            name: "cabin".to_owned(),
            ..labels.clone()
        };

        home.humidity.set(&labels, 30.0);
        home.humidity.set(&cabin, 35.0);

        assert_eq!(1, home.remove_sensor(&home.humidity, "soil1"));
        assert_eq!(Some(35.0), home.humidity.get(&cabin));
    }
}
