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

//! Prometheus metrics exporter for Ambient Weather personal weather stations
//!
//! ## Features
//!
//! `ambient_exporter` accepts readings pushed by an Ambient Weather station (or any station
//! that supports the Ambient Weather "custom server" protocol) and emits them as Prometheus
//! metrics. Stations only send the fields for sensors they have, so not every metric below
//! will be present.
//!
//! * `temperature{remote_address, name, sensor}` - Temperature, in degrees fahrenheit. The
//!   `sensor` label is one of `indoor`, `outdoor`, `dewpoint`, `feelsLike`, or `1` to `10`.
//! * `battery{remote_address, name, sensor}` - Battery status, `1` is OK and `0` is low.
//! * `humidity{remote_address, name, sensor}` - Relative humidity (0-100). Soil sensors use
//!   `soil1` to `soil10` for the `sensor` label.
//! * `barometer{remote_address, name, type}` - Relative and absolute pressure, in inches of mercury.
//! * `wind_dir{remote_address, name, period}` - Wind direction, in degrees.
//! * `wind_speed_mph{remote_address, name, type}` - Sustained wind speed and gusts, in mph.
//! * `solar_radiation{remote_address, name}` - Solar radiation, in W/m^2.
//! * `rain_in{remote_address, name, period}` - Rain, in inches, for several periods.
//! * `ultraviolet{remote_address, name}` - Ultra violet index.
//! * `lightning_strikes{remote_address, name, period}` - Lightning strikes for the day.
//! * `lightning_last_strike{remote_address, name}` - Time of the last strike, seconds since the epoch.
//! * `lightning_distance{remote_address, name}` - Distance of the last strike, in km.
//! * `stationtype_info{remote_address, name, type}` - Station model and firmware, always `1`.
//!
//! Numbered sensors (`1` to `10`, `soil1` to `soil10`) that stop being reported have their
//! metrics removed. All other metrics keep their last reported value.
//!
//! ## Build
//!
//! `ambient_exporter` is a Rust program and must be built from source using a
//! [Rust toolchain](https://rustup.rs/).
//!
//! ```text
//! cargo build --release
//! ```
//!
//! ## Usage
//!
//! ### Station
//!
//! In the `awnet` app, configure a "Customized" server for your station with the host and port
//! that `ambient_exporter` is running on (default port `2184`), the path `/data/report/`, and
//! an upload interval of your choosing.
//!
//! ### Run
//!
//! ```text
//! ./ambient_exporter --station-name backyard
//! ```
//!
//! Use `--prefix` to prepend a namespace to every metric name (`--prefix ambient` results in
//! `ambient_temperature`, etc.) and `--verbose` to log every report received.
//!
//! ### Prometheus
//!
//! Prometheus metrics are exposed on port `2184` at `/metrics`. Once `ambient_exporter`
//! is running, configure scrapes of it by your Prometheus server.
//!
//! ```yaml
//! # Sample config for Prometheus.
//!
//! scrape_configs:
//! - job_name: ambient_exporter
//!   static_configs:
//!   - targets: ['example:2184']
//! ```
//!

pub mod calc;
pub mod http;
pub mod metrics;
pub mod report;
pub mod translate;
