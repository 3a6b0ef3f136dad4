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

use ambient_exporter::http::{self, RequestContext};
use ambient_exporter::metrics::StationMetrics;
use ambient_exporter::translate::Translator;
use clap::Parser;
use prometheus_client::registry::Registry;
use std::error::Error;
use std::io;
use std::net::SocketAddr;
use std::process;
use std::sync::Arc;
use tokio::signal::unix::{self, SignalKind};
use tracing::Level;

const DEFAULT_LOG_LEVEL: Level = Level::INFO;
const DEFAULT_BIND_ADDR: ([u8; 4], u16) = ([0, 0, 0, 0], 2184);

#[derive(Debug, Parser)]
#[clap(name = "ambient_exporter", version = clap::crate_version!())]
struct AmbientExporterApplication {
    /// Weather station name for the 'name' label on all metrics
    #[clap(long, default_value_t = String::new())]
    station_name: String,

    /// Prefix for all metric names, e.g. '--prefix ambient' results in 'ambient_temperature'
    #[clap(long, default_value_t = String::new())]
    prefix: String,

    /// Log every report received and every field that can't be parsed
    #[clap(long)]
    verbose: bool,

    /// Logging verbosity. Allowed values are 'trace', 'debug', 'info', 'warn', and 'error'
    /// (case insensitive)
    #[clap(long, default_value_t = DEFAULT_LOG_LEVEL)]
    log_level: Level,

    /// Address to bind to. Weather stations send reports to this address and Prometheus
    /// scrapes metrics from it, so by default ambient_exporter binds to a public address.
    #[clap(long, default_value_t = DEFAULT_BIND_ADDR.into())]
    bind: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let opts = AmbientExporterApplication::parse();
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(opts.log_level)
            .finish(),
    )
    .expect("failed to set tracing subscriber");

    let mut registry = Registry::default();
    let metrics = StationMetrics::new(&mut registry, &opts.station_name, &opts.prefix);
    let translator = Translator::new(metrics, opts.verbose);
    let context = Arc::new(RequestContext::new(registry, translator, opts.verbose));

    let server = axum::Server::try_bind(&opts.bind)
        .unwrap_or_else(|e| {
            tracing::error!(message = "error binding to address", address = %opts.bind, error = %e);
            process::exit(1)
        })
        .serve(http::app(context).into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async {
            // Wait for either SIGTERM or SIGINT to shutdown
            tokio::select! {
                _ = sigterm() => {}
                _ = sigint() => {}
            }
        });

    tracing::info!(
        message = "server started",
        address = %opts.bind,
        station_name = %opts.station_name,
        version = clap::crate_version!(),
    );
    server.await?;

    tracing::info!("server shutdown");
    Ok(())
}

/// Return after the first SIGTERM signal received by this process
async fn sigterm() -> io::Result<()> {
    unix::signal(SignalKind::terminate())?.recv().await;
    Ok(())
}

/// Return after the first SIGINT signal received by this process
async fn sigint() -> io::Result<()> {
    unix::signal(SignalKind::interrupt())?.recv().await;
    Ok(())
}
