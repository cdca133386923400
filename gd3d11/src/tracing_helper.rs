use std::{num::NonZeroU8, panic, path::Path};

use anyhow::Result;
use time::format_description::well_known::{iso8601, Iso8601};
use tracing::{error, Level};
use tracing_subscriber::{
    fmt::{time::LocalTime, writer::MakeWriterExt},
    layer::SubscriberExt,
    EnvFilter, Layer,
};

const TIMESTAMP: iso8601::EncodedConfig = iso8601::Config::DEFAULT
    .set_time_precision(iso8601::TimePrecision::Second {
        decimal_digits: NonZeroU8::new(3),
    })
    .encode();

/// Both crates at trace in debug builds, info otherwise.
fn renderer_filter() -> EnvFilter {
    let level = if cfg!(debug_assertions) { "trace" } else { "info" };
    EnvFilter::new(format!(
        "{}={level},gd3d11_lib={level}",
        env!("CARGO_CRATE_NAME")
    ))
}

/// Logs into `dir/file_name`, and to the console when `console` is set.
pub fn init_tracing(dir: &Path, file_name: &str, console: bool) -> Result<()> {
    let with_source = cfg!(debug_assertions);
    let log_file = tracing_appender::rolling::never(dir, file_name).with_max_level(Level::DEBUG);
    let file_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_ansi(false)
        .with_file(with_source)
        .with_line_number(with_source)
        .with_target(!with_source)
        .with_thread_ids(true)
        .with_timer(LocalTime::new(Iso8601::<TIMESTAMP>))
        .with_writer(log_file)
        .with_filter(renderer_filter());
    let console_layer = console.then(|| {
        tracing_subscriber::fmt::layer()
            .compact()
            .with_file(true)
            .with_line_number(true)
            .with_target(false)
            .with_timer(LocalTime::new(Iso8601::<TIMESTAMP>))
            .with_filter(renderer_filter())
    });
    tracing::subscriber::set_global_default(
        tracing_subscriber::registry()
            .with(file_layer)
            .with(console_layer),
    )?;

    panic::set_hook(Box::new(|info| error!("{}", info)));
    Ok(())
}
