use anyhow::{Context, Result};
use std::fmt::Display;
use tracing::{level_filters::LevelFilter, Level, Subscriber};
use tracing_subscriber::{
    fmt::{format, FormatEvent, FormatFields},
    prelude::*,
    registry::LookupSpan,
    EnvFilter,
};

// Log an error and keep propagating it with `?`
pub trait LogMe<T> {
    fn log_warn<C: Display + Send + Sync + 'static>(self, context_msg: C) -> anyhow::Result<T>;
    fn log_error<C: Display + Send + Sync + 'static>(self, context_msg: C) -> anyhow::Result<T>;
}

// WARN {context_msg}: {cause}
impl<T, Error: Into<anyhow::Error> + Display + Send + Sync + 'static> LogMe<T>
    for Result<T, Error>
{
    fn log_warn<C: Display + Send + Sync + 'static>(self, context_msg: C) -> anyhow::Result<T> {
        log_with(self, Level::WARN, context_msg)
    }

    fn log_error<C: Display + Send + Sync + 'static>(self, context_msg: C) -> anyhow::Result<T> {
        log_with(self, Level::ERROR, context_msg)
    }
}

fn log_with<T, E, C>(res: Result<T, E>, level: Level, context_msg: C) -> anyhow::Result<T>
where
    E: Into<anyhow::Error>,
    C: Display + Send + Sync + 'static,
{
    res.map_err(|e| {
        let ae: anyhow::Error = e.into();
        let ae = ae.context(context_msg);
        if level == Level::ERROR {
            tracing::error!("{:#}", ae);
        } else {
            tracing::warn!("{:#}", ae);
        }
        ae
    })
}

/// Prefixes every line with the node moniker, so that several validators
/// sharing one process stay readable.
struct MonikerFormatter<T> {
    moniker: String,
    base_formatter: T,
}

impl<S, N, T> FormatEvent<S, N> for MonikerFormatter<T>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
    T: FormatEvent<S, N>,
{
    fn format_event(
        &self,
        ctx: &tracing_subscriber::fmt::FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        write!(&mut writer, "{} ", &self.moniker)?;
        self.base_formatter.format_event(ctx, writer, event)
    }
}

pub enum TracingMode {
    /// Default tracing, for running a devnet locally
    Full,
    /// JSON tracing, for CI log collectors
    Json,
    /// Full tracing + moniker prefix
    NodeName,
}

impl TracingMode {
    pub fn from_log_format(log_format: &str) -> Self {
        match log_format {
            "json" => TracingMode::Json,
            "node" => TracingMode::NodeName,
            _ => TracingMode::Full,
        }
    }
}

/// Setup tracing - stdout subscriber.
/// Defaults to INFO; HTTP plumbing stays at INFO unless RUST_LOG names it.
pub fn setup_tracing(mode: TracingMode, moniker: String) -> Result<()> {
    let mut filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env()?;

    let var = std::env::var("RUST_LOG").unwrap_or_default();
    for noisy in ["hyper", "reqwest", "tower_http"] {
        if !var.contains(noisy) {
            filter = filter.add_directive(format!("{noisy}=info").parse()?);
        }
    }

    match mode {
        TracingMode::Full => register_global_subscriber(filter, tracing_subscriber::fmt::layer()),
        TracingMode::Json => register_global_subscriber(
            filter,
            tracing_subscriber::fmt::layer().event_format(tracing_subscriber::fmt::format().json()),
        ),
        TracingMode::NodeName => register_global_subscriber(
            filter,
            tracing_subscriber::fmt::layer().event_format(MonikerFormatter {
                moniker,
                base_formatter: tracing_subscriber::fmt::format(),
            }),
        ),
    }
}

/// Fails when the process already has a global subscriber.
fn register_global_subscriber<T, S>(filter: EnvFilter, fmt_layer: T) -> Result<()>
where
    S: Subscriber,
    T: tracing_subscriber::Layer<S> + Send + Sync,
    tracing_subscriber::filter::Filtered<T, tracing_subscriber::EnvFilter, S>:
        tracing_subscriber::Layer<tracing_subscriber::Registry>,
{
    tracing_subscriber::registry()
        .with(fmt_layer.with_filter(filter))
        .try_init()
        .context("installing the global tracing subscriber")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_me_keeps_error_and_adds_context() {
        let res: Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "gone",
        ));
        let err = res.log_warn("removing home").unwrap_err();
        assert_eq!(format!("{:#}", err), "removing home: gone");
    }

    #[test]
    fn log_me_passes_ok_through() {
        let res: Result<u8, std::io::Error> = Ok(3);
        assert_eq!(res.log_error("unused").unwrap(), 3);
    }

    #[test]
    fn tracing_mode_from_log_format() {
        assert!(matches!(TracingMode::from_log_format("json"), TracingMode::Json));
        assert!(matches!(
            TracingMode::from_log_format("node"),
            TracingMode::NodeName
        ));
        assert!(matches!(TracingMode::from_log_format("full"), TracingMode::Full));
    }
}
