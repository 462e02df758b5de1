// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Logging for the `llmip` tools.
//!
//! - Configuration loaded from:
//!   1. Environment variables (highest priority).
//!   2. Optional TOML file pointed to by the `LLMIP_LOGGING_CONFIG_PATH` environment variable.
//!   3. `/etc/llmip/logging.toml`.
//!
//! Logging can take two forms: `READABLE` or `JSONL`. The default is `READABLE`. `JSONL`
//! can be enabled by setting the `LLMIP_LOGGING_JSONL` environment variable to `1`.
//!
//! Filters can be configured using the `LLMIP_LOG` environment variable or by setting the
//! `log_filters` key in the TOML configuration file. The default log level is `info`.
//!
//! Logs always go to stderr so that stdout only carries results a user may want to pipe,
//! such as rendered job scripts and connection instructions.
//!
//! Example:
//! ```toml
//! log_level = "debug"
//!
//! [log_filters]
//! "hf_hub" = "info"
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::Once;

use figment::{
    Figment,
    providers::{Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;
use tracing::{Event, Subscriber};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt::{self, FmtContext, FormatEvent, FormatFields, format::Writer};
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;

use crate::config::environment_names::logging as env_logging;
use crate::config::{disable_ansi_logging, jsonl_logging_enabled, use_local_timezone};

/// Default log level
const DEFAULT_FILTER_LEVEL: &str = "info";

const SYSTEM_LOGGING_CONFIG_PATH: &str = "/etc/llmip/logging.toml";

/// Once instance to ensure the logger is only initialized once
static INIT: Once = Once::new();

#[derive(Serialize, Deserialize, Debug)]
struct LoggingConfig {
    log_level: String,
    log_filters: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            log_level: DEFAULT_FILTER_LEVEL.to_string(),
            log_filters: HashMap::from([
                ("hf_hub".to_string(), "warn".to_string()),
                ("reqwest".to_string(), "error".to_string()),
                ("hyper_util".to_string(), "error".to_string()),
                ("rustls".to_string(), "error".to_string()),
                ("h2".to_string(), "error".to_string()),
            ]),
        }
    }
}

/// Initialize the logger. Safe to call more than once.
pub fn init() {
    INIT.call_once(|| {
        if let Err(e) = setup_logging() {
            eprintln!("Failed to initialize logging: {e}");
            std::process::exit(1);
        }
    });
}

fn setup_logging() -> Result<(), Box<dyn std::error::Error>> {
    let filter_layer = filters(load_config()?);

    if jsonl_logging_enabled() {
        let l = fmt::layer()
            .with_ansi(false)
            .event_format(CustomJsonFormatter::new())
            .with_writer(std::io::stderr)
            .with_filter(filter_layer);
        tracing_subscriber::registry().with(l).try_init()?;
    } else {
        let l = fmt::layer()
            .with_ansi(!disable_ansi_logging())
            .event_format(fmt::format().compact().with_timer(TimeFormatter::new()))
            .with_writer(std::io::stderr)
            .with_filter(filter_layer);
        tracing_subscriber::registry().with(l).try_init()?;
    }

    Ok(())
}

fn filters(config: LoggingConfig) -> EnvFilter {
    let default_directive = config
        .log_level
        .parse::<Directive>()
        .unwrap_or_else(|_| LevelFilter::INFO.into());
    let mut filter_layer = EnvFilter::builder()
        .with_default_directive(default_directive)
        .with_env_var(env_logging::LLMIP_LOG)
        .from_env_lossy();

    for (module, level) in config.log_filters {
        match format!("{module}={level}").parse::<Directive>() {
            Ok(d) => {
                filter_layer = filter_layer.add_directive(d);
            }
            Err(e) => {
                eprintln!("Failed parsing filter '{level}' for module '{module}': {e}");
            }
        }
    }
    filter_layer
}

fn load_config() -> Result<LoggingConfig, figment::Error> {
    let mut figment = Figment::new()
        .merge(Serialized::defaults(LoggingConfig::default()))
        .merge(Toml::file(SYSTEM_LOGGING_CONFIG_PATH));
    if let Ok(config_path) = std::env::var(env_logging::LLMIP_LOGGING_CONFIG_PATH) {
        figment = figment.merge(Toml::file(config_path));
    }
    figment.extract()
}

struct TimeFormatter {
    use_local_tz: bool,
}

impl TimeFormatter {
    fn new() -> Self {
        Self {
            use_local_tz: use_local_timezone(),
        }
    }

    fn format_now(&self) -> String {
        if self.use_local_tz {
            chrono::Local::now()
                .format("%Y-%m-%dT%H:%M:%S%.6f%:z")
                .to_string()
        } else {
            chrono::Utc::now()
                .format("%Y-%m-%dT%H:%M:%S%.6fZ")
                .to_string()
        }
    }
}

impl FormatTime for TimeFormatter {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", self.format_now())
    }
}

#[derive(Serialize)]
struct JsonLog<'a> {
    time: String,
    level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    file: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    line: Option<u32>,
    target: &'a str,
    message: serde_json::Value,
    #[serde(flatten)]
    fields: BTreeMap<String, serde_json::Value>,
}

struct CustomJsonFormatter {
    time_formatter: TimeFormatter,
}

impl CustomJsonFormatter {
    fn new() -> Self {
        Self {
            time_formatter: TimeFormatter::new(),
        }
    }
}

impl<S, N> FormatEvent<S, N> for CustomJsonFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let mut visitor = JsonVisitor::default();
        event.record(&mut visitor);
        let message = visitor
            .fields
            .remove("message")
            .unwrap_or(serde_json::Value::String(String::new()));

        // Spans carry the job id and model through a deployment, surface them on every line
        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                let ext = span.extensions();
                if let Some(data) = ext.get::<fmt::FormattedFields<N>>() {
                    for (name, value) in data.fields.split(' ').filter_map(|e| e.split_once('=')) {
                        visitor.fields.insert(
                            name.to_string(),
                            serde_json::Value::String(value.trim_matches('"').to_string()),
                        );
                    }
                }
                visitor.fields.insert(
                    "span_name".to_string(),
                    serde_json::Value::String(span.name().to_string()),
                );
            }
        }

        let metadata = event.metadata();
        let log = JsonLog {
            time: self.time_formatter.format_now(),
            level: metadata.level().to_string(),
            file: metadata.file(),
            line: metadata.line(),
            target: metadata.target(),
            message,
            fields: visitor.fields,
        };
        let json = serde_json::to_string(&log).map_err(|_| std::fmt::Error)?;
        writeln!(writer, "{json}")
    }
}

#[derive(Default)]
struct JsonVisitor {
    fields: BTreeMap<String, serde_json::Value>,
}

impl tracing::field::Visit for JsonVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.fields.insert(
            field.name().to_string(),
            serde_json::Value::String(format!("{value:?}")),
        );
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.fields.insert(field.name().to_string(), value.into());
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::Bool(value));
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.fields.insert(
            field.name().to_string(),
            serde_json::Value::Number(value.into()),
        );
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.fields.insert(
            field.name().to_string(),
            serde_json::Value::Number(value.into()),
        );
    }
}
