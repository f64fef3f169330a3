use serde::Deserialize;
use tracing::metadata::LevelFilter;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct TelemetryConfig {
    pub enable: bool,
    #[serde(flatten)]
    pub filter: FilterConfig,
    pub console: ConsoleConfig,
    pub file: FileConfig,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enable: true,
            filter: Default::default(),
            console: Default::default(),
            file: Default::default(),
        }
    }
}

/// Level and directives of one output, e.g. `level_filter: "sea_orm=warn,redis=info"`.
#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct FilterConfig {
    pub max_level: LoggingLevel,
    pub level_filter: String,
    /// Env var whose directives are added to `level_filter`.
    pub level_filter_env: String,
}

#[derive(Default, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoggingLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
    Off,
}

impl From<LoggingLevel> for LevelFilter {
    fn from(val: LoggingLevel) -> Self {
        match val {
            LoggingLevel::Error => LevelFilter::ERROR,
            LoggingLevel::Warn => LevelFilter::WARN,
            LoggingLevel::Info => LevelFilter::INFO,
            LoggingLevel::Debug => LevelFilter::DEBUG,
            LoggingLevel::Trace => LevelFilter::TRACE,
            LoggingLevel::Off => LevelFilter::OFF,
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct ConsoleConfig {
    pub enable: bool,
    /// Adds file, line, thread and target to each event.
    pub enable_debug_logging: bool,
    #[serde(flatten)]
    pub filter: FilterConfig,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enable: true,
            enable_debug_logging: false,
            filter: Default::default(),
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct FileConfig {
    pub enable: bool,
    pub enable_debug_logging: bool,
    #[serde(flatten)]
    pub filter: FilterConfig,
    pub path: String,
    /// File name, or its prefix when rolling.
    pub prefix: String,
    pub rolling_time: RotationLevel,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            enable: false,
            enable_debug_logging: false,
            filter: Default::default(),
            path: "./logs".to_string(),
            prefix: "video-upload.log".to_string(),
            rolling_time: Default::default(),
        }
    }
}

#[derive(Default, Deserialize, Clone, Copy, Debug)]
pub enum RotationLevel {
    Daily,
    Hourly,
    Minutely,
    #[default]
    Never,
}

impl From<RotationLevel> for Rotation {
    fn from(val: RotationLevel) -> Self {
        match val {
            RotationLevel::Daily => Rotation::DAILY,
            RotationLevel::Hourly => Rotation::HOURLY,
            RotationLevel::Minutely => Rotation::MINUTELY,
            RotationLevel::Never => Rotation::NEVER,
        }
    }
}

impl FilterConfig {
    fn env_filter(&self) -> EnvFilter {
        let mut builder =
            EnvFilter::builder().with_default_directive(LevelFilter::from(self.max_level).into());
        if !self.level_filter_env.is_empty() {
            builder = builder.with_env_var(&self.level_filter_env);
        }
        builder.parse_lossy(&self.level_filter)
    }
}

fn console_layer(config: &ConsoleConfig) -> BoxedLayer {
    let debug = config.enable_debug_logging;
    tracing_subscriber::fmt::layer()
        .with_file(debug)
        .with_line_number(debug)
        .with_thread_ids(debug)
        .with_target(debug)
        .with_filter(config.filter.env_filter())
        .boxed()
}

fn file_layer(config: &FileConfig) -> BoxedLayer {
    let debug = config.enable_debug_logging;
    let appender =
        RollingFileAppender::new(config.rolling_time.into(), &config.path, &config.prefix);
    tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(appender)
        .with_file(debug)
        .with_line_number(debug)
        .with_thread_ids(debug)
        .with_target(debug)
        .with_filter(config.filter.env_filter())
        .boxed()
}

/// Install the global subscriber. Fails when one is already installed.
pub fn initialize_telemetry(config: &TelemetryConfig) -> anyhow::Result<()> {
    if !config.enable {
        return Ok(());
    }
    let mut layers: Vec<BoxedLayer> = vec![];
    if config.console.enable {
        layers.push(console_layer(&config.console));
    }
    if config.file.enable {
        layers.push(file_layer(&config.file));
    }
    Registry::default().with(layers).with(config.filter.env_filter()).try_init()?;
    Ok(())
}
