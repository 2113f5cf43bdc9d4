use std::collections::BTreeMap;
use std::env;
use std::error::Error;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use intake_dogstatsd::DogStatsdConfig;
use intake_log::{Level, LogConfig};
use serde::{Deserialize, Serialize};

/// Name of the configuration file within the config folder.
const CONFIG_FILE_NAME: &str = "config.yml";

#[derive(Debug)]
enum ConfigErrorSource {
    None,
    File(PathBuf),
    FieldOverride(String),
}

/// Indicates config related errors.
#[derive(Debug)]
pub struct ConfigError {
    source: ConfigErrorSource,
    kind: ConfigErrorKind,
    cause: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl ConfigError {
    #[inline]
    fn new(kind: ConfigErrorKind) -> Self {
        Self {
            source: ConfigErrorSource::None,
            kind,
            cause: None,
        }
    }

    #[inline]
    fn wrap<E>(cause: E, kind: ConfigErrorKind) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self {
            cause: Some(Box::new(cause)),
            ..Self::new(kind)
        }
    }

    #[inline]
    fn for_field<E>(cause: E, field: &'static str) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self::wrap(cause, ConfigErrorKind::InvalidValue).field(field)
    }

    #[inline]
    fn file(mut self, path: impl AsRef<Path>) -> Self {
        self.source = ConfigErrorSource::File(path.as_ref().to_path_buf());
        self
    }

    #[inline]
    fn field(mut self, name: &'static str) -> Self {
        self.source = ConfigErrorSource::FieldOverride(name.to_owned());
        self
    }

    /// Returns the error kind of the error.
    pub fn kind(&self) -> ConfigErrorKind {
        self.kind
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            ConfigErrorSource::None => write!(f, "{}", self.kind),
            ConfigErrorSource::File(file_name) => {
                write!(f, "{} (file {})", self.kind, file_name.display())
            }
            ConfigErrorSource::FieldOverride(name) => write!(f, "{} (field {})", self.kind, name),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause.as_deref().map(|cause| cause as &(dyn Error + 'static))
    }
}

/// Indicates config related errors.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigErrorKind {
    /// Failed to open the file.
    #[error("could not open config file")]
    CouldNotOpenFile,
    /// Failed to save a file.
    #[error("could not write config file")]
    CouldNotWriteFile,
    /// Parsing YAML failed.
    #[error("could not parse yaml config file")]
    BadYaml,
    /// Parsing JSON failed.
    #[error("could not parse json config file")]
    BadJson,
    /// Invalid config value
    #[error("invalid config value")]
    InvalidValue,
}

/// Overrides applied on top of the config file, for example from command line arguments or
/// environment variables.
#[derive(Debug, Default)]
pub struct OverridableConfig {
    /// Hostname attached to records without a `host:` tag.
    pub hostname: Option<String>,
    /// Prefix prepended to all metric names.
    pub namespace: Option<String>,
    /// Maximum number of samples per batch.
    pub batch_size: Option<String>,
    /// Number of worker threads.
    pub workers: Option<String>,
    /// The log level.
    pub log_level: Option<String>,
}

/// Controls internal reporting to statsd.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
struct Metrics {
    /// Hostname and port of the statsd server.
    ///
    /// Defaults to `None`, which disables internal metrics.
    statsd: Option<String>,
    /// Common prefix that should be added to all metrics.
    ///
    /// Defaults to `"intake"`.
    prefix: String,
    /// Default tags to apply to all metrics.
    default_tags: BTreeMap<String, String>,
    /// Global sample rate for all emitted metrics between `0.0` and `1.0`.
    sample_rate: f64,
    /// Number of metrics buffered before the statsd client drops new ones.
    queue_size: usize,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            statsd: None,
            prefix: "intake".to_owned(),
            default_tags: BTreeMap::new(),
            sample_rate: 1.0,
            queue_size: 10_000,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
struct ConfigValues {
    logging: LogConfig,
    metrics: Metrics,
    dogstatsd: DogStatsdConfig,
}

impl ConfigValues {
    fn path(base: &Path) -> PathBuf {
        base.join(CONFIG_FILE_NAME)
    }

    fn load(base: &Path) -> Result<Self, ConfigError> {
        let path = Self::path(base);

        let f = fs::File::open(&path)
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::CouldNotOpenFile).file(&path))?;

        serde_yaml::from_reader(io::BufReader::new(f))
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::BadYaml).file(&path))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.dogstatsd
            .validate()
            .map_err(|e| ConfigError::for_field(e, "dogstatsd"))?;

        if !(0.0..=1.0).contains(&self.metrics.sample_rate) {
            return Err(ConfigError::new(ConfigErrorKind::InvalidValue).field("sample_rate"));
        }

        Ok(())
    }
}

/// Config struct.
pub struct Config {
    values: ConfigValues,
    path: PathBuf,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("path", &self.path)
            .field("values", &self.values)
            .finish()
    }
}

impl Config {
    /// Loads a config from a given config folder.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let path = env::current_dir()
            .map(|x| x.join(path.as_ref()))
            .unwrap_or_else(|_| path.as_ref().to_path_buf());

        let values = ConfigValues::load(&path)?;
        values.validate()?;

        Ok(Config { values, path })
    }

    /// Creates a config from a JSON value.
    ///
    /// This is mostly useful for tests.
    pub fn from_json_value(value: serde_json::Value) -> Result<Config, ConfigError> {
        let values: ConfigValues = serde_json::from_value(value)
            .map_err(|err| ConfigError::wrap(err, ConfigErrorKind::BadJson))?;
        values.validate()?;

        Ok(Config {
            values,
            path: PathBuf::new(),
        })
    }

    /// Override configuration with values coming from other sources (e.g. env variables or
    /// command line parameters)
    ///
    /// If any override is rejected, the config is left unchanged.
    pub fn apply_override(
        &mut self,
        overrides: OverridableConfig,
    ) -> Result<&mut Self, ConfigError> {
        let mut values = self.values.clone();
        let dogstatsd = &mut values.dogstatsd;

        if let Some(hostname) = overrides.hostname {
            dogstatsd.hostname = hostname;
        }

        if let Some(namespace) = overrides.namespace {
            dogstatsd.namespace = namespace;
        }

        if let Some(batch_size) = overrides.batch_size {
            dogstatsd.batch_size = batch_size
                .parse()
                .map_err(|err| ConfigError::for_field(err, "batch_size"))?;
        }

        if let Some(workers) = overrides.workers {
            dogstatsd.workers = workers
                .parse()
                .map_err(|err| ConfigError::for_field(err, "workers"))?;
        }

        if let Some(level) = overrides.log_level {
            values.logging.level = level
                .parse::<Level>()
                .map_err(|err| ConfigError::for_field(err, "log_level"))?;
        }

        values.validate()?;
        self.values = values;
        Ok(self)
    }

    /// Checks if the config is already initialized.
    pub fn config_exists<P: AsRef<Path>>(path: P) -> bool {
        fs::metadata(ConfigValues::path(path.as_ref())).is_ok()
    }

    /// Returns the folder the config was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Dumps out a YAML string of the values.
    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(&self.values)
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::CouldNotWriteFile))
    }

    /// Returns the logging configuration.
    pub fn logging(&self) -> &LogConfig {
        &self.values.logging
    }

    /// Returns the configuration of the DogStatsD pipeline.
    pub fn dogstatsd(&self) -> &DogStatsdConfig {
        &self.values.dogstatsd
    }

    /// Returns the address of the statsd server for internal metrics, if any.
    pub fn statsd_addr(&self) -> Option<&str> {
        self.values.metrics.statsd.as_deref()
    }

    /// Returns the prefix of internal metrics.
    pub fn metrics_prefix(&self) -> &str {
        &self.values.metrics.prefix
    }

    /// Returns the default tags added to all internal metrics.
    pub fn metrics_default_tags(&self) -> &BTreeMap<String, String> {
        &self.values.metrics.default_tags
    }

    /// Returns the sample rate of internal metrics.
    pub fn metrics_sample_rate(&self) -> f64 {
        self.values.metrics.sample_rate
    }

    /// Returns the number of internal metrics buffered before dropping.
    pub fn metrics_queue_size(&self) -> usize {
        self.values.metrics.queue_size
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use intake_dogstatsd::TagCardinality;
    use intake_log::LogFormat;
    use similar_asserts::assert_eq;

    use super::*;

    fn write_config(contents: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE_NAME), contents).unwrap();
        dir
    }

    #[test]
    fn test_load_from_path() {
        let dir = write_config(
            r#"
logging:
  level: debug
  format: json
metrics:
  statsd: 127.0.0.1:8125
  default_tags:
    region: eu
dogstatsd:
  hostname: intake-1
  namespace: app.
  batch_size: 64
  tag_cardinality: orchestrator
  shutdown_timeout: 3
"#,
        );

        let config = Config::from_path(dir.path()).unwrap();
        assert_eq!(config.logging().level, Level::Debug);
        assert_eq!(config.logging().format, LogFormat::Json);
        assert_eq!(config.statsd_addr(), Some("127.0.0.1:8125"));
        assert_eq!(config.metrics_prefix(), "intake");
        assert_eq!(config.metrics_default_tags()["region"], "eu");

        let dogstatsd = config.dogstatsd();
        assert_eq!(dogstatsd.hostname, "intake-1");
        assert_eq!(dogstatsd.namespace, "app.");
        assert_eq!(dogstatsd.batch_size, 64);
        assert_eq!(dogstatsd.tag_cardinality, TagCardinality::Orchestrator);
        assert_eq!(dogstatsd.shutdown_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let dir = write_config("{}");
        let config = Config::from_path(dir.path()).unwrap();
        assert_eq!(config.statsd_addr(), None);
        assert_eq!(config.dogstatsd().batch_size, 32);
        assert_eq!(config.metrics_sample_rate(), 1.0);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!Config::config_exists(dir.path()));

        let error = Config::from_path(dir.path()).unwrap_err();
        assert_eq!(error.kind(), ConfigErrorKind::CouldNotOpenFile);
        assert!(error.to_string().contains("(file "));
        assert!(error.source().is_some());
    }

    #[test]
    fn test_bad_yaml() {
        let dir = write_config("dogstatsd: [");
        let error = Config::from_path(dir.path()).unwrap_err();
        assert_eq!(error.kind(), ConfigErrorKind::BadYaml);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let dir = write_config("dogstatsd:\n  batch_size: 0\n");
        let error = Config::from_path(dir.path()).unwrap_err();
        assert_eq!(error.kind(), ConfigErrorKind::InvalidValue);
        assert_eq!(error.to_string(), "invalid config value (field dogstatsd)");
        assert_eq!(
            error.source().unwrap().to_string(),
            "batch size must be greater than zero"
        );
    }

    #[test]
    fn test_from_json_value() {
        let config = Config::from_json_value(serde_json::json!({
            "dogstatsd": {
                "namespace_blacklist": ["datadog."],
                "entity_id_precedence": true,
            }
        }))
        .unwrap();

        assert_eq!(config.dogstatsd().namespace_blacklist, vec!["datadog."]);
        assert!(config.dogstatsd().entity_id_precedence);
        assert_eq!(config.path(), Path::new(""));
    }

    #[test]
    fn test_from_json_value_invalid_sample_rate() {
        let error = Config::from_json_value(serde_json::json!({
            "metrics": {"sample_rate": 2.0}
        }))
        .unwrap_err();
        assert_eq!(error.to_string(), "invalid config value (field sample_rate)");
    }

    #[test]
    fn test_apply_override() {
        let mut config = Config::from_json_value(serde_json::json!({})).unwrap();
        config
            .apply_override(OverridableConfig {
                hostname: Some("override-host".to_owned()),
                namespace: Some("ns.".to_owned()),
                batch_size: Some("8".to_owned()),
                workers: Some("3".to_owned()),
                log_level: Some("trace".to_owned()),
            })
            .unwrap();

        assert_eq!(config.dogstatsd().hostname, "override-host");
        assert_eq!(config.dogstatsd().namespace, "ns.");
        assert_eq!(config.dogstatsd().batch_size, 8);
        assert_eq!(config.dogstatsd().workers, 3);
        assert_eq!(config.logging().level, Level::Trace);
    }

    #[test]
    fn test_apply_override_invalid() {
        let mut config = Config::from_json_value(serde_json::json!({})).unwrap();

        let error = config
            .apply_override(OverridableConfig {
                batch_size: Some("many".to_owned()),
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(error.to_string(), "invalid config value (field batch_size)");

        let error = config
            .apply_override(OverridableConfig {
                workers: Some("0".to_owned()),
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(error.to_string(), "invalid config value (field dogstatsd)");

        let error = config
            .apply_override(OverridableConfig {
                log_level: Some("loud".to_owned()),
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(error.kind(), ConfigErrorKind::InvalidValue);
    }

    #[test]
    fn test_rejected_override_keeps_config() {
        let mut config = Config::from_json_value(serde_json::json!({
            "dogstatsd": {"namespace": "app.", "workers": 2}
        }))
        .unwrap();

        config
            .apply_override(OverridableConfig {
                namespace: Some("other.".to_owned()),
                batch_size: Some("0".to_owned()),
                ..Default::default()
            })
            .unwrap_err();

        config
            .apply_override(OverridableConfig {
                workers: Some("0".to_owned()),
                log_level: Some("debug".to_owned()),
                ..Default::default()
            })
            .unwrap_err();

        let dogstatsd = config.dogstatsd();
        assert_eq!(dogstatsd.namespace, "app.");
        assert_eq!(dogstatsd.batch_size, 32);
        assert_eq!(dogstatsd.workers, 2);
        assert_eq!(dogstatsd.validate(), Ok(()));
        assert_eq!(config.logging().level, Level::Info);
    }

    #[test]
    fn test_to_yaml_string() {
        let config = Config::from_json_value(serde_json::json!({
            "dogstatsd": {"hostname": "intake-1", "workers": 2},
        }))
        .unwrap();

        let yaml = config.to_yaml_string().unwrap();
        insta::assert_snapshot!(yaml, @r###"
        logging:
          level: info
          format: auto
          enable_backtraces: false
        metrics:
          statsd: null
          prefix: intake
          default_tags: {}
          sample_rate: 1.0
          queue_size: 10000
        dogstatsd:
          hostname: intake-1
          namespace: ''
          namespace_blacklist: []
          batch_size: 32
          entity_id_precedence: false
          tag_cardinality: low
          workers: 2
          queue_size: 1024
          pool_size: 1024
          shutdown_timeout: 10
        "###);
    }
}
