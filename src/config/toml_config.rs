use crate::adapters::webdriver::{DriverSettings, DEFAULT_USER_AGENT};
use crate::core::monitor::MonitorSettings;
use crate::core::reader::{
    PageSelectors, ReaderSettings, DEFAULT_FUNDING_SELECTOR, DEFAULT_IMAGE_SELECTOR, DEFAULT_TITLE_SELECTOR,
};
use crate::core::retry::RetryPolicy;
use crate::core::threshold::{ThresholdEngine, MILESTONE_UNIT};
use crate::utils::error::{MonitorError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub browser: BrowserConfig,
    pub page: PageConfig,
    pub monitor: MonitorConfig,
    pub store: StoreConfig,
    pub notify: NotifyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub webdriver_url: String,
    pub driver_path: Option<PathBuf>,
    pub driver_port: u16,
    pub request_timeout_seconds: u64,
    pub startup_timeout_seconds: u64,
    pub element_timeout_seconds: u64,
    pub poll_interval_ms: u64,
    pub user_agent: String,
    pub window_size: [u32; 2],
    pub extra_args: Vec<String>,
    pub diagnostics_dir: Option<PathBuf>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://127.0.0.1:9515".to_string(),
            driver_path: None,
            driver_port: 9515,
            request_timeout_seconds: 30,
            startup_timeout_seconds: 20,
            element_timeout_seconds: 10,
            poll_interval_ms: 250,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            window_size: [1280, 800],
            extra_args: Vec::new(),
            diagnostics_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PageConfig {
    pub allowed_url_prefix: String,
    pub title_selector: String,
    pub funding_selector: String,
    pub image_selector: String,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            allowed_url_prefix: "https://tumblbug.com/".to_string(),
            title_selector: DEFAULT_TITLE_SELECTOR.to_string(),
            funding_selector: DEFAULT_FUNDING_SELECTOR.to_string(),
            image_selector: DEFAULT_IMAGE_SELECTOR.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub interval_seconds: u64,
    pub milestone_unit: u64,
    pub memory_limit_mb: u64,
    pub watchdog_interval_seconds: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 60,
            milestone_unit: MILESTONE_UNIT,
            memory_limit_mb: 500,
            watchdog_interval_seconds: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: String,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: "./data".to_string(),
            retry_attempts: 3,
            retry_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub timeout_seconds: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self { timeout_seconds: 10 }
    }
}

impl WatchConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(MonitorError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        // 處理環境變數替換
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| MonitorError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${CHROMEDRIVER_URL})，未設定的變數保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = regex::Regex::new(r"\$\{([^}]+)\}").map_err(|e| MonitorError::ConfigError {
            message: format!("invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        let browser = &self.browser;
        if browser.driver_path.is_none() {
            validation::validate_url("browser.webdriver_url", &browser.webdriver_url)?;
        } else {
            validation::validate_positive_number("browser.driver_port", browser.driver_port.into(), 1)?;
        }
        validation::validate_positive_number("browser.request_timeout_seconds", browser.request_timeout_seconds, 1)?;
        validation::validate_positive_number("browser.startup_timeout_seconds", browser.startup_timeout_seconds, 1)?;
        validation::validate_positive_number("browser.element_timeout_seconds", browser.element_timeout_seconds, 1)?;
        validation::validate_range("browser.poll_interval_ms", browser.poll_interval_ms, 10, 10_000)?;
        validation::validate_non_empty_string("browser.user_agent", &browser.user_agent)?;
        if let Some(dir) = &browser.diagnostics_dir {
            validation::validate_path("browser.diagnostics_dir", &dir.to_string_lossy())?;
        }

        // 頁面選擇器與網址前綴
        validation::validate_url("page.allowed_url_prefix", &self.page.allowed_url_prefix)?;
        validation::validate_non_empty_string("page.title_selector", &self.page.title_selector)?;
        validation::validate_non_empty_string("page.funding_selector", &self.page.funding_selector)?;
        validation::validate_non_empty_string("page.image_selector", &self.page.image_selector)?;

        validation::validate_positive_number("monitor.interval_seconds", self.monitor.interval_seconds, 1)?;
        validation::validate_positive_number("monitor.milestone_unit", self.monitor.milestone_unit, 1)?;
        validation::validate_range("monitor.memory_limit_mb", self.monitor.memory_limit_mb, 64, 1_048_576)?;
        validation::validate_positive_number(
            "monitor.watchdog_interval_seconds",
            self.monitor.watchdog_interval_seconds,
            1,
        )?;

        validation::validate_path("store.path", &self.store.path)?;
        validation::validate_range("store.retry_attempts", self.store.retry_attempts, 1, 10)?;

        validation::validate_positive_number("notify.timeout_seconds", self.notify.timeout_seconds, 1)?;

        Ok(())
    }

    pub fn driver_settings(&self) -> DriverSettings {
        let browser = &self.browser;
        DriverSettings {
            webdriver_url: browser.webdriver_url.clone(),
            driver_path: browser.driver_path.clone(),
            driver_port: browser.driver_port,
            request_timeout: Duration::from_secs(browser.request_timeout_seconds),
            startup_timeout: Duration::from_secs(browser.startup_timeout_seconds),
            user_agent: browser.user_agent.clone(),
            window_size: (browser.window_size[0], browser.window_size[1]),
            extra_args: browser.extra_args.clone(),
        }
    }

    pub fn reader_settings(&self) -> ReaderSettings {
        ReaderSettings {
            selectors: PageSelectors {
                title: self.page.title_selector.clone(),
                funding: self.page.funding_selector.clone(),
                image: self.page.image_selector.clone(),
            },
            element_timeout: Duration::from_secs(self.browser.element_timeout_seconds),
            poll_interval: Duration::from_millis(self.browser.poll_interval_ms),
            diagnostics_dir: self.browser.diagnostics_dir.clone(),
        }
    }

    pub fn monitor_settings(&self) -> MonitorSettings {
        MonitorSettings {
            interval: Duration::from_secs(self.monitor.interval_seconds),
            engine: ThresholdEngine::new(self.monitor.milestone_unit),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.store.retry_attempts,
            delay: Duration::from_millis(self.store.retry_delay_ms),
        }
    }

    pub fn memory_limit_bytes(&self) -> u64 {
        self.monitor.memory_limit_mb.saturating_mul(1024 * 1024)
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_secs(self.monitor.watchdog_interval_seconds)
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_secs(self.notify.timeout_seconds)
    }
}

impl Validate for WatchConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = WatchConfig::from_toml_str("").unwrap();

        assert_eq!(config.browser.webdriver_url, "http://127.0.0.1:9515");
        assert_eq!(config.monitor.interval_seconds, 60);
        assert_eq!(config.monitor.milestone_unit, 1_000_000);
        assert_eq!(config.store.retry_attempts, 3);
        assert_eq!(config.page.allowed_url_prefix, "https://tumblbug.com/");
        assert_eq!(config.memory_limit_bytes(), 500 * 1024 * 1024);
        assert_eq!(config.watchdog_interval(), Duration::from_secs(3600));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_sections() {
        let toml_content = r#"
[browser]
driver_path = "/usr/local/bin/chromedriver"
driver_port = 4444
element_timeout_seconds = 5
window_size = [1920, 1080]
extra_args = ["--lang=ko-KR"]

[monitor]
interval_seconds = 120
milestone_unit = 500000

[store]
path = "./state"
retry_delay_ms = 10
"#;

        let config = WatchConfig::from_toml_str(toml_content).unwrap();
        assert!(config.validate().is_ok());

        let driver = config.driver_settings();
        assert_eq!(driver.driver_port, 4444);
        assert_eq!(driver.window_size, (1920, 1080));
        assert_eq!(driver.extra_args, vec!["--lang=ko-KR".to_string()]);

        let reader = config.reader_settings();
        assert_eq!(reader.element_timeout, Duration::from_secs(5));

        let monitor = config.monitor_settings();
        assert_eq!(monitor.interval, Duration::from_secs(120));
        assert_eq!(monitor.engine.unit(), 500_000);

        assert_eq!(config.retry_policy().delay, Duration::from_millis(10));
        assert_eq!(config.store.path, "./state");
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("FUNDING_WATCH_TEST_DRIVER", "http://chrome:4444");

        let toml_content = r#"
[browser]
webdriver_url = "${FUNDING_WATCH_TEST_DRIVER}"
"#;

        let config = WatchConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.browser.webdriver_url, "http://chrome:4444");

        std::env::remove_var("FUNDING_WATCH_TEST_DRIVER");
    }

    #[test]
    fn test_config_validation() {
        let invalid_url = WatchConfig::from_toml_str("[browser]\nwebdriver_url = \"invalid-url\"\n").unwrap();
        assert!(invalid_url.validate().is_err());

        let zero_interval = WatchConfig::from_toml_str("[monitor]\ninterval_seconds = 0\n").unwrap();
        assert!(zero_interval.validate().is_err());

        let blank_selector = WatchConfig::from_toml_str("[page]\nfunding_selector = \" \"\n").unwrap();
        assert!(blank_selector.validate().is_err());
    }

    #[test]
    fn test_memory_limit_is_bounded() {
        let tiny = WatchConfig::from_toml_str("[monitor]\nmemory_limit_mb = 16\n").unwrap();
        assert!(tiny.validate().is_err());

        let huge = WatchConfig::from_toml_str(&format!("[monitor]\nmemory_limit_mb = {}\n", i64::MAX)).unwrap();
        assert!(huge.validate().is_err());
        assert_eq!(huge.memory_limit_bytes(), u64::MAX);

        let largest = WatchConfig::from_toml_str("[monitor]\nmemory_limit_mb = 1048576\n").unwrap();
        assert!(largest.validate().is_ok());
        assert_eq!(largest.memory_limit_bytes(), 1024 * 1024 * 1024 * 1024);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = WatchConfig::from_toml_str("[monitor\ninterval_seconds = 1").unwrap_err();
        assert!(matches!(err, MonitorError::ConfigValidationError { .. }));
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[notify]\ntimeout_seconds = 3\n")
            .unwrap();

        let config = WatchConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.notify_timeout(), Duration::from_secs(3));
        assert_eq!(config.memory_limit_bytes(), 500 * 1024 * 1024);
    }
}
