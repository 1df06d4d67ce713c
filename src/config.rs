//! 程序配置
//!
//! 加载顺序：默认值 → TOML 配置文件（可选）→ 环境变量（含 `.env`）。
//! 配置在启动时构造一次，之后以引用方式传给调度器与分析器。

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// 默认配置文件名
pub const DEFAULT_CONFIG_FILE: &str = "case_analysis.toml";

/// 指定配置文件路径的环境变量
pub const CONFIG_PATH_VAR: &str = "CASE_ANALYSIS_CONFIG";

/// 程序配置文件
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// 每批同时处理的文档数量
    pub max_concurrent_requests: usize,
    /// 单个文档的最大重试次数（总尝试次数 = 重试次数 + 1）
    pub max_retries: u32,
    /// 退避基础时长（秒），第 n 次重试前等待 `retry_delay * 2^n`
    pub retry_delay_secs: u64,
    /// 单次调用超时（秒），0 表示不限制
    pub request_timeout_secs: u64,
    /// 单个文档整个重试序列的超时（秒），0 表示不限制
    pub document_timeout_secs: u64,
    /// 输入文档目录
    pub input_folder: String,
    /// 报告输出目录
    pub output_folder: String,
    /// 参考案例文本文件（可选），会附加在每次请求之前
    pub reference_case_file: Option<String>,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    // --- 抽取服务配置 ---
    pub openai_api_key: String,
    pub openai_api_base: String,
    pub openai_model_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 10,
            max_retries: 1,
            retry_delay_secs: 1,
            request_timeout_secs: 300,
            document_timeout_secs: 0,
            input_folder: "input_docs".to_string(),
            output_folder: "analysis_results".to_string(),
            reference_case_file: None,
            verbose_logging: false,
            openai_api_key: String::new(),
            openai_api_base: "https://api.openai.com/v1".to_string(),
            openai_model_name: "o1".to_string(),
        }
    }
}

impl Config {
    /// 从默认位置加载配置
    ///
    /// 先读取 `.env`，再读取 `CASE_ANALYSIS_CONFIG` 指定的（或默认的）TOML 文件，
    /// 最后用环境变量覆盖。
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// 按给定的变量来源加载配置
    ///
    /// 显式指定的配置文件必须存在，读不到时报错；
    /// 默认配置文件不存在时使用默认值。
    pub fn load_with<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base = match lookup(CONFIG_PATH_VAR).filter(|p| !p.trim().is_empty()) {
            Some(explicit) => Self::from_toml_file(Path::new(&explicit))?,
            None => {
                let path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    Self::from_toml_file(&path)?
                } else {
                    Self::default()
                }
            }
        };

        base.with_env_overrides(lookup)
    }

    /// 仅从环境变量加载（不读取配置文件）
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides(|key| std::env::var(key).ok())
    }

    /// 从 TOML 文件加载
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::TomlParseFailed {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 用外部变量覆盖配置项
    ///
    /// `lookup` 通常是 `std::env::var`，测试中可以传入任意映射。
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_var(&lookup, "MAX_CONCURRENT_REQUESTS", "usize")? {
            self.max_concurrent_requests = v;
        }
        if let Some(v) = parse_var(&lookup, "MAX_RETRIES", "u32")? {
            self.max_retries = v;
        }
        if let Some(v) = parse_var(&lookup, "RETRY_DELAY", "u64")? {
            self.retry_delay_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "REQUEST_TIMEOUT_SECS", "u64")? {
            self.request_timeout_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "DOCUMENT_TIMEOUT_SECS", "u64")? {
            self.document_timeout_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "VERBOSE_LOGGING", "bool")? {
            self.verbose_logging = v;
        }
        if let Some(v) = lookup("INPUT_FOLDER") {
            self.input_folder = v;
        }
        if let Some(v) = lookup("OUTPUT_FOLDER") {
            self.output_folder = v;
        }
        if let Some(v) = lookup("REFERENCE_CASE_FILE") {
            self.reference_case_file = Some(v).filter(|s| !s.trim().is_empty());
        }
        if let Some(v) = lookup("OPENAI_API_KEY") {
            self.openai_api_key = v;
        }
        if let Some(v) = lookup("OPENAI_API_BASE") {
            self.openai_api_base = v;
        }
        if let Some(v) = lookup("OPENAI_MODEL_NAME") {
            self.openai_model_name = v;
        }

        self.validate()?;
        Ok(self)
    }

    /// 校验配置
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_requests == 0 {
            return Err(ConfigError::invalid(
                "max_concurrent_requests",
                "每批并发数必须大于 0",
            ));
        }
        if self.openai_model_name.trim().is_empty() {
            return Err(ConfigError::invalid("openai_model_name", "模型名称不能为空"));
        }
        Ok(())
    }

    /// 退避基础时长
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    /// 单次调用超时
    pub fn request_timeout(&self) -> Option<Duration> {
        non_zero_secs(self.request_timeout_secs)
    }

    /// 单个文档超时
    pub fn document_timeout(&self) -> Option<Duration> {
        non_zero_secs(self.document_timeout_secs)
    }
}

fn non_zero_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

fn parse_var<T, F>(lookup: &F, name: &str, expected_type: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::EnvVarParseFailed {
                var_name: name.to_string(),
                value: raw,
                expected_type: expected_type.to_string(),
            }),
    }
}
