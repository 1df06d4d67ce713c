use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// 应用程序错误类型
///
/// 只有这里列出的错误会终止整个运行。单个文档的抽取失败在
/// `RetryingAnalyzer` 内部就地消化，最终以 `Outcome::Failure` 记录。
#[derive(Debug, Error)]
pub enum AppError {
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 初始化错误（任何批次开始之前）
    #[error("初始化错误: {0}")]
    Setup(#[from] SetupError),
    /// 文档加载错误
    #[error("文档加载错误: {0}")]
    Load(#[from] LoadError),
    /// 调度过程中的意外故障
    #[error("调度错误: {0}")]
    Scheduler(#[from] SchedulerError),
    /// 报告写入错误
    #[error("报告错误: {0}")]
    Report(#[from] ReportError),
}

/// 结构化抽取服务错误
///
/// 在重试上限内均可重试。
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExtractionError {
    /// 网络请求或服务端返回错误
    #[error("抽取服务调用失败 (模型: {model}): {message}")]
    Request { model: String, message: String },
    /// 返回结果为空
    #[error("抽取服务返回内容为空 (模型: {model})")]
    EmptyResponse { model: String },
    /// 返回内容不符合 schema
    #[error("抽取结果不符合 schema: {message}")]
    InvalidResponse { message: String },
    /// 单次调用超时
    #[error("抽取服务调用超时 ({limit:?})")]
    Timeout { limit: Duration },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 读取配置文件失败
    #[error("读取配置文件失败 ({path}): {source}")]
    FileReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    /// 配置项取值非法
    #[error("配置项 {field} 非法: {reason}")]
    Invalid { field: String, reason: String },
}

/// 初始化错误
#[derive(Debug, Error)]
pub enum SetupError {
    /// 缺少 API 密钥
    #[error("缺少 OPENAI_API_KEY，无法创建抽取客户端")]
    MissingApiKey,
    /// API 地址非法
    #[error("抽取服务地址非法: {url}")]
    InvalidApiBase { url: String },
    /// 参考案例文件不可读
    #[error("无法读取参考案例文件 ({path}): {source}")]
    ReferenceFileUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// 文档加载错误
#[derive(Debug, Error)]
pub enum LoadError {
    /// 读取文件或目录失败
    #[error("读取失败 ({path}): {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// docx 压缩包损坏
    #[error("docx 解析失败 ({path}): {source}")]
    DocxParseFailed {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
    /// 后台读取任务异常退出
    #[error("读取任务异常 ({path}): {reason}")]
    TaskFailed { path: PathBuf, reason: String },
}

/// 调度错误
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// 任务出现非抽取类的意外故障（panic / 被取消），整批作废
    #[error("第 {batch} 批中的文档 {document_id} 任务异常: {reason}")]
    TaskFault {
        batch: usize,
        document_id: String,
        reason: String,
    },
    /// 收到中止信号，进行中的批次被取消
    #[error("第 {batch} 批被中止，{cancelled} 个进行中的文档被取消")]
    Aborted { batch: usize, cancelled: usize },
    /// 调度器已中止过，限制器不再发放许可
    #[error("并发限制器已关闭，调度器已中止")]
    LimiterClosed,
}

/// 报告写入错误
#[derive(Debug, Error)]
pub enum ReportError {
    /// 写入文件失败
    #[error("写入报告失败 ({path}): {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// ========== 便捷构造函数 ==========

impl ExtractionError {
    /// 创建抽取服务调用错误
    pub fn request(model: impl Into<String>, message: impl ToString) -> Self {
        ExtractionError::Request {
            model: model.into(),
            message: message.to_string(),
        }
    }

    /// 创建 schema 校验错误
    pub fn invalid(message: impl ToString) -> Self {
        ExtractionError::InvalidResponse {
            message: message.to_string(),
        }
    }
}

impl ConfigError {
    /// 创建配置项非法错误
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl LoadError {
    /// 创建文件读取错误
    pub fn read_failed(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LoadError::ReadFailed {
            path: path.into(),
            source,
        }
    }
}

impl ReportError {
    /// 创建报告写入错误
    pub fn write_failed(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ReportError::WriteFailed {
            path: path.into(),
            source,
        }
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
