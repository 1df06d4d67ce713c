//! 结构化抽取客户端
//!
//! 一次调用 = 一次请求。不重试、不做并发控制，这些由上层负责。
//!
//! 请求通过 `response_format` 携带严格模式的 json_schema，
//! 服务端保证返回的 JSON 符合 AnalysisResult。
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 兼容 OpenAI API 的服务均可使用（自定义 api_base）

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequest,
        CreateChatCompletionRequestArgs, ReasoningEffort, ResponseFormat,
        ResponseFormatJsonSchema,
    },
    Client,
};
use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, warn};

use crate::clients::prompts;
use crate::config::Config;
use crate::error::{ExtractionError, SetupError};
use crate::models::AnalysisResult;

/// 抽取能力：文本 → AnalysisResult
///
/// 测试中可以用桩实现替换。
#[async_trait]
pub trait Extractor: Send + Sync {
    /// 对一篇文档发起一次抽取
    async fn extract(&self, document_text: &str) -> Result<AnalysisResult, ExtractionError>;
}

/// 基于 OpenAI 兼容接口的抽取客户端
pub struct OpenAiExtractor {
    client: Client<OpenAIConfig>,
    model_name: String,
    system_message: String,
    reference_text: String,
}

impl OpenAiExtractor {
    /// 创建新的抽取客户端
    ///
    /// 缺少密钥或地址非法时返回 `SetupError`，此时整个运行不会开始。
    /// `reference_text` 为 None 时使用随程序附带的参考判例。
    pub fn new(config: &Config, reference_text: Option<String>) -> Result<Self, SetupError> {
        if config.openai_api_key.trim().is_empty() {
            return Err(SetupError::MissingApiKey);
        }

        let api_base = config.openai_api_base.trim_end_matches('/');
        if !(api_base.starts_with("http://") || api_base.starts_with("https://")) {
            return Err(SetupError::InvalidApiBase {
                url: config.openai_api_base.clone(),
            });
        }

        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.openai_api_key)
            .with_api_base(api_base);

        Ok(Self {
            client: Client::with_config(openai_config),
            model_name: config.openai_model_name.clone(),
            system_message: prompts::build_system_message(),
            reference_text: reference_text
                .unwrap_or_else(|| prompts::REFERENCE_CASE_TEXT.to_string()),
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    fn build_messages(
        &self,
        document_text: &str,
    ) -> Result<Vec<ChatCompletionRequestMessage>, ExtractionError> {
        let system_msg = ChatCompletionRequestSystemMessageArgs::default()
            .content(self.system_message.as_str())
            .build()
            .map_err(|e| ExtractionError::request(&self.model_name, e))?;

        let user_message = prompts::build_user_message(&self.reference_text, document_text);
        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(user_message.as_str())
            .build()
            .map_err(|e| ExtractionError::request(&self.model_name, e))?;

        Ok(vec![
            ChatCompletionRequestMessage::System(system_msg),
            ChatCompletionRequestMessage::User(user_msg),
        ])
    }

    /// 构建完整请求
    ///
    /// 推理模型使用 `reasoning_effort = high` 且不带 temperature，
    /// 其他模型使用 temperature 0。
    pub fn build_request(
        &self,
        document_text: &str,
    ) -> Result<CreateChatCompletionRequest, ExtractionError> {
        let messages = self.build_messages(document_text)?;

        let response_format = ResponseFormat::JsonSchema {
            json_schema: ResponseFormatJsonSchema {
                name: prompts::SCHEMA_NAME.to_string(),
                description: None,
                schema: Some(prompts::strict_analysis_schema()),
                strict: Some(true),
            },
        };

        let mut builder = CreateChatCompletionRequestArgs::default();
        builder
            .model(&self.model_name)
            .messages(messages)
            .response_format(response_format);
        if is_reasoning_model(&self.model_name) {
            builder.reasoning_effort(ReasoningEffort::High);
        } else {
            builder.temperature(0.0_f32);
        }

        builder
            .build()
            .map_err(|e| ExtractionError::request(&self.model_name, e))
    }
}

#[async_trait]
impl Extractor for OpenAiExtractor {
    async fn extract(&self, document_text: &str) -> Result<AnalysisResult, ExtractionError> {
        debug!("调用抽取服务，模型: {}", self.model_name);
        debug!("文档长度: {} 字符", document_text.chars().count());

        let request = self.build_request(document_text)?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("抽取服务调用失败: {}", e);
            ExtractionError::request(&self.model_name, e)
        })?;

        debug!("抽取服务调用成功");

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| ExtractionError::EmptyResponse {
                model: self.model_name.clone(),
            })?;

        parse_analysis(&content)
    }
}

/// 判断是否为推理模型（o1 / o3 / o4 系列）
pub fn is_reasoning_model(model_name: &str) -> bool {
    let name = model_name.trim().to_ascii_lowercase();
    ["o1", "o3", "o4"]
        .iter()
        .any(|prefix| name == *prefix || name.starts_with(&format!("{prefix}-")))
}

/// 解析并校验服务返回的 JSON
pub fn parse_analysis(content: &str) -> Result<AnalysisResult, ExtractionError> {
    let body = strip_code_fences(content);
    serde_json::from_str::<AnalysisResult>(body).map_err(ExtractionError::invalid)
}

/// 去掉 Markdown 代码块包裹
///
/// 不支持 json_schema 的兼容服务偶尔会把 JSON 包在代码块里。
fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();

    Regex::new(r"(?s)^```[a-zA-Z]*\s*(.*?)\s*```$")
        .ok()
        .and_then(|re| re.captures(trimmed))
        .and_then(|caps| caps.get(1))
        .map_or(trimmed, |inner| inner.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_JSON: &str = r#"{
        "blue_book_citation": "Smith v. Jones, 1 So. 3d 1 (La. Ct. App. 2010)",
        "summary": "A summary.",
        "relevance_level": "Medium",
        "reasoning": "Because.",
        "key_points": ["one", "two"],
        "citations": ["Reynolds v. Bordelon"],
        "quotes": [],
        "argument": "An argument.",
        "support_level": "Supports"
    }"#;

    #[test]
    fn test_parse_plain_json() {
        let result = parse_analysis(VALID_JSON).unwrap();
        assert_eq!(result.relevance_level, "Medium");
        assert_eq!(result.key_points, vec!["one", "two"]);
    }

    #[test]
    fn test_parse_fenced_json() {
        let fenced = format!("```json\n{VALID_JSON}\n```");
        assert!(parse_analysis(&fenced).is_ok());
    }

    #[test]
    fn test_prose_around_json_is_invalid_response() {
        let chatty = format!("Here is the analysis:\n{VALID_JSON}\nLet me know.");
        let err = parse_analysis(&chatty).unwrap_err();
        assert!(matches!(err, ExtractionError::InvalidResponse { .. }));
    }

    #[test]
    fn test_schema_violation_is_invalid_response() {
        let err = parse_analysis(r#"{"summary": "only one field"}"#).unwrap_err();
        assert!(matches!(err, ExtractionError::InvalidResponse { .. }));
    }

    #[test]
    fn test_is_reasoning_model() {
        assert!(is_reasoning_model("o1"));
        assert!(is_reasoning_model("o3-mini"));
        assert!(!is_reasoning_model("gpt-4o"));
        assert!(!is_reasoning_model("o1x"));
    }

    fn extractor_for(model: &str) -> OpenAiExtractor {
        let config = Config {
            openai_api_key: "sk-test".to_string(),
            openai_model_name: model.to_string(),
            ..Config::default()
        };
        OpenAiExtractor::new(&config, None).unwrap()
    }

    #[test]
    fn test_request_carries_strict_json_schema() {
        let request = extractor_for("gpt-4o").build_request("CASE TEXT").unwrap();
        let json = serde_json::to_value(&request).unwrap();

        let format = &json["response_format"];
        assert_eq!(format["type"], "json_schema");
        assert_eq!(format["json_schema"]["name"], prompts::SCHEMA_NAME);
        assert_eq!(format["json_schema"]["strict"], true);
        assert_eq!(format["json_schema"]["schema"]["additionalProperties"], false);
        assert!(format["json_schema"]["schema"]["required"]
            .as_array()
            .unwrap()
            .contains(&serde_json::json!("support_level")));
    }

    #[test]
    fn test_reasoning_model_requests_high_effort_without_temperature() {
        let request = extractor_for("o1").build_request("CASE TEXT").unwrap();
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["reasoning_effort"], "high");
        assert!(json.get("temperature").is_none());
    }

    #[test]
    fn test_chat_model_uses_zero_temperature_without_effort() {
        let request = extractor_for("gpt-4o").build_request("CASE TEXT").unwrap();
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["temperature"], 0.0);
        assert!(json.get("reasoning_effort").is_none());
    }

    #[test]
    fn test_bundled_reference_is_sent_by_default() {
        let request = extractor_for("o1").build_request("CASE TEXT").unwrap();
        let json = serde_json::to_value(&request).unwrap();

        let user = json["messages"][1]["content"].as_str().unwrap();
        assert!(user.starts_with("# REYNOLDS v. BORDELON CASE FOR REFERENCE:"));
        assert!(user.contains("Louisiana Products Liability Act"));
        assert!(user.ends_with("CASE TEXT\n"));
    }

    #[test]
    fn test_reference_override_replaces_bundled_text() {
        let config = Config {
            openai_api_key: "sk-test".to_string(),
            ..Config::default()
        };
        let extractor = OpenAiExtractor::new(&config, Some("Custom opinion".to_string())).unwrap();
        let json = serde_json::to_value(extractor.build_request("CASE TEXT").unwrap()).unwrap();

        let user = json["messages"][1]["content"].as_str().unwrap();
        assert!(user.contains("Custom opinion"));
        assert!(!user.contains("Louisiana Products Liability Act"));
    }

    #[test]
    fn test_missing_api_key_is_setup_error() {
        let config = Config::default();
        let err = OpenAiExtractor::new(&config, None).err().unwrap();
        assert!(matches!(err, SetupError::MissingApiKey));
    }

    #[test]
    fn test_invalid_api_base_is_setup_error() {
        let config = Config {
            openai_api_key: "sk-test".to_string(),
            openai_api_base: "api.openai.com".to_string(),
            ..Config::default()
        };
        let err = OpenAiExtractor::new(&config, None).err().unwrap();
        assert!(matches!(err, SetupError::InvalidApiBase { .. }));
    }

    /// 真实服务连通性测试
    ///
    /// 运行方式：
    /// ```bash
    /// OPENAI_API_KEY=... cargo test test_live_extraction -- --ignored --nocapture
    /// ```
    #[tokio::test]
    #[ignore]
    async fn test_live_extraction() {
        let _ = tracing_subscriber::fmt::try_init();

        let config = Config::from_env().expect("配置加载失败");
        let extractor = OpenAiExtractor::new(&config, None).expect("客户端创建失败");

        let text = "The plaintiff sued for intentional spoliation of evidence. \
                    The court held that no independent tort exists after Reynolds v. Bordelon.";

        match extractor.extract(text).await {
            Ok(result) => {
                println!("✅ 抽取成功: {:#?}", result);
                assert!(!result.citation.is_empty());
            }
            Err(e) => panic!("抽取失败: {}", e),
        }
    }
}
