//! 抽取服务使用的固定指令与 schema
//!
//! 指令文本是配置产物，不是运行时计算出来的数据。

use schemars::schema_for;

use crate::models::AnalysisResult;

/// 系统指令
pub const SYSTEM_INSTRUCTION: &str = r#"You are a legal research assistant with deep knowledge of Louisiana tort law and of the reasoning in Reynolds v. Bordelon, 172 So. 3d 589 (La. 2015).

You will receive the text of a Louisiana court decision that mentions "intentional spoliation" or "impairment of a civil claim". After Reynolds, Louisiana no longer recognizes negligent spoliation as an independent tort. The research goal is to find authority for the position that the same reasoning applies to intentional spoliation, so that neither form is a standalone tort.

For the decision you are given:
1. Give its full Blue Book citation.
2. Rate its relevance to that position as exactly one of "High", "Medium" or "Low":
   - High: the court directly addresses whether intentional spoliation is a standalone tort, whichever way it rules.
   - Medium: the court discusses spoliation and tort claims without deciding the standalone question.
   - Low: spoliation is tangential to the decision.
3. Provide a 2-4 sentence summary, the reasoning for the relevance rating, key points about spoliation, the key cases cited, and direct quotes cited in Blue Book style to the exact page.
4. Many decisions pre-date Reynolds; explain how an earlier decision can still support its rationale.
5. Write the argument in the style of the analysis section of a legal brief. Every statement of fact or law must carry a Blue Book citation to the decision.
6. Rate support for the position as exactly one of "Strongly Supports", "Supports" or "Does not Support". A decision recognizing the tort is highly relevant and "Does not Support"."#;

/// 随程序附带的参考判例全文（Reynolds v. Bordelon 的姊妹案）
///
/// 未配置 `reference_case_file` 时使用。
pub const REFERENCE_CASE_TEXT: &str = include_str!("../../assets/reynolds_v_bordelon.txt");

/// structured output 使用的 schema 名称
pub const SCHEMA_NAME: &str = "case_analysis";

/// 生成 AnalysisResult 的 JSON schema
pub fn analysis_schema() -> serde_json::Value {
    let schema = schema_for!(AnalysisResult);
    serde_json::to_value(schema).unwrap_or_default()
}

/// 严格模式下可用的 schema
///
/// strict 模式要求对象显式禁止额外字段，且不接受 `$schema` 元信息。
pub fn strict_analysis_schema() -> serde_json::Value {
    let mut schema = analysis_schema();
    if let Some(object) = schema.as_object_mut() {
        object.remove("$schema");
        object.insert(
            "additionalProperties".to_string(),
            serde_json::Value::Bool(false),
        );
    }
    schema
}

/// 构建系统消息
///
/// 输出格式由请求里的 json_schema 约束，这里只重复字段名。
pub fn build_system_message() -> String {
    format!(
        "{SYSTEM_INSTRUCTION}\n\n\
         Respond with a single JSON object containing all of these fields: \
         blue_book_citation, summary, relevance_level, reasoning, key_points, citations, quotes, \
         argument, support_level."
    )
}

/// 构建用户消息
///
/// 参考案例非空时，先给出参考案例全文，再给出待分析案例。
pub fn build_user_message(reference_text: &str, document_text: &str) -> String {
    let mut message = String::new();
    if !reference_text.trim().is_empty() {
        message.push_str("# REYNOLDS v. BORDELON CASE FOR REFERENCE:\n\n");
        message.push_str(reference_text.trim());
        message.push_str("\n\n");
    }
    message.push_str("# THE CASE TEXT YOU ARE ANALYZING:\n\n");
    message.push_str(
        "IMPORTANT: The argument must be written like the analysis section of a legal brief, \
         with a Blue Book citation to this case for every statement of fact or law.\n\n",
    );
    message.push_str(document_text);
    message.push('\n');
    message
}
