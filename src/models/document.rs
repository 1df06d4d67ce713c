/// 待分析的文档
///
/// 读取后不可变；处理期间由负责它的任务独占。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// 文档标识（通常为文件名），同一次运行内唯一
    pub id: String,
    /// 纯文本内容
    pub text: String,
}

impl Document {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}
