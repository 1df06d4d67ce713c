use std::io::Read;
use std::path::{Path, PathBuf};

use regex::Regex;
use tokio::fs;
use tracing::{info, warn};
use zip::ZipArchive;

use crate::error::LoadError;
use crate::models::document::Document;

/// 支持的文档扩展名
const SUPPORTED_EXTENSIONS: [&str; 3] = ["txt", "md", "docx"];

/// 读取单个文档并转换为 Document 对象
///
/// 文档标识取文件名。
pub async fn load_document(path: &Path) -> Result<Document, LoadError> {
    let id = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());

    let text = match extension_of(path).as_deref() {
        Some("docx") => {
            let owned = path.to_path_buf();
            tokio::task::spawn_blocking(move || extract_docx_text(&owned))
                .await
                .map_err(|e| LoadError::TaskFailed {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })??
        }
        _ => fs::read_to_string(path)
            .await
            .map_err(|e| LoadError::read_failed(path, e))?,
    };

    Ok(Document::new(id, text))
}

/// 从文件夹中加载所有支持的文档
///
/// - 文件夹不存在时自动创建并返回空列表
/// - 按文件名排序，保证每次运行的输入顺序一致
/// - 单个文件读取失败只记录警告并跳过
pub async fn load_all_documents(folder_path: &str) -> Result<Vec<Document>, LoadError> {
    let folder = PathBuf::from(folder_path);

    if !folder.exists() {
        warn!("⚠️ 输入文件夹不存在，已创建: {}", folder_path);
        fs::create_dir_all(&folder)
            .await
            .map_err(|e| LoadError::read_failed(&folder, e))?;
        return Ok(Vec::new());
    }

    let mut paths = Vec::new();
    let mut entries = fs::read_dir(&folder)
        .await
        .map_err(|e| LoadError::read_failed(&folder, e))?;

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| LoadError::read_failed(&folder, e))?
    {
        let path = entry.path();
        let supported = extension_of(&path)
            .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
            .unwrap_or(false);
        // Word 打开文件时留下的锁文件
        let is_lock_file = path
            .file_name()
            .map(|n| n.to_string_lossy().starts_with("~$"))
            .unwrap_or(false);
        if supported && !is_lock_file && path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();

    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        match load_document(&path).await {
            Ok(document) => {
                info!("✓ 成功读取 {} ({} 字符)", document.id, document.text.chars().count());
                documents.push(document);
            }
            Err(e) => {
                warn!("❌ 读取文件失败 {}: {}", path.display(), e);
            }
        }
    }

    Ok(documents)
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_ascii_lowercase())
}

/// 读取 docx 正文（阻塞调用）
fn extract_docx_text(path: &Path) -> Result<String, LoadError> {
    let file = std::fs::File::open(path).map_err(|e| LoadError::read_failed(path, e))?;
    let to_docx_error = |source| LoadError::DocxParseFailed {
        path: path.to_path_buf(),
        source,
    };

    let mut archive = ZipArchive::new(file).map_err(to_docx_error)?;
    let mut entry = archive.by_name("word/document.xml").map_err(to_docx_error)?;

    let mut xml = String::new();
    entry
        .read_to_string(&mut xml)
        .map_err(|e| LoadError::read_failed(path, e))?;

    Ok(docx_xml_to_text(&xml))
}

/// 将 `word/document.xml` 转为纯文本，每个段落一行
///
/// 自闭合的空段落 `<w:p .../>` 不产生输出；
/// 段内的 `<w:tab/>` 转为制表符，`<w:br/>` / `<w:cr/>` 转为换行。
pub fn docx_xml_to_text(xml: &str) -> String {
    // 开始标签的最后一个字符不能是 '/'，否则是自闭合段落
    let (Ok(paragraph_re), Ok(token_re)) = (
        Regex::new(r"(?s)<w:p(?:\s+[^>]*[^/>\s])?\s*>.*?</w:p>"),
        Regex::new(r"(?s)<w:t(?:\s[^>]*)?>(.*?)</w:t>|<w:tab\s*/>|<w:(?:br|cr)(?:\s[^>]*)?/>"),
    ) else {
        return String::new();
    };

    paragraph_re
        .find_iter(xml)
        .map(|paragraph| {
            token_re
                .captures_iter(paragraph.as_str())
                .map(|caps| match caps.get(1) {
                    Some(text) => unescape_xml(text.as_str()),
                    None if caps[0].starts_with("<w:tab") => "\t".to_string(),
                    None => "\n".to_string(),
                })
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn unescape_xml(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
