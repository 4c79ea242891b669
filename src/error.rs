//! Cross-cutting failure taxonomy surfaced to callers of the message contract.
//!
//! Module-level errors (`FetchError`, `ResolveError`, `ExtractError`, ...)
//! carry the detail; each converts into one of these four kinds before it
//! crosses the service boundary.

use serde::Serialize;
use thiserror::Error;

pub const MSG_UNRECOGNIZED_SOURCE: &str = "无法识别的知乎链接，请输入回答、文章或问题链接";
pub const MSG_NO_MEDIA_FOUND: &str = "该页面未找到图片、视频或文本内容";
pub const MSG_EMPTY_PAGE: &str =
    "页面内容为空，且截图失败。可能文档需要登录、链接无效、或浏览器权限限制。";
pub const MSG_RETRIES_EXHAUSTED: &str = "多次尝试后仍无法提取内容，且截图失败";
pub const MSG_NO_FILL_TARGET: &str = "未找到可填充的输入框";
pub const MSG_UNKNOWN_PLATFORM: &str = "未知平台";
pub const MSG_NO_PLATFORMS: &str = "请至少选择一个平台";
pub const MSG_FILL_NO_RESULT: &str = "填充脚本未返回结果";
pub const MSG_NOTHING_TO_ARCHIVE: &str = "没有可下载内容";
pub const MSG_ARCHIVE_EMPTY: &str = "打包失败：没有可用资源";
pub const MSG_SYNC_ADVISORY: &str = "部分平台自动填充可能未成功，请检查页面或手动粘贴。";

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message")]
pub enum TransferError {
    /// The input URL matches no known source pattern.
    #[error("{0}")]
    UnrecognizedSource(String),

    /// Fetch, tab or injection failure.
    #[error("{0}")]
    NetworkOrPage(String),

    /// Every extraction tier came back empty.
    #[error("{0}")]
    NoContentFound(String),

    /// Neither a title nor a body target exists in the editor.
    #[error("{0}")]
    NoFillTarget(String),
}

impl TransferError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnrecognizedSource(_) => "UnrecognizedSource",
            Self::NetworkOrPage(_) => "NetworkOrPageError",
            Self::NoContentFound(_) => "NoContentFound",
            Self::NoFillTarget(_) => "NoFillTarget",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::UnrecognizedSource(m)
            | Self::NetworkOrPage(m)
            | Self::NoContentFound(m)
            | Self::NoFillTarget(m) => m,
        }
    }
}
