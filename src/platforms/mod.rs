//! Publishing targets: editor URL, selector tables and per-platform strategies.
//!
//! The table is immutable once built. The built-in entries can be replaced
//! wholesale from a JSON file so that selector lists track editor redesigns
//! without a rebuild.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillStrategy {
    /// Paste, insert-HTML, DOM rebuild, plain text, stopping at the first that sticks.
    #[default]
    Escalating,
    /// Rebuild the editor DOM directly.
    Direct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteImagePolicy {
    #[default]
    Keep,
    /// Remote images become link paragraphs; unusable sources become placeholders.
    LinkOut,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadEndpoint {
    pub url: String,
    pub field: String,
    #[serde(default)]
    pub extra_fields: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointUpload {
    /// Tried in order until one yields a hosted URL.
    pub endpoints: Vec<UploadEndpoint>,
    /// Template with an `{id}` placeholder, used when an endpoint answers with an id only.
    #[serde(default)]
    pub lookup_url: Option<String>,
    /// URL whose session cookies authorize the upload.
    pub session_url: String,
    pub csrf_cookie: String,
    pub csrf_header: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UploadStrategy {
    /// Inline images are passed through as-is.
    #[default]
    None,
    /// Inline images are uploaded to the platform before filling.
    Endpoint(EndpointUpload),
    /// Inline images are handed to the editor's own upload handling as files.
    NativeEditor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformTarget {
    pub key: String,
    pub display_name: String,
    pub editor_url: String,
    pub title_selectors: Vec<String>,
    pub body_selectors: Vec<String>,
    #[serde(default)]
    pub fill_strategy: FillStrategy,
    #[serde(default)]
    pub remote_images: RemoteImagePolicy,
    #[serde(default)]
    pub upload: UploadStrategy,
}

#[derive(Error, Debug)]
pub enum PlatformTableError {
    #[error("failed to read platform table: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid platform table: {0}")]
    Json(#[from] serde_json::Error),

    #[error("platform table is empty")]
    Empty,

    #[error("duplicate platform key: {0}")]
    DuplicateKey(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformTable {
    targets: BTreeMap<String, PlatformTarget>,
}

impl PlatformTable {
    pub fn new(targets: Vec<PlatformTarget>) -> Result<Self, PlatformTableError> {
        if targets.is_empty() {
            return Err(PlatformTableError::Empty);
        }
        let mut map = BTreeMap::new();
        for target in targets {
            let key = target.key.clone();
            if map.insert(key.clone(), target).is_some() {
                return Err(PlatformTableError::DuplicateKey(key));
            }
        }
        Ok(Self { targets: map })
    }

    pub fn from_json(json: &str) -> Result<Self, PlatformTableError> {
        let targets: Vec<PlatformTarget> = serde_json::from_str(json)?;
        Self::new(targets)
    }

    pub fn load(path: &Path) -> Result<Self, PlatformTableError> {
        let json = std::fs::read_to_string(path)?;
        let table = Self::from_json(&json)?;
        info!(path = %path.display(), platforms = table.len(), "loaded platform table");
        Ok(table)
    }

    pub fn get(&self, key: &str) -> Option<&PlatformTarget> {
        self.targets.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.targets.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlatformTarget> {
        self.targets.values()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn to_json(&self) -> Result<String, PlatformTableError> {
        Ok(serde_json::to_string_pretty(
            &self.targets.values().collect::<Vec<_>>(),
        )?)
    }

    pub fn builtin() -> Self {
        let targets = vec![xiaohongshu(), zhihu(), tencent_cloud()];
        Self {
            targets: targets.into_iter().map(|t| (t.key.clone(), t)).collect(),
        }
    }
}

impl Default for PlatformTable {
    fn default() -> Self {
        Self::builtin()
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn xiaohongshu() -> PlatformTarget {
    PlatformTarget {
        key: "xiaohongshu".into(),
        display_name: "小红书".into(),
        editor_url: "https://creator.xiaohongshu.com/publish/publish?source=official".into(),
        title_selectors: strings(&[
            r#"input[placeholder*="标题"]"#,
            r#"input[placeholder*="填写标题"]"#,
            r#"textarea[placeholder*="标题"]"#,
            r#"[contenteditable="true"][data-placeholder*="标题"]"#,
            r#"input[type="text"]"#,
        ]),
        body_selectors: strings(&[
            r#"[contenteditable="true"]"#,
            r#"textarea[placeholder*="内容"]"#,
            r#"textarea[placeholder*="正文"]"#,
            ".ql-editor",
            r#"[role="textbox"]"#,
            "div[contenteditable]",
            "textarea",
        ]),
        fill_strategy: FillStrategy::Direct,
        remote_images: RemoteImagePolicy::Keep,
        upload: UploadStrategy::None,
    }
}

fn zhihu() -> PlatformTarget {
    let endpoint = |url: &str, field: &str, extra: &[(&str, &str)]| UploadEndpoint {
        url: url.into(),
        field: field.into(),
        extra_fields: extra
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    };
    PlatformTarget {
        key: "zhihu".into(),
        display_name: "知乎".into(),
        editor_url: "https://zhuanlan.zhihu.com/write".into(),
        title_selectors: strings(&[
            r#"textarea[placeholder*="标题"]"#,
            r#"input[placeholder*="标题"]"#,
            r#"[contenteditable="true"][data-placeholder*="标题"]"#,
            ".WriteIndex-titleInput textarea",
            ".WriteIndex-titleInput input",
            r#"h1[contenteditable="true"]"#,
        ]),
        body_selectors: strings(&[
            r#".ProseMirror[contenteditable="true"]"#,
            r#"[data-contents="true"] [contenteditable="true"]"#,
            r#".public-DraftEditor-content [contenteditable="true"]"#,
            r#"div[role="textbox"][contenteditable="true"]"#,
            ".ql-editor",
            "textarea",
        ]),
        fill_strategy: FillStrategy::Escalating,
        remote_images: RemoteImagePolicy::Keep,
        upload: UploadStrategy::Endpoint(EndpointUpload {
            endpoints: vec![
                endpoint("https://zhuanlan.zhihu.com/api/uploaded_images", "file", &[]),
                endpoint("https://zhuanlan.zhihu.com/api/uploaded_images", "picture", &[]),
                endpoint("https://api.zhihu.com/images", "file", &[("source", "article")]),
            ],
            lookup_url: Some("https://api.zhihu.com/images/{id}".into()),
            session_url: "https://zhuanlan.zhihu.com".into(),
            csrf_cookie: "_xsrf".into(),
            csrf_header: "x-xsrftoken".into(),
        }),
    }
}

fn tencent_cloud() -> PlatformTarget {
    PlatformTarget {
        key: "tencentcloud".into(),
        display_name: "腾讯云开发者社区".into(),
        editor_url: "https://cloud.tencent.com/developer/article/write-new".into(),
        title_selectors: strings(&[
            r#"input[placeholder*="标题"]"#,
            r#"textarea[placeholder*="标题"]"#,
            r#"input[type="text"]"#,
            r#"[contenteditable="true"][data-placeholder*="标题"]"#,
        ]),
        body_selectors: strings(&[
            r#".ProseMirror[contenteditable="true"]"#,
            ".ql-editor",
            r#".public-DraftEditor-content [contenteditable="true"]"#,
            r#"div[role="textbox"][contenteditable="true"]"#,
            r#"[contenteditable="true"]"#,
            r#"textarea[placeholder*="正文"]"#,
            r#"textarea[placeholder*="内容"]"#,
            "textarea",
        ]),
        fill_strategy: FillStrategy::Escalating,
        remote_images: RemoteImagePolicy::LinkOut,
        upload: UploadStrategy::NativeEditor,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_has_three_platforms() {
        let table = PlatformTable::builtin();
        assert_eq!(
            table.keys().collect::<Vec<_>>(),
            vec!["tencentcloud", "xiaohongshu", "zhihu"]
        );
        assert!(matches!(
            table.get("zhihu").unwrap().upload,
            UploadStrategy::Endpoint(_)
        ));
        assert_eq!(
            table.get("tencentcloud").unwrap().remote_images,
            RemoteImagePolicy::LinkOut
        );
    }

    #[test]
    fn json_round_trip_preserves_table() {
        let table = PlatformTable::builtin();
        let json = table.to_json().unwrap();
        assert_eq!(PlatformTable::from_json(&json).unwrap(), table);
    }

    #[test]
    fn minimal_json_entry_uses_defaults() {
        let json = r#"[{
            "key": "blog",
            "display_name": "Blog",
            "editor_url": "https://blog.example.com/new",
            "title_selectors": ["input[name=title]"],
            "body_selectors": ["textarea"]
        }]"#;
        let table = PlatformTable::from_json(json).unwrap();
        let blog = table.get("blog").unwrap();
        assert_eq!(blog.fill_strategy, FillStrategy::Escalating);
        assert_eq!(blog.upload, UploadStrategy::None);
    }

    #[test]
    fn rejects_empty_and_duplicate_tables() {
        assert!(matches!(
            PlatformTable::from_json("[]"),
            Err(PlatformTableError::Empty)
        ));
        let dup = vec![xiaohongshu(), xiaohongshu()];
        assert!(matches!(
            PlatformTable::new(dup),
            Err(PlatformTableError::DuplicateKey(k)) if k == "xiaohongshu"
        ));
    }
}
