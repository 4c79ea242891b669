mod helpers;

use contentshare::{
    config::Config,
    dom::EditorBehavior,
    error::{MSG_NO_FILL_TARGET, MSG_NO_PLATFORMS, MSG_SYNC_ADVISORY, MSG_UNKNOWN_PLATFORM},
    fetcher::build_client,
    fill::FillConfig,
    orchestrator::{Publisher, SyncError, SyncRequest},
    platforms::{
        EndpointUpload, FillStrategy, PlatformTable, PlatformTarget, RemoteImagePolicy,
        UploadEndpoint, UploadStrategy,
    },
    service::{ContentShareService, Request, Response},
    upload::datauri,
};
use helpers::{FakeBrowser, RecordingNotifier, fast_orchestrator, png_bytes};
use std::collections::BTreeMap;
use std::time::Duration;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{header, method, path},
};

const XHS_EDITOR: &str =
    r#"<input placeholder="填写标题"><textarea placeholder="输入正文内容"></textarea>"#;
const RICH_EDITOR: &str =
    r#"<textarea placeholder="请输入标题"></textarea><div class="ProseMirror" contenteditable="true"></div>"#;

fn fast_fill() -> FillConfig {
    FillConfig {
        image_poll_interval: Duration::from_millis(1),
        image_poll_timeout: Duration::from_millis(5),
        ..FillConfig::default()
    }
}

fn request(body: &str, platforms: &[&str]) -> SyncRequest {
    SyncRequest {
        title: "发布测试".into(),
        body_markup: body.into(),
        cover_url: String::new(),
        platforms: platforms.iter().map(|p| p.to_string()).collect(),
    }
}

fn endpoint_platform(upload_url: &str) -> PlatformTarget {
    PlatformTarget {
        key: "column".into(),
        display_name: "Column".into(),
        editor_url: "https://write.column.test/new".into(),
        title_selectors: vec![r#"textarea[placeholder*="标题"]"#.into()],
        body_selectors: vec![r#".ProseMirror[contenteditable="true"]"#.into()],
        fill_strategy: FillStrategy::Escalating,
        remote_images: RemoteImagePolicy::Keep,
        upload: UploadStrategy::Endpoint(EndpointUpload {
            endpoints: vec![UploadEndpoint {
                url: upload_url.into(),
                field: "file".into(),
                extra_fields: BTreeMap::new(),
            }],
            lookup_url: None,
            session_url: "https://write.column.test".into(),
            csrf_cookie: "_xsrf".into(),
            csrf_header: "x-xsrftoken".into(),
        }),
    }
}

fn body_with_image() -> String {
    format!(
        r#"<p>Intro paragraph with plenty of words for the editor.</p><img src="{}" alt="fig">"#,
        datauri::encode(Some("image/png"), &png_bytes(32, 32))
    )
}

#[tokio::test]
async fn test_unknown_platform_does_not_stop_others() {
    let browser = FakeBrowser::new().with_editor(
        "https://creator.xiaohongshu.com/",
        XHS_EDITOR,
        EditorBehavior::default(),
    );
    let table = PlatformTable::builtin();
    let notifier = RecordingNotifier::shared();
    let publisher = Publisher::new(&browser, &table, build_client().unwrap())
        .with_timing(&fast_orchestrator())
        .with_fill_config(fast_fill())
        .with_notifier(notifier.clone());

    let report = publisher
        .sync(&request("<p>正文内容</p>", &["xiaohongshu", "nope"]))
        .await
        .unwrap();

    assert!(report.results["xiaohongshu"].success);
    assert!(!report.results["nope"].success);
    assert_eq!(report.results["nope"].error, MSG_UNKNOWN_PLATFORM);
    assert_eq!(notifier.count(), 1);
    assert_eq!(notifier.messages.lock().unwrap()[0].1, MSG_SYNC_ADVISORY);

    // editor tabs stay open for the user
    assert_eq!(browser.open_tabs().len(), 1);
    assert!(browser.closed_tabs().is_empty());
    let doc = browser.editor_document(1).unwrap();
    let title = contentshare::dom::select_first(&doc, "input").unwrap();
    assert_eq!(contentshare::dom::attr(&title, "value").as_deref(), Some("发布测试"));
}

#[tokio::test]
async fn test_platform_without_widgets_fails_alone() {
    let browser = FakeBrowser::new()
        .with_editor("https://creator.xiaohongshu.com/", XHS_EDITOR, EditorBehavior::default())
        .with_editor("https://zhuanlan.zhihu.com/", "<div>maintenance</div>", EditorBehavior::default());
    let table = PlatformTable::builtin();
    let notifier = RecordingNotifier::shared();
    let publisher = Publisher::new(&browser, &table, build_client().unwrap())
        .with_timing(&fast_orchestrator())
        .with_fill_config(fast_fill())
        .with_notifier(notifier.clone());

    let report = publisher
        .sync(&request("<p>正文内容</p>", &["zhihu", "xiaohongshu"]))
        .await
        .unwrap();

    assert_eq!(report.results["zhihu"].error, MSG_NO_FILL_TARGET);
    assert!(report.results["xiaohongshu"].success);
    assert_eq!(notifier.count(), 1);
}

#[tokio::test]
async fn test_all_succeeding_raises_no_advisory() {
    let browser = FakeBrowser::new().with_editor(
        "https://creator.xiaohongshu.com/",
        XHS_EDITOR,
        EditorBehavior::default(),
    );
    let table = PlatformTable::builtin();
    let notifier = RecordingNotifier::shared();
    let publisher = Publisher::new(&browser, &table, build_client().unwrap())
        .with_timing(&fast_orchestrator())
        .with_notifier(notifier.clone());

    let report = publisher
        .sync(&request("<p>正文</p>", &["xiaohongshu"]))
        .await
        .unwrap();
    assert!(report.all_succeeded());
    assert_eq!(notifier.count(), 0);
}

#[tokio::test]
async fn test_empty_platform_list_is_rejected() {
    let browser = FakeBrowser::new();
    let table = PlatformTable::builtin();
    let publisher = Publisher::new(&browser, &table, build_client().unwrap());

    let err = publisher.sync(&request("<p>x</p>", &[])).await.unwrap_err();
    assert!(matches!(err, SyncError::NoPlatforms));
    assert!(browser.open_tabs().is_empty());
}

#[tokio::test]
async fn test_inline_images_are_uploaded_before_filling() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload"))
        .and(header("x-xsrftoken", "tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "url": "https://pic.column.test/hosted.png"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let table = PlatformTable::new(vec![endpoint_platform(&format!("{}/upload", mock_server.uri()))]).unwrap();
    let browser = FakeBrowser::new()
        .with_editor("https://write.column.test/", RICH_EDITOR, EditorBehavior::default())
        .with_cookies(&[("_xsrf", "tok"), ("z_c0", "session")]);
    let publisher = Publisher::new(&browser, &table, build_client().unwrap())
        .with_timing(&fast_orchestrator())
        .with_fill_config(fast_fill());

    let report = publisher.sync(&request(&body_with_image(), &["column"])).await.unwrap();

    assert!(report.results["column"].success, "{:?}", report.results["column"]);
    let html = browser.editor_html(1, ".ProseMirror").unwrap();
    assert!(html.contains("https://pic.column.test/hosted.png"));
    assert!(!html.contains("data:"));
}

#[tokio::test]
async fn test_missing_session_drops_inline_images() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let table = PlatformTable::new(vec![endpoint_platform(&format!("{}/upload", mock_server.uri()))]).unwrap();
    let browser = FakeBrowser::new().with_editor(
        "https://write.column.test/",
        RICH_EDITOR,
        EditorBehavior::default(),
    );
    let publisher = Publisher::new(&browser, &table, build_client().unwrap())
        .with_timing(&fast_orchestrator())
        .with_fill_config(fast_fill());

    let report = publisher.sync(&request(&body_with_image(), &["column"])).await.unwrap();

    assert!(report.results["column"].success);
    let html = browser.editor_html(1, ".ProseMirror").unwrap();
    assert!(html.contains("[fig]"));
    assert!(!html.contains("data:"));
}

#[tokio::test]
async fn test_service_reports_sync_results() {
    let browser = FakeBrowser::new().with_editor(
        "https://creator.xiaohongshu.com/",
        XHS_EDITOR,
        EditorBehavior::default(),
    );
    let config = Config::default().with_orchestrator(fast_orchestrator());
    let service = ContentShareService::new(&browser, &config, PlatformTable::builtin(), build_client().unwrap())
        .with_notifier(RecordingNotifier::shared());

    let response = service
        .handle(Request::Sync(request("<p>正文</p>", &["xiaohongshu"])))
        .await;
    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["type"], "SYNC_RESULT");
    assert_eq!(json["success"], true);
    assert_eq!(json["results"]["xiaohongshu"]["success"], true);

    let response = service.handle(Request::Sync(request("<p>x</p>", &[]))).await;
    assert_eq!(
        response,
        Response::SyncResult {
            success: false,
            results: None,
            error: Some(MSG_NO_PLATFORMS.to_string()),
        }
    );
}
