use webdav_core::body::Body;
use webdav_core::memfs::MemFs;
use webdav_core::DavHandler;
use http::{Request, StatusCode};

fn setup() -> DavHandler {
    DavHandler::builder().filesystem(MemFs::new()).build_handler()
}

async fn body_string(resp: http::Response<Body>) -> String {
    use futures_util::StreamExt;
    let mut body = resp.into_body();
    let mut data = Vec::new();
    while let Some(chunk) = body.next().await {
        data.extend_from_slice(&chunk.unwrap());
    }
    String::from_utf8_lossy(&data).into_owned()
}

fn req(method: &str, uri: &str) -> http::request::Builder {
    Request::builder().method(method).uri(uri)
}

#[tokio::test]
async fn put_then_get_roundtrip() {
    let server = setup();

    let resp = server.handle(req("PUT", "/hello.txt").body(Body::from("hello world")).unwrap()).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = server.handle(req("PUT", "/hello.txt").body(Body::from("bye")).unwrap()).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = server.handle(req("GET", "/hello.txt").body(Body::empty()).unwrap()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_string(resp).await, "bye");
}

#[tokio::test]
async fn get_missing_is_not_found() {
    let server = setup();
    let resp = server.handle(req("GET", "/nope.txt").body(Body::empty()).unwrap()).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn mkcol_then_mkcol_again_is_method_not_allowed() {
    let server = setup();

    let resp = server.handle(req("MKCOL", "/dir").body(Body::empty()).unwrap()).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = server.handle(req("MKCOL", "/dir").body(Body::empty()).unwrap()).await;
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn mkcol_without_parent_is_conflict() {
    let server = setup();
    let resp = server.handle(req("MKCOL", "/missing/dir").body(Body::empty()).unwrap()).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn propfind_reports_live_properties() {
    let server = setup();
    server.handle(req("PUT", "/a.txt").body(Body::from("12345")).unwrap()).await;

    let resp = server.handle(req("PROPFIND", "/a.txt").header("depth", "0").body(Body::empty()).unwrap()).await;
    assert_eq!(resp.status(), StatusCode::MULTI_STATUS);
    let text = body_string(resp).await;
    assert!(text.contains("getcontentlength"));
    assert!(text.contains("5"));
    assert!(text.contains("/a.txt"));
}

#[tokio::test]
async fn propfind_depth_one_lists_children() {
    let server = setup();
    server.handle(req("MKCOL", "/dir").body(Body::empty()).unwrap()).await;
    server.handle(req("PUT", "/dir/child.txt").body(Body::from("x")).unwrap()).await;

    let resp = server.handle(req("PROPFIND", "/dir").header("depth", "1").body(Body::empty()).unwrap()).await;
    assert_eq!(resp.status(), StatusCode::MULTI_STATUS);
    let text = body_string(resp).await;
    assert!(text.contains("/dir/child.txt"));
}

#[tokio::test]
async fn proppatch_set_then_propfind_named() {
    let server = setup();
    server.handle(req("PUT", "/a.txt").body(Body::from("x")).unwrap()).await;

    let set_body = r#"<?xml version="1.0"?>
        <propertyupdate xmlns="DAV:">
          <set><prop><color xmlns="http://example.com/">green</color></prop></set>
        </propertyupdate>"#;
    let resp = server.handle(req("PROPPATCH", "/a.txt").body(Body::from(set_body)).unwrap()).await;
    assert_eq!(resp.status(), StatusCode::MULTI_STATUS);
    let text = body_string(resp).await;
    assert!(text.contains("200"));

    let find_body = r#"<?xml version="1.0"?>
        <propfind xmlns="DAV:"><prop><color xmlns="http://example.com/"/></prop></propfind>"#;
    let resp = server.handle(req("PROPFIND", "/a.txt").body(Body::from(find_body)).unwrap()).await;
    assert_eq!(resp.status(), StatusCode::MULTI_STATUS);
    let text = body_string(resp).await;
    assert!(text.contains("green"));
}

#[tokio::test]
async fn proppatch_rejects_protected_property() {
    let server = setup();
    server.handle(req("PUT", "/a.txt").body(Body::from("x")).unwrap()).await;

    let set_body = r#"<?xml version="1.0"?>
        <propertyupdate xmlns="DAV:"><set><prop><getetag/></prop></set></propertyupdate>"#;
    let resp = server.handle(req("PROPPATCH", "/a.txt").body(Body::from(set_body)).unwrap()).await;
    assert_eq!(resp.status(), StatusCode::MULTI_STATUS);
    let text = body_string(resp).await;
    assert!(text.contains("403"));
}

#[tokio::test]
async fn copy_duplicates_resource() {
    let server = setup();
    server.handle(req("PUT", "/a.txt").body(Body::from("x")).unwrap()).await;

    let resp = server.handle(req("COPY", "/a.txt").header("destination", "/b.txt").body(Body::empty()).unwrap()).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = server.handle(req("GET", "/a.txt").body(Body::empty()).unwrap()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let resp = server.handle(req("GET", "/b.txt").body(Body::empty()).unwrap()).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn move_relocates_resource() {
    let server = setup();
    server.handle(req("PUT", "/a.txt").body(Body::from("x")).unwrap()).await;

    let resp = server.handle(req("MOVE", "/a.txt").header("destination", "/b.txt").body(Body::empty()).unwrap()).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = server.handle(req("GET", "/a.txt").body(Body::empty()).unwrap()).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let resp = server.handle(req("GET", "/b.txt").body(Body::empty()).unwrap()).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn move_onto_existing_without_overwrite_is_precondition_failed() {
    let server = setup();
    server.handle(req("PUT", "/a.txt").body(Body::from("x")).unwrap()).await;
    server.handle(req("PUT", "/b.txt").body(Body::from("y")).unwrap()).await;

    let resp = server
        .handle(req("MOVE", "/a.txt").header("destination", "/b.txt").header("overwrite", "F").body(Body::empty()).unwrap())
        .await;
    assert_eq!(resp.status(), StatusCode::PRECONDITION_FAILED);
}

#[tokio::test]
async fn delete_removes_collection_recursively() {
    let server = setup();
    server.handle(req("MKCOL", "/dir").body(Body::empty()).unwrap()).await;
    server.handle(req("PUT", "/dir/a.txt").body(Body::from("x")).unwrap()).await;

    let resp = server.handle(req("DELETE", "/dir").body(Body::empty()).unwrap()).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = server.handle(req("GET", "/dir/a.txt").body(Body::empty()).unwrap()).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn lock_blocks_conflicting_write_until_unlock() {
    let server = setup();
    server.handle(req("PUT", "/a.txt").body(Body::from("x")).unwrap()).await;

    let lockinfo = r#"<?xml version="1.0"?>
        <lockinfo xmlns="DAV:">
          <lockscope><exclusive/></lockscope>
          <locktype><write/></locktype>
          <owner>tester</owner>
        </lockinfo>"#;
    let resp = server.handle(req("LOCK", "/a.txt").body(Body::from(lockinfo)).unwrap()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let token = resp.headers().get("lock-token").unwrap().to_str().unwrap().to_string();
    let bare_token = token.trim_matches(|c| c == '<' || c == '>').to_string();

    let resp = server.handle(req("PUT", "/a.txt").body(Body::from("no token")).unwrap()).await;
    assert_eq!(resp.status(), StatusCode::LOCKED);

    let if_header = format!("(<{}>)", bare_token);
    let resp = server
        .handle(req("PUT", "/a.txt").header("if", if_header).body(Body::from("with token")).unwrap())
        .await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = server.handle(req("UNLOCK", "/a.txt").header("lock-token", token).body(Body::empty()).unwrap()).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = server.handle(req("PUT", "/a.txt").body(Body::from("unlocked now")).unwrap()).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn unlock_without_matching_token_is_conflict() {
    let server = setup();
    server.handle(req("PUT", "/a.txt").body(Body::from("x")).unwrap()).await;
    let resp = server
        .handle(req("UNLOCK", "/a.txt").header("lock-token", "<opaquelocktoken:does-not-exist>").body(Body::empty()).unwrap())
        .await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn options_lists_allowed_methods_for_collection() {
    let server = setup();
    let resp = server.handle(req("OPTIONS", "/").body(Body::empty()).unwrap()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let allow = resp.headers().get("allow").unwrap().to_str().unwrap().to_string();
    assert!(allow.contains("PROPFIND"));
    assert!(allow.contains("MKCOL"));
}

#[tokio::test]
async fn proppatch_set_displayname_is_read_back_by_propfind() {
    let server = setup();
    server.handle(req("PUT", "/a.txt").body(Body::from("x")).unwrap()).await;

    let set_body = r#"<?xml version="1.0"?>
        <propertyupdate xmlns="DAV:">
          <set><prop><displayname>custom name</displayname></prop></set>
        </propertyupdate>"#;
    let resp = server.handle(req("PROPPATCH", "/a.txt").body(Body::from(set_body)).unwrap()).await;
    assert_eq!(resp.status(), StatusCode::MULTI_STATUS);
    assert!(body_string(resp).await.contains("200"));

    let find_body = r#"<?xml version="1.0"?>
        <propfind xmlns="DAV:"><prop><displayname/></prop></propfind>"#;
    let resp = server.handle(req("PROPFIND", "/a.txt").body(Body::from(find_body)).unwrap()).await;
    assert_eq!(resp.status(), StatusCode::MULTI_STATUS);
    assert!(body_string(resp).await.contains("custom name"));
}

#[tokio::test]
async fn proppatch_set_getcontenttype_is_read_back_by_propfind() {
    let server = setup();
    server.handle(req("PUT", "/a.txt").body(Body::from("x")).unwrap()).await;

    let set_body = r#"<?xml version="1.0"?>
        <propertyupdate xmlns="DAV:">
          <set><prop><getcontenttype>text/custom</getcontenttype></prop></set>
        </propertyupdate>"#;
    let resp = server.handle(req("PROPPATCH", "/a.txt").body(Body::from(set_body)).unwrap()).await;
    assert_eq!(resp.status(), StatusCode::MULTI_STATUS);
    assert!(body_string(resp).await.contains("200"));

    let find_body = r#"<?xml version="1.0"?>
        <propfind xmlns="DAV:"><prop><getcontenttype/></prop></propfind>"#;
    let resp = server.handle(req("PROPFIND", "/a.txt").body(Body::from(find_body)).unwrap()).await;
    assert_eq!(resp.status(), StatusCode::MULTI_STATUS);
    assert!(body_string(resp).await.contains("text/custom"));
}

#[tokio::test]
async fn propfind_allprop_excludes_non_default_live_properties() {
    let server = setup();
    server.handle(req("PUT", "/a.txt").body(Body::from("x")).unwrap()).await;

    let resp = server.handle(req("PROPFIND", "/a.txt").header("depth", "0").body(Body::empty()).unwrap()).await;
    assert_eq!(resp.status(), StatusCode::MULTI_STATUS);
    let text = body_string(resp).await;
    assert!(!text.contains("lockdiscovery"));
    assert!(!text.contains("supportedlock"));
}

#[tokio::test]
async fn shared_deep_lock_does_not_conflict_with_descendant_shared_lock() {
    let server = setup();
    server.handle(req("MKCOL", "/dir").body(Body::empty()).unwrap()).await;
    server.handle(req("PUT", "/dir/a.txt").body(Body::from("x")).unwrap()).await;

    let shared_lockinfo = r#"<?xml version="1.0"?>
        <lockinfo xmlns="DAV:">
          <lockscope><shared/></lockscope>
          <locktype><write/></locktype>
          <owner>first</owner>
        </lockinfo>"#;
    let resp = server.handle(req("LOCK", "/dir/a.txt").body(Body::from(shared_lockinfo)).unwrap()).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let deep_shared_lockinfo = r#"<?xml version="1.0"?>
        <lockinfo xmlns="DAV:">
          <lockscope><shared/></lockscope>
          <locktype><write/></locktype>
          <owner>second</owner>
        </lockinfo>"#;
    let resp = server
        .handle(req("LOCK", "/dir").header("depth", "infinity").body(Body::from(deep_shared_lockinfo)).unwrap())
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn exclusive_deep_lock_conflicts_with_descendant_lock() {
    let server = setup();
    server.handle(req("MKCOL", "/dir").body(Body::empty()).unwrap()).await;
    server.handle(req("PUT", "/dir/a.txt").body(Body::from("x")).unwrap()).await;

    let shared_lockinfo = r#"<?xml version="1.0"?>
        <lockinfo xmlns="DAV:">
          <lockscope><shared/></lockscope>
          <locktype><write/></locktype>
          <owner>first</owner>
        </lockinfo>"#;
    let resp = server.handle(req("LOCK", "/dir/a.txt").body(Body::from(shared_lockinfo)).unwrap()).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let deep_exclusive_lockinfo = r#"<?xml version="1.0"?>
        <lockinfo xmlns="DAV:">
          <lockscope><exclusive/></lockscope>
          <locktype><write/></locktype>
          <owner>second</owner>
        </lockinfo>"#;
    let resp = server
        .handle(req("LOCK", "/dir").header("depth", "infinity").body(Body::from(deep_exclusive_lockinfo)).unwrap())
        .await;
    assert_eq!(resp.status(), StatusCode::MULTI_STATUS);
    let text = body_string(resp).await;
    assert!(text.contains("403"));
    assert!(text.contains("424"));
}

#[tokio::test]
async fn delete_collection_with_locked_descendant_is_locked() {
    let server = setup();
    server.handle(req("MKCOL", "/dir").body(Body::empty()).unwrap()).await;
    server.handle(req("PUT", "/dir/a.txt").body(Body::from("x")).unwrap()).await;

    let lockinfo = r#"<?xml version="1.0"?>
        <lockinfo xmlns="DAV:">
          <lockscope><exclusive/></lockscope>
          <locktype><write/></locktype>
          <owner>tester</owner>
        </lockinfo>"#;
    let resp = server.handle(req("LOCK", "/dir/a.txt").body(Body::from(lockinfo)).unwrap()).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = server.handle(req("DELETE", "/dir").body(Body::empty()).unwrap()).await;
    assert_eq!(resp.status(), StatusCode::LOCKED);
}

#[tokio::test]
async fn mkcol_with_nonempty_body_is_unsupported_media_type() {
    let server = setup();
    let resp = server.handle(req("MKCOL", "/dir").body(Body::from("<D:bogus/>")).unwrap()).await;
    assert_eq!(resp.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn collection_without_trailing_slash_redirects_permanently() {
    let server = setup();
    server.handle(req("MKCOL", "/dir").body(Body::empty()).unwrap()).await;

    let resp = server.handle(req("GET", "/dir").body(Body::empty()).unwrap()).await;
    assert_eq!(resp.status(), StatusCode::MOVED_PERMANENTLY);
}
