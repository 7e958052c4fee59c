//! Integration tests for `/api/v1/drafts/{item_id}/images`.

mod common;

use axum::http::StatusCode;
use serde_json::json;
use thrift_core::locking::item_key;

use common::{
    body_bytes, body_json, build_test_app, closing_delimiter, delete, filenames, get,
    post_files, post_multipart, text_part, ITEM,
};

fn images_uri() -> String {
    format!("/api/v1/drafts/{ITEM}/images")
}

// ---------------------------------------------------------------------------
// Upload
// ---------------------------------------------------------------------------

#[tokio::test]
async fn batch_upload_assigns_sequential_names() {
    let t = build_test_app();

    let response = post_files(
        t.app.clone(),
        &images_uri(),
        &[("a.png", "first"), ("b.jpg", "second")],
    )
    .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(
        filenames(&json),
        vec!["Draft-440000-01.png", "Draft-440000-02.jpg"]
    );
    assert_eq!(
        json["data"][0]["url"],
        format!("/uploads/drafts/{ITEM}/Draft-440000-01.png")
    );
    assert_eq!(json["data"][1]["is_new"], true);

    let json = body_json(get(t.app, &images_uri()).await).await;
    assert_eq!(
        filenames(&json),
        vec!["Draft-440000-01.png", "Draft-440000-02.jpg"]
    );
}

#[tokio::test]
async fn uploaded_image_is_served_from_its_url() {
    let t = build_test_app();
    post_files(t.app.clone(), &images_uri(), &[("a.png", "png-bytes")]).await;

    let response = get(
        t.app,
        &format!("/uploads/drafts/{ITEM}/Draft-440000-01.png"),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"png-bytes");
}

#[tokio::test]
async fn no_lock_is_left_after_upload() {
    let t = build_test_app();

    post_files(t.app.clone(), &images_uri(), &[("a.png", "a")]).await;

    let lease = t
        .state
        .coordinator
        .locks()
        .inspect(&item_key(ITEM))
        .await
        .unwrap()
        .expect("lease row written by the upload");
    assert!(!lease.is_active());

    let json = body_json(get(t.app, &format!("/api/v1/drafts/{ITEM}")).await).await;
    assert!(json["data"]["locked_at"].is_null());
    assert!(json["data"]["expires_at"].is_null());
}

#[tokio::test]
async fn form_without_files_returns_400() {
    let t = build_test_app();
    let mut body = text_part("note", "hello");
    body.extend(closing_delimiter());

    let response = post_multipart(t.app, &images_uri(), body).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn unsupported_file_type_returns_415() {
    let t = build_test_app();

    let response = post_files(
        t.app.clone(),
        &images_uri(),
        &[("a.png", "a"), ("notes.txt", "b")],
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(body_json(response).await["code"], "UNSUPPORTED_IMAGE");

    let response = get(t.app, &images_uri()).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn require_existing_on_missing_draft_returns_404() {
    let t = build_test_app();

    let response = post_files(
        t.app,
        &format!("{}?require_existing=true", images_uri()),
        &[("a.png", "a")],
    )
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "NOT_FOUND");
}

#[tokio::test]
async fn require_existing_on_saved_draft_uploads() {
    let t = build_test_app();
    common::put_json(t.app.clone(), &format!("/api/v1/drafts/{ITEM}"), json!({})).await;

    let response = post_files(
        t.app,
        &format!("{}?require_existing=true", images_uri()),
        &[("a.png", "a")],
    )
    .await;

    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_never_share_a_number() {
    let t = build_test_app();

    let handles: Vec<_> = (0..6)
        .map(|i| {
            let app = t.app.clone();
            tokio::spawn(async move {
                let name = format!("p{i}.png");
                post_files(app, &images_uri(), &[(name.as_str(), "x")]).await
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.await.unwrap().status(), StatusCode::CREATED);
    }

    let json = body_json(get(t.app, &images_uri()).await).await;
    let mut names = filenames(&json);
    names.sort();
    let expected: Vec<String> = (1..=6).map(|n| format!("Draft-440000-{n:02}.png")).collect();
    assert_eq!(names, expected);
}

// ---------------------------------------------------------------------------
// Delete and numbering
// ---------------------------------------------------------------------------

#[tokio::test]
async fn delete_then_upload_reuses_the_number() {
    let t = build_test_app();
    post_files(
        t.app.clone(),
        &images_uri(),
        &[("a.png", "a"), ("b.jpg", "b")],
    )
    .await;

    let response = delete(
        t.app.clone(),
        &format!("{}/Draft-440000-01.png", images_uri()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        filenames(&body_json(response).await),
        vec!["Draft-440000-02.jpg"]
    );

    let json = body_json(get(t.app.clone(), &format!("{}/next-sequence", images_uri())).await).await;
    assert_eq!(json["data"]["next_sequence_number"], 1);

    let response = post_files(t.app.clone(), &images_uri(), &[("c.gif", "c")]).await;
    assert_eq!(filenames(&body_json(response).await), vec!["Draft-440000-01.gif"]);

    let json = body_json(get(t.app.clone(), &images_uri()).await).await;
    assert_eq!(
        filenames(&json),
        vec!["Draft-440000-02.jpg", "Draft-440000-01.gif"]
    );

    let old = get(t.app, &format!("/uploads/drafts/{ITEM}/Draft-440000-01.png")).await;
    assert_eq!(old.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deleting_unknown_image_returns_404() {
    let t = build_test_app();
    post_files(t.app.clone(), &images_uri(), &[("a.png", "a")]).await;

    let response = delete(t.app, &format!("{}/Draft-440000-07.png", images_uri())).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn next_sequence_for_new_draft_is_one() {
    let t = build_test_app();

    let response = get(t.app, &format!("{}/next-sequence", images_uri())).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["next_sequence_number"], 1);
}
