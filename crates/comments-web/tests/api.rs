mod common;

use common::TestServer;

/// Builds the fixture tree described by `spec.md` §8: six top-level
/// comments under instance `(i_id=1, itype_id=1)`; the second has three
/// children, each of which has three grandchildren. Returns the ids of the
/// six top-level comments in creation order.
async fn seed_fixture_tree(driver: &common::ApiDriver) -> Vec<i64> {
    let mut top_level = Vec::new();
    for i in 0..6 {
        let resp = driver
            .put_json(
                "/api/comment/",
                &serde_json::json!({
                    "user_id": 1,
                    "itype_id": 1,
                    "i_id": 1,
                    "content": format!("top-level {i}"),
                }),
            )
            .await;
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = resp.json().await.unwrap();
        top_level.push(body["id"].as_i64().unwrap());
    }

    let second = top_level[1];
    for i in 0..3 {
        let resp = driver
            .put_json(
                "/api/comment/",
                &serde_json::json!({
                    "user_id": 1,
                    "itype_id": 0,
                    "i_id": second,
                    "content": format!("child {i}"),
                }),
            )
            .await;
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = resp.json().await.unwrap();
        let child_id = body["id"].as_i64().unwrap();

        for j in 0..3 {
            let resp = driver
                .put_json(
                    "/api/comment/",
                    &serde_json::json!({
                        "user_id": 1,
                        "itype_id": 0,
                        "i_id": child_id,
                        "content": format!("grandchild {i}-{j}"),
                    }),
                )
                .await;
            assert_eq!(resp.status(), 200);
        }
    }

    top_level
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn list_returns_six_ids_in_creation_order() {
    let server = TestServer::start().await;
    let driver = server.driver();
    let top_level = seed_fixture_tree(&driver).await;

    let resp = driver.get("/api/comments/list/1/1/").await;
    assert_eq!(resp.status(), 200);
    let body: Vec<serde_json::Value> = resp.json().await.unwrap();
    let ids: Vec<i64> = body.iter().map(|c| c["id"].as_i64().unwrap()).collect();
    assert_eq!(ids, top_level);

    server.shutdown().await;
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn list_with_limit_returns_first_two() {
    let server = TestServer::start().await;
    let driver = server.driver();
    let top_level = seed_fixture_tree(&driver).await;

    let resp = driver.get("/api/comments/list/1/1/2/").await;
    assert_eq!(resp.status(), 200);
    let body: Vec<serde_json::Value> = resp.json().await.unwrap();
    let ids: Vec<i64> = body.iter().map(|c| c["id"].as_i64().unwrap()).collect();
    assert_eq!(ids, &top_level[0..2]);

    server.shutdown().await;
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn list_with_cursor_after_second_returns_next_three() {
    let server = TestServer::start().await;
    let driver = server.driver();
    let top_level = seed_fixture_tree(&driver).await;
    let second = top_level[1];

    let resp = driver.get(&format!("/api/comments/list/1/1/3/{second}/")).await;
    assert_eq!(resp.status(), 200);
    let body: Vec<serde_json::Value> = resp.json().await.unwrap();
    let ids: Vec<i64> = body.iter().map(|c| c["id"].as_i64().unwrap()).collect();
    assert_eq!(ids, &top_level[2..5]);

    server.shutdown().await;
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn tree_returns_eighteen_ids_pre_order() {
    let server = TestServer::start().await;
    let driver = server.driver();
    seed_fixture_tree(&driver).await;

    let resp = driver.get("/api/comments/tree/1/1/").await;
    assert_eq!(resp.status(), 200);
    let body: Vec<serde_json::Value> = resp.json().await.unwrap();
    assert_eq!(body.len(), 6 + 3 + 3 * 3);

    server.shutdown().await;
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn deleting_comment_with_children_conflicts_then_succeeds_once_empty() {
    let server = TestServer::start().await;
    let driver = server.driver();
    let top_level = seed_fixture_tree(&driver).await;
    let second = top_level[1];

    let resp = driver
        .delete_json(&format!("/api/comment/{second}/"), &serde_json::json!({"user_id": 1}))
        .await;
    assert_eq!(resp.status(), 400, "deleting a comment with a non-empty subtree must conflict");

    // Walk the subtree leaf-by-leaf: delete every grandchild, then every
    // child, before the branch under `second` is empty.
    let subtree = driver.get("/api/comments/tree/1/1/").await.json::<Vec<serde_json::Value>>().await.unwrap();
    let descendants_of_second: Vec<i64> = subtree
        .iter()
        .filter(|c| c["parent_id"].as_i64().is_some())
        .map(|c| c["id"].as_i64().unwrap())
        .collect();
    // Children of `second`'s children (grandchildren) have no children of
    // their own, so deleting in reverse creation order always hits leaves
    // first within this fixture's shape.
    for id in descendants_of_second.iter().rev() {
        let resp = driver
            .delete_json(&format!("/api/comment/{id}/"), &serde_json::json!({"user_id": 1}))
            .await;
        assert_eq!(resp.status(), 200, "leaf deletion must succeed, id={id}");
    }

    let resp = driver
        .delete_json(&format!("/api/comment/{second}/"), &serde_json::json!({"user_id": 1}))
        .await;
    assert_eq!(resp.status(), 200, "deleting an emptied branch must succeed");

    let remaining = driver
        .get("/api/comments/tree/1/1/")
        .await
        .json::<Vec<serde_json::Value>>()
        .await
        .unwrap();
    assert_eq!(remaining.len(), 5);

    server.shutdown().await;
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn repeated_download_is_cached_and_byte_equal() {
    let server = TestServer::start().await;
    let driver = server.driver();
    seed_fixture_tree(&driver).await;

    let first = driver
        .get("/api/comments/download/xml/?i_id=1&itype_id=1&user_id=1")
        .await;
    assert_eq!(first.status(), 200);
    assert!(
        first.headers().get("content-length").is_none(),
        "a freshly built report has no pre-known length"
    );
    let first_bytes = first.bytes().await.unwrap();

    let second = driver
        .get("/api/comments/download/xml/?i_id=1&itype_id=1&user_id=1")
        .await;
    assert_eq!(second.status(), 200);
    assert!(
        second.headers().get("content-length").is_some(),
        "the cached report is served from a known-length file"
    );
    let second_bytes = second.bytes().await.unwrap();

    assert_eq!(first_bytes, second_bytes);

    server.shutdown().await;
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn update_by_non_author_is_forbidden() {
    let server = TestServer::start().await;
    let driver = server.driver();
    let top_level = seed_fixture_tree(&driver).await;
    let id = top_level[0];

    let resp = driver
        .post_json(
            &format!("/api/comment/{id}/"),
            &serde_json::json!({"user_id": 2, "content": "hijacked"}),
        )
        .await;
    assert_eq!(resp.status(), 403);

    server.shutdown().await;
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn create_with_empty_content_is_rejected() {
    let server = TestServer::start().await;
    let driver = server.driver();

    let resp = driver
        .put_json(
            "/api/comment/",
            &serde_json::json!({"user_id": 1, "itype_id": 1, "i_id": 1, "content": "   "}),
        )
        .await;
    assert_eq!(resp.status(), 400);

    server.shutdown().await;
}
