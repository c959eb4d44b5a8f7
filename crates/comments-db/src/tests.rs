use comments_core::{DlFormat, EventType, Timestamp, UserId};

use crate::{Database, DlRequestKey};

async fn mem() -> Database {
    Database::new_in_memory().await.expect("open in-memory db")
}

#[test_log::test(tokio::test)]
async fn sibling_insert_order_is_preserved() {
    let db = mem().await;
    let mut ids = Vec::new();
    for n in 0..5 {
        let (id, _) = db
            .write_with(|tx| {
                Database::insert_comment_tx(
                    tx,
                    1,
                    1,
                    UserId::new(1),
                    format!("c{n}"),
                    Timestamp::from_millis(n),
                )
            })
            .await
            .unwrap();
        ids.push(id);
    }

    let subtree = db.subtree_of_instance(1, 1).await.unwrap();
    assert_eq!(subtree.len(), 5);
    let scanned_ids: Vec<_> = subtree.iter().map(|(id, _)| *id).collect();
    assert_eq!(scanned_ids, ids, "siblings must come back in insertion order");
}

#[test_log::test(tokio::test)]
async fn subtree_is_preorder_and_excludes_unrelated_branches() {
    let db = mem().await;

    let (root_a, _) = db
        .write_with(|tx| {
            Database::insert_comment_tx(tx, 1, 1, UserId::new(1), "a".into(), Timestamp::from_millis(0))
        })
        .await
        .unwrap();
    let (root_b, _) = db
        .write_with(|tx| {
            Database::insert_comment_tx(tx, 1, 1, UserId::new(1), "b".into(), Timestamp::from_millis(1))
        })
        .await
        .unwrap();

    let (child_a1, _) = db
        .write_with(|tx| {
            Database::insert_comment_tx(tx, 0, root_a.get(), UserId::new(2), "a1".into(), Timestamp::from_millis(2))
        })
        .await
        .unwrap();
    db.write_with(|tx| {
        Database::insert_comment_tx(tx, 0, child_a1.get(), UserId::new(2), "a1a".into(), Timestamp::from_millis(3))
    })
    .await
    .unwrap();
    db.write_with(|tx| {
        Database::insert_comment_tx(tx, 0, root_b.get(), UserId::new(2), "b1".into(), Timestamp::from_millis(4))
    })
    .await
    .unwrap();

    let subtree = db.subtree_of_comment(root_a).await.unwrap();
    let contents: Vec<_> = subtree.iter().map(|(_, c)| c.content.clone()).collect();
    assert_eq!(contents, vec!["a1".to_string(), "a1a".to_string()]);

    let whole = db.subtree_of_instance(1, 1).await.unwrap();
    assert_eq!(whole.len(), 4);
}

#[test_log::test(tokio::test)]
async fn children_cnt_tracks_inserts_and_deletes() {
    let db = mem().await;

    let (root, _) = db
        .write_with(|tx| {
            Database::insert_comment_tx(tx, 1, 1, UserId::new(1), "root".into(), Timestamp::from_millis(0))
        })
        .await
        .unwrap();
    let (leaf, _) = db
        .write_with(|tx| {
            Database::insert_comment_tx(tx, 0, root.get(), UserId::new(1), "leaf".into(), Timestamp::from_millis(1))
        })
        .await
        .unwrap();

    let after_insert = db.get_comment(root).await.unwrap().unwrap();
    assert_eq!(after_insert.children_cnt, 1);

    let removed = db.write_with(|tx| Database::delete_branch_tx(tx, leaf)).await.unwrap();
    assert_eq!(removed, 1);

    let after_delete = db.get_comment(root).await.unwrap().unwrap();
    assert_eq!(after_delete.children_cnt, 0);
}

#[test_log::test(tokio::test)]
async fn delete_branch_removes_whole_subtree() {
    let db = mem().await;

    let (root, _) = db
        .write_with(|tx| {
            Database::insert_comment_tx(tx, 1, 1, UserId::new(1), "root".into(), Timestamp::from_millis(0))
        })
        .await
        .unwrap();
    let (child, _) = db
        .write_with(|tx| {
            Database::insert_comment_tx(tx, 0, root.get(), UserId::new(1), "child".into(), Timestamp::from_millis(1))
        })
        .await
        .unwrap();
    db.write_with(|tx| {
        Database::insert_comment_tx(tx, 0, child.get(), UserId::new(1), "grandchild".into(), Timestamp::from_millis(2))
    })
    .await
    .unwrap();

    let removed = db.write_with(|tx| Database::delete_branch_tx(tx, root)).await.unwrap();
    assert_eq!(removed, 3);
    assert!(db.subtree_of_instance(1, 1).await.unwrap().is_empty());
}

#[test_log::test(tokio::test)]
async fn event_log_revalidates_stale_cache_entries() {
    let db = mem().await;

    let (comment_id, comment) = db
        .write_with(|tx| {
            Database::insert_comment_tx(tx, 1, 1, UserId::new(1), "hello".into(), Timestamp::from_millis(0))
        })
        .await
        .unwrap();

    let key = DlRequestKey::new(1, Some(1), None, None, None, DlFormat::Xml);
    let (dl_id, _) = db
        .write_with(|tx| Database::resolve_or_create_dl_request_tx(tx, key, UserId::new(1), Timestamp::from_millis(10)))
        .await
        .unwrap();
    db.write_with(|tx| Database::mark_dl_request_built_tx(tx, dl_id, Timestamp::from_millis(10)))
        .await
        .unwrap();

    let still_valid = db.write_with(|tx| Database::revalidate_dl_request_tx(tx, dl_id)).await.unwrap();
    assert_eq!(still_valid.state, comments_core::DlState::Valid);

    db.write_with(|tx| {
        Database::append_event_tx(
            tx,
            UserId::new(1),
            comment.tree_id,
            comment.author_id,
            comment_id,
            comment.created,
            EventType::Changed,
            Timestamp::from_millis(20),
        )
    })
    .await
    .unwrap();

    let now_invalid = db.write_with(|tx| Database::revalidate_dl_request_tx(tx, dl_id)).await.unwrap();
    assert_eq!(now_invalid.state, comments_core::DlState::Invalid);
}

#[test_log::test(tokio::test)]
async fn dl_request_cache_key_is_shared_across_users() {
    let db = mem().await;
    db.write_with(|tx| {
        Database::insert_comment_tx(tx, 1, 1, UserId::new(1), "hello".into(), Timestamp::from_millis(0))
    })
    .await
    .unwrap();

    let key = DlRequestKey::new(1, Some(1), None, None, None, DlFormat::Xml);
    let (id_one, _) = db
        .write_with(|tx| Database::resolve_or_create_dl_request_tx(tx, key, UserId::new(1), Timestamp::from_millis(1)))
        .await
        .unwrap();
    let (id_two, _) = db
        .write_with(|tx| Database::resolve_or_create_dl_request_tx(tx, key, UserId::new(2), Timestamp::from_millis(2)))
        .await
        .unwrap();

    assert_eq!(id_one, id_two, "identical cache keys must resolve to the same row");

    let requests_for_user_two = db.get_user_dl_requests(UserId::new(2)).await.unwrap();
    assert_eq!(requests_for_user_two.len(), 1);
}
