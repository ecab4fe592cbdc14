//! File lifecycle tests over a signed-up member's forest.

mod common;

use common::{TestApp, id_of};
use loft_core::{Capability, CapabilitySet, FileKey, MemberId, SpecialContainer};
use loft_server::ServiceError;

#[tokio::test]
async fn test_duplicate_container_under_root_conflicts() {
    let app = TestApp::new().await;
    let member = app.member().await;
    let files = app.state.files();

    let docs = files
        .create_container(member.member_id, id_of(&member.root), "Documents")
        .await
        .unwrap();
    assert_eq!(docs.path_ids().unwrap(), vec![member.root.id]);

    let err = files
        .create_container(member.member_id, id_of(&member.root), "Documents")
        .await
        .unwrap_err();
    assert!(err.is_conflict(), "expected conflict, got {err:?}");
    assert_eq!(err.kind(), "conflict");

    let children = files.list_children(member.root.key()).await.unwrap();
    let names: Vec<&str> = children.iter().map(|f| f.file_name.as_str()).collect();
    assert_eq!(names, vec!["Documents", "home", "trash"]);
}

#[tokio::test]
async fn test_move_to_trash_reparents_under_trash() {
    let app = TestApp::new().await;
    let member = app.member().await;
    let files = app.state.files();

    let draft = files
        .create_block(member.member_id, id_of(&member.home), "draft.txt", 12, None)
        .await
        .unwrap();

    let moved = files
        .move_to_trash(member.member_id, draft.key())
        .await
        .unwrap();
    assert_eq!(moved.id, draft.id);
    assert_eq!(moved.path_ids().unwrap(), vec![member.root.id, member.trash.id]);
    assert_eq!(files.parent_of(draft.key()).await.unwrap().id, member.trash.id);
    assert_eq!(
        app.metadata.closure_parents(draft.id).await,
        vec![member.trash.id]
    );
}

#[tokio::test]
async fn test_move_to_trash_with_two_trash_containers_is_internal() {
    let app = TestApp::new().await;
    let member = app.member().await;
    let files = app.state.files();

    let draft = files
        .create_block(member.member_id, id_of(&member.home), "draft.txt", 12, None)
        .await
        .unwrap();

    // Forge a second trash next to the real one.
    let extra = files
        .create_container(member.member_id, id_of(&member.root), "trash-2")
        .await
        .unwrap();
    sqlx::query("UPDATE files SET file_name = 'trash' WHERE id = ?")
        .bind(extra.id)
        .execute(app.metadata.pool())
        .await
        .unwrap();

    let err = files
        .move_to_trash(member.member_id, draft.key())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Internal(_)), "got {err:?}");
    assert_eq!(err.kind(), "internal_inconsistency");
    assert_eq!(err.to_string(), "internal error");

    // Closure unchanged
    assert_eq!(
        app.metadata.closure_parents(draft.id).await,
        vec![member.home.id]
    );
    let still = files.get(draft.key()).await.unwrap();
    assert_eq!(still.path_ids().unwrap(), vec![member.root.id, member.home.id]);
}

#[tokio::test]
async fn test_special_container_lookup() {
    let app = TestApp::new().await;
    let member = app.member().await;
    let files = app.state.files();

    for (kind, expected) in [
        (SpecialContainer::Root, &member.root),
        (SpecialContainer::Home, &member.home),
        (SpecialContainer::Trash, &member.trash),
    ] {
        let found = files
            .special_container(member.member_id, kind)
            .await
            .unwrap();
        assert_eq!(found.id, expected.id, "{kind}");
    }

    // A member id nobody holds has no forest.
    let err = files
        .special_container(MemberId::new(9_999), SpecialContainer::Home)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Internal(_)));
}

#[tokio::test]
async fn test_rename_and_move_by_key() {
    let app = TestApp::new().await;
    let member = app.member().await;
    let files = app.state.files();

    let photos = files
        .create_container(member.member_id, id_of(&member.home), "photos")
        .await
        .unwrap();
    let pic = files
        .create_block(member.member_id, id_of(&photos), "img.png", 2048, None)
        .await
        .unwrap();

    let renamed = files.rename(pic.key(), "cat.png").await.unwrap();
    assert_eq!(renamed.file_name, "cat.png");

    let err = files.rename(pic.key(), "a/b").await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidRequest(_)));

    // Move the whole album to the root.
    let moved = files
        .move_parent(photos.key(), member.root.key())
        .await
        .unwrap();
    assert_eq!(moved.path_ids().unwrap(), vec![member.root.id]);
    let pic = files.get(pic.key()).await.unwrap();
    assert_eq!(pic.path_ids().unwrap(), vec![member.root.id, photos.id]);

    let path: Vec<String> = files
        .path_of(pic.key())
        .await
        .unwrap()
        .into_iter()
        .map(|f| f.file_name)
        .collect();
    assert_eq!(path, vec!["root".to_string(), "photos".to_string()]);

    // Into its own subtree
    let err = files
        .move_parent(member.home.key(), member.home.key())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidRequest(_)));

    let err = files
        .move_parent(FileKey::new(), member.root.key())
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_links_resolve_and_cascade() {
    let app = TestApp::new().await;
    let member = app.member().await;
    let files = app.state.files();

    let target = files.resolve_link(member.trash_link.key()).await.unwrap();
    assert_eq!(target.id, member.trash.id);

    let err = files.resolve_link(member.home.key()).await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidRequest(_)));

    let err = files
        .create_link(
            member.member_id,
            id_of(&member.home),
            "nowhere",
            loft_core::FileId::new(9_999),
        )
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    // Deleting trash takes the home/trash link with it.
    let removed = files.delete(member.trash.key()).await.unwrap();
    assert_eq!(removed, 2);
    assert!(files.get(member.trash_link.key()).await.unwrap_err().is_not_found());
    assert!(files.list_children(member.home.key()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_find_by_name_searches_breadth_first() {
    let app = TestApp::new().await;
    let member = app.member().await;
    let files = app.state.files();

    let work = files
        .create_container(member.member_id, id_of(&member.home), "work")
        .await
        .unwrap();
    let near = files
        .create_block(member.member_id, id_of(&member.home), "todo.md", 1, None)
        .await
        .unwrap();
    files
        .create_block(member.member_id, id_of(&work), "todo.md", 1, None)
        .await
        .unwrap();

    let found = files.find_by_name(member.root.key(), "todo.md").await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, near.id);

    assert!(
        files
            .find_by_name(member.root.key(), "absent.md")
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_share_grants_only_the_named_file() {
    let app = TestApp::new().await;
    let owner = app.member().await;
    let guest = app.member().await;
    let files = app.state.files();

    let album = files
        .create_container(owner.member_id, id_of(&owner.home), "album")
        .await
        .unwrap();
    let photo = files
        .create_block(owner.member_id, id_of(&album), "a.jpg", 10, None)
        .await
        .unwrap();

    files
        .share(album.key(), guest.member_id, &CapabilitySet::read_only())
        .await
        .unwrap();

    assert!(
        files
            .check(guest.member_id, album.key(), Capability::Read)
            .await
            .unwrap()
    );
    assert!(
        !files
            .check(guest.member_id, album.key(), Capability::Update)
            .await
            .unwrap()
    );
    assert!(
        !files
            .check(guest.member_id, photo.key(), Capability::Read)
            .await
            .unwrap()
    );
    assert!(
        files
            .check(owner.member_id, photo.key(), Capability::Delete)
            .await
            .unwrap()
    );
}
