mod support;

use std::time::Duration;

use bytes::Bytes;
use quill_blob::{AssetPayload, AssetRef, BlobConfig};
use quill_core::{ErrorKind, StorageFailure};
use quill_posts::{ContentChanges, ContentFields, ContentId, MutationOutcome, PostsConfig};

use support::{admin, fields, image, reader, Harness};

/// P1. Create with a payload stores a retrievable asset owned by the caller
#[tokio::test]
async fn test_create_with_payload() {
    let h = Harness::new();

    // Act: create {A, d, b} with a 3-byte image
    let post = h
        .service
        .create_content(ContentFields::new("A", "d", "b"), Some(image("cover.png", b"png")), &admin())
        .await
        .unwrap();

    // Assert: non-empty reference to a 3-byte blob, author is the caller
    let asset = post.asset_ref.clone().expect("asset reference");
    assert!(!asset.as_str().is_empty());
    assert_eq!(h.service.blobs().fetch(&asset).await.unwrap(), Bytes::from_static(b"png"));
    assert_eq!(post.author_id, admin().id);
    assert_eq!(h.stored(&post.id).await, post);
}

/// P2. Create without a payload leaves the asset empty and renders the fallback
#[tokio::test]
async fn test_create_without_payload_uses_fallback() {
    let h = Harness::new();

    let post = h.seed(None).await;

    assert!(post.asset_ref.is_none());
    assert_eq!(h.service.display_asset(&post), "/fallback.jpg");
    assert_eq!(h.blobs.puts(), 0);
}

/// P3. Update with a new payload swaps the asset and deletes the old one
#[tokio::test]
async fn test_update_replaces_asset() {
    let h = Harness::new();
    let post = h.seed(Some(image("old.png", b"old"))).await;
    let old = post.asset_ref.clone().unwrap();

    // Act
    let updated = h
        .service
        .update_content(&post.id, ContentChanges::new(), Some(image("new.png", b"new!")), &admin())
        .await
        .unwrap();

    // Assert: assetRef != old, old gone, new present
    let new = updated.asset_ref.clone().unwrap();
    assert_ne!(new, old);
    assert!(!h.asset_exists(&old).await);
    assert!(h.asset_exists(&new).await);
    assert_eq!(h.stored(&post.id).await.asset_ref, Some(new.clone()));
    assert_eq!(h.service.display_asset(&updated), new.as_str());
    assert_eq!(h.blobs.len(), 1);
}

/// P4. Update without a payload keeps the asset and touches no blob
#[tokio::test]
async fn test_update_without_payload_keeps_asset() {
    let h = Harness::new();
    let post = h.seed(Some(image("cover.png", b"png"))).await;
    let (puts, deletes) = (h.blobs.puts(), h.blobs.deletes());

    let updated = h
        .service
        .update_content(&post.id, ContentChanges::new().with_title("B"), None, &admin())
        .await
        .unwrap();

    assert_eq!(updated.title, "B");
    assert_eq!(updated.description, "d");
    assert_eq!(updated.asset_ref, post.asset_ref);
    assert_eq!(updated.author_id, post.author_id);
    assert_eq!(h.blobs.puts(), puts);
    assert_eq!(h.blobs.deletes(), deletes);
}

/// P5. Update adds an image to a post that had none
#[tokio::test]
async fn test_update_adds_first_asset() {
    let h = Harness::new();
    let post = h.seed(None).await;

    let updated = h
        .service
        .update_content(&post.id, ContentChanges::new(), Some(image("cover.png", b"png")), &admin())
        .await
        .unwrap();

    assert!(h.asset_exists(updated.asset_ref.as_ref().unwrap()).await);
    assert_eq!(h.blobs.deletes(), 0);
}

/// P6. Delete removes the record and then its asset
#[tokio::test]
async fn test_delete_removes_record_and_asset() {
    let h = Harness::new();
    let post = h.seed(Some(image("cover.png", b"png"))).await;
    let asset = post.asset_ref.clone().unwrap();

    let removed = h.service.delete_content(&post.id, &admin()).await.unwrap();

    assert_eq!(removed.id, post.id);
    let err = h.service.get_content(&post.id, &admin()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
    assert!(!h.asset_exists(&asset).await);
    assert!(h.blobs.inner.is_empty());
}

/// P7. Deleting a post without an asset issues no blob delete
#[tokio::test]
async fn test_delete_without_asset() {
    let h = Harness::new();
    let post = h.seed(None).await;

    h.service.delete_content(&post.id, &admin()).await.unwrap();

    assert_eq!(h.blobs.deletes(), 0);
}

/// P8. Deleting a blob reference that no longer exists succeeds
#[tokio::test]
async fn test_delete_of_missing_blob_succeeds() {
    let h = Harness::new();

    h.service
        .blobs()
        .delete(&AssetRef::new("memory://blogs/2025/01/gone-cover.png"))
        .await
        .unwrap();
}

/// P9. Unauthorized actors cause no storage or record calls
#[tokio::test]
async fn test_unauthorized_has_no_side_effects() {
    let h = Harness::new();
    let post = h.seed(Some(image("cover.png", b"png"))).await;
    let (puts, deletes, writes) = (h.blobs.puts(), h.blobs.deletes(), h.records.writes());

    let spooled = AssetPayload::spool("cover.png", &b"abc"[..], 1024).await.unwrap();
    let temp = spooled.temp_path().unwrap().to_path_buf();

    let create = h.service.create_content(fields(), Some(spooled), &reader()).await;
    let update = h
        .service
        .update_content(&post.id, ContentChanges::new(), Some(image("new.png", b"new")), &reader())
        .await;
    let delete = h.service.delete_content(&post.id, &reader()).await;

    for result in [create, update, delete] {
        assert_eq!(result.unwrap_err().kind, ErrorKind::Unauthorized);
    }
    assert_eq!(h.blobs.puts(), puts);
    assert_eq!(h.blobs.deletes(), deletes);
    assert_eq!(h.records.writes(), writes);
    assert!(!temp.exists());
    assert_eq!(h.stored(&post.id).await, post);
}

/// P10. Blank fields are rejected before any upload
#[tokio::test]
async fn test_validation_precedes_upload() {
    let h = Harness::new();

    let err = h
        .service
        .create_content(ContentFields::new("", "d", "b"), Some(image("cover.png", b"png")), &admin())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
    assert_eq!(err.field.as_deref(), Some("title"));

    let post = h.seed(None).await;
    let err = h
        .service
        .update_content(&post.id, ContentChanges::new().with_description(" "), Some(image("c.png", b"c")), &admin())
        .await
        .unwrap_err();
    assert_eq!(err.field.as_deref(), Some("description"));

    assert_eq!(h.blobs.puts(), 0);
    assert_eq!(h.records.writes(), 1);
}

/// P11. Updating or deleting an unknown post is NotFound, with no upload
#[tokio::test]
async fn test_unknown_post_is_not_found() {
    let h = Harness::new();
    let missing = ContentId::from("post:missing");

    let err = h
        .service
        .update_content(&missing, ContentChanges::new(), Some(image("c.png", b"c")), &admin())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);

    let err = h.service.delete_content(&missing, &admin()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);

    assert_eq!(h.blobs.puts(), 0);
    assert_eq!(h.blobs.deletes(), 0);
}

/// P12. Reads are open to any signed-in actor, newest first
#[tokio::test]
async fn test_reads_for_any_actor() {
    let h = Harness::new();
    let first = h.seed(None).await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = h.seed(Some(image("cover.png", b"png"))).await;

    let listed = h.service.list_content(&reader()).await.unwrap();
    let ids: Vec<_> = listed.iter().map(|c| c.id.clone()).collect();
    assert_eq!(ids, vec![second.id.clone(), first.id.clone()]);

    assert_eq!(h.service.get_content(&first.id, &reader()).await.unwrap(), first);
}

/// P13. Outcomes serialize as {ok} or {error, detail}
#[tokio::test]
async fn test_mutation_outcome_shape() {
    let h = Harness::new();

    let ok = MutationOutcome::from(h.service.create_content(fields(), None, &admin()).await);
    let value = serde_json::to_value(&ok).unwrap();
    assert_eq!(value["ok"]["title"], "A");

    let denied = MutationOutcome::from(h.service.create_content(fields(), None, &reader()).await);
    let value = serde_json::to_value(&denied).unwrap();
    assert_eq!(value["error"], "Unauthorized");
    assert!(value["detail"].as_str().unwrap().contains("reader-1"));

    h.blobs.fail_puts_with(Some(StorageFailure::QuotaExceeded));
    let full = MutationOutcome::from(
        h.service
            .create_content(fields(), Some(image("cover.png", b"png")), &admin())
            .await,
    );
    let value = serde_json::to_value(&full).unwrap();
    assert_eq!(value["error"], "StorageError");
    assert_eq!(value["reason"], "QuotaExceeded");
}

/// P14. Oversized payloads fail as InvalidPayload before reaching the backend
#[tokio::test]
async fn test_oversized_payload_rejected() {
    let h = Harness::with_config(PostsConfig::default(), BlobConfig::new().with_max_blob_bytes(2));

    let err = h
        .service
        .create_content(fields(), Some(image("cover.png", b"png")), &admin())
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Storage(StorageFailure::InvalidPayload));
    assert_eq!(h.blobs.puts(), 0);
    assert_eq!(h.records.writes(), 0);
}
