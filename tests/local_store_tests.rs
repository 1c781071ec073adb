mod common;

use archive_uploader::{
    ErrorKind, LocalStore, ObjectStore, StoreError, Uploader,
    models::{multipart::PartDescriptor, object::{Tag, Visibility}},
};
use bytes::Bytes;
use common::{BUCKET, keys, noise, small_parts, unzip};
use futures::{StreamExt, TryStreamExt, stream};
use std::{io, sync::Arc};
use tempfile::TempDir;

async fn setup() -> (TempDir, LocalStore) {
    let dir = TempDir::new().unwrap();
    let store = LocalStore::new(dir.path());
    store.create_bucket(BUCKET).await.unwrap();
    (dir, store)
}

async fn put(store: &LocalStore, key: &str, content_type: &str, body: Vec<u8>) {
    let body = stream::iter(vec![Ok::<_, io::Error>(Bytes::from(body))]);
    store
        .put_object(BUCKET, key, Some(content_type.into()), body)
        .await
        .unwrap();
}

async fn read_all(store: &LocalStore, key: &str) -> Vec<u8> {
    let fetched = store.get(BUCKET, key).await.unwrap();
    let chunks: Vec<Bytes> = fetched.body.try_collect().await.unwrap();
    chunks.concat()
}

#[tokio::test]
async fn put_then_get_round_trips_content_and_type() {
    let (_dir, store) = setup().await;
    put(&store, "2025/05/img.jpeg", "image/jpeg", b"jpeg bytes".to_vec()).await;

    let fetched = store.get(BUCKET, "2025/05/img.jpeg").await.unwrap();
    assert_eq!(fetched.content_type.as_deref(), Some("image/jpeg"));
    assert_eq!(read_all(&store, "2025/05/img.jpeg").await, b"jpeg bytes");

    let meta = store.get_object_metadata(BUCKET, "2025/05/img.jpeg").await.unwrap();
    assert_eq!(meta.size_bytes, 10);
    assert_eq!(meta.etag, format!("{:x}", md5::compute(b"jpeg bytes")));
}

#[tokio::test]
async fn missing_objects_and_buckets_are_reported() {
    let (_dir, store) = setup().await;
    assert!(matches!(
        store.get(BUCKET, "nope.jpg").await,
        Err(StoreError::ObjectNotFound { .. })
    ));
    assert!(matches!(
        store.get("other", "nope.jpg").await,
        Err(StoreError::BucketNotFound(_))
    ));
    assert!(matches!(
        store.get(BUCKET, "../escape").await,
        Err(StoreError::InvalidObjectKey)
    ));
}

#[tokio::test]
async fn archive_round_trip_through_disk() {
    let (_dir, store) = setup().await;
    put(&store, "in/a.jpeg", "image/jpeg", noise(6 * 1024 * 1024, 7)).await;
    put(&store, "in/b.txt", "text/plain", b"notes".to_vec()).await;

    let config = small_parts()
        .with_tag(Tag::new("expireMonth", "1"))
        .with_visibility(Visibility::PublicRead);
    let uploader = Uploader::new(Arc::new(store.clone()), config);
    let location = uploader
        .build_and_upload(&keys(&["in/a.jpeg", "in/b.txt"]), "exports/out.zip")
        .await
        .unwrap();

    assert!(location.e_tag.ends_with("-2"));
    assert!(location.url.starts_with("file://"));

    let meta = store.get_object_metadata(BUCKET, "exports/out.zip").await.unwrap();
    assert_eq!(meta.content_type.as_deref(), Some("application/zip"));
    assert_eq!(meta.tags, [Tag::new("expireMonth", "1")]);
    assert_eq!(meta.visibility, Visibility::PublicRead);
    assert_eq!(meta.etag, location.e_tag);

    let entries = unzip(&read_all(&store, "exports/out.zip").await);
    assert_eq!(entries[0].0, "a.jpg");
    assert_eq!(entries[0].1, noise(6 * 1024 * 1024, 7));
    assert_eq!(entries[1], ("b.txt".to_string(), b"notes".to_vec()));
}

#[tokio::test]
async fn failed_build_leaves_no_staging_behind() {
    let (dir, store) = setup().await;
    put(&store, "a.exe", "application/x-msdownload", b"MZ".to_vec()).await;

    let uploader = Uploader::new(Arc::new(store.clone()), small_parts());
    let err = uploader
        .build_and_upload(&keys(&["a.exe"]), "out.zip")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
    assert!(!dir.path().join(".multipart").exists());
}

#[tokio::test]
async fn abort_discards_staged_parts() {
    let (dir, store) = setup().await;
    let target = small_parts().target("out.zip");

    let upload_id = store.initiate_multipart_upload(&target).await.unwrap();
    store
        .upload_part(&target, &upload_id, 1, Bytes::from_static(b"part"), false)
        .await
        .unwrap();
    let staging = dir.path().join(".multipart").join(&upload_id);
    assert!(staging.join("part-00001").exists());

    store.abort_multipart_upload(&target, &upload_id).await.unwrap();
    assert!(!staging.exists());
    assert!(matches!(
        store.abort_multipart_upload(&target, &upload_id).await,
        Err(StoreError::NoSuchUpload(_))
    ));
}

#[tokio::test]
async fn completion_checks_part_etags() {
    let (_dir, store) = setup().await;
    let target = small_parts().target("out.zip");

    let upload_id = store.initiate_multipart_upload(&target).await.unwrap();
    let e_tag = store
        .upload_part(&target, &upload_id, 1, Bytes::from_static(b"abc"), true)
        .await
        .unwrap();
    assert_eq!(e_tag, format!("\"{:x}\"", md5::compute(b"abc")));

    let wrong = [PartDescriptor::new(1, "\"deadbeef\"").unwrap()];
    assert!(matches!(
        store.complete_multipart_upload(&target, &upload_id, &wrong).await,
        Err(StoreError::InvalidPart { part_number: 1, .. })
    ));

    let parts = [PartDescriptor::new(1, e_tag).unwrap()];
    let location = store
        .complete_multipart_upload(&target, &upload_id, &parts)
        .await
        .unwrap();
    assert!(location.e_tag.ends_with("-1"));
    assert_eq!(read_all(&store, "out.zip").await, b"abc");

    let body = store.get(BUCKET, "out.zip").await.unwrap().body;
    assert_eq!(body.count().await, 1);
}

#[tokio::test]
async fn unknown_upload_ids_are_rejected() {
    let (_dir, store) = setup().await;
    let target = small_parts().target("out.zip");
    for id in ["missing", "../escape", ""] {
        assert!(matches!(
            store
                .upload_part(&target, id, 1, Bytes::from_static(b"x"), true)
                .await,
            Err(StoreError::NoSuchUpload(_))
        ));
    }
}
