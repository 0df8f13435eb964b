//! End-to-end store behavior through the public API: persistence
//! round-trips, backup recovery and search supersession.

use std::fs;
use std::io::Cursor;
use std::time::Duration;

use clipstash_core::{
    ContentTypeFilter, HistoryStore, ItemKind, RawCapture, StoreConfig,
};

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba([0, 128, 255, 255]));
    let mut out = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
        .unwrap();
    out
}

fn open(dir: &std::path::Path) -> HistoryStore {
    let (store, _events) = HistoryStore::open_at(dir, StoreConfig::default()).unwrap();
    store
}

#[test]
fn save_load_roundtrip_preserves_all_fields() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path());

    let text = store
        .capture(RawCapture::text("plain text"), Some("Editor".to_string()))
        .unwrap();
    store.add_tag("work", text.id);

    let url = store
        .capture(RawCapture::text("https://example.com/page"), None)
        .unwrap();
    store.pin(url.id);

    let image = store
        .capture(RawCapture::image(png_bytes(3, 3)), None)
        .unwrap();

    let files = store
        .capture(
            RawCapture::files(vec!["/tmp/a.txt".to_string(), "/tmp/b.txt".to_string()]),
            None,
        )
        .unwrap();

    store.flush().unwrap();
    drop(store);

    let reopened = open(dir.path());
    let items = reopened.all_items();
    assert_eq!(items.len(), 4);

    // Canonical order: pinned first, then history most-recent-first
    assert_eq!(items[0].id, url.id);
    assert!(items[0].pinned);
    assert_eq!(items[0].kind(), ItemKind::Url);

    assert_eq!(items[1].id, files.id);
    assert_eq!(items[2].id, image.id);
    assert_eq!(items[3].id, text.id);
    assert_eq!(items[3].tags, vec!["work"]);
    assert_eq!(items[3].source_app.as_deref(), Some("Editor"));

    let restored_image = &items[2];
    assert_eq!(restored_image.content, image.content);
    assert_eq!(restored_image.created_at, image.created_at);
}

#[test]
fn corrupt_primary_recovers_from_backup() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path());

    store.capture(RawCapture::text("survivor"), None).unwrap();
    store.flush().unwrap();
    // Second flush copies the first snapshot into the backup file
    store.flush().unwrap();
    drop(store);

    fs::write(dir.path().join("history.json"), b"garbage").unwrap();

    let recovered = open(dir.path());
    let items = recovered.all_items();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].content.text_content(), "survivor");

    // Primary was repaired: a third open must not need the backup
    fs::remove_file(dir.path().join("history.backup.json")).unwrap();
    let repaired = open(dir.path());
    assert_eq!(repaired.all_items().len(), 1);
}

#[test]
fn both_files_unreadable_is_cold_start() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("history.json"), b"garbage").unwrap();
    fs::write(dir.path().join("history.backup.json"), b"also garbage").unwrap();

    let store = open(dir.path());
    assert!(store.all_items().is_empty());
    assert!(!store.tags().is_empty(), "fresh store seeds default tags");
}

#[tokio::test]
async fn superseding_query_wins() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path());

    store.capture(RawCapture::text("a lone match"), None).unwrap();
    store.capture(RawCapture::text("ab shared match"), None).unwrap();

    store.set_query("a lone");
    store.set_query("ab");
    tokio::time::sleep(Duration::from_millis(700)).await;

    let hits = store.search_hits();
    assert_eq!(hits.len(), 1);
    let hit_item = store
        .all_items()
        .into_iter()
        .find(|item| item.id == hits[0].item_id)
        .unwrap();
    assert_eq!(hit_item.content.text_content(), "ab shared match");
}

#[tokio::test]
async fn filter_drives_search_and_listing() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path());

    store.capture(RawCapture::text("example words"), None).unwrap();
    store
        .capture(RawCapture::text("https://example.com"), None)
        .unwrap();

    store.set_query("example");
    store.set_filter(ContentTypeFilter::Url);
    tokio::time::sleep(Duration::from_millis(700)).await;

    let hits = store.search_hits();
    assert_eq!(hits.len(), 1);
    assert_eq!(
        store
            .all_items()
            .into_iter()
            .find(|item| item.id == hits[0].item_id)
            .unwrap()
            .kind(),
        ItemKind::Url
    );

    store.reset_search();
    assert!(store.search_hits().is_empty());
}
