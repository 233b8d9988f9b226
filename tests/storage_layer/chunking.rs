//! Chunked document round trips and the chunk-count invariant.
//!
//! The physical layout under test: N chunk records (chunk 0..N-1, base64
//! payloads) plus one reference record (chunk -1) carrying the count, all
//! sharing the document's path.

use crate::common::{tiny_chunk_config, unique_name, TestDb, TINY_CHUNK};
use chunkstore::{
    Collection, DeleteOptions, DocumentDriver, LoadOptions, MemoryDriver, SaveOptions, UpdateDoc,
    FIELD_CHUNK, FIELD_CHUNK_COUNT, FIELD_DATA, FIELD_PATH, REFERENCE_CHUNK_INDEX,
};
use proptest::prelude::*;
use serde_json::{json, Value};
use std::sync::Arc;

fn chunk_records(driver: &MemoryDriver, collection: &str) -> (Vec<i64>, Option<i64>) {
    let mut chunks = Vec::new();
    let mut reference_count = None;
    for record in driver.records(collection) {
        match record.get(FIELD_CHUNK).and_then(Value::as_i64) {
            Some(REFERENCE_CHUNK_INDEX) => {
                reference_count = record.get(FIELD_CHUNK_COUNT).and_then(Value::as_i64);
            }
            Some(index) => chunks.push(index),
            None => {}
        }
    }
    chunks.sort_unstable();
    (chunks, reference_count)
}

#[tokio::test]
async fn test_small_document_still_gets_reference_record() {
    let env = TestDb::new();
    let name = unique_name("chunks");
    let docs = env.db.collection(tiny_chunk_config(&name));
    docs.save("p1", json!({"a": 1}), SaveOptions::chunked()).await.unwrap();
    let (chunks, reference) = chunk_records(&env.driver, &name);
    assert_eq!(chunks, vec![0]);
    assert_eq!(reference, Some(1));
}

#[tokio::test]
async fn test_multi_chunk_layout_and_round_trip() {
    let env = TestDb::new();
    let name = unique_name("chunks");
    let docs = env.db.collection(tiny_chunk_config(&name));
    // Encodes to 28 bytes, so chunk size 16 yields two chunks.
    let doc = json!({"a": "0123456789ABCDEFGHIJ"});
    docs.save("p1", doc.clone(), SaveOptions::chunked()).await.unwrap();

    let (chunks, reference) = chunk_records(&env.driver, &name);
    assert_eq!(chunks, vec![0, 1]);
    assert_eq!(reference, Some(2));

    // Every chunk except the last is exactly the chunk size.
    let mut payloads: Vec<(i64, usize)> = env
        .driver
        .records(&name)
        .iter()
        .filter_map(|r| {
            let index = r.get(FIELD_CHUNK).and_then(Value::as_i64)?;
            if index == REFERENCE_CHUNK_INDEX {
                return None;
            }
            let data = r.get(FIELD_DATA).and_then(Value::as_str)?;
            Some((index, data.len()))
        })
        .collect();
    payloads.sort_unstable();
    assert_eq!(payloads[0].1, TINY_CHUNK.div_ceil(3) * 4);

    assert_eq!(
        docs.load("p1", LoadOptions::chunked()).await.unwrap(),
        Some(doc)
    );
}

#[tokio::test]
async fn test_growth_extends_chunk_records() {
    let env = TestDb::new();
    let name = unique_name("chunks");
    let docs = env.db.collection(tiny_chunk_config(&name));
    docs.save("p1", json!({"a": "x"}), SaveOptions::chunked()).await.unwrap();
    let grown = json!({"a": "0123456789ABCDEFGHIJ0123456789ABCDEFGHIJ"});
    docs.save("p1", grown.clone(), SaveOptions::chunked()).await.unwrap();
    let (chunks, reference) = chunk_records(&env.driver, &name);
    assert_eq!(chunks.len() as i64, reference.unwrap());
    assert!(chunks.len() > 1);
    assert_eq!(
        docs.load("p1", LoadOptions::chunked()).await.unwrap(),
        Some(grown)
    );
}

#[tokio::test]
async fn test_shrink_trims_stale_tail_chunks() {
    let env = TestDb::new();
    let name = unique_name("chunks");
    let docs = env.db.collection(tiny_chunk_config(&name));
    docs.save("p1", json!({"a": "0123456789ABCDEFGHIJ0123456789"}), SaveOptions::chunked())
        .await
        .unwrap();
    let (before, _) = chunk_records(&env.driver, &name);
    assert!(before.len() >= 2);

    let shrunk = json!({"a": "x"});
    docs.save("p1", shrunk.clone(), SaveOptions::chunked()).await.unwrap();
    let (after, reference) = chunk_records(&env.driver, &name);
    // Chunk indexes are contiguous from zero and match the reference count.
    assert_eq!(after, vec![0]);
    assert_eq!(reference, Some(1));
    assert_eq!(
        docs.load("p1", LoadOptions::chunked()).await.unwrap(),
        Some(shrunk)
    );
}

#[tokio::test]
async fn test_load_stops_at_finalized_count_despite_stale_tail() {
    let env = TestDb::new();
    let name = unique_name("chunks");
    let docs = env.db.collection(tiny_chunk_config(&name));
    let doc = json!({"a": "x"});
    docs.save("p1", doc.clone(), SaveOptions::chunked()).await.unwrap();
    let (_, reference) = chunk_records(&env.driver, &name);
    assert_eq!(reference, Some(1));

    // A shrinking save interrupted after the ordered batch but before the
    // tail trim leaves chunk records past the finalized count.
    let mut stale = serde_json::Map::new();
    stale.insert(FIELD_PATH.to_string(), json!("p1"));
    stale.insert(FIELD_CHUNK.to_string(), json!(1));
    stale.insert(FIELD_DATA.to_string(), json!("c3RhbGUgdGFpbA=="));
    let mut filter = serde_json::Map::new();
    filter.insert(FIELD_PATH.to_string(), json!("p1"));
    filter.insert(FIELD_CHUNK.to_string(), json!(1));
    env.driver
        .update_one(&name, &filter, &UpdateDoc::set(stale), true)
        .await
        .unwrap();

    // The read is bounded by the reference count, so the stale tail never
    // reaches the decoder.
    assert_eq!(
        docs.load("p1", LoadOptions::chunked()).await.unwrap(),
        Some(doc)
    );
}

#[tokio::test]
async fn test_chunked_documents_are_isolated_by_path() {
    let env = TestDb::new();
    let name = unique_name("chunks");
    let docs = env.db.collection(tiny_chunk_config(&name));
    let first = json!({"a": "0123456789ABCDEFGHIJ"});
    let second = json!({"b": [1, 2, 3, 4, 5, 6, 7, 8]});
    docs.save("p1", first.clone(), SaveOptions::chunked()).await.unwrap();
    docs.save("p2", second.clone(), SaveOptions::chunked()).await.unwrap();
    assert_eq!(docs.load("p1", LoadOptions::chunked()).await.unwrap(), Some(first));
    assert_eq!(docs.load("p2", LoadOptions::chunked()).await.unwrap(), Some(second));
}

#[tokio::test]
async fn test_chunked_delete_removes_every_record() {
    let env = TestDb::new();
    let name = unique_name("chunks");
    let docs = env.db.collection(tiny_chunk_config(&name));
    docs.save("p1", json!({"a": "0123456789ABCDEFGHIJ"}), SaveOptions::chunked())
        .await
        .unwrap();
    let deleted = docs.delete("p1", DeleteOptions::chunked()).await.unwrap();
    assert_eq!(deleted, 3);
    assert!(env.driver.records(&name).is_empty());
    assert_eq!(docs.load("p1", LoadOptions::chunked()).await.unwrap(), None);
}

#[tokio::test]
async fn test_chunked_non_object_round_trip() {
    let env = TestDb::new();
    let docs = env.db.collection(tiny_chunk_config(&unique_name("chunks")));
    let doc = json!(["a long enough array", "to span", "multiple chunks", 1, 2, 3]);
    docs.save("p1", doc.clone(), SaveOptions::chunked()).await.unwrap();
    assert_eq!(docs.load("p1", LoadOptions::chunked()).await.unwrap(), Some(doc));
}

#[tokio::test]
async fn test_chunked_version_marker_survives_round_trip() {
    let env = TestDb::new();
    let docs = env.db.collection(tiny_chunk_config(&unique_name("chunks")));
    let options = SaveOptions::chunked().version(3);
    docs.save("p1", json!({"a": "0123456789ABCDEFGHIJ"}), options).await.unwrap();
    let loaded = docs.load("p1", LoadOptions::chunked()).await.unwrap().unwrap();
    assert_eq!(loaded.get("version"), Some(&json!(3)));
}

async fn round_trip(docs: &Arc<Collection>, doc: Value) -> Option<Value> {
    docs.save("p1", doc, SaveOptions::chunked()).await.unwrap();
    docs.load("p1", LoadOptions::chunked()).await.unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_chunked_round_trip_across_sizes(
        payload in "[a-zA-Z0-9 ]{0,200}",
        chunk_size in 1usize..64,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let env = TestDb::new();
            let name = unique_name("prop_chunks");
            let docs = env
                .db
                .collection(chunkstore::CollectionConfig::new(&name).chunk_size(chunk_size));
            let doc = json!({"payload": payload});
            prop_assert_eq!(round_trip(&docs, doc.clone()).await, Some(doc));

            // Every stored layout satisfies the chunk-count invariant.
            let (chunks, reference) = chunk_records(&env.driver, &name);
            let expected: Vec<i64> = (0..reference.unwrap_or(0)).collect();
            prop_assert_eq!(chunks, expected);
            Ok(())
        })?;
    }
}
