#![cfg(feature = "inmem-store")]

use std::collections::HashSet;

use campus::codes::{generate, set_counter, CodeKind};
use campus::models::{Program, StaffCategory};
use campus::repo::inmem::InMemStore;

#[tokio::test]
async fn nth_code_is_initial_plus_n() {
    let store = InMemStore::ephemeral();
    let kind = CodeKind::Admission(Program::Tahfidh);
    set_counter(&store, kind, 41).await.unwrap();

    for n in 1..=3 {
        let code = generate(&store, kind).await.unwrap();
        assert_eq!(code, format!("TAH/{:04}", 41 + n));
    }
}

#[tokio::test]
async fn missing_counter_starts_at_one() {
    let store = InMemStore::ephemeral();
    assert_eq!(generate(&store, CodeKind::Staff(StaffCategory::Teaching)).await.unwrap(), "TS/0001");
    assert_eq!(generate(&store, CodeKind::Staff(StaffCategory::NonTeaching)).await.unwrap(), "NTS/0001");
    assert_eq!(generate(&store, CodeKind::Staff(StaffCategory::Teaching)).await.unwrap(), "TS/0002");
}

#[tokio::test]
async fn sequences_are_independent_per_category() {
    let store = InMemStore::ephemeral();
    assert_eq!(generate(&store, CodeKind::Admission(Program::Integrated)).await.unwrap(), "INT/0001");
    assert_eq!(generate(&store, CodeKind::Admission(Program::Talim)).await.unwrap(), "TAL/0001");
    assert_eq!(generate(&store, CodeKind::Admission(Program::Integrated)).await.unwrap(), "INT/0002");
}

#[tokio::test]
async fn concurrent_generation_never_repeats() {
    let store = InMemStore::ephemeral();
    let kind = CodeKind::Admission(Program::Integrated);
    let mut handles = Vec::new();
    for _ in 0..32 {
        let s = store.clone();
        handles.push(tokio::spawn(async move { generate(&s, kind).await.unwrap() }));
    }
    let mut seen = HashSet::new();
    for h in handles {
        assert!(seen.insert(h.await.unwrap()));
    }
    assert_eq!(seen.len(), 32);
    assert!(seen.contains("INT/0032"));
}
