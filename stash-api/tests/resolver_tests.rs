//! Cache resolution engine: find-or-populate, concurrent creates, upserts.

mod support;

use std::sync::Arc;

use proptest::prelude::*;
use stash_api::CacheResolver;
use stash_test_utils::generators::{arb_location, arb_object_key};
use stash_test_utils::{
    fixtures, CacheStore, CountingStore, PopulateScript, ScriptedFetcher, ScriptedPopulator,
};
use support::{runtime, Harness};

#[tokio::test]
async fn test_existing_entry_skips_population() {
    let key = fixtures::fb2(1);
    let h = Harness::new(ScriptedFetcher::new(), ScriptedPopulator::new());
    let seeded = h.store.seed(&key, fixtures::location(1)).await;

    let resolved = h.resolver().resolve(&key).await.unwrap();

    assert_eq!(resolved, Some(seeded));
    assert_eq!(h.populator.calls(), 0);
    assert_eq!(h.store.inserts(), 0);
}

#[tokio::test]
async fn test_resolve_is_idempotent() {
    let key = fixtures::fb2(2);
    let h = Harness::new(
        ScriptedFetcher::new(),
        ScriptedPopulator::producing([fixtures::location(2), fixtures::location(3)]),
    );
    let resolver = h.resolver();

    let first = resolver.resolve(&key).await.unwrap().unwrap();
    let second = resolver.resolve(&key).await.unwrap().unwrap();

    assert_eq!(first, second);
    assert_eq!(h.populator.calls(), 1);
    assert_eq!(h.store.inner().len().await, 1);
}

#[tokio::test]
async fn test_losing_insert_adopts_the_winner() {
    let key = fixtures::fb2(3);
    let h = Harness::new(
        ScriptedFetcher::new(),
        ScriptedPopulator::producing([fixtures::location(31)]),
    );
    h.store.lose_next_insert_to(fixtures::location(30));

    let resolved = h.resolver().resolve(&key).await.unwrap().unwrap();

    assert_eq!(resolved.location, fixtures::location(30));
    assert_eq!(h.store.inner().len().await, 1);
}

#[tokio::test]
async fn test_concurrent_resolves_share_one_entry() {
    let key = fixtures::fb2(4);
    let h = Harness::new(
        ScriptedFetcher::new(),
        ScriptedPopulator::producing([fixtures::location(40), fixtures::location(41)]),
    );
    let resolver = h.resolver();

    let (a, b) = tokio::join!(resolver.resolve(&key), resolver.resolve(&key));
    let a = a.unwrap().unwrap();
    let b = b.unwrap().unwrap();

    assert_eq!(a.id, b.id);
    assert_eq!(a.location, b.location);
    assert_eq!(h.store.inner().len().await, 1);
}

#[tokio::test]
async fn test_population_failure_resolves_to_nothing() {
    let key = fixtures::fb2(5);
    let populator = ScriptedPopulator::new();
    populator.push(PopulateScript::Fail);
    let h = Harness::new(ScriptedFetcher::new(), populator);

    assert_eq!(h.resolver().resolve(&key).await.unwrap(), None);
    assert!(h.store.inner().is_empty().await);
}

#[tokio::test]
async fn test_store_failure_propagates() {
    let h = Harness::new(ScriptedFetcher::new(), ScriptedPopulator::new());
    h.store.fail_gets(true);

    assert!(h.resolver().resolve(&fixtures::fb2(6)).await.is_err());
    assert_eq!(h.populator.calls(), 0);
}

#[tokio::test]
async fn test_invalidate_deletes_by_id() {
    let key = fixtures::fb2(7);
    let h = Harness::new(ScriptedFetcher::new(), ScriptedPopulator::new());
    let entry = h.store.seed(&key, fixtures::location(7)).await;

    h.resolver().invalidate(&entry).await;
    // A second invalidation of the same entry is a no-op.
    h.resolver().invalidate(&entry).await;

    assert!(h.store.get(&key).await.unwrap().is_none());
    assert_eq!(h.store.deletes(), 2);
}

#[tokio::test]
async fn test_invalidate_swallows_store_errors() {
    let key = fixtures::fb2(8);
    let h = Harness::new(ScriptedFetcher::new(), ScriptedPopulator::new());
    let entry = h.store.seed(&key, fixtures::location(8)).await;
    h.store.fail_deletes(true);

    h.resolver().invalidate(&entry).await;

    assert!(h.store.get(&key).await.unwrap().is_some());
}

#[tokio::test]
async fn test_upsert_creates_then_overwrites() {
    let key = fixtures::fb2(9);
    let h = Harness::new(ScriptedFetcher::new(), ScriptedPopulator::new());
    let resolver = h.resolver();

    let created = resolver.upsert(&key, &fixtures::location(90)).await.unwrap();
    let updated = resolver.upsert(&key, &fixtures::location(91)).await.unwrap();

    assert_eq!(created.id, updated.id);
    assert_eq!(updated.location, fixtures::location(91));
    assert_eq!(h.populator.calls(), 0);
}

#[tokio::test]
async fn test_upsert_after_losing_insert_overwrites_the_winner() {
    let key = fixtures::fb2(10);
    let h = Harness::new(ScriptedFetcher::new(), ScriptedPopulator::new());
    h.store.lose_next_insert_to(fixtures::location(100));

    let entry = h.resolver().upsert(&key, &fixtures::location(101)).await.unwrap();

    assert_eq!(entry.location, fixtures::location(101));
    assert_eq!(h.store.inner().len().await, 1);
}

#[tokio::test]
async fn test_remove() {
    let key = fixtures::fb2(11);
    let h = Harness::new(ScriptedFetcher::new(), ScriptedPopulator::new());
    let seeded = h.store.seed(&key, fixtures::location(11)).await;
    let resolver = h.resolver();

    assert_eq!(resolver.remove(&key).await.unwrap(), Some(seeded));
    assert_eq!(resolver.remove(&key).await.unwrap(), None);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Upserts to one key leave a single record holding the last location.
    #[test]
    fn prop_upsert_last_write_wins(
        key in arb_object_key(),
        locations in prop::collection::vec(arb_location(), 1..8),
    ) {
        let rt = runtime();
        rt.block_on(async {
            let store = Arc::new(CountingStore::new());
            let resolver = CacheResolver::new(store.clone(), Arc::new(ScriptedPopulator::new()));

            let mut ids = Vec::new();
            for location in &locations {
                ids.push(resolver.upsert(&key, location).await.unwrap().id);
            }

            let stored = store.get(&key).await.unwrap().unwrap();
            prop_assert_eq!(Some(&stored.location), locations.last());
            prop_assert!(ids.iter().all(|id| *id == stored.id));
            prop_assert_eq!(store.inner().len().await, 1);
            Ok(())
        })?;
    }
}
