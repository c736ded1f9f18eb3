//! Integration tests: bounded, ordered per-bin history.

use std::sync::Arc;
use std::time::Duration;

use gomibako_core::{BinKey, CapturedRequest, RandomKeyGenerator};
use gomibako_hub::{Hub, HubConfig, HubError, Registry};

fn request(key: &BinKey, body: String) -> CapturedRequest {
    CapturedRequest::new(key.clone(), "POST", format!("/g/{key}")).with_body(body)
}

fn bodies(history: &[Arc<CapturedRequest>]) -> Vec<String> {
    history.iter().map(|r| String::from_utf8_lossy(&r.body).into_owned()).collect()
}

/// Twelve requests into a ten-slot history: `r0` and `r1` are evicted.
#[tokio::test]
async fn twelve_ingests_keep_last_ten_oldest_first() {
    let hub = Hub::start(HubConfig::default());
    let registry = hub.registry();
    let key = match registry.create().await {
        Ok(k) => k,
        Err(e) => panic!("create failed: {e}"),
    };

    for n in 0..12 {
        if let Err(e) = registry.ingest(request(&key, format!("r{n}"))).await {
            panic!("ingest r{n} failed: {e}");
        }
    }

    let snapshot = match registry.snapshot(&key).await {
        Ok(s) => s,
        Err(e) => panic!("snapshot failed: {e}"),
    };
    let expected: Vec<String> = (2..12).map(|n| format!("r{n}")).collect();
    assert_eq!(bodies(&snapshot), expected);

    hub.shutdown().await;
}

#[tokio::test]
async fn snapshot_of_unknown_bin_is_not_found() {
    let hub = Hub::start(HubConfig::default());
    let result = hub.registry().snapshot(&BinKey::new("nobody")).await;
    assert!(matches!(result, Err(HubError::NotFound(_))));
    hub.shutdown().await;
}

#[tokio::test]
async fn bins_do_not_share_history() {
    let hub = Hub::start(HubConfig::default());
    let registry = hub.registry();
    let (Ok(a), Ok(b)) = (registry.create().await, registry.create().await) else {
        panic!("create failed");
    };
    assert_ne!(a, b);

    assert!(registry.ingest(request(&a, "only-a".to_owned())).await.is_ok());
    let Ok(history_b) = registry.snapshot(&b).await else { panic!("snapshot failed") };
    assert!(history_b.is_empty(), "b must not see a's request");

    hub.shutdown().await;
}

/// Concurrent ingests into one bin end up in the history in the same order
/// the broadcaster delivers them.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_ingest_history_matches_delivery_order() {
    let config = HubConfig::default().history_capacity(64).feed_capacity(64);
    let hub = Hub::start(config);
    let registry = hub.registry();
    let Ok(key) = registry.create().await else { panic!("create failed") };
    let Ok(mut feed) = registry.subscribe(&key).await else { panic!("subscribe failed") };

    let mut tasks = Vec::new();
    for n in 0..32 {
        let registry = Arc::clone(&registry);
        let key = key.clone();
        tasks.push(tokio::spawn(async move {
            registry.ingest(request(&key, format!("c{n}"))).await
        }));
    }
    for task in tasks {
        match task.await {
            Ok(Ok(())) => {}
            other => panic!("ingest task failed: {other:?}"),
        }
    }

    let mut delivered = Vec::new();
    for _ in 0..32 {
        match tokio::time::timeout(Duration::from_secs(2), feed.recv()).await {
            Ok(Some(r)) => delivered.push(String::from_utf8_lossy(&r.body).into_owned()),
            Ok(None) => panic!("feed closed early"),
            Err(_) => panic!("timed out after {} deliveries", delivered.len()),
        }
    }

    let Ok(history) = registry.snapshot(&key).await else { panic!("snapshot failed") };
    assert_eq!(bodies(&history), delivered);

    hub.shutdown().await;
}

proptest::proptest! {
    #[test]
    fn proptest_snapshot_is_last_min_n_cap_in_arrival_order(
        n in 0usize..40,
        capacity in 1usize..16,
    ) {
        let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
            Ok(rt) => rt,
            Err(e) => panic!("failed to build runtime: {e}"),
        };
        let got = runtime.block_on(async {
            let config = HubConfig::default().history_capacity(capacity).queue_capacity(64);
            let (registry, _queue) =
                Registry::new(config, Arc::new(RandomKeyGenerator::default()));
            let key = match registry.create().await {
                Ok(k) => k,
                Err(e) => panic!("create failed: {e}"),
            };
            for i in 0..n {
                if let Err(e) = registry.ingest(request(&key, i.to_string())).await {
                    panic!("ingest failed: {e}");
                }
            }
            match registry.snapshot(&key).await {
                Ok(s) => bodies(&s),
                Err(e) => panic!("snapshot failed: {e}"),
            }
        });

        let kept = n.min(capacity);
        let expected: Vec<String> = (n - kept..n).map(|i| i.to_string()).collect();
        proptest::prop_assert_eq!(got.len(), kept);
        proptest::prop_assert_eq!(got, expected);
    }
}
