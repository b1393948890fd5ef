//! Producers submitting from many tasks at once: nothing is lost and each
//! producer's events arrive in submission order.

use std::collections::HashMap;
use std::sync::Arc;

use notice_core::model::topology::Lid;
use notice_core::{ContextResolver, MemoryFabric, NoticeApi, NoticeId, StlPayloadDecoder};
use project_tests::fixtures::{self, ChannelListener, DOMAIN};

const PRODUCERS: u64 = 4;
const PER_PRODUCER: u64 = 50;

fn api(fabric: &MemoryFabric) -> NoticeApi {
    let resolver = ContextResolver::new(
        DOMAIN,
        Arc::new(fabric.live_cache(DOMAIN)),
        Arc::new(fabric.clone()),
        Arc::new(StlPayloadDecoder),
    );
    NoticeApi::new(resolver, None)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_producers_lose_nothing() {
    let fabric = fixtures::star_fabric(4);
    let api = Arc::new(api(&fabric));
    let (listener, mut rx) = ChannelListener::new();
    api.add_listener(listener);

    let mut producers = Vec::new();
    for producer in 0..PRODUCERS {
        let api = Arc::clone(&api);
        producers.push(tokio::spawn(async move {
            for i in 0..PER_PRODUCER {
                let id = producer * 1000 + i;
                let lid = (producer + 1) as u32;
                assert_eq!(api.submit_raw(&[fixtures::link_integrity(id, lid)]), 1);
                tokio::task::yield_now().await;
            }
        }));
    }
    for producer in producers {
        producer.await.unwrap();
    }

    let events = fixtures::recv_events(&mut rx, (PRODUCERS * PER_PRODUCER) as usize).await;
    let mut by_producer: HashMap<u64, Vec<u64>> = HashMap::new();
    for NoticeId(id) in fixtures::ids(&events) {
        by_producer.entry(id / 1000).or_default().push(id % 1000);
    }
    assert_eq!(by_producer.len() as u64, PRODUCERS);
    for sequence in by_producer.values() {
        assert_eq!(*sequence, (0..PER_PRODUCER).collect::<Vec<_>>());
    }
    assert!(events.iter().all(|e| e.source.as_ref().and_then(|s| s.lid()).is_some_and(|lid| lid != Lid(0))));
}

#[tokio::test]
async fn test_removed_listener_stops_receiving() {
    let fabric = fixtures::star_fabric(1);
    let api = api(&fabric);
    let (kept, mut kept_rx) = ChannelListener::new();
    let (gone, mut gone_rx) = ChannelListener::new();
    api.add_listener(kept);
    let gone_id = api.add_listener(gone);

    api.submit_raw(&[fixtures::link_integrity(1, 1)]);
    fixtures::recv_events(&mut kept_rx, 1).await;
    fixtures::recv_events(&mut gone_rx, 1).await;

    assert!(api.remove_listener(gone_id));
    api.submit_raw(&[fixtures::link_integrity(2, 1)]);
    assert_eq!(fixtures::ids(&fixtures::recv_events(&mut kept_rx, 1).await), vec![NoticeId(2)]);
    assert!(gone_rx.try_recv().is_err());
}
