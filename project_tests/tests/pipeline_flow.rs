//! Notices through a registry pipeline: claim, resolve, persist, update and
//! deliver to listeners.

use std::collections::HashMap;

use notice_core::model::topology::Lid;
use notice_core::{
    EventCategory, EventSource, NoticeId, NoticeStatus, ProcessingOutcome, Severity,
};
use project_tests::fixtures::{self, ChannelListener, DOMAIN, SWITCH_LID};

#[tokio::test]
async fn test_processed_notices_reach_every_listener() {
    let fabric = fixtures::star_fabric(3);
    for lid in 1..=3 {
        fabric.insert_notice(DOMAIN, fixtures::link_integrity(u64::from(lid), lid)).unwrap();
    }
    let registry = fixtures::registry(&fabric);
    let pipeline = registry.get_or_create(DOMAIN);
    let (first, mut first_rx) = ChannelListener::new();
    let (second, mut second_rx) = ChannelListener::new();
    pipeline.api.add_listener(first);
    pipeline.api.add_listener(second);

    let report = pipeline.run_cycle().await.unwrap();
    assert_eq!(report.count(ProcessingOutcome::Processed), 3);
    assert_eq!(report.persist.unwrap().wait().await, Ok(3));

    let a = fixtures::recv_events(&mut first_rx, 3).await;
    let b = fixtures::recv_events(&mut second_rx, 3).await;
    let expected = vec![NoticeId(1), NoticeId(2), NoticeId(3)];
    assert_eq!(fixtures::ids(&a), expected);
    assert_eq!(fixtures::ids(&b), expected);

    let event = &a[0];
    assert_eq!(event.category, EventCategory::LinkIntegrity);
    assert_eq!(event.severity, Severity::Warning);
    assert!(matches!(event.source, Some(EventSource::Port { lid: Lid(1), port_num: 1, .. })));
    assert_eq!(event.related, vec![SWITCH_LID]);
}

#[tokio::test]
async fn test_failed_notice_is_isolated() {
    let fabric = fixtures::star_fabric(5);
    for lid in 1..=5 {
        fabric.insert_notice(DOMAIN, fixtures::link_integrity(u64::from(lid), lid)).unwrap();
    }
    fabric.fail_updates_for(DOMAIN, Lid(3));

    let registry = fixtures::registry(&fabric);
    let pipeline = registry.get_or_create(DOMAIN);
    let (listener, mut rx) = ChannelListener::new();
    pipeline.api.add_listener(listener);

    let report = pipeline.run_cycle().await.unwrap();
    assert_eq!(report.outcome(NoticeId(3)), Some(ProcessingOutcome::UpdateFailed));
    assert_eq!(report.count(ProcessingOutcome::Processed), 4);

    let delivered = fixtures::recv_events(&mut rx, 4).await;
    assert_eq!(
        fixtures::ids(&delivered),
        vec![NoticeId(1), NoticeId(2), NoticeId(4), NoticeId(5)]
    );
    assert_eq!(fabric.notice(DOMAIN, NoticeId(3)).unwrap().status, NoticeStatus::FeError);
    assert_eq!(fabric.notice(DOMAIN, NoticeId(4)).unwrap().status, NoticeStatus::Processed);
}

#[tokio::test]
async fn test_port_state_change_updates_neighbours() {
    let fabric = fixtures::star_fabric(3);
    fabric.insert_notice(DOMAIN, fixtures::port_change(1, SWITCH_LID)).unwrap();

    let registry = fixtures::registry(&fabric);
    let pipeline = registry.get_or_create(DOMAIN);
    let report = pipeline.run_cycle().await.unwrap();
    assert_eq!(report.outcome(NoticeId(1)), Some(ProcessingOutcome::Processed));
    assert_eq!(report.persist.unwrap().wait().await, Ok(4));

    let records = fabric.persisted_records(DOMAIN);
    assert_eq!(records[0].node.lid, SWITCH_LID);
    assert_eq!(records[0].notice_id(), Some(NoticeId(1)));
    let mut neighbours: Vec<Lid> = records[1..].iter().map(|r| r.node.lid).collect();
    neighbours.sort();
    assert_eq!(neighbours, vec![Lid(1), Lid(2), Lid(3)]);
    assert!(records[1..].iter().all(|r| r.notice.is_none()));
}

#[tokio::test]
async fn test_unknown_issuer_is_not_delivered() {
    let fabric = fixtures::star_fabric(1);
    fabric.insert_notice(DOMAIN, fixtures::link_integrity(1, 1)).unwrap();
    fabric.insert_notice(DOMAIN, fixtures::link_integrity(2, 42)).unwrap();

    let registry = fixtures::registry(&fabric);
    let pipeline = registry.get_or_create(DOMAIN);
    let (listener, mut rx) = ChannelListener::new();
    pipeline.api.add_listener(listener);

    let report = pipeline.run_cycle().await.unwrap();
    assert_eq!(report.outcome(NoticeId(2)), Some(ProcessingOutcome::ContextMissing));
    assert_eq!(fixtures::ids(&fixtures::recv_events(&mut rx, 1).await), vec![NoticeId(1)]);
    assert_eq!(fabric.notice(DOMAIN, NoticeId(2)).unwrap().status, NoticeStatus::FeError);
}

#[tokio::test]
async fn test_severity_overrides_apply_to_delivered_events() {
    let fabric = fixtures::star_fabric(2);
    fabric.insert_notice(DOMAIN, fixtures::link_integrity(1, 1)).unwrap();

    let registry = fixtures::registry(&fabric);
    let pipeline = registry.get_or_create(DOMAIN);
    pipeline
        .api
        .set_severity_overrides(HashMap::from([(EventCategory::LinkIntegrity, Severity::Critical)]));
    let (listener, mut rx) = ChannelListener::new();
    pipeline.api.add_listener(listener);

    pipeline.run_cycle().await.unwrap();
    let events = fixtures::recv_events(&mut rx, 1).await;
    assert_eq!(events[0].severity, Severity::Critical);
}
