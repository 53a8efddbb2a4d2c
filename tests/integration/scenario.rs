use pretty_assertions::assert_eq;
use std::collections::HashSet;

use rubix_core::TagPredicate;
use rubix_tests::scenario;

#[test_log::test(tokio::test)]
async fn test_network_delete_and_restore_scenario() {
    let s = scenario().await.unwrap();
    let service = &s.harness.service;
    let medium = [TagPredicate::new("category", "medium")];

    service.set_alive(&s.a, false).await.unwrap();
    assert!(service.get_subtree(&s.a, 3).await.unwrap().is_empty());
    assert!(service.find_by_tags(&medium, None).await.unwrap().is_empty());

    service.set_alive(&s.a, true).await.unwrap();
    let subtree: Vec<_> = service
        .get_subtree(&s.a, 3)
        .await
        .unwrap()
        .into_iter()
        .map(|row| (row.id, row.level))
        .collect();
    assert_eq!(
        subtree,
        vec![(s.a.clone(), 0), (s.b.clone(), 1), (s.c.clone(), 2)]
    );
    assert_eq!(
        service.find_by_tags(&medium, None).await.unwrap(),
        HashSet::from([s.c.clone()])
    );
}

#[tokio::test]
async fn test_deleting_the_middle_keeps_the_root_visible() {
    let s = scenario().await.unwrap();
    let service = &s.harness.service;

    let report = service.set_alive(&s.b, false).await.unwrap();
    assert_eq!(report.nodes, 2);
    assert_eq!(report.tags, 1);

    let subtree = service.get_subtree(&s.a, 3).await.unwrap();
    assert_eq!(subtree.len(), 1);
    assert_eq!(subtree[0].id, s.a);
}
