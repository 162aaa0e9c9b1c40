//! End-to-end reconciliation against the in-memory store and fake platform.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use common::{FakeDebugger, FakeLocator, Harness, TestResult, svc_spec};
use kubedbg_api::{
    AttachmentClient, AttachmentRef, AttachmentSpec, AttachmentState, AttachmentStatus,
    ChangeStream, DebugAttachment, InMemoryAttachmentStore, Snapshot, WireState, request_attach,
    request_delete,
};
use kubedbg_reconciler::{ActionKind, Error, ReconcilerBuilder};

fn locator() -> FakeLocator {
    FakeLocator::new()
        .with_process("pod-a", "c0", "svc", 101)
        .with_process("pod-a", "c0", "sidecar-helper", 140)
        .with_process("pod-b", "c0", "svc", 201)
        .with_process("pod-c", "c0", "svc", 301)
}

#[tokio::test]
async fn test_literal_attach_reaches_attached_with_address() -> TestResult {
    // GIVEN: svc:v1 in pod-a/c0 requested with no process filter under dlv
    let harness = Harness::new(locator())?;
    request_attach(harness.store.as_ref(), "dev", "dbg-1", svc_spec("pod-a")).await?;

    // WHEN: a pass runs and its tasks finish
    let summary = harness.pass(&["dev"]).await?;
    harness.idle().await;

    // THEN: the resource is Attached with the debug server's address
    assert_eq!(summary.launched, 1);
    let attached = harness.get("dev", "dbg-1").await.ok_or("attachment missing")?;
    assert!(attached.state().is(AttachmentState::Attached));
    assert!(!attached.status.debug_server_address.is_empty());

    // AND: the debugger runs against the container's lowest pid
    let session = harness
        .syncer
        .dispatcher()
        .controller()
        .session(&AttachmentRef::new("dev", "dbg-1"))
        .ok_or("session missing")?;
    assert_eq!(session.pid, 101);
    assert_eq!(session.address, attached.status.debug_server_address);
    assert_eq!(harness.debugger.live(), 1);
    Ok(())
}

#[tokio::test]
async fn test_process_filter_selects_matching_process() -> TestResult {
    // GIVEN: a filter naming the sidecar process
    let harness = Harness::new(locator())?;
    let spec = svc_spec("pod-a").with_process_filter("sidecar-helper");
    request_attach(harness.store.as_ref(), "dev", "dbg-1", spec).await?;

    // WHEN
    harness.pass(&["dev"]).await?;
    harness.idle().await;

    // THEN
    let session = harness
        .syncer
        .dispatcher()
        .controller()
        .session(&AttachmentRef::new("dev", "dbg-1"))
        .ok_or("session missing")?;
    assert_eq!(session.pid, 140);
    Ok(())
}

#[tokio::test]
async fn test_nonexistent_filter_never_attaches() -> TestResult {
    // GIVEN: the literal attach with a filter nothing matches
    let harness = Harness::new(locator())?;
    let spec = svc_spec("pod-a").with_process_filter("does-not-exist");
    request_attach(harness.store.as_ref(), "dev", "dbg-1", spec).await?;

    // WHEN: several passes run
    for _ in 0..3 {
        harness.pass(&["dev"]).await?;
        harness.idle().await;
    }

    // THEN: the resource never reached Attached and has no address
    let current = harness.get("dev", "dbg-1").await.ok_or("attachment missing")?;
    assert!(!current.state().is(AttachmentState::Attached));
    assert!(current.status.debug_server_address.is_empty());
    assert_eq!(harness.debugger.live(), 0);

    // AND: the failure was reported once, naming the filter
    let failures = harness.reporter.failures();
    assert_eq!(failures.len(), 1);
    let (reference, action, message) = failures.first().ok_or("no failure reported")?;
    assert_eq!(reference, &AttachmentRef::new("dev", "dbg-1"));
    assert_eq!(*action, ActionKind::Attach);
    assert!(message.contains("does-not-exist"));
    Ok(())
}

#[tokio::test]
async fn test_unsupported_debugger_is_reported() -> TestResult {
    // GIVEN: a debugger kind the platform does not offer
    let harness = Harness::new(locator())?;
    let spec = AttachmentSpec::new("svc:v1", "pod-a", "c0", "lldb");
    request_attach(harness.store.as_ref(), "dev", "dbg-1", spec).await?;

    // WHEN
    harness.pass(&["dev"]).await?;
    harness.idle().await;

    // THEN
    let current = harness.get("dev", "dbg-1").await.ok_or("attachment missing")?;
    assert!(current.state().is(AttachmentState::PendingAttachment));
    assert!(
        harness
            .reporter
            .failures()
            .iter()
            .any(|(_, _, message)| message.contains("lldb"))
    );
    Ok(())
}

#[tokio::test]
async fn test_pass_dispatches_every_resource_once() -> TestResult {
    // GIVEN: seven resources spread unevenly over three namespaces
    let harness = Harness::new(locator())?;
    let layout = [("a", 1), ("b", 2), ("c", 4)];
    for (namespace, count) in layout {
        for i in 0..count {
            let attachment = DebugAttachment::new(
                AttachmentRef::new(namespace, format!("dbg-{i}")),
                svc_spec("pod-a"),
            )
            .with_status(AttachmentStatus::attached(format!("10.0.0.1:{i}")));
            harness.store.create(attachment).await?;
        }
    }

    // WHEN
    let summary = harness.pass(&["a", "b", "c"]).await?;

    // THEN: one dispatch each, nothing to do for Attached resources
    assert_eq!(summary.dispatched, 7);
    assert_eq!(summary.idle, 7);
    assert!(summary.is_quiet());
    Ok(())
}

#[tokio::test]
async fn test_unrecognized_state_fails_the_pass() -> TestResult {
    // GIVEN: a snapshot whose first resource carries an unknown state
    let harness = Harness::new(locator())?;
    request_attach(harness.store.as_ref(), "ns-b", "good", svc_spec("pod-a")).await?;

    let unknown = DebugAttachment::new(AttachmentRef::new("ns-a", "bad"), svc_spec("pod-b"))
        .with_status(AttachmentStatus {
            state: WireState::Unrecognized("Detaching".to_string()),
            debug_server_address: String::new(),
        });
    let mut snapshot = harness.store.snapshot(&["ns-b".to_string()]).await?;
    snapshot.insert("ns-a", vec![unknown]);

    // WHEN
    let result = harness.syncer.sync_pass(&snapshot).await;

    // THEN: the error names the state, and nothing after it was dispatched
    let err = result.err().ok_or("pass should fail")?;
    assert!(matches!(err, Error::UnrecognizedState { .. }));
    assert!(err.to_string().contains("Detaching"));
    assert_eq!(harness.syncer.dispatcher().pool().in_flight(), 0);
    let good = harness.get("ns-b", "good").await.ok_or("attachment missing")?;
    assert!(good.state().is(AttachmentState::RequestingAttachment));

    // AND: the next pass without the bad resource proceeds
    let clean: Snapshot = snapshot.iter().filter(|a| a.namespace() == "ns-b").cloned().collect();
    harness.syncer.sync_pass(&clean).await?;
    harness.idle().await;
    assert!(
        harness
            .get("ns-b", "good")
            .await
            .is_some_and(|a| a.state().is(AttachmentState::Attached))
    );
    Ok(())
}

#[tokio::test]
async fn test_slow_attach_does_not_block_another_pod() -> TestResult {
    // GIVEN: pod-a's process lookup hangs until released
    let harness = Harness::new(locator())?;
    let gate = harness.locator.gate("pod-a");
    request_attach(harness.store.as_ref(), "dev", "slow", svc_spec("pod-a")).await?;
    request_attach(harness.store.as_ref(), "dev", "fast", svc_spec("pod-b")).await?;

    // WHEN: one pass launches both
    let summary = harness.pass(&["dev"]).await?;
    assert_eq!(summary.launched, 2);

    // THEN: pod-b attaches while pod-a is still pending
    harness.wait_for_state("dev", "fast", AttachmentState::Attached).await?;
    let slow = harness.get("dev", "slow").await.ok_or("attachment missing")?;
    assert!(slow.state().is(AttachmentState::PendingAttachment));

    // AND: releasing pod-a lets it finish
    gate.add_permits(1);
    harness.idle().await;
    harness.wait_for_state("dev", "slow", AttachmentState::Attached).await?;
    assert_eq!(harness.debugger.live(), 2);
    Ok(())
}

#[tokio::test]
async fn test_failed_attach_does_not_block_another_pod() -> TestResult {
    // GIVEN: one request that cannot resolve and one that can
    let harness = Harness::new(locator())?;
    let missing = AttachmentSpec::new("svc:v1", "pod-gone", "c0", "dlv");
    request_attach(harness.store.as_ref(), "dev", "broken", missing).await?;
    request_attach(harness.store.as_ref(), "dev", "ok", svc_spec("pod-c")).await?;

    // WHEN
    harness.pass(&["dev"]).await?;
    harness.idle().await;

    // THEN
    let ok = harness.get("dev", "ok").await.ok_or("attachment missing")?;
    assert!(ok.state().is(AttachmentState::Attached));
    let broken = harness.get("dev", "broken").await.ok_or("attachment missing")?;
    assert!(!broken.state().is(AttachmentState::Attached));
    assert_eq!(harness.reporter.failures().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_remove_then_delete_leaves_siblings_alone() -> TestResult {
    // GIVEN: two attached resources in the same namespace
    let harness = Harness::new(locator())?;
    request_attach(harness.store.as_ref(), "dev", "keep", svc_spec("pod-a")).await?;
    request_attach(harness.store.as_ref(), "dev", "drop", svc_spec("pod-b")).await?;
    harness.pass(&["dev"]).await?;
    harness.idle().await;
    assert_eq!(harness.debugger.live(), 2);

    // WHEN: the operator asks to delete one
    request_delete(harness.store.as_ref(), "dev", "drop").await?;
    let summary = harness.pass(&["dev"]).await?;
    harness.idle().await;

    // THEN: its debugger stops and it moves to PendingDelete with no address
    assert_eq!(summary.launched, 1);
    let dropping = harness.get("dev", "drop").await.ok_or("attachment missing")?;
    assert!(dropping.state().is(AttachmentState::PendingDelete));
    assert!(dropping.status.debug_server_address.is_empty());
    assert_eq!(harness.debugger.live(), 1);

    // WHEN: the next pass runs
    let summary = harness.pass(&["dev"]).await?;

    // THEN: it is deleted inline and the sibling is untouched
    assert_eq!(summary.deleted, 1);
    assert!(harness.get("dev", "drop").await.is_none());
    let kept = harness.get("dev", "keep").await.ok_or("sibling missing")?;
    assert!(kept.state().is(AttachmentState::Attached));
    assert_eq!(harness.store.len().await, 1);
    assert_eq!(harness.syncer.dispatcher().controller().session_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_in_flight_resource_is_not_dispatched_again() -> TestResult {
    // GIVEN: an attach stuck in process lookup
    let harness = Harness::new(locator())?;
    let gate = harness.locator.gate("pod-a");
    request_attach(harness.store.as_ref(), "dev", "dbg-1", svc_spec("pod-a")).await?;
    let first = harness.pass(&["dev"]).await?;

    // WHEN: more passes run before it finishes
    let second = harness.pass(&["dev"]).await?;
    let third = harness.pass(&["dev"]).await?;

    // THEN: only the first pass launched anything
    assert_eq!(first.launched, 1);
    assert_eq!(second.launched, 0);
    assert_eq!(third.launched, 0);
    assert!(
        harness
            .syncer
            .dispatcher()
            .pool()
            .is_in_flight(&AttachmentRef::new("dev", "dbg-1"))
    );

    // AND: exactly one debugger is started once released
    gate.add_permits(1);
    harness.idle().await;
    assert_eq!(harness.debugger.live(), 1);
    Ok(())
}

#[tokio::test]
async fn test_delete_during_attach_is_finished_by_the_attach_task() -> TestResult {
    // GIVEN: an attach stuck in process lookup
    let harness = Harness::new(locator())?;
    let gate = harness.locator.gate("pod-a");
    request_attach(harness.store.as_ref(), "dev", "dbg-1", svc_spec("pod-a")).await?;
    harness.pass(&["dev"]).await?;
    harness
        .wait_for_state("dev", "dbg-1", AttachmentState::PendingAttachment)
        .await?;

    // WHEN: the operator deletes it and a pass skips it as in flight
    request_delete(harness.store.as_ref(), "dev", "dbg-1").await?;
    let skipped = harness.pass(&["dev"]).await?;
    assert_eq!(skipped.in_flight, 1);
    gate.add_permits(1);
    harness.idle().await;

    // THEN: the attach task stopped its debugger and moved on to PendingDelete
    let current = harness.get("dev", "dbg-1").await.ok_or("attachment missing")?;
    assert!(current.state().is(AttachmentState::PendingDelete));
    assert_eq!(harness.debugger.live(), 0);

    // AND: the next pass deletes it
    harness.pass(&["dev"]).await?;
    assert!(harness.get("dev", "dbg-1").await.is_none());
    Ok(())
}

#[tokio::test]
async fn test_delete_during_failing_attach_is_finished_by_the_attach_task() -> TestResult {
    // GIVEN: an attach stuck in process lookup for a pod with no process
    let harness = Harness::new(locator())?;
    let gate = harness.locator.gate("pod-x");
    request_attach(harness.store.as_ref(), "dev", "dbg-x", svc_spec("pod-x")).await?;
    harness.pass(&["dev"]).await?;
    harness
        .wait_for_state("dev", "dbg-x", AttachmentState::PendingAttachment)
        .await?;

    // WHEN: the operator deletes it, a pass skips it, then the lookup fails
    request_delete(harness.store.as_ref(), "dev", "dbg-x").await?;
    let skipped = harness.pass(&["dev"]).await?;
    assert_eq!(skipped.in_flight, 1);
    gate.add_permits(1);
    harness.idle().await;

    // THEN: the failed attach was reported and the delete still went ahead
    let current = harness.get("dev", "dbg-x").await.ok_or("attachment missing")?;
    assert!(current.state().is(AttachmentState::PendingDelete));
    let failures = harness.reporter.failures();
    assert_eq!(failures.len(), 1);
    assert!(failures.iter().all(|(_, action, _)| *action == ActionKind::Attach));

    // AND: the next pass deletes it
    harness.pass(&["dev"]).await?;
    assert!(harness.get("dev", "dbg-x").await.is_none());
    Ok(())
}

/// Store that files an operator delete right after a resource reaches
/// `Attached`, while the attach task still holds it.
struct DeleteAfterAttached {
    inner: Arc<InMemoryAttachmentStore>,
}

#[async_trait]
impl AttachmentClient for DeleteAfterAttached {
    async fn list(&self, namespace: &str) -> kubedbg_api::Result<Vec<DebugAttachment>> {
        self.inner.list(namespace).await
    }

    async fn get(&self, reference: &AttachmentRef) -> kubedbg_api::Result<Option<DebugAttachment>> {
        self.inner.get(reference).await
    }

    async fn create(&self, attachment: DebugAttachment) -> kubedbg_api::Result<DebugAttachment> {
        self.inner.create(attachment).await
    }

    async fn update_status(
        &self,
        reference: &AttachmentRef,
        status: AttachmentStatus,
    ) -> kubedbg_api::Result<DebugAttachment> {
        let attached = status.state.is(AttachmentState::Attached);
        let updated = self.inner.update_status(reference, status).await?;
        if attached {
            request_delete(self.inner.as_ref(), &reference.namespace, &reference.name).await?;
        }
        Ok(updated)
    }

    async fn delete(&self, reference: &AttachmentRef) -> kubedbg_api::Result<()> {
        self.inner.delete(reference).await
    }

    async fn watch(&self, namespaces: &[String]) -> kubedbg_api::Result<ChangeStream> {
        self.inner.watch(namespaces).await
    }
}

#[tokio::test]
async fn test_delete_right_after_attached_write_is_not_lost() -> TestResult {
    // GIVEN: a store where the delete lands just after the Attached write
    let inner = InMemoryAttachmentStore::new_arc();
    let store = Arc::new(DeleteAfterAttached {
        inner: inner.clone(),
    });
    let debugger = Arc::new(FakeDebugger::default());
    let syncer = ReconcilerBuilder::new()
        .with_store(store)
        .with_locator(Arc::new(locator()))
        .with_debugger(debugger.clone())
        .build()?;
    request_attach(inner.as_ref(), "dev", "dbg-1", svc_spec("pod-a")).await?;

    // WHEN: one pass runs and its attach task finishes
    let snapshot = inner.snapshot(&["dev".to_string()]).await?;
    syncer.sync_pass(&snapshot).await?;
    syncer.dispatcher().pool().wait_idle().await;

    // THEN: the attach task picked up the delete and stopped the debugger
    let current = inner
        .get(&AttachmentRef::new("dev", "dbg-1"))
        .await?
        .ok_or("attachment missing")?;
    assert!(current.state().is(AttachmentState::PendingDelete));
    assert!(current.status.debug_server_address.is_empty());
    assert_eq!(debugger.live(), 0);
    assert_eq!(syncer.dispatcher().controller().session_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_attached_resources_always_carry_an_address() -> TestResult {
    // GIVEN: a mix of resolvable and unresolvable requests
    let harness = Harness::new(locator())?;
    for (name, pod) in [("a", "pod-a"), ("b", "pod-b"), ("c", "pod-missing")] {
        request_attach(harness.store.as_ref(), "dev", name, svc_spec(pod)).await?;
    }

    // WHEN
    harness.pass(&["dev"]).await?;
    harness.idle().await;

    // THEN: Attached exactly when an address is set
    for attachment in harness.store.list("dev").await? {
        assert_eq!(
            attachment.state().is(AttachmentState::Attached),
            !attachment.status.debug_server_address.is_empty(),
            "{}",
            attachment.reference
        );
    }
    Ok(())
}
