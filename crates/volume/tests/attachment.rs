use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use fleetnode_volume::{
    CacheConfig, Error, RetryPolicy, VolumeAttachment, VolumeAttachmentOptions, VolumeHandle,
    WaitMode,
};
use fleetnode_volume_memory::{Call, MemoryVolumeBackend, Operation};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tracing_test::traced_test;

fn attachment(
    backend: MemoryVolumeBackend,
    dir: &TempDir,
) -> VolumeAttachment<MemoryVolumeBackend> {
    attachment_with_policy(backend, dir, RetryPolicy::default())
}

fn attachment_with_policy(
    backend: MemoryVolumeBackend,
    dir: &TempDir,
    retry_policy: RetryPolicy,
) -> VolumeAttachment<MemoryVolumeBackend> {
    VolumeAttachment::new(VolumeAttachmentOptions {
        backend,
        cache: CacheConfig {
            path: dir.path().join("cache"),
            size_mb: 64,
        },
        mount_cache_size_mb: 16,
        retry_policy,
    })
}

fn data_volume() -> VolumeHandle {
    VolumeHandle::new("mongodb", "mongoddata.vhd", 5120)
}

#[tokio::test]
async fn test_rejects_zero_size() {
    let dir = TempDir::new().unwrap();
    let backend = MemoryVolumeBackend::new("node-0");
    let attachment = attachment(backend.clone(), &dir);

    let result = attachment
        .acquire(
            &VolumeHandle::new("mongodb", "empty.vhd", 0),
            WaitMode::FailFast,
            &CancellationToken::new(),
        )
        .await;

    assert_matches!(result, Err(Error::InvalidSize(_)));
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn test_cache_initialized_once() {
    let dir = TempDir::new().unwrap();
    let backend = MemoryVolumeBackend::new("node-0");
    let attachment = attachment(backend.clone(), &dir);
    let cancel = CancellationToken::new();

    let mount = attachment
        .acquire(&data_volume(), WaitMode::FailFast, &cancel)
        .await
        .unwrap();
    attachment.release(&mount).await;
    attachment
        .acquire(&data_volume(), WaitMode::FailFast, &cancel)
        .await
        .unwrap();

    let inits = backend
        .calls()
        .into_iter()
        .filter(|call| matches!(call, Call::InitializeCache(_)))
        .count();
    assert_eq!(inits, 1);
}

#[tokio::test]
async fn test_fail_fast_under_contention() {
    let dir = TempDir::new().unwrap();
    let first = MemoryVolumeBackend::new("node-0");
    let second = first.instance("node-1");
    let a = attachment(first, &dir);
    let b = attachment(second, &dir);
    let cancel = CancellationToken::new();

    let volume_a = data_volume();
    let volume_b = data_volume();
    let (ra, rb) = tokio::join!(
        a.acquire(&volume_a, WaitMode::FailFast, &cancel),
        b.acquire(&volume_b, WaitMode::FailFast, &cancel),
    );

    let winners = [ra.is_ok(), rb.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(winners, 1);

    let loser = if ra.is_ok() { rb } else { ra };
    assert_matches!(loser, Err(Error::VolumeLocked { holder: Some(_), .. }));
}

#[tokio::test(start_paused = true)]
async fn test_retry_until_holder_releases() {
    let dir = TempDir::new().unwrap();
    let first = MemoryVolumeBackend::new("node-0");
    let second = first.instance("node-1");
    let holder = Arc::new(attachment(first, &dir));
    let waiter = attachment(second.clone(), &dir);
    let cancel = CancellationToken::new();

    let held = holder
        .acquire(&data_volume(), WaitMode::FailFast, &cancel)
        .await
        .unwrap();

    let releaser = {
        let holder = Arc::clone(&holder);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(95)).await;
            holder.release(&held).await;
        })
    };

    let mount = waiter
        .acquire(&data_volume(), WaitMode::RetryUntilAcquired, &cancel)
        .await
        .unwrap();
    releaser.await.unwrap();

    assert_eq!(mount.volume, data_volume());
    let mounts = second
        .calls()
        .into_iter()
        .filter(|call| matches!(call, Call::Mount(_)))
        .count();
    // locked at 0s, 30s, 60s and 90s; the lease is free by 120s
    assert_eq!(mounts, 5);
}

#[tokio::test(start_paused = true)]
async fn test_max_attempts() {
    let dir = TempDir::new().unwrap();
    let first = MemoryVolumeBackend::new("node-0");
    let second = first.instance("node-1");
    let holder = attachment(first, &dir);
    let waiter = attachment_with_policy(
        second,
        &dir,
        RetryPolicy {
            max_attempts: Some(3),
            ..RetryPolicy::default()
        },
    );
    let cancel = CancellationToken::new();

    holder
        .acquire(&data_volume(), WaitMode::FailFast, &cancel)
        .await
        .unwrap();

    let result = waiter
        .acquire(&data_volume(), WaitMode::RetryUntilAcquired, &cancel)
        .await;

    assert_matches!(result, Err(Error::RetriesExhausted { attempts: 3, .. }));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_while_waiting() {
    let dir = TempDir::new().unwrap();
    let first = MemoryVolumeBackend::new("node-0");
    let second = first.instance("node-1");
    let holder = attachment(first, &dir);
    let waiter = attachment(second.clone(), &dir);
    let cancel = CancellationToken::new();

    holder
        .acquire(&data_volume(), WaitMode::FailFast, &CancellationToken::new())
        .await
        .unwrap();

    let canceller = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(45)).await;
            cancel.cancel();
        })
    };

    let result = waiter
        .acquire(&data_volume(), WaitMode::RetryUntilAcquired, &cancel)
        .await;
    canceller.await.unwrap();

    assert_matches!(result, Err(Error::Cancelled(_)));
    assert!(!second.is_held_by_self(&data_volume()));
}

#[tokio::test]
async fn test_mount_failure_is_not_retried() {
    let dir = TempDir::new().unwrap();
    let backend = MemoryVolumeBackend::new("node-0");
    backend.fail_next(Operation::Mount);
    let attachment = attachment(backend, &dir);

    let result = attachment
        .acquire(
            &data_volume(),
            WaitMode::RetryUntilAcquired,
            &CancellationToken::new(),
        )
        .await;

    assert_matches!(result, Err(Error::Backend(_)));
}

#[tokio::test]
async fn test_create_failures_are_swallowed() {
    let dir = TempDir::new().unwrap();
    let backend = MemoryVolumeBackend::new("node-0");
    let attachment = attachment(backend.clone(), &dir);
    let cancel = CancellationToken::new();

    // first acquire creates, the second sees both already present
    let mount = attachment
        .acquire(&data_volume(), WaitMode::FailFast, &cancel)
        .await
        .unwrap();
    attachment.release(&mount).await;

    backend.fail_next(Operation::CreateContainer);
    backend.fail_next(Operation::CreateVolume);
    attachment
        .acquire(&data_volume(), WaitMode::FailFast, &cancel)
        .await
        .unwrap();
}

#[traced_test]
#[tokio::test]
async fn test_size_mismatch_warns() {
    let dir = TempDir::new().unwrap();
    let backend = MemoryVolumeBackend::new("node-0");
    let attachment = attachment(backend, &dir);
    let cancel = CancellationToken::new();

    let mount = attachment
        .acquire(&data_volume(), WaitMode::FailFast, &cancel)
        .await
        .unwrap();
    attachment.release(&mount).await;

    let bigger = VolumeHandle::new("mongodb", "mongoddata.vhd", 10240);
    let mount = attachment
        .acquire(&bigger, WaitMode::FailFast, &cancel)
        .await
        .unwrap();

    assert_eq!(mount.volume.size_mb, 10240);
    assert!(logs_contain("different size"));
}

#[traced_test]
#[tokio::test]
async fn test_release_failure_is_logged() {
    let dir = TempDir::new().unwrap();
    let backend = MemoryVolumeBackend::new("node-0");
    let attachment = attachment(backend.clone(), &dir);

    let mount = attachment
        .acquire(&data_volume(), WaitMode::FailFast, &CancellationToken::new())
        .await
        .unwrap();
    backend.fail_next(Operation::Unmount);
    attachment.release(&mount).await;

    assert!(logs_contain("failed to release volume"));
}
