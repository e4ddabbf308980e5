//! Integration tests for the primary/secondary launch flow.
//!
//! Each test plays both roles inside one process, using a private instance
//! directory so tests never see a real running Vaultdesk.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use vaultdesk_core::instance::launch::negotiate_with_timeout;
use vaultdesk_core::{
    bind_primary, negotiate, ApplicationIdentity, CommandDispatcher, InstanceArbiter, Launch,
    Presenter, ShutdownCoordinator, ShutdownRegistry,
};

struct ChannelPresenter(mpsc::UnboundedSender<PathBuf>);

impl Presenter for ChannelPresenter {
    fn present_directory(&self, path: &Path) {
        let _ = self.0.send(path.to_path_buf());
    }
}

fn arbiter(dir: &Path) -> InstanceArbiter {
    InstanceArbiter::with_dir(ApplicationIdentity::new("launch-integration"), dir)
}

fn arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

async fn next_presented(rx: &mut mpsc::UnboundedReceiver<PathBuf>) -> PathBuf {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("presentation within bounded delay")
        .expect("presenter channel open")
}

/// Start a primary and return its registry plus the presented-path receiver.
async fn start_primary(
    arbiter: &InstanceArbiter,
    launch_args: Vec<String>,
) -> (Arc<ShutdownRegistry>, mpsc::UnboundedReceiver<PathBuf>) {
    let Launch::Primary(claim) = negotiate(arbiter, &CommandDispatcher::default(), &launch_args)
        .await
        .unwrap()
    else {
        panic!("Expected first launch to be primary");
    };

    let registry = Arc::new(ShutdownRegistry::new());
    let (tx, rx) = mpsc::unbounded_channel();
    bind_primary(
        claim,
        &registry,
        CommandDispatcher::default(),
        Arc::new(ChannelPresenter(tx)),
        launch_args,
    )
    .unwrap();
    (registry, rx)
}

#[tokio::test]
async fn test_primary_presents_its_own_arguments() {
    let temp = TempDir::new().unwrap();
    let vault = temp.path().join("own-vault");

    let (registry, mut rx) = start_primary(&arbiter(temp.path()), vec![arg(&vault)]).await;

    assert_eq!(next_presented(&mut rx).await, vault);
    registry.run();
}

#[tokio::test]
async fn test_secondary_arguments_reach_primary_in_order() {
    let temp = TempDir::new().unwrap();
    let arbiter = arbiter(temp.path());
    let (registry, mut rx) = start_primary(&arbiter, Vec::new()).await;

    let key_dir = temp.path().join("keyed");
    std::fs::create_dir_all(&key_dir).unwrap();
    let key_file = key_dir.join("vault.MasterKey");
    std::fs::write(&key_file, b"{}").unwrap();
    let fresh = temp.path().join("fresh").join("vault");
    let noise = temp.path().join("notes.txt");
    std::fs::write(&noise, b"").unwrap();

    let launch = negotiate(
        &arbiter,
        &CommandDispatcher::default(),
        &[arg(&key_file), arg(&noise), arg(&fresh)],
    )
    .await
    .unwrap();
    assert!(matches!(launch, Launch::Forwarded { accepted: 2 }));

    assert_eq!(next_presented(&mut rx).await, key_dir);
    assert_eq!(next_presented(&mut rx).await, fresh);

    registry.run();
}

#[tokio::test]
async fn test_many_secondaries_all_delivered() {
    let temp = TempDir::new().unwrap();
    let arbiter = arbiter(temp.path());
    let (registry, mut rx) = start_primary(&arbiter, Vec::new()).await;

    let expected: Vec<PathBuf> = (0..5).map(|i| temp.path().join(format!("v{}", i))).collect();
    let mut launches = Vec::new();
    for path in &expected {
        let arbiter = arbiter.clone();
        let raw = vec![arg(path)];
        launches.push(tokio::spawn(async move {
            negotiate(&arbiter, &CommandDispatcher::default(), &raw)
                .await
                .unwrap()
        }));
    }
    for launch in launches {
        assert!(matches!(launch.await.unwrap(), Launch::Forwarded { accepted: 1 }));
    }

    let mut received = Vec::new();
    for _ in 0..expected.len() {
        received.push(next_presented(&mut rx).await);
    }
    received.sort();
    let mut expected = expected;
    expected.sort();
    assert_eq!(received, expected);

    registry.run();
}

#[tokio::test]
async fn test_quit_releases_instance_for_next_launch() {
    let temp = TempDir::new().unwrap();
    let arbiter = arbiter(temp.path());
    let (registry, _rx) = start_primary(&arbiter, Vec::new()).await;

    let coordinator = ShutdownCoordinator::new(registry.clone());
    let report = coordinator.quit();
    assert_eq!(report.faulted, 0);
    assert!(report.executed >= 3);
    assert!(coordinator.quit().is_noop());

    // The old primary is gone, so the next launch takes over.
    let launch = negotiate_with_timeout(
        &arbiter,
        &CommandDispatcher::default(),
        &[],
        Duration::from_millis(200),
    )
    .await
    .unwrap();
    assert!(matches!(launch, Launch::Primary(_)));
}
