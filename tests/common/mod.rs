#![allow(dead_code)]

use std::time::{Duration, Instant};
use unvdash::tunnel::{LaunchConfig, StatusStore, TunnelStatus};

/// Path to the fake `loclx` script, made executable if the checkout lost
/// the mode bit.
#[cfg(unix)]
pub fn fake_loclx() -> String {
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;

    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/fake-loclx");
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    if perms.mode() & 0o111 != 0o111 {
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
    }
    path.to_string_lossy().into_owned()
}

#[cfg(unix)]
pub fn scenario(name: &str) -> LaunchConfig {
    LaunchConfig {
        binary: fake_loclx(),
        access_token: Some("secret".to_string()),
        to: name.to_string(),
        region: None,
        port: None,
        reserved_endpoint: None,
    }
}

pub fn without_token() -> LaunchConfig {
    LaunchConfig {
        binary: "loclx".to_string(),
        access_token: None,
        to: "unvanq-server:27960".to_string(),
        region: None,
        port: None,
        reserved_endpoint: None,
    }
}

pub async fn wait_for(store: &StatusStore, what: impl Fn(&TunnelStatus) -> bool) -> TunnelStatus {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let status = store.status();
        if what(&status) {
            return status;
        }
        assert!(
            Instant::now() < deadline,
            "timed out waiting for status, last seen: {status:?}"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
