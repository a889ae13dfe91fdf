use std::thread;
use std::time::Duration;

use once_cell::sync::OnceCell;
use procline::{ChannelHandle, Result};

static INIT: OnceCell<()> = OnceCell::new();

/// Install a test log subscriber once per test binary (RUST_LOG controls it).
pub fn init_logging() {
    INIT.get_or_init(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Poll the channel until it yields data or reports the endpoint closed.
/// Panics if nothing happens within ~2 seconds; tests must never hang.
pub fn poll_read(chan: &ChannelHandle) -> Result<Vec<u8>> {
    for _ in 0..2000 {
        match chan.read() {
            Ok(bytes) if bytes.is_empty() => thread::sleep(Duration::from_millis(1)),
            other => return other,
        }
    }
    panic!("channel produced no data and did not close within the deadline");
}

/// Assert that repeated reads over a short window stay empty (no complete
/// record available) without the channel failing.
#[allow(dead_code)]
pub fn assert_stays_empty(chan: &ChannelHandle) {
    for _ in 0..50 {
        let bytes = chan.read().expect("channel must stay open");
        assert!(
            bytes.is_empty(),
            "expected no data, got {:?}",
            String::from_utf8_lossy(&bytes)
        );
        thread::sleep(Duration::from_millis(1));
    }
}
