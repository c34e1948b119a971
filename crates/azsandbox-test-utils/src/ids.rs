//! Unique names and test logging

use chrono::Utc;
use std::sync::Once;

/// Generate a unique VM name for test resources.
///
/// Format: `vm-{timestamp_ms}-{counter}`, unique within the process even
/// when tests start in the same millisecond.
///
/// # Example
///
/// ```
/// use azsandbox_test_utils::ids::unique_vm_name;
///
/// let name = unique_vm_name();
/// assert!(name.starts_with("vm-"));
/// ```
pub fn unique_vm_name() -> String {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    let ts = Utc::now().timestamp_millis();
    let counter = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("vm-{}-{}", ts, counter)
}

/// Route `tracing` output through the test harness writer.
///
/// Safe to call from every test; only the first call installs the
/// subscriber. Honours `RUST_LOG`.
pub fn init_test_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
