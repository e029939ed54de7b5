//! Picks which [`obridge_server::pool::AdapterFactory`] the pool builds
//! handles from. The bridge's core never hardcodes an automation technique
//! (spec §1 Non-goal); this module is the one place that decision gets made
//! for a given process.

use std::sync::Arc;

use async_trait::async_trait;
use obridge_adapter::AdapterResult;
use obridge_server::pool::{AdapterFactory, SharedAdapter};
use obridge_test_helpers::MockAdapter;

/// Which adapter backs the pool. `Auto` resolves to `WindowsOutlook` when
/// compiled with the `outlook-com` feature on Windows, and to `Mock`
/// everywhere else — the reference COM adapter has no other platform to
/// target, and the in-memory mock is explicitly sanctioned for local manual
/// testing (see `obridge_test_helpers::MockAdapter`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum AdapterKind {
    Auto,
    Mock,
    WindowsOutlook,
}

fn resolve(kind: AdapterKind) -> AdapterKind {
    match kind {
        AdapterKind::Auto if cfg!(all(target_os = "windows", feature = "outlook-com")) => {
            AdapterKind::WindowsOutlook
        }
        AdapterKind::Auto => AdapterKind::Mock,
        other => other,
    }
}

/// Builds the factory the pool will call into on every `create()`.
///
/// # Errors
/// Returns an error if `WindowsOutlook` is requested but this binary was not
/// built with the `outlook-com` feature on Windows.
pub fn build_factory(kind: AdapterKind) -> Result<Arc<dyn AdapterFactory>, String> {
    match resolve(kind) {
        AdapterKind::Mock => {
            tracing::warn!("using in-memory MockAdapter: no real mailbox is connected");
            Ok(Arc::new(MockAdapterFactory::default()))
        }
        AdapterKind::WindowsOutlook => {
            if cfg!(all(target_os = "windows", feature = "outlook-com")) {
                Ok(Arc::new(WindowsOutlookAdapterFactory))
            } else {
                Err("windows-outlook adapter requires building for target_os = \"windows\" \
                     with the outlook-com feature enabled"
                    .to_string())
            }
        }
        AdapterKind::Auto => unreachable!("resolve() never returns Auto"),
    }
}

/// Hands out a fresh sample mailbox per pool handle, since `MockAdapter`
/// keeps its state in memory rather than behind a shared connection.
#[derive(Default)]
struct MockAdapterFactory;

#[async_trait]
impl AdapterFactory for MockAdapterFactory {
    async fn create(&self) -> AdapterResult<SharedAdapter> {
        Ok(Arc::new(MockAdapter::with_sample_inbox(25)))
    }
}

struct WindowsOutlookAdapterFactory;

#[async_trait]
impl AdapterFactory for WindowsOutlookAdapterFactory {
    #[cfg(all(target_os = "windows", feature = "outlook-com"))]
    async fn create(&self) -> AdapterResult<SharedAdapter> {
        obridge_adapter::windows_outlook::WindowsOutlookAdapter::connect()
            .map(|adapter| Arc::new(adapter) as SharedAdapter)
    }

    #[cfg(not(all(target_os = "windows", feature = "outlook-com")))]
    async fn create(&self) -> AdapterResult<SharedAdapter> {
        Err(obridge_adapter::AdapterError::Unavailable(
            "windows-outlook adapter not compiled into this binary".to_string(),
        ))
    }
}
