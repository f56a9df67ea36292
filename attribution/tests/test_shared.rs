use std::sync::Arc;

use attribution::referrer::StaticReferrerPlatform;
use attribution::test_utils::RecordingSink;
use attribution::{shared, AssumeOnline, AttributionError, PlatformContext};

fn context() -> PlatformContext {
    PlatformContext::current(
        Arc::new(StaticReferrerPlatform::unsupported()),
        Arc::new(AssumeOnline),
    )
    .expect("tests run inside a tokio runtime")
}

// A single test: the shared instance lives for the whole test binary.
#[tokio::test]
async fn test_first_successful_init_wins() {
    assert!(shared::get().is_none());

    let invalid = shared::init(context(), Arc::new(RecordingSink::new()), "", "key", true);
    assert!(matches!(invalid, Err(AttributionError::InvalidArgument(_))));
    assert!(shared::get().is_none());

    let first = shared::init(context(), Arc::new(RecordingSink::new()), "first", "key", true)
        .expect("valid credentials");
    let second = shared::init(context(), Arc::new(RecordingSink::new()), "second", "key", false)
        .expect("already initialised");

    assert_eq!(first.tenant_id(), "first");
    assert_eq!(second.tenant_id(), "first");
    assert!(second.is_dry_run());
    assert_eq!(shared::get().map(|o| o.tenant_id()), Some("first"));
}
