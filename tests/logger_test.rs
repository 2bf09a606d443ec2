use anyhow::Result;
use assertables::assert_contains;
use testnet_fixtures::utils::logger::{setup_tracing, TracingMode};

// Runs alone in its binary: it owns the global subscriber.
#[test]
fn moniker_subscriber_is_installed_once() -> Result<()> {
    setup_tracing(TracingMode::NodeName, "node0".to_string())?;
    tracing::info!("node0 is logging");

    let err = setup_tracing(TracingMode::Json, "node1".to_string()).unwrap_err();
    assert_contains!(format!("{err:#}"), "installing the global tracing subscriber");
    Ok(())
}
