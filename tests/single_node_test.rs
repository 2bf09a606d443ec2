use anyhow::Result;
use assertables::assert_contains;
use fixtures::ctx::{leftovers, TestCtx};
use testnet_fixtures::{
    fixture::{USER_KEYS, VALIDATOR_KEY},
    runtime::ValidatorHandle,
};

mod fixtures;

#[test_log::test(tokio::test)]
async fn single_node_produces_blocks() -> Result<()> {
    let ctx = TestCtx::new()?;
    let f = ctx.single("single_node_produces_blocks")?;
    let mut network = f.start("").await?;

    let before = network.latest_height().await?;
    let after = network.wait_for_next_block().await?;
    assert!(after > before);

    let status = f.exec_json("status", &[]).await?;
    assert_eq!(status["node_info"]["moniker"], VALIDATOR_KEY);
    assert_eq!(status["node_info"]["network"], f.chain_id());

    let validator = network.validator(0).expect("one validator");
    assert_eq!(validator.node_id(), f.node_id()?);

    network.cleanup().await;
    f.cleanup(&[]);
    assert!(!f.home().exists());
    Ok(())
}

#[test_log::test(tokio::test)]
async fn collaborator_errors_are_returned_to_the_test() -> Result<()> {
    let ctx = TestCtx::new()?;
    let f = ctx.single("collaborator_errors")?;

    let err = f.exec("tx fly", &[]).await.unwrap_err();
    assert_eq!(err.operation, "tx fly");
    assert_contains!(err.to_string(), "unknown command");

    let user = f.key_address(USER_KEYS[0])?;
    let balances = f
        .exec_json("query balances", &[user, "--output=json".to_string()])
        .await?;
    assert_eq!(balances["balances"].as_array().map(Vec::len), Some(2));

    let validated = f.exec_json("validate-genesis", &[]).await?;
    assert_eq!(validated["valid"], true);

    f.cleanup(&[]);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn deleting_missing_keys_is_idempotent() -> Result<()> {
    let ctx = TestCtx::new()?;
    let f = ctx.single("missing_keys")?;

    // Deleting keys that are gone already is fine.
    f.keys_delete(VALIDATOR_KEY)?;
    f.keys_delete(VALIDATOR_KEY)?;
    assert!(f.keys_show(VALIDATOR_KEY).is_err());

    f.cleanup(&[]);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn cleanup_twice_leaves_nothing_behind() -> Result<()> {
    let ctx = TestCtx::new()?;
    let f = ctx.single("cleanup_twice")?;
    let extra = ctx.home_root().join("extra-output");
    std::fs::write(&extra, b"leftover")?;

    f.cleanup(&[extra.clone()]);
    f.cleanup(&[extra.clone()]);

    assert!(!f.home().exists());
    assert!(!extra.exists());
    assert!(leftovers(ctx.home_root()).is_empty());
    Ok(())
}
