//! Genesis document of a test chain and the rules for building it.
//!
//! Module states are kept as opaque JSON blobs under `app_state`. The builder
//! only reads and writes the sections it is responsible for:
//!
//! * `auth`: accounts, with optional vesting schedules
//! * `bank`: balances
//! * `genutil`: collected gentxs

use std::{collections::BTreeMap, fmt, path::Path, str::FromStr};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, info};

use crate::{error::InfrastructureFault, identity::sha3_hex};

pub const AUTH_MODULE: &str = "auth";
pub const BANK_MODULE: &str = "bank";
pub const GENUTIL_MODULE: &str = "genutil";

/// Base units per unit of consensus power.
pub const POWER_REDUCTION: u64 = 1_000_000;

pub fn tokens_from_consensus_power(power: u64) -> u64 {
    power * POWER_REDUCTION
}

#[derive(Debug, thiserror::Error)]
pub enum GenesisError {
    #[error("account {0} already exists in genesis")]
    DuplicateAccount(String),
    #[error("account {0} is not funded in genesis")]
    UnfundedAccount(String),
    #[error("account {address} holds {available} but {required} is required")]
    InsufficientBalance {
        address: String,
        available: Coin,
        required: Coin,
    },
    #[error("gentx for chain {found} does not belong to chain {expected}")]
    ChainIdMismatch { expected: String, found: String },
    #[error("invalid vesting schedule: {0}")]
    InvalidVesting(String),
    #[error("invalid gentx from {name}: {reason}")]
    InvalidGentx { name: String, reason: String },
    #[error("invalid genesis: {0}")]
    Invalid(String),
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Coin {
    pub denom: String,
    pub amount: u64,
}

impl Coin {
    pub fn new(amount: u64, denom: impl Into<String>) -> Self {
        Self {
            denom: denom.into(),
            amount,
        }
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

impl FromStr for Coin {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .with_context(|| format!("coin {s:?} has no denom"))?;
        let (amount, denom) = s.split_at(split);
        if amount.is_empty() {
            bail!("coin {s:?} has no amount");
        }
        if !denom.chars().all(|c| c.is_ascii_alphanumeric() || c == '/') {
            bail!("coin {s:?} has an invalid denom");
        }
        Ok(Coin::new(amount.parse()?, denom))
    }
}

/// A set of coins, sorted by denom, one entry per denom.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct Coins(Vec<Coin>);

impl Coins {
    pub fn new(coins: impl IntoIterator<Item = Coin>) -> Self {
        let mut merged: BTreeMap<String, u64> = BTreeMap::new();
        for coin in coins {
            *merged.entry(coin.denom).or_default() += coin.amount;
        }
        Coins(
            merged
                .into_iter()
                .filter(|(_, amount)| *amount > 0)
                .map(|(denom, amount)| Coin { denom, amount })
                .collect(),
        )
    }

    pub fn amount_of(&self, denom: &str) -> u64 {
        self.0
            .iter()
            .find(|c| c.denom == denom)
            .map(|c| c.amount)
            .unwrap_or(0)
    }

    /// True when every coin of `other` is covered by `self`.
    pub fn covers(&self, other: &Coins) -> bool {
        other.iter().all(|c| self.amount_of(&c.denom) >= c.amount)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Coin> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Coins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(Coin::to_string).collect();
        f.write_str(&parts.join(","))
    }
}

impl FromStr for Coins {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let coins = s
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .map(Coin::from_str)
            .collect::<Result<Vec<_>>>()?;
        Ok(Coins::new(coins))
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct BlockParams {
    pub max_bytes: i64,
    pub max_gas: i64,
    pub time_iota_ms: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct EvidenceParams {
    pub max_age_num_blocks: u64,
    pub max_bytes: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ValidatorParams {
    pub pub_key_types: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ConsensusParams {
    pub block: BlockParams,
    pub evidence: EvidenceParams,
    pub validator: ValidatorParams,
}

impl Default for ConsensusParams {
    fn default() -> Self {
        Self {
            block: BlockParams {
                max_bytes: 22_020_096,
                max_gas: -1,
                time_iota_ms: 1000,
            },
            evidence: EvidenceParams {
                max_age_num_blocks: 100_000,
                max_bytes: 1_048_576,
            },
            validator: ValidatorParams {
                pub_key_types: vec!["ed25519".to_string()],
            },
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct VestingOptions {
    pub amount: Coins,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct GenesisAccount {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vesting: Option<VestingOptions>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Balance {
    pub address: String,
    pub coins: Coins,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthGenesis {
    #[serde(default)]
    pub accounts: Vec<GenesisAccount>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct BankGenesis {
    #[serde(default)]
    pub balances: Vec<Balance>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct GenutilGenesis {
    #[serde(default)]
    pub gen_txs: Vec<GenTxRecord>,
}

/// A validator's self-bonding declaration.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct GenTxRecord {
    pub name: String,
    pub chain_id: String,
    pub node_id: String,
    pub delegator_address: String,
    pub validator_pub_key: String,
    pub amount: Coin,
    /// `node_id@host:port` of the validator p2p endpoint.
    pub memo: String,
    pub signer_pub_key: String,
    #[serde(default)]
    pub signature: String,
}

impl GenTxRecord {
    /// The bytes covered by the signature: everything but the signature.
    pub fn sign_bytes(&self) -> Result<Vec<u8>> {
        let unsigned = GenTxRecord {
            signature: String::new(),
            ..self.clone()
        };
        Ok(serde_json::to_vec(&unsigned)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_slice(&bytes).with_context(|| format!("decoding {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_vec_pretty(self)?)
            .with_context(|| format!("writing gentx {}", path.display()))
    }
}

/// Reads every `*.json` gentx of `dir`, ordered by file name.
pub fn read_gentx_dir(dir: &Path) -> Result<Vec<GenTxRecord>> {
    let mut paths = std::fs::read_dir(dir)
        .with_context(|| format!("reading gentx directory {}", dir.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    paths.retain(|p| p.extension().is_some_and(|ext| ext == "json"));
    paths.sort();
    paths.iter().map(|p| GenTxRecord::load(p)).collect()
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct GenesisValidator {
    pub name: String,
    pub node_id: String,
    pub pub_key: String,
    pub power: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct GenesisDocument {
    pub genesis_time: DateTime<Utc>,
    pub chain_id: String,
    pub initial_height: u64,
    pub consensus_params: ConsensusParams,
    #[serde(default)]
    pub app_hash: String,
    #[serde(default)]
    pub app_state: BTreeMap<String, serde_json::Value>,
}

impl GenesisDocument {
    pub fn new(chain_id: impl Into<String>, app_state: BTreeMap<String, serde_json::Value>) -> Self {
        Self {
            genesis_time: Utc::now(),
            chain_id: chain_id.into(),
            initial_height: 1,
            consensus_params: ConsensusParams::default(),
            app_hash: String::new(),
            app_state,
        }
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).context("decoding genesis document")
    }

    pub fn to_vec(&self) -> Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(InfrastructureFault::MissingGenesis(path.to_path_buf()).into());
        }
        let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        Self::from_slice(&bytes).with_context(|| format!("in {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_vec()?)
            .with_context(|| format!("writing genesis {}", path.display()))
    }

    /// Decodes a module section, or its default when the module has none.
    pub fn section<T: DeserializeOwned + Default>(&self, module: &str) -> Result<T> {
        match self.app_state.get(module) {
            Some(value) => serde_json::from_value(value.clone())
                .with_context(|| format!("decoding {module} genesis state")),
            None => Ok(T::default()),
        }
    }

    /// Re-encodes a module section, keeping fields the builder does not know.
    pub fn set_section<T: Serialize>(&mut self, module: &str, state: &T) -> Result<()> {
        let encoded = serde_json::to_value(state)?;
        match (self.app_state.get_mut(module), encoded) {
            (Some(serde_json::Value::Object(existing)), serde_json::Value::Object(fields)) => {
                existing.extend(fields);
            }
            (_, encoded) => {
                self.app_state.insert(module.to_string(), encoded);
            }
        }
        Ok(())
    }

    pub fn balance_of(&self, address: &str) -> Result<Option<Coins>> {
        let bank: BankGenesis = self.section(BANK_MODULE)?;
        Ok(bank
            .balances
            .into_iter()
            .find(|b| b.address == address)
            .map(|b| b.coins))
    }

    pub fn add_account(
        &mut self,
        address: &str,
        coins: Coins,
        vesting: Option<VestingOptions>,
    ) -> Result<()> {
        let mut auth: AuthGenesis = self.section(AUTH_MODULE)?;
        let mut bank: BankGenesis = self.section(BANK_MODULE)?;

        if auth.accounts.iter().any(|a| a.address == address)
            || bank.balances.iter().any(|b| b.address == address)
        {
            return Err(GenesisError::DuplicateAccount(address.to_string()).into());
        }
        if let Some(vesting) = &vesting {
            if vesting.end_time <= vesting.start_time {
                return Err(GenesisError::InvalidVesting(
                    "end time must be after start time".to_string(),
                )
                .into());
            }
            if vesting.amount.is_empty() || !coins.covers(&vesting.amount) {
                return Err(GenesisError::InvalidVesting(format!(
                    "vesting amount {} is not covered by {}",
                    vesting.amount, coins
                ))
                .into());
            }
        }

        auth.accounts.push(GenesisAccount {
            address: address.to_string(),
            vesting,
        });
        bank.balances.push(Balance {
            address: address.to_string(),
            coins,
        });
        self.set_section(AUTH_MODULE, &auth)?;
        self.set_section(BANK_MODULE, &bank)
    }

    pub fn gen_txs(&self) -> Result<Vec<GenTxRecord>> {
        Ok(self.section::<GenutilGenesis>(GENUTIL_MODULE)?.gen_txs)
    }

    /// Validators declared by the collected gentxs.
    pub fn validators(&self) -> Result<Vec<GenesisValidator>> {
        Ok(self
            .gen_txs()?
            .into_iter()
            .map(|tx| GenesisValidator {
                power: tx.amount.amount / POWER_REDUCTION,
                name: tx.name,
                node_id: tx.node_id,
                pub_key: tx.validator_pub_key,
            })
            .collect())
    }

    /// Checks a gentx against the accounts of this genesis.
    pub fn check_gentx(&self, gentx: &GenTxRecord) -> Result<()> {
        if gentx.chain_id != self.chain_id {
            return Err(GenesisError::ChainIdMismatch {
                expected: self.chain_id.clone(),
                found: gentx.chain_id.clone(),
            }
            .into());
        }
        if gentx.amount.amount == 0 {
            return Err(GenesisError::InvalidGentx {
                name: gentx.name.clone(),
                reason: "zero self-delegation".to_string(),
            }
            .into());
        }
        let Some(balance) = self.balance_of(&gentx.delegator_address)? else {
            return Err(GenesisError::UnfundedAccount(gentx.delegator_address.clone()).into());
        };
        let available = balance.amount_of(&gentx.amount.denom);
        if available < gentx.amount.amount {
            return Err(GenesisError::InsufficientBalance {
                address: gentx.delegator_address.clone(),
                available: Coin::new(available, gentx.amount.denom.clone()),
                required: gentx.amount.clone(),
            }
            .into());
        }
        Ok(())
    }

    /// Replaces the collected gentxs with `gentxs`, after checking each of them
    /// here and with the collaborator `verify`.
    pub fn apply_gentxs<F>(&mut self, mut gentxs: Vec<GenTxRecord>, verify: F) -> Result<()>
    where
        F: Fn(&GenTxRecord) -> Result<()>,
    {
        gentxs.sort_by(|a, b| a.name.cmp(&b.name));
        for gentx in &gentxs {
            self.check_gentx(gentx)
                .with_context(|| format!("gentx of {}", gentx.name))?;
            verify(gentx).map_err(|e| GenesisError::InvalidGentx {
                name: gentx.name.clone(),
                reason: format!("{e:#}"),
            })?;
        }
        debug!("Applying {} gentx(s) to {}", gentxs.len(), self.chain_id);
        self.set_section(GENUTIL_MODULE, &GenutilGenesis { gen_txs: gentxs })
    }

    /// Structural checks, the same ones a node runs before starting.
    pub fn validate(&self) -> Result<()> {
        if self.chain_id.is_empty() {
            return Err(GenesisError::Invalid("chain_id cannot be empty".to_string()).into());
        }
        if self.initial_height == 0 {
            return Err(GenesisError::Invalid("initial_height must be positive".to_string()).into());
        }
        let bank: BankGenesis = self.section(BANK_MODULE)?;
        let mut seen = std::collections::BTreeSet::new();
        for balance in &bank.balances {
            if !seen.insert(balance.address.as_str()) {
                return Err(GenesisError::DuplicateAccount(balance.address.clone()).into());
            }
        }
        let gentxs = self.gen_txs()?;
        let mut nodes = std::collections::BTreeSet::new();
        for gentx in &gentxs {
            self.check_gentx(gentx)?;
            if !nodes.insert(gentx.node_id.as_str()) {
                return Err(GenesisError::InvalidGentx {
                    name: gentx.name.clone(),
                    reason: format!("node {} declared twice", gentx.node_id),
                }
                .into());
            }
        }
        info!(
            "Genesis {} is valid: {} account(s), {} validator(s)",
            self.chain_id,
            bank.balances.len(),
            gentxs.len()
        );
        Ok(())
    }

    /// Same content, ignoring the creation time each node stamps at init.
    pub fn same_content(&self, other: &GenesisDocument) -> bool {
        self.chain_id == other.chain_id
            && self.initial_height == other.initial_height
            && self.consensus_params == other.consensus_params
            && self.app_state == other.app_state
    }
}

/// Hex sha3 of raw genesis bytes, used to compare on-disk copies.
pub fn genesis_hash(bytes: &[u8]) -> String {
    sha3_hex(&[bytes])
}

#[cfg(test)]
mod tests {
    use assertables::assert_contains;
    use chrono::Duration;

    use super::*;

    fn genesis() -> GenesisDocument {
        let mut app_state = BTreeMap::new();
        app_state.insert(
            "staking".to_string(),
            serde_json::json!({ "params": { "bond_denom": "stake" } }),
        );
        GenesisDocument::new("test-chain", app_state)
    }

    fn gentx(name: &str, address: &str, amount: u64) -> GenTxRecord {
        GenTxRecord {
            name: name.to_string(),
            chain_id: "test-chain".to_string(),
            node_id: format!("{name}-id"),
            delegator_address: address.to_string(),
            validator_pub_key: format!("{name}-pub"),
            amount: Coin::new(amount, "stake"),
            memo: format!("{name}-id@127.0.0.1:26656"),
            signer_pub_key: String::new(),
            signature: String::new(),
        }
    }

    #[test]
    fn parses_coins() {
        let coins: Coins = "10foot,5stake,3foot".parse().unwrap();
        assert_eq!(coins.to_string(), "13foot,5stake");
        assert_eq!(coins.amount_of("stake"), 5);
        assert_eq!(coins.amount_of("nope"), 0);
        assert!("stake".parse::<Coin>().is_err());
        assert!("10".parse::<Coin>().is_err());
        assert_eq!("".parse::<Coins>().unwrap(), Coins::default());
    }

    #[test]
    fn duplicate_account_is_rejected() {
        let mut genesis = genesis();
        genesis
            .add_account("addr1", "10stake".parse().unwrap(), None)
            .unwrap();
        let err = genesis
            .add_account("addr1", "5stake".parse().unwrap(), None)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GenesisError>(),
            Some(GenesisError::DuplicateAccount(_))
        ));
        assert_eq!(
            genesis.balance_of("addr1").unwrap().unwrap().amount_of("stake"),
            10
        );
    }

    #[test]
    fn add_account_keeps_unknown_module_fields() {
        let mut genesis = genesis();
        genesis.app_state.insert(
            BANK_MODULE.to_string(),
            serde_json::json!({ "balances": [], "params": { "send_enabled": true } }),
        );
        genesis
            .add_account("addr1", "10stake".parse().unwrap(), None)
            .unwrap();
        assert_eq!(
            genesis.app_state[BANK_MODULE]["params"]["send_enabled"],
            serde_json::json!(true)
        );
    }

    #[test]
    fn vesting_must_be_covered_and_ordered() {
        let mut genesis = genesis();
        let now = Utc::now();
        let too_much = VestingOptions {
            amount: "20feet".parse().unwrap(),
            start_time: now,
            end_time: now + Duration::seconds(60),
        };
        assert!(genesis
            .add_account("v", "10feet".parse().unwrap(), Some(too_much))
            .is_err());

        let backwards = VestingOptions {
            amount: "5feet".parse().unwrap(),
            start_time: now,
            end_time: now - Duration::seconds(60),
        };
        assert!(genesis
            .add_account("v", "10feet".parse().unwrap(), Some(backwards))
            .is_err());

        let ok = VestingOptions {
            amount: "5feet".parse().unwrap(),
            start_time: now,
            end_time: now + Duration::seconds(60),
        };
        genesis
            .add_account("v", "10feet".parse().unwrap(), Some(ok.clone()))
            .unwrap();
        let auth: AuthGenesis = genesis.section(AUTH_MODULE).unwrap();
        assert_eq!(auth.accounts[0].vesting, Some(ok));
    }

    #[test]
    fn gentx_requires_funded_account() {
        let mut genesis = genesis();
        genesis
            .add_account("addr1", "50stake".parse().unwrap(), None)
            .unwrap();

        let err = genesis
            .apply_gentxs(vec![gentx("node0", "missing", 10)], |_| Ok(()))
            .unwrap_err();
        assert!(err
            .chain()
            .any(|e| matches!(e.downcast_ref(), Some(GenesisError::UnfundedAccount(_)))));

        let err = genesis
            .apply_gentxs(vec![gentx("node0", "addr1", 100)], |_| Ok(()))
            .unwrap_err();
        assert_contains!(format!("{:#}", err), "holds 50stake but 100stake is required");
    }

    #[test]
    fn collaborator_rejection_is_an_invalid_gentx() {
        let mut genesis = genesis();
        genesis
            .add_account("addr1", "50stake".parse().unwrap(), None)
            .unwrap();
        let err = genesis
            .apply_gentxs(vec![gentx("node0", "addr1", 10)], |_| {
                anyhow::bail!("bad signature")
            })
            .unwrap_err();
        assert_contains!(err.to_string(), "bad signature");
    }

    #[test]
    fn gentx_from_another_chain_is_rejected() {
        let mut genesis = genesis();
        genesis
            .add_account("addr1", "50stake".parse().unwrap(), None)
            .unwrap();
        let mut foreign = gentx("node0", "addr1", 10);
        foreign.chain_id = "other".to_string();
        assert!(genesis.apply_gentxs(vec![foreign], |_| Ok(())).is_err());
    }

    #[test]
    fn applied_gentxs_become_validators() {
        let mut genesis = genesis();
        let funds = Coins::new([Coin::new(tokens_from_consensus_power(150), "stake")]);
        genesis.add_account("a", funds.clone(), None).unwrap();
        genesis.add_account("b", funds, None).unwrap();
        genesis
            .apply_gentxs(
                vec![
                    gentx("node1", "b", tokens_from_consensus_power(100)),
                    gentx("node0", "a", tokens_from_consensus_power(100)),
                ],
                |_| Ok(()),
            )
            .unwrap();

        let validators = genesis.validators().unwrap();
        assert_eq!(validators.len(), 2);
        assert_eq!(validators[0].name, "node0");
        assert_eq!(validators[0].power, 100);
        genesis.validate().unwrap();
    }

    #[test]
    fn validate_rejects_duplicate_nodes() {
        let mut genesis = genesis();
        genesis
            .add_account("a", "100stake".parse().unwrap(), None)
            .unwrap();
        let tx = gentx("node0", "a", 10);
        genesis
            .set_section(
                GENUTIL_MODULE,
                &GenutilGenesis {
                    gen_txs: vec![tx.clone(), tx],
                },
            )
            .unwrap();
        assert!(genesis.validate().is_err());
    }

    #[test]
    fn missing_genesis_is_an_infrastructure_fault() {
        let tmpdir = tempfile::Builder::new().tempdir().unwrap();
        let err = GenesisDocument::load(&tmpdir.path().join("genesis.json")).unwrap_err();
        assert!(crate::error::is_infrastructure_fault(&err));
    }

    #[test]
    fn save_and_load_keep_content() {
        let tmpdir = tempfile::Builder::new().tempdir().unwrap();
        let path = tmpdir.path().join("genesis.json");
        let mut genesis = genesis();
        genesis
            .add_account("a", "100stake".parse().unwrap(), None)
            .unwrap();
        genesis.save(&path).unwrap();

        let loaded = GenesisDocument::load(&path).unwrap();
        assert_eq!(loaded, genesis);
        assert_eq!(
            genesis_hash(&std::fs::read(&path).unwrap()),
            genesis_hash(&loaded.to_vec().unwrap())
        );
    }

    #[test]
    fn same_content_ignores_genesis_time() {
        let a = genesis();
        let mut b = a.clone();
        b.genesis_time = a.genesis_time + Duration::seconds(3);
        assert!(a.same_content(&b));
        b.chain_id = "other".to_string();
        assert!(!a.same_content(&b));
    }
}
