use std::fmt;

use serde::{Deserialize, Serialize};

use crate::hash::{AccountId, Hash};

/// Tag of a ledger entry body. Mirrors the variants of [`LedgerEntryData`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LedgerEntryType {
    Account,
    Trustline,
    Offer,
    Data,
    ContractData,
    ConfigSetting,
}

impl fmt::Display for LedgerEntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Account => "account",
            Self::Trustline => "trustline",
            Self::Offer => "offer",
            Self::Data => "data",
            Self::ContractData => "contract_data",
            Self::ConfigSetting => "config_setting",
        };
        f.write_str(s)
    }
}

/// An asset held or traded on the network.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Asset {
    Native,
    Credit { code: String, issuer: AccountId },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountEntry {
    pub account_id: AccountId,
    pub balance: i64,
    pub seq_num: i64,
    pub num_sub_entries: u32,
    pub flags: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustlineEntry {
    pub account_id: AccountId,
    pub asset: Asset,
    pub balance: i64,
    pub limit: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferEntry {
    pub seller_id: AccountId,
    pub offer_id: i64,
    pub selling: Asset,
    pub buying: Asset,
    pub amount: i64,
    pub price_n: i32,
    pub price_d: i32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataEntry {
    pub account_id: AccountId,
    pub name: String,
    pub value: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractDataEntry {
    pub contract: Hash,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub live_until_ledger: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSettingEntry {
    pub setting_id: u32,
    pub value: Vec<u8>,
}

/// Body of a ledger entry, one variant per entry type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEntryData {
    Account(AccountEntry),
    Trustline(TrustlineEntry),
    Offer(OfferEntry),
    Data(DataEntry),
    ContractData(ContractDataEntry),
    ConfigSetting(ConfigSettingEntry),
}

impl LedgerEntryData {
    pub fn entry_type(&self) -> LedgerEntryType {
        match self {
            Self::Account(_) => LedgerEntryType::Account,
            Self::Trustline(_) => LedgerEntryType::Trustline,
            Self::Offer(_) => LedgerEntryType::Offer,
            Self::Data(_) => LedgerEntryType::Data,
            Self::ContractData(_) => LedgerEntryType::ContractData,
            Self::ConfigSetting(_) => LedgerEntryType::ConfigSetting,
        }
    }
}

/// A versioned snapshot of one piece of ledger state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub last_modified_ledger_seq: u32,
    pub data: LedgerEntryData,
}

impl LedgerEntry {
    pub fn new(last_modified_ledger_seq: u32, data: LedgerEntryData) -> Self {
        Self {
            last_modified_ledger_seq,
            data,
        }
    }

    pub fn entry_type(&self) -> LedgerEntryType {
        self.data.entry_type()
    }

    /// The canonical key identifying this entry across its lifetime.
    pub fn key(&self) -> LedgerKey {
        match &self.data {
            LedgerEntryData::Account(a) => LedgerKey::Account {
                account_id: a.account_id,
            },
            LedgerEntryData::Trustline(t) => LedgerKey::Trustline {
                account_id: t.account_id,
                asset: t.asset.clone(),
            },
            LedgerEntryData::Offer(o) => LedgerKey::Offer {
                seller_id: o.seller_id,
                offer_id: o.offer_id,
            },
            LedgerEntryData::Data(d) => LedgerKey::Data {
                account_id: d.account_id,
                name: d.name.clone(),
            },
            LedgerEntryData::ContractData(c) => LedgerKey::ContractData {
                contract: c.contract,
                key: c.key.clone(),
            },
            LedgerEntryData::ConfigSetting(c) => LedgerKey::ConfigSetting {
                setting_id: c.setting_id,
            },
        }
    }
}

/// Canonical identifier of a ledger entry.
///
/// Ordering is total, so keys can index `BTreeMap`s when grouping changes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LedgerKey {
    Account { account_id: AccountId },
    Trustline { account_id: AccountId, asset: Asset },
    Offer { seller_id: AccountId, offer_id: i64 },
    Data { account_id: AccountId, name: String },
    ContractData { contract: Hash, key: Vec<u8> },
    ConfigSetting { setting_id: u32 },
}

impl LedgerKey {
    pub fn entry_type(&self) -> LedgerEntryType {
        match self {
            Self::Account { .. } => LedgerEntryType::Account,
            Self::Trustline { .. } => LedgerEntryType::Trustline,
            Self::Offer { .. } => LedgerEntryType::Offer,
            Self::Data { .. } => LedgerEntryType::Data,
            Self::ContractData { .. } => LedgerEntryType::ContractData,
            Self::ConfigSetting { .. } => LedgerEntryType::ConfigSetting,
        }
    }
}

/// One element of a recorded list of state mutations.
///
/// Updates and removals are always preceded by a `State` element carrying
/// the entry as it was before the mutation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEntryChange {
    Created(LedgerEntry),
    Updated(LedgerEntry),
    Removed(LedgerKey),
    State(LedgerEntry),
}

/// Ordered list of recorded state mutations.
pub type LedgerEntryChanges = Vec<LedgerEntryChange>;
