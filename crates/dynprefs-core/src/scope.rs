use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    Global,
    Site,
    User,
}

impl ScopeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeKind::Global => "global",
            ScopeKind::Site => "site",
            ScopeKind::User => "user",
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            ScopeKind::Global => "global_preferences",
            ScopeKind::Site => "site_preferences",
            ScopeKind::User => "user_preferences",
        }
    }

    /// Site and user rows belong to an owner entity; global rows do not.
    pub fn is_per_instance(&self) -> bool {
        !matches!(self, ScopeKind::Global)
    }

    fn record_label(&self) -> &'static str {
        match self {
            ScopeKind::Global => "GlobalPreference",
            ScopeKind::Site => "SitePreference",
            ScopeKind::User => "UserPreference",
        }
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScopeKind {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_lowercase().as_str() {
            "global" => Ok(ScopeKind::Global),
            "site" => Ok(ScopeKind::Site),
            "user" => Ok(ScopeKind::User),
            other => Err(format!("Unknown scope: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SiteId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "site:{}", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "user:{}", self.0)
    }
}

/// Binds a record kind to its scope and owner reference type.
///
/// `owner_id`/`owner_from_id` map the owner onto the nullable `instance_id`
/// column; the global scope has no owner and never carries an id.
pub trait Scope: fmt::Debug + Send + Sync + 'static {
    type Owner: Copy + fmt::Debug + PartialEq + Send + Sync;

    const KIND: ScopeKind;

    fn owner_id(owner: &Self::Owner) -> Option<i64>;

    fn owner_from_id(id: Option<i64>) -> Option<Self::Owner>;

    fn record_label() -> &'static str {
        Self::KIND.record_label()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalScope;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SiteScope;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserScope;

impl Scope for GlobalScope {
    type Owner = ();

    const KIND: ScopeKind = ScopeKind::Global;

    fn owner_id(_owner: &()) -> Option<i64> {
        None
    }

    fn owner_from_id(id: Option<i64>) -> Option<()> {
        id.is_none().then_some(())
    }
}

impl Scope for SiteScope {
    type Owner = SiteId;

    const KIND: ScopeKind = ScopeKind::Site;

    fn owner_id(owner: &SiteId) -> Option<i64> {
        Some(owner.0)
    }

    fn owner_from_id(id: Option<i64>) -> Option<SiteId> {
        id.map(SiteId)
    }
}

impl Scope for UserScope {
    type Owner = UserId;

    const KIND: ScopeKind = ScopeKind::User;

    fn owner_id(owner: &UserId) -> Option<i64> {
        Some(owner.0)
    }

    fn owner_from_id(id: Option<i64>) -> Option<UserId> {
        id.map(UserId)
    }
}
