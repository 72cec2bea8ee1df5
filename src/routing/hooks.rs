//! Lifecycle hook names and ordered hook collections.
//!
//! # Design Decisions
//! - The ten hook names are a closed enum; module keys are matched against
//!   their camelCase spelling
//! - `HookSet::extend` concatenates per name, so merging is associative and
//!   keeps declaration order

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::http::handler::Hook;

/// A request lifecycle stage a hook can attach to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HookName {
    OnRequest,
    PreParsing,
    PreValidation,
    PreHandler,
    PreSerialization,
    OnError,
    OnSend,
    OnResponse,
    OnTimeout,
    OnRequestAbort,
}

impl HookName {
    pub const ALL: [HookName; 10] = [
        HookName::OnRequest,
        HookName::PreParsing,
        HookName::PreValidation,
        HookName::PreHandler,
        HookName::PreSerialization,
        HookName::OnError,
        HookName::OnSend,
        HookName::OnResponse,
        HookName::OnTimeout,
        HookName::OnRequestAbort,
    ];

    /// Key used for this hook in route and setting files.
    pub fn as_str(&self) -> &'static str {
        match self {
            HookName::OnRequest => "onRequest",
            HookName::PreParsing => "preParsing",
            HookName::PreValidation => "preValidation",
            HookName::PreHandler => "preHandler",
            HookName::PreSerialization => "preSerialization",
            HookName::OnError => "onError",
            HookName::OnSend => "onSend",
            HookName::OnResponse => "onResponse",
            HookName::OnTimeout => "onTimeout",
            HookName::OnRequestAbort => "onRequestAbort",
        }
    }
}

impl fmt::Display for HookName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HookName {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HookName::ALL.iter().copied().find(|h| h.as_str() == s).ok_or(())
    }
}

/// Hooks keyed by lifecycle stage, each list in execution order.
#[derive(Debug, Clone, Default)]
pub struct HookSet {
    hooks: BTreeMap<HookName, Vec<Hook>>,
}

impl HookSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: HookName, hook: Hook) {
        self.hooks.entry(name).or_default().push(hook);
    }

    /// Append every list of `other` after the lists already held.
    pub fn extend(&mut self, other: HookSet) {
        for (name, hooks) in other.hooks {
            self.hooks.entry(name).or_default().extend(hooks);
        }
    }

    pub fn get(&self, name: HookName) -> &[Hook] {
        self.hooks.get(&name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.values().all(Vec::is_empty)
    }

    /// Non-empty lists in lifecycle order.
    pub fn iter(&self) -> impl Iterator<Item = (HookName, &[Hook])> {
        self.hooks
            .iter()
            .filter(|(_, hooks)| !hooks.is_empty())
            .map(|(name, hooks)| (*name, hooks.as_slice()))
    }

    /// Names of the hooks registered for `name`, for listings and tests.
    pub fn names(&self, name: HookName) -> Vec<&str> {
        self.get(name).iter().map(Hook::name).collect()
    }
}
