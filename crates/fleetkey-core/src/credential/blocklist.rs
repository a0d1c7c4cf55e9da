use std::collections::{BTreeMap, BTreeSet};

use super::CredentialKind;

// Values known to have leaked publicly. Never acceptable again.
const EXPOSED_API_KEYS: &[&str] = &["rgXTHsxFpWpqZ8keD/h0cPLN6CN2ZznLLyXwh9JgTAk="];
const EXPOSED_OTA_PASSWORDS: &[&str] = &[
    "5929ccc1f08289c79aca50ebe0a9b7eb",
    "3a11021250d483c5e78d0ff3e93779e3",
    "55977e01702437af44c5544c565fb451",
];
const EXPOSED_FALLBACK_PASSWORDS: &[&str] = &["1SXRpeXi7AdU", "E4GPbKApzm6Qe.3k"];

/// Set of known-exposed values per credential kind.
///
/// The default set holds the historical leaks; configuration can add more
/// through [`Blocklist::extend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blocklist {
    entries: BTreeMap<CredentialKind, BTreeSet<String>>,
}

impl Default for Blocklist {
    fn default() -> Self {
        let mut list = Self::empty();
        for (kind, values) in [
            (CredentialKind::ApiKey, EXPOSED_API_KEYS),
            (CredentialKind::OtaPassword, EXPOSED_OTA_PASSWORDS),
            (CredentialKind::FallbackPassword, EXPOSED_FALLBACK_PASSWORDS),
        ] {
            for value in values {
                list.add(kind, *value);
            }
        }
        list
    }
}

impl Blocklist {
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    pub fn add(&mut self, kind: CredentialKind, value: impl Into<String>) {
        let value = value.into();
        if value.is_empty() {
            return;
        }
        self.entries.entry(kind).or_default().insert(value);
    }

    pub fn with(mut self, kind: CredentialKind, value: impl Into<String>) -> Self {
        self.add(kind, value);
        self
    }

    /// Merge additional exposures, e.g. from `[security] extra_exposed`.
    pub fn extend<'a, I>(&mut self, additions: I)
    where
        I: IntoIterator<Item = (CredentialKind, &'a [String])>,
    {
        for (kind, values) in additions {
            for value in values {
                self.add(kind, value.as_str());
            }
        }
    }

    pub fn contains(&self, kind: CredentialKind, value: &str) -> bool {
        self.entries.get(&kind).is_some_and(|set| set.contains(value))
    }

    /// Exposed values of one kind, in sorted order.
    pub fn values(&self, kind: CredentialKind) -> impl Iterator<Item = &str> {
        self.entries
            .get(&kind)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    /// The first exposed value of `kind`, used for detector fixtures.
    pub fn sample(&self, kind: CredentialKind) -> Option<&str> {
        match kind {
            // Prefer the historical primary leak when present.
            CredentialKind::ApiKey => EXPOSED_API_KEYS.first(),
            CredentialKind::OtaPassword => EXPOSED_OTA_PASSWORDS.first(),
            CredentialKind::FallbackPassword => EXPOSED_FALLBACK_PASSWORDS.first(),
        }
        .copied()
        .filter(|v| self.contains(kind, v))
        .or_else(|| self.values(kind).next())
    }

    /// Every `(kind, value)` pair.
    pub fn iter(&self) -> impl Iterator<Item = (CredentialKind, &str)> {
        self.entries
            .iter()
            .flat_map(|(kind, set)| set.iter().map(move |v| (*kind, v.as_str())))
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
