use tern_common::{Error, Result, Version, VersionRange};

use crate::migrations::Migration;

/// Migrations ordered by strictly ascending version.
#[derive(Debug, Clone, Default)]
pub struct MigrationSet {
    migrations: Vec<Migration>,
}

impl MigrationSet {
    /// Sort `migrations` by version. Two entries sharing a version are an
    /// error; neither is silently preferred.
    pub fn new(mut migrations: Vec<Migration>) -> Result<Self> {
        migrations.sort_by_key(|m| m.version);

        if let Some(pair) = migrations.windows(2).find(|w| w[0].version == w[1].version) {
            return Err(Error::DuplicateVersion {
                version: pair[0].version,
                first: pair[0].label(),
                second: pair[1].label(),
            });
        }

        Ok(Self { migrations })
    }

    /// Keep only the migrations whose version falls inside `range`.
    pub fn filter(mut self, range: VersionRange) -> Self {
        self.migrations.retain(|m| range.contains(m.version));
        self
    }

    /// The migration with the smallest version strictly greater than
    /// `current`. `None` for `current` means nothing is applied yet.
    pub fn next(&self, current: Option<Version>) -> Option<&Migration> {
        let idx = match current {
            Some(current) => self.migrations.partition_point(|m| m.version <= current),
            None => 0,
        };
        self.migrations.get(idx)
    }

    pub fn get(&self, version: Version) -> Option<&Migration> {
        self.migrations
            .binary_search_by_key(&version, |m| m.version)
            .ok()
            .map(|idx| &self.migrations[idx])
    }

    pub fn first(&self) -> Option<&Migration> {
        self.migrations.first()
    }

    pub fn last(&self) -> Option<&Migration> {
        self.migrations.last()
    }

    pub fn versions(&self) -> Vec<Version> {
        self.migrations.iter().map(|m| m.version).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Migration> {
        self.migrations.iter()
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

impl<'a> IntoIterator for &'a MigrationSet {
    type Item = &'a Migration;
    type IntoIter = std::slice::Iter<'a, Migration>;

    fn into_iter(self) -> Self::IntoIter {
        self.migrations.iter()
    }
}

impl IntoIterator for MigrationSet {
    type Item = Migration;
    type IntoIter = std::vec::IntoIter<Migration>;

    fn into_iter(self) -> Self::IntoIter {
        self.migrations.into_iter()
    }
}
