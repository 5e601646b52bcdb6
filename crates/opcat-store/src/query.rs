//! Query surface
//!
//! Read-side operations over the store. Every bundle result is the full
//! materialized payload: manifests, graph position, APIs, properties and
//! dependencies. When a channel is in scope the graph position comes from
//! the channel's edges (which is where synthesized `replaces` live); a
//! name-only lookup falls back to the declared columns.

use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;

use opcat_core::{ApiKey, Dependency, Property};

use crate::db::Store;
use crate::error::{Result, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageSummary {
    pub name: String,
    pub default_channel: Option<String>,
    pub description: Option<String>,
    pub channels: Vec<ChannelSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelSummary {
    pub name: String,
    pub head: String,
}

/// A fully materialized bundle result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BundlePayload {
    pub name: String,
    pub package: String,
    /// The channel this payload was resolved through, when any.
    pub channel: Option<String>,
    pub version: String,
    pub bundle_path: String,
    pub csv_json: String,
    pub objects: Vec<String>,
    pub replaces: Option<String>,
    pub skips: Vec<String>,
    pub skip_range: Option<String>,
    pub substitutes_for: Option<String>,
    pub provided_apis: Vec<ApiKey>,
    pub required_apis: Vec<ApiKey>,
    pub properties: Vec<Property>,
    pub dependencies: Vec<Dependency>,
    pub related_images: Vec<String>,
    pub deprecated: bool,
    pub digest: String,
}

/// A (package, channel, bundle) position providing some API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelEntryInfo {
    pub package: String,
    pub channel: String,
    pub bundle: String,
    pub replaces: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub packages: usize,
    pub channels: usize,
    pub bundles: usize,
}

impl Store {
    pub fn get_package(&self, name: &str) -> Result<PackageSummary> {
        self.with_reader(|conn| get_package(conn, name))
    }

    pub fn list_packages(&self) -> Result<Vec<String>> {
        self.with_reader(list_packages)
    }

    pub fn get_bundle(&self, package: &str, channel: &str, name: &str) -> Result<BundlePayload> {
        self.with_reader(|conn| get_bundle(conn, package, channel, name))
    }

    pub fn get_bundle_by_name(&self, name: &str) -> Result<BundlePayload> {
        self.with_reader(|conn| get_bundle_by_name(conn, name))
    }

    pub fn get_bundle_for_channel(&self, package: &str, channel: &str) -> Result<BundlePayload> {
        self.with_reader(|conn| get_bundle_for_channel(conn, package, channel))
    }

    pub fn get_bundle_that_replaces(
        &self,
        current: &str,
        package: &str,
        channel: &str,
    ) -> Result<BundlePayload> {
        self.with_reader(|conn| get_bundle_that_replaces(conn, current, package, channel))
    }

    pub fn get_default_bundle_that_provides(
        &self,
        group: &str,
        version: &str,
        kind: &str,
    ) -> Result<BundlePayload> {
        self.with_reader(|conn| get_default_bundle_that_provides(conn, group, version, kind))
    }

    pub fn get_channel_entries_that_provide(
        &self,
        group: &str,
        version: &str,
        kind: &str,
    ) -> Result<Vec<ChannelEntryInfo>> {
        self.with_reader(|conn| get_channel_entries_that_provide(conn, group, version, kind))
    }

    pub fn stats(&self) -> Result<StoreStats> {
        self.with_reader(stats)
    }

    pub fn list_deprecated(&self) -> Result<Vec<String>> {
        self.with_reader(list_deprecated)
    }

    /// Lazy, restartable iteration over every (channel, bundle) pair.
    pub fn list_bundles(&self) -> BundleIterator<'_> {
        BundleIterator::new(self)
    }
}

pub fn get_package(conn: &Connection, name: &str) -> Result<PackageSummary> {
    let (default_channel, description): (Option<String>, Option<String>) = conn
        .query_row(
            "SELECT default_channel, description FROM package WHERE name = ?1",
            [name],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?
        .ok_or_else(|| StoreError::not_found("package", name))?;

    let channels = {
        let mut stmt = conn.prepare(
            "SELECT name, head_operatorbundle_name FROM channel
             WHERE package_name = ?1 ORDER BY name",
        )?;
        let rows = stmt.query_map([name], |row| {
            Ok(ChannelSummary {
                name: row.get(0)?,
                head: row.get(1)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()?
    };

    Ok(PackageSummary {
        name: name.to_string(),
        default_channel: default_channel.filter(|c| !c.is_empty()),
        description: description.filter(|d| !d.is_empty()),
        channels,
    })
}

pub fn list_packages(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM package ORDER BY name")?;
    let rows = stmt.query_map([], |row| row.get(0))?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

pub fn get_bundle(
    conn: &Connection,
    package: &str,
    channel: &str,
    name: &str,
) -> Result<BundlePayload> {
    let in_channel: bool = conn
        .query_row(
            "SELECT 1 FROM channel_entry
             WHERE package_name = ?1 AND channel_name = ?2 AND operatorbundle_name = ?3
             LIMIT 1",
            params![package, channel, name],
            |_| Ok(()),
        )
        .optional()?
        .is_some();
    if !in_channel {
        return Err(StoreError::not_found("bundle", name));
    }
    load_payload(conn, name, Some((package, channel)))
}

pub fn get_bundle_by_name(conn: &Connection, name: &str) -> Result<BundlePayload> {
    load_payload(conn, name, None)
}

pub fn get_bundle_for_channel(
    conn: &Connection,
    package: &str,
    channel: &str,
) -> Result<BundlePayload> {
    let head: String = conn
        .query_row(
            "SELECT head_operatorbundle_name FROM channel
             WHERE package_name = ?1 AND name = ?2",
            params![package, channel],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| StoreError::not_found("channel", format!("{package}/{channel}")))?;
    load_payload(conn, &head, Some((package, channel)))
}

pub fn get_bundle_that_replaces(
    conn: &Connection,
    current: &str,
    package: &str,
    channel: &str,
) -> Result<BundlePayload> {
    let successor: Option<String> = conn
        .query_row(
            r#"
            SELECT e.operatorbundle_name
            FROM channel_entry e
            JOIN channel_entry t ON e.replaces = t.entry_id
            WHERE t.operatorbundle_name = ?1
              AND e.channel_name = ?2 AND e.package_name = ?3
              AND e.operatorbundle_name != ?1
            ORDER BY e.depth ASC
            LIMIT 1
            "#,
            params![current, channel, package],
            |row| row.get(0),
        )
        .optional()?;
    match successor {
        Some(name) => load_payload(conn, &name, Some((package, channel))),
        None => Err(StoreError::NoReplacement(current.to_string())),
    }
}

/// Among bundles providing the API, the head of the default channel of the
/// owning package; ties broken by highest version.
pub fn get_default_bundle_that_provides(
    conn: &Connection,
    group: &str,
    version: &str,
    kind: &str,
) -> Result<BundlePayload> {
    let mut stmt = conn.prepare(
        r#"
        SELECT b.name, b.version, p.name, p.default_channel
        FROM api_provider ap
        JOIN operatorbundle b ON b.name = ap.operatorbundle_name
        JOIN channel c ON c.head_operatorbundle_name = b.name
        JOIN package p ON p.name = c.package_name AND p.default_channel = c.name
        WHERE ap.group_name = ?1 AND ap.version = ?2 AND ap.kind = ?3
        "#,
    )?;
    let rows = stmt.query_map(params![group, version, kind], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
        ))
    })?;

    let mut best: Option<(String, semver::Version, String, String)> = None;
    for row in rows {
        let (bundle, raw_version, package, channel) = row?;
        let bundle_version = opcat_core::version::parse_version(&raw_version)?;
        let better = match &best {
            Some((_, incumbent, _, _)) => {
                opcat_core::version::order_versions(&bundle_version, incumbent)
                    == std::cmp::Ordering::Greater
            }
            None => true,
        };
        if better {
            best = Some((bundle, bundle_version, package, channel));
        }
    }

    match best {
        Some((bundle, _, package, channel)) => {
            load_payload(conn, &bundle, Some((&package, &channel)))
        }
        None => Err(StoreError::not_found(
            "provider of",
            format!("{group}/{version}/{kind}"),
        )),
    }
}

pub fn get_channel_entries_that_provide(
    conn: &Connection,
    group: &str,
    version: &str,
    kind: &str,
) -> Result<Vec<ChannelEntryInfo>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT DISTINCT e.package_name, e.channel_name, e.operatorbundle_name,
               t.operatorbundle_name
        FROM api_provider ap
        JOIN channel_entry e ON e.operatorbundle_name = ap.operatorbundle_name
        LEFT JOIN channel_entry t ON e.replaces = t.entry_id
        WHERE ap.group_name = ?1 AND ap.version = ?2 AND ap.kind = ?3
        ORDER BY e.package_name, e.channel_name, e.operatorbundle_name
        "#,
    )?;
    let rows = stmt.query_map(params![group, version, kind], |row| {
        Ok(ChannelEntryInfo {
            package: row.get(0)?,
            channel: row.get(1)?,
            bundle: row.get(2)?,
            replaces: row.get(3)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

pub fn stats(conn: &Connection) -> Result<StoreStats> {
    let packages: i64 = conn.query_row("SELECT COUNT(*) FROM package", [], |r| r.get(0))?;
    let channels: i64 = conn.query_row("SELECT COUNT(*) FROM channel", [], |r| r.get(0))?;
    let bundles: i64 = conn.query_row("SELECT COUNT(*) FROM operatorbundle", [], |r| r.get(0))?;
    Ok(StoreStats {
        packages: packages as usize,
        channels: channels as usize,
        bundles: bundles as usize,
    })
}

/// Materialize one bundle. With a channel in scope the graph position is
/// read from the channel's edges; otherwise the declared columns stand in.
pub fn load_payload(
    conn: &Connection,
    name: &str,
    channel: Option<(&str, &str)>,
) -> Result<BundlePayload> {
    let row = conn
        .query_row(
            r#"
            SELECT csv, bundle, bundlepath, version, skiprange, replaces, skips,
                   substitutesfor, digest
            FROM operatorbundle WHERE name = ?1
            "#,
            [name],
            |row| {
                Ok((
                    row.get::<_, Option<String>>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, Option<String>>(7)?,
                    row.get::<_, Option<String>>(8)?,
                ))
            },
        )
        .optional()?
        .ok_or_else(|| StoreError::not_found("bundle", name))?;
    let (csv, objects_json, path, version, skip_range, mut replaces, skips, substitutes_for, digest) =
        row;
    let mut skips: Vec<String> = skips
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();

    let package = match channel {
        Some((package, _)) => package.to_string(),
        None => crate::persist::package_of_bundle(conn, name)?
            .ok_or_else(|| StoreError::not_found("package of bundle", name))?,
    };

    // per-channel edges override the declared columns: this is where
    // synthesized replaces and truncation-nulled edges surface
    if let Some((package, channel)) = channel {
        let edges: Vec<Option<String>> = {
            let mut stmt = conn.prepare(
                r#"
                SELECT t.operatorbundle_name
                FROM channel_entry e
                LEFT JOIN channel_entry t ON e.replaces = t.entry_id
                WHERE e.package_name = ?1 AND e.channel_name = ?2
                  AND e.operatorbundle_name = ?3
                ORDER BY e.entry_id
                "#,
            )?;
            let rows = stmt.query_map(params![package, channel, name], |row| row.get(0))?;
            rows.collect::<rusqlite::Result<_>>()?
        };
        if !edges.is_empty() {
            replaces = edges[0].clone();
            skips = edges[1..].iter().flatten().cloned().collect();
        }
    }

    let objects: Vec<String> = match objects_json {
        Some(raw) if !raw.is_empty() => {
            let value: serde_json::Value = serde_json::from_str(&raw)?;
            match value {
                serde_json::Value::Array(items) => items.iter().map(|v| v.to_string()).collect(),
                other => vec![other.to_string()],
            }
        }
        _ => Vec::new(),
    };

    let provided_apis = api_rows(conn, "api_provider", name)?;
    let required_apis = api_rows(conn, "api_requirer", name)?;

    let properties = {
        let mut stmt = conn.prepare(
            "SELECT type, value FROM properties WHERE operatorbundle_name = ?1 ORDER BY rowid",
        )?;
        let rows = stmt.query_map([name], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut properties = Vec::new();
        for row in rows {
            let (type_, value) = row?;
            properties.push(Property::new(type_, serde_json::from_str(&value)?));
        }
        properties
    };

    let dependencies = {
        let mut stmt = conn.prepare(
            "SELECT type, value FROM dependencies WHERE operatorbundle_name = ?1 ORDER BY rowid",
        )?;
        let rows = stmt.query_map([name], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut dependencies = Vec::new();
        for row in rows {
            let (type_, value) = row?;
            dependencies.push(Dependency {
                type_,
                value: serde_json::from_str(&value)?,
            });
        }
        dependencies
    };

    let related_images = {
        let mut stmt = conn.prepare(
            "SELECT image FROM related_image WHERE operatorbundle_name = ?1 ORDER BY image",
        )?;
        let rows = stmt.query_map([name], |row| row.get(0))?;
        rows.collect::<rusqlite::Result<Vec<String>>>()?
    };

    let deprecated: bool = conn
        .query_row(
            "SELECT 1 FROM deprecated WHERE operatorbundle_name = ?1",
            [name],
            |_| Ok(()),
        )
        .optional()?
        .is_some();

    Ok(BundlePayload {
        name: name.to_string(),
        package,
        channel: channel.map(|(_, c)| c.to_string()),
        version: version.unwrap_or_default(),
        bundle_path: path.unwrap_or_default(),
        csv_json: csv.unwrap_or_default(),
        objects,
        replaces: replaces.filter(|r| !r.is_empty()),
        skips,
        skip_range: skip_range.filter(|r| !r.is_empty()),
        substitutes_for: substitutes_for.filter(|s| !s.is_empty()),
        provided_apis,
        required_apis,
        properties,
        dependencies,
        related_images,
        deprecated,
        digest: digest.unwrap_or_default(),
    })
}

/// Every tombstoned name, bundle row or not.
pub fn list_deprecated(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT operatorbundle_name FROM deprecated ORDER BY operatorbundle_name")?;
    let rows = stmt.query_map([], |row| row.get(0))?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

fn api_rows(conn: &Connection, table: &str, bundle: &str) -> Result<Vec<ApiKey>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT r.group_name, r.version, r.kind, COALESCE(a.plural, '')
         FROM {table} r
         LEFT JOIN api a ON a.group_name = r.group_name
             AND a.version = r.version AND a.kind = r.kind
         WHERE r.operatorbundle_name = ?1
         ORDER BY r.group_name, r.version, r.kind"
    ))?;
    let rows = stmt.query_map([bundle], |row| {
        Ok(ApiKey::new(
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        )
        .with_plural(row.get::<_, String>(3)?))
    })?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

/// Lazy keyset-paged iteration over every (channel, bundle) pair. The
/// order is stable within one call; a fresh call restarts from the top.
pub struct BundleIterator<'a> {
    store: &'a Store,
    cursor: Option<(String, String, String)>,
    buffer: std::collections::VecDeque<BundlePayload>,
    batch: usize,
    done: bool,
}

impl<'a> BundleIterator<'a> {
    const DEFAULT_BATCH: usize = 50;

    fn new(store: &'a Store) -> Self {
        Self {
            store,
            cursor: None,
            buffer: std::collections::VecDeque::new(),
            batch: Self::DEFAULT_BATCH,
            done: false,
        }
    }

    fn refill(&mut self) -> Result<()> {
        let page = self.store.with_reader(|conn| {
            list_bundle_positions(conn, self.cursor.as_ref(), self.batch)
        })?;
        if page.len() < self.batch {
            self.done = true;
        }
        if let Some(last) = page.last() {
            self.cursor = Some(last.clone());
        }
        for (package, channel, name) in page {
            let payload = self
                .store
                .with_reader(|conn| load_payload(conn, &name, Some((&package, &channel))))?;
            self.buffer.push_back(payload);
        }
        Ok(())
    }
}

impl Iterator for BundleIterator<'_> {
    type Item = Result<BundlePayload>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.done {
            if let Err(e) = self.refill() {
                self.done = true;
                return Some(Err(e));
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}

fn list_bundle_positions(
    conn: &Connection,
    after: Option<&(String, String, String)>,
    limit: usize,
) -> Result<Vec<(String, String, String)>> {
    let (package, channel, name) = match after {
        Some((p, c, n)) => (p.as_str(), c.as_str(), n.as_str()),
        None => ("", "", ""),
    };
    let mut stmt = conn.prepare(
        r#"
        SELECT DISTINCT package_name, channel_name, operatorbundle_name
        FROM channel_entry
        WHERE (package_name, channel_name, operatorbundle_name) > (?1, ?2, ?3)
        ORDER BY package_name, channel_name, operatorbundle_name
        LIMIT ?4
        "#,
    )?;
    let rows = stmt.query_map(params![package, channel, name, limit as i64], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
    })?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}
