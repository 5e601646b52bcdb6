//! Channel graph persistence
//!
//! The graph builder works on in-memory `ChannelGraph`s; this module moves
//! them in and out of `channel`/`channel_entry`. A channel's entries are
//! always rewritten wholesale inside the caller's transaction: entry rows
//! are edges, one primary edge per bundle (lowest entry_id) plus one edge
//! per present skip target.

use std::collections::HashMap;

use rusqlite::{Connection, OptionalExtension, Transaction, params};

use opcat_core::version::parse_version;

use crate::error::{Result, StoreError};
use crate::graph::{ChannelGraph, Node};

/// Load one channel's graph. Bundles appear with their effective in-channel
/// edges; a NULL primary edge stays dangling.
pub fn load_channel_graph(
    conn: &Connection,
    package: &str,
    channel: &str,
) -> Result<ChannelGraph> {
    let mut stmt = conn.prepare(
        r#"
        SELECT e.entry_id, e.operatorbundle_name, t.operatorbundle_name, b.version
        FROM channel_entry e
        LEFT JOIN channel_entry t ON e.replaces = t.entry_id
        JOIN operatorbundle b ON b.name = e.operatorbundle_name
        WHERE e.channel_name = ?1 AND e.package_name = ?2
        ORDER BY e.operatorbundle_name, e.entry_id
        "#,
    )?;
    let rows = stmt.query_map(params![channel, package], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<String>>(2)?,
            row.get::<_, String>(3)?,
        ))
    })?;

    let mut nodes: Vec<Node> = Vec::new();
    for row in rows {
        let (_, bundle, target, version) = row?;
        match nodes.last_mut() {
            // subsequent edges for the same bundle are its skips
            Some(node) if node.name == bundle => {
                if let Some(target) = target {
                    node.skips.insert(target);
                }
            }
            _ => {
                nodes.push(Node::new(bundle, parse_version(&version)?).with_replaces(target));
            }
        }
    }
    Ok(ChannelGraph::from_nodes(package, channel, nodes))
}

/// Every channel (package, name) pair a bundle appears in.
pub fn channels_of_bundle(conn: &Connection, bundle: &str) -> Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT package_name, channel_name FROM channel_entry
         WHERE operatorbundle_name = ?1 ORDER BY package_name, channel_name",
    )?;
    let rows = stmt.query_map([bundle], |row| Ok((row.get(0)?, row.get(1)?)))?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

/// The package a bundle belongs to: from its channel membership, falling
/// back to its package-identity property for bundles outside any channel.
pub fn package_of_bundle(conn: &Connection, bundle: &str) -> Result<Option<String>> {
    let from_channel: Option<String> = conn
        .query_row(
            "SELECT package_name FROM channel_entry WHERE operatorbundle_name = ?1 LIMIT 1",
            [bundle],
            |row| row.get(0),
        )
        .optional()?;
    if from_channel.is_some() {
        return Ok(from_channel);
    }

    let property: Option<String> = conn
        .query_row(
            "SELECT value FROM properties
             WHERE operatorbundle_name = ?1 AND type = 'olm.package' LIMIT 1",
            [bundle],
            |row| row.get(0),
        )
        .optional()?;
    Ok(property
        .and_then(|raw| serde_json::from_str::<serde_json::Value>(&raw).ok())
        .and_then(|v| v.get("packageName").and_then(|p| p.as_str()).map(String::from)))
}

/// All bundle names belonging to a package, channel members and
/// substituted-out strays alike.
pub fn bundles_of_package(conn: &Connection, package: &str) -> Result<Vec<String>> {
    let mut names: Vec<String> = {
        let mut stmt = conn.prepare(
            "SELECT DISTINCT operatorbundle_name FROM channel_entry WHERE package_name = ?1",
        )?;
        let rows = stmt.query_map([package], |row| row.get(0))?;
        rows.collect::<rusqlite::Result<_>>()?
    };
    let mut stmt = conn.prepare(
        "SELECT operatorbundle_name FROM properties
         WHERE type = 'olm.package' AND value LIKE '%' || ?1 || '%'",
    )?;
    let candidates: Vec<String> = stmt
        .query_map([package], |row| row.get(0))?
        .collect::<rusqlite::Result<_>>()?;
    for name in candidates {
        if names.contains(&name) {
            continue;
        }
        if package_of_bundle(conn, &name)?.as_deref() == Some(package) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// Rewrite a channel's entries (and its head) from the graph. An empty
/// graph deletes the channel row instead.
pub fn write_channel_graph(tx: &Transaction<'_>, graph: &ChannelGraph) -> Result<()> {
    tx.execute(
        "DELETE FROM channel_entry WHERE channel_name = ?1 AND package_name = ?2",
        params![graph.name, graph.package],
    )?;
    if graph.is_empty() {
        tx.execute(
            "DELETE FROM channel WHERE name = ?1 AND package_name = ?2",
            params![graph.name, graph.package],
        )?;
        return Ok(());
    }

    let head = graph.head()?.name.clone();
    tx.execute(
        r#"
        INSERT INTO channel (name, package_name, head_operatorbundle_name)
        VALUES (?1, ?2, ?3)
        ON CONFLICT(name, package_name) DO UPDATE SET
            head_operatorbundle_name = excluded.head_operatorbundle_name
        "#,
        params![graph.name, graph.package, head],
    )?;

    // two passes: primary entries first (they define each bundle's entry
    // id and stay the lowest id per bundle), then the edges, which may
    // point at entries of any depth
    let entries = graph.entries()?;
    let mut primary_ids: HashMap<&str, i64> = HashMap::new();
    for row in &entries {
        tx.execute(
            "INSERT INTO channel_entry
                 (channel_name, package_name, operatorbundle_name, replaces, depth)
             VALUES (?1, ?2, ?3, NULL, ?4)",
            params![graph.name, graph.package, row.bundle, row.depth as i64],
        )?;
        primary_ids.insert(row.bundle.as_str(), tx.last_insert_rowid());
    }
    for row in &entries {
        if let Some(target_id) = row.replaces.as_deref().and_then(|t| primary_ids.get(t)) {
            tx.execute(
                "UPDATE channel_entry SET replaces = ?1 WHERE entry_id = ?2",
                params![target_id, primary_ids[row.bundle.as_str()]],
            )?;
        }
        for skip in &row.skips {
            let skip_id = primary_ids.get(skip.as_str()).copied();
            tx.execute(
                "INSERT INTO channel_entry
                     (channel_name, package_name, operatorbundle_name, replaces, depth)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![graph.name, graph.package, row.bundle, skip_id, row.depth as i64],
            )?;
        }
    }
    Ok(())
}

/// Delete a bundle row; bundle-keyed tables cascade, API rows garbage
/// collect through their triggers. The `deprecated` tombstone, if any,
/// survives by design.
pub fn remove_bundle_row(tx: &Transaction<'_>, name: &str) -> Result<()> {
    tx.execute("DELETE FROM operatorbundle WHERE name = ?1", [name])?;
    Ok(())
}

/// Null out declared edges pointing at bundles that no longer exist in the
/// store, so name-only payloads match the truncated graph.
pub fn clear_dangling_references(tx: &Transaction<'_>, removed: &[String]) -> Result<()> {
    for name in removed {
        tx.execute(
            "UPDATE operatorbundle SET replaces = NULL WHERE replaces = ?1",
            [name],
        )?;
    }

    let mut stmt = tx.prepare("SELECT name, skips FROM operatorbundle WHERE skips IS NOT NULL AND skips != ''")?;
    let rows: Vec<(String, String)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<_>>()?;
    drop(stmt);

    for (bundle, skips) in rows {
        let kept: Vec<&str> = skips
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty() && !removed.iter().any(|r| r == s))
            .collect();
        let rejoined = kept.join(",");
        if rejoined != skips {
            tx.execute(
                "UPDATE operatorbundle SET skips = ?1 WHERE name = ?2",
                params![rejoined, bundle],
            )?;
        }
    }
    Ok(())
}

/// Remove a package with everything it owns: bundles, channels, entries.
pub fn remove_package(tx: &Transaction<'_>, package: &str) -> Result<()> {
    let bundles = bundles_of_package(tx, package)?;
    for bundle in &bundles {
        remove_bundle_row(tx, bundle)?;
    }
    let deleted = tx.execute("DELETE FROM package WHERE name = ?1", [package])?;
    if deleted == 0 && bundles.is_empty() {
        return Err(StoreError::not_found("package", package));
    }
    clear_dangling_references(tx, &bundles)?;
    Ok(())
}

/// All channels of a package with their heads.
pub fn channels_of_package(conn: &Connection, package: &str) -> Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare(
        "SELECT name, head_operatorbundle_name FROM channel
         WHERE package_name = ?1 ORDER BY name",
    )?;
    let rows = stmt.query_map([package], |row| Ok((row.get(0)?, row.get(1)?)))?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}
