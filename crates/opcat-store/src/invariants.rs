//! Post-mutation invariant checks
//!
//! Every mutating operation runs these inside its transaction, so a
//! violation rolls the mutation back instead of persisting a broken graph.

use rusqlite::Connection;

use crate::error::{Result, StoreError};
use crate::persist;

/// Verify the store-wide invariants over the current transaction state.
pub fn check(conn: &Connection) -> Result<()> {
    heads_exist(conn)?;
    default_channels_exist(conn)?;
    channels_are_valid_graphs(conn)?;
    apis_are_referenced(conn)?;
    substituted_bundles_left_channels(conn)?;
    Ok(())
}

/// Every channel head names a stored bundle.
fn heads_exist(conn: &Connection) -> Result<()> {
    let missing: Option<(String, String)> = {
        let mut stmt = conn.prepare(
            "SELECT c.name, c.head_operatorbundle_name FROM channel c
             LEFT JOIN operatorbundle b ON b.name = c.head_operatorbundle_name
             WHERE b.name IS NULL LIMIT 1",
        )?;
        let mut rows = stmt.query([])?;
        match rows.next()? {
            Some(row) => Some((row.get(0)?, row.get(1)?)),
            None => None,
        }
    };
    if let Some((channel, head)) = missing {
        return Err(StoreError::InvariantViolation(format!(
            "channel {channel:?} heads missing bundle {head:?}"
        )));
    }
    Ok(())
}

/// A set default channel names one of the package's channels.
fn default_channels_exist(conn: &Connection) -> Result<()> {
    let broken: Option<String> = {
        let mut stmt = conn.prepare(
            "SELECT p.name FROM package p
             WHERE p.default_channel IS NOT NULL AND p.default_channel != ''
               AND NOT EXISTS (
                   SELECT 1 FROM channel c
                   WHERE c.package_name = p.name AND c.name = p.default_channel)
             LIMIT 1",
        )?;
        let mut rows = stmt.query([])?;
        match rows.next()? {
            Some(row) => Some(row.get(0)?),
            None => None,
        }
    };
    if let Some(package) = broken {
        return Err(StoreError::InvariantViolation(format!(
            "package {package:?} defaults to a channel it does not have"
        )));
    }
    Ok(())
}

/// Every channel reloads into a valid graph: one head, no cycle, bounded
/// depth, every member reachable.
fn channels_are_valid_graphs(conn: &Connection) -> Result<()> {
    let channels: Vec<(String, String)> = {
        let mut stmt = conn.prepare("SELECT package_name, name FROM channel")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect::<rusqlite::Result<_>>()?
    };
    for (package, channel) in channels {
        let graph = persist::load_channel_graph(conn, &package, &channel)?;
        graph.validate()?;
        let head = graph.head()?.name.clone();
        let stored_head: String = conn.query_row(
            "SELECT head_operatorbundle_name FROM channel
             WHERE name = ?1 AND package_name = ?2",
            rusqlite::params![channel, package],
            |row| row.get(0),
        )?;
        if head != stored_head {
            return Err(StoreError::InvariantViolation(format!(
                "channel {channel:?} stores head {stored_head:?} but its graph heads at {head:?}"
            )));
        }
    }
    Ok(())
}

/// No API row outlives its last provider/requirer reference.
fn apis_are_referenced(conn: &Connection) -> Result<()> {
    let orphaned: i64 = conn.query_row(
        "SELECT COUNT(*) FROM api a
         WHERE NOT EXISTS (
               SELECT 1 FROM api_provider p
               WHERE p.group_name = a.group_name AND p.version = a.version AND p.kind = a.kind)
           AND NOT EXISTS (
               SELECT 1 FROM api_requirer r
               WHERE r.group_name = a.group_name AND r.version = a.version AND r.kind = a.kind)",
        [],
        |row| row.get(0),
    )?;
    if orphaned > 0 {
        return Err(StoreError::InvariantViolation(format!(
            "{orphaned} api row(s) have no remaining referrer"
        )));
    }
    Ok(())
}

/// A substituted-for bundle is out of every channel.
fn substituted_bundles_left_channels(conn: &Connection) -> Result<()> {
    let violation: Option<(String, String)> = {
        let mut stmt = conn.prepare(
            "SELECT b.name, b.substitutesfor FROM operatorbundle b
             WHERE b.substitutesfor IS NOT NULL AND b.substitutesfor != ''
               AND EXISTS (
                   SELECT 1 FROM channel_entry e
                   WHERE e.operatorbundle_name = b.substitutesfor)
             LIMIT 1",
        )?;
        let mut rows = stmt.query([])?;
        match rows.next()? {
            Some(row) => Some((row.get(0)?, row.get(1)?)),
            None => None,
        }
    };
    if let Some((bundle, target)) = violation {
        return Err(StoreError::InvariantViolation(format!(
            "bundle {bundle:?} substitutes for {target:?}, which still sits in a channel"
        )));
    }
    Ok(())
}
