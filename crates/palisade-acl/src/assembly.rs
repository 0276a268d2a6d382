//! Root-first construction of Acls from stored rows.
//!
//! Rows are held in an arena keyed by [`ObjectIdentity`]; parent links are
//! keys into the same arena. Walking a chain therefore never follows a live
//! reference, which makes depth bounding and cycle detection a matter of
//! counting and remembering keys.
//!
//! Acls are built from the root of each chain down, so every parent is
//! complete before a child points at it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use palisade_core::{Acl, Error, ObjectIdentity, Result, Sid};
use palisade_storage::AclRow;

/// Output of one assembly pass.
#[derive(Debug, Default)]
pub(crate) struct Assembly {
    /// Every newly built Acl, ancestors before descendants.
    pub built: Vec<Arc<Acl>>,
    /// Built or seeded Acls by identity.
    pub resolved: HashMap<ObjectIdentity, Arc<Acl>>,
}

/// Builds Acls for `targets` from `rows`.
///
/// `seeds` are already-resolved Acls (typically cache hits for ancestors)
/// that chains may attach to. Targets without a row are skipped.
///
/// # Errors
///
/// - [`Error::DepthExceeded`] if a chain is longer than `max_depth` parent
///   hops or revisits an identity.
/// - [`Error::NotFound`] if a row names a parent that has no row.
pub(crate) fn assemble(
    rows: &HashMap<ObjectIdentity, AclRow>,
    seeds: HashMap<ObjectIdentity, Arc<Acl>>,
    targets: &[ObjectIdentity],
    sids: Option<&[Sid]>,
    max_depth: usize,
) -> Result<Assembly> {
    let mut assembly = Assembly {
        built: Vec::new(),
        resolved: seeds,
    };

    for target in targets {
        if assembly.resolved.contains_key(target) {
            continue;
        }
        let Some(row) = rows.get(target) else {
            continue;
        };

        let chain = unresolved_chain(row, rows, &assembly.resolved, max_depth)?;

        for row in chain.into_iter().rev() {
            let parent = match &row.parent {
                Some(parent) => Some(Arc::clone(
                    assembly
                        .resolved
                        .get(parent)
                        .ok_or_else(|| Error::not_found(parent))?,
                )),
                None => None,
            };

            let hops = parent.as_ref().map_or(0, |p| p.parent_hops() + 1);
            if hops > max_depth {
                log::warn!("Ancestor chain of {target} exceeds {max_depth} hops");
                return Err(Error::DepthExceeded {
                    object: target.clone(),
                    max_depth,
                });
            }

            let acl = Arc::new(build_acl(row, parent, sids));
            assembly
                .resolved
                .insert(row.object_identity.clone(), Arc::clone(&acl));
            assembly.built.push(acl);
        }
    }

    Ok(assembly)
}

/// Rows from `start` up to (not including) the first resolved ancestor or
/// the root, nearest first.
fn unresolved_chain<'a>(
    start: &'a AclRow,
    rows: &'a HashMap<ObjectIdentity, AclRow>,
    resolved: &HashMap<ObjectIdentity, Arc<Acl>>,
    max_depth: usize,
) -> Result<Vec<&'a AclRow>> {
    let mut chain = vec![start];
    let mut seen: HashSet<&ObjectIdentity> = HashSet::from([&start.object_identity]);
    let mut cursor = start;

    while let Some(parent) = &cursor.parent {
        if resolved.contains_key(parent) {
            break;
        }
        if !seen.insert(parent) {
            log::warn!(
                "Cycle in ancestor chain of {} at {parent}",
                start.object_identity
            );
            return Err(Error::DepthExceeded {
                object: start.object_identity.clone(),
                max_depth,
            });
        }
        if chain.len() > max_depth {
            log::warn!(
                "Ancestor chain of {} exceeds {max_depth} hops",
                start.object_identity
            );
            return Err(Error::DepthExceeded {
                object: start.object_identity.clone(),
                max_depth,
            });
        }

        let Some(parent_row) = rows.get(parent) else {
            log::warn!(
                "{} names parent {parent}, which has no ACL row",
                cursor.object_identity
            );
            return Err(Error::not_found(parent));
        };
        chain.push(parent_row);
        cursor = parent_row;
    }

    Ok(chain)
}

fn build_acl(row: &AclRow, parent: Option<Arc<Acl>>, sids: Option<&[Sid]>) -> Acl {
    let acl = Acl::new(row.object_identity.clone(), row.owner.clone())
        .with_entries_inheriting(row.entries_inheriting)
        .with_entries(row.access_control_entries())
        .with_loaded_sids(sids.map(<[Sid]>::to_vec));
    match parent {
        Some(parent) => acl.with_parent(parent),
        None => acl,
    }
}

// ============================================================================
// Tests
// ============================================================================
