//! Collapses duplicate tag identities into one surviving tag.

use rusqlite::{params, params_from_iter, Connection};

use super::{repeat_vars, MergeOutcome};
use crate::error::{AppError, Result};

/// Merge `tag_ids[1..]` into `tag_ids[0]`, preserving every distinct
/// image association, in one transaction:
///
/// 1. drop associations of removed tags whose image already carries the
///    kept tag (naive re-pointing would collide with them);
/// 2. re-point the remaining associations to the kept tag, ignoring
///    conflicts between two removed tags on the same image;
/// 3. drop the association rows the ignore in step 2 left behind;
/// 4. delete the removed tag rows (their overrides cascade away);
/// 5. recompute `used` for the kept tag from the live association
///    count rather than adjusting it incrementally.
pub fn merge(conn: &mut Connection, tag_ids: &[i64]) -> Result<MergeOutcome> {
    if tag_ids.len() < 2 {
        return Err(AppError::validation("tag_list_too_short"));
    }

    let kept = tag_ids[0];
    // The kept tag may be listed again further down; dropping it from the
    // removed set keeps it from being deleted along with the duplicates.
    let removed: Vec<i64> = tag_ids[1..]
        .iter()
        .copied()
        .filter(|t| *t != kept)
        .collect();
    if removed.is_empty() {
        return Ok(MergeOutcome { kept, removed });
    }
    let vars = repeat_vars(removed.len());

    let tx = conn.transaction()?;

    let sql = format!(
        "DELETE FROM tagged_images
         WHERE tag_id IN ({vars})
         AND image_id IN (SELECT image_id FROM tagged_images WHERE tag_id = ?)"
    );
    tx.execute(
        &sql,
        params_from_iter(removed.iter().chain(std::iter::once(&kept))),
    )?;

    let sql = format!(
        "UPDATE OR IGNORE tagged_images SET tag_id = ? WHERE tag_id IN ({vars})"
    );
    tx.execute(
        &sql,
        params_from_iter(std::iter::once(&kept).chain(removed.iter())),
    )?;

    // When an image carried two of the removed tags, only one of them
    // re-pointed above; the other was skipped and still references a tag
    // about to disappear.
    let sql = format!("DELETE FROM tagged_images WHERE tag_id IN ({vars})");
    tx.execute(&sql, params_from_iter(removed.iter()))?;

    let sql = format!("DELETE FROM tags WHERE tag_id IN ({vars})");
    tx.execute(&sql, params_from_iter(removed.iter()))?;

    tx.execute(
        "UPDATE tags
         SET used = (SELECT COUNT(*) FROM tagged_images WHERE tag_id = ?1)
         WHERE tag_id = ?1",
        params![kept],
    )?;

    tx.commit()?;

    Ok(MergeOutcome { kept, removed })
}
