//! Bulk removal of tags with their associations and overrides.

use rusqlite::{params_from_iter, Connection};

use super::repeat_vars;
use crate::error::{AppError, Result};

/// Delete the given tags outright: associations first, then the tag
/// rows (per-language overrides cascade with them). One transaction.
///
/// Images are never touched; an image left without any tags stays in
/// the catalog, it may be re-tagged later.
pub fn delete_tags(conn: &mut Connection, tag_ids: &[i64]) -> Result<Vec<i64>> {
    if tag_ids.is_empty() {
        return Err(AppError::validation("empty_tag_list"));
    }

    let vars = repeat_vars(tag_ids.len());
    let tx = conn.transaction()?;

    let sql = format!("DELETE FROM tagged_images WHERE tag_id IN ({vars})");
    tx.execute(&sql, params_from_iter(tag_ids.iter()))?;

    let sql = format!("DELETE FROM tags WHERE tag_id IN ({vars})");
    tx.execute(&sql, params_from_iter(tag_ids.iter()))?;

    tx.commit()?;
    Ok(tag_ids.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::assoc::{image_tags, latest, toggle_tags};
    use crate::engine::registry::{add_tag, update_tag};
    use crate::store::test_conn;

    fn tag(conn: &mut Connection, name: &str) -> i64 {
        add_tag(conn, name, None, "en").unwrap().id
    }

    #[test]
    fn delete_rejects_an_empty_list() {
        let mut conn = test_conn();
        assert!(delete_tags(&mut conn, &[]).is_err());
    }

    #[test]
    fn delete_removes_tags_associations_and_overrides() {
        let mut conn = test_conn();
        let doomed = tag(&mut conn, "blurry");
        let kept = tag(&mut conn, "cat");
        toggle_tags(&mut conn, "a.jpg", &[doomed, kept]).unwrap();
        update_tag(&mut conn, doomed, "fr", Some("flou"), None).unwrap();

        let removed = delete_tags(&mut conn, &[doomed]).unwrap();
        assert_eq!(removed, vec![doomed]);

        let tags: i64 = conn
            .query_row("SELECT COUNT(*) FROM tags", [], |r| r.get(0))
            .unwrap();
        assert_eq!(tags, 1);
        let overrides: i64 = conn
            .query_row("SELECT COUNT(*) FROM tag_overrides", [], |r| r.get(0))
            .unwrap();
        assert_eq!(overrides, 0);
        // the unrelated tag is untouched
        assert_eq!(image_tags(&conn, "a.jpg").unwrap(), vec![kept]);
    }

    #[test]
    fn orphaned_images_survive_tag_deletion() {
        let mut conn = test_conn();
        let doomed = tag(&mut conn, "blurry");
        toggle_tags(&mut conn, "a.jpg", &[doomed]).unwrap();

        delete_tags(&mut conn, &[doomed]).unwrap();

        assert!(image_tags(&conn, "a.jpg").unwrap().is_empty());
        assert_eq!(latest(&conn).unwrap().as_deref(), Some("a.jpg"));
    }

    #[test]
    fn delete_several_tags_at_once() {
        let mut conn = test_conn();
        let t1 = tag(&mut conn, "blurry");
        let t2 = tag(&mut conn, "dark");
        let t3 = tag(&mut conn, "cat");
        toggle_tags(&mut conn, "a.jpg", &[t1, t2, t3]).unwrap();

        delete_tags(&mut conn, &[t1, t2]).unwrap();

        assert_eq!(image_tags(&conn, "a.jpg").unwrap(), vec![t3]);
    }
}
