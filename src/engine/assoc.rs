//! Toggle, query and search operations over the image/tag relation.

use std::collections::BTreeSet;

use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use super::repeat_vars;
use crate::error::{AppError, Result};

/// Tag ids attached to an image. An unknown filename simply has no tags.
pub fn image_tags(conn: &Connection, fn_: &str) -> Result<Vec<i64>> {
    let image_id: Option<i64> = conn
        .query_row(
            "SELECT image_id FROM images WHERE fn = ?1",
            params![fn_],
            |row| row.get(0),
        )
        .optional()?;

    let Some(image_id) = image_id else {
        return Ok(Vec::new());
    };

    let mut stmt = conn.prepare("SELECT tag_id FROM tagged_images WHERE image_id = ?1")?;
    let mut tags = Vec::new();
    for tag in stmt.query_map(params![image_id], |row| row.get::<_, i64>(0))? {
        tags.push(tag?);
    }
    Ok(tags)
}

/// Flip the membership of each requested tag on an image, creating the
/// image row on first contact.
///
/// Returns the ids whose membership actually changed: the symmetric
/// difference between the previous tag set and the requested set. The
/// whole call is one transaction, so the `used` counters move with the
/// association rows or not at all.
pub fn toggle_tags(conn: &mut Connection, fn_: &str, tag_ids: &[i64]) -> Result<Vec<i64>> {
    if tag_ids.is_empty() {
        return Err(AppError::validation("empty_tag_list"));
    }

    let tx = conn.transaction()?;

    // Find-or-create keeps the image materialization inside the
    // transaction's write set.
    let image_id: Option<i64> = tx
        .query_row(
            "SELECT image_id FROM images WHERE fn = ?1",
            params![fn_],
            |row| row.get(0),
        )
        .optional()?;
    let image_id = match image_id {
        Some(id) => id,
        None => {
            tx.execute("INSERT INTO images (fn) VALUES (?1)", params![fn_])?;
            tx.last_insert_rowid()
        }
    };

    let current: BTreeSet<i64> = {
        let mut stmt = tx.prepare("SELECT tag_id FROM tagged_images WHERE image_id = ?1")?;
        let rows = stmt.query_map(params![image_id], |row| row.get::<_, i64>(0))?;
        rows.collect::<rusqlite::Result<_>>()?
    };

    for &tag in tag_ids {
        if current.contains(&tag) {
            tx.execute(
                "DELETE FROM tagged_images WHERE image_id = ?1 AND tag_id = ?2",
                params![image_id, tag],
            )?;
            tx.execute(
                "UPDATE tags SET used = used - 1 WHERE tag_id = ?1",
                params![tag],
            )?;
        } else {
            tx.execute(
                "INSERT INTO tagged_images (image_id, tag_id) VALUES (?1, ?2)",
                params![image_id, tag],
            )?;
            tx.execute(
                "UPDATE tags SET used = used + 1 WHERE tag_id = ?1",
                params![tag],
            )?;
        }
    }

    tx.commit()?;

    let requested: BTreeSet<i64> = tag_ids.iter().copied().collect();
    Ok(current.symmetric_difference(&requested).copied().collect())
}

/// Filenames of images carrying every requested tag (set intersection).
///
/// A requested tag with no associations at all empties the result.
pub fn search_images(conn: &Connection, tag_ids: &[i64]) -> Result<Vec<String>> {
    if tag_ids.is_empty() {
        return Err(AppError::validation("empty_tag_list"));
    }

    let distinct: BTreeSet<i64> = tag_ids.iter().copied().collect();
    let sql = format!(
        "SELECT i.fn
         FROM tagged_images AS ti
         JOIN images AS i ON i.image_id = ti.image_id
         WHERE ti.tag_id IN ({})
         GROUP BY ti.image_id
         HAVING COUNT(DISTINCT ti.tag_id) = {}
         ORDER BY i.fn",
        repeat_vars(distinct.len()),
        distinct.len()
    );

    let mut stmt = conn.prepare(&sql)?;
    let mut found = Vec::new();
    for fn_ in stmt.query_map(params_from_iter(&distinct), |row| row.get::<_, String>(0))? {
        found.push(fn_?);
    }
    Ok(found)
}

/// Filename of the most recently first-tagged image, if any.
pub fn latest(conn: &Connection) -> Result<Option<String>> {
    let fn_ = conn
        .query_row(
            "SELECT fn FROM images ORDER BY image_id DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(fn_)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::registry::add_tag;
    use crate::store::test_conn;

    fn tag(conn: &mut Connection, name: &str) -> i64 {
        add_tag(conn, name, None, "en").unwrap().id
    }

    fn used(conn: &Connection, tag_id: i64) -> i64 {
        conn.query_row(
            "SELECT used FROM tags WHERE tag_id = ?1",
            params![tag_id],
            |r| r.get(0),
        )
        .unwrap()
    }

    fn association_count(conn: &Connection, tag_id: i64) -> i64 {
        conn.query_row(
            "SELECT COUNT(*) FROM tagged_images WHERE tag_id = ?1",
            params![tag_id],
            |r| r.get(0),
        )
        .unwrap()
    }

    #[test]
    fn unknown_image_has_no_tags() {
        let conn = test_conn();
        assert!(image_tags(&conn, "nowhere.jpg").unwrap().is_empty());
    }

    #[test]
    fn toggle_creates_the_image_and_attaches_tags() {
        let mut conn = test_conn();
        let t1 = tag(&mut conn, "cat");
        let t2 = tag(&mut conn, "dog");

        let flipped = toggle_tags(&mut conn, "a.jpg", &[t1, t2]).unwrap();
        assert_eq!(flipped, vec![t1, t2]);
        assert_eq!(image_tags(&conn, "a.jpg").unwrap().len(), 2);
        assert_eq!(used(&conn, t1), 1);
        assert_eq!(used(&conn, t2), 1);
    }

    #[test]
    fn toggle_twice_restores_the_original_tag_set() {
        let mut conn = test_conn();
        let t1 = tag(&mut conn, "cat");
        let t2 = tag(&mut conn, "dog");
        toggle_tags(&mut conn, "a.jpg", &[t1]).unwrap();

        let first = toggle_tags(&mut conn, "a.jpg", &[t1, t2]).unwrap();
        // t1 detached, t2 attached
        assert_eq!(first, vec![t2]);

        let second = toggle_tags(&mut conn, "a.jpg", &[t1, t2]).unwrap();
        assert_eq!(second, vec![t1]);

        let mut tags = image_tags(&conn, "a.jpg").unwrap();
        tags.sort();
        assert_eq!(tags, vec![t1]);
        assert_eq!(used(&conn, t1), 1);
        assert_eq!(used(&conn, t2), 0);
    }

    #[test]
    fn toggle_rejects_an_empty_list() {
        let mut conn = test_conn();
        assert!(matches!(
            toggle_tags(&mut conn, "a.jpg", &[]),
            Err(AppError::Validation { key: "empty_tag_list" })
        ));
    }

    #[test]
    fn toggle_of_unknown_tag_rolls_back_entirely() {
        let mut conn = test_conn();
        let t1 = tag(&mut conn, "cat");

        // 999 violates the tagged_images foreign key; the whole call must
        // roll back, including the flip of t1 and the image creation.
        let err = toggle_tags(&mut conn, "a.jpg", &[t1, 999]).unwrap_err();
        assert_eq!(err.kind(), "integrity");
        assert!(image_tags(&conn, "a.jpg").unwrap().is_empty());
        assert_eq!(used(&conn, t1), 0);
        let images: i64 = conn
            .query_row("SELECT COUNT(*) FROM images", [], |r| r.get(0))
            .unwrap();
        assert_eq!(images, 0);
    }

    #[test]
    fn used_always_matches_the_association_count() {
        let mut conn = test_conn();
        let t1 = tag(&mut conn, "cat");
        let t2 = tag(&mut conn, "dog");

        toggle_tags(&mut conn, "a.jpg", &[t1, t2]).unwrap();
        toggle_tags(&mut conn, "b.jpg", &[t1]).unwrap();
        toggle_tags(&mut conn, "a.jpg", &[t2]).unwrap();
        toggle_tags(&mut conn, "b.jpg", &[t1, t2]).unwrap();

        for t in [t1, t2] {
            assert_eq!(used(&conn, t), association_count(&conn, t));
        }
    }

    #[test]
    fn search_intersects_across_tags() {
        let mut conn = test_conn();
        let t1 = tag(&mut conn, "cat");
        let t2 = tag(&mut conn, "dog");
        toggle_tags(&mut conn, "a.jpg", &[t1, t2]).unwrap();
        toggle_tags(&mut conn, "b.jpg", &[t1]).unwrap();

        assert_eq!(search_images(&conn, &[t1, t2]).unwrap(), vec!["a.jpg"]);
        assert_eq!(
            search_images(&conn, &[t1]).unwrap(),
            vec!["a.jpg", "b.jpg"]
        );
    }

    #[test]
    fn search_with_an_unused_tag_finds_nothing() {
        let mut conn = test_conn();
        let t1 = tag(&mut conn, "cat");
        let t2 = tag(&mut conn, "dog");
        toggle_tags(&mut conn, "a.jpg", &[t1]).unwrap();

        assert!(search_images(&conn, &[t1, t2]).unwrap().is_empty());
    }

    #[test]
    fn search_tolerates_duplicate_requested_ids() {
        let mut conn = test_conn();
        let t1 = tag(&mut conn, "cat");
        toggle_tags(&mut conn, "a.jpg", &[t1]).unwrap();

        assert_eq!(search_images(&conn, &[t1, t1]).unwrap(), vec!["a.jpg"]);
    }

    #[test]
    fn search_rejects_an_empty_list() {
        let conn = test_conn();
        assert!(search_images(&conn, &[]).is_err());
    }

    #[test]
    fn latest_tracks_the_highest_image_id() {
        let mut conn = test_conn();
        assert_eq!(latest(&conn).unwrap(), None);

        let t1 = tag(&mut conn, "cat");
        toggle_tags(&mut conn, "a.jpg", &[t1]).unwrap();
        toggle_tags(&mut conn, "b.jpg", &[t1]).unwrap();
        assert_eq!(latest(&conn).unwrap().as_deref(), Some("b.jpg"));

        // Untagging does not remove the image row.
        toggle_tags(&mut conn, "b.jpg", &[t1]).unwrap();
        assert_eq!(latest(&conn).unwrap().as_deref(), Some("b.jpg"));
    }
}
