//! CRUD over tag definitions and their per-language overrides.

use rusqlite::{params, Connection, OptionalExtension};

use super::{repeat_vars, Tag, TagInfo, TagView, TagViewExtended, UpdateOutcome};
use crate::config::lang_supported;
use crate::error::{AppError, Result};

/// Add a new tag owned by `lang`, with `used = 0`.
///
/// The name must contain something other than whitespace; description is
/// trimmed and an all-whitespace one becomes NULL.
pub fn add_tag(
    conn: &mut Connection,
    name: &str,
    description: Option<&str>,
    lang: &str,
) -> Result<Tag> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::validation("empty_tag_name"));
    }
    if !lang_supported(lang) {
        return Err(AppError::validation("unsupported_language"));
    }
    let description = description
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(String::from);

    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO tags (name, description, used, lang) VALUES (?1, ?2, 0, ?3)",
        params![name, description, lang],
    )?;
    let id = tx.last_insert_rowid();
    tx.commit()?;

    Ok(Tag {
        id,
        lang: lang.to_string(),
        name: name.to_string(),
        description,
        used: 0,
    })
}

/// Update a tag's name and/or description, as seen from `lang`.
///
/// Only the supplied fields change. When `lang` is the tag's own
/// language the base row is updated; otherwise the update lands in the
/// override row for that language, creating it if needed.
pub fn update_tag(
    conn: &mut Connection,
    tag_id: i64,
    lang: &str,
    name: Option<&str>,
    description: Option<&str>,
) -> Result<UpdateOutcome> {
    if name.is_none() && description.is_none() {
        return Ok(UpdateOutcome::NoChanges);
    }

    let tx = conn.transaction()?;

    let owning_lang: Option<String> = tx
        .query_row(
            "SELECT lang FROM tags WHERE tag_id = ?1",
            params![tag_id],
            |row| row.get(0),
        )
        .optional()?;
    let owning_lang = owning_lang.ok_or_else(|| AppError::not_found("unknown_tag"))?;

    if owning_lang == lang {
        match (name, description) {
            (Some(n), Some(d)) => tx.execute(
                "UPDATE tags SET name = ?1, description = ?2 WHERE tag_id = ?3",
                params![n, d, tag_id],
            )?,
            (Some(n), None) => tx.execute(
                "UPDATE tags SET name = ?1 WHERE tag_id = ?2",
                params![n, tag_id],
            )?,
            (None, Some(d)) => tx.execute(
                "UPDATE tags SET description = ?1 WHERE tag_id = ?2",
                params![d, tag_id],
            )?,
            (None, None) => unreachable!(),
        };
    } else {
        // Merge with any existing override so an absent field keeps its
        // current value rather than being cleared.
        let existing: Option<(Option<String>, Option<String>)> = tx
            .query_row(
                "SELECT name, description FROM tag_overrides
                 WHERE tag_id = ?1 AND lang = ?2",
                params![tag_id, lang],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let (cur_name, cur_description) = existing.unwrap_or((None, None));

        tx.execute(
            "INSERT OR REPLACE INTO tag_overrides (tag_id, lang, name, description)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                tag_id,
                lang,
                name.map(String::from).or(cur_name),
                description.map(String::from).or(cur_description),
            ],
        )?;
    }

    tx.commit()?;
    Ok(UpdateOutcome::Updated)
}

/// List all tags with name/description resolved through the `lang`
/// override when one exists.
pub fn get_tags(conn: &Connection, lang: &str, extended: bool) -> Result<Vec<TagView>> {
    let mut stmt = conn.prepare(
        "SELECT t.tag_id, COALESCE(o.name, t.name), t.used,
                t.lang, COALESCE(o.description, t.description),
                t.name, t.description
         FROM tags AS t
         LEFT JOIN tag_overrides AS o ON o.tag_id = t.tag_id AND o.lang = ?1
         ORDER BY t.tag_id",
    )?;

    let rows = stmt.query_map(params![lang], |row| {
        Ok(TagView {
            id: row.get(0)?,
            name: row.get(1)?,
            used: row.get(2)?,
            extended: if extended {
                Some(TagViewExtended {
                    lang: row.get(3)?,
                    description: row.get(4)?,
                    original_name: row.get(5)?,
                    original_description: row.get(6)?,
                })
            } else {
                None
            },
        })
    })?;

    let mut tags = Vec::new();
    for tag in rows {
        tags.push(tag?);
    }
    Ok(tags)
}

/// Details for one tag: localized description, usage count and up to 3
/// example filenames, sampled uniformly when more images carry the tag.
pub fn tag_info(conn: &Connection, tag_id: i64, lang: &str) -> Result<TagInfo> {
    let found: Option<(Option<String>, i64)> = conn
        .query_row(
            "SELECT COALESCE(o.description, t.description), t.used
             FROM tags AS t
             LEFT JOIN tag_overrides AS o ON o.tag_id = t.tag_id AND o.lang = ?1
             WHERE t.tag_id = ?2",
            params![lang, tag_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let (description, used) = found.ok_or_else(|| AppError::not_found("unknown_tag"))?;

    let mut stmt = conn.prepare("SELECT image_id FROM tagged_images WHERE tag_id = ?1")?;
    let mut image_ids = Vec::new();
    for id in stmt.query_map(params![tag_id], |row| row.get::<_, i64>(0))? {
        image_ids.push(id?);
    }

    if image_ids.len() > 3 {
        use rand::seq::SliceRandom;
        let mut rng = rand::thread_rng();
        image_ids.shuffle(&mut rng);
        image_ids.truncate(3);
    }

    let mut images = Vec::new();
    if !image_ids.is_empty() {
        let sql = format!(
            "SELECT fn FROM images WHERE image_id IN ({})",
            repeat_vars(image_ids.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        for fn_ in stmt.query_map(rusqlite::params_from_iter(&image_ids), |row| {
            row.get::<_, String>(0)
        })? {
            images.push(fn_?);
        }
    }

    Ok(TagInfo {
        description,
        used,
        images,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::assoc;
    use crate::store::test_conn;

    #[test]
    fn add_tag_trims_and_assigns_an_id() {
        let mut conn = test_conn();
        let tag = add_tag(&mut conn, "  sunset  ", Some("  evening sky  "), "en").unwrap();
        assert_eq!(tag.name, "sunset");
        assert_eq!(tag.description.as_deref(), Some("evening sky"));
        assert_eq!(tag.used, 0);
        assert!(tag.id > 0);
    }

    #[test]
    fn add_tag_rejects_blank_names_and_unknown_langs() {
        let mut conn = test_conn();
        assert!(matches!(
            add_tag(&mut conn, "   ", None, "en"),
            Err(AppError::Validation { key: "empty_tag_name" })
        ));
        assert!(matches!(
            add_tag(&mut conn, "sunset", None, "xx"),
            Err(AppError::Validation { key: "unsupported_language" })
        ));
    }

    #[test]
    fn blank_description_becomes_null() {
        let mut conn = test_conn();
        let tag = add_tag(&mut conn, "sunset", Some("  "), "en").unwrap();
        assert_eq!(tag.description, None);
    }

    #[test]
    fn update_with_no_fields_is_a_no_op() {
        let mut conn = test_conn();
        let tag = add_tag(&mut conn, "sunset", None, "en").unwrap();
        let outcome = update_tag(&mut conn, tag.id, "en", None, None).unwrap();
        assert_eq!(outcome, UpdateOutcome::NoChanges);
    }

    #[test]
    fn update_unknown_tag_is_not_found() {
        let mut conn = test_conn();
        assert!(matches!(
            update_tag(&mut conn, 999, "en", Some("x"), None),
            Err(AppError::NotFound { .. })
        ));
    }

    #[test]
    fn update_in_owning_language_touches_the_base_row() {
        let mut conn = test_conn();
        let tag = add_tag(&mut conn, "sunset", Some("sky"), "en").unwrap();
        update_tag(&mut conn, tag.id, "en", Some("dusk"), None).unwrap();

        let views = get_tags(&conn, "en", true).unwrap();
        let ext = views[0].extended.as_ref().unwrap();
        assert_eq!(views[0].name, "dusk");
        assert_eq!(ext.original_name, "dusk");
        // untouched field survives
        assert_eq!(ext.original_description.as_deref(), Some("sky"));
    }

    #[test]
    fn update_in_other_language_lands_in_the_override() {
        let mut conn = test_conn();
        let tag = add_tag(&mut conn, "sunset", Some("sky"), "en").unwrap();
        update_tag(&mut conn, tag.id, "fr", Some("crépuscule"), None).unwrap();
        // A second partial update must not clear the earlier field.
        update_tag(&mut conn, tag.id, "fr", None, Some("ciel du soir")).unwrap();

        let views = get_tags(&conn, "fr", true).unwrap();
        let ext = views[0].extended.as_ref().unwrap();
        assert_eq!(views[0].name, "crépuscule");
        assert_eq!(ext.description.as_deref(), Some("ciel du soir"));
        assert_eq!(ext.original_name, "sunset");
        assert_eq!(ext.lang, "en");
    }

    #[test]
    fn listing_without_override_falls_back_to_base_values() {
        let mut conn = test_conn();
        add_tag(&mut conn, "sunset", Some("sky"), "en").unwrap();

        let views = get_tags(&conn, "fr", true).unwrap();
        let ext = views[0].extended.as_ref().unwrap();
        assert_eq!(views[0].name, ext.original_name);
        assert_eq!(ext.description, ext.original_description);
    }

    #[test]
    fn basic_listing_has_no_extended_fields() {
        let mut conn = test_conn();
        add_tag(&mut conn, "sunset", None, "en").unwrap();
        let views = get_tags(&conn, "en", false).unwrap();
        assert!(views[0].extended.is_none());
    }

    #[test]
    fn tag_info_samples_at_most_three_images() {
        let mut conn = test_conn();
        let tag = add_tag(&mut conn, "sunset", Some("sky"), "en").unwrap();
        for i in 0..5 {
            assoc::toggle_tags(&mut conn, &format!("img{i}.jpg"), &[tag.id]).unwrap();
        }

        let info = tag_info(&conn, tag.id, "en").unwrap();
        assert_eq!(info.used, 5);
        assert_eq!(info.images.len(), 3);
        for fn_ in &info.images {
            assert!(fn_.starts_with("img"));
        }
    }

    #[test]
    fn tag_info_returns_all_images_when_three_or_fewer() {
        let mut conn = test_conn();
        let tag = add_tag(&mut conn, "sunset", None, "en").unwrap();
        assoc::toggle_tags(&mut conn, "a.jpg", &[tag.id]).unwrap();
        assoc::toggle_tags(&mut conn, "b.jpg", &[tag.id]).unwrap();

        let mut info = tag_info(&conn, tag.id, "en").unwrap();
        info.images.sort();
        assert_eq!(info.images, vec!["a.jpg", "b.jpg"]);
    }

    #[test]
    fn tag_info_for_unknown_tag_is_not_found() {
        let conn = test_conn();
        assert!(matches!(
            tag_info(&conn, 42, "en"),
            Err(AppError::NotFound { .. })
        ));
    }
}
