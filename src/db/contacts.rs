use rusqlite::{params, params_from_iter, Row};

use super::*;

const CONTACT_COLUMNS: &str = "id, phone_number, email, linked_id, link_precedence, \
                               created_at, updated_at, deleted_at";

fn map_contact_row(row: &Row<'_>) -> rusqlite::Result<DbContact> {
    Ok(DbContact {
        id: row.get(0)?,
        phone_number: row.get(1)?,
        email: row.get(2)?,
        linked_id: row.get(3)?,
        link_precedence: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
        deleted_at: row.get(7)?,
    })
}

/// `?, ?, ?` with `n` placeholders.
fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

impl ContactDb {
    // =========================================================================
    // Reads
    // =========================================================================

    /// Every live contact whose email equals `email` or whose phone equals
    /// `phone`. A `None` argument never matches anything.
    pub fn find_matches(
        &self,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> Result<Vec<DbContact>, DbError> {
        if email.is_none() && phone.is_none() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {CONTACT_COLUMNS} FROM contacts
             WHERE deleted_at IS NULL
               AND ((?1 IS NOT NULL AND email = ?1) OR (?2 IS NOT NULL AND phone_number = ?2))
             ORDER BY created_at ASC, id ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![email, phone], map_contact_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Look up a live contact by id.
    pub fn get_contact(&self, id: i64) -> Result<Option<DbContact>, DbError> {
        let sql = format!(
            "SELECT {CONTACT_COLUMNS} FROM contacts WHERE id = ?1 AND deleted_at IS NULL"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query_map(params![id], map_contact_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// All live members of the clusters rooted at `root_ids`: the roots
    /// themselves plus every row linked to one of them. Oldest first, with
    /// `id` breaking creation-time ties.
    pub fn get_cluster(&self, root_ids: &[i64]) -> Result<Vec<DbContact>, DbError> {
        if root_ids.is_empty() {
            return Ok(Vec::new());
        }
        let p = placeholders(root_ids.len());
        let sql = format!(
            "SELECT {CONTACT_COLUMNS} FROM contacts
             WHERE deleted_at IS NULL
               AND (id IN ({p}) OR linked_id IN ({p}))
             ORDER BY created_at ASC, id ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params_from_iter(root_ids.iter().chain(root_ids.iter())),
            map_contact_row,
        )?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// The primary `primary_id` and every live row linked to it.
    pub fn get_all_in_cluster(&self, primary_id: i64) -> Result<Vec<DbContact>, DbError> {
        self.get_cluster(&[primary_id])
    }

    /// Number of live contacts.
    pub fn count_contacts(&self) -> Result<i64, DbError> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM contacts WHERE deleted_at IS NULL",
            [],
            |row| row.get(0),
        )?)
    }

    /// Number of live rows whose `linked_id` is one of `ids`.
    pub fn count_links_to(&self, ids: &[i64]) -> Result<i64, DbError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "SELECT COUNT(*) FROM contacts
             WHERE deleted_at IS NULL AND linked_id IN ({})",
            placeholders(ids.len())
        );
        Ok(self
            .conn
            .query_row(&sql, params_from_iter(ids.iter()), |row| row.get(0))?)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Insert a contact and return its generated id.
    pub fn insert_contact(&self, contact: &NewContact) -> Result<i64, DbError> {
        self.conn.execute(
            "INSERT INTO contacts (
                email, phone_number, linked_id, link_precedence, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![
                contact.email,
                contact.phone_number,
                contact.linked_id,
                contact.link_precedence,
                contact.created_at,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Turn primary `id` into a secondary of `true_primary_id`.
    /// Returns the number of rows changed (0 if `id` was not a live primary).
    pub fn demote_primary(
        &self,
        id: i64,
        true_primary_id: i64,
        now: &str,
    ) -> Result<usize, DbError> {
        Ok(self.conn.execute(
            "UPDATE contacts
             SET link_precedence = 'secondary',
                 linked_id       = ?1,
                 updated_at      = ?2
             WHERE id = ?3
               AND link_precedence = 'primary'
               AND deleted_at IS NULL",
            params![true_primary_id, now, id],
        )?)
    }

    /// Point every live row linked to `from_primary_id` at `to_primary_id`.
    /// Returns the number of rows relinked.
    pub fn relink_secondaries(
        &self,
        from_primary_id: i64,
        to_primary_id: i64,
        now: &str,
    ) -> Result<usize, DbError> {
        Ok(self.conn.execute(
            "UPDATE contacts
             SET linked_id  = ?1,
                 updated_at = ?2
             WHERE linked_id = ?3
               AND deleted_at IS NULL",
            params![to_primary_id, now, from_primary_id],
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_utils::{seed_primary, seed_secondary, test_db};
    use super::*;

    const T1: &str = "2025-01-01T00:00:00.000000Z";
    const T2: &str = "2025-01-02T00:00:00.000000Z";
    const T3: &str = "2025-01-03T00:00:00.000000Z";

    #[test]
    fn test_insert_and_get_contact() {
        let db = test_db();
        let id = seed_primary(&db, Some("a@x.com"), Some("111"), T1);
        let contact = db.get_contact(id).unwrap().expect("contact exists");
        assert_eq!(contact.email.as_deref(), Some("a@x.com"));
        assert_eq!(contact.phone_number.as_deref(), Some("111"));
        assert!(contact.is_primary());
        assert_eq!(contact.linked_id, None);
        assert_eq!(contact.created_at, T1);
        assert_eq!(contact.updated_at, T1);
        assert_eq!(contact.root_id(), Some(id));
    }

    #[test]
    fn test_find_matches_by_email_or_phone() {
        let db = test_db();
        let a = seed_primary(&db, Some("a@x.com"), Some("111"), T1);
        let b = seed_primary(&db, Some("b@x.com"), Some("222"), T2);
        let _c = seed_primary(&db, Some("c@x.com"), Some("333"), T3);

        let ids: Vec<i64> = db
            .find_matches(Some("a@x.com"), Some("222"))
            .unwrap()
            .iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec![a, b]);
    }

    #[test]
    fn test_find_matches_null_field_never_matches() {
        let db = test_db();
        seed_primary(&db, Some("a@x.com"), None, T1);
        seed_primary(&db, None, Some("111"), T2);

        let by_email = db.find_matches(Some("a@x.com"), None).unwrap();
        assert_eq!(by_email.len(), 1, "null phone must not match rows without a phone");

        assert!(db.find_matches(None, None).unwrap().is_empty());
    }

    #[test]
    fn test_find_matches_skips_soft_deleted() {
        let db = test_db();
        let id = seed_primary(&db, Some("a@x.com"), None, T1);
        db.conn_ref()
            .execute(
                "UPDATE contacts SET deleted_at = ?1 WHERE id = ?2",
                params![T2, id],
            )
            .unwrap();
        assert!(db.find_matches(Some("a@x.com"), None).unwrap().is_empty());
        assert!(db.get_contact(id).unwrap().is_none());
    }

    #[test]
    fn test_get_cluster_orders_by_created_then_id() {
        let db = test_db();
        let p = seed_primary(&db, Some("a@x.com"), None, T2);
        let s1 = seed_secondary(&db, None, Some("111"), p, T3);
        let s2 = seed_secondary(&db, None, Some("222"), p, T2);
        let other = seed_primary(&db, Some("z@x.com"), None, T1);

        let ids: Vec<i64> = db.get_all_in_cluster(p).unwrap().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![p, s2, s1]);

        let both: Vec<i64> = db.get_cluster(&[p, other]).unwrap().iter().map(|c| c.id).collect();
        assert_eq!(both, vec![other, p, s2, s1]);

        assert!(db.get_cluster(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_demote_and_relink() {
        let db = test_db();
        let keep = seed_primary(&db, Some("a@x.com"), None, T1);
        let gone = seed_primary(&db, Some("b@x.com"), None, T2);
        let child = seed_secondary(&db, None, Some("222"), gone, T3);

        assert_eq!(db.demote_primary(gone, keep, T3).unwrap(), 1);
        assert_eq!(db.relink_secondaries(gone, keep, T3).unwrap(), 1);

        let demoted = db.get_contact(gone).unwrap().unwrap();
        assert_eq!(demoted.link_precedence, LinkPrecedence::Secondary);
        assert_eq!(demoted.linked_id, Some(keep));
        assert_eq!(demoted.updated_at, T3);
        assert_eq!(demoted.created_at, T2, "createdAt never changes");

        let relinked = db.get_contact(child).unwrap().unwrap();
        assert_eq!(relinked.linked_id, Some(keep));

        assert_eq!(db.count_links_to(&[gone]).unwrap(), 0);
        assert_eq!(db.count_links_to(&[keep]).unwrap(), 2);
    }

    #[test]
    fn test_demote_ignores_secondaries() {
        let db = test_db();
        let p = seed_primary(&db, Some("a@x.com"), None, T1);
        let s = seed_secondary(&db, None, Some("1"), p, T2);
        assert_eq!(db.demote_primary(s, p, T3).unwrap(), 0);
    }

    #[test]
    fn test_count_links_to_empty_ids() {
        let db = test_db();
        let p = seed_primary(&db, Some("a@x.com"), None, T1);
        seed_secondary(&db, None, Some("1"), p, T2);
        assert_eq!(db.count_links_to(&[]).unwrap(), 0);
        assert_eq!(db.count_links_to(&[p]).unwrap(), 1);
    }
}
