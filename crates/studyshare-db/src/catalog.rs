use crate::Database;
use crate::models::{MaterialRow, NewMaterial};
use crate::queries::{OptionalExt, like_pattern, parse_column};
use anyhow::Result;
use rusqlite::Row;
use rusqlite::types::Value;
use studyshare_types::models::{BreakdownRow, MaterialFilter, MaterialStats, Role, Visibility};

const MATERIAL_COLUMNS: &str = "id, title, subject, semester, uploaded_by, user_id, uploader_role, visibility, group_id, \
     file_path, file_name, file_type, file_size, upload_timestamp, downloads_count, is_verified";

impl Database {
    pub fn insert_material(&self, m: &NewMaterial<'_>) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO materials
                    (title, subject, semester, uploaded_by, user_id, uploader_role, visibility, group_id,
                     file_path, file_name, file_type, file_size, is_verified)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                rusqlite::params![
                    m.title,
                    m.subject,
                    m.semester,
                    m.uploaded_by,
                    m.user_id,
                    m.uploader_role.as_str(),
                    m.visibility.as_str(),
                    m.group_id,
                    m.file_path,
                    m.file_name,
                    m.file_type,
                    m.file_size,
                    m.is_verified,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_material(&self, id: i64) -> Result<Option<MaterialRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("SELECT {MATERIAL_COLUMNS} FROM materials WHERE id = ?1"))?;
            let row = stmt.query_row([id], map_material).optional()?;
            Ok(row)
        })
    }

    /// Public catalog: every filter is optional and they combine with AND.
    /// Newest uploads first; `limit` truncates from the head.
    pub fn list_public_materials(&self, filter: &MaterialFilter) -> Result<Vec<MaterialRow>> {
        let mut sql = format!("SELECT {MATERIAL_COLUMNS} FROM materials WHERE visibility = 'public'");
        let mut params: Vec<Value> = Vec::new();

        if let Some(subject) = &filter.subject {
            sql.push_str(" AND subject = ?");
            params.push(Value::Text(subject.clone()));
        }
        if let Some(semester) = &filter.semester {
            sql.push_str(" AND semester = ?");
            params.push(Value::Text(semester.clone()));
        }
        if let Some(role) = filter.uploader_role {
            sql.push_str(" AND uploader_role = ?");
            params.push(Value::Text(role.as_str().to_string()));
        }
        if let Some(verified) = filter.is_verified {
            sql.push_str(" AND is_verified = ?");
            params.push(Value::Integer(verified as i64));
        }
        if let Some(search) = &filter.search {
            // Each token must appear somewhere in title, subject or uploader name.
            for token in search_tokens(search) {
                sql.push_str(
                    " AND (title || ' ' || subject || ' ' || uploaded_by) LIKE ? ESCAPE '\\'",
                );
                params.push(Value::Text(like_pattern(&token)));
            }
        }

        sql.push_str(" ORDER BY upload_timestamp DESC, id DESC");

        if let Some(limit) = filter.limit {
            sql.push_str(" LIMIT ?");
            params.push(Value::Integer(limit as i64));
        }

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(params.iter()), map_material)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn list_group_materials(&self, group_id: i64) -> Result<Vec<MaterialRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MATERIAL_COLUMNS} FROM materials
                 WHERE visibility = 'group' AND group_id = ?1
                 ORDER BY upload_timestamp DESC, id DESC"
            ))?;
            let rows = stmt
                .query_map([group_id], map_material)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Public materials ordered by download count.
    pub fn trending_materials(&self, limit: u32) -> Result<Vec<MaterialRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MATERIAL_COLUMNS} FROM materials
                 WHERE visibility = 'public'
                 ORDER BY downloads_count DESC, id DESC
                 LIMIT ?1"
            ))?;
            let rows = stmt
                .query_map([limit], map_material)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn count_group_materials(&self, group_id: i64) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM materials WHERE group_id = ?1",
                [group_id],
                |r| r.get(0),
            )?)
        })
    }

    /// Single-statement increment, safe against lost updates.
    pub fn increment_downloads(&self, id: i64) -> Result<usize> {
        self.with_conn_mut(|conn| {
            Ok(conn.execute(
                "UPDATE materials SET downloads_count = downloads_count + 1 WHERE id = ?1",
                [id],
            )?)
        })
    }

    pub fn delete_material(&self, id: i64) -> Result<usize> {
        self.with_conn_mut(|conn| Ok(conn.execute("DELETE FROM materials WHERE id = ?1", [id])?))
    }

    pub fn material_stats(&self) -> Result<MaterialStats> {
        self.with_conn(|conn| {
            let mut stats = conn.query_row(
                "SELECT
                    COUNT(*),
                    COALESCE(SUM(downloads_count), 0),
                    COUNT(DISTINCT subject),
                    COALESCE(SUM(CASE WHEN is_verified = 1 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN uploader_role = 'teacher' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN uploader_role = 'student' THEN 1 ELSE 0 END), 0)
                 FROM materials",
                [],
                |row| {
                    Ok(MaterialStats {
                        total_materials: row.get(0)?,
                        total_downloads: row.get(1)?,
                        total_subjects: row.get(2)?,
                        verified_materials: row.get(3)?,
                        teacher_materials: row.get(4)?,
                        student_materials: row.get(5)?,
                        ..Default::default()
                    })
                },
            )?;

            let breakdown = |sql: &str| -> Result<Vec<BreakdownRow>> {
                let mut stmt = conn.prepare(sql)?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok(BreakdownRow {
                            key: row.get(0)?,
                            material_count: row.get(1)?,
                            total_downloads: row.get(2)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            };

            stats.by_subject = breakdown(
                "SELECT subject, COUNT(*), COALESCE(SUM(downloads_count), 0)
                 FROM materials WHERE visibility = 'public'
                 GROUP BY subject ORDER BY COUNT(*) DESC, subject ASC",
            )?;
            stats.by_semester = breakdown(
                "SELECT semester, COUNT(*), COALESCE(SUM(downloads_count), 0)
                 FROM materials WHERE visibility = 'public'
                 GROUP BY semester ORDER BY semester ASC",
            )?;

            Ok(stats)
        })
    }
}

/// Whitespace-separated search tokens. LIKE folds ASCII case only, so
/// non-ASCII letters must match the stored case.
fn search_tokens(search: &str) -> Vec<String> {
    search.split_whitespace().map(str::to_string).collect()
}

fn map_material(row: &Row<'_>) -> rusqlite::Result<MaterialRow> {
    Ok(MaterialRow {
        id: row.get(0)?,
        title: row.get(1)?,
        subject: row.get(2)?,
        semester: row.get(3)?,
        uploaded_by: row.get(4)?,
        user_id: row.get(5)?,
        uploader_role: parse_column::<Role>(row, 6)?,
        visibility: parse_column::<Visibility>(row, 7)?,
        group_id: row.get(8)?,
        file_path: row.get(9)?,
        file_name: row.get(10)?,
        file_type: row.get(11)?,
        file_size: row.get(12)?,
        upload_timestamp: row.get(13)?,
        downloads_count: row.get(14)?,
        is_verified: row.get(15)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::is_foreign_key_violation;

    fn material<'a>(title: &'a str, subject: &'a str, role: Role) -> NewMaterial<'a> {
        NewMaterial {
            title,
            subject,
            semester: "3",
            uploaded_by: "Alice",
            user_id: 1,
            uploader_role: role,
            visibility: Visibility::Public,
            group_id: None,
            file_path: "stored.pdf",
            file_name: "notes.pdf",
            file_type: "application/pdf",
            file_size: 1024,
            is_verified: role == Role::Teacher,
        }
    }

    fn titles(rows: &[MaterialRow]) -> Vec<&str> {
        rows.iter().map(|r| r.title.as_str()).collect()
    }

    #[test]
    fn search_requires_every_token() {
        let db = Database::open_in_memory().unwrap();
        db.insert_material(&material("Data Structures Notes", "CS", Role::Student)).unwrap();
        db.insert_material(&material("Data Networks", "CS", Role::Student)).unwrap();

        let found = db
            .list_public_materials(&MaterialFilter {
                search: Some("data structures".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(titles(&found), vec!["Data Structures Notes"]);
    }

    #[test]
    fn search_tokens_match_across_fields_case_insensitively() {
        let db = Database::open_in_memory().unwrap();
        db.insert_material(&material("Lecture 4", "Operating Systems", Role::Teacher)).unwrap();

        let found = db
            .list_public_materials(&MaterialFilter {
                search: Some("ALICE lecture systems".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn non_ascii_tokens_match_stored_text() {
        let db = Database::open_in_memory().unwrap();
        db.insert_material(&material("Übungen Analysis", "Mathematik", Role::Teacher)).unwrap();

        let found = db
            .list_public_materials(&MaterialFilter {
                search: Some("Übungen ANALYSIS".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(titles(&found), vec!["Übungen Analysis"]);
    }

    #[test]
    fn filters_combine_and_newest_comes_first() {
        let db = Database::open_in_memory().unwrap();
        db.insert_material(&material("Old Math", "Math", Role::Teacher)).unwrap();
        db.insert_material(&material("Physics", "Physics", Role::Teacher)).unwrap();
        db.insert_material(&material("New Math", "Math", Role::Student)).unwrap();

        let math = db
            .list_public_materials(&MaterialFilter {
                subject: Some("Math".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(titles(&math), vec!["New Math", "Old Math"]);

        let verified_math = db
            .list_public_materials(&MaterialFilter {
                subject: Some("Math".into()),
                is_verified: Some(true),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(titles(&verified_math), vec!["Old Math"]);

        let student = db
            .list_public_materials(&MaterialFilter {
                uploader_role: Some(Role::Student),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(titles(&student), vec!["New Math"]);

        let head = db
            .list_public_materials(&MaterialFilter {
                limit: Some(2),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(titles(&head), vec!["New Math", "Physics"]);
    }

    #[test]
    fn subject_filter_is_exact() {
        let db = Database::open_in_memory().unwrap();
        db.insert_material(&material("Notes", "Mathematics", Role::Student)).unwrap();

        let found = db
            .list_public_materials(&MaterialFilter {
                subject: Some("Math".into()),
                ..Default::default()
            })
            .unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn group_materials_stay_out_of_public_catalog() {
        let db = Database::open_in_memory().unwrap();
        let group = db.create_group("Study Circle", None).unwrap();

        let mut m = material("Circle Notes", "CS", Role::Student);
        m.visibility = Visibility::Group;
        m.group_id = Some(group.id);
        db.insert_material(&m).unwrap();
        db.insert_material(&material("Public Notes", "CS", Role::Student)).unwrap();

        let public = db.list_public_materials(&MaterialFilter::default()).unwrap();
        assert_eq!(titles(&public), vec!["Public Notes"]);

        let scoped = db.list_group_materials(group.id).unwrap();
        assert_eq!(titles(&scoped), vec!["Circle Notes"]);
        assert_eq!(db.count_group_materials(group.id).unwrap(), 1);
    }

    #[test]
    fn group_with_materials_cannot_be_deleted() {
        let db = Database::open_in_memory().unwrap();
        let group = db.create_group("Locked", None).unwrap();
        let mut m = material("Pinned", "CS", Role::Student);
        m.visibility = Visibility::Group;
        m.group_id = Some(group.id);
        db.insert_material(&m).unwrap();

        let err = db.delete_group(group.id).unwrap_err();
        assert!(is_foreign_key_violation(&err));
    }

    #[test]
    fn material_for_missing_group_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        let mut m = material("Ghost", "CS", Role::Student);
        m.visibility = Visibility::Group;
        m.group_id = Some(42);

        let err = db.insert_material(&m).unwrap_err();
        assert!(is_foreign_key_violation(&err));
    }

    #[test]
    fn downloads_increment_by_one_per_call() {
        let db = Database::open_in_memory().unwrap();
        let id = db.insert_material(&material("Counted", "CS", Role::Student)).unwrap();

        for _ in 0..5 {
            assert_eq!(db.increment_downloads(id).unwrap(), 1);
        }
        assert_eq!(db.get_material(id).unwrap().unwrap().downloads_count, 5);
        assert_eq!(db.increment_downloads(id + 100).unwrap(), 0);
    }

    #[test]
    fn trending_orders_by_downloads() {
        let db = Database::open_in_memory().unwrap();
        let quiet = db.insert_material(&material("Quiet", "CS", Role::Student)).unwrap();
        let popular = db.insert_material(&material("Popular", "CS", Role::Student)).unwrap();
        db.increment_downloads(quiet).unwrap();
        for _ in 0..3 {
            db.increment_downloads(popular).unwrap();
        }

        let trending = db.trending_materials(10).unwrap();
        assert_eq!(titles(&trending), vec!["Popular", "Quiet"]);
    }

    #[test]
    fn stats_summarise_catalog() {
        let db = Database::open_in_memory().unwrap();
        let a = db.insert_material(&material("A", "Math", Role::Teacher)).unwrap();
        db.insert_material(&material("B", "Math", Role::Student)).unwrap();
        db.insert_material(&material("C", "Physics", Role::Student)).unwrap();
        db.increment_downloads(a).unwrap();

        let stats = db.material_stats().unwrap();
        assert_eq!(stats.total_materials, 3);
        assert_eq!(stats.total_downloads, 1);
        assert_eq!(stats.total_subjects, 2);
        assert_eq!(stats.verified_materials, 1);
        assert_eq!(stats.teacher_materials, 1);
        assert_eq!(stats.student_materials, 2);
        assert_eq!(stats.by_subject[0].key, "Math");
        assert_eq!(stats.by_subject[0].material_count, 2);
        assert_eq!(stats.by_semester.len(), 1);
    }

    #[test]
    fn delete_removes_row() {
        let db = Database::open_in_memory().unwrap();
        let id = db.insert_material(&material("Gone", "CS", Role::Student)).unwrap();
        assert_eq!(db.delete_material(id).unwrap(), 1);
        assert!(db.get_material(id).unwrap().is_none());
    }
}
