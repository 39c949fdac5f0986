use std::str::FromStr;

use crate::Database;
use crate::models::{GroupMemberRow, GroupRow, NewUser, ProfileUpdate, SubjectRow, UserRow};
use anyhow::Result;
use rusqlite::types::Value;
use rusqlite::{Connection, Row};
use studyshare_types::models::{Role, UserFilter, UserStats};

const USER_COLUMNS: &str = "id, name, email, password, role, department, semester, phone, is_active, created_at, last_login";

impl Database {
    // -- Users --

    pub fn create_user(&self, user: &NewUser<'_>) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (name, email, password, role, department, semester, phone)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    user.name,
                    user.email,
                    user.password_hash,
                    user.role.as_str(),
                    user.department,
                    user.semester,
                    user.phone,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email = ?1", &email))
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id = ?1", &id))
    }

    pub fn list_users(&self, filter: &UserFilter) -> Result<Vec<UserRow>> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut params: Vec<Value> = Vec::new();

        if let Some(role) = filter.role {
            clauses.push("role = ?");
            params.push(Value::Text(role.as_str().to_string()));
        }
        if let Some(department) = &filter.department {
            clauses.push("department = ?");
            params.push(Value::Text(department.clone()));
        }
        if let Some(semester) = &filter.semester {
            clauses.push("semester = ?");
            params.push(Value::Text(semester.clone()));
        }
        if let Some(active) = filter.is_active {
            clauses.push("is_active = ?");
            params.push(Value::Integer(active as i64));
        }

        let mut sql = format!("SELECT {USER_COLUMNS} FROM users");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY created_at DESC, id DESC");
        if let Some(limit) = filter.limit {
            sql.push_str(" LIMIT ?");
            params.push(Value::Integer(limit as i64));
        }

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(params.iter()), map_user)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Active users whose name, email or department contains `term`.
    pub fn search_users(&self, term: &str) -> Result<Vec<UserRow>> {
        let pattern = like_pattern(term);
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {USER_COLUMNS} FROM users
                 WHERE is_active = 1 AND (
                    name LIKE ?1 ESCAPE '\\' OR
                    email LIKE ?1 ESCAPE '\\' OR
                    department LIKE ?1 ESCAPE '\\'
                 )
                 ORDER BY name ASC
                 LIMIT 20"
            ))?;
            let rows = stmt
                .query_map([&pattern], map_user)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Returns the number of rows touched (0 when the user does not exist).
    pub fn update_profile(&self, id: i64, update: &ProfileUpdate<'_>) -> Result<usize> {
        if update.is_empty() {
            return Ok(0);
        }

        let mut fields: Vec<&str> = Vec::new();
        let mut params: Vec<Value> = Vec::new();
        for (column, value) in [
            ("name = ?", update.name),
            ("department = ?", update.department),
            ("semester = ?", update.semester),
            ("phone = ?", update.phone),
        ] {
            if let Some(value) = value {
                fields.push(column);
                params.push(Value::Text(value.to_string()));
            }
        }
        params.push(Value::Integer(id));

        let sql = format!("UPDATE users SET {} WHERE id = ?", fields.join(", "));
        self.with_conn_mut(|conn| Ok(conn.execute(&sql, rusqlite::params_from_iter(params.iter()))?))
    }

    pub fn update_password(&self, id: i64, password_hash: &str) -> Result<usize> {
        self.with_conn_mut(|conn| {
            Ok(conn.execute(
                "UPDATE users SET password = ?1 WHERE id = ?2",
                rusqlite::params![password_hash, id],
            )?)
        })
    }

    pub fn touch_last_login(&self, id: i64) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute("UPDATE users SET last_login = datetime('now') WHERE id = ?1", [id])?;
            Ok(())
        })
    }

    pub fn set_user_active(&self, id: i64, active: bool) -> Result<usize> {
        self.with_conn_mut(|conn| {
            Ok(conn.execute(
                "UPDATE users SET is_active = ?1 WHERE id = ?2",
                rusqlite::params![active, id],
            )?)
        })
    }

    /// Startup seeding path: admin role, active, fresh password.
    pub fn promote_to_admin(&self, id: i64, password_hash: &str) -> Result<usize> {
        self.with_conn_mut(|conn| {
            Ok(conn.execute(
                "UPDATE users SET role = 'admin', is_active = 1, password = ?1 WHERE id = ?2",
                rusqlite::params![password_hash, id],
            )?)
        })
    }

    pub fn delete_user(&self, id: i64) -> Result<usize> {
        self.with_conn_mut(|conn| Ok(conn.execute("DELETE FROM users WHERE id = ?1", [id])?))
    }

    pub fn user_stats(&self) -> Result<UserStats> {
        self.with_conn(|conn| {
            let stats = conn.query_row(
                "SELECT
                    COUNT(*),
                    COALESCE(SUM(CASE WHEN role = 'student' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN role = 'teacher' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN role = 'admin' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN is_active = 1 THEN 1 ELSE 0 END), 0)
                 FROM users",
                [],
                |row| {
                    Ok(UserStats {
                        total_users: row.get(0)?,
                        total_students: row.get(1)?,
                        total_teachers: row.get(2)?,
                        total_admins: row.get(3)?,
                        active_users: row.get(4)?,
                    })
                },
            )?;
            Ok(stats)
        })
    }

    // -- Groups --

    pub fn create_group(&self, name: &str, description: Option<&str>) -> Result<GroupRow> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO groups (name, description) VALUES (?1, ?2)",
                rusqlite::params![name, description],
            )?;
            let id = conn.last_insert_rowid();
            query_group(conn, id)?.ok_or_else(|| anyhow::anyhow!("Group {} vanished after insert", id))
        })
    }

    pub fn list_groups(&self) -> Result<Vec<GroupRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, description, created_at FROM groups ORDER BY created_at DESC, id DESC",
            )?;
            let rows = stmt
                .query_map([], map_group)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_group(&self, id: i64) -> Result<Option<GroupRow>> {
        self.with_conn(|conn| query_group(conn, id))
    }

    /// Deletes the group and (by cascade) its roster. Materials still
    /// pointing at the group make this fail with a foreign key violation.
    pub fn delete_group(&self, id: i64) -> Result<usize> {
        self.with_conn_mut(|conn| Ok(conn.execute("DELETE FROM groups WHERE id = ?1", [id])?))
    }

    pub fn add_group_member(&self, group_id: i64, member_name: &str) -> Result<GroupMemberRow> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO group_members (group_id, member_name) VALUES (?1, ?2)",
                rusqlite::params![group_id, member_name],
            )?;
            let id = conn.last_insert_rowid();
            let row = conn.query_row(
                "SELECT id, group_id, member_name, joined_at FROM group_members WHERE id = ?1",
                [id],
                map_member,
            )?;
            Ok(row)
        })
    }

    pub fn list_group_members(&self, group_id: i64) -> Result<Vec<GroupMemberRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, group_id, member_name, joined_at FROM group_members
                 WHERE group_id = ?1
                 ORDER BY joined_at DESC, id DESC",
            )?;
            let rows = stmt
                .query_map([group_id], map_member)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Subjects --

    pub fn create_subject(
        &self,
        name: &str,
        department: Option<&str>,
        semester: Option<&str>,
    ) -> Result<SubjectRow> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO subjects (name, department, semester) VALUES (?1, ?2, ?3)",
                rusqlite::params![name, department, semester],
            )?;
            Ok(SubjectRow {
                id: conn.last_insert_rowid(),
                name: name.to_string(),
                department: department.map(str::to_string),
                semester: semester.map(str::to_string),
            })
        })
    }

    pub fn list_subjects(&self) -> Result<Vec<SubjectRow>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, name, department, semester FROM subjects ORDER BY name ASC")?;
            let rows = stmt
                .query_map([], map_subject)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn subjects_by_semester(&self, semester: &str) -> Result<Vec<SubjectRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, department, semester FROM subjects WHERE semester = ?1 ORDER BY name ASC",
            )?;
            let rows = stmt
                .query_map([semester], map_subject)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn subject_names(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT DISTINCT name FROM subjects ORDER BY name ASC")?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(names)
        })
    }
}

fn query_user(conn: &Connection, predicate: &str, param: &dyn rusqlite::ToSql) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users WHERE {predicate}"))?;
    let row = stmt.query_row([param], map_user).optional()?;
    Ok(row)
}

fn query_group(conn: &Connection, id: i64) -> Result<Option<GroupRow>> {
    let mut stmt = conn.prepare("SELECT id, name, description, created_at FROM groups WHERE id = ?1")?;
    let row = stmt.query_row([id], map_group).optional()?;
    Ok(row)
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        role: parse_column::<Role>(row, 4)?,
        department: row.get(5)?,
        semester: row.get(6)?,
        phone: row.get(7)?,
        is_active: row.get(8)?,
        created_at: row.get(9)?,
        last_login: row.get(10)?,
    })
}

fn map_group(row: &Row<'_>) -> rusqlite::Result<GroupRow> {
    Ok(GroupRow {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn map_member(row: &Row<'_>) -> rusqlite::Result<GroupMemberRow> {
    Ok(GroupMemberRow {
        id: row.get(0)?,
        group_id: row.get(1)?,
        member_name: row.get(2)?,
        joined_at: row.get(3)?,
    })
}

fn map_subject(row: &Row<'_>) -> rusqlite::Result<SubjectRow> {
    Ok(SubjectRow {
        id: row.get(0)?,
        name: row.get(1)?,
        department: row.get(2)?,
        semester: row.get(3)?,
    })
}

/// Reads a TEXT column into one of the string-backed enums.
pub(crate) fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// `%term%` with LIKE wildcards in `term` escaped (pair with `ESCAPE '\'`).
pub(crate) fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::is_unique_violation;

    fn new_user<'a>(email: &'a str, role: Role) -> NewUser<'a> {
        NewUser {
            name: "Test User",
            email,
            password_hash: "hash",
            role,
            department: Some("Computer Science"),
            semester: Some("3"),
            phone: None,
        }
    }

    #[test]
    fn duplicate_email_is_a_unique_violation() {
        let db = Database::open_in_memory().unwrap();
        db.create_user(&new_user("a@x.com", Role::Student)).unwrap();

        let err = db.create_user(&new_user("a@x.com", Role::Teacher)).unwrap_err();
        assert!(is_unique_violation(&err));

        let first = db.get_user_by_email("a@x.com").unwrap().unwrap();
        assert_eq!(first.role, Role::Student);
    }

    #[test]
    fn new_users_are_active_without_last_login() {
        let db = Database::open_in_memory().unwrap();
        let id = db.create_user(&new_user("b@x.com", Role::Teacher)).unwrap();

        let user = db.get_user_by_id(id).unwrap().unwrap();
        assert!(user.is_active);
        assert!(user.last_login.is_none());

        db.touch_last_login(id).unwrap();
        assert!(db.get_user_by_id(id).unwrap().unwrap().last_login.is_some());
    }

    #[test]
    fn list_users_applies_filters() {
        let db = Database::open_in_memory().unwrap();
        let s = db.create_user(&new_user("s@x.com", Role::Student)).unwrap();
        db.create_user(&new_user("t@x.com", Role::Teacher)).unwrap();
        db.set_user_active(s, false).unwrap();

        let students = db
            .list_users(&UserFilter {
                role: Some(Role::Student),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(students.len(), 1);

        let active = db
            .list_users(&UserFilter {
                is_active: Some(true),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].email, "t@x.com");

        let limited = db
            .list_users(&UserFilter {
                limit: Some(1),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn search_users_skips_inactive_and_escapes_wildcards() {
        let db = Database::open_in_memory().unwrap();
        let id = db.create_user(&new_user("hidden@x.com", Role::Student)).unwrap();
        db.create_user(&new_user("shown@x.com", Role::Student)).unwrap();
        db.set_user_active(id, false).unwrap();

        let found = db.search_users("x.com").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].email, "shown@x.com");

        assert!(db.search_users("%").unwrap().is_empty());
    }

    #[test]
    fn profile_update_touches_only_given_fields() {
        let db = Database::open_in_memory().unwrap();
        let id = db.create_user(&new_user("p@x.com", Role::Student)).unwrap();

        let changed = db
            .update_profile(
                id,
                &ProfileUpdate {
                    phone: Some("555-0100"),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(changed, 1);

        let user = db.get_user_by_id(id).unwrap().unwrap();
        assert_eq!(user.phone.as_deref(), Some("555-0100"));
        assert_eq!(user.department.as_deref(), Some("Computer Science"));

        assert_eq!(db.update_profile(9999, &ProfileUpdate { name: Some("x"), ..Default::default() }).unwrap(), 0);
    }

    #[test]
    fn user_stats_count_roles() {
        let db = Database::open_in_memory().unwrap();
        db.create_user(&new_user("1@x.com", Role::Student)).unwrap();
        db.create_user(&new_user("2@x.com", Role::Student)).unwrap();
        let t = db.create_user(&new_user("3@x.com", Role::Teacher)).unwrap();
        db.create_user(&new_user("4@x.com", Role::Admin)).unwrap();
        db.set_user_active(t, false).unwrap();

        let stats = db.user_stats().unwrap();
        assert_eq!(stats.total_users, 4);
        assert_eq!(stats.total_students, 2);
        assert_eq!(stats.total_teachers, 1);
        assert_eq!(stats.total_admins, 1);
        assert_eq!(stats.active_users, 3);
    }

    #[test]
    fn group_names_are_unique_and_members_cascade() {
        let db = Database::open_in_memory().unwrap();
        let group = db.create_group("Algorithms", Some("weekly study")).unwrap();
        let err = db.create_group("Algorithms", None).unwrap_err();
        assert!(is_unique_violation(&err));

        db.add_group_member(group.id, "alice").unwrap();
        db.add_group_member(group.id, "alice").unwrap();
        assert_eq!(db.list_group_members(group.id).unwrap().len(), 2);

        assert_eq!(db.delete_group(group.id).unwrap(), 1);
        assert!(db.list_group_members(group.id).unwrap().is_empty());
    }

    #[test]
    fn subjects_are_seeded_and_unique() {
        let db = Database::open_in_memory().unwrap();
        let names = db.subject_names().unwrap();
        assert!(names.contains(&"Data Structures".to_string()));

        let err = db.create_subject("Data Structures", None, None).unwrap_err();
        assert!(is_unique_violation(&err));

        db.create_subject("Compiler Design", Some("Computer Science"), Some("6")).unwrap();
        let sixth = db.subjects_by_semester("6").unwrap();
        assert_eq!(sixth.len(), 1);
        assert_eq!(sixth[0].name, "Compiler Design");
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }
}
