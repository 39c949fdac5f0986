use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

/// Subjects offered for autocomplete on a fresh install.
const DEFAULT_SUBJECTS: &[&str] = &[
    "Data Structures",
    "Computer Networks",
    "Database Management Systems",
    "Operating Systems",
    "Software Engineering",
    "Web Development",
    "Machine Learning",
    "Digital Electronics",
    "Microprocessors",
    "Engineering Mathematics",
];

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS users (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                name        TEXT NOT NULL,
                email       TEXT NOT NULL UNIQUE,
                password    TEXT NOT NULL,
                role        TEXT NOT NULL CHECK(role IN ('student', 'teacher', 'admin')),
                department  TEXT,
                semester    TEXT,
                phone       TEXT,
                is_active   INTEGER NOT NULL DEFAULT 1,
                created_at  TEXT NOT NULL DEFAULT (datetime('now')),
                last_login  TEXT
            );

            CREATE TABLE IF NOT EXISTS groups (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                name        TEXT NOT NULL UNIQUE,
                description TEXT,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS group_members (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                group_id    INTEGER NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
                member_name TEXT NOT NULL,
                joined_at   TEXT NOT NULL DEFAULT (datetime('now'))
            );

            -- user_id carries no foreign key: deleting a user leaves the id behind.
            CREATE TABLE IF NOT EXISTS materials (
                id               INTEGER PRIMARY KEY AUTOINCREMENT,
                title            TEXT NOT NULL,
                subject          TEXT NOT NULL,
                semester         TEXT NOT NULL,
                uploaded_by      TEXT NOT NULL,
                user_id          INTEGER,
                uploader_role    TEXT NOT NULL CHECK(uploader_role IN ('student', 'teacher')),
                visibility       TEXT NOT NULL DEFAULT 'public' CHECK(visibility IN ('public', 'group')),
                group_id         INTEGER REFERENCES groups(id) ON DELETE RESTRICT,
                file_path        TEXT NOT NULL,
                file_name        TEXT NOT NULL,
                file_type        TEXT NOT NULL,
                file_size        INTEGER NOT NULL,
                upload_timestamp TEXT NOT NULL DEFAULT (datetime('now')),
                downloads_count  INTEGER NOT NULL DEFAULT 0,
                is_verified      INTEGER NOT NULL DEFAULT 0,
                CHECK (visibility = 'public' OR group_id IS NOT NULL)
            );

            CREATE TABLE IF NOT EXISTS subjects (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                name        TEXT NOT NULL UNIQUE,
                department  TEXT,
                semester    TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_materials_subject ON materials(subject);
            CREATE INDEX IF NOT EXISTS idx_materials_semester ON materials(semester);
            CREATE INDEX IF NOT EXISTS idx_materials_user_id ON materials(user_id);
            CREATE INDEX IF NOT EXISTS idx_materials_group ON materials(group_id, visibility);
            CREATE INDEX IF NOT EXISTS idx_group_members_group ON group_members(group_id);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;

        let mut stmt = conn.prepare("INSERT OR IGNORE INTO subjects (name) VALUES (?1)")?;
        for name in DEFAULT_SUBJECTS {
            stmt.execute([name])?;
        }
    }

    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        let versions: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(versions, 1);

        let subjects: i64 = conn
            .query_row("SELECT COUNT(*) FROM subjects", [], |r| r.get(0))
            .unwrap();
        assert_eq!(subjects, DEFAULT_SUBJECTS.len() as i64);
    }

    #[test]
    fn group_visibility_requires_group_id() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();

        let res = conn.execute(
            "INSERT INTO materials (title, subject, semester, uploaded_by, uploader_role, visibility,
                                    file_path, file_name, file_type, file_size)
             VALUES ('t', 's', '1', 'u', 'student', 'group', 'p', 'n', 'application/pdf', 1)",
            [],
        );
        assert!(res.is_err());
    }
}
