//! Database row types, mapped directly from SQLite rows.
//! Distinct from studyshare-types API models to keep the DB layer independent.

use studyshare_types::models::{Group, GroupMember, Material, Role, Subject, User, Visibility};

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    pub department: Option<String>,
    pub semester: Option<String>,
    pub phone: Option<String>,
    pub is_active: bool,
    pub created_at: String,
    pub last_login: Option<String>,
}

pub struct NewUser<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub role: Role,
    pub department: Option<&'a str>,
    pub semester: Option<&'a str>,
    pub phone: Option<&'a str>,
}

/// Partial profile update; `None` leaves the column untouched.
#[derive(Default)]
pub struct ProfileUpdate<'a> {
    pub name: Option<&'a str>,
    pub department: Option<&'a str>,
    pub semester: Option<&'a str>,
    pub phone: Option<&'a str>,
}

impl ProfileUpdate<'_> {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.department.is_none()
            && self.semester.is_none()
            && self.phone.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct MaterialRow {
    pub id: i64,
    pub title: String,
    pub subject: String,
    pub semester: String,
    pub uploaded_by: String,
    pub user_id: Option<i64>,
    pub uploader_role: Role,
    pub visibility: Visibility,
    pub group_id: Option<i64>,
    /// Name of the file inside the upload directory.
    pub file_path: String,
    pub file_name: String,
    pub file_type: String,
    pub file_size: i64,
    pub upload_timestamp: String,
    pub downloads_count: i64,
    pub is_verified: bool,
}

pub struct NewMaterial<'a> {
    pub title: &'a str,
    pub subject: &'a str,
    pub semester: &'a str,
    pub uploaded_by: &'a str,
    pub user_id: i64,
    pub uploader_role: Role,
    pub visibility: Visibility,
    pub group_id: Option<i64>,
    pub file_path: &'a str,
    pub file_name: &'a str,
    pub file_type: &'a str,
    pub file_size: i64,
    pub is_verified: bool,
}

#[derive(Debug, Clone)]
pub struct GroupRow {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct GroupMemberRow {
    pub id: i64,
    pub group_id: i64,
    pub member_name: String,
    pub joined_at: String,
}

#[derive(Debug, Clone)]
pub struct SubjectRow {
    pub id: i64,
    pub name: String,
    pub department: Option<String>,
    pub semester: Option<String>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            name: row.name,
            email: row.email,
            role: row.role,
            department: row.department,
            semester: row.semester,
            phone: row.phone,
            is_active: row.is_active,
            created_at: row.created_at,
            last_login: row.last_login,
        }
    }
}

impl From<MaterialRow> for Material {
    fn from(row: MaterialRow) -> Self {
        Material {
            id: row.id,
            title: row.title,
            subject: row.subject,
            semester: row.semester,
            uploaded_by: row.uploaded_by,
            user_id: row.user_id,
            uploader_role: row.uploader_role,
            visibility: row.visibility,
            group_id: row.group_id,
            file_name: row.file_name,
            file_type: row.file_type,
            file_size: row.file_size,
            upload_timestamp: row.upload_timestamp,
            downloads_count: row.downloads_count,
            is_verified: row.is_verified,
        }
    }
}

impl From<GroupRow> for Group {
    fn from(row: GroupRow) -> Self {
        Group {
            id: row.id,
            name: row.name,
            description: row.description,
            created_at: row.created_at,
        }
    }
}

impl From<GroupMemberRow> for GroupMember {
    fn from(row: GroupMemberRow) -> Self {
        GroupMember {
            id: row.id,
            group_id: row.group_id,
            member_name: row.member_name,
            joined_at: row.joined_at,
        }
    }
}

impl From<SubjectRow> for Subject {
    fn from(row: SubjectRow) -> Self {
        Subject {
            id: row.id,
            name: row.name,
            department: row.department,
            semester: row.semester,
        }
    }
}
