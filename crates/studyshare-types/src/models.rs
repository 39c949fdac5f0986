use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// -- Enumerations --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Student, Role::Teacher, Role::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
            Role::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Group,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Group => "group",
        }
    }
}

/// Returned when a stored or submitted string names no known variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind}: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl FromStr for Role {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Role::Student),
            "teacher" => Ok(Role::Teacher),
            "admin" => Ok(Role::Admin),
            other => Err(ParseEnumError {
                kind: "role",
                value: other.to_string(),
            }),
        }
    }
}

impl FromStr for Visibility {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Visibility::Public),
            "group" => Ok(Visibility::Group),
            other => Err(ParseEnumError {
                kind: "visibility",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// -- Entities --

/// Public view of a user. Never carries the password hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub department: Option<String>,
    pub semester: Option<String>,
    pub phone: Option<String>,
    pub is_active: bool,
    pub created_at: String,
    pub last_login: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Material {
    pub id: i64,
    pub title: String,
    pub subject: String,
    pub semester: String,
    pub uploaded_by: String,
    pub user_id: Option<i64>,
    pub uploader_role: Role,
    pub visibility: Visibility,
    pub group_id: Option<i64>,
    pub file_name: String,
    pub file_type: String,
    pub file_size: i64,
    pub upload_timestamp: String,
    pub downloads_count: i64,
    pub is_verified: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMember {
    pub id: i64,
    pub group_id: i64,
    pub member_name: String,
    pub joined_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subject {
    pub id: i64,
    pub name: String,
    pub department: Option<String>,
    pub semester: Option<String>,
}

// -- Catalog filters --

/// Conjunctive filters for the public material catalog. Every field is optional.
#[derive(Debug, Clone, Default)]
pub struct MaterialFilter {
    pub subject: Option<String>,
    pub semester: Option<String>,
    pub uploader_role: Option<Role>,
    pub is_verified: Option<bool>,
    /// Free text; split on whitespace, every token must match.
    pub search: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub role: Option<Role>,
    pub department: Option<String>,
    pub semester: Option<String>,
    pub is_active: Option<bool>,
    pub limit: Option<u32>,
}

// -- Statistics --

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaterialStats {
    pub total_materials: i64,
    pub total_downloads: i64,
    pub total_subjects: i64,
    pub verified_materials: i64,
    pub teacher_materials: i64,
    pub student_materials: i64,
    pub by_subject: Vec<BreakdownRow>,
    pub by_semester: Vec<BreakdownRow>,
}

/// One bucket of a per-subject or per-semester breakdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakdownRow {
    pub key: String,
    pub material_count: i64,
    pub total_downloads: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserStats {
    pub total_users: i64,
    pub total_students: i64,
    pub total_teachers: i64,
    pub total_admins: i64,
    pub active_users: i64,
}
