use studyshare_db::models::MaterialRow;
use studyshare_types::api::Claims;
use studyshare_types::models::Role;

use crate::error::ApiError;

/// Actions a role may be granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    UploadMaterial,
    DownloadMaterial,
    DeleteOwnMaterial,
    DeleteAnyMaterial,
    VerifyMaterial,
    ViewUsers,
    ManageUsers,
    DeleteUsers,
    CreateGroup,
    JoinGroup,
    ManageGroup,
    ViewAnalytics,
    ManageSystem,
}

const STUDENT: &[Permission] = &[
    Permission::UploadMaterial,
    Permission::DownloadMaterial,
    Permission::DeleteOwnMaterial,
    Permission::CreateGroup,
    Permission::JoinGroup,
];

const TEACHER: &[Permission] = &[
    Permission::UploadMaterial,
    Permission::DownloadMaterial,
    Permission::DeleteOwnMaterial,
    Permission::VerifyMaterial,
    Permission::CreateGroup,
    Permission::JoinGroup,
    Permission::ManageGroup,
    Permission::ViewAnalytics,
];

const ADMIN: &[Permission] = &[
    Permission::UploadMaterial,
    Permission::DownloadMaterial,
    Permission::DeleteOwnMaterial,
    Permission::DeleteAnyMaterial,
    Permission::VerifyMaterial,
    Permission::ViewUsers,
    Permission::ManageUsers,
    Permission::DeleteUsers,
    Permission::CreateGroup,
    Permission::JoinGroup,
    Permission::ManageGroup,
    Permission::ViewAnalytics,
    Permission::ManageSystem,
];

pub fn permissions(role: Role) -> &'static [Permission] {
    match role {
        Role::Student => STUDENT,
        Role::Teacher => TEACHER,
        Role::Admin => ADMIN,
    }
}

pub fn has_permission(role: Role, permission: Permission) -> bool {
    permissions(role).contains(&permission)
}

pub fn require(claims: &Claims, permission: Permission) -> Result<(), ApiError> {
    if has_permission(claims.role, permission) {
        Ok(())
    } else {
        Err(ApiError::forbidden("You do not have permission to perform this action"))
    }
}

/// Gate for every mutation of an existing material: admins pass, otherwise
/// the caller must be the recorded uploader.
pub fn authorize_material_mutation(claims: &Claims, material: &MaterialRow) -> Result<(), ApiError> {
    if has_permission(claims.role, Permission::DeleteAnyMaterial) {
        return Ok(());
    }
    if has_permission(claims.role, Permission::DeleteOwnMaterial)
        && material.user_id == Some(claims.sub)
    {
        return Ok(());
    }
    Err(ApiError::forbidden("You can only delete your own materials"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use studyshare_types::models::Visibility;

    fn claims(sub: i64, role: Role) -> Claims {
        Claims {
            sub,
            email: format!("u{}@x.com", sub),
            role,
            name: format!("User {}", sub),
            exp: usize::MAX,
        }
    }

    fn material(user_id: Option<i64>) -> MaterialRow {
        MaterialRow {
            id: 1,
            title: "Notes".into(),
            subject: "Operating Systems".into(),
            semester: "3".into(),
            uploaded_by: "Someone".into(),
            user_id,
            uploader_role: Role::Student,
            visibility: Visibility::Public,
            group_id: None,
            file_path: "abc_1_notes.pdf".into(),
            file_name: "notes.pdf".into(),
            file_type: "application/pdf".into(),
            file_size: 10,
            upload_timestamp: "2024-01-01 00:00:00".into(),
            downloads_count: 0,
            is_verified: false,
        }
    }

    #[test]
    fn admin_has_every_permission() {
        for p in ADMIN {
            assert!(has_permission(Role::Admin, *p));
        }
        assert_eq!(ADMIN.len(), 13);
    }

    #[test]
    fn teacher_extends_student() {
        for p in STUDENT {
            assert!(has_permission(Role::Teacher, *p));
        }
        assert!(has_permission(Role::Teacher, Permission::ViewAnalytics));
        assert!(has_permission(Role::Teacher, Permission::ManageGroup));
        assert!(!has_permission(Role::Student, Permission::ViewAnalytics));
        assert!(!has_permission(Role::Teacher, Permission::ManageUsers));
        assert!(!has_permission(Role::Teacher, Permission::DeleteAnyMaterial));
    }

    #[test]
    fn owner_may_mutate_own_material() {
        assert!(authorize_material_mutation(&claims(5, Role::Student), &material(Some(5))).is_ok());
    }

    #[test]
    fn other_student_is_forbidden() {
        let err = authorize_material_mutation(&claims(6, Role::Student), &material(Some(5))).unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
    }

    #[test]
    fn teacher_cannot_delete_others() {
        assert!(authorize_material_mutation(&claims(6, Role::Teacher), &material(Some(5))).is_err());
    }

    #[test]
    fn admin_may_mutate_anything_including_orphans() {
        assert!(authorize_material_mutation(&claims(1, Role::Admin), &material(Some(5))).is_ok());
        assert!(authorize_material_mutation(&claims(1, Role::Admin), &material(None)).is_ok());
        assert!(authorize_material_mutation(&claims(5, Role::Student), &material(None)).is_err());
    }
}
