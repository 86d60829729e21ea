#[cfg(test)]
mod tests {
    use super::super::types::*;
    use super::super::*;
    use axum::http::StatusCode;
    use uuid::Uuid;

    #[test]
    fn test_role_parsing() {
        assert_eq!("manager".parse::<Role>().unwrap(), Role::Manager);
        assert_eq!("technician-it".parse::<Role>().unwrap(), Role::TechnicianIt);
        assert_eq!("User-Client".parse::<Role>().unwrap(), Role::UserClient);
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_serde_names() {
        assert_eq!(
            serde_json::to_string(&Role::TechnicianIt).unwrap(),
            "\"technician-it\""
        );
        let role: Role = serde_json::from_str("\"user-client\"").unwrap();
        assert_eq!(role, Role::UserClient);
    }

    #[test]
    fn test_staff_roles() {
        assert!(Role::Manager.is_staff());
        assert!(Role::TechnicianIt.is_staff());
        assert!(!Role::UserClient.is_staff());
    }

    #[test]
    fn test_authenticated_user_builder() {
        let user = AuthenticatedUser::new(Uuid::new_v4(), "ana@example.com", Role::UserClient)
            .with_full_name("Ana")
            .with_can_create_ticket(false);

        assert_eq!(user.display_name(), "Ana");
        assert!(!user.can_create_ticket);
        assert!(!user.is_staff());
    }

    #[test]
    fn test_auth_error_status_codes() {
        assert_eq!(AuthError::MissingToken.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthError::ExpiredToken.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthError::AccountDisabled.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(AuthError::ProfileNotFound.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            AuthError::SecretNotConfigured.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_auth_error_codes() {
        assert_eq!(AuthError::MissingToken.error_code(), "missing_token");
        assert_eq!(AuthError::InvalidSecret.error_code(), "invalid_secret");
        assert_eq!(
            AuthError::InternalError("boom".into()).message(),
            "An internal error occurred"
        );
    }
}
