use std::future::{ready, Ready};

use actix_web::dev::Payload;
use actix_web::{FromRequest, HttpRequest};

use crate::config::Config;
use crate::error::ApiError;

const USER_HEADER: &str = "x-user-id";
const TENANT_HEADER: &str = "x-tenant-id";
const ROLES_HEADER: &str = "x-roles";

/// The authenticated principal and tenant scope for a request.
///
/// Session verification happens upstream in the identity layer; this service
/// trusts the headers it forwards. Every query downstream is scoped to
/// `tenant_id`, so a principal can never see another school's records.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: String,
    pub tenant_id: String,
    pub roles: Vec<String>,
}

impl AuthContext {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Staff access is a role claim, configurable for platform operators.
    /// There is deliberately no identity-based bypass here.
    pub fn require_staff(&self, config: &Config) -> Result<(), ApiError> {
        if self.has_role("staff") || self.has_role(&config.platform_admin_role) {
            Ok(())
        } else {
            Err(ApiError::Forbidden)
        }
    }

    fn from_headers(req: &HttpRequest) -> Result<Self, ApiError> {
        let header = |name: &str| -> Option<String> {
            req.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let user_id = header(USER_HEADER).ok_or(ApiError::Unauthorized)?;
        let tenant_id = header(TENANT_HEADER).ok_or(ApiError::Unauthorized)?;
        let roles = header(ROLES_HEADER)
            .map(|raw| {
                raw.split(',')
                    .map(|r| r.trim().to_string())
                    .filter(|r| !r.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            user_id,
            tenant_id,
            roles,
        })
    }
}

impl FromRequest for AuthContext {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(Self::from_headers(req))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn test_context_from_headers() {
        let req = TestRequest::default()
            .insert_header((USER_HEADER, "user-1"))
            .insert_header((TENANT_HEADER, "studio-a"))
            .insert_header((ROLES_HEADER, "staff, platform_admin"))
            .to_http_request();

        let ctx = AuthContext::from_headers(&req).unwrap();
        assert_eq!(ctx.user_id, "user-1");
        assert_eq!(ctx.tenant_id, "studio-a");
        assert!(ctx.has_role("staff"));
        assert!(ctx.has_role("platform_admin"));
        assert!(!ctx.has_role("admin"));
    }

    #[test]
    fn test_missing_headers_are_unauthorized() {
        let req = TestRequest::default()
            .insert_header((USER_HEADER, "user-1"))
            .to_http_request();
        assert!(matches!(
            AuthContext::from_headers(&req),
            Err(ApiError::Unauthorized)
        ));
    }

    #[test]
    fn test_staff_requirement() {
        let config = Config::default();
        let member = AuthContext {
            user_id: "user-1".to_string(),
            tenant_id: "studio-a".to_string(),
            roles: vec![],
        };
        assert!(matches!(
            member.require_staff(&config),
            Err(ApiError::Forbidden)
        ));

        let admin = AuthContext {
            roles: vec![config.platform_admin_role.clone()],
            ..member.clone()
        };
        assert!(admin.require_staff(&config).is_ok());
    }
}
