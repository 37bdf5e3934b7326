//! Caller identity supplied by the upstream authentication proxy.

use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};

use crate::errors::ServiceError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";
pub const ADMIN_ROLE: &str = "admin";

/// Authenticated caller. `user_id` doubles as the cart and order owner ref.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: String,
    pub role: Option<String>,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role
            .as_deref()
            .is_some_and(|r| r.eq_ignore_ascii_case(ADMIN_ROLE))
    }

    pub fn require_admin(&self) -> Result<(), ServiceError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(
                "Administrator role required".to_string(),
            ))
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let user_id = header(USER_ID_HEADER)
            .ok_or_else(|| ServiceError::Unauthorized("Missing caller identity".to_string()))?;

        Ok(AuthUser {
            user_id,
            role: header(USER_ROLE_HEADER),
        })
    }
}

/// An [`AuthUser`] that holds the administrator role.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthUser);

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        user.require_admin()?;
        Ok(AdminUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(headers: &[(&str, &str)]) -> Result<AuthUser, ServiceError> {
        let mut builder = Request::builder().uri("/");
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        AuthUser::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn missing_identity_is_unauthorized() {
        let err = extract(&[]).await.unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn role_header_grants_admin() {
        let user = extract(&[("x-user-id", "ops-1"), ("x-user-role", "Admin")])
            .await
            .unwrap();
        assert!(user.is_admin());

        let shopper = extract(&[("x-user-id", "shopper-1")]).await.unwrap();
        assert!(matches!(
            shopper.require_admin(),
            Err(ServiceError::Forbidden(_))
        ));
    }
}
