//! Caller identity and per-route capability checks.
//!
//! Authentication happens upstream; the authenticator forwards the caller
//! as `x-user-id`, `x-organization-id` and `x-role` headers. The
//! [`authorize`] middleware resolves those into an [`Actor`], checks the
//! route's [`Capability`] and stores the actor in the request extensions
//! before the handler runs.

use std::fmt;
use std::str::FromStr;

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use common::{OrganizationId, UserId};

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const ORGANIZATION_ID_HEADER: &str = "x-organization-id";
pub const ROLE_HEADER: &str = "x-role";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Seller,
    FactoryViewer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Seller => "SELLER",
            Role::FactoryViewer => "FACTORY_VIEWER",
        }
    }

    /// Admins and sellers place and submit orders; every role views them.
    pub fn allows(&self, capability: Capability) -> bool {
        match capability {
            Capability::CreateOrder | Capability::SubmitOrder => {
                matches!(self, Role::Admin | Role::Seller)
            }
            Capability::ViewOrders => true,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Ok(Role::Admin),
            "SELLER" => Ok(Role::Seller),
            "FACTORY_VIEWER" => Ok(Role::FactoryViewer),
            other => Err(ApiError::Unauthorized(format!("Unknown role: {other}"))),
        }
    }
}

/// What a route lets the caller do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    CreateOrder,
    SubmitOrder,
    ViewOrders,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::CreateOrder => "create_order",
            Capability::SubmitOrder => "submit_order",
            Capability::ViewOrders => "view_orders",
        }
    }
}

/// The authenticated caller of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: UserId,
    pub organization_id: Option<OrganizationId>,
    pub role: Role,
}

impl Actor {
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, ApiError> {
        let user_id = header(headers, USER_ID_HEADER)?
            .ok_or_else(|| ApiError::Unauthorized(format!("Missing {USER_ID_HEADER} header")))?
            .parse::<UserId>()
            .map_err(|e| ApiError::Unauthorized(format!("Invalid {USER_ID_HEADER}: {e}")))?;

        let organization_id = header(headers, ORGANIZATION_ID_HEADER)?
            .map(|v| {
                v.parse::<OrganizationId>().map_err(|e| {
                    ApiError::Unauthorized(format!("Invalid {ORGANIZATION_ID_HEADER}: {e}"))
                })
            })
            .transpose()?;

        let role = header(headers, ROLE_HEADER)?
            .ok_or_else(|| ApiError::Unauthorized(format!("Missing {ROLE_HEADER} header")))?
            .parse()?;

        Ok(Self {
            user_id,
            organization_id,
            role,
        })
    }

    pub fn is_seller(&self) -> bool {
        self.role == Role::Seller
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Result<Option<&'a str>, ApiError> {
    headers
        .get(name)
        .map(|v| {
            v.to_str()
                .map_err(|_| ApiError::Unauthorized(format!("Invalid {name} header")))
        })
        .transpose()
}

/// Resolves the caller and rejects requests whose role lacks `capability`.
pub async fn authorize(
    State(capability): State<Capability>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let actor = Actor::from_headers(request.headers())?;

    if !actor.role.allows(capability) {
        metrics::counter!("requests_forbidden_total", "capability" => capability.as_str())
            .increment(1);
        tracing::warn!(
            user_id = %actor.user_id,
            role = %actor.role,
            capability = capability.as_str(),
            "capability denied"
        );
        return Err(ApiError::Forbidden(format!(
            "Role {} may not {}",
            actor.role,
            capability.as_str().replace('_', " ")
        )));
    }

    request.extensions_mut().insert(actor);
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        headers
    }

    #[test]
    fn test_role_capabilities() {
        assert!(Role::Admin.allows(Capability::SubmitOrder));
        assert!(Role::Seller.allows(Capability::CreateOrder));
        assert!(Role::FactoryViewer.allows(Capability::ViewOrders));
        assert!(!Role::FactoryViewer.allows(Capability::CreateOrder));
        assert!(!Role::FactoryViewer.allows(Capability::SubmitOrder));
    }

    #[test]
    fn test_actor_from_headers() {
        let user = UserId::new();
        let org = OrganizationId::new();
        let actor = Actor::from_headers(&headers(&[
            (USER_ID_HEADER, &user.to_string()),
            (ORGANIZATION_ID_HEADER, &org.to_string()),
            (ROLE_HEADER, "seller"),
        ]))
        .unwrap();

        assert_eq!(actor.user_id, user);
        assert_eq!(actor.organization_id, Some(org));
        assert_eq!(actor.role, Role::Seller);
        assert!(actor.is_seller());
    }

    #[test]
    fn test_organization_is_optional() {
        let actor = Actor::from_headers(&headers(&[
            (USER_ID_HEADER, &UserId::new().to_string()),
            (ROLE_HEADER, "FACTORY_VIEWER"),
        ]))
        .unwrap();
        assert!(actor.organization_id.is_none());
    }

    #[test]
    fn test_missing_or_bad_identity_is_rejected() {
        assert!(matches!(
            Actor::from_headers(&headers(&[(ROLE_HEADER, "ADMIN")])),
            Err(ApiError::Unauthorized(_))
        ));
        assert!(matches!(
            Actor::from_headers(&headers(&[
                (USER_ID_HEADER, "not-a-uuid"),
                (ROLE_HEADER, "ADMIN")
            ])),
            Err(ApiError::Unauthorized(_))
        ));
        assert!(matches!(
            Actor::from_headers(&headers(&[
                (USER_ID_HEADER, &UserId::new().to_string()),
                (ROLE_HEADER, "SUPERUSER")
            ])),
            Err(ApiError::Unauthorized(_))
        ));
    }
}
