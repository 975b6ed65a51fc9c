use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use uuid::Uuid;

use crate::models::{Actor, Role};
use crate::utils::error::AppError;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_EMAIL_HEADER: &str = "x-actor-email";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";
pub const ACTOR_STRUCTURE_HEADER: &str = "x-actor-structure-id";
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// The caller as asserted by the authenticating gateway in front of this
/// service.
#[axum::async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        actor_from_headers(&parts.headers)
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<Option<&'a str>, AppError> {
    match headers.get(name) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(|v| Some(v.trim()).filter(|v| !v.is_empty()))
            .map_err(|_| AppError::AuthError(format!("Header {} is not valid text", name))),
    }
}

pub fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, AppError> {
    let user_id = header_str(headers, ACTOR_ID_HEADER)?
        .ok_or_else(|| AppError::AuthError("Missing authenticated user".into()))?
        .parse::<Uuid>()
        .map_err(|_| AppError::AuthError("Malformed user id".into()))?;

    let role = match header_str(headers, ACTOR_ROLE_HEADER)? {
        Some(raw) => raw.parse::<Role>().map_err(AppError::AuthError)?,
        None => Role::Spectator,
    };

    let structure_id = header_str(headers, ACTOR_STRUCTURE_HEADER)?
        .map(|raw| {
            raw.parse::<Uuid>()
                .map_err(|_| AppError::AuthError("Malformed structure id".into()))
        })
        .transpose()?;

    Ok(Actor {
        user_id,
        email: header_str(headers, ACTOR_EMAIL_HEADER)?
            .unwrap_or_default()
            .to_string(),
        role,
        structure_id,
    })
}

/// Optional `Idempotency-Key` of a booking request.
pub fn idempotency_key(headers: &HeaderMap) -> Result<Option<String>, AppError> {
    match headers.get(IDEMPOTENCY_KEY_HEADER) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(|v| Some(v.to_string()))
            .map_err(|_| AppError::ValidationError("Idempotency-Key is not valid text".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn missing_or_malformed_user_is_unauthenticated() {
        assert!(matches!(
            actor_from_headers(&HeaderMap::new()),
            Err(AppError::AuthError(_))
        ));
        assert!(matches!(
            actor_from_headers(&headers(&[(ACTOR_ID_HEADER, "not-a-uuid")])),
            Err(AppError::AuthError(_))
        ));
    }

    #[test]
    fn role_defaults_to_spectator() {
        let id = Uuid::new_v4();
        let actor = actor_from_headers(&headers(&[(ACTOR_ID_HEADER, &id.to_string())])).unwrap();
        assert_eq!(actor.user_id, id);
        assert_eq!(actor.role, Role::Spectator);
        assert_eq!(actor.structure_id, None);
    }

    #[test]
    fn staff_claims_are_parsed() {
        let id = Uuid::new_v4();
        let structure = Uuid::new_v4();
        let actor = actor_from_headers(&headers(&[
            (ACTOR_ID_HEADER, &id.to_string()),
            (ACTOR_EMAIL_HEADER, "door@example.com"),
            (ACTOR_ROLE_HEADER, "reservation_service"),
            (ACTOR_STRUCTURE_HEADER, &structure.to_string()),
        ]))
        .unwrap();
        assert_eq!(actor.role, Role::ReservationService);
        assert_eq!(actor.structure_id, Some(structure));
        assert_eq!(actor.email, "door@example.com");
    }
}
