use axum::body::Body;
use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use uuid::Uuid;

use crate::domain::actor::{Actor, ActorRole};

use super::error::ApiError;

/// Identity headers stamped by the authenticating reverse proxy. Requests
/// reaching this service without them are rejected, never defaulted.
pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

pub async fn require_identity(mut request: Request<Body>, next: Next) -> Response {
    let actor = match actor_from_headers(request.headers()) {
        Ok(actor) => actor,
        Err(err) => return err.into_response(),
    };

    request.extensions_mut().insert(actor);

    let mut response = next.run(request).await;
    response.extensions_mut().insert(actor);
    response
}

fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, ApiError> {
    let id = header_str(headers, ACTOR_ID_HEADER)
        .ok_or_else(|| ApiError::unauthorized(Some(format!("`{ACTOR_ID_HEADER}` is missing"))))?;
    let role = header_str(headers, ACTOR_ROLE_HEADER)
        .ok_or_else(|| ApiError::unauthorized(Some(format!("`{ACTOR_ROLE_HEADER}` is missing"))))?;

    let id = Uuid::parse_str(id)
        .map_err(|_| ApiError::unauthorized(Some(format!("`{ACTOR_ID_HEADER}` is not a UUID"))))?;
    let role = ActorRole::try_from(role).map_err(|_| {
        ApiError::unauthorized(Some(format!(
            "`{ACTOR_ROLE_HEADER}` must be student, teacher, or admin"
        )))
    })?;

    Ok(Actor::new(id, role))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(id: &str, role: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACTOR_ID_HEADER,
            HeaderValue::from_str(id).expect("header value"),
        );
        headers.insert(
            ACTOR_ROLE_HEADER,
            HeaderValue::from_str(role).expect("header value"),
        );
        headers
    }

    #[test]
    fn parses_well_formed_identity() {
        let id = Uuid::new_v4();
        let actor =
            actor_from_headers(&headers(&id.to_string(), "teacher")).expect("identity parses");
        assert_eq!(actor.id, id);
        assert_eq!(actor.role, ActorRole::Teacher);
    }

    #[test]
    fn rejects_missing_and_malformed_headers() {
        assert!(actor_from_headers(&HeaderMap::new()).is_err());
        assert!(actor_from_headers(&headers("not-a-uuid", "teacher")).is_err());
        assert!(actor_from_headers(&headers(&Uuid::new_v4().to_string(), "owner")).is_err());
    }
}
