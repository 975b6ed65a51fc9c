use axum::http::{header, HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};

const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000,http://localhost:5173";

const PREFLIGHT_MAX_AGE_SECS: u64 = 86400;

/// Headers the gateway and clients send on engine requests.
const ACTOR_HEADERS: [&str; 4] = [
    "x-actor-id",
    "x-actor-email",
    "x-actor-role",
    "x-actor-structure-id",
];

pub fn create_cors_layer(configured_origins: Option<&str>) -> CorsLayer {
    let allowed_origins = get_allowed_origins(configured_origins);

    let mut allow_headers = vec![
        header::CONTENT_TYPE,
        header::AUTHORIZATION,
        header::ACCEPT,
        header::ORIGIN,
        HeaderName::from_static("x-requested-with"),
        HeaderName::from_static("idempotency-key"),
    ];
    allow_headers.extend(ACTOR_HEADERS.into_iter().map(HeaderName::from_static));

    CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers(allow_headers)
        .expose_headers([
            header::CONTENT_LENGTH,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-request-id"),
        ])
        .allow_credentials(true)
        .max_age(std::time::Duration::from_secs(PREFLIGHT_MAX_AGE_SECS))
}

fn get_allowed_origins(configured_origins: Option<&str>) -> AllowOrigin {
    let origins_str = configured_origins.unwrap_or(DEFAULT_ALLOWED_ORIGINS);

    let origins: Vec<HeaderValue> = origins_str
        .split(',')
        .filter_map(|origin| {
            let trimmed = origin.trim();
            if trimmed.is_empty() {
                None
            } else {
                match trimmed.parse::<HeaderValue>() {
                    Ok(value) => {
                        tracing::debug!("CORS: Allowing origin: {}", trimmed);
                        Some(value)
                    }
                    Err(e) => {
                        tracing::warn!("CORS: Invalid origin '{}': {}", trimmed, e);
                        None
                    }
                }
            }
        })
        .collect();

    if origins.is_empty() {
        // `AllowOrigin::any()` cannot be combined with credentials, so fall
        // back to the dev origins.
        tracing::warn!("CORS: No valid origins configured, using development defaults");
        AllowOrigin::list(
            DEFAULT_ALLOWED_ORIGINS
                .split(',')
                .map(HeaderValue::from_static)
                .collect::<Vec<_>>(),
        )
    } else {
        tracing::info!("CORS: Configured with {} allowed origin(s)", origins.len());
        AllowOrigin::list(origins)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_cors_layer() {
        let _layer = create_cors_layer(None);
        let _configured = create_cors_layer(Some("https://tickly.example, https://door.example"));
    }

    #[test]
    fn test_default_origins_are_valid() {
        for origin in DEFAULT_ALLOWED_ORIGINS.split(',') {
            let trimmed = origin.trim();
            assert!(
                trimmed.parse::<HeaderValue>().is_ok(),
                "Default origin '{}' should be a valid HeaderValue",
                trimmed
            );
        }
    }

    #[test]
    fn test_actor_headers_are_valid_names() {
        for name in ACTOR_HEADERS {
            assert!(HeaderName::from_bytes(name.as_bytes()).is_ok());
        }
    }
}
