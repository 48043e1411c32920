use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::{request::Parts, HeaderMap},
};

use crate::error::ApiError;
use crate::models::HolderId;

/// Заголовок, в котором клиент передаёт идентификатор покупателя (сессии).
pub const HOLDER_HEADER: &str = "x-holder-id";

// None — заголовка нет; Err — заголовок есть, но пустой или не UTF-8
fn holder_from_headers(headers: &HeaderMap) -> Result<Option<HolderId>, ApiError> {
    let Some(value) = headers.get(HOLDER_HEADER) else {
        return Ok(None);
    };
    let raw = value
        .to_str()
        .map_err(|_| ApiError::unauthorized("Некорректный заголовок X-Holder-Id"))?;
    HolderId::new(raw)
        .map(Some)
        .ok_or_else(|| ApiError::unauthorized("Пустой заголовок X-Holder-Id"))
}

// Обязательный покупатель: без заголовка — 401
impl<S> FromRequestParts<S> for HolderId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        holder_from_headers(&parts.headers)?
            .ok_or_else(|| ApiError::unauthorized("Не передан заголовок X-Holder-Id"))
    }
}

// Необязательный покупатель, для `Option<HolderId>` в обработчиках чтения
impl<S> OptionalFromRequestParts<S> for HolderId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Option<Self>, Self::Rejection> {
        holder_from_headers(&parts.headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, StatusCode};

    #[test]
    fn reads_and_trims_holder() {
        let mut headers = HeaderMap::new();
        assert!(holder_from_headers(&headers).unwrap().is_none());

        headers.insert(HOLDER_HEADER, HeaderValue::from_static("  session-42 "));
        assert_eq!(holder_from_headers(&headers).unwrap().unwrap().as_str(), "session-42");

        headers.insert(HOLDER_HEADER, HeaderValue::from_static("   "));
        let err = holder_from_headers(&headers).unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }
}
