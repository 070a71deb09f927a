//! `GET /earthquakes` -- paginated event query.
//!
//! Query-string parameters:
//!
//! | name | format | default without token |
//! |---|---|---|
//! | `starttime` | epoch millis, RFC 3339, or `YYYY-MM-DD` | `endtime` minus one day |
//! | `endtime` | same | now |
//! | `minmagnitude` | decimal | `-2.0` |
//! | `limit` | integer, clamped to `1..=100` | 50 |
//! | `nextToken` | cursor from a previous page | none |
//!
//! With `nextToken`, omitted parameters are taken from the (verified)
//! token. Parameters that are supplied are passed through unchanged, so a
//! changed filter is rejected by the engine instead of silently applied.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, NaiveDate, Utc};
use quakefeed_core::{
    CursorCodec, EarthquakeEvent, EpochMillis, InvalidRequest, QueryRequest, QueryResult,
    DAY_MILLIS, DEFAULT_PAGE_SIZE, MIN_MAGNITUDE,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::AppState;
use crate::query::QueryError;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Raw query-string parameters. Everything is text so parse errors produce
/// the same JSON error body as every other rejection.
#[derive(Debug, Default, Deserialize)]
pub struct EarthquakeParams {
    pub starttime: Option<String>,
    pub endtime: Option<String>,
    pub minmagnitude: Option<String>,
    pub limit: Option<String>,
    #[serde(rename = "nextToken")]
    pub next_token: Option<String>,
}

/// Response body of `GET /earthquakes`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EarthquakePage {
    pub items: Vec<EarthquakeEvent>,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
    pub buckets_scanned: u32,
}

impl From<QueryResult> for EarthquakePage {
    fn from(result: QueryResult) -> Self {
        Self {
            count: result.items.len(),
            items: result.items,
            next_token: result.next_cursor,
            buckets_scanned: result.buckets_scanned,
        }
    }
}

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Cursor(_) | Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = match &self {
            // Store details stay in the logs.
            Self::StoreUnavailable(_) => "event store unavailable, try again later".to_string(),
            Self::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        };
        let body = json!({ "error": self.code(), "message": message });
        (status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Parameter resolution
// ---------------------------------------------------------------------------

/// Parses an instant given as epoch milliseconds, RFC 3339, or a bare
/// `YYYY-MM-DD` date (midnight UTC).
fn parse_instant(name: &str, raw: &str) -> Result<EpochMillis, InvalidRequest> {
    let raw = raw.trim();
    if let Ok(millis) = raw.parse::<EpochMillis>() {
        return Ok(millis);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.timestamp_millis());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc().timestamp_millis());
        }
    }
    Err(InvalidRequest(format!(
        "{name} must be epoch milliseconds or an ISO-8601 timestamp"
    )))
}

fn parse_magnitude(raw: &str) -> Result<f64, InvalidRequest> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| InvalidRequest("minmagnitude must be a number".to_string()))
}

fn parse_limit(raw: &str) -> Result<u32, InvalidRequest> {
    raw.trim()
        .parse::<u32>()
        .map_err(|_| InvalidRequest("limit must be a non-negative integer".to_string()))
}

/// Builds the effective [`QueryRequest`] from raw parameters.
///
/// `now` is the default window end when neither a token nor `endtime` is
/// given.
///
/// # Errors
///
/// Returns [`QueryError::InvalidRequest`] for unparseable parameters and
/// [`QueryError::Cursor`] when `nextToken` does not verify.
pub fn resolve_request(
    params: &EarthquakeParams,
    codec: &CursorCodec,
    now: EpochMillis,
) -> Result<QueryRequest, QueryError> {
    let start = params
        .starttime
        .as_deref()
        .map(|s| parse_instant("starttime", s))
        .transpose()?;
    let end = params
        .endtime
        .as_deref()
        .map(|s| parse_instant("endtime", s))
        .transpose()?;
    let min_magnitude = params
        .minmagnitude
        .as_deref()
        .map(parse_magnitude)
        .transpose()?;
    let limit = params.limit.as_deref().map(parse_limit).transpose()?;

    let request = if let Some(token) = &params.next_token {
        let state = codec.decode(token)?;
        QueryRequest::new(
            start.unwrap_or(state.start_time),
            end.unwrap_or(state.end_time),
            min_magnitude.unwrap_or(state.min_magnitude),
            limit.unwrap_or(state.page_size),
        )
        .with_cursor(token.clone())
    } else {
        let end = end.unwrap_or(now);
        QueryRequest::new(
            start.unwrap_or_else(|| end.saturating_sub(DAY_MILLIS)),
            end,
            min_magnitude.unwrap_or(MIN_MAGNITUDE),
            limit.unwrap_or(DEFAULT_PAGE_SIZE),
        )
    };
    Ok(request)
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

/// Serves one page of earthquake events.
///
/// # Errors
///
/// Returns 400 for bad parameters or cursors, 503 if the store fails.
pub async fn earthquakes_handler(
    State(state): State<AppState>,
    Query(params): Query<EarthquakeParams>,
) -> Result<Json<EarthquakePage>, QueryError> {
    let _guard = state.shutdown.in_flight_guard();

    let request = resolve_request(&params, &state.engine.codec(), Utc::now().timestamp_millis())?;
    let result = state.engine.execute(request).await?;
    Ok(Json(result.into()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use quakefeed_core::{CursorError, CursorSecret, ResumeState};

    use super::*;

    /// 2024-01-01T00:00:00Z
    const JAN_1: EpochMillis = 1_704_067_200_000;

    fn codec() -> Arc<CursorCodec> {
        Arc::new(CursorCodec::new(CursorSecret::new("handler-test-secret")))
    }

    fn params() -> EarthquakeParams {
        EarthquakeParams::default()
    }

    #[test]
    fn parse_instant_accepts_epoch_millis() {
        assert_eq!(parse_instant("t", "1704067200000").unwrap(), JAN_1);
        assert_eq!(parse_instant("t", "-1000").unwrap(), -1000);
    }

    #[test]
    fn parse_instant_accepts_rfc3339() {
        assert_eq!(parse_instant("t", "2024-01-01T00:00:00Z").unwrap(), JAN_1);
        assert_eq!(
            parse_instant("t", "2024-01-01T02:00:00+02:00").unwrap(),
            JAN_1
        );
        assert_eq!(
            parse_instant("t", "2024-01-01T00:00:00.250Z").unwrap(),
            JAN_1 + 250
        );
    }

    #[test]
    fn parse_instant_accepts_bare_date() {
        assert_eq!(parse_instant("t", "2024-01-01").unwrap(), JAN_1);
    }

    #[test]
    fn parse_instant_rejects_garbage() {
        let err = parse_instant("starttime", "yesterday").unwrap_err();
        assert!(err.0.starts_with("starttime"));
    }

    #[test]
    fn defaults_without_token() {
        let now = JAN_1 + 5 * DAY_MILLIS;
        let request = resolve_request(&params(), &codec(), now).unwrap();
        assert_eq!(request.end_time, now);
        assert_eq!(request.start_time, now - DAY_MILLIS);
        assert!((request.min_magnitude - MIN_MAGNITUDE).abs() < f64::EPSILON);
        assert_eq!(request.page_size, DEFAULT_PAGE_SIZE);
        assert!(request.cursor.is_none());
    }

    #[test]
    fn explicit_parameters_without_token() {
        let p = EarthquakeParams {
            starttime: Some("2024-01-01".to_string()),
            endtime: Some("2024-01-03T00:00:00Z".to_string()),
            minmagnitude: Some("4.5".to_string()),
            limit: Some("20".to_string()),
            next_token: None,
        };
        let request = resolve_request(&p, &codec(), 0).unwrap();
        assert_eq!(request.start_time, JAN_1);
        assert_eq!(request.end_time, JAN_1 + 2 * DAY_MILLIS);
        assert!((request.min_magnitude - 4.5).abs() < f64::EPSILON);
        assert_eq!(request.page_size, 20);
    }

    #[test]
    fn token_fills_omitted_parameters() {
        let codec = codec();
        let original = QueryRequest::new(JAN_1, JAN_1 + DAY_MILLIS, 3.25, 10);
        let token = codec
            .encode(&ResumeState::for_request(
                &original,
                vec!["20240101".to_string(), "20240102".to_string()],
                1,
                None,
            ))
            .unwrap();

        let p = EarthquakeParams {
            next_token: Some(token.clone()),
            ..params()
        };
        let request = resolve_request(&p, &codec, 0).unwrap();
        assert_eq!(request.start_time, JAN_1);
        assert_eq!(request.end_time, JAN_1 + DAY_MILLIS);
        assert!((request.min_magnitude - 3.25).abs() < f64::EPSILON);
        assert_eq!(request.page_size, 10);
        assert_eq!(request.cursor, Some(token));
    }

    #[test]
    fn supplied_parameters_override_token_values() {
        let codec = codec();
        let original = QueryRequest::new(JAN_1, JAN_1 + DAY_MILLIS, 3.25, 10);
        let token = codec
            .encode(&ResumeState::for_request(
                &original,
                vec!["20240101".to_string()],
                0,
                None,
            ))
            .unwrap();

        let p = EarthquakeParams {
            minmagnitude: Some("5".to_string()),
            next_token: Some(token),
            ..params()
        };
        let request = resolve_request(&p, &codec, 0).unwrap();
        assert!((request.min_magnitude - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn forged_token_is_rejected_during_resolution() {
        let p = EarthquakeParams {
            next_token: Some("abcd.abcd".to_string()),
            ..params()
        };
        let err = resolve_request(&p, &codec(), 0).unwrap_err();
        assert!(matches!(err, QueryError::Cursor(CursorError::InvalidSignature)));
    }

    #[test]
    fn unparseable_limit_is_invalid_request() {
        let p = EarthquakeParams {
            limit: Some("ten".to_string()),
            ..params()
        };
        let err = resolve_request(&p, &codec(), 0).unwrap_err();
        assert!(matches!(err, QueryError::InvalidRequest(_)));
    }

    #[test]
    fn error_status_codes() {
        let cases = [
            (
                QueryError::from(CursorError::InvalidSignature),
                StatusCode::BAD_REQUEST,
            ),
            (
                QueryError::from(InvalidRequest("x".to_string())),
                StatusCode::BAD_REQUEST,
            ),
            (
                QueryError::StoreUnavailable(anyhow::anyhow!("down")),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                QueryError::Internal("boom".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn page_serializes_camel_case() {
        let page = EarthquakePage::from(QueryResult {
            items: Vec::new(),
            next_cursor: Some("tok".to_string()),
            buckets_scanned: 3,
        });
        let json = serde_json::to_value(page).unwrap();
        assert_eq!(json["nextToken"], "tok");
        assert_eq!(json["bucketsScanned"], 3);
        assert_eq!(json["count"], 0);
    }
}
