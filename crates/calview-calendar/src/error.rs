//! Calendar-specific error types.

use calview_core::{AppError, AuthError, NetworkError, ReqwestErrorExt};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CalendarError {
    /// Throttled, either by Graph (HTTP 429) or by the local request quota.
    #[error("Rate limited ({}), retry after {}", origin_label(.local), fmt_retry_after(.retry_after))]
    RateLimited {
        retry_after: Option<u64>,
        local: bool,
    },

    #[error("Token expired or invalid")]
    Unauthorized,

    #[error("Insufficient permission to read the calendar")]
    Forbidden,

    #[error("Server error: {status} - {message}")]
    Server { status: u16, message: String },

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Invalid event data: {0}")]
    InvalidEventData(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

fn origin_label(local: &bool) -> &'static str {
    if *local {
        "local quota"
    } else {
        "server"
    }
}

fn fmt_retry_after(retry_after: &Option<u64>) -> String {
    match retry_after {
        Some(secs) => format!("{} seconds", secs),
        None => "an unspecified delay".to_string(),
    }
}

/// How the retry loop treats an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Throttled; carries the suggested wait in seconds when one was given.
    RateLimit(Option<u64>),
    /// Connection failure or 5xx; retried only when configured to.
    Transient,
    /// Retrying will not help.
    Fatal,
}

impl CalendarError {
    pub fn classify(&self) -> ErrorClass {
        match self {
            Self::RateLimited { retry_after, .. } => ErrorClass::RateLimit(*retry_after),
            Self::Server { .. } => ErrorClass::Transient,
            Self::NetworkError(e) if e.is_timeout() || e.is_connect() => ErrorClass::Transient,
            _ => ErrorClass::Fatal,
        }
    }

    /// User-friendly error message for UI display.
    pub fn user_message(&self) -> String {
        match self {
            Self::RateLimited {
                retry_after: Some(secs),
                ..
            } => format!("Too many requests. Please wait {} seconds.", secs),
            Self::RateLimited { .. } => "Too many requests. Please wait a moment.".to_string(),
            Self::Unauthorized => "Your session has expired. Please sign in again.".to_string(),
            Self::Forbidden => {
                "Calendar access was not granted. Please sign in again and allow calendar access."
                    .to_string()
            }
            Self::Server { .. } => {
                "Microsoft Graph is having problems. Please try again later.".to_string()
            }
            Self::ApiError(msg) => format!("Calendar error: {}", msg),
            Self::InvalidEventData(msg) => format!("Invalid event: {}", msg),
            Self::NetworkError(_) => "Network error. Check your connection.".to_string(),
        }
    }

    /// Whether the user has to sign in again.
    pub fn should_refresh_token(&self) -> bool {
        matches!(self, Self::Unauthorized | Self::Forbidden)
    }

    /// Whether this error can ever be retried.
    pub fn is_retryable(&self) -> bool {
        self.classify() != ErrorClass::Fatal
    }
}

/// Terminal outcome of a retried fetch.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Gave up after {attempts} attempts: {last_error}")]
    RetryExhausted {
        attempts: u32,
        last_error: Box<CalendarError>,
    },

    #[error(transparent)]
    Fatal(CalendarError),

    #[error("Fetch cancelled")]
    Cancelled,
}

impl FetchError {
    /// 401/403: surfaced to the user, never hidden behind placeholder data.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Fatal(e) if e.should_refresh_token())
    }

    /// Retries ran out because the API kept throttling.
    pub fn is_rate_limit_exhausted(&self) -> bool {
        matches!(
            self,
            Self::RetryExhausted { last_error, .. } if matches!(**last_error, CalendarError::RateLimited { .. })
        )
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::RetryExhausted { last_error, .. } => last_error.user_message(),
            Self::Fatal(e) => e.user_message(),
            Self::Cancelled => "Loading was cancelled.".to_string(),
        }
    }
}

impl From<CalendarError> for AppError {
    fn from(e: CalendarError) -> Self {
        match e {
            CalendarError::RateLimited { retry_after, .. } => AppError::RateLimited {
                retry_after_secs: retry_after.unwrap_or(0),
            },
            CalendarError::Unauthorized => AppError::Auth(AuthError::TokenExpired),
            CalendarError::Forbidden => AppError::Auth(AuthError::PermissionDenied),
            CalendarError::Server { status, message } => {
                AppError::Network(NetworkError::ServerError { status, message })
            }
            CalendarError::ApiError(msg) => AppError::Service(msg),
            CalendarError::InvalidEventData(msg) => {
                AppError::Network(NetworkError::InvalidResponse(msg))
            }
            CalendarError::NetworkError(e) => AppError::Network(e.into_network_error()),
        }
    }
}

impl From<FetchError> for AppError {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::RetryExhausted { last_error, .. } => (*last_error).into(),
            FetchError::Fatal(e) => e.into(),
            FetchError::Cancelled => AppError::Service("Calendar fetch cancelled".into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_limited(secs: u64) -> CalendarError {
        CalendarError::RateLimited {
            retry_after: Some(secs),
            local: false,
        }
    }

    #[test]
    fn test_error_user_messages() {
        assert!(CalendarError::Unauthorized.user_message().contains("sign in"));
        assert!(server_limited(30).user_message().contains("30"));
        assert!(CalendarError::Forbidden.user_message().contains("access"));
    }

    #[test]
    fn test_classify() {
        assert_eq!(server_limited(5).classify(), ErrorClass::RateLimit(Some(5)));
        assert_eq!(
            CalendarError::RateLimited {
                retry_after: None,
                local: true
            }
            .classify(),
            ErrorClass::RateLimit(None)
        );
        assert_eq!(
            CalendarError::Server {
                status: 503,
                message: String::new()
            }
            .classify(),
            ErrorClass::Transient
        );
        assert_eq!(CalendarError::Unauthorized.classify(), ErrorClass::Fatal);
        assert_eq!(CalendarError::Forbidden.classify(), ErrorClass::Fatal);
        assert_eq!(
            CalendarError::ApiError("400".into()).classify(),
            ErrorClass::Fatal
        );
    }

    #[test]
    fn test_should_refresh_token() {
        assert!(CalendarError::Unauthorized.should_refresh_token());
        assert!(CalendarError::Forbidden.should_refresh_token());
        assert!(!server_limited(1).should_refresh_token());
    }

    #[test]
    fn test_is_retryable() {
        assert!(server_limited(10).is_retryable());
        assert!(!CalendarError::InvalidEventData("x".into()).is_retryable());
        assert!(!CalendarError::Unauthorized.is_retryable());
    }

    #[test]
    fn test_fetch_error_kinds() {
        let exhausted = FetchError::RetryExhausted {
            attempts: 3,
            last_error: Box::new(server_limited(5)),
        };
        assert!(exhausted.is_rate_limit_exhausted());
        assert!(!exhausted.is_auth_failure());

        let auth = FetchError::Fatal(CalendarError::Unauthorized);
        assert!(auth.is_auth_failure());
        assert!(!auth.is_rate_limit_exhausted());

        let transient = FetchError::RetryExhausted {
            attempts: 3,
            last_error: Box::new(CalendarError::Server {
                status: 502,
                message: String::new(),
            }),
        };
        assert!(!transient.is_rate_limit_exhausted());
    }

    #[test]
    fn test_app_error_mapping() {
        let app: AppError = CalendarError::Unauthorized.into();
        assert!(app.requires_reauthentication());

        let app: AppError = FetchError::RetryExhausted {
            attempts: 3,
            last_error: Box::new(server_limited(7)),
        }
        .into();
        assert!(matches!(
            app,
            AppError::RateLimited {
                retry_after_secs: 7
            }
        ));
    }

    #[test]
    fn test_rate_limited_display() {
        let local = CalendarError::RateLimited {
            retry_after: Some(50),
            local: true,
        };
        assert_eq!(
            local.to_string(),
            "Rate limited (local quota), retry after 50 seconds"
        );
    }
}
