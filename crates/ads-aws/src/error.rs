//! Classification of SDK failures into admin error kinds.

use std::error::Error as StdError;
use std::fmt::{Debug, Display};

use ads_provision::AdminError;
use aws_sdk_dynamodb::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};

/// What a service error means to the provisioner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Kind {
    AlreadyExists,
    NotFound,
    NotReady,
    Throttled,
    AccessDenied,
    Invalid,
}

const THROTTLING_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "TooManyRequestsException",
    "RequestLimitExceeded",
    "ProvisionedThroughputExceededException",
];

const ACCESS_DENIED_CODES: &[&str] = &[
    "AccessDenied",
    "AccessDeniedException",
    "UnrecognizedClientException",
    "InvalidClientTokenId",
    "ExpiredTokenException",
];

/// Kinds shared by every service, keyed by error code.
pub(crate) fn common_kind(code: Option<&str>) -> Option<Kind> {
    let code = code?;
    if THROTTLING_CODES.contains(&code) {
        Some(Kind::Throttled)
    } else if ACCESS_DENIED_CODES.contains(&code) {
        Some(Kind::AccessDenied)
    } else {
        None
    }
}

/// Map an SDK failure to an [`AdminError`].
///
/// `kind_of` inspects the operation's typed error; anything it does not
/// recognise falls back to the codes every service shares.
pub(crate) fn classify<E, R>(
    op: &'static str,
    err: SdkError<E, R>,
    kind_of: impl FnOnce(&E) -> Option<Kind>,
) -> AdminError
where
    E: ProvideErrorMetadata + StdError + Send + Sync + 'static,
    R: Debug + Send + Sync + 'static,
{
    let message = DisplayErrorContext(&err).to_string();
    let kind = match &err {
        SdkError::ServiceError(ctx) => kind_of(ctx.err()).or_else(|| common_kind(ctx.err().code())),
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => {
            return AdminError::Transport { op, message };
        }
        _ => None,
    };
    match kind {
        Some(Kind::AlreadyExists) => AdminError::AlreadyExists { op, message },
        Some(Kind::NotFound) => AdminError::NotFound { op, message },
        Some(Kind::NotReady) => AdminError::NotReady { op, message },
        Some(Kind::Throttled) => AdminError::Throttled { op, message },
        Some(Kind::AccessDenied) => AdminError::AccessDenied { op, message },
        Some(Kind::Invalid) => AdminError::InvalidRequest { op, message },
        None => AdminError::Backend { op, message },
    }
}

/// A request could not be assembled.
pub(crate) fn build_error(op: &'static str, err: impl Display) -> AdminError {
    AdminError::invalid(op, err.to_string())
}

/// A successful response lacked a field the provisioner needs.
pub(crate) fn missing(op: &'static str, field: &str) -> AdminError {
    AdminError::backend(op, format!("response is missing {field}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttling_and_auth_codes_are_recognised() {
        assert_eq!(common_kind(Some("Throttling")), Some(Kind::Throttled));
        assert_eq!(common_kind(Some("TooManyRequestsException")), Some(Kind::Throttled));
        assert_eq!(common_kind(Some("AccessDeniedException")), Some(Kind::AccessDenied));
        assert_eq!(common_kind(Some("ValidationException")), None);
        assert_eq!(common_kind(None), None);
    }

    #[test]
    fn missing_field_is_a_backend_error() {
        let err = missing("create_api", "id");
        assert!(matches!(err, AdminError::Backend { op: "create_api", .. }));
        assert!(err.to_string().contains("missing id"));
    }
}
