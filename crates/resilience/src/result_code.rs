//! Directory protocol result codes.
//!
//! Every failed directory operation carries a [`ResultCode`]. Retry
//! decisions are a plain set lookup on this code (see
//! [`RetryPolicy::is_retryable`](crate::RetryPolicy::is_retryable)).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

macro_rules! result_codes {
    ($( $(#[$meta:meta])* $variant:ident = $code:literal => $name:literal, )+) => {
        /// LDAP result code, including the client-side codes (80 and above).
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(rename_all = "snake_case")]
        pub enum ResultCode {
            $( $(#[$meta])* $variant, )+
        }

        impl ResultCode {
            /// Every known code, in ascending numeric order.
            pub const ALL: &'static [Self] = &[$( Self::$variant, )+];

            /// Numeric value as it appears on the wire.
            #[must_use]
            pub const fn code(self) -> u16 {
                match self {
                    $( Self::$variant => $code, )+
                }
            }

            /// Looks up a code by its numeric value.
            #[must_use]
            pub const fn from_code(code: u16) -> Option<Self> {
                match code {
                    $( $code => Some(Self::$variant), )+
                    _ => None,
                }
            }

            /// Configuration key, identical to the serde representation.
            #[must_use]
            pub const fn name(self) -> &'static str {
                match self {
                    $( Self::$variant => $name, )+
                }
            }
        }
    };
}

result_codes! {
    /// The operation completed.
    Success = 0 => "success",
    OperationsError = 1 => "operations_error",
    /// The server received malformed or out-of-sequence data.
    ProtocolError = 2 => "protocol_error",
    TimeLimitExceeded = 3 => "time_limit_exceeded",
    SizeLimitExceeded = 4 => "size_limit_exceeded",
    CompareFalse = 5 => "compare_false",
    CompareTrue = 6 => "compare_true",
    AuthMethodNotSupported = 7 => "auth_method_not_supported",
    StrongAuthRequired = 8 => "strong_auth_required",
    PartialResults = 9 => "partial_results",
    Referral = 10 => "referral",
    AdminLimitExceeded = 11 => "admin_limit_exceeded",
    UnavailableCriticalExtension = 12 => "unavailable_critical_extension",
    ConfidentialityRequired = 13 => "confidentiality_required",
    SaslBindInProgress = 14 => "sasl_bind_in_progress",
    NoSuchAttribute = 16 => "no_such_attribute",
    UndefinedAttributeType = 17 => "undefined_attribute_type",
    InappropriateMatching = 18 => "inappropriate_matching",
    ConstraintViolation = 19 => "constraint_violation",
    AttributeOrValueExists = 20 => "attribute_or_value_exists",
    InvalidAttributeSyntax = 21 => "invalid_attribute_syntax",
    NoSuchObject = 32 => "no_such_object",
    AliasProblem = 33 => "alias_problem",
    InvalidDnSyntax = 34 => "invalid_dn_syntax",
    IsLeaf = 35 => "is_leaf",
    AliasDereferencingProblem = 36 => "alias_dereferencing_problem",
    InappropriateAuthentication = 48 => "inappropriate_authentication",
    InvalidCredentials = 49 => "invalid_credentials",
    InsufficientAccessRights = 50 => "insufficient_access_rights",
    /// The server is too busy to service the operation.
    Busy = 51 => "busy",
    /// The server is shutting down or a required subsystem is down.
    Unavailable = 52 => "unavailable",
    UnwillingToPerform = 53 => "unwilling_to_perform",
    LoopDetect = 54 => "loop_detect",
    NamingViolation = 64 => "naming_violation",
    ObjectClassViolation = 65 => "object_class_violation",
    NotAllowedOnNonleaf = 66 => "not_allowed_on_nonleaf",
    NotAllowedOnRdn = 67 => "not_allowed_on_rdn",
    EntryAlreadyExists = 68 => "entry_already_exists",
    ObjectClassModsProhibited = 69 => "object_class_mods_prohibited",
    AffectsMultipleDsas = 71 => "affects_multiple_dsas",
    Other = 80 => "other",
    /// The connection to the server was lost.
    ServerDown = 81 => "server_down",
    LocalError = 82 => "local_error",
    EncodingError = 83 => "encoding_error",
    DecodingError = 84 => "decoding_error",
    /// The client gave up waiting for a response.
    LdapTimeout = 85 => "ldap_timeout",
    AuthUnknown = 86 => "auth_unknown",
    FilterError = 87 => "filter_error",
    UserCancelled = 88 => "user_cancelled",
    ParamError = 89 => "param_error",
    NoMemory = 90 => "no_memory",
    /// The client could not establish a connection.
    ConnectError = 91 => "connect_error",
    LdapNotSupported = 92 => "ldap_not_supported",
    ControlNotFound = 93 => "control_not_found",
    NoResultsReturned = 94 => "no_results_returned",
    MoreResultsToReturn = 95 => "more_results_to_return",
    ClientLoop = 96 => "client_loop",
    ReferralLimitExceeded = 97 => "referral_limit_exceeded",
    InvalidResponse = 100 => "invalid_response",
    AmbiguousResponse = 101 => "ambiguous_response",
    TlsNotSupported = 112 => "tls_not_supported",
}

impl ResultCode {
    /// Codes that indicate a transient server or transport condition.
    pub const TRANSIENT: &'static [Self] = &[
        Self::ProtocolError,
        Self::Busy,
        Self::Unavailable,
        Self::ServerDown,
        Self::ConnectError,
    ];

    /// Whether the code signals a completed operation rather than a failure.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success | Self::CompareFalse | Self::CompareTrue)
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.code())
    }
}

impl FromStr for ResultCode {
    type Err = ConfigError;

    /// Accepts either the configuration key (`"server_down"`) or the numeric
    /// value (`"81"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(code) = s.parse::<u16>() {
            return Self::from_code(code).ok_or_else(|| {
                ConfigError::validation("result_code", format!("unknown result code {code}"))
            });
        }
        Self::ALL
            .iter()
            .copied()
            .find(|rc| rc.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                ConfigError::validation("result_code", format!("unknown result code '{s}'"))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn numeric_lookup_matches_every_variant() {
        for &rc in ResultCode::ALL {
            assert_eq!(ResultCode::from_code(rc.code()), Some(rc));
        }
        assert_eq!(ResultCode::from_code(15), None);
        assert_eq!(ResultCode::from_code(999), None);
    }

    #[test]
    fn names_match_serde_representation() {
        for &rc in ResultCode::ALL {
            let json = serde_json::to_string(&rc).unwrap();
            assert_eq!(json, format!("\"{}\"", rc.name()));
        }
    }

    #[test]
    fn all_is_sorted_by_code() {
        assert!(ResultCode::ALL.windows(2).all(|w| w[0].code() < w[1].code()));
        assert_eq!(ResultCode::ALL.len(), 61);
    }

    #[test]
    fn parses_names_and_numbers() {
        assert_eq!("server_down".parse::<ResultCode>().unwrap(), ResultCode::ServerDown);
        assert_eq!("BUSY".parse::<ResultCode>().unwrap(), ResultCode::Busy);
        assert_eq!("91".parse::<ResultCode>().unwrap(), ResultCode::ConnectError);
        assert!("no_such_code".parse::<ResultCode>().is_err());
        assert!("15".parse::<ResultCode>().is_err());
    }

    #[test]
    fn display_includes_code() {
        assert_eq!(ResultCode::Unavailable.to_string(), "unavailable (52)");
    }
}
