//! Error taxonomy.
//!
//! Two layers, per §A.1:
//!
//! - [`ErrorCode`]: the small, wire-stable `u16` taxonomy from §6,
//!   carried in reply packets and observed by clients/peers.
//! - Per-subsystem `thiserror` enums ([`StageError`], [`DispatchError`],
//!   [`SessionError`]): internal, never serialized, converted to the
//!   nearest `ErrorCode` at the dispatch boundary.

// Layer 1: Standard library imports
use std::error::Error as StdError;

// Layer 2: Third-party crate imports
use thiserror::Error;

// Layer 3: Internal module imports
use crate::util::StageId;

/// Wire-visible reply status (§6, "Error taxonomy").
///
/// Numeric values are fixed and stable across protocol versions
/// (§B.3): `success` is always `0`, each subsequent taxonomy
/// entry takes the next value in the order §6 lists them, and
/// `internal_error` is pinned to `0xFFFF` so new variants never renumber it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    Success = 0,
    RequestTimeout = 1,
    StageNotFound = 2,
    StageAlreadyExists = 3,
    InvalidStageType = 4,
    StageCreationFailed = 5,
    AuthenticationFailed = 6,
    InvalidAccountId = 7,
    JoinStageRejected = 8,
    InternalError = 0xFFFF,
}

impl ErrorCode {
    pub const fn code(self) -> u16 {
        self as u16
    }

    pub fn from_code(code: u16) -> Self {
        match code {
            0 => ErrorCode::Success,
            1 => ErrorCode::RequestTimeout,
            2 => ErrorCode::StageNotFound,
            3 => ErrorCode::StageAlreadyExists,
            4 => ErrorCode::InvalidStageType,
            5 => ErrorCode::StageCreationFailed,
            6 => ErrorCode::AuthenticationFailed,
            7 => ErrorCode::InvalidAccountId,
            8 => ErrorCode::JoinStageRejected,
            _ => ErrorCode::InternalError,
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, ErrorCode::Success)
    }
}

impl Default for ErrorCode {
    fn default() -> Self {
        ErrorCode::Success
    }
}

/// Errors raised while creating, routing within, or tearing down a stage.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("stage {0} not found")]
    NotFound(StageId),

    #[error("stage {0} already exists")]
    AlreadyExists(StageId),

    #[error("unknown stage type: {0}")]
    InvalidStageType(String),

    #[error("stage {stage_id} creation failed: {source}")]
    CreationFailed {
        stage_id: StageId,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    #[error("join rejected for stage {stage_id}")]
    JoinRejected { stage_id: StageId },

    #[error("stage {0} is shutting down")]
    ShuttingDown(StageId),
}

impl StageError {
    pub fn to_error_code(&self) -> ErrorCode {
        match self {
            StageError::NotFound(_) => ErrorCode::StageNotFound,
            StageError::AlreadyExists(_) => ErrorCode::StageAlreadyExists,
            StageError::InvalidStageType(_) => ErrorCode::InvalidStageType,
            StageError::CreationFailed { .. } => ErrorCode::StageCreationFailed,
            StageError::JoinRejected { .. } => ErrorCode::JoinStageRejected,
            StageError::ShuttingDown(_) => ErrorCode::InternalError,
        }
    }

    /// Fatal bugs per §7: corrupt framing from a trusted peer,
    /// double timer creation. Not meant to be recoverable; callers should
    /// log loudly and contain rather than propagate to a client.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, StageError::ShuttingDown(_))
    }
}

/// Errors raised while routing a packet through the [`crate::dispatcher`].
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Stage(#[from] StageError),

    #[error("request {0} timed out")]
    RequestTimeout(crate::util::MsgSeq),

    #[error("no peer available for service ({server_type}, {service_id})")]
    NoPeerAvailable { server_type: String, service_id: u16 },
}

impl DispatchError {
    pub fn to_error_code(&self) -> ErrorCode {
        match self {
            DispatchError::Stage(e) => e.to_error_code(),
            DispatchError::RequestTimeout(_) => ErrorCode::RequestTimeout,
            DispatchError::NoPeerAvailable { .. } => ErrorCode::InternalError,
        }
    }
}

/// Errors raised at the session/transport boundary (§4.9).
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("account id was not set by on_authenticate")]
    MissingAccountId,

    #[error("message id {0} is not permitted before authentication")]
    PreAuthMessageRejected(String),

    #[error("frame exceeds max_packet_size ({size} > {max})")]
    FrameTooLarge { size: u32, max: u32 },

    #[error("frame length is zero")]
    EmptyFrame,

    #[error("msg_id_len must be greater than zero")]
    EmptyMsgId,

    #[error("msg_id is not valid UTF-8")]
    InvalidMsgIdEncoding,
}

impl SessionError {
    pub fn to_error_code(&self) -> ErrorCode {
        match self {
            SessionError::AuthenticationFailed => ErrorCode::AuthenticationFailed,
            SessionError::MissingAccountId => ErrorCode::InvalidAccountId,
            _ => ErrorCode::InternalError,
        }
    }
}
