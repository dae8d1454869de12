//! Error types for the bridge and the plant simulator.

use thiserror::Error;

use crate::protocol::{CommandName, ResponseCode};

/// Errors surfaced by [`crate::bridge::DomeBridge`] operations.
#[derive(Debug, Error)]
pub enum DomeError {
    #[error("not connected")]
    NotConnected,
    #[error("already connected")]
    AlreadyConnected,
    #[error("command {0} has incorrect parameters: {1}")]
    BadParameters(CommandName, String),
    #[error("command {0} was sent for an incorrect state")]
    BadState(CommandName),
    #[error("command {0} was sent from an incorrect source")]
    BadSource(CommandName),
    #[error("command {0} is not supported")]
    Unsupported(CommandName),
    #[error("command {0} was not received by the rotating part")]
    RotatingNotReceived(CommandName),
    #[error("command {0} was not replied to by the rotating part")]
    RotatingNotReplied(CommandName),
    #[error("timed out waiting for a reply to {0}")]
    ReplyTimeout(CommandName),
    #[error("malformed reply: {0}")]
    MalformedReply(String),
    #[error("power management queue is full")]
    QueueFull,
    #[error("frame exceeds {0} bytes")]
    FrameTooLarge(usize),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl DomeError {
    /// The response code this error corresponds to, where one exists.
    pub fn response_code(&self) -> Option<ResponseCode> {
        match self {
            DomeError::NotConnected => Some(ResponseCode::NotConnected),
            DomeError::BadParameters(_, _) => Some(ResponseCode::BadParameters),
            DomeError::BadState(_) => Some(ResponseCode::BadState),
            DomeError::BadSource(_) => Some(ResponseCode::BadSource),
            DomeError::Unsupported(_) => Some(ResponseCode::Unsupported),
            DomeError::RotatingNotReceived(_) => Some(ResponseCode::RotatingNotReceived),
            DomeError::RotatingNotReplied(_) => Some(ResponseCode::RotatingNotReplied),
            _ => None,
        }
    }

    /// Build the error matching a non-OK response code from the controller.
    pub fn from_response_code(code: ResponseCode, command: CommandName) -> DomeError {
        match code {
            ResponseCode::Ok => unreachable!("OK is not an error"),
            ResponseCode::NotConnected => DomeError::NotConnected,
            ResponseCode::Unsupported => DomeError::Unsupported(command),
            ResponseCode::BadParameters => {
                DomeError::BadParameters(command, "rejected by the controller".into())
            }
            ResponseCode::BadSource => DomeError::BadSource(command),
            ResponseCode::BadState => DomeError::BadState(command),
            ResponseCode::RotatingNotReceived => DomeError::RotatingNotReceived(command),
            ResponseCode::RotatingNotReplied => DomeError::RotatingNotReplied(command),
        }
    }
}

/// Errors raised by the plant's command handlers. The dispatcher maps them
/// onto wire response codes.
#[derive(Debug, Error)]
pub enum PlantError {
    #[error("incorrect parameters: {0}")]
    BadParameters(String),
    #[error("incorrect state: {0}")]
    BadState(String),
}

impl PlantError {
    pub fn response_code(&self) -> ResponseCode {
        match self {
            PlantError::BadParameters(_) => ResponseCode::BadParameters,
            PlantError::BadState(_) => ResponseCode::BadState,
        }
    }
}
