//! Error types surfaced by the playback core.
//!
//! Every user-facing failure is returned as a [`PlayerError`] to the calling
//! collaborator; none of them abort the process or leak into other sessions.

use thiserror::Error;

/// Errores del controlador de reproducción.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlayerError {
    /// The sink could not start a track. The queue has already advanced.
    #[error("No se pudo reproducir '{title}': {reason}")]
    Resolution { title: String, reason: String },

    /// The voice connection is gone. The session was forced to idle and its queue cleared.
    #[error("Conexión de voz perdida: {reason}")]
    SinkDisconnected { reason: String },

    /// The command was rejected without touching the session.
    #[error(transparent)]
    InvalidCommand(#[from] InvalidCommand),

    /// A session invariant was broken. This is a bug, never a user condition.
    #[error("Violación de concurrencia: {0}")]
    ConcurrencyViolation(String),
}

/// Motivos por los que un comando es rechazado.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvalidCommand {
    #[error("El volumen debe estar entre 0 y 100 (recibido {0})")]
    VolumeOutOfRange(i32),

    #[error("No hay nada reproduciéndose")]
    NothingPlaying,

    #[error("La reproducción no está pausada")]
    NotPaused,

    #[error("La reproducción ya está pausada")]
    AlreadyPaused,

    #[error("La cola ya está vacía")]
    QueueEmpty,

    #[error("No hay una sesión activa para este servidor")]
    NoSession,
}

impl PlayerError {
    /// True for errors that leave the session exactly as it was.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::InvalidCommand(_))
    }
}

pub type PlayerResult<T> = Result<T, PlayerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_command_converts_into_player_error() {
        let err: PlayerError = InvalidCommand::VolumeOutOfRange(150).into();
        assert!(err.is_rejection());
        assert_eq!(
            err.to_string(),
            "El volumen debe estar entre 0 y 100 (recibido 150)"
        );
    }

    #[test]
    fn test_sink_disconnected_is_not_a_rejection() {
        let err = PlayerError::SinkDisconnected {
            reason: "kicked".into(),
        };
        assert!(!err.is_rejection());
    }
}
