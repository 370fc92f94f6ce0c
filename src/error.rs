use sea_orm::DbErr;

/// Coarse classification used by callers that map failures onto a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Authorization,
    Resource,
    Infrastructure,
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("user not found")]
    UserNotFound,
    #[error("user account is inactive")]
    UserInactive,

    #[error("user already has a waiting match request")]
    AlreadyQueued,
    #[error("{0} is already resolved")]
    AlreadyResolved(&'static str),
    #[error("tournament is full")]
    TournamentFull,
    #[error("tournament is not accepting participants")]
    NotAcceptingParticipants,
    #[error("game is not in progress")]
    GameNotInProgress,
    #[error("game has already started")]
    GameAlreadyStarted,
    #[error("invite has expired")]
    InviteExpired,
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("forbidden")]
    Forbidden,
    #[error("unauthorized")]
    Unauthorized,
    #[error("user is not a participant")]
    NotAParticipant,

    #[error("insufficient funds")]
    InsufficientFunds,

    #[error("database error: {0}")]
    Database(#[from] DbErr),
    #[error("storage error: {0}")]
    Storage(String),
}

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound(_) | Self::UserNotFound => ErrorKind::NotFound,
            Self::AlreadyQueued
            | Self::AlreadyResolved(_)
            | Self::TournamentFull
            | Self::NotAcceptingParticipants
            | Self::GameNotInProgress
            | Self::GameAlreadyStarted
            | Self::InviteExpired
            | Self::InvalidState(_) => ErrorKind::Conflict,
            Self::Forbidden | Self::Unauthorized | Self::NotAParticipant => {
                ErrorKind::Authorization
            }
            Self::InsufficientFunds | Self::UserInactive => ErrorKind::Resource,
            Self::Database(_) | Self::Storage(_) => ErrorKind::Infrastructure,
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_the_taxonomy() {
        assert_eq!(CoreError::validation("x").kind(), ErrorKind::Validation);
        assert_eq!(CoreError::AlreadyQueued.kind(), ErrorKind::Conflict);
        assert_eq!(CoreError::NotAParticipant.kind(), ErrorKind::Authorization);
        assert_eq!(CoreError::InsufficientFunds.kind(), ErrorKind::Resource);
        assert_eq!(
            CoreError::Database(DbErr::Custom("down".into())).kind(),
            ErrorKind::Infrastructure
        );
    }
}
