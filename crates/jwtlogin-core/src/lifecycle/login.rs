use crate::api::AuthError;

/// Why a login attempt failed, as shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginFailure {
    InvalidCredentials,
    NoInternet,
    UnknownError,
}

impl LoginFailure {
    pub fn message(&self) -> &'static str {
        match self {
            LoginFailure::InvalidCredentials => "Invalid username or password",
            LoginFailure::NoInternet => "No internet connection",
            LoginFailure::UnknownError => "Something went wrong. Please try again.",
        }
    }
}

impl From<&AuthError> for LoginFailure {
    fn from(err: &AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => LoginFailure::InvalidCredentials,
            AuthError::NetworkUnavailable(_) => LoginFailure::NoInternet,
            AuthError::UnknownService(_) => LoginFailure::UnknownError,
        }
    }
}

/// Login flow state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoginState {
    #[default]
    Idle,
    Submitting,
    Success,
    Failed(LoginFailure),
}

impl LoginState {
    /// Whether a progress indicator should be shown
    pub fn is_loading(&self) -> bool {
        matches!(self, LoginState::Submitting)
    }

    pub fn failure(&self) -> Option<LoginFailure> {
        match self {
            LoginState::Failed(reason) => Some(*reason),
            LoginState::Idle | LoginState::Submitting | LoginState::Success => None,
        }
    }
}
