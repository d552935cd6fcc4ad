use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// What a verification code is being requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum VerificationAction {
    Registration,
    /// Any action without a dedicated mail text.
    #[serde(other)]
    Other,
}

const REGISTRATION_MESSAGE: &str =
    "You are just 1 step to get registered. Please, fill code and become our Dear User!";
const DEFAULT_MESSAGE: &str = "You are trying to do some action that requires verification. \
     Please, use current code to proceed.";

impl VerificationAction {
    /// Mail body line sent along with the code.
    pub fn message(&self) -> &'static str {
        match self {
            VerificationAction::Registration => REGISTRATION_MESSAGE,
            VerificationAction::Other => DEFAULT_MESSAGE,
        }
    }
}
