//! Wire-stable phase enumerations (spec §6). Every variant serializes to the
//! exact string named in the spec so older/newer hosts can interoperate.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationPhase {
    #[serde(rename = "STEP_1_WEBAUTHN_VERIFICATION")]
    WebauthnVerification,
    #[serde(rename = "STEP_2_KEY_GENERATION")]
    KeyGeneration,
    #[serde(rename = "STEP_3_ACCESS_KEY_ADDITION")]
    AccessKeyAddition,
    #[serde(rename = "STEP_4_ACCOUNT_VERIFICATION")]
    AccountVerification,
    #[serde(rename = "STEP_5_DATABASE_STORAGE")]
    DatabaseStorage,
    #[serde(rename = "STEP_6_CONTRACT_REGISTRATION")]
    ContractRegistration,
    #[serde(rename = "STEP_7_REGISTRATION_COMPLETE")]
    RegistrationComplete,
    #[serde(rename = "REGISTRATION_ERROR")]
    RegistrationError,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoginPhase {
    #[serde(rename = "STEP_1_PREPARATION")]
    Preparation,
    #[serde(rename = "STEP_2_WEBAUTHN_ASSERTION")]
    WebauthnAssertion,
    #[serde(rename = "STEP_3_VRF_UNLOCK")]
    VrfUnlock,
    #[serde(rename = "STEP_4_LOGIN_COMPLETE")]
    LoginComplete,
    #[serde(rename = "LOGIN_ERROR")]
    LoginError,
}

/// Signing/action phases (§4.8, §6 "Action: STEP_1..STEP_9_ACTION_COMPLETE").
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionPhase {
    #[serde(rename = "STEP_1_PREPARATION")]
    Preparation,
    #[serde(rename = "STEP_2_USER_CONFIRMATION")]
    UserConfirmation,
    #[serde(rename = "STEP_3_CONTRACT_VERIFICATION")]
    ContractVerification,
    #[serde(rename = "STEP_4_WEBAUTHN_AUTHENTICATION")]
    WebauthnAuthentication,
    #[serde(rename = "STEP_5_AUTHENTICATION_COMPLETE")]
    AuthenticationComplete,
    #[serde(rename = "STEP_6_TRANSACTION_SIGNING_PROGRESS")]
    TransactionSigningProgress,
    #[serde(rename = "STEP_7_TRANSACTION_SIGNING_COMPLETE")]
    TransactionSigningComplete,
    #[serde(rename = "STEP_8_BROADCASTING")]
    Broadcasting,
    #[serde(rename = "STEP_9_ACTION_COMPLETE")]
    ActionComplete,
    #[serde(rename = "ACTION_ERROR")]
    ActionError,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceLinkingPhase {
    #[serde(rename = "IDLE")]
    Idle,
    #[serde(rename = "STEP_1_QR_CODE_GENERATED")]
    QrCodeGenerated,
    #[serde(rename = "STEP_2_SCANNING")]
    Scanning,
    #[serde(rename = "STEP_3_AUTHORIZATION")]
    Authorization,
    #[serde(rename = "STEP_4_POLLING")]
    Polling,
    #[serde(rename = "STEP_5_ADDKEY_DETECTED")]
    AddKeyDetected,
    #[serde(rename = "STEP_6_REGISTRATION")]
    Registration,
    #[serde(rename = "STEP_7_LINKING_COMPLETE")]
    LinkingComplete,
    #[serde(rename = "STEP_8_AUTO_LOGIN")]
    AutoLogin,
    #[serde(rename = "REGISTRATION_ERROR")]
    RegistrationError,
    #[serde(rename = "LOGIN_ERROR")]
    LoginError,
    #[serde(rename = "DEVICE_LINKING_ERROR")]
    DeviceLinkingError,
}

impl DeviceLinkingPhase {
    pub fn is_terminal_error(self) -> bool {
        matches!(
            self,
            DeviceLinkingPhase::RegistrationError
                | DeviceLinkingPhase::LoginError
                | DeviceLinkingPhase::DeviceLinkingError
        )
    }
}

/// Status discriminant carried alongside every phase in a PROGRESS envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Progress,
    Success,
    Error,
}
