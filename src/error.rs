use crate::native::NativeResult;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    Normal,
    High,
}

/// Classified failure raised by a native call or a violated precondition.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KernalError {
    #[error("missing key component: {0}")]
    MissingComponent(String),
    #[error("unsupported device: {0}")]
    UnsupportedDevice(String),
    #[error("glasses connect error: {0}")]
    GlassesConnect(String),
    #[error("glasses not available: {0}")]
    GlassesNotAvailable(String),
    #[error("sdk version mismatch: {0}")]
    SdkVersionMismatch(String),
    #[error("sdcard permission denied: {0}")]
    SdcardPermissionDeny(String),
    #[error("rgb camera not found: {0}")]
    RgbCameraNotFound(String),
    #[error("display device not found: {0}")]
    DisplayDeviceNotFound(String),
    #[error("display failure: {0}")]
    DisplayFailure(String),
    #[error("display mode mismatch: {0}")]
    DisplayModeMismatch(String),
    #[error("hand tracking calculation unsupported: {0}")]
    UnsupportedHandtrackingCalc(String),
    #[error("native failure {code}: {message}")]
    NativeFailure { code: NativeResult, message: String },
}

pub type KernelResult<T> = Result<T, KernalError>;

const GLASSES_DISCONNECT_TIP: &str =
    "The glasses were disconnected. Reconnect them and restart the application.";
const GLASSES_NOT_AVAILABLE_TIP: &str =
    "The glasses are not available. Check the connection and restart the application.";
const SDK_VERSION_MISMATCH_TIP: &str =
    "The runtime version does not match this application. Update the runtime and try again.";
const SDCARD_PERMISSION_DENY_TIP: &str =
    "Storage permission was denied. Grant the permission and restart the application.";
const UNSUPPORTED_DEVICE_TIP: &str = "This application does not support the connected device.";
const DISPLAY_DEVICE_NOT_FOUND_TIP: &str =
    "No display device was found. Check the cable and restart the application.";
const DISPLAY_FAILURE_TIP: &str = "The mixed-reality display could not be acquired.";
const DISPLAY_MODE_MISMATCH_TIP: &str =
    "The display mode does not match. Switch the glasses to mixed-reality mode.";
const UNKNOWN_ERROR_TIP: &str = "An unknown error occurred. Restart the application.";

impl KernalError {
    pub fn severity(&self) -> Severity {
        match self {
            KernalError::RgbCameraNotFound(_) | KernalError::UnsupportedHandtrackingCalc(_) => {
                Severity::Normal
            }
            KernalError::NativeFailure {
                code: NativeResult::TrackingNotRunning,
                ..
            } => Severity::Normal,
            _ => Severity::High,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::High
    }

    /// Native return code behind this error, when it came from a native call.
    pub fn native_code(&self) -> Option<NativeResult> {
        match self {
            KernalError::NativeFailure { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// User-facing classification; native failures carry their numeric code.
    pub fn tip(&self) -> String {
        let tip = match self {
            KernalError::GlassesConnect(_) => GLASSES_DISCONNECT_TIP,
            KernalError::GlassesNotAvailable(_) => GLASSES_NOT_AVAILABLE_TIP,
            KernalError::SdkVersionMismatch(_) => SDK_VERSION_MISMATCH_TIP,
            KernalError::SdcardPermissionDeny(_) => SDCARD_PERMISSION_DENY_TIP,
            KernalError::UnsupportedDevice(_) => UNSUPPORTED_DEVICE_TIP,
            KernalError::DisplayDeviceNotFound(_) => DISPLAY_DEVICE_NOT_FOUND_TIP,
            KernalError::DisplayFailure(_) => DISPLAY_FAILURE_TIP,
            KernalError::DisplayModeMismatch(_) => DISPLAY_MODE_MISMATCH_TIP,
            _ => UNKNOWN_ERROR_TIP,
        };

        match self.native_code() {
            Some(code) => format!("{tip}({})", code.code()),
            None => tip.to_string(),
        }
    }
}

/// What the terminal error handler receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    pub error: KernalError,
    pub severity: Severity,
    pub tip: String,
}

impl From<KernalError> for ErrorReport {
    fn from(error: KernalError) -> Self {
        Self {
            severity: error.severity(),
            tip: error.tip(),
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camera_and_hand_tracking_errors_are_recoverable() {
        assert_eq!(
            KernalError::RgbCameraNotFound("x".into()).severity(),
            Severity::Normal
        );
        assert_eq!(
            KernalError::UnsupportedHandtrackingCalc("x".into()).severity(),
            Severity::Normal
        );
        assert!(KernalError::UnsupportedDevice("x".into()).is_fatal());
        assert!(KernalError::GlassesConnect("x".into()).is_fatal());
    }

    #[test]
    fn tracking_not_running_is_the_only_recoverable_native_failure() {
        let soft = KernalError::NativeFailure {
            code: NativeResult::TrackingNotRunning,
            message: "recenter".into(),
        };
        let hard = KernalError::NativeFailure {
            code: NativeResult::NotEnoughMemory,
            message: "start".into(),
        };
        assert_eq!(soft.severity(), Severity::Normal);
        assert_eq!(hard.severity(), Severity::High);
    }

    #[test]
    fn native_failure_tip_appends_code() {
        let err = KernalError::NativeFailure {
            code: NativeResult::InvalidArgument,
            message: "[tracking] init: invalid argument".into(),
        };
        assert_eq!(err.tip(), format!("{UNKNOWN_ERROR_TIP}(2)"));
        assert_eq!(
            KernalError::DisplayModeMismatch(String::new()).tip(),
            DISPLAY_MODE_MISMATCH_TIP
        );
    }

    #[test]
    fn report_carries_classification() {
        let report = ErrorReport::from(KernalError::UnsupportedDevice("NrealAir".into()));
        assert_eq!(report.severity, Severity::High);
        assert_eq!(report.tip, UNSUPPORTED_DEVICE_TIP);
        assert!(report.error.to_string().contains("NrealAir"));
    }
}
