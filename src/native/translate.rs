use super::{NativeResult, NativeReturn};
use crate::error::{KernalError, KernelResult};

/// Turns native return codes into [`KernalError`]s.
pub struct NativeResultTranslator;

impl NativeResultTranslator {
    /// Classifies a failing code. `Success` reaching this point is treated as
    /// a generic failure since the boundary never reports it as an error.
    pub fn translate(code: NativeResult, module: &str, func: &str) -> KernalError {
        let tag = format!("[{module}] {func}");
        match code {
            NativeResult::Success | NativeResult::Failure => KernalError::NativeFailure {
                code: NativeResult::Failure,
                message: format!("{tag}: failed"),
            },
            NativeResult::InvalidArgument => KernalError::NativeFailure {
                code,
                message: format!("{tag}: invalid argument"),
            },
            NativeResult::NotEnoughMemory => KernalError::NativeFailure {
                code,
                message: format!("{tag}: not enough memory"),
            },
            NativeResult::UnSupported => KernalError::NativeFailure {
                code,
                message: format!("{tag}: unsupported"),
            },
            NativeResult::TrackingNotRunning => KernalError::NativeFailure {
                code,
                message: format!("{tag}: tracking not running"),
            },
            NativeResult::GlassesDisconnect => {
                KernalError::GlassesConnect(format!("{tag}: glasses connect error"))
            }
            NativeResult::SdkVersionMismatch => {
                KernalError::SdkVersionMismatch(format!("{tag}: sdk version mismatch"))
            }
            NativeResult::SdcardPermissionDeny => {
                KernalError::SdcardPermissionDeny(format!("{tag}: sdcard permission denied"))
            }
            NativeResult::RgbCameraDeviceNotFind => {
                KernalError::RgbCameraNotFound(format!("{tag}: rgb camera device not found"))
            }
            NativeResult::DpDeviceNotFind => {
                KernalError::DisplayDeviceNotFound(format!("{tag}: display device not found"))
            }
            NativeResult::GetDisplayFailure => {
                KernalError::DisplayFailure(format!("{tag}: mixed-reality display not found"))
            }
            NativeResult::GetDisplayModeMismatch => KernalError::DisplayModeMismatch(format!(
                "{tag}: display mode mismatch, mixed-reality mode is needed"
            )),
            NativeResult::UnSupportedHandtrackingCalculation => {
                KernalError::UnsupportedHandtrackingCalc(format!(
                    "{tag}: hand tracking calculation not supported"
                ))
            }
        }
    }

    /// Strict mode: a failing call becomes an error for the caller to propagate.
    pub fn check<T>(ret: NativeReturn<T>, module: &str, func: &str) -> KernelResult<T> {
        ret.map_err(|code| Self::translate(code, module, func))
    }

    /// Lenient mode: a failing call is logged and reported as `None`.
    pub fn report<T>(ret: NativeReturn<T>, module: &str, func: &str) -> Option<T> {
        match ret {
            Ok(value) => Some(value),
            Err(code) => {
                log::error!("[{module}] {func}: {code}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Severity;

    #[test]
    fn check_passes_values_through() {
        let value = NativeResultTranslator::check(Ok(42u64), "tracking", "create");
        assert_eq!(value, Ok(42));
    }

    #[test]
    fn check_tags_failure_with_module_and_function() {
        let err = NativeResultTranslator::check::<()>(
            Err(NativeResult::GlassesDisconnect),
            "device",
            "start",
        )
        .unwrap_err();
        assert!(matches!(err, KernalError::GlassesConnect(_)));
        assert!(err.to_string().contains("[device] start"));
    }

    #[test]
    fn every_failure_code_has_a_classification() {
        let expectations = [
            (NativeResult::SdkVersionMismatch, Severity::High),
            (NativeResult::SdcardPermissionDeny, Severity::High),
            (NativeResult::RgbCameraDeviceNotFind, Severity::Normal),
            (NativeResult::DpDeviceNotFind, Severity::High),
            (NativeResult::GetDisplayFailure, Severity::High),
            (NativeResult::GetDisplayModeMismatch, Severity::High),
            (NativeResult::UnSupportedHandtrackingCalculation, Severity::Normal),
            (NativeResult::TrackingNotRunning, Severity::Normal),
            (NativeResult::NotEnoughMemory, Severity::High),
        ];
        for (code, severity) in expectations {
            let err = NativeResultTranslator::translate(code, "hmd", "query");
            assert_eq!(err.severity(), severity, "{code}");
        }
    }

    #[test]
    fn success_misreported_as_error_counts_as_failure() {
        let err = NativeResultTranslator::translate(NativeResult::Success, "hmd", "create");
        assert_eq!(err.native_code(), Some(NativeResult::Failure));
    }

    #[test]
    fn report_swallows_failures() {
        assert_eq!(
            NativeResultTranslator::report::<()>(Err(NativeResult::Failure), "tracking", "pause"),
            None
        );
        assert_eq!(
            NativeResultTranslator::report(Ok(3), "tracking", "pause"),
            Some(3)
        );
    }
}
