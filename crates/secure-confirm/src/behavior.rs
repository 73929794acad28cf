//! §4.8 step 2: how the confirmation UI resolves before a WebAuthn ceremony
//! can start. WebAuthn requires a recent user activation, so `autoProceed`
//! is only honored on platforms where a timer-fired call still counts as one.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfirmationBehavior {
    /// Resolution waits for an explicit click on the confirmation UI.
    RequireClick,
    /// Resolution proceeds automatically after `delay_ms` unless overridden
    /// by [`resolve_behavior`].
    AutoProceed { delay_ms: u64 },
}

/// The platform facts needed to decide whether `autoProceed` is safe,
/// injected by the caller rather than read from `navigator.userAgent`
/// directly (spec §9 "Ambient global state").
#[derive(Clone, Copy, Debug, Default)]
pub struct Platform {
    pub is_safari: bool,
    pub is_ios: bool,
}

impl Platform {
    fn forces_explicit_activation(self) -> bool {
        self.is_safari && self.is_ios
    }
}

/// Safari on iOS requires the WebAuthn call to be the direct result of a
/// user gesture; a delay-then-proceed timer breaks that chain, so the
/// requested behavior is downgraded to `RequireClick` there regardless of
/// what the caller asked for.
pub fn resolve_behavior(requested: ConfirmationBehavior, platform: Platform) -> ConfirmationBehavior {
    match requested {
        ConfirmationBehavior::AutoProceed { .. } if platform.forces_explicit_activation() => {
            ConfirmationBehavior::RequireClick
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_proceed_survives_on_non_safari_ios_platforms() {
        let resolved = resolve_behavior(
            ConfirmationBehavior::AutoProceed { delay_ms: 400 },
            Platform { is_safari: false, is_ios: false },
        );
        assert_eq!(resolved, ConfirmationBehavior::AutoProceed { delay_ms: 400 });
    }

    #[test]
    fn auto_proceed_is_forced_to_require_click_on_safari_ios() {
        let resolved = resolve_behavior(
            ConfirmationBehavior::AutoProceed { delay_ms: 400 },
            Platform { is_safari: true, is_ios: true },
        );
        assert_eq!(resolved, ConfirmationBehavior::RequireClick);
    }

    #[test]
    fn require_click_is_never_overridden() {
        let resolved = resolve_behavior(ConfirmationBehavior::RequireClick, Platform { is_safari: true, is_ios: true });
        assert_eq!(resolved, ConfirmationBehavior::RequireClick);
    }

    #[test]
    fn safari_on_desktop_does_not_force_explicit_activation() {
        let resolved = resolve_behavior(
            ConfirmationBehavior::AutoProceed { delay_ms: 100 },
            Platform { is_safari: true, is_ios: false },
        );
        assert_eq!(resolved, ConfirmationBehavior::AutoProceed { delay_ms: 100 });
    }
}
