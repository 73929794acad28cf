//! §4.2 OverlayController: hidden/fullscreen/anchored visibility of the
//! wallet iframe through a single CSP-safe stylesheet.

pub mod rect;
#[cfg(target_arch = "wasm32")]
pub mod dom;

pub use rect::AnchorRect;

use log::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverlayMode {
    Hidden,
    Fullscreen,
    Anchored,
}

/// Anything that can apply a single CSS rule body as the overlay's one
/// stylesheet rule (constructable `CSSStyleSheet` where supported, a nonced
/// `<style>` tag otherwise). Injected so the mode/sticky state machine below
/// is host-testable without a DOM.
pub trait StyleSheetHandle {
    fn replace_rule(&mut self, css: &str);
    fn set_aria_hidden(&mut self, hidden: bool);
    fn set_tabindex(&mut self, tabindex: Option<i32>);
}

/// An in-memory `StyleSheetHandle` used by tests and as a documentation
/// fixture for the trait's expected call pattern.
#[derive(Default)]
pub struct RecordingStyleSheet {
    pub last_css: Option<String>,
    pub aria_hidden: bool,
    pub tabindex: Option<i32>,
}

impl StyleSheetHandle for RecordingStyleSheet {
    fn replace_rule(&mut self, css: &str) {
        self.last_css = Some(css.to_string());
    }
    fn set_aria_hidden(&mut self, hidden: bool) {
        self.aria_hidden = hidden;
    }
    fn set_tabindex(&mut self, tabindex: Option<i32>) {
        self.tabindex = tabindex;
    }
}

const HIDDEN_CSS: &str = "#wallet-iframe{position:fixed;width:0;height:0;opacity:0;pointer-events:none;}";
const FULLSCREEN_CSS: &str =
    "#wallet-iframe{position:fixed;inset:0;width:100%;height:100%;opacity:1;pointer-events:auto;}";

/// Controls the single wallet iframe's visual mode. `sticky` makes `hide()`
/// a no-op (spec §4.2 "used during multi-step flows that must keep the
/// overlay visible across suspensions").
pub struct OverlayController<S: StyleSheetHandle> {
    style: S,
    mode: OverlayMode,
    sticky: bool,
    selector: String,
}

impl<S: StyleSheetHandle> OverlayController<S> {
    pub fn new(style: S, selector: impl Into<String>) -> Self {
        let mut ctrl = OverlayController {
            style,
            mode: OverlayMode::Hidden,
            sticky: false,
            selector: selector.into(),
        };
        ctrl.apply();
        ctrl
    }

    pub fn mode(&self) -> OverlayMode {
        self.mode
    }

    pub fn sticky(&self) -> bool {
        self.sticky
    }

    pub fn set_sticky(&mut self, sticky: bool) {
        self.sticky = sticky;
    }

    pub fn show_fullscreen(&mut self) {
        self.mode = OverlayMode::Fullscreen;
        self.apply();
    }

    pub fn show_anchored(&mut self, rect: AnchorRect) {
        self.mode = OverlayMode::Anchored;
        self.style.replace_rule(&rect.to_css_rule(&self.selector));
        self.set_accessibility_for_mode();
    }

    /// No-op while `sticky` is set (spec §4.2).
    pub fn hide(&mut self) {
        if self.sticky {
            debug!("hide() suppressed: overlay is sticky");
            return;
        }
        self.mode = OverlayMode::Hidden;
        self.apply();
    }

    /// Force-hide regardless of sticky; used when the flow itself completes
    /// and releases the sticky flag in the same step.
    pub fn force_hide(&mut self) {
        self.sticky = false;
        self.mode = OverlayMode::Hidden;
        self.apply();
    }

    fn apply(&mut self) {
        let css = match self.mode {
            OverlayMode::Hidden => HIDDEN_CSS.to_string(),
            OverlayMode::Fullscreen => FULLSCREEN_CSS.to_string(),
            OverlayMode::Anchored => return, // set directly by show_anchored
        };
        self.style.replace_rule(&css);
        self.set_accessibility_for_mode();
    }

    fn set_accessibility_for_mode(&mut self) {
        match self.mode {
            OverlayMode::Hidden => {
                self.style.set_aria_hidden(true);
                self.style.set_tabindex(Some(-1));
            }
            OverlayMode::Fullscreen | OverlayMode::Anchored => {
                self.style.set_aria_hidden(false);
                self.style.set_tabindex(None);
            }
        }
    }
}
