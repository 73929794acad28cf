//! Real DOM wiring for [`crate::StyleSheetHandle`]: a constructable
//! `CSSStyleSheet` adopted into the document where supported, falling back to
//! a nonced `<style>` element otherwise (spec §4.2).

use js_sys::Reflect;
use log::warn;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{Document, Element, HtmlStyleElement};

use crate::StyleSheetHandle;

pub struct DomStyleSheet {
    document: Document,
    target: Element,
    style_el: Option<HtmlStyleElement>,
    constructable_sheet: Option<JsValue>,
}

impl DomStyleSheet {
    pub fn new(document: Document, target: Element, csp_nonce: Option<&str>) -> Self {
        let constructable_sheet = try_construct_stylesheet(&document);
        let style_el = if constructable_sheet.is_none() {
            document.create_element("style").ok().and_then(|el| {
                if let Some(nonce) = csp_nonce {
                    let _ = el.set_attribute("nonce", nonce);
                }
                document.head().and_then(|head| head.append_child(&el).ok());
                el.dyn_into::<HtmlStyleElement>().ok()
            })
        } else {
            None
        };
        DomStyleSheet {
            document,
            target,
            style_el,
            constructable_sheet,
        }
    }
}

fn try_construct_stylesheet(document: &Document) -> Option<JsValue> {
    let window = web_sys::window()?;
    let ctor = Reflect::get(&window, &JsValue::from_str("CSSStyleSheet")).ok()?;
    if ctor.is_undefined() {
        return None;
    }
    let sheet = js_sys::Reflect::construct(&ctor.dyn_into().ok()?, &js_sys::Array::new()).ok()?;
    // adoptedStyleSheets = [sheet]
    let adopted = js_sys::Array::new();
    adopted.push(&sheet);
    Reflect::set(
        document.as_ref() as &JsValue,
        &JsValue::from_str("adoptedStyleSheets"),
        &adopted,
    )
    .ok()?;
    Some(sheet)
}

impl StyleSheetHandle for DomStyleSheet {
    fn replace_rule(&mut self, css: &str) {
        if let Some(sheet) = &self.constructable_sheet {
            if let Ok(replace) = Reflect::get(sheet, &JsValue::from_str("replaceSync")) {
                if let Some(func) = replace.dyn_ref::<js_sys::Function>() {
                    if func.call1(sheet, &JsValue::from_str(css)).is_err() {
                        warn!("replaceSync failed on constructable stylesheet");
                    }
                    return;
                }
            }
        }
        if let Some(style_el) = &self.style_el {
            style_el.set_inner_text(css);
        } else {
            warn!("no stylesheet handle available; overlay CSS not applied");
        }
        let _ = &self.document;
    }

    fn set_aria_hidden(&mut self, hidden: bool) {
        let _ = self
            .target
            .set_attribute("aria-hidden", if hidden { "true" } else { "false" });
    }

    fn set_tabindex(&mut self, tabindex: Option<i32>) {
        match tabindex {
            Some(v) => {
                let _ = self.target.set_attribute("tabindex", &v.to_string());
            }
            None => {
                let _ = self.target.remove_attribute("tabindex");
            }
        }
    }
}
