//! wasm32 glue: the `fetch`-backed [`ShamirRelay`] the worker uses to talk
//! to the Shamir 3-pass relay server.

use std::future::Future;
use std::pin::Pin;

use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::{Request, RequestInit, RequestMode, Response};

use crate::shamir_client::{
    ApplyServerLockRequest, ApplyServerLockResponse, RemoveServerLockRequest, RemoveServerLockResponse,
    ShamirRelay,
};

pub struct FetchRelay;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, String>> + 'a>>;

impl ShamirRelay for FetchRelay {
    fn apply_server_lock<'a>(
        &'a self,
        url: &'a str,
        req: ApplyServerLockRequest,
    ) -> BoxFuture<'a, ApplyServerLockResponse> {
        Box::pin(async move {
            let body = serde_json::to_string(&req).map_err(|e| e.to_string())?;
            let text = post_json(url, &body).await?;
            serde_json::from_str(&text).map_err(|e| e.to_string())
        })
    }

    fn remove_server_lock<'a>(
        &'a self,
        url: &'a str,
        req: RemoveServerLockRequest,
    ) -> BoxFuture<'a, RemoveServerLockResponse> {
        Box::pin(async move {
            let body = serde_json::to_string(&req).map_err(|e| e.to_string())?;
            let text = post_json(url, &body).await?;
            serde_json::from_str(&text).map_err(|e| e.to_string())
        })
    }
}

async fn post_json(url: &str, body: &str) -> Result<String, String> {
    let mut init = RequestInit::new();
    init.method("POST");
    init.mode(RequestMode::Cors);
    init.body(Some(&JsValue::from_str(body)));

    let request = Request::new_with_str_and_init(url, &init).map_err(|e| format!("{:?}", e))?;
    request
        .headers()
        .set("Content-Type", "application/json")
        .map_err(|e| format!("{:?}", e))?;

    let window = web_sys::window().ok_or_else(|| "no global window".to_string())?;
    let resp_value = JsFuture::from(window.fetch_with_request(&request))
        .await
        .map_err(|e| format!("fetch failed: {:?}", e))?;
    let resp: Response = resp_value.dyn_into().map_err(|_| "response cast failed".to_string())?;

    if !resp.ok() {
        return Err(format!("HTTP error: {} {}", resp.status(), resp.status_text()));
    }

    let text_promise = resp.text().map_err(|e| format!("{:?}", e))?;
    let text_value = JsFuture::from(text_promise).await.map_err(|e| format!("{:?}", e))?;
    text_value.as_string().ok_or_else(|| "response body was not a string".to_string())
}
