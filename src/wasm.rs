// Host adapters over a plain JS object. JS only executes: every call carries a buffer
// id ("A"/"B"), the skin selector and, for styles and status, a JSON payload.

use std::rc::Rc;

use futures::future::{self, LocalBoxFuture};
use futures::FutureExt;
use js_sys::{Array, Function, Promise, Reflect};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;

use crate::error::EngineError;
use crate::host::{Host, PollSource, StyleCommand};
use crate::skin::Skin;
use crate::types::{BufferId, StatusMessage, Target};

const FALLBACK_FRAME_MS: u32 = 16;

/// Readable message out of a thrown JS value.
fn describe(err: &JsValue) -> String {
    if let Some(text) = err.as_string() {
        return text;
    }
    if let Some(error) = err.dyn_ref::<js_sys::Error>() {
        return String::from(error.message());
    }
    format!("{err:?}")
}

fn method(obj: &JsValue, name: &str) -> Option<Function> {
    Reflect::get(obj, &JsValue::from_str(name))
        .ok()?
        .dyn_into::<Function>()
        .ok()
}

fn call(obj: &JsValue, name: &str, args: &[JsValue]) -> Result<JsValue, EngineError> {
    let function = method(obj, name)
        .ok_or_else(|| EngineError::Host(format!("host object has no {name}()")))?;
    let args: Array = args.iter().collect();
    function
        .apply(obj, &args)
        .map_err(|e| EngineError::Host(describe(&e)))
}

/// Promise resolved by a global timer function (`setTimeout`, `requestAnimationFrame`).
fn global_timer(name: &str, ms: u32) -> Result<Promise, EngineError> {
    let global = js_sys::global();
    let timer = method(&global, name)
        .ok_or_else(|| EngineError::Host(format!("no global {name}()")))?;
    let mut failure = None;
    let promise = Promise::new(&mut |resolve, _reject| {
        if let Err(e) = timer.call2(&global, &resolve, &JsValue::from(ms)) {
            failure = Some(describe(&e));
        }
    });
    match failure {
        Some(message) => Err(EngineError::Host(message)),
        None => Ok(promise),
    }
}

fn settle(promise: Result<Promise, EngineError>) -> LocalBoxFuture<'static, ()> {
    match promise {
        Ok(promise) => JsFuture::from(promise).map(|_| ()).boxed_local(),
        Err(err) => {
            tracing::warn!(%err, "timer unavailable, resolving immediately");
            future::ready(()).boxed_local()
        }
    }
}

/// `Host` backed by a JS object with `applyStyle`, `setText`, `setProgress`,
/// `loadImage`, `setBufferInert`, `setContainerInert` and `setStatus` methods.
/// `sleep(ms)` and `nextFrame()` are optional; browser timers are used otherwise.
pub struct JsHost {
    obj: JsValue,
    skin: Rc<Skin>,
}

impl JsHost {
    pub fn new(obj: JsValue, skin: Rc<Skin>) -> Self {
        JsHost { obj, skin }
    }

    fn notify(&self, name: &str, args: &[JsValue]) -> Option<JsValue> {
        match call(&self.obj, name, args) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(%err, method = name, "host call failed");
                None
            }
        }
    }

    /// Buffer and selector arguments, or `None` when the skin lacks the component.
    fn locate(&self, target: Target) -> Option<[JsValue; 2]> {
        let selector = self.skin.selector(target.component)?;
        Some([
            JsValue::from_str(&target.buffer.to_string()),
            JsValue::from_str(selector),
        ])
    }

    fn optional_timer(&self, name: &str, arg: Option<u32>) -> Option<LocalBoxFuture<'static, ()>> {
        method(&self.obj, name)?;
        let args: Vec<JsValue> = arg.into_iter().map(JsValue::from).collect();
        let value = self.notify(name, &args)?;
        Some(
            JsFuture::from(Promise::resolve(&value))
                .map(|_| ())
                .boxed_local(),
        )
    }
}

impl Host for JsHost {
    fn now_ms(&self) -> f64 {
        js_sys::Date::now()
    }

    fn sleep(&self, ms: u32) -> LocalBoxFuture<'static, ()> {
        if ms == 0 {
            return future::ready(()).boxed_local();
        }
        self.optional_timer("sleep", Some(ms))
            .unwrap_or_else(|| settle(global_timer("setTimeout", ms)))
    }

    fn next_frame(&self) -> LocalBoxFuture<'static, ()> {
        if let Some(frame) = self.optional_timer("nextFrame", None) {
            return frame;
        }
        match global_timer("requestAnimationFrame", 0) {
            Ok(promise) => settle(Ok(promise)),
            Err(_) => settle(global_timer("setTimeout", FALLBACK_FRAME_MS)),
        }
    }

    fn spawn(&self, task: LocalBoxFuture<'static, ()>) {
        wasm_bindgen_futures::spawn_local(task);
    }

    fn apply_style(&self, target: Target, command: &StyleCommand) {
        let Some([buffer, selector]) = self.locate(target) else {
            return;
        };
        match serde_json::to_string(command) {
            Ok(json) => {
                self.notify("applyStyle", &[buffer, selector, JsValue::from_str(&json)]);
            }
            Err(err) => tracing::warn!(%err, "style command not serializable"),
        }
    }

    fn set_text(&self, target: Target, text: &str) {
        if let Some([buffer, selector]) = self.locate(target) {
            self.notify("setText", &[buffer, selector, JsValue::from_str(text)]);
        }
    }

    fn set_progress(&self, target: Target, fraction: f32) {
        if let Some([buffer, selector]) = self.locate(target) {
            self.notify("setProgress", &[buffer, selector, JsValue::from(fraction)]);
        }
    }

    fn load_image(&self, target: Target, url: Option<&str>) -> LocalBoxFuture<'static, bool> {
        let Some([buffer, selector]) = self.locate(target) else {
            return future::ready(false).boxed_local();
        };
        let url = url.map_or(JsValue::NULL, JsValue::from_str);
        let Some(value) = self.notify("loadImage", &[buffer, selector, url]) else {
            return future::ready(false).boxed_local();
        };
        JsFuture::from(Promise::resolve(&value))
            .map(|loaded| match loaded {
                Ok(value) => value.as_bool().unwrap_or(true),
                Err(_) => false,
            })
            .boxed_local()
    }

    fn set_buffer_inert(&self, buffer: BufferId, inert: bool) {
        self.notify(
            "setBufferInert",
            &[JsValue::from_str(&buffer.to_string()), JsValue::from_bool(inert)],
        );
    }

    fn set_container_inert(&self, inert: bool) {
        self.notify("setContainerInert", &[JsValue::from_bool(inert)]);
    }

    fn set_status(&self, status: &StatusMessage) {
        match serde_json::to_string(status) {
            Ok(json) => {
                self.notify("setStatus", &[JsValue::from_str(&json)]);
            }
            Err(err) => tracing::warn!(%err, "status not serializable"),
        }
    }
}

/// Poll source calling `fetch()` on the host object. It resolves to the response
/// body as a string; `null`/`undefined` means HTTP 204.
pub struct JsPollSource {
    obj: JsValue,
}

impl JsPollSource {
    pub fn new(obj: JsValue) -> Self {
        JsPollSource { obj }
    }
}

impl PollSource for JsPollSource {
    fn fetch(&self) -> LocalBoxFuture<'static, Result<String, EngineError>> {
        let value = match call(&self.obj, "fetch", &[]) {
            Ok(value) => value,
            Err(EngineError::Host(message)) => {
                return future::ready(Err(EngineError::Transport(message))).boxed_local()
            }
            Err(err) => return future::ready(Err(err)).boxed_local(),
        };
        JsFuture::from(Promise::resolve(&value))
            .map(|settled| match settled {
                Ok(body) if body.is_null() || body.is_undefined() => Ok(String::new()),
                Ok(body) => body
                    .as_string()
                    .ok_or_else(|| EngineError::DataShape("poll body is not a string".into())),
                Err(err) => Err(EngineError::Transport(describe(&err))),
            })
            .boxed_local()
    }
}
