#![forbid(unsafe_code)]

//! `storage.sync` access for Chromium (`chrome.*`) and Firefox (`browser.*`).
//!
//! Every lookup goes through `Reflect` so a page without the extension
//! namespace (tests, a stripped-down host) degrades to default settings
//! instead of throwing.

use js_sys::{Array, Function, Promise, Reflect};
use serde_json::{Map, Value};
use uvh_core::Settings;
use uvh_core::settings::STORAGE_KEYS;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;

use crate::bridge::{changes_from_json, settings_from_json};

const SYNC_AREA: &str = "sync";

fn get(target: &JsValue, key: &str) -> Option<JsValue> {
    Reflect::get(target, &JsValue::from_str(key))
        .ok()
        .filter(|value| !value.is_undefined() && !value.is_null())
}

fn namespace() -> Option<JsValue> {
    let global = js_sys::global();
    get(&global, "browser").or_else(|| get(&global, "chrome"))
}

fn storage() -> Option<JsValue> {
    get(&namespace()?, "storage")
}

fn stringify(value: &JsValue) -> Option<String> {
    js_sys::JSON::stringify(value).ok()?.as_string()
}

/// Read the current settings. Missing APIs and rejected reads fail open.
pub(crate) async fn read_settings() -> Settings {
    let Some(area) = storage().and_then(|storage| get(&storage, SYNC_AREA)) else {
        return Settings::default();
    };
    let Some(read) = get(&area, "get").and_then(|f| f.dyn_into::<Function>().ok()) else {
        return Settings::default();
    };
    let keys: Array = STORAGE_KEYS.iter().map(|key| JsValue::from_str(key)).collect();
    let Ok(result) = read.call1(&area, &keys) else {
        return Settings::default();
    };
    let Ok(promise) = result.dyn_into::<Promise>() else {
        return Settings::default();
    };
    match JsFuture::from(promise).await {
        Ok(snapshot) => stringify(&snapshot)
            .map(|json| settings_from_json(&json))
            .unwrap_or_default(),
        Err(err) => {
            tracing::warn!(target: uvh_core::LOG_TARGET, error = ?err, "storage read failed");
            Settings::default()
        }
    }
}

/// A registered `storage.onChanged` listener.
pub(crate) struct ChangeListener {
    _callback: Closure<dyn FnMut(JsValue, JsValue)>,
}

/// Subscribe to `storage.onChanged` for the sync area.
pub(crate) fn on_changed(mut handler: impl FnMut(Map<String, Value>) + 'static) -> Option<ChangeListener> {
    let on_changed = get(&storage()?, "onChanged")?;
    let add = get(&on_changed, "addListener")?.dyn_into::<Function>().ok()?;
    let callback = Closure::<dyn FnMut(JsValue, JsValue)>::new(move |changes: JsValue, area: JsValue| {
        if area.as_string().as_deref() != Some(SYNC_AREA) {
            return;
        }
        if let Some(changes) = stringify(&changes).and_then(|json| changes_from_json(&json)) {
            handler(changes);
        }
    });
    add.call1(&on_changed, callback.as_ref()).ok()?;
    Some(ChangeListener {
        _callback: callback,
    })
}
