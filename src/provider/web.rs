//! Browser adapter for Mapbox-GL-compatible script providers
//!
//! The loader is a `<script>` tag with a well-known element id. If the
//! provider global is already installed no tag is touched. A tag left on the
//! page without its global (a failed or foreign load) is replaced, because
//! its events may have fired already and would never settle the load.

use std::cell::RefCell;
use std::rc::Rc;

use js_sys::{Array, Function, Object, Reflect};
use wasm_bindgen::{closure::Closure, JsCast, JsValue};
use web_sys::{Document, Element, HtmlElement, HtmlLinkElement, HtmlScriptElement};

use crate::{
    core::config::{MapViewOptions, ProviderSettings},
    layers::marker::MarkerOptions,
    prelude::HashMap,
    provider::{
        ContainerRef, InstanceId, LoadCompletion, LoaderPlan, MapProvider, MarkerClick, MarkerId,
    },
    MapError, Result,
};

type Listener = Closure<dyn FnMut()>;

struct WebMarker {
    instance: InstanceId,
    marker: JsValue,
    element: HtmlElement,
    on_click: Listener,
}

#[derive(Default)]
struct WebState {
    next_id: u64,
    instances: HashMap<InstanceId, JsValue>,
    markers: HashMap<MarkerId, WebMarker>,
    loader_listeners: Vec<Listener>,
}

pub struct WebScriptProvider {
    settings: ProviderSettings,
    state: RefCell<WebState>,
}

fn js_message(value: JsValue) -> String {
    if let Some(error) = value.dyn_ref::<js_sys::Error>() {
        return String::from(error.message());
    }
    value.as_string().unwrap_or_else(|| format!("{:?}", value))
}

fn document() -> std::result::Result<Document, String> {
    web_sys::window()
        .and_then(|window| window.document())
        .ok_or_else(|| "no document available".to_string())
}

fn call_method(
    target: &JsValue,
    name: &str,
    args: &[&JsValue],
) -> std::result::Result<JsValue, JsValue> {
    let method: Function = Reflect::get(target, &JsValue::from_str(name))?.dyn_into()?;
    let args: Array = args.iter().copied().collect();
    method.apply(target, &args)
}

fn construct(
    global: &JsValue,
    class: &str,
    args: &[&JsValue],
) -> std::result::Result<JsValue, JsValue> {
    let ctor: Function = Reflect::get(global, &JsValue::from_str(class))?.dyn_into()?;
    let args: Array = args.iter().copied().collect();
    Reflect::construct(&ctor, &args)
}

impl WebScriptProvider {
    pub fn new(settings: ProviderSettings) -> Self {
        Self {
            settings,
            state: RefCell::new(WebState::default()),
        }
    }

    pub fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    fn next_id(&self) -> u64 {
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        state.next_id
    }

    /// The provider's global object, if the script has run
    fn global(&self) -> Option<JsValue> {
        let window = web_sys::window()?;
        Reflect::get(&window, &JsValue::from_str(&self.settings.global_name))
            .ok()
            .filter(|value| !value.is_undefined() && !value.is_null())
    }

    fn apply_access_token(&self) {
        if let (Some(global), Some(token)) = (self.global(), &self.settings.access_token) {
            if let Err(e) = Reflect::set(&global, &"accessToken".into(), &JsValue::from_str(token)) {
                log::warn!("could not set provider access token: {}", js_message(e));
            }
        }
    }

    fn insert_stylesheet(&self, document: &Document) -> std::result::Result<(), JsValue> {
        let Some(href) = &self.settings.stylesheet_url else {
            return Ok(());
        };
        let id = format!("{}-css", self.settings.script_element_id);
        if document.get_element_by_id(&id).is_some() {
            return Ok(());
        }
        let link: HtmlLinkElement = document.create_element("link")?.dyn_into()?;
        link.set_id(&id);
        link.set_rel("stylesheet");
        link.set_href(href);
        if let Some(head) = document.head() {
            head.append_child(&link)?;
        }
        Ok(())
    }

    fn insert_script(&self, document: &Document) -> std::result::Result<Element, JsValue> {
        let script: HtmlScriptElement = document.create_element("script")?.dyn_into()?;
        script.set_id(&self.settings.script_element_id);
        script.set_src(&self.settings.loader_url);
        script.set_async(true);
        let head = document
            .head()
            .ok_or_else(|| JsValue::from_str("document has no <head>"))?;
        head.append_child(&script)?;
        Ok(script.into())
    }

    /// Settle `completion` from the loader tag's `load`/`error` events
    fn watch_loader(&self, script: &Element, completion: LoadCompletion) {
        let slot = Rc::new(RefCell::new(Some(completion)));

        let token = self.settings.access_token.clone();
        let global_name = self.settings.global_name.clone();
        let ready_slot = slot.clone();
        let on_load = Closure::<dyn FnMut()>::new(move || {
            if let (Some(token), Some(window)) = (&token, web_sys::window()) {
                if let Ok(global) = Reflect::get(&window, &JsValue::from_str(&global_name)) {
                    if let Err(e) =
                        Reflect::set(&global, &"accessToken".into(), &JsValue::from_str(token))
                    {
                        log::warn!("could not set provider access token: {}", js_message(e));
                    }
                }
            }
            let completion = ready_slot.borrow_mut().take();
            if let Some(completion) = completion {
                completion.succeed();
            }
        });

        let src = self.settings.loader_url.clone();
        let error_slot = slot.clone();
        let on_error = Closure::<dyn FnMut()>::new(move || {
            let completion = error_slot.borrow_mut().take();
            if let Some(completion) = completion {
                completion.fail(format!("failed to load {}", src));
            }
        });

        let registered = script
            .add_event_listener_with_callback("load", on_load.as_ref().unchecked_ref())
            .and_then(|_| {
                script.add_event_listener_with_callback("error", on_error.as_ref().unchecked_ref())
            });
        if let Err(e) = registered {
            let completion = slot.borrow_mut().take();
            if let Some(completion) = completion {
                completion.fail(format!("cannot watch loader: {}", js_message(e)));
            }
            return;
        }

        let mut state = self.state.borrow_mut();
        state.loader_listeners.push(on_load);
        state.loader_listeners.push(on_error);
    }
}

impl MapProvider for WebScriptProvider {
    fn name(&self) -> &str {
        "web-script"
    }

    fn load(&self, completion: LoadCompletion) {
        let document = match document() {
            Ok(document) => document,
            Err(reason) => return completion.fail(reason),
        };
        let existing = document.get_element_by_id(&self.settings.script_element_id);

        match LoaderPlan::for_page(self.global().is_some(), existing.is_some()) {
            LoaderPlan::UseGlobal => {
                log::debug!("{} already present on the page", self.settings.global_name);
                self.apply_access_token();
                return completion.succeed();
            }
            LoaderPlan::ReplaceStale => {
                log::warn!(
                    "loader tag #{} is present without {}, replacing it",
                    self.settings.script_element_id,
                    self.settings.global_name
                );
                if let Some(stale) = existing {
                    stale.remove();
                }
            }
            LoaderPlan::Insert => {}
        }

        if let Err(e) = self.insert_stylesheet(&document) {
            log::warn!("could not insert provider stylesheet: {}", js_message(e));
        }

        match self.insert_script(&document) {
            Ok(script) => self.watch_loader(&script, completion),
            Err(e) => completion.fail(js_message(e)),
        }
    }

    fn unload(&self) {
        if let Ok(document) = document() {
            for id in [
                self.settings.script_element_id.clone(),
                format!("{}-css", self.settings.script_element_id),
            ] {
                if let Some(element) = document.get_element_by_id(&id) {
                    element.remove();
                }
            }
        }
        self.state.borrow_mut().loader_listeners.clear();
    }

    fn create_instance(
        &self,
        container: &ContainerRef,
        options: &MapViewOptions,
    ) -> Result<InstanceId> {
        let global = self.global().ok_or(MapError::ProviderNotReady)?;
        let failed = |e: JsValue| MapError::MapConstructionFailed(js_message(e));

        let config = Object::new();
        let center: Array = [options.center_longitude, options.center_latitude]
            .iter()
            .map(|v| JsValue::from_f64(*v))
            .collect();
        Reflect::set(&config, &"container".into(), &container.id().into()).map_err(failed)?;
        Reflect::set(&config, &"style".into(), &self.settings.style_url.as_str().into())
            .map_err(failed)?;
        Reflect::set(&config, &"center".into(), &center).map_err(failed)?;
        Reflect::set(&config, &"zoom".into(), &options.zoom_level.into()).map_err(failed)?;

        let config: &JsValue = &config;
        let map = construct(&global, "Map", &[config]).map_err(failed)?;

        if options.zoom_control_enabled {
            let control = construct(&global, "NavigationControl", &[]).map_err(failed)?;
            let position = JsValue::from_str("top-right");
            call_method(&map, "addControl", &[&control, &position]).map_err(failed)?;
        }

        let id = InstanceId(self.next_id());
        self.state.borrow_mut().instances.insert(id, map);
        Ok(id)
    }

    fn destroy_instance(&self, instance: InstanceId) -> Result<()> {
        let map = self
            .state
            .borrow_mut()
            .instances
            .remove(&instance)
            .ok_or_else(|| MapError::Instance(format!("{} is not live", instance)))?;
        call_method(&map, "remove", &[])
            .map(|_| ())
            .map_err(|e| MapError::Instance(js_message(e)))
    }

    fn add_marker(
        &self,
        instance: InstanceId,
        options: &MarkerOptions,
        on_click: MarkerClick,
    ) -> Result<MarkerId> {
        let global = self.global().ok_or(MapError::ProviderNotReady)?;
        let map = self
            .state
            .borrow()
            .instances
            .get(&instance)
            .cloned()
            .ok_or_else(|| MapError::Instance(format!("{} is not live", instance)))?;
        let failed = |e: JsValue| MapError::Marker(js_message(e));

        let document = document().map_err(MapError::Marker)?;
        let element: HtmlElement = document
            .create_element("div")
            .map_err(failed)?
            .dyn_into()
            .map_err(|e: Element| failed(e.into()))?;
        element.set_class_name(&options.style.class_name);
        element.set_title(&options.title);
        let css = element.style();
        for (property, value) in options.style.css_declarations(options.icon_url.as_deref()) {
            css.set_property(property, &value).map_err(failed)?;
        }

        let listener = Closure::<dyn FnMut()>::new(move || on_click());
        element
            .add_event_listener_with_callback("click", listener.as_ref().unchecked_ref())
            .map_err(failed)?;

        let element_value: &JsValue = &element;
        let marker = construct(&global, "Marker", &[element_value]).map_err(failed)?;
        let lng_lat: JsValue = options
            .position
            .to_lng_lat()
            .iter()
            .map(|v| JsValue::from_f64(*v))
            .collect::<Array>()
            .into();
        call_method(&marker, "setLngLat", &[&lng_lat]).map_err(failed)?;
        call_method(&marker, "addTo", &[&map]).map_err(failed)?;

        let id = MarkerId(self.next_id());
        self.state.borrow_mut().markers.insert(
            id,
            WebMarker {
                instance,
                marker,
                element,
                on_click: listener,
            },
        );
        Ok(id)
    }

    fn remove_marker(&self, instance: InstanceId, marker: MarkerId) -> Result<()> {
        let entry = {
            let mut state = self.state.borrow_mut();
            let owned = state
                .markers
                .get(&marker)
                .map(|entry| entry.instance == instance)
                .unwrap_or(false);
            if owned {
                state.markers.remove(&marker)
            } else {
                None
            }
        }
        .ok_or_else(|| MapError::Marker(format!("{} is not attached to {}", marker, instance)))?;

        if let Err(e) = entry
            .element
            .remove_event_listener_with_callback("click", entry.on_click.as_ref().unchecked_ref())
        {
            log::warn!("could not detach click listener of {}: {}", marker, js_message(e));
        }
        call_method(&entry.marker, "remove", &[])
            .map(|_| ())
            .map_err(|e| MapError::Marker(js_message(e)))
    }
}
