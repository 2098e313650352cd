#![allow(dead_code)]

use crux_core::testing::AppTester;
use crux_core::Request;
use crux_http::protocol::{HttpRequest, HttpResponse, HttpResult};
use serde_json::{json, Value};
use shared::capabilities::{
    HttpMethod, KeyValueStore, MemoryStore, PositionFix, TimerElapsed, TimerOperation,
};
use shared::config::ApiConfig;
use shared::{Api, App, AppConfig, Effect, Event, Model, ViewModel};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

pub const BASE_URL: &str = "https://api.example.com/api";

/// In-memory stand-in for the locations backend. Serves Hydra
/// collections, paginates saved locations, and logs every request.
pub struct FakeBackend {
    page_size: usize,
    state: Mutex<Data>,
    log: Mutex<Vec<(HttpMethod, String)>>,
    content_types: Mutex<Vec<Option<String>>>,
    failures: Mutex<VecDeque<(Option<(HttpMethod, String)>, Failure)>>,
}

#[derive(Default)]
struct Data {
    next_id: u32,
    locations: BTreeMap<u32, Value>,
    saved: BTreeMap<u32, Value>,
    users: BTreeMap<u32, Value>,
}

enum Failure {
    Status(u16, Value),
    Offline,
}

impl FakeBackend {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            state: Mutex::new(Data {
                next_id: 1,
                ..Default::default()
            }),
            log: Mutex::new(Vec::new()),
            content_types: Mutex::new(Vec::new()),
            failures: Mutex::new(VecDeque::new()),
        }
    }

    pub fn add_user(&self, username: &str) -> String {
        let mut data = self.state.lock().unwrap();
        let id = data.take_id();
        let iri = format!("/api/users/{id}");
        data.users.insert(
            id,
            json!({"@id": iri, "@type": "User", "username": username, "email": format!("{username}@example.com"), "isActif": true}),
        );
        iri
    }

    pub fn add_location(&self, name: &str) -> String {
        let mut data = self.state.lock().unwrap();
        let id = data.take_id();
        let iri = format!("/api/locations/{id}");
        data.locations.insert(
            id,
            json!({"@id": iri, "@type": "Location", "name": name, "description": format!("{name} description"), "latitude": 10.0, "longitude": 20.0, "visibility": "public", "isActif": true}),
        );
        iri
    }

    pub fn add_saved(&self, location: &str, user: &str) -> String {
        let mut data = self.state.lock().unwrap();
        let id = data.take_id();
        let iri = format!("/api/saved_locations/{id}");
        data.saved.insert(
            id,
            json!({"@id": iri, "@type": "SavedLocation", "location": location, "user": user, "isActif": true}),
        );
        iri
    }

    pub fn remove_location(&self, iri: &str) {
        let id = trailing_id(iri);
        self.state.lock().unwrap().locations.remove(&id);
    }

    pub fn location_count(&self) -> usize {
        self.state.lock().unwrap().locations.len()
    }

    pub fn saved_count(&self) -> usize {
        self.state.lock().unwrap().saved.len()
    }

    pub fn saved_links(&self) -> Vec<(String, String)> {
        self.state
            .lock()
            .unwrap()
            .saved
            .values()
            .map(|s| {
                (
                    s["location"].as_str().unwrap_or_default().to_string(),
                    s["user"].as_str().unwrap_or_default().to_string(),
                )
            })
            .collect()
    }

    /// Fails the next request with `status` and a problem payload.
    pub fn fail_next(&self, status: u16, problem: Value) {
        self.failures
            .lock()
            .unwrap()
            .push_back((None, Failure::Status(status, problem)));
    }

    /// Fails the next request whose method matches and whose path starts
    /// with `prefix`.
    pub fn fail_next_on(&self, method: HttpMethod, prefix: &str, status: u16, problem: Value) {
        self.failures.lock().unwrap().push_back((
            Some((method, prefix.to_string())),
            Failure::Status(status, problem),
        ));
    }

    pub fn go_offline_once(&self) {
        self.failures.lock().unwrap().push_back((None, Failure::Offline));
    }

    fn take_failure(&self, method: HttpMethod, path: &str) -> Option<Failure> {
        let mut failures = self.failures.lock().unwrap();
        let index = failures.iter().position(|(matcher, _)| match matcher {
            None => true,
            Some((m, prefix)) => *m == method && path.starts_with(prefix.as_str()),
        })?;
        failures.remove(index).map(|(_, failure)| failure)
    }

    pub fn requests(&self) -> Vec<(HttpMethod, String)> {
        self.log.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.log.lock().unwrap().len()
    }

    pub fn count(&self, method: HttpMethod, prefix: &str) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, p)| *m == method && p.starts_with(prefix))
            .count()
    }

    fn route(&self, method: HttpMethod, full: &str, body: Option<Value>) -> (u16, Value) {
        let path_and_query = full.strip_prefix("/api").unwrap_or(full).to_string();
        let (path, query) = match path_and_query.split_once('?') {
            Some((p, q)) => (p.to_string(), Some(q.to_string())),
            None => (path_and_query.clone(), None),
        };
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        let page = query
            .as_deref()
            .and_then(|q| q.split('&').find_map(|kv| kv.strip_prefix("page=")))
            .and_then(|p| p.parse::<usize>().ok());

        let mut data = self.state.lock().unwrap();
        match (method, segments.as_slice()) {
            (HttpMethod::Get, ["locations"]) => {
                (200, collection(data.locations.values().cloned().collect(), None))
            }
            (HttpMethod::Get, ["locations", id]) => match id.parse().ok().and_then(|id: u32| data.locations.get(&id)) {
                Some(location) => (200, location.clone()),
                None => not_found(),
            },
            (HttpMethod::Post, ["locations"]) => {
                let body = body.clone().unwrap_or_default();
                let id = data.take_id();
                let mut location = body.clone();
                location["@id"] = json!(format!("/api/locations/{id}"));
                location["@type"] = json!("Location");
                location["isActif"] = json!(true);
                data.locations.insert(id, location.clone());
                (201, location)
            }
            (HttpMethod::Get, ["saved_locations"]) => {
                let all: Vec<Value> = data.saved.values().cloned().collect();
                match page {
                    None => (200, collection(all, None)),
                    Some(page) => {
                        let total = all.len();
                        let start = (page.max(1) - 1) * self.page_size;
                        let members: Vec<Value> =
                            all.into_iter().skip(start).take(self.page_size).collect();
                        let has_next = start + self.page_size < total;
                        let mut view = json!({"@id": format!("/api/saved_locations?page={page}")});
                        if has_next {
                            view["next"] = json!(format!("/api/saved_locations?page={}", page + 1));
                        }
                        let mut body = collection(members, Some(view));
                        body["totalItems"] = json!(total);
                        (200, body)
                    }
                }
            }
            (HttpMethod::Post, ["saved_locations"]) => {
                let body = body.clone().unwrap_or_default();
                let id = data.take_id();
                let saved = json!({
                    "@id": format!("/api/saved_locations/{id}"),
                    "@type": "SavedLocation",
                    "location": body["location"],
                    "user": body["user"],
                    "isActif": true
                });
                data.saved.insert(id, saved.clone());
                (201, saved)
            }
            (HttpMethod::Delete, ["saved_locations", id]) => {
                match id.parse().ok().and_then(|id: u32| data.saved.remove(&id)) {
                    Some(_) => (204, Value::Null),
                    None => not_found(),
                }
            }
            (HttpMethod::Get, ["users"]) => (200, collection(data.users.values().cloned().collect(), None)),
            (HttpMethod::Post, ["users"]) => {
                let body = body.clone().unwrap_or_default();
                let id = data.take_id();
                let user = json!({
                    "@id": format!("/api/users/{id}"),
                    "@type": "User",
                    "username": body["username"],
                    "email": body["email"],
                    "isActif": true
                });
                data.users.insert(id, user.clone());
                (201, user)
            }
            _ => not_found(),
        }
    }
}

impl Data {
    fn take_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

fn collection(members: Vec<Value>, view: Option<Value>) -> Value {
    let mut body = json!({
        "@context": "/api/contexts/Collection",
        "@type": "Collection",
        "totalItems": members.len(),
        "member": members,
    });
    if let Some(view) = view {
        body["view"] = view;
    }
    body
}

fn not_found() -> (u16, Value) {
    (404, json!({"title": "An error occurred", "detail": "Not Found"}))
}

fn trailing_id(iri: &str) -> u32 {
    iri.rsplit('/').next().and_then(|s| s.parse().ok()).unwrap_or_default()
}

/// Answers one `Http` effect the way the backend would.
impl FakeBackend {
    pub fn handle(&self, request: &HttpRequest) -> HttpResult {
        let url = url::Url::parse(&request.url).expect("core sends absolute URLs");
        let path = match url.query() {
            Some(query) => format!("{}?{query}", url.path()),
            None => url.path().to_string(),
        };
        let method = match request.method.as_str() {
            "GET" => HttpMethod::Get,
            "POST" => HttpMethod::Post,
            "PATCH" => HttpMethod::Patch,
            "DELETE" => HttpMethod::Delete,
            other => panic!("unexpected method {other}"),
        };
        self.log.lock().unwrap().push((method, path.clone()));
        let content_type = request
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case("content-type"))
            .map(|h| h.value.clone());
        self.content_types.lock().unwrap().push(content_type);

        let (status, body) = match self.take_failure(method, &path) {
            Some(Failure::Offline) => {
                return HttpResult::Err(crux_http::HttpError::Io("network unreachable".into()))
            }
            Some(Failure::Status(status, body)) => (status, body),
            None => {
                let payload = serde_json::from_slice(&request.body).ok();
                self.route(method, &path, payload)
            }
        };

        let mut response = HttpResponse::status(status);
        if !body.is_null() {
            let content_type = if status >= 400 {
                "application/problem+json"
            } else {
                "application/ld+json"
            };
            response
                .header("Content-Type", content_type)
                .body(serde_json::to_vec(&body).unwrap());
        }
        HttpResult::Ok(response.build())
    }

    /// `Content-Type` of every request so far, in order.
    pub fn content_types(&self) -> Vec<Option<String>> {
        self.content_types.lock().unwrap().clone()
    }
}

pub fn config() -> AppConfig {
    AppConfig {
        api: ApiConfig::new(BASE_URL),
        ..Default::default()
    }
}

/// Plays the shell: resolves every effect against the fake backend, the
/// store and a fixed position, and feeds the answers back until the core
/// goes quiet. Gesture timers are held until `fire_timers`; HTTP requests
/// are held while `hold_http` is set.
pub struct Harness {
    pub app: AppTester<App, Effect>,
    pub model: Model,
    pub backend: Arc<FakeBackend>,
    pub store: Arc<dyn KeyValueStore>,
    pub fix: PositionFix,
    pub hold_http: bool,
    pub renders: usize,
    timers: Vec<Request<TimerOperation>>,
    held: Vec<Request<HttpRequest>>,
}

impl Harness {
    pub fn new(backend: Arc<FakeBackend>) -> Self {
        Self::with_store(backend, Arc::new(MemoryStore::new()))
    }

    pub fn with_store(backend: Arc<FakeBackend>, store: Arc<dyn KeyValueStore>) -> Self {
        let model = Model {
            api: Api::new(ApiConfig::new(BASE_URL)),
            ..Default::default()
        };
        Self {
            app: AppTester::default(),
            model,
            backend,
            store,
            fix: PositionFix::PermissionDenied,
            hold_http: false,
            renders: 0,
            timers: Vec::new(),
            held: Vec::new(),
        }
    }

    pub fn located_at(mut self, latitude: f64, longitude: f64) -> Self {
        self.fix = PositionFix::Located {
            latitude,
            longitude,
        };
        self
    }

    pub fn start(&mut self) {
        self.send(Event::Start(Some(config())));
    }

    pub fn send(&mut self, event: Event) {
        self.run(VecDeque::from([event]));
    }

    pub fn view(&self) -> ViewModel {
        self.app.view(&self.model)
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    pub fn held_requests(&self) -> usize {
        self.held.len()
    }

    /// Lets every armed gesture timer expire, oldest first.
    pub fn fire_timers(&mut self) {
        let mut queue = VecDeque::new();
        for mut timer in std::mem::take(&mut self.timers) {
            let update = self.app.resolve(&mut timer, TimerElapsed).unwrap();
            queue.extend(update.events);
        }
        self.run(queue);
    }

    /// Answers the held requests, newest first when `reverse` is set.
    pub fn release_http(&mut self, reverse: bool) {
        let mut held = std::mem::take(&mut self.held);
        if reverse {
            held.reverse();
        }
        let mut queue = VecDeque::new();
        for mut request in held {
            let result = self.backend.handle(&request.operation);
            let update = self.app.resolve(&mut request, result).unwrap();
            queue.extend(update.events);
        }
        self.run(queue);
    }

    fn run(&mut self, mut queue: VecDeque<Event>) {
        while let Some(event) = queue.pop_front() {
            let update = self.app.update(event, &mut self.model);
            for effect in update.effects {
                self.answer(effect, &mut queue);
            }
        }
    }

    fn answer(&mut self, effect: Effect, queue: &mut VecDeque<Event>) {
        match effect {
            Effect::Render(_) => self.renders += 1,
            Effect::Http(mut request) => {
                if self.hold_http {
                    self.held.push(request);
                    return;
                }
                let result = self.backend.handle(&request.operation);
                let update = self.app.resolve(&mut request, result).unwrap();
                queue.extend(update.events);
            }
            Effect::KeyValue(mut request) => {
                let result = self.store.resolve(&request.operation);
                let update = self.app.resolve(&mut request, result).unwrap();
                queue.extend(update.events);
            }
            Effect::Geolocation(mut request) => {
                let update = self.app.resolve(&mut request, self.fix.clone()).unwrap();
                queue.extend(update.events);
            }
            Effect::GestureTimer(request) => self.timers.push(request),
        }
    }
}
