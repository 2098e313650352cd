mod geolocation;
mod http;
mod kv;
mod timer;

pub use self::geolocation::{GeoError, Geolocation, GeolocationOperation, PositionFix};
pub use self::http::{
    ApiRequest, ContentType, HttpMethod, HttpOutcome, RequestError, ValidatedUrl,
};
#[cfg(not(target_arch = "wasm32"))]
pub use self::kv::SqliteStore;
pub use self::kv::{
    decode_record, encode_record, KeyNamespace, KeyValueStore, KvError, KvKey, MemoryStore,
    StorageErrorCode,
};
pub use self::timer::{GestureTimer, TimerElapsed, TimerOperation};

pub use crux_core::render::Render;
pub use crux_http::Http;
pub use crux_kv::KeyValue;

use crate::app::App;
use crate::event::Event;

/// Everything the core asks of the platform shell.
#[derive(crux_core::macros::Effect)]
pub struct Capabilities {
    pub render: Render<Event>,
    pub http: Http<Event>,
    pub key_value: KeyValue<Event>,
    pub timer: GestureTimer<Event>,
    pub geolocation: Geolocation<Event>,
}
