pub mod backend;
pub mod bridge;
pub mod config;
pub mod coordinator;
pub mod host;
pub mod models;
pub mod observer;
pub mod popup;
pub mod protocol;
pub mod runtime;
pub mod store;

pub use backend::{AnswerBackend, CannedBackend, HttpBackend, VideoProcessor};
pub use config::{Settings, SettingsStore};
pub use host::HostPage;
pub use models::{ChatMessage, ChatRole, DerivedVideo, TabId, VideoContext, VideoFragment};
pub use popup::Popup;
pub use protocol::{BridgeMessage, CoordinatorMessage, ObserverMessage, RelayError};
pub use runtime::Runtime;
pub use store::VideoStore;
