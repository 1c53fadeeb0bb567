//! Polling client for the portal chat panel and notification bell.

pub mod clock;
pub mod driver;
pub mod http;
pub mod poller;
pub mod timer;
pub mod transport;
pub mod widget;

pub use clock::{Clock, ManualClock, SystemClock};
pub use driver::{ClientEvent, Driver, UiCommand};
pub use http::HttpTransport;
pub use poller::{ChatEffect, ChatPoller, PanelState, PollIntervals, PollRequest, PollResponse};
pub use transport::{ChatTransport, ClientError, NotificationTransport, OutgoingFile};
pub use widget::{FileSeenStorage, MemorySeenStorage, NotificationWidget, SeenSet, SeenStorage, WidgetEffect};
