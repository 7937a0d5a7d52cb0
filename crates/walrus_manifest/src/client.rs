//! Boundary to the walrus API.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ManifestResult;
use crate::object::ObjectScope;

/// Stream of watch events.
pub type EventStream = BoxStream<'static, ManifestResult<Event>>;

/// A change notification from a watch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub items: Vec<EventItem>,
}

impl Event {
    pub fn new(event_type: impl Into<String>, items: Vec<EventItem>) -> Self {
        Self {
            event_type: event_type.into(),
            items,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventItem {
    pub id: String,
    pub name: String,
    pub status: ItemStatus,
}

impl EventItem {
    pub fn new(name: impl Into<String>, summary_status: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            status: ItemStatus {
                summary_status: summary_status.into(),
                error: false,
            },
        }
    }

    pub fn with_error(mut self) -> Self {
        self.status.error = true;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ItemStatus {
    pub summary_status: String,
    pub error: bool,
}

/// Operations the operator and waiter need from the server.
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// Fetch one object; `None` when it does not exist.
    async fn get_object(&self, group: &str, scope: &ObjectScope, name: &str)
        -> ManifestResult<Option<Value>>;

    /// Create several objects of one scope in one request.
    async fn create_objects(&self, group: &str, scope: &ObjectScope, body: &Value) -> ManifestResult<()>;

    async fn patch_object(
        &self,
        group: &str,
        scope: &ObjectScope,
        name: &str,
        body: &Value,
    ) -> ManifestResult<()>;

    /// Delete several objects of one scope in one request.
    async fn delete_objects(&self, group: &str, scope: &ObjectScope, names: &[String]) -> ManifestResult<()>;

    /// Follow changes to the objects of a scope.
    async fn watch(&self, group: &str, scope: &ObjectScope) -> ManifestResult<EventStream>;
}

/// Decode a server-sent event body into watch events.
///
/// Frames are separated by a blank line; the `data:` lines of a frame hold
/// one JSON event. Frames without data (comments, keep-alives) are skipped.
pub fn decode_events<S, B>(body: S) -> EventStream
where
    S: Stream<Item = ManifestResult<B>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    stream::unfold(
        (Some(Box::pin(body)), String::new()),
        |(mut body, mut buf)| async move {
            loop {
                if let Some(pos) = buf.find("\n\n") {
                    let frame: String = buf.drain(..pos + 2).collect();
                    match parse_frame(&frame) {
                        Some(event) => return Some((event, (body, buf))),
                        None => continue,
                    }
                }

                let chunk = match body.as_mut() {
                    Some(b) => b.next().await,
                    None => return None,
                };
                match chunk {
                    Some(Ok(chunk)) => {
                        buf.push_str(&String::from_utf8_lossy(chunk.as_ref()).replace("\r\n", "\n"));
                    }
                    Some(Err(e)) => return Some((Err(e), (body, buf))),
                    None => {
                        // A final frame may lack its trailing blank line.
                        let rest = std::mem::take(&mut buf);
                        return parse_frame(&rest).map(|event| (event, (None, buf)));
                    }
                }
            }
        },
    )
    .boxed()
}

fn parse_frame(frame: &str) -> Option<ManifestResult<Event>> {
    let data: Vec<&str> = frame
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim_start)
        .collect();
    if data.is_empty() {
        return None;
    }
    Some(serde_json::from_str(&data.join("\n")).map_err(Into::into))
}
