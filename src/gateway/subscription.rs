//! Owned set of live stats subscriptions
//!
//! Every engine stats body is split into lines by a `LinesCodec` and kept in a
//! single `StreamMap`. Removing an entry, clearing the set or dropping it
//! closes the underlying engine connection.

use std::collections::HashMap;
use std::fmt;
use std::io;

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use tokio_stream::StreamMap;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tokio_util::io::StreamReader;

use crate::engine::{ContainerSummary, StatsStream};

/// Upper bound of a single stats line
pub const MAX_LINE_LENGTH: usize = 1024 * 1024;

type LineStream = FramedRead<StreamReader<BoxStream<'static, io::Result<Bytes>>, Bytes>, LinesCodec>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionKey {
    pub host_id: String,
    pub container_id: String,
}

impl SubscriptionKey {
    pub fn new(host_id: impl Into<String>, container_id: impl Into<String>) -> Self {
        Self {
            host_id: host_id.into(),
            container_id: container_id.into(),
        }
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.host_id, self.container_id)
    }
}

pub struct SubscriptionSet {
    streams: StreamMap<SubscriptionKey, LineStream>,
    containers: HashMap<SubscriptionKey, ContainerSummary>,
}

impl Default for SubscriptionSet {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self {
            streams: StreamMap::new(),
            containers: HashMap::new(),
        }
    }

    /// Track a new subscription; an existing one under the same key is closed
    pub fn insert(&mut self, key: SubscriptionKey, container: ContainerSummary, body: StatsStream) {
        let body = body.map_err(io::Error::other).boxed();
        let lines = FramedRead::new(
            StreamReader::new(body),
            LinesCodec::new_with_max_length(MAX_LINE_LENGTH),
        );
        self.containers.insert(key.clone(), container);
        self.streams.insert(key, lines);
    }

    /// Close one subscription
    pub fn remove(&mut self, key: &SubscriptionKey) -> bool {
        self.containers.remove(key);
        self.streams.remove(key).is_some()
    }

    /// Close every subscription, returns how many were open
    pub fn close_all(&mut self) -> usize {
        let open = self.streams.len();
        self.streams.clear();
        self.containers.clear();
        open
    }

    pub fn container(&self, key: &SubscriptionKey) -> Option<&ContainerSummary> {
        self.containers.get(key)
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Next line from any subscription.
    ///
    /// Subscriptions whose engine ends the body are dropped silently.
    pub async fn next(&mut self) -> Option<(SubscriptionKey, Result<String, LinesCodecError>)> {
        let item = self.streams.next().await;
        if self.containers.len() != self.streams.len() {
            let streams = &self.streams;
            self.containers.retain(|key, _| streams.contains_key(key));
        }
        item
    }
}
